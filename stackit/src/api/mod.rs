//! STACKIT API client
//!
//! Thin typed bindings for the parts of the IaaS, PostgreSQL Flex and
//! Kubernetes Engine APIs the provider manages.

pub mod client;
pub mod common;
pub mod error;
pub mod iaas;
pub mod postgresflex;
pub mod ske;
pub mod wait;

#[cfg(test)]
pub mod test_helpers;

pub use client::{Client, Endpoints, RetryConfig, Service};
pub use error::ApiError;
pub use wait::{WaitConfig, WaitError, WaitState};
