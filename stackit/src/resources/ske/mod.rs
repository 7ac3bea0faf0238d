pub mod cluster;

pub use cluster::SkeClusterResource;

use super::not_configured;
