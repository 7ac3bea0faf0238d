//! Protocol buffer types for Terraform Plugin Protocol v6
//!
//! The protobuf code is generated at build time by tonic_build from
//! proto/tfplugin6.proto and included here.
//!
//! # Type Naming
//!
//! - Top-level messages become structs (e.g., `DynamicValue`, `Schema`)
//! - RPC methods have nested `Request` and `Response` types in snake_case modules
//!   (e.g., `get_provider_schema::Request`, `read_resource::Response`)
//! - Nested messages are in sub-modules (e.g., `diagnostic::Severity`)
//! - The gRPC service trait is available as `provider_server::Provider`
//!
//! Some protobuf types share names with tfplug framework types, so always
//! refer to them through the `proto::` prefix.

include!(concat!(env!("OUT_DIR"), "/tfplugin6.rs"));

pub use provider_server::{Provider as ProviderService, ProviderServer};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_types_accessible() {
        let _ = diagnostic::Severity::Error;
        let _ = attribute_path::step::Selector::AttributeName("test".to_string());
        let _ = schema::object::NestingMode::List;
        let _ = StringKind::Plain;
    }

    #[test]
    fn request_defaults_are_empty() {
        let request = plan_resource_change::Request::default();
        assert!(request.prior_state.is_none());
        assert!(request.type_name.is_empty());

        let response = apply_resource_change::Response::default();
        assert!(response.diagnostics.is_empty());
    }
}
