//! Provider trait and related types
//!
//! A provider owns the provider-level schema, turns provider configuration
//! into shared provider data, and registers factories for its resources and
//! data sources. The framework creates a fresh resource or data source per
//! RPC from these factories and configures it with the provider data.

use crate::context::Context;
use crate::data_source::DataSourceWithConfigure;
use crate::resource::ResourceWithConfigure;
use crate::schema::Schema;
use crate::types::{Diagnostic, DynamicValue};
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Creates an unconfigured resource instance
pub type ResourceFactory = fn() -> Box<dyn ResourceWithConfigure>;

/// Creates an unconfigured data source instance
pub type DataSourceFactory = fn() -> Box<dyn DataSourceWithConfigure>;

#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider type name, the prefix of every resource type name (e.g., "stackit")
    fn type_name(&self) -> &str;

    /// Provider configuration schema
    async fn schema(&self, ctx: Context, request: ProviderSchemaRequest) -> ProviderSchemaResponse;

    /// Called to validate provider configuration beyond attribute validators
    async fn validate(
        &self,
        _ctx: Context,
        _request: ValidateProviderConfigRequest,
    ) -> ValidateProviderConfigResponse {
        ValidateProviderConfigResponse {
            diagnostics: vec![],
        }
    }

    /// Called once per Terraform run with the provider block
    /// The returned provider_data is handed to every resource and data source
    async fn configure(
        &mut self,
        ctx: Context,
        request: ConfigureProviderRequest,
    ) -> ConfigureProviderResponse;

    /// Resource factories keyed by resource type name
    fn resources(&self) -> HashMap<String, ResourceFactory>;

    /// Data source factories keyed by data source type name
    fn data_sources(&self) -> HashMap<String, DataSourceFactory>;
}

pub struct ProviderSchemaRequest;

pub struct ProviderSchemaResponse {
    pub schema: Schema,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ValidateProviderConfigRequest {
    pub config: DynamicValue,
}

pub struct ValidateProviderConfigResponse {
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ConfigureProviderRequest {
    pub terraform_version: String,
    pub config: DynamicValue,
}

pub struct ConfigureProviderResponse {
    pub diagnostics: Vec<Diagnostic>,
    pub provider_data: Option<Arc<dyn Any + Send + Sync>>,
}
