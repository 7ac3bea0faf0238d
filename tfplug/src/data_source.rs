//! Data sources
//!
//! A data source only reads. The framework creates a fresh instance per call
//! through the provider's factory, hands it the provider data and then runs
//! one of the operations below.

use crate::context::Context;
use crate::schema::Schema;
use crate::types::{Diagnostic, DynamicValue};
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Same name the provider registers the factory under
    fn type_name(&self) -> &str;

    async fn schema(&self, ctx: Context, request: DataSourceSchemaRequest) -> DataSourceSchemaResponse;

    /// Cross-attribute checks, attribute validators already ran
    async fn validate(
        &self,
        _ctx: Context,
        _request: ValidateDataSourceConfigRequest,
    ) -> ValidateDataSourceConfigResponse {
        ValidateDataSourceConfigResponse { diagnostics: vec![] }
    }

    /// Looks the object up. The returned state carries every schema attribute;
    /// a failed lookup returns a null state with an error diagnostic.
    async fn read(&self, ctx: Context, request: ReadDataSourceRequest) -> ReadDataSourceResponse;
}

pub struct DataSourceSchemaRequest;

pub struct DataSourceSchemaResponse {
    pub schema: Schema,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ValidateDataSourceConfigRequest {
    pub type_name: String,
    pub config: DynamicValue,
}

pub struct ValidateDataSourceConfigResponse {
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ReadDataSourceRequest {
    pub type_name: String,
    pub config: DynamicValue,
}

pub struct ReadDataSourceResponse {
    pub state: DynamicValue,
    pub diagnostics: Vec<Diagnostic>,
}

/// Receives the provider data right after the factory built the instance
#[async_trait]
pub trait DataSourceWithConfigure: DataSource {
    async fn configure(&mut self, ctx: Context, request: ConfigureDataSourceRequest) -> ConfigureDataSourceResponse;
}

pub struct ConfigureDataSourceRequest {
    /// None until the provider itself was configured
    pub provider_data: Option<Arc<dyn Any + Send + Sync>>,
}

pub struct ConfigureDataSourceResponse {
    pub diagnostics: Vec<Diagnostic>,
}
