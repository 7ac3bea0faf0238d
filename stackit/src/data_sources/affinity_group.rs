//! Affinity group data source

use super::{failed, read_error, unconfigured};
use crate::provider_data::{self, StackitProviderData};
use crate::resources::iaas::affinity_group::{map_fields, Model};
use crate::utils::error_diagnostic;
use async_trait::async_trait;
use tfplug::context::Context;
use tfplug::data_source::{
    ConfigureDataSourceRequest, ConfigureDataSourceResponse, DataSource, DataSourceSchemaRequest,
    DataSourceSchemaResponse, DataSourceWithConfigure, ReadDataSourceRequest, ReadDataSourceResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::validator::UuidValidator;

pub const TYPE_NAME: &str = "stackit_affinity_group";

pub fn schema() -> Schema {
    SchemaBuilder::new()
        .description("Affinity group datasource schema. Must have a `region` specified in the provider configuration.")
        .attribute(
            AttributeBuilder::new("id", AttributeType::String)
                .description("Terraform's internal data source identifier. It is structured as \"`project_id`,`region`,`affinity_group_id`\".")
                .computed()
                .build(),
        )
        .attribute(
            AttributeBuilder::new("project_id", AttributeType::String)
                .description("STACKIT Project ID to which the affinity group is associated.")
                .required()
                .validator(UuidValidator)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("region", AttributeType::String)
                .description("The resource region. If not defined, the provider region is used.")
                .optional()
                .build(),
        )
        .attribute(
            AttributeBuilder::new("affinity_group_id", AttributeType::String)
                .description("The affinity group ID.")
                .required()
                .validator(UuidValidator)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("name", AttributeType::String)
                .description("The name of the affinity group.")
                .computed()
                .build(),
        )
        .attribute(
            AttributeBuilder::new("policy", AttributeType::String)
                .description("The policy of the affinity group.")
                .computed()
                .build(),
        )
        .attribute(
            AttributeBuilder::new("members", AttributeType::list(AttributeType::String))
                .description("The servers that are part of the affinity group.")
                .computed()
                .build(),
        )
        .build()
}

#[derive(Default)]
pub struct AffinityGroupDataSource {
    provider_data: Option<StackitProviderData>,
}

#[async_trait]
impl DataSource for AffinityGroupDataSource {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    async fn schema(&self, _ctx: Context, _request: DataSourceSchemaRequest) -> DataSourceSchemaResponse {
        DataSourceSchemaResponse {
            schema: schema(),
            diagnostics: vec![],
        }
    }

    async fn read(&self, _ctx: Context, request: ReadDataSourceRequest) -> ReadDataSourceResponse {
        let Some(data) = &self.provider_data else {
            return unconfigured();
        };

        let mut model = Model::from_value(&request.config);
        let region = data.region_with_override(model.region.clone());
        let group_id = model.affinity_group_id.clone().unwrap_or_default();

        let group = match data
            .client
            .iaas()
            .affinity_groups()
            .get(&model.project_id, &region, &group_id)
            .await
        {
            Ok(group) => group,
            Err(e) => return failed(read_error("affinity group", &group_id, e)),
        };

        if let Err(e) = map_fields(&group, &mut model, &region) {
            return failed(error_diagnostic("Error reading affinity group", e));
        }
        tracing::debug!(%group_id, "affinity group read");

        ReadDataSourceResponse {
            state: model.to_value(),
            diagnostics: vec![],
        }
    }
}

#[async_trait]
impl DataSourceWithConfigure for AffinityGroupDataSource {
    async fn configure(&mut self, _ctx: Context, request: ConfigureDataSourceRequest) -> ConfigureDataSourceResponse {
        match provider_data::from_any(request.provider_data) {
            Ok(data) => {
                self.provider_data = data;
                ConfigureDataSourceResponse { diagnostics: vec![] }
            }
            Err(diag) => ConfigureDataSourceResponse {
                diagnostics: vec![diag],
            },
        }
    }
}
