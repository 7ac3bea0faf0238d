//! PostgreSQL Flex user data source

use super::{failed, read_error, unconfigured};
use crate::provider_data::{self, StackitProviderData};
use crate::resources::postgresflex::user::{map_fields, Model};
use crate::utils::error_diagnostic;
use async_trait::async_trait;
use tfplug::context::Context;
use tfplug::data_source::{
    ConfigureDataSourceRequest, ConfigureDataSourceResponse, DataSource, DataSourceSchemaRequest,
    DataSourceSchemaResponse, DataSourceWithConfigure, ReadDataSourceRequest, ReadDataSourceResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::validator::UuidValidator;
use tfplug::{Dynamic, DynamicValue};

pub const TYPE_NAME: &str = "stackit_postgresflex_user";

/// Credentials are only returned on create, so the data source has none
const CREDENTIAL_ATTRIBUTES: &[&str] = &["password", "uri"];

pub fn schema() -> Schema {
    let required_id = |name: &str, description: &str| {
        AttributeBuilder::new(name, AttributeType::String)
            .description(description)
            .required()
            .validator(UuidValidator)
            .build()
    };

    SchemaBuilder::new()
        .description("Postgres Flex user data source schema. Must have a `region` specified in the provider configuration.")
        .attribute(
            AttributeBuilder::new("id", AttributeType::String)
                .description("Terraform's internal data source. ID. It is structured as \"`project_id`,`region`,`instance_id`,`user_id`\".")
                .computed()
                .build(),
        )
        .attribute(required_id("project_id", "STACKIT project ID to which the instance is associated."))
        .attribute(
            AttributeBuilder::new("region", AttributeType::String)
                .description("The resource region. If not defined, the provider region is used.")
                .optional()
                .build(),
        )
        .attribute(required_id("instance_id", "ID of the PostgresFlex instance."))
        .attribute(required_id("user_id", "User ID."))
        .attribute(
            AttributeBuilder::new("username", AttributeType::String)
                .computed()
                .build(),
        )
        .attribute(
            AttributeBuilder::new("roles", AttributeType::set(AttributeType::String))
                .computed()
                .build(),
        )
        .attribute(AttributeBuilder::new("host", AttributeType::String).computed().build())
        .attribute(AttributeBuilder::new("port", AttributeType::Number).computed().build())
        .build()
}

fn without_credentials(mut state: DynamicValue) -> DynamicValue {
    if let Dynamic::Map(object) = &mut state.value {
        for name in CREDENTIAL_ATTRIBUTES {
            object.remove(*name);
        }
    }
    state
}

#[derive(Default)]
pub struct PostgresFlexUserDataSource {
    provider_data: Option<StackitProviderData>,
}

#[async_trait]
impl DataSource for PostgresFlexUserDataSource {
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
        let user_id = model.user_id.clone().unwrap_or_default();

        let user = match data
            .client
            .postgresflex()
            .users()
            .get(&model.project_id, &region, &model.instance_id, &user_id)
            .await
        {
            Ok(user) => user,
            Err(e) => return failed(read_error("postgresflex user", &user_id, e)),
        };

        if let Err(e) = map_fields(&user, &mut model, &region) {
            return failed(error_diagnostic("Error reading postgresflex user", e));
        }

        ReadDataSourceResponse {
            state: without_credentials(model.to_value()),
            diagnostics: vec![],
        }
    }
}

#[async_trait]
impl DataSourceWithConfigure for PostgresFlexUserDataSource {
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
