//! Routing table data source (beta)

use super::{failed, read_error, unconfigured};
use crate::provider_data::{self, StackitProviderData};
use crate::resources::iaas::routing_table::{map_fields, Model};
use crate::utils::error_diagnostic;
use async_trait::async_trait;
use tfplug::context::Context;
use tfplug::data_source::{
    ConfigureDataSourceRequest, ConfigureDataSourceResponse, DataSource, DataSourceSchemaRequest,
    DataSourceSchemaResponse, DataSourceWithConfigure, ReadDataSourceRequest, ReadDataSourceResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::validator::UuidValidator;

pub const TYPE_NAME: &str = "stackit_routing_table";

pub fn schema() -> Schema {
    let computed_string = |name: &str, description: &str| {
        AttributeBuilder::new(name, AttributeType::String)
            .description(description)
            .computed()
            .build()
    };

    SchemaBuilder::new()
        .description("Routing table datasource schema. Must have a `region` specified in the provider configuration. This datasource is in beta.")
        .attribute(computed_string(
            "id",
            "Terraform's internal datasource ID. It is structured as \"`organization_id`,`network_area_id`,`region`,`routing_table_id`\".",
        ))
        .attribute(
            AttributeBuilder::new("organization_id", AttributeType::String)
                .description("STACKIT organization ID to which the routing table is associated.")
                .required()
                .validator(UuidValidator)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("network_area_id", AttributeType::String)
                .description("The network area ID to which the routing table is associated.")
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
            AttributeBuilder::new("routing_table_id", AttributeType::String)
                .description("The routing tables ID.")
                .required()
                .validator(UuidValidator)
                .build(),
        )
        .attribute(computed_string("name", "The name of the routing table."))
        .attribute(computed_string("description", "Description of the routing table."))
        .attribute(
            AttributeBuilder::new("labels", AttributeType::map(AttributeType::String))
                .description("Labels are key-value string pairs which can be attached to a resource container")
                .computed()
                .build(),
        )
        .attribute(
            AttributeBuilder::new("system_routes", AttributeType::Bool)
                .description("This controls whether the routes for project-to-project communication are created automatically or not.")
                .computed()
                .build(),
        )
        .attribute(
            AttributeBuilder::new("default", AttributeType::Bool)
                .description("When true this is the default routing table for this network area.")
                .computed()
                .build(),
        )
        .attribute(computed_string("created_at", "Date-time when the routing table was created"))
        .attribute(computed_string("updated_at", "Date-time when the routing table was updated"))
        .build()
}

#[derive(Default)]
pub struct RoutingTableDataSource {
    provider_data: Option<StackitProviderData>,
}

#[async_trait]
impl DataSource for RoutingTableDataSource {
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
        if let Some(diag) = data.check_beta(TYPE_NAME) {
            return failed(diag);
        }

        let mut model = Model::from_value(&request.config);
        let region = data.region_with_override(model.region.clone());
        let table_id = model.routing_table_id.clone().unwrap_or_default();

        let table = match data
            .client
            .iaas()
            .routing_tables()
            .get(&model.organization_id, &model.network_area_id, &region, &table_id)
            .await
        {
            Ok(table) => table,
            Err(e) => return failed(read_error("routing table", &table_id, e)),
        };

        if let Err(e) = map_fields(&table, &mut model, &region) {
            return failed(error_diagnostic("Error reading routing table", e));
        }

        ReadDataSourceResponse {
            state: model.to_value(),
            diagnostics: vec![],
        }
    }
}

#[async_trait]
impl DataSourceWithConfigure for RoutingTableDataSource {
    async fn configure(&mut self, _ctx: Context, request: ConfigureDataSourceRequest) -> ConfigureDataSourceResponse {
        let mut diagnostics = vec![];
        match provider_data::from_any(request.provider_data) {
            Ok(data) => {
                if let Some(diag) = data.as_ref().and_then(|d| d.check_beta(TYPE_NAME)) {
                    diagnostics.push(diag);
                }
                self.provider_data = data;
            }
            Err(diag) => diagnostics.push(diag),
        }
        ConfigureDataSourceResponse { diagnostics }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_helpers::create_test_client;
    use mockito::Server;
    use tfplug::{AttributePath, Dynamic, DynamicValue};

    fn config() -> DynamicValue {
        DynamicValue::new(Dynamic::object([
            ("organization_id", "org".into()),
            ("network_area_id", "na".into()),
            ("routing_table_id", "rtid".into()),
            ("region", Dynamic::Null),
        ]))
    }

    async fn read(url: &str, beta: bool) -> ReadDataSourceResponse {
        let data_source = RoutingTableDataSource {
            provider_data: Some(StackitProviderData::new(create_test_client(url), "eu01".to_string(), beta)),
        };
        data_source
            .read(
                Context::new(),
                ReadDataSourceRequest {
                    type_name: TYPE_NAME.to_string(),
                    config: config(),
                },
            )
            .await
    }

    #[tokio::test]
    async fn read_maps_table() {
        let mut server = Server::new_async().await;
        server
            .mock(
                "GET",
                "/v2alpha/organizations/org/network-areas/na/regions/eu01/routing-tables/rtid",
            )
            .with_body(
                r#"{"id":"rtid","name":"main","default":true,"systemRoutes":true,
                    "createdAt":"2025-01-01T00:00:00Z","updatedAt":"2025-01-02T00:00:00Z"}"#,
            )
            .create_async()
            .await;

        let response = read(&server.url(), true).await;

        assert!(response.diagnostics.is_empty());
        assert_eq!(
            response.state.optional_string(&AttributePath::new("id")).as_deref(),
            Some("org,na,eu01,rtid")
        );
        assert_eq!(response.state.optional_bool(&AttributePath::new("default")), Some(true));
    }

    #[tokio::test]
    async fn read_requires_beta_opt_in() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock(
                "GET",
                "/v2alpha/organizations/org/network-areas/na/regions/eu01/routing-tables/rtid",
            )
            .expect(0)
            .create_async()
            .await;

        let response = read(&server.url(), false).await;

        assert!(response.diagnostics[0].summary.contains("beta"));
        mock.assert_async().await;
    }
}
