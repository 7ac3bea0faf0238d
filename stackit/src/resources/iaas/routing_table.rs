//! Routing table resource (beta)

use crate::api::iaas::routing_tables::{CreateRoutingTableRequest, RoutingTable, UpdateRoutingTableRequest};
use crate::provider_data::{self, StackitProviderData};
use crate::utils::{self, build_internal_id, error_diagnostic, format_timestamp, labels_payload, map_labels};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tfplug::context::Context;
use tfplug::defaults::StaticDefault;
use tfplug::plan_modifier::{RequiresReplace, UseStateForUnknown};
use tfplug::resource::*;
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::validator::{StringLengthValidator, StringPatternValidator, UuidValidator};
use tfplug::{AttributePath, Diagnostic, Dynamic, DynamicValue};

pub const TYPE_NAME: &str = "stackit_routing_table";
const ID_FIELDS: &[&str] = &["organization_id", "network_area_id", "region", "routing_table_id"];

/// Alphanumeric words joined by single dashes, underscores, spaces or dots
pub const NAME_PATTERN: &str = r"^[A-Za-z0-9]+((-|_|\s|\.)[A-Za-z0-9]+)*$";

static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(NAME_PATTERN).expect("routing table name pattern is valid"));

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    pub id: Option<String>,
    pub organization_id: String,
    pub network_area_id: String,
    pub region: Option<String>,
    pub routing_table_id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub labels: Option<HashMap<String, String>>,
    pub system_routes: Option<bool>,
    pub default: Option<bool>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Model {
    pub fn from_value(value: &DynamicValue) -> Self {
        let get = |name: &str| value.optional_string(&AttributePath::new(name));
        Self {
            id: get("id"),
            organization_id: get("organization_id").unwrap_or_default(),
            network_area_id: get("network_area_id").unwrap_or_default(),
            region: get("region"),
            routing_table_id: get("routing_table_id"),
            name: get("name"),
            description: get("description"),
            labels: value.optional_string_map(&AttributePath::new("labels")),
            system_routes: value.optional_bool(&AttributePath::new("system_routes")),
            default: value.optional_bool(&AttributePath::new("default")),
            created_at: get("created_at"),
            updated_at: get("updated_at"),
        }
    }

    pub fn to_value(&self) -> DynamicValue {
        DynamicValue::new(Dynamic::object([
            ("id", self.id.clone().into()),
            ("organization_id", self.organization_id.clone().into()),
            ("network_area_id", self.network_area_id.clone().into()),
            ("region", self.region.clone().into()),
            ("routing_table_id", self.routing_table_id.clone().into()),
            ("name", self.name.clone().into()),
            ("description", self.description.clone().into()),
            ("labels", self.labels.clone().into()),
            ("system_routes", self.system_routes.into()),
            ("default", self.default.into()),
            ("created_at", self.created_at.clone().into()),
            ("updated_at", self.updated_at.clone().into()),
        ]))
    }
}

pub fn to_create_payload(model: &Model) -> Result<CreateRoutingTableRequest, String> {
    Ok(CreateRoutingTableRequest {
        name: model.name.clone().ok_or("name is not set")?,
        description: model.description.clone(),
        labels: model.labels.clone(),
        system_routes: model.system_routes,
    })
}

pub fn to_update_payload(model: &Model) -> UpdateRoutingTableRequest {
    UpdateRoutingTableRequest {
        name: model.name.clone(),
        description: model.description.clone(),
        labels: Some(labels_payload(model.labels.as_ref())),
    }
}

/// Maps a routing table into the model. Shared with the data source, which
/// has no region override and passes the effective region explicitly.
pub fn map_fields(table: &RoutingTable, model: &mut Model, region: &str) -> Result<(), String> {
    let table_id = table
        .id
        .clone()
        .or_else(|| model.routing_table_id.clone())
        .ok_or("routing table id not present")?;

    model.id = Some(build_internal_id(&[
        &model.organization_id,
        &model.network_area_id,
        region,
        &table_id,
    ]));
    model.region = Some(region.to_string());
    model.routing_table_id = Some(table_id);
    model.name = Some(table.name.clone());
    model.description = table.description.clone();
    model.labels = map_labels(table.labels.as_ref(), model.labels.as_ref());
    model.system_routes = table.system_routes;
    model.default = table.default;
    model.created_at = table.created_at.as_deref().map(format_timestamp);
    model.updated_at = table.updated_at.as_deref().map(format_timestamp);
    Ok(())
}

pub fn schema() -> Schema {
    SchemaBuilder::new()
        .description("Routing table resource schema. Must have a `region` specified in the provider configuration. This resource is in beta and requires `enable_beta_resources`.")
        .attribute(
            AttributeBuilder::new("id", AttributeType::String)
                .description("Terraform's internal resource ID. It is structured as \"`organization_id`,`network_area_id`,`region`,`routing_table_id`\".")
                .computed()
                .plan_modifier(UseStateForUnknown)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("organization_id", AttributeType::String)
                .description("STACKIT organization ID to which the routing table is associated.")
                .required()
                .validator(UuidValidator)
                .plan_modifier(RequiresReplace)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("network_area_id", AttributeType::String)
                .description("The network area ID to which the routing table is associated.")
                .required()
                .validator(UuidValidator)
                .plan_modifier(RequiresReplace)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("region", AttributeType::String)
                .description("The resource region. If not defined, the provider region is used.")
                .optional()
                .computed()
                .plan_modifier(RequiresReplace)
                .plan_modifier(UseStateForUnknown)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("routing_table_id", AttributeType::String)
                .description("The routing tables ID.")
                .computed()
                .plan_modifier(UseStateForUnknown)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("name", AttributeType::String)
                .description("The name of the routing table.")
                .required()
                .validator(StringLengthValidator::between(1, 63))
                .validator(StringPatternValidator::new(
                    NAME_REGEX.clone(),
                    "must contain only letters, digits and single separators",
                ))
                .build(),
        )
        .attribute(
            AttributeBuilder::new("description", AttributeType::String)
                .description("Description of the routing table.")
                .optional()
                .validator(StringLengthValidator::between(1, 127))
                .build(),
        )
        .attribute(
            AttributeBuilder::new("labels", AttributeType::map(AttributeType::String))
                .description("Labels are key-value string pairs which can be attached to a resource container")
                .optional()
                .build(),
        )
        .attribute(
            AttributeBuilder::new("system_routes", AttributeType::Bool)
                .description("This controls whether the routes for project-to-project communication are created automatically or not.")
                .optional()
                .computed()
                .default(StaticDefault::bool(true))
                .plan_modifier(RequiresReplace)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("default", AttributeType::Bool)
                .description("When true this is the default routing table for this network area. It can't be deleted and is used if the user does not specify it otherwise.")
                .computed()
                .plan_modifier(UseStateForUnknown)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("created_at", AttributeType::String)
                .description("Date-time when the routing table was created")
                .computed()
                .plan_modifier(UseStateForUnknown)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("updated_at", AttributeType::String)
                .description("Date-time when the routing table was updated")
                .computed()
                .build(),
        )
        .build()
}

#[derive(Default)]
pub struct RoutingTableResource {
    provider_data: Option<StackitProviderData>,
}

impl RoutingTableResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self) -> Result<&StackitProviderData, Diagnostic> {
        self.provider_data.as_ref().ok_or_else(super::not_configured)
    }
}

#[async_trait]
impl Resource for RoutingTableResource {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        ResourceSchemaResponse {
            schema: schema(),
            diagnostics: vec![],
        }
    }

    async fn create(&self, _ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        let data = match self.data() {
            Ok(data) => data,
            Err(diag) => {
                return CreateResourceResponse {
                    new_state: DynamicValue::null(),
                    private: vec![],
                    diagnostics: vec![diag],
                }
            }
        };

        let mut model = Model::from_value(&request.planned_state);
        let region = data.region_with_override(model.region.clone());

        let result = match to_create_payload(&model) {
            Ok(payload) => data
                .client
                .iaas()
                .routing_tables()
                .create(&model.organization_id, &model.network_area_id, &region, &payload)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(format!("Creating API payload: {}", e)),
        };

        match result.and_then(|table| map_fields(&table, &mut model, &region)) {
            Ok(()) => {
                tracing::info!(id = ?model.id, "routing table created");
                CreateResourceResponse {
                    new_state: model.to_value(),
                    private: vec![],
                    diagnostics: vec![],
                }
            }
            Err(e) => CreateResourceResponse {
                new_state: DynamicValue::null(),
                private: vec![],
                diagnostics: vec![error_diagnostic("Error creating routing table", e)],
            },
        }
    }

    async fn read(&self, _ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let data = match self.data() {
            Ok(data) => data,
            Err(diag) => {
                return ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics: vec![diag],
                    private: request.private,
                }
            }
        };

        let mut model = Model::from_value(&request.current_state);
        let region = data.region_with_override(model.region.clone());
        let table_id = model.routing_table_id.clone().unwrap_or_default();

        let result = data
            .client
            .iaas()
            .routing_tables()
            .get(&model.organization_id, &model.network_area_id, &region, &table_id)
            .await;

        let (new_state, diagnostics) = match result {
            Ok(table) => match map_fields(&table, &mut model, &region) {
                Ok(()) => (Some(model.to_value()), vec![]),
                Err(e) => (
                    Some(request.current_state),
                    vec![error_diagnostic("Error reading routing table", e)],
                ),
            },
            Err(e) if e.is_not_found() => {
                tracing::warn!(%table_id, "routing table not found, removing from state");
                (None, vec![])
            }
            Err(e) => (
                Some(request.current_state),
                vec![error_diagnostic("Error reading routing table", e)],
            ),
        };

        ReadResourceResponse {
            new_state,
            diagnostics,
            private: request.private,
        }
    }

    async fn update(&self, _ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        let data = match self.data() {
            Ok(data) => data,
            Err(diag) => {
                return UpdateResourceResponse {
                    new_state: request.prior_state,
                    private: vec![],
                    diagnostics: vec![diag],
                }
            }
        };

        let mut model = Model::from_value(&request.planned_state);
        let region = data.region_with_override(model.region.clone());
        let table_id = model.routing_table_id.clone().unwrap_or_default();

        let result = data
            .client
            .iaas()
            .routing_tables()
            .update(
                &model.organization_id,
                &model.network_area_id,
                &region,
                &table_id,
                &to_update_payload(&model),
            )
            .await
            .map_err(|e| e.to_string())
            .and_then(|table| map_fields(&table, &mut model, &region));

        match result {
            Ok(()) => {
                tracing::info!(%table_id, "routing table updated");
                UpdateResourceResponse {
                    new_state: model.to_value(),
                    private: vec![],
                    diagnostics: vec![],
                }
            }
            Err(e) => UpdateResourceResponse {
                new_state: request.prior_state,
                private: vec![],
                diagnostics: vec![error_diagnostic("Error updating routing table", e)],
            },
        }
    }

    async fn delete(&self, _ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        let data = match self.data() {
            Ok(data) => data,
            Err(diag) => {
                return DeleteResourceResponse {
                    diagnostics: vec![diag],
                }
            }
        };

        let model = Model::from_value(&request.prior_state);
        let region = data.region_with_override(model.region.clone());
        let table_id = model.routing_table_id.clone().unwrap_or_default();

        let mut diagnostics = vec![];
        match data
            .client
            .iaas()
            .routing_tables()
            .delete(&model.organization_id, &model.network_area_id, &region, &table_id)
            .await
        {
            Ok(()) => tracing::info!(%table_id, "routing table deleted"),
            Err(e) if e.is_not_found() => {}
            Err(e) => diagnostics.push(error_diagnostic("Error deleting routing table", e)),
        }

        DeleteResourceResponse { diagnostics }
    }

    fn as_modify_plan(&self) -> Option<&dyn ResourceWithModifyPlan> {
        Some(self)
    }

    fn as_import_state(&self) -> Option<&dyn ResourceWithImportState> {
        Some(self)
    }
}

#[async_trait]
impl ResourceWithConfigure for RoutingTableResource {
    async fn configure(&mut self, _ctx: Context, request: ConfigureResourceRequest) -> ConfigureResourceResponse {
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
        ConfigureResourceResponse { diagnostics }
    }
}

#[async_trait]
impl ResourceWithModifyPlan for RoutingTableResource {
    async fn modify_plan(&self, _ctx: Context, request: ModifyPlanRequest) -> ModifyPlanResponse {
        let mut response = ModifyPlanResponse {
            planned_state: request.planned_state.clone(),
            requires_replace: vec![],
            diagnostics: vec![],
        };
        if let Some(data) = &self.provider_data {
            utils::adapt_region(&request, &data.default_region, &mut response);
        }
        response
    }
}

#[async_trait]
impl ResourceWithImportState for RoutingTableResource {
    async fn import_state(&self, _ctx: Context, request: ImportResourceStateRequest) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
        };
        utils::import_composite_id(&request, ID_FIELDS, &mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_helpers::create_test_client;
    use crate::api::Endpoints;
    use crate::api::Client;
    use std::sync::Arc;

    fn table() -> RoutingTable {
        RoutingTable {
            id: Some("rtid".to_string()),
            name: "rt".to_string(),
            description: Some("main table".to_string()),
            labels: None,
            system_routes: Some(true),
            default: Some(false),
            created_at: Some("2025-01-01T00:00:00Z".to_string()),
            updated_at: Some("2025-01-02T00:00:00Z".to_string()),
        }
    }

    fn model() -> Model {
        Model {
            organization_id: "org".to_string(),
            network_area_id: "na".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn map_fields_copies_timestamps_and_flags() {
        let mut model = model();
        map_fields(&table(), &mut model, "eu01").unwrap();

        assert_eq!(model.id.as_deref(), Some("org,na,eu01,rtid"));
        assert_eq!(model.system_routes, Some(true));
        assert_eq!(model.default, Some(false));
        assert_eq!(model.created_at.as_deref(), Some("2025-01-01T00:00:00Z"));
        assert_eq!(model.updated_at.as_deref(), Some("2025-01-02T00:00:00Z"));
        assert_eq!(model.labels, None);
    }

    #[test]
    fn update_payload_sends_empty_labels_to_clear() {
        let mut model = model();
        model.name = Some("rt".to_string());
        let payload = to_update_payload(&model);
        assert_eq!(payload.labels, Some(HashMap::new()));
        assert_eq!(payload.name.as_deref(), Some("rt"));
    }

    #[test]
    fn create_payload_requires_name() {
        assert!(to_create_payload(&model()).is_err());
    }

    #[test]
    fn name_pattern_rejects_leading_separator() {
        let pattern = &*NAME_REGEX;
        assert!(pattern.is_match("main-table.v2"));
        assert!(!pattern.is_match("-table"));
        assert!(!pattern.is_match("table--x"));
    }

    #[tokio::test]
    async fn configure_without_beta_opt_in_fails() {
        let data = StackitProviderData::new(Client::new("token", &Endpoints::default()).unwrap(), "eu01".to_string(), false);
        let mut resource = RoutingTableResource::new();
        let response = resource
            .configure(
                Context::new(),
                ConfigureResourceRequest {
                    provider_data: Some(Arc::new(data)),
                },
            )
            .await;
        assert_eq!(response.diagnostics.len(), 1);
        assert!(response.diagnostics[0].summary.contains("beta"));
    }

    #[tokio::test]
    async fn read_removes_missing_table() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock(
                "GET",
                "/v2alpha/organizations/org/network-areas/na/regions/eu01/routing-tables/rtid",
            )
            .with_status(404)
            .with_body(r#"{"code":404,"message":"not found"}"#)
            .create_async()
            .await;

        let mut resource = RoutingTableResource::new();
        resource.provider_data = Some(StackitProviderData::new(
            create_test_client(&server.url()),
            "eu01".to_string(),
            true,
        ));

        let mut state = model();
        state.routing_table_id = Some("rtid".to_string());
        let response = resource
            .read(
                Context::new(),
                ReadResourceRequest {
                    type_name: TYPE_NAME.to_string(),
                    current_state: state.to_value(),
                    private: vec![],
                },
            )
            .await;

        assert!(response.new_state.is_none());
        assert!(response.diagnostics.is_empty());
        mock.assert_async().await;
    }
}
