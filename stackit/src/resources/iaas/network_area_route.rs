//! Network area route resource

use crate::api::iaas::network_area_routes::{CreateRoutesRequest, Route, TypedValue, UpdateRouteRequest};
use crate::provider_data::{self, StackitProviderData};
use crate::utils::{self, build_internal_id, error_diagnostic, labels_payload, map_labels};
use async_trait::async_trait;
use std::collections::HashMap;
use tfplug::context::Context;
use tfplug::plan_modifier::{RequiresReplace, UseStateForUnknown};
use tfplug::resource::*;
use tfplug::schema::{AttributeBuilder, AttributeType, ObjectNestingMode, Schema, SchemaBuilder};
use tfplug::validator::{OneOfValidator, UuidValidator};
use tfplug::{AttributePath, Diagnostic, Dynamic, DynamicValue};

pub const TYPE_NAME: &str = "stackit_network_area_route";
const ID_FIELDS: &[&str] = &[
    "organization_id",
    "network_area_id",
    "region",
    "network_area_route_id",
];

const DESTINATION_TYPES: &[&str] = &["cidrv4", "cidrv6"];
const NEXT_HOP_TYPES: &[&str] = &["ipv4", "ipv6", "internet", "blackhole"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    pub id: Option<String>,
    pub organization_id: String,
    pub network_area_id: String,
    pub region: Option<String>,
    pub network_area_route_id: Option<String>,
    pub destination: Option<TypedValue>,
    pub next_hop: Option<TypedValue>,
    pub labels: Option<HashMap<String, String>>,
}

fn typed_value(value: &DynamicValue, name: &str) -> Option<TypedValue> {
    let base = AttributePath::new(name);
    Some(TypedValue {
        kind: value.optional_string(&base.clone().attribute("type"))?,
        value: value.optional_string(&base.attribute("value")),
    })
}

fn typed_value_to_dynamic(value: &Option<TypedValue>) -> Dynamic {
    match value {
        Some(v) => Dynamic::object([
            ("type", v.kind.clone().into()),
            ("value", v.value.clone().into()),
        ]),
        None => Dynamic::Null,
    }
}

impl Model {
    pub fn from_value(value: &DynamicValue) -> Self {
        let get = |name: &str| value.optional_string(&AttributePath::new(name));
        Self {
            id: get("id"),
            organization_id: get("organization_id").unwrap_or_default(),
            network_area_id: get("network_area_id").unwrap_or_default(),
            region: get("region"),
            network_area_route_id: get("network_area_route_id"),
            destination: typed_value(value, "destination"),
            next_hop: typed_value(value, "next_hop"),
            labels: value.optional_string_map(&AttributePath::new("labels")),
        }
    }

    pub fn to_value(&self) -> DynamicValue {
        DynamicValue::new(Dynamic::object([
            ("id", self.id.clone().into()),
            ("organization_id", self.organization_id.clone().into()),
            ("network_area_id", self.network_area_id.clone().into()),
            ("region", self.region.clone().into()),
            ("network_area_route_id", self.network_area_route_id.clone().into()),
            ("destination", typed_value_to_dynamic(&self.destination)),
            ("next_hop", typed_value_to_dynamic(&self.next_hop)),
            ("labels", self.labels.clone().into()),
        ]))
    }
}

pub fn to_create_payload(model: &Model) -> Result<CreateRoutesRequest, String> {
    let destination = model.destination.clone().ok_or("destination is not set")?;
    let nexthop = model.next_hop.clone().ok_or("next_hop is not set")?;
    Ok(CreateRoutesRequest {
        items: vec![Route {
            id: None,
            destination,
            nexthop,
            labels: model.labels.clone(),
            created_at: None,
            updated_at: None,
        }],
    })
}

pub fn to_update_payload(model: &Model) -> UpdateRouteRequest {
    UpdateRouteRequest {
        labels: labels_payload(model.labels.as_ref()),
    }
}

pub fn map_fields(route: &Route, model: &mut Model, region: &str) -> Result<(), String> {
    let route_id = route
        .id
        .clone()
        .or_else(|| model.network_area_route_id.clone())
        .ok_or("network area route id not present")?;

    model.id = Some(build_internal_id(&[
        &model.organization_id,
        &model.network_area_id,
        region,
        &route_id,
    ]));
    model.region = Some(region.to_string());
    model.network_area_route_id = Some(route_id);
    model.destination = Some(route.destination.clone());
    model.next_hop = Some(route.nexthop.clone());
    model.labels = map_labels(route.labels.as_ref(), model.labels.as_ref());
    Ok(())
}

/// Checks the next hop value against its type
fn validate_next_hop(next_hop: &TypedValue) -> Option<Diagnostic> {
    let path = AttributePath::new("next_hop").attribute("value");
    match (next_hop.kind.as_str(), &next_hop.value) {
        ("ipv4" | "ipv6", None) => Some(
            Diagnostic::error(
                "Invalid next hop",
                format!("A next hop of type \"{}\" requires a value", next_hop.kind),
            )
            .with_attribute(path),
        ),
        ("internet" | "blackhole", Some(_)) => Some(
            Diagnostic::error(
                "Invalid next hop",
                format!("A next hop of type \"{}\" must not have a value", next_hop.kind),
            )
            .with_attribute(path),
        ),
        _ => None,
    }
}

fn typed_attribute(name: &str, description: &str, types: &[&str]) -> tfplug::schema::Attribute {
    AttributeBuilder::nested(
        name,
        ObjectNestingMode::Single,
        vec![
            AttributeBuilder::new("type", AttributeType::String)
                .description("Type of the value.")
                .required()
                .validator(OneOfValidator::new(types))
                .build(),
            AttributeBuilder::new("value", AttributeType::String)
                .description("The value, e.g. a CIDR or IP address.")
                .optional()
                .build(),
        ],
    )
    .description(description)
    .required()
    .plan_modifier(RequiresReplace)
    .build()
}

pub fn schema() -> Schema {
    SchemaBuilder::new()
        .description("Network area route resource schema. Must have a `region` specified in the provider configuration.")
        .attribute(
            AttributeBuilder::new("id", AttributeType::String)
                .description("Terraform's internal resource ID. It is structured as \"`organization_id`,`network_area_id`,`region`,`network_area_route_id`\".")
                .computed()
                .plan_modifier(UseStateForUnknown)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("organization_id", AttributeType::String)
                .description("STACKIT organization ID.")
                .required()
                .validator(UuidValidator)
                .plan_modifier(RequiresReplace)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("network_area_id", AttributeType::String)
                .description("The network area ID to which the network area route is associated.")
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
            AttributeBuilder::new("network_area_route_id", AttributeType::String)
                .description("The network area route ID.")
                .computed()
                .plan_modifier(UseStateForUnknown)
                .build(),
        )
        .attribute(typed_attribute(
            "destination",
            "Destination of the route.",
            DESTINATION_TYPES,
        ))
        .attribute(typed_attribute(
            "next_hop",
            "Next hop destination.",
            NEXT_HOP_TYPES,
        ))
        .attribute(
            AttributeBuilder::new("labels", AttributeType::map(AttributeType::String))
                .description("Labels are key-value string pairs which can be attached to a resource container")
                .optional()
                .build(),
        )
        .build()
}

#[derive(Default)]
pub struct NetworkAreaRouteResource {
    provider_data: Option<StackitProviderData>,
}

impl NetworkAreaRouteResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self) -> Result<&StackitProviderData, Diagnostic> {
        self.provider_data.as_ref().ok_or_else(super::not_configured)
    }
}

#[async_trait]
impl Resource for NetworkAreaRouteResource {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        ResourceSchemaResponse {
            schema: schema(),
            diagnostics: vec![],
        }
    }

    async fn validate(&self, _ctx: Context, request: ValidateResourceConfigRequest) -> ValidateResourceConfigResponse {
        let model = Model::from_value(&request.config);
        ValidateResourceConfigResponse {
            diagnostics: model.next_hop.as_ref().and_then(validate_next_hop).into_iter().collect(),
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

        let created = match to_create_payload(&model) {
            Ok(payload) => data
                .client
                .iaas()
                .network_area_routes()
                .create(&model.organization_id, &model.network_area_id, &region, &payload)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(format!("Creating API payload: {}", e)),
        };

        let result = created.and_then(|routes| match routes.as_slice() {
            [route] => map_fields(route, &mut model, &region),
            other => Err(format!("expected 1 route in the response, got {}", other.len())),
        });

        let mut diagnostics = vec![];
        let new_state = match result {
            Ok(()) => {
                tracing::info!(id = ?model.id, "network area route created");
                model.to_value()
            }
            Err(e) => {
                diagnostics.push(error_diagnostic("Error creating network area route", e));
                DynamicValue::null()
            }
        };

        CreateResourceResponse {
            new_state,
            private: vec![],
            diagnostics,
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
        let route_id = model.network_area_route_id.clone().unwrap_or_default();

        let result = data
            .client
            .iaas()
            .network_area_routes()
            .get(&model.organization_id, &model.network_area_id, &region, &route_id)
            .await;

        let (new_state, diagnostics) = match result {
            Ok(route) => match map_fields(&route, &mut model, &region) {
                Ok(()) => (Some(model.to_value()), vec![]),
                Err(e) => (
                    Some(request.current_state),
                    vec![error_diagnostic("Error reading network area route", e)],
                ),
            },
            Err(e) if e.is_not_found() => {
                tracing::warn!(%route_id, "network area route not found, removing from state");
                (None, vec![])
            }
            Err(e) => (
                Some(request.current_state),
                vec![error_diagnostic("Error reading network area route", e)],
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
        let route_id = model.network_area_route_id.clone().unwrap_or_default();

        let result = data
            .client
            .iaas()
            .network_area_routes()
            .update(
                &model.organization_id,
                &model.network_area_id,
                &region,
                &route_id,
                &to_update_payload(&model),
            )
            .await
            .map_err(|e| e.to_string())
            .and_then(|route| map_fields(&route, &mut model, &region));

        match result {
            Ok(()) => {
                tracing::info!(%route_id, "network area route updated");
                UpdateResourceResponse {
                    new_state: model.to_value(),
                    private: vec![],
                    diagnostics: vec![],
                }
            }
            Err(e) => UpdateResourceResponse {
                new_state: request.prior_state,
                private: vec![],
                diagnostics: vec![error_diagnostic("Error updating network area route", e)],
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
        let route_id = model.network_area_route_id.clone().unwrap_or_default();

        let mut diagnostics = vec![];
        match data
            .client
            .iaas()
            .network_area_routes()
            .delete(&model.organization_id, &model.network_area_id, &region, &route_id)
            .await
        {
            Ok(()) => tracing::info!(%route_id, "network area route deleted"),
            Err(e) if e.is_not_found() => {}
            Err(e) => diagnostics.push(error_diagnostic("Error deleting network area route", e)),
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
impl ResourceWithConfigure for NetworkAreaRouteResource {
    async fn configure(&mut self, _ctx: Context, request: ConfigureResourceRequest) -> ConfigureResourceResponse {
        match provider_data::from_any(request.provider_data) {
            Ok(data) => {
                self.provider_data = data;
                ConfigureResourceResponse { diagnostics: vec![] }
            }
            Err(diag) => ConfigureResourceResponse {
                diagnostics: vec![diag],
            },
        }
    }
}

#[async_trait]
impl ResourceWithModifyPlan for NetworkAreaRouteResource {
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
impl ResourceWithImportState for NetworkAreaRouteResource {
    async fn import_state(&self, _ctx: Context, request: ImportResourceStateRequest) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
        };
        utils::import_composite_id(&request, ID_FIELDS, &mut response);
        response
    }
}
