//! Affinity group resource

use crate::api::iaas::affinity_groups::{AffinityGroup, CreateAffinityGroupRequest};
use crate::provider_data::{self, StackitProviderData};
use crate::utils::{self, build_internal_id, error_diagnostic, reconcile_string_lists};
use async_trait::async_trait;
use tfplug::context::Context;
use tfplug::plan_modifier::{RequiresReplace, UseStateForUnknown};
use tfplug::resource::*;
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::validator::{OneOfValidator, StringLengthValidator, UuidValidator};
use tfplug::{AttributePath, Diagnostic, Dynamic, DynamicValue};

pub const TYPE_NAME: &str = "stackit_affinity_group";
pub const POLICIES: &[&str] = &[
    "hard-anti-affinity",
    "hard-affinity",
    "soft-anti-affinity",
    "soft-affinity",
];
const ID_FIELDS: &[&str] = &["project_id", "region", "affinity_group_id"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    pub id: Option<String>,
    pub project_id: String,
    pub region: Option<String>,
    pub affinity_group_id: Option<String>,
    pub name: Option<String>,
    pub policy: Option<String>,
    pub members: Option<Vec<String>>,
}

impl Model {
    pub fn from_value(value: &DynamicValue) -> Self {
        let get = |name: &str| value.optional_string(&AttributePath::new(name));
        Self {
            id: get("id"),
            project_id: get("project_id").unwrap_or_default(),
            region: get("region"),
            affinity_group_id: get("affinity_group_id"),
            name: get("name"),
            policy: get("policy"),
            members: value.optional_string_list(&AttributePath::new("members")),
        }
    }

    pub fn to_value(&self) -> DynamicValue {
        DynamicValue::new(Dynamic::object([
            ("id", self.id.clone().into()),
            ("project_id", self.project_id.clone().into()),
            ("region", self.region.clone().into()),
            ("affinity_group_id", self.affinity_group_id.clone().into()),
            ("name", self.name.clone().into()),
            ("policy", self.policy.clone().into()),
            ("members", self.members.clone().into()),
        ]))
    }
}

pub fn to_create_payload(model: &Model) -> Result<CreateAffinityGroupRequest, String> {
    let name = model.name.clone().ok_or("name is not set")?;
    let policy = model.policy.clone().ok_or("policy is not set")?;
    Ok(CreateAffinityGroupRequest { name, policy })
}

pub fn map_fields(group: &AffinityGroup, model: &mut Model, region: &str) -> Result<(), String> {
    let group_id = group
        .id
        .clone()
        .or_else(|| model.affinity_group_id.clone())
        .ok_or("affinity group id not present")?;

    model.id = Some(build_internal_id(&[&model.project_id, region, &group_id]));
    model.region = Some(region.to_string());
    model.affinity_group_id = Some(group_id);
    model.name = Some(group.name.clone());
    model.policy = Some(group.policy.clone());
    model.members = Some(reconcile_string_lists(
        model.members.as_deref().unwrap_or_default(),
        group.members.as_deref().unwrap_or_default(),
    ));
    Ok(())
}

pub fn schema() -> Schema {
    SchemaBuilder::new()
        .description("Affinity group resource schema. Must have a `region` specified in the provider configuration.")
        .attribute(
            AttributeBuilder::new("id", AttributeType::String)
                .description("Terraform's internal resource identifier. It is structured as \"`project_id`,`region`,`affinity_group_id`\".")
                .computed()
                .plan_modifier(UseStateForUnknown)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("project_id", AttributeType::String)
                .description("STACKIT Project ID to which the affinity group is associated.")
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
            AttributeBuilder::new("affinity_group_id", AttributeType::String)
                .description("The affinity group ID.")
                .computed()
                .plan_modifier(UseStateForUnknown)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("name", AttributeType::String)
                .description("The name of the affinity group.")
                .required()
                .validator(StringLengthValidator::between(1, 63))
                .plan_modifier(RequiresReplace)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("policy", AttributeType::String)
                .description("The policy of the affinity group.")
                .required()
                .validator(OneOfValidator::new(POLICIES))
                .plan_modifier(RequiresReplace)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("members", AttributeType::list(AttributeType::String))
                .description("The servers that are part of the affinity group.")
                .computed()
                .plan_modifier(UseStateForUnknown)
                .build(),
        )
        .build()
}

#[derive(Default)]
pub struct AffinityGroupResource {
    provider_data: Option<StackitProviderData>,
}

impl AffinityGroupResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self) -> Result<&StackitProviderData, Diagnostic> {
        self.provider_data.as_ref().ok_or_else(super::not_configured)
    }
}

#[async_trait]
impl Resource for AffinityGroupResource {
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
        let mut diagnostics = vec![];
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
                .affinity_groups()
                .create(&model.project_id, &region, &payload)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(format!("Creating API payload: {}", e)),
        };

        let new_state = match result.and_then(|group| map_fields(&group, &mut model, &region)) {
            Ok(()) => {
                tracing::info!(id = ?model.id, "affinity group created");
                model.to_value()
            }
            Err(e) => {
                diagnostics.push(error_diagnostic("Error creating affinity group", e));
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
        let group_id = model.affinity_group_id.clone().unwrap_or_default();

        let result = data
            .client
            .iaas()
            .affinity_groups()
            .get(&model.project_id, &region, &group_id)
            .await;

        let (new_state, diagnostics) = match result {
            Ok(group) => match map_fields(&group, &mut model, &region) {
                Ok(()) => (Some(model.to_value()), vec![]),
                Err(e) => (
                    Some(request.current_state),
                    vec![error_diagnostic("Error reading affinity group", e)],
                ),
            },
            Err(e) if e.is_not_found() => {
                tracing::warn!(%group_id, "affinity group not found, removing from state");
                (None, vec![])
            }
            Err(e) => (
                Some(request.current_state),
                vec![error_diagnostic("Error reading affinity group", e)],
            ),
        };

        ReadResourceResponse {
            new_state,
            diagnostics,
            private: request.private,
        }
    }

    async fn update(&self, _ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        UpdateResourceResponse {
            new_state: request.prior_state,
            private: vec![],
            diagnostics: vec![Diagnostic::error(
                "Error updating affinity group",
                "An affinity group can't be updated",
            )],
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
        let group_id = model.affinity_group_id.unwrap_or_default();

        let mut diagnostics = vec![];
        match data
            .client
            .iaas()
            .affinity_groups()
            .delete(&model.project_id, &region, &group_id)
            .await
        {
            Ok(()) => tracing::info!(%group_id, "affinity group deleted"),
            Err(e) if e.is_not_found() => {}
            Err(e) => diagnostics.push(error_diagnostic("Error deleting affinity group", e)),
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
impl ResourceWithConfigure for AffinityGroupResource {
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
impl ResourceWithModifyPlan for AffinityGroupResource {
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
impl ResourceWithImportState for AffinityGroupResource {
    async fn import_state(&self, _ctx: Context, request: ImportResourceStateRequest) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
        };
        utils::import_composite_id(&request, ID_FIELDS, &mut response);
        if response.diagnostics.is_empty() {
            tracing::info!(id = %request.id, "affinity group state imported");
        }
        response
    }
}
