//! PostgreSQL Flex instance resource

use crate::api::postgresflex::instances::{Acl, Flavor, Instance, InstancePayload, Storage, STATE_DELETED};
use crate::provider_data::{self, StackitProviderData};
use crate::utils::{self, build_internal_id, error_diagnostic, reconcile_string_lists};
use async_trait::async_trait;
use std::time::Duration;
use tfplug::context::Context;
use tfplug::plan_modifier::{RequiresReplace, UseStateForUnknown};
use tfplug::resource::*;
use tfplug::schema::{AttributeBuilder, AttributeType, ObjectNestingMode, Schema, SchemaBuilder};
use tfplug::validator::{NumberRangeValidator, StringLengthValidator, UuidValidator};
use tfplug::{AttributePath, Diagnostic, Dynamic, DynamicValue};

pub const TYPE_NAME: &str = "stackit_postgresflex_instance";
const ID_FIELDS: &[&str] = &["project_id", "region", "instance_id"];

const CREATE_TIMEOUT: Duration = Duration::from_secs(45 * 60);
const UPDATE_TIMEOUT: Duration = Duration::from_secs(45 * 60);
const DELETE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlavorModel {
    pub id: Option<String>,
    pub description: Option<String>,
    pub cpu: Option<i64>,
    pub ram: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageModel {
    pub class: Option<String>,
    pub size: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    pub id: Option<String>,
    pub project_id: String,
    pub region: Option<String>,
    pub instance_id: Option<String>,
    pub name: Option<String>,
    pub acl: Option<Vec<String>>,
    pub backup_schedule: Option<String>,
    pub flavor: Option<FlavorModel>,
    pub replicas: Option<i64>,
    pub storage: Option<StorageModel>,
    pub version: Option<String>,
}

impl Model {
    pub fn from_value(value: &DynamicValue) -> Self {
        let path = AttributePath::new;
        let get = |name: &str| value.optional_string(&path(name));

        let flavor = match value.get(&path("flavor")) {
            Some(Dynamic::Map(_)) => Some(FlavorModel {
                id: value.optional_string(&path("flavor").attribute("id")),
                description: value.optional_string(&path("flavor").attribute("description")),
                cpu: value.optional_int(&path("flavor").attribute("cpu")),
                ram: value.optional_int(&path("flavor").attribute("ram")),
            }),
            _ => None,
        };
        let storage = match value.get(&path("storage")) {
            Some(Dynamic::Map(_)) => Some(StorageModel {
                class: value.optional_string(&path("storage").attribute("class")),
                size: value.optional_int(&path("storage").attribute("size")),
            }),
            _ => None,
        };

        Self {
            id: get("id"),
            project_id: get("project_id").unwrap_or_default(),
            region: get("region"),
            instance_id: get("instance_id"),
            name: get("name"),
            acl: value.optional_string_list(&path("acl")),
            backup_schedule: get("backup_schedule"),
            flavor,
            replicas: value.optional_int(&path("replicas")),
            storage,
            version: get("version"),
        }
    }

    pub fn to_value(&self) -> DynamicValue {
        let flavor = match &self.flavor {
            Some(f) => Dynamic::object([
                ("id", f.id.clone().into()),
                ("description", f.description.clone().into()),
                ("cpu", f.cpu.into()),
                ("ram", f.ram.into()),
            ]),
            None => Dynamic::Null,
        };
        let storage = match &self.storage {
            Some(s) => Dynamic::object([("class", s.class.clone().into()), ("size", s.size.into())]),
            None => Dynamic::Null,
        };

        DynamicValue::new(Dynamic::object([
            ("id", self.id.clone().into()),
            ("project_id", self.project_id.clone().into()),
            ("region", self.region.clone().into()),
            ("instance_id", self.instance_id.clone().into()),
            ("name", self.name.clone().into()),
            ("acl", self.acl.clone().into()),
            ("backup_schedule", self.backup_schedule.clone().into()),
            ("flavor", flavor),
            ("replicas", self.replicas.into()),
            ("storage", storage),
            ("version", self.version.clone().into()),
        ]))
    }
}

/// Finds the flavor matching the configured cpu and ram and stores its id
/// and description in the model
pub fn resolve_flavor(flavors: &[Flavor], flavor: &mut FlavorModel) -> Result<(), String> {
    let (cpu, ram) = match (flavor.cpu, flavor.ram) {
        (Some(cpu), Some(ram)) => (cpu, ram),
        _ => return Err("flavor cpu and ram are required".to_string()),
    };

    let found = flavors
        .iter()
        .find(|f| f.cpu == Some(cpu) && f.memory == Some(ram) && f.id.is_some());

    match found {
        Some(f) => {
            flavor.id = f.id.clone();
            flavor.description = f.description.clone();
            Ok(())
        }
        None => {
            let available = flavors
                .iter()
                .filter_map(|f| Some(format!("- {} CPU, {} GB RAM", f.cpu?, f.memory?)))
                .collect::<Vec<_>>()
                .join("\n");
            Err(format!(
                "couldn't find flavor with {} CPU and {} GB RAM, available flavors are:\n{}",
                cpu, ram, available
            ))
        }
    }
}

pub fn to_payload(model: &Model) -> Result<InstancePayload, String> {
    let flavor = model.flavor.as_ref().ok_or("flavor is not set")?;
    let flavor_id = flavor.id.clone().ok_or("flavor id is not resolved")?;
    let storage = model.storage.as_ref().ok_or("storage is not set")?;

    Ok(InstancePayload {
        name: model.name.clone(),
        acl: Some(Acl {
            items: model.acl.clone().unwrap_or_default(),
        }),
        backup_schedule: model.backup_schedule.clone(),
        flavor_id: Some(flavor_id),
        replicas: model.replicas,
        storage: Some(Storage {
            class: storage.class.clone(),
            size: storage.size,
        }),
        version: model.version.clone(),
    })
}

pub fn map_fields(instance: &Instance, model: &mut Model, region: &str) -> Result<(), String> {
    let instance_id = instance
        .id
        .clone()
        .or_else(|| model.instance_id.clone())
        .ok_or("instance id not present")?;

    let api_acl = instance
        .acl
        .as_ref()
        .map(|acl| acl.items.clone())
        .unwrap_or_default();
    let prior_acl = model.acl.clone().unwrap_or_default();

    let flavor = instance.flavor.clone().unwrap_or_default();
    let storage = instance.storage.clone().unwrap_or_default();

    model.id = Some(build_internal_id(&[&model.project_id, region, &instance_id]));
    model.region = Some(region.to_string());
    model.instance_id = Some(instance_id);
    model.name = instance.name.clone();
    model.acl = Some(reconcile_string_lists(&prior_acl, &api_acl));
    model.backup_schedule = instance.backup_schedule.clone();
    model.flavor = Some(FlavorModel {
        id: flavor.id,
        description: flavor.description,
        cpu: flavor.cpu,
        ram: flavor.memory,
    });
    model.replicas = instance.replicas;
    model.storage = Some(StorageModel {
        class: storage.class,
        size: storage.size,
    });
    model.version = instance.version.clone();
    Ok(())
}

pub fn schema() -> Schema {
    SchemaBuilder::new()
        .description("Postgres Flex instance resource schema. Must have a `region` specified in the provider configuration.")
        .attribute(
            AttributeBuilder::new("id", AttributeType::String)
                .description("Terraform's internal resource ID. It is structured as \"`project_id`,`region`,`instance_id`\".")
                .computed()
                .plan_modifier(UseStateForUnknown)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("project_id", AttributeType::String)
                .description("STACKIT project ID to which the instance is associated.")
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
            AttributeBuilder::new("instance_id", AttributeType::String)
                .description("ID of the PostgresFlex instance.")
                .computed()
                .plan_modifier(UseStateForUnknown)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("name", AttributeType::String)
                .description("Instance name.")
                .required()
                .validator(StringLengthValidator::at_least(1))
                .build(),
        )
        .attribute(
            AttributeBuilder::new("acl", AttributeType::list(AttributeType::String))
                .description("The Access Control List (ACL) for the PostgresFlex instance.")
                .required()
                .build(),
        )
        .attribute(
            AttributeBuilder::new("backup_schedule", AttributeType::String)
                .description("The backup schedule, in cron syntax.")
                .required()
                .build(),
        )
        .attribute(
            AttributeBuilder::nested(
                "flavor",
                ObjectNestingMode::Single,
                vec![
                    AttributeBuilder::new("id", AttributeType::String)
                        .description("The flavor ID, resolved from `cpu` and `ram`.")
                        .computed()
                        .build(),
                    AttributeBuilder::new("description", AttributeType::String)
                        .computed()
                        .build(),
                    AttributeBuilder::new("cpu", AttributeType::Number)
                        .required()
                        .validator(NumberRangeValidator::at_least(1.0))
                        .build(),
                    AttributeBuilder::new("ram", AttributeType::Number)
                        .description("RAM in GB.")
                        .required()
                        .validator(NumberRangeValidator::at_least(1.0))
                        .build(),
                ],
            )
            .required()
            .build(),
        )
        .attribute(
            AttributeBuilder::new("replicas", AttributeType::Number)
                .required()
                .validator(NumberRangeValidator::at_least(1.0))
                .build(),
        )
        .attribute(
            AttributeBuilder::nested(
                "storage",
                ObjectNestingMode::Single,
                vec![
                    AttributeBuilder::new("class", AttributeType::String)
                        .required()
                        .build(),
                    AttributeBuilder::new("size", AttributeType::Number)
                        .description("Storage size in GB.")
                        .required()
                        .validator(NumberRangeValidator::at_least(1.0))
                        .build(),
                ],
            )
            .required()
            .plan_modifier(RequiresReplace)
            .build(),
        )
        .attribute(
            AttributeBuilder::new("version", AttributeType::String)
                .required()
                .build(),
        )
        .build()
}

/// Keeps the resolved flavor id and description while cpu and ram stay the
/// same, so that an unchanged flavor doesn't show up as unknown in every plan
fn keep_resolved_flavor(prior: &DynamicValue, planned: &mut DynamicValue) -> tfplug::Result<()> {
    let prior = Model::from_value(prior);
    let planned_model = Model::from_value(planned);

    let (Some(prior_flavor), Some(planned_flavor)) = (prior.flavor, planned_model.flavor) else {
        return Ok(());
    };
    if prior_flavor.cpu != planned_flavor.cpu || prior_flavor.ram != planned_flavor.ram {
        return Ok(());
    }

    let flavor = AttributePath::new("flavor");
    planned.set(&flavor.clone().attribute("id"), prior_flavor.id)?;
    planned.set(&flavor.attribute("description"), prior_flavor.description)?;
    Ok(())
}

#[derive(Default)]
pub struct PostgresFlexInstanceResource {
    provider_data: Option<StackitProviderData>,
}

impl PostgresFlexInstanceResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self) -> Result<&StackitProviderData, Diagnostic> {
        self.provider_data.as_ref().ok_or_else(super::not_configured)
    }

    async fn load_flavor(&self, data: &StackitProviderData, model: &mut Model, region: &str) -> Result<(), String> {
        let flavor = model.flavor.as_mut().ok_or("flavor is not set")?;
        let flavors = data
            .client
            .postgresflex()
            .instances()
            .flavors(&model.project_id, region)
            .await
            .map_err(|e| format!("Listing flavors: {}", e))?;
        resolve_flavor(&flavors, flavor)
    }
}

#[async_trait]
impl Resource for PostgresFlexInstanceResource {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        ResourceSchemaResponse {
            schema: schema(),
            diagnostics: vec![],
        }
    }

    async fn create(&self, ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
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
        let api = data.client.postgresflex().instances();

        let payload = match self.load_flavor(data, &mut model, &region).await.and_then(|()| to_payload(&model)) {
            Ok(payload) => payload,
            Err(e) => {
                return CreateResourceResponse {
                    new_state: DynamicValue::null(),
                    private: vec![],
                    diagnostics: vec![error_diagnostic("Error creating instance", format!("Creating API payload: {}", e))],
                }
            }
        };

        let instance_id = match api.create(&model.project_id, &region, &payload).await {
            Ok(id) => id,
            Err(e) => {
                return CreateResourceResponse {
                    new_state: DynamicValue::null(),
                    private: vec![],
                    diagnostics: vec![error_diagnostic("Error creating instance", e)],
                }
            }
        };

        // Persist the identifiers before waiting so a failed wait leaves a
        // tainted resource instead of an orphaned instance
        model.instance_id = Some(instance_id.clone());
        model.region = Some(region.clone());
        model.id = Some(build_internal_id(&[&model.project_id, &region, &instance_id]));
        tracing::info!(%instance_id, "postgres flex instance creation started");

        let result = api
            .wait_until_ready(&ctx, &data.wait_config(CREATE_TIMEOUT), &model.project_id, &region, &instance_id)
            .await
            .map_err(|e| e.to_string())
            .and_then(|instance| map_fields(&instance, &mut model, &region));

        let diagnostics = match result {
            Ok(()) => {
                tracing::info!(%instance_id, "postgres flex instance created");
                vec![]
            }
            Err(e) => vec![error_diagnostic("Error creating instance", format!("Instance creation waiting: {}", e))],
        };

        CreateResourceResponse {
            new_state: model.to_value(),
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
        let instance_id = model.instance_id.clone().unwrap_or_default();

        let result = data
            .client
            .postgresflex()
            .instances()
            .get(&model.project_id, &region, &instance_id)
            .await;

        let (new_state, diagnostics) = match result {
            Ok(instance) if instance.status.as_deref() == Some(STATE_DELETED) => {
                tracing::warn!(%instance_id, "instance is deleted, removing from state");
                (None, vec![])
            }
            Ok(instance) => match map_fields(&instance, &mut model, &region) {
                Ok(()) => (Some(model.to_value()), vec![]),
                Err(e) => (
                    Some(request.current_state),
                    vec![error_diagnostic("Error reading instance", e)],
                ),
            },
            Err(e) if e.is_not_found() => {
                tracing::warn!(%instance_id, "instance not found, removing from state");
                (None, vec![])
            }
            Err(e) => (
                Some(request.current_state),
                vec![error_diagnostic("Error reading instance", e)],
            ),
        };

        ReadResourceResponse {
            new_state,
            diagnostics,
            private: request.private,
        }
    }

    async fn update(&self, ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
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
        let instance_id = model.instance_id.clone().unwrap_or_default();
        let api = data.client.postgresflex().instances();

        let payload = match self.load_flavor(data, &mut model, &region).await.and_then(|()| to_payload(&model)) {
            Ok(payload) => payload,
            Err(e) => {
                return UpdateResourceResponse {
                    new_state: request.prior_state,
                    private: vec![],
                    diagnostics: vec![error_diagnostic("Error updating instance", format!("Creating API payload: {}", e))],
                }
            }
        };

        if let Err(e) = api.update(&model.project_id, &region, &instance_id, &payload).await {
            return UpdateResourceResponse {
                new_state: request.prior_state,
                private: vec![],
                diagnostics: vec![error_diagnostic("Error updating instance", e)],
            };
        }

        let result = api
            .wait_until_ready(&ctx, &data.wait_config(UPDATE_TIMEOUT), &model.project_id, &region, &instance_id)
            .await
            .map_err(|e| e.to_string())
            .and_then(|instance| map_fields(&instance, &mut model, &region));

        match result {
            Ok(()) => {
                tracing::info!(%instance_id, "postgres flex instance updated");
                UpdateResourceResponse {
                    new_state: model.to_value(),
                    private: vec![],
                    diagnostics: vec![],
                }
            }
            Err(e) => UpdateResourceResponse {
                new_state: request.prior_state,
                private: vec![],
                diagnostics: vec![error_diagnostic("Error updating instance", format!("Instance update waiting: {}", e))],
            },
        }
    }

    async fn delete(&self, ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
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
        let instance_id = model.instance_id.clone().unwrap_or_default();
        let api = data.client.postgresflex().instances();
        let wait = data.wait_config(DELETE_TIMEOUT);

        match api.delete(&model.project_id, &region, &instance_id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return DeleteResourceResponse { diagnostics: vec![] },
            Err(e) => {
                return DeleteResourceResponse {
                    diagnostics: vec![error_diagnostic("Error deleting instance", e)],
                }
            }
        }

        // Deleted instances are kept around until they are force deleted
        let result = async {
            api.wait_until_deleted(&ctx, &wait, &model.project_id, &region, &instance_id)
                .await
                .map_err(|e| format!("Instance deletion waiting: {}", e))?;
            match api.force_delete(&model.project_id, &region, &instance_id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) => return Err(format!("Force deleting instance: {}", e)),
            }
            api.wait_until_gone(&ctx, &wait, &model.project_id, &region, &instance_id)
                .await
                .map_err(|e| format!("Instance force deletion waiting: {}", e))
        }
        .await;

        let mut diagnostics = vec![];
        match result {
            Ok(()) => tracing::info!(%instance_id, "postgres flex instance deleted"),
            Err(e) => diagnostics.push(error_diagnostic("Error deleting instance", e)),
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
impl ResourceWithConfigure for PostgresFlexInstanceResource {
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
impl ResourceWithModifyPlan for PostgresFlexInstanceResource {
    async fn modify_plan(&self, _ctx: Context, request: ModifyPlanRequest) -> ModifyPlanResponse {
        let mut response = ModifyPlanResponse {
            planned_state: request.planned_state.clone(),
            requires_replace: vec![],
            diagnostics: vec![],
        };
        if let Err(e) = keep_resolved_flavor(&request.prior_state, &mut response.planned_state) {
            response
                .diagnostics
                .push(Diagnostic::error("Error planning flavor", e.to_string()));
        }
        if let Some(data) = &self.provider_data {
            utils::adapt_region(&request, &data.default_region, &mut response);
        }
        response
    }
}

#[async_trait]
impl ResourceWithImportState for PostgresFlexInstanceResource {
    async fn import_state(&self, _ctx: Context, request: ImportResourceStateRequest) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
        };
        utils::import_composite_id(&request, ID_FIELDS, &mut response);
        response
    }
}
