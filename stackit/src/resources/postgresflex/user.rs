//! PostgreSQL Flex user resource
//!
//! The password and connection URI are only returned when the user is
//! created. Later reads keep whatever the state already holds.

use crate::api::postgresflex::users::{CreateUserRequest, UpdateUserRequest, User};
use crate::provider_data::{self, StackitProviderData};
use crate::utils::{self, build_internal_id, error_diagnostic, reconcile_string_lists};
use async_trait::async_trait;
use tfplug::context::Context;
use tfplug::plan_modifier::{RequiresReplace, UseStateForUnknown};
use tfplug::resource::*;
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::validator::{StringLengthValidator, UuidValidator};
use tfplug::{AttributePath, Diagnostic, Dynamic, DynamicValue};

pub const TYPE_NAME: &str = "stackit_postgresflex_user";
pub const ROLES: &[&str] = &["login", "createdb"];
const ID_FIELDS: &[&str] = &["project_id", "region", "instance_id", "user_id"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    pub id: Option<String>,
    pub project_id: String,
    pub region: Option<String>,
    pub instance_id: String,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub roles: Option<Vec<String>>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<i64>,
    pub uri: Option<String>,
}

impl Model {
    pub fn from_value(value: &DynamicValue) -> Self {
        let get = |name: &str| value.optional_string(&AttributePath::new(name));
        Self {
            id: get("id"),
            project_id: get("project_id").unwrap_or_default(),
            region: get("region"),
            instance_id: get("instance_id").unwrap_or_default(),
            user_id: get("user_id"),
            username: get("username"),
            roles: value.optional_string_list(&AttributePath::new("roles")),
            password: get("password"),
            host: get("host"),
            port: value.optional_int(&AttributePath::new("port")),
            uri: get("uri"),
        }
    }

    pub fn to_value(&self) -> DynamicValue {
        DynamicValue::new(Dynamic::object([
            ("id", self.id.clone().into()),
            ("project_id", self.project_id.clone().into()),
            ("region", self.region.clone().into()),
            ("instance_id", self.instance_id.clone().into()),
            ("user_id", self.user_id.clone().into()),
            ("username", self.username.clone().into()),
            ("roles", self.roles.clone().into()),
            ("password", self.password.clone().into()),
            ("host", self.host.clone().into()),
            ("port", self.port.into()),
            ("uri", self.uri.clone().into()),
        ]))
    }
}

pub fn to_create_payload(model: &Model) -> Result<CreateUserRequest, String> {
    Ok(CreateUserRequest {
        username: model.username.clone().ok_or("username is not set")?,
        roles: model.roles.clone().unwrap_or_default(),
    })
}

pub fn to_update_payload(model: &Model) -> UpdateUserRequest {
    UpdateUserRequest {
        roles: model.roles.clone().unwrap_or_default(),
    }
}

/// Roles outside the supported set, reported during validation
pub fn invalid_roles(roles: &[String]) -> Vec<&str> {
    roles
        .iter()
        .map(String::as_str)
        .filter(|role| !ROLES.contains(role))
        .collect()
}

pub fn map_fields(user: &User, model: &mut Model, region: &str) -> Result<(), String> {
    let user_id = user
        .id
        .clone()
        .or_else(|| model.user_id.clone())
        .ok_or("user id not present")?;

    model.id = Some(build_internal_id(&[
        &model.project_id,
        region,
        &model.instance_id,
        &user_id,
    ]));
    model.region = Some(region.to_string());
    model.user_id = Some(user_id);
    model.username = user.username.clone().or_else(|| model.username.clone());
    model.roles = Some(reconcile_string_lists(
        model.roles.as_deref().unwrap_or_default(),
        user.roles.as_deref().unwrap_or_default(),
    ));
    model.host = user.host.clone();
    model.port = user.port;
    if user.password.is_some() {
        model.password = user.password.clone();
    }
    if user.uri.is_some() {
        model.uri = user.uri.clone();
    }
    Ok(())
}

pub fn schema() -> Schema {
    SchemaBuilder::new()
        .description("Postgres Flex user resource schema. Must have a `region` specified in the provider configuration.")
        .attribute(
            AttributeBuilder::new("id", AttributeType::String)
                .description("Terraform's internal resource ID. It is structured as \"`project_id`,`region`,`instance_id`,`user_id`\".")
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
                .required()
                .validator(UuidValidator)
                .plan_modifier(RequiresReplace)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("user_id", AttributeType::String)
                .description("User ID.")
                .computed()
                .plan_modifier(UseStateForUnknown)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("username", AttributeType::String)
                .required()
                .validator(StringLengthValidator::at_least(1))
                .plan_modifier(RequiresReplace)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("roles", AttributeType::set(AttributeType::String))
                .description("Database access levels for the user. Supported values are: `login`, `createdb`.")
                .required()
                .build(),
        )
        .attribute(
            AttributeBuilder::new("password", AttributeType::String)
                .computed()
                .sensitive()
                .plan_modifier(UseStateForUnknown)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("host", AttributeType::String)
                .computed()
                .plan_modifier(UseStateForUnknown)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("port", AttributeType::Number)
                .computed()
                .plan_modifier(UseStateForUnknown)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("uri", AttributeType::String)
                .computed()
                .sensitive()
                .plan_modifier(UseStateForUnknown)
                .build(),
        )
        .build()
}

#[derive(Default)]
pub struct PostgresFlexUserResource {
    provider_data: Option<StackitProviderData>,
}

impl PostgresFlexUserResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self) -> Result<&StackitProviderData, Diagnostic> {
        self.provider_data.as_ref().ok_or_else(super::not_configured)
    }
}

#[async_trait]
impl Resource for PostgresFlexUserResource {
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
        let roles = request
            .config
            .optional_string_list(&AttributePath::new("roles"))
            .unwrap_or_default();
        let diagnostics = invalid_roles(&roles)
            .into_iter()
            .map(|role| {
                Diagnostic::error(
                    "Invalid role",
                    format!("Role {:?} is not supported, expected one of {:?}", role, ROLES),
                )
                .with_attribute(AttributePath::new("roles"))
            })
            .collect();
        ValidateResourceConfigResponse { diagnostics }
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
                .postgresflex()
                .users()
                .create(&model.project_id, &region, &model.instance_id, &payload)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(format!("Creating API payload: {}", e)),
        };

        match result.and_then(|user| map_fields(&user, &mut model, &region)) {
            Ok(()) => {
                tracing::info!(id = ?model.id, "postgres flex user created");
                CreateResourceResponse {
                    new_state: model.to_value(),
                    private: vec![],
                    diagnostics: vec![],
                }
            }
            Err(e) => CreateResourceResponse {
                new_state: DynamicValue::null(),
                private: vec![],
                diagnostics: vec![error_diagnostic("Error creating user", e)],
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
        let user_id = model.user_id.clone().unwrap_or_default();

        let result = data
            .client
            .postgresflex()
            .users()
            .get(&model.project_id, &region, &model.instance_id, &user_id)
            .await;

        let (new_state, diagnostics) = match result {
            Ok(user) => match map_fields(&user, &mut model, &region) {
                Ok(()) => (Some(model.to_value()), vec![]),
                Err(e) => (
                    Some(request.current_state),
                    vec![error_diagnostic("Error reading user", e)],
                ),
            },
            Err(e) if e.is_not_found() => {
                tracing::warn!(%user_id, "user not found, removing from state");
                (None, vec![])
            }
            Err(e) => (
                Some(request.current_state),
                vec![error_diagnostic("Error reading user", e)],
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
        let user_id = model.user_id.clone().unwrap_or_default();
        let api = data.client.postgresflex().users();

        let result = async {
            api.update(&model.project_id, &region, &model.instance_id, &user_id, &to_update_payload(&model))
                .await
                .map_err(|e| e.to_string())?;
            api.get(&model.project_id, &region, &model.instance_id, &user_id)
                .await
                .map_err(|e| format!("Reading user after update: {}", e))
        }
        .await;

        match result.and_then(|user| map_fields(&user, &mut model, &region)) {
            Ok(()) => {
                tracing::info!(%user_id, "postgres flex user updated");
                UpdateResourceResponse {
                    new_state: model.to_value(),
                    private: vec![],
                    diagnostics: vec![],
                }
            }
            Err(e) => UpdateResourceResponse {
                new_state: request.prior_state,
                private: vec![],
                diagnostics: vec![error_diagnostic("Error updating user", e)],
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
        let user_id = model.user_id.clone().unwrap_or_default();

        let mut diagnostics = vec![];
        match data
            .client
            .postgresflex()
            .users()
            .delete(&model.project_id, &region, &model.instance_id, &user_id)
            .await
        {
            Ok(()) => tracing::info!(%user_id, "postgres flex user deleted"),
            Err(e) if e.is_not_found() => {}
            Err(e) => diagnostics.push(error_diagnostic("Error deleting user", e)),
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
impl ResourceWithConfigure for PostgresFlexUserResource {
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
impl ResourceWithModifyPlan for PostgresFlexUserResource {
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
impl ResourceWithImportState for PostgresFlexUserResource {
    async fn import_state(&self, _ctx: Context, request: ImportResourceStateRequest) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
        };
        utils::import_composite_id(&request, ID_FIELDS, &mut response);
        if response.diagnostics.is_empty() {
            response.diagnostics.push(Diagnostic::warning(
                "Postgres Flex user imported with empty password and empty uri",
                "The user password and uri are not imported as they are only available upon creation of a new user. The password and uri fields will be empty.",
            ));
        }
        response
    }
}
