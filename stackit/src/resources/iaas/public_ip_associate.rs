//! Public IP association resource
//!
//! Binds an existing public IP to a network interface. Binding is a
//! check-then-act sequence against the API, so concurrent creates for the
//! same address are serialised through the provider wide per-IP lock.

use crate::api::iaas::public_ips::{PublicIp, UpdatePublicIpRequest};
use crate::provider_data::{self, StackitProviderData};
use crate::utils::{self, build_internal_id, error_diagnostic};
use async_trait::async_trait;
use tfplug::context::Context;
use tfplug::plan_modifier::{RequiresReplace, UseStateForUnknown};
use tfplug::resource::*;
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::validator::UuidValidator;
use tfplug::{AttributePath, Diagnostic, Dynamic, DynamicValue};

pub const TYPE_NAME: &str = "stackit_public_ip_associate";
const ID_FIELDS: &[&str] = &["project_id", "region", "public_ip_id", "network_interface_id"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    pub id: Option<String>,
    pub project_id: String,
    pub region: Option<String>,
    pub public_ip_id: String,
    pub network_interface_id: String,
    pub ip: Option<String>,
}

impl Model {
    pub fn from_value(value: &DynamicValue) -> Self {
        let get = |name: &str| value.optional_string(&AttributePath::new(name));
        Self {
            id: get("id"),
            project_id: get("project_id").unwrap_or_default(),
            region: get("region"),
            public_ip_id: get("public_ip_id").unwrap_or_default(),
            network_interface_id: get("network_interface_id").unwrap_or_default(),
            ip: get("ip"),
        }
    }

    pub fn to_value(&self) -> DynamicValue {
        DynamicValue::new(Dynamic::object([
            ("id", self.id.clone().into()),
            ("project_id", self.project_id.clone().into()),
            ("region", self.region.clone().into()),
            ("public_ip_id", self.public_ip_id.clone().into()),
            ("network_interface_id", self.network_interface_id.clone().into()),
            ("ip", self.ip.clone().into()),
        ]))
    }
}

/// Where the address currently points, relative to the configured interface
#[derive(Debug, PartialEq)]
pub enum Binding {
    Unbound,
    Ours,
    Other(String),
}

pub fn binding(public_ip: &PublicIp, network_interface_id: &str) -> Binding {
    match public_ip.network_interface.as_deref() {
        None | Some("") => Binding::Unbound,
        Some(nic) if nic == network_interface_id => Binding::Ours,
        Some(nic) => Binding::Other(nic.to_string()),
    }
}

pub fn map_fields(public_ip: &PublicIp, model: &mut Model, region: &str) -> Result<(), String> {
    let public_ip_id = public_ip
        .id
        .clone()
        .unwrap_or_else(|| model.public_ip_id.clone());
    if public_ip_id.is_empty() {
        return Err("public IP id not present".to_string());
    }

    model.id = Some(build_internal_id(&[
        &model.project_id,
        region,
        &public_ip_id,
        &model.network_interface_id,
    ]));
    model.region = Some(region.to_string());
    model.public_ip_id = public_ip_id;
    model.ip = public_ip.ip.clone();
    Ok(())
}

pub fn schema() -> Schema {
    SchemaBuilder::new()
        .description("Associates an existing public IP to a network interface. Must have a `region` specified in the provider configuration. Should not be used together with a managed public IP that already sets `network_interface_id`.")
        .attribute(
            AttributeBuilder::new("id", AttributeType::String)
                .description("Terraform's internal resource ID. It is structured as \"`project_id`,`region`,`public_ip_id`,`network_interface_id`\".")
                .computed()
                .plan_modifier(UseStateForUnknown)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("project_id", AttributeType::String)
                .description("STACKIT project ID to which the public IP is associated.")
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
            AttributeBuilder::new("public_ip_id", AttributeType::String)
                .description("The public IP ID.")
                .required()
                .validator(UuidValidator)
                .plan_modifier(RequiresReplace)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("network_interface_id", AttributeType::String)
                .description("The ID of the network interface (or virtual IP) to which the public IP should be attached to.")
                .required()
                .validator(UuidValidator)
                .plan_modifier(RequiresReplace)
                .build(),
        )
        .attribute(
            AttributeBuilder::new("ip", AttributeType::String)
                .description("The IP address.")
                .computed()
                .plan_modifier(UseStateForUnknown)
                .build(),
        )
        .build()
}

#[derive(Default)]
pub struct PublicIpAssociateResource {
    provider_data: Option<StackitProviderData>,
}

impl PublicIpAssociateResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self) -> Result<&StackitProviderData, Diagnostic> {
        self.provider_data.as_ref().ok_or_else(super::not_configured)
    }

    async fn associate(&self, data: &StackitProviderData, model: &mut Model, region: &str) -> Result<(), String> {
        let _guard = data.public_ip_locks.lock(&model.public_ip_id).await;
        let api = data.client.iaas().public_ips();

        let current = api
            .get(&model.project_id, region, &model.public_ip_id)
            .await
            .map_err(|e| format!("Reading public IP: {}", e))?;

        let bound = match binding(&current, &model.network_interface_id) {
            Binding::Ours => {
                tracing::debug!(public_ip_id = %model.public_ip_id, "public IP already associated");
                current
            }
            Binding::Other(nic) => {
                return Err(format!(
                    "public IP {} is already associated with network interface {}",
                    model.public_ip_id, nic
                ))
            }
            Binding::Unbound => api
                .update(
                    &model.project_id,
                    region,
                    &model.public_ip_id,
                    &UpdatePublicIpRequest {
                        network_interface: Some(Some(model.network_interface_id.clone())),
                    },
                )
                .await
                .map_err(|e| e.to_string())?,
        };

        map_fields(&bound, model, region)
    }
}

#[async_trait]
impl Resource for PublicIpAssociateResource {
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

        match self.associate(data, &mut model, &region).await {
            Ok(()) => {
                tracing::info!(id = ?model.id, "public IP associated");
                CreateResourceResponse {
                    new_state: model.to_value(),
                    private: vec![],
                    diagnostics: vec![],
                }
            }
            Err(e) => CreateResourceResponse {
                new_state: DynamicValue::null(),
                private: vec![],
                diagnostics: vec![error_diagnostic("Error associating public IP to network interface", e)],
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

        let result = data
            .client
            .iaas()
            .public_ips()
            .get(&model.project_id, &region, &model.public_ip_id)
            .await;

        let (new_state, diagnostics) = match result {
            Ok(public_ip) => match binding(&public_ip, &model.network_interface_id) {
                Binding::Ours => match map_fields(&public_ip, &mut model, &region) {
                    Ok(()) => (Some(model.to_value()), vec![]),
                    Err(e) => (
                        Some(request.current_state),
                        vec![error_diagnostic("Error reading public IP association", e)],
                    ),
                },
                other => {
                    tracing::warn!(
                        public_ip_id = %model.public_ip_id,
                        binding = ?other,
                        "public IP no longer associated with the network interface, removing from state"
                    );
                    (None, vec![])
                }
            },
            Err(e) if e.is_not_found() => {
                tracing::warn!(public_ip_id = %model.public_ip_id, "public IP not found, removing from state");
                (None, vec![])
            }
            Err(e) => (
                Some(request.current_state),
                vec![error_diagnostic("Error reading public IP association", e)],
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
                "Error updating public IP association",
                "A public IP association can't be updated",
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
        let _guard = data.public_ip_locks.lock(&model.public_ip_id).await;
        let api = data.client.iaas().public_ips();

        let result = match api.get(&model.project_id, &region, &model.public_ip_id).await {
            Ok(current) if binding(&current, &model.network_interface_id) == Binding::Ours => api
                .update(
                    &model.project_id,
                    &region,
                    &model.public_ip_id,
                    &UpdatePublicIpRequest {
                        network_interface: Some(None),
                    },
                )
                .await
                .map(|_| ()),
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };

        let mut diagnostics = vec![];
        match result {
            Ok(()) => tracing::info!(public_ip_id = %model.public_ip_id, "public IP disassociated"),
            Err(e) if e.is_not_found() => {}
            Err(e) => diagnostics.push(error_diagnostic(
                "Error deleting association of public IP to network interface",
                e,
            )),
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
impl ResourceWithConfigure for PublicIpAssociateResource {
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
impl ResourceWithModifyPlan for PublicIpAssociateResource {
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
impl ResourceWithImportState for PublicIpAssociateResource {
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
    use mockito::{Matcher, Server};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const IP_PATH: &str = "/v2/projects/pid/regions/eu01/public-ips/ipid";

    fn public_ip(nic: Option<&str>) -> PublicIp {
        PublicIp {
            id: Some("ipid".to_string()),
            ip: Some("192.0.2.10".to_string()),
            network_interface: nic.map(str::to_string),
            labels: None,
        }
    }

    fn model() -> Model {
        Model {
            project_id: "pid".to_string(),
            public_ip_id: "ipid".to_string(),
            network_interface_id: "nic".to_string(),
            ..Default::default()
        }
    }

    fn resource(url: &str) -> PublicIpAssociateResource {
        PublicIpAssociateResource {
            provider_data: Some(StackitProviderData::new(
                create_test_client(url),
                "eu01".to_string(),
                false,
            )),
        }
    }

    fn create_request() -> CreateResourceRequest {
        CreateResourceRequest {
            type_name: TYPE_NAME.to_string(),
            planned_state: model().to_value(),
            config: model().to_value(),
        }
    }

    #[test]
    fn binding_states() {
        assert_eq!(binding(&public_ip(None), "nic"), Binding::Unbound);
        assert_eq!(binding(&public_ip(Some("")), "nic"), Binding::Unbound);
        assert_eq!(binding(&public_ip(Some("nic")), "nic"), Binding::Ours);
        assert_eq!(
            binding(&public_ip(Some("other")), "nic"),
            Binding::Other("other".to_string())
        );
    }

    #[test]
    fn map_fields_builds_four_part_id() {
        let mut model = model();
        map_fields(&public_ip(Some("nic")), &mut model, "eu01").unwrap();
        assert_eq!(model.id.as_deref(), Some("pid,eu01,ipid,nic"));
        assert_eq!(model.ip.as_deref(), Some("192.0.2.10"));
    }

    #[tokio::test]
    async fn create_binds_unbound_ip() {
        let mut server = Server::new_async().await;
        let get = server
            .mock("GET", IP_PATH)
            .with_status(200)
            .with_body(r#"{"id":"ipid","ip":"192.0.2.10","networkInterface":null}"#)
            .create_async()
            .await;
        let patch = server
            .mock("PATCH", IP_PATH)
            .match_body(Matcher::Json(serde_json::json!({"networkInterface": "nic"})))
            .with_status(200)
            .with_body(r#"{"id":"ipid","ip":"192.0.2.10","networkInterface":"nic"}"#)
            .create_async()
            .await;

        let response = resource(&server.url()).create(Context::new(), create_request()).await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        assert_eq!(Model::from_value(&response.new_state).ip.as_deref(), Some("192.0.2.10"));
        get.assert_async().await;
        patch.assert_async().await;
    }

    #[tokio::test]
    async fn create_refuses_ip_bound_elsewhere() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", IP_PATH)
            .with_status(200)
            .with_body(r#"{"id":"ipid","ip":"192.0.2.10","networkInterface":"other"}"#)
            .create_async()
            .await;
        let patch = server.mock("PATCH", IP_PATH).expect(0).create_async().await;

        let response = resource(&server.url()).create(Context::new(), create_request()).await;

        assert_eq!(response.diagnostics.len(), 1);
        assert!(response.diagnostics[0].detail.contains("other"));
        assert!(response.new_state.is_null());
        patch.assert_async().await;
    }

    #[tokio::test]
    async fn concurrent_creates_for_same_ip_bind_once() {
        let mut server = Server::new_async().await;
        let bound = Arc::new(AtomicUsize::new(0));
        let get_state = bound.clone();
        server
            .mock("GET", IP_PATH)
            .with_status(200)
            .with_body_from_request(move |_| {
                if get_state.load(Ordering::SeqCst) > 0 {
                    br#"{"id":"ipid","ip":"192.0.2.10","networkInterface":"nic"}"#.to_vec()
                } else {
                    br#"{"id":"ipid","ip":"192.0.2.10","networkInterface":null}"#.to_vec()
                }
            })
            .expect(2)
            .create_async()
            .await;
        let patch_state = bound.clone();
        let patch = server
            .mock("PATCH", IP_PATH)
            .with_status(200)
            .with_body_from_request(move |_| {
                patch_state.fetch_add(1, Ordering::SeqCst);
                br#"{"id":"ipid","ip":"192.0.2.10","networkInterface":"nic"}"#.to_vec()
            })
            .expect(1)
            .create_async()
            .await;

        let data = resource(&server.url()).provider_data;
        let first = PublicIpAssociateResource { provider_data: data.clone() };
        let second = PublicIpAssociateResource { provider_data: data };

        let (a, b) = tokio::join!(
            first.create(Context::new(), create_request()),
            second.create(Context::new(), create_request())
        );

        assert!(a.diagnostics.is_empty());
        assert!(b.diagnostics.is_empty());
        patch.assert_async().await;
    }

    #[tokio::test]
    async fn read_drops_state_when_bound_elsewhere() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", IP_PATH)
            .with_status(200)
            .with_body(r#"{"id":"ipid","ip":"192.0.2.10","networkInterface":"other"}"#)
            .create_async()
            .await;

        let response = resource(&server.url())
            .read(
                Context::new(),
                ReadResourceRequest {
                    type_name: TYPE_NAME.to_string(),
                    current_state: model().to_value(),
                    private: vec![],
                },
            )
            .await;

        assert!(response.new_state.is_none());
        assert!(response.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn delete_unbinds_with_explicit_null() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", IP_PATH)
            .with_status(200)
            .with_body(r#"{"id":"ipid","ip":"192.0.2.10","networkInterface":"nic"}"#)
            .create_async()
            .await;
        let patch = server
            .mock("PATCH", IP_PATH)
            .match_body(Matcher::Json(serde_json::json!({"networkInterface": null})))
            .with_status(200)
            .with_body(r#"{"id":"ipid","ip":"192.0.2.10","networkInterface":null}"#)
            .create_async()
            .await;

        let response = resource(&server.url())
            .delete(
                Context::new(),
                DeleteResourceRequest {
                    type_name: TYPE_NAME.to_string(),
                    prior_state: model().to_value(),
                    planned_private: vec![],
                },
            )
            .await;

        assert!(response.diagnostics.is_empty());
        patch.assert_async().await;
    }
}
