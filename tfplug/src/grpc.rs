//! gRPC service implementation of the Terraform Plugin Protocol v6
//!
//! Resources and data sources are created on demand from the provider's
//! factories and configured with the provider data for every RPC, so the
//! only shared mutable state is the provider itself and its data.
//!
//! Planning is done here, in this order: computed attributes without
//! configuration become unknown, defaults are applied, attribute plan
//! modifiers run, and finally the resource's own modify_plan.

use crate::context::Context;
use crate::data_source::{
    ConfigureDataSourceRequest, DataSourceSchemaRequest, DataSourceWithConfigure,
    ReadDataSourceRequest, ValidateDataSourceConfigRequest,
};
use crate::proto;
use crate::provider::{
    ConfigureProviderRequest, DataSourceFactory, Provider, ProviderSchemaRequest,
    ResourceFactory, ValidateProviderConfigRequest,
};
use crate::resource::{
    ConfigureResourceRequest, CreateResourceRequest, DeleteResourceRequest,
    ImportResourceStateRequest, ModifyPlanRequest, ReadResourceRequest, ResourceSchemaRequest,
    ResourceWithConfigure, UpdateResourceRequest, ValidateResourceConfigRequest,
};
use crate::schema::{
    Attribute, DefaultRequest, ObjectNestingMode, PlanModifierRequest, Schema, StringKind,
};
use crate::types::{
    AttributePath, AttributePathStep, Diagnostic, DiagnosticSeverity, Diagnostics, Dynamic,
    DynamicValue,
};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tonic::{Request, Response, Status};

type RpcResult<T> = std::result::Result<Response<T>, Status>;

/// The tonic service wrapping a Provider
pub struct GrpcProviderServer<P: Provider> {
    provider: RwLock<P>,
    provider_data: RwLock<Option<Arc<dyn Any + Send + Sync>>>,
    resources: HashMap<String, ResourceFactory>,
    data_sources: HashMap<String, DataSourceFactory>,
    ctx: Context,
}

impl<P: Provider + 'static> GrpcProviderServer<P> {
    pub fn new(provider: P) -> Self {
        let resources = provider.resources();
        let data_sources = provider.data_sources();

        Self {
            provider: RwLock::new(provider),
            provider_data: RwLock::new(None),
            resources,
            data_sources,
            ctx: Context::new(),
        }
    }

    /// Root context handed to every handler, cancelled by StopProvider
    pub fn context(&self) -> Context {
        self.ctx.clone()
    }

    fn resource_factory(
        &self,
        type_name: &str,
    ) -> std::result::Result<&ResourceFactory, Vec<Diagnostic>> {
        self.resources.get(type_name).ok_or_else(|| {
            vec![Diagnostic::error(
                "Unknown resource type",
                format!(
                    "The provider does not support resource type '{}'",
                    type_name
                ),
            )]
        })
    }

    async fn configured_resource(
        &self,
        type_name: &str,
    ) -> std::result::Result<Box<dyn ResourceWithConfigure>, Vec<Diagnostic>> {
        let factory = self.resource_factory(type_name)?;
        let mut resource = factory();

        let provider_data = self.provider_data.read().await.clone();
        let response = resource
            .configure(self.context(), ConfigureResourceRequest { provider_data })
            .await;
        if response.diagnostics.has_errors() {
            return Err(response.diagnostics);
        }

        Ok(resource)
    }

    async fn configured_data_source(
        &self,
        type_name: &str,
    ) -> std::result::Result<Box<dyn DataSourceWithConfigure>, Vec<Diagnostic>> {
        let factory = self.data_sources.get(type_name).ok_or_else(|| {
            vec![Diagnostic::error(
                "Unknown data source type",
                format!(
                    "The provider does not support data source type '{}'",
                    type_name
                ),
            )]
        })?;
        let mut data_source = factory();

        let provider_data = self.provider_data.read().await.clone();
        let response = data_source
            .configure(self.context(), ConfigureDataSourceRequest { provider_data })
            .await;
        if response.diagnostics.has_errors() {
            return Err(response.diagnostics);
        }

        Ok(data_source)
    }

    async fn resource_schema(&self, resource: &dyn ResourceWithConfigure) -> Schema {
        resource
            .schema(self.context(), ResourceSchemaRequest)
            .await
            .schema
    }

    async fn plan(
        &self,
        resource: &dyn ResourceWithConfigure,
        type_name: &str,
        prior: DynamicValue,
        proposed: DynamicValue,
        config: DynamicValue,
    ) -> (DynamicValue, Vec<AttributePath>, Vec<Diagnostic>) {
        let schema = self.resource_schema(resource).await;
        let prior = schema.normalize(prior);
        let config = schema.normalize(config);
        let mut planned = schema.normalize(proposed);
        let mut requires_replace = Vec::new();
        let mut diagnostics = Vec::new();

        if prior.is_null() || planned != prior {
            schema.mark_computed_unknown(&config, &mut planned);
        }

        for attr in &schema.block.attributes {
            let path = AttributePath::new(&attr.name);
            let config_value = attribute_value(&config, &attr.name);

            if let (Some(default), true) = (&attr.default, config_value.is_null()) {
                let response = default.default_value(DefaultRequest { path: path.clone() });
                if let Err(e) = planned.set(&path, response.value) {
                    diagnostics.add_error(
                        "Failed to apply default value",
                        format!("Attribute '{}': {}", attr.name, e),
                    );
                }
            }

            for modifier in &attr.plan_modifiers {
                let response = modifier.modify(PlanModifierRequest {
                    config_value: config_value.clone(),
                    state_value: attribute_value(&prior, &attr.name),
                    plan_value: attribute_value(&planned, &attr.name),
                    path: path.clone(),
                });
                diagnostics.extend(response.diagnostics);
                if response.requires_replace && !requires_replace.contains(&path) {
                    requires_replace.push(path.clone());
                }
                if let Err(e) = planned.set(&path, response.plan_value) {
                    diagnostics.add_error(
                        "Failed to apply plan modifier",
                        format!("Attribute '{}': {}", attr.name, e),
                    );
                }
            }
        }

        if let Some(modifier) = resource.as_modify_plan() {
            let response = modifier
                .modify_plan(
                    self.context(),
                    ModifyPlanRequest {
                        type_name: type_name.to_string(),
                        config,
                        prior_state: prior,
                        planned_state: planned,
                    },
                )
                .await;
            planned = schema.normalize(response.planned_state);
            diagnostics.extend(response.diagnostics);
            for path in response.requires_replace {
                if !requires_replace.contains(&path) {
                    requires_replace.push(path);
                }
            }
        }

        (planned, requires_replace, diagnostics)
    }
}

#[tonic::async_trait]
impl<P: Provider + 'static> proto::ProviderService for GrpcProviderServer<P> {
    async fn get_metadata(
        &self,
        _request: Request<proto::get_metadata::Request>,
    ) -> RpcResult<proto::get_metadata::Response> {
        tracing::debug!("GetMetadata");

        Ok(Response::new(proto::get_metadata::Response {
            server_capabilities: Some(server_capabilities()),
            diagnostics: vec![],
            data_sources: self
                .data_sources
                .keys()
                .map(|name| proto::get_metadata::DataSourceMetadata {
                    type_name: name.clone(),
                })
                .collect(),
            resources: self
                .resources
                .keys()
                .map(|name| proto::get_metadata::ResourceMetadata {
                    type_name: name.clone(),
                })
                .collect(),
        }))
    }

    async fn get_provider_schema(
        &self,
        _request: Request<proto::get_provider_schema::Request>,
    ) -> RpcResult<proto::get_provider_schema::Response> {
        tracing::debug!("GetProviderSchema");

        let mut diagnostics = Vec::new();

        let provider_schema = {
            let provider = self.provider.read().await;
            let response = provider
                .schema(self.context(), ProviderSchemaRequest)
                .await;
            diagnostics.extend(response.diagnostics);
            schema_to_proto(&response.schema)
        };

        let mut resource_schemas = HashMap::new();
        for (name, factory) in &self.resources {
            let resource = factory();
            let response = resource
                .schema(self.context(), ResourceSchemaRequest)
                .await;
            diagnostics.extend(response.diagnostics);
            resource_schemas.insert(name.clone(), schema_to_proto(&response.schema));
        }

        let mut data_source_schemas = HashMap::new();
        for (name, factory) in &self.data_sources {
            let data_source = factory();
            let response = data_source
                .schema(self.context(), DataSourceSchemaRequest)
                .await;
            diagnostics.extend(response.diagnostics);
            data_source_schemas.insert(name.clone(), schema_to_proto(&response.schema));
        }

        Ok(Response::new(proto::get_provider_schema::Response {
            provider: Some(provider_schema),
            resource_schemas,
            data_source_schemas,
            diagnostics: diagnostics_to_proto(diagnostics),
            provider_meta: None,
            server_capabilities: Some(server_capabilities()),
        }))
    }

    async fn validate_provider_config(
        &self,
        request: Request<proto::validate_provider_config::Request>,
    ) -> RpcResult<proto::validate_provider_config::Response> {
        let req = request.into_inner();
        tracing::debug!("ValidateProviderConfig");

        let provider = self.provider.read().await;
        let schema = provider
            .schema(self.context(), ProviderSchemaRequest)
            .await
            .schema;
        let config = schema.normalize(decode_value(req.config)?);

        let mut diagnostics = schema.validate(&config);
        let response = provider
            .validate(self.context(), ValidateProviderConfigRequest { config })
            .await;
        diagnostics.extend(response.diagnostics);

        Ok(Response::new(proto::validate_provider_config::Response {
            diagnostics: diagnostics_to_proto(diagnostics),
        }))
    }

    async fn validate_resource_config(
        &self,
        request: Request<proto::validate_resource_config::Request>,
    ) -> RpcResult<proto::validate_resource_config::Response> {
        let req = request.into_inner();
        tracing::debug!(type_name = %req.type_name, "ValidateResourceConfig");

        let resource = match self.resource_factory(&req.type_name) {
            Ok(factory) => factory(),
            Err(diagnostics) => {
                return Ok(Response::new(proto::validate_resource_config::Response {
                    diagnostics: diagnostics_to_proto(diagnostics),
                }))
            }
        };

        let schema = self.resource_schema(resource.as_ref()).await;
        let config = schema.normalize(decode_value(req.config)?);

        let mut diagnostics = schema.validate(&config);
        let response = resource
            .validate(
                self.context(),
                ValidateResourceConfigRequest {
                    type_name: req.type_name,
                    config,
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);

        Ok(Response::new(proto::validate_resource_config::Response {
            diagnostics: diagnostics_to_proto(diagnostics),
        }))
    }

    async fn validate_data_resource_config(
        &self,
        request: Request<proto::validate_data_resource_config::Request>,
    ) -> RpcResult<proto::validate_data_resource_config::Response> {
        let req = request.into_inner();
        tracing::debug!(type_name = %req.type_name, "ValidateDataResourceConfig");

        let Some(factory) = self.data_sources.get(&req.type_name) else {
            return Ok(Response::new(
                proto::validate_data_resource_config::Response {
                    diagnostics: diagnostics_to_proto(vec![Diagnostic::error(
                        "Unknown data source type",
                        format!(
                            "The provider does not support data source type '{}'",
                            req.type_name
                        ),
                    )]),
                },
            ));
        };
        let data_source = factory();

        let schema = data_source
            .schema(self.context(), DataSourceSchemaRequest)
            .await
            .schema;
        let config = schema.normalize(decode_value(req.config)?);

        let mut diagnostics = schema.validate(&config);
        let response = data_source
            .validate(
                self.context(),
                ValidateDataSourceConfigRequest {
                    type_name: req.type_name,
                    config,
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);

        Ok(Response::new(
            proto::validate_data_resource_config::Response {
                diagnostics: diagnostics_to_proto(diagnostics),
            },
        ))
    }

    async fn upgrade_resource_state(
        &self,
        request: Request<proto::upgrade_resource_state::Request>,
    ) -> RpcResult<proto::upgrade_resource_state::Response> {
        let req = request.into_inner();
        tracing::debug!(type_name = %req.type_name, version = req.version, "UpgradeResourceState");

        let resource = match self.resource_factory(&req.type_name) {
            Ok(factory) => factory(),
            Err(diagnostics) => {
                return Ok(Response::new(proto::upgrade_resource_state::Response {
                    upgraded_state: None,
                    diagnostics: diagnostics_to_proto(diagnostics),
                }))
            }
        };
        let schema = self.resource_schema(resource.as_ref()).await;

        if req.version > schema.version {
            return Ok(Response::new(proto::upgrade_resource_state::Response {
                upgraded_state: None,
                diagnostics: diagnostics_to_proto(vec![Diagnostic::error(
                    "Unsupported state version",
                    format!(
                        "State version {} of '{}' is newer than the provider's schema version {}",
                        req.version, req.type_name, schema.version
                    ),
                )]),
            }));
        }

        let state = match req.raw_state {
            Some(raw) if !raw.json.is_empty() => DynamicValue::decode_json(&raw.json)?,
            _ => DynamicValue::null(),
        };
        let upgraded = schema.normalize(state);

        Ok(Response::new(proto::upgrade_resource_state::Response {
            upgraded_state: Some(encode_value(&upgraded)?),
            diagnostics: vec![],
        }))
    }

    async fn get_resource_identity_schemas(
        &self,
        _request: Request<proto::get_resource_identity_schemas::Request>,
    ) -> RpcResult<proto::get_resource_identity_schemas::Response> {
        Ok(Response::new(
            proto::get_resource_identity_schemas::Response::default(),
        ))
    }

    async fn configure_provider(
        &self,
        request: Request<proto::configure_provider::Request>,
    ) -> RpcResult<proto::configure_provider::Response> {
        let req = request.into_inner();
        tracing::info!(terraform_version = %req.terraform_version, "ConfigureProvider");

        let mut provider = self.provider.write().await;
        let schema = provider
            .schema(self.context(), ProviderSchemaRequest)
            .await
            .schema;
        let config = schema.normalize(decode_value(req.config)?);

        let response = provider
            .configure(
                self.context(),
                ConfigureProviderRequest {
                    terraform_version: req.terraform_version,
                    config,
                },
            )
            .await;

        if !response.diagnostics.has_errors() {
            *self.provider_data.write().await = response.provider_data;
        }

        Ok(Response::new(proto::configure_provider::Response {
            diagnostics: diagnostics_to_proto(response.diagnostics),
        }))
    }

    async fn read_resource(
        &self,
        request: Request<proto::read_resource::Request>,
    ) -> RpcResult<proto::read_resource::Response> {
        let req = request.into_inner();
        tracing::debug!(type_name = %req.type_name, "ReadResource");

        let current_state = decode_value(req.current_state)?;

        let resource = match self.configured_resource(&req.type_name).await {
            Ok(resource) => resource,
            Err(diagnostics) => {
                return Ok(Response::new(proto::read_resource::Response {
                    new_state: Some(encode_value(&current_state)?),
                    diagnostics: diagnostics_to_proto(diagnostics),
                    private: req.private,
                    ..Default::default()
                }))
            }
        };
        let schema = self.resource_schema(resource.as_ref()).await;
        let current_state = schema.normalize(current_state);

        let response = resource
            .read(
                self.context(),
                ReadResourceRequest {
                    type_name: req.type_name.clone(),
                    current_state: current_state.clone(),
                    private: req.private,
                },
            )
            .await;

        let new_state = match response.new_state {
            Some(state) => normalize_final(&schema, state),
            None if response.diagnostics.has_errors() => current_state,
            None => {
                tracing::info!(type_name = %req.type_name, "resource no longer exists, removing from state");
                DynamicValue::null()
            }
        };

        Ok(Response::new(proto::read_resource::Response {
            new_state: Some(encode_value(&new_state)?),
            diagnostics: diagnostics_to_proto(response.diagnostics),
            private: response.private,
            ..Default::default()
        }))
    }

    async fn plan_resource_change(
        &self,
        request: Request<proto::plan_resource_change::Request>,
    ) -> RpcResult<proto::plan_resource_change::Response> {
        let req = request.into_inner();
        tracing::debug!(type_name = %req.type_name, "PlanResourceChange");

        let prior = decode_value(req.prior_state)?;
        let proposed = decode_value(req.proposed_new_state)?;
        let config = decode_value(req.config)?;

        // Destroy plans pass through untouched
        if proposed.is_null() {
            return Ok(Response::new(proto::plan_resource_change::Response {
                planned_state: Some(encode_value(&proposed)?),
                planned_private: req.prior_private,
                ..Default::default()
            }));
        }

        let resource = match self.configured_resource(&req.type_name).await {
            Ok(resource) => resource,
            Err(diagnostics) => {
                return Ok(Response::new(proto::plan_resource_change::Response {
                    planned_state: Some(encode_value(&proposed)?),
                    diagnostics: diagnostics_to_proto(diagnostics),
                    ..Default::default()
                }))
            }
        };

        let (planned, requires_replace, diagnostics) = self
            .plan(resource.as_ref(), &req.type_name, prior, proposed, config)
            .await;

        Ok(Response::new(proto::plan_resource_change::Response {
            planned_state: Some(encode_value(&planned)?),
            requires_replace: requires_replace.iter().map(path_to_proto).collect(),
            planned_private: req.prior_private,
            diagnostics: diagnostics_to_proto(diagnostics),
            ..Default::default()
        }))
    }

    async fn apply_resource_change(
        &self,
        request: Request<proto::apply_resource_change::Request>,
    ) -> RpcResult<proto::apply_resource_change::Response> {
        let req = request.into_inner();
        tracing::debug!(type_name = %req.type_name, "ApplyResourceChange");

        let prior = decode_value(req.prior_state)?;
        let planned = decode_value(req.planned_state)?;
        let config = decode_value(req.config)?;

        let resource = match self.configured_resource(&req.type_name).await {
            Ok(resource) => resource,
            Err(diagnostics) => {
                return Ok(Response::new(proto::apply_resource_change::Response {
                    new_state: Some(encode_value(&prior)?),
                    diagnostics: diagnostics_to_proto(diagnostics),
                    ..Default::default()
                }))
            }
        };
        let schema = self.resource_schema(resource.as_ref()).await;
        let prior = schema.normalize(prior);
        let planned = schema.normalize(planned);
        let config = schema.normalize(config);

        let (new_state, private, diagnostics) = if planned.is_null() {
            tracing::info!(type_name = %req.type_name, "deleting resource");
            let response = resource
                .delete(
                    self.context(),
                    DeleteResourceRequest {
                        type_name: req.type_name.clone(),
                        prior_state: prior.clone(),
                        planned_private: req.planned_private.clone(),
                    },
                )
                .await;
            let new_state = if response.diagnostics.has_errors() {
                prior
            } else {
                DynamicValue::null()
            };
            (new_state, req.planned_private, response.diagnostics)
        } else if prior.is_null() {
            tracing::info!(type_name = %req.type_name, "creating resource");
            let response = resource
                .create(
                    self.context(),
                    CreateResourceRequest {
                        type_name: req.type_name.clone(),
                        planned_state: planned,
                        config,
                    },
                )
                .await;
            (
                normalize_final(&schema, response.new_state),
                response.private,
                response.diagnostics,
            )
        } else {
            tracing::info!(type_name = %req.type_name, "updating resource");
            let response = resource
                .update(
                    self.context(),
                    UpdateResourceRequest {
                        type_name: req.type_name.clone(),
                        prior_state: prior,
                        planned_state: planned,
                        config,
                        planned_private: req.planned_private,
                    },
                )
                .await;
            (
                normalize_final(&schema, response.new_state),
                response.private,
                response.diagnostics,
            )
        };

        if diagnostics.has_errors() {
            tracing::warn!(type_name = %req.type_name, "apply finished with errors");
        }

        Ok(Response::new(proto::apply_resource_change::Response {
            new_state: Some(encode_value(&new_state)?),
            private,
            diagnostics: diagnostics_to_proto(diagnostics),
            ..Default::default()
        }))
    }

    async fn import_resource_state(
        &self,
        request: Request<proto::import_resource_state::Request>,
    ) -> RpcResult<proto::import_resource_state::Response> {
        let req = request.into_inner();
        tracing::info!(type_name = %req.type_name, id = %req.id, "ImportResourceState");

        let resource = match self.configured_resource(&req.type_name).await {
            Ok(resource) => resource,
            Err(diagnostics) => {
                return Ok(Response::new(proto::import_resource_state::Response {
                    diagnostics: diagnostics_to_proto(diagnostics),
                    ..Default::default()
                }))
            }
        };

        let Some(importer) = resource.as_import_state() else {
            return Ok(Response::new(proto::import_resource_state::Response {
                diagnostics: diagnostics_to_proto(vec![Diagnostic::error(
                    "Resource Import Not Implemented",
                    format!(
                        "Resource type '{}' does not support import",
                        req.type_name
                    ),
                )]),
                ..Default::default()
            }));
        };

        let schema = self.resource_schema(resource.as_ref()).await;
        let response = importer
            .import_state(
                self.context(),
                ImportResourceStateRequest {
                    type_name: req.type_name,
                    id: req.id,
                },
            )
            .await;

        let mut imported_resources = Vec::with_capacity(response.imported_resources.len());
        for imported in response.imported_resources {
            let state = normalize_final(&schema, imported.state);
            imported_resources.push(proto::import_resource_state::ImportedResource {
                type_name: imported.type_name,
                state: Some(encode_value(&state)?),
                private: imported.private,
                identity: None,
            });
        }

        Ok(Response::new(proto::import_resource_state::Response {
            imported_resources,
            diagnostics: diagnostics_to_proto(response.diagnostics),
            deferred: None,
        }))
    }

    async fn read_data_source(
        &self,
        request: Request<proto::read_data_source::Request>,
    ) -> RpcResult<proto::read_data_source::Response> {
        let req = request.into_inner();
        tracing::debug!(type_name = %req.type_name, "ReadDataSource");

        let config = decode_value(req.config)?;

        let data_source = match self.configured_data_source(&req.type_name).await {
            Ok(data_source) => data_source,
            Err(diagnostics) => {
                return Ok(Response::new(proto::read_data_source::Response {
                    state: Some(encode_value(&config)?),
                    diagnostics: diagnostics_to_proto(diagnostics),
                    deferred: None,
                }))
            }
        };
        let schema = data_source
            .schema(self.context(), DataSourceSchemaRequest)
            .await
            .schema;
        let config = schema.normalize(config);

        let response = data_source
            .read(
                self.context(),
                ReadDataSourceRequest {
                    type_name: req.type_name,
                    config,
                },
            )
            .await;
        let state = normalize_final(&schema, response.state);

        Ok(Response::new(proto::read_data_source::Response {
            state: Some(encode_value(&state)?),
            diagnostics: diagnostics_to_proto(response.diagnostics),
            deferred: None,
        }))
    }

    async fn stop_provider(
        &self,
        _request: Request<proto::stop_provider::Request>,
    ) -> RpcResult<proto::stop_provider::Response> {
        tracing::info!("StopProvider received, cancelling in-flight operations");
        self.ctx.cancel();

        Ok(Response::new(proto::stop_provider::Response {
            error: String::new(),
        }))
    }
}

fn server_capabilities() -> proto::ServerCapabilities {
    proto::ServerCapabilities {
        plan_destroy: true,
        get_provider_schema_optional: false,
        move_resource_state: false,
    }
}

fn attribute_value(value: &DynamicValue, name: &str) -> Dynamic {
    value
        .get(&AttributePath::new(name))
        .cloned()
        .unwrap_or(Dynamic::Null)
}

/// Shapes a value returned by a resource or data source for Terraform:
/// schema-conformant and free of unknowns
fn normalize_final(schema: &Schema, value: DynamicValue) -> DynamicValue {
    let normalized = schema.normalize(value);
    DynamicValue::new(normalized.value.unknowns_to_null())
}

fn decode_value(value: Option<proto::DynamicValue>) -> crate::Result<DynamicValue> {
    match value {
        Some(v) if !v.msgpack.is_empty() => DynamicValue::decode_msgpack(&v.msgpack),
        Some(v) if !v.json.is_empty() => DynamicValue::decode_json(&v.json),
        _ => Ok(DynamicValue::null()),
    }
}

fn encode_value(value: &DynamicValue) -> crate::Result<proto::DynamicValue> {
    Ok(proto::DynamicValue {
        msgpack: value.encode_msgpack()?,
        json: vec![],
    })
}

fn schema_to_proto(schema: &Schema) -> proto::Schema {
    proto::Schema {
        version: schema.version,
        block: Some(proto::schema::Block {
            version: schema.block.version,
            attributes: schema
                .block
                .attributes
                .iter()
                .map(attribute_to_proto)
                .collect(),
            block_types: vec![],
            description: schema.block.description.clone(),
            description_kind: string_kind_to_proto(schema.block.description_kind) as i32,
            deprecated: schema.block.deprecated,
        }),
    }
}

fn attribute_to_proto(attr: &Attribute) -> proto::schema::Attribute {
    let (r#type, nested_type) = match &attr.nested_type {
        Some(nested) => (
            vec![],
            Some(proto::schema::Object {
                attributes: nested.attributes.iter().map(attribute_to_proto).collect(),
                nesting: nesting_to_proto(nested.nesting) as i32,
            }),
        ),
        None => (attr.r#type.to_json_bytes(), None),
    };

    proto::schema::Attribute {
        name: attr.name.clone(),
        r#type,
        nested_type,
        description: attr.description.clone(),
        required: attr.required,
        optional: attr.optional,
        computed: attr.computed,
        sensitive: attr.sensitive,
        description_kind: proto::StringKind::Plain as i32,
        deprecated: attr.deprecated,
        write_only: false,
    }
}

fn nesting_to_proto(nesting: ObjectNestingMode) -> proto::schema::object::NestingMode {
    match nesting {
        ObjectNestingMode::Single => proto::schema::object::NestingMode::Single,
        ObjectNestingMode::List => proto::schema::object::NestingMode::List,
        ObjectNestingMode::Set => proto::schema::object::NestingMode::Set,
        ObjectNestingMode::Map => proto::schema::object::NestingMode::Map,
    }
}

fn string_kind_to_proto(kind: StringKind) -> proto::StringKind {
    match kind {
        StringKind::Plain => proto::StringKind::Plain,
        StringKind::Markdown => proto::StringKind::Markdown,
    }
}

fn diagnostics_to_proto(diagnostics: Vec<Diagnostic>) -> Vec<proto::Diagnostic> {
    diagnostics
        .into_iter()
        .map(|d| proto::Diagnostic {
            severity: match d.severity {
                DiagnosticSeverity::Invalid => proto::diagnostic::Severity::Invalid,
                DiagnosticSeverity::Error => proto::diagnostic::Severity::Error,
                DiagnosticSeverity::Warning => proto::diagnostic::Severity::Warning,
            } as i32,
            summary: d.summary,
            detail: d.detail,
            attribute: d.attribute.as_ref().map(path_to_proto),
        })
        .collect()
}

fn path_to_proto(path: &AttributePath) -> proto::AttributePath {
    use proto::attribute_path::step::Selector;

    proto::AttributePath {
        steps: path
            .steps
            .iter()
            .map(|step| proto::attribute_path::Step {
                selector: Some(match step {
                    AttributePathStep::AttributeName(name) => Selector::AttributeName(name.clone()),
                    AttributePathStep::ElementKeyString(key) => {
                        Selector::ElementKeyString(key.clone())
                    }
                    AttributePathStep::ElementKeyInt(idx) => Selector::ElementKeyInt(*idx),
                }),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::{
        ConfigureDataSourceResponse, DataSource, DataSourceSchemaResponse, ReadDataSourceResponse,
    };
    use crate::defaults::StaticDefault;
    use crate::plan_modifier::{RequiresReplace, UseStateForUnknown};
    use crate::proto::ProviderService;
    use crate::provider::{
        ConfigureProviderResponse, ProviderSchemaResponse,
    };
    use crate::resource::{
        ConfigureResourceResponse, CreateResourceResponse, DeleteResourceResponse,
        ImportResourceStateResponse, ReadResourceResponse, Resource, ResourceSchemaResponse,
        ResourceWithImportState, UpdateResourceResponse,
    };
    use crate::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
    use async_trait::async_trait;

    struct TestProvider;

    #[async_trait]
    impl Provider for TestProvider {
        fn type_name(&self) -> &str {
            "test"
        }

        async fn schema(
            &self,
            _ctx: Context,
            _request: ProviderSchemaRequest,
        ) -> ProviderSchemaResponse {
            ProviderSchemaResponse {
                schema: SchemaBuilder::new()
                    .attribute(
                        AttributeBuilder::new("token", AttributeType::String)
                            .optional()
                            .sensitive()
                            .build(),
                    )
                    .build(),
                diagnostics: vec![],
            }
        }

        async fn configure(
            &mut self,
            _ctx: Context,
            request: ConfigureProviderRequest,
        ) -> ConfigureProviderResponse {
            let token = request
                .config
                .optional_string(&AttributePath::new("token"))
                .unwrap_or_default();
            ConfigureProviderResponse {
                diagnostics: vec![],
                provider_data: Some(Arc::new(token)),
            }
        }

        fn resources(&self) -> HashMap<String, ResourceFactory> {
            let mut resources: HashMap<String, ResourceFactory> = HashMap::new();
            resources.insert("test_widget".to_string(), || Box::new(TestResource::default()));
            resources
        }

        fn data_sources(&self) -> HashMap<String, DataSourceFactory> {
            let mut data_sources: HashMap<String, DataSourceFactory> = HashMap::new();
            data_sources.insert("test_lookup".to_string(), || Box::new(TestDataSource));
            data_sources
        }
    }

    #[derive(Default)]
    struct TestResource {
        token: Option<String>,
    }

    #[async_trait]
    impl Resource for TestResource {
        fn type_name(&self) -> &str {
            "test_widget"
        }

        async fn schema(
            &self,
            _ctx: Context,
            _request: ResourceSchemaRequest,
        ) -> ResourceSchemaResponse {
            ResourceSchemaResponse {
                schema: SchemaBuilder::new()
                    .attribute(
                        AttributeBuilder::new("id", AttributeType::String)
                            .computed()
                            .plan_modifier(UseStateForUnknown)
                            .build(),
                    )
                    .attribute(
                        AttributeBuilder::new("name", AttributeType::String)
                            .required()
                            .plan_modifier(RequiresReplace)
                            .build(),
                    )
                    .attribute(
                        AttributeBuilder::new("size", AttributeType::Number)
                            .optional()
                            .computed()
                            .default(StaticDefault::number(1.0))
                            .build(),
                    )
                    .attribute(
                        AttributeBuilder::new("status", AttributeType::String)
                            .computed()
                            .build(),
                    )
                    .build(),
                diagnostics: vec![],
            }
        }

        async fn create(
            &self,
            _ctx: Context,
            request: CreateResourceRequest,
        ) -> CreateResourceResponse {
            let mut state = request.planned_state;
            state
                .set_string(&AttributePath::new("id"), "widget-1".to_string())
                .unwrap();
            // status deliberately left unknown, the framework must null it
            CreateResourceResponse {
                new_state: state,
                private: vec![],
                diagnostics: vec![],
            }
        }

        async fn read(&self, _ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
            let gone = request
                .current_state
                .optional_string(&AttributePath::new("id"))
                .as_deref()
                == Some("gone");
            ReadResourceResponse {
                new_state: if gone {
                    None
                } else {
                    Some(request.current_state)
                },
                diagnostics: vec![],
                private: request.private,
            }
        }

        async fn update(
            &self,
            _ctx: Context,
            request: UpdateResourceRequest,
        ) -> UpdateResourceResponse {
            UpdateResourceResponse {
                new_state: request.planned_state,
                private: vec![],
                diagnostics: vec![],
            }
        }

        async fn delete(
            &self,
            _ctx: Context,
            request: DeleteResourceRequest,
        ) -> DeleteResourceResponse {
            let mut diagnostics = vec![];
            if request
                .prior_state
                .optional_string(&AttributePath::new("name"))
                .as_deref()
                == Some("undeletable")
            {
                diagnostics.add_error("Error deleting widget", "refused");
            }
            DeleteResourceResponse { diagnostics }
        }

        fn as_import_state(&self) -> Option<&dyn ResourceWithImportState> {
            Some(self)
        }
    }

    #[async_trait]
    impl ResourceWithConfigure for TestResource {
        async fn configure(
            &mut self,
            _ctx: Context,
            request: ConfigureResourceRequest,
        ) -> ConfigureResourceResponse {
            self.token = request
                .provider_data
                .and_then(|data| data.downcast_ref::<String>().cloned());
            ConfigureResourceResponse {
                diagnostics: vec![],
            }
        }
    }

    #[async_trait]
    impl ResourceWithImportState for TestResource {
        async fn import_state(
            &self,
            ctx: Context,
            request: ImportResourceStateRequest,
        ) -> ImportResourceStateResponse {
            let mut response = ImportResourceStateResponse {
                imported_resources: vec![],
                diagnostics: vec![],
            };
            crate::import::import_state_passthrough_id(
                &ctx,
                AttributePath::new("id"),
                &request,
                &mut response,
            );
            response
        }
    }

    struct TestDataSource;

    #[async_trait]
    impl DataSource for TestDataSource {
        fn type_name(&self) -> &str {
            "test_lookup"
        }

        async fn schema(
            &self,
            _ctx: Context,
            _request: DataSourceSchemaRequest,
        ) -> DataSourceSchemaResponse {
            DataSourceSchemaResponse {
                schema: SchemaBuilder::new()
                    .attribute(
                        AttributeBuilder::new("name", AttributeType::String)
                            .required()
                            .build(),
                    )
                    .attribute(
                        AttributeBuilder::new("value", AttributeType::String)
                            .computed()
                            .build(),
                    )
                    .build(),
                diagnostics: vec![],
            }
        }

        async fn read(
            &self,
            _ctx: Context,
            request: ReadDataSourceRequest,
        ) -> ReadDataSourceResponse {
            let mut state = request.config;
            state
                .set_string(&AttributePath::new("value"), "found".to_string())
                .unwrap();
            ReadDataSourceResponse {
                state,
                diagnostics: vec![],
            }
        }
    }

    #[async_trait]
    impl DataSourceWithConfigure for TestDataSource {
        async fn configure(
            &mut self,
            _ctx: Context,
            _request: ConfigureDataSourceRequest,
        ) -> ConfigureDataSourceResponse {
            ConfigureDataSourceResponse {
                diagnostics: vec![],
            }
        }
    }

    fn server() -> GrpcProviderServer<TestProvider> {
        GrpcProviderServer::new(TestProvider)
    }

    fn widget(id: Dynamic, name: &str, size: Dynamic, status: Dynamic) -> DynamicValue {
        DynamicValue::new(Dynamic::Map(HashMap::from([
            ("id".to_string(), id),
            ("name".to_string(), Dynamic::from(name)),
            ("size".to_string(), size),
            ("status".to_string(), status),
        ])))
    }

    fn config(name: &str) -> DynamicValue {
        widget(Dynamic::Null, name, Dynamic::Null, Dynamic::Null)
    }

    fn wire(value: &DynamicValue) -> Option<proto::DynamicValue> {
        Some(encode_value(value).unwrap())
    }

    fn unwire(value: Option<proto::DynamicValue>) -> DynamicValue {
        decode_value(value).unwrap()
    }

    #[tokio::test]
    async fn plan_create_marks_computed_unknown_and_applies_defaults() {
        let response = server()
            .plan_resource_change(Request::new(proto::plan_resource_change::Request {
                type_name: "test_widget".to_string(),
                prior_state: wire(&DynamicValue::null()),
                proposed_new_state: wire(&config("a")),
                config: wire(&config("a")),
                ..Default::default()
            }))
            .await
            .unwrap()
            .into_inner();

        let planned = unwire(response.planned_state);
        assert!(planned.get(&AttributePath::new("id")).unwrap().is_unknown());
        assert!(planned.get(&AttributePath::new("status")).unwrap().is_unknown());
        assert_eq!(planned.get_number(&AttributePath::new("size")).unwrap(), 1.0);
        assert!(response.requires_replace.is_empty());
        assert!(response.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn plan_without_changes_is_a_no_op() {
        let prior = widget(
            Dynamic::from("widget-1"),
            "a",
            Dynamic::Number(1.0),
            Dynamic::from("ready"),
        );

        let response = server()
            .plan_resource_change(Request::new(proto::plan_resource_change::Request {
                type_name: "test_widget".to_string(),
                prior_state: wire(&prior),
                proposed_new_state: wire(&prior),
                config: wire(&config("a")),
                ..Default::default()
            }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(unwire(response.planned_state), prior);
        assert!(response.requires_replace.is_empty());
    }

    #[tokio::test]
    async fn plan_change_of_replace_attribute_requires_replace() {
        let prior = widget(
            Dynamic::from("widget-1"),
            "a",
            Dynamic::Number(1.0),
            Dynamic::from("ready"),
        );
        let proposed = widget(
            Dynamic::from("widget-1"),
            "b",
            Dynamic::Number(1.0),
            Dynamic::from("ready"),
        );

        let response = server()
            .plan_resource_change(Request::new(proto::plan_resource_change::Request {
                type_name: "test_widget".to_string(),
                prior_state: wire(&prior),
                proposed_new_state: wire(&proposed),
                config: wire(&config("b")),
                ..Default::default()
            }))
            .await
            .unwrap()
            .into_inner();

        let planned = unwire(response.planned_state);
        assert_eq!(
            planned.get_string(&AttributePath::new("id")).unwrap(),
            "widget-1"
        );
        assert!(planned.get(&AttributePath::new("status")).unwrap().is_unknown());
        assert_eq!(response.requires_replace, vec![path_to_proto(&AttributePath::new("name"))]);
    }

    #[tokio::test]
    async fn plan_destroy_passes_null_through() {
        let prior = widget(
            Dynamic::from("widget-1"),
            "a",
            Dynamic::Number(1.0),
            Dynamic::from("ready"),
        );

        let response = server()
            .plan_resource_change(Request::new(proto::plan_resource_change::Request {
                type_name: "test_widget".to_string(),
                prior_state: wire(&prior),
                proposed_new_state: wire(&DynamicValue::null()),
                config: wire(&DynamicValue::null()),
                ..Default::default()
            }))
            .await
            .unwrap()
            .into_inner();

        assert!(unwire(response.planned_state).is_null());
    }

    #[tokio::test]
    async fn apply_create_returns_known_state() {
        let mut planned = config("a");
        planned.mark_unknown(&AttributePath::new("id")).unwrap();
        planned.mark_unknown(&AttributePath::new("status")).unwrap();
        planned.set_number(&AttributePath::new("size"), 1.0).unwrap();

        let response = server()
            .apply_resource_change(Request::new(proto::apply_resource_change::Request {
                type_name: "test_widget".to_string(),
                prior_state: wire(&DynamicValue::null()),
                planned_state: wire(&planned),
                config: wire(&config("a")),
                ..Default::default()
            }))
            .await
            .unwrap()
            .into_inner();

        let state = unwire(response.new_state);
        assert!(state.value.is_fully_known());
        assert_eq!(state.get_string(&AttributePath::new("id")).unwrap(), "widget-1");
        assert!(state.get(&AttributePath::new("status")).unwrap().is_null());
    }

    #[tokio::test]
    async fn apply_delete_returns_null_or_prior_on_error() {
        let prior = widget(
            Dynamic::from("widget-1"),
            "a",
            Dynamic::Number(1.0),
            Dynamic::from("ready"),
        );
        let response = server()
            .apply_resource_change(Request::new(proto::apply_resource_change::Request {
                type_name: "test_widget".to_string(),
                prior_state: wire(&prior),
                planned_state: wire(&DynamicValue::null()),
                config: wire(&DynamicValue::null()),
                ..Default::default()
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(unwire(response.new_state).is_null());

        let stuck = widget(
            Dynamic::from("widget-2"),
            "undeletable",
            Dynamic::Number(1.0),
            Dynamic::from("ready"),
        );
        let response = server()
            .apply_resource_change(Request::new(proto::apply_resource_change::Request {
                type_name: "test_widget".to_string(),
                prior_state: wire(&stuck),
                planned_state: wire(&DynamicValue::null()),
                config: wire(&DynamicValue::null()),
                ..Default::default()
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(unwire(response.new_state), stuck);
        assert_eq!(response.diagnostics.len(), 1);
    }

    #[tokio::test]
    async fn read_of_missing_resource_removes_it() {
        let gone = widget(
            Dynamic::from("gone"),
            "a",
            Dynamic::Number(1.0),
            Dynamic::from("ready"),
        );

        let response = server()
            .read_resource(Request::new(proto::read_resource::Request {
                type_name: "test_widget".to_string(),
                current_state: wire(&gone),
                ..Default::default()
            }))
            .await
            .unwrap()
            .into_inner();

        assert!(unwire(response.new_state).is_null());
        assert!(response.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn import_seeds_state_with_id() {
        let response = server()
            .import_resource_state(Request::new(proto::import_resource_state::Request {
                type_name: "test_widget".to_string(),
                id: "widget-9".to_string(),
                ..Default::default()
            }))
            .await
            .unwrap()
            .into_inner();

        let state = unwire(response.imported_resources[0].state.clone());
        assert_eq!(state.get_string(&AttributePath::new("id")).unwrap(), "widget-9");
        assert!(state.get(&AttributePath::new("name")).unwrap().is_null());
    }

    #[tokio::test]
    async fn unknown_resource_type_yields_diagnostic() {
        let response = server()
            .validate_resource_config(Request::new(
                proto::validate_resource_config::Request {
                    type_name: "test_missing".to_string(),
                    config: wire(&DynamicValue::null()),
                    ..Default::default()
                },
            ))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(response.diagnostics[0].summary, "Unknown resource type");
    }

    #[tokio::test]
    async fn data_source_read_fills_computed_values() {
        let config = DynamicValue::new(Dynamic::Map(HashMap::from([(
            "name".to_string(),
            Dynamic::from("x"),
        )])));

        let response = server()
            .read_data_source(Request::new(proto::read_data_source::Request {
                type_name: "test_lookup".to_string(),
                config: wire(&config),
                ..Default::default()
            }))
            .await
            .unwrap()
            .into_inner();

        let state = unwire(response.state);
        assert_eq!(state.get_string(&AttributePath::new("value")).unwrap(), "found");
    }

    #[tokio::test]
    async fn schema_lists_every_resource_and_data_source() {
        let response = server()
            .get_provider_schema(Request::new(proto::get_provider_schema::Request {}))
            .await
            .unwrap()
            .into_inner();

        assert!(response.resource_schemas.contains_key("test_widget"));
        assert!(response.data_source_schemas.contains_key("test_lookup"));
        let provider = response.provider.unwrap().block.unwrap();
        assert!(provider.attributes[0].sensitive);
    }

    #[tokio::test]
    async fn stop_provider_cancels_root_context() {
        let server = server();
        let ctx = server.context();

        server
            .stop_provider(Request::new(proto::stop_provider::Request {}))
            .await
            .unwrap();

        assert!(ctx.is_cancelled());
    }
}
