pub mod api;
pub mod data_sources;
pub mod provider_data;
pub mod resources;
pub mod utils;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tfplug::context::Context;
use tfplug::provider::*;
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::{AttributePath, DataSourceFactory, Diagnostic, DynamicValue, ResourceFactory};

pub use provider_data::StackitProviderData;

pub const PROVIDER_NAME: &str = "stackit";
pub const DEFAULT_REGION: &str = "eu01";

pub const ENV_SERVICE_ACCOUNT_TOKEN: &str = "STACKIT_SERVICE_ACCOUNT_TOKEN";
pub const ENV_REGION: &str = "STACKIT_REGION";
pub const ENV_ENABLE_BETA_RESOURCES: &str = "STACKIT_TF_ENABLE_BETA_RESOURCES";

/// Custom endpoint attributes and their environment fallbacks
const ENDPOINT_ATTRIBUTES: &[(&str, &str)] = &[
    ("iaas_custom_endpoint", "STACKIT_IAAS_CUSTOM_ENDPOINT"),
    ("postgresflex_custom_endpoint", "STACKIT_POSTGRESFLEX_CUSTOM_ENDPOINT"),
    ("ske_custom_endpoint", "STACKIT_SKE_CUSTOM_ENDPOINT"),
];

/// Provider settings after environment fallbacks
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub service_account_token: Option<String>,
    pub default_region: String,
    pub endpoints: api::Endpoints,
    pub enable_beta_resources: bool,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

impl ProviderConfig {
    /// Reads the provider block, falling back to the environment for every
    /// attribute left null
    pub fn from_value(config: &DynamicValue) -> Self {
        let string = |name: &str, env: &str| {
            config
                .optional_string(&AttributePath::new(name))
                .filter(|v| !v.is_empty())
                .or_else(|| env_var(env))
        };

        let endpoint = |name: &str| {
            ENDPOINT_ATTRIBUTES
                .iter()
                .find(|(attribute, _)| *attribute == name)
                .and_then(|(attribute, env)| string(attribute, env))
        };

        Self {
            service_account_token: string("service_account_token", ENV_SERVICE_ACCOUNT_TOKEN),
            default_region: string("default_region", ENV_REGION).unwrap_or_else(|| DEFAULT_REGION.to_string()),
            endpoints: api::Endpoints {
                iaas: endpoint("iaas_custom_endpoint"),
                postgresflex: endpoint("postgresflex_custom_endpoint"),
                ske: endpoint("ske_custom_endpoint"),
            },
            enable_beta_resources: config
                .optional_bool(&AttributePath::new("enable_beta_resources"))
                .or_else(|| env_var(ENV_ENABLE_BETA_RESOURCES).map(|v| parse_bool(&v)))
                .unwrap_or(false),
        }
    }
}

pub struct StackitProvider;

impl Default for StackitProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StackitProvider {
    pub fn new() -> Self {
        Self
    }

    pub fn provider_schema() -> Schema {
        let mut builder = SchemaBuilder::new()
            .description("The STACKIT provider is used to manage STACKIT cloud resources.")
            .attribute(
                AttributeBuilder::new("service_account_token", AttributeType::String)
                    .description("Token used for authentication. If set, the token flow will be used to authenticate all operations. Falls back to `STACKIT_SERVICE_ACCOUNT_TOKEN`.")
                    .optional()
                    .sensitive()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("default_region", AttributeType::String)
                    .description("Region will be used as the default location for regional services. Falls back to `STACKIT_REGION`, then `eu01`.")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("enable_beta_resources", AttributeType::Bool)
                    .description("Enable beta resources. Default is false. Falls back to `STACKIT_TF_ENABLE_BETA_RESOURCES`.")
                    .optional()
                    .build(),
            );

        for (name, env) in ENDPOINT_ATTRIBUTES {
            let service = name.trim_end_matches("_custom_endpoint");
            builder = builder.attribute(
                AttributeBuilder::new(*name, AttributeType::String)
                    .description(&format!(
                        "Custom endpoint for the {} service. Falls back to `{}`.",
                        service, env
                    ))
                    .optional()
                    .build(),
            );
        }

        builder.build()
    }
}

/// Custom endpoints set in the provider block that don't parse as URLs
fn invalid_endpoints(config: &DynamicValue) -> Vec<Diagnostic> {
    ENDPOINT_ATTRIBUTES
        .iter()
        .filter_map(|(name, _)| {
            let value = config.optional_string(&AttributePath::new(name))?;
            let error = url::Url::parse(&value).err()?;
            Some(
                Diagnostic::error("Invalid custom endpoint", format!("{}: {}", value, error))
                    .with_attribute(AttributePath::new(name)),
            )
        })
        .collect()
}

#[async_trait]
impl Provider for StackitProvider {
    fn type_name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn schema(&self, _ctx: Context, _request: ProviderSchemaRequest) -> ProviderSchemaResponse {
        ProviderSchemaResponse {
            schema: Self::provider_schema(),
            diagnostics: vec![],
        }
    }

    async fn validate(&self, _ctx: Context, request: ValidateProviderConfigRequest) -> ValidateProviderConfigResponse {
        ValidateProviderConfigResponse {
            diagnostics: invalid_endpoints(&request.config),
        }
    }

    async fn configure(&mut self, _ctx: Context, request: ConfigureProviderRequest) -> ConfigureProviderResponse {
        tracing::debug!(terraform_version = %request.terraform_version, "configuring provider");
        let config = ProviderConfig::from_value(&request.config);

        let Some(token) = config.service_account_token.as_deref() else {
            return ConfigureProviderResponse {
                diagnostics: vec![Diagnostic::error(
                    "Missing service account token",
                    format!(
                        "Set service_account_token in the provider configuration or the {} environment variable.",
                        ENV_SERVICE_ACCOUNT_TOKEN
                    ),
                )
                .with_attribute(AttributePath::new("service_account_token"))],
                provider_data: None,
            };
        };

        let client = match api::Client::new(token, &config.endpoints) {
            Ok(client) => client,
            Err(e) => {
                return ConfigureProviderResponse {
                    diagnostics: vec![Diagnostic::error(
                        "Failed to create API client",
                        e.to_string(),
                    )],
                    provider_data: None,
                }
            }
        };

        tracing::info!(
            region = %config.default_region,
            beta = config.enable_beta_resources,
            "provider configured"
        );
        let data = StackitProviderData::new(client, config.default_region, config.enable_beta_resources);
        ConfigureProviderResponse {
            diagnostics: vec![],
            provider_data: Some(Arc::new(data)),
        }
    }

    fn resources(&self) -> HashMap<String, ResourceFactory> {
        use resources::*;

        let mut resources: HashMap<String, ResourceFactory> = HashMap::new();
        resources.insert(iaas::affinity_group::TYPE_NAME.to_string(), || {
            Box::new(AffinityGroupResource::default())
        });
        resources.insert(iaas::network_area_route::TYPE_NAME.to_string(), || {
            Box::new(NetworkAreaRouteResource::default())
        });
        resources.insert(iaas::routing_table::TYPE_NAME.to_string(), || {
            Box::new(RoutingTableResource::default())
        });
        resources.insert(iaas::public_ip_associate::TYPE_NAME.to_string(), || {
            Box::new(PublicIpAssociateResource::default())
        });
        resources.insert(postgresflex::instance::TYPE_NAME.to_string(), || {
            Box::new(PostgresFlexInstanceResource::default())
        });
        resources.insert(postgresflex::user::TYPE_NAME.to_string(), || {
            Box::new(PostgresFlexUserResource::default())
        });
        resources.insert(ske::cluster::TYPE_NAME.to_string(), || {
            Box::new(SkeClusterResource::default())
        });
        resources
    }

    fn data_sources(&self) -> HashMap<String, DataSourceFactory> {
        use data_sources::*;

        let mut data_sources: HashMap<String, DataSourceFactory> = HashMap::new();
        data_sources.insert(affinity_group::TYPE_NAME.to_string(), || {
            Box::new(AffinityGroupDataSource::default())
        });
        data_sources.insert(machine_type::TYPE_NAME.to_string(), || {
            Box::new(MachineTypeDataSource::default())
        });
        data_sources.insert(routing_table::TYPE_NAME.to_string(), || {
            Box::new(RoutingTableDataSource::default())
        });
        data_sources.insert(postgresflex_user::TYPE_NAME.to_string(), || {
            Box::new(PostgresFlexUserDataSource::default())
        });
        data_sources
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tfplug::Dynamic;

    const ENV_VARS: &[&str] = &[
        ENV_SERVICE_ACCOUNT_TOKEN,
        ENV_REGION,
        ENV_ENABLE_BETA_RESOURCES,
        "STACKIT_IAAS_CUSTOM_ENDPOINT",
        "STACKIT_POSTGRESFLEX_CUSTOM_ENDPOINT",
        "STACKIT_SKE_CUSTOM_ENDPOINT",
    ];

    fn clear_env() {
        for name in ENV_VARS {
            std::env::remove_var(name);
        }
    }

    fn config(entries: &[(&str, Dynamic)]) -> DynamicValue {
        DynamicValue::new(Dynamic::object(entries.iter().map(|(k, v)| (*k, v.clone()))))
    }

    async fn configure(config: DynamicValue) -> ConfigureProviderResponse {
        StackitProvider::new()
            .configure(
                Context::new(),
                ConfigureProviderRequest {
                    terraform_version: "1.9.0".to_string(),
                    config,
                },
            )
            .await
    }

    #[test]
    #[serial]
    fn config_falls_back_to_environment() {
        clear_env();
        std::env::set_var(ENV_SERVICE_ACCOUNT_TOKEN, "env-token");
        std::env::set_var(ENV_REGION, "eu02");
        std::env::set_var(ENV_ENABLE_BETA_RESOURCES, "true");
        std::env::set_var("STACKIT_SKE_CUSTOM_ENDPOINT", "http://localhost:9000");

        let parsed = ProviderConfig::from_value(&config(&[("default_region", "eu01".into())]));

        assert_eq!(parsed.service_account_token.as_deref(), Some("env-token"));
        assert_eq!(parsed.default_region, "eu01");
        assert!(parsed.enable_beta_resources);
        assert_eq!(parsed.endpoints.ske.as_deref(), Some("http://localhost:9000"));
        assert_eq!(parsed.endpoints.iaas, None);
        clear_env();
    }

    #[test]
    #[serial]
    fn config_defaults() {
        clear_env();
        let parsed = ProviderConfig::from_value(&DynamicValue::null());
        assert_eq!(parsed.default_region, DEFAULT_REGION);
        assert!(!parsed.enable_beta_resources);
        assert_eq!(parsed.service_account_token, None);
    }

    #[test]
    #[serial]
    fn explicit_beta_flag_wins_over_environment() {
        clear_env();
        std::env::set_var(ENV_ENABLE_BETA_RESOURCES, "true");
        let parsed = ProviderConfig::from_value(&config(&[("enable_beta_resources", false.into())]));
        assert!(!parsed.enable_beta_resources);
        clear_env();
    }

    #[tokio::test]
    #[serial]
    async fn configure_requires_token() {
        clear_env();
        let response = configure(DynamicValue::null()).await;
        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(response.diagnostics[0].summary, "Missing service account token");
        assert!(response.provider_data.is_none());
    }

    #[tokio::test]
    #[serial]
    async fn configure_hands_out_provider_data() {
        clear_env();
        let response = configure(config(&[
            ("service_account_token", "token".into()),
            ("default_region", "eu02".into()),
            ("enable_beta_resources", true.into()),
        ]))
        .await;

        assert!(response.diagnostics.is_empty());
        let data = provider_data::from_any(response.provider_data).unwrap().unwrap();
        assert_eq!(data.default_region, "eu02");
        assert!(data.enable_beta_resources);
    }

    #[tokio::test]
    #[serial]
    async fn configure_rejects_invalid_endpoint() {
        clear_env();
        let response = configure(config(&[
            ("service_account_token", "token".into()),
            ("iaas_custom_endpoint", "not a url".into()),
        ]))
        .await;
        assert!(response.diagnostics[0].is_error());
        assert!(response.provider_data.is_none());
    }

    #[tokio::test]
    async fn validate_flags_invalid_endpoint() {
        let response = StackitProvider::new()
            .validate(
                Context::new(),
                ValidateProviderConfigRequest {
                    config: config(&[("ske_custom_endpoint", "::nope".into())]),
                },
            )
            .await;
        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(
            response.diagnostics[0].attribute,
            Some(AttributePath::new("ske_custom_endpoint"))
        );
    }

    #[test]
    fn registers_every_type() {
        let provider = StackitProvider::new();
        let mut resources: Vec<String> = provider.resources().into_keys().collect();
        resources.sort();
        assert_eq!(
            resources,
            vec![
                "stackit_affinity_group",
                "stackit_network_area_route",
                "stackit_postgresflex_instance",
                "stackit_postgresflex_user",
                "stackit_public_ip_associate",
                "stackit_routing_table",
                "stackit_ske_cluster",
            ]
        );

        let mut data_sources: Vec<String> = provider.data_sources().into_keys().collect();
        data_sources.sort();
        assert_eq!(
            data_sources,
            vec![
                "stackit_affinity_group",
                "stackit_machine_type",
                "stackit_postgresflex_user",
                "stackit_routing_table",
            ]
        );
    }

    #[test]
    fn factories_match_registered_names() {
        let provider = StackitProvider::new();
        for (name, factory) in provider.resources() {
            assert_eq!(factory().type_name(), name);
        }
        for (name, factory) in provider.data_sources() {
            assert_eq!(factory().type_name(), name);
        }
    }
}
