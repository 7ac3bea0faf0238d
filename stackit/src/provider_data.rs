//! Provider data structure passed to resources and data sources

use crate::api::{Client, WaitConfig};
use crate::utils::KeyedLock;
use std::sync::Arc;
use std::time::Duration;
use tfplug::Diagnostic;

#[derive(Clone)]
pub struct StackitProviderData {
    pub client: Arc<Client>,
    pub default_region: String,
    pub enable_beta_resources: bool,
    /// Serialises public IP associations across resource instances
    pub public_ip_locks: KeyedLock,
    pub wait_interval: (Duration, Duration),
}

impl StackitProviderData {
    pub fn new(client: Client, default_region: String, enable_beta_resources: bool) -> Self {
        Self {
            client: Arc::new(client),
            default_region,
            enable_beta_resources,
            public_ip_locks: KeyedLock::new(),
            wait_interval: (Duration::from_secs(5), Duration::from_secs(30)),
        }
    }

    /// Overrides the polling interval of wait handlers
    pub fn with_wait_interval(mut self, initial: Duration, max: Duration) -> Self {
        self.wait_interval = (initial, max);
        self
    }

    /// The resource's own region, else the provider default
    pub fn region_with_override(&self, region: Option<String>) -> String {
        region
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| self.default_region.clone())
    }

    pub fn wait_config(&self, timeout: Duration) -> WaitConfig {
        WaitConfig::new(timeout).with_interval(self.wait_interval.0, self.wait_interval.1)
    }

    /// Error diagnostic when a beta resource is used without opting in
    pub fn check_beta(&self, type_name: &str) -> Option<Diagnostic> {
        if self.enable_beta_resources {
            return None;
        }
        Some(Diagnostic::error(
            format!("{} is in beta", type_name),
            format!(
                "The resource or data source \"{}\" is in beta and may change without notice. \
                 Set enable_beta_resources = true in the provider configuration or \
                 STACKIT_TF_ENABLE_BETA_RESOURCES=true to use it.",
                type_name
            ),
        ))
    }
}

/// Recovers the provider data handed over by the framework
pub fn from_any(
    provider_data: Option<Arc<dyn std::any::Any + Send + Sync>>,
) -> Result<Option<StackitProviderData>, Diagnostic> {
    let Some(data) = provider_data else {
        return Ok(None);
    };
    data.downcast_ref::<StackitProviderData>()
        .cloned()
        .map(Some)
        .ok_or_else(|| {
            Diagnostic::error(
                "Unexpected provider data",
                "Expected StackitProviderData, got another type. This is a bug in the provider.",
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Endpoints;

    fn data(beta: bool) -> StackitProviderData {
        StackitProviderData::new(
            Client::new("token", &Endpoints::default()).unwrap(),
            "eu01".to_string(),
            beta,
        )
    }

    #[test]
    fn region_override_falls_back_to_default() {
        let data = data(false);
        assert_eq!(data.region_with_override(None), "eu01");
        assert_eq!(data.region_with_override(Some(String::new())), "eu01");
        assert_eq!(data.region_with_override(Some("eu02".to_string())), "eu02");
    }

    #[test]
    fn beta_gate() {
        assert!(data(true).check_beta("stackit_routing_table").is_none());
        let diag = data(false).check_beta("stackit_routing_table").unwrap();
        assert!(diag.summary.contains("beta"));
    }

    #[test]
    fn downcast_from_any() {
        let any: Arc<dyn std::any::Any + Send + Sync> = Arc::new(data(false));
        assert!(from_any(Some(any)).unwrap().is_some());
        assert!(from_any(None).unwrap().is_none());

        let wrong: Arc<dyn std::any::Any + Send + Sync> = Arc::new(42u32);
        assert!(from_any(Some(wrong)).is_err());
    }
}
