//! SKE cluster API

use crate::api::common::project_region_path;
use crate::api::wait::{deleted, wait_for, WaitConfig, WaitError, WaitState};
use crate::api::{ApiError, Client, Service};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tfplug::Context;

pub const STATE_HEALTHY: &str = "STATE_HEALTHY";
pub const STATE_HIBERNATED: &str = "STATE_HIBERNATED";
pub const STATE_UNHEALTHY: &str = "STATE_UNHEALTHY";
pub const STATE_FAILED: &str = "STATE_FAILED";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Kubernetes {
    pub version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Image {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Machine {
    #[serde(rename = "type")]
    pub machine_type: String,
    pub image: Image,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Volume {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
    pub size: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Nodepool {
    pub name: String,
    pub machine: Machine,
    pub minimum: i64,
    pub maximum: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_surge: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<i64>,
    pub volume: Volume,
    #[serde(default)]
    pub availability_zones: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AutoUpdate {
    pub kubernetes_version: bool,
    pub machine_image_version: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TimeWindow {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Maintenance {
    pub auto_update: AutoUpdate,
    pub time_window: TimeWindow,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HibernationSchedule {
    pub start: String,
    pub end: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Hibernation {
    #[serde(default)]
    pub schedules: Vec<HibernationSchedule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    #[serde(default)]
    pub aggregated: Option<String>,
    #[serde(default)]
    pub egress_address_ranges: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Cluster {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub kubernetes: Option<Kubernetes>,
    #[serde(default)]
    pub nodepools: Option<Vec<Nodepool>>,
    #[serde(default)]
    pub maintenance: Option<Maintenance>,
    #[serde(default)]
    pub hibernation: Option<Hibernation>,
    #[serde(default)]
    pub status: Option<ClusterStatus>,
}

impl Cluster {
    pub fn aggregated_state(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|s| s.aggregated.as_deref())
            .unwrap_or_default()
    }
}

/// Request body for the idempotent create-or-update call
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ClusterPayload {
    pub kubernetes: Kubernetes,
    pub nodepools: Vec<Nodepool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance: Option<Maintenance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hibernation: Option<Hibernation>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct VersionInfo {
    pub version: String,
    #[serde(default)]
    pub state: Option<String>,
}

impl VersionInfo {
    pub fn is_supported(&self) -> bool {
        self.state.as_deref() == Some("supported")
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct MachineImage {
    pub name: String,
    #[serde(default)]
    pub versions: Vec<VersionInfo>,
}

/// Versions and images the region currently offers
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderOptions {
    #[serde(default)]
    pub kubernetes_versions: Vec<VersionInfo>,
    #[serde(default)]
    pub machine_images: Vec<MachineImage>,
}

pub struct ClustersApi<'a> {
    client: &'a Client,
}

impl<'a> ClustersApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    fn path(project_id: &str, region: &str, name: &str) -> String {
        format!(
            "{}/clusters/{}",
            project_region_path(project_id, region),
            urlencoding::encode(name)
        )
    }

    /// GET /v2/regions/{region}/provider-options
    pub async fn provider_options(&self, region: &str) -> Result<ProviderOptions, ApiError> {
        let path = format!("/v2/regions/{}/provider-options", urlencoding::encode(region));
        self.client.get(Service::Ske, &path).await
    }

    /// PUT /v2/projects/{projectId}/regions/{region}/clusters/{clusterName}
    pub async fn create_or_update(
        &self,
        project_id: &str,
        region: &str,
        name: &str,
        payload: &ClusterPayload,
    ) -> Result<Cluster, ApiError> {
        self.client
            .put(Service::Ske, &Self::path(project_id, region, name), payload)
            .await
    }

    /// GET /v2/projects/{projectId}/regions/{region}/clusters/{clusterName}
    pub async fn get(&self, project_id: &str, region: &str, name: &str) -> Result<Cluster, ApiError> {
        self.client
            .get(Service::Ske, &Self::path(project_id, region, name))
            .await
    }

    /// DELETE /v2/projects/{projectId}/regions/{region}/clusters/{clusterName}
    pub async fn delete(&self, project_id: &str, region: &str, name: &str) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .client
            .delete(Service::Ske, &Self::path(project_id, region, name))
            .await?;
        Ok(())
    }

    /// Waits until the cluster settles in a running (or hibernated) state
    pub async fn wait_until_ready(
        &self,
        ctx: &Context,
        config: &WaitConfig,
        project_id: &str,
        region: &str,
        name: &str,
    ) -> Result<Cluster, WaitError> {
        let what = format!("cluster {}", name);
        wait_for(ctx, config, &what, || async move {
            let cluster = self.get(project_id, region, name).await?;
            let state = cluster.aggregated_state().to_string();
            Ok(match state.as_str() {
                STATE_HEALTHY | STATE_HIBERNATED | STATE_UNHEALTHY => WaitState::Done(cluster),
                STATE_FAILED => WaitState::Failed(state),
                _ => WaitState::Pending(state),
            })
        })
        .await
    }

    /// Waits until the cluster is gone
    pub async fn wait_until_deleted(
        &self,
        ctx: &Context,
        config: &WaitConfig,
        project_id: &str,
        region: &str,
        name: &str,
    ) -> Result<(), WaitError> {
        let what = format!("deletion of cluster {}", name);
        wait_for(ctx, config, &what, || async move {
            deleted(self.get(project_id, region, name).await, |cluster| {
                WaitState::Pending(cluster.aggregated_state().to_string())
            })
        })
        .await
    }
}
