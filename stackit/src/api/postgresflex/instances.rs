//! PostgreSQL Flex instance API

use crate::api::common::{project_region_path, ItemResponse};
use crate::api::wait::{deleted, wait_for, WaitConfig, WaitError, WaitState};
use crate::api::{ApiError, Client, Service};
use serde::{Deserialize, Serialize};
use tfplug::Context;

pub const STATE_READY: &str = "Ready";
pub const STATE_FAILED: &str = "Failure";
pub const STATE_DELETED: &str = "Deleted";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Acl {
    #[serde(default)]
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Flavor {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub cpu: Option<i64>,
    /// Memory in GB
    #[serde(default)]
    pub memory: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Storage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// Size in GB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub acl: Option<Acl>,
    #[serde(default)]
    pub backup_schedule: Option<String>,
    #[serde(default)]
    pub flavor: Option<Flavor>,
    #[serde(default)]
    pub replicas: Option<i64>,
    #[serde(default)]
    pub storage: Option<Storage>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Request body for creating and (partially) updating instances
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstancePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acl: Option<Acl>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_schedule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flavor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<Storage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateInstanceResponse {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FlavorsResponse {
    #[serde(default)]
    flavors: Vec<Flavor>,
}

pub struct InstancesApi<'a> {
    client: &'a Client,
}

impl<'a> InstancesApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    fn path(project_id: &str, region: &str) -> String {
        format!("{}/instances", project_region_path(project_id, region))
    }

    fn instance_path(project_id: &str, region: &str, instance_id: &str) -> String {
        format!(
            "{}/{}",
            Self::path(project_id, region),
            urlencoding::encode(instance_id)
        )
    }

    /// GET /v2/projects/{projectId}/regions/{region}/flavors
    pub async fn flavors(&self, project_id: &str, region: &str) -> Result<Vec<Flavor>, ApiError> {
        let path = format!("{}/flavors", project_region_path(project_id, region));
        let response: FlavorsResponse = self.client.get(Service::PostgresFlex, &path).await?;
        Ok(response.flavors)
    }

    /// POST /v2/projects/{projectId}/regions/{region}/instances, returns the new id
    pub async fn create(
        &self,
        project_id: &str,
        region: &str,
        payload: &InstancePayload,
    ) -> Result<String, ApiError> {
        let response: CreateInstanceResponse = self
            .client
            .post(Service::PostgresFlex, &Self::path(project_id, region), payload)
            .await?;
        response
            .id
            .ok_or_else(|| ApiError::ParseError("create response has no instance id".to_string()))
    }

    /// GET /v2/projects/{projectId}/regions/{region}/instances/{instanceId}
    pub async fn get(
        &self,
        project_id: &str,
        region: &str,
        instance_id: &str,
    ) -> Result<Instance, ApiError> {
        let response: ItemResponse<Instance> = self
            .client
            .get(
                Service::PostgresFlex,
                &Self::instance_path(project_id, region, instance_id),
            )
            .await?;
        Ok(response.item)
    }

    /// PATCH /v2/projects/{projectId}/regions/{region}/instances/{instanceId}
    pub async fn update(
        &self,
        project_id: &str,
        region: &str,
        instance_id: &str,
        payload: &InstancePayload,
    ) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .client
            .patch(
                Service::PostgresFlex,
                &Self::instance_path(project_id, region, instance_id),
                payload,
            )
            .await?;
        Ok(())
    }

    /// DELETE /v2/projects/{projectId}/regions/{region}/instances/{instanceId}
    ///
    /// The instance moves to the `Deleted` state and must be force deleted
    /// afterwards to free its name.
    pub async fn delete(
        &self,
        project_id: &str,
        region: &str,
        instance_id: &str,
    ) -> Result<(), ApiError> {
        self.client
            .delete(
                Service::PostgresFlex,
                &Self::instance_path(project_id, region, instance_id),
            )
            .await
    }

    /// DELETE /v2/projects/{projectId}/regions/{region}/instances/{instanceId}/force
    pub async fn force_delete(
        &self,
        project_id: &str,
        region: &str,
        instance_id: &str,
    ) -> Result<(), ApiError> {
        let path = format!("{}/force", Self::instance_path(project_id, region, instance_id));
        self.client.delete(Service::PostgresFlex, &path).await
    }

    /// Waits until a created or updated instance is ready
    pub async fn wait_until_ready(
        &self,
        ctx: &Context,
        config: &WaitConfig,
        project_id: &str,
        region: &str,
        instance_id: &str,
    ) -> Result<Instance, WaitError> {
        let what = format!("instance {}", instance_id);
        wait_for(ctx, config, &what, || async move {
            let instance = self.get(project_id, region, instance_id).await?;
            let status = instance.status.clone().unwrap_or_default();
            Ok(match status.as_str() {
                STATE_READY => WaitState::Done(instance),
                STATE_FAILED => WaitState::Failed(status),
                _ => WaitState::Pending(status),
            })
        })
        .await
    }

    /// Waits until a deleted instance reports the `Deleted` state or disappears
    pub async fn wait_until_deleted(
        &self,
        ctx: &Context,
        config: &WaitConfig,
        project_id: &str,
        region: &str,
        instance_id: &str,
    ) -> Result<(), WaitError> {
        let what = format!("deletion of instance {}", instance_id);
        wait_for(ctx, config, &what, || async move {
            deleted(self.get(project_id, region, instance_id).await, |instance| {
                match instance.status.as_deref() {
                    Some(STATE_DELETED) => WaitState::Done(()),
                    Some(STATE_FAILED) => WaitState::Failed(STATE_FAILED.to_string()),
                    other => WaitState::Pending(other.unwrap_or_default().to_string()),
                }
            })
        })
        .await
    }

    /// Waits until a force deleted instance is gone
    pub async fn wait_until_gone(
        &self,
        ctx: &Context,
        config: &WaitConfig,
        project_id: &str,
        region: &str,
        instance_id: &str,
    ) -> Result<(), WaitError> {
        let what = format!("removal of instance {}", instance_id);
        wait_for(ctx, config, &what, || async move {
            deleted(self.get(project_id, region, instance_id).await, |instance| {
                WaitState::Pending(instance.status.clone().unwrap_or_default())
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_helpers::create_test_client;
    use mockito::{Matcher, Server};
    use std::time::Duration;

    fn fast() -> WaitConfig {
        WaitConfig::new(Duration::from_secs(5))
            .with_interval(Duration::from_millis(1), Duration::from_millis(5))
    }

    #[tokio::test]
    async fn create_returns_id() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/projects/pid/regions/eu01/instances")
            .match_body(Matcher::Json(serde_json::json!({
                "name": "db",
                "acl": {"items": ["0.0.0.0/0"]},
                "flavorId": "2.4",
                "replicas": 1,
                "storage": {"class": "premium-perf2-stackit", "size": 5},
                "version": "16"
            })))
            .with_status(202)
            .with_body(r#"{"id":"iid"}"#)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let id = client
            .postgresflex()
            .instances()
            .create(
                "pid",
                "eu01",
                &InstancePayload {
                    name: Some("db".to_string()),
                    acl: Some(Acl {
                        items: vec!["0.0.0.0/0".to_string()],
                    }),
                    backup_schedule: None,
                    flavor_id: Some("2.4".to_string()),
                    replicas: Some(1),
                    storage: Some(Storage {
                        class: Some("premium-perf2-stackit".to_string()),
                        size: Some(5),
                    }),
                    version: Some("16".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(id, "iid");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn wait_until_ready_returns_ready_instance() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/projects/pid/regions/eu01/instances/iid")
            .with_body(r#"{"item":{"id":"iid","name":"db","status":"Ready"}}"#)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let instance = client
            .postgresflex()
            .instances()
            .wait_until_ready(&Context::new(), &fast(), "pid", "eu01", "iid")
            .await
            .unwrap();

        assert_eq!(instance.name.as_deref(), Some("db"));
    }

    #[tokio::test]
    async fn wait_until_ready_fails_on_failure_state() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/projects/pid/regions/eu01/instances/iid")
            .with_body(r#"{"item":{"id":"iid","status":"Failure"}}"#)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let error = client
            .postgresflex()
            .instances()
            .wait_until_ready(&Context::new(), &fast(), "pid", "eu01", "iid")
            .await
            .unwrap_err();

        assert!(matches!(error, WaitError::Failed { .. }));
    }

    #[tokio::test]
    async fn wait_until_gone_finishes_on_not_found() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/projects/pid/regions/eu01/instances/iid")
            .with_status(404)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        client
            .postgresflex()
            .instances()
            .wait_until_gone(&Context::new(), &fast(), "pid", "eu01", "iid")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn flavors_are_listed() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/projects/pid/regions/eu01/flavors")
            .with_body(
                r#"{"flavors":[{"id":"2.4","cpu":2,"memory":4,"description":"small"}]}"#,
            )
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let flavors = client
            .postgresflex()
            .instances()
            .flavors("pid", "eu01")
            .await
            .unwrap();

        assert_eq!(flavors[0].id.as_deref(), Some("2.4"));
        assert_eq!(flavors[0].memory, Some(4));
    }
}
