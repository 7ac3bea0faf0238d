//! Affinity group API

use crate::api::common::project_region_path;
use crate::api::{ApiError, Client, Service};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AffinityGroup {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub policy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<String>>,
}

/// Request body for creating affinity groups
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CreateAffinityGroupRequest {
    pub name: String,
    pub policy: String,
}

pub struct AffinityGroupsApi<'a> {
    client: &'a Client,
}

impl<'a> AffinityGroupsApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    fn path(project_id: &str, region: &str) -> String {
        format!("{}/affinity-groups", project_region_path(project_id, region))
    }

    /// POST /v2/projects/{projectId}/regions/{region}/affinity-groups
    pub async fn create(
        &self,
        project_id: &str,
        region: &str,
        request: &CreateAffinityGroupRequest,
    ) -> Result<AffinityGroup, ApiError> {
        self.client
            .post(Service::Iaas, &Self::path(project_id, region), request)
            .await
    }

    /// GET /v2/projects/{projectId}/regions/{region}/affinity-groups/{affinityGroupId}
    pub async fn get(
        &self,
        project_id: &str,
        region: &str,
        affinity_group_id: &str,
    ) -> Result<AffinityGroup, ApiError> {
        let path = format!(
            "{}/{}",
            Self::path(project_id, region),
            urlencoding::encode(affinity_group_id)
        );
        self.client.get(Service::Iaas, &path).await
    }

    /// DELETE /v2/projects/{projectId}/regions/{region}/affinity-groups/{affinityGroupId}
    pub async fn delete(
        &self,
        project_id: &str,
        region: &str,
        affinity_group_id: &str,
    ) -> Result<(), ApiError> {
        let path = format!(
            "{}/{}",
            Self::path(project_id, region),
            urlencoding::encode(affinity_group_id)
        );
        self.client.delete(Service::Iaas, &path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_helpers::create_test_client;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn create_posts_name_and_policy() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/projects/pid/regions/eu01/affinity-groups")
            .match_body(Matcher::Json(serde_json::json!({
                "name": "group",
                "policy": "hard-affinity"
            })))
            .with_status(201)
            .with_body(r#"{"id":"agid","name":"group","policy":"hard-affinity","members":[]}"#)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let group = client
            .iaas()
            .affinity_groups()
            .create(
                "pid",
                "eu01",
                &CreateAffinityGroupRequest {
                    name: "group".to_string(),
                    policy: "hard-affinity".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(group.id.as_deref(), Some("agid"));
        assert_eq!(group.members, Some(vec![]));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get_missing_group_is_not_found() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/projects/pid/regions/eu01/affinity-groups/agid")
            .with_status(404)
            .with_body(r#"{"code":404,"message":"affinity group not found"}"#)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let error = client
            .iaas()
            .affinity_groups()
            .get("pid", "eu01", "agid")
            .await
            .unwrap_err();

        assert!(error.is_not_found());
    }
}
