//! Machine type API (read only)

use crate::api::common::{project_region_path, ItemsResponse};
use crate::api::{ApiError, Client, Service};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineType {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Disk size in GB
    #[serde(default)]
    pub disk: Option<i64>,
    /// Memory in MB
    #[serde(default)]
    pub ram: Option<i64>,
    #[serde(default)]
    pub vcpus: Option<i64>,
    #[serde(default)]
    pub extra_specs: Option<HashMap<String, serde_json::Value>>,
}

pub struct MachineTypesApi<'a> {
    client: &'a Client,
}

impl<'a> MachineTypesApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// GET /v2/projects/{projectId}/regions/{region}/machine-types
    pub async fn list(&self, project_id: &str, region: &str) -> Result<Vec<MachineType>, ApiError> {
        let path = format!("{}/machine-types", project_region_path(project_id, region));
        let response: ItemsResponse<MachineType> = self.client.get(Service::Iaas, &path).await?;
        Ok(response.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_helpers::create_test_client;
    use mockito::Server;

    #[tokio::test]
    async fn list_unwraps_items() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/projects/pid/regions/eu02/machine-types")
            .with_body(
                r#"{"items":[
                    {"name":"c1.2","vcpus":2,"ram":4096,"disk":20,"extraSpecs":{"cpu":"intel"}},
                    {"name":"g1.1","vcpus":1,"ram":1024}
                ]}"#,
            )
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let types = client
            .iaas()
            .machine_types()
            .list("pid", "eu02")
            .await
            .unwrap();

        assert_eq!(types.len(), 2);
        assert_eq!(types[0].vcpus, Some(2));
        assert_eq!(
            types[0].extra_specs.as_ref().unwrap()["cpu"],
            serde_json::json!("intel")
        );
        assert_eq!(types[1].disk, None);
    }
}
