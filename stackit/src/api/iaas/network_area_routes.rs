//! Network area route API

use crate::api::common::{network_area_region_path, ItemsResponse};
use crate::api::{ApiError, Client, Service};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Typed address, e.g. `{"type": "cidrv4", "value": "10.0.0.0/24"}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypedValue {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub destination: TypedValue,
    pub nexthop: TypedValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Request body for creating routes, the API creates them in batches
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CreateRoutesRequest {
    pub items: Vec<Route>,
}

/// Request body for updating a route, only labels can change
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UpdateRouteRequest {
    pub labels: HashMap<String, String>,
}

pub struct NetworkAreaRoutesApi<'a> {
    client: &'a Client,
}

impl<'a> NetworkAreaRoutesApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    fn path(organization_id: &str, network_area_id: &str, region: &str) -> String {
        format!(
            "{}/routes",
            network_area_region_path("v2", organization_id, network_area_id, region)
        )
    }

    fn route_path(organization_id: &str, network_area_id: &str, region: &str, route_id: &str) -> String {
        format!(
            "{}/{}",
            Self::path(organization_id, network_area_id, region),
            urlencoding::encode(route_id)
        )
    }

    /// POST /v2/organizations/{organizationId}/network-areas/{areaId}/regions/{region}/routes
    pub async fn create(
        &self,
        organization_id: &str,
        network_area_id: &str,
        region: &str,
        request: &CreateRoutesRequest,
    ) -> Result<Vec<Route>, ApiError> {
        let path = Self::path(organization_id, network_area_id, region);
        let response: ItemsResponse<Route> =
            self.client.post(Service::Iaas, &path, request).await?;
        Ok(response.items)
    }

    /// GET /v2/organizations/{organizationId}/network-areas/{areaId}/regions/{region}/routes/{routeId}
    pub async fn get(
        &self,
        organization_id: &str,
        network_area_id: &str,
        region: &str,
        route_id: &str,
    ) -> Result<Route, ApiError> {
        let path = Self::route_path(organization_id, network_area_id, region, route_id);
        self.client.get(Service::Iaas, &path).await
    }

    /// PATCH /v2/organizations/{organizationId}/network-areas/{areaId}/regions/{region}/routes/{routeId}
    pub async fn update(
        &self,
        organization_id: &str,
        network_area_id: &str,
        region: &str,
        route_id: &str,
        request: &UpdateRouteRequest,
    ) -> Result<Route, ApiError> {
        let path = Self::route_path(organization_id, network_area_id, region, route_id);
        self.client.patch(Service::Iaas, &path, request).await
    }

    /// DELETE /v2/organizations/{organizationId}/network-areas/{areaId}/regions/{region}/routes/{routeId}
    pub async fn delete(
        &self,
        organization_id: &str,
        network_area_id: &str,
        region: &str,
        route_id: &str,
    ) -> Result<(), ApiError> {
        let path = Self::route_path(organization_id, network_area_id, region, route_id);
        self.client.delete(Service::Iaas, &path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_helpers::create_test_client;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn create_sends_batch_and_returns_routes() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/organizations/org/network-areas/na/regions/eu01/routes")
            .match_body(Matcher::Json(serde_json::json!({
                "items": [{
                    "destination": {"type": "cidrv4", "value": "10.0.0.0/24"},
                    "nexthop": {"type": "ipv4", "value": "10.1.1.1"},
                    "labels": {"env": "prod"}
                }]
            })))
            .with_body(
                r#"{"items":[{"id":"rid",
                    "destination":{"type":"cidrv4","value":"10.0.0.0/24"},
                    "nexthop":{"type":"ipv4","value":"10.1.1.1"},
                    "labels":{"env":"prod"}}]}"#,
            )
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let routes = client
            .iaas()
            .network_area_routes()
            .create(
                "org",
                "na",
                "eu01",
                &CreateRoutesRequest {
                    items: vec![Route {
                        id: None,
                        destination: TypedValue {
                            kind: "cidrv4".to_string(),
                            value: Some("10.0.0.0/24".to_string()),
                        },
                        nexthop: TypedValue {
                            kind: "ipv4".to_string(),
                            value: Some("10.1.1.1".to_string()),
                        },
                        labels: Some(HashMap::from([("env".to_string(), "prod".to_string())])),
                        created_at: None,
                        updated_at: None,
                    }],
                },
            )
            .await
            .unwrap();

        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].id.as_deref(), Some("rid"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn update_patches_labels() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PATCH", "/v2/organizations/org/network-areas/na/regions/eu01/routes/rid")
            .match_body(Matcher::Json(serde_json::json!({"labels": {}})))
            .with_body(
                r#"{"id":"rid","destination":{"type":"cidrv4","value":"10.0.0.0/24"},
                    "nexthop":{"type":"blackhole"}}"#,
            )
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let route = client
            .iaas()
            .network_area_routes()
            .update(
                "org",
                "na",
                "eu01",
                "rid",
                &UpdateRouteRequest {
                    labels: HashMap::new(),
                },
            )
            .await
            .unwrap();

        assert_eq!(route.nexthop.kind, "blackhole");
        assert_eq!(route.nexthop.value, None);
        mock.assert_async().await;
    }
}
