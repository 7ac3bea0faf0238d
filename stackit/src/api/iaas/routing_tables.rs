//! Routing table API (beta)

use crate::api::common::network_area_region_path;
use crate::api::{ApiError, Client, Service};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const API_VERSION: &str = "v2alpha";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoutingTable {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
    #[serde(default)]
    pub system_routes: Option<bool>,
    #[serde(default)]
    pub default: Option<bool>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Request body for creating routing tables
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoutingTableRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_routes: Option<bool>,
}

/// Request body for updating routing tables
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoutingTableRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

pub struct RoutingTablesApi<'a> {
    client: &'a Client,
}

impl<'a> RoutingTablesApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    fn path(organization_id: &str, network_area_id: &str, region: &str) -> String {
        format!(
            "{}/routing-tables",
            network_area_region_path(API_VERSION, organization_id, network_area_id, region)
        )
    }

    fn table_path(organization_id: &str, network_area_id: &str, region: &str, id: &str) -> String {
        format!(
            "{}/{}",
            Self::path(organization_id, network_area_id, region),
            urlencoding::encode(id)
        )
    }

    /// POST /v2alpha/organizations/{organizationId}/network-areas/{areaId}/regions/{region}/routing-tables
    pub async fn create(
        &self,
        organization_id: &str,
        network_area_id: &str,
        region: &str,
        request: &CreateRoutingTableRequest,
    ) -> Result<RoutingTable, ApiError> {
        let path = Self::path(organization_id, network_area_id, region);
        self.client.post(Service::Iaas, &path, request).await
    }

    /// GET /v2alpha/organizations/{organizationId}/network-areas/{areaId}/regions/{region}/routing-tables/{routingTableId}
    pub async fn get(
        &self,
        organization_id: &str,
        network_area_id: &str,
        region: &str,
        routing_table_id: &str,
    ) -> Result<RoutingTable, ApiError> {
        let path = Self::table_path(organization_id, network_area_id, region, routing_table_id);
        self.client.get(Service::Iaas, &path).await
    }

    /// PATCH /v2alpha/organizations/{organizationId}/network-areas/{areaId}/regions/{region}/routing-tables/{routingTableId}
    pub async fn update(
        &self,
        organization_id: &str,
        network_area_id: &str,
        region: &str,
        routing_table_id: &str,
        request: &UpdateRoutingTableRequest,
    ) -> Result<RoutingTable, ApiError> {
        let path = Self::table_path(organization_id, network_area_id, region, routing_table_id);
        self.client.patch(Service::Iaas, &path, request).await
    }

    /// DELETE /v2alpha/organizations/{organizationId}/network-areas/{areaId}/regions/{region}/routing-tables/{routingTableId}
    pub async fn delete(
        &self,
        organization_id: &str,
        network_area_id: &str,
        region: &str,
        routing_table_id: &str,
    ) -> Result<(), ApiError> {
        let path = Self::table_path(organization_id, network_area_id, region, routing_table_id);
        self.client.delete(Service::Iaas, &path).await
    }
}
