//! Public IP API, used to bind addresses to network interfaces

use crate::api::common::project_region_path;
use crate::api::{ApiError, Client, Service};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicIp {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    /// Interface the address is bound to, null when unbound
    #[serde(default)]
    pub network_interface: Option<String>,
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
}

/// Request body for updating a public IP
///
/// `network_interface: Some(None)` serialises as an explicit null, which
/// unbinds the address.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePublicIpRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_interface: Option<Option<String>>,
}

pub struct PublicIpsApi<'a> {
    client: &'a Client,
}

impl<'a> PublicIpsApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    fn path(project_id: &str, region: &str, public_ip_id: &str) -> String {
        format!(
            "{}/public-ips/{}",
            project_region_path(project_id, region),
            urlencoding::encode(public_ip_id)
        )
    }

    /// GET /v2/projects/{projectId}/regions/{region}/public-ips/{publicIpId}
    pub async fn get(
        &self,
        project_id: &str,
        region: &str,
        public_ip_id: &str,
    ) -> Result<PublicIp, ApiError> {
        self.client
            .get(Service::Iaas, &Self::path(project_id, region, public_ip_id))
            .await
    }

    /// PATCH /v2/projects/{projectId}/regions/{region}/public-ips/{publicIpId}
    pub async fn update(
        &self,
        project_id: &str,
        region: &str,
        public_ip_id: &str,
        request: &UpdatePublicIpRequest,
    ) -> Result<PublicIp, ApiError> {
        self.client
            .patch(
                Service::Iaas,
                &Self::path(project_id, region, public_ip_id),
                request,
            )
            .await
    }
}
