//! Common types shared by the STACKIT service APIs

use serde::{Deserialize, Serialize};

/// Single object envelope: `{"item": {...}}`
#[derive(Debug, Deserialize)]
pub struct ItemResponse<T> {
    pub item: T,
}

/// Collection envelope: `{"items": [...]}`
#[derive(Debug, Deserialize, Serialize)]
pub struct ItemsResponse<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// Error body returned by the STACKIT APIs
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Prefix of every project scoped, regional path
pub fn project_region_path(project_id: &str, region: &str) -> String {
    format!(
        "/v2/projects/{}/regions/{}",
        urlencoding::encode(project_id),
        urlencoding::encode(region)
    )
}

/// Prefix of every network area scoped, regional path
pub fn network_area_region_path(
    version: &str,
    organization_id: &str,
    network_area_id: &str,
    region: &str,
) -> String {
    format!(
        "/{}/organizations/{}/network-areas/{}/regions/{}",
        version,
        urlencoding::encode(organization_id),
        urlencoding::encode(network_area_id),
        urlencoding::encode(region)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_encode_segments() {
        assert_eq!(
            project_region_path("pid", "eu01"),
            "/v2/projects/pid/regions/eu01"
        );
        assert_eq!(
            network_area_region_path("v2", "org", "na 1", "eu01"),
            "/v2/organizations/org/network-areas/na%201/regions/eu01"
        );
    }

    #[test]
    fn items_default_to_empty() {
        let parsed: ItemsResponse<String> = serde_json::from_str("{}").unwrap();
        assert!(parsed.items.is_empty());
    }
}
