pub mod affinity_group;
pub mod network_area_route;
pub mod public_ip_associate;
pub mod routing_table;

pub use affinity_group::AffinityGroupResource;
pub use network_area_route::NetworkAreaRouteResource;
pub use public_ip_associate::PublicIpAssociateResource;
pub use routing_table::RoutingTableResource;

use super::not_configured;
