//! IaaS API: compute, network and addressing objects

pub mod affinity_groups;
pub mod machine_types;
pub mod network_area_routes;
pub mod public_ips;
pub mod routing_tables;

use crate::api::Client;

/// IaaS API providing compute and network operations
pub struct IaasApi<'a> {
    client: &'a Client,
}

impl<'a> IaasApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub fn affinity_groups(&self) -> affinity_groups::AffinityGroupsApi<'a> {
        affinity_groups::AffinityGroupsApi::new(self.client)
    }

    pub fn machine_types(&self) -> machine_types::MachineTypesApi<'a> {
        machine_types::MachineTypesApi::new(self.client)
    }

    pub fn network_area_routes(&self) -> network_area_routes::NetworkAreaRoutesApi<'a> {
        network_area_routes::NetworkAreaRoutesApi::new(self.client)
    }

    pub fn public_ips(&self) -> public_ips::PublicIpsApi<'a> {
        public_ips::PublicIpsApi::new(self.client)
    }

    pub fn routing_tables(&self) -> routing_tables::RoutingTablesApi<'a> {
        routing_tables::RoutingTablesApi::new(self.client)
    }
}
