//! Kubernetes Engine API

pub mod clusters;

use crate::api::Client;

pub struct SkeApi<'a> {
    client: &'a Client,
}

impl<'a> SkeApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub fn clusters(&self) -> clusters::ClustersApi<'a> {
        clusters::ClustersApi::new(self.client)
    }
}
