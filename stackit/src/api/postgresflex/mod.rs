//! PostgreSQL Flex API: managed database instances and their users

pub mod instances;
pub mod users;

use crate::api::Client;

pub struct PostgresFlexApi<'a> {
    client: &'a Client,
}

impl<'a> PostgresFlexApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub fn instances(&self) -> instances::InstancesApi<'a> {
        instances::InstancesApi::new(self.client)
    }

    pub fn users(&self) -> users::UsersApi<'a> {
        users::UsersApi::new(self.client)
    }
}
