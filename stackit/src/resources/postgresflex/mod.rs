pub mod instance;
pub mod user;

pub use instance::PostgresFlexInstanceResource;
pub use user::PostgresFlexUserResource;

use super::not_configured;
