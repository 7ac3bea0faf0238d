//! Managed resources, grouped by STACKIT service

pub mod iaas;
pub mod postgresflex;
pub mod ske;

use tfplug::Diagnostic;

pub use iaas::{AffinityGroupResource, NetworkAreaRouteResource, PublicIpAssociateResource, RoutingTableResource};
pub use postgresflex::{PostgresFlexInstanceResource, PostgresFlexUserResource};
pub use ske::SkeClusterResource;

/// Returned when an operation runs before ConfigureProvider
pub(crate) fn not_configured() -> Diagnostic {
    Diagnostic::error(
        "Provider not configured",
        "The provider hasn't been configured before this operation. \
         This usually means the provider block is missing or invalid.",
    )
}
