//! Data sources
//!
//! Lookups reuse the field mapping of the matching resource. A missing object
//! is an error here, unlike resources which drop it from state.

pub mod affinity_group;
pub mod machine_type;
pub mod postgresflex_user;
pub mod routing_table;

pub use affinity_group::AffinityGroupDataSource;
pub use machine_type::MachineTypeDataSource;
pub use postgresflex_user::PostgresFlexUserDataSource;
pub use routing_table::RoutingTableDataSource;

use crate::api::ApiError;
use crate::resources::not_configured;
use crate::utils::error_diagnostic;
use tfplug::data_source::ReadDataSourceResponse;
use tfplug::{Diagnostic, DynamicValue};

/// Diagnostic for a failed lookup, naming the object when the API reports it missing
pub(crate) fn read_error(what: &str, id: &str, error: ApiError) -> Diagnostic {
    if error.is_not_found() {
        tracing::warn!(%id, "{} not found", what);
        return Diagnostic::error(
            format!("{} not found", what),
            format!("The {} {} does not exist or is not accessible.", what, id),
        );
    }
    error_diagnostic(&format!("Error reading {}", what), error)
}

pub(crate) fn failed(diagnostic: Diagnostic) -> ReadDataSourceResponse {
    ReadDataSourceResponse {
        state: DynamicValue::null(),
        diagnostics: vec![diagnostic],
    }
}

pub(crate) fn unconfigured() -> ReadDataSourceResponse {
    failed(not_configured())
}
