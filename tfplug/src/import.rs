//! Import helpers for simplifying resource import implementations

use crate::context::Context;
use crate::resource::{ImportResourceStateRequest, ImportResourceStateResponse, ImportedResource};
use crate::types::{AttributePath, Diagnostic, DynamicValue};

/// Sets the import ID to a specific attribute in state
///
/// Example: ID "vm-123" -> state.id = "vm-123"
pub fn import_state_passthrough_id(
    _ctx: &Context,
    attr_path: AttributePath,
    request: &ImportResourceStateRequest,
    response: &mut ImportResourceStateResponse,
) {
    import_state_with_attributes(request, vec![(attr_path, request.id.clone())], response);
}

/// Seeds the imported state with several attributes, typically the parts of
/// a composite import identifier. The following ReadResource fills the rest.
pub fn import_state_with_attributes(
    request: &ImportResourceStateRequest,
    attributes: Vec<(AttributePath, String)>,
    response: &mut ImportResourceStateResponse,
) {
    let mut state = DynamicValue::object();

    for (path, value) in attributes {
        if let Err(e) = state.set_string(&path, value) {
            response.diagnostics.push(
                Diagnostic::error(
                    "Failed to set imported attribute",
                    format!("Could not set attribute '{}': {}", path, e),
                )
                .with_attribute(path),
            );
            return;
        }
    }

    response.imported_resources.push(ImportedResource {
        type_name: request.type_name.clone(),
        state,
        private: Vec::new(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: &str) -> ImportResourceStateRequest {
        ImportResourceStateRequest {
            type_name: "test_resource".to_string(),
            id: id.to_string(),
        }
    }

    #[test]
    fn passthrough_sets_id_attribute() {
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
        };

        import_state_passthrough_id(
            &Context::new(),
            AttributePath::new("id"),
            &request("abc"),
            &mut response,
        );

        assert!(response.diagnostics.is_empty());
        let imported = &response.imported_resources[0];
        assert_eq!(imported.type_name, "test_resource");
        assert_eq!(
            imported.state.get_string(&AttributePath::new("id")).unwrap(),
            "abc"
        );
    }

    #[test]
    fn attributes_are_all_seeded() {
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
        };

        import_state_with_attributes(
            &request("p,eu01,g"),
            vec![
                (AttributePath::new("project_id"), "p".to_string()),
                (AttributePath::new("region"), "eu01".to_string()),
            ],
            &mut response,
        );

        let state = &response.imported_resources[0].state;
        assert_eq!(
            state.get_string(&AttributePath::new("project_id")).unwrap(),
            "p"
        );
        assert_eq!(state.get_string(&AttributePath::new("region")).unwrap(), "eu01");
    }
}
