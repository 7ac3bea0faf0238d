//! Built-in attribute plan modifiers
//!
//! Plan modifiers run after defaults have been applied and can:
//! - Modify the planned value
//! - Mark an attribute as requiring replacement
//! - Add warnings or errors to the plan

use crate::schema::{PlanModifier, PlanModifierRequest, PlanModifierResponse};
use crate::types::{Diagnostic, Dynamic};

/// Marks an attribute as requiring replacement when it changes
///
/// Never triggers while creating (null state) or while the planned value is unknown.
pub struct RequiresReplace;

impl PlanModifier for RequiresReplace {
    fn description(&self) -> String {
        "changing this attribute forces the resource to be replaced".to_string()
    }

    fn modify(&self, request: PlanModifierRequest) -> PlanModifierResponse {
        let requires_replace = value_changed(&request.state_value, &request.plan_value);

        PlanModifierResponse {
            plan_value: request.plan_value,
            requires_replace,
            diagnostics: Vec::new(),
        }
    }
}

/// Like RequiresReplace, but only when the attribute is set in configuration
///
/// Used for optional+computed attributes whose server-side value may drift
/// without the user asking for anything.
pub struct RequiresReplaceIfConfigured;

impl PlanModifier for RequiresReplaceIfConfigured {
    fn description(&self) -> String {
        "changing the configured value forces the resource to be replaced".to_string()
    }

    fn modify(&self, request: PlanModifierRequest) -> PlanModifierResponse {
        let requires_replace = !request.config_value.is_null()
            && value_changed(&request.state_value, &request.plan_value);

        PlanModifierResponse {
            plan_value: request.plan_value,
            requires_replace,
            diagnostics: Vec::new(),
        }
    }
}

/// Uses the prior state value when the planned value is unknown
///
/// Keeps stable computed attributes (ids, creation timestamps) from showing
/// as "known after apply" on every update.
pub struct UseStateForUnknown;

impl PlanModifier for UseStateForUnknown {
    fn description(&self) -> String {
        "once set, the value of this attribute in state will not change".to_string()
    }

    fn modify(&self, request: PlanModifierRequest) -> PlanModifierResponse {
        let plan_value = match (&request.plan_value, &request.state_value) {
            (Dynamic::Unknown, state) if !state.is_null() => state.clone(),
            _ => request.plan_value,
        };

        PlanModifierResponse {
            plan_value,
            requires_replace: false,
            diagnostics: Vec::new(),
        }
    }
}

/// Requires replacement when the predicate holds for the request
pub struct RequiresReplaceIf<F>
where
    F: Fn(&PlanModifierRequest) -> bool + Send + Sync,
{
    predicate: F,
    description: String,
}

impl<F> RequiresReplaceIf<F>
where
    F: Fn(&PlanModifierRequest) -> bool + Send + Sync,
{
    pub fn new(predicate: F, description: impl Into<String>) -> Self {
        Self {
            predicate,
            description: description.into(),
        }
    }
}

impl<F> PlanModifier for RequiresReplaceIf<F>
where
    F: Fn(&PlanModifierRequest) -> bool + Send + Sync,
{
    fn description(&self) -> String {
        self.description.clone()
    }

    fn modify(&self, request: PlanModifierRequest) -> PlanModifierResponse {
        let requires_replace = !request.state_value.is_null() && (self.predicate)(&request);
        let mut diagnostics = Vec::new();

        if requires_replace {
            diagnostics.push(
                Diagnostic::warning(
                    format!("Attribute '{}' requires resource replacement", request.path),
                    self.description.clone(),
                )
                .with_attribute(request.path.clone()),
            );
        }

        PlanModifierResponse {
            plan_value: request.plan_value,
            requires_replace,
            diagnostics,
        }
    }
}

fn value_changed(state: &Dynamic, plan: &Dynamic) -> bool {
    !state.is_null() && !plan.is_unknown() && state != plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttributePath;

    fn request(config: Dynamic, state: Dynamic, plan: Dynamic) -> PlanModifierRequest {
        PlanModifierRequest {
            config_value: config,
            state_value: state,
            plan_value: plan,
            path: AttributePath::new("name"),
        }
    }

    #[test]
    fn requires_replace_on_change() {
        let response = RequiresReplace.modify(request(
            Dynamic::from("new"),
            Dynamic::from("old"),
            Dynamic::from("new"),
        ));
        assert!(response.requires_replace);
    }

    #[test]
    fn requires_replace_ignores_create_and_unknown() {
        let create = RequiresReplace.modify(request(
            Dynamic::from("new"),
            Dynamic::Null,
            Dynamic::from("new"),
        ));
        assert!(!create.requires_replace);

        let unknown = RequiresReplace.modify(request(
            Dynamic::Null,
            Dynamic::from("old"),
            Dynamic::Unknown,
        ));
        assert!(!unknown.requires_replace);
    }

    #[test]
    fn requires_replace_if_configured_skips_unset_attributes() {
        let response = RequiresReplaceIfConfigured.modify(request(
            Dynamic::Null,
            Dynamic::from("old"),
            Dynamic::from("drifted"),
        ));
        assert!(!response.requires_replace);

        let response = RequiresReplaceIfConfigured.modify(request(
            Dynamic::from("new"),
            Dynamic::from("old"),
            Dynamic::from("new"),
        ));
        assert!(response.requires_replace);
    }

    #[test]
    fn use_state_for_unknown_copies_prior_value() {
        let response = UseStateForUnknown.modify(request(
            Dynamic::Null,
            Dynamic::from("id-1"),
            Dynamic::Unknown,
        ));
        assert_eq!(response.plan_value, Dynamic::from("id-1"));

        let response =
            UseStateForUnknown.modify(request(Dynamic::Null, Dynamic::Null, Dynamic::Unknown));
        assert!(response.plan_value.is_unknown());
    }

    #[test]
    fn requires_replace_if_uses_predicate() {
        let modifier = RequiresReplaceIf::new(
            |req: &PlanModifierRequest| req.plan_value.as_string() == Some("recreate"),
            "recreate forces replacement",
        );

        let response = modifier.modify(request(
            Dynamic::from("recreate"),
            Dynamic::from("old"),
            Dynamic::from("recreate"),
        ));
        assert!(response.requires_replace);
        assert_eq!(response.diagnostics.len(), 1);
    }
}
