//! Reconciliation helpers shared by every resource
//!
//! Composite identifiers, region fallback during planning and the
//! null/empty/absent rules used when API responses are mapped back into
//! Terraform state.

pub mod lock;

pub use lock::KeyedLock;

use std::collections::HashMap;
use std::fmt::Display;
use tfplug::resource::{ImportResourceStateRequest, ImportResourceStateResponse, ModifyPlanRequest, ModifyPlanResponse};
use tfplug::{AttributePath, Diagnostic, Dynamic};
use thiserror::Error;

pub const REGION: &str = "region";

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("Expected import identifier with format: {expected} Got: {got:?}")]
    Format { expected: String, got: String },
}

/// Joins the identifying fields into the `id` attribute
pub fn build_internal_id(parts: &[&str]) -> String {
    parts.join(",")
}

/// Splits a comma separated import identifier into exactly `fields.len()`
/// non-empty parts
pub fn parse_import_id(id: &str, fields: &[&str]) -> Result<Vec<String>, IdError> {
    let parts: Vec<&str> = id.split(',').collect();

    if parts.len() != fields.len() || parts.iter().any(|part| part.is_empty()) {
        let expected = fields
            .iter()
            .map(|field| format!("[{}]", field))
            .collect::<Vec<_>>()
            .join(",");
        return Err(IdError::Format {
            expected,
            got: id.to_string(),
        });
    }

    Ok(parts.into_iter().map(str::to_string).collect())
}

/// Parses a composite import id and seeds the imported state with its parts
pub fn import_composite_id(
    request: &ImportResourceStateRequest,
    fields: &[&str],
    response: &mut ImportResourceStateResponse,
) {
    match parse_import_id(&request.id, fields) {
        Ok(parts) => {
            let attributes = fields
                .iter()
                .zip(parts)
                .map(|(field, value)| (AttributePath::new(field), value))
                .collect();
            tfplug::import_state_with_attributes(request, attributes, response);
        }
        Err(e) => response
            .diagnostics
            .push(Diagnostic::error("Error importing resource", e.to_string())),
    }
}

/// Region fallback during planning.
///
/// The intended region is the configured one, or the provider default when the
/// configuration leaves it null. A plan that disagrees is corrected, and moving
/// an existing object to another region replaces it.
pub fn adapt_region(request: &ModifyPlanRequest, default_region: &str, response: &mut ModifyPlanResponse) {
    let path = AttributePath::new(REGION);

    let intended = match request.config.get(&path) {
        Some(Dynamic::String(region)) => region.clone(),
        Some(Dynamic::Unknown) => return,
        _ => default_region.to_string(),
    };

    if response.planned_state.optional_string(&path).as_deref() == Some(intended.as_str()) {
        return;
    }

    if let Err(e) = response.planned_state.set(&path, intended.as_str()) {
        response.diagnostics.push(
            Diagnostic::error("Error adapting region", e.to_string()).with_attribute(path),
        );
        return;
    }

    let prior = request.prior_state.optional_string(&path);
    if prior.is_some_and(|prior| prior != intended) {
        response.requires_replace.push(path);
    }
}

/// Labels as stored in state.
///
/// An absent or empty label map from the API stays null when the prior model
/// had no labels and becomes an empty map when it did.
pub fn map_labels(
    api: Option<&HashMap<String, String>>,
    prior: Option<&HashMap<String, String>>,
) -> Option<HashMap<String, String>> {
    match api {
        Some(labels) if !labels.is_empty() => Some(labels.clone()),
        _ => prior.map(|_| HashMap::new()),
    }
}

/// Labels sent on update, null clears every label
pub fn labels_payload(labels: Option<&HashMap<String, String>>) -> HashMap<String, String> {
    labels.cloned().unwrap_or_default()
}

/// Keeps the prior order for elements the API still reports, then appends the
/// new ones in API order
pub fn reconcile_string_lists(prior: &[String], api: &[String]) -> Vec<String> {
    let mut result: Vec<String> = prior
        .iter()
        .filter(|element| api.contains(element))
        .cloned()
        .collect();

    for element in api {
        if !result.contains(element) {
            result.push(element.clone());
        }
    }

    result
}

/// RFC 3339 timestamp at second precision, in the offset the API used.
/// Values that don't parse are kept as they are.
pub fn format_timestamp(raw: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(raw) {
        Ok(time) => time.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        Err(_) => raw.to_string(),
    }
}

/// Error diagnostic for a failed operation
pub fn error_diagnostic(summary: &str, detail: impl Display) -> Diagnostic {
    tracing::error!("{}: {}", summary, detail);
    Diagnostic::error(summary, format!("Calling API: {}", detail))
}
