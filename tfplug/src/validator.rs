//! Built-in attribute validators

use crate::schema::{Validator, ValidatorRequest, ValidatorResponse};
use crate::types::{AttributePath, Diagnostic, Dynamic};

fn invalid(path: &AttributePath, summary: String, detail: String) -> ValidatorResponse {
    ValidatorResponse {
        diagnostics: vec![Diagnostic::error(summary, detail).with_attribute(path.clone())],
    }
}

pub struct StringLengthValidator {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl StringLengthValidator {
    pub fn between(min: usize, max: usize) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn at_least(min: usize) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }
}

impl Validator for StringLengthValidator {
    fn description(&self) -> String {
        format!(
            "string length must be between {} and {}",
            self.min.unwrap_or(0),
            self.max.map_or("unbounded".to_string(), |m| m.to_string())
        )
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let Some(s) = request.config_value.as_string() else {
            return ValidatorResponse::default();
        };
        let len = s.chars().count();

        if let Some(min) = self.min {
            if len < min {
                return invalid(
                    &request.path,
                    format!("{} must have minimum length of {}", request.path, min),
                    format!("Got length {}", len),
                );
            }
        }
        if let Some(max) = self.max {
            if len > max {
                return invalid(
                    &request.path,
                    format!("{} must have maximum length of {}", request.path, max),
                    format!("Got length {}", len),
                );
            }
        }
        ValidatorResponse::default()
    }
}

pub struct StringPatternValidator {
    pub pattern: regex::Regex,
    pub description: String,
}

impl StringPatternValidator {
    pub fn new(pattern: regex::Regex, description: impl Into<String>) -> Self {
        Self {
            pattern,
            description: description.into(),
        }
    }
}

impl Validator for StringPatternValidator {
    fn description(&self) -> String {
        format!("value must match {}", self.description)
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        match request.config_value.as_string() {
            Some(s) if !self.pattern.is_match(s) => invalid(
                &request.path,
                format!("{} must match {}", request.path, self.description),
                format!("Value '{}' does not match pattern", s),
            ),
            _ => ValidatorResponse::default(),
        }
    }
}

/// Accepts only one of a fixed set of strings
pub struct OneOfValidator {
    pub values: Vec<String>,
}

impl OneOfValidator {
    pub fn new(values: &[&str]) -> Self {
        Self {
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }
}

impl Validator for OneOfValidator {
    fn description(&self) -> String {
        format!("value must be one of: {}", self.values.join(", "))
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        match request.config_value.as_string() {
            Some(s) if !self.values.iter().any(|v| v == s) => invalid(
                &request.path,
                format!("Invalid value for {}", request.path),
                format!(
                    "Value '{}' must be one of: {}",
                    s,
                    self.values
                        .iter()
                        .map(|v| format!("\"{}\"", v))
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            ),
            _ => ValidatorResponse::default(),
        }
    }
}

/// Accepts strings that parse as a UUID
pub struct UuidValidator;

impl Validator for UuidValidator {
    fn description(&self) -> String {
        "value must be a valid UUID".to_string()
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        match request.config_value.as_string() {
            Some(s) if uuid::Uuid::parse_str(s).is_err() => invalid(
                &request.path,
                format!("{} must be a valid UUID", request.path),
                format!("Value '{}' is not a UUID", s),
            ),
            _ => ValidatorResponse::default(),
        }
    }
}

/// Accepts RFC 3339 timestamps
pub struct Rfc3339Validator;

impl Validator for Rfc3339Validator {
    fn description(&self) -> String {
        "value must be an RFC 3339 timestamp".to_string()
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        match request.config_value.as_string() {
            Some(s) if chrono::DateTime::parse_from_rfc3339(s).is_err() => invalid(
                &request.path,
                format!("{} must be an RFC 3339 timestamp", request.path),
                format!("Value '{}' could not be parsed", s),
            ),
            _ => ValidatorResponse::default(),
        }
    }
}

pub struct NumberRangeValidator {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl NumberRangeValidator {
    pub fn between(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn at_least(min: f64) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }
}

impl Validator for NumberRangeValidator {
    fn description(&self) -> String {
        format!("number must be within {:?}..={:?}", self.min, self.max)
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let Some(n) = request.config_value.as_number() else {
            return ValidatorResponse::default();
        };

        if let Some(min) = self.min {
            if n < min {
                return invalid(
                    &request.path,
                    format!("{} must be at least {}", request.path, min),
                    format!("Got {}", n),
                );
            }
        }
        if let Some(max) = self.max {
            if n > max {
                return invalid(
                    &request.path,
                    format!("{} must be at most {}", request.path, max),
                    format!("Got {}", n),
                );
            }
        }
        ValidatorResponse::default()
    }
}

pub struct ListLengthValidator {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl ListLengthValidator {
    pub fn at_least(min: usize) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }
}

impl Validator for ListLengthValidator {
    fn description(&self) -> String {
        format!("list length must be within {:?}..={:?}", self.min, self.max)
    }

    fn validate(&self, request: ValidatorRequest) -> ValidatorResponse {
        let Dynamic::List(items) = &request.config_value else {
            return ValidatorResponse::default();
        };

        if let Some(min) = self.min {
            if items.len() < min {
                return invalid(
                    &request.path,
                    format!("{} must have at least {} items", request.path, min),
                    format!("Got {} items", items.len()),
                );
            }
        }
        if let Some(max) = self.max {
            if items.len() > max {
                return invalid(
                    &request.path,
                    format!("{} must have at most {} items", request.path, max),
                    format!("Got {} items", items.len()),
                );
            }
        }
        ValidatorResponse::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(validator: &dyn Validator, value: Dynamic) -> ValidatorResponse {
        validator.validate(ValidatorRequest {
            config_value: value,
            path: AttributePath::new("attr"),
        })
    }

    #[test]
    fn string_length_bounds() {
        let validator = StringLengthValidator::between(1, 5);
        assert!(run(&validator, Dynamic::from("abc")).diagnostics.is_empty());
        assert_eq!(run(&validator, Dynamic::from("")).diagnostics.len(), 1);
        assert_eq!(run(&validator, Dynamic::from("abcdef")).diagnostics.len(), 1);
    }

    #[test]
    fn pattern_rejects_mismatch() {
        let validator = StringPatternValidator::new(
            regex::Regex::new(r"^[a-z0-9]+$").unwrap(),
            "lowercase alphanumerics",
        );
        assert!(run(&validator, Dynamic::from("abc1")).diagnostics.is_empty());

        let response = run(&validator, Dynamic::from("ABC"));
        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(
            response.diagnostics[0].attribute,
            Some(AttributePath::new("attr"))
        );
    }

    #[test]
    fn one_of_lists_allowed_values() {
        let validator = OneOfValidator::new(&["hard-affinity", "soft-anti-affinity"]);
        assert!(run(&validator, Dynamic::from("hard-affinity"))
            .diagnostics
            .is_empty());

        let response = run(&validator, Dynamic::from("other"));
        assert!(response.diagnostics[0].detail.contains("\"hard-affinity\""));
    }

    #[test]
    fn uuid_validator() {
        assert!(run(
            &UuidValidator,
            Dynamic::from("4ad4a3b4-69c3-4d7c-a0b4-62ffad0b1c0e")
        )
        .diagnostics
        .is_empty());
        assert_eq!(run(&UuidValidator, Dynamic::from("nope")).diagnostics.len(), 1);
    }

    #[test]
    fn rfc3339_validator() {
        assert!(run(&Rfc3339Validator, Dynamic::from("2024-01-01T00:00:00Z"))
            .diagnostics
            .is_empty());
        assert_eq!(
            run(&Rfc3339Validator, Dynamic::from("2024-01-01")).diagnostics.len(),
            1
        );
    }

    #[test]
    fn number_range() {
        let validator = NumberRangeValidator::between(1.0, 3.0);
        assert!(run(&validator, Dynamic::Number(2.0)).diagnostics.is_empty());
        assert_eq!(run(&validator, Dynamic::Number(0.0)).diagnostics.len(), 1);
        assert_eq!(run(&validator, Dynamic::Number(4.0)).diagnostics.len(), 1);
    }

    #[test]
    fn list_length_minimum() {
        let validator = ListLengthValidator::at_least(1);
        assert_eq!(run(&validator, Dynamic::List(vec![])).diagnostics.len(), 1);
        assert!(run(&validator, Dynamic::List(vec![Dynamic::from("a")]))
            .diagnostics
            .is_empty());
    }
}
