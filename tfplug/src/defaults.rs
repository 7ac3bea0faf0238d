//! Default value providers for attributes
//!
//! Defaults are evaluated during planning when an optional attribute is
//! absent from configuration. They run before plan modifiers, so a modifier
//! sees the defaulted value.
//!
//! ```no_run
//! use tfplug::schema::{AttributeBuilder, AttributeType};
//! use tfplug::defaults::StaticDefault;
//!
//! let system_routes = AttributeBuilder::new("system_routes", AttributeType::Bool)
//!     .optional()
//!     .computed()
//!     .default(StaticDefault::bool(true))
//!     .build();
//! ```

use crate::schema::{AttributeDefault, DefaultRequest, DefaultResponse};
use crate::types::Dynamic;

/// StaticDefault provides a static default value
pub struct StaticDefault {
    value: Dynamic,
}

impl StaticDefault {
    pub fn new(value: Dynamic) -> Self {
        Self { value }
    }

    pub fn string(value: &str) -> Self {
        Self::new(Dynamic::String(value.to_string()))
    }

    pub fn number(value: f64) -> Self {
        Self::new(Dynamic::Number(value))
    }

    pub fn bool(value: bool) -> Self {
        Self::new(Dynamic::Bool(value))
    }
}

impl AttributeDefault for StaticDefault {
    fn description(&self) -> String {
        format!("static default value: {:?}", self.value)
    }

    fn default_value(&self, _request: DefaultRequest) -> DefaultResponse {
        DefaultResponse {
            value: self.value.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttributePath;

    fn evaluate(default: &dyn AttributeDefault) -> Dynamic {
        default
            .default_value(DefaultRequest {
                path: AttributePath::new("test"),
            })
            .value
    }

    #[test]
    fn static_default_string() {
        assert_eq!(evaluate(&StaticDefault::string("eu01")), Dynamic::from("eu01"));
    }

    #[test]
    fn static_default_number() {
        assert_eq!(evaluate(&StaticDefault::number(30.0)), Dynamic::Number(30.0));
    }

    #[test]
    fn static_default_bool() {
        assert_eq!(evaluate(&StaticDefault::bool(true)), Dynamic::Bool(true));
    }
}
