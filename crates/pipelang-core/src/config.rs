//! Inference pass options
//!
//! Options are plain data with serde defaults, so a driver can load them
//! from a TOML or JSON file and override single fields with the builder
//! setters.

use crate::infer::cast::CastRules;
use crate::infer::solver::VisitOrder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default width of an integer literal written without one
pub const DEFAULT_LITERAL_WIDTH: u32 = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse TOML options: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to parse JSON options: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value for `{option}`: {reason}")]
    Invalid { option: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InferOptions {
    /// Width given to unsized integer literals
    pub default_literal_width: u32,
    /// Solver pass budget; derived from the graph size when unset
    pub max_passes: Option<usize>,
    /// Stop building the graph at the first structural error
    pub stop_on_structural_error: bool,
    pub visit_order: VisitOrder,
    pub cast_rules: CastRules,
}

impl Default for InferOptions {
    fn default() -> Self {
        Self {
            default_literal_width: DEFAULT_LITERAL_WIDTH,
            max_passes: None,
            stop_on_structural_error: false,
            visit_order: VisitOrder::default(),
            cast_rules: CastRules::default(),
        }
    }
}

impl InferOptions {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let options: Self = toml::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let options: Self = serde_json::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_literal_width == 0 {
            return Err(ConfigError::Invalid {
                option: "default_literal_width",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_passes == Some(0) {
            return Err(ConfigError::Invalid {
                option: "max_passes",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn with_default_literal_width(mut self, width: u32) -> Self {
        self.default_literal_width = width;
        self
    }

    pub fn with_max_passes(mut self, passes: usize) -> Self {
        self.max_passes = Some(passes);
        self
    }

    pub fn with_stop_on_structural_error(mut self, stop: bool) -> Self {
        self.stop_on_structural_error = stop;
        self
    }

    pub fn with_visit_order(mut self, order: VisitOrder) -> Self {
        self.visit_order = order;
        self
    }

    pub fn with_cast_rules(mut self, rules: CastRules) -> Self {
        self.cast_rules = rules;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = InferOptions::default();
        assert_eq!(options.default_literal_width, 32);
        assert_eq!(options.visit_order, VisitOrder::Dependency);
        assert_eq!(options.cast_rules, CastRules::Permissive);
        assert!(options.max_passes.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let options = InferOptions::from_toml_str(
            r#"
            default_literal_width = 16
            visit_order = "reverse"
            cast_rules = "width-preserving"
            "#,
        )
        .unwrap();
        assert_eq!(options.default_literal_width, 16);
        assert_eq!(options.visit_order, VisitOrder::Reverse);
        assert_eq!(options.cast_rules, CastRules::WidthPreserving);
        assert!(!options.stop_on_structural_error);
    }

    #[test]
    fn test_json_options() {
        let options = InferOptions::from_json_str(r#"{"max_passes": 40, "stop_on_structural_error": true}"#).unwrap();
        assert_eq!(options.max_passes, Some(40));
        assert!(options.stop_on_structural_error);
    }

    #[test]
    fn test_rejects_unknown_and_invalid_options() {
        assert!(matches!(
            InferOptions::from_toml_str("literal_width = 8"),
            Err(ConfigError::Toml(_))
        ));
        assert!(matches!(
            InferOptions::from_json_str(r#"{"default_literal_width": 0}"#),
            Err(ConfigError::Invalid {
                option: "default_literal_width",
                ..
            })
        ));
        assert!(matches!(
            InferOptions::from_toml_str("visit_order = \"explicit\""),
            Err(ConfigError::Toml(_))
        ));
    }
}
