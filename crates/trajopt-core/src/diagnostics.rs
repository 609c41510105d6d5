//! Issues recorded during a solve that do not abort it.
//!
//! Ignored guess columns, a time-stepping starting guess and a backend that
//! stopped short of convergence all end up here and travel with the
//! solution.

use serde::Serialize;

/// One recorded issue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    /// Pipeline stage that raised it: "guess", "solver", ...
    pub source: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
}

impl Issue {
    fn new(source: &str, message: &str) -> Self {
        Self {
            source: source.to_string(),
            message: message.to_string(),
            variable: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Issue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Issue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, source: &str, message: &str) {
        self.warnings.push(Issue::new(source, message));
    }

    /// Warning tied to a named variable or column.
    pub fn warn_about(&mut self, source: &str, message: &str, variable: &str) {
        self.warnings.push(Issue {
            variable: Some(variable.to_string()),
            ..Issue::new(source, message)
        });
    }

    pub fn error(&mut self, source: &str, message: &str) {
        self.errors.push(Issue::new(source, message));
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let mut diag = Diagnostics::new();
        diag.warn("guess", "time-stepping guess");
        diag.warn_about("guess", "column ignored", "extra");
        assert_eq!(diag.warning_count(), 2);
        assert!(!diag.has_errors());

        diag.error("solver", "iteration limit");
        assert_eq!(diag.error_count(), 1);
        assert!(diag.has_errors());
        assert_eq!(diag.warnings[1].variable.as_deref(), Some("extra"));
    }

    #[test]
    fn test_serialization_skips_empty() {
        let mut diag = Diagnostics::new();
        assert_eq!(serde_json::to_string(&diag).unwrap(), "{}");

        diag.warn("guess", "plain");
        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("\"warnings\""));
        assert!(!json.contains("\"errors\""));
        assert!(!json.contains("\"variable\""));
    }
}
