//! Non-fatal notes recorded while a processing program runs.
//!
//! Degraded evaluation (an unknown vendor operator, a template variant
//! accepted after the retry bound) is not an engine error, but authors need
//! to see it. The evaluator records such events here alongside the
//! `tracing` event it emits.

use std::fmt;

/// What kind of degraded evaluation happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A `customOperator` had no registered implementation; it evaluated to NULL.
    UnresolvedCustomOperator {
        class: Option<String>,
        definition: Option<String>,
    },
    /// A registered custom operator reported a failure; it evaluated to NULL.
    CustomOperatorFailed { key: String, message: String },
    /// Template processing exhausted its retry bound and the last variant
    /// was kept although a `templateConstraint` still failed.
    TemplateConstraintUnsatisfied { attempts: u32 },
}

/// A single diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DiagnosticKind::UnresolvedCustomOperator { class, definition } => write!(
                f,
                "unresolved custom operator (class: {}, definition: {})",
                class.as_deref().unwrap_or("-"),
                definition.as_deref().unwrap_or("-")
            ),
            DiagnosticKind::CustomOperatorFailed { key, message } => {
                write!(f, "custom operator {} failed: {}", key, message)
            }
            DiagnosticKind::TemplateConstraintUnsatisfied { attempts } => write!(
                f,
                "template constraint still failing after {} attempts; last variant kept",
                attempts
            ),
        }
    }
}

/// Collector threaded through evaluation.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: DiagnosticKind) {
        self.entries.push(Diagnostic { kind });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order() {
        let mut d = Diagnostics::new();
        d.record(DiagnosticKind::UnresolvedCustomOperator {
            class: Some("com.example.Op".to_string()),
            definition: None,
        });
        d.record(DiagnosticKind::TemplateConstraintUnsatisfied { attempts: 3 });
        assert_eq!(d.len(), 2);
        assert_eq!(
            d.entries[0].to_string(),
            "unresolved custom operator (class: com.example.Op, definition: -)"
        );
        assert!(d.entries[1].to_string().contains("3 attempts"));
    }
}
