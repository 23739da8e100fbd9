//! Test session provider trait and implementations.
//!
//! A `TestSessionProvider` exposes the per-item results of one test
//! instance to test-level expressions. The engine only reads through it;
//! the provider owns the session state.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::{BaseType, Cardinality, EngineError, Scalar, Value, VariableContext};

// ──────────────────────────────────────────────
// Item results
// ──────────────────────────────────────────────

/// One variable of an item result, with the declaration details
/// test-level expressions need.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawSessionVariable")]
pub struct SessionVariable {
    pub cardinality: Cardinality,
    pub base_type: Option<BaseType>,
    pub value: Value,
    /// NULL for outcome variables and responses without a key.
    pub correct_response: Value,
    pub normal_minimum: Option<f64>,
    pub normal_maximum: Option<f64>,
}

impl SessionVariable {
    pub fn new(cardinality: Cardinality, base_type: Option<BaseType>, value: Value) -> Self {
        SessionVariable {
            cardinality,
            base_type,
            value,
            correct_response: Value::Null,
            normal_minimum: None,
            normal_maximum: None,
        }
    }

    /// Single-valued variable; the signature is taken from the value.
    pub fn single(value: Scalar) -> Self {
        let bt = value.base_type();
        Self::new(Cardinality::Single, Some(bt), Value::Single(value))
    }

    pub fn with_correct_response(mut self, value: Value) -> Self {
        self.correct_response = value;
        self
    }

    pub fn with_normal_range(mut self, minimum: Option<f64>, maximum: Option<f64>) -> Self {
        self.normal_minimum = minimum;
        self.normal_maximum = maximum;
        self
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSessionVariable {
    cardinality: Cardinality,
    #[serde(default)]
    base_type: Option<BaseType>,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    correct_response: serde_json::Value,
    #[serde(default)]
    normal_minimum: Option<f64>,
    #[serde(default)]
    normal_maximum: Option<f64>,
}

impl TryFrom<RawSessionVariable> for SessionVariable {
    type Error = EngineError;

    fn try_from(raw: RawSessionVariable) -> Result<Self, Self::Error> {
        Ok(SessionVariable {
            value: Value::from_json(&raw.value, raw.cardinality, raw.base_type)?,
            correct_response: Value::from_json(&raw.correct_response, raw.cardinality, raw.base_type)?,
            cardinality: raw.cardinality,
            base_type: raw.base_type,
            normal_minimum: raw.normal_minimum,
            normal_maximum: raw.normal_maximum,
        })
    }
}

fn default_true() -> bool {
    true
}

/// Result of one item within a test session.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSession {
    pub identifier: String,
    /// Identifiers of every section enclosing the item, outermost first.
    #[serde(default)]
    pub sections: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
    #[serde(default = "default_true")]
    pub selected: bool,
    #[serde(default = "default_true")]
    pub presented: bool,
    #[serde(default = "default_true")]
    pub responded: bool,
    #[serde(default)]
    pub variables: BTreeMap<String, SessionVariable>,
}

impl ItemSession {
    pub fn new(identifier: &str) -> Self {
        ItemSession {
            identifier: identifier.to_string(),
            sections: Vec::new(),
            categories: Vec::new(),
            weights: BTreeMap::new(),
            selected: true,
            presented: true,
            responded: true,
            variables: BTreeMap::new(),
        }
    }

    /// Snapshot the response and outcome variables of a processed item.
    pub fn from_context(identifier: &str, ctx: &VariableContext) -> Result<Self, EngineError> {
        let mut item = ItemSession::new(identifier);
        for (id, value) in ctx.response_values() {
            let decl = ctx.response(id)?;
            let var = SessionVariable::new(decl.cardinality, decl.base_type, value.clone())
                .with_correct_response(decl.correct_response.clone());
            item.variables.insert(id.to_string(), var);
        }
        for (id, value) in ctx.outcome_values() {
            let decl = ctx.outcome(id)?;
            let var = SessionVariable::new(decl.cardinality, decl.base_type, value.clone())
                .with_normal_range(decl.normal_minimum, decl.normal_maximum);
            item.variables.insert(id.to_string(), var);
        }
        Ok(item)
    }

    pub fn with_sections(mut self, sections: &[&str]) -> Self {
        self.sections = sections.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_categories(mut self, categories: &[&str]) -> Self {
        self.categories = categories.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_weight(mut self, identifier: &str, weight: f64) -> Self {
        self.weights.insert(identifier.to_string(), weight);
        self
    }

    pub fn with_variable(mut self, identifier: &str, variable: SessionVariable) -> Self {
        self.variables.insert(identifier.to_string(), variable);
        self
    }

    pub fn with_flags(mut self, selected: bool, presented: bool, responded: bool) -> Self {
        self.selected = selected;
        self.presented = presented;
        self.responded = responded;
        self
    }

    /// Current value of a variable, NULL when the item does not carry it.
    pub fn value(&self, identifier: &str) -> &Value {
        const NULL: &Value = &Value::Null;
        self.variables.get(identifier).map_or(NULL, |v| &v.value)
    }

    /// Named weight; 1 when the item does not define it.
    pub fn weight(&self, identifier: &str) -> f64 {
        self.weights.get(identifier).copied().unwrap_or(1.0)
    }

    /// An item with keyed responses is correct when every keyed response
    /// matches its key. Otherwise a positive `SCORE` makes it correct.
    pub fn is_correct(&self) -> bool {
        let mut keyed = self
            .variables
            .values()
            .filter(|v| !v.correct_response.is_null())
            .peekable();
        if keyed.peek().is_some() {
            return keyed.all(|v| v.value == v.correct_response);
        }
        match self.value("SCORE") {
            Value::Single(s) => s.as_f64().is_some_and(|score| score > 0.0),
            _ => false,
        }
    }
}

// ──────────────────────────────────────────────
// Trait
// ──────────────────────────────────────────────

/// Read-only view of a test session's item results.
///
/// Implementations must return the same items for the duration of one
/// outcome-processing run.
pub trait TestSessionProvider: Send + Sync {
    /// Every item of the test instance, in test order.
    fn items(&self) -> Vec<&ItemSession>;

    /// Item by identifier.
    fn item(&self, identifier: &str) -> Option<&ItemSession> {
        self.items().into_iter().find(|i| i.identifier == identifier)
    }
}

// ──────────────────────────────────────────────
// StaticTestSession
// ──────────────────────────────────────────────

/// In-memory session, deserializable from `{"items": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StaticTestSession {
    #[serde(default)]
    items: Vec<ItemSession>,
}

impl StaticTestSession {
    pub fn new(items: Vec<ItemSession>) -> Self {
        Self { items }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: ItemSession) {
        self.items.push(item);
    }
}

impl TestSessionProvider for StaticTestSession {
    fn items(&self) -> Vec<&ItemSession> {
        self.items.iter().collect()
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
