//! Registry for `customOperator` implementations.
//!
//! Vendor extensions are looked up by `(class, definition)`. A registration
//! made with a class and no definition serves every definition of that class.
//! Unknown operators are not errors: the evaluator yields NULL and records a
//! diagnostic.

use std::collections::HashMap;
use std::fmt;

use crate::types::Value;

/// Implementation of a custom operator over already-evaluated operands.
pub trait CustomOperator: Send + Sync {
    fn evaluate(&self, operands: &[Value]) -> Result<Value, String>;
}

impl<F> CustomOperator for F
where
    F: Fn(&[Value]) -> Result<Value, String> + Send + Sync,
{
    fn evaluate(&self, operands: &[Value]) -> Result<Value, String> {
        self(operands)
    }
}

/// Registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperatorKey {
    pub class: Option<String>,
    pub definition: Option<String>,
}

impl OperatorKey {
    pub fn new(class: Option<&str>, definition: Option<&str>) -> Self {
        OperatorKey {
            class: class.map(str::to_string),
            definition: definition.map(str::to_string),
        }
    }
}

impl fmt::Display for OperatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{}",
            self.class.as_deref().unwrap_or(""),
            self.definition.as_deref().unwrap_or("")
        )
    }
}

#[derive(Default)]
pub struct OperatorRegistry {
    operators: HashMap<OperatorKey, Box<dyn CustomOperator>>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        class: Option<&str>,
        definition: Option<&str>,
        operator: impl CustomOperator + 'static,
    ) {
        self.operators
            .insert(OperatorKey::new(class, definition), Box::new(operator));
    }

    /// Exact `(class, definition)` match first, then the class-wide entry.
    pub fn resolve(&self, class: Option<&str>, definition: Option<&str>) -> Option<&dyn CustomOperator> {
        let exact = OperatorKey::new(class, definition);
        if let Some(op) = self.operators.get(&exact) {
            return Some(op.as_ref());
        }
        if definition.is_some() && class.is_some() {
            let class_wide = OperatorKey::new(class, None);
            return self.operators.get(&class_wide).map(|op| op.as_ref());
        }
        None
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

impl fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self.operators.keys().map(|k| k.to_string()).collect();
        keys.sort();
        f.debug_struct("OperatorRegistry").field("operators", &keys).finish()
    }
}
