//! Runtime value types, variable declarations and the processing program
//! representation for the respro engine.
//!
//! These types are what the evaluator and executor operate on. Producers
//! (format-specific tree walkers, the CLI, tests) build them either directly
//! or by deserializing the interchange JSON described in `program` and
//! `variables`.

pub mod program;
pub mod values;
pub mod variables;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use program::{
    AreaMapEntry, AreaMapping, BaseValue, Binary, Branch, Condition, Coords, Expr,
    FloatOrVariable, InlineLookup, IntegerOrVariable, InterpolationEntry, ItemFilter,
    LookupTable, MapEntry, Mapping, MatchEntry, MathConstant, MathFunction, Phase,
    ProcessingProgram, RawLookupTable, RoundingMode, Shape, Statement, Statistic, ToleranceMode,
};
pub use values::{Container, Scalar, Value};
pub use variables::{
    OutcomeDeclaration, ResponseDeclaration, TemplateDeclaration, VariableContext,
    VariableNamespace,
};

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// Program-level engine errors.
///
/// These indicate a malformed processing program or an inconsistent variable
/// context. Runtime data conditions (division by zero, out-of-range index,
/// NULL operands) never produce an `EngineError`; they evaluate to
/// `Value::Null` instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// A referenced variable has no declaration in the context.
    #[error("undeclared variable: {identifier}")]
    UndeclaredVariable { identifier: String },

    /// A value's cardinality does not fit where it is used.
    #[error("cardinality mismatch for {context}: expected {expected}, got {got}")]
    CardinalityMismatch {
        context: String,
        expected: String,
        got: String,
    },

    /// A value's base type does not fit where it is used.
    #[error("base type mismatch for {context}: expected {expected}, got {got}")]
    BaseTypeMismatch {
        context: String,
        expected: String,
        got: String,
    },

    /// A branch condition evaluated to something other than a boolean.
    #[error("condition must evaluate to a single boolean, got {got}")]
    NonBooleanCondition { got: String },

    /// An integer-only operator received a non-integer operand.
    #[error("operator '{operator}' requires integer operands, got {got}")]
    IntegerRequired { operator: String, got: String },

    /// A container was built from elements of different base types.
    #[error("container elements must share base type {expected}, found {got}")]
    MixedBaseTypes { expected: BaseType, got: BaseType },

    /// A statement wrote to a variable its phase may not modify.
    #[error("variable '{identifier}' is read-only during {phase} processing")]
    ReadOnlyVariable { identifier: String, phase: Phase },

    /// A statement is not permitted in the current processing phase.
    #[error("'{statement}' is not permitted during {phase} processing")]
    StatementNotPermitted {
        statement: &'static str,
        phase: Phase,
    },

    /// `mapResponse` / `mapResponsePoint` on a response without the mapping.
    #[error("response variable '{identifier}' has no {kind}")]
    MissingMapping {
        identifier: String,
        kind: &'static str,
    },

    /// `lookupOutcomeValue` on an outcome without a lookup table.
    #[error("outcome variable '{identifier}' has no lookup table")]
    MissingLookupTable { identifier: String },

    /// A test-level expression was evaluated without a test session.
    #[error("'{expression}' requires a test session provider")]
    NoTestSession { expression: &'static str },

    /// A literal could not be parsed as its declared base type.
    #[error("invalid {base_type} literal: '{literal}'")]
    InvalidLiteral { base_type: BaseType, literal: String },

    /// An operator received an operand outside its type contract.
    #[error("operator '{operator}': {message}")]
    InvalidOperand { operator: String, message: String },

    /// An operator attribute (figures, pattern, coordinates...) is malformed.
    #[error("invalid attribute on '{operator}': {message}")]
    InvalidAttribute { operator: String, message: String },
}

impl EngineError {
    pub(crate) fn operand(operator: &str, message: impl Into<String>) -> Self {
        EngineError::InvalidOperand {
            operator: operator.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn attribute(operator: &str, message: impl Into<String>) -> Self {
        EngineError::InvalidAttribute {
            operator: operator.to_string(),
            message: message.into(),
        }
    }
}

// ──────────────────────────────────────────────
// Type descriptors
// ──────────────────────────────────────────────

/// Scalar kind of a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BaseType {
    Identifier,
    Boolean,
    Integer,
    Float,
    String,
    Duration,
    Point,
    Pair,
    DirectedPair,
    File,
    Uri,
}

impl BaseType {
    /// `integer` and `float` take part in arithmetic.
    pub fn is_numeric(self) -> bool {
        matches!(self, BaseType::Integer | BaseType::Float)
    }

    pub fn name(self) -> &'static str {
        match self {
            BaseType::Identifier => "identifier",
            BaseType::Boolean => "boolean",
            BaseType::Integer => "integer",
            BaseType::Float => "float",
            BaseType::String => "string",
            BaseType::Duration => "duration",
            BaseType::Point => "point",
            BaseType::Pair => "pair",
            BaseType::DirectedPair => "directedPair",
            BaseType::File => "file",
            BaseType::Uri => "uri",
        }
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a variable holds one value, a multiset, a sequence or a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Cardinality {
    Single,
    Multiple,
    Ordered,
    Record,
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Cardinality::Single => "single",
            Cardinality::Multiple => "multiple",
            Cardinality::Ordered => "ordered",
            Cardinality::Record => "record",
        };
        f.write_str(name)
    }
}
