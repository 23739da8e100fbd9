//! Processing program representation: expressions, statements and the
//! attribute types they carry.
//!
//! Nodes deserialize from interchange JSON objects tagged by `kind` with the
//! camelCase operator name, e.g.
//! `{"kind": "match", "expressions": [{"kind": "variable", "identifier": "RESPONSE"},
//! {"kind": "correct", "identifier": "RESPONSE"}]}`. Unary operators carry a
//! single `expression`, binary operators a two-element `expressions` array,
//! variadic operators an `expressions` list.
//!
//! The tree is immutable once built. The engine only ever mutates the
//! variable context.

use std::fmt;

use serde::Deserialize;

use super::values::Scalar;
use super::{BaseType, EngineError};

/// Exactly two sub-expressions.
pub type Binary = Box<[Expr; 2]>;

// ──────────────────────────────────────────────
// Expressions
// ──────────────────────────────────────────────

/// Expression nodes. Every operator of the processing language has exactly
/// one variant here.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Expr {
    // -- leaves --
    BaseValue(BaseValue),
    Variable {
        identifier: String,
        #[serde(default)]
        weight_identifier: Option<String>,
    },
    Correct {
        identifier: String,
    },
    Default {
        identifier: String,
    },
    Null,
    MathConstant {
        name: MathConstant,
    },
    MapResponse {
        identifier: String,
    },
    MapResponsePoint {
        identifier: String,
    },
    RandomInteger {
        #[serde(default = "IntegerOrVariable::zero")]
        min: IntegerOrVariable,
        max: IntegerOrVariable,
        #[serde(default = "IntegerOrVariable::one")]
        step: IntegerOrVariable,
    },
    RandomFloat {
        #[serde(default = "FloatOrVariable::zero")]
        min: FloatOrVariable,
        max: FloatOrVariable,
    },
    LookupTable(InlineLookup),

    // -- test-level --
    TestVariables {
        variable_identifier: String,
        #[serde(default)]
        base_type: Option<BaseType>,
        #[serde(default)]
        weight_identifier: Option<String>,
        #[serde(flatten)]
        filter: ItemFilter,
    },
    OutcomeMinimum {
        outcome_identifier: String,
        #[serde(default)]
        weight_identifier: Option<String>,
        #[serde(flatten)]
        filter: ItemFilter,
    },
    OutcomeMaximum {
        outcome_identifier: String,
        #[serde(default)]
        weight_identifier: Option<String>,
        #[serde(flatten)]
        filter: ItemFilter,
    },
    NumberCorrect {
        #[serde(flatten)]
        filter: ItemFilter,
    },
    NumberIncorrect {
        #[serde(flatten)]
        filter: ItemFilter,
    },
    NumberPresented {
        #[serde(flatten)]
        filter: ItemFilter,
    },
    NumberResponded {
        #[serde(flatten)]
        filter: ItemFilter,
    },
    NumberSelected {
        #[serde(flatten)]
        filter: ItemFilter,
    },

    // -- containers --
    Multiple {
        #[serde(default)]
        expressions: Vec<Expr>,
    },
    Ordered {
        #[serde(default)]
        expressions: Vec<Expr>,
    },
    ContainerSize {
        expression: Box<Expr>,
    },
    IsNull {
        expression: Box<Expr>,
    },
    Index {
        expression: Box<Expr>,
        n: IntegerOrVariable,
    },
    FieldValue {
        expression: Box<Expr>,
        field_identifier: String,
    },
    Random {
        expression: Box<Expr>,
    },
    /// `[value, container]`
    Member {
        expressions: Binary,
    },
    /// `[value, container]`
    Delete {
        expressions: Binary,
    },
    /// `[container, sub-container]`
    Contains {
        expressions: Binary,
    },
    Repeat {
        expressions: Vec<Expr>,
        number_repeats: IntegerOrVariable,
    },

    // -- logic --
    Not {
        expression: Box<Expr>,
    },
    And {
        expressions: Vec<Expr>,
    },
    Or {
        expressions: Vec<Expr>,
    },
    AnyN {
        expressions: Vec<Expr>,
        min: IntegerOrVariable,
        max: IntegerOrVariable,
    },

    // -- matching --
    Match {
        expressions: Binary,
    },
    StringMatch {
        expressions: Binary,
        case_sensitive: bool,
        #[serde(default)]
        substring: bool,
    },
    /// `[needle, haystack]`
    Substring {
        expressions: Binary,
        #[serde(default = "default_true")]
        case_sensitive: bool,
    },
    PatternMatch {
        expression: Box<Expr>,
        pattern: String,
    },

    // -- comparison --
    Equal {
        expressions: Binary,
        #[serde(default)]
        tolerance_mode: ToleranceMode,
        #[serde(default)]
        tolerance: Vec<FloatOrVariable>,
        #[serde(default = "default_true")]
        include_lower_bound: bool,
        #[serde(default = "default_true")]
        include_upper_bound: bool,
    },
    EqualRounded {
        expressions: Binary,
        #[serde(default)]
        rounding_mode: RoundingMode,
        figures: IntegerOrVariable,
    },
    Inside {
        expression: Box<Expr>,
        shape: Shape,
        #[serde(default)]
        coords: Coords,
    },
    Lt {
        expressions: Binary,
    },
    Gt {
        expressions: Binary,
    },
    Lte {
        expressions: Binary,
    },
    Gte {
        expressions: Binary,
    },
    #[serde(rename = "durationLT")]
    DurationLt {
        expressions: Binary,
    },
    #[serde(rename = "durationGTE")]
    DurationGte {
        expressions: Binary,
    },

    // -- arithmetic --
    Sum {
        expressions: Vec<Expr>,
    },
    Product {
        expressions: Vec<Expr>,
    },
    Subtract {
        expressions: Binary,
    },
    Divide {
        expressions: Binary,
    },
    Power {
        expressions: Binary,
    },
    IntegerDivide {
        expressions: Binary,
    },
    IntegerModulus {
        expressions: Binary,
    },
    Truncate {
        expression: Box<Expr>,
    },
    Round {
        expression: Box<Expr>,
    },
    RoundTo {
        expression: Box<Expr>,
        #[serde(default)]
        rounding_mode: RoundingMode,
        figures: IntegerOrVariable,
    },
    IntegerToFloat {
        expression: Box<Expr>,
    },
    Max {
        expressions: Vec<Expr>,
    },
    Min {
        expressions: Vec<Expr>,
    },
    Gcd {
        expressions: Vec<Expr>,
    },
    Lcm {
        expressions: Vec<Expr>,
    },
    StatsOperator {
        name: Statistic,
        expression: Box<Expr>,
    },
    MathOperator {
        name: MathFunction,
        expressions: Vec<Expr>,
    },

    // -- extension --
    CustomOperator {
        #[serde(default)]
        class: Option<String>,
        #[serde(default)]
        definition: Option<String>,
        #[serde(default)]
        expressions: Vec<Expr>,
    },
}

impl Expr {
    /// Operator name as written in interchange JSON.
    pub fn kind(&self) -> &'static str {
        match self {
            Expr::BaseValue(_) => "baseValue",
            Expr::Variable { .. } => "variable",
            Expr::Correct { .. } => "correct",
            Expr::Default { .. } => "default",
            Expr::Null => "null",
            Expr::MathConstant { .. } => "mathConstant",
            Expr::MapResponse { .. } => "mapResponse",
            Expr::MapResponsePoint { .. } => "mapResponsePoint",
            Expr::RandomInteger { .. } => "randomInteger",
            Expr::RandomFloat { .. } => "randomFloat",
            Expr::LookupTable(_) => "lookupTable",
            Expr::TestVariables { .. } => "testVariables",
            Expr::OutcomeMinimum { .. } => "outcomeMinimum",
            Expr::OutcomeMaximum { .. } => "outcomeMaximum",
            Expr::NumberCorrect { .. } => "numberCorrect",
            Expr::NumberIncorrect { .. } => "numberIncorrect",
            Expr::NumberPresented { .. } => "numberPresented",
            Expr::NumberResponded { .. } => "numberResponded",
            Expr::NumberSelected { .. } => "numberSelected",
            Expr::Multiple { .. } => "multiple",
            Expr::Ordered { .. } => "ordered",
            Expr::ContainerSize { .. } => "containerSize",
            Expr::IsNull { .. } => "isNull",
            Expr::Index { .. } => "index",
            Expr::FieldValue { .. } => "fieldValue",
            Expr::Random { .. } => "random",
            Expr::Member { .. } => "member",
            Expr::Delete { .. } => "delete",
            Expr::Contains { .. } => "contains",
            Expr::Repeat { .. } => "repeat",
            Expr::Not { .. } => "not",
            Expr::And { .. } => "and",
            Expr::Or { .. } => "or",
            Expr::AnyN { .. } => "anyN",
            Expr::Match { .. } => "match",
            Expr::StringMatch { .. } => "stringMatch",
            Expr::Substring { .. } => "substring",
            Expr::PatternMatch { .. } => "patternMatch",
            Expr::Equal { .. } => "equal",
            Expr::EqualRounded { .. } => "equalRounded",
            Expr::Inside { .. } => "inside",
            Expr::Lt { .. } => "lt",
            Expr::Gt { .. } => "gt",
            Expr::Lte { .. } => "lte",
            Expr::Gte { .. } => "gte",
            Expr::DurationLt { .. } => "durationLT",
            Expr::DurationGte { .. } => "durationGTE",
            Expr::Sum { .. } => "sum",
            Expr::Product { .. } => "product",
            Expr::Subtract { .. } => "subtract",
            Expr::Divide { .. } => "divide",
            Expr::Power { .. } => "power",
            Expr::IntegerDivide { .. } => "integerDivide",
            Expr::IntegerModulus { .. } => "integerModulus",
            Expr::Truncate { .. } => "truncate",
            Expr::Round { .. } => "round",
            Expr::RoundTo { .. } => "roundTo",
            Expr::IntegerToFloat { .. } => "integerToFloat",
            Expr::Max { .. } => "max",
            Expr::Min { .. } => "min",
            Expr::Gcd { .. } => "gcd",
            Expr::Lcm { .. } => "lcm",
            Expr::StatsOperator { .. } => "statsOperator",
            Expr::MathOperator { .. } => "mathOperator",
            Expr::CustomOperator { .. } => "customOperator",
        }
    }

    /// Convenience constructor for a `baseValue` leaf.
    pub fn base_value(value: Scalar) -> Expr {
        Expr::BaseValue(BaseValue { value })
    }

    pub fn variable(identifier: &str) -> Expr {
        Expr::Variable {
            identifier: identifier.to_string(),
            weight_identifier: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// A typed literal. Deserializes from `{"baseType": ..., "value": ...}`,
/// parsing `value` according to `baseType`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawBaseValue")]
pub struct BaseValue {
    pub value: Scalar,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBaseValue {
    base_type: BaseType,
    value: serde_json::Value,
}

impl TryFrom<RawBaseValue> for BaseValue {
    type Error = EngineError;

    fn try_from(raw: RawBaseValue) -> Result<Self, Self::Error> {
        Ok(BaseValue {
            value: Scalar::from_json(raw.base_type, &raw.value)?,
        })
    }
}

/// Inline `lookupTable` expression: a source expression resolved through a
/// table whose targets have an explicit base type.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawInlineLookup")]
pub struct InlineLookup {
    pub expression: Box<Expr>,
    pub table: LookupTable,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInlineLookup {
    expression: Box<Expr>,
    base_type: BaseType,
    table: RawLookupTable,
}

impl TryFrom<RawInlineLookup> for InlineLookup {
    type Error = EngineError;

    fn try_from(raw: RawInlineLookup) -> Result<Self, Self::Error> {
        Ok(InlineLookup {
            expression: raw.expression,
            table: raw.table.resolve(raw.base_type)?,
        })
    }
}

// ──────────────────────────────────────────────
// Attribute types
// ──────────────────────────────────────────────

/// Integer attribute given either literally or as a reference to a
/// single integer variable (`"{N}"` or `"N"` in JSON).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "serde_json::Value")]
pub enum IntegerOrVariable {
    Integer(i64),
    Variable(String),
}

impl IntegerOrVariable {
    fn zero() -> Self {
        IntegerOrVariable::Integer(0)
    }

    fn one() -> Self {
        IntegerOrVariable::Integer(1)
    }
}

impl From<i64> for IntegerOrVariable {
    fn from(i: i64) -> Self {
        IntegerOrVariable::Integer(i)
    }
}

impl TryFrom<serde_json::Value> for IntegerOrVariable {
    type Error = String;

    fn try_from(v: serde_json::Value) -> Result<Self, Self::Error> {
        match &v {
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(IntegerOrVariable::Integer)
                .ok_or_else(|| format!("expected an integer, got {}", n)),
            serde_json::Value::String(s) => match s.trim().parse::<i64>() {
                Ok(i) => Ok(IntegerOrVariable::Integer(i)),
                Err(_) => Ok(IntegerOrVariable::Variable(variable_ref(s)?)),
            },
            other => Err(format!("expected an integer or variable reference, got {}", other)),
        }
    }
}

/// Float attribute given either literally or as a variable reference.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "serde_json::Value")]
pub enum FloatOrVariable {
    Float(f64),
    Variable(String),
}

impl FloatOrVariable {
    fn zero() -> Self {
        FloatOrVariable::Float(0.0)
    }
}

impl From<f64> for FloatOrVariable {
    fn from(f: f64) -> Self {
        FloatOrVariable::Float(f)
    }
}

impl TryFrom<serde_json::Value> for FloatOrVariable {
    type Error = String;

    fn try_from(v: serde_json::Value) -> Result<Self, Self::Error> {
        match &v {
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(FloatOrVariable::Float)
                .ok_or_else(|| format!("expected a number, got {}", n)),
            serde_json::Value::String(s) => match s.trim().parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(FloatOrVariable::Float(f)),
                _ => Ok(FloatOrVariable::Variable(variable_ref(s)?)),
            },
            other => Err(format!("expected a number or variable reference, got {}", other)),
        }
    }
}

fn variable_ref(s: &str) -> Result<String, String> {
    let s = s.trim();
    let inner = s
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .unwrap_or(s)
        .trim();
    if inner.is_empty() || inner.chars().any(char::is_whitespace) {
        return Err(format!("'{}' is not a number or variable reference", s));
    }
    Ok(inner.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToleranceMode {
    #[default]
    Exact,
    Absolute,
    Relative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoundingMode {
    #[default]
    SignificantFigures,
    DecimalPlaces,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    Default,
    Rect,
    Circle,
    Poly,
    Ellipse,
}

/// Comma-separated coordinate list, e.g. `"10,10,50,50"`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(try_from = "String")]
pub struct Coords(pub Vec<f64>);

impl TryFrom<String> for Coords {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Coords::parse(&s)
    }
}

impl Coords {
    pub fn parse(s: &str) -> Result<Coords, String> {
        if s.trim().is_empty() {
            return Ok(Coords(Vec::new()));
        }
        s.split(',')
            .map(|part| {
                let part = part.trim();
                part.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .ok_or_else(|| format!("invalid coordinate '{}'", part))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Coords)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Statistic {
    Mean,
    SampleVariance,
    SampleSD,
    PopVariance,
    PopSD,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MathFunction {
    Sin,
    Cos,
    Tan,
    Sec,
    Csc,
    Cot,
    Asin,
    Acos,
    Atan,
    Atan2,
    Asec,
    Acsc,
    Acot,
    Sinh,
    Cosh,
    Tanh,
    Sech,
    Csch,
    Coth,
    Log,
    Ln,
    Exp,
    Abs,
    Signum,
    Floor,
    Ceil,
    ToDegrees,
    ToRadians,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MathConstant {
    Pi,
    E,
}

/// Item selection used by test-level expressions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemFilter {
    pub section_identifier: Option<String>,
    pub include_category: Vec<String>,
    pub exclude_category: Vec<String>,
}

// ──────────────────────────────────────────────
// Mappings and lookup tables
// ──────────────────────────────────────────────

/// Discrete response mapping owned by a response declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Mapping {
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
    pub default_value: f64,
    pub entries: Vec<MapEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapEntry {
    pub key: Scalar,
    pub mapped_value: f64,
    /// Only meaningful for string keys.
    pub case_sensitive: bool,
}

/// Point response mapping: areas tested in declaration order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaMapping {
    #[serde(default)]
    pub lower_bound: Option<f64>,
    #[serde(default)]
    pub upper_bound: Option<f64>,
    #[serde(default)]
    pub default_value: f64,
    #[serde(default)]
    pub entries: Vec<AreaMapEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaMapEntry {
    pub shape: Shape,
    #[serde(default)]
    pub coords: Coords,
    pub mapped_value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LookupTable {
    Match {
        default: Option<Scalar>,
        entries: Vec<MatchEntry>,
    },
    Interpolation {
        default: Option<Scalar>,
        entries: Vec<InterpolationEntry>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchEntry {
    pub source: i64,
    pub target: Scalar,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterpolationEntry {
    /// Lower bound of the range this entry covers.
    pub source: f64,
    pub include_boundary: bool,
    pub target: Scalar,
}

/// Lookup table as written in interchange JSON; targets are parsed once the
/// owning variable's base type is known.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RawLookupTable {
    MatchTable {
        #[serde(default)]
        default_value: Option<serde_json::Value>,
        entries: Vec<RawMatchEntry>,
    },
    InterpolationTable {
        #[serde(default)]
        default_value: Option<serde_json::Value>,
        entries: Vec<RawInterpolationEntry>,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMatchEntry {
    pub source_value: i64,
    pub target_value: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawInterpolationEntry {
    pub source_value: f64,
    #[serde(default = "default_true")]
    pub include_boundary: bool,
    pub target_value: serde_json::Value,
}

impl RawLookupTable {
    pub fn resolve(self, base_type: BaseType) -> Result<LookupTable, EngineError> {
        let parse_default = |d: Option<serde_json::Value>| {
            d.filter(|v| !v.is_null())
                .map(|v| Scalar::from_json(base_type, &v))
                .transpose()
        };
        match self {
            RawLookupTable::MatchTable {
                default_value,
                entries,
            } => Ok(LookupTable::Match {
                default: parse_default(default_value)?,
                entries: entries
                    .into_iter()
                    .map(|e| {
                        Ok(MatchEntry {
                            source: e.source_value,
                            target: Scalar::from_json(base_type, &e.target_value)?,
                        })
                    })
                    .collect::<Result<_, EngineError>>()?,
            }),
            RawLookupTable::InterpolationTable {
                default_value,
                entries,
            } => Ok(LookupTable::Interpolation {
                default: parse_default(default_value)?,
                entries: entries
                    .into_iter()
                    .map(|e| {
                        Ok(InterpolationEntry {
                            source: e.source_value,
                            include_boundary: e.include_boundary,
                            target: Scalar::from_json(base_type, &e.target_value)?,
                        })
                    })
                    .collect::<Result<_, EngineError>>()?,
            }),
        }
    }
}

// ──────────────────────────────────────────────
// Statements
// ──────────────────────────────────────────────

/// Statement nodes of response, outcome and template processing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Statement {
    ResponseCondition(Condition),
    OutcomeCondition(Condition),
    TemplateCondition(Condition),
    SetOutcomeValue {
        identifier: String,
        expression: Expr,
    },
    SetResponseValue {
        identifier: String,
        expression: Expr,
    },
    SetTemplateValue {
        identifier: String,
        expression: Expr,
    },
    SetCorrectResponse {
        identifier: String,
        expression: Expr,
    },
    /// Without an expression the variable's current value is reset to its
    /// declared default; with one, the declared default is replaced.
    SetDefaultValue {
        identifier: String,
        #[serde(default)]
        expression: Option<Expr>,
    },
    LookupOutcomeValue {
        identifier: String,
        expression: Expr,
    },
    TemplateConstraint {
        expression: Expr,
    },
    ExitResponse,
    ExitTemplate,
    ExitTest,
    ResponseProcessingFragment {
        statements: Vec<Statement>,
    },
}

impl Statement {
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::ResponseCondition(_) => "responseCondition",
            Statement::OutcomeCondition(_) => "outcomeCondition",
            Statement::TemplateCondition(_) => "templateCondition",
            Statement::SetOutcomeValue { .. } => "setOutcomeValue",
            Statement::SetResponseValue { .. } => "setResponseValue",
            Statement::SetTemplateValue { .. } => "setTemplateValue",
            Statement::SetCorrectResponse { .. } => "setCorrectResponse",
            Statement::SetDefaultValue { .. } => "setDefaultValue",
            Statement::LookupOutcomeValue { .. } => "lookupOutcomeValue",
            Statement::TemplateConstraint { .. } => "templateConstraint",
            Statement::ExitResponse => "exitResponse",
            Statement::ExitTemplate => "exitTemplate",
            Statement::ExitTest => "exitTest",
            Statement::ResponseProcessingFragment { .. } => "responseProcessingFragment",
        }
    }
}

/// if / else-if / else chain shared by the three condition statements.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub if_branch: Branch,
    #[serde(default)]
    pub else_if_branches: Vec<Branch>,
    #[serde(default)]
    pub else_branch: Option<Vec<Statement>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub condition: Expr,
    #[serde(default)]
    pub statements: Vec<Statement>,
}

/// Processing phase a program belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Response,
    Outcome,
    Template,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Response => "response",
            Phase::Outcome => "outcome",
            Phase::Template => "template",
        };
        f.write_str(name)
    }
}

/// One phase's statement sequence.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProcessingProgram {
    pub phase: Phase,
    #[serde(default)]
    pub statements: Vec<Statement>,
}

impl ProcessingProgram {
    pub fn new(phase: Phase, statements: Vec<Statement>) -> Self {
        ProcessingProgram { phase, statements }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserialize_match_program() {
        let program: ProcessingProgram = serde_json::from_value(json!({
            "phase": "response",
            "statements": [{
                "kind": "responseCondition",
                "ifBranch": {
                    "condition": {
                        "kind": "match",
                        "expressions": [
                            { "kind": "variable", "identifier": "RESPONSE" },
                            { "kind": "correct", "identifier": "RESPONSE" }
                        ]
                    },
                    "statements": [{
                        "kind": "setOutcomeValue",
                        "identifier": "SCORE",
                        "expression": { "kind": "baseValue", "baseType": "float", "value": 1 }
                    }]
                },
                "elseBranch": [{ "kind": "exitResponse" }]
            }]
        }))
        .unwrap();
        assert_eq!(program.phase, Phase::Response);
        match &program.statements[0] {
            Statement::ResponseCondition(cond) => {
                assert_eq!(cond.if_branch.condition.kind(), "match");
                assert_eq!(cond.else_branch.as_ref().unwrap()[0], Statement::ExitResponse);
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn base_value_parses_by_base_type() {
        let e: Expr = serde_json::from_value(json!({
            "kind": "baseValue", "baseType": "point", "value": "3 4"
        }))
        .unwrap();
        assert_eq!(e, Expr::base_value(Scalar::Point(3, 4)));

        let bad = serde_json::from_value::<Expr>(json!({
            "kind": "baseValue", "baseType": "integer", "value": "x"
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn attribute_variable_references() {
        let e: Expr = serde_json::from_value(json!({
            "kind": "equalRounded",
            "roundingMode": "decimalPlaces",
            "figures": "{DP}",
            "expressions": [{ "kind": "null" }, { "kind": "null" }]
        }))
        .unwrap();
        match e {
            Expr::EqualRounded { figures, rounding_mode, .. } => {
                assert_eq!(figures, IntegerOrVariable::Variable("DP".to_string()));
                assert_eq!(rounding_mode, RoundingMode::DecimalPlaces);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_level_filter_is_flattened() {
        let e: Expr = serde_json::from_value(json!({
            "kind": "numberCorrect",
            "sectionIdentifier": "S1",
            "includeCategory": ["graded"]
        }))
        .unwrap();
        assert_eq!(
            e,
            Expr::NumberCorrect {
                filter: ItemFilter {
                    section_identifier: Some("S1".to_string()),
                    include_category: vec!["graded".to_string()],
                    exclude_category: vec![],
                }
            }
        );
    }

    #[test]
    fn inline_lookup_table() {
        let e: Expr = serde_json::from_value(json!({
            "kind": "lookupTable",
            "baseType": "identifier",
            "expression": { "kind": "variable", "identifier": "RAW" },
            "table": {
                "type": "interpolationTable",
                "defaultValue": "none",
                "entries": [
                    { "sourceValue": 0, "targetValue": "low" },
                    { "sourceValue": 50, "targetValue": "high", "includeBoundary": false }
                ]
            }
        }))
        .unwrap();
        match e {
            Expr::LookupTable(inline) => match inline.table {
                LookupTable::Interpolation { default, entries } => {
                    assert_eq!(default, Some(Scalar::Identifier("none".to_string())));
                    assert!(entries[0].include_boundary);
                    assert!(!entries[1].include_boundary);
                }
                other => panic!("unexpected table {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn coords_parse() {
        assert_eq!(Coords::parse("1, 2,3").unwrap(), Coords(vec![1.0, 2.0, 3.0]));
        assert!(Coords::parse("1,x").is_err());
    }
}
