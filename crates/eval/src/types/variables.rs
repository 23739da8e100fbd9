//! Variable declarations and the per-attempt variable context.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::program::{AreaMapping, LookupTable, MapEntry, Mapping, RawLookupTable};
use super::values::{Container, Scalar, Value};
use super::{BaseType, Cardinality, EngineError};

// ──────────────────────────────────────────────
// Declarations
// ──────────────────────────────────────────────

/// Declaration of a response variable.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawResponseDeclaration")]
pub struct ResponseDeclaration {
    pub identifier: String,
    pub cardinality: Cardinality,
    pub base_type: Option<BaseType>,
    pub default_value: Value,
    pub correct_response: Value,
    pub mapping: Option<Mapping>,
    pub area_mapping: Option<AreaMapping>,
}

impl ResponseDeclaration {
    pub fn new(identifier: &str, cardinality: Cardinality, base_type: Option<BaseType>) -> Self {
        ResponseDeclaration {
            identifier: identifier.to_string(),
            cardinality,
            base_type,
            default_value: Value::Null,
            correct_response: Value::Null,
            mapping: None,
            area_mapping: None,
        }
    }

    pub fn with_correct_response(mut self, value: Value) -> Self {
        self.correct_response = value;
        self
    }

    pub fn with_mapping(mut self, mapping: Mapping) -> Self {
        self.mapping = Some(mapping);
        self
    }

    pub fn with_area_mapping(mut self, area_mapping: AreaMapping) -> Self {
        self.area_mapping = Some(area_mapping);
        self
    }
}

/// Declaration of an outcome variable.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawOutcomeDeclaration")]
pub struct OutcomeDeclaration {
    pub identifier: String,
    pub cardinality: Cardinality,
    pub base_type: Option<BaseType>,
    pub default_value: Value,
    pub lookup_table: Option<LookupTable>,
    pub normal_minimum: Option<f64>,
    pub normal_maximum: Option<f64>,
}

impl OutcomeDeclaration {
    pub fn new(identifier: &str, cardinality: Cardinality, base_type: Option<BaseType>) -> Self {
        OutcomeDeclaration {
            identifier: identifier.to_string(),
            cardinality,
            base_type,
            default_value: Value::Null,
            lookup_table: None,
            normal_minimum: None,
            normal_maximum: None,
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = value;
        self
    }

    pub fn with_lookup_table(mut self, table: LookupTable) -> Self {
        self.lookup_table = Some(table);
        self
    }
}

/// Declaration of a template variable.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawTemplateDeclaration")]
pub struct TemplateDeclaration {
    pub identifier: String,
    pub cardinality: Cardinality,
    pub base_type: Option<BaseType>,
    pub default_value: Value,
    pub math_variable: bool,
    pub param_variable: bool,
}

impl TemplateDeclaration {
    pub fn new(identifier: &str, cardinality: Cardinality, base_type: Option<BaseType>) -> Self {
        TemplateDeclaration {
            identifier: identifier.to_string(),
            cardinality,
            base_type,
            default_value: Value::Null,
            math_variable: false,
            param_variable: false,
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = value;
        self
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResponseDeclaration {
    identifier: String,
    cardinality: Cardinality,
    #[serde(default)]
    base_type: Option<BaseType>,
    #[serde(default)]
    default_value: serde_json::Value,
    #[serde(default)]
    correct_response: serde_json::Value,
    #[serde(default)]
    mapping: Option<RawMapping>,
    #[serde(default)]
    area_mapping: Option<AreaMapping>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMapping {
    #[serde(default)]
    lower_bound: Option<f64>,
    #[serde(default)]
    upper_bound: Option<f64>,
    #[serde(default)]
    default_value: f64,
    #[serde(default)]
    entries: Vec<RawMapEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMapEntry {
    map_key: serde_json::Value,
    mapped_value: f64,
    #[serde(default = "default_true")]
    case_sensitive: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOutcomeDeclaration {
    identifier: String,
    cardinality: Cardinality,
    #[serde(default)]
    base_type: Option<BaseType>,
    #[serde(default)]
    default_value: serde_json::Value,
    #[serde(default)]
    lookup_table: Option<RawLookupTable>,
    #[serde(default)]
    normal_minimum: Option<f64>,
    #[serde(default)]
    normal_maximum: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTemplateDeclaration {
    identifier: String,
    cardinality: Cardinality,
    #[serde(default)]
    base_type: Option<BaseType>,
    #[serde(default)]
    default_value: serde_json::Value,
    #[serde(default)]
    math_variable: bool,
    #[serde(default)]
    param_variable: bool,
}

/// Records carry no base type; every other cardinality requires one.
fn check_signature(
    identifier: &str,
    cardinality: Cardinality,
    base_type: Option<BaseType>,
) -> Result<(), EngineError> {
    match (cardinality, base_type) {
        (Cardinality::Record, Some(bt)) => Err(EngineError::BaseTypeMismatch {
            context: format!("declaration of '{}'", identifier),
            expected: "no base type for record cardinality".to_string(),
            got: bt.to_string(),
        }),
        (Cardinality::Record, None) | (_, Some(_)) => Ok(()),
        (c, None) => Err(EngineError::BaseTypeMismatch {
            context: format!("declaration of '{}'", identifier),
            expected: format!("a base type for {} cardinality", c),
            got: "none".to_string(),
        }),
    }
}

impl TryFrom<RawResponseDeclaration> for ResponseDeclaration {
    type Error = EngineError;

    fn try_from(raw: RawResponseDeclaration) -> Result<Self, Self::Error> {
        check_signature(&raw.identifier, raw.cardinality, raw.base_type)?;
        let mapping = match raw.mapping {
            Some(m) => {
                let bt = raw.base_type.ok_or_else(|| EngineError::MissingMapping {
                    identifier: raw.identifier.clone(),
                    kind: "base type for its mapping keys",
                })?;
                let entries = m
                    .entries
                    .into_iter()
                    .map(|e| {
                        Ok(MapEntry {
                            key: Scalar::from_json(bt, &e.map_key)?,
                            mapped_value: e.mapped_value,
                            case_sensitive: e.case_sensitive,
                        })
                    })
                    .collect::<Result<Vec<_>, EngineError>>()?;
                Some(Mapping {
                    lower_bound: m.lower_bound,
                    upper_bound: m.upper_bound,
                    default_value: m.default_value,
                    entries,
                })
            }
            None => None,
        };
        Ok(ResponseDeclaration {
            default_value: Value::from_json(&raw.default_value, raw.cardinality, raw.base_type)?,
            correct_response: Value::from_json(
                &raw.correct_response,
                raw.cardinality,
                raw.base_type,
            )?,
            identifier: raw.identifier,
            cardinality: raw.cardinality,
            base_type: raw.base_type,
            mapping,
            area_mapping: raw.area_mapping,
        })
    }
}

impl TryFrom<RawOutcomeDeclaration> for OutcomeDeclaration {
    type Error = EngineError;

    fn try_from(raw: RawOutcomeDeclaration) -> Result<Self, Self::Error> {
        check_signature(&raw.identifier, raw.cardinality, raw.base_type)?;
        let lookup_table = match (raw.lookup_table, raw.base_type) {
            (Some(table), Some(bt)) => Some(table.resolve(bt)?),
            (Some(_), None) => {
                return Err(EngineError::MissingLookupTable {
                    identifier: raw.identifier,
                })
            }
            (None, _) => None,
        };
        Ok(OutcomeDeclaration {
            default_value: Value::from_json(&raw.default_value, raw.cardinality, raw.base_type)?,
            identifier: raw.identifier,
            cardinality: raw.cardinality,
            base_type: raw.base_type,
            lookup_table,
            normal_minimum: raw.normal_minimum,
            normal_maximum: raw.normal_maximum,
        })
    }
}

impl TryFrom<RawTemplateDeclaration> for TemplateDeclaration {
    type Error = EngineError;

    fn try_from(raw: RawTemplateDeclaration) -> Result<Self, Self::Error> {
        check_signature(&raw.identifier, raw.cardinality, raw.base_type)?;
        Ok(TemplateDeclaration {
            default_value: Value::from_json(&raw.default_value, raw.cardinality, raw.base_type)?,
            identifier: raw.identifier,
            cardinality: raw.cardinality,
            base_type: raw.base_type,
            math_variable: raw.math_variable,
            param_variable: raw.param_variable,
        })
    }
}

// ──────────────────────────────────────────────
// Type conformance
// ──────────────────────────────────────────────

/// Check `value` against a declared signature, widening `integer` to `float`
/// where the declaration asks for floats. NULL conforms to everything.
pub fn conform(
    identifier: &str,
    value: Value,
    cardinality: Cardinality,
    base_type: Option<BaseType>,
) -> Result<Value, EngineError> {
    if matches!(value, Value::Null) {
        return Ok(value);
    }
    let got = value.cardinality();
    if got != Some(cardinality) {
        return Err(EngineError::CardinalityMismatch {
            context: format!("variable '{}'", identifier),
            expected: cardinality.to_string(),
            got: value.describe(),
        });
    }
    let Some(expected) = base_type else {
        return Ok(value);
    };
    let mismatch = |got: &Value| EngineError::BaseTypeMismatch {
        context: format!("variable '{}'", identifier),
        expected: expected.to_string(),
        got: got.describe(),
    };
    match value {
        Value::Single(s) => match (expected, s) {
            (BaseType::Float, Scalar::Integer(i)) => Ok(Value::Single(Scalar::Float(i as f64))),
            (bt, s) if s.base_type() == bt => Ok(Value::Single(s)),
            (_, s) => Err(mismatch(&Value::Single(s))),
        },
        Value::Multiple(c) | Value::Ordered(c)
            if c.base_type() == BaseType::Integer && expected == BaseType::Float =>
        {
            let widened = c
                .items()
                .iter()
                .map(|s| Scalar::Float(s.as_f64().unwrap_or_default()))
                .collect();
            let container = Container::new(BaseType::Float, widened)?;
            Ok(match cardinality {
                Cardinality::Ordered => Value::Ordered(container),
                _ => Value::Multiple(container),
            })
        }
        v @ (Value::Multiple(_) | Value::Ordered(_)) => {
            if v.base_type() == Some(expected) {
                Ok(v)
            } else {
                Err(mismatch(&v))
            }
        }
        other => Ok(other),
    }
}

// ──────────────────────────────────────────────
// Variable context
// ──────────────────────────────────────────────

/// The namespace a variable was declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableNamespace {
    Response,
    Outcome,
    Template,
}

#[derive(Debug, Clone)]
struct Slot<D> {
    declaration: D,
    value: Value,
}

/// Mutable store of every variable of one item attempt (or one test
/// session's outcome variables).
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    responses: BTreeMap<String, Slot<ResponseDeclaration>>,
    outcomes: BTreeMap<String, Slot<OutcomeDeclaration>>,
    templates: BTreeMap<String, Slot<TemplateDeclaration>>,
}

impl VariableContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context pre-populated with the built-in item variables
    /// `numAttempts`, `duration` and `completionStatus`.
    pub fn with_builtins() -> Self {
        let mut ctx = Self::new();
        ctx.declare_response(ResponseDeclaration::new(
            "numAttempts",
            Cardinality::Single,
            Some(BaseType::Integer),
        ));
        ctx.declare_response(ResponseDeclaration::new(
            "duration",
            Cardinality::Single,
            Some(BaseType::Duration),
        ));
        ctx.declare_outcome(
            OutcomeDeclaration::new(
                "completionStatus",
                Cardinality::Single,
                Some(BaseType::Identifier),
            )
            .with_default(Value::identifier("not_attempted")),
        );
        ctx
    }

    pub fn declare_response(&mut self, declaration: ResponseDeclaration) {
        let value = declaration.default_value.clone();
        self.responses
            .insert(declaration.identifier.clone(), Slot { declaration, value });
    }

    pub fn declare_outcome(&mut self, declaration: OutcomeDeclaration) {
        let value = declaration.default_value.clone();
        self.outcomes
            .insert(declaration.identifier.clone(), Slot { declaration, value });
    }

    pub fn declare_template(&mut self, declaration: TemplateDeclaration) {
        let value = declaration.default_value.clone();
        self.templates
            .insert(declaration.identifier.clone(), Slot { declaration, value });
    }

    pub fn namespace_of(&self, identifier: &str) -> Option<VariableNamespace> {
        if self.responses.contains_key(identifier) {
            Some(VariableNamespace::Response)
        } else if self.outcomes.contains_key(identifier) {
            Some(VariableNamespace::Outcome)
        } else if self.templates.contains_key(identifier) {
            Some(VariableNamespace::Template)
        } else {
            None
        }
    }

    pub fn is_declared(&self, identifier: &str) -> bool {
        self.namespace_of(identifier).is_some()
    }

    /// Current value of any declared variable.
    pub fn value(&self, identifier: &str) -> Result<&Value, EngineError> {
        self.responses
            .get(identifier)
            .map(|s| &s.value)
            .or_else(|| self.outcomes.get(identifier).map(|s| &s.value))
            .or_else(|| self.templates.get(identifier).map(|s| &s.value))
            .ok_or_else(|| undeclared(identifier))
    }

    /// Declared cardinality and base type.
    pub fn signature(&self, identifier: &str) -> Result<(Cardinality, Option<BaseType>), EngineError> {
        if let Some(s) = self.responses.get(identifier) {
            return Ok((s.declaration.cardinality, s.declaration.base_type));
        }
        if let Some(s) = self.outcomes.get(identifier) {
            return Ok((s.declaration.cardinality, s.declaration.base_type));
        }
        if let Some(s) = self.templates.get(identifier) {
            return Ok((s.declaration.cardinality, s.declaration.base_type));
        }
        Err(undeclared(identifier))
    }

    /// Write a variable's current value after checking it against the
    /// declaration. Namespace permissions are the executor's concern.
    pub fn set_value(&mut self, identifier: &str, value: Value) -> Result<(), EngineError> {
        let (cardinality, base_type) = self.signature(identifier)?;
        let value = conform(identifier, value, cardinality, base_type)?;
        if let Some(s) = self.responses.get_mut(identifier) {
            s.value = value;
        } else if let Some(s) = self.outcomes.get_mut(identifier) {
            s.value = value;
        } else if let Some(s) = self.templates.get_mut(identifier) {
            s.value = value;
        }
        Ok(())
    }

    pub fn response(&self, identifier: &str) -> Result<&ResponseDeclaration, EngineError> {
        self.responses
            .get(identifier)
            .map(|s| &s.declaration)
            .ok_or_else(|| undeclared_in(identifier, "response"))
    }

    pub fn outcome(&self, identifier: &str) -> Result<&OutcomeDeclaration, EngineError> {
        self.outcomes
            .get(identifier)
            .map(|s| &s.declaration)
            .ok_or_else(|| undeclared_in(identifier, "outcome"))
    }

    pub fn template(&self, identifier: &str) -> Result<&TemplateDeclaration, EngineError> {
        self.templates
            .get(identifier)
            .map(|s| &s.declaration)
            .ok_or_else(|| undeclared_in(identifier, "template"))
    }

    pub fn correct_response(&self, identifier: &str) -> Result<&Value, EngineError> {
        Ok(&self.response(identifier)?.correct_response)
    }

    pub fn set_correct_response(&mut self, identifier: &str, value: Value) -> Result<(), EngineError> {
        let slot = self
            .responses
            .get_mut(identifier)
            .ok_or_else(|| undeclared_in(identifier, "response"))?;
        let d = &mut slot.declaration;
        d.correct_response = conform(identifier, value, d.cardinality, d.base_type)?;
        Ok(())
    }

    /// Declared default value of any variable.
    pub fn default_value(&self, identifier: &str) -> Result<&Value, EngineError> {
        self.responses
            .get(identifier)
            .map(|s| &s.declaration.default_value)
            .or_else(|| self.outcomes.get(identifier).map(|s| &s.declaration.default_value))
            .or_else(|| self.templates.get(identifier).map(|s| &s.declaration.default_value))
            .ok_or_else(|| undeclared(identifier))
    }

    /// Replace the declared default value of a variable.
    pub fn set_default_value(&mut self, identifier: &str, value: Value) -> Result<(), EngineError> {
        let (cardinality, base_type) = self.signature(identifier)?;
        let value = conform(identifier, value, cardinality, base_type)?;
        if let Some(s) = self.responses.get_mut(identifier) {
            s.declaration.default_value = value;
        } else if let Some(s) = self.outcomes.get_mut(identifier) {
            s.declaration.default_value = value;
        } else if let Some(s) = self.templates.get_mut(identifier) {
            s.declaration.default_value = value;
        }
        Ok(())
    }

    /// Reset a variable's current value to its declared default.
    pub fn reset_to_default(&mut self, identifier: &str) -> Result<(), EngineError> {
        let default = self.default_value(identifier)?.clone();
        self.set_value(identifier, default)
    }

    pub fn reset_outcomes(&mut self) {
        for slot in self.outcomes.values_mut() {
            slot.value = slot.declaration.default_value.clone();
        }
    }

    pub fn reset_templates(&mut self) {
        for slot in self.templates.values_mut() {
            slot.value = slot.declaration.default_value.clone();
        }
    }

    pub fn response_values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.responses.iter().map(|(k, s)| (k.as_str(), &s.value))
    }

    pub fn outcome_values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.outcomes.iter().map(|(k, s)| (k.as_str(), &s.value))
    }

    pub fn template_values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.templates.iter().map(|(k, s)| (k.as_str(), &s.value))
    }
}

fn undeclared(identifier: &str) -> EngineError {
    EngineError::UndeclaredVariable {
        identifier: identifier.to_string(),
    }
}

fn undeclared_in(identifier: &str, namespace: &str) -> EngineError {
    EngineError::UndeclaredVariable {
        identifier: format!("{} ({} variable)", identifier, namespace),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn score_ctx() -> VariableContext {
        let mut ctx = VariableContext::new();
        ctx.declare_outcome(
            OutcomeDeclaration::new("SCORE", Cardinality::Single, Some(BaseType::Float))
                .with_default(Value::float(0.0)),
        );
        ctx.declare_outcome(OutcomeDeclaration::new(
            "COUNT",
            Cardinality::Single,
            Some(BaseType::Integer),
        ));
        ctx
    }

    #[test]
    fn integer_widens_into_float_variable() {
        let mut ctx = score_ctx();
        ctx.set_value("SCORE", Value::integer(2)).unwrap();
        assert_eq!(ctx.value("SCORE").unwrap(), &Value::float(2.0));
    }

    #[test]
    fn float_into_integer_variable_is_an_error() {
        let mut ctx = score_ctx();
        let err = ctx.set_value("COUNT", Value::float(1.5)).unwrap_err();
        assert!(matches!(err, EngineError::BaseTypeMismatch { .. }));
    }

    #[test]
    fn cardinality_is_checked() {
        let mut ctx = score_ctx();
        let v = Value::multiple(BaseType::Integer, vec![Scalar::Integer(1)]).unwrap();
        let err = ctx.set_value("COUNT", v).unwrap_err();
        assert!(matches!(err, EngineError::CardinalityMismatch { .. }));
    }

    #[test]
    fn undeclared_variable() {
        let ctx = score_ctx();
        assert_eq!(
            ctx.value("MISSING").unwrap_err(),
            EngineError::UndeclaredVariable {
                identifier: "MISSING".to_string()
            }
        );
    }

    #[test]
    fn reset_to_default_and_builtins() {
        let mut ctx = VariableContext::with_builtins();
        ctx.declare_outcome(
            OutcomeDeclaration::new("SCORE", Cardinality::Single, Some(BaseType::Float))
                .with_default(Value::float(0.0)),
        );
        ctx.set_value("SCORE", Value::float(3.0)).unwrap();
        ctx.reset_to_default("SCORE").unwrap();
        assert_eq!(ctx.value("SCORE").unwrap(), &Value::float(0.0));
        assert_eq!(
            ctx.value("completionStatus").unwrap(),
            &Value::identifier("not_attempted")
        );
        assert_eq!(ctx.namespace_of("numAttempts"), Some(VariableNamespace::Response));
    }

    #[test]
    fn deserialize_response_declaration_with_mapping() {
        let decl: ResponseDeclaration = serde_json::from_value(json!({
            "identifier": "RESPONSE",
            "cardinality": "multiple",
            "baseType": "identifier",
            "correctResponse": ["A", "C"],
            "mapping": {
                "defaultValue": -1,
                "lowerBound": 0,
                "entries": [
                    { "mapKey": "A", "mappedValue": 1 },
                    { "mapKey": "C", "mappedValue": 0.5 }
                ]
            }
        }))
        .unwrap();
        let mapping = decl.mapping.unwrap();
        assert_eq!(mapping.entries.len(), 2);
        assert_eq!(mapping.default_value, -1.0);
        assert_eq!(mapping.lower_bound, Some(0.0));
        assert_eq!(decl.correct_response.container().unwrap().len(), 2);
    }

    #[test]
    fn deserialize_rejects_missing_base_type() {
        let err = serde_json::from_value::<OutcomeDeclaration>(json!({
            "identifier": "SCORE",
            "cardinality": "single"
        }));
        assert!(err.is_err());
    }
}
