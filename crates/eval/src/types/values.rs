//! Runtime values and their literal / JSON forms.

use std::collections::BTreeMap;
use std::fmt;

use super::{BaseType, Cardinality, EngineError};

// ──────────────────────────────────────────────
// Scalars
// ──────────────────────────────────────────────

/// A single-valued leaf of a runtime value.
///
/// Floats are plain `f64`: arithmetic that would produce a non-finite result
/// yields NULL before a `Scalar` is ever built from it.
#[derive(Debug, Clone)]
pub enum Scalar {
    Identifier(String),
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// Seconds.
    Duration(f64),
    Point(i64, i64),
    Pair(String, String),
    DirectedPair(String, String),
    File(String),
    Uri(String),
}

impl PartialEq for Scalar {
    /// Value equality: `pair` ignores order, every other kind compares
    /// structurally. Different base types are never equal.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Scalar::Identifier(a), Scalar::Identifier(b)) => a == b,
            (Scalar::Boolean(a), Scalar::Boolean(b)) => a == b,
            (Scalar::Integer(a), Scalar::Integer(b)) => a == b,
            (Scalar::Float(a), Scalar::Float(b)) => a == b,
            (Scalar::String(a), Scalar::String(b)) => a == b,
            (Scalar::Duration(a), Scalar::Duration(b)) => a == b,
            (Scalar::Point(ax, ay), Scalar::Point(bx, by)) => ax == bx && ay == by,
            (Scalar::Pair(a1, a2), Scalar::Pair(b1, b2)) => {
                (a1 == b1 && a2 == b2) || (a1 == b2 && a2 == b1)
            }
            (Scalar::DirectedPair(a1, a2), Scalar::DirectedPair(b1, b2)) => a1 == b1 && a2 == b2,
            (Scalar::File(a), Scalar::File(b)) => a == b,
            (Scalar::Uri(a), Scalar::Uri(b)) => a == b,
            _ => false,
        }
    }
}

impl Scalar {
    pub fn base_type(&self) -> BaseType {
        match self {
            Scalar::Identifier(_) => BaseType::Identifier,
            Scalar::Boolean(_) => BaseType::Boolean,
            Scalar::Integer(_) => BaseType::Integer,
            Scalar::Float(_) => BaseType::Float,
            Scalar::String(_) => BaseType::String,
            Scalar::Duration(_) => BaseType::Duration,
            Scalar::Point(..) => BaseType::Point,
            Scalar::Pair(..) => BaseType::Pair,
            Scalar::DirectedPair(..) => BaseType::DirectedPair,
            Scalar::File(_) => BaseType::File,
            Scalar::Uri(_) => BaseType::Uri,
        }
    }

    /// Numeric view of `integer` and `float` scalars.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Integer(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Parse the textual literal form of a value of the given base type.
    pub fn parse(base_type: BaseType, literal: &str) -> Result<Scalar, EngineError> {
        let invalid = || EngineError::InvalidLiteral {
            base_type,
            literal: literal.to_string(),
        };
        let trimmed = literal.trim();
        match base_type {
            BaseType::Identifier => {
                if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
                    return Err(invalid());
                }
                Ok(Scalar::Identifier(trimmed.to_string()))
            }
            BaseType::Boolean => match trimmed {
                "true" | "1" => Ok(Scalar::Boolean(true)),
                "false" | "0" => Ok(Scalar::Boolean(false)),
                _ => Err(invalid()),
            },
            BaseType::Integer => trimmed
                .parse::<i64>()
                .map(Scalar::Integer)
                .map_err(|_| invalid()),
            BaseType::Float => parse_finite(trimmed)
                .map(Scalar::Float)
                .ok_or_else(invalid),
            BaseType::Duration => parse_finite(trimmed)
                .map(Scalar::Duration)
                .ok_or_else(invalid),
            BaseType::String => Ok(Scalar::String(literal.to_string())),
            BaseType::Point => {
                let (x, y) = split_two(trimmed).ok_or_else(invalid)?;
                let x = x.parse::<i64>().map_err(|_| invalid())?;
                let y = y.parse::<i64>().map_err(|_| invalid())?;
                Ok(Scalar::Point(x, y))
            }
            BaseType::Pair => {
                let (a, b) = split_two(trimmed).ok_or_else(invalid)?;
                Ok(Scalar::Pair(a.to_string(), b.to_string()))
            }
            BaseType::DirectedPair => {
                let (a, b) = split_two(trimmed).ok_or_else(invalid)?;
                Ok(Scalar::DirectedPair(a.to_string(), b.to_string()))
            }
            BaseType::File => Ok(Scalar::File(literal.to_string())),
            BaseType::Uri => {
                if trimmed.is_empty() {
                    return Err(invalid());
                }
                Ok(Scalar::Uri(trimmed.to_string()))
            }
        }
    }

    /// Build a scalar from a JSON value: strings use the literal form,
    /// numbers and booleans map directly, two-element arrays build points
    /// and pairs.
    pub fn from_json(base_type: BaseType, v: &serde_json::Value) -> Result<Scalar, EngineError> {
        let invalid = || EngineError::InvalidLiteral {
            base_type,
            literal: v.to_string(),
        };
        match v {
            serde_json::Value::String(s) => Scalar::parse(base_type, s),
            serde_json::Value::Bool(b) if base_type == BaseType::Boolean => Ok(Scalar::Boolean(*b)),
            serde_json::Value::Number(n) => match base_type {
                BaseType::Integer => n.as_i64().map(Scalar::Integer).ok_or_else(invalid),
                BaseType::Float => n.as_f64().map(Scalar::Float).ok_or_else(invalid),
                BaseType::Duration => n.as_f64().map(Scalar::Duration).ok_or_else(invalid),
                _ => Err(invalid()),
            },
            serde_json::Value::Array(parts) if parts.len() == 2 => {
                let joined = parts
                    .iter()
                    .map(|p| match p {
                        serde_json::Value::String(s) => Ok(s.clone()),
                        serde_json::Value::Number(n) => Ok(n.to_string()),
                        _ => Err(invalid()),
                    })
                    .collect::<Result<Vec<_>, _>>()?
                    .join(" ");
                match base_type {
                    BaseType::Point | BaseType::Pair | BaseType::DirectedPair => {
                        Scalar::parse(base_type, &joined)
                    }
                    _ => Err(invalid()),
                }
            }
            _ => Err(invalid()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Scalar::Boolean(b) => serde_json::Value::Bool(*b),
            Scalar::Integer(i) => serde_json::json!(i),
            Scalar::Float(f) | Scalar::Duration(f) => serde_json::json!(f),
            other => serde_json::Value::String(other.to_string()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Identifier(s) | Scalar::String(s) | Scalar::File(s) | Scalar::Uri(s) => {
                f.write_str(s)
            }
            Scalar::Boolean(b) => write!(f, "{}", b),
            Scalar::Integer(i) => write!(f, "{}", i),
            Scalar::Float(v) | Scalar::Duration(v) => write!(f, "{}", v),
            Scalar::Point(x, y) => write!(f, "{} {}", x, y),
            Scalar::Pair(a, b) | Scalar::DirectedPair(a, b) => write!(f, "{} {}", a, b),
        }
    }
}

fn parse_finite(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|f| f.is_finite())
}

fn split_two(s: &str) -> Option<(&str, &str)> {
    let mut parts = s.split_whitespace();
    let first = parts.next()?;
    let second = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((first, second))
}

// ──────────────────────────────────────────────
// Containers
// ──────────────────────────────────────────────

/// Homogeneous element list backing `multiple` and `ordered` values.
#[derive(Debug, Clone)]
pub struct Container {
    base_type: BaseType,
    items: Vec<Scalar>,
}

impl Container {
    /// Build a container, rejecting any element whose base type differs.
    pub fn new(base_type: BaseType, items: Vec<Scalar>) -> Result<Container, EngineError> {
        if let Some(bad) = items.iter().find(|s| s.base_type() != base_type) {
            return Err(EngineError::MixedBaseTypes {
                expected: base_type,
                got: bad.base_type(),
            });
        }
        Ok(Container { base_type, items })
    }

    pub fn empty(base_type: BaseType) -> Container {
        Container {
            base_type,
            items: Vec::new(),
        }
    }

    pub fn base_type(&self) -> BaseType {
        self.base_type
    }

    pub fn items(&self) -> &[Scalar] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Scalar> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, s: &Scalar) -> bool {
        self.items.iter().any(|item| item == s)
    }

    /// Multiset equality.
    fn same_elements(&self, other: &Container) -> bool {
        if self.base_type != other.base_type || self.items.len() != other.items.len() {
            return false;
        }
        let mut remaining: Vec<&Scalar> = other.items.iter().collect();
        for item in &self.items {
            match remaining.iter().position(|r| *r == item) {
                Some(pos) => {
                    remaining.swap_remove(pos);
                }
                None => return false,
            }
        }
        true
    }
}

// ──────────────────────────────────────────────
// Values
// ──────────────────────────────────────────────

/// A runtime value: NULL or a value of one of the four cardinalities.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Single(Scalar),
    /// Unordered, duplicates allowed.
    Multiple(Container),
    /// Sequence, duplicates allowed.
    Ordered(Container),
    Record(BTreeMap<String, Scalar>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Single(a), Value::Single(b)) => a == b,
            (Value::Multiple(a), Value::Multiple(b)) => a.same_elements(b),
            (Value::Ordered(a), Value::Ordered(b)) => {
                a.base_type == b.base_type && a.items == b.items
            }
            (Value::Record(a), Value::Record(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Value::Single(s)
    }
}

impl Value {
    pub fn integer(i: i64) -> Value {
        Value::Single(Scalar::Integer(i))
    }

    /// A float value; non-finite input becomes NULL.
    pub fn float(f: f64) -> Value {
        if f.is_finite() {
            Value::Single(Scalar::Float(f))
        } else {
            Value::Null
        }
    }

    pub fn boolean(b: bool) -> Value {
        Value::Single(Scalar::Boolean(b))
    }

    pub fn identifier(s: &str) -> Value {
        Value::Single(Scalar::Identifier(s.to_string()))
    }

    pub fn string(s: &str) -> Value {
        Value::Single(Scalar::String(s.to_string()))
    }

    pub fn multiple(base_type: BaseType, items: Vec<Scalar>) -> Result<Value, EngineError> {
        Ok(Value::Multiple(Container::new(base_type, items)?))
    }

    pub fn ordered(base_type: BaseType, items: Vec<Scalar>) -> Result<Value, EngineError> {
        Ok(Value::Ordered(Container::new(base_type, items)?))
    }

    /// NULL, an empty container or the empty string.
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Single(Scalar::String(s)) => s.is_empty(),
            Value::Multiple(c) | Value::Ordered(c) => c.is_empty(),
            Value::Record(fields) => fields.is_empty(),
            Value::Single(_) => false,
        }
    }

    /// `None` for NULL.
    pub fn cardinality(&self) -> Option<Cardinality> {
        match self {
            Value::Null => None,
            Value::Single(_) => Some(Cardinality::Single),
            Value::Multiple(_) => Some(Cardinality::Multiple),
            Value::Ordered(_) => Some(Cardinality::Ordered),
            Value::Record(_) => Some(Cardinality::Record),
        }
    }

    /// `None` for NULL and records.
    pub fn base_type(&self) -> Option<BaseType> {
        match self {
            Value::Single(s) => Some(s.base_type()),
            Value::Multiple(c) | Value::Ordered(c) => Some(c.base_type),
            Value::Null | Value::Record(_) => None,
        }
    }

    pub fn as_single(&self) -> Option<&Scalar> {
        match self {
            Value::Single(s) => Some(s),
            _ => None,
        }
    }

    pub fn container(&self) -> Option<&Container> {
        match self {
            Value::Multiple(c) | Value::Ordered(c) => Some(c),
            _ => None,
        }
    }

    /// Human-readable description for error messages, e.g. `single float`.
    pub fn describe(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Record(_) => "record".to_string(),
            Value::Single(s) => format!("single {}", s.base_type()),
            Value::Multiple(c) => format!("multiple {}", c.base_type),
            Value::Ordered(c) => format!("ordered {}", c.base_type),
        }
    }

    /// Parse a JSON value against a declared cardinality and base type.
    ///
    /// JSON `null` is NULL. Containers are arrays; records are objects whose
    /// fields are either plain JSON scalars (base type inferred) or
    /// `{"baseType": ..., "value": ...}` objects.
    pub fn from_json(
        v: &serde_json::Value,
        cardinality: Cardinality,
        base_type: Option<BaseType>,
    ) -> Result<Value, EngineError> {
        if v.is_null() {
            return Ok(Value::Null);
        }
        let require_base = || {
            base_type.ok_or_else(|| EngineError::BaseTypeMismatch {
                context: "value literal".to_string(),
                expected: format!("a base type for {} cardinality", cardinality),
                got: "none".to_string(),
            })
        };
        match cardinality {
            Cardinality::Single => Ok(Value::Single(Scalar::from_json(require_base()?, v)?)),
            Cardinality::Multiple | Cardinality::Ordered => {
                let bt = require_base()?;
                let items = match v {
                    serde_json::Value::Array(arr) => arr
                        .iter()
                        .map(|item| Scalar::from_json(bt, item))
                        .collect::<Result<Vec<_>, _>>()?,
                    single => vec![Scalar::from_json(bt, single)?],
                };
                let container = Container::new(bt, items)?;
                if cardinality == Cardinality::Multiple {
                    Ok(Value::Multiple(container))
                } else {
                    Ok(Value::Ordered(container))
                }
            }
            Cardinality::Record => {
                let obj = v.as_object().ok_or_else(|| EngineError::CardinalityMismatch {
                    context: "record literal".to_string(),
                    expected: "JSON object".to_string(),
                    got: v.to_string(),
                })?;
                let mut fields = BTreeMap::new();
                for (name, field) in obj {
                    if let Some(scalar) = record_field_from_json(field)? {
                        fields.insert(name.clone(), scalar);
                    }
                }
                Ok(Value::Record(fields))
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Single(s) => s.to_json(),
            Value::Multiple(c) | Value::Ordered(c) => {
                serde_json::Value::Array(c.items.iter().map(Scalar::to_json).collect())
            }
            Value::Record(fields) => {
                let obj = fields
                    .iter()
                    .map(|(k, v)| {
                        (
                            k.clone(),
                            serde_json::json!({ "baseType": v.base_type(), "value": v.to_json() }),
                        )
                    })
                    .collect();
                serde_json::Value::Object(obj)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Single(s) => write!(f, "{}", s),
            Value::Multiple(c) | Value::Ordered(c) => {
                let open = if matches!(self, Value::Multiple(_)) { '{' } else { '[' };
                let close = if open == '{' { '}' } else { ']' };
                let parts: Vec<String> = c.items.iter().map(|s| s.to_string()).collect();
                write!(f, "{}{}{}", open, parts.join(", "), close)
            }
            Value::Record(fields) => {
                let parts: Vec<String> = fields.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                write!(f, "({})", parts.join(", "))
            }
        }
    }
}

fn record_field_from_json(v: &serde_json::Value) -> Result<Option<Scalar>, EngineError> {
    match v {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Bool(b) => Ok(Some(Scalar::Boolean(*b))),
        serde_json::Value::Number(n) => Ok(Some(match n.as_i64() {
            Some(i) => Scalar::Integer(i),
            None => Scalar::Float(n.as_f64().unwrap_or_default()),
        })),
        serde_json::Value::String(s) => Ok(Some(Scalar::String(s.clone()))),
        serde_json::Value::Object(obj) => {
            let bt: BaseType = obj
                .get("baseType")
                .cloned()
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| EngineError::InvalidAttribute {
                    operator: "record".to_string(),
                    message: format!("bad field baseType: {}", e),
                })?
                .ok_or_else(|| EngineError::InvalidAttribute {
                    operator: "record".to_string(),
                    message: "record field object missing 'baseType'".to_string(),
                })?;
            match obj.get("value") {
                None | Some(serde_json::Value::Null) => Ok(None),
                Some(inner) => Scalar::from_json(bt, inner).map(Some),
            }
        }
        serde_json::Value::Array(_) => Err(EngineError::CardinalityMismatch {
            context: "record field".to_string(),
            expected: "single".to_string(),
            got: "array".to_string(),
        }),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
