//! Lookup table resolution for `lookupOutcomeValue` and the inline
//! `lookupTable` expression.

use crate::types::{EngineError, InterpolationEntry, LookupTable, MatchEntry, Scalar, Value};

/// Resolve `source` through either kind of table.
pub fn resolve(table: &LookupTable, source: &Value) -> Result<Value, EngineError> {
    match table {
        LookupTable::Match { default, entries } => resolve_match(entries, default.as_ref(), source),
        LookupTable::Interpolation { default, entries } => {
            resolve_interpolation(entries, default.as_ref(), source)
        }
    }
}

fn fallback(default: Option<&Scalar>) -> Value {
    default.cloned().map(Value::Single).unwrap_or(Value::Null)
}

/// First entry, in declaration order, whose source equals the integer
/// `source`. NULL or a miss yields the default.
pub fn resolve_match(
    entries: &[MatchEntry],
    default: Option<&Scalar>,
    source: &Value,
) -> Result<Value, EngineError> {
    if source.is_null() {
        return Ok(fallback(default));
    }
    let key = match source {
        Value::Single(Scalar::Integer(i)) => *i,
        other => {
            return Err(EngineError::IntegerRequired {
                operator: "matchTable".to_string(),
                got: other.describe(),
            })
        }
    };
    Ok(entries
        .iter()
        .find(|e| e.source == key)
        .map(|e| Value::Single(e.target.clone()))
        .unwrap_or_else(|| fallback(default)))
}

/// Entry with the greatest lower bound the numeric `source` satisfies
/// (`>=` for inclusive entries, `>` otherwise). Equal bounds resolve to the
/// earlier entry. Below every bound, or NULL, yields the default.
pub fn resolve_interpolation(
    entries: &[InterpolationEntry],
    default: Option<&Scalar>,
    source: &Value,
) -> Result<Value, EngineError> {
    if source.is_null() {
        return Ok(fallback(default));
    }
    let x = match source.as_single().and_then(Scalar::as_f64) {
        Some(x) => x,
        None => {
            return Err(EngineError::operand(
                "interpolationTable",
                format!("source must be a single number, got {}", source.describe()),
            ))
        }
    };
    let mut best: Option<&InterpolationEntry> = None;
    for entry in entries {
        let satisfied = if entry.include_boundary {
            x >= entry.source
        } else {
            x > entry.source
        };
        if satisfied && best.map_or(true, |b| entry.source > b.source) {
            best = Some(entry);
        }
    }
    Ok(best
        .map(|e| Value::Single(e.target.clone()))
        .unwrap_or_else(|| fallback(default)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(s: &str) -> Scalar {
        Scalar::Identifier(s.to_string())
    }

    fn bands() -> Vec<InterpolationEntry> {
        [(0.0, "low"), (50.0, "mid"), (80.0, "high")]
            .into_iter()
            .map(|(source, t)| InterpolationEntry {
                source,
                include_boundary: true,
                target: ident(t),
            })
            .collect()
    }

    #[test]
    fn interpolation_picks_tightest_bound() {
        let default = ident("none");
        let entries = bands();
        let at = |x: i64| resolve_interpolation(&entries, Some(&default), &Value::integer(x)).unwrap();
        assert_eq!(at(49), Value::identifier("low"));
        assert_eq!(at(50), Value::identifier("mid"));
        assert_eq!(at(100), Value::identifier("high"));
        assert_eq!(at(-1), Value::identifier("none"));
    }

    #[test]
    fn interpolation_exclusive_boundary() {
        let mut entries = bands();
        entries[1].include_boundary = false;
        let v = resolve_interpolation(&entries, None, &Value::float(50.0)).unwrap();
        assert_eq!(v, Value::identifier("low"));
        assert_eq!(
            resolve_interpolation(&entries, None, &Value::float(-5.0)).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn interpolation_equal_bounds_keep_declaration_order() {
        let entries = vec![
            InterpolationEntry { source: 10.0, include_boundary: true, target: ident("first") },
            InterpolationEntry { source: 10.0, include_boundary: true, target: ident("second") },
        ];
        let v = resolve_interpolation(&entries, None, &Value::integer(12)).unwrap();
        assert_eq!(v, Value::identifier("first"));
    }

    #[test]
    fn match_table() {
        let entries = vec![
            MatchEntry { source: 1, target: Scalar::Float(0.5) },
            MatchEntry { source: 1, target: Scalar::Float(9.0) },
            MatchEntry { source: 2, target: Scalar::Float(1.0) },
        ];
        let default = Scalar::Float(0.0);
        assert_eq!(
            resolve_match(&entries, Some(&default), &Value::integer(1)).unwrap(),
            Value::float(0.5)
        );
        assert_eq!(
            resolve_match(&entries, Some(&default), &Value::integer(7)).unwrap(),
            Value::float(0.0)
        );
        assert_eq!(
            resolve_match(&entries, Some(&default), &Value::Null).unwrap(),
            Value::float(0.0)
        );
        assert!(matches!(
            resolve_match(&entries, None, &Value::float(1.0)),
            Err(EngineError::IntegerRequired { .. })
        ));
    }
}
