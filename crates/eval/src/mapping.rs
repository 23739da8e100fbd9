//! Response mapping: `mapResponse` and `mapResponsePoint`.

use crate::shape;
use crate::types::{
    AreaMapping, EngineError, Mapping, ResponseDeclaration, Scalar, Value,
};

fn clamp(total: f64, lower: Option<f64>, upper: Option<f64>) -> f64 {
    let total = lower.map_or(total, |lo| total.max(lo));
    upper.map_or(total, |hi| total.min(hi))
}

/// Response values to score: none for NULL, one for a single value, the
/// distinct elements of a container.
fn distinct_items<'a>(identifier: &str, value: &'a Value) -> Result<Vec<&'a Scalar>, EngineError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Single(s) => Ok(vec![s]),
        Value::Multiple(c) | Value::Ordered(c) => {
            let mut out: Vec<&Scalar> = Vec::with_capacity(c.len());
            for item in c.items() {
                if !out.contains(&item) {
                    out.push(item);
                }
            }
            Ok(out)
        }
        Value::Record(_) => Err(EngineError::CardinalityMismatch {
            context: format!("mapping of '{}'", identifier),
            expected: "single, multiple or ordered".to_string(),
            got: "record".to_string(),
        }),
    }
}

fn key_matches(key: &Scalar, case_sensitive: bool, value: &Scalar) -> bool {
    match (key, value) {
        (Scalar::String(k), Scalar::String(v)) if !case_sensitive => {
            k.to_lowercase() == v.to_lowercase()
        }
        _ => key == value,
    }
}

/// Score `value` against a discrete mapping. Each distinct response value
/// contributes its entry's mapped value (or the default when no entry
/// matches); each entry contributes at most once.
pub fn map_value(identifier: &str, mapping: &Mapping, value: &Value) -> Result<f64, EngineError> {
    let mut used = vec![false; mapping.entries.len()];
    let mut total = 0.0;
    for item in distinct_items(identifier, value)? {
        let hit = mapping
            .entries
            .iter()
            .position(|e| key_matches(&e.key, e.case_sensitive, item));
        match hit {
            Some(i) if used[i] => {}
            Some(i) => {
                used[i] = true;
                total += mapping.entries[i].mapped_value;
            }
            None => total += mapping.default_value,
        }
    }
    Ok(clamp(total, mapping.lower_bound, mapping.upper_bound))
}

/// Score point responses against an area mapping. Each point scores the
/// first area containing it; each area contributes at most once; points
/// outside every area score the default.
pub fn map_points(identifier: &str, mapping: &AreaMapping, value: &Value) -> Result<f64, EngineError> {
    let mut used = vec![false; mapping.entries.len()];
    let mut total = 0.0;
    for item in distinct_items(identifier, value)? {
        let (x, y) = match item {
            Scalar::Point(x, y) => (*x as f64, *y as f64),
            other => {
                return Err(EngineError::BaseTypeMismatch {
                    context: format!("area mapping of '{}'", identifier),
                    expected: "point".to_string(),
                    got: other.base_type().to_string(),
                })
            }
        };
        let mut hit = None;
        for (i, area) in mapping.entries.iter().enumerate() {
            let inside = shape::contains(area.shape, &area.coords.0, x, y)
                .map_err(|msg| EngineError::attribute("areaMapping", msg))?;
            if inside {
                hit = Some(i);
                break;
            }
        }
        match hit {
            Some(i) if used[i] => {}
            Some(i) => {
                used[i] = true;
                total += mapping.entries[i].mapped_value;
            }
            None => total += mapping.default_value,
        }
    }
    Ok(clamp(total, mapping.lower_bound, mapping.upper_bound))
}

/// `mapResponse` for a declared response variable.
pub fn map_response(declaration: &ResponseDeclaration, value: &Value) -> Result<Value, EngineError> {
    let mapping = declaration
        .mapping
        .as_ref()
        .ok_or_else(|| EngineError::MissingMapping {
            identifier: declaration.identifier.clone(),
            kind: "mapping",
        })?;
    Ok(Value::float(map_value(&declaration.identifier, mapping, value)?))
}

/// `mapResponsePoint` for a declared point response variable.
pub fn map_response_point(
    declaration: &ResponseDeclaration,
    value: &Value,
) -> Result<Value, EngineError> {
    let mapping = declaration
        .area_mapping
        .as_ref()
        .ok_or_else(|| EngineError::MissingMapping {
            identifier: declaration.identifier.clone(),
            kind: "area mapping",
        })?;
    Ok(Value::float(map_points(&declaration.identifier, mapping, value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AreaMapEntry, BaseType, Coords, MapEntry, Shape};

    fn ident(s: &str) -> Scalar {
        Scalar::Identifier(s.to_string())
    }

    fn choice_mapping() -> Mapping {
        Mapping {
            lower_bound: Some(0.0),
            upper_bound: Some(2.0),
            default_value: -0.5,
            entries: vec![
                MapEntry { key: ident("A"), mapped_value: 1.0, case_sensitive: true },
                MapEntry { key: ident("B"), mapped_value: 0.75, case_sensitive: true },
                MapEntry { key: ident("C"), mapped_value: 0.5, case_sensitive: true },
            ],
        }
    }

    #[test]
    fn multiple_response_sums_distinct_values_and_clamps() {
        let m = choice_mapping();
        let v = Value::multiple(BaseType::Identifier, vec![ident("A"), ident("A"), ident("C")]).unwrap();
        assert_eq!(map_value("R", &m, &v).unwrap(), 1.5);

        let all = Value::multiple(BaseType::Identifier, vec![ident("A"), ident("B"), ident("C")]).unwrap();
        assert_eq!(map_value("R", &m, &all).unwrap(), 2.0);

        let wrong = Value::multiple(BaseType::Identifier, vec![ident("X")]).unwrap();
        assert_eq!(map_value("R", &m, &wrong).unwrap(), 0.0);
    }

    #[test]
    fn null_response_maps_to_zero() {
        let mut m = choice_mapping();
        m.lower_bound = None;
        assert_eq!(map_value("R", &m, &Value::Null).unwrap(), 0.0);
    }

    #[test]
    fn case_insensitive_string_keys() {
        let m = Mapping {
            lower_bound: None,
            upper_bound: None,
            default_value: 0.0,
            entries: vec![MapEntry {
                key: Scalar::String("Paris".to_string()),
                mapped_value: 2.0,
                case_sensitive: false,
            }],
        };
        assert_eq!(map_value("R", &m, &Value::string("PARIS")).unwrap(), 2.0);
    }

    #[test]
    fn area_mapping_counts_each_area_once() {
        let m = AreaMapping {
            lower_bound: None,
            upper_bound: None,
            default_value: 0.0,
            entries: vec![
                AreaMapEntry { shape: Shape::Circle, coords: Coords(vec![10.0, 10.0, 5.0]), mapped_value: 1.0 },
                AreaMapEntry { shape: Shape::Rect, coords: Coords(vec![0.0, 0.0, 100.0, 100.0]), mapped_value: 0.25 },
            ],
        };
        let points = Value::multiple(
            BaseType::Point,
            vec![Scalar::Point(10, 11), Scalar::Point(9, 9), Scalar::Point(50, 50), Scalar::Point(500, 0)],
        )
        .unwrap();
        assert_eq!(map_points("P", &m, &points).unwrap(), 1.25);
    }

    #[test]
    fn missing_mapping_is_an_engine_error() {
        let decl = ResponseDeclaration::new(
            "RESPONSE",
            crate::types::Cardinality::Single,
            Some(BaseType::Identifier),
        );
        assert_eq!(
            map_response(&decl, &Value::identifier("A")).unwrap_err(),
            EngineError::MissingMapping {
                identifier: "RESPONSE".to_string(),
                kind: "mapping"
            }
        );
    }
}
