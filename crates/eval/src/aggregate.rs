//! Test-level aggregation: item filtering, weighting and the counting
//! expressions.
//!
//! The aggregator holds no state. Every function takes the provider and
//! applies the filter to the items it returns.

use crate::session::{ItemSession, TestSessionProvider};
use crate::types::{BaseType, Container, EngineError, ItemFilter, Scalar, Value};

impl ItemFilter {
    /// Section membership, then category inclusion and exclusion.
    pub fn matches(&self, item: &ItemSession) -> bool {
        if let Some(section) = &self.section_identifier {
            if !item.sections.iter().any(|s| s == section) {
                return false;
            }
        }
        if !self.include_category.is_empty()
            && !item.categories.iter().any(|c| self.include_category.contains(c))
        {
            return false;
        }
        !item.categories.iter().any(|c| self.exclude_category.contains(c))
    }
}

/// Selected items that pass the filter, in test order.
pub fn select<'a>(provider: &'a dyn TestSessionProvider, filter: &ItemFilter) -> Vec<&'a ItemSession> {
    provider
        .items()
        .into_iter()
        .filter(|item| item.selected && filter.matches(item))
        .collect()
}

/// Multiply a numeric single value by `weight`; other values pass through.
fn weighted(value: &Scalar, weight: f64) -> Scalar {
    match value.as_f64() {
        Some(f) if weight != 1.0 => Scalar::Float(f * weight),
        _ => value.clone(),
    }
}

/// `ITEM.VAR` variable reference, NULL when the item or variable is absent.
pub fn item_variable(
    provider: &dyn TestSessionProvider,
    item: &str,
    variable: &str,
    weight_identifier: Option<&str>,
) -> Value {
    let Some(session) = provider.item(item) else {
        return Value::Null;
    };
    match (session.value(variable), weight_identifier) {
        (Value::Single(s), Some(w)) => Value::Single(weighted(s, session.weight(w))),
        (v, _) => v.clone(),
    }
}

/// `testVariables`: the named single-valued variable of every selected
/// item, as a multiple container. Items without the variable, or whose
/// value is NULL, are skipped. With `base_type` only values of that base
/// type are kept. Weighted numeric values become floats; integers are
/// widened when mixed with floats.
pub fn test_variables(
    provider: &dyn TestSessionProvider,
    filter: &ItemFilter,
    variable: &str,
    base_type: Option<BaseType>,
    weight_identifier: Option<&str>,
) -> Result<Value, EngineError> {
    let mut values = Vec::new();
    for item in select(provider, filter) {
        let Value::Single(s) = item.value(variable) else {
            continue;
        };
        if base_type.is_some_and(|bt| bt != s.base_type()) {
            continue;
        }
        let weight = weight_identifier.map_or(1.0, |w| item.weight(w));
        values.push(weighted(s, weight));
    }
    if values.is_empty() {
        return Ok(Value::Null);
    }
    let any_float = values.iter().any(|v| matches!(v, Scalar::Float(_)));
    if any_float && values.iter().all(|v| v.as_f64().is_some()) {
        let floats = values
            .iter()
            .filter_map(Scalar::as_f64)
            .map(Scalar::Float)
            .collect();
        return Ok(Value::Multiple(Container::new(BaseType::Float, floats)?));
    }
    let bt = values[0].base_type();
    Ok(Value::Multiple(Container::new(bt, values)?))
}

/// Which normal bound `outcome_bounds` reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Minimum,
    Maximum,
}

/// `outcomeMinimum` / `outcomeMaximum`: the declared bound of the outcome
/// in every selected item, weighted, as a multiple float. NULL when no item
/// is selected or any selected item lacks the bound.
pub fn outcome_bounds(
    provider: &dyn TestSessionProvider,
    filter: &ItemFilter,
    outcome: &str,
    bound: Bound,
    weight_identifier: Option<&str>,
) -> Result<Value, EngineError> {
    let mut values = Vec::new();
    for item in select(provider, filter) {
        let declared = item.variables.get(outcome).and_then(|v| match bound {
            Bound::Minimum => v.normal_minimum,
            Bound::Maximum => v.normal_maximum,
        });
        let Some(b) = declared else {
            return Ok(Value::Null);
        };
        let weight = weight_identifier.map_or(1.0, |w| item.weight(w));
        values.push(Scalar::Float(b * weight));
    }
    if values.is_empty() {
        return Ok(Value::Null);
    }
    Ok(Value::Multiple(Container::new(BaseType::Float, values)?))
}

/// The counting expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemCount {
    Selected,
    Presented,
    Responded,
    Correct,
    Incorrect,
}

pub fn count(provider: &dyn TestSessionProvider, filter: &ItemFilter, what: ItemCount) -> Value {
    let n = select(provider, filter)
        .into_iter()
        .filter(|item| match what {
            ItemCount::Selected => true,
            ItemCount::Presented => item.presented,
            ItemCount::Responded => item.responded,
            ItemCount::Correct => item.is_correct(),
            ItemCount::Incorrect => item.responded && !item.is_correct(),
        })
        .count();
    Value::integer(n as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionVariable, StaticTestSession};

    fn scored(id: &str, score: f64) -> ItemSession {
        ItemSession::new(id).with_variable("SCORE", SessionVariable::single(Scalar::Float(score)))
    }

    fn graded_session() -> StaticTestSession {
        StaticTestSession::new(vec![
            scored("Q1", 1.0).with_categories(&["graded"]).with_sections(&["S1"]),
            scored("Q2", 0.0).with_categories(&["graded"]).with_sections(&["S1"]),
            scored("Q3", 1.0).with_categories(&["graded"]).with_sections(&["S2"]).with_weight("W", 3.0),
            scored("Q4", 1.0).with_categories(&["practice"]).with_flags(true, true, false),
        ])
    }

    fn graded() -> ItemFilter {
        ItemFilter {
            include_category: vec!["graded".to_string()],
            ..ItemFilter::default()
        }
    }

    #[test]
    fn number_correct_in_category() {
        let s = graded_session();
        assert_eq!(count(&s, &graded(), ItemCount::Correct), Value::integer(2));
        assert_eq!(count(&s, &ItemFilter::default(), ItemCount::Correct), Value::integer(3));
        assert_eq!(count(&s, &graded(), ItemCount::Incorrect), Value::integer(1));
        assert_eq!(count(&s, &ItemFilter::default(), ItemCount::Responded), Value::integer(3));
    }

    #[test]
    fn section_and_exclusion_filters() {
        let s = graded_session();
        let f = ItemFilter {
            section_identifier: Some("S1".to_string()),
            ..ItemFilter::default()
        };
        assert_eq!(count(&s, &f, ItemCount::Selected), Value::integer(2));
        let f = ItemFilter {
            exclude_category: vec!["practice".to_string()],
            ..ItemFilter::default()
        };
        assert_eq!(count(&s, &f, ItemCount::Presented), Value::integer(3));
    }

    #[test]
    fn weighted_test_variables() {
        let s = graded_session();
        let v = test_variables(&s, &graded(), "SCORE", None, Some("W")).unwrap();
        let expected = Value::multiple(
            BaseType::Float,
            vec![Scalar::Float(1.0), Scalar::Float(0.0), Scalar::Float(3.0)],
        )
        .unwrap();
        assert_eq!(v, expected);
        assert_eq!(
            test_variables(&s, &graded(), "MISSING", None, None).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn outcome_maximum_needs_every_bound() {
        let with_max = |id: &str, max: Option<f64>| {
            ItemSession::new(id).with_variable(
                "SCORE",
                SessionVariable::single(Scalar::Float(0.0)).with_normal_range(Some(0.0), max),
            )
        };
        let s = StaticTestSession::new(vec![with_max("A", Some(2.0)), with_max("B", Some(1.0))]);
        let v = outcome_bounds(&s, &ItemFilter::default(), "SCORE", Bound::Maximum, None).unwrap();
        assert_eq!(
            v,
            Value::multiple(BaseType::Float, vec![Scalar::Float(2.0), Scalar::Float(1.0)]).unwrap()
        );

        let s = StaticTestSession::new(vec![with_max("A", Some(2.0)), with_max("B", None)]);
        let v = outcome_bounds(&s, &ItemFilter::default(), "SCORE", Bound::Maximum, None).unwrap();
        assert_eq!(v, Value::Null);
    }

    #[test]
    fn dotted_item_variable() {
        let s = graded_session();
        assert_eq!(item_variable(&s, "Q3", "SCORE", Some("W")), Value::float(3.0));
        assert_eq!(item_variable(&s, "Q1", "SCORE", None), Value::float(1.0));
        assert_eq!(item_variable(&s, "Q9", "SCORE", None), Value::Null);
    }
}
