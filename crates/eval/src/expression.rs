//! Expression evaluator.
//!
//! `eval_expr` maps an expression node and a read-only variable context to
//! a `Value`. Runtime data conditions (NULL operands, division by zero,
//! domain errors, out-of-range indices, unknown custom operators) evaluate
//! to NULL. A program that breaks an operator's type contract yields an
//! `EngineError`.
//!
//! Operand NULL checks always run before any type-specific logic, so a NULL
//! operand never surfaces as a type error.

use std::cmp::Ordering;

use regex::Regex;
use tracing::warn;

use crate::aggregate::{self, Bound, ItemCount};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::lookup;
use crate::mapping;
use crate::numeric::{self, Tolerance};
use crate::operators::{OperatorKey, OperatorRegistry};
use crate::random::RandomSource;
use crate::session::TestSessionProvider;
use crate::shape;
use crate::types::{
    BaseType, Binary, Container, EngineError, Expr, FloatOrVariable, IntegerOrVariable,
    MathConstant, MathFunction, RoundingMode, Scalar, ToleranceMode, Value, VariableContext,
};

// ──────────────────────────────────────────────
// Environment
// ──────────────────────────────────────────────

/// Collaborators injected into one evaluation.
pub struct EvalEnv<'a> {
    /// Required by test-level expressions only.
    pub session: Option<&'a dyn TestSessionProvider>,
    pub operators: &'a OperatorRegistry,
    pub random: &'a mut dyn RandomSource,
    pub diagnostics: &'a mut Diagnostics,
}

impl<'a> EvalEnv<'a> {
    pub fn new(
        operators: &'a OperatorRegistry,
        random: &'a mut dyn RandomSource,
        diagnostics: &'a mut Diagnostics,
    ) -> Self {
        EvalEnv {
            session: None,
            operators,
            random,
            diagnostics,
        }
    }

    pub fn with_session(mut self, session: &'a dyn TestSessionProvider) -> Self {
        self.session = Some(session);
        self
    }

    fn session(&self, expression: &'static str) -> Result<&'a dyn TestSessionProvider, EngineError> {
        self.session.ok_or(EngineError::NoTestSession { expression })
    }
}

// ──────────────────────────────────────────────
// Operand views
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    fn cmp(self, other: Num) -> Option<Ordering> {
        match (self, other) {
            (Num::Int(a), Num::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

fn scalar_number(op: &str, s: &Scalar) -> Result<Num, EngineError> {
    match s {
        Scalar::Integer(i) => Ok(Num::Int(*i)),
        Scalar::Float(f) => Ok(Num::Float(*f)),
        other => Err(EngineError::operand(
            op,
            format!("expected integer or float, got {}", other.base_type()),
        )),
    }
}

fn number(op: &str, v: &Value) -> Result<Num, EngineError> {
    match v {
        Value::Single(s) => scalar_number(op, s),
        other => Err(EngineError::operand(
            op,
            format!("expected a single number, got {}", other.describe()),
        )),
    }
}

/// Numeric operands of a variadic operator, containers flattened.
/// `None` when any operand is NULL.
fn numbers(op: &str, values: &[Value]) -> Result<Option<Vec<Num>>, EngineError> {
    if values.is_empty() || values.iter().any(Value::is_null) {
        return Ok(None);
    }
    let mut out = Vec::with_capacity(values.len());
    for v in values {
        match v {
            Value::Single(s) => out.push(scalar_number(op, s)?),
            Value::Multiple(c) | Value::Ordered(c) => {
                for s in c.items() {
                    out.push(scalar_number(op, s)?);
                }
            }
            other => {
                return Err(EngineError::CardinalityMismatch {
                    context: op.to_string(),
                    expected: "single, multiple or ordered".to_string(),
                    got: other.describe(),
                })
            }
        }
    }
    Ok(Some(out))
}

fn all_ints(nums: &[Num]) -> Option<Vec<i64>> {
    nums.iter()
        .map(|n| match n {
            Num::Int(i) => Some(*i),
            Num::Float(_) => None,
        })
        .collect()
}

fn integer(op: &str, v: &Value) -> Result<i64, EngineError> {
    match v {
        Value::Single(Scalar::Integer(i)) => Ok(*i),
        other => Err(EngineError::IntegerRequired {
            operator: op.to_string(),
            got: other.describe(),
        }),
    }
}

fn integers(op: &str, values: &[Value]) -> Result<Option<Vec<i64>>, EngineError> {
    if values.is_empty() || values.iter().any(Value::is_null) {
        return Ok(None);
    }
    let mut out = Vec::with_capacity(values.len());
    for v in values {
        match v {
            Value::Single(_) => out.push(integer(op, v)?),
            Value::Multiple(c) | Value::Ordered(c) if c.base_type() == BaseType::Integer => {
                out.extend(c.items().iter().filter_map(|s| match s {
                    Scalar::Integer(i) => Some(*i),
                    _ => None,
                }));
            }
            other => {
                return Err(EngineError::IntegerRequired {
                    operator: op.to_string(),
                    got: other.describe(),
                })
            }
        }
    }
    Ok(Some(out))
}

fn boolean(op: &str, v: &Value) -> Result<bool, EngineError> {
    match v {
        Value::Single(Scalar::Boolean(b)) => Ok(*b),
        other => Err(EngineError::operand(
            op,
            format!("expected a single boolean, got {}", other.describe()),
        )),
    }
}

fn string<'v>(op: &str, v: &'v Value) -> Result<&'v str, EngineError> {
    match v {
        Value::Single(Scalar::String(s)) => Ok(s),
        other => Err(EngineError::operand(
            op,
            format!("expected a single string, got {}", other.describe()),
        )),
    }
}

fn duration(op: &str, v: &Value) -> Result<f64, EngineError> {
    match v {
        Value::Single(Scalar::Duration(d)) => Ok(*d),
        other => Err(EngineError::operand(
            op,
            format!("expected a single duration, got {}", other.describe()),
        )),
    }
}

fn container<'v>(op: &str, v: &'v Value) -> Result<&'v Container, EngineError> {
    v.container().ok_or_else(|| EngineError::CardinalityMismatch {
        context: op.to_string(),
        expected: "multiple or ordered".to_string(),
        got: v.describe(),
    })
}

fn same_base_type(op: &str, expected: Option<BaseType>, got: Option<BaseType>) -> Result<(), EngineError> {
    if expected == got {
        return Ok(());
    }
    let name = |bt: Option<BaseType>| bt.map_or("none".to_string(), |b| b.to_string());
    Err(EngineError::BaseTypeMismatch {
        context: op.to_string(),
        expected: name(expected),
        got: name(got),
    })
}

fn null_if_any(values: &[&Value]) -> bool {
    values.iter().any(|v| v.is_null())
}

// ──────────────────────────────────────────────
// Attributes
// ──────────────────────────────────────────────

/// Literal or referenced integer attribute; `None` when the reference is NULL.
fn int_attr(op: &str, attr: &IntegerOrVariable, ctx: &VariableContext) -> Result<Option<i64>, EngineError> {
    match attr {
        IntegerOrVariable::Integer(i) => Ok(Some(*i)),
        IntegerOrVariable::Variable(id) => match ctx.value(id)? {
            v if v.is_null() => Ok(None),
            Value::Single(Scalar::Integer(i)) => Ok(Some(*i)),
            other => Err(EngineError::IntegerRequired {
                operator: op.to_string(),
                got: format!("{} from '{}'", other.describe(), id),
            }),
        },
    }
}

fn float_attr(op: &str, attr: &FloatOrVariable, ctx: &VariableContext) -> Result<Option<f64>, EngineError> {
    match attr {
        FloatOrVariable::Float(f) => Ok(Some(*f)),
        FloatOrVariable::Variable(id) => match ctx.value(id)? {
            v if v.is_null() => Ok(None),
            Value::Single(s) => s.as_f64().map(Some).ok_or_else(|| {
                EngineError::operand(op, format!("attribute '{}' is {}, not numeric", id, s.base_type()))
            }),
            other => Err(EngineError::operand(
                op,
                format!("attribute '{}' is {}, not a single number", id, other.describe()),
            )),
        },
    }
}

/// `pattern` given literally or as `{VAR}` naming a string variable.
fn pattern_attr(pattern: &str, ctx: &VariableContext) -> Result<Option<String>, EngineError> {
    let reference = pattern
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .filter(|id| ctx.is_declared(id));
    match reference {
        Some(id) => match ctx.value(id)? {
            v if v.is_null() => Ok(None),
            v => Ok(Some(string("patternMatch", v)?.to_string())),
        },
        None => Ok(Some(pattern.to_string())),
    }
}

fn check_figures(op: &str, mode: RoundingMode, figures: i64) -> Result<(), EngineError> {
    match mode {
        RoundingMode::DecimalPlaces if figures < 0 => Err(EngineError::attribute(
            op,
            format!("decimalPlaces needs figures >= 0, got {}", figures),
        )),
        RoundingMode::SignificantFigures if figures < 1 => Err(EngineError::attribute(
            op,
            format!("significantFigures needs figures >= 1, got {}", figures),
        )),
        _ => Ok(()),
    }
}

// ──────────────────────────────────────────────
// Evaluation
// ──────────────────────────────────────────────

fn eval_pair(
    exprs: &Binary,
    ctx: &VariableContext,
    env: &mut EvalEnv<'_>,
) -> Result<(Value, Value), EngineError> {
    let [a, b] = &**exprs;
    Ok((eval_expr(a, ctx, env)?, eval_expr(b, ctx, env)?))
}

fn eval_all(exprs: &[Expr], ctx: &VariableContext, env: &mut EvalEnv<'_>) -> Result<Vec<Value>, EngineError> {
    exprs.iter().map(|e| eval_expr(e, ctx, env)).collect()
}

/// Evaluate an expression against the variable context.
pub fn eval_expr(expr: &Expr, ctx: &VariableContext, env: &mut EvalEnv<'_>) -> Result<Value, EngineError> {
    let op = expr.kind();
    match expr {
        // -- leaves --
        Expr::BaseValue(bv) => Ok(Value::Single(bv.value.clone())),

        Expr::Variable {
            identifier,
            weight_identifier,
        } => {
            if ctx.is_declared(identifier) {
                return Ok(ctx.value(identifier)?.clone());
            }
            match (identifier.split_once('.'), env.session) {
                (Some((item, variable)), Some(session)) => Ok(aggregate::item_variable(
                    session,
                    item,
                    variable,
                    weight_identifier.as_deref(),
                )),
                _ => Ok(ctx.value(identifier)?.clone()),
            }
        }

        Expr::Correct { identifier } => Ok(ctx.correct_response(identifier)?.clone()),
        Expr::Default { identifier } => Ok(ctx.default_value(identifier)?.clone()),
        Expr::Null => Ok(Value::Null),

        Expr::MathConstant { name } => Ok(Value::float(match name {
            MathConstant::Pi => std::f64::consts::PI,
            MathConstant::E => std::f64::consts::E,
        })),

        Expr::MapResponse { identifier } => {
            mapping::map_response(ctx.response(identifier)?, ctx.value(identifier)?)
        }
        Expr::MapResponsePoint { identifier } => {
            mapping::map_response_point(ctx.response(identifier)?, ctx.value(identifier)?)
        }

        Expr::RandomInteger { min, max, step } => {
            let (Some(min), Some(max), Some(step)) = (
                int_attr(op, min, ctx)?,
                int_attr(op, max, ctx)?,
                int_attr(op, step, ctx)?,
            ) else {
                return Ok(Value::Null);
            };
            if step < 1 {
                return Err(EngineError::attribute(op, format!("step must be positive, got {}", step)));
            }
            if max < min {
                return Ok(Value::Null);
            }
            let Some(steps) = max.checked_sub(min).map(|span| span / step) else {
                return Ok(Value::Null);
            };
            let k = env.random.integer(0, steps);
            Ok(k.checked_mul(step)
                .and_then(|offset| min.checked_add(offset))
                .map_or(Value::Null, Value::integer))
        }

        Expr::RandomFloat { min, max } => {
            let (Some(min), Some(max)) = (float_attr(op, min, ctx)?, float_attr(op, max, ctx)?) else {
                return Ok(Value::Null);
            };
            if max < min {
                return Ok(Value::Null);
            }
            Ok(Value::float(env.random.float(min, max)))
        }

        Expr::LookupTable(inline) => {
            let source = eval_expr(&inline.expression, ctx, env)?;
            lookup::resolve(&inline.table, &source)
        }

        // -- test-level --
        Expr::TestVariables {
            variable_identifier,
            base_type,
            weight_identifier,
            filter,
        } => aggregate::test_variables(
            env.session(op)?,
            filter,
            variable_identifier,
            *base_type,
            weight_identifier.as_deref(),
        ),
        Expr::OutcomeMinimum {
            outcome_identifier,
            weight_identifier,
            filter,
        } => aggregate::outcome_bounds(
            env.session(op)?,
            filter,
            outcome_identifier,
            Bound::Minimum,
            weight_identifier.as_deref(),
        ),
        Expr::OutcomeMaximum {
            outcome_identifier,
            weight_identifier,
            filter,
        } => aggregate::outcome_bounds(
            env.session(op)?,
            filter,
            outcome_identifier,
            Bound::Maximum,
            weight_identifier.as_deref(),
        ),
        Expr::NumberCorrect { filter } => Ok(aggregate::count(env.session(op)?, filter, ItemCount::Correct)),
        Expr::NumberIncorrect { filter } => {
            Ok(aggregate::count(env.session(op)?, filter, ItemCount::Incorrect))
        }
        Expr::NumberPresented { filter } => {
            Ok(aggregate::count(env.session(op)?, filter, ItemCount::Presented))
        }
        Expr::NumberResponded { filter } => {
            Ok(aggregate::count(env.session(op)?, filter, ItemCount::Responded))
        }
        Expr::NumberSelected { filter } => {
            Ok(aggregate::count(env.session(op)?, filter, ItemCount::Selected))
        }

        // -- containers --
        Expr::Multiple { expressions } => {
            let values = eval_all(expressions, ctx, env)?;
            build_container(op, values, false)
        }
        Expr::Ordered { expressions } => {
            let values = eval_all(expressions, ctx, env)?;
            build_container(op, values, true)
        }

        Expr::ContainerSize { expression } => match eval_expr(expression, ctx, env)? {
            Value::Null => Ok(Value::integer(0)),
            Value::Multiple(c) | Value::Ordered(c) => Ok(Value::integer(c.len() as i64)),
            other => Err(EngineError::CardinalityMismatch {
                context: op.to_string(),
                expected: "multiple or ordered".to_string(),
                got: other.describe(),
            }),
        },

        Expr::IsNull { expression } => Ok(Value::boolean(eval_expr(expression, ctx, env)?.is_null())),

        Expr::Index { expression, n } => {
            let v = eval_expr(expression, ctx, env)?;
            let Some(n) = int_attr(op, n, ctx)? else {
                return Ok(Value::Null);
            };
            if v.is_null() {
                return Ok(Value::Null);
            }
            let Value::Ordered(c) = &v else {
                return Err(EngineError::CardinalityMismatch {
                    context: op.to_string(),
                    expected: "ordered".to_string(),
                    got: v.describe(),
                });
            };
            let item = usize::try_from(n)
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| c.items().get(i));
            Ok(item.cloned().map_or(Value::Null, Value::Single))
        }

        Expr::FieldValue {
            expression,
            field_identifier,
        } => match eval_expr(expression, ctx, env)? {
            Value::Null => Ok(Value::Null),
            Value::Record(fields) => Ok(fields
                .get(field_identifier)
                .cloned()
                .map_or(Value::Null, Value::Single)),
            other => Err(EngineError::CardinalityMismatch {
                context: op.to_string(),
                expected: "record".to_string(),
                got: other.describe(),
            }),
        },

        Expr::Random { expression } => {
            let v = eval_expr(expression, ctx, env)?;
            if v.is_null() {
                return Ok(Value::Null);
            }
            let c = container(op, &v)?;
            let last = c.len() as i64 - 1;
            let i = env.random.integer(0, last);
            Ok(c.items()
                .get(i as usize)
                .cloned()
                .map_or(Value::Null, Value::Single))
        }

        Expr::Member { expressions } => {
            let (value, list) = eval_pair(expressions, ctx, env)?;
            if null_if_any(&[&value, &list]) {
                return Ok(Value::Null);
            }
            let Value::Single(item) = &value else {
                return Err(EngineError::CardinalityMismatch {
                    context: op.to_string(),
                    expected: "single".to_string(),
                    got: value.describe(),
                });
            };
            let c = container(op, &list)?;
            same_base_type(op, Some(c.base_type()), Some(item.base_type()))?;
            Ok(Value::boolean(c.contains(item)))
        }

        Expr::Delete { expressions } => {
            let (value, list) = eval_pair(expressions, ctx, env)?;
            if null_if_any(&[&value, &list]) {
                return Ok(Value::Null);
            }
            let Value::Single(item) = &value else {
                return Err(EngineError::CardinalityMismatch {
                    context: op.to_string(),
                    expected: "single".to_string(),
                    got: value.describe(),
                });
            };
            let c = container(op, &list)?;
            same_base_type(op, Some(c.base_type()), Some(item.base_type()))?;
            let mut items = c.items().to_vec();
            if let Some(pos) = items.iter().position(|s| s == item) {
                items.remove(pos);
            }
            let remaining = Container::new(c.base_type(), items)?;
            Ok(match list {
                Value::Ordered(_) => Value::Ordered(remaining),
                _ => Value::Multiple(remaining),
            })
        }

        Expr::Contains { expressions } => {
            let (outer, inner) = eval_pair(expressions, ctx, env)?;
            if null_if_any(&[&outer, &inner]) {
                return Ok(Value::Null);
            }
            same_base_type(op, outer.base_type(), inner.base_type())?;
            match (&outer, &inner) {
                (Value::Multiple(c), Value::Multiple(sub)) => {
                    let mut remaining: Vec<&Scalar> = c.items().iter().collect();
                    let included = sub.items().iter().all(|s| match remaining.iter().position(|r| *r == s) {
                        Some(pos) => {
                            remaining.swap_remove(pos);
                            true
                        }
                        None => false,
                    });
                    Ok(Value::boolean(included))
                }
                (Value::Ordered(c), Value::Ordered(sub)) => Ok(Value::boolean(
                    c.items().windows(sub.len()).any(|w| w == sub.items()),
                )),
                _ => Err(EngineError::CardinalityMismatch {
                    context: op.to_string(),
                    expected: "two multiple or two ordered containers".to_string(),
                    got: format!("{} and {}", outer.describe(), inner.describe()),
                }),
            }
        }

        Expr::Repeat {
            expressions,
            number_repeats,
        } => {
            let Some(n) = int_attr(op, number_repeats, ctx)? else {
                return Ok(Value::Null);
            };
            let values = eval_all(expressions, ctx, env)?;
            let Ok(n) = usize::try_from(n) else {
                return Ok(Value::Null);
            };
            let Some((base_type, items)) = flatten(op, values, true)? else {
                return Ok(Value::Null);
            };
            if n == 0 {
                return Ok(Value::Null);
            }
            let mut repeated = Vec::with_capacity(items.len().saturating_mul(n));
            for _ in 0..n {
                repeated.extend(items.iter().cloned());
            }
            Ok(Value::Ordered(Container::new(base_type, repeated)?))
        }

        // -- logic --
        Expr::Not { expression } => {
            let v = eval_expr(expression, ctx, env)?;
            if v.is_null() {
                return Ok(Value::Null);
            }
            Ok(Value::boolean(!boolean(op, &v)?))
        }

        Expr::And { expressions } => {
            let mut saw_null = false;
            for e in expressions {
                let v = eval_expr(e, ctx, env)?;
                if v.is_null() {
                    saw_null = true;
                } else if !boolean(op, &v)? {
                    return Ok(Value::boolean(false));
                }
            }
            Ok(if saw_null { Value::Null } else { Value::boolean(true) })
        }

        Expr::Or { expressions } => {
            let mut saw_null = false;
            for e in expressions {
                let v = eval_expr(e, ctx, env)?;
                if v.is_null() {
                    saw_null = true;
                } else if boolean(op, &v)? {
                    return Ok(Value::boolean(true));
                }
            }
            Ok(if saw_null { Value::Null } else { Value::boolean(false) })
        }

        Expr::AnyN { expressions, min, max } => {
            let (Some(min), Some(max)) = (int_attr(op, min, ctx)?, int_attr(op, max, ctx)?) else {
                return Ok(Value::Null);
            };
            let (mut trues, mut nulls) = (0i64, 0i64);
            for e in expressions {
                let v = eval_expr(e, ctx, env)?;
                if v.is_null() {
                    nulls += 1;
                } else if boolean(op, &v)? {
                    trues += 1;
                }
            }
            if trues > max || trues + nulls < min {
                Ok(Value::boolean(false))
            } else if trues >= min && trues + nulls <= max {
                Ok(Value::boolean(true))
            } else {
                Ok(Value::Null)
            }
        }

        // -- matching --
        Expr::Match { expressions } => {
            let (a, b) = eval_pair(expressions, ctx, env)?;
            if null_if_any(&[&a, &b]) {
                return Ok(Value::Null);
            }
            if a.cardinality() != b.cardinality() {
                return Err(EngineError::CardinalityMismatch {
                    context: op.to_string(),
                    expected: a.describe(),
                    got: b.describe(),
                });
            }
            same_base_type(op, a.base_type(), b.base_type())?;
            Ok(Value::boolean(a == b))
        }

        Expr::StringMatch {
            expressions,
            case_sensitive,
            substring,
        } => {
            let (a, b) = eval_pair(expressions, ctx, env)?;
            if null_if_any(&[&a, &b]) {
                return Ok(Value::Null);
            }
            let (a, b) = (string(op, &a)?, string(op, &b)?);
            let (a, b) = fold_case(a, b, *case_sensitive);
            Ok(Value::boolean(if *substring { a.contains(&b) } else { a == b }))
        }

        Expr::Substring {
            expressions,
            case_sensitive,
        } => {
            let (needle, haystack) = eval_pair(expressions, ctx, env)?;
            if null_if_any(&[&needle, &haystack]) {
                return Ok(Value::Null);
            }
            let (needle, haystack) = fold_case(string(op, &needle)?, string(op, &haystack)?, *case_sensitive);
            Ok(Value::boolean(haystack.contains(&needle)))
        }

        Expr::PatternMatch { expression, pattern } => {
            let v = eval_expr(expression, ctx, env)?;
            let Some(pattern) = pattern_attr(pattern, ctx)? else {
                return Ok(Value::Null);
            };
            if v.is_null() {
                return Ok(Value::Null);
            }
            let text = string(op, &v)?;
            let re = Regex::new(&format!("^(?:{})$", pattern))
                .map_err(|e| EngineError::attribute(op, format!("invalid pattern '{}': {}", pattern, e)))?;
            Ok(Value::boolean(re.is_match(text)))
        }

        // -- comparison --
        Expr::Equal {
            expressions,
            tolerance_mode,
            tolerance,
            include_lower_bound,
            include_upper_bound,
        } => {
            let (a, b) = eval_pair(expressions, ctx, env)?;
            if null_if_any(&[&a, &b]) {
                return Ok(Value::Null);
            }
            let (x, y) = (number(op, &a)?, number(op, &b)?);
            let window = match tolerance_mode {
                ToleranceMode::Exact => Tolerance::exact(),
                mode => {
                    let bounds = match tolerance.as_slice() {
                        [t] => float_attr(op, t, ctx)?.map(|t| (t, t)),
                        [t0, t1] => float_attr(op, t0, ctx)?.zip(float_attr(op, t1, ctx)?),
                        _ => {
                            return Err(EngineError::attribute(
                                op,
                                "absolute and relative modes need one or two tolerance values",
                            ))
                        }
                    };
                    let Some((lower, upper)) = bounds else {
                        return Ok(Value::Null);
                    };
                    if lower < 0.0 || upper < 0.0 {
                        return Err(EngineError::attribute(op, "tolerance must not be negative"));
                    }
                    Tolerance {
                        mode: *mode,
                        lower,
                        upper,
                        include_lower: *include_lower_bound,
                        include_upper: *include_upper_bound,
                    }
                }
            };
            let equal = match (window.mode, x, y) {
                (ToleranceMode::Exact, Num::Int(a), Num::Int(b)) => a == b,
                _ => window.accepts(x.as_f64(), y.as_f64()),
            };
            Ok(Value::boolean(equal))
        }

        Expr::EqualRounded {
            expressions,
            rounding_mode,
            figures,
        } => {
            let (a, b) = eval_pair(expressions, ctx, env)?;
            let Some(figures) = int_attr(op, figures, ctx)? else {
                return Ok(Value::Null);
            };
            if null_if_any(&[&a, &b]) {
                return Ok(Value::Null);
            }
            let (x, y) = (number(op, &a)?, number(op, &b)?);
            check_figures(op, *rounding_mode, figures)?;
            let rx = numeric::round_to(x.as_f64(), *rounding_mode, figures);
            let ry = numeric::round_to(y.as_f64(), *rounding_mode, figures);
            Ok(match rx.zip(ry) {
                Some((rx, ry)) => Value::boolean(rx == ry),
                None => Value::Null,
            })
        }

        Expr::Inside {
            expression,
            shape: area,
            coords,
        } => {
            let v = eval_expr(expression, ctx, env)?;
            if v.is_null() {
                return Ok(Value::Null);
            }
            let points: Vec<&Scalar> = match &v {
                Value::Single(s) => vec![s],
                Value::Multiple(c) | Value::Ordered(c) => c.items().iter().collect(),
                Value::Record(_) | Value::Null => {
                    return Err(EngineError::CardinalityMismatch {
                        context: op.to_string(),
                        expected: "single, multiple or ordered point".to_string(),
                        got: v.describe(),
                    })
                }
            };
            for p in points {
                let Scalar::Point(x, y) = p else {
                    return Err(EngineError::BaseTypeMismatch {
                        context: op.to_string(),
                        expected: "point".to_string(),
                        got: p.base_type().to_string(),
                    });
                };
                let hit = shape::contains(*area, &coords.0, *x as f64, *y as f64)
                    .map_err(|msg| EngineError::attribute(op, msg))?;
                if hit {
                    return Ok(Value::boolean(true));
                }
            }
            Ok(Value::boolean(false))
        }

        Expr::Lt { expressions } => compare(op, expressions, ctx, env, |o| o == Ordering::Less),
        Expr::Gt { expressions } => compare(op, expressions, ctx, env, |o| o == Ordering::Greater),
        Expr::Lte { expressions } => compare(op, expressions, ctx, env, |o| o != Ordering::Greater),
        Expr::Gte { expressions } => compare(op, expressions, ctx, env, |o| o != Ordering::Less),

        Expr::DurationLt { expressions } | Expr::DurationGte { expressions } => {
            let (a, b) = eval_pair(expressions, ctx, env)?;
            if null_if_any(&[&a, &b]) {
                return Ok(Value::Null);
            }
            let (a, b) = (duration(op, &a)?, duration(op, &b)?);
            Ok(Value::boolean(if matches!(expr, Expr::DurationLt { .. }) {
                a < b
            } else {
                a >= b
            }))
        }

        // -- arithmetic --
        Expr::Sum { expressions } => {
            let values = eval_all(expressions, ctx, env)?;
            let Some(nums) = numbers(op, &values)? else {
                return Ok(Value::Null);
            };
            Ok(match all_ints(&nums) {
                Some(ints) => ints
                    .into_iter()
                    .try_fold(0i64, i64::checked_add)
                    .map_or(Value::Null, Value::integer),
                None => Value::float(nums.iter().map(|n| n.as_f64()).sum()),
            })
        }

        Expr::Product { expressions } => {
            let values = eval_all(expressions, ctx, env)?;
            let Some(nums) = numbers(op, &values)? else {
                return Ok(Value::Null);
            };
            Ok(match all_ints(&nums) {
                Some(ints) => ints
                    .into_iter()
                    .try_fold(1i64, i64::checked_mul)
                    .map_or(Value::Null, Value::integer),
                None => Value::float(nums.iter().map(|n| n.as_f64()).product()),
            })
        }

        Expr::Subtract { expressions } => {
            let (a, b) = eval_pair(expressions, ctx, env)?;
            if null_if_any(&[&a, &b]) {
                return Ok(Value::Null);
            }
            Ok(match (number(op, &a)?, number(op, &b)?) {
                (Num::Int(x), Num::Int(y)) => x.checked_sub(y).map_or(Value::Null, Value::integer),
                (x, y) => Value::float(x.as_f64() - y.as_f64()),
            })
        }

        Expr::Divide { expressions } => {
            let (a, b) = eval_pair(expressions, ctx, env)?;
            if null_if_any(&[&a, &b]) {
                return Ok(Value::Null);
            }
            let (x, y) = (number(op, &a)?.as_f64(), number(op, &b)?.as_f64());
            if y == 0.0 {
                return Ok(Value::Null);
            }
            Ok(Value::float(x / y))
        }

        Expr::Power { expressions } => {
            let (a, b) = eval_pair(expressions, ctx, env)?;
            if null_if_any(&[&a, &b]) {
                return Ok(Value::Null);
            }
            let (x, y) = (number(op, &a)?.as_f64(), number(op, &b)?.as_f64());
            Ok(Value::float(x.powf(y)))
        }

        Expr::IntegerDivide { expressions } | Expr::IntegerModulus { expressions } => {
            let (a, b) = eval_pair(expressions, ctx, env)?;
            if null_if_any(&[&a, &b]) {
                return Ok(Value::Null);
            }
            let (x, y) = (integer(op, &a)?, integer(op, &b)?);
            let r = if matches!(expr, Expr::IntegerDivide { .. }) {
                numeric::floor_div(x, y)
            } else {
                numeric::floor_mod(x, y)
            };
            Ok(r.map_or(Value::Null, Value::integer))
        }

        Expr::Truncate { expression } | Expr::Round { expression } => {
            let v = eval_expr(expression, ctx, env)?;
            if v.is_null() {
                return Ok(Value::Null);
            }
            Ok(match number(op, &v)? {
                Num::Int(i) => Value::integer(i),
                Num::Float(f) => {
                    let r = if matches!(expr, Expr::Round { .. }) {
                        numeric::round_half_up(f)
                    } else {
                        numeric::truncate(f)
                    };
                    r.map_or(Value::Null, Value::integer)
                }
            })
        }

        Expr::RoundTo {
            expression,
            rounding_mode,
            figures,
        } => {
            let v = eval_expr(expression, ctx, env)?;
            let Some(figures) = int_attr(op, figures, ctx)? else {
                return Ok(Value::Null);
            };
            if v.is_null() {
                return Ok(Value::Null);
            }
            let x = number(op, &v)?.as_f64();
            check_figures(op, *rounding_mode, figures)?;
            Ok(numeric::round_to(x, *rounding_mode, figures).map_or(Value::Null, Value::float))
        }

        Expr::IntegerToFloat { expression } => {
            let v = eval_expr(expression, ctx, env)?;
            if v.is_null() {
                return Ok(Value::Null);
            }
            Ok(Value::float(integer(op, &v)? as f64))
        }

        Expr::Max { expressions } | Expr::Min { expressions } => {
            let values = eval_all(expressions, ctx, env)?;
            let Some(nums) = numbers(op, &values)? else {
                return Ok(Value::Null);
            };
            let want = if matches!(expr, Expr::Max { .. }) {
                Ordering::Greater
            } else {
                Ordering::Less
            };
            let mut best = nums[0];
            for &n in &nums[1..] {
                if n.cmp(best) == Some(want) {
                    best = n;
                }
            }
            Ok(match (best, all_ints(&nums).is_some()) {
                (Num::Int(i), true) => Value::integer(i),
                (n, _) => Value::float(n.as_f64()),
            })
        }

        Expr::Gcd { expressions } | Expr::Lcm { expressions } => {
            let values = eval_all(expressions, ctx, env)?;
            let Some(ints) = integers(op, &values)? else {
                return Ok(Value::Null);
            };
            let r = if matches!(expr, Expr::Gcd { .. }) {
                numeric::gcd(&ints)
            } else {
                numeric::lcm(&ints)
            };
            Ok(r.map_or(Value::Null, Value::integer))
        }

        Expr::StatsOperator { name, expression } => {
            let v = eval_expr(expression, ctx, env)?;
            if v.is_null() {
                return Ok(Value::Null);
            }
            let c = container(op, &v)?;
            let data = c
                .items()
                .iter()
                .map(|s| scalar_number(op, s).map(Num::as_f64))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(numeric::statistic(*name, &data).map_or(Value::Null, Value::float))
        }

        Expr::MathOperator { name, expressions } => {
            let arity = numeric::arity(*name);
            if expressions.len() != arity {
                return Err(EngineError::attribute(
                    op,
                    format!("{:?} takes {} operand(s), got {}", name, arity, expressions.len()),
                ));
            }
            let values = eval_all(expressions, ctx, env)?;
            if values.iter().any(Value::is_null) {
                return Ok(Value::Null);
            }
            let x = number(op, &values[0])?;
            let y = match values.get(1) {
                Some(v) => number(op, v)?.as_f64(),
                None => 0.0,
            };
            Ok(apply_math(*name, x, y))
        }

        // -- extension --
        Expr::CustomOperator {
            class,
            definition,
            expressions,
        } => {
            let operands = eval_all(expressions, ctx, env)?;
            let Some(operator) = env.operators.resolve(class.as_deref(), definition.as_deref()) else {
                warn!(
                    class = class.as_deref().unwrap_or("-"),
                    definition = definition.as_deref().unwrap_or("-"),
                    "unresolved custom operator evaluates to NULL"
                );
                env.diagnostics.record(DiagnosticKind::UnresolvedCustomOperator {
                    class: class.clone(),
                    definition: definition.clone(),
                });
                return Ok(Value::Null);
            };
            match operator.evaluate(&operands) {
                Ok(v) => Ok(v),
                Err(message) => {
                    let key = OperatorKey::new(class.as_deref(), definition.as_deref()).to_string();
                    warn!(operator = %key, error = %message, "custom operator failed");
                    env.diagnostics
                        .record(DiagnosticKind::CustomOperatorFailed { key, message });
                    Ok(Value::Null)
                }
            }
        }
    }
}

fn compare(
    op: &str,
    exprs: &Binary,
    ctx: &VariableContext,
    env: &mut EvalEnv<'_>,
    accept: impl Fn(Ordering) -> bool,
) -> Result<Value, EngineError> {
    let (a, b) = eval_pair(exprs, ctx, env)?;
    if null_if_any(&[&a, &b]) {
        return Ok(Value::Null);
    }
    let (x, y) = (number(op, &a)?, number(op, &b)?);
    Ok(x.cmp(y).map_or(Value::Null, |o| Value::boolean(accept(o))))
}

fn fold_case(a: &str, b: &str, case_sensitive: bool) -> (String, String) {
    if case_sensitive {
        (a.to_string(), b.to_string())
    } else {
        (a.to_lowercase(), b.to_lowercase())
    }
}

fn apply_math(name: MathFunction, x: Num, y: f64) -> Value {
    if let (MathFunction::Abs, Num::Int(i)) = (name, x) {
        return i.checked_abs().map_or(Value::Null, Value::integer);
    }
    match numeric::math(name, x.as_f64(), y) {
        Some(r) if numeric::yields_integer(name) => {
            numeric::integral(r).map_or(Value::Null, Value::integer)
        }
        Some(r) => Value::float(r),
        None => Value::Null,
    }
}

/// Elements of the non-NULL operands of `multiple` / `ordered` / `repeat`,
/// with their shared base type. `None` when every operand is NULL.
fn flatten(op: &str, values: Vec<Value>, ordered: bool) -> Result<Option<(BaseType, Vec<Scalar>)>, EngineError> {
    let mut items = Vec::new();
    for v in values {
        if v.is_null() {
            continue;
        }
        match v {
            Value::Single(s) => items.push(s),
            Value::Multiple(c) if !ordered => items.extend(c.into_items()),
            Value::Ordered(c) if ordered => items.extend(c.into_items()),
            other => {
                return Err(EngineError::CardinalityMismatch {
                    context: op.to_string(),
                    expected: if ordered { "single or ordered" } else { "single or multiple" }.to_string(),
                    got: other.describe(),
                })
            }
        }
    }
    let Some(base_type) = items.first().map(Scalar::base_type) else {
        return Ok(None);
    };
    Ok(Some((base_type, items)))
}

fn build_container(op: &str, values: Vec<Value>, ordered: bool) -> Result<Value, EngineError> {
    let Some((base_type, items)) = flatten(op, values, ordered)? else {
        return Ok(Value::Null);
    };
    let c = Container::new(base_type, items)?;
    Ok(if ordered { Value::Ordered(c) } else { Value::Multiple(c) })
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::ScriptedRandom;
    use crate::types::{Cardinality, OutcomeDeclaration, ResponseDeclaration};
    use serde_json::json;

    fn parse(v: serde_json::Value) -> Expr {
        serde_json::from_value(v).unwrap()
    }

    fn run(expr: &Expr, ctx: &VariableContext) -> Result<Value, EngineError> {
        let operators = OperatorRegistry::new();
        let mut random = ScriptedRandom::default();
        let mut diagnostics = Diagnostics::new();
        let mut env = EvalEnv::new(&operators, &mut random, &mut diagnostics);
        eval_expr(expr, ctx, &mut env)
    }

    fn eval(v: serde_json::Value) -> Value {
        run(&parse(v), &VariableContext::new()).unwrap()
    }

    fn int(i: i64) -> serde_json::Value {
        json!({ "kind": "baseValue", "baseType": "integer", "value": i })
    }

    fn float(f: f64) -> serde_json::Value {
        json!({ "kind": "baseValue", "baseType": "float", "value": f })
    }

    fn ident(s: &str) -> serde_json::Value {
        json!({ "kind": "baseValue", "baseType": "identifier", "value": s })
    }

    fn boolean(b: bool) -> serde_json::Value {
        json!({ "kind": "baseValue", "baseType": "boolean", "value": b })
    }

    fn null_value() -> serde_json::Value {
        json!({ "kind": "null" })
    }

    fn ordered_idents(items: &[&str]) -> serde_json::Value {
        json!({ "kind": "ordered", "expressions": items.iter().map(|s| ident(s)).collect::<Vec<_>>() })
    }

    fn multiple_idents(items: &[&str]) -> serde_json::Value {
        json!({ "kind": "multiple", "expressions": items.iter().map(|s| ident(s)).collect::<Vec<_>>() })
    }

    fn idents(items: &[&str]) -> Vec<Scalar> {
        items.iter().map(|s| Scalar::Identifier(s.to_string())).collect()
    }

    #[test]
    fn binary_numeric_operators_propagate_null_value() {
        for kind in [
            "subtract", "divide", "power", "integerDivide", "integerModulus", "lt", "gt", "lte",
            "gte", "equal", "sum", "product", "max", "min", "gcd", "lcm",
        ] {
            assert_eq!(eval(json!({ "kind": kind, "expressions": [null_value(), int(3)] })), Value::Null, "{kind}(NULL, x)");
            assert_eq!(eval(json!({ "kind": kind, "expressions": [int(3), null_value()] })), Value::Null, "{kind}(x, NULL)");
        }
        assert_eq!(
            eval(json!({ "kind": "equalRounded", "figures": 2, "expressions": [null_value(), int(3)] })),
            Value::Null
        );
    }

    #[test]
    fn null_checked_before_type_contract() {
        let v = eval(json!({ "kind": "integerDivide", "expressions": [null_value(), float(2.5)] }));
        assert_eq!(v, Value::Null);
    }

    #[test]
    fn three_valued_logic() {
        assert_eq!(eval(json!({ "kind": "or", "expressions": [null_value(), boolean(true)] })), Value::boolean(true));
        assert_eq!(eval(json!({ "kind": "or", "expressions": [null_value(), boolean(false)] })), Value::Null);
        assert_eq!(eval(json!({ "kind": "or", "expressions": [boolean(false), boolean(false)] })), Value::boolean(false));
        assert_eq!(eval(json!({ "kind": "and", "expressions": [null_value(), boolean(false)] })), Value::boolean(false));
        assert_eq!(eval(json!({ "kind": "and", "expressions": [null_value(), boolean(true)] })), Value::Null);
        assert_eq!(eval(json!({ "kind": "not", "expression": null_value() })), Value::Null);
    }

    #[test]
    fn any_n_accounts_for_nulls() {
        let e = |exprs: Vec<serde_json::Value>| json!({ "kind": "anyN", "min": 2, "max": 3, "expressions": exprs });
        assert_eq!(eval(e(vec![boolean(true), boolean(true), boolean(false)])), Value::boolean(true));
        assert_eq!(eval(e(vec![boolean(true), null_value(), boolean(false)])), Value::Null);
        assert_eq!(eval(e(vec![boolean(true), boolean(false), boolean(false)])), Value::boolean(false));
    }

    #[test]
    fn equal_with_absolute_tolerance() {
        let e = |a: f64, b: f64| {
            json!({ "kind": "equal", "toleranceMode": "absolute", "tolerance": ["0.05"],
                    "expressions": [float(a), float(b)] })
        };
        assert_eq!(eval(e(3.14, 3.10)), Value::boolean(true));
        assert_eq!(eval(e(3.14, 3.00)), Value::boolean(false));
    }

    #[test]
    fn equal_needs_tolerance_outside_exact_mode() {
        let e = parse(json!({ "kind": "equal", "toleranceMode": "relative", "expressions": [int(1), int(1)] }));
        assert!(matches!(run(&e, &VariableContext::new()), Err(EngineError::InvalidAttribute { .. })));
    }

    #[test]
    fn equal_rounded_decimal_places() {
        let v = eval(json!({ "kind": "equalRounded", "roundingMode": "decimalPlaces", "figures": 2,
                             "expressions": [float(3.145), float(3.14)] }));
        assert_eq!(v, Value::boolean(true));
    }

    #[test]
    fn equal_rounded_with_variable_figures() {
        let mut ctx = VariableContext::new();
        ctx.declare_outcome(
            OutcomeDeclaration::new("FIG", Cardinality::Single, Some(BaseType::Integer))
                .with_default(Value::integer(1)),
        );
        let e = parse(json!({ "kind": "equalRounded", "roundingMode": "decimalPlaces", "figures": "{FIG}",
                              "expressions": [float(1.26), float(1.34)] }));
        assert_eq!(run(&e, &ctx).unwrap(), Value::boolean(true));
        ctx.set_value("FIG", Value::integer(2)).unwrap();
        assert_eq!(run(&e, &ctx).unwrap(), Value::boolean(false));
        ctx.set_value("FIG", Value::Null).unwrap();
        assert_eq!(run(&e, &ctx).unwrap(), Value::Null);
    }

    #[test]
    fn statistics_over_containers() {
        let data = json!({ "kind": "multiple", "expressions": ([2, 4, 4, 4, 5, 5, 7, 9].map(int)) });
        let stat = |name: &str| eval(json!({ "kind": "statsOperator", "name": name, "expression": data.clone() }));
        assert_eq!(stat("popVariance"), Value::float(4.0));
        match stat("sampleVariance") {
            Value::Single(Scalar::Float(f)) => assert!((f - 4.571428571428571).abs() < 1e-12),
            other => panic!("unexpected {:?}", other),
        }
        let empty = json!({ "kind": "statsOperator", "name": "mean", "expression": { "kind": "multiple" } });
        assert_eq!(eval(empty), Value::Null);
    }

    #[test]
    fn index_is_one_based() {
        assert_eq!(
            eval(json!({ "kind": "index", "n": 2, "expression": ordered_idents(&["a", "b", "c"]) })),
            Value::identifier("b")
        );
        assert_eq!(
            eval(json!({ "kind": "index", "n": 5, "expression": ordered_idents(&["a"]) })),
            Value::Null
        );
        assert_eq!(
            eval(json!({ "kind": "index", "n": 0, "expression": ordered_idents(&["a"]) })),
            Value::Null
        );
    }

    #[test]
    fn delete_removes_one_match() {
        let m = eval(json!({ "kind": "delete", "expressions": [ident("a"), multiple_idents(&["a", "b", "a"])] }));
        assert_eq!(m, Value::multiple(BaseType::Identifier, idents(&["b", "a"])).unwrap());
        let o = eval(json!({ "kind": "delete", "expressions": [ident("a"), ordered_idents(&["a", "b", "a"])] }));
        assert_eq!(o, Value::ordered(BaseType::Identifier, idents(&["b", "a"])).unwrap());
    }

    #[test]
    fn member_and_contains() {
        assert_eq!(
            eval(json!({ "kind": "member", "expressions": [ident("b"), multiple_idents(&["a", "b"])] })),
            Value::boolean(true)
        );
        assert_eq!(
            eval(json!({ "kind": "contains", "expressions": [multiple_idents(&["a", "b", "a"]), multiple_idents(&["a", "a"])] })),
            Value::boolean(true)
        );
        assert_eq!(
            eval(json!({ "kind": "contains", "expressions": [ordered_idents(&["a", "b", "c"]), ordered_idents(&["a", "c"])] })),
            Value::boolean(false)
        );
        assert_eq!(
            eval(json!({ "kind": "contains", "expressions": [ordered_idents(&["a", "b", "c"]), ordered_idents(&["b", "c"])] })),
            Value::boolean(true)
        );
    }

    #[test]
    fn repeat_concatenates_in_order() {
        let v = eval(json!({ "kind": "repeat", "numberRepeats": 2, "expressions": [ident("x"), ordered_idents(&["y", "z"])] }));
        assert_eq!(v, Value::ordered(BaseType::Identifier, idents(&["x", "y", "z", "x", "y", "z"])).unwrap());
    }

    #[test]
    fn mixed_container_is_an_engine_error() {
        let e = parse(json!({ "kind": "multiple", "expressions": [ident("a"), int(1)] }));
        assert!(matches!(run(&e, &VariableContext::new()), Err(EngineError::MixedBaseTypes { .. })));
    }

    #[test]
    fn container_size_and_is_null_value() {
        assert_eq!(eval(json!({ "kind": "containerSize", "expression": null_value() })), Value::integer(0));
        assert_eq!(
            eval(json!({ "kind": "containerSize", "expression": multiple_idents(&["a", "b"]) })),
            Value::integer(2)
        );
        assert_eq!(eval(json!({ "kind": "isNull", "expression": { "kind": "multiple" } })), Value::boolean(true));
        assert_eq!(eval(json!({ "kind": "isNull", "expression": int(0) })), Value::boolean(false));
    }

    #[test]
    fn integer_operators_reject_floats() {
        let e = parse(json!({ "kind": "integerDivide", "expressions": [float(7.0), int(2)] }));
        assert!(matches!(run(&e, &VariableContext::new()), Err(EngineError::IntegerRequired { .. })));
        let e = parse(json!({ "kind": "integerToFloat", "expression": float(1.0) }));
        assert!(matches!(run(&e, &VariableContext::new()), Err(EngineError::IntegerRequired { .. })));
        assert_eq!(eval(json!({ "kind": "integerModulus", "expressions": [int(-7), int(2)] })), Value::integer(1));
        assert_eq!(eval(json!({ "kind": "integerDivide", "expressions": [int(1), int(0)] })), Value::Null);
    }

    #[test]
    fn arithmetic_types_and_overflow() {
        assert_eq!(eval(json!({ "kind": "sum", "expressions": [int(1), int(2)] })), Value::integer(3));
        assert_eq!(eval(json!({ "kind": "sum", "expressions": [int(1), float(0.5)] })), Value::float(1.5));
        assert_eq!(eval(json!({ "kind": "sum", "expressions": [int(i64::MAX), int(1)] })), Value::Null);
        assert_eq!(eval(json!({ "kind": "divide", "expressions": [int(1), int(0)] })), Value::Null);
        assert_eq!(eval(json!({ "kind": "divide", "expressions": [int(3), int(2)] })), Value::float(1.5));
        assert_eq!(eval(json!({ "kind": "round", "expression": float(2.5) })), Value::integer(3));
        assert_eq!(eval(json!({ "kind": "truncate", "expression": float(-2.5) })), Value::integer(-2));
        assert_eq!(eval(json!({ "kind": "max", "expressions": [int(1), float(2.5), int(2)] })), Value::float(2.5));
        assert_eq!(eval(json!({ "kind": "min", "expressions": [int(4), int(2)] })), Value::integer(2));
        assert_eq!(
            eval(json!({ "kind": "roundTo", "roundingMode": "significantFigures", "figures": 2, "expression": float(1234.5) })),
            Value::float(1200.0)
        );
    }

    #[test]
    fn math_operators() {
        let m = |name: &str, x: serde_json::Value| eval(json!({ "kind": "mathOperator", "name": name, "expressions": [x] }));
        assert_eq!(m("asin", float(2.0)), Value::Null);
        assert_eq!(m("log", int(0)), Value::Null);
        assert_eq!(m("floor", float(2.7)), Value::integer(2));
        assert_eq!(m("abs", int(-4)), Value::integer(4));
        assert_eq!(m("abs", float(-4.5)), Value::float(4.5));
        assert_eq!(m("ln", null_value()), Value::Null);
    }

    #[test]
    fn string_operators() {
        let s = |v: &str| json!({ "kind": "baseValue", "baseType": "string", "value": v });
        assert_eq!(
            eval(json!({ "kind": "stringMatch", "caseSensitive": false, "expressions": [s("Paris"), s("PARIS")] })),
            Value::boolean(true)
        );
        assert_eq!(
            eval(json!({ "kind": "substring", "expressions": [s("ar"), s("Paris")] })),
            Value::boolean(true)
        );
        assert_eq!(
            eval(json!({ "kind": "patternMatch", "pattern": "[0-9]+", "expression": s("123") })),
            Value::boolean(true)
        );
        assert_eq!(
            eval(json!({ "kind": "patternMatch", "pattern": "[0-9]+", "expression": s("a123") })),
            Value::boolean(false)
        );
        let bad = parse(json!({ "kind": "patternMatch", "pattern": "(", "expression": s("x") }));
        assert!(matches!(run(&bad, &VariableContext::new()), Err(EngineError::InvalidAttribute { .. })));
    }

    #[test]
    fn inside_shapes() {
        let p = |x: i64, y: i64| json!({ "kind": "baseValue", "baseType": "point", "value": format!("{} {}", x, y) });
        assert_eq!(
            eval(json!({ "kind": "inside", "shape": "circle", "coords": "10,10,5", "expression": p(12, 12) })),
            Value::boolean(true)
        );
        assert_eq!(
            eval(json!({ "kind": "inside", "shape": "rect", "coords": "0,0,5,5", "expression": p(12, 12) })),
            Value::boolean(false)
        );
    }

    #[test]
    fn random_draws_from_injected_source() {
        let operators = OperatorRegistry::new();
        let mut random = ScriptedRandom::new(vec![3, 1], vec![]);
        let mut diagnostics = Diagnostics::new();
        let mut env = EvalEnv::new(&operators, &mut random, &mut diagnostics);
        let ctx = VariableContext::new();
        let e = parse(json!({ "kind": "randomInteger", "min": 2, "max": 12, "step": 2 }));
        assert_eq!(eval_expr(&e, &ctx, &mut env).unwrap(), Value::integer(8));
        let e = parse(json!({ "kind": "random", "expression": ordered_idents(&["a", "b", "c"]) }));
        assert_eq!(eval_expr(&e, &ctx, &mut env).unwrap(), Value::identifier("b"));
    }

    #[test]
    fn unresolved_custom_operator_is_null_with_diagnostic() {
        let operators = OperatorRegistry::new();
        let mut random = ScriptedRandom::default();
        let mut diagnostics = Diagnostics::new();
        let e = parse(json!({ "kind": "customOperator", "class": "com.example.Missing", "expressions": [int(1)] }));
        let v = {
            let mut env = EvalEnv::new(&operators, &mut random, &mut diagnostics);
            eval_expr(&e, &VariableContext::new(), &mut env).unwrap()
        };
        assert_eq!(v, Value::Null);
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn registered_custom_operator_receives_operands() {
        let mut operators = OperatorRegistry::new();
        operators.register(Some("com.example.Math"), Some("double"), |ops: &[Value]| match ops {
            [Value::Single(Scalar::Integer(i))] => Ok(Value::integer(i * 2)),
            _ => Err("expected one integer".to_string()),
        });
        let mut random = ScriptedRandom::default();
        let mut diagnostics = Diagnostics::new();
        let mut env = EvalEnv::new(&operators, &mut random, &mut diagnostics);
        let e = parse(json!({ "kind": "customOperator", "class": "com.example.Math", "definition": "double",
                              "expressions": [int(21)] }));
        assert_eq!(eval_expr(&e, &VariableContext::new(), &mut env).unwrap(), Value::integer(42));
    }

    #[test]
    fn map_response_through_declaration() {
        let mut ctx = VariableContext::new();
        let decl: ResponseDeclaration = serde_json::from_value(json!({
            "identifier": "RESPONSE", "cardinality": "multiple", "baseType": "identifier",
            "mapping": { "defaultValue": 0, "entries": [
                { "mapKey": "A", "mappedValue": 2 }, { "mapKey": "B", "mappedValue": -1 }
            ] }
        }))
        .unwrap();
        ctx.declare_response(decl);
        ctx.set_value("RESPONSE", Value::multiple(BaseType::Identifier, idents(&["A", "B"])).unwrap())
            .unwrap();
        let e = parse(json!({ "kind": "mapResponse", "identifier": "RESPONSE" }));
        assert_eq!(run(&e, &ctx).unwrap(), Value::float(1.0));
    }

    #[test]
    fn test_level_expression_without_session() {
        let e = parse(json!({ "kind": "numberCorrect" }));
        assert_eq!(
            run(&e, &VariableContext::new()).unwrap_err(),
            EngineError::NoTestSession { expression: "numberCorrect" }
        );
    }

    #[test]
    fn undeclared_variable_is_an_engine_error() {
        let e = Expr::variable("NOPE");
        assert!(matches!(
            run(&e, &VariableContext::new()),
            Err(EngineError::UndeclaredVariable { .. })
        ));
    }
}
