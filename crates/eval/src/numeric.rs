//! Numeric helpers behind the arithmetic, comparison and statistics
//! operators.
//!
//! Values are `i64` / `f64` at the operator boundary; `roundTo` and
//! `equalRounded` round through `rust_decimal`. Every helper returns
//! `None` where the operator's result is NULL (overflow, division by zero,
//! domain error, non-finite result).

use rust_decimal::{Decimal, RoundingStrategy};

use crate::types::{MathFunction, RoundingMode, Statistic, ToleranceMode};

/// `Some(f)` when `f` is finite.
pub fn finite(f: f64) -> Option<f64> {
    f.is_finite().then_some(f)
}

// ──────────────────────────────────────────────
// Tolerant equality
// ──────────────────────────────────────────────

/// Tolerance window for `equal`.
///
/// `lower` and `upper` are the two tolerance values; a single tolerance is
/// used for both sides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub mode: ToleranceMode,
    pub lower: f64,
    pub upper: f64,
    pub include_lower: bool,
    pub include_upper: bool,
}

impl Tolerance {
    pub fn exact() -> Self {
        Tolerance {
            mode: ToleranceMode::Exact,
            lower: 0.0,
            upper: 0.0,
            include_lower: true,
            include_upper: true,
        }
    }

    /// Whether `y` lies in the window centred on `x`.
    ///
    /// absolute: `[x - t0, x + t1]`; relative: `[x * (1 - t0/100), x * (1 + t1/100)]`.
    pub fn accepts(&self, x: f64, y: f64) -> bool {
        let (lo, hi) = match self.mode {
            ToleranceMode::Exact => return x == y,
            ToleranceMode::Absolute => (x - self.lower, x + self.upper),
            ToleranceMode::Relative => (
                x * (1.0 - self.lower / 100.0),
                x * (1.0 + self.upper / 100.0),
            ),
        };
        // A negative centre flips the relative window.
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        let above = if self.include_lower { y >= lo } else { y > lo };
        let below = if self.include_upper { y <= hi } else { y < hi };
        above && below
    }
}

// ──────────────────────────────────────────────
// Rounding
// ──────────────────────────────────────────────

/// Round to `figures` decimal places or significant figures.
///
/// Rounds the shortest decimal form of `value` (the digits `{}` prints,
/// so `3.145` is exactly 3.145) with ties to even: `3.145` to two places is
/// `3.14`, `0.35` to one place is `0.4`. `None` when `figures` is out of
/// range for the mode (negative decimal places, fewer than one significant
/// figure) or the result is not finite.
pub fn round_to(value: f64, mode: RoundingMode, figures: i64) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    let figures = match mode {
        RoundingMode::DecimalPlaces if figures >= 0 => u32::try_from(figures).ok()?,
        RoundingMode::SignificantFigures if figures >= 1 => u32::try_from(figures).ok()?,
        _ => return None,
    };
    if value == 0.0 {
        return Some(0.0);
    }
    match value.to_string().parse::<Decimal>() {
        Ok(d) if !d.is_zero() => {
            let rounded = match mode {
                RoundingMode::DecimalPlaces => Some(
                    d.round_dp_with_strategy(figures, RoundingStrategy::MidpointNearestEven),
                ),
                RoundingMode::SignificantFigures => {
                    d.round_sf_with_strategy(figures, RoundingStrategy::MidpointNearestEven)
                }
            };
            match rounded.and_then(|r| r.to_string().parse::<f64>().ok()) {
                Some(f) => finite(f),
                None => round_to_binary(value, mode, figures),
            }
        }
        _ => round_to_binary(value, mode, figures),
    }
}

/// Scaled-float fallback for magnitudes `Decimal` cannot hold.
fn round_to_binary(value: f64, mode: RoundingMode, figures: u32) -> Option<f64> {
    let places = match mode {
        RoundingMode::DecimalPlaces => i32::try_from(figures).ok()?,
        RoundingMode::SignificantFigures => {
            i32::try_from(figures).ok()? - 1 - value.abs().log10().floor() as i32
        }
    };
    if places >= 0 {
        let scale = 10f64.powi(places);
        let scaled = value * scale;
        if !scaled.is_finite() {
            return finite(value);
        }
        finite(scaled.round_ties_even() / scale)
    } else {
        let scale = 10f64.powi(-places);
        finite((value / scale).round_ties_even() * scale)
    }
}

/// `round`: nearest integer, halves toward positive infinity.
pub fn round_half_up(value: f64) -> Option<i64> {
    to_i64((value + 0.5).floor())
}

/// `truncate`: toward zero.
pub fn truncate(value: f64) -> Option<i64> {
    to_i64(value.trunc())
}

fn to_i64(f: f64) -> Option<i64> {
    if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

// ──────────────────────────────────────────────
// Integer arithmetic
// ──────────────────────────────────────────────

/// Quotient rounded toward negative infinity.
pub fn floor_div(a: i64, b: i64) -> Option<i64> {
    if b == 0 {
        return None;
    }
    let q = a.checked_div(b)?;
    if a.checked_rem(b)? != 0 && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

/// Remainder matching `floor_div`; takes the sign of the divisor.
pub fn floor_mod(a: i64, b: i64) -> Option<i64> {
    let q = floor_div(a, b)?;
    a.checked_sub(b.checked_mul(q)?)
}

fn gcd_pair(a: i64, b: i64) -> Option<i64> {
    let (mut a, mut b) = (a.checked_abs()?, b.checked_abs()?);
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    Some(a)
}

/// Greatest common divisor of all values; 0 when every value is 0.
pub fn gcd(values: &[i64]) -> Option<i64> {
    values.iter().try_fold(0i64, |acc, &v| gcd_pair(acc, v))
}

/// Least common multiple of all values; 0 when any value is 0.
pub fn lcm(values: &[i64]) -> Option<i64> {
    if values.iter().any(|&v| v == 0) {
        return Some(0);
    }
    values.iter().try_fold(1i64, |acc, &v| {
        let g = gcd_pair(acc, v)?;
        (acc / g).checked_mul(v.checked_abs()?)
    })
}

// ──────────────────────────────────────────────
// Statistics
// ──────────────────────────────────────────────

/// `statsOperator` over a non-empty sample. Sample statistics need at least
/// two values.
pub fn statistic(stat: Statistic, values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let squares = || values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    let result = match stat {
        Statistic::Mean => mean,
        Statistic::PopVariance => squares() / n as f64,
        Statistic::PopSD => (squares() / n as f64).sqrt(),
        Statistic::SampleVariance if n > 1 => squares() / (n - 1) as f64,
        Statistic::SampleSD if n > 1 => (squares() / (n - 1) as f64).sqrt(),
        Statistic::SampleVariance | Statistic::SampleSD => return None,
    };
    finite(result)
}

// ──────────────────────────────────────────────
// Math functions
// ──────────────────────────────────────────────

/// Number of arguments a math function takes.
pub fn arity(function: MathFunction) -> usize {
    match function {
        MathFunction::Atan2 => 2,
        _ => 1,
    }
}

/// Apply a math function; domain errors are `None`.
pub fn math(function: MathFunction, x: f64, y: f64) -> Option<f64> {
    use MathFunction::*;
    let r = match function {
        Sin => x.sin(),
        Cos => x.cos(),
        Tan => x.tan(),
        Sec => x.cos().recip(),
        Csc => x.sin().recip(),
        Cot => x.tan().recip(),
        Asin => x.asin(),
        Acos => x.acos(),
        Atan => x.atan(),
        Atan2 => x.atan2(y),
        Asec if x.abs() >= 1.0 => x.recip().acos(),
        Acsc if x.abs() >= 1.0 => x.recip().asin(),
        Asec | Acsc => return None,
        Acot if x == 0.0 => std::f64::consts::FRAC_PI_2,
        Acot => x.recip().atan(),
        Sinh => x.sinh(),
        Cosh => x.cosh(),
        Tanh => x.tanh(),
        Sech => x.cosh().recip(),
        Csch => x.sinh().recip(),
        Coth => x.tanh().recip(),
        Log if x > 0.0 => x.log10(),
        Ln if x > 0.0 => x.ln(),
        Log | Ln => return None,
        Exp => x.exp(),
        Abs => x.abs(),
        Signum if x == 0.0 => 0.0,
        Signum => x.signum(),
        Floor => x.floor(),
        Ceil => x.ceil(),
        ToDegrees => x.to_degrees(),
        ToRadians => x.to_radians(),
    };
    finite(r)
}

/// Functions whose result is an integer.
pub fn yields_integer(function: MathFunction) -> bool {
    matches!(
        function,
        MathFunction::Floor | MathFunction::Ceil | MathFunction::Signum
    )
}

/// Convert an integer-valued float result, `None` outside `i64`.
pub fn integral(f: f64) -> Option<i64> {
    to_i64(f)
}
