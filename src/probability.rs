//! Exact rational numbers and coercion into them.
//!
//! Every probability and every attributed value is a [`Probability`], an
//! arbitrary-precision rational. Floating point never enters the ledger:
//! an `f64` input is converted to the exact binary fraction it stores.

use std::str::FromStr;

use num_bigint::BigInt;
use num_rational::{BigRational, Ratio};
use num_traits::{One, Signed, Zero};

use crate::error::ValidationError;

/// Exact rational used for probabilities and attributed values.
pub type Probability = BigRational;

/// Exact zero.
#[must_use]
pub fn zero() -> Probability {
    Probability::zero()
}

/// Exact one.
#[must_use]
pub fn one() -> Probability {
    Probability::one()
}

/// Builds `numer / denom` without going through floating point.
///
/// # Panics
///
/// Panics if `denom` is zero.
#[must_use]
pub fn ratio(numer: i64, denom: i64) -> Probability {
    Probability::new(BigInt::from(numer), BigInt::from(denom))
}

/// Renders a rational as `n/d`, or `n` when the denominator is 1.
#[must_use]
pub fn render(p: &Probability) -> String {
    if p.denom().is_one() {
        p.numer().to_string()
    } else {
        format!("{}/{}", p.numer(), p.denom())
    }
}

/// Returns true if `p` lies in `[0, 1]`.
#[must_use]
pub fn is_unit_interval(p: &Probability) -> bool {
    !p.is_negative() && *p <= one()
}

/// Conversion into an exact [`Probability`].
///
/// This is the coercion layer used by builders and ledger writes; it accepts
/// exact rationals, integers, `(numer, denom)` pairs, floats and text.
pub trait IntoProbability {
    /// Performs the conversion.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidProbabilityLiteral` if the input has no
    /// exact rational value (non-finite floats, malformed text, zero denominators).
    fn into_probability(self) -> Result<Probability, ValidationError>;
}

impl IntoProbability for Probability {
    fn into_probability(self) -> Result<Probability, ValidationError> {
        Ok(self)
    }
}

impl IntoProbability for &Probability {
    fn into_probability(self) -> Result<Probability, ValidationError> {
        Ok(self.clone())
    }
}

impl IntoProbability for Ratio<i64> {
    fn into_probability(self) -> Result<Probability, ValidationError> {
        Ok(Probability::new(
            BigInt::from(*self.numer()),
            BigInt::from(*self.denom()),
        ))
    }
}

impl IntoProbability for i32 {
    fn into_probability(self) -> Result<Probability, ValidationError> {
        Ok(Probability::from_integer(BigInt::from(self)))
    }
}

impl IntoProbability for i64 {
    fn into_probability(self) -> Result<Probability, ValidationError> {
        Ok(Probability::from_integer(BigInt::from(self)))
    }
}

impl IntoProbability for u64 {
    fn into_probability(self) -> Result<Probability, ValidationError> {
        Ok(Probability::from_integer(BigInt::from(self)))
    }
}

impl IntoProbability for (i64, i64) {
    fn into_probability(self) -> Result<Probability, ValidationError> {
        let (numer, denom) = self;
        if denom == 0 {
            return Err(literal_err(format!("{numer}/{denom}"), "zero denominator"));
        }
        Ok(ratio(numer, denom))
    }
}

impl IntoProbability for f64 {
    fn into_probability(self) -> Result<Probability, ValidationError> {
        Probability::from_float(self)
            .ok_or_else(|| literal_err(self.to_string(), "value is not finite"))
    }
}

impl IntoProbability for &str {
    fn into_probability(self) -> Result<Probability, ValidationError> {
        parse_probability(self)
    }
}

impl IntoProbability for String {
    fn into_probability(self) -> Result<Probability, ValidationError> {
        parse_probability(&self)
    }
}

fn literal_err(input: impl Into<String>, reason: &str) -> ValidationError {
    ValidationError::InvalidProbabilityLiteral {
        input: input.into(),
        reason: reason.to_string(),
    }
}

/// Parses `"n/d"`, `"n"` or a plain decimal such as `"-0.125"`.
///
/// # Errors
///
/// Returns `ValidationError::InvalidProbabilityLiteral` for anything else.
pub fn parse_probability(input: &str) -> Result<Probability, ValidationError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(literal_err(input, "empty input"));
    }

    if let Some((numer, denom)) = s.split_once('/') {
        let numer = parse_int(numer.trim()).ok_or_else(|| literal_err(input, "bad numerator"))?;
        let denom =
            parse_int(denom.trim()).ok_or_else(|| literal_err(input, "bad denominator"))?;
        if denom.is_zero() {
            return Err(literal_err(input, "zero denominator"));
        }
        return Ok(Probability::new(numer, denom));
    }

    if let Some((whole, frac)) = s.split_once('.') {
        if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(literal_err(input, "bad fractional digits"));
        }
        let (negative, whole_digits) = match whole.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, whole.strip_prefix('+').unwrap_or(whole)),
        };
        let whole = if whole_digits.is_empty() {
            BigInt::zero()
        } else {
            parse_int(whole_digits).ok_or_else(|| literal_err(input, "bad integer part"))?
        };
        let scale = BigInt::from(10u32).pow(u32::try_from(frac.len()).map_err(|_| {
            literal_err(input, "too many fractional digits")
        })?);
        let frac = parse_int(frac).ok_or_else(|| literal_err(input, "bad fractional digits"))?;
        let magnitude = Probability::new(whole * &scale + frac, scale);
        return Ok(if negative { -magnitude } else { magnitude });
    }

    parse_int(s)
        .map(Probability::from_integer)
        .ok_or_else(|| literal_err(input, "not a rational literal"))
}

fn parse_int(s: &str) -> Option<BigInt> {
    let digits = s
        .strip_prefix('-')
        .or_else(|| s.strip_prefix('+'))
        .unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    BigInt::from_str(s).ok()
}
