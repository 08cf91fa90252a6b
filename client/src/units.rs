//! # Unit Conversion
//!
//! Token amounts are entered and displayed as decimals ("1.23 ESD") but every
//! contract call wants an integer count of base units scaled by
//! `10^decimals`. This module owns that translation and nothing else.
//!
//! [`TokenAmount`] is an exact decimal: an unsigned 256-bit mantissa, a
//! decimal scale, and a sign. It is parsed from text at the boundary and never
//! passes through `f64`. [`BaseUnitAmount`] is a plain [`U256`].
//!
//! Conversion down ([`to_base_unit`]) floors toward zero so the on-chain
//! value never exceeds what the user typed. Conversion up ([`to_token_unit`])
//! is exact.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use alloy_primitives::U256;

use crate::config::UNLIMITED_ALLOWANCE_THRESHOLD;
use crate::error::ClientError;

/// An integer amount in a token's smallest denomination.
pub type BaseUnitAmount = U256;

/// Largest power of ten that fits in a `U256` is `10^77`.
const MAX_POW10: u32 = 77;

/// Returns `10^exp`, or `None` if it does not fit in 256 bits.
pub fn pow10(exp: u32) -> Option<U256> {
    if exp > MAX_POW10 {
        return None;
    }
    U256::from(10u64).checked_pow(U256::from(exp))
}

// ---------------------------------------------------------------------------
// TokenAmount
// ---------------------------------------------------------------------------

/// An exact decimal token quantity.
///
/// Stored in canonical form: the mantissa carries no trailing decimal zeros
/// and zero is never negative, so structural equality is numeric equality.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TokenAmount {
    mantissa: U256,
    scale: u32,
    negative: bool,
}

impl TokenAmount {
    /// Zero.
    pub const ZERO: TokenAmount = TokenAmount {
        mantissa: U256::ZERO,
        scale: 0,
        negative: false,
    };

    /// Builds `mantissa / 10^scale`, normalized.
    pub fn from_parts(mantissa: U256, scale: u32, negative: bool) -> Self {
        let mut amount = Self {
            mantissa,
            scale,
            negative,
        };
        amount.normalize();
        amount
    }

    /// A whole number of tokens.
    pub fn from_integer(value: u64) -> Self {
        Self::from_parts(U256::from(value), 0, false)
    }

    fn normalize(&mut self) {
        let ten = U256::from(10u64);
        while self.scale > 0 && !self.mantissa.is_zero() && (self.mantissa % ten).is_zero() {
            self.mantissa /= ten;
            self.scale -= 1;
        }
        if self.mantissa.is_zero() {
            self.scale = 0;
            self.negative = false;
        }
    }

    /// The unscaled integer digits.
    pub fn mantissa(&self) -> U256 {
        self.mantissa
    }

    /// Number of digits after the decimal point.
    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa.is_zero()
    }

    /// Formats with exactly `dp` fractional digits, rounding half up
    /// (away from zero) on the exact value.
    pub fn to_fixed(&self, dp: u32) -> String {
        let digits = if self.scale <= dp {
            self.mantissa
        } else {
            match pow10(self.scale - dp) {
                Some(divisor) => {
                    let quotient = self.mantissa / divisor;
                    let remainder = self.mantissa % divisor;
                    if remainder >= divisor - remainder {
                        quotient + U256::from(1u64)
                    } else {
                        quotient
                    }
                }
                // Dropping more than 77 digits: the value rounds to zero.
                None => U256::ZERO,
            }
        };
        let digit_scale = self.scale.min(dp);
        let mut text = format_scaled(digits, digit_scale);
        if dp > digit_scale {
            if digit_scale == 0 {
                text.push('.');
            }
            text.extend(std::iter::repeat('0').take((dp - digit_scale) as usize));
        }
        if self.negative && !digits.is_zero() {
            text.insert(0, '-');
        }
        text
    }
}

/// Renders `digits / 10^scale` without a sign.
fn format_scaled(digits: U256, scale: u32) -> String {
    let raw = digits.to_string();
    if scale == 0 {
        return raw;
    }
    let scale = scale as usize;
    let padded = if raw.len() <= scale {
        format!("{}{}", "0".repeat(scale - raw.len() + 1), raw)
    } else {
        raw
    };
    let split = padded.len() - scale;
    format!("{}.{}", &padded[..split], &padded[split..])
}

impl Default for TokenAmount {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            f.write_str("-")?;
        }
        f.write_str(&format_scaled(self.mantissa, self.scale))
    }
}

impl fmt::Debug for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenAmount({})", self)
    }
}

impl FromStr for TokenAmount {
    type Err = ClientError;

    /// Accepts plain decimal notation: an optional sign, digits, and at most
    /// one decimal point (`"1.23"`, `"-4"`, `".5"`, `"7."`). Anything else,
    /// including `NaN`, `Infinity` and exponents, is `InvalidAmount`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ClientError::InvalidAmount(format!("{:?} is not a decimal number", s));

        let trimmed = s.trim();
        let (negative, body) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };

        let (integer, fraction) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        if integer.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if !integer.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        // Trailing fractional zeros carry no value and must not count
        // against the 256-bit mantissa.
        let fraction = fraction.trim_end_matches('0');
        let digits = format!("{}{}", integer, fraction);
        let digits = digits.trim_start_matches('0');
        let mantissa = if digits.is_empty() {
            U256::ZERO
        } else {
            U256::from_str_radix(digits, 10).map_err(|_| {
                ClientError::InvalidAmount(format!("{:?} does not fit in 256 bits", s))
            })?
        };

        Ok(Self::from_parts(mantissa, fraction.len() as u32, negative))
    }
}

impl TryFrom<&str> for TokenAmount {
    type Error = ClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Ord for TokenAmount {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.negative, other.negative) {
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, false) => cmp_magnitude(self, other),
            (true, true) => cmp_magnitude(other, self),
        }
    }
}

impl PartialOrd for TokenAmount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compares absolute values by rescaling the lower-scale side. If rescaling
/// overflows, that side already exceeds anything a `U256` mantissa can hold.
fn cmp_magnitude(a: &TokenAmount, b: &TokenAmount) -> Ordering {
    match a.scale.cmp(&b.scale) {
        Ordering::Equal => a.mantissa.cmp(&b.mantissa),
        Ordering::Less => match pow10(b.scale - a.scale).and_then(|p| a.mantissa.checked_mul(p)) {
            Some(scaled) => scaled.cmp(&b.mantissa),
            None => Ordering::Greater,
        },
        Ordering::Greater => match pow10(a.scale - b.scale).and_then(|p| b.mantissa.checked_mul(p)) {
            Some(scaled) => a.mantissa.cmp(&scaled),
            None => Ordering::Less,
        },
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

/// Scales a token amount to base units, flooring any excess precision.
///
/// # Errors
///
/// [`ClientError::InvalidAmount`] if `amount` is negative or the scaled value
/// does not fit in 256 bits.
pub fn to_base_unit(amount: &TokenAmount, decimals: u8) -> Result<BaseUnitAmount, ClientError> {
    if amount.is_negative() {
        return Err(ClientError::InvalidAmount(format!(
            "{} is negative",
            amount
        )));
    }

    let decimals = u32::from(decimals);
    if amount.scale <= decimals {
        pow10(decimals - amount.scale)
            .and_then(|factor| amount.mantissa.checked_mul(factor))
            .ok_or_else(|| {
                ClientError::InvalidAmount(format!(
                    "{} at {} decimals does not fit in 256 bits",
                    amount, decimals
                ))
            })
    } else {
        match pow10(amount.scale - decimals) {
            Some(divisor) => Ok(amount.mantissa / divisor),
            None => Ok(U256::ZERO),
        }
    }
}

/// Scales base units back to a token amount. Exact.
pub fn to_token_unit(amount: BaseUnitAmount, decimals: u8) -> TokenAmount {
    TokenAmount::from_parts(amount, u32::from(decimals), false)
}

/// Strictly greater than zero. Gates every value-moving action.
pub fn is_positive(amount: &TokenAmount) -> bool {
    !amount.is_negative() && !amount.is_zero()
}

/// Whether an allowance is large enough to treat as "already unlocked".
pub fn is_unlimited_allowance(allowance: BaseUnitAmount) -> bool {
    allowance > UNLIMITED_ALLOWANCE_THRESHOLD
}

// ---------------------------------------------------------------------------
// Serde helper: integers as decimal strings
// ---------------------------------------------------------------------------

/// Serializes integers (`U256`, `u64`) as decimal strings, which is how the
/// chain encodes them in JSON. Deserialization also accepts bare JSON numbers.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Entry {
///     #[serde(with = "crate::units::decimal_string")]
///     price: U256,
/// }
/// ```
pub mod decimal_string {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::fmt::Display;
    use std::str::FromStr;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Display,
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        let text = match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text,
            Raw::Number(n) => n.to_string(),
        };
        text.trim().parse().map_err(D::Error::custom)
    }
}

/// Reads a base-unit integer out of a JSON value returned by a chain query.
pub fn base_units_from_json(value: &serde_json::Value) -> Result<BaseUnitAmount, String> {
    match value {
        serde_json::Value::String(text) => {
            U256::from_str(text.trim()).map_err(|e| format!("bad integer {:?}: {}", text, e))
        }
        serde_json::Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| format!("not an unsigned integer: {}", n)),
        other => Err(format!("expected an integer, got {}", other)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
