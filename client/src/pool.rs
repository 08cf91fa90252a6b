//! Pair-token quote for providing liquidity to the ESD:USDC pool.
//!
//! Providing `x` ESD requires matching USDC at the pool's current reserve
//! ratio. The ratio is exact: reserves are decimals, the product is floored in
//! base units, and nothing passes through floating point.

use alloy_primitives::U256;

use crate::error::ClientError;
use crate::units::{pow10, to_base_unit, to_token_unit, TokenAmount};

/// Parses a user-entered amount, treating a blank field as zero.
pub fn parse_amount_input(input: &str) -> Result<TokenAmount, ClientError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(TokenAmount::ZERO);
    }
    trimmed.parse()
}

/// USDC needed alongside `amount` ESD, given the pool reserves in token
/// units.
///
/// The ratio is `usdc_reserve / esd_reserve`, or `1` while the pool holds no
/// USDC. The result is `floor(to_base_unit(amount) * ratio)` converted back
/// at `decimals`.
///
/// # Errors
///
/// `InvalidAmount` for negative inputs, an empty ESD reserve against a
/// non-empty USDC reserve, or results beyond 256 bits.
pub fn required_pair_amount(
    amount: &TokenAmount,
    esd_reserve: &TokenAmount,
    usdc_reserve: &TokenAmount,
    decimals: u8,
) -> Result<TokenAmount, ClientError> {
    if amount.is_zero() {
        return Ok(TokenAmount::ZERO);
    }
    if esd_reserve.is_negative() || usdc_reserve.is_negative() {
        return Err(ClientError::InvalidAmount("negative pool reserve".into()));
    }

    let base = to_base_unit(amount, decimals)?;
    if usdc_reserve.is_zero() {
        return Ok(to_token_unit(base, decimals));
    }
    if esd_reserve.is_zero() {
        return Err(ClientError::InvalidAmount("pool has no ESD reserve".into()));
    }

    // usdc/esd = (u_m / 10^u_s) / (e_m / 10^e_s) = (u_m * 10^e_s) / (e_m * 10^u_s)
    let numerator = scaled(usdc_reserve.mantissa(), esd_reserve.scale())?;
    let denominator = scaled(esd_reserve.mantissa(), usdc_reserve.scale())?;

    let product = base
        .checked_mul(numerator)
        .ok_or_else(|| ClientError::InvalidAmount("quote overflows 256 bits".into()))?;

    Ok(to_token_unit(product / denominator, decimals))
}

fn scaled(mantissa: U256, exp: u32) -> Result<U256, ClientError> {
    pow10(exp)
        .and_then(|p| mantissa.checked_mul(p))
        .ok_or_else(|| ClientError::InvalidAmount("reserve out of range".into()))
}
