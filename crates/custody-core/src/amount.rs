//! Human-unit decimals to integer minor units and back.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::TransferError;

/// Decimals of the native SOL unit (lamports).
pub const NATIVE_DECIMALS: u32 = 9;

/// Largest scale `Decimal` can represent.
const MAX_SCALE: u32 = 28;

/// Convert `amount` to minor units. Sub-minor-unit precision is an error,
/// never rounded.
pub fn to_minor_units(amount: Decimal, decimals: u32) -> Result<u64, TransferError> {
    if amount <= Decimal::ZERO {
        return Err(TransferError::Validation("amount must be positive".into()));
    }

    let factor = 10u64
        .checked_pow(decimals)
        .map(Decimal::from)
        .ok_or_else(|| TransferError::Validation(format!("unsupported decimals: {decimals}")))?;

    let scaled = amount
        .checked_mul(factor)
        .ok_or_else(|| TransferError::Validation("amount too large".into()))?;

    if !scaled.fract().is_zero() {
        return Err(TransferError::Validation(format!(
            "amount {amount} has more than {decimals} decimal places"
        )));
    }

    scaled
        .to_u64()
        .ok_or_else(|| TransferError::Validation("amount too large".into()))
}

pub fn from_minor_units(units: u64, decimals: u32) -> Decimal {
    Decimal::from_i128_with_scale(i128::from(units), decimals.min(MAX_SCALE))
}
