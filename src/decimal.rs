//! Fixed-point conversions between raw on-chain integers and decimal values
//!
//! Every token amount and price in the ledger is a `BigDecimal`. Scaling a raw
//! integer by `10^decimals` only moves the decimal point, so it is exact for any
//! `U256` input. Multiplication and addition of `BigDecimal` values are exact as
//! well; nothing here ever passes through `f64`.

use alloy_primitives::{I256, U256};
use bigdecimal::{BigDecimal, RoundingMode};
use num_bigint::{BigInt, Sign};

/// Convert a raw unsigned integer into a `BigInt`.
pub fn u256_to_bigint(raw: U256) -> BigInt {
    BigInt::from_bytes_be(Sign::Plus, &raw.to_be_bytes::<32>())
}

/// Convert a non-negative `BigInt` back into a `U256`.
///
/// Returns `None` for negative values or values wider than 256 bits.
pub fn bigint_to_u256(value: &BigInt) -> Option<U256> {
    let (sign, bytes) = value.to_bytes_be();
    if sign == Sign::Minus {
        return None;
    }
    U256::try_from_be_slice(&bytes)
}

/// Scale a raw token amount down by `10^decimals`.
///
/// `scale_down(1_000_000, 6) == 1` and `scale_down(2_500_000_000_000_000_000, 18) == 2.5`.
pub fn scale_down(raw: U256, decimals: u8) -> BigDecimal {
    BigDecimal::new(u256_to_bigint(raw), i64::from(decimals))
}

/// Inverse of [`scale_down`]: recover the raw integer amount.
///
/// Returns `None` when the value has more fractional digits than `decimals`
/// allows, is negative, or does not fit in a `U256`.
pub fn scale_up(value: &BigDecimal, decimals: u8) -> Option<U256> {
    let (digits, scale) = value.as_bigint_and_exponent();
    let shift = i64::from(decimals) - scale;

    let raw = if shift >= 0 {
        digits * pow10(shift.unsigned_abs())
    } else {
        let divisor = pow10(shift.unsigned_abs());
        if &digits % &divisor != BigInt::from(0) {
            return None;
        }
        digits / divisor
    };

    bigint_to_u256(&raw)
}

/// Turn a price-feed answer into a USD price.
///
/// Feeds report signed integers; a zero or negative answer is not a usable
/// price and yields `None`.
pub fn price_from_answer(answer: I256, decimals: u8) -> Option<BigDecimal> {
    if !answer.is_positive() {
        return None;
    }
    Some(scale_down(answer.into_raw(), decimals))
}

/// Render a value in plain notation with trailing zeros removed.
pub fn format_plain(value: &BigDecimal) -> String {
    let (digits, scale) = value.normalized().as_bigint_and_exponent();
    render(&digits, scale)
}

/// Render a value rounded to exactly `places` fractional digits.
///
/// Ties round away from zero, so `0.0000125` becomes `0.000013` at six places.
pub fn format_fixed(value: &BigDecimal, places: u32) -> String {
    let places = i64::from(places);
    let (digits, scale) = value
        .with_scale_round(places, RoundingMode::HalfUp)
        .as_bigint_and_exponent();
    render(&digits, scale)
}

fn pow10(exp: u64) -> BigInt {
    // 10^exp for exp up to a few hundred; decimals never exceed u8::MAX
    BigInt::from(10u32).pow(exp as u32)
}

fn render(digits: &BigInt, scale: i64) -> String {
    let negative = digits.sign() == Sign::Minus;
    let mut magnitude = digits.magnitude().to_string();

    if scale <= 0 {
        if magnitude != "0" {
            magnitude.push_str(&"0".repeat(scale.unsigned_abs() as usize));
        }
    } else {
        let scale = scale as usize;
        if magnitude.len() <= scale {
            let padding = "0".repeat(scale + 1 - magnitude.len());
            magnitude.insert_str(0, &padding);
        }
        magnitude.insert(magnitude.len() - scale, '.');
    }

    if negative {
        magnitude.insert(0, '-');
    }
    magnitude
}
