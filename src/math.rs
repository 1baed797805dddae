//! # math
//!
//! Fixed-point helpers. Every on-chain amount is an integer in the token's
//! native units; USD prices are integers scaled by `10^6`.

use crate::error::AppError;

/// Decimal places of the registry's USD price representation.
pub const USD_DECIMALS: u32 = 6;

/// Convert a decimal value to its integer representation with `decimals`
/// places, truncating any fraction beyond that precision.
///
/// Goes through the shortest decimal string of `value` rather than
/// multiplying floats, so `4.2` becomes exactly `4_200_000` at 6 decimals.
pub fn decimal_to_fixed(value: f64, decimals: u32) -> Result<u64, AppError> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::InvalidPrice(format!("{value} is not a non-negative finite number")));
    }

    let text = value.to_string();
    let (whole, frac) = text.split_once('.').unwrap_or((text.as_str(), ""));

    let mut digits = String::with_capacity(whole.len() + decimals as usize);
    digits.push_str(whole);
    digits.extend(frac.chars().chain(std::iter::repeat('0')).take(decimals as usize));

    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        return Ok(0);
    }

    trimmed
        .parse::<u64>()
        .map_err(|_| AppError::InvalidPrice(format!("{value} overflows at {decimals} decimals")))
}

/// Fixed-point USD price from a decimal dollar amount.
pub fn price_usd_to_fixed(price: f64) -> Result<u64, AppError> {
    decimal_to_fixed(price, USD_DECIMALS)
}

/// Approximate decimal value of an integer amount. Display only.
pub fn fixed_to_decimal(raw: u64, decimals: u32) -> f64 {
    format_fixed(raw, decimals, None).parse().unwrap_or(0.0)
}

/// Render an integer amount with `decimals` places.
///
/// With `precision` the fraction is cut to that many digits (never rounded);
/// without it trailing zeros are trimmed. `format_fixed(123, 2, Some(5))`
/// yields `"1.23"`, precision being capped at `decimals`.
pub fn format_fixed(raw: u64, decimals: u32, precision: Option<u32>) -> String {
    let text = raw.to_string();
    if decimals == 0 {
        return text;
    }

    let decimals = decimals as usize;
    let padded = format!("{text:0>width$}", width = decimals + 1);
    let (whole, frac) = padded.split_at(padded.len() - decimals);

    match precision {
        Some(0) => whole.to_string(),
        Some(p) => {
            let p = (p as usize).min(decimals);
            format!("{whole}.{}", &frac[..p])
        }
        None => {
            let frac = frac.trim_end_matches('0');
            if frac.is_empty() {
                whole.to_string()
            } else {
                format!("{whole}.{frac}")
            }
        }
    }
}

/// Amount of the output token worth `input_amount` of the input token.
///
/// `input_amount * input_price / output_price`, truncating toward zero. Both
/// prices share the same fixed-point scale, so the scale cancels out.
pub fn trade_out_amount(
    input_amount: u64,
    input_price_usd: u64,
    output_price_usd: u64,
) -> Result<u64, AppError> {
    if output_price_usd == 0 {
        return Err(AppError::InvalidPrice("output price is zero".into()));
    }

    let out = input_amount as u128 * input_price_usd as u128 / output_price_usd as u128;
    u64::try_from(out).map_err(|_| {
        AppError::InvalidPrice(format!(
            "trade amount overflows: {input_amount} * {input_price_usd} / {output_price_usd}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_to_fixed_exact() {
        assert_eq!(decimal_to_fixed(4.2, 6).unwrap(), 4_200_000);
        assert_eq!(decimal_to_fixed(1.0, 6).unwrap(), 1_000_000);
        assert_eq!(decimal_to_fixed(0.000001, 6).unwrap(), 1);
        assert_eq!(decimal_to_fixed(0.0, 6).unwrap(), 0);
        assert_eq!(decimal_to_fixed(1.23, 2).unwrap(), 123);
    }

    #[test]
    fn test_decimal_to_fixed_truncates() {
        // seventh decimal is dropped, not rounded
        assert_eq!(decimal_to_fixed(1.2345679, 6).unwrap(), 1_234_567);
        assert_eq!(decimal_to_fixed(0.0000009, 6).unwrap(), 0);
    }

    #[test]
    fn test_decimal_to_fixed_rejects_bad_input() {
        assert!(decimal_to_fixed(-1.0, 6).is_err());
        assert!(decimal_to_fixed(f64::NAN, 6).is_err());
        assert!(decimal_to_fixed(f64::INFINITY, 6).is_err());
        assert!(decimal_to_fixed(1e30, 6).is_err());
    }

    #[test]
    fn test_price_round_trip() {
        for price in [4.2, 0.5, 67_000.123456, 1.0, 0.000123] {
            let raw = price_usd_to_fixed(price).unwrap();
            let back = fixed_to_decimal(raw, USD_DECIMALS);
            assert!((back - price).abs() < 1e-6, "{price} -> {raw} -> {back}");
        }
        assert_eq!(fixed_to_decimal(4_200_000, USD_DECIMALS), 4.2);
    }

    #[test]
    fn test_format_fixed() {
        assert_eq!(format_fixed(123, 2, Some(5)), "1.23");
        assert_eq!(format_fixed(123, 2, None), "1.23");
        assert_eq!(format_fixed(5, 6, None), "0.000005");
        assert_eq!(format_fixed(4_200_000, 6, None), "4.2");
        assert_eq!(format_fixed(4_200_000, 6, Some(0)), "4");
        assert_eq!(format_fixed(1_000_000, 6, None), "1");
        assert_eq!(format_fixed(42, 0, None), "42");
    }

    #[test]
    fn test_trade_out_amount() {
        // $2 input, $4 output: 100 input units buy 50 output units
        assert_eq!(trade_out_amount(100, 2_000_000, 4_000_000).unwrap(), 50);
        assert_eq!(trade_out_amount(100, 1_000_000, 1_000_000).unwrap(), 100);
        // truncates toward zero
        assert_eq!(trade_out_amount(10, 1_000_000, 3_000_000).unwrap(), 3);
    }

    #[test]
    fn test_trade_out_amount_errors() {
        assert!(trade_out_amount(100, 1_000_000, 0).is_err());
        assert!(trade_out_amount(u64::MAX, u64::MAX, 1).is_err());
    }
}
