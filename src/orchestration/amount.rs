//! Numeric shorthand accepted for amount-bearing tool arguments.
//!
//! Grammar: `digits[.digits][k|m]`, case-insensitive suffix, surrounding
//! whitespace ignored. `k` scales by 1,000 and `m` by 1,000,000. Arithmetic is
//! exact decimal so `"2.5m"` is exactly `2500000`. JSON numbers may also use
//! exponent form (`1e21`, `1e-7`).

use crate::orchestration::error::OrchestratorError;
use serde_json::Value;

/// Largest fractional precision `Amount` can render.
const MAX_SCALE: u32 = 38;

/// Fixed-point decimal: `units / 10^scale`, kept without trailing fractional zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Amount {
    units: u128,
    scale: u32,
}

impl Amount {
    pub fn is_integral(&self) -> bool {
        self.scale == 0
    }

    pub fn to_json_value(&self) -> Value {
        if self.is_integral() {
            if let Ok(value) = u64::try_from(self.units) {
                return Value::from(value);
            }
        }
        Value::String(self.to_string())
    }

    fn normalized(mut units: u128, mut scale: u32) -> Self {
        if units == 0 {
            return Self { units, scale: 0 };
        }
        while scale > 0 && units % 10 == 0 {
            units /= 10;
            scale -= 1;
        }
        Self { units, scale }
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.units);
        }
        let divisor = 10u128.pow(self.scale);
        write!(
            f,
            "{}.{:0width$}",
            self.units / divisor,
            self.units % divisor,
            width = self.scale as usize
        )
    }
}

pub fn parse_amount(raw: &str) -> Result<Amount, OrchestratorError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid(raw, "amount is empty"));
    }

    let (number, exponent) = match trimmed.chars().last() {
        Some(suffix) if suffix.is_ascii_alphabetic() => {
            let exponent = match suffix.to_ascii_lowercase() {
                'k' => 3,
                'm' => 6,
                _ => {
                    return Err(invalid(
                        raw,
                        format!("unsupported suffix `{suffix}`; expected `k` or `m`"),
                    ))
                }
            };
            (&trimmed[..trimmed.len() - 1], exponent)
        }
        _ => (trimmed, 0u32),
    };

    let (int_part, frac_part) = match number.split_once('.') {
        Some((int_part, frac_part)) => {
            if frac_part.is_empty() {
                return Err(invalid(raw, "decimal point must be followed by digits"));
            }
            (int_part, frac_part)
        }
        None => (number, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid(raw, "amount has no digits"));
    }
    let all_digits = |part: &str| part.chars().all(|ch| ch.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) {
        return Err(invalid(raw, "amount must be a plain decimal number"));
    }

    let digits = format!("{int_part}{frac_part}");
    let units = digits
        .parse::<u128>()
        .map_err(|_| invalid(raw, "amount is too large"))?;
    let scale = frac_part.len() as u32;

    shift_decimal(raw, units, scale, i64::from(exponent))
}

/// Moves the decimal point of `units / 10^scale` by `exponent` places.
fn shift_decimal(
    raw: &str,
    units: u128,
    scale: u32,
    exponent: i64,
) -> Result<Amount, OrchestratorError> {
    let scale = i64::from(scale) - exponent;
    if scale >= 0 {
        let amount = u32::try_from(scale)
            .map(|scale| Amount::normalized(units, scale))
            .map_err(|_| invalid(raw, "amount has too many fractional digits"))?;
        if amount.scale > MAX_SCALE {
            return Err(invalid(raw, "amount has too many fractional digits"));
        }
        return Ok(amount);
    }
    let units = u32::try_from(-scale)
        .ok()
        .and_then(|places| 10u128.checked_pow(places))
        .and_then(|factor| units.checked_mul(factor))
        .ok_or_else(|| invalid(raw, "amount is too large"))?;
    Ok(Amount::normalized(units, 0))
}

/// JSON numbers may render in exponent form (`1e21`, `1e-7`); the mantissa
/// follows the plain decimal grammar without a suffix.
fn parse_json_number(raw: &str) -> Result<Amount, OrchestratorError> {
    let Some((mantissa, exponent)) = raw.split_once(['e', 'E']) else {
        return parse_amount(raw);
    };
    let exponent = exponent
        .strip_prefix('+')
        .unwrap_or(exponent)
        .parse::<i64>()
        .map_err(|_| invalid(raw, "amount exponent is not an integer"))?;
    if mantissa.ends_with(|ch: char| ch.is_ascii_alphabetic()) {
        return Err(invalid(raw, "amount must be a plain decimal number"));
    }
    let base = parse_amount(mantissa)
        .map_err(|_| invalid(raw, "amount must be a plain decimal number"))?;
    shift_decimal(raw, base.units, base.scale, exponent)
}

/// Normalizes an amount argument as supplied by the caller: shorthand strings
/// are expanded, plain non-negative JSON numbers pass through the same grammar.
pub fn normalize_amount_value(value: &Value) -> Result<Value, OrchestratorError> {
    match value {
        Value::String(raw) => parse_amount(raw).map(|amount| amount.to_json_value()),
        Value::Number(number) => {
            parse_json_number(&number.to_string()).map(|amount| amount.to_json_value())
        }
        other => Err(invalid(
            &other.to_string(),
            "amount must be a string or a number",
        )),
    }
}

fn invalid(raw: &str, reason: impl Into<String>) -> OrchestratorError {
    OrchestratorError::InvalidAmountFormat {
        raw: raw.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn expand(raw: &str) -> String {
        parse_amount(raw).expect("valid amount").to_string()
    }

    #[test]
    fn shorthand_suffixes_scale_exactly() {
        assert_eq!(expand("5k"), "5000");
        assert_eq!(expand("2.5m"), "2500000");
        assert_eq!(expand("10"), "10");
        assert_eq!(expand("1.5K"), "1500");
        assert_eq!(expand(" 7M "), "7000000");
        assert_eq!(expand(".5k"), "500");
        assert_eq!(expand("0.0001k"), "0.1");
        assert_eq!(expand("0.25"), "0.25");
        assert_eq!(expand("1.2345678m"), "1234567.8");
    }

    #[test]
    fn unsupported_forms_fail_with_invalid_amount_format() {
        for raw in ["10x", "", "  ", "1.2.3", "-5", "3.", "k", "1,000", "5kk", "$5"] {
            let err = parse_amount(raw).expect_err(raw);
            assert_eq!(err.kind(), "invalid_amount_format", "input {raw:?}");
        }
    }

    #[test]
    fn overflow_is_rejected_not_wrapped() {
        let huge = "9".repeat(39);
        assert!(parse_amount(&huge).is_err());
        let near_limit = format!("{}m", "9".repeat(36));
        assert!(parse_amount(&near_limit).is_err());
    }

    #[test]
    fn json_rendering_keeps_integers_numeric() {
        assert_eq!(normalize_amount_value(&json!("5k")).expect("ok"), json!(5000));
        assert_eq!(normalize_amount_value(&json!(12)).expect("ok"), json!(12));
        assert_eq!(normalize_amount_value(&json!(0.5)).expect("ok"), json!("0.5"));
        assert!(normalize_amount_value(&json!(true)).is_err());
        assert!(normalize_amount_value(&json!(-1)).is_err());
    }

    #[test]
    fn json_numbers_in_exponent_form_are_expanded() {
        assert_eq!(
            normalize_amount_value(&json!(1e21)).expect("ok"),
            json!("1000000000000000000000")
        );
        assert_eq!(normalize_amount_value(&json!(1e-7)).expect("ok"), json!("0.0000001"));
        assert_eq!(normalize_amount_value(&json!(2.5e3)).expect("ok"), json!(2500));
        assert_eq!(parse_json_number("1.5E+2").expect("ok").to_string(), "150");
        assert!(normalize_amount_value(&json!(-1e21)).is_err());
        assert!(normalize_amount_value(&json!(1e300)).is_err());
        assert!(parse_json_number("1e-40").is_err());
        assert!(parse_json_number("5ke2").is_err());
        assert_eq!(parse_json_number("0e-4000000000").expect("zero").to_string(), "0");
    }
}
