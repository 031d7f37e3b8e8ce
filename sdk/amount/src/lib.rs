//! Amount codec
//!
//! Converts between human decimal strings ("2.5") and fixed-point base
//! units (2_500_000). Six fractional digits, no sign, no exponent.

use thiserror::Error;

/// Number of fractional digits carried by a base-unit amount.
pub const DECIMALS: usize = 6;

/// Base units per whole token.
pub const UNITS_PER_TOKEN: u64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("Enter a valid amount with up to 6 decimals")]
    InvalidFormat,
    #[error("amount does not fit in 64-bit base units")]
    Overflow,
}

/// Parses a decimal string into base units.
///
/// Surrounding whitespace is ignored. An empty (or all-whitespace) input
/// parses to 0 so optional form fields can pass through; callers that
/// need a positive amount check for zero themselves.
pub fn parse(input: &str) -> Result<u64, AmountError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }

    let (whole, fraction) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };

    // digits(.digits{0,6})?
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AmountError::InvalidFormat);
    }
    if fraction.len() > DECIMALS || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AmountError::InvalidFormat);
    }

    let whole_units = whole
        .bytes()
        .try_fold(0u64, |acc, b| {
            acc.checked_mul(10)?.checked_add(u64::from(b - b'0'))
        })
        .ok_or(AmountError::Overflow)?;

    let mut fraction_units = 0u64;
    for i in 0..DECIMALS {
        let digit = fraction.as_bytes().get(i).map(|b| b - b'0').unwrap_or(0);
        fraction_units = fraction_units * 10 + u64::from(digit);
    }

    whole_units
        .checked_mul(UNITS_PER_TOKEN)
        .and_then(|w| w.checked_add(fraction_units))
        .ok_or(AmountError::Overflow)
}

/// Renders base units as a decimal string with up to six fractional digits.
///
/// Display only: never feed a formatted string back in to recover units,
/// use the original integer.
pub fn format(units: u64) -> String {
    let whole = units / UNITS_PER_TOKEN;
    let fraction = units % UNITS_PER_TOKEN;
    if fraction == 0 {
        return whole.to_string();
    }
    let digits = format!("{fraction:0width$}", width = DECIMALS);
    format!("{whole}.{}", digits.trim_end_matches('0'))
}

/// Like [`format`], with the whole part grouped in thousands ("1,234.5").
pub fn format_grouped(units: u64) -> String {
    let plain = format(units);
    let (whole, rest) = match plain.split_once('.') {
        Some((w, f)) => (w.to_string(), format!(".{f}")),
        None => (plain.clone(), String::new()),
    };

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped + &rest
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_parse_whole_and_fraction() {
        assert_eq!(parse("2.5"), Ok(2_500_000));
        assert_eq!(parse("1"), Ok(1_000_000));
        assert_eq!(parse("0.000001"), Ok(1));
        assert_eq!(parse("  3.25 "), Ok(3_250_000));
        assert_eq!(parse("7."), Ok(7_000_000));
    }

    #[test]
    fn test_parse_empty_is_zero() {
        assert_eq!(parse(""), Ok(0));
        assert_eq!(parse("   "), Ok(0));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["1.0000001", "abc", "1.2.3", "-1", "+1", ".5", "1e6", "1,5", "1 000"] {
            assert_eq!(parse(bad), Err(AmountError::InvalidFormat), "input {bad:?}");
        }
    }

    #[test]
    fn test_parse_overflow() {
        assert_eq!(parse("18446744073709551615"), Err(AmountError::Overflow));
        assert_eq!(parse("99999999999999999999999"), Err(AmountError::Overflow));
    }

    #[test]
    fn test_format() {
        assert_eq!(format(0), "0");
        assert_eq!(format(2_500_000), "2.5");
        assert_eq!(format(1), "0.000001");
        assert_eq!(format(1_000_000), "1");
        assert_eq!(format(123_456_789), "123.456789");
    }

    #[test]
    fn test_format_grouped() {
        assert_eq!(format_grouped(1_234_567_500_000), "1,234,567.5");
        assert_eq!(format_grouped(999_000_000), "999");
        assert_eq!(format_grouped(1_000_000_000), "1,000");
    }

    #[test]
    fn test_format_then_parse_recovers_units() {
        let fixed = [0, 1, 10, 999_999, 1_000_000, 2_500_000, (1 << 53) - 1, u64::MAX];
        for units in fixed {
            assert_eq!(parse(&format(units)), Ok(units));
        }

        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let units: u64 = rng.r#gen();
            assert_eq!(parse(&format(units)), Ok(units), "units {units}");
        }
    }
}
