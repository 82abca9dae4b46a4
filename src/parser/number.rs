//! Flexible number-literal parsing (`spec.md` §9 Design Notes: "Number
//! literals in the DSL accept either comma-thousands + period-decimal or
//! period-thousands + comma-decimal, disambiguated by position").

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::{CoreResult, ParseError};

/// Parses a number literal written in either US style (`1,234.5`) or UK/EU
/// style (`1.234,5`), picking the convention from the position of the
/// separators rather than requiring the caller to declare one up front.
///
/// Disambiguation rules, in order:
/// 1. Only one kind of separator present (or none) — parse directly, after
///    stripping thousands grouping if the remaining separator occurs more
///    than once or is followed by exactly 3 digits in a longer number.
/// 2. Both `,` and `.` present — whichever comes *last* is the decimal
///    point; the other is thousands grouping.
/// 3. A single `,` with exactly three trailing digits on a short prefix
///    (`spec.md`: "ambiguous cases ... resolved as UK-format thousands
///    separators") is treated as thousands grouping, not a decimal comma
///    — i.e. `1,234` is one thousand two hundred thirty-four, not
///    `1.234`.
/// 4. European-with-period-thousands (a lone `.` used as a thousands
///    separator, i.e. followed by exactly three digits with more digits
///    after it, or multiple `.`) is rejected with a message suggesting the
///    UK rewrite, per `spec.md`.
pub fn parse_number_literal(raw: &str) -> CoreResult<Decimal> {
    let trimmed = raw.trim();
    let negative = trimmed.starts_with('-');
    let body = trimmed.trim_start_matches(['+', '-']);

    let comma_count = body.matches(',').count();
    let period_count = body.matches('.').count();

    let normalized = match (comma_count, period_count) {
        (0, 0) => body.to_string(),
        (0, 1) => body.to_string(),
        (1, 0) => resolve_single_comma(body)?,
        (0, _) => {
            return Err(ParseError::new(
                raw.to_string(),
                format!(
                    "'{raw}' uses '.' as a thousands separator; rewrite using ',' for \
                     thousands (UK format), e.g. '{}'",
                    body.replacen('.', ",", period_count.saturating_sub(1))
                ),
            )
            .into());
        }
        (_, 0) => body.replace(',', ""),
        (_, _) => resolve_mixed(body)?,
    };

    let value = Decimal::from_str(&normalized)
        .map_err(|e| ParseError::new(raw.to_string(), format!("not a valid number: {e}")))?;
    Ok(if negative { -value } else { value })
}

/// Exactly one `.` and no `,`: always a decimal point (US/plain style).
/// Handled inline in the caller for `(0, 1)`.
fn resolve_single_comma(body: &str) -> CoreResult<String> {
    let (int_part, frac_part) = body.split_once(',').expect("checked comma_count == 1");
    // Three trailing digits on a short (<=3 digit) prefix reads as UK
    // thousands grouping: `1,234` -> 1234, not 1.234.
    if frac_part.len() == 3 && int_part.len() <= 3 && int_part.chars().all(|c| c.is_ascii_digit()) {
        Ok(format!("{int_part}{frac_part}"))
    } else {
        Ok(format!("{int_part}.{frac_part}"))
    }
}

/// Both `,` and `.` present: whichever occurs last in the string is the
/// decimal point.
fn resolve_mixed(body: &str) -> CoreResult<String> {
    let last_comma = body.rfind(',');
    let last_period = body.rfind('.');
    match (last_comma, last_period) {
        (Some(c), Some(p)) if c > p => {
            // `,` is decimal, `.` is thousands grouping.
            Ok(body.replace('.', "").replace(',', "."))
        }
        (Some(_), Some(_)) => {
            // `.` is decimal, `,` is thousands grouping.
            Ok(body.replace(',', ""))
        }
        _ => unreachable!("resolve_mixed only called when both separators are present"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn plain_decimal() {
        assert_eq!(parse_number_literal("12.5").unwrap(), dec!(12.5));
    }

    #[test]
    fn us_thousands() {
        assert_eq!(parse_number_literal("1,234.5").unwrap(), dec!(1234.5));
    }

    #[test]
    fn uk_thousands_decimal_comma() {
        assert_eq!(parse_number_literal("1.234,5").unwrap(), dec!(1234.5));
    }

    #[test]
    fn short_prefix_triple_trailing_reads_as_thousands() {
        assert_eq!(parse_number_literal("1,234").unwrap(), dec!(1234));
    }

    #[test]
    fn short_prefix_non_triple_trailing_reads_as_decimal() {
        assert_eq!(parse_number_literal("1,25").unwrap(), dec!(1.25));
    }

    #[test]
    fn negative_values() {
        assert_eq!(parse_number_literal("-5.2").unwrap(), dec!(-5.2));
    }

    #[test]
    fn rejects_period_thousands() {
        assert!(parse_number_literal("1.234.567").is_err());
    }
}
