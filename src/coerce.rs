//! Cell-level type coercion.
//!
//! [`coerce`] turns one raw text cell into a [`Value`] according to a
//! [`FieldDefinition`]. It is a pure function: no I/O, no shared state, and the
//! same input always produces the same output.
//!
//! Rules, in order:
//! 1. An absent cell, or one that is empty after trimming, is [`Value::Null`]
//!    whatever the field's declared nullability.
//! 2. Otherwise the cell is parsed according to the field's [`FieldKind`].
//!
//! Invalid decimals are governed by [`DecimalErrorPolicy`]; every other parse
//! failure is returned as a [`CoercionError`].

use crate::error::CoercionError;
use crate::schema::{FieldDefinition, FieldKind};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Days from 0001-01-01 (CE day 1) to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Accepted timestamp layouts with the exact number of fractional digits each
/// one expects. Tried in order; the first that matches wins.
const TIMESTAMP_PATTERNS: [(&str, usize); 3] = [
    ("%Y-%m-%d %H:%M:%S%.9f", 9),
    ("%Y-%m-%d %H:%M:%S%.6f", 6),
    ("%Y-%m-%d %H:%M:%S%.3f", 3),
];

/// An encoded cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Int32(i32),
    Int64(i64),
    Utf8(String),
    Bytes(Vec<u8>),
    /// Scaled decimal integer as minimal big-endian two's-complement bytes.
    Decimal(Vec<u8>),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// What to do with a cell that does not parse as a decimal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecimalErrorPolicy {
    /// Store null and keep converting.
    #[default]
    Null,
    /// Fail the record like any other coercion error.
    Fail,
}

/// Coerce a cell with the default decimal policy ([`DecimalErrorPolicy::Null`]).
///
/// # Errors
/// See [`coerce_with`].
pub fn coerce(cell: Option<&str>, field: &FieldDefinition) -> Result<Value, CoercionError> {
    coerce_with(cell, field, DecimalErrorPolicy::default())
}

/// Coerce a cell, choosing how invalid decimals are handled.
///
/// # Errors
/// Returns [`CoercionError::InvalidNumber`], [`CoercionError::InvalidDate`] or
/// [`CoercionError::InvalidTimestamp`] when the text does not parse, and
/// [`CoercionError::InvalidDecimal`] only under [`DecimalErrorPolicy::Fail`].
pub fn coerce_with(
    cell: Option<&str>,
    field: &FieldDefinition,
    decimals: DecimalErrorPolicy,
) -> Result<Value, CoercionError> {
    let Some(raw) = cell else {
        return Ok(Value::Null);
    };
    let text = raw.trim();
    if text.is_empty() {
        return Ok(Value::Null);
    }

    match field.kind {
        FieldKind::Int32 => text
            .parse::<i32>()
            .map(Value::Int32)
            .map_err(|_| CoercionError::InvalidNumber(raw.to_string())),
        FieldKind::Int64 => text
            .parse::<i64>()
            .map(Value::Int64)
            .map_err(|_| CoercionError::InvalidNumber(raw.to_string())),
        FieldKind::Date => parse_epoch_day(text)
            .map(Value::Int32)
            .ok_or_else(|| CoercionError::InvalidDate(raw.to_string())),
        FieldKind::TimestampMicros => parse_timestamp_micros(text)
            .map(Value::Int64)
            .ok_or_else(|| CoercionError::InvalidTimestamp(raw.to_string())),
        FieldKind::Utf8 => Ok(Value::Utf8(raw.to_string())),
        FieldKind::Bytes => Ok(Value::Bytes(raw.as_bytes().to_vec())),
        FieldKind::Decimal { precision, scale } => match encode_decimal(text, precision, scale) {
            Some(bytes) => Ok(Value::Decimal(bytes)),
            None => match decimals {
                DecimalErrorPolicy::Null => Ok(Value::Null),
                DecimalErrorPolicy::Fail => Err(CoercionError::InvalidDecimal(raw.to_string())),
            },
        },
    }
}

/// `YYYY-MM-DD` to days since 1970-01-01.
#[must_use]
pub fn parse_epoch_day(text: &str) -> Option<i32> {
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
    Some(date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
}

/// Timestamp with a 9, 6 or 3 digit fraction to microseconds since the
/// epoch. The wall clock is taken as UTC; digits below a microsecond are
/// dropped.
#[must_use]
pub fn parse_timestamp_micros(text: &str) -> Option<i64> {
    let width = fraction_digits(text)?;
    TIMESTAMP_PATTERNS
        .iter()
        .filter(|(_, digits)| *digits == width)
        .find_map(|(pattern, _)| NaiveDateTime::parse_from_str(text, pattern).ok())
        .map(|dt| dt.and_utc().timestamp_micros())
}

fn fraction_digits(text: &str) -> Option<usize> {
    let (_, fraction) = text.rsplit_once('.')?;
    (!fraction.is_empty() && fraction.bytes().all(|b| b.is_ascii_digit())).then_some(fraction.len())
}

/// Parse `text` as a decimal, round it half-up to `scale` digits and return
/// the scaled integer as big-endian two's-complement bytes.
///
/// Accepts an optional sign, digits with an optional `.` fraction, and an
/// optional `e`/`E` exponent. The arithmetic is exact over the full 38-digit
/// range.
///
/// Returns `None` if the text is not a number or the scaled integer needs
/// more than `precision` digits.
#[must_use]
pub fn encode_decimal(text: &str, precision: u32, scale: u32) -> Option<Vec<u8>> {
    let literal = DecimalLiteral::parse(text)?;
    let magnitude = literal.scaled_magnitude(scale)?;
    if magnitude >= 10u128.checked_pow(precision)? {
        return None;
    }
    let unscaled = i128::try_from(magnitude).ok()?;
    Some(twos_complement_be(if literal.negative { -unscaled } else { unscaled }))
}

/// A decimal literal as `digits * 10^exponent`.
#[derive(Debug, PartialEq, Eq)]
struct DecimalLiteral {
    negative: bool,
    /// Significant digits, most significant first, without leading zeros.
    digits: Vec<u8>,
    exponent: i64,
}

impl DecimalLiteral {
    fn parse(text: &str) -> Option<Self> {
        let (negative, unsigned) = match text.as_bytes().first()? {
            b'-' => (true, &text[1..]),
            b'+' => (false, &text[1..]),
            _ => (false, text),
        };
        let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
            Some(at) => (&unsigned[..at], unsigned[at + 1..].parse::<i32>().ok()?),
            None => (unsigned, 0),
        };
        let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        if whole.is_empty() && fraction.is_empty() {
            return None;
        }
        if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }
        let digits = whole
            .bytes()
            .chain(fraction.bytes())
            .map(|b| b - b'0')
            .skip_while(|&d| d == 0)
            .collect();
        Some(Self {
            negative,
            digits,
            exponent: i64::from(exponent) - i64::try_from(fraction.len()).ok()?,
        })
    }

    /// `|value| * 10^scale`, rounded half away from zero. `None` on overflow.
    fn scaled_magnitude(&self, scale: u32) -> Option<u128> {
        if self.digits.is_empty() {
            return Some(0);
        }
        let shift = self.exponent + i64::from(scale);
        if shift >= 0 {
            let factor = 10u128.checked_pow(u32::try_from(shift).ok()?)?;
            return digits_value(&self.digits)?.checked_mul(factor);
        }
        let dropped = usize::try_from(shift.unsigned_abs()).ok()?;
        let kept = self.digits.len().saturating_sub(dropped);
        let round_up = dropped <= self.digits.len() && self.digits[kept] >= 5;
        digits_value(&self.digits[..kept])?.checked_add(u128::from(round_up))
    }
}

fn digits_value(digits: &[u8]) -> Option<u128> {
    digits
        .iter()
        .try_fold(0u128, |acc, &d| acc.checked_mul(10)?.checked_add(u128::from(d)))
}

/// Shortest big-endian two's-complement representation of `v`.
#[must_use]
pub fn twos_complement_be(v: i128) -> Vec<u8> {
    let bytes = v.to_be_bytes();
    let mut start = 0;
    while start < bytes.len() - 1 {
        let (head, next) = (bytes[start], bytes[start + 1]);
        let redundant = (head == 0x00 && next & 0x80 == 0) || (head == 0xFF && next & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

/// Inverse of [`twos_complement_be`].
#[must_use]
pub fn decode_twos_complement_be(bytes: &[u8]) -> i128 {
    if bytes.is_empty() {
        return 0;
    }
    let fill = if bytes[0] & 0x80 == 0 { 0x00 } else { 0xFF };
    let mut buf = [fill; 16];
    let take = bytes.len().min(16);
    buf[16 - take..].copy_from_slice(&bytes[bytes.len() - take..]);
    i128::from_be_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(kind: FieldKind) -> FieldDefinition {
        FieldDefinition::new("f", kind)
    }

    #[test]
    fn absent_and_blank_cells_are_null() {
        for kind in [
            FieldKind::Int32,
            FieldKind::Int64,
            FieldKind::Date,
            FieldKind::TimestampMicros,
            FieldKind::Utf8,
            FieldKind::Bytes,
            FieldKind::Decimal {
                precision: 10,
                scale: 2,
            },
        ] {
            let required = field(kind).required();
            assert_eq!(coerce(None, &required), Ok(Value::Null));
            assert_eq!(coerce(Some(""), &required), Ok(Value::Null));
            assert_eq!(coerce(Some("   "), &required), Ok(Value::Null));
        }
    }

    #[test]
    fn integers() {
        assert_eq!(coerce(Some("42"), &field(FieldKind::Int32)), Ok(Value::Int32(42)));
        assert_eq!(coerce(Some(" -7 "), &field(FieldKind::Int32)), Ok(Value::Int32(-7)));
        assert_eq!(
            coerce(Some("9000000000"), &field(FieldKind::Int64)),
            Ok(Value::Int64(9_000_000_000))
        );
        assert_eq!(
            coerce(Some("9000000000"), &field(FieldKind::Int32)),
            Err(CoercionError::InvalidNumber("9000000000".into()))
        );
        assert_eq!(
            coerce(Some("12a"), &field(FieldKind::Int64)),
            Err(CoercionError::InvalidNumber("12a".into()))
        );
    }

    #[test]
    fn dates_are_epoch_days() {
        assert_eq!(parse_epoch_day("1970-01-01"), Some(0));
        assert_eq!(parse_epoch_day("1970-01-02"), Some(1));
        assert_eq!(parse_epoch_day("1969-12-31"), Some(-1));
        assert_eq!(parse_epoch_day("2023-01-01"), Some(19_358));
        assert_eq!(
            coerce(Some("2023-02-30"), &field(FieldKind::Date)),
            Err(CoercionError::InvalidDate("2023-02-30".into()))
        );
        assert_eq!(
            coerce(Some("01/02/2023"), &field(FieldKind::Date)),
            Err(CoercionError::InvalidDate("01/02/2023".into()))
        );
    }

    #[test]
    fn timestamps_accept_three_precisions() {
        let base = 1_672_574_400_000_000_i64; // 2023-01-01 12:00:00 UTC
        assert_eq!(
            parse_timestamp_micros("2023-01-01 12:00:00.123456789"),
            Some(base + 123_456)
        );
        assert_eq!(
            parse_timestamp_micros("2023-01-01 12:00:00.123456"),
            Some(base + 123_456)
        );
        assert_eq!(
            parse_timestamp_micros("2023-01-01 12:00:00.123"),
            Some(base + 123_000)
        );
    }

    #[test]
    fn timestamps_reject_other_layouts() {
        let ts = field(FieldKind::TimestampMicros);
        for bad in [
            "2023/01/01",
            "2023-01-01 12:00:00",
            "2023-01-01 12:00:00.12",
            "2023-01-01T12:00:00.123",
        ] {
            assert_eq!(
                coerce(Some(bad), &ts),
                Err(CoercionError::InvalidTimestamp(bad.into()))
            );
        }
    }

    #[test]
    fn decimal_scales_and_rounds_half_up() {
        let dec = field(FieldKind::Decimal {
            precision: 10,
            scale: 2,
        });
        assert_eq!(
            coerce(Some("1234.56"), &dec),
            Ok(Value::Decimal(twos_complement_be(123_456)))
        );
        assert_eq!(twos_complement_be(123_456), vec![0x01, 0xE2, 0x40]);
        assert_eq!(
            coerce(Some("1.005"), &dec),
            Ok(Value::Decimal(twos_complement_be(101)))
        );
        assert_eq!(
            coerce(Some("-1.005"), &dec),
            Ok(Value::Decimal(twos_complement_be(-101)))
        );
        assert_eq!(coerce(Some("7"), &dec), Ok(Value::Decimal(twos_complement_be(700))));
    }

    #[test]
    fn decimals_use_the_full_precision_range() {
        let wide = field(FieldKind::Decimal {
            precision: 38,
            scale: 0,
        });
        assert_eq!(
            coerce(Some("123456789012345678901234567890"), &wide),
            Ok(Value::Decimal(vec![
                1, 142, 233, 15, 246, 195, 115, 224, 238, 78, 63, 10, 210
            ]))
        );
        let max = "9".repeat(38);
        assert_eq!(
            coerce(Some(&max), &wide),
            Ok(Value::Decimal(twos_complement_be(10i128.pow(38) - 1)))
        );
        assert_eq!(coerce(Some(&format!("{max}9")), &wide), Ok(Value::Null));

        let fractional = field(FieldKind::Decimal {
            precision: 38,
            scale: 10,
        });
        let expected = 999_999_999_999_999_999_995_000_000_000_i128;
        assert_eq!(
            coerce(Some("99999999999999999999.5"), &fractional),
            Ok(Value::Decimal(twos_complement_be(expected)))
        );

        let tiny = field(FieldKind::Decimal {
            precision: 38,
            scale: 35,
        });
        assert_eq!(
            coerce(Some("0.000000000000000000000000000000000015"), &tiny),
            Ok(Value::Decimal(twos_complement_be(2)))
        );
    }

    #[test]
    fn decimal_literal_forms() {
        let dec = |text| encode_decimal(text, 10, 2).map(|b| decode_twos_complement_be(&b));
        assert_eq!(dec("+1.5"), Some(150));
        assert_eq!(dec(".5"), Some(50));
        assert_eq!(dec("5."), Some(500));
        assert_eq!(dec("1E+3"), Some(100_000));
        assert_eq!(dec("1.5e-1"), Some(15));
        assert_eq!(dec("-0.004"), Some(0));
        assert_eq!(dec("-0.005"), Some(-1));
        assert_eq!(dec("0.0001"), Some(0));
        assert_eq!(dec("000123"), Some(12_300));
        for bad in [".", "-", "1.2.3", "e5", "1e", "1,5", "0x10", "1 000", "NaN"] {
            assert_eq!(dec(bad), None, "{bad}");
        }
        assert_eq!(dec("1e999999"), None);
        assert_eq!(dec("1e-999999"), Some(0));
    }

    #[test]
    fn invalid_decimal_follows_policy() {
        let dec = field(FieldKind::Decimal {
            precision: 4,
            scale: 2,
        });
        assert_eq!(coerce(Some("abc"), &dec), Ok(Value::Null));
        // 123.45 needs 5 digits at scale 2
        assert_eq!(coerce(Some("123.45"), &dec), Ok(Value::Null));
        assert_eq!(
            coerce_with(Some("abc"), &dec, DecimalErrorPolicy::Fail),
            Err(CoercionError::InvalidDecimal("abc".into()))
        );
    }

    #[test]
    fn strings_pass_through_untrimmed() {
        assert_eq!(
            coerce(Some(" héllo "), &field(FieldKind::Utf8)),
            Ok(Value::Utf8(" héllo ".into()))
        );
        assert_eq!(
            coerce(Some("raw"), &field(FieldKind::Bytes)),
            Ok(Value::Bytes(b"raw".to_vec()))
        );
    }

    #[test]
    fn twos_complement_is_minimal() {
        assert_eq!(twos_complement_be(0), vec![0x00]);
        assert_eq!(twos_complement_be(127), vec![0x7F]);
        assert_eq!(twos_complement_be(128), vec![0x00, 0x80]);
        assert_eq!(twos_complement_be(-1), vec![0xFF]);
        assert_eq!(twos_complement_be(-128), vec![0x80]);
        assert_eq!(twos_complement_be(-129), vec![0xFF, 0x7F]);
        for v in [0, 1, -1, 255, -256, 123_456, i128::from(i64::MIN), i128::MAX] {
            assert_eq!(decode_twos_complement_be(&twos_complement_be(v)), v);
        }
    }
}
