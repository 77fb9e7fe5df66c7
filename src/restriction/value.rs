//! Normalized leaf values

use std::fmt;

use crate::schema::QName;

/// Fixed-width integer kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntKind {
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
}

impl IntKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "int8" => IntKind::Int8,
            "int16" => IntKind::Int16,
            "int32" => IntKind::Int32,
            "int64" => IntKind::Int64,
            "uint8" => IntKind::Uint8,
            "uint16" => IntKind::Uint16,
            "uint32" => IntKind::Uint32,
            "uint64" => IntKind::Uint64,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            IntKind::Int8 => "int8",
            IntKind::Int16 => "int16",
            IntKind::Int32 => "int32",
            IntKind::Int64 => "int64",
            IntKind::Uint8 => "uint8",
            IntKind::Uint16 => "uint16",
            IntKind::Uint32 => "uint32",
            IntKind::Uint64 => "uint64",
        }
    }

    pub fn min(self) -> i128 {
        match self {
            IntKind::Int8 => i8::MIN as i128,
            IntKind::Int16 => i16::MIN as i128,
            IntKind::Int32 => i32::MIN as i128,
            IntKind::Int64 => i64::MIN as i128,
            IntKind::Uint8 | IntKind::Uint16 | IntKind::Uint32 | IntKind::Uint64 => 0,
        }
    }

    pub fn max(self) -> i128 {
        match self {
            IntKind::Int8 => i8::MAX as i128,
            IntKind::Int16 => i16::MAX as i128,
            IntKind::Int32 => i32::MAX as i128,
            IntKind::Int64 => i64::MAX as i128,
            IntKind::Uint8 => u8::MAX as i128,
            IntKind::Uint16 => u16::MAX as i128,
            IntKind::Uint32 => u32::MAX as i128,
            IntKind::Uint64 => u64::MAX as i128,
        }
    }

    /// 64-bit kinds travel as JSON strings
    pub fn is_wide(self) -> bool {
        matches!(self, IntKind::Int64 | IntKind::Uint64)
    }
}

/// A validated leaf value in canonical form
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LeafValue {
    String(String),
    Boolean(bool),
    Empty,
    Integer { value: i128, kind: IntKind },
    /// `scaled` is the value times 10^fraction_digits
    Decimal { scaled: i128, fraction_digits: u8 },
    Enumeration(String),
    Identity(QName),
}

impl LeafValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            LeafValue::String(s) | LeafValue::Enumeration(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            LeafValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            LeafValue::Integer { value, .. } => i64::try_from(*value).ok(),
            _ => None,
        }
    }

    pub fn as_identity(&self) -> Option<&QName> {
        match self {
            LeafValue::Identity(q) => Some(q),
            _ => None,
        }
    }
}

impl fmt::Display for LeafValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeafValue::String(s) | LeafValue::Enumeration(s) => f.write_str(s),
            LeafValue::Boolean(b) => write!(f, "{}", b),
            LeafValue::Empty => Ok(()),
            LeafValue::Integer { value, .. } => write!(f, "{}", value),
            LeafValue::Decimal {
                scaled,
                fraction_digits,
            } => f.write_str(&format_decimal(*scaled, *fraction_digits)),
            LeafValue::Identity(q) => write!(f, "{}", q),
        }
    }
}

/// Parse decimal text into a value scaled by 10^fraction_digits.
///
/// Rejects more fractional digits than allowed instead of rounding.
pub(crate) fn parse_decimal(text: &str, fraction_digits: u8) -> Option<i128> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.chars().all(|c| c.is_ascii_digit()) || !frac_part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if frac_part.len() > fraction_digits as usize {
        return None;
    }

    let scale = 10i128.checked_pow(fraction_digits as u32)?;
    let int_value: i128 = if int_part.is_empty() { 0 } else { int_part.parse().ok()? };
    let mut frac_value: i128 = if frac_part.is_empty() { 0 } else { frac_part.parse().ok()? };
    for _ in frac_part.len()..fraction_digits as usize {
        frac_value *= 10;
    }

    let scaled = int_value.checked_mul(scale)?.checked_add(frac_value)?;
    Some(if negative { -scaled } else { scaled })
}

/// Render a scaled decimal with exactly `fraction_digits` digits after the point
pub(crate) fn format_decimal(scaled: i128, fraction_digits: u8) -> String {
    if fraction_digits == 0 {
        return scaled.to_string();
    }
    let scale = 10i128.pow(fraction_digits as u32);
    let sign = if scaled < 0 { "-" } else { "" };
    let magnitude = scaled.unsigned_abs();
    let scale = scale as u128;
    format!(
        "{}{}.{:0width$}",
        sign,
        magnitude / scale,
        magnitude % scale,
        width = fraction_digits as usize
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("1.5", 2), Some(150));
        assert_eq!(parse_decimal("-0.25", 2), Some(-25));
        assert_eq!(parse_decimal("3", 1), Some(30));
        assert_eq!(parse_decimal("1.234", 2), None);
        assert_eq!(parse_decimal("abc", 2), None);
        assert_eq!(parse_decimal(".", 2), None);
    }

    #[test]
    fn test_format_decimal() {
        assert_eq!(format_decimal(150, 2), "1.50");
        assert_eq!(format_decimal(-25, 2), "-0.25");
        assert_eq!(format_decimal(7, 0), "7");
    }

    #[test]
    fn test_int_bounds() {
        assert_eq!(IntKind::Uint8.max(), 255);
        assert_eq!(IntKind::Int16.min(), -32768);
        assert!(IntKind::Uint64.is_wide());
        assert!(!IntKind::Uint32.is_wide());
    }

    #[test]
    fn test_identity_display_is_qualified() {
        let v = LeafValue::Identity(QName::new("ietf-routing", "static"));
        assert_eq!(v.to_string(), "ietf-routing:static");
    }
}
