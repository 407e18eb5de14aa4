use thiserror::Error;

use std::num::ParseIntError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty number")]
    Empty,

    #[error("invalid number '{0}': {1}")]
    Invalid(String, ParseIntError),

    #[error("unknown size suffix '{0}'")]
    Suffix(String),

    #[error("size '{0}' doesn't fit in 64 bits")]
    Overflow(String),
}

/// Parse an integer written in decimal, hex (`0x`) or binary (`0b`). Underscores are ignored.
pub fn parse_int(input: &str) -> Result<u64, ParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ParseError::Empty);
    }
    let digits: String = input.chars().filter(|c| *c != '_').collect();
    let (digits, radix) = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        (hex.to_string(), 16)
    } else if let Some(bin) = digits.strip_prefix("0b") {
        (bin.to_string(), 2)
    } else {
        (digits, 10)
    };
    u64::from_str_radix(&digits, radix)
        .map_err(|err| ParseError::Invalid(input.to_string(), err))
}

/// Parse a memory size such as `64`, `16kB`, `1MiB` or `0x400`. Both `kB` and `KiB` are taken as
/// powers of two, the same way memory sizes are usually written for caches.
pub fn parse_size(input: &str) -> Result<u64, ParseError> {
    let input = input.trim();
    let lower = input.to_ascii_lowercase();
    let hex = lower.starts_with("0x");
    let start = if hex || lower.starts_with("0b") { 2 } else { 0 };
    let is_digit = |c: char| {
        c == '_' || if hex { c.is_ascii_hexdigit() } else { c.is_ascii_digit() }
    };
    let split = input
        .get(start..)
        .and_then(|rest| rest.find(|c: char| !is_digit(c)))
        .map(|i| i + start)
        .unwrap_or(input.len());
    let (number, suffix) = input.split_at(split);
    let scale: u64 = match suffix.trim() {
        "" | "B" => 1,
        "kB" | "KB" | "KiB" => 1 << 10,
        "MB" | "MiB" => 1 << 20,
        "GB" | "GiB" => 1 << 30,
        other => return Err(ParseError::Suffix(other.to_string())),
    };
    parse_int(number)?
        .checked_mul(scale)
        .ok_or_else(|| ParseError::Overflow(input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ints() {
        assert_eq!(parse_int("42"), Ok(42));
        assert_eq!(parse_int("0x240"), Ok(0x240));
        assert_eq!(parse_int("0b101"), Ok(5));
        assert_eq!(parse_int("1_000"), Ok(1000));
        assert_eq!(parse_int(" "), Err(ParseError::Empty));
        assert!(parse_int("0xzz").is_err());
    }

    #[test]
    fn sizes() {
        assert_eq!(parse_size("64"), Ok(64));
        assert_eq!(parse_size("16kB"), Ok(16 * 1024));
        assert_eq!(parse_size("1024kB"), Ok(1024 * 1024));
        assert_eq!(parse_size("1 MiB"), Ok(1 << 20));
        assert_eq!(parse_size("0x400"), Ok(0x400));
        assert_eq!(parse_size("0xab"), Ok(0xab));
        assert_eq!(parse_size("12 parsecs"), Err(ParseError::Suffix("parsecs".to_string())));
    }
}
