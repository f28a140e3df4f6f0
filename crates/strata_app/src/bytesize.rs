//! Parsing and formatting of human byte sizes for CLI flags.

use anyhow::{bail, Result};

/// Parse values like `512`, `64KB`, `4MB`, `1GB` into bytes. Multiples are
/// binary; the unit is case-insensitive and a bare `B` is allowed.
pub fn parse_bytes(s: &str) -> Result<u64> {
    let s = s.trim();
    if s.is_empty() {
        bail!("empty size");
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    if digits.is_empty() {
        bail!("invalid size {s:?}: missing number");
    }
    let value: u64 = digits.parse()?;

    let multiplier: u64 = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1 << 10,
        "M" | "MB" | "MIB" => 1 << 20,
        "G" | "GB" | "GIB" => 1 << 30,
        "T" | "TB" | "TIB" => 1 << 40,
        other => bail!("invalid size unit {other:?}"),
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| anyhow::anyhow!("size {s:?} overflows"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_numbers() {
        assert_eq!(parse_bytes("0").unwrap(), 0);
        assert_eq!(parse_bytes("512").unwrap(), 512);
    }

    #[test]
    fn test_units() {
        assert_eq!(parse_bytes("4KB").unwrap(), 4096);
        assert_eq!(parse_bytes("4MB").unwrap(), 4 << 20);
        assert_eq!(parse_bytes("4GB").unwrap(), 4 << 30);
        assert_eq!(parse_bytes("1TB").unwrap(), 1 << 40);
        assert_eq!(parse_bytes("2KiB").unwrap(), 2048);
        assert_eq!(parse_bytes("8mb").unwrap(), 8 << 20);
        assert_eq!(parse_bytes("16 MB").unwrap(), 16 << 20);
        assert_eq!(parse_bytes("100B").unwrap(), 100);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(parse_bytes("").is_err());
        assert!(parse_bytes("MB").is_err());
        assert!(parse_bytes("12XB").is_err());
        assert!(parse_bytes("-4MB").is_err());
    }
}
