// Licensed under the Apache-2.0 license

//! Capacity strings as they appear in partition tables: `4K`, `2M`,
//! `0x10000` or plain decimal.

use crate::error::{BuildError, Result};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

/// Parses a capacity string into a byte count.
///
/// Spaces are ignored and letters are case-insensitive. The `K` and `M`
/// suffixes are checked before the `0x` prefix, so `0x10K` is rejected rather
/// than read as hexadecimal.
pub fn parse_size(text: &str) -> Result<u64> {
    let invalid = || BuildError::InvalidSizeFormat(text.to_string());
    let normalized: String = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();

    if let Some(kib) = normalized.strip_suffix('K') {
        parse_decimal(kib)
            .and_then(|n| n.checked_mul(KIB))
            .ok_or_else(invalid)
    } else if let Some(mib) = normalized.strip_suffix('M') {
        parse_decimal(mib)
            .and_then(|n| n.checked_mul(MIB))
            .ok_or_else(invalid)
    } else if let Some(hex) = normalized.strip_prefix("0X") {
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        u64::from_str_radix(hex, 16).map_err(|_| invalid())
    } else {
        parse_decimal(&normalized).ok_or_else(invalid)
    }
}

fn parse_decimal(digits: &str) -> Option<u64> {
    digits.parse::<u64>().ok()
}
