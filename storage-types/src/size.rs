//! Byte-size helpers shared by the model, the fixtures and the sim binary.

use anyhow::Result;
use num_format::{Locale, ToFormattedString};

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;

/// Convert bytes to human-readable format (e.g., "1.50 GB")
pub fn bytes_to_pretty(bytes: &u64, add_bytes: bool) -> String {
    let mut steps = 0;
    let mut val: f64 = *bytes as f64;

    while val > 1024. && steps <= 8 {
        val /= 1024.;
        steps += 1;
    }

    let unit = match steps {
        0 => "B",
        1 => "KB",
        2 => "MB",
        3 => "GB",
        4 => "TB",
        5 => "PB",
        6 => "EB",
        7 => "ZB",
        8 => "YB",
        _ => "Not Supported",
    };

    if add_bytes {
        let bytes_str = bytes.to_formatted_string(&Locale::en);
        format!("{:.2} {} ({} bytes)", val, unit, bytes_str)
    } else {
        format!("{:.2} {}", val, unit)
    }
}

/// Parse human-readable format to bytes (e.g., "1.5 GB" -> bytes)
pub fn pretty_to_bytes(pretty: &str) -> Result<u64> {
    let split = pretty.split_whitespace().collect::<Vec<&str>>();
    let string_value = split
        .first()
        .ok_or_else(|| anyhow::anyhow!("Invalid input"))?;

    let mut val: f64 = string_value.parse()?;
    let unit = *split
        .last()
        .ok_or_else(|| anyhow::anyhow!("Invalid input"))?;

    let mut steps = match unit {
        "B" => 0,
        "KB" => 1,
        "MB" => 2,
        "GB" => 3,
        "TB" => 4,
        "PB" => 5,
        "EB" => 6,
        "ZB" => 7,
        "YB" => 8,
        _ => return Err(anyhow::anyhow!("Invalid unit: {}", unit)),
    };

    while steps > 0 {
        val *= 1024.;
        steps -= 1;
    }

    Ok(val as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pretty_roundtrip() {
        assert_eq!(pretty_to_bytes("512 GB").unwrap(), 512 * GIB);
        assert_eq!(bytes_to_pretty(&(512 * GIB), false), "512.00 GB");
    }

    #[test]
    fn test_pretty_to_bytes_rejects_garbage() {
        assert!(pretty_to_bytes("lots").is_err());
        assert!(pretty_to_bytes("12 parsecs").is_err());
    }
}
