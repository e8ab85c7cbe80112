//! Unit conversions for raw kubelet/cAdvisor values
//!
//! CPU times arrive in nanoseconds, resource strings in Kubernetes
//! quantity notation ("500m", "512Mi"). Everything is normalized to
//! cores, seconds and bytes before emission.

use anyhow::{anyhow, Result};

const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

/// Convert a raw cAdvisor cpu time (nanoseconds) to seconds.
pub fn nanoseconds_to_seconds(nanoseconds: u64) -> f64 {
    nanoseconds as f64 / NANOS_PER_SECOND
}

/// Convert a Kubernetes cpu quantity to cores.
///
/// A trailing `m` marks millicores ("500m" -> 0.5); anything else is
/// parsed directly as cores ("2" -> 2.0).
pub fn cpu_string_to_cores(quantity: &str) -> Result<f64> {
    let quantity = quantity.trim();
    if let Some(millicores) = quantity.strip_suffix('m') {
        let value: f64 = millicores
            .parse()
            .map_err(|_| anyhow!("invalid cpu quantity {quantity:?}"))?;
        Ok(value / 1000.0)
    } else {
        quantity
            .parse()
            .map_err(|_| anyhow!("invalid cpu quantity {quantity:?}"))
    }
}

/// Convert a Kubernetes memory quantity to bytes.
///
/// Supports binary (Ki, Mi, Gi, Ti) and decimal (K/k, M, G, T) suffixes
/// as well as bare byte counts.
pub fn memory_string_to_bytes(quantity: &str) -> Result<f64> {
    let quantity = quantity.trim();
    let split = quantity
        .find(|c: char| !c.is_ascii_digit() && c != '.' && c != '-')
        .unwrap_or(quantity.len());
    let (magnitude, suffix) = quantity.split_at(split);

    let value: f64 = magnitude
        .parse()
        .map_err(|_| anyhow!("invalid memory quantity {quantity:?}"))?;

    let multiplier: f64 = match suffix {
        "" => 1.0,
        "Ki" => 1024.0,
        "Mi" => 1024.0 * 1024.0,
        "Gi" => 1024.0 * 1024.0 * 1024.0,
        "Ti" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "K" | "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        _ => return Err(anyhow!("unknown memory suffix in {quantity:?}")),
    };

    Ok(value * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nanoseconds_divide_to_double_precision() {
        assert_eq!(nanoseconds_to_seconds(1_000_000_000), 1.0);
        assert_eq!(nanoseconds_to_seconds(1_500_000_000), 1.5);
        assert_eq!(nanoseconds_to_seconds(0), 0.0);
        assert_eq!(nanoseconds_to_seconds(123_456_789), 0.123456789);
    }

    #[test]
    fn millicore_strings_divide_by_thousand() {
        assert_eq!(cpu_string_to_cores("500m").unwrap(), 0.5);
        assert_eq!(cpu_string_to_cores("1m").unwrap(), 0.001);
        assert_eq!(cpu_string_to_cores("2500m").unwrap(), 2.5);
    }

    #[test]
    fn plain_cpu_strings_pass_through() {
        assert_eq!(cpu_string_to_cores("2").unwrap(), 2.0);
        assert_eq!(cpu_string_to_cores("0.5").unwrap(), 0.5);
    }

    #[test]
    fn bad_cpu_strings_are_rejected() {
        assert!(cpu_string_to_cores("lots").is_err());
        assert!(cpu_string_to_cores("").is_err());
    }

    #[test]
    fn memory_binary_suffixes() {
        assert_eq!(memory_string_to_bytes("1Ki").unwrap(), 1024.0);
        assert_eq!(memory_string_to_bytes("512Mi").unwrap(), 512.0 * 1024.0 * 1024.0);
        assert_eq!(
            memory_string_to_bytes("2Gi").unwrap(),
            2.0 * 1024.0 * 1024.0 * 1024.0
        );
    }

    #[test]
    fn memory_decimal_suffixes_and_bare_bytes() {
        assert_eq!(memory_string_to_bytes("1K").unwrap(), 1000.0);
        assert_eq!(memory_string_to_bytes("100M").unwrap(), 1e8);
        assert_eq!(memory_string_to_bytes("1G").unwrap(), 1e9);
        assert_eq!(memory_string_to_bytes("1048576").unwrap(), 1048576.0);
    }

    #[test]
    fn memory_unknown_suffix_is_rejected() {
        assert!(memory_string_to_bytes("10Qi").is_err());
        assert!(memory_string_to_bytes("abc").is_err());
    }
}
