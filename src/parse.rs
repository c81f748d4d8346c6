//! Parsers for the string encodings used by `sacct`
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

/// `D-HH:MM:SS`, e.g. `1-03:04:02`
static DAYS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)-(\d{2}):(\d{2}):(\d{2})").expect("valid regex"));
/// `HH:MM:SS`, e.g. `03:04:02`
static HOURS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{2}):(\d{2}):(\d{2})").expect("valid regex"));
/// `MM:SS.mmm`, e.g. `04:02.123`; used by TotalCPU for short jobs
static MINUTES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{2}):(\d{2}).(\d{3})").expect("valid regex"));
/// Memory amounts as found in ReqMem and MaxRSS, e.g. `4000Mc` or `1764224K`
static MEMORY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<memory>[-+]?\d*\.\d+|\d+)(?P<multiple>[KMGTE]?)(?P<scope>[nc]?)$")
        .expect("valid regex")
});

const UNITS: [&str; 6] = ["", "K", "M", "G", "T", "E"];

/// Parses one of the three duration formats used by sacct into whole seconds.
/// Fractional seconds are discarded.
pub fn duration(value: &str) -> Result<u64> {
    let invalid = || Error::Duration(value.to_string());

    // Components in seconds, largest unit first
    let (caps, units) = if let Some(caps) = DAYS_RE.captures(value) {
        (caps, &[86400u64, 3600, 60, 1][..])
    } else if let Some(caps) = HOURS_RE.captures(value) {
        (caps, &[3600u64, 60, 1][..])
    } else if let Some(caps) = MINUTES_RE.captures(value) {
        // Milliseconds are not counted
        (caps, &[60u64, 1][..])
    } else {
        return Err(invalid());
    };

    let mut seconds = 0u64;
    for (idx, unit) in units.iter().enumerate() {
        let amount = caps[idx + 1].parse::<u64>().map_err(|_| invalid())?;
        seconds = amount
            .checked_mul(*unit)
            .and_then(|amount| seconds.checked_add(amount))
            .ok_or_else(invalid)?;
    }

    Ok(seconds)
}

/// Multiplier for a memory unit; every step is a factor of 1024
fn multiple(unit: &str) -> f64 {
    match unit {
        "K" => 1024f64,
        "M" => 1024f64.powi(2),
        "G" => 1024f64.powi(3),
        "T" => 1024f64.powi(4),
        "E" => 1024f64.powi(5),
        _ => 1.0,
    }
}

/// Parses a memory amount into bytes.
///
/// An `n` suffix scales the amount by the number of nodes and a `c` suffix
/// by the number of CPUs. Empty values and `"0"` are zero.
pub fn memory(value: &str, nodes: u64, cpus: u64) -> Result<f64> {
    if value.is_empty() || value == "0" {
        return Ok(0.0);
    }

    let caps = MEMORY_RE
        .captures(value)
        .ok_or_else(|| Error::Memory(value.to_string()))?;

    let mut memory = caps["memory"]
        .parse::<f64>()
        .map_err(|_| Error::Memory(value.to_string()))?;

    memory *= multiple(&caps["multiple"]);
    match &caps["scope"] {
        "n" => memory *= nodes as f64,
        "c" => memory *= cpus as f64,
        _ => {}
    }

    Ok(memory)
}

/// Parses an unscaled memory amount, e.g. the MaxRSS of a single step
pub fn step_memory(value: &str) -> Result<f64> {
    memory(value, 1, 1)
}

/// Parses a count column such as AllocCPUS or NNodes
pub fn count(key: &str, value: &str) -> Result<u64> {
    value.trim().parse::<u64>().map_err(|_| Error::Number {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Extracts `energy=<int>` from a TRES usage list such as `energy=12,fs/disk=3`.
/// Returns 0 when no energy was recorded.
pub fn energy(tres: &str) -> Result<u64> {
    for entry in tres.split(',') {
        if let Some(("energy", value)) = entry.split_once('=') {
            return count("energy", value);
        }
    }

    Ok(0)
}

/// Renders a byte count with a binary unit suffix, e.g. `3G`
pub fn bytes_to_string(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }

    let index = (value.abs().log2() / 10.0).floor().clamp(0.0, 5.0) as usize;
    let scaled = (value / 1024f64.powi(index as i32)).round();

    format!("{}{}", scaled, UNITS[index])
}

/// Rounds to one decimal place; ties go to the even digit
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration() {
        assert_eq!(duration("01-03:04:02").unwrap(), 97442);
        assert_eq!(duration("451-06:00:24").unwrap(), 38988024);
        assert_eq!(duration("03:04:02").unwrap(), 11042);
        assert_eq!(duration("04:02.123").unwrap(), 242);
        assert_eq!(duration("00:00.081").unwrap(), 0);
        assert_eq!(duration("00:00:00").unwrap(), 0);
    }

    #[test]
    fn test_duration_invalid() {
        for value in [
            "",
            "UNLIMITED",
            "1:2:3",
            "12-3:04:05",
            "Partition_Limit",
            // Too large for a u64, or overflowing once converted to seconds
            "99999999999999999999-00:00:00",
            "300000000000000-00:00:00",
        ] {
            assert!(
                matches!(duration(value), Err(Error::Duration(v)) if v == value),
                "{value:?}"
            );
        }
    }

    #[test]
    fn test_memory_nodes() {
        for mem in [1u64, 2, 4] {
            for (exp, unit) in ["K", "M", "G", "T", "E"].iter().enumerate() {
                for nodes in [1u64, 2, 4] {
                    let expected = (mem * nodes) as f64 * 1024f64.powi(exp as i32 + 1);
                    assert_eq!(memory(&format!("{mem}{unit}n"), nodes, 7).unwrap(), expected);
                }
            }
        }
    }

    #[test]
    fn test_memory_cpus() {
        for mem in [1u64, 2, 4] {
            for (exp, unit) in ["K", "M", "G", "T", "E"].iter().enumerate() {
                for cpus in [1u64, 2, 4] {
                    let expected = (mem * cpus) as f64 * 1024f64.powi(exp as i32 + 1);
                    assert_eq!(memory(&format!("{mem}{unit}c"), 7, cpus).unwrap(), expected);
                }
            }
        }
    }

    #[test]
    fn test_step_memory() {
        assert_eq!(step_memory("").unwrap(), 0.0);
        assert_eq!(step_memory("0").unwrap(), 0.0);
        assert_eq!(step_memory("5").unwrap(), 5.0);
        assert_eq!(step_memory("4224K").unwrap(), 4224.0 * 1024.0);
        assert_eq!(step_memory("1084.50M").unwrap(), 1084.5 * 1024.0 * 1024.0);
        assert_eq!(step_memory(".5G").unwrap(), 0.5 * 1024f64.powi(3));

        assert!(matches!(step_memory("18GG"), Err(Error::Memory(v)) if v == "18GG"));
        assert!(step_memory("G").is_err());
        assert!(step_memory("4Gx").is_err());
    }

    #[test]
    fn test_energy() {
        assert_eq!(energy("").unwrap(), 0);
        assert_eq!(energy("fs/disk=12").unwrap(), 0);
        assert_eq!(energy("energy=1421,fs/disk=33").unwrap(), 1421);
        assert_eq!(energy("fs/disk=33,energy=7").unwrap(), 7);
        assert!(energy("energy=many").is_err());
    }

    #[test]
    fn test_bytes_to_string() {
        assert_eq!(bytes_to_string(0.0), "0");
        assert_eq!(bytes_to_string(512.0), "512");
        assert_eq!(bytes_to_string(1024.0), "1K");
        assert_eq!(bytes_to_string(4224.0 * 1024.0), "4M");
        assert_eq!(bytes_to_string(3501608.0 * 1024.0), "3G");
        assert_eq!(bytes_to_string(1.5 * 1024f64.powi(4)), "2T");
    }

    #[test]
    fn test_round1() {
        assert_eq!(round1(99.7046), 99.7);
        assert_eq!(round1(3.6153), 3.6);
        assert_eq!(round1(100.0), 100.0);
        assert_eq!(round1(6.25), 6.2);
        assert_eq!(round1(3.75), 3.8);
    }
}
