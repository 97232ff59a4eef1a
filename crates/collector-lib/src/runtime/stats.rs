//! Stats line parsing
//!
//! Parses the single tabular line emitted by a per-container stats query:
//!
//! ```text
//! <id> <cpu%> <used> / <limit> <mem%> <netin> / <netout> <blkread> / <blkwrite>
//! ```
//!
//! The three "a / b" pairs use a bare `/` as their own token, so a full
//! line is twelve whitespace-separated fields; block I/O may be absent.

use crate::units::{parse_percent, parse_size, try_parse_size};

/// Minimum token count for a usable line: everything through net out.
const MIN_TOKENS: usize = 9;

/// One parsed stats line
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeStats {
    pub container_id: String,
    /// Already normalized 0-100 by the runtime, taken verbatim
    pub cpu_usage_percent: f64,
    pub mem_usage_percent: f64,
    /// None when the limit token is missing or unparseable; never zero,
    /// which would read as "no memory cap"
    pub mem_limit_bytes: Option<f64>,
    pub net_in_bytes: f64,
    pub net_out_bytes: f64,
    pub disk_read_bytes: Option<f64>,
    pub disk_write_bytes: Option<f64>,
}

/// Parse one stats line into a structured sample.
///
/// A line with fewer than the expected fields is rejected whole; a
/// partial sample would be indistinguishable from a zeroed one
/// downstream.
pub fn parse_stats_line(line: &str) -> Option<RuntimeStats> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < MIN_TOKENS {
        return None;
    }

    // Layout: [id, cpu%, used, /, limit, mem%, netin, /, netout, blkread, /, blkwrite]
    let (disk_read_bytes, disk_write_bytes) = if tokens.len() >= 12 {
        (Some(parse_size(tokens[9])), Some(parse_size(tokens[11])))
    } else {
        (None, None)
    };

    Some(RuntimeStats {
        container_id: tokens[0].to_string(),
        cpu_usage_percent: parse_percent(tokens[1]),
        mem_usage_percent: parse_percent(tokens[5]),
        mem_limit_bytes: try_parse_size(tokens[4]),
        net_in_bytes: parse_size(tokens[6]),
        net_out_bytes: parse_size(tokens[8]),
        disk_read_bytes,
        disk_write_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: f64 = 1024.0 * 1024.0;

    #[test]
    fn test_parse_full_line() {
        let line = "abc123 0.50% 2.1MiB / 512MiB 0.41% 1.2kB / 800B 3MB / 1MB";
        let stats = parse_stats_line(line).unwrap();

        assert_eq!(stats.container_id, "abc123");
        assert!((stats.cpu_usage_percent - 0.50).abs() < 1e-9);
        assert!((stats.mem_usage_percent - 0.41).abs() < 1e-9);
        let limit = stats.mem_limit_bytes.unwrap();
        assert!((limit - 512.0 * MIB).abs() < 1.0);
        assert!((stats.net_in_bytes - 1.2 * 1024.0).abs() < 1e-6);
        assert!((stats.net_out_bytes - 800.0).abs() < 1e-9);
        assert!((stats.disk_read_bytes.unwrap() - 3.0 * MIB).abs() < 1.0);
        assert!((stats.disk_write_bytes.unwrap() - 1.0 * MIB).abs() < 1.0);
    }

    #[test]
    fn test_short_line_rejected_whole() {
        // 8 tokens: truncated mid-network pair
        assert!(parse_stats_line("abc123 0.50% 2.1MiB / 512MiB 0.41% 1.2kB /").is_none());
        assert!(parse_stats_line("").is_none());
        assert!(parse_stats_line("abc123").is_none());
    }

    #[test]
    fn test_missing_block_io_yields_none_not_zero() {
        let line = "abc123 0.50% 2.1MiB / 512MiB 0.41% 1.2kB / 800B";
        let stats = parse_stats_line(line).unwrap();

        assert_eq!(stats.disk_read_bytes, None);
        assert_eq!(stats.disk_write_bytes, None);
        assert!((stats.net_out_bytes - 800.0).abs() < 1e-9);
    }

    #[test]
    fn test_unparseable_mem_limit_is_null() {
        let line = "abc123 0.50% 2.1MiB / unlimited 0.41% 1.2kB / 800B 3MB / 1MB";
        let stats = parse_stats_line(line).unwrap();

        assert_eq!(stats.mem_limit_bytes, None);
    }

    #[test]
    fn test_malformed_io_zeroes_not_rejects() {
        let line = "abc123 0.50% 2.1MiB / 512MiB 0.41% bogus / 800B 3MB / 1MB";
        let stats = parse_stats_line(line).unwrap();

        assert_eq!(stats.net_in_bytes, 0.0);
        assert!((stats.net_out_bytes - 800.0).abs() < 1e-9);
    }
}
