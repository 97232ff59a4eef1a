//! Magnitude and percentage string parsing
//!
//! Container runtimes mix binary and decimal byte prefixes in their
//! human-readable output ("2.098MiB", "14.3MB", "1.2kB"). All conversions
//! are centralized here; nothing else in the crate parses units ad hoc.
//! Following the runtime's own convention, every prefix is interpreted as
//! a binary multiple (x1024 per step) whether or not the input carried an
//! IEC "i" marker.

/// Multiplier for one prefix step
const STEP: f64 = 1024.0;

/// Parse a magnitude string into a byte count.
///
/// Returns None for empty or malformed input. The distinction from zero
/// matters for optional fields like memory limits, where a missing value
/// must not be mistaken for "no cap".
pub fn try_parse_size(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Split the numeric prefix from the unit suffix
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(trimmed.len());
    let (number, suffix) = trimmed.split_at(split);

    let value: f64 = number.parse().ok()?;

    let mut unit = suffix.trim();
    // Optional trailing "B", optional IEC "i" marker before it
    if let Some(stripped) = unit.strip_suffix(['B', 'b']) {
        unit = stripped;
    }
    if let Some(stripped) = unit.strip_suffix(['i', 'I']) {
        unit = stripped;
    }

    let multiplier = match unit {
        "" => 1.0,
        "k" | "K" => STEP,
        "m" | "M" => STEP * STEP,
        "g" | "G" => STEP * STEP * STEP,
        "t" | "T" => STEP * STEP * STEP * STEP,
        _ => return None,
    };

    Some(value * multiplier)
}

/// Parse a magnitude string into a byte count, zeroing on failure.
///
/// Malformed telemetry is better silently zeroed than fatal; this never
/// panics and never errors.
pub fn parse_size(input: &str) -> f64 {
    try_parse_size(input).unwrap_or(0.0)
}

/// Parse a percentage string ("0.50%") into a float, zeroing on failure.
pub fn parse_percent(input: &str) -> f64 {
    input
        .trim()
        .trim_end_matches('%')
        .parse()
        .unwrap_or(0.0)
}
