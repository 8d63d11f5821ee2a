//! Time literal helpers.
//!
//! Timer presets are written as `"500ms"`, `"2s"`, `"3m"`, `"1h"` or a bare
//! number of seconds. Bare numbers and the `s` suffix both mean seconds;
//! suffixes are case-insensitive. Anything unparseable falls back to the
//! 3-second default preset.

/// Default timer preset when no literal is given or parsing fails
pub const DEFAULT_PRESET_SECS: f32 = 3.0;

/// Parse a time literal into seconds.
pub fn parse_duration(text: &str) -> f32 {
    let text = text.trim();
    if text.is_empty() {
        return DEFAULT_PRESET_SECS;
    }

    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    if split == 0 {
        return DEFAULT_PRESET_SECS;
    }
    let Ok(number) = text[..split].parse::<f32>() else {
        return DEFAULT_PRESET_SECS;
    };

    match text[split..].to_ascii_lowercase().as_str() {
        "ms" => number / 1000.0,
        "m" => number * 60.0,
        "h" => number * 3600.0,
        _ => number,
    }
}

/// Format seconds back into the shortest natural literal.
///
/// Whole hours and minutes use `h`/`m`, sub-second or fractional values use
/// `ms`, everything else uses `s`. Non-positive input formats the default.
pub fn format_duration(seconds: f32) -> String {
    if seconds <= 0.0 {
        return "3s".to_string();
    }

    if seconds >= 3600.0 && seconds % 3600.0 < 0.01 {
        format!("{}h", (seconds / 3600.0) as u32)
    } else if seconds >= 60.0 && seconds % 60.0 < 0.01 {
        format!("{}m", (seconds / 60.0) as u32)
    } else if seconds < 1.0 || seconds % 1.0 > 0.001 {
        format!("{}ms", (seconds * 1000.0).round() as u32)
    } else {
        format!("{}s", seconds.round() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_suffixes() {
        assert_eq!(parse_duration("500ms"), 0.5);
        assert_eq!(parse_duration("2s"), 2.0);
        assert_eq!(parse_duration("3m"), 180.0);
        assert_eq!(parse_duration("1h"), 3600.0);
    }

    #[test]
    fn test_parse_bare_number_is_seconds() {
        assert_eq!(parse_duration("2"), 2.0);
        assert_eq!(parse_duration("2.5"), 2.5);
        assert_eq!(parse_duration(".5"), 0.5);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(parse_duration("500MS"), 0.5);
        assert_eq!(parse_duration("2S"), 2.0);
    }

    #[test]
    fn test_parse_fallback() {
        assert_eq!(parse_duration(""), DEFAULT_PRESET_SECS);
        assert_eq!(parse_duration("abc"), DEFAULT_PRESET_SECS);
        assert_eq!(parse_duration("ms"), DEFAULT_PRESET_SECS);
    }

    #[test]
    fn test_unknown_suffix_means_seconds() {
        assert_eq!(parse_duration("2q"), 2.0);
    }

    #[test]
    fn test_format() {
        assert_eq!(format_duration(0.5), "500ms");
        assert_eq!(format_duration(2.0), "2s");
        assert_eq!(format_duration(180.0), "3m");
        assert_eq!(format_duration(7200.0), "2h");
        assert_eq!(format_duration(2.5), "2500ms");
        assert_eq!(format_duration(0.0), "3s");
        assert_eq!(format_duration(-1.0), "3s");
    }

    #[test]
    fn test_round_trip() {
        for text in ["500ms", "2s", "3m", "1h"] {
            assert_eq!(format_duration(parse_duration(text)), text);
        }
    }
}
