/// Size conversion utilities — suffixed strings in, byte counts out, and back.
///
/// Platform utilities (diskpart in particular) print sizes with decimal
/// suffixes (`"476 GB"`), so both directions use powers of 1000.

const KB: u64 = 1_000;
const MB: u64 = KB * 1_000;
const GB: u64 = MB * 1_000;
const TB: u64 = GB * 1_000;

/// Parse a suffixed size string such as `"10 GB"`, `"500 MB"` or `"42 B"`
/// into bytes.
///
/// The space between number and unit is optional and the unit is
/// case-insensitive. Fractional values are rounded to the nearest byte.
/// Anything unparsable yields 0; callers treat sizes as best-effort.
pub fn parse_size(text: &str) -> u64 {
    let text = text.trim();
    let split = text
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let number = number.trim();

    let multiplier = match unit.trim().to_ascii_uppercase().as_str() {
        "TB" => TB,
        "GB" => GB,
        "MB" => MB,
        "KB" => KB,
        "B" | "" => 1,
        _ => return 0,
    };

    if let Ok(whole) = number.parse::<u64>() {
        return whole.saturating_mul(multiplier);
    }
    match number.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => (value * multiplier as f64).round() as u64,
        _ => 0,
    }
}

/// Format a byte count with the largest whole decimal unit, truncating:
/// `500_107_862_016` → `"500GB"`.
pub fn format_size(bytes: u64) -> String {
    if bytes >= GB {
        format!("{}GB", bytes / GB)
    } else if bytes >= MB {
        format!("{}MB", bytes / MB)
    } else if bytes >= KB {
        format!("{}KB", bytes / KB)
    } else {
        format!("{bytes}B")
    }
}
