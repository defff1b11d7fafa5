//! Invariant numeric formatting and response parsing.
//!
//! SCPI numbers always use `.` as the decimal separator regardless of the host
//! locale. Rust's float `Display` and `FromStr` are locale independent, so these
//! helpers mostly pin down the canonical shape: shortest round-trip digits, no
//! trailing `.0`, no exponent.

/// Render a number the way it is sent to the instrument.
///
/// ```
/// use ds1000z_scpi::format::format_number;
/// assert_eq!(format_number(1000.0), "1000");
/// assert_eq!(format_number(0.5), "0.5");
/// assert_eq!(format_number(-0.0), "0");
/// ```
pub fn format_number(value: f64) -> String {
    // -0.0 renders as "-0", which some firmware revisions reject
    if value == 0.0 {
        return "0".to_string();
    }
    format!("{}", value)
}

/// Parse a numeric string in invariant form.
///
/// Accepts SCPI NR1/NR2/NR3 shapes (`12`, `0.5`, `5.000000e-01`) with surrounding
/// whitespace. Rejects locale forms such as `0,5` and non-finite values.
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.contains(',') {
        return None;
    }
    // f64::from_str also accepts "inf" and "NaN"
    let lowered = trimmed.to_ascii_lowercase();
    if lowered.contains("inf") || lowered.contains("nan") {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse an SCPI boolean (`1`, `0`, `ON`, `OFF`).
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_uppercase().as_str() {
        "1" | "ON" | "TRUE" => Some(true),
        "0" | "OFF" | "FALSE" => Some(false),
        _ => None,
    }
}

/// Whether `text` spells SCPI mnemonic `mnemonic` in its long or short form.
///
/// The short form is the leading uppercase part of the mnemonic plus any numeric
/// suffix (`HANNing` → `HANN`, `CHANnel1` → `CHAN1`). Anything between the short
/// and long form is accepted too, as instruments do. Mnemonics without lowercase
/// letters (`DC`, `20M`, `0.5`) only match exactly. Case is ignored.
pub fn mnemonic_matches(mnemonic: &str, text: &str) -> bool {
    let text = text.trim();
    if mnemonic.eq_ignore_ascii_case(text) {
        return true;
    }

    let (stem, digits) = split_numeric_suffix(mnemonic);
    let (text_stem, text_digits) = split_numeric_suffix(text);
    if digits != text_digits {
        return false;
    }

    let short_len = stem
        .find(|c: char| c.is_ascii_lowercase())
        .unwrap_or(stem.len());
    if short_len == 0 || short_len == stem.len() {
        return false;
    }

    let stem = stem.to_ascii_uppercase();
    let text_stem = text_stem.to_ascii_uppercase();
    text_stem.starts_with(&stem[..short_len]) && stem.starts_with(&text_stem)
}

fn split_numeric_suffix(s: &str) -> (&str, &str) {
    let split = s.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    s.split_at(split)
}

/// Render a boolean as the `ON`/`OFF` mnemonic.
pub fn format_bool(value: bool) -> &'static str {
    if value {
        "ON"
    } else {
        "OFF"
    }
}
