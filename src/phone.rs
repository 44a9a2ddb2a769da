//! Phone number canonicalization.
//!
//! Numbers are folded into one international form for the Ethiopian
//! numbering plan (`+251...`). Any other region is mis-normalized; this is
//! not a general E.164 parser.

pub const COUNTRY_CODE: &str = "251";
const TRUNK_PREFIX: char = '0';

/// Minimum length (in characters, `+` included) accepted for `/start <phone>`.
pub const MIN_START_ARGUMENT_LEN: usize = 10;

/// Canonicalize a raw phone string into `+251XXXXXXXXX`.
///
/// Empty input yields an empty string. Input without any digits still gets
/// the country code (`"abc"` -> `"+251"`).
pub fn normalize(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let mut digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if let Some(rest) = digits.strip_prefix(TRUNK_PREFIX) {
        digits = format!("{COUNTRY_CODE}{rest}");
    }

    if !digits.starts_with(COUNTRY_CODE) {
        digits.insert_str(0, COUNTRY_CODE);
    }

    format!("+{digits}")
}

/// Syntactic check applied to the `/start` argument before any lookup.
pub fn is_start_argument_valid(arg: &str) -> bool {
    arg.starts_with('+') && arg.chars().count() >= MIN_START_ARGUMENT_LEN
}
