// 🧹 Field Cleaning - normalizers for raw permit CSV cells
//
// Every function here takes the raw cell text and returns the cleaned value,
// or None / empty when the cell carries no usable data.

/// Placeholder pandas-era exports write for missing text cells
pub const NAN_PLACEHOLDER: &str = "nan";

/// Placeholder the source data uses for "no value"
pub const DASH_PLACEHOLDER: &str = "-";

/// Default country prefix for local phone numbers
pub const AU_COUNTRY_PREFIX: &str = "+61";

/// Phone numbers shorter than this (including the '+') are discarded
const MIN_PHONE_LEN: usize = 10;

/// Bare digit strings at least this long are assumed to be local numbers
const MIN_LOCAL_DIGITS: usize = 8;

/// Ratings accepted verbatim; anything else is treated as unknown
const VALID_RATINGS: [&str; 3] = ["3", "4", "5"];

fn is_blank(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed == DASH_PLACEHOLDER
}

// ============================================================================
// BUSINESS NAME
// ============================================================================

/// Trimmed business name, or None if the row has no usable name
pub fn clean_business_name(raw: Option<&str>) -> Option<String> {
    let name = raw?.trim();
    if name.is_empty() || name == NAN_PLACEHOLDER {
        return None;
    }
    Some(name.to_string())
}

// ============================================================================
// PHONE
// ============================================================================

/// Normalize a phone number to an E.164-like string with +61 as default.
///
/// Strips everything except digits and '+', rewrites a leading trunk '0' as
/// the country prefix, and prefixes bare local numbers. Results shorter than
/// ten characters are rejected.
pub fn clean_phone_number(raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    if is_blank(raw) {
        return None;
    }

    let mut cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();

    if let Some(rest) = cleaned.strip_prefix('0') {
        cleaned = format!("{AU_COUNTRY_PREFIX}{rest}");
    } else if !cleaned.starts_with('+') && cleaned.len() >= MIN_LOCAL_DIGITS {
        cleaned = format!("{AU_COUNTRY_PREFIX}{cleaned}");
    }

    (cleaned.len() >= MIN_PHONE_LEN).then_some(cleaned)
}

// ============================================================================
// RATING
// ============================================================================

/// Eat Safe rating: only "3", "4" or "5" survive.
///
/// "1" and "2" are nulled along with every other value. The source column
/// mixes ratings with unrelated text, so only the values seen as real ratings
/// in the export are trusted.
pub fn clean_rating(raw: Option<&str>) -> Option<u8> {
    let rating = raw?.trim();
    if VALID_RATINGS.contains(&rating) {
        rating.parse().ok()
    } else {
        None
    }
}

// ============================================================================
// PERMIT TYPES
// ============================================================================

/// Split a permit list cell such as `"Food Premises, Mobile Food Vendor"`
pub fn parse_permit_types(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    if is_blank(raw) {
        return Vec::new();
    }

    let trimmed = raw.trim();
    let unquoted = trimmed.strip_prefix('"').unwrap_or(trimmed);
    let unquoted = unquoted.strip_suffix('"').unwrap_or(unquoted);

    unquoted
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty() && *t != DASH_PLACEHOLDER)
        .map(str::to_string)
        .collect()
}

// ============================================================================
// SUBURB
// ============================================================================

/// Extract the suburb from the "X, Suburb Name" list format.
///
/// Only a value that splits into exactly two parts on ", " is unwrapped;
/// anything else is returned whole.
pub fn extract_suburb(raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    if is_blank(raw) {
        return None;
    }

    let suburb = raw.trim();
    if suburb.contains(", ") {
        let parts: Vec<&str> = suburb.split(", ").collect();
        if let [_, name] = parts.as_slice() {
            return Some(name.trim().to_string());
        }
    }

    Some(suburb.to_string())
}

// ============================================================================
// ADDRESS
// ============================================================================

/// Address line 1/2: trimmed, with placeholders mapped to None
pub fn clean_address_line(raw: Option<&str>) -> Option<String> {
    let line = raw?.trim();
    if line.is_empty() || line == NAN_PLACEHOLDER || line == DASH_PLACEHOLDER {
        return None;
    }
    Some(line.to_string())
}

/// Full address is kept even when empty
pub fn clean_full_address(raw: Option<&str>) -> String {
    raw.map(str::trim).unwrap_or_default().to_string()
}

/// Source row index: the leading integer of the cell ("12abc" -> 12, "7.0" -> 7).
/// Cells with no leading digits fall back to 0.
pub fn parse_original_index(raw: Option<&str>) -> i64 {
    let Some(s) = raw.map(str::trim) else {
        return 0;
    };

    let (sign, rest) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());

    rest[..end].parse::<i64>().map(|n| sign * n).unwrap_or(0)
}
