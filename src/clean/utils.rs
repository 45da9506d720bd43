/// Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() >= 2
        && ((trimmed.starts_with('"') && trimmed.ends_with('"'))
            || (trimmed.starts_with('\'') && trimmed.ends_with('\'')))
    {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// `clean_str`, with empty results (and a few textual nulls) mapped to missing.
pub fn clean_opt(raw: Option<&str>) -> Option<String> {
    let s = clean_str(raw?);
    if s.is_empty() || is_null_token(&s) {
        None
    } else {
        Some(s)
    }
}

/// Spellings of "no value" that show up in exported snapshots.
fn is_null_token(s: &str) -> bool {
    matches!(
        s.to_ascii_lowercase().as_str(),
        "nan" | "null" | "none" | "n/a"
    )
}
