//! Filesystem-safe slugs for generated artifact names.
//!
//! Slugs keep `[A-Za-z0-9_-]`; every run of other characters collapses to a
//! single `_`. Leading/trailing underscores are trimmed and the result is
//! bounded in length, so a slug can never contain a path separator or `..`.

/// Maximum slug length in characters.
pub const MAX_SLUG_LEN: usize = 50;

/// Fallback when nothing usable remains.
pub const DEFAULT_SLUG: &str = "report";

fn is_slug_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Derive a slug from free text.
///
/// ```ignore
/// assert_eq!(slugify("Fe2O3 / spinel?"), "Fe2O3_spinel");
/// ```
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut in_run = false;
    for c in text.chars() {
        if is_slug_char(c) {
            slug.push(c);
            in_run = false;
        } else if !in_run {
            slug.push('_');
            in_run = true;
        }
    }
    let trimmed = slug.trim_matches('_');
    if trimmed.is_empty() {
        return DEFAULT_SLUG.to_string();
    }
    // ASCII only at this point, so byte and char offsets agree.
    trimmed[..trimmed.len().min(MAX_SLUG_LEN)].to_string()
}
