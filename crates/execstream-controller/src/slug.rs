//! Slug derivation from resource names.

/// Maximum slug length, a DNS label.
pub const MAX_SLUG_LEN: usize = 63;

/// Derive a URL-safe slug from a display name.
///
/// Lowercases, turns spaces into hyphens, drops anything that is not a
/// letter, digit or hyphen, collapses hyphen runs and trims hyphens from
/// both ends. The result is cut to [`MAX_SLUG_LEN`] characters.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_hyphen = false;

    for c in name.to_lowercase().chars() {
        let c = if c == ' ' { '-' } else { c };
        if c == '-' {
            if !last_was_hyphen {
                slug.push('-');
            }
            last_was_hyphen = true;
        } else if c.is_alphanumeric() {
            slug.push(c);
            last_was_hyphen = false;
        }
    }

    let trimmed = slug.trim_matches('-');
    let truncated: String = trimmed.chars().take(MAX_SLUG_LEN).collect();
    truncated.trim_end_matches('-').to_string()
}
