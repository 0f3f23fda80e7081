//! URL slug helpers used to match product pages to catalog entries.

/// Turn a product title into a URL slug.
///
/// Lowercases, replaces every run of non-alphanumeric ASCII characters with a
/// single `-`, and trims leading/trailing dashes.
///
/// ```
/// use union_bakery_core::slugify;
///
/// assert_eq!(slugify("  Red Velvet Cake! "), "red-velvet-cake");
/// assert_eq!(slugify("Crème brûlée"), "cr-me-br-l-e");
/// ```
#[must_use]
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;

    for c in value.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Normalise a product handle (or an incoming slug) for comparison.
#[must_use]
pub fn normalize_handle(value: &str) -> String {
    value.trim().trim_matches('/').to_lowercase()
}
