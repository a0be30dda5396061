/// Polynomial string hash over UTF-16 code units (`h = 31*h + unit`, wrapping).
///
/// Matches the hash the mobile client used when it first wrote favorites, so
/// keys derived here line up with document IDs that already exist in a mirror.
#[must_use]
pub fn string_hash(s: &str) -> i32 {
    s.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

/// Derive the composite key for a recipe from its title and source URL.
///
/// Missing parts render as `null`, so two recipes lacking both fields share
/// the key `null_null`.
#[must_use]
pub fn composite_key(label: Option<&str>, url: Option<&str>) -> String {
    let label = label.unwrap_or("null");
    match url {
        Some(url) => format!("{label}_{}", string_hash(url)),
        None => format!("{label}_null"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_hash_known_values() {
        assert_eq!(string_hash(""), 0);
        assert_eq!(string_hash("abc"), 96354);
        assert_eq!(string_hash("http://x/1"), 155_258_120);
        // Long inputs overflow and wrap negative
        assert_eq!(
            string_hash("https://www.edamam.com/recipe/soup"),
            -1_350_145_767
        );
    }

    #[test]
    fn test_composite_key_deterministic() {
        let a = composite_key(Some("Chicken Soup"), Some("http://x/1"));
        let b = composite_key(Some("Chicken Soup"), Some("http://x/1"));
        assert_eq!(a, b);
        assert_eq!(a, "Chicken Soup_155258120");
    }

    #[test]
    fn test_composite_key_distinguishes_url() {
        let a = composite_key(Some("Chicken Soup"), Some("http://x/1"));
        let b = composite_key(Some("Chicken Soup"), Some("http://x/2"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_composite_key_missing_parts() {
        assert_eq!(composite_key(None, None), "null_null");
        assert_eq!(composite_key(Some("Stew"), None), "Stew_null");
        assert_eq!(composite_key(None, Some("abc")), "null_96354");
    }
}
