//! Slug normalization shared by pages and link candidates.
//!
//! A slug is the natural key of a cached page and of a link candidate, so the
//! same entity text must always collapse to the same slug: "Sleep Training",
//! "sleep training" and "sleep-training" all map to `sleep-training`.

use slug::slugify as ascii_slugify;

/// Normalize free text into a slug. Returns an empty string when the input has
/// no representable characters.
pub fn slugify(text: &str) -> String {
    ascii_slugify(text.trim())
}

/// Turn a slug back into a human-readable topic query.
pub fn deslugify(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether the text is already a normalized slug.
pub fn is_normalized(slug: &str) -> bool {
    !slug.is_empty() && slugify(slug) == slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_collapses_variants() {
        assert_eq!(slugify("Sleep Training"), "sleep-training");
        assert_eq!(slugify("  sleep   training "), "sleep-training");
        assert_eq!(slugify("sleep-training"), "sleep-training");
        assert_eq!(slugify("Teething!"), "teething");
    }

    #[test]
    fn test_slugify_empty() {
        assert_eq!(slugify("   "), "");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_deslugify() {
        assert_eq!(deslugify("sleep-training"), "sleep training");
        assert_eq!(deslugify("baby_led--weaning"), "baby led weaning");
    }

    #[test]
    fn test_is_normalized() {
        assert!(is_normalized("teething"));
        assert!(!is_normalized("Teething"));
        assert!(!is_normalized(""));
    }
}
