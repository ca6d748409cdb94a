//! Project name derivation from a localized name.

use crate::constants::SLUG_MAX_LEN;
use once_cell::sync::Lazy;
use pinyin::ToPinyin;
use regex::Regex;
use uuid::Uuid;

static NON_SLUG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("Invalid slug regex"));

/// Han characters become toneless pinyin syllables, one per character.
fn transliterate(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c.to_pinyin() {
            Some(syllable) => {
                out.push('-');
                out.push_str(syllable.plain());
                out.push('-');
            }
            None => out.push(c),
        }
    }
    out
}

/// Lowercase ASCII slug: Han characters are spelled out in pinyin, runs of
/// anything outside `[a-z0-9]` become one hyphen, edges are trimmed, and the
/// result is capped at 50 characters.
///
/// Returns an empty string when nothing slug-safe remains.
pub fn slugify(text: &str) -> String {
    let lowered = transliterate(text).to_lowercase();
    let replaced = NON_SLUG.replace_all(&lowered, "-");
    let trimmed = replaced.trim_matches('-');
    let capped: String = trimmed.chars().take(SLUG_MAX_LEN).collect();
    capped.trim_end_matches('-').to_string()
}

/// `project-` followed by six random lowercase hex characters.
pub fn fallback_slug() -> String {
    let hex = Uuid::now_v7().simple().to_string();
    format!("project-{}", &hex[hex.len() - 6..])
}

/// Slug of `text`, or a random fallback if the slug would be empty.
pub fn project_name_from(text: &str) -> String {
    let slug = slugify(text);
    if slug.is_empty() {
        fallback_slug()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_collapses_and_trims() {
        assert_eq!(slugify("  Hai Yang -- 2024!! "), "hai-yang-2024");
        assert_eq!(slugify("Taipower_Offshore"), "taipower-offshore");
    }

    #[test]
    fn test_slugify_spells_han_in_pinyin() {
        assert_eq!(slugify("海洋"), "hai-yang");
        assert_eq!(slugify("海洋 Wind 1"), "hai-yang-wind-1");
        assert_eq!(project_name_from("海洋"), "hai-yang");
    }

    #[test]
    fn test_slugify_drops_other_scripts() {
        assert_eq!(slugify("Ωmega"), "mega");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_fallback_shape() {
        let name = project_name_from("");
        assert!(name.starts_with("project-"));
        assert_eq!(name.len(), "project-".len() + 6);

        let name = project_name_from("~~~");
        assert!(name.starts_with("project-"));
        assert_eq!(name.len(), "project-".len() + 6);
    }

    #[test]
    fn test_slug_is_capped() {
        let long = "a".repeat(80);
        assert_eq!(slugify(&long).len(), SLUG_MAX_LEN);
        let dashed = format!("{}-b", "a".repeat(49));
        assert_eq!(slugify(&dashed), "a".repeat(49));
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_slug_is_url_safe(text in ".{0,120}") {
            let slug = slugify(&text);
            prop_assert!(slug.len() <= SLUG_MAX_LEN);
            prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            prop_assert!(!slug.starts_with('-'));
            prop_assert!(!slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
        }
    }
}
