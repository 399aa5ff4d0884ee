//! Canonical forms for the city/state strings that flow between search input,
//! the city directory, event rows and the coordinate cache.

use once_cell::sync::Lazy;
use regex::Regex;

static TRAILING_STATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+[A-Z]{2}$").expect("valid state suffix regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Trimmed, uppercased state code.
pub fn normalize_state(input: &str) -> String {
    input.trim().to_uppercase()
}

/// Strips state suffixes and stray whitespace from a city name.
///
/// `"St. Louis, MO"`, `"St. Louis MO"` and `"  St.   Louis "` all become
/// `"St. Louis"`. Case is preserved; this is the form sent to the city
/// directory as a search fragment.
pub fn clean_city(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let base = trimmed.split_once(',').map_or(trimmed, |(head, _)| head).trim();
    let without_state = TRAILING_STATE_RE.replace(base, "");
    WHITESPACE_RE
        .replace_all(without_state.trim(), " ")
        .into_owned()
}

/// Case-insensitive comparison key for a city name.
///
/// Builds on [`clean_city`], then lowercases and drops periods so that
/// `"St. Louis, MO"` and `"st louis"` compare equal.
pub fn city_key(input: &str) -> String {
    let cleaned = clean_city(input).to_lowercase().replace('.', " ");
    WHITESPACE_RE.replace_all(cleaned.trim(), " ").into_owned()
}

/// Cache key `"STATE|city"`, or `None` when either side normalizes to empty.
pub fn cache_key(state: &str, city: &str) -> Option<String> {
    let state = normalize_state(state);
    let city = city_key(city);
    if state.is_empty() || city.is_empty() {
        None
    } else {
        Some(format!("{state}|{city}"))
    }
}

/// True when two city/state pairs name the same place after normalization.
pub fn same_place(state_a: &str, city_a: &str, state_b: &str, city_b: &str) -> bool {
    normalize_state(state_a) == normalize_state(state_b) && city_key(city_a) == city_key(city_b)
}

/// Lowercase, whitespace-collapsed key used for duplicate detection and typeahead.
pub fn normalize_key(input: &str) -> String {
    WHITESPACE_RE
        .replace_all(&input.to_lowercase(), " ")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_is_trimmed_and_uppercased() {
        assert_eq!(normalize_state("  mo "), "MO");
        assert_eq!(normalize_state(""), "");
    }

    #[test]
    fn clean_city_strips_suffixes() {
        assert_eq!(clean_city("St. Louis, MO"), "St. Louis");
        assert_eq!(clean_city("Kansas City MO"), "Kansas City");
        assert_eq!(clean_city("  Boise,  ID, USA"), "Boise");
        assert_eq!(clean_city("New   York"), "New York");
        assert_eq!(clean_city("   "), "");
    }

    #[test]
    fn lowercase_suffix_is_part_of_the_name() {
        // only an uppercase two-letter token counts as a state abbreviation
        assert_eq!(clean_city("Ann Arbor mi"), "Ann Arbor mi");
    }

    #[test]
    fn city_keys_match_across_formatting() {
        assert_eq!(city_key("St. Louis, MO"), city_key("st louis"));
        assert_eq!(city_key("ST. LOUIS"), "st louis");
        assert_ne!(city_key("St. Louis"), city_key("St. Charles"));
    }

    #[test]
    fn cache_key_requires_both_parts() {
        assert_eq!(cache_key(" mo", "St. Louis, MO").as_deref(), Some("MO|st louis"));
        assert_eq!(cache_key("", "St. Louis"), None);
        assert_eq!(cache_key("MO", " , MO"), None);
    }

    #[test]
    fn same_place_ignores_case_and_suffix() {
        assert!(same_place("mo", "St. Louis, MO", "MO", "st louis"));
        assert!(!same_place("IL", "Belleville", "MO", "Belleville"));
    }

    #[test]
    fn normalize_key_collapses_whitespace() {
        assert_eq!(normalize_key("  The   Pageant "), "the pageant");
        assert_eq!(normalize_key(""), "");
    }
}
