//! # Label Parsing Module
//!
//! Regex-based recovery of structured fields from extracted label text: the
//! ingredients section, printed expiration and manufacture dates, and a product
//! name candidate.
//!
//! ## Features
//!
//! - Ingredient section detection from `ingredients:`, `contains:` and `composition:` markers
//! - Comma-rich sentence fallback when common ingredient terms appear
//! - Month-first date parsing with a day-first fallback, plus ISO dates
//! - Product name heuristic for short, comma-free header lines

use chrono::{Datelike, NaiveDate};
use lazy_static::lazy_static;
use log::{debug, trace};
use regex::Regex;

use crate::model::{ExtractionMethod, LabelText};

/// Date fragment: `12/31/2025`, `31-12-25`, `31.12.2025` or `2025-12-31`
const DATE_FRAGMENT: &str = r"(\d{4}-\d{1,2}-\d{1,2}|\d{1,2}[-/.]\d{1,2}[-/.]\d{2,4})";

/// Terms whose presence suggests a bare comma list is an ingredient list
const COMMON_INGREDIENT_TERMS: &[&str] = &["sugar", "water", "oil", "salt", "flour", "milk"];

/// Longest line, in words, still considered a product name
const MAX_NAME_WORDS: usize = 6;

lazy_static! {
    static ref INGREDIENT_MARKERS: Vec<Regex> = vec![
        Regex::new(
            r"(?is)\bingredients?\s*:?\s*([^.]+(?:\.[^.]*(?:oil|acid|extract|powder|flavou?r|colou?r)[^.]*)*)"
        )
        .expect("ingredients marker pattern should be valid"),
        Regex::new(r"(?is)\bcontains?\s*:?\s*([^.]+)")
            .expect("contains marker pattern should be valid"),
        Regex::new(r"(?is)\bcomposition\s*:?\s*([^.]+)")
            .expect("composition marker pattern should be valid"),
    ];
    static ref EXPIRATION_PATTERNS: Vec<Regex> = [
        r"(?i)\bexp(?:iry|iration)?(?:\s+date)?[:\s]+",
        r"(?i)\bbest\s+before(?:\s+end)?[:\s]+",
        r"(?i)\buse\s+by[:\s]+",
        r"(?i)\bbb[:\s]+",
    ]
    .iter()
    .map(|prefix| Regex::new(&format!("{prefix}{DATE_FRAGMENT}")).expect("expiration pattern should be valid"))
    .collect();
    static ref MANUFACTURE_PATTERNS: Vec<Regex> = [
        r"(?i)\bmfg(?:\s+date)?[:\s]+",
        r"(?i)\bmanuf(?:actured)?(?:\s+on)?[:\s]+",
        r"(?i)\bmfd[:\s]+",
    ]
    .iter()
    .map(|prefix| Regex::new(&format!("{prefix}{DATE_FRAGMENT}")).expect("manufacture pattern should be valid"))
    .collect();
    static ref MARKER_LINE: Regex = Regex::new(
        r"(?i)\b(?:ingredients?|contains?|composition|exp(?:iry|iration)?|best\s+before|use\s+by|mfg|mfd|manufactured|nutrition|net\s+w(?:eigh)?t)\b"
    )
    .expect("marker line pattern should be valid");
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("whitespace pattern should be valid");
}

/// Collapse runs of whitespace into single spaces
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Locate the ingredients section of a label
///
/// Tries the explicit markers in order, then a comma-rich sentence when common
/// ingredient terms appear. Returns `None` when nothing looks like a list.
pub fn extract_ingredients_section(text: &str) -> Option<String> {
    for pattern in INGREDIENT_MARKERS.iter() {
        if let Some(captures) = pattern.captures(text) {
            let section = collapse_whitespace(&captures[1]);
            if !section.is_empty() {
                trace!("Ingredients marker matched: {}", pattern.as_str());
                return Some(section);
            }
        }
    }

    let lower = text.to_lowercase();
    if COMMON_INGREDIENT_TERMS.iter().any(|term| lower.contains(term)) {
        for sentence in text.split('.') {
            if sentence.matches(',').count() >= 2 {
                debug!("Using comma-separated sentence as ingredients section");
                return Some(collapse_whitespace(sentence));
            }
        }
    }

    None
}

/// Parse a printed label date
///
/// ISO dates parse directly. Slash/dash/dot dates are read month-first, then
/// day-first when month-first is impossible. Two-digit years are 2000-based.
pub fn parse_label_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }

    let parts: Vec<u32> = raw
        .split(['-', '/', '.'])
        .map(|part| part.parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;
    let [first, second, year] = parts.as_slice() else {
        return None;
    };

    let year = if *year < 100 { 2000 + *year } else { *year };
    let year = i32::try_from(year).ok()?;

    NaiveDate::from_ymd_opt(year, *first, *second)
        .or_else(|| NaiveDate::from_ymd_opt(year, *second, *first))
}

fn first_date(text: &str, patterns: &[Regex]) -> Option<NaiveDate> {
    patterns.iter().find_map(|pattern| {
        pattern
            .captures_iter(text)
            .find_map(|captures| parse_label_date(&captures[1]))
    })
}

/// Expiration and manufacture dates printed on the label
pub fn extract_dates(text: &str) -> (Option<NaiveDate>, Option<NaiveDate>) {
    let expiration = first_date(text, &EXPIRATION_PATTERNS);
    let manufacture = first_date(text, &MANUFACTURE_PATTERNS);

    if let Some(date) = expiration {
        debug!("Found expiration date {} (year {})", date, date.year());
    }
    (expiration, manufacture)
}

/// First prominent line that reads like a product name
pub fn extract_product_name(text: &str) -> Option<String> {
    text.lines()
        .map(collapse_whitespace)
        .take_while(|line| !INGREDIENT_MARKERS[0].is_match(line))
        .find(|line| {
            line.chars().count() > 3
                && line.split_whitespace().count() <= MAX_NAME_WORDS
                && !line.contains(',')
                && !MARKER_LINE.is_match(line)
                && line.chars().filter(|c| c.is_alphabetic()).count() * 2 > line.chars().count()
        })
}

/// Build a `LabelText` from raw extractor output
pub fn parse_label(full_text: &str, method: ExtractionMethod, confidence: f64, duration_ms: u64) -> LabelText {
    let normalized = clean_lines(full_text);
    let ingredients_text =
        extract_ingredients_section(&normalized).unwrap_or_else(|| collapse_whitespace(&normalized));
    let (expiration_date, manufacture_date) = extract_dates(&normalized);
    let product_name = extract_product_name(&normalized);

    LabelText {
        full_text: normalized,
        ingredients_text,
        product_name,
        expiration_date,
        manufacture_date,
        method,
        confidence: confidence.clamp(0.0, 1.0),
        duration_ms,
    }
}

/// Trim every line and drop empty ones
pub fn clean_lines(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingredients_marker() {
        let text = "CHOCO BITES\nIngredients: Wheat flour, sugar, cocoa butter, palm oil. Best before 12/31/2025";
        assert_eq!(
            extract_ingredients_section(text).as_deref(),
            Some("Wheat flour, sugar, cocoa butter, palm oil")
        );
    }

    #[test]
    fn test_ingredients_continuation_sentence() {
        let text = "Ingredients: water, glycerin. Citric acid, fragrance. Made in France";
        assert_eq!(
            extract_ingredients_section(text).as_deref(),
            Some("water, glycerin. Citric acid, fragrance")
        );
    }

    #[test]
    fn test_contains_marker() {
        let text = "Contains: milk, soy";
        assert_eq!(extract_ingredients_section(text).as_deref(), Some("milk, soy"));
    }

    #[test]
    fn test_comma_sentence_fallback() {
        let text = "Carbonated water, Sugar, Citric acid, Natural flavors, Yellow 5";
        assert_eq!(extract_ingredients_section(text).as_deref(), Some(text));
    }

    #[test]
    fn test_no_ingredients_section() {
        assert_eq!(extract_ingredients_section("Shake well before use"), None);
    }

    #[test]
    fn test_parse_label_date_variants() {
        assert_eq!(parse_label_date("12/31/2025"), NaiveDate::from_ymd_opt(2025, 12, 31));
        assert_eq!(parse_label_date("31/12/2025"), NaiveDate::from_ymd_opt(2025, 12, 31));
        assert_eq!(parse_label_date("03-04-26"), NaiveDate::from_ymd_opt(2026, 3, 4));
        assert_eq!(parse_label_date("2025-06-01"), NaiveDate::from_ymd_opt(2025, 6, 1));
        assert_eq!(parse_label_date("45/45/2025"), None);
        assert_eq!(parse_label_date("soon"), None);
    }

    #[test]
    fn test_extract_dates() {
        let text = "MFG: 01/15/2025\nEXP: 01/15/2026";
        let (expiration, manufacture) = extract_dates(text);
        assert_eq!(expiration, NaiveDate::from_ymd_opt(2026, 1, 15));
        assert_eq!(manufacture, NaiveDate::from_ymd_opt(2025, 1, 15));

        let (expiration, _) = extract_dates("Best before: 2026-02-28");
        assert_eq!(expiration, NaiveDate::from_ymd_opt(2026, 2, 28));
    }

    #[test]
    fn test_extract_product_name() {
        let text = "Oat Crunch Granola\nIngredients: oats, honey, almonds";
        assert_eq!(extract_product_name(text).as_deref(), Some("Oat Crunch Granola"));

        let text = "Carbonated water, Sugar, Citric acid";
        assert_eq!(extract_product_name(text), None);

        let text = "500g\nIngredients: rice";
        assert_eq!(extract_product_name(text), None);
    }

    #[test]
    fn test_parse_label_falls_back_to_full_text() {
        let label = parse_label("  Shake well \n\n before use ", ExtractionMethod::Tesseract, 1.4, 12);
        assert_eq!(label.full_text, "Shake well\nbefore use");
        assert_eq!(label.ingredients_text, "Shake well before use");
        assert_eq!(label.confidence, 1.0);
        assert_eq!(label.duration_ms, 12);
    }
}
