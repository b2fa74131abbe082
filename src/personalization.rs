//! # Personalization Engine Module
//!
//! Re-scores an [`AnalysisResult`] against one user's health preferences.
//! Pure: the same result and preferences always give the same output, and
//! neither input is modified.
//!
//! ## Scoring
//!
//! - Start from `healthiness_rating`
//! - Subtract [`ALLERGY_PENALTY`] per allergy matching a listed allergen
//! - Subtract [`AVOID_PENALTY`] per avoided ingredient found in the ingredient text
//! - Clamp to 0..=10
//!
//! Dietary restrictions do not change the score; a contradiction only clears
//! `matches_preferences`. Restrictions without a marker table never fail.
//! Negated markers ("gluten-free") and plant products named after animal
//! ones ("coconut milk", "cocoa butter") are not contradictions.

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use crate::localization::t_args_lang;
use crate::model::{AnalysisResult, PersonalizedResult, UserHealthPreferences};

pub const ALLERGY_PENALTY: i32 = 3;
pub const AVOID_PENALTY: i32 = 2;

const VEGAN_MARKERS: &[&str] = &[
    "milk", "cream", "butter", "cheese", "whey", "casein", "lactose", "yogurt", "egg", "honey",
    "gelatin", "gelatine", "meat", "beef", "pork", "chicken", "fish", "anchovy", "carmine",
    "lanolin", "beeswax", "collagen",
];
const VEGETARIAN_MARKERS: &[&str] = &[
    "gelatin", "gelatine", "meat", "beef", "pork", "chicken", "fish", "anchovy", "carmine",
    "rennet", "lard", "collagen",
];
const GLUTEN_MARKERS: &[&str] = &["wheat", "barley", "rye", "malt", "spelt", "semolina", "gluten"];
const DAIRY_MARKERS: &[&str] = &["milk", "cream", "butter", "cheese", "whey", "casein", "lactose", "yogurt"];
const NUT_MARKERS: &[&str] = &[
    "peanut", "almond", "hazelnut", "walnut", "cashew", "pecan", "pistachio", "macadamia",
];
const HALAL_MARKERS: &[&str] = &["pork", "lard", "bacon", "ham", "gelatin", "wine", "rum", "beer", "ethanol"];
const KOSHER_MARKERS: &[&str] = &["pork", "lard", "bacon", "ham", "shellfish", "shrimp", "crab", "lobster"];
const SUGAR_MARKERS: &[&str] = &[
    "sugar", "syrup", "glucose", "fructose", "dextrose", "sucrose", "honey", "maltose",
];
const SODIUM_MARKERS: &[&str] = &["salt", "sodium", "monosodium glutamate", "msg"];

/// Marker table for a normalized dietary restriction
fn diet_markers(diet_key: &str) -> Option<&'static [&'static str]> {
    match diet_key {
        "vegan" | "plantbased" => Some(VEGAN_MARKERS),
        "vegetarian" => Some(VEGETARIAN_MARKERS),
        "glutenfree" | "celiac" | "coeliac" => Some(GLUTEN_MARKERS),
        "dairyfree" | "lactosefree" => Some(DAIRY_MARKERS),
        "nutfree" | "peanutfree" => Some(NUT_MARKERS),
        "halal" => Some(HALAL_MARKERS),
        "kosher" => Some(KOSHER_MARKERS),
        "lowsugar" | "sugarfree" => Some(SUGAR_MARKERS),
        _ => None,
    }
}

/// Health goal families and the advisory each one triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GoalAdvisory {
    Sugar,
    Sodium,
    Additives,
    Irritants,
}

impl GoalAdvisory {
    fn for_goal(goal: &str) -> Option<Self> {
        let goal = goal.to_lowercase().replace(['-', '_'], " ");
        let mentions = |phrases: &[&str]| phrases.iter().any(|phrase| goal.contains(phrase));

        if mentions(&["weight loss", "low sugar", "lose weight", "diabetes"]) {
            Some(Self::Sugar)
        } else if mentions(&["heart health", "low sodium", "blood pressure"]) {
            Some(Self::Sodium)
        } else if mentions(&["clean eating", "avoid additives", "natural"]) {
            Some(Self::Additives)
        } else if mentions(&["skin health", "sensitive skin"]) {
            Some(Self::Irritants)
        } else {
            None
        }
    }

    fn message_key(&self) -> &'static str {
        match self {
            Self::Sugar => "warning-goal-sugar",
            Self::Sodium => "warning-goal-sodium",
            Self::Additives => "warning-goal-additives",
            Self::Irritants => "warning-goal-irritants",
        }
    }

    /// The first ingredient that triggers this advisory
    fn trigger(&self, result: &AnalysisResult) -> Option<String> {
        match self {
            Self::Sugar => first_marker(&result.ingredients_text, SUGAR_MARKERS),
            Self::Sodium => first_marker(&result.ingredients_text, SODIUM_MARKERS),
            Self::Additives => result
                .additives
                .iter()
                .chain(result.preservatives.iter())
                .next()
                .cloned(),
            Self::Irritants => result.irritants.first().cloned(),
        }
    }
}

/// Marker occurrences that name a plant or mineral product, not the marker itself
const MARKER_EXCEPTIONS: &[(&str, &str)] = &[
    ("milk", "coconut milk"),
    ("milk", "almond milk"),
    ("milk", "oat milk"),
    ("milk", "soy milk"),
    ("milk", "rice milk"),
    ("cream", "coconut cream"),
    ("cream", "cream of tartar"),
    ("butter", "cocoa butter"),
    ("butter", "shea butter"),
    ("butter", "peanut butter"),
    ("butter", "almond butter"),
];

lazy_static! {
    static ref NON_ALPHANUMERIC: Regex = Regex::new(r"[^a-z0-9]+").expect("pattern should be valid");
    static ref NEGATION: Regex = Regex::new(r"(?i)^[\s-]*free\b").expect("negation pattern should be valid");
}

fn diet_key(diet: &str) -> String {
    NON_ALPHANUMERIC.replace_all(&diet.to_lowercase(), "").into_owned()
}

/// Whether the occurrence at `start..end` is part of an excepted phrase or negated ("gluten-free")
fn is_excepted(text: &str, lowered: &str, marker: &str, start: usize, end: usize) -> bool {
    if NEGATION.is_match(&text[end..]) {
        return true;
    }
    MARKER_EXCEPTIONS
        .iter()
        .filter(|(excepted, _)| *excepted == marker)
        .any(|(_, phrase)| {
            phrase.find(marker).map_or(false, |offset| {
                start
                    .checked_sub(offset)
                    .and_then(|from| lowered.get(from..from + phrase.len()))
                    .map_or(false, |window| window == *phrase)
            })
        })
}

/// First marker present in `text` as a whole word (plurals allowed), ignoring
/// negated and excepted occurrences
fn first_marker(text: &str, markers: &[&str]) -> Option<String> {
    let lowered = text.to_ascii_lowercase();
    markers
        .iter()
        .find(|marker| {
            let pattern = format!(r"(?i)\b{}(?:s|es)?\b", regex::escape(marker));
            Regex::new(&pattern).map_or(false, |re| {
                re.find_iter(text)
                    .any(|found| !is_excepted(text, &lowered, marker, found.start(), found.end()))
            })
        })
        .map(|marker| marker.to_string())
}

/// Case-insensitive containment in either direction
fn overlaps(left: &str, right: &str) -> bool {
    let left = left.to_lowercase();
    let right = right.to_lowercase();
    !left.is_empty() && !right.is_empty() && (left.contains(&right) || right.contains(&left))
}

/// Combines analysis results with a user's preference profile
#[derive(Debug, Clone, Default)]
pub struct PersonalizationEngine {
    language: Option<String>,
}

impl PersonalizationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine producing warnings in the given language
    pub fn with_language(language: impl Into<String>) -> Self {
        Self {
            language: Some(language.into()),
        }
    }

    fn text(&self, key: &str, args: &[(&str, &str)]) -> String {
        t_args_lang(key, args, self.language.as_deref())
    }

    pub fn personalize(&self, result: &AnalysisResult, preferences: &UserHealthPreferences) -> PersonalizedResult {
        let preferences = preferences.normalized();
        let mut score = i32::from(result.healthiness_rating);
        let mut warnings = Vec::new();

        // Allergies
        let mut allergen_hits = 0;
        for allergy in &preferences.allergies {
            if let Some(allergen) = result.allergens.iter().find(|allergen| overlaps(allergen, allergy)) {
                allergen_hits += 1;
                score -= ALLERGY_PENALTY;
                warnings.push(self.text(
                    "warning-allergen",
                    &[("allergen", allergen.as_str()), ("allergy", allergy.as_str())],
                ));
            }
        }

        // Avoided ingredients
        let ingredients_lower = result.ingredients_text.to_lowercase();
        for avoided in &preferences.avoid_ingredients {
            if ingredients_lower.contains(&avoided.to_lowercase()) {
                score -= AVOID_PENALTY;
                warnings.push(self.text("warning-avoid", &[("ingredient", avoided.as_str())]));
            }
        }

        // Dietary restrictions
        let certified: Vec<String> = result.certifications.iter().map(|c| diet_key(c)).collect();
        let mut matches_preferences = true;
        for diet in &preferences.dietary_restrictions {
            let key = diet_key(diet);
            if certified.contains(&key) {
                continue;
            }
            let Some(markers) = diet_markers(&key) else {
                debug!("No marker table for dietary restriction '{}'", diet);
                continue;
            };
            if let Some(marker) = first_marker(&result.ingredients_text, markers) {
                matches_preferences = false;
                warnings.push(self.text(
                    "warning-diet",
                    &[("diet", diet.as_str()), ("ingredient", marker.as_str())],
                ));
            }
        }

        // Health goals
        for goal in &preferences.health_goals {
            let Some(advisory) = GoalAdvisory::for_goal(goal) else {
                continue;
            };
            if let Some(ingredient) = advisory.trigger(result) {
                warnings.push(self.text(
                    advisory.message_key(),
                    &[("ingredient", ingredient.as_str()), ("goal", goal.as_str())],
                ));
            }
        }

        let safety_score_for_user = score.clamp(0, 10) as u8;
        let personalized_recommendation = self.recommend(
            result,
            safety_score_for_user,
            allergen_hits > 0,
            matches_preferences,
            warnings.first(),
        );

        debug!(
            "Personalized {}: safety {}/10, {} warnings, matches preferences: {}",
            result.history_key(),
            safety_score_for_user,
            warnings.len(),
            matches_preferences
        );

        PersonalizedResult {
            analysis: result.clone(),
            safety_score_for_user,
            matches_preferences,
            warnings_for_user: warnings,
            personalized_recommendation,
        }
    }

    fn recommend(
        &self,
        result: &AnalysisResult,
        score: u8,
        allergen_hit: bool,
        matches_preferences: bool,
        first_warning: Option<&String>,
    ) -> String {
        let base = result.recommendation.as_str();
        let reason = first_warning.map_or(base, String::as_str);

        if allergen_hit || score <= 3 {
            self.text("recommendation-avoid", &[("reason", reason)])
        } else if score <= 5 || first_warning.is_some() || !matches_preferences {
            self.text("recommendation-caution", &[("reason", reason)])
        } else if score >= 8 {
            self.text("recommendation-great", &[("base", base)])
        } else {
            self.text("recommendation-ok", &[("base", base)])
        }
    }
}

/// Personalize with English messages
pub fn personalize(result: &AnalysisResult, preferences: &UserHealthPreferences) -> PersonalizedResult {
    PersonalizationEngine::new().personalize(result, preferences)
}
