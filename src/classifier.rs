//! # Product Classifier Module
//!
//! Deterministic lexicon scoring that infers whether a label belongs to a food,
//! drink or beauty product.
//!
//! ## Algorithm
//!
//! 1. Every category has a weighted term set. Terms match case-insensitively on
//!    word boundaries; each distinct term counts once.
//! 2. The category with the highest matched weight wins; ties resolve
//!    food > drink > beauty. Confidence is the winner's share of all matched weight.
//! 3. A secondary pass over the ingredients section looks for characteristic
//!    ingredients. Agreement raises confidence; a confident disagreement overrides
//!    a weak keyword result.
//!
//! No match at all yields `unknown` with confidence 0.

use lazy_static::lazy_static;
use log::{debug, trace};
use regex::Regex;

use crate::model::{CategoryScores, ClassificationResult, LabelText, ProductCategory};

/// Weighted terms suggesting a food product
const FOOD_TERMS: &[(&str, f64)] = &[
    ("nutrition facts", 2.0),
    ("serving size", 2.0),
    ("calories", 1.5),
    ("flour", 1.0),
    ("sugar", 1.0),
    ("salt", 1.0),
    ("bread", 1.5),
    ("cookie", 1.5),
    ("biscuit", 1.5),
    ("cake", 1.5),
    ("pasta", 1.5),
    ("rice", 1.0),
    ("cereal", 1.5),
    ("cheese", 1.0),
    ("meat", 1.0),
    ("chicken", 1.0),
    ("beef", 1.0),
    ("pork", 1.0),
    ("fish", 1.0),
    ("sauce", 1.0),
    ("snack", 1.5),
    ("chips", 1.5),
    ("chocolate", 1.0),
    ("candy", 1.5),
    ("protein", 1.0),
    ("allergen", 1.0),
    ("wheat", 1.0),
    ("soy", 1.0),
    ("milk", 1.0),
    ("nuts", 1.0),
    ("eggs", 1.0),
];

/// Weighted terms suggesting a drink
const DRINK_TERMS: &[(&str, f64)] = &[
    ("beverage", 2.0),
    ("carbonated", 2.0),
    ("energy drink", 2.0),
    ("sports drink", 2.0),
    ("vitamin water", 2.0),
    ("soda", 2.0),
    ("cola", 2.0),
    ("juice", 1.5),
    ("smoothie", 1.5),
    ("drink", 1.5),
    ("water", 1.0),
    ("tea", 1.0),
    ("coffee", 1.0),
    ("milk", 1.0),
    ("concentrate", 1.0),
    ("caffeine", 1.0),
    ("ml", 1.0),
    ("liter", 1.0),
    ("litre", 1.0),
    ("fl oz", 1.5),
    ("ounce", 0.5),
];

/// Weighted terms suggesting a beauty or personal-care product
const BEAUTY_TERMS: &[(&str, f64)] = &[
    ("cosmetic", 2.0),
    ("sunscreen", 2.0),
    ("spf", 2.0),
    ("shampoo", 2.0),
    ("conditioner", 2.0),
    ("moisturizer", 2.0),
    ("lipstick", 2.0),
    ("mascara", 2.0),
    ("deodorant", 2.0),
    ("antiperspirant", 2.0),
    ("body wash", 2.0),
    ("face wash", 2.0),
    ("skin care", 2.0),
    ("hair care", 2.0),
    ("dermatologist", 1.5),
    ("hypoallergenic", 1.5),
    ("lotion", 1.5),
    ("serum", 1.5),
    ("cleanser", 1.5),
    ("makeup", 1.5),
    ("foundation", 1.0),
    ("perfume", 1.5),
    ("fragrance", 1.0),
    ("toner", 1.0),
    ("essence", 1.0),
    ("mask", 1.0),
    ("scrub", 1.0),
    ("exfoliant", 1.5),
    ("oil-free", 1.0),
    ("beauty", 1.0),
    ("cream", 1.0),
    ("soap", 1.0),
    ("paraben", 1.5),
    ("sulfate", 1.0),
];

/// Characteristic ingredients, matched as substrings of the ingredients section
const BEAUTY_INDICATORS: &[&str] = &[
    "paraben",
    "sulfate",
    "glycerin",
    "dimethicone",
    "tocopherol",
    "retinol",
    "hyaluronic",
    "salicylic",
    "benzoyl",
    "cetyl",
    "stearyl",
    "phenoxyethanol",
];

const FOOD_INDICATORS: &[&str] = &[
    "sugar", "salt", "flour", "starch", "glucose", "fructose", "dextrose", "lactose", "maltose",
];

const DRINK_INDICATORS: &[&str] = &[
    "carbonated water",
    "concentrate",
    "citric acid",
    "ascorbic acid",
    "natural flavor",
    "artificial flavor",
];

struct Lexicon {
    category: ProductCategory,
    terms: Vec<(Regex, f64)>,
}

fn compile(category: ProductCategory, terms: &[(&str, f64)]) -> Lexicon {
    let terms = terms
        .iter()
        .map(|(term, weight)| {
            let pattern = format!(r"(?i)\b{}\b", regex::escape(term));
            (
                Regex::new(&pattern).expect("lexicon term pattern should be valid"),
                *weight,
            )
        })
        .collect();
    Lexicon { category, terms }
}

lazy_static! {
    static ref LEXICONS: Vec<Lexicon> = vec![
        compile(ProductCategory::Food, FOOD_TERMS),
        compile(ProductCategory::Drink, DRINK_TERMS),
        compile(ProductCategory::Beauty, BEAUTY_TERMS),
    ];
}

/// Tunables of the ingredient-indicator pass
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Confidence added when both passes agree
    pub agreement_boost: f64,
    /// Keyword confidence below which a disagreeing indicator pass wins
    pub override_threshold: f64,
    /// Confidence assigned when the indicator pass overrides
    pub override_confidence: f64,
    /// Indicator hits needed before the pass expresses an opinion
    pub min_indicator_hits: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            agreement_boost: 0.2,
            override_threshold: 0.5,
            override_confidence: 0.7,
            min_indicator_hits: 2,
        }
    }
}

/// Keyword and ingredient based product classifier
#[derive(Debug, Clone, Default)]
pub struct ProductClassifier {
    config: ClassifierConfig,
}

impl ProductClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Classify extracted label text
    pub fn classify(&self, label: &LabelText) -> ClassificationResult {
        let ingredients = Some(label.ingredients_text.as_str()).filter(|text| !text.trim().is_empty());
        self.classify_text(&label.full_text, ingredients)
    }

    /// Classify from the full text plus an optional ingredients section
    pub fn classify_text(&self, full_text: &str, ingredients_text: Option<&str>) -> ClassificationResult {
        let mut result = self.classify_by_keywords(full_text);
        let indicated = ingredients_text.and_then(|text| self.classify_by_ingredients(text));

        match indicated {
            Some(category) if category == result.category => {
                result.confidence = (result.confidence + self.config.agreement_boost).min(1.0);
            }
            Some(category) if result.confidence < self.config.override_threshold => {
                debug!(
                    "Ingredient indicators override keyword category {} with {}",
                    result.category, category
                );
                result.category = category;
                result.confidence = self.config.override_confidence;
            }
            _ => {}
        }

        result.confidence = round2(result.confidence.clamp(0.0, 1.0));
        debug!(
            "Classified as {} (confidence {:.2}, scores {:?})",
            result.category, result.confidence, result.scores
        );
        result
    }

    /// Lexicon pass alone
    pub fn classify_by_keywords(&self, text: &str) -> ClassificationResult {
        let mut scores = CategoryScores::default();

        for lexicon in LEXICONS.iter() {
            let score: f64 = lexicon
                .terms
                .iter()
                .filter(|(pattern, _)| pattern.is_match(text))
                .map(|(pattern, weight)| {
                    trace!("{} term matched: {}", lexicon.category, pattern.as_str());
                    weight
                })
                .sum();
            match lexicon.category {
                ProductCategory::Food => scores.food = score,
                ProductCategory::Drink => scores.drink = score,
                ProductCategory::Beauty => scores.beauty = score,
                ProductCategory::Unknown => {}
            }
        }

        let total = scores.total();
        if total <= 0.0 {
            return ClassificationResult::unknown();
        }

        let mut winner = ProductCategory::Food;
        for category in ProductCategory::RANKED {
            if scores.get(category) > scores.get(winner) {
                winner = category;
            }
        }

        ClassificationResult {
            category: winner,
            confidence: round2((scores.get(winner) / total).clamp(0.0, 1.0)),
            scores,
        }
    }

    /// Category suggested by characteristic ingredients, if any
    ///
    /// Beauty chemicals are checked first, then drink acids and flavors, then
    /// sugars and starches.
    pub fn classify_by_ingredients(&self, ingredients_text: &str) -> Option<ProductCategory> {
        let lower = ingredients_text.to_lowercase();
        let hits = |indicators: &[&str]| indicators.iter().filter(|ind| lower.contains(*ind)).count();

        let min = self.config.min_indicator_hits;
        if hits(BEAUTY_INDICATORS) >= min {
            Some(ProductCategory::Beauty)
        } else if hits(DRINK_INDICATORS) >= min {
            Some(ProductCategory::Drink)
        } else if hits(FOOD_INDICATORS) >= min {
            Some(ProductCategory::Food)
        } else {
            None
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
