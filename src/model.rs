//! # Label Analysis Data Model
//!
//! This module defines the value objects that flow through the analysis pipeline:
//! extracted label text, product classification, the validated risk report, user
//! health preferences and the personalized view of a report.
//!
//! ## Core Concepts
//!
//! - **LabelText**: text recovered from a label image (or supplied directly)
//! - **ClassificationResult**: inferred product category with a confidence
//! - **AnalysisResult**: the validated ingredient-risk report for one product
//! - **PersonalizedResult**: an analysis re-scored against one user's preferences
//!
//! All of these are produced once per pipeline run and never mutated afterwards.
//!
//! ## Usage
//!
//! ```rust
//! use ingredient_intel::model::{ProductCategory, RatingBand};
//!
//! assert_eq!(ProductCategory::Drink.as_str(), "drink");
//! assert_eq!(RatingBand::from_rating(4), RatingBand::Fair);
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Strategy used to obtain label text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    /// Networked vision model (high accuracy, needs credentials)
    Vision,
    /// Local Tesseract engine (free, lower accuracy)
    Tesseract,
    /// Literal text supplied by the caller, no extraction performed
    Text,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Vision => "vision",
            ExtractionMethod::Tesseract => "tesseract",
            ExtractionMethod::Text => "text",
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtractionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vision" | "openai" => Ok(ExtractionMethod::Vision),
            "tesseract" | "local" | "ocr" => Ok(ExtractionMethod::Tesseract),
            "text" => Ok(ExtractionMethod::Text),
            other => Err(format!(
                "unknown extraction method '{other}' (expected 'vision' or 'tesseract')"
            )),
        }
    }
}

/// Text recovered from an ingredient label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelText {
    /// Everything the extractor returned, whitespace-normalized
    pub full_text: String,

    /// The ingredients section of the label (falls back to `full_text`)
    pub ingredients_text: String,

    /// Product name, when one could be identified on the label
    pub product_name: Option<String>,

    /// Expiration / best-before date printed on the label
    pub expiration_date: Option<NaiveDate>,

    /// Manufacture date printed on the label
    pub manufacture_date: Option<NaiveDate>,

    /// Strategy that produced the text
    pub method: ExtractionMethod,

    /// Extractor confidence (0.0 to 1.0)
    pub confidence: f64,

    /// Wall-clock time spent extracting, in milliseconds
    pub duration_ms: u64,
}

impl LabelText {
    /// True when the extractor produced nothing usable
    pub fn is_empty(&self) -> bool {
        self.full_text.trim().is_empty()
    }
}

/// Closed set of product categories
///
/// The declaration order is also the tie-break precedence used by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductCategory {
    Food,
    Drink,
    Beauty,
    Unknown,
}

impl ProductCategory {
    /// Categories the classifier can actually pick, in precedence order
    pub const RANKED: [ProductCategory; 3] = [
        ProductCategory::Food,
        ProductCategory::Drink,
        ProductCategory::Beauty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductCategory::Food => "food",
            ProductCategory::Drink => "drink",
            ProductCategory::Beauty => "beauty",
            ProductCategory::Unknown => "unknown",
        }
    }

    /// Whether the product is ingested (food or drink)
    pub fn is_consumable(&self) -> bool {
        matches!(self, ProductCategory::Food | ProductCategory::Drink)
    }
}

impl fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "food" => Ok(ProductCategory::Food),
            "drink" | "beverage" => Ok(ProductCategory::Drink),
            "beauty" | "cosmetic" => Ok(ProductCategory::Beauty),
            "unknown" | "general" | "" => Ok(ProductCategory::Unknown),
            other => Err(format!("unknown product category '{other}'")),
        }
    }
}

/// Raw lexicon scores per category
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryScores {
    pub food: f64,
    pub drink: f64,
    pub beauty: f64,
}

impl CategoryScores {
    pub fn get(&self, category: ProductCategory) -> f64 {
        match category {
            ProductCategory::Food => self.food,
            ProductCategory::Drink => self.drink,
            ProductCategory::Beauty => self.beauty,
            ProductCategory::Unknown => 0.0,
        }
    }

    pub fn total(&self) -> f64 {
        self.food + self.drink + self.beauty
    }
}

/// Product category inferred from label text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: ProductCategory,

    /// Confidence in the category (0.0 to 1.0)
    pub confidence: f64,

    /// Matched lexicon weight per category
    pub scores: CategoryScores,
}

impl ClassificationResult {
    pub fn unknown() -> Self {
        Self {
            category: ProductCategory::Unknown,
            confidence: 0.0,
            scores: CategoryScores::default(),
        }
    }
}

/// Regulatory approval status reported by the reasoning service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FdaApproval {
    Approved,
    Likely,
    #[default]
    Unverified,
    NotApproved,
}

impl FdaApproval {
    /// Lenient parse of provider wording; anything unrecognised is `Unverified`
    pub fn from_provider(raw: &str) -> Self {
        let normalized: String = raw
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "approved" | "yes" | "fdaapproved" | "gras" => FdaApproval::Approved,
            "likely" | "likelyapproved" | "probable" => FdaApproval::Likely,
            "notapproved" | "notfound" | "banned" | "no" | "rejected" => FdaApproval::NotApproved,
            _ => FdaApproval::Unverified,
        }
    }
}

impl fmt::Display for FdaApproval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FdaApproval::Approved => "Approved",
            FdaApproval::Likely => "Likely",
            FdaApproval::Unverified => "Unverified",
            FdaApproval::NotApproved => "Not Approved",
        };
        f.write_str(label)
    }
}

/// Validated ingredient-risk report for one product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub product_name: Option<String>,
    pub product_type: ProductCategory,
    pub classification_confidence: f64,
    pub ingredients_text: String,
    pub expiration_date: Option<NaiveDate>,

    pub harmful_ingredients: Vec<String>,
    pub additives: Vec<String>,
    pub preservatives: Vec<String>,
    pub chemicals: Vec<String>,
    pub allergens: Vec<String>,
    pub irritants: Vec<String>,
    pub certifications: Vec<String>,

    pub fda_approval: FdaApproval,

    /// 1 (very unhealthy) to 10 (very healthy)
    pub healthiness_rating: u8,

    /// False only when the expiration date has already passed
    pub expiration_valid: bool,

    pub recommendation: String,
    pub health_suggestion: String,

    /// Model that produced the judgment, when the provider reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
}

impl AnalysisResult {
    /// Name used as the history key; unnamed products share one bucket
    pub fn history_key(&self) -> &str {
        self.product_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(UNNAMED_PRODUCT)
    }

    pub fn rating_band(&self) -> RatingBand {
        RatingBand::from_rating(self.healthiness_rating)
    }
}

/// Placeholder product name for labels without an identifiable name
pub const UNNAMED_PRODUCT: &str = "Unnamed product";

/// One user's declared health profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserHealthPreferences {
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub dietary_restrictions: Vec<String>,
    #[serde(default)]
    pub avoid_ingredients: Vec<String>,
    #[serde(default)]
    pub health_goals: Vec<String>,
}

impl UserHealthPreferences {
    pub fn is_empty(&self) -> bool {
        self.allergies.is_empty()
            && self.dietary_restrictions.is_empty()
            && self.avoid_ingredients.is_empty()
            && self.health_goals.is_empty()
    }

    /// Copy with every list trimmed and de-duplicated
    pub fn normalized(&self) -> Self {
        Self {
            allergies: normalize_terms(self.allergies.iter().cloned()),
            dietary_restrictions: normalize_terms(self.dietary_restrictions.iter().cloned()),
            avoid_ingredients: normalize_terms(self.avoid_ingredients.iter().cloned()),
            health_goals: normalize_terms(self.health_goals.iter().cloned()),
        }
    }
}

/// An analysis re-scored against a user's preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalizedResult {
    #[serde(flatten)]
    pub analysis: AnalysisResult,

    /// 0 (unsafe for this user) to 10
    pub safety_score_for_user: u8,

    pub matches_preferences: bool,

    /// Allergen hits first, then avoided ingredients, diet conflicts, goal advisories
    pub warnings_for_user: Vec<String>,

    pub personalized_recommendation: String,
}

/// Coarse recommendation class derived from a healthiness rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingBand {
    Excellent,
    Good,
    Fair,
    Poor,
    VeryPoor,
}

impl RatingBand {
    pub const ALL: [RatingBand; 5] = [
        RatingBand::Excellent,
        RatingBand::Good,
        RatingBand::Fair,
        RatingBand::Poor,
        RatingBand::VeryPoor,
    ];

    pub fn from_rating(rating: u8) -> Self {
        match rating {
            8..=u8::MAX => RatingBand::Excellent,
            6..=7 => RatingBand::Good,
            4..=5 => RatingBand::Fair,
            2..=3 => RatingBand::Poor,
            _ => RatingBand::VeryPoor,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RatingBand::Excellent => "excellent",
            RatingBand::Good => "good",
            RatingBand::Fair => "fair",
            RatingBand::Poor => "poor",
            RatingBand::VeryPoor => "very_poor",
        }
    }
}

/// Trim, drop empties and de-duplicate case-insensitively, keeping first-seen order
pub fn normalize_terms<I>(terms: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    terms
        .into_iter()
        .map(|term| term.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|term| !term.is_empty())
        .filter(|term| seen.insert(term.to_lowercase()))
        .collect()
}
