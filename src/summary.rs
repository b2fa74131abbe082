//! # Intake Summary Module
//!
//! Daily and weekly aggregates over logged intake records. Everything here is
//! recomputed from the records on every call; nothing is cached.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{normalize_terms, ProductCategory, RatingBand};
use crate::tracker::{IntakeId, IntakeRecord};

/// One consumed product, as listed in a summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductEntry {
    pub id: IntakeId,
    pub timestamp: DateTime<Utc>,
    pub product_name: String,
    pub product_type: ProductCategory,
    pub healthiness_rating: u8,
    pub harmful_ingredients: Vec<String>,
    pub allergens: Vec<String>,
    /// Absent when the product was logged without preferences
    pub matches_preferences: Option<bool>,
    pub safety_score_for_user: Option<u8>,
}

impl From<&IntakeRecord> for ProductEntry {
    fn from(record: &IntakeRecord) -> Self {
        Self {
            id: record.id,
            timestamp: record.timestamp,
            product_name: record.product_name.clone(),
            product_type: record.analysis.product_type,
            healthiness_rating: record.analysis.healthiness_rating,
            harmful_ingredients: record.analysis.harmful_ingredients.clone(),
            allergens: record.analysis.allergens.clone(),
            matches_preferences: record.personalized.as_ref().map(|p| p.matches_preferences),
            safety_score_for_user: record.personalized.as_ref().map(|p| p.safety_score_for_user),
        }
    }
}

/// Aggregate health metrics over a set of records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeMetrics {
    pub total_products: usize,
    /// Mean healthiness rating, 2 decimals; 0 when nothing was logged
    pub avg_health_rating: f64,
    /// Products with at least one harmful ingredient
    pub harmful_count: usize,
    /// Products listing at least one allergen
    pub allergen_exposures: usize,
    /// Products logged with preferences they did not match
    pub preference_violations: usize,
    pub distinct_allergens: Vec<String>,
    /// Product count per rating band; every band is present
    pub rating_bands: BTreeMap<RatingBand, usize>,
}

impl IntakeMetrics {
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a IntakeRecord>,
    {
        let mut rating_bands: BTreeMap<RatingBand, usize> =
            RatingBand::ALL.iter().map(|band| (*band, 0)).collect();
        let mut total_products = 0;
        let mut rating_sum = 0u64;
        let mut harmful_count = 0;
        let mut allergen_exposures = 0;
        let mut preference_violations = 0;
        let mut allergens = Vec::new();

        for record in records {
            let analysis = &record.analysis;
            total_products += 1;
            rating_sum += u64::from(analysis.healthiness_rating);
            *rating_bands.entry(analysis.rating_band()).or_insert(0) += 1;

            if !analysis.harmful_ingredients.is_empty() {
                harmful_count += 1;
            }
            if !analysis.allergens.is_empty() {
                allergen_exposures += 1;
                allergens.extend(analysis.allergens.iter().cloned());
            }
            if record
                .personalized
                .as_ref()
                .is_some_and(|p| !p.matches_preferences)
            {
                preference_violations += 1;
            }
        }

        let avg_health_rating = if total_products == 0 {
            0.0
        } else {
            round2(rating_sum as f64 / total_products as f64)
        };

        Self {
            total_products,
            avg_health_rating,
            harmful_count,
            allergen_exposures,
            preference_violations,
            distinct_allergens: normalize_terms(allergens),
            rating_bands,
        }
    }
}

/// Everything consumed on one UTC day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub products: Vec<ProductEntry>,
    pub metrics: IntakeMetrics,
}

/// Per-day metrics inside a weekly report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetrics {
    pub date: NaiveDate,
    pub metrics: IntakeMetrics,
}

/// Seven days starting at `week_start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyReport {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    /// "YYYY-MM-DD to YYYY-MM-DD"
    pub period: String,
    pub metrics: IntakeMetrics,
    /// Exactly seven entries, one per day, including empty days
    pub daily_breakdown: Vec<DailyMetrics>,
}

pub const DAYS_PER_WEEK: i64 = 7;

/// Summarize the records of one day; records from other days are ignored
pub fn summarize_day(date: NaiveDate, records: &[IntakeRecord]) -> DailySummary {
    let day: Vec<&IntakeRecord> = records
        .iter()
        .filter(|record| record.timestamp.date_naive() == date)
        .collect();

    DailySummary {
        date,
        products: day.iter().map(|record| ProductEntry::from(*record)).collect(),
        metrics: IntakeMetrics::from_records(day.iter().copied()),
    }
}

/// Summarize the week beginning at `week_start`; records outside it are ignored
pub fn summarize_week(week_start: NaiveDate, records: &[IntakeRecord]) -> WeeklyReport {
    let week_end = week_start + Duration::days(DAYS_PER_WEEK - 1);
    let in_week = |record: &&IntakeRecord| {
        let date = record.timestamp.date_naive();
        date >= week_start && date <= week_end
    };

    let daily_breakdown = (0..DAYS_PER_WEEK)
        .map(|offset| {
            let date = week_start + Duration::days(offset);
            DailyMetrics {
                date,
                metrics: IntakeMetrics::from_records(
                    records.iter().filter(|record| record.timestamp.date_naive() == date),
                ),
            }
        })
        .collect();

    WeeklyReport {
        week_start,
        week_end,
        period: format!(
            "{} to {}",
            week_start.format("%Y-%m-%d"),
            week_end.format("%Y-%m-%d")
        ),
        metrics: IntakeMetrics::from_records(records.iter().filter(in_week)),
        daily_breakdown,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
