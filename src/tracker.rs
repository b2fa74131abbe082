//! # Intake Tracker Module
//!
//! SQLite-backed consumption history. Each completed analysis can be logged as
//! an immutable [`IntakeRecord`]; daily summaries, weekly reports and
//! per-product history are computed from the records at call time.
//!
//! ## Storage
//!
//! - `intake_log`: one row per consumed product, with JSON snapshots of the
//!   analysis and optional personalization
//! - `user_preferences`: the single saved preference profile
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings, so range
//! filters compare lexicographically. Days are UTC days. Product lookups go
//! through `product_key`, the history key folded with Unicode lowercasing in
//! Rust; SQLite's `LOWER` only folds ASCII.
//!
//! One connection sits behind a mutex: writes are serialized and each log is
//! a single transaction, so readers never see a partial record.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result as AnyResult};
use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, TimeZone, Utc};
use log::{debug, info, warn};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::errors::{PipelineError, Result};
use crate::model::{AnalysisResult, PersonalizedResult, UserHealthPreferences};
use crate::summary::{summarize_day, summarize_week, DailySummary, WeeklyReport, DAYS_PER_WEEK};

/// Opaque identifier of a logged record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntakeId(pub i64);

impl std::fmt::Display for IntakeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One consumed product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeRecord {
    pub id: IntakeId,
    pub timestamp: DateTime<Utc>,
    /// History key: the analysis product name, or the unnamed placeholder
    pub product_name: String,
    pub analysis: AnalysisResult,
    pub personalized: Option<PersonalizedResult>,
}

/// Fixed-width UTC timestamp, microsecond precision
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> AnyResult<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid stored timestamp '{raw}'"))?;
    Ok(parsed.with_timezone(&Utc))
}

/// Lookup key for a product name: trimmed, Unicode-lowercased
pub fn product_key(product_name: &str) -> String {
    product_name.trim().to_lowercase()
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

/// Initialize the database schema
pub fn init_database_schema(conn: &Connection) -> AnyResult<()> {
    info!("Initializing intake database schema...");

    conn.execute(
        "CREATE TABLE IF NOT EXISTS intake_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            product_name TEXT NOT NULL,
            product_key TEXT NOT NULL,
            product_type TEXT NOT NULL,
            healthiness_rating INTEGER NOT NULL,
            safety_score_for_user INTEGER,
            matches_preferences INTEGER,
            analysis_json TEXT NOT NULL,
            personalized_json TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )
    .context("Failed to create intake_log table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_intake_log_timestamp ON intake_log(timestamp)",
        [],
    )
    .context("Failed to create timestamp index")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_intake_log_product ON intake_log(product_key)",
        [],
    )
    .context("Failed to create product name index")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS user_preferences (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            allergies TEXT NOT NULL,
            dietary_restrictions TEXT NOT NULL,
            avoid_ingredients TEXT NOT NULL,
            health_goals TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )
    .context("Failed to create user_preferences table")?;

    info!("Intake database schema initialized successfully");
    Ok(())
}

/// Insert one record inside its own transaction
pub fn insert_record(
    conn: &mut Connection,
    analysis: &AnalysisResult,
    personalized: Option<&PersonalizedResult>,
    timestamp: &DateTime<Utc>,
) -> AnyResult<IntakeId> {
    let analysis_json = serde_json::to_string(analysis).context("Failed to serialize analysis snapshot")?;
    let personalized_json = personalized
        .map(serde_json::to_string)
        .transpose()
        .context("Failed to serialize personalization snapshot")?;

    let tx = conn.transaction().context("Failed to begin transaction")?;
    tx.execute(
        "INSERT INTO intake_log (
            timestamp, product_name, product_key, product_type, healthiness_rating,
            safety_score_for_user, matches_preferences, analysis_json,
            personalized_json, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            format_timestamp(timestamp),
            analysis.history_key(),
            product_key(analysis.history_key()),
            analysis.product_type.as_str(),
            analysis.healthiness_rating,
            personalized.map(|p| p.safety_score_for_user),
            personalized.map(|p| p.matches_preferences),
            analysis_json,
            personalized_json,
            format_timestamp(&Utc::now()),
        ],
    )
    .context("Failed to insert intake record")?;
    let id = tx.last_insert_rowid();
    tx.commit().context("Failed to commit intake record")?;

    Ok(IntakeId(id))
}

const RECORD_COLUMNS: &str = "id, timestamp, product_name, analysis_json, personalized_json";

type RawRecord = (i64, String, String, String, Option<String>);

fn raw_record(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode_record((id, timestamp, product_name, analysis_json, personalized_json): RawRecord) -> AnyResult<IntakeRecord> {
    let analysis: AnalysisResult = serde_json::from_str(&analysis_json)
        .with_context(|| format!("Corrupt analysis snapshot in record {id}"))?;
    let personalized = personalized_json
        .map(|json| serde_json::from_str::<PersonalizedResult>(&json))
        .transpose()
        .with_context(|| format!("Corrupt personalization snapshot in record {id}"))?;

    Ok(IntakeRecord {
        id: IntakeId(id),
        timestamp: parse_timestamp(&timestamp)?,
        product_name,
        analysis,
        personalized,
    })
}

/// Run a record query and decode every row
fn query_records<P: rusqlite::Params>(conn: &Connection, filter: &str, params: P) -> AnyResult<Vec<IntakeRecord>> {
    let sql = format!("SELECT {RECORD_COLUMNS} FROM intake_log {filter}");
    let mut stmt = conn.prepare(&sql).context("Failed to prepare record query")?;
    let rows = stmt
        .query_map(params, raw_record)
        .context("Failed to query intake records")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read intake records")?;

    rows.into_iter().map(decode_record).collect()
}

fn persistence(err: anyhow::Error) -> PipelineError {
    PipelineError::PersistenceFailure(format!("{err:#}"))
}

/// Persistent intake history
pub struct IntakeTracker {
    conn: Mutex<Connection>,
}

impl IntakeTracker {
    /// Open (or create) the history database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening intake database at {}", path.display());
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))
            .map_err(persistence)?;
        Self::with_connection(conn)
    }

    /// Throwaway in-memory history
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .context("Failed to open in-memory database")
            .map_err(persistence)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        init_database_schema(&conn).map_err(persistence)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| PipelineError::PersistenceFailure("database lock poisoned".to_string()))
    }

    /// Append a record timestamped now
    pub fn log(&self, analysis: &AnalysisResult, personalized: Option<&PersonalizedResult>) -> Result<IntakeId> {
        self.log_at(analysis, personalized, Utc::now())
    }

    /// Append a record with an explicit consumption time
    pub fn log_at(
        &self,
        analysis: &AnalysisResult,
        personalized: Option<&PersonalizedResult>,
        timestamp: DateTime<Utc>,
    ) -> Result<IntakeId> {
        let mut conn = self.conn()?;
        let id = insert_record(&mut conn, analysis, personalized, &timestamp).map_err(persistence)?;
        info!(
            "Logged intake {} for '{}' at {}",
            id,
            analysis.history_key(),
            format_timestamp(&timestamp)
        );
        Ok(id)
    }

    pub fn get(&self, id: IntakeId) -> Result<Option<IntakeRecord>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {RECORD_COLUMNS} FROM intake_log WHERE id = ?1");
        let raw = conn
            .query_row(&sql, params![id.0], raw_record)
            .optional()
            .context("Failed to read intake record")
            .map_err(persistence)?;

        raw.map(decode_record).transpose().map_err(persistence)
    }

    /// Records for a product, most recent first (case-insensitive exact match)
    pub fn history(&self, product_name: &str) -> Result<Vec<IntakeRecord>> {
        let conn = self.conn()?;
        let records = query_records(
            &conn,
            "WHERE product_key = ?1 ORDER BY timestamp DESC, id DESC",
            params![product_key(product_name)],
        )
        .map_err(persistence)?;
        debug!("Found {} history records for '{}'", records.len(), product_name);
        Ok(records)
    }

    /// Most recent record for a product, if it was consumed before
    pub fn last_consumed(&self, product_name: &str) -> Result<Option<IntakeRecord>> {
        let conn = self.conn()?;
        let mut records = query_records(
            &conn,
            "WHERE product_key = ?1 ORDER BY timestamp DESC, id DESC LIMIT 1",
            params![product_key(product_name)],
        )
        .map_err(persistence)?;
        Ok(records.pop())
    }

    /// Latest records across all products
    pub fn recent(&self, limit: usize) -> Result<Vec<IntakeRecord>> {
        let conn = self.conn()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        query_records(&conn, "ORDER BY timestamp DESC, id DESC LIMIT ?1", params![limit]).map_err(persistence)
    }

    /// Records in `[start, end)`, oldest first
    pub fn records_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<IntakeRecord>> {
        let conn = self.conn()?;
        query_records(
            &conn,
            "WHERE timestamp >= ?1 AND timestamp < ?2 ORDER BY timestamp ASC, id ASC",
            params![format_timestamp(&start), format_timestamp(&end)],
        )
        .map_err(persistence)
    }

    pub fn daily_summary(&self, date: NaiveDate) -> Result<DailySummary> {
        let start = day_start(date);
        let records = self.records_between(start, start + Duration::days(1))?;
        Ok(summarize_day(date, &records))
    }

    pub fn weekly_report(&self, week_start: NaiveDate) -> Result<WeeklyReport> {
        let start = day_start(week_start);
        let records = self.records_between(start, start + Duration::days(DAYS_PER_WEEK))?;
        Ok(summarize_week(week_start, &records))
    }

    /// Remove one record; false when it did not exist
    pub fn delete(&self, id: IntakeId) -> Result<bool> {
        let conn = self.conn()?;
        let rows_affected = conn
            .execute("DELETE FROM intake_log WHERE id = ?1", params![id.0])
            .context("Failed to delete intake record")
            .map_err(persistence)?;

        if rows_affected > 0 {
            info!("Deleted intake record {}", id);
        } else {
            info!("No intake record with ID {}", id);
        }
        Ok(rows_affected > 0)
    }

    /// Remove every record; refuses without explicit confirmation
    pub fn clear_history(&self, confirm: bool) -> Result<usize> {
        if !confirm {
            return Err(PipelineError::InvalidInput(
                "clearing history requires confirmation".to_string(),
            ));
        }
        let conn = self.conn()?;
        let removed = conn
            .execute("DELETE FROM intake_log", [])
            .context("Failed to clear intake history")
            .map_err(persistence)?;
        warn!("Cleared {} intake records", removed);
        Ok(removed)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM intake_log", [], |row| row.get(0))
            .context("Failed to count intake records")
            .map_err(persistence)?;
        Ok(count.max(0) as usize)
    }

    /// Replace the saved preference profile
    pub fn save_preferences(&self, preferences: &UserHealthPreferences) -> Result<()> {
        let preferences = preferences.normalized();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO user_preferences (
                id, allergies, dietary_restrictions, avoid_ingredients, health_goals, updated_at
            ) VALUES (1, ?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                allergies = excluded.allergies,
                dietary_restrictions = excluded.dietary_restrictions,
                avoid_ingredients = excluded.avoid_ingredients,
                health_goals = excluded.health_goals,
                updated_at = excluded.updated_at",
            params![
                serde_json::to_string(&preferences.allergies)?,
                serde_json::to_string(&preferences.dietary_restrictions)?,
                serde_json::to_string(&preferences.avoid_ingredients)?,
                serde_json::to_string(&preferences.health_goals)?,
                format_timestamp(&Utc::now()),
            ],
        )
        .context("Failed to save preferences")
        .map_err(persistence)?;

        info!("Saved user preferences");
        Ok(())
    }

    /// The saved preference profile, if any
    pub fn load_preferences(&self) -> Result<Option<UserHealthPreferences>> {
        let conn = self.conn()?;
        let raw: Option<(String, String, String, String)> = conn
            .query_row(
                "SELECT allergies, dietary_restrictions, avoid_ingredients, health_goals
                 FROM user_preferences WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .context("Failed to load preferences")
            .map_err(persistence)?;

        let Some((allergies, dietary_restrictions, avoid_ingredients, health_goals)) = raw else {
            return Ok(None);
        };
        Ok(Some(UserHealthPreferences {
            allergies: serde_json::from_str(&allergies)?,
            dietary_restrictions: serde_json::from_str(&dietary_restrictions)?,
            avoid_ingredients: serde_json::from_str(&avoid_ingredients)?,
            health_goals: serde_json::from_str(&health_goals)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_are_fixed_width() {
        let a = Utc.with_ymd_and_hms(2026, 1, 5, 9, 3, 7).unwrap();
        let b = a + Duration::microseconds(1);
        let a_str = format_timestamp(&a);
        let b_str = format_timestamp(&b);

        assert_eq!(a_str, "2026-01-05T09:03:07.000000Z");
        assert_eq!(a_str.len(), b_str.len());
        assert!(a_str < b_str);
        assert_eq!(parse_timestamp(&b_str).unwrap(), b);
    }

    #[test]
    fn test_product_key_folds_non_ascii() {
        assert_eq!(product_key("  ÉVIAN Eau Minérale "), "évian eau minérale");
        assert_eq!(product_key("Évian Eau Minérale"), product_key("ÉVIAN EAU MINÉRALE"));
    }

    #[test]
    fn test_schema_is_idempotent() -> AnyResult<()> {
        let conn = Connection::open_in_memory()?;
        init_database_schema(&conn)?;
        init_database_schema(&conn)?;
        Ok(())
    }

    #[test]
    fn test_clear_history_requires_confirmation() {
        let tracker = IntakeTracker::open_in_memory().unwrap();
        assert!(matches!(
            tracker.clear_history(false),
            Err(PipelineError::InvalidInput(_))
        ));
        assert_eq!(tracker.clear_history(true).unwrap(), 0);
    }
}
