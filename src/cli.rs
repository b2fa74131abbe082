//! Command-line surface: argument definitions and command execution.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use log::info;

use crate::analyzer::{OpenAiReasoner, RiskAnalyzer};
use crate::config::AppConfig;
use crate::extraction::{ConfiguredExtractor, ExtractionAdapter};
use crate::localization::{t_args_lang, t_lang};
use crate::model::{ExtractionMethod, UserHealthPreferences};
use crate::pipeline::{AnalysisPipeline, AnalysisReport, PipelineInput, RunContext, RunResult};
use crate::summary::IntakeMetrics;
use crate::tracker::{IntakeId, IntakeRecord, IntakeTracker};

#[derive(Debug, Parser)]
#[command(name = "ingredient-intel", version, about = "Analyze ingredient labels and track what you consume")]
pub struct Cli {
    /// Language for messages (en, fr)
    #[arg(long, global = true, env = "APP_LANGUAGE")]
    pub language: Option<String>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Intake history database
    #[arg(long, global = true, env = "INTAKE_DATABASE_PATH")]
    pub database: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Analyze one or more labels
    Analyze(AnalyzeArgs),
    /// Analyze labels and log them to the intake history
    Track(AnalyzeArgs),
    /// Replace the saved health preferences
    SetPreferences(PreferenceArgs),
    /// Show the saved health preferences
    ShowPreferences,
    /// Daily or weekly intake aggregates
    Summary {
        #[command(subcommand)]
        period: SummaryPeriod,
    },
    /// Every logged consumption of a product, most recent first
    History { product: String },
    /// Latest logged products
    Recent {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Delete one history entry
    Delete { id: i64 },
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Label images (JPEG, PNG, BMP, TIFF)
    #[arg(required_unless_present = "text", conflicts_with = "text")]
    pub images: Vec<PathBuf>,

    /// Label text instead of an image
    #[arg(long)]
    pub text: Option<String>,

    /// Product name when the label does not show one
    #[arg(long)]
    pub name: Option<String>,

    /// Extraction strategy (vision, tesseract)
    #[arg(long)]
    pub method: Option<ExtractionMethod>,

    /// Strategy to try once when the primary one is unavailable
    #[arg(long)]
    pub fallback: Option<ExtractionMethod>,

    /// Ignore saved preferences
    #[arg(long)]
    pub no_preferences: bool,
}

#[derive(Debug, Args)]
pub struct PreferenceArgs {
    #[arg(long = "allergy")]
    pub allergies: Vec<String>,
    #[arg(long = "diet")]
    pub dietary_restrictions: Vec<String>,
    #[arg(long = "avoid")]
    pub avoid_ingredients: Vec<String>,
    #[arg(long = "goal")]
    pub health_goals: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum SummaryPeriod {
    /// One UTC day
    Day {
        /// YYYY-MM-DD, defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Seven days from a start date
    Week {
        /// YYYY-MM-DD, defaults to this week's Monday
        #[arg(long)]
        start: Option<NaiveDate>,
    },
}

/// Execute a parsed command; `Ok(false)` means the command ran but failed
pub async fn execute(cli: Cli, mut config: AppConfig) -> Result<bool> {
    if let Some(language) = &cli.language {
        config.language = language.clone();
    }
    if let Some(database) = &cli.database {
        config.database_path = database.clone();
    }
    let lang = Some(config.language.as_str());

    match &cli.command {
        Command::Analyze(args) => analyze(&cli, &config, args, false).await,
        Command::Track(args) => analyze(&cli, &config, args, true).await,
        Command::SetPreferences(args) => {
            let tracker = open_tracker(&config)?;
            let preferences = UserHealthPreferences {
                allergies: args.allergies.clone(),
                dietary_restrictions: args.dietary_restrictions.clone(),
                avoid_ingredients: args.avoid_ingredients.clone(),
                health_goals: args.health_goals.clone(),
            };
            tracker.save_preferences(&preferences)?;
            println!("{}", t_lang("preferences-saved", lang));
            Ok(true)
        }
        Command::ShowPreferences => {
            let tracker = open_tracker(&config)?;
            match tracker.load_preferences()? {
                Some(preferences) if cli.json => println!("{}", serde_json::to_string_pretty(&preferences)?),
                Some(preferences) => print_preferences(&preferences),
                None => println!("{}", t_lang("preferences-empty", lang)),
            }
            Ok(true)
        }
        Command::Summary { period } => {
            let tracker = open_tracker(&config)?;
            let today = Utc::now().date_naive();
            match period {
                SummaryPeriod::Day { date } => {
                    let summary = tracker.daily_summary(date.unwrap_or(today))?;
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&summary)?);
                    } else {
                        let date = summary.date.to_string();
                        println!("{}", t_args_lang("summary-day-header", &[("date", date.as_str())], lang));
                        print_metrics(&summary.metrics, lang);
                    }
                }
                SummaryPeriod::Week { start } => {
                    let start = start.unwrap_or_else(|| current_week_start(today));
                    let report = tracker.weekly_report(start)?;
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    } else {
                        println!(
                            "{}",
                            t_args_lang("summary-week-header", &[("period", report.period.as_str())], lang)
                        );
                        print_metrics(&report.metrics, lang);
                    }
                }
            }
            Ok(true)
        }
        Command::History { product } => {
            let tracker = open_tracker(&config)?;
            let records = tracker.history(product)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("{}", t_args_lang("history-empty", &[("product", product.as_str())], lang));
            } else {
                records.iter().for_each(|record| print_record(record, lang));
            }
            Ok(true)
        }
        Command::Recent { limit } => {
            let tracker = open_tracker(&config)?;
            let records = tracker.recent(*limit)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("{}", t_lang("summary-empty", lang));
            } else {
                records.iter().for_each(|record| print_record(record, lang));
            }
            Ok(true)
        }
        Command::Delete { id } => {
            let tracker = open_tracker(&config)?;
            let id_text = id.to_string();
            if tracker.delete(IntakeId(*id))? {
                println!("{}", t_args_lang("record-deleted", &[("id", id_text.as_str())], lang));
                Ok(true)
            } else {
                println!("{}", t_args_lang("record-not-found", &[("id", id_text.as_str())], lang));
                Ok(false)
            }
        }
    }
}

fn open_tracker(config: &AppConfig) -> Result<IntakeTracker> {
    IntakeTracker::open(&config.database_path)
        .with_context(|| format!("Failed to open intake history at {}", config.database_path.display()))
}

fn current_week_start(today: NaiveDate) -> NaiveDate {
    today - Duration::days(i64::from(today.weekday().num_days_from_monday()))
}

async fn analyze(cli: &Cli, config: &AppConfig, args: &AnalyzeArgs, log_intake: bool) -> Result<bool> {
    let lang = Some(config.language.as_str());
    let method = args.method.unwrap_or(config.extraction.method);
    if method == ExtractionMethod::Text {
        bail!("--method must be 'vision' or 'tesseract'; use --text for literal label text");
    }

    let tracker = Arc::new(open_tracker(config)?);
    let preferences = if args.no_preferences {
        None
    } else {
        tracker.load_preferences()?
    };

    let mut pipeline = AnalysisPipeline::new(
        ExtractionAdapter::new(ConfiguredExtractor::for_method(config, method)?, config.extraction.clone()),
        RiskAnalyzer::new(OpenAiReasoner::from_config(config)?),
    )
    .with_tracker(Arc::clone(&tracker));
    if let Some(fallback) = args.fallback.filter(|fallback| *fallback != method) {
        info!("Configured {} extraction as fallback for {}", fallback, method);
        pipeline = pipeline.with_fallback(ExtractionAdapter::new(
            ConfiguredExtractor::for_method(config, fallback)?,
            config.extraction.clone(),
        ));
    }

    let mut ctx = RunContext::new(config.request_timeout())
        .with_logging(log_intake)
        .with_language(config.language.clone());
    if let Some(preferences) = preferences.filter(|p| !p.is_empty()) {
        ctx = ctx.with_preferences(preferences);
    }

    let inputs = read_inputs(args)?;
    let results: Vec<RunResult> = if inputs.len() == 1 {
        let mut inputs = inputs;
        match inputs.pop() {
            Some(input) => vec![pipeline.run(input, &ctx).await],
            None => Vec::new(),
        }
    } else {
        Arc::new(pipeline).run_batch(inputs, ctx).await
    };

    let mut all_succeeded = true;
    for result in &results {
        all_succeeded &= result.is_ok();
        if cli.json {
            println!("{}", AnalysisReport::from_result(result, lang).to_json()?);
        } else {
            print_result(result, lang);
        }
    }
    Ok(all_succeeded)
}

fn read_inputs(args: &AnalyzeArgs) -> Result<Vec<PipelineInput>> {
    let mut inputs = Vec::new();
    if let Some(text) = &args.text {
        inputs.push(PipelineInput::text(text.clone()));
    }
    for path in &args.images {
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read image {}", path.display()))?;
        inputs.push(PipelineInput::image(bytes));
    }
    if let Some(name) = &args.name {
        inputs = inputs.into_iter().map(|input| input.named(name.clone())).collect();
    }
    Ok(inputs)
}

fn print_result(result: &RunResult, lang: Option<&str>) {
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(failure) => {
            eprintln!("{}", failure.error.user_message(lang));
            return;
        }
    };
    let analysis = &outcome.analysis;
    let confidence = format!("{:.0}%", analysis.classification_confidence * 100.0);
    let rating = analysis.healthiness_rating.to_string();

    println!(
        "{}",
        t_args_lang(
            "analysis-header",
            &[
                ("product", analysis.history_key()),
                ("category", analysis.product_type.as_str()),
                ("confidence", confidence.as_str()),
            ],
            lang,
        )
    );
    println!("{}", t_args_lang("analysis-rating", &[("rating", rating.as_str())], lang));
    if !analysis.harmful_ingredients.is_empty() {
        let items = analysis.harmful_ingredients.join(", ");
        println!("{}", t_args_lang("analysis-harmful", &[("items", items.as_str())], lang));
    }
    if !analysis.allergens.is_empty() {
        let items = analysis.allergens.join(", ");
        println!("{}", t_args_lang("analysis-allergens", &[("items", items.as_str())], lang));
    }
    if let (false, Some(date)) = (analysis.expiration_valid, analysis.expiration_date) {
        let date = date.to_string();
        println!("{}", t_args_lang("analysis-expired", &[("date", date.as_str())], lang));
    }

    let recommendation = match &outcome.personalized {
        Some(personalized) => {
            let score = personalized.safety_score_for_user.to_string();
            println!("{}", t_args_lang("analysis-safety", &[("score", score.as_str())], lang));
            for warning in &personalized.warnings_for_user {
                println!("  - {warning}");
            }
            personalized.personalized_recommendation.as_str()
        }
        None => analysis.recommendation.as_str(),
    };
    println!("{}", t_args_lang("analysis-recommendation", &[("text", recommendation)], lang));

    if let Some(id) = outcome.intake_id {
        let id = id.to_string();
        println!("{}", t_args_lang("analysis-logged", &[("id", id.as_str())], lang));
    }
}

fn print_metrics(metrics: &IntakeMetrics, lang: Option<&str>) {
    if metrics.total_products == 0 {
        println!("{}", t_lang("summary-empty", lang));
        return;
    }
    let count = |key: &str, value: usize| {
        let value = value.to_string();
        println!("{}", t_args_lang(key, &[("count", value.as_str())], lang));
    };
    count("summary-total", metrics.total_products);
    let average = format!("{:.2}", metrics.avg_health_rating);
    println!("{}", t_args_lang("summary-average", &[("rating", average.as_str())], lang));
    count("summary-harmful", metrics.harmful_count);
    count("summary-allergens", metrics.allergen_exposures);
    count("summary-violations", metrics.preference_violations);
}

fn print_record(record: &IntakeRecord, lang: Option<&str>) {
    let timestamp = record.timestamp.format("%Y-%m-%d %H:%M").to_string();
    let id = record.id.to_string();
    let rating = record.analysis.healthiness_rating.to_string();
    println!(
        "{}",
        t_args_lang(
            "history-entry",
            &[
                ("timestamp", timestamp.as_str()),
                ("id", id.as_str()),
                ("product", record.product_name.as_str()),
                ("rating", rating.as_str()),
            ],
            lang,
        )
    );
}

fn print_preferences(preferences: &UserHealthPreferences) {
    let lines = [
        ("allergies", &preferences.allergies),
        ("diet", &preferences.dietary_restrictions),
        ("avoid", &preferences.avoid_ingredients),
        ("goals", &preferences.health_goals),
    ];
    for (label, values) in lines {
        println!("{label}: {}", values.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_track_with_text() {
        let cli = Cli::try_parse_from([
            "ingredient-intel",
            "track",
            "--text",
            "Ingredients: water, sugar",
            "--name",
            "Lemonade",
        ])
        .unwrap();

        match cli.command {
            Command::Track(args) => {
                assert_eq!(args.text.as_deref(), Some("Ingredients: water, sugar"));
                assert_eq!(args.name.as_deref(), Some("Lemonade"));
                assert!(args.images.is_empty());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_method_and_preferences() {
        let cli = Cli::try_parse_from(["ingredient-intel", "analyze", "label.jpg", "--method", "tesseract"]).unwrap();
        match cli.command {
            Command::Analyze(args) => assert_eq!(args.method, Some(ExtractionMethod::Tesseract)),
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::try_parse_from([
            "ingredient-intel",
            "set-preferences",
            "--allergy",
            "milk",
            "--allergy",
            "peanuts",
            "--diet",
            "vegan",
        ])
        .unwrap();
        match cli.command {
            Command::SetPreferences(args) => {
                assert_eq!(args.allergies, vec!["milk", "peanuts"]);
                assert_eq!(args.dietary_restrictions, vec!["vegan"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_analyze_requires_input() {
        assert!(Cli::try_parse_from(["ingredient-intel", "analyze"]).is_err());
    }

    #[test]
    fn test_week_starts_on_monday() {
        let thursday = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();
        assert_eq!(current_week_start(thursday), NaiveDate::from_ymd_opt(2026, 10, 12).unwrap());
    }
}
