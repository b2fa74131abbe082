//! Response schema for the reasoning service and the strict decoder that turns
//! its untrusted JSON into a [`RiskReport`].

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::model::{normalize_terms, FdaApproval};

/// Rating used when the provider omits one
pub const DEFAULT_HEALTHINESS_RATING: u8 = 5;

/// Every list field of the report, in output order
pub const LIST_FIELDS: [&str; 7] = [
    "harmful_ingredients",
    "additives",
    "preservatives",
    "chemicals",
    "allergens",
    "irritants",
    "certifications",
];

/// Validated provider judgment, before it is combined with label data
#[derive(Debug, Clone, PartialEq)]
pub struct RiskReport {
    pub harmful_ingredients: Vec<String>,
    pub additives: Vec<String>,
    pub preservatives: Vec<String>,
    pub chemicals: Vec<String>,
    pub allergens: Vec<String>,
    pub irritants: Vec<String>,
    pub certifications: Vec<String>,
    pub fda_approval: FdaApproval,
    pub healthiness_rating: u8,
    pub recommendation: String,
    pub health_suggestion: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("response is not valid JSON: {0}")]
    NotJson(String),
    #[error("response is not a JSON object")]
    NotAnObject,
    #[error("field '{0}' is not an array of strings")]
    InvalidList(&'static str),
    #[error("healthiness_rating is not a number: {0}")]
    InvalidRating(String),
    #[error("recommendation is missing or empty")]
    MissingRecommendation,
}

/// JSON schema describing the expected response
pub fn risk_report_schema() -> Value {
    let string_list = json!({ "type": "array", "items": { "type": "string" } });
    json!({
        "type": "object",
        "properties": {
            "harmful_ingredients": string_list,
            "additives": string_list,
            "preservatives": string_list,
            "chemicals": string_list,
            "allergens": string_list,
            "irritants": string_list,
            "certifications": string_list,
            "fda_approval": {
                "type": "string",
                "enum": ["Approved", "Likely", "Unverified", "Not Approved"]
            },
            "healthiness_rating": { "type": "integer", "minimum": 1, "maximum": 10 },
            "recommendation": { "type": "string" },
            "health_suggestion": { "type": "string" }
        },
        "required": [
            "harmful_ingredients", "additives", "preservatives", "chemicals",
            "allergens", "irritants", "certifications", "fda_approval",
            "healthiness_rating", "recommendation", "health_suggestion"
        ]
    })
}

/// Remove a surrounding Markdown code fence, if any
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Decode and validate a provider response
pub fn parse_risk_report(raw: &str) -> Result<RiskReport, SchemaError> {
    let value: Value =
        serde_json::from_str(strip_code_fences(raw)).map_err(|e| SchemaError::NotJson(e.to_string()))?;
    let object = value.as_object().ok_or(SchemaError::NotAnObject)?;

    let recommendation = string_field(object, "recommendation");
    if recommendation.is_empty() {
        return Err(SchemaError::MissingRecommendation);
    }

    let healthiness_rating = match object.get("healthiness_rating") {
        None | Some(Value::Null) => DEFAULT_HEALTHINESS_RATING,
        Some(value) => coerce_rating(value)?,
    };

    let fda_approval = object
        .get("fda_approval")
        .and_then(Value::as_str)
        .map(FdaApproval::from_provider)
        .unwrap_or_default();

    Ok(RiskReport {
        harmful_ingredients: list_field(object, "harmful_ingredients")?,
        additives: list_field(object, "additives")?,
        preservatives: list_field(object, "preservatives")?,
        chemicals: list_field(object, "chemicals")?,
        allergens: list_field(object, "allergens")?,
        irritants: list_field(object, "irritants")?,
        certifications: list_field(object, "certifications")?,
        fda_approval,
        healthiness_rating,
        recommendation,
        health_suggestion: string_field(object, "health_suggestion"),
    })
}

/// Integer rating in [1, 10] from a number or numeric string
///
/// Fractions round to nearest, out-of-range values clamp.
pub fn coerce_rating(value: &Value) -> Result<u8, SchemaError> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|number| number.is_finite())
    .ok_or_else(|| SchemaError::InvalidRating(value.to_string()))?;

    Ok(number.round().clamp(1.0, 10.0) as u8)
}

fn list_field(object: &Map<String, Value>, field: &'static str) -> Result<Vec<String>, SchemaError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => {
            let items = items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or(SchemaError::InvalidList(field))?;
            Ok(normalize_terms(items))
        }
        Some(_) => Err(SchemaError::InvalidList(field)),
    }
}

fn string_field(object: &Map<String, Value>, field: &str) -> String {
    object
        .get(field)
        .and_then(Value::as_str)
        .map(|text| text.trim().to_string())
        .unwrap_or_default()
}
