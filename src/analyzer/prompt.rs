//! Prompt construction for the reasoning service, dispatched per product category.

use crate::model::{ClassificationResult, LabelText, ProductCategory};

pub const SYSTEM_PROMPT: &str = "You are an AI nutrition and cosmetic safety assistant with expertise in:
- Food safety regulations (FDA, EFSA, etc.)
- Cosmetic ingredient safety (INCI, EU Cosmetics Regulation)
- Allergen identification
- Health impact assessment
- Product certifications (Halal, Vegan, Organic, etc.)

Your role is to analyze ingredient lists and provide factual, evidence-based health and safety information.
Always base your analysis on scientific consensus and regulatory guidelines.
Be objective and avoid exaggeration - provide balanced assessments.";

const RESPONSE_FORMAT: &str = r#"Please provide a comprehensive analysis in the following JSON format:

{
  "harmful_ingredients": [],
  "additives": [],
  "preservatives": [],
  "irritants": [],
  "allergens": [],
  "chemicals": [],
  "certifications": [],
  "fda_approval": "Approved | Likely | Unverified | Not Approved",
  "healthiness_rating": 5,
  "recommendation": "",
  "health_suggestion": ""
}

Field meanings:
- harmful_ingredients: ingredients with known health risks
- additives: food or cosmetic additives (E-numbers, colorants)
- preservatives: preservatives identified
- irritants: potential skin or eye irritants
- allergens: common allergens (FDA top 9, EU top 14), including hidden sources
- chemicals: notable chemical compounds
- certifications: certifications likely based on the ingredients (Halal, Vegan, Gluten-Free)
- healthiness_rating: integer from 1 (very unhealthy) to 10 (very healthy)
- recommendation: brief recommendation, 1-2 sentences
- health_suggestion: practical health tip, 1-2 sentences

Important guidelines:
- Only list ingredients that are actually present
- Base ratings on scientific evidence and be conservative
- Consider the product type in your analysis"#;

const STRICT_SUFFIX: &str = "Your previous answer could not be used. Respond with ONE JSON object only, \
no Markdown, no commentary. Every list field must be an array of strings, \
healthiness_rating must be an integer between 1 and 10, and recommendation must not be empty.";

/// Product type wording used in the prompt
pub fn product_type_label(category: ProductCategory) -> &'static str {
    match category {
        ProductCategory::Unknown => "general",
        other => other.as_str(),
    }
}

/// Category-specific instructions
pub fn category_guidance(category: ProductCategory) -> &'static str {
    match category {
        ProductCategory::Food => {
            "This is a food product. Focus on sugars, sodium, saturated and trans fats, \
             artificial colors and E-number additives. Leave irritants empty unless an \
             ingredient is a known contact irritant."
        }
        ProductCategory::Drink => {
            "This is a drink. Focus on added sugars and sweeteners, caffeine, acids, \
             artificial colors and preservatives such as sodium benzoate. Leave irritants \
             empty unless an ingredient is a known contact irritant."
        }
        ProductCategory::Beauty => {
            "This is a beauty or personal-care product applied to skin or hair. Use INCI \
             names, focus on irritants, sensitizers, fragrance allergens, parabens, sulfates \
             and formaldehyde releasers. Rate healthiness as safety for topical use; do not \
             discuss nutrition."
        }
        ProductCategory::Unknown => {
            "The product type could not be determined. Assess the ingredients for both \
             ingestion and topical exposure."
        }
    }
}

/// User prompt for one label
pub fn build_prompt(label: &LabelText, classification: &ClassificationResult, strict: bool) -> String {
    let mut prompt = format!(
        "Analyze the following {} product ingredients:\n\nINGREDIENTS: {}\n",
        product_type_label(classification.category),
        label.ingredients_text.trim()
    );

    if let Some(name) = &label.product_name {
        prompt.push_str(&format!("PRODUCT NAME: {name}\n"));
    }
    if let Some(date) = label.expiration_date {
        prompt.push_str(&format!("EXPIRATION DATE: {}\n", date.format("%Y-%m-%d")));
    }

    prompt.push('\n');
    prompt.push_str(category_guidance(classification.category));
    prompt.push_str("\n\n");
    prompt.push_str(RESPONSE_FORMAT);

    if strict {
        prompt.push_str("\n\n");
        prompt.push_str(STRICT_SUFFIX);
    }
    prompt
}
