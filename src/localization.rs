//! # Localization Module
//!
//! Fluent message catalogues for every user-facing string: error explanations,
//! personal warnings, recommendations and CLI summaries. Catalogues are embedded
//! at compile time so the library works from any working directory.

use anyhow::Result;
use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource, FluentValue};
use lazy_static::lazy_static;
use log::{error, warn};
use std::collections::HashMap;
use unic_langid::LanguageIdentifier;

pub const DEFAULT_LANGUAGE: &str = "en";

const CATALOGUES: &[(&str, &str)] = &[
    ("en", include_str!("../locales/en/main.ftl")),
    ("fr", include_str!("../locales/fr/main.ftl")),
];

/// Localization manager holding one bundle per supported language
pub struct LocalizationManager {
    bundles: HashMap<String, FluentBundle<FluentResource>>,
}

impl LocalizationManager {
    /// Create a new localization manager with every embedded catalogue
    pub fn new() -> Result<Self> {
        let mut bundles = HashMap::new();

        for (language, source) in CATALOGUES {
            let locale: LanguageIdentifier = language.parse()?;
            let bundle = Self::create_bundle(&locale, source);
            bundles.insert(language.to_string(), bundle);
        }

        Ok(Self { bundles })
    }

    fn empty() -> Self {
        Self {
            bundles: HashMap::new(),
        }
    }

    /// Create a fluent bundle for a specific locale
    fn create_bundle(locale: &LanguageIdentifier, source: &str) -> FluentBundle<FluentResource> {
        let mut bundle = FluentBundle::new_concurrent(vec![locale.clone()]);
        // Plain terminal output; no bidi isolation marks around arguments
        bundle.set_use_isolating(false);

        let resource = match FluentResource::try_new(source.to_string()) {
            Ok(resource) => resource,
            Err((resource, errors)) => {
                warn!("Catalogue for {} has {} parse errors", locale, errors.len());
                resource
            }
        };
        if let Err(errors) = bundle.add_resource(resource) {
            warn!("Catalogue for {} has {} duplicate messages", locale, errors.len());
        }

        bundle
    }

    /// Whether a catalogue exists for the language (region subtags ignored)
    pub fn is_language_supported(&self, language: &str) -> bool {
        self.bundles.contains_key(&primary_subtag(language))
    }

    pub fn supported_languages(&self) -> Vec<&str> {
        let mut languages: Vec<&str> = self.bundles.keys().map(String::as_str).collect();
        languages.sort_unstable();
        languages
    }

    /// Get a localized message, falling back to English for unknown languages or keys
    pub fn get_message_in_language(
        &self,
        key: &str,
        language: &str,
        args: Option<&HashMap<&str, &str>>,
    ) -> String {
        let language = primary_subtag(language);
        let candidates = [language.as_str(), DEFAULT_LANGUAGE];

        for candidate in candidates {
            if let Some(message) = self.format(candidate, key, args) {
                return message;
            }
        }

        format!("Missing translation: {}", key)
    }

    fn format(&self, language: &str, key: &str, args: Option<&HashMap<&str, &str>>) -> Option<String> {
        let bundle = self.bundles.get(language)?;
        let pattern = bundle.get_message(key)?.value()?;

        let fluent_args = args.map(|args| {
            let mut fluent_args = FluentArgs::new();
            for (name, value) in args {
                fluent_args.set(*name, FluentValue::from(*value));
            }
            fluent_args
        });

        let mut errors = vec![];
        let value = bundle.format_pattern(pattern, fluent_args.as_ref(), &mut errors);
        if !errors.is_empty() {
            warn!("Formatting '{}' in {} reported {} errors", key, language, errors.len());
        }

        Some(value.into_owned())
    }
}

fn primary_subtag(language: &str) -> String {
    language
        .split(['-', '_'])
        .next()
        .unwrap_or(DEFAULT_LANGUAGE)
        .trim()
        .to_lowercase()
}

lazy_static! {
    static ref LOCALIZATION: LocalizationManager = LocalizationManager::new().unwrap_or_else(|err| {
        error!("Failed to initialize localization: {}", err);
        LocalizationManager::empty()
    });
}

/// Get the global localization manager
pub fn get_localization_manager() -> &'static LocalizationManager {
    &LOCALIZATION
}

/// Localized message in the given language (English when `None`)
pub fn t_lang(key: &str, language: Option<&str>) -> String {
    get_localization_manager().get_message_in_language(
        key,
        language.unwrap_or(DEFAULT_LANGUAGE),
        None,
    )
}

/// Localized message with string arguments in the given language
pub fn t_args_lang(key: &str, args: &[(&str, &str)], language: Option<&str>) -> String {
    let args_map: HashMap<&str, &str> = args.iter().cloned().collect();
    get_localization_manager().get_message_in_language(
        key,
        language.unwrap_or(DEFAULT_LANGUAGE),
        Some(&args_map),
    )
}
