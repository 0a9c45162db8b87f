use crate::error::IngestError;
use crate::models::{ContentMetadata, ContentType};
use regex::Regex;

pub const UNKNOWN: &str = "Unknown";

const KNOWN_MANUFACTURERS: [&str; 9] = [
    "whirlpool",
    "lg",
    "samsung",
    "ge",
    "kenmore",
    "maytag",
    "bosch",
    "electrolux",
    "frigidaire",
];

const CONTENT_TYPE_KEYWORDS: [(ContentType, &[&str]); 4] = [
    (
        ContentType::Troubleshooting,
        &["troubleshoot", "problem", "error", "issue"],
    ),
    (ContentType::Maintenance, &["maintenance", "clean", "service"]),
    (ContentType::Safety, &["safety", "warning", "caution"]),
    (ContentType::Warranty, &["warranty", "guarantee"]),
];

/// Derives manufacturer, model and content type tags from a filename and chunk text.
pub struct MetadataExtractor {
    brand_patterns: Vec<(&'static str, Regex)>,
    model_code: Regex,
    model_phrase: Regex,
    model_shape: Regex,
}

impl MetadataExtractor {
    pub fn new() -> Result<Self, IngestError> {
        // Short brands like "lg" and "ge" only count as whole words.
        let brand_patterns = KNOWN_MANUFACTURERS
            .iter()
            .map(|brand| Ok((*brand, Regex::new(&format!(r"(?i)(?:^|[^a-z]){brand}(?:[^a-z]|$)"))?)))
            .collect::<Result<Vec<_>, IngestError>>()?;

        Ok(Self {
            brand_patterns,
            model_code: Regex::new(r"(?i)\b([a-z]{2,}\d{3,}[a-z0-9]*)\b")?,
            model_phrase: Regex::new(r"(?i)\bmodel\s+([a-z0-9][a-z0-9\-]*)\b")?,
            model_shape: Regex::new(r"^[A-Za-z0-9\-_]+$")?,
        })
    }

    pub fn extract(&self, filename: &str, chunk_text: &str) -> ContentMetadata {
        ContentMetadata {
            manufacturer: self
                .find_manufacturer(filename)
                .or_else(|| self.find_manufacturer(chunk_text))
                .map(title_case)
                .unwrap_or_else(|| UNKNOWN.to_string()),
            model_series: self.find_model(chunk_text).unwrap_or_else(|| UNKNOWN.to_string()),
            content_type: classify_content(chunk_text),
            source_manual: filename.to_string(),
        }
    }

    fn find_manufacturer(&self, text: &str) -> Option<&'static str> {
        self.brand_patterns
            .iter()
            .find(|(_, pattern)| pattern.is_match(text))
            .map(|(brand, _)| *brand)
    }

    fn find_model(&self, text: &str) -> Option<String> {
        [&self.model_code, &self.model_phrase]
            .into_iter()
            .find_map(|pattern| pattern.captures(text))
            .and_then(|captures| captures.get(1))
            .map(|found| found.as_str().to_uppercase())
    }

    /// True when the manufacturer is known and the model looks like a real
    /// alphanumeric model code of at least three characters.
    pub fn validate_manufacturer_model(&self, manufacturer: &str, model_series: &str) -> bool {
        let manufacturer_valid = !manufacturer.trim().is_empty()
            && !manufacturer.eq_ignore_ascii_case(UNKNOWN);
        let model_valid = self.model_shape.is_match(model_series)
            && !model_series.eq_ignore_ascii_case(UNKNOWN)
            && model_series.chars().count() >= 3;

        manufacturer_valid && model_valid
    }
}

pub fn classify_content(text: &str) -> ContentType {
    let lowered = text.to_lowercase();
    CONTENT_TYPE_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| lowered.contains(keyword)))
        .map(|(content_type, _)| *content_type)
        .unwrap_or_default()
}

fn title_case(brand: &str) -> String {
    if brand.len() <= 2 {
        return brand.to_uppercase();
    }
    let mut chars = brand.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
