//! Heuristic readability scoring for extracted chunks.

use crate::metadata::{MetadataExtractor, UNKNOWN};
use crate::models::{ContentRecord, ContentType};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

const DOMAIN_KEYWORDS: [&str; 20] = [
    "troubleshooting",
    "problem",
    "issue",
    "error",
    "solution",
    "maintenance",
    "cleaning",
    "service",
    "repair",
    "safety",
    "warning",
    "caution",
    "danger",
    "installation",
    "setup",
    "configuration",
    "washer",
    "washing",
    "machine",
    "appliance",
];

const ALLOWED_PUNCTUATION: &str = ".,!?;:'\"()-";

/// Scores text from 0.0 to 1.0.
///
/// Text whose trimmed length is under `min_text_length` scores 0.0. The
/// short-text penalty stays in force until the text is long enough without
/// its special characters, so padding with symbols never lifts it. The other
/// structural signals read the text with special characters stripped.
#[derive(Debug, Clone, Copy)]
pub struct QualityScorer {
    pub min_text_length: usize,
}

impl QualityScorer {
    pub fn new(min_text_length: usize) -> Self {
        Self { min_text_length }
    }

    pub fn score(&self, text: &str) -> f64 {
        let raw_len = text.trim().chars().count();
        if raw_len < self.min_text_length {
            return 0.0;
        }

        let clean = text
            .chars()
            .filter(|c| !is_special(*c))
            .collect::<String>();
        let clean_len = clean.trim().chars().count();

        let words = clean.split_whitespace().collect::<Vec<_>>();
        if words.is_empty() {
            return 0.0;
        }

        let mut score = 1.0;

        if clean_len < 100 {
            score -= 0.2;
        } else if raw_len > 2_000 {
            score -= 0.1;
        }

        let avg_word_len =
            words.iter().map(|word| word.chars().count()).sum::<usize>() as f64 / words.len() as f64;
        if avg_word_len < 3.0 {
            score -= 0.2;
        } else if avg_word_len > 8.0 {
            score -= 0.1;
        }

        let total_chars = text.chars().count() as f64;
        let special_chars = text.chars().filter(|c| is_special(*c)).count() as f64;
        if special_chars / total_chars > 0.05 {
            score -= 0.3;
        }

        let sentences = clean
            .split(|c: char| matches!(c, '.' | '!' | '?'))
            .map(str::trim)
            .filter(|sentence| !sentence.is_empty())
            .collect::<Vec<_>>();
        if !sentences.is_empty() {
            let avg_sentence_len = sentences
                .iter()
                .map(|sentence| sentence.split_whitespace().count())
                .sum::<usize>() as f64
                / sentences.len() as f64;
            if (3.0..=50.0).contains(&avg_sentence_len) {
                score += 0.1;
            } else {
                score -= 0.2;
            }
        }

        let alpha_chars = text.chars().filter(char::is_ascii_alphabetic).count() as f64;
        if alpha_chars / total_chars < 0.5 {
            score -= 0.2;
        }

        let lines = clean.split('\n').collect::<Vec<_>>();
        let unique_lines = lines.iter().collect::<HashSet<_>>().len();
        if (unique_lines as f64) < lines.len() as f64 * 0.8 {
            score -= 0.2;
        }

        let lowered = clean.to_lowercase();
        let keyword_hits = DOMAIN_KEYWORDS
            .iter()
            .filter(|keyword| lowered.contains(*keyword))
            .count();
        if keyword_hits > 0 {
            score += (keyword_hits as f64 * 0.05).min(0.2);
        }

        score.clamp(0.0, 1.0)
    }

    pub fn passes(&self, score: f64, threshold: f64) -> bool {
        score >= threshold
    }
}

fn is_special(c: char) -> bool {
    !(c.is_alphanumeric() || c == '_' || c.is_whitespace() || ALLOWED_PUNCTUATION.contains(c))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityMetrics {
    pub average_quality_score: f64,
    pub min_quality_score: f64,
    pub max_quality_score: f64,
    pub low_quality_items: usize,
    pub low_quality_threshold: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    NeedsAttention,
}

/// Corpus-wide quality summary over the structured store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityReport {
    pub generated_at: DateTime<Utc>,
    pub total_content_items: usize,
    pub content_type_distribution: BTreeMap<ContentType, usize>,
    pub manufacturer_distribution: BTreeMap<String, usize>,
    pub quality_metrics: QualityMetrics,
    pub items_added_last_24h: usize,
    /// Records whose manufacturer or model series did not validate.
    pub weak_metadata_items: usize,
    pub recommendations: Vec<String>,
    pub health_status: HealthStatus,
}

impl QualityReport {
    pub fn from_records(
        records: &[ContentRecord],
        low_quality_threshold: f64,
        metadata: &MetadataExtractor,
    ) -> Self {
        let now = Utc::now();
        let total = records.len();

        let mut content_type_distribution = BTreeMap::new();
        let mut manufacturer_distribution = BTreeMap::new();
        for record in records {
            *content_type_distribution.entry(record.content_type).or_insert(0) += 1;
            *manufacturer_distribution
                .entry(record.manufacturer.clone())
                .or_insert(0) += 1;
        }

        let scores = records.iter().map(|record| record.confidence_score);
        let (min, max, sum) = scores.fold((f64::MAX, f64::MIN, 0.0), |(min, max, sum), score| {
            (min.min(score), max.max(score), sum + score)
        });
        let low_quality_items = records
            .iter()
            .filter(|record| record.confidence_score < low_quality_threshold)
            .count();
        let cutoff = now - Duration::days(1);
        let items_added_last_24h = records
            .iter()
            .filter(|record| record.created_at >= cutoff)
            .count();

        let mut recommendations = Vec::new();
        if low_quality_items > 0 {
            recommendations.push(format!(
                "Consider reviewing {low_quality_items} items with quality scores below {low_quality_threshold}"
            ));
        }
        let unknown_manufacturers = manufacturer_distribution
            .get(UNKNOWN)
            .copied()
            .unwrap_or(0);
        if unknown_manufacturers as f64 > total as f64 * 0.1 {
            recommendations.push(format!(
                "High number of unknown manufacturers ({unknown_manufacturers}) - consider improving metadata extraction"
            ));
        }
        let weak_metadata_items = records
            .iter()
            .filter(|record| {
                !metadata.validate_manufacturer_model(&record.manufacturer, &record.model_series)
            })
            .count();
        if weak_metadata_items > 0 {
            recommendations.push(format!(
                "{weak_metadata_items} items lack a valid manufacturer and model series - consider improving metadata extraction"
            ));
        }

        let health_status = if (low_quality_items as f64) < total as f64 * 0.1 || total == 0 {
            HealthStatus::Healthy
        } else {
            HealthStatus::NeedsAttention
        };

        let round = |value: f64| (value * 1_000.0).round() / 1_000.0;
        let quality_metrics = if total == 0 {
            QualityMetrics {
                average_quality_score: 0.0,
                min_quality_score: 0.0,
                max_quality_score: 0.0,
                low_quality_items,
                low_quality_threshold,
            }
        } else {
            QualityMetrics {
                average_quality_score: round(sum / total as f64),
                min_quality_score: round(min),
                max_quality_score: round(max),
                low_quality_items,
                low_quality_threshold,
            }
        };

        Self {
            generated_at: now,
            total_content_items: total,
            content_type_distribution,
            manufacturer_distribution,
            quality_metrics,
            items_added_last_24h,
            weak_metadata_items,
            recommendations,
            health_status,
        }
    }
}
