//! Near-duplicate detection over a bounded window of recent records.
//!
//! Every pair in the window is compared, so cost grows with the square of the
//! window size. Two cheap checks run before the full comparison: identical
//! token streams are caught by digest, and pairs whose length ratio alone
//! cannot reach the threshold are skipped.

use crate::error::StoreError;
use crate::models::{ContentRecord, RecordFilter, SimilarityPair};
use crate::traits::RecordStore;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use uuid::Uuid;

/// Similarity in [0, 1] between two texts, compared case-insensitively over
/// whitespace-separated tokens as `2 * LCS / (len_a + len_b)`.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let left = tokenize(a);
    let right = tokenize(b);
    token_similarity(&left, &right)
}

fn tokenize(text: &str) -> Vec<String> {
    text.trim()
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn token_similarity(left: &[String], right: &[String]) -> f64 {
    let total = left.len() + right.len();
    if total == 0 {
        return 1.0;
    }

    2.0 * longest_common_subsequence(left, right) as f64 / total as f64
}

fn longest_common_subsequence(left: &[String], right: &[String]) -> usize {
    let (outer, inner) = if left.len() >= right.len() {
        (left, right)
    } else {
        (right, left)
    };

    let mut previous = vec![0usize; inner.len() + 1];
    let mut current = vec![0usize; inner.len() + 1];
    for token in outer {
        for (index, other) in inner.iter().enumerate() {
            current[index + 1] = if token == other {
                previous[index] + 1
            } else {
                current[index].max(previous[index + 1])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[inner.len()]
}

struct Prepared {
    id: Uuid,
    tokens: Vec<String>,
    digest: Vec<u8>,
    empty_source: bool,
}

impl Prepared {
    fn new(id: Uuid, content: &str) -> Self {
        let tokens = tokenize(content);
        let mut hasher = Sha256::new();
        for token in &tokens {
            hasher.update(token.as_bytes());
            hasher.update([0u8]);
        }
        Self {
            id,
            tokens,
            digest: hasher.finalize().to_vec(),
            empty_source: content.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DuplicateDetector {
    pub threshold: f64,
    pub window: usize,
}

impl DuplicateDetector {
    pub fn new(threshold: f64, window: usize) -> Self {
        Self { threshold, window }
    }

    /// Reports every pair at or above the threshold. Nothing is deleted.
    pub fn find_duplicates(&self, records: &[ContentRecord]) -> Vec<SimilarityPair> {
        let prepared = records
            .iter()
            .take(self.window)
            .map(|record| Prepared::new(record.id, &record.content))
            .collect::<Vec<_>>();

        let mut pairs = Vec::new();
        for (index, left) in prepared.iter().enumerate() {
            for right in &prepared[index + 1..] {
                if let Some(score) = self.compare(left, right) {
                    pairs.push(SimilarityPair {
                        id_a: left.id,
                        id_b: right.id,
                        score,
                    });
                }
            }
        }

        pairs
    }

    fn compare(&self, left: &Prepared, right: &Prepared) -> Option<f64> {
        if left.empty_source || right.empty_source {
            return None;
        }

        let score = if left.digest == right.digest {
            1.0
        } else {
            let (shorter, longer) = if left.tokens.len() <= right.tokens.len() {
                (left.tokens.len(), right.tokens.len())
            } else {
                (right.tokens.len(), left.tokens.len())
            };
            let upper_bound = 2.0 * shorter as f64 / (shorter + longer) as f64;
            if upper_bound < self.threshold {
                return None;
            }
            token_similarity(&left.tokens, &right.tokens)
        };

        (score >= self.threshold).then_some(score)
    }

    /// Compares the most recent `window` records held by `store`.
    pub async fn scan(&self, store: &dyn RecordStore) -> Result<Vec<SimilarityPair>, StoreError> {
        let recent = store.list(&RecordFilter::default(), self.window, 0).await?;
        let pairs = self.find_duplicates(&recent);

        debug!(window = recent.len(), duplicates = pairs.len(), "duplicate scan finished");
        for pair in &pairs {
            warn!(
                id_a = %pair.id_a,
                id_b = %pair.id_b,
                similarity = pair.score,
                "duplicate content detected"
            );
        }

        Ok(pairs)
    }
}
