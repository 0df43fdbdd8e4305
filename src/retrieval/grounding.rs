//! Grounding check: a lightweight hallucination detector run over the
//! formatted response text against the chunks that were actually
//! retrieved, not a judgment about the chunks themselves.

use crate::embedding::cosine_similarity;
use crate::retrieval::chunk::tokenize;
use std::collections::BTreeSet;

/// Minimum fraction of a sentence's content words that must appear in the
/// retrieved-doc vocabulary for that sentence to count as grounded.
const MIN_GROUNDED_RATIO: f32 = 0.5;

/// Tokens at or below this length don't count as content words for
/// keyword-overlap or grounding scoring.
const MIN_WORD_LENGTH: usize = 3;

/// Thresholds below which each signal counts as "ungrounded".
#[derive(Debug, Clone, Copy)]
pub struct GroundingThresholds {
    /// Minimum acceptable semantic similarity.
    pub similarity: f32,
    /// Minimum acceptable keyword overlap.
    pub keyword_overlap: f32,
}

impl Default for GroundingThresholds {
    fn default() -> Self {
        Self {
            similarity: 0.5,
            keyword_overlap: 0.3,
        }
    }
}

/// Outcome of a grounding check.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundingResult {
    /// Whether two or more signals fell below their thresholds.
    pub possible_hallucination: bool,
    /// `1.0 - average(signal scores)`, or `1.0` when no signals could be
    /// computed at all (empty response or no retrieved docs).
    pub confidence: f32,
    /// Max cosine similarity against retrieved-doc embeddings, if any were
    /// supplied.
    pub semantic_similarity: Option<f32>,
    /// Fraction of long response tokens present in the retrieved-doc
    /// vocabulary.
    pub keyword_overlap: f32,
    /// Fraction of response sentences whose long tokens are majority
    /// present in the retrieved-doc vocabulary.
    pub grounded_ratio: f32,
}

/// Runs the three-signal grounding check described in
/// [`GroundingResult`]'s fields.
///
/// `response_embedding` and `doc_embeddings` are optional: when absent, the
/// semantic-similarity signal is skipped and decision-making falls back to
/// the remaining two signals.
#[must_use]
pub fn detect(
    response: &str,
    doc_texts: &[String],
    response_embedding: Option<&[f32]>,
    doc_embeddings: &[Vec<f32>],
    thresholds: GroundingThresholds,
) -> GroundingResult {
    if response.trim().is_empty() || doc_texts.is_empty() {
        return GroundingResult {
            possible_hallucination: true,
            confidence: 1.0,
            semantic_similarity: None,
            keyword_overlap: 0.0,
            grounded_ratio: 0.0,
        };
    }

    let doc_tokens: BTreeSet<String> = doc_texts.iter().flat_map(|t| tokenize(t)).collect();

    let semantic_similarity = response_embedding.and_then(|r| {
        doc_embeddings
            .iter()
            .map(|d| cosine_similarity(r, d))
            .fold(None, |acc: Option<f32>, s| Some(acc.map_or(s, |a| a.max(s))))
    });

    let keyword_overlap = check_keyword_overlap(response, &doc_tokens);
    let grounded_ratio = check_grounding(response, &doc_tokens);

    let mut signal_scores = vec![keyword_overlap, grounded_ratio];
    let mut below_threshold = 0usize;
    if keyword_overlap < thresholds.keyword_overlap {
        below_threshold += 1;
    }
    if grounded_ratio < MIN_GROUNDED_RATIO {
        below_threshold += 1;
    }
    if let Some(sim) = semantic_similarity {
        signal_scores.push(sim);
        if sim < thresholds.similarity {
            below_threshold += 1;
        }
    }

    let confidence = if signal_scores.is_empty() {
        1.0
    } else {
        1.0 - signal_scores.iter().sum::<f32>() / signal_scores.len() as f32
    };

    GroundingResult {
        possible_hallucination: below_threshold >= 2,
        confidence,
        semantic_similarity,
        keyword_overlap,
        grounded_ratio,
    }
}

fn check_keyword_overlap(response: &str, doc_tokens: &BTreeSet<String>) -> f32 {
    let response_words: Vec<String> = response
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > MIN_WORD_LENGTH)
        .map(str::to_lowercase)
        .collect();
    if response_words.is_empty() {
        return 0.0;
    }
    let matched = response_words.iter().filter(|w| doc_tokens.contains(*w)).count();
    matched as f32 / response_words.len() as f32
}

fn check_grounding(response: &str, doc_tokens: &BTreeSet<String>) -> f32 {
    let sentences: Vec<&str> = response.split('.').filter(|s| !s.trim().is_empty()).collect();
    if sentences.is_empty() {
        return 0.0;
    }
    let grounded_count = sentences
        .iter()
        .filter(|sentence| {
            let words: Vec<String> = sentence
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| w.len() > MIN_WORD_LENGTH)
                .map(str::to_lowercase)
                .collect();
            if words.is_empty() {
                return false;
            }
            let present = words.iter().filter(|w| doc_tokens.contains(*w)).count();
            present as f32 / words.len() as f32 >= MIN_GROUNDED_RATIO
        })
        .count();
    grounded_count as f32 / sentences.len() as f32
}
