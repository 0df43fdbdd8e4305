//! Cross-encoder reranking: scores fused candidates against the raw query,
//! layers on a hierarchy boost and a path boost, and drops anything below
//! an adaptive, intent- and model-family-aware threshold.

use crate::error::{Error, Result};
use crate::retrieval::chunk::{RetrievedHit, tokenize};
use crate::retrieval::providers::{RerankerFamily, RerankerProvider};
use crate::retrieval::query::QueryIntent;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Page titles carrying one of these keywords read as entry points, not
/// detail pages.
const IMPORTANT_TITLE_KEYWORDS: &[&str] = &[
    "overview",
    "general",
    "readme",
    "getting started",
    "руководство",
];

/// Labels that mark a page as technical reference material.
const TECHNICAL_LABELS: &[&str] = &["api", "architecture", "интеграция", "integration", "sdk"];

/// Vocabulary used to decide whether a query itself counts as technical,
/// for the adaptive-threshold rule.
const TECHNICAL_QUERY_TERMS: &[&str] = &[
    "api",
    "sdk",
    "endpoint",
    "webhook",
    "токен",
    "token",
    "конфигурация",
    "config",
    "architecture",
    "архитектура",
];

/// Hard cap on candidates reranked per call, independent of query length.
const MAX_RERANK_CANDIDATES: usize = 20;

/// Cap used for short queries under an active space filter.
const SHORT_QUERY_WITH_FILTER_CANDIDATES: usize = 12;

/// Token-count threshold below which a query is "short" for budget purposes.
const SHORT_QUERY_TOKEN_THRESHOLD: usize = 4;

static IMPORTANT_TITLE_SET: LazyLock<Vec<BTreeSet<String>>> = LazyLock::new(|| {
    IMPORTANT_TITLE_KEYWORDS
        .iter()
        .map(|kw| tokenize(kw))
        .collect()
});

/// Picks how many of the fused candidates to send through the reranker.
#[must_use]
pub fn adaptive_candidate_limit(query: &str, space_filter_active: bool) -> usize {
    let token_count = query.split_whitespace().count();
    if token_count <= SHORT_QUERY_TOKEN_THRESHOLD && space_filter_active {
        SHORT_QUERY_WITH_FILTER_CANDIDATES
    } else {
        MAX_RERANK_CANDIDATES
    }
}

/// Computes the hierarchy boost for one hit's chunk, bounded to `[0, 0.8]`.
#[must_use]
pub fn hierarchy_boost(hit: &RetrievedHit) -> f32 {
    let chunk = &hit.chunk;
    let mut boost = 0.0_f32;

    if chunk.hierarchy_depth == 0 {
        boost += 0.5;
    }

    let title_tokens = tokenize(&chunk.page_title);
    if IMPORTANT_TITLE_SET
        .iter()
        .any(|kw| kw.iter().all(|t| title_tokens.contains(t)))
    {
        boost += 0.3;
    }

    match chunk.heading_level {
        1 => boost += 0.2,
        2 => boost += 0.1,
        _ => {}
    }

    let has_technical_label = chunk
        .labels
        .iter()
        .any(|l| TECHNICAL_LABELS.contains(&l.to_lowercase().as_str()));
    if has_technical_label {
        boost += 0.3;
    } else if !chunk.labels.is_empty() {
        boost += 0.05;
    }

    boost.min(0.8)
}

/// Jaccard similarity between the query's keyword set and the chunk's
/// breadcrumb keyword set, bounded to `[0, 1]`.
#[must_use]
pub fn path_boost(query: &str, hit: &RetrievedHit) -> f32 {
    let query_tokens = tokenize(query);
    let breadcrumb_tokens = hit.chunk.breadcrumb_keywords();
    if query_tokens.is_empty() && breadcrumb_tokens.is_empty() {
        return 0.0;
    }
    let intersection = query_tokens.intersection(&breadcrumb_tokens).count();
    let union = query_tokens.union(&breadcrumb_tokens).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

/// Whether `query` contains at least one term from the technical vocabulary.
#[must_use]
pub fn is_technical_query(query: &str) -> bool {
    let tokens = tokenize(query);
    TECHNICAL_QUERY_TERMS
        .iter()
        .any(|term| tokens.contains(&term.to_lowercase()))
}

/// Resolves the rerank-score floor for a given model family, intent, and
/// technical-query flag.
#[must_use]
pub fn adaptive_threshold(family: RerankerFamily, intent: QueryIntent, technical_query: bool) -> f32 {
    let (base_technical, base_general) = match family {
        RerankerFamily::BgeStyle => (0.01, 0.001),
        RerankerFamily::RussianCrossEncoder => (0.01, 0.005),
    };
    match intent {
        QueryIntent::Navigational => base_general * 1.5,
        QueryIntent::HowTo => {
            if technical_query {
                base_technical
            } else {
                base_general
            }
        }
        QueryIntent::Factual => base_general,
        QueryIntent::Exploratory => (base_general * 0.5).min(0.0001),
    }
}

/// Reranks `candidates` against `query`, applying boosts and the adaptive
/// threshold, and returns the survivors sorted by `final_score` descending.
///
/// # Errors
///
/// Returns [`crate::error::RetrievalError::AllFilteredByThreshold`] if every
/// candidate is dropped by the threshold, and propagates scoring errors
/// from the reranker provider.
pub fn rerank(
    query: &str,
    mut candidates: Vec<RetrievedHit>,
    reranker: &dyn RerankerProvider,
    intent: QueryIntent,
    space_filter_active: bool,
) -> Result<Vec<RetrievedHit>> {
    let limit = adaptive_candidate_limit(query, space_filter_active);
    candidates.truncate(limit);
    if candidates.is_empty() {
        return Ok(candidates);
    }

    let pairs: Vec<(String, String)> = candidates
        .iter()
        .map(|hit| (query.to_string(), hit.display_text().to_string()))
        .collect();
    let scores = reranker.score(&pairs)?;

    let technical_query = is_technical_query(query);
    let threshold = adaptive_threshold(reranker.family(), intent, technical_query);

    for (hit, score) in candidates.iter_mut().zip(scores) {
        let h_boost = hierarchy_boost(hit);
        let p_boost = path_boost(query, hit);
        hit.rerank_score = Some(score);
        hit.hierarchy_boost = Some(h_boost);
        hit.path_boost = Some(p_boost);
        hit.final_score = Some(score + h_boost + p_boost);
    }

    let candidate_count = candidates.len();
    let min_rerank_score = candidates
        .iter()
        .filter_map(|hit| hit.rerank_score)
        .fold(f32::MAX, f32::min);
    let max_rerank_score = candidates
        .iter()
        .filter_map(|hit| hit.rerank_score)
        .fold(f32::MIN, f32::max);
    let survivors: Vec<RetrievedHit> = candidates
        .into_iter()
        .filter(|hit| hit.rerank_score.unwrap_or(0.0) >= threshold)
        .collect();

    if survivors.is_empty() {
        return Err(Error::Retrieval(
            crate::error::RetrievalError::AllFilteredByThreshold {
                candidate_count,
                threshold,
                min_rerank_score,
                max_rerank_score,
            },
        ));
    }

    let mut survivors = survivors;
    survivors.sort_by(|a, b| {
        b.final_score
            .unwrap_or(0.0)
            .partial_cmp(&a.final_score.unwrap_or(0.0))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(survivors)
}
