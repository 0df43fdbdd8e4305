//! The semantic query log: a record of past queries, their outcomes, and
//! user ratings, consulted by the query expander as its highest-priority
//! paraphrase source.

use crate::retrieval::chunk::tokenize;
use std::collections::HashMap;
use std::sync::RwLock;

/// A cleanup result record for one normalized query.
#[derive(Debug, Clone)]
pub struct QueryLogEntry {
    /// Normalized query text (the map key, duplicated here for convenience
    /// when an entry is returned by value from a lookup).
    pub query: String,
    /// Token set, precomputed for Jaccard comparisons.
    tokens: std::collections::BTreeSet<String>,
    /// Number of times this query has been logged.
    pub occurrence_count: u32,
    /// User ratings recorded for this query, most recent last.
    pub ratings: Vec<f32>,
    /// Page ids returned the last time this query ran.
    pub result_page_ids: Vec<String>,
}

impl QueryLogEntry {
    fn new(query: &str, result_page_ids: Vec<String>) -> Self {
        Self {
            query: query.to_string(),
            tokens: tokenize(query),
            occurrence_count: 1,
            ratings: Vec::new(),
            result_page_ids,
        }
    }

    /// Mean of recorded ratings, if any.
    #[must_use]
    pub fn avg_rating(&self) -> Option<f32> {
        if self.ratings.is_empty() {
            None
        } else {
            Some(self.ratings.iter().sum::<f32>() / self.ratings.len() as f32)
        }
    }

    /// A query counts as `success` when it returned results and (has no
    /// ratings yet, or its average rating clears `min_rating`).
    #[must_use]
    pub fn is_success(&self, min_rating: f32) -> bool {
        let has_results = !self.result_page_ids.is_empty();
        let rating_ok = self.avg_rating().is_none_or(|avg| avg >= min_rating);
        has_results && rating_ok
    }
}

fn jaccard(a: &std::collections::BTreeSet<String>, b: &std::collections::BTreeSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

/// Configuration for log eviction and success scoring.
#[derive(Debug, Clone, Copy)]
pub struct QueryLogPolicy {
    /// Maximum entries kept before quality-based pruning runs.
    pub capacity: usize,
    /// Minimum average rating for a query to count as `success`.
    pub min_rating: f32,
    /// Entries at or below this average rating are pruning candidates.
    pub low_rating_threshold: f32,
    /// Entries at or below this occurrence count are pruning candidates.
    pub low_count_threshold: u32,
}

impl Default for QueryLogPolicy {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            min_rating: 3.0,
            low_rating_threshold: 2.0,
            low_count_threshold: 2,
        }
    }
}

/// A process-local record of normalized queries and their outcomes.
///
/// Replaces the module-level singleton of the system this pipeline was
/// distilled from: callers hold this behind the same `Arc<PipelineState>`
/// every other piece of process state lives behind.
pub struct SemanticQueryLog {
    entries: RwLock<HashMap<String, QueryLogEntry>>,
    policy: QueryLogPolicy,
}

impl SemanticQueryLog {
    /// Creates an empty log under the given eviction policy.
    #[must_use]
    pub fn new(policy: QueryLogPolicy) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            policy,
        }
    }

    /// Records the outcome of running `query`, creating or updating its
    /// entry. Runs eviction if the log is over capacity afterward.
    pub fn record(&self, query: &str, result_page_ids: Vec<String>) {
        let normalized = normalize(query);
        {
            #[allow(clippy::unwrap_used)]
            let mut entries = self.entries.write().unwrap();
            entries
                .entry(normalized)
                .and_modify(|e| {
                    e.occurrence_count += 1;
                    e.result_page_ids = result_page_ids.clone();
                })
                .or_insert_with(|| QueryLogEntry::new(query, result_page_ids));
        }
        self.evict_if_needed();
    }

    /// Attaches a user rating to the most recent entry for `query`, if one
    /// exists.
    pub fn rate(&self, query: &str, rating: f32) {
        let normalized = normalize(query);
        #[allow(clippy::unwrap_used)]
        let mut entries = self.entries.write().unwrap();
        if let Some(entry) = entries.get_mut(&normalized) {
            entry.ratings.push(rating);
        }
    }

    /// Returns up to `limit` successful entries whose Jaccard token
    /// similarity with `query` meets `similarity_threshold`, sorted
    /// descending by `(similarity, occurrence_count, avg_rating)`.
    #[must_use]
    pub fn similar_successful(
        &self,
        query: &str,
        similarity_threshold: f32,
        limit: usize,
    ) -> Vec<(QueryLogEntry, f32)> {
        let query_tokens = tokenize(query);
        #[allow(clippy::unwrap_used)]
        let entries = self.entries.read().unwrap();
        let mut candidates: Vec<(QueryLogEntry, f32)> = entries
            .values()
            .filter(|e| e.is_success(self.policy.min_rating))
            .filter_map(|e| {
                let similarity = jaccard(&query_tokens, &e.tokens);
                (similarity >= similarity_threshold).then(|| (e.clone(), similarity))
            })
            .collect();
        candidates.sort_by(|(ea, sa), (eb, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(eb.occurrence_count.cmp(&ea.occurrence_count))
                .then(
                    eb.avg_rating()
                        .unwrap_or(0.0)
                        .partial_cmp(&ea.avg_rating().unwrap_or(0.0))
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        });
        candidates.truncate(limit);
        candidates
    }

    /// Current number of distinct normalized queries tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        #[allow(clippy::unwrap_used)]
        self.entries.read().unwrap().len()
    }

    /// Whether the log holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_if_needed(&self) {
        #[allow(clippy::unwrap_used)]
        let mut entries = self.entries.write().unwrap();
        if entries.len() <= self.policy.capacity {
            return;
        }
        // Drop low-quality, low-volume entries first.
        let policy = self.policy;
        entries.retain(|_, e| {
            !(e.avg_rating().unwrap_or(f32::MAX) <= policy.low_rating_threshold
                && e.occurrence_count <= policy.low_count_threshold)
        });
        if entries.len() <= policy.capacity {
            return;
        }
        // Still over capacity: keep the top-N by (rating, count).
        let mut ranked: Vec<(String, f32, u32)> = entries
            .iter()
            .map(|(k, e)| (k.clone(), e.avg_rating().unwrap_or(0.0), e.occurrence_count))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.2.cmp(&a.2))
        });
        let keep: std::collections::HashSet<String> = ranked
            .into_iter()
            .take(policy.capacity)
            .map(|(k, _, _)| k)
            .collect();
        entries.retain(|k, _| keep.contains(k));
    }
}

fn normalize(query: &str) -> String {
    query.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_then_lookup_similar_query() {
        let log = SemanticQueryLog::new(QueryLogPolicy::default());
        log.record("how to configure API access", vec!["p1".to_string()]);
        let hits = log.similar_successful("how to configure API access quickly", 0.3, 3);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.query, "how to configure API access");
    }

    #[test]
    fn entry_without_results_is_not_success() {
        let log = SemanticQueryLog::new(QueryLogPolicy::default());
        log.record("dead end query", vec![]);
        let hits = log.similar_successful("dead end query", 0.3, 3);
        assert!(hits.is_empty());
    }

    #[test]
    fn low_rating_excludes_from_success() {
        let log = SemanticQueryLog::new(QueryLogPolicy::default());
        log.record("bad results query", vec!["p1".to_string()]);
        log.rate("bad results query", 1.0);
        let hits = log.similar_successful("bad results query", 0.3, 3);
        assert!(hits.is_empty());
    }

    #[test]
    fn good_rating_keeps_success() {
        let log = SemanticQueryLog::new(QueryLogPolicy::default());
        log.record("great results query", vec!["p1".to_string()]);
        log.rate("great results query", 5.0);
        let hits = log.similar_successful("great results query", 0.3, 3);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn eviction_respects_capacity() {
        let policy = QueryLogPolicy {
            capacity: 5,
            ..QueryLogPolicy::default()
        };
        let log = SemanticQueryLog::new(policy);
        for i in 0..20 {
            log.record(&format!("query number {i}"), vec!["p1".to_string()]);
        }
        assert!(log.len() <= 5);
    }

    #[test]
    fn jaccard_similarity_is_symmetric() {
        let a = tokenize("how to configure API access");
        let b = tokenize("configure API access quickly");
        assert_eq!(jaccard(&a, &b), jaccard(&b, &a));
    }
}
