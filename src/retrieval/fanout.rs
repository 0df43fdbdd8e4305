//! Concurrent retrieval fanout: runs dense and sparse search for every
//! query variant in parallel, each under its own timeout, and fuses the
//! per-variant results.
//!
//! I/O-bound legs (embedding, vector search, sparse search) are
//! `async fn`s scheduled on the `tokio` runtime; nothing here blocks a
//! worker thread.

use crate::error::{Error, Result};
use crate::retrieval::fusion::{FusedHit, FusionWeights, fuse, fuse_variants};
use crate::retrieval::providers::{RetrievalFilter, SparseIndex, VectorStore};
use std::time::Duration;
use tokio::time::timeout;

/// Per-leg timeout for a single variant's vector search call.
pub const VECTOR_SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-leg timeout for a single variant's sparse search call.
pub const SPARSE_SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Hard ceiling on the per-variant dense/sparse candidate budget,
/// regardless of query length or requested result count.
const MAX_CANDIDATES: usize = 50;

/// Token-count boundaries splitting queries into short/medium/long for the
/// candidate-budget multiplier below.
const SHORT_QUERY_TOKENS: usize = 3;
const MEDIUM_QUERY_TOKENS: usize = 6;

/// Computes how many candidates each variant's dense/sparse search should
/// request: `limit` scaled by a query-length multiplier (short queries are
/// vaguer and need a wider net; long queries are already narrow), capped at
/// [`MAX_CANDIDATES`].
#[must_use]
pub fn k_candidates(query: &str, limit: usize) -> usize {
    let token_count = query.split_whitespace().count();
    let multiplier = if token_count <= SHORT_QUERY_TOKENS {
        5
    } else if token_count <= MEDIUM_QUERY_TOKENS {
        3
    } else {
        2
    };
    (limit * multiplier).min(MAX_CANDIDATES)
}

/// Runs dense and sparse retrieval for one query variant concurrently,
/// each under [`VECTOR_SEARCH_TIMEOUT`] / [`SPARSE_SEARCH_TIMEOUT`], then
/// fuses the two legs with `weights`.
///
/// A sparse-leg timeout or error degrades to an empty sparse list (BM25 is
/// an enhancement, not on the critical path); a dense-leg timeout or error
/// propagates, since dense retrieval is on the critical path.
///
/// # Errors
///
/// Returns an error if the dense leg times out or the vector store call
/// fails.
pub async fn retrieve_variant(
    variant: &str,
    variant_embedding: &[f32],
    top_k: usize,
    filter: Option<&RetrievalFilter>,
    vector_store: &dyn VectorStore,
    sparse_index: Option<&dyn SparseIndex>,
    weights: &FusionWeights,
    hybrid_enabled: bool,
) -> Result<Vec<FusedHit>> {
    let dense_fut = timeout(VECTOR_SEARCH_TIMEOUT, vector_store.search(variant_embedding, top_k, filter));

    let sparse_fut = async {
        if !hybrid_enabled {
            return Vec::new();
        }
        let Some(index) = sparse_index else {
            return Vec::new();
        };
        match timeout(SPARSE_SEARCH_TIMEOUT, index.search(variant, top_k, filter)).await {
            Ok(Ok(hits)) => hits,
            _ => Vec::new(),
        }
    };

    let (dense_result, sparse_hits) = tokio::join!(dense_fut, sparse_fut);

    let dense_hits = match dense_result {
        Ok(Ok(hits)) => hits,
        Ok(Err(e)) => return Err(e),
        Err(_) => {
            return Err(Error::Retrieval(crate::error::RetrievalError::UpstreamUnavailable(
                "vector store search timed out".to_string(),
            )));
        }
    };

    Ok(fuse(&dense_hits, &sparse_hits, weights))
}

/// Runs [`retrieve_variant`] for every `(variant, embedding)` pair
/// concurrently and fuses all per-variant results into one ranking.
///
/// # Errors
///
/// Returns an error if every variant's dense leg fails; a variant whose
/// dense leg fails while at least one other variant succeeds is dropped
/// from the fused result rather than failing the whole call.
pub async fn retrieve_all_variants(
    variants: &[(String, Vec<f32>)],
    top_k: usize,
    filter: Option<&RetrievalFilter>,
    vector_store: &dyn VectorStore,
    sparse_index: Option<&dyn SparseIndex>,
    weights: &FusionWeights,
    hybrid_enabled: bool,
) -> Result<Vec<FusedHit>> {
    let futures = variants.iter().map(|(variant, embedding)| {
        retrieve_variant(
            variant,
            embedding,
            top_k,
            filter,
            vector_store,
            sparse_index,
            weights,
            hybrid_enabled,
        )
    });
    let results = futures_util::future::join_all(futures).await;

    let mut per_variant = Vec::new();
    let mut last_error = None;
    for result in results {
        match result {
            Ok(fused) => per_variant.push(fused),
            Err(e) => last_error = Some(e),
        }
    }

    if per_variant.is_empty() {
        if let Some(e) = last_error {
            return Err(e);
        }
        return Ok(Vec::new());
    }

    Ok(fuse_variants(&per_variant))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::providers::{DenseHit, SparseHit};
    use async_trait::async_trait;

    struct FakeVectorStore {
        hits: Vec<DenseHit>,
    }

    #[async_trait]
    impl VectorStore for FakeVectorStore {
        fn dimension(&self) -> usize {
            4
        }

        async fn search(&self, _vector: &[f32], _top_k: usize, _filter: Option<&RetrievalFilter>) -> Result<Vec<DenseHit>> {
            Ok(self.hits.clone())
        }
    }

    struct FakeSparseIndex {
        hits: Vec<SparseHit>,
    }

    #[async_trait]
    impl SparseIndex for FakeSparseIndex {
        async fn search(&self, _query: &str, _top_k: usize, _filter: Option<&RetrievalFilter>) -> Result<Vec<SparseHit>> {
            Ok(self.hits.clone())
        }
    }

    #[test]
    fn short_query_gets_the_widest_multiplier() {
        assert_eq!(k_candidates("restart", 10), 50);
    }

    #[test]
    fn long_query_gets_the_narrowest_multiplier() {
        assert_eq!(k_candidates("how do I configure the deployment rollback pipeline for staging", 10), 20);
    }

    #[test]
    fn budget_never_exceeds_the_hard_cap() {
        assert_eq!(k_candidates("short", 20), 50);
    }

    #[tokio::test]
    async fn single_variant_fuses_dense_and_sparse() {
        let dense = FakeVectorStore {
            hits: vec![DenseHit { chunk_id: "a".to_string(), score: 0.9 }],
        };
        let sparse = FakeSparseIndex {
            hits: vec![SparseHit { chunk_id: "a".to_string(), score: 5.0 }],
        };
        let weights = FusionWeights::new(60, (0.6, 0.4));
        let result = retrieve_variant("query", &[0.1, 0.2], 10, None, &dense, Some(&sparse), &weights, true)
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].chunk_id, "a");
    }

    #[tokio::test]
    async fn hybrid_disabled_skips_sparse_leg() {
        let dense = FakeVectorStore {
            hits: vec![DenseHit { chunk_id: "a".to_string(), score: 0.9 }],
        };
        let sparse = FakeSparseIndex {
            hits: vec![SparseHit { chunk_id: "b".to_string(), score: 5.0 }],
        };
        let weights = FusionWeights::new(60, (0.6, 0.4));
        let result = retrieve_variant("query", &[0.1, 0.2], 10, None, &dense, Some(&sparse), &weights, false)
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].chunk_id, "a");
    }

    #[tokio::test]
    async fn multiple_variants_fuse_into_combined_ranking() {
        let dense = FakeVectorStore {
            hits: vec![DenseHit { chunk_id: "a".to_string(), score: 0.9 }],
        };
        let weights = FusionWeights::new(60, (0.6, 0.4));
        let variants = vec![
            ("q1".to_string(), vec![0.1, 0.2]),
            ("q2".to_string(), vec![0.1, 0.3]),
        ];
        let result = retrieve_all_variants(&variants, 10, None, &dense, None, &weights, false)
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].chunk_id, "a");
    }
}
