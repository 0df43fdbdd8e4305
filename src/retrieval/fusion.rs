//! Reciprocal rank fusion over the dense and sparse retrieval legs, with
//! intent-adaptive weights.
//!
//! Generalizes [`crate::search::rrf`]'s `i64`-keyed fusion to the
//! `String`-keyed chunk ids the retrieval pipeline deals in, and adds the
//! one behavior the host's RRF never needed: renormalizing weight onto
//! whichever side actually returned candidates when the other side is
//! empty.

use crate::retrieval::providers::{DenseHit, SparseHit};
use std::collections::HashMap;

/// `k` constant and per-leg weights for one fusion call.
#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
    /// RRF `k` constant.
    pub k: u32,
    /// Dense-leg weight.
    pub dense: f32,
    /// Sparse-leg weight.
    pub sparse: f32,
}

impl FusionWeights {
    /// Builds fusion weights from a `(dense, sparse)` pair plus `k`.
    #[must_use]
    pub const fn new(k: u32, weights: (f32, f32)) -> Self {
        Self {
            k,
            dense: weights.0,
            sparse: weights.1,
        }
    }

    /// Returns effective weights, renormalizing to the non-empty side's
    /// full weight when the other side has no candidates at all. Without
    /// this, an empty sparse leg (hybrid search disabled, or a query the
    /// lexical index returns nothing for) would silently cap the dense
    /// leg's contribution at its configured share instead of ranking by
    /// its own scores at full strength.
    #[must_use]
    fn effective(&self, dense_empty: bool, sparse_empty: bool) -> (f32, f32) {
        match (dense_empty, sparse_empty) {
            (true, true) | (false, false) => (self.dense, self.sparse),
            (true, false) => (0.0, self.dense + self.sparse),
            (false, true) => (self.dense + self.sparse, 0.0),
        }
    }
}

/// One chunk's fused score plus the per-leg ranks it came from.
#[derive(Debug, Clone)]
pub struct FusedHit {
    /// Identifier of the fused chunk.
    pub chunk_id: String,
    /// Combined RRF score.
    pub rrf_score: f32,
    /// 0-based rank in the dense leg, if present there.
    pub vector_rank: Option<usize>,
    /// 0-based rank in the sparse leg, if present there.
    pub bm25_rank: Option<usize>,
}

/// Fuses one dense and one sparse ranked list into a single ordering.
///
/// Ranks contributing to the score are 1-indexed per the RRF formula
/// (`1 / (k + rank)`); `vector_rank`/`bm25_rank` on the result stay
/// 0-indexed to match list position.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn fuse(dense: &[DenseHit], sparse: &[SparseHit], weights: &FusionWeights) -> Vec<FusedHit> {
    let (w_dense, w_sparse) = weights.effective(dense.is_empty(), sparse.is_empty());

    let mut scores: HashMap<String, f32> = HashMap::new();
    let mut vector_ranks: HashMap<String, usize> = HashMap::new();
    let mut bm25_ranks: HashMap<String, usize> = HashMap::new();

    for (rank, hit) in dense.iter().enumerate() {
        let contribution = w_dense / (weights.k + rank as u32 + 1) as f32;
        *scores.entry(hit.chunk_id.clone()).or_insert(0.0) += contribution;
        vector_ranks.insert(hit.chunk_id.clone(), rank);
    }
    for (rank, hit) in sparse.iter().enumerate() {
        let contribution = w_sparse / (weights.k + rank as u32 + 1) as f32;
        *scores.entry(hit.chunk_id.clone()).or_insert(0.0) += contribution;
        bm25_ranks.insert(hit.chunk_id.clone(), rank);
    }

    let mut fused: Vec<FusedHit> = scores
        .into_iter()
        .map(|(chunk_id, rrf_score)| FusedHit {
            vector_rank: vector_ranks.get(&chunk_id).copied(),
            bm25_rank: bm25_ranks.get(&chunk_id).copied(),
            chunk_id,
            rrf_score,
        })
        .collect();
    fused.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    fused
}

/// Fuses fusion results across multiple query variants by summing each
/// variant's RRF score per chunk id, carrying forward the best (lowest)
/// rank seen for each leg across variants.
#[must_use]
pub fn fuse_variants(per_variant: &[Vec<FusedHit>]) -> Vec<FusedHit> {
    let mut scores: HashMap<String, f32> = HashMap::new();
    let mut vector_ranks: HashMap<String, usize> = HashMap::new();
    let mut bm25_ranks: HashMap<String, usize> = HashMap::new();

    for variant in per_variant {
        for hit in variant {
            *scores.entry(hit.chunk_id.clone()).or_insert(0.0) += hit.rrf_score;
            if let Some(rank) = hit.vector_rank {
                vector_ranks
                    .entry(hit.chunk_id.clone())
                    .and_modify(|best| *best = (*best).min(rank))
                    .or_insert(rank);
            }
            if let Some(rank) = hit.bm25_rank {
                bm25_ranks
                    .entry(hit.chunk_id.clone())
                    .and_modify(|best| *best = (*best).min(rank))
                    .or_insert(rank);
            }
        }
    }

    let mut fused: Vec<FusedHit> = scores
        .into_iter()
        .map(|(chunk_id, rrf_score)| FusedHit {
            vector_rank: vector_ranks.get(&chunk_id).copied(),
            bm25_rank: bm25_ranks.get(&chunk_id).copied(),
            chunk_id,
            rrf_score,
        })
        .collect();
    fused.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense(ids: &[&str]) -> Vec<DenseHit> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| DenseHit {
                chunk_id: (*id).to_string(),
                score: 1.0 - i as f32 * 0.1,
            })
            .collect()
    }

    fn sparse(ids: &[&str]) -> Vec<SparseHit> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| SparseHit {
                chunk_id: (*id).to_string(),
                score: 10.0 - i as f64,
            })
            .collect()
    }

    #[test]
    fn empty_sparse_leg_renormalizes_to_dense_rank_order() {
        let weights = FusionWeights::new(60, (0.6, 0.4));
        let fused = fuse(&dense(&["a", "b", "c"]), &[], &weights);
        assert_eq!(fused.len(), 3);
        assert_eq!(fused[0].chunk_id, "a");
        assert_eq!(fused[0].rrf_score, 1.0 / 61.0);
        assert_eq!(fused[1].chunk_id, "b");
        assert_eq!(fused[1].rrf_score, 1.0 / 62.0);
    }

    #[test]
    fn empty_dense_leg_renormalizes_to_sparse_rank_order() {
        let weights = FusionWeights::new(60, (0.6, 0.4));
        let fused = fuse(&[], &sparse(&["x", "y"]), &weights);
        assert_eq!(fused[0].chunk_id, "x");
        assert_eq!(fused[0].rrf_score, 1.0 / 61.0);
    }

    #[test]
    fn fusion_is_commutative_under_swapped_weights() {
        let d = dense(&["a", "b", "c"]);
        let s = sparse(&["b", "a", "d"]);
        let weights_fwd = FusionWeights::new(60, (0.6, 0.4));
        let weights_rev = FusionWeights::new(60, (0.4, 0.6));

        let fwd = fuse(&d, &s, &weights_fwd);
        let rev = fuse(&s.iter().map(|h| DenseHit { chunk_id: h.chunk_id.clone(), score: h.score as f32 }).collect::<Vec<_>>(),
            &d.iter().map(|h| SparseHit { chunk_id: h.chunk_id.clone(), score: f64::from(h.score) }).collect::<Vec<_>>(),
            &weights_rev);

        let fwd_order: Vec<&str> = fwd.iter().map(|h| h.chunk_id.as_str()).collect();
        let rev_order: Vec<&str> = rev.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(fwd_order, rev_order);
    }

    #[test]
    fn both_legs_present_uses_configured_weights_unmodified() {
        let weights = FusionWeights::new(60, (0.6, 0.4));
        let fused = fuse(&dense(&["a"]), &sparse(&["a"]), &weights);
        assert_eq!(fused.len(), 1);
        let expected = 0.6 / 61.0 + 0.4 / 61.0;
        assert!((fused[0].rrf_score - expected).abs() < 1e-6);
    }

    #[test]
    fn fuse_variants_sums_scores_and_keeps_best_ranks() {
        let weights = FusionWeights::new(60, (0.6, 0.4));
        let variant_a = fuse(&dense(&["a", "b"]), &[], &weights);
        let variant_b = fuse(&dense(&["a"]), &[], &weights);
        let merged = fuse_variants(&[variant_a, variant_b]);
        let a = merged.iter().find(|h| h.chunk_id == "a").unwrap();
        assert_eq!(a.vector_rank, Some(0));
        assert!(a.rrf_score > merged.iter().find(|h| h.chunk_id == "b").unwrap().rrf_score);
    }

    #[test]
    fn both_empty_produces_empty_result() {
        let weights = FusionWeights::new(60, (0.6, 0.4));
        let fused = fuse(&[], &[], &weights);
        assert!(fused.is_empty());
    }
}
