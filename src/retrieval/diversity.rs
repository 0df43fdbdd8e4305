//! Diversity filtering: caps how many chunks from the same page survive
//! into the final result list, so one heavily-chunked page can't crowd out
//! everything else. Order-preserving, not MMR — the reranker already
//! settled relevance order; this stage only trims per-page repetition.

use crate::retrieval::chunk::RetrievedHit;
use std::collections::HashMap;

/// Keeps at most `max_chunks_per_page` hits from each `page_id`, preserving
/// the incoming order (the reranker's `final_score` order).
#[must_use]
pub fn apply_diversity_cap(hits: Vec<RetrievedHit>, max_chunks_per_page: usize) -> Vec<RetrievedHit> {
    if max_chunks_per_page == 0 {
        return hits;
    }
    let mut seen: HashMap<String, usize> = HashMap::new();
    hits.into_iter()
        .filter(|hit| {
            let count = seen.entry(hit.chunk.page_id.clone()).or_insert(0);
            if *count < max_chunks_per_page {
                *count += 1;
                true
            } else {
                false
            }
        })
        .collect()
}
