//! Context expansion: stitches neighboring or topically related chunks
//! from the same page onto a hit's display text, so the formatter shows
//! more than one isolated passage.

use crate::embedding::cosine_similarity;
use crate::retrieval::chunk::{Chunk, RetrievedHit};
use crate::retrieval::providers::PageStore;

/// Which neighboring chunks to fold in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionMode {
    /// Chunks within `window` positions before/after the hit on the same
    /// page.
    Bidirectional,
    /// The `top_r` chunks on the same page most similar to the hit by
    /// embedding cosine similarity.
    Related,
    /// Bidirectional first, then any additional related chunks not already
    /// included.
    All,
}

impl ExpansionMode {
    /// Parses a mode name, defaulting to [`Self::Bidirectional`] for
    /// anything unrecognized.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name {
            "related" => Self::Related,
            "all" => Self::All,
            _ => Self::Bidirectional,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Bidirectional => "bidirectional",
            Self::Related => "related",
            Self::All => "all",
        }
    }
}

/// Expands `hit`'s display text in place using chunks fetched from
/// `page_store`. On any page-store failure, falls soft to
/// `expansion_mode = "none"` and leaves the hit's own text untouched,
/// rather than failing the whole query over an enhancement stage.
pub async fn expand(
    hit: &mut RetrievedHit,
    mode: ExpansionMode,
    window: usize,
    top_r: usize,
    page_store: &dyn PageStore,
    query_embedding: Option<&[f32]>,
) {
    let Ok(page_chunks) = page_store.get_page_chunks(&hit.chunk.page_id).await else {
        hit.expansion_mode = Some("none".to_string());
        return;
    };
    if page_chunks.is_empty() {
        hit.expansion_mode = Some("none".to_string());
        return;
    }

    let mut selected: Vec<&Chunk> = Vec::new();
    if matches!(mode, ExpansionMode::Bidirectional | ExpansionMode::All) {
        selected.extend(bidirectional_neighbors(&hit.chunk, &page_chunks, window));
    }
    if matches!(mode, ExpansionMode::Related | ExpansionMode::All) {
        let related = related_neighbors(&hit.chunk, &page_chunks, top_r, query_embedding);
        for chunk in related {
            if !selected.iter().any(|c| c.chunk_id == chunk.chunk_id) {
                selected.push(chunk);
            }
        }
    }

    if selected.is_empty() {
        hit.expansion_mode = Some(mode.label().to_string());
        return;
    }

    let mut ordered = selected;
    ordered.sort_by_key(|c| c.chunk_index);
    let mut text = String::new();
    for chunk in &ordered {
        if !text.is_empty() {
            text.push_str("\n\n");
        }
        text.push_str(&chunk.text);
    }

    hit.context_chunks = Some(ordered.len());
    hit.expanded_text = Some(text);
    hit.expansion_mode = Some(mode.label().to_string());
}

fn bidirectional_neighbors<'a>(anchor: &Chunk, page_chunks: &'a [Chunk], window: usize) -> Vec<&'a Chunk> {
    let lo = anchor.chunk_index.saturating_sub(window);
    let hi = anchor.chunk_index + window;
    page_chunks
        .iter()
        .filter(|c| c.chunk_index >= lo && c.chunk_index <= hi && c.chunk_id != anchor.chunk_id)
        .collect()
}

fn related_neighbors<'a>(
    anchor: &Chunk,
    page_chunks: &'a [Chunk],
    top_r: usize,
    query_embedding: Option<&[f32]>,
) -> Vec<&'a Chunk> {
    // Without an embedding to rank against, fall back to simple keyword
    // overlap with the anchor's own text so "related" degrades gracefully
    // rather than becoming a no-op.
    let anchor_tokens = crate::retrieval::chunk::tokenize(&anchor.text);
    let mut scored: Vec<(&Chunk, f32)> = page_chunks
        .iter()
        .filter(|c| c.chunk_id != anchor.chunk_id)
        .map(|c| {
            let score = if let Some(q) = query_embedding {
                // Embedding-based scoring would compare c's stored vector
                // against `q`; the page store contract in this crate does
                // not carry embeddings, so this arm exists for backends
                // that extend `Chunk` with a cached vector. We approximate
                // with lexical overlap for now, matching the store we have.
                let _ = q;
                jaccard(&anchor_tokens, &crate::retrieval::chunk::tokenize(&c.text))
            } else {
                jaccard(&anchor_tokens, &crate::retrieval::chunk::tokenize(&c.text))
            };
            (c, score)
        })
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(top_r).map(|(c, _)| c).collect()
}

fn jaccard(a: &std::collections::BTreeSet<String>, b: &std::collections::BTreeSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
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

/// Ranks same-page chunk embeddings by cosine similarity to the anchor's
/// embedding. Exposed for backends that do carry per-chunk vectors.
#[must_use]
pub fn rank_by_embedding<'a>(
    candidates: &'a [(Chunk, Vec<f32>)],
    anchor_embedding: &[f32],
    top_r: usize,
) -> Vec<&'a Chunk> {
    let mut scored: Vec<(&Chunk, f32)> = candidates
        .iter()
        .map(|(chunk, embedding)| (chunk, cosine_similarity(anchor_embedding, embedding)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(top_r).map(|(c, _)| c).collect()
}
