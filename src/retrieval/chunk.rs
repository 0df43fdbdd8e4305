//! The retrieval corpus's chunk type and the hit envelope that carries one
//! chunk through the pipeline.
//!
//! This is a different type from [`crate::core::Chunk`]: that one is a
//! byte-offset slice of a locally loaded buffer, owned by the CLI's ad-hoc
//! ingestion commands. This one is a metadata-rich passage sourced from the
//! external page store, the unit the retrieval pipeline actually searches.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One of the three block shapes a chunk's text can take. Tables and lists
/// are kept whole on the ingest side rather than split mid-structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    /// Ordinary prose.
    Text,
    /// A bulleted or numbered list.
    List,
    /// A table.
    Table,
    /// A code block.
    Code,
}

/// Where a chunk's source page lives in the content model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// A wiki page.
    Page,
    /// A blog-style post.
    Blogpost,
    /// An uploaded attachment.
    Attachment,
}

/// A metadata-rich passage from the wiki corpus: the atomic unit the
/// retrieval pipeline ranks, fuses, reranks, and returns.
///
/// Invariants: `chunk_id` is unique across the corpus; `(page_id,
/// chunk_index)` is unique; `text` is never truncated by anything in this
/// crate (only display-time previews in the formatter are capped).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable identifier, unique across the corpus.
    pub chunk_id: String,
    /// Identifier of the page this chunk belongs to.
    pub page_id: String,
    /// Dense index of this chunk within its page (0-based).
    pub chunk_index: usize,
    /// Authoritative chunk text. Never truncated.
    pub text: String,
    /// Wiki space tag.
    pub space: String,
    /// Title of the containing page.
    pub page_title: String,
    /// "/"-joined ancestor titles, used for structural matching.
    pub page_path: String,
    /// " > "-joined display path, used for the formatter and path boost.
    pub breadcrumb: String,
    /// Nearest heading text above this chunk, if any.
    pub heading: String,
    /// Nearest heading's level (0 = no heading, 1-6 = HTML heading level).
    pub heading_level: u8,
    /// "/"-joined ancestor headings within the page.
    pub heading_path: String,
    /// All headings on the containing page, in document order.
    pub headings_list: Vec<String>,
    /// Labels attached to the page.
    pub labels: BTreeSet<String>,
    /// Content type of the containing page.
    pub content_type: ContentType,
    /// Block shape of this chunk's text.
    pub block_type: BlockType,
    /// True for tables/lists kept whole rather than split.
    pub is_complete_block: bool,
    /// ISO-8601 creation timestamp.
    pub created: String,
    /// ISO-8601 last-modified timestamp.
    pub modified: String,
    /// Author of the page.
    pub created_by: String,
    /// Last editor of the page.
    pub modified_by: String,
    /// Depth of the page in the space hierarchy (0 = root).
    pub hierarchy_depth: u32,
    /// Names of attachments on the page (length-capped by ingest).
    pub attachments: Vec<String>,
    /// Canonical URL of the page.
    pub url: String,
}

impl Chunk {
    /// Lowercased, trimmed breadcrumb keyword set, used by the path boost
    /// and the relevant-headings filter.
    #[must_use]
    pub fn breadcrumb_keywords(&self) -> BTreeSet<String> {
        tokenize(&self.breadcrumb)
    }
}

/// Splits text into a lowercase set of alphanumeric-ish tokens (Unicode word
/// boundaries, not ASCII-only, so Cyrillic text tokenizes correctly).
#[must_use]
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// One candidate carried through the pipeline, from first retrieval through
/// the formatter. Created by a retriever, mutated in place by later stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedHit {
    /// Identifier of the underlying chunk.
    pub chunk_id: String,
    /// The chunk's full metadata and text.
    pub chunk: Chunk,
    /// Current-stage scalar score (meaning depends on pipeline stage).
    pub score: f32,
    /// Rank in the dense retrieval list for this hit's originating variant,
    /// if it appeared there.
    pub vector_rank: Option<usize>,
    /// Rank in the sparse retrieval list, if it appeared there.
    pub bm25_rank: Option<usize>,
    /// Score after reciprocal rank fusion.
    pub rrf_score: Option<f32>,
    /// Raw cross-encoder score.
    pub rerank_score: Option<f32>,
    /// Additive hierarchy boost applied during reranking.
    pub hierarchy_boost: Option<f32>,
    /// Additive path (breadcrumb Jaccard) boost applied during reranking.
    pub path_boost: Option<f32>,
    /// `rerank_score + hierarchy_boost + path_boost`.
    pub final_score: Option<f32>,
    /// Text actually shown, after context expansion (falls back to
    /// `chunk.text` when expansion did not run or found nothing).
    pub expanded_text: Option<String>,
    /// Number of additional chunks folded into `expanded_text`.
    pub context_chunks: Option<usize>,
    /// How context expansion was performed for this hit ("bidirectional",
    /// "related", "all", or "none").
    pub expansion_mode: Option<String>,
    /// "structural" when this hit came from the metadata-path override
    /// search rather than the fused dense/sparse path.
    pub search_type: Option<String>,
    /// Set by the grounding check; `None` if grounding was not evaluated.
    pub possible_hallucination: Option<bool>,
}

impl RetrievedHit {
    /// Wraps a freshly retrieved chunk with no stage scores set yet.
    #[must_use]
    pub fn new(chunk: Chunk, score: f32) -> Self {
        Self {
            chunk_id: chunk.chunk_id.clone(),
            chunk,
            score,
            vector_rank: None,
            bm25_rank: None,
            rrf_score: None,
            rerank_score: None,
            hierarchy_boost: None,
            path_boost: None,
            final_score: None,
            expanded_text: None,
            context_chunks: None,
            expansion_mode: None,
            search_type: None,
            possible_hallucination: None,
        }
    }

    /// Returns the text the formatter should preview: expanded text if
    /// context expansion ran, else the chunk's own text.
    #[must_use]
    pub fn display_text(&self) -> &str {
        self.expanded_text.as_deref().unwrap_or(&self.chunk.text)
    }

    /// The score the diversity filter and final ordering should sort by:
    /// `final_score` once reranking has run, else whatever the current
    /// stage last set.
    #[must_use]
    pub fn ordering_score(&self) -> f32 {
        self.final_score.or(self.rrf_score).unwrap_or(self.score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chunk() -> Chunk {
        Chunk {
            chunk_id: "c1".to_string(),
            page_id: "p1".to_string(),
            chunk_index: 0,
            text: "Some content about API setup".to_string(),
            space: "ENG".to_string(),
            page_title: "API Guide".to_string(),
            page_path: "ENG/Guides/API Guide".to_string(),
            breadcrumb: "ENG > Guides > API Guide".to_string(),
            heading: "Setup".to_string(),
            heading_level: 2,
            heading_path: "API Guide/Setup".to_string(),
            headings_list: vec!["Setup".to_string(), "Usage".to_string()],
            labels: BTreeSet::from(["api".to_string()]),
            content_type: ContentType::Page,
            block_type: BlockType::Text,
            is_complete_block: false,
            created: "2024-01-01T00:00:00Z".to_string(),
            modified: "2024-06-01T00:00:00Z".to_string(),
            created_by: "alice".to_string(),
            modified_by: "bob".to_string(),
            hierarchy_depth: 2,
            attachments: vec![],
            url: "https://wiki.example/ENG/API+Guide".to_string(),
        }
    }

    #[test]
    fn tokenize_lowercases_and_splits_on_punctuation() {
        let tokens = tokenize("ENG > Guides > API Guide!");
        assert!(tokens.contains("eng"));
        assert!(tokens.contains("guides"));
        assert!(tokens.contains("api"));
        assert!(tokens.contains("guide"));
        assert!(!tokens.contains(">"));
    }

    #[test]
    fn display_text_falls_back_to_chunk_text() {
        let hit = RetrievedHit::new(sample_chunk(), 0.9);
        assert_eq!(hit.display_text(), "Some content about API setup");
    }

    #[test]
    fn display_text_prefers_expanded_text() {
        let mut hit = RetrievedHit::new(sample_chunk(), 0.9);
        hit.expanded_text = Some("expanded".to_string());
        assert_eq!(hit.display_text(), "expanded");
    }

    #[test]
    fn ordering_score_prefers_final_then_rrf_then_raw() {
        let mut hit = RetrievedHit::new(sample_chunk(), 0.1);
        assert_eq!(hit.ordering_score(), 0.1);
        hit.rrf_score = Some(0.2);
        assert_eq!(hit.ordering_score(), 0.2);
        hit.final_score = Some(0.3);
        assert_eq!(hit.ordering_score(), 0.3);
    }
}
