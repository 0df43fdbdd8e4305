//! Typed capabilities for the external collaborators the pipeline reads
//! from: the vector store, the sparse index, the page store, the
//! cross-encoder reranker, and the optional LLM query rewriter.
//!
//! Each is a small async trait with one concrete backend selected at
//! construction time — no runtime attribute probing, no dynamic dispatch on
//! duck-typed payloads.

use crate::error::Result;
use crate::retrieval::chunk::Chunk;
use async_trait::async_trait;

/// Server-side payload filter derived from [`crate::retrieval::query::ExtractedFilters`]
/// plus any caller-supplied space. `None` fields are unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrievalFilter {
    /// Restrict to this space.
    pub space: Option<String>,
    /// Restrict to pages by this author.
    pub author: Option<String>,
    /// Inclusive lower bound on `modified`.
    pub date_from: Option<String>,
    /// Inclusive upper bound on `modified`.
    pub date_to: Option<String>,
    /// Restrict to this content type.
    pub content_type: Option<String>,
    /// Restrict to this status.
    pub status: Option<String>,
}

impl RetrievalFilter {
    /// Whether a chunk's metadata satisfies this filter. Used by backends
    /// (or test doubles) that cannot apply the filter server-side and must
    /// fall back to client-side filtering.
    #[must_use]
    pub fn matches(&self, chunk: &Chunk) -> bool {
        if let Some(space) = &self.space
            && !chunk.space.eq_ignore_ascii_case(space)
        {
            return false;
        }
        if let Some(author) = &self.author
            && !chunk.created_by.eq_ignore_ascii_case(author)
            && !chunk.modified_by.eq_ignore_ascii_case(author)
        {
            return false;
        }
        if let Some(content_type) = &self.content_type {
            let matches = format!("{:?}", chunk.content_type).eq_ignore_ascii_case(content_type);
            if !matches {
                return false;
            }
        }
        true
    }
}

/// One hit from the dense (vector) retrieval leg.
#[derive(Debug, Clone)]
pub struct DenseHit {
    /// Identifier of the matched chunk.
    pub chunk_id: String,
    /// Cosine similarity score.
    pub score: f32,
}

/// One hit from the sparse (BM25) retrieval leg.
#[derive(Debug, Clone)]
pub struct SparseHit {
    /// Identifier of the matched chunk.
    pub chunk_id: String,
    /// BM25 score.
    pub score: f64,
}

/// Cosine k-NN search over chunk embeddings with server-side payload
/// filtering. Implementations own their connection pool.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// The collection's configured embedding dimension.
    fn dimension(&self) -> usize;

    /// Returns the `top_k` nearest chunks to `vector`, optionally
    /// constrained by `filter`.
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&RetrievalFilter>,
    ) -> Result<Vec<DenseHit>>;
}

/// BM25 retrieval over the same chunk corpus, aware of Russian morphology
/// (lemmatization on both index and query side is an ingest-side concern;
/// this trait only exposes the retrieval call).
#[async_trait]
pub trait SparseIndex: Send + Sync {
    /// Returns the `top_k` best-scoring chunks for `query`, optionally
    /// constrained by `filter` (applied client-side if the backend cannot
    /// filter server-side).
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&RetrievalFilter>,
    ) -> Result<Vec<SparseHit>>;
}

/// Authoritative chunk metadata store. Read-only from the pipeline's
/// perspective: it never writes back.
#[async_trait]
pub trait PageStore: Send + Sync {
    /// Fetches one chunk by id, if it exists.
    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>>;

    /// Fetches every chunk belonging to a page, ordered by `chunk_index`.
    async fn get_page_chunks(&self, page_id: &str) -> Result<Vec<Chunk>>;

    /// Finds chunks whose `page_path` contains every one of `parts` as a
    /// case-folded substring (the structural-search override path).
    async fn find_by_structural_path(&self, parts: &[String]) -> Result<Vec<Chunk>>;
}

/// Which scoring regime a cross-encoder reranker uses, driving the
/// adaptive-threshold table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerankerFamily {
    /// MS-MARCO-trained encoders, scores roughly in `[0, 1]`.
    BgeStyle,
    /// Tighter-scoring Russian cross-encoders, roughly in `[0, 0.3]`.
    RussianCrossEncoder,
}

/// A cross-encoder: `(query, passage)` pairs in, relevance scalars out.
/// Synchronous by design — callers invoke it from the CPU worker pool.
pub trait RerankerProvider: Send + Sync {
    /// The reranker's scoring family, used to pick adaptive thresholds.
    fn family(&self) -> RerankerFamily;

    /// Scores each `(query, passage)` pair, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying model fails to run.
    fn score(&self, pairs: &[(String, String)]) -> Result<Vec<f32>>;
}

/// An LLM-backed query rewriter. Two uniform-interface backends exist:
/// a local Ollama primary and a remote OpenAI-compatible fallback.
#[async_trait]
pub trait LlmRewriter: Send + Sync {
    /// The model name this rewriter calls. Must differ from the embedding
    /// model name; enforced by [`crate::config::Config::validate`].
    fn model_name(&self) -> &str;

    /// Produces up to `max_variants` paraphrases of `query` in the same
    /// language as the input.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout or upstream failure; callers must treat
    /// this as recoverable and fall back to the original query.
    async fn rewrite(&self, query: &str, max_variants: usize) -> Result<Vec<String>>;
}
