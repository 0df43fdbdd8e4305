//! The query-time retrieval pipeline: query analysis, expansion,
//! concurrent dense/sparse fanout, fusion, structural override, cross-
//! encoder reranking, diversity filtering, context expansion, grounding,
//! and response formatting.
//!
//! [`Pipeline`] is the single entry point. It holds every external
//! collaborator behind a typed trait object and every named cache behind
//! `Arc`, so one instance can be cloned cheaply into each query's task —
//! the `Arc<PipelineState>` pattern this module was built around.

pub mod cache;
pub mod chunk;
pub mod context;
pub mod diversity;
pub mod expansion;
pub mod fanout;
pub mod formatter;
pub mod fusion;
pub mod grounding;
pub mod providers;
pub mod query;
pub mod query_log;
pub mod rerank;
pub mod structural;
pub mod synonyms;

use crate::config::Config;
use crate::error::{Error, Result};
use cache::{EmbeddingCache, PageCache, RewriteCache};
use chunk::RetrievedHit;
use providers::{LlmRewriter, PageStore, RerankerProvider, RetrievalFilter, SparseIndex, VectorStore};
use query_log::{QueryLogPolicy, SemanticQueryLog};
use std::sync::Arc;
use synonyms::SynonymsManager;
use tracing::{info, instrument, warn};

/// Minimum default result count.
const DEFAULT_LIMIT: usize = 5;

/// Maximum allowed result count per the network/RPC surface's contract.
const MAX_LIMIT: usize = 20;

/// Re-exported for callers who only need the configuration type; the
/// pipeline's configuration is the same [`Config`] the rest of the crate
/// assembles from the environment.
pub type PipelineConfig = Config;

/// External collaborators the pipeline reads from, bundled so
/// [`Pipeline::new`] takes one argument instead of five.
pub struct PipelineDeps {
    /// Dense retrieval backend.
    pub vector_store: Arc<dyn VectorStore>,
    /// Sparse (BM25) retrieval backend, if hybrid search is enabled.
    pub sparse_index: Option<Arc<dyn SparseIndex>>,
    /// Authoritative chunk metadata store.
    pub page_store: Arc<dyn PageStore>,
    /// Dense embedding provider for queries.
    pub embedder: Arc<dyn crate::embedding::Embedder>,
    /// Cross-encoder reranker.
    pub reranker: Arc<dyn RerankerProvider>,
    /// Optional LLM query rewriter.
    pub llm_rewriter: Option<Arc<dyn LlmRewriter>>,
}

/// Process-wide pipeline state: configuration, collaborators, and caches,
/// constructed once at startup and shared by every query.
pub struct Pipeline {
    config: Config,
    deps: PipelineDeps,
    embedding_cache: EmbeddingCache,
    rewrite_cache: RewriteCache,
    page_cache: PageCache,
    query_log: SemanticQueryLog,
    synonyms: SynonymsManager,
}

impl Pipeline {
    /// Builds a pipeline from configuration and its external collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Retrieval`] with
    /// [`crate::error::RetrievalError::StartupInvariantViolation`] if the
    /// vector store's configured dimension does not match the embedding
    /// provider's dimension.
    pub fn new(config: Config, deps: PipelineDeps) -> Result<Self> {
        config.validate()?;
        if deps.vector_store.dimension() != deps.embedder.dimensions() {
            return Err(Error::Retrieval(
                crate::error::RetrievalError::StartupInvariantViolation(format!(
                    "vector store dimension {} != embedding provider dimension {}",
                    deps.vector_store.dimension(),
                    deps.embedder.dimensions()
                )),
            ));
        }

        let embedding_cache = EmbeddingCache::new(config.cache.embedding_capacity);
        let rewrite_cache = RewriteCache::new(config.cache.rewrite_ttl_secs);
        let page_cache = PageCache::new(config.cache.page_capacity);
        let query_log = SemanticQueryLog::new(QueryLogPolicy {
            capacity: config.cache.query_log_capacity,
            ..QueryLogPolicy::default()
        });

        Ok(Self {
            config,
            deps,
            embedding_cache,
            rewrite_cache,
            page_cache,
            query_log,
            synonyms: SynonymsManager::new(),
        })
    }

    /// Runs the full retrieval pipeline for `query` and returns the
    /// formatted report. This is the network/RPC surface's one method,
    /// exposed here as a library call and from the CLI as a subcommand.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed input (`QueryTooShort`/`BadInput`)
    /// or when a critical-path collaborator (vector store, fusion,
    /// rerank-on-empty-candidates) fails outright; every other stage
    /// degrades locally and is reflected in the formatted report instead
    /// of a propagated error.
    #[instrument(skip(self), fields(query_len = query.len()))]
    pub async fn semantic_search(&self, query: &str, limit: Option<usize>, space: Option<String>) -> Result<String> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

        let (cleaned_query, extracted_filters) = query::clean_and_validate(query)?;
        let intent = query::classify_intent(&cleaned_query);
        let structure = query::detect_structure(&cleaned_query);

        let filter = RetrievalFilter {
            space: space.or(extracted_filters.space),
            author: extracted_filters.author,
            date_from: extracted_filters.date_from,
            date_to: extracted_filters.date_to,
            content_type: extracted_filters.content_type,
            status: None,
        };

        if let Some(structural_hits) = structural::search_structural(&structure, self.deps.page_store.as_ref()).await? {
            info!(hits = structural_hits.len(), "structural override matched");
            let expanded = self.expand_context(structural_hits).await;
            let truncated: Vec<RetrievedHit> = expanded.into_iter().take(limit).collect();
            return Ok(formatter::format_results(&cleaned_query, intent, &truncated));
        }

        let expansion_set = expansion::expand_query(
            &cleaned_query,
            &self.query_log,
            self.config.expansion.query_log_similarity_threshold,
            &self.synonyms,
            self.llm_rewriter_if_enabled(),
            &self.rewrite_cache,
        )
        .await;
        if expansion_set.llm_rewrite_unavailable {
            warn!("LLM query rewriter unavailable, falling back to remaining expansion sources");
        }

        let variant_embeddings = self.embed_variants(&expansion_set.variants)?;

        let weights = fusion::FusionWeights::new(
            self.config.search.rrf_k,
            self.config.search.intent_weights.for_intent(intent),
        );
        let top_k = fanout::k_candidates(&cleaned_query, limit);

        let fused = fanout::retrieve_all_variants(
            &variant_embeddings,
            top_k,
            Some(&filter),
            self.deps.vector_store.as_ref(),
            self.deps.sparse_index.as_deref(),
            &weights,
            self.config.search.enable_hybrid_search,
        )
        .await?;

        if fused.is_empty() {
            return Ok(formatter::format_no_results(&cleaned_query, intent));
        }

        let candidates = self.hydrate(&fused).await?;

        let reranked = match rerank::rerank(
            &cleaned_query,
            candidates,
            self.deps.reranker.as_ref(),
            intent,
            filter.space.is_some(),
        ) {
            Ok(hits) => hits,
            Err(Error::Retrieval(crate::error::RetrievalError::AllFilteredByThreshold {
                candidate_count,
                threshold,
                min_rerank_score,
                max_rerank_score,
            })) => {
                let _ = candidate_count;
                return Ok(formatter::format_low_relevance(
                    &cleaned_query,
                    intent,
                    threshold,
                    min_rerank_score,
                    max_rerank_score,
                ));
            }
            Err(e) => return Err(e),
        };

        let cap = self.config.search.diversity_caps.for_intent(intent);
        let diversified = diversity::apply_diversity_cap(reranked, cap);
        let truncated: Vec<RetrievedHit> = diversified.into_iter().take(limit).collect();

        let expanded = self.expand_context(truncated).await;
        let evaluated = self.apply_grounding(expanded);

        self.query_log.record(&cleaned_query, evaluated.iter().map(|h| h.chunk.page_id.clone()).collect());

        Ok(formatter::format_results(&cleaned_query, intent, &evaluated))
    }

    fn llm_rewriter_if_enabled(&self) -> Option<&dyn LlmRewriter> {
        if self.config.expansion.use_llm_rewrite {
            self.deps.llm_rewriter.as_deref()
        } else {
            None
        }
    }

    fn embed_variants(&self, variants: &[String]) -> Result<Vec<(String, Vec<f32>)>> {
        variants
            .iter()
            .map(|variant| {
                if let Some(cached) = self.embedding_cache.get(variant, &self.config.embedding.model) {
                    return Ok((variant.clone(), cached));
                }
                let embedding = self.deps.embedder.embed(variant)?;
                self.embedding_cache.insert(variant, &self.config.embedding.model, embedding.clone());
                Ok((variant.clone(), embedding))
            })
            .collect()
    }

    async fn hydrate(&self, fused: &[fusion::FusedHit]) -> Result<Vec<RetrievedHit>> {
        let mut hits = Vec::with_capacity(fused.len());
        for f in fused {
            let chunk = if let Some(cached) = self.page_cache.get(&f.chunk_id) {
                Some(cached)
            } else {
                let fetched = self.deps.page_store.get_chunk(&f.chunk_id).await?;
                if let Some(chunk) = &fetched {
                    self.page_cache.insert(chunk.clone());
                }
                fetched
            };
            let Some(chunk) = chunk else { continue };
            let mut hit = RetrievedHit::new(chunk, f.rrf_score);
            hit.vector_rank = f.vector_rank;
            hit.bm25_rank = f.bm25_rank;
            hit.rrf_score = Some(f.rrf_score);
            hit.search_type = Some("fused".to_string());
            hits.push(hit);
        }
        Ok(hits)
    }

    async fn expand_context(&self, mut hits: Vec<RetrievedHit>) -> Vec<RetrievedHit> {
        if !self.config.context.enabled {
            return hits;
        }
        let mode = context::ExpansionMode::parse(&self.config.context.mode);
        for hit in &mut hits {
            context::expand(
                hit,
                mode,
                self.config.context.window,
                self.config.context.related_top_r,
                self.deps.page_store.as_ref(),
                None,
            )
            .await;
        }
        hits
    }

    fn apply_grounding(&self, mut hits: Vec<RetrievedHit>) -> Vec<RetrievedHit> {
        if !self.config.grounding.enabled {
            return hits;
        }
        let doc_texts: Vec<String> = hits.iter().map(|h| h.display_text().to_string()).collect();
        let thresholds = grounding::GroundingThresholds {
            similarity: self.config.grounding.similarity_threshold,
            keyword_overlap: self.config.grounding.keyword_overlap_threshold,
        };
        for hit in &mut hits {
            let result = grounding::detect(hit.display_text(), &doc_texts, None, &[], thresholds);
            hit.possible_hallucination = Some(result.possible_hallucination);
        }
        hits
    }
}
