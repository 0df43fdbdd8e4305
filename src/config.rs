//! Process-wide configuration for the retrieval pipeline.
//!
//! All tunables are read once from the environment at process start; there
//! is no hot-reload. Every field has a concrete default so the pipeline runs
//! out of the box against local defaults (a `localhost` vector store, a
//! `huggingface`-sourced embedder) and only needs overrides in production.

use crate::error::{Error, Result};
use crate::retrieval::query::QueryIntent;
use std::env;

/// Top-level pipeline configuration, assembled once at startup and shared
/// behind an `Arc` by every query.
#[derive(Debug, Clone)]
pub struct Config {
    /// Vector store connection settings.
    pub vector_store: VectorStoreConfig,
    /// Embedding provider selection and model name.
    pub embedding: EmbeddingConfig,
    /// Fusion, reranking, and diversity tunables.
    pub search: SearchConfig,
    /// Context expansion tunables.
    pub context: ContextConfig,
    /// Query expansion tunables, including the optional LLM rewriter.
    pub expansion: ExpansionConfig,
    /// Grounding / hallucination-check tunables.
    pub grounding: GroundingConfig,
    /// Cache sizes and TTLs.
    pub cache: CacheConfig,
}

/// Vector store connection settings.
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    /// Host of the vector store service.
    pub host: String,
    /// Port of the vector store service.
    pub port: u16,
    /// Collection / index name holding chunk vectors.
    pub collection: String,
    /// Optional API key for authenticated deployments.
    pub api_key: Option<String>,
}

/// Embedding provider selection.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// One of `huggingface`, `ollama`, `openai`, `openrouter`.
    pub source: String,
    /// Model identifier for the active source.
    pub model: String,
    /// Expected output dimension; checked against the vector store at
    /// startup (`StartupInvariantViolation` on mismatch).
    pub dimension: usize,
    /// Ollama base URL, used when `source == "ollama"` or as the LLM
    /// rewriter's primary backend.
    pub ollama_url: String,
}

/// Fusion, reranking, and diversity tunables.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Enable the sparse (BM25) leg of hybrid retrieval.
    pub enable_hybrid_search: bool,
    /// Reranker model family name (drives the adaptive-threshold table).
    pub reranker_model: String,
    /// RRF `k` constant.
    pub rrf_k: u32,
    /// Default (dense, sparse) fusion weights, used if an intent has no
    /// specific override below.
    pub default_weights: (f32, f32),
    /// Per-intent fusion weight overrides.
    pub intent_weights: IntentWeights,
    /// Per-intent diversity-filter cap (chunks kept per page).
    pub diversity_caps: IntentCaps,
}

/// Per-intent (dense, sparse) fusion weights.
#[derive(Debug, Clone, Copy)]
pub struct IntentWeights {
    /// Weights for navigational queries.
    pub navigational: (f32, f32),
    /// Weights for exploratory queries.
    pub exploratory: (f32, f32),
    /// Weights for factual queries.
    pub factual: (f32, f32),
    /// Weights for how-to queries.
    pub howto: (f32, f32),
}

impl IntentWeights {
    /// Returns the configured weights for the given intent.
    #[must_use]
    pub const fn for_intent(&self, intent: QueryIntent) -> (f32, f32) {
        match intent {
            QueryIntent::Navigational => self.navigational,
            QueryIntent::Exploratory => self.exploratory,
            QueryIntent::Factual => self.factual,
            QueryIntent::HowTo => self.howto,
        }
    }
}

/// Per-intent diversity-filter caps (chunks kept per page).
#[derive(Debug, Clone, Copy)]
pub struct IntentCaps {
    /// Cap for navigational queries.
    pub navigational: usize,
    /// Cap for factual queries.
    pub factual: usize,
    /// Cap for how-to queries.
    pub howto: usize,
    /// Cap for exploratory queries.
    pub exploratory: usize,
}

impl IntentCaps {
    /// Returns the configured cap for the given intent.
    #[must_use]
    pub const fn for_intent(&self, intent: QueryIntent) -> usize {
        match intent {
            QueryIntent::Navigational => self.navigational,
            QueryIntent::Factual => self.factual,
            QueryIntent::HowTo => self.howto,
            QueryIntent::Exploratory => self.exploratory,
        }
    }
}

/// Context expansion tunables.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Whether context expansion runs at all.
    pub enabled: bool,
    /// Default expansion mode (`bidirectional`, `related`, `all`).
    pub mode: String,
    /// Bidirectional window half-width `w`.
    pub window: usize,
    /// Number of related chunks to append in `related`/`all` mode.
    pub related_top_r: usize,
}

/// Query expansion tunables.
#[derive(Debug, Clone)]
pub struct ExpansionConfig {
    /// Minimum Jaccard similarity for semantic-query-log variant injection.
    pub query_log_similarity_threshold: f32,
    /// Whether the LLM rewriter is consulted at all.
    pub use_llm_rewrite: bool,
    /// Rewriter model name; must differ from `EmbeddingConfig::model`.
    pub rewrite_model: String,
    /// Per-call timeout for the LLM rewrite request, in milliseconds.
    pub rewrite_timeout_ms: u64,
}

/// Grounding / hallucination-check tunables.
#[derive(Debug, Clone)]
pub struct GroundingConfig {
    /// Whether the grounding check runs at all.
    pub enabled: bool,
    /// Minimum semantic similarity signal.
    pub similarity_threshold: f32,
    /// Minimum keyword-overlap signal.
    pub keyword_overlap_threshold: f32,
}

/// Cache sizes and TTLs.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Embedding cache capacity (entries).
    pub embedding_capacity: usize,
    /// Rewrite cache TTL, in seconds.
    pub rewrite_ttl_secs: u64,
    /// Page cache capacity (entries).
    pub page_capacity: usize,
    /// Semantic query log capacity (entries) before quality-based pruning.
    pub query_log_capacity: usize,
}

impl Config {
    /// Builds configuration from environment variables, falling back to the
    /// documented defaults for anything unset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a set environment variable fails to
    /// parse as its expected type.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            vector_store: VectorStoreConfig {
                host: env_or("WIKIRETRIEVE_VECTOR_HOST", "localhost"),
                port: env_parsed("WIKIRETRIEVE_VECTOR_PORT", 6333)?,
                collection: env_or("WIKIRETRIEVE_VECTOR_COLLECTION", "confluence"),
                api_key: env::var("WIKIRETRIEVE_VECTOR_API_KEY").ok(),
            },
            embedding: EmbeddingConfig {
                source: env_or("WIKIRETRIEVE_EMBEDDING_SOURCE", "huggingface"),
                model: env_or("WIKIRETRIEVE_EMBED_MODEL", "ai-forever/FRIDA"),
                dimension: env_parsed("WIKIRETRIEVE_EMBEDDING_DIMENSION", 1024)?,
                ollama_url: env_or("WIKIRETRIEVE_OLLAMA_URL", "http://localhost:11434"),
            },
            search: SearchConfig {
                enable_hybrid_search: env_bool("WIKIRETRIEVE_ENABLE_HYBRID_SEARCH", true)?,
                reranker_model: env_or(
                    "WIKIRETRIEVE_RERANKER_MODEL",
                    "DiTy/cross-encoder-russian-msmarco",
                ),
                rrf_k: env_parsed("WIKIRETRIEVE_RRF_K", 60)?,
                default_weights: (
                    env_parsed("WIKIRETRIEVE_VECTOR_WEIGHT", 0.6)?,
                    env_parsed("WIKIRETRIEVE_BM25_WEIGHT", 0.4)?,
                ),
                intent_weights: IntentWeights {
                    navigational: (0.70, 0.30),
                    exploratory: (0.50, 0.50),
                    factual: (0.60, 0.40),
                    howto: (0.55, 0.45),
                },
                diversity_caps: IntentCaps {
                    navigational: 1,
                    factual: 2,
                    howto: 3,
                    exploratory: 4,
                },
            },
            context: ContextConfig {
                enabled: env_bool("WIKIRETRIEVE_ENABLE_CONTEXT_EXPANSION", true)?,
                mode: env_or("WIKIRETRIEVE_CONTEXT_EXPANSION_MODE", "bidirectional"),
                window: env_parsed("WIKIRETRIEVE_CONTEXT_EXPANSION_SIZE", 2)?,
                related_top_r: env_parsed("WIKIRETRIEVE_CONTEXT_RELATED_TOP_R", 3)?,
            },
            expansion: ExpansionConfig {
                query_log_similarity_threshold: env_parsed(
                    "WIKIRETRIEVE_QUERY_LOG_SIMILARITY_THRESHOLD",
                    0.3,
                )?,
                use_llm_rewrite: env_bool("WIKIRETRIEVE_USE_LLM_QUERY_EXPANSION", false)?,
                rewrite_model: env_or("WIKIRETRIEVE_REWRITE_MODEL", "llama3.2"),
                rewrite_timeout_ms: env_parsed("WIKIRETRIEVE_REWRITE_TIMEOUT_MS", 5_000)?,
            },
            grounding: GroundingConfig {
                enabled: env_bool("WIKIRETRIEVE_ENABLE_HALLUCINATION_DETECTION", false)?,
                similarity_threshold: env_parsed("WIKIRETRIEVE_HALLUCINATION_THRESHOLD", 0.5)?,
                keyword_overlap_threshold: env_parsed(
                    "WIKIRETRIEVE_HALLUCINATION_KEYWORD_OVERLAP",
                    0.3,
                )?,
            },
            cache: CacheConfig {
                embedding_capacity: env_parsed("WIKIRETRIEVE_EMBEDDING_CACHE_CAPACITY", 10_000)?,
                rewrite_ttl_secs: env_parsed("WIKIRETRIEVE_REWRITE_CACHE_TTL_SECS", 3_600)?,
                page_capacity: env_parsed("WIKIRETRIEVE_PAGE_CACHE_CAPACITY", 1_000)?,
                query_log_capacity: env_parsed("WIKIRETRIEVE_QUERY_LOG_CAPACITY", 10_000)?,
            },
        })
    }

    /// Validates cross-field invariants that cannot be checked per-field.
    ///
    /// The caller should run this once at startup, after the embedding
    /// provider and vector store have both reported their real dimensions;
    /// this method only checks the configuration's internal consistency
    /// (the rewrite model must differ from the embedding model when LLM
    /// rewriting is enabled), not the actual live dimension match.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on an internal inconsistency.
    pub fn validate(&self) -> Result<()> {
        if self.expansion.use_llm_rewrite && self.expansion.rewrite_model == self.embedding.model {
            return Err(Error::Config {
                message: format!(
                    "rewrite model {:?} must differ from embedding model {:?}: \
                     refusing to call an embedding model as a chat model",
                    self.expansion.rewrite_model, self.embedding.model
                ),
            });
        }
        Ok(())
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<bool>().map_err(|_| Error::Config {
            message: format!("{key} must be \"true\" or \"false\", got {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}

fn env_parsed<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|e| Error::Config {
            message: format!("invalid value for {key}: {e}"),
        }),
        Err(_) => Ok(default),
    }
}
