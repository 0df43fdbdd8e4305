//! # wikiretrieve
//!
//! A query-time retrieval engine over a wiki-style knowledge base.
//!
//! Given a free-form natural-language question, the [`retrieval`] pipeline
//! classifies intent, expands the query into paraphrase variants, fans out
//! dense and sparse retrieval across those variants concurrently, fuses the
//! results with reciprocal rank fusion, reranks with a cross-encoder plus
//! structural boosts, filters for per-page diversity, expands context, checks
//! grounding, and formats a deterministic report. See [`retrieval::Pipeline`]
//! for the entry point.
//!
//! The [`core`], [`chunking`], [`storage`], and [`cli`] modules implement a
//! separate, smaller concern: loading local text buffers into chunks for
//! ad-hoc inspection. They predate the retrieval pipeline and do not feed it;
//! the pipeline reads its corpus from the external stores described in
//! [`retrieval::providers`].
//!
//! ## Features
//!
//! - **Hybrid retrieval**: dense (vector) + sparse (BM25) fusion via RRF
//! - **Cross-encoder reranking** with hierarchy and path boosts
//! - **Query expansion**: synonyms, query-log history, optional LLM rewrite
//! - **Chunking**: local buffer chunking strategies (fixed, semantic, parallel)
//! - **`SQLite` Storage**: persistent local buffer state with transactions

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
// Note: unsafe is needed for memory-mapped I/O (memmap2)
#![warn(unsafe_code)]

pub mod chunking;
pub mod cli;
pub mod config;
pub mod core;
pub mod embedding;
pub mod error;
pub mod io;
pub mod retrieval;
pub mod search;
pub mod storage;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

// Re-export core domain types
pub use core::{Buffer, BufferMetadata, Chunk, ChunkMetadata, Context, ContextValue};

// Re-export storage types
pub use storage::{DEFAULT_DB_PATH, SqliteStorage, Storage};

// Re-export chunking types
pub use chunking::{Chunker, FixedChunker, SemanticChunker, available_strategies, create_chunker};

// Re-export CLI types
pub use cli::{Cli, Commands, OutputFormat};

// Re-export embedding types
#[cfg(feature = "fastembed-embeddings")]
pub use embedding::FastEmbedEmbedder;
pub use embedding::{
    DEFAULT_DIMENSIONS, Embedder, FallbackEmbedder, cosine_similarity, create_embedder,
};

// Re-export search types
pub use search::{
    DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_TOP_K, RrfConfig, SearchConfig, SearchResult,
    buffer_fully_embedded, embed_buffer_chunks, hybrid_search, reciprocal_rank_fusion, search_bm25,
    search_semantic, weighted_rrf,
};

// Re-export retrieval pipeline types
pub use retrieval::{Pipeline, PipelineConfig};
