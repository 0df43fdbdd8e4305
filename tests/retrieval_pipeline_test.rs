//! End-to-end tests of [`wikiretrieve::retrieval::Pipeline`] against fake
//! collaborators: structural override, adaptive fusion, diversity capping,
//! rerank-drops-everything, a failing LLM rewriter, and dimension-mismatch
//! refusal at startup.

#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use wikiretrieve::config::Config;
use wikiretrieve::error::Result;
use wikiretrieve::retrieval::chunk::{BlockType, Chunk, ContentType};
use wikiretrieve::retrieval::providers::{
    DenseHit, LlmRewriter, PageStore, RerankerFamily, RerankerProvider, RetrievalFilter,
    SparseHit, SparseIndex, VectorStore,
};
use wikiretrieve::retrieval::{Pipeline, PipelineDeps};

const DIM: usize = 4;

fn chunk(id: &str, page_id: &str, path: &str) -> Chunk {
    Chunk {
        chunk_id: id.to_string(),
        page_id: page_id.to_string(),
        chunk_index: 0,
        text: format!("Content for {id} describing deployment and rollback steps."),
        space: "ENG".to_string(),
        page_title: path.rsplit('/').next().unwrap_or(path).to_string(),
        page_path: path.to_string(),
        breadcrumb: path.replace('/', " > "),
        heading: "Overview".to_string(),
        heading_level: 1,
        heading_path: String::new(),
        headings_list: vec!["Overview".to_string()],
        labels: BTreeSet::new(),
        content_type: ContentType::Page,
        block_type: BlockType::Text,
        is_complete_block: false,
        created: "2024-01-01T00:00:00Z".to_string(),
        modified: "2024-01-01T00:00:00Z".to_string(),
        created_by: "alice".to_string(),
        modified_by: "alice".to_string(),
        hierarchy_depth: 1,
        attachments: vec![],
        url: format!("https://wiki.example/{path}"),
    }
}

struct FakeEmbedder;

impl wikiretrieve::embedding::Embedder for FakeEmbedder {
    fn dimensions(&self) -> usize {
        DIM
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(vec![text.len() as f32, 0.0, 0.0, 0.0])
    }
}

struct FakeVectorStore {
    dim: usize,
    hits: Vec<DenseHit>,
}

#[async_trait]
impl VectorStore for FakeVectorStore {
    fn dimension(&self) -> usize {
        self.dim
    }

    async fn search(&self, _vector: &[f32], top_k: usize, _filter: Option<&RetrievalFilter>) -> Result<Vec<DenseHit>> {
        Ok(self.hits.iter().take(top_k).cloned().collect())
    }
}

struct EmptyVectorStore {
    dim: usize,
}

#[async_trait]
impl VectorStore for EmptyVectorStore {
    fn dimension(&self) -> usize {
        self.dim
    }

    async fn search(&self, _vector: &[f32], _top_k: usize, _filter: Option<&RetrievalFilter>) -> Result<Vec<DenseHit>> {
        Ok(Vec::new())
    }
}

struct NoSparseIndex;

#[async_trait]
impl SparseIndex for NoSparseIndex {
    async fn search(&self, _query: &str, _top_k: usize, _filter: Option<&RetrievalFilter>) -> Result<Vec<SparseHit>> {
        Ok(Vec::new())
    }
}

struct FakePageStore {
    chunks: Vec<Chunk>,
}

#[async_trait]
impl PageStore for FakePageStore {
    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>> {
        Ok(self.chunks.iter().find(|c| c.chunk_id == chunk_id).cloned())
    }

    async fn get_page_chunks(&self, page_id: &str) -> Result<Vec<Chunk>> {
        Ok(self.chunks.iter().filter(|c| c.page_id == page_id).cloned().collect())
    }

    async fn find_by_structural_path(&self, parts: &[String]) -> Result<Vec<Chunk>> {
        Ok(self
            .chunks
            .iter()
            .filter(|c| {
                let lower = c.page_path.to_lowercase();
                parts.iter().all(|p| lower.contains(&p.to_lowercase()))
            })
            .cloned()
            .collect())
    }
}

struct PassthroughReranker;

impl RerankerProvider for PassthroughReranker {
    fn family(&self) -> RerankerFamily {
        RerankerFamily::BgeStyle
    }

    fn score(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
        Ok(pairs.iter().map(|_| 0.9).collect())
    }
}

struct RejectEverythingReranker;

impl RerankerProvider for RejectEverythingReranker {
    fn family(&self) -> RerankerFamily {
        RerankerFamily::BgeStyle
    }

    fn score(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
        Ok(pairs.iter().map(|_| 0.0).collect())
    }
}

struct FailingRewriter;

#[async_trait]
impl LlmRewriter for FailingRewriter {
    fn model_name(&self) -> &str {
        "llama3.2"
    }

    async fn rewrite(&self, _query: &str, _max_variants: usize) -> Result<Vec<String>> {
        Err(wikiretrieve::error::Error::Retrieval(
            wikiretrieve::error::RetrievalError::UpstreamUnavailable("rewriter down".to_string()),
        ))
    }
}

fn deps_with(
    vector_store: Arc<dyn VectorStore>,
    page_store: Arc<dyn PageStore>,
    reranker: Arc<dyn RerankerProvider>,
    llm_rewriter: Option<Arc<dyn LlmRewriter>>,
) -> PipelineDeps {
    PipelineDeps {
        vector_store,
        sparse_index: Some(Arc::new(NoSparseIndex)),
        page_store,
        embedder: Arc::new(FakeEmbedder),
        reranker,
        llm_rewriter,
    }
}

#[tokio::test]
async fn structural_query_bypasses_fusion_and_rerank() {
    let chunks = vec![chunk("c1", "p1", "Engineering/Deploys/Rollback")];
    let page_store: Arc<dyn PageStore> = Arc::new(FakePageStore { chunks });
    let deps = deps_with(
        Arc::new(EmptyVectorStore { dim: DIM }),
        page_store,
        Arc::new(RejectEverythingReranker),
        None,
    );
    let pipeline = Pipeline::new(Config::from_env().unwrap(), deps).unwrap();

    let report = pipeline
        .semantic_search("Engineering > Rollback", None, None)
        .await
        .unwrap();

    assert!(report.contains("Engineering > Deploys > Rollback"));
}

#[tokio::test]
async fn fused_hits_survive_a_permissive_reranker() {
    let chunks = vec![
        chunk("c1", "p1", "ENG/Setup"),
        chunk("c2", "p2", "ENG/Teardown"),
    ];
    let dense_hits = vec![
        DenseHit { chunk_id: "c1".to_string(), score: 0.9 },
        DenseHit { chunk_id: "c2".to_string(), score: 0.7 },
    ];
    let page_store: Arc<dyn PageStore> = Arc::new(FakePageStore { chunks });
    let deps = deps_with(
        Arc::new(FakeVectorStore { dim: DIM, hits: dense_hits }),
        page_store,
        Arc::new(PassthroughReranker),
        None,
    );
    let pipeline = Pipeline::new(Config::from_env().unwrap(), deps).unwrap();

    let report = pipeline.semantic_search("how to configure deployment", None, None).await.unwrap();

    assert!(report.contains("Results: 2"));
    assert!(report.contains("ENG > Setup"));
    assert!(report.contains("ENG > Teardown"));
}

#[tokio::test]
async fn diversity_cap_limits_chunks_per_page_for_navigational_queries() {
    let chunks: Vec<Chunk> = (0..3).map(|i| chunk(&format!("c{i}"), "same-page", "ENG/Index")).collect();
    let dense_hits: Vec<DenseHit> = chunks
        .iter()
        .enumerate()
        .map(|(i, c)| DenseHit { chunk_id: c.chunk_id.clone(), score: 1.0 - i as f32 * 0.1 })
        .collect();
    let page_store: Arc<dyn PageStore> = Arc::new(FakePageStore { chunks });
    let deps = deps_with(
        Arc::new(FakeVectorStore { dim: DIM, hits: dense_hits }),
        page_store,
        Arc::new(PassthroughReranker),
        None,
    );
    let config = Config::from_env().unwrap();
    let navigational_cap = config.search.diversity_caps.navigational;
    let pipeline = Pipeline::new(config, deps).unwrap();

    let report = pipeline.semantic_search("where is the index page", Some(10), None).await.unwrap();

    let result_line = report.lines().find(|l| l.starts_with("Results:")).unwrap();
    let count: usize = result_line.trim_start_matches("Results:").trim().parse().unwrap();
    assert!(count <= navigational_cap.max(1));
}

#[tokio::test]
async fn rerank_filtering_everything_reports_low_relevance_instead_of_erroring() {
    let chunks = vec![chunk("c1", "p1", "ENG/Setup")];
    let dense_hits = vec![DenseHit { chunk_id: "c1".to_string(), score: 0.9 }];
    let page_store: Arc<dyn PageStore> = Arc::new(FakePageStore { chunks });
    let deps = deps_with(
        Arc::new(FakeVectorStore { dim: DIM, hits: dense_hits }),
        page_store,
        Arc::new(RejectEverythingReranker),
        None,
    );
    let pipeline = Pipeline::new(Config::from_env().unwrap(), deps).unwrap();

    let report = pipeline.semantic_search("obscure query about nothing in particular", None, None).await.unwrap();

    assert!(report.contains("below the relevance threshold"));
    assert!(report.contains("Results: 0"));
}

#[tokio::test]
async fn llm_rewriter_failure_degrades_to_other_expansion_sources() {
    let mut config = Config::from_env().unwrap();
    config.expansion.use_llm_rewrite = true;
    config.expansion.rewrite_model = "a-different-model".to_string();

    let chunks = vec![chunk("c1", "p1", "ENG/Setup")];
    let dense_hits = vec![DenseHit { chunk_id: "c1".to_string(), score: 0.9 }];
    let page_store: Arc<dyn PageStore> = Arc::new(FakePageStore { chunks });
    let deps = deps_with(
        Arc::new(FakeVectorStore { dim: DIM, hits: dense_hits }),
        page_store,
        Arc::new(PassthroughReranker),
        Some(Arc::new(FailingRewriter)),
    );
    let pipeline = Pipeline::new(config, deps).unwrap();

    let report = pipeline.semantic_search("how to configure deployment", None, None).await.unwrap();

    assert!(report.contains("Results: 1"));
}

#[test]
fn dimension_mismatch_refuses_to_construct_the_pipeline() {
    let deps = deps_with(
        Arc::new(EmptyVectorStore { dim: DIM + 1 }),
        Arc::new(FakePageStore { chunks: vec![] }),
        Arc::new(PassthroughReranker),
        None,
    );

    let result = Pipeline::new(Config::from_env().unwrap(), deps);

    assert!(matches!(
        result,
        Err(wikiretrieve::error::Error::Retrieval(
            wikiretrieve::error::RetrievalError::StartupInvariantViolation(_)
        ))
    ));
}
