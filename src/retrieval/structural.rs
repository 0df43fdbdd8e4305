//! Structural search: when a query names an explicit path through the wiki
//! hierarchy ("A > B > C", or the Russian "по блоку X, а точнее Y" phrasing),
//! search the page store's path index directly instead of trusting the
//! fused dense/sparse ranking.
//!
//! A non-empty hit here replaces the fused result list outright rather than
//! merging into it — a user who typed a path already knows where they're
//! going. An empty match falls back to the fused path.

use crate::error::Result;
use crate::retrieval::chunk::{Chunk, RetrievedHit};
use crate::retrieval::providers::PageStore;
use crate::retrieval::query::QueryStructure;

/// Additive bonus applied per matched path segment found in the right
/// relative order, on top of the base per-segment match count.
const ORDER_BONUS: f32 = 1.0;

/// Runs the structural override search for a detected path, if any.
///
/// Returns `None` if `structure` carries no path, or if a path was detected
/// but the page store had no matching chunks — either way the caller falls
/// through to the fused pipeline. Only a non-empty match short-circuits it.
///
/// # Errors
///
/// Propagates errors from the page store.
pub async fn search_structural(
    structure: &QueryStructure,
    page_store: &dyn PageStore,
) -> Result<Option<Vec<RetrievedHit>>> {
    if !structure.is_structural || structure.parts.is_empty() {
        return Ok(None);
    }
    let parts = &structure.parts;

    let chunks = page_store.find_by_structural_path(parts).await?;
    if chunks.is_empty() {
        return Ok(None);
    }
    let mut hits: Vec<RetrievedHit> = chunks
        .into_iter()
        .map(|chunk| {
            let score = score_match(&chunk, parts);
            let mut hit = RetrievedHit::new(chunk, score);
            hit.search_type = Some("structural".to_string());
            hit
        })
        .collect();
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    Ok(Some(hits))
}

/// Scores a structural hit by how many path segments matched the chunk's
/// `page_path`, plus [`ORDER_BONUS`] if they appeared in the queried order.
fn score_match(chunk: &Chunk, parts: &[String]) -> f32 {
    let path_lower = chunk.page_path.to_lowercase();
    let matched: Vec<&String> = parts
        .iter()
        .filter(|part| path_lower.contains(&part.to_lowercase()))
        .collect();
    if matched.is_empty() {
        return 0.0;
    }

    let mut base = matched.len() as f32;
    let mut last_position = 0usize;
    let mut in_order = true;
    for part in &matched {
        match path_lower[last_position..].find(&part.to_lowercase()) {
            Some(offset) => last_position += offset + part.len(),
            None => {
                in_order = false;
                break;
            }
        }
    }
    if in_order {
        base += ORDER_BONUS;
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::chunk::{BlockType, ContentType};
    use async_trait::async_trait;
    use std::collections::BTreeSet;

    fn sample_chunk(page_path: &str) -> Chunk {
        Chunk {
            chunk_id: format!("c-{page_path}"),
            page_id: "p1".to_string(),
            chunk_index: 0,
            text: "content".to_string(),
            space: "ENG".to_string(),
            page_title: "Title".to_string(),
            page_path: page_path.to_string(),
            breadcrumb: page_path.replace('/', " > "),
            heading: String::new(),
            heading_level: 0,
            heading_path: String::new(),
            headings_list: vec![],
            labels: BTreeSet::new(),
            content_type: ContentType::Page,
            block_type: BlockType::Text,
            is_complete_block: false,
            created: String::new(),
            modified: String::new(),
            created_by: String::new(),
            modified_by: String::new(),
            hierarchy_depth: 0,
            attachments: vec![],
            url: String::new(),
        }
    }

    struct FakePageStore {
        chunks: Vec<Chunk>,
    }

    #[async_trait]
    impl PageStore for FakePageStore {
        async fn get_chunk(&self, _chunk_id: &str) -> Result<Option<Chunk>> {
            Ok(None)
        }

        async fn get_page_chunks(&self, _page_id: &str) -> Result<Vec<Chunk>> {
            Ok(vec![])
        }

        async fn find_by_structural_path(&self, parts: &[String]) -> Result<Vec<Chunk>> {
            Ok(self
                .chunks
                .iter()
                .filter(|c| {
                    let lower = c.page_path.to_lowercase();
                    parts.iter().any(|p| lower.contains(&p.to_lowercase()))
                })
                .cloned()
                .collect())
        }
    }

    #[tokio::test]
    async fn no_path_returns_none() {
        let store = FakePageStore { chunks: vec![] };
        let structure = QueryStructure {
            is_structural: false,
            parts: vec![],
        };
        let result = search_structural(&structure, &store).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn matching_path_replaces_with_structural_hits() {
        let store = FakePageStore {
            chunks: vec![sample_chunk("Engineering/Deploys/Rollback")],
        };
        let structure = QueryStructure {
            is_structural: true,
            parts: vec!["Engineering".to_string(), "Rollback".to_string()],
        };
        let result = search_structural(&structure, &store).await.unwrap();
        let hits = result.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].search_type.as_deref(), Some("structural"));
        assert!(hits[0].score > 2.0);
    }

    #[tokio::test]
    async fn no_store_hits_falls_back_to_fused_path() {
        let store = FakePageStore { chunks: vec![] };
        let structure = QueryStructure {
            is_structural: true,
            parts: vec!["Nonexistent".to_string()],
        };
        let result = search_structural(&structure, &store).await.unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn in_order_match_scores_higher_than_out_of_order() {
        let in_order = sample_chunk("Engineering/Deploys/Rollback");
        let out_of_order = sample_chunk("Rollback/Deploys/Engineering");
        let parts = vec!["Engineering".to_string(), "Rollback".to_string()];
        assert!(score_match(&in_order, &parts) > score_match(&out_of_order, &parts));
    }
}
