//! Deterministic response formatting: turns a ranked hit list (or an
//! error condition) into the human-readable report returned to callers.

use crate::retrieval::chunk::RetrievedHit;
use crate::retrieval::query::QueryIntent;

/// Preview length for ordinary text blocks.
const TEXT_PREVIEW_CHARS: usize = 500;

/// Preview length for tables/lists/complete blocks, which are harder to
/// usefully truncate at the ordinary length.
const STRUCTURED_PREVIEW_CHARS: usize = 2400;

/// Maximum number of relevant headings shown per hit.
const MAX_HEADINGS: usize = 3;

/// Formats a successful result set into the standard report.
#[must_use]
pub fn format_results(query: &str, intent: QueryIntent, hits: &[RetrievedHit]) -> String {
    let mut out = String::new();
    out.push_str(&format!("Query: {query}\nIntent: {intent:?}\n"));
    out.push_str(&format!("Results: {}\n\n", hits.len()));

    for (i, hit) in hits.iter().enumerate() {
        out.push_str(&format_hit(i + 1, hit, query));
        out.push('\n');
    }
    out
}

fn format_hit(rank: usize, hit: &RetrievedHit, query: &str) -> String {
    let chunk = &hit.chunk;
    let final_score = hit.ordering_score();
    let emoji = score_emoji(final_score);

    let mut block = String::new();
    block.push_str(&format!(
        "{rank}. {emoji} {breadcrumb} (score: {final_score:.3})\n",
        breadcrumb = chunk.breadcrumb
    ));
    block.push_str(&format!(
        "   space: {space} | chunk: {chunk_index}\n",
        space = chunk.space,
        chunk_index = chunk.chunk_index
    ));

    if let (Some(h), Some(p)) = (hit.hierarchy_boost, hit.path_boost) {
        block.push_str(&format!(
            "   boosts: hierarchy={h:.2} path={p:.2} rerank={rerank:.3}\n",
            rerank = hit.rerank_score.unwrap_or(0.0)
        ));
    }

    let headings = relevant_headings(chunk, query);
    if !headings.is_empty() {
        block.push_str(&format!("   headings: {}\n", headings.join(", ")));
    }

    if !chunk.labels.is_empty() {
        let labels: Vec<&str> = chunk.labels.iter().map(String::as_str).collect();
        block.push_str(&format!("   labels: {}\n", labels.join(", ")));
    }
    if !chunk.created_by.is_empty() {
        block.push_str(&format!("   author: {}\n", chunk.created_by));
    }
    if !chunk.attachments.is_empty() {
        block.push_str(&format!("   attachments: {}\n", chunk.attachments.join(", ")));
    }
    if !chunk.url.is_empty() {
        block.push_str(&format!("   url: {}\n", chunk.url));
    }

    block.push_str(&format!("   {}\n", preview(hit)));
    block
}

fn score_emoji(score: f32) -> &'static str {
    if score > 0.7 {
        "\u{1F7E2}"
    } else if score > 0.3 {
        "\u{1F7E1}"
    } else if score > 0.1 {
        "\u{1F7E0}"
    } else {
        "\u{26AA}"
    }
}

fn relevant_headings(chunk: &crate::retrieval::chunk::Chunk, query: &str) -> Vec<String> {
    let query_tokens = crate::retrieval::chunk::tokenize(query);
    let mut matching: Vec<String> = chunk
        .headings_list
        .iter()
        .filter(|h| {
            let heading_tokens = crate::retrieval::chunk::tokenize(h);
            !query_tokens.is_disjoint(&heading_tokens)
        })
        .cloned()
        .collect();
    if matching.is_empty() {
        matching = chunk.headings_list.iter().take(MAX_HEADINGS).cloned().collect();
    } else {
        matching.truncate(MAX_HEADINGS);
    }
    matching
}

fn preview(hit: &RetrievedHit) -> String {
    let text = hit.display_text();
    let is_structured = matches!(
        hit.chunk.block_type,
        crate::retrieval::chunk::BlockType::Table | crate::retrieval::chunk::BlockType::List
    ) || hit.chunk.is_complete_block;
    let cap = if is_structured {
        STRUCTURED_PREVIEW_CHARS
    } else {
        TEXT_PREVIEW_CHARS
    };
    truncate_chars(text, cap)
}

fn truncate_chars(text: &str, cap: usize) -> String {
    if text.chars().count() <= cap {
        return text.to_string();
    }
    let truncated: String = text.chars().take(cap).collect();
    format!("{truncated} (truncated)")
}

/// Formats a "no results" report, including query-refinement suggestions.
#[must_use]
pub fn format_no_results(query: &str, intent: QueryIntent) -> String {
    format!(
        "Query: {query}\nIntent: {intent:?}\nResults: 0\n\n\
         No results found. Try broadening the query, removing filters, \
         or checking for typos in technical terms.\n"
    )
}

/// Formats a "low relevance" report when every candidate was filtered by
/// the rerank threshold.
#[must_use]
pub fn format_low_relevance(
    query: &str,
    intent: QueryIntent,
    threshold: f32,
    min_score: f32,
    max_score: f32,
) -> String {
    format!(
        "Query: {query}\nIntent: {intent:?}\nResults: 0\n\n\
         All candidates fell below the relevance threshold ({threshold:.4}). \
         Observed rerank scores ranged {min_score:.4}..{max_score:.4}. \
         Try a more specific query.\n"
    )
}

/// Formats a "service unavailable" report naming the degraded upstream.
#[must_use]
pub fn format_service_unavailable(query: &str, upstream: &str) -> String {
    format!("Query: {query}\n\nThe {upstream} service is currently unavailable. Please retry shortly.\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::chunk::{BlockType, Chunk, ContentType};

    fn sample_hit(score: f32) -> RetrievedHit {
        let chunk = Chunk {
            chunk_id: "c1".to_string(),
            page_id: "p1".to_string(),
            chunk_index: 0,
            text: "a".repeat(600),
            space: "ENG".to_string(),
            page_title: "API Guide".to_string(),
            page_path: "ENG/API Guide".to_string(),
            breadcrumb: "ENG > API Guide".to_string(),
            heading: "Setup".to_string(),
            heading_level: 2,
            heading_path: String::new(),
            headings_list: vec!["Setup".to_string(), "Usage".to_string()],
            labels: Default::default(),
            content_type: ContentType::Page,
            block_type: BlockType::Text,
            is_complete_block: false,
            created: String::new(),
            modified: String::new(),
            created_by: "alice".to_string(),
            modified_by: String::new(),
            hierarchy_depth: 1,
            attachments: vec![],
            url: "https://wiki.example/ENG/API".to_string(),
        };
        let mut hit = RetrievedHit::new(chunk, score);
        hit.final_score = Some(score);
        hit.rerank_score = Some(score * 0.8);
        hit.hierarchy_boost = Some(0.1);
        hit.path_boost = Some(0.05);
        hit
    }

    #[test]
    fn high_score_gets_green_emoji() {
        assert_eq!(score_emoji(0.8), "\u{1F7E2}");
        assert_eq!(score_emoji(0.5), "\u{1F7E1}");
        assert_eq!(score_emoji(0.2), "\u{1F7E0}");
        assert_eq!(score_emoji(0.05), "\u{26AA}");
    }

    #[test]
    fn text_preview_truncates_at_500_chars() {
        let hit = sample_hit(0.9);
        let result = preview(&hit);
        assert!(result.ends_with("(truncated)"));
    }

    #[test]
    fn format_results_includes_breadcrumb_and_score() {
        let hits = vec![sample_hit(0.9)];
        let output = format_results("API setup", QueryIntent::Factual, &hits);
        assert!(output.contains("ENG > API Guide"));
        assert!(output.contains("0.900"));
    }

    #[test]
    fn no_results_report_mentions_refinement() {
        let output = format_no_results("xyzzy", QueryIntent::Factual);
        assert!(output.contains("No results found"));
    }

    #[test]
    fn low_relevance_report_includes_threshold_and_range() {
        let output = format_low_relevance("xyzzy", QueryIntent::Factual, 0.001, 0.0001, 0.0004);
        assert!(output.contains("0.0010"));
        assert!(output.contains("0.0001"));
    }
}
