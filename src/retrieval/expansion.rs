//! Query expansion: combines the semantic query log, the synonyms
//! manager, an optional LLM rewriter, and light normalization into a
//! bounded set of query variants to fan out retrieval over.

use crate::retrieval::cache::RewriteCache;
use crate::retrieval::providers::LlmRewriter;
use crate::retrieval::query_log::SemanticQueryLog;
use crate::retrieval::synonyms::SynonymsManager;

/// Adaptive cap on the number of variants (including the original) based
/// on the original query's token count.
#[must_use]
pub fn max_variants_for(query: &str) -> usize {
    match query.split_whitespace().count() {
        0..=2 => 5,
        3..=4 => 3,
        _ => 2,
    }
}

/// The query expander's output: every variant to run retrieval against,
/// with the original always first.
#[derive(Debug, Clone, Default)]
pub struct ExpansionSet {
    /// Ordered, deduplicated query variants, original first.
    pub variants: Vec<String>,
    /// Whether the LLM rewriter was consulted and failed (timeout or
    /// upstream error) — surfaced for logging, not as a user-facing error.
    pub llm_rewrite_unavailable: bool,
}

/// Produces the bounded variant set for `query`.
///
/// Consults, in priority order: the semantic query log (successful past
/// queries above the configured Jaccard similarity), the synonyms
/// manager, an optional LLM rewriter (cached, soft-failing on timeout or
/// error), and a stopword-stripped normalized form. Always keeps the
/// original query at index 0 and stops once `max_variants_for(query)`
/// variants have been collected.
pub async fn expand_query(
    query: &str,
    query_log: &SemanticQueryLog,
    query_log_similarity_threshold: f32,
    synonyms: &SynonymsManager,
    llm_rewriter: Option<&dyn LlmRewriter>,
    rewrite_cache: &RewriteCache,
) -> ExpansionSet {
    let max_variants = max_variants_for(query);
    let mut variants = vec![query.to_string()];
    let mut llm_rewrite_unavailable = false;

    push_unique(&mut variants, || {
        query_log
            .similar_successful(query, query_log_similarity_threshold, max_variants)
            .into_iter()
            .map(|(entry, _)| entry.query)
            .collect()
    });

    if variants.len() < max_variants {
        push_unique(&mut variants, || synonyms.expand_query(query));
    }

    if variants.len() < max_variants {
        if let Some(rewriter) = llm_rewriter {
            if let Some(cached) = rewrite_cache.get(query) {
                push_unique(&mut variants, || cached);
            } else {
                match rewriter.rewrite(query, max_variants).await {
                    Ok(rewritten) => {
                        rewrite_cache.insert(query, rewritten.clone());
                        push_unique(&mut variants, || rewritten);
                    }
                    Err(_) => llm_rewrite_unavailable = true,
                }
            }
        }
    }

    if variants.len() < max_variants {
        push_unique(&mut variants, || vec![stopword_stripped(query)]);
    }

    if variants.len() < max_variants {
        push_unique(&mut variants, || domain_normalized(query));
    }

    variants.truncate(max_variants);
    ExpansionSet {
        variants,
        llm_rewrite_unavailable,
    }
}

fn push_unique(variants: &mut Vec<String>, produce: impl FnOnce() -> Vec<String>) {
    for candidate in produce() {
        let normalized = candidate.trim().to_string();
        if normalized.is_empty() {
            continue;
        }
        if !variants.iter().any(|v| v.eq_ignore_ascii_case(&normalized)) {
            variants.push(normalized);
        }
    }
}

/// Known wiki space keys, consulted by the fifth expansion source: a query
/// naming a space in the "wrong" case still needs a same-case variant to
/// match server-side filters that compare space keys verbatim.
const KNOWN_SPACE_KEYS: &[&str] = &["eng", "ops", "hr", "devops", "qa", "sales", "ux"];

/// Fifth expansion source: for each token matching a known space key
/// case-insensitively, emits a variant with that token's case flipped
/// (uppercased if it wasn't all-uppercase, lowercased if it was).
fn domain_normalized(query: &str) -> Vec<String> {
    let mut variants = Vec::new();
    for word in query.split_whitespace() {
        let trimmed: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
        if trimmed.is_empty() {
            continue;
        }
        if !KNOWN_SPACE_KEYS.contains(&trimmed.to_lowercase().as_str()) {
            continue;
        }
        let upper = trimmed.to_uppercase();
        let lower = trimmed.to_lowercase();
        if upper != trimmed {
            variants.push(substitute_case_variant(query, &trimmed, &upper));
        }
        if lower != trimmed {
            variants.push(substitute_case_variant(query, &trimmed, &lower));
        }
    }
    variants
}

fn substitute_case_variant(text: &str, from: &str, to: &str) -> String {
    text.split_whitespace()
        .map(|w| {
            let trimmed: String = w.chars().filter(|c| c.is_alphanumeric()).collect();
            if trimmed == from { to.to_string() } else { w.to_string() }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn stopword_stripped(query: &str) -> String {
    const STOPWORDS: &[&str] = &[
        "a", "an", "the", "of", "for", "to", "in", "on", "and", "or", "is", "are", "how", "what",
        "where", "when", "who", "do", "does", "from",
    ];
    let stopwords: std::collections::HashSet<&str> = STOPWORDS.iter().copied().collect();
    query
        .split_whitespace()
        .filter(|w| {
            let lower: String = w
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase();
            !stopwords.contains(lower.as_str())
        })
        .collect::<Vec<_>>()
        .join(" ")
}
