//! Query analysis: intent classification, structural-path detection, and
//! filter extraction.

use crate::error::{RetrievalError, Result};
use regex::Regex;
use std::sync::LazyLock;

/// Coarse classification of a query's purpose. Drives fusion weights,
/// reranker thresholds, and the diversity-filter page cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryIntent {
    /// "Where is / find / link to ..." — the user wants one specific page.
    Navigational,
    /// "How do I ..." — the user wants a procedure.
    HowTo,
    /// "What / when / who is ..." — the user wants a fact.
    Factual,
    /// "Which / list / compare ..." — the user wants several results.
    Exploratory,
}

const NAVIGATIONAL_KEYWORDS: &[&str] = &["where", "find", "url", "link", "page"];
const HOWTO_KEYWORDS: &[&str] = &["how", "setup", "install", "configure", "инструкция"];
const FACTUAL_KEYWORDS: &[&str] = &["what", "when", "who", "какой", "что такое"];
const EXPLORATORY_KEYWORDS: &[&str] = &["which", "list", "compare", "какие", "перечисли"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Classifies query intent by case-folded keyword membership. Ties resolve
/// by fixed priority: Navigational > HowTo > Exploratory > Factual. No match
/// defaults to Factual.
#[must_use]
pub fn classify_intent(query: &str) -> QueryIntent {
    let folded = query.to_lowercase();
    if contains_any(&folded, NAVIGATIONAL_KEYWORDS) {
        QueryIntent::Navigational
    } else if contains_any(&folded, HOWTO_KEYWORDS) {
        QueryIntent::HowTo
    } else if contains_any(&folded, EXPLORATORY_KEYWORDS) {
        QueryIntent::Exploratory
    } else if contains_any(&folded, FACTUAL_KEYWORDS) {
        QueryIntent::Factual
    } else {
        QueryIntent::Factual
    }
}

/// Whether a query explicitly names a path through the page hierarchy, and
/// the parts of that path if so.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryStructure {
    /// True when the query looks like a hierarchy path.
    pub is_structural: bool,
    /// Lowercased, trimmed path parts, in query order.
    pub parts: Vec<String>,
}

struct Patterns {
    arrow_separator: Regex,
    block_reference: Regex,
}

static PATTERNS: LazyLock<Patterns> = LazyLock::new(|| Patterns {
    // "A > B > C" — the canonical structural form.
    #[allow(clippy::unwrap_used)]
    arrow_separator: Regex::new(r"\s*>\s*").unwrap(),
    // "по блоку X, а точнее Y" — a common Russian-language phrasing for
    // "in block X, specifically Y", which the source system also treated
    // as a two-part structural path.
    #[allow(clippy::unwrap_used)]
    block_reference: Regex::new(r"(?i)по\s+блоку\s+([^,]+),?\s*а\s+точнее\s+(.+)").unwrap(),
});

/// Detects structural (hierarchy-path) queries.
#[must_use]
pub fn detect_structure(query: &str) -> QueryStructure {
    if query.contains('>') {
        let parts: Vec<String> = PATTERNS
            .arrow_separator
            .split(query)
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        if parts.len() >= 2 {
            return QueryStructure {
                is_structural: true,
                parts,
            };
        }
    }
    if let Some(caps) = PATTERNS.block_reference.captures(query) {
        let parts = vec![
            caps[1].trim().to_lowercase(),
            caps[2].trim().to_lowercase(),
        ];
        return QueryStructure {
            is_structural: true,
            parts,
        };
    }
    QueryStructure::default()
}

/// Filters extracted from free-form query text. Each extraction removes its
/// matched tokens from the working query before the next pass runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFilters {
    /// Restrict results to this wiki space.
    pub space: Option<String>,
    /// Restrict results to pages authored/modified by this user.
    pub author: Option<String>,
    /// Inclusive lower bound on `modified`, as an ISO-8601 date.
    pub date_from: Option<String>,
    /// Inclusive upper bound on `modified`, as an ISO-8601 date.
    pub date_to: Option<String>,
    /// Restrict results to this content type.
    pub content_type: Option<String>,
    /// Restrict results to this page status.
    pub status: Option<String>,
}

struct FilterPatterns {
    space: Regex,
    space_bare: Regex,
    author: Regex,
    author_bare: Regex,
    content_type: Regex,
    content_type_bare: Regex,
    status: Regex,
    status_bare: Regex,
    latest: Regex,
    this_period: Regex,
    after: Regex,
    before: Regex,
}

static FILTER_PATTERNS: LazyLock<FilterPatterns> = LazyLock::new(|| FilterPatterns {
    #[allow(clippy::unwrap_used)]
    space: Regex::new(r"(?i)\b(?:space|проект|пространство)\s*[:=]\s*([A-Za-z0-9_\-]+)\b").unwrap(),
    // "from DevOps", "docs in Engineering" — a bare space name with no
    // keyword/colon syntax, mirroring the original parser's `(?:from|in)` pass.
    #[allow(clippy::unwrap_used)]
    space_bare: Regex::new(r"(?i)\b(?:from|in)\s+(?:space\s+)?([A-Za-z0-9_\-]+)\b").unwrap(),
    #[allow(clippy::unwrap_used)]
    author: Regex::new(r"(?i)\b(?:author|by)\s*[:=]\s*([A-Za-z0-9_\-\.]+)\b").unwrap(),
    // "by John", "written by Иванов", "от Иванова" — no colon required.
    #[allow(clippy::unwrap_used)]
    author_bare: Regex::new(r"(?i)\b(?:by|from|автор|от)\s+([A-Za-zА-Яа-яЁё][A-Za-zА-Яа-яЁё\-]*)\b").unwrap(),
    #[allow(clippy::unwrap_used)]
    content_type: Regex::new(r"(?i)\btype\s*[:=]\s*(page|blogpost|attachment)\b").unwrap(),
    // Bare content-type keywords, including their Russian equivalents.
    #[allow(clippy::unwrap_used)]
    content_type_bare: Regex::new(r"(?i)\b(page|blogpost|attachment|страниц\w*|блог\w*|вложени\w*)\b").unwrap(),
    #[allow(clippy::unwrap_used)]
    status: Regex::new(r"(?i)\bstatus\s*[:=]\s*([A-Za-z0-9_\-]+)\b").unwrap(),
    // Bare status keywords, including their Russian equivalents.
    #[allow(clippy::unwrap_used)]
    status_bare: Regex::new(r"(?i)\b(draft|published|archived|черновик\w*|опубликован\w*|архив\w*)\b").unwrap(),
    #[allow(clippy::unwrap_used)]
    latest: Regex::new(r"(?i)\b(latest|recent|последн\w*|недавн\w*)\b").unwrap(),
    #[allow(clippy::unwrap_used)]
    this_period: Regex::new(r"(?i)\bthis\s+(week|month|year)\b").unwrap(),
    #[allow(clippy::unwrap_used)]
    after: Regex::new(r"(?i)\bafter\s+(\d{4}-\d{2}-\d{2})\b").unwrap(),
    #[allow(clippy::unwrap_used)]
    before: Regex::new(r"(?i)\bbefore\s+(\d{4}-\d{2}-\d{2})\b").unwrap(),
});

/// Normalizes a bare content-type keyword (Latin or Russian) to its
/// canonical `page`/`blogpost`/`attachment` form.
fn normalize_content_type(raw: &str) -> String {
    let lower = raw.to_lowercase();
    if lower.starts_with("страниц") {
        "page".to_string()
    } else if lower.starts_with("блог") {
        "blogpost".to_string()
    } else if lower.starts_with("вложени") {
        "attachment".to_string()
    } else {
        lower
    }
}

/// Normalizes a bare status keyword (Latin or Russian) to its canonical
/// `draft`/`published`/`archived` form.
fn normalize_status(raw: &str) -> String {
    let lower = raw.to_lowercase();
    if lower.starts_with("черновик") {
        "draft".to_string()
    } else if lower.starts_with("опубликован") {
        "published".to_string()
    } else if lower.starts_with("архив") {
        "archived".to_string()
    } else {
        lower
    }
}

/// Extracts `ExtractedFilters` from a raw query and returns them alongside
/// the query with matched tokens removed ("cleaned_query").
///
/// Each pass runs in order (space, author, date, content_type, status); each
/// tries its keyword/colon form first, falling back to a bare recognizable
/// token when that form does not match. Within a pass, a failed match is
/// silent and leaves the query untouched.
#[must_use]
pub fn extract_filters(query: &str) -> (String, ExtractedFilters) {
    let mut working = query.to_string();
    let mut filters = ExtractedFilters::default();

    if let Some(caps) = FILTER_PATTERNS.space.captures(&working) {
        filters.space = Some(caps[1].to_string());
        working = FILTER_PATTERNS.space.replace(&working, "").to_string();
    } else if let Some(caps) = FILTER_PATTERNS.space_bare.captures(&working) {
        filters.space = Some(caps[1].to_string());
        working = FILTER_PATTERNS.space_bare.replace(&working, "").to_string();
    }
    if let Some(caps) = FILTER_PATTERNS.author.captures(&working) {
        filters.author = Some(caps[1].to_string());
        working = FILTER_PATTERNS.author.replace(&working, "").to_string();
    } else if let Some(caps) = FILTER_PATTERNS.author_bare.captures(&working) {
        filters.author = Some(caps[1].to_string());
        working = FILTER_PATTERNS.author_bare.replace(&working, "").to_string();
    }
    extract_date_filter(&mut working, &mut filters);
    if let Some(caps) = FILTER_PATTERNS.content_type.captures(&working) {
        filters.content_type = Some(caps[1].to_lowercase());
        working = FILTER_PATTERNS.content_type.replace(&working, "").to_string();
    } else if let Some(caps) = FILTER_PATTERNS.content_type_bare.captures(&working) {
        filters.content_type = Some(normalize_content_type(&caps[1]));
        working = FILTER_PATTERNS.content_type_bare.replace(&working, "").to_string();
    }
    if let Some(caps) = FILTER_PATTERNS.status.captures(&working) {
        filters.status = Some(caps[1].to_lowercase());
        working = FILTER_PATTERNS.status.replace(&working, "").to_string();
    } else if let Some(caps) = FILTER_PATTERNS.status_bare.captures(&working) {
        filters.status = Some(normalize_status(&caps[1]));
        working = FILTER_PATTERNS.status_bare.replace(&working, "").to_string();
    }

    let cleaned = working.split_whitespace().collect::<Vec<_>>().join(" ");
    (cleaned, filters)
}

fn extract_date_filter(working: &mut String, filters: &mut ExtractedFilters) {
    if let Some(caps) = FILTER_PATTERNS.after.captures(working) {
        filters.date_from = Some(caps[1].to_string());
        *working = FILTER_PATTERNS.after.replace(working, "").to_string();
        return;
    }
    if let Some(caps) = FILTER_PATTERNS.before.captures(working) {
        filters.date_to = Some(caps[1].to_string());
        *working = FILTER_PATTERNS.before.replace(working, "").to_string();
        return;
    }
    if FILTER_PATTERNS.latest.is_match(working) {
        filters.date_from = Some(days_ago_placeholder(30));
        *working = FILTER_PATTERNS.latest.replace(working, "").to_string();
        return;
    }
    if let Some(caps) = FILTER_PATTERNS.this_period.captures(working) {
        let days = match &caps[1].to_lowercase()[..] {
            "week" => 7,
            "month" => 30,
            _ => 365,
        };
        filters.date_from = Some(days_ago_placeholder(days));
        *working = FILTER_PATTERNS.this_period.replace(working, "").to_string();
    }
}

/// Placeholder date marker for "N days ago", resolved against wall-clock
/// time by the caller that actually issues the vector-store filter (this
/// module stays free of a `now()` dependency so it can be unit tested
/// deterministically).
fn days_ago_placeholder(days: u32) -> String {
    format!("-{days}d")
}

/// Runs filter extraction, then fails with `QueryTooShort` if nothing
/// alphanumeric survives.
///
/// # Errors
///
/// Returns [`RetrievalError::QueryTooShort`] when the cleaned query has no
/// alphanumeric tokens.
pub fn clean_and_validate(query: &str) -> Result<(String, ExtractedFilters)> {
    let (cleaned, filters) = extract_filters(query);
    let has_alphanumeric = cleaned.chars().any(char::is_alphanumeric);
    if !has_alphanumeric {
        return Err(RetrievalError::QueryTooShort(query.to_string()).into());
    }
    Ok((cleaned, filters))
}
