//! The synonyms manager: a layered dictionary consulted by the query
//! expander. Lookup only — mining new synonyms from query-log
//! co-occurrence is an ingest-side concern and lives outside this crate;
//! this manager only exposes the mutator the ingest layer would call.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Words too common to carry query intent on their own; stripped before
/// keyword extraction.
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "of", "for", "to", "in", "on", "and", "or", "is", "are", "how", "what",
    "where", "when", "who", "do", "does", "from",
    "и", "в", "на", "для", "по", "как", "что", "где", "когда",
];

/// Keywords looked up verbatim never get substituted — typically proper
/// nouns the caller has flagged as identifying a specific thing, not a
/// concept with synonyms.
const DEFAULT_BLACKLIST: &[&str] = &[];

/// Maximum number of keywords drawn from a query for synonym substitution.
const MAX_KEYWORDS: usize = 3;

fn seed_vocabulary() -> HashMap<String, Vec<String>> {
    let pairs: &[(&str, &[&str])] = &[
        ("configuration", &["config", "settings", "setup"]),
        ("config", &["configuration", "settings"]),
        ("documentation", &["docs", "guide", "manual"]),
        ("docs", &["documentation", "guide"]),
        ("api", &["interface", "endpoint"]),
        ("deploy", &["deployment", "release", "rollout"]),
        ("deployment", &["deploy", "release"]),
        ("настройка", &["конфигурация", "настройки"]),
        ("руководство", &["документация", "инструкция"]),
    ];
    pairs
        .iter()
        .map(|(k, vs)| ((*k).to_string(), vs.iter().map(|v| (*v).to_string()).collect()))
        .collect()
}

/// A three-layer synonym dictionary: a static seed vocabulary, an
/// auto-mined layer, and a learned layer, all consulted together on
/// lookup.
pub struct SynonymsManager {
    static_layer: HashMap<String, Vec<String>>,
    auto_mined: RwLock<HashMap<String, Vec<String>>>,
    learned: RwLock<HashMap<String, Vec<String>>>,
    blacklist: HashSet<String>,
}

impl Default for SynonymsManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SynonymsManager {
    /// Builds a manager with the seed vocabulary and an empty
    /// auto-mined/learned layer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            static_layer: seed_vocabulary(),
            auto_mined: RwLock::new(HashMap::new()),
            learned: RwLock::new(HashMap::new()),
            blacklist: DEFAULT_BLACKLIST.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Records a synonym pair learned from query-log co-occurrence. The
    /// manager never mines this itself; an external ingest process calls
    /// this as statistics accumulate.
    pub fn add_learned_synonym(&self, keyword: &str, synonym: &str) {
        #[allow(clippy::unwrap_used)]
        let mut learned = self.learned.write().unwrap();
        let entry = learned.entry(keyword.to_lowercase()).or_default();
        let synonym = synonym.to_lowercase();
        if !entry.contains(&synonym) {
            entry.push(synonym);
        }
    }

    /// Returns every synonym known for `keyword` across all three layers,
    /// deduplicated.
    #[must_use]
    pub fn lookup(&self, keyword: &str) -> Vec<String> {
        let keyword = keyword.to_lowercase();
        if self.blacklist.contains(&keyword) {
            return Vec::new();
        }
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        let mut push_all = |values: &[String]| {
            for v in values {
                if seen.insert(v.clone()) {
                    result.push(v.clone());
                }
            }
        };
        if let Some(values) = self.static_layer.get(&keyword) {
            push_all(values);
        }
        #[allow(clippy::unwrap_used)]
        if let Some(values) = self.auto_mined.read().unwrap().get(&keyword) {
            push_all(values);
        }
        #[allow(clippy::unwrap_used)]
        if let Some(values) = self.learned.read().unwrap().get(&keyword) {
            push_all(values);
        }
        result
    }

    /// Extracts up to [`MAX_KEYWORDS`] content keywords from `query` (stop
    /// words and blacklisted terms removed) and, for each, produces one
    /// variant per known synonym via whole-word substitution.
    #[must_use]
    pub fn expand_query(&self, query: &str) -> Vec<String> {
        let keywords = extract_keywords(query, &self.blacklist);
        let mut variants = Vec::new();
        for keyword in keywords {
            for synonym in self.lookup(&keyword) {
                variants.push(substitute_whole_word(query, &keyword, &synonym));
            }
        }
        variants
    }
}

fn extract_keywords(query: &str, blacklist: &HashSet<String>) -> Vec<String> {
    let stopwords: HashSet<&str> = STOPWORDS.iter().copied().collect();
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .filter(|w| !stopwords.contains(w.as_str()) && !blacklist.contains(w))
        .take(MAX_KEYWORDS)
        .collect()
}

fn substitute_whole_word(text: &str, from: &str, to: &str) -> String {
    let words: Vec<String> = text
        .split_whitespace()
        .map(|w| {
            let trimmed: String = w.chars().filter(|c| c.is_alphanumeric()).collect();
            if trimmed.eq_ignore_ascii_case(from) {
                to.to_string()
            } else {
                w.to_string()
            }
        })
        .collect();
    words.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_vocabulary_lookup_finds_synonyms() {
        let manager = SynonymsManager::new();
        let synonyms = manager.lookup("docs");
        assert!(synonyms.contains(&"documentation".to_string()));
    }

    #[test]
    fn blacklisted_keyword_yields_no_synonyms() {
        let mut manager = SynonymsManager::new();
        manager.blacklist.insert("docs".to_string());
        assert!(manager.lookup("docs").is_empty());
    }

    #[test]
    fn learned_synonym_is_returned_after_add() {
        let manager = SynonymsManager::new();
        manager.add_learned_synonym("rollback", "revert");
        assert_eq!(manager.lookup("rollback"), vec!["revert".to_string()]);
    }

    #[test]
    fn expand_query_substitutes_whole_words_only() {
        let manager = SynonymsManager::new();
        let variants = manager.expand_query("latest docs from DevOps");
        assert!(variants.iter().any(|v| v.contains("documentation")));
        assert!(variants.iter().all(|v| !v.contains("documentationOps")));
    }

    #[test]
    fn keyword_extraction_caps_at_three_and_skips_stopwords() {
        let blacklist = HashSet::new();
        let keywords = extract_keywords("how to configure the api gateway settings quickly", &blacklist);
        assert!(keywords.len() <= MAX_KEYWORDS);
        assert!(!keywords.contains(&"how".to_string()));
    }
}
