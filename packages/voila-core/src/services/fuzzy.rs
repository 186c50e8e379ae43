//! Weighted fuzzy matching over the service catalog.
//!
//! Scores each catalog entry against the caller's spoken request using a mix
//! of exact token hits (with a bonus for medical vocabulary), normalized
//! edit-distance ratios, and per-word hits, minus a penalty for known
//! irrelevant matches. Only entries above a fixed threshold survive, sorted
//! by score with catalog order breaking ties.

use std::collections::BTreeSet;
use std::sync::Arc;

use strsim::normalized_levenshtein;

use crate::services::catalog::ServiceCatalog;
use crate::services::types::{HealthService, ServiceSearchResponse};
use crate::utils::normalize_spoken;

/// Default number of results presented to the caller.
pub const DEFAULT_SEARCH_LIMIT: usize = 3;
/// Hard cap on presented results.
pub const MAX_SEARCH_LIMIT: usize = 5;
/// Minimum score for a catalog entry to be considered a match.
const SCORE_THRESHOLD: f64 = 40.0;

/// Tokens that get the higher exact-match bonus.
const MEDICAL_KEYWORDS: [&str; 12] = [
    "radiografia",
    "rx",
    "caviglia",
    "cuore",
    "sangue",
    "denti",
    "cardiologia",
    "analisi",
    "esame",
    "tc",
    "tac",
    "tomografia",
];

/// Tokens that drag a service name down when present.
const IRRELEVANT_TERMS: [&str; 4] = ["peeling", "gemellare", "fetale", "pediatrica"];

// ─────────────────────────────────────────────────────────────────────────────
// Edit-distance ratios
// ─────────────────────────────────────────────────────────────────────────────

/// Similarity of two strings as a 0-100 ratio.
fn ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    normalized_levenshtein(a, b) * 100.0
}

/// Best ratio of the needle against any needle-sized window of the
/// haystack. Equals `ratio` when the strings have similar length.
fn partial_ratio(needle: &str, haystack: &str) -> f64 {
    let (short, long) = if needle.chars().count() <= haystack.chars().count() {
        (needle, haystack)
    } else {
        (haystack, needle)
    };

    let short_len = short.chars().count();
    if short_len == 0 {
        return 0.0;
    }

    let long_chars: Vec<char> = long.chars().collect();
    if long_chars.len() == short_len {
        return ratio(short, long);
    }

    let mut best: f64 = 0.0;
    for start in 0..=(long_chars.len() - short_len) {
        let window: String = long_chars[start..start + short_len].iter().collect();
        best = best.max(ratio(short, &window));
        if best >= 100.0 {
            break;
        }
    }
    best
}

/// Ratio after sorting the words of both strings, so word order does not
/// matter.
fn token_sort_ratio(a: &str, b: &str) -> f64 {
    let sort_tokens = |s: &str| -> String {
        let mut tokens: Vec<&str> = s.split_whitespace().collect();
        tokens.sort_unstable();
        tokens.join(" ")
    };
    ratio(&sort_tokens(a), &sort_tokens(b))
}

// ─────────────────────────────────────────────────────────────────────────────
// Search service
// ─────────────────────────────────────────────────────────────────────────────

/// Fuzzy search over the in-memory catalog.
pub struct FuzzySearch {
    catalog: Arc<ServiceCatalog>,
}

impl FuzzySearch {
    pub fn new(catalog: Arc<ServiceCatalog>) -> Self {
        Self { catalog }
    }

    /// Expands the query into comparison terms: the whole normalized query,
    /// its individual words, and a variant with dashes and underscores
    /// turned into spaces.
    fn expand_terms(search_term: &str) -> BTreeSet<String> {
        let normalized = normalize_spoken(search_term);
        let mut terms = BTreeSet::new();
        if !normalized.is_empty() {
            terms.insert(normalized.clone());
        }
        for word in normalized.split_whitespace() {
            terms.insert(word.to_string());
        }
        let dehyphenated = normalize_spoken(&search_term.replace(['-', '_'], " "));
        if !dehyphenated.is_empty() {
            terms.insert(dehyphenated);
        }
        terms
    }

    /// Searchable text for one service: name, code, and synonyms joined and
    /// lowercased.
    fn search_text(service: &HealthService) -> String {
        let mut parts = vec![service.name.as_str(), service.code.as_str()];
        parts.extend(service.synonyms.iter().map(String::as_str));
        parts.join(" ").to_lowercase()
    }

    /// Scores one service against the expanded terms. Clamped at zero.
    fn score(service: &HealthService, terms: &BTreeSet<String>, query: &str) -> f64 {
        let service_text = Self::search_text(service);
        let service_name = service.name.to_lowercase();
        let query_lower = query.to_lowercase();

        // Exact token hits, medical vocabulary counting extra.
        let mut exact_score: f64 = 0.0;
        for term in terms {
            if service_text.contains(term.as_str()) {
                exact_score += if MEDICAL_KEYWORDS.contains(&term.as_str()) {
                    25.0
                } else {
                    15.0
                };
            }
        }
        let exact_score = exact_score.min(80.0);

        let fuzzy_score = partial_ratio(&query_lower, &service_name)
            .max(partial_ratio(&query_lower, &service_text))
            * 0.30;

        let token_score = token_sort_ratio(&query_lower, &service_name) * 0.20;

        let mut word_score: f64 = 0.0;
        for word in query_lower.split_whitespace() {
            if service_text.contains(word) {
                word_score += 15.0;
            }
        }
        let word_score: f64 = word_score.min(30.0);

        let mut penalty = 0.0;
        for irrelevant in IRRELEVANT_TERMS {
            if service_name.contains(irrelevant) {
                penalty -= 20.0;
            }
        }

        (exact_score + fuzzy_score + token_score + word_score + penalty).max(0.0)
    }

    /// Searches the catalog.
    ///
    /// Queries shorter than two characters fail fast with an explanatory
    /// message. The limit defaults to 3 and never exceeds 5.
    pub fn search(&self, search_term: &str, limit: Option<usize>) -> ServiceSearchResponse {
        let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT).min(MAX_SEARCH_LIMIT);
        log::info!("[Search] Fuzzy searching for: {:?} (limit: {})", search_term, limit);

        let trimmed = search_term.trim();
        if trimmed.chars().count() < 2 {
            return ServiceSearchResponse {
                found: false,
                count: 0,
                services: Vec::new(),
                search_term: search_term.to_string(),
                message: Some(
                    "Search term too short. Please provide at least 2 characters.".to_string(),
                ),
            };
        }

        let all_services = self.catalog.health_services();
        if all_services.is_empty() {
            return ServiceSearchResponse {
                found: false,
                count: 0,
                services: Vec::new(),
                search_term: search_term.to_string(),
                message: Some("No services available for search.".to_string()),
            };
        }

        let terms = Self::expand_terms(trimmed);

        let mut scored: Vec<(HealthService, f64)> = all_services
            .into_iter()
            .filter_map(|service| {
                let score = Self::score(&service, &terms, trimmed);
                (score >= SCORE_THRESHOLD).then_some((service, score))
            })
            .collect();

        // Stable sort keeps catalog order on equal scores.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        if log::log_enabled!(log::Level::Debug) {
            for (i, (service, score)) in scored.iter().take(3).enumerate() {
                log::debug!("[Search]   {}. {} (score: {:.1})", i + 1, service.name, score);
            }
        }

        let services: Vec<HealthService> =
            scored.into_iter().take(limit).map(|(s, _)| s).collect();

        log::info!("[Search] Found {} matching services", services.len());

        let message = if services.is_empty() {
            Some(no_results_message(trimmed))
        } else {
            None
        };

        ServiceSearchResponse {
            found: !services.is_empty(),
            count: services.len(),
            services,
            search_term: search_term.to_string(),
            message,
        }
    }
}

/// Suggests common searches when nothing matched.
fn no_results_message(search_term: &str) -> String {
    format!(
        "Nessun servizio trovato per '{}'. Prova a cercare: \
         cardiologia (servizi cardiaci), analisi del sangue (esami del sangue), \
         radiografia (servizi di imaging), dentale (servizi dentali), \
         caviglia (esami della caviglia)",
        search_term
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::types::Sector;

    fn service(uuid: &str, name: &str, code: &str, synonyms: &[&str]) -> HealthService {
        HealthService {
            uuid: uuid.to_string(),
            name: name.to_string(),
            code: code.to_string(),
            synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
            sector: Sector::HealthServices,
        }
    }

    fn search_over(services: Vec<HealthService>) -> FuzzySearch {
        FuzzySearch::new(Arc::new(ServiceCatalog::with_services(services)))
    }

    fn sample_catalog() -> Vec<HealthService> {
        vec![
            service(
                "u1",
                "RX Caviglia Destra",
                "RRAD0019",
                &["Radiografia Caviglia Destra", "Raggi Caviglia dx"],
            ),
            service("u2", "Visita Cardiologica (Prima Visita)", "PCAR0001", &[]),
            service("u3", "Peeling Viso", "DERM0003", &[]),
            service("u4", "Analisi del Sangue", "LAB0001", &["Esame del Sangue"]),
        ]
    }

    #[test]
    fn query_shorter_than_two_chars_is_rejected() {
        let fuzzy = search_over(sample_catalog());
        let result = fuzzy.search("r", None);
        assert!(!result.found);
        assert_eq!(result.count, 0);
        assert!(result.message.unwrap().contains("too short"));
    }

    #[test]
    fn exact_name_query_ranks_the_service_first() {
        let fuzzy = search_over(sample_catalog());
        let result = fuzzy.search("RX Caviglia Destra", None);
        assert!(result.found);
        assert_eq!(result.services[0].uuid, "u1");
    }

    #[test]
    fn synonym_hits_find_the_service() {
        let fuzzy = search_over(sample_catalog());
        let result = fuzzy.search("radiografia caviglia", None);
        assert!(result.found);
        assert_eq!(result.services[0].uuid, "u1");
    }

    #[test]
    fn unrelated_query_returns_suggestions() {
        let fuzzy = search_over(sample_catalog());
        let result = fuzzy.search("zzzz qqqq", None);
        assert!(!result.found);
        assert!(result.message.unwrap().contains("Prova a cercare"));
    }

    #[test]
    fn limit_is_capped_at_five() {
        let services: Vec<HealthService> = (0..10)
            .map(|i| service(&format!("u{}", i), "Analisi del Sangue", "LAB", &[]))
            .collect();
        let fuzzy = search_over(services);
        let result = fuzzy.search("analisi del sangue", Some(50));
        assert!(result.count <= MAX_SEARCH_LIMIT);
    }

    #[test]
    fn partial_ratio_finds_substring_matches() {
        assert!(partial_ratio("caviglia", "rx caviglia destra") > 95.0);
        assert!(partial_ratio("caviglia", "peeling viso") < 50.0);
    }

    #[test]
    fn token_sort_ignores_word_order() {
        let forward = token_sort_ratio("caviglia rx destra", "rx caviglia destra");
        assert!((forward - 100.0).abs() < f64::EPSILON);
    }
}
