//! C3: Company Resolver.
//!
//! Loads the full company directory once (catalogue download), then answers
//! fuzzy name -> company code lookups against an immutable in-memory
//! snapshot. Rebuilds atomically swap the snapshot pointer; readers never
//! observe a half-built directory.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use crate::cache::{ContentCache, Namespace};
use crate::dart_client::DartApiClient;
use crate::error::DeepSearchResult;
use crate::logging::log_info;

/// One row of the company catalogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyRecord {
    pub corp_code: String,
    pub corp_name: String,
    pub stock_code: Option<String>,
    normalized_name: String,
}

/// A fuzzy-match candidate, score in `[0, 100]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveCandidate {
    pub canonical_name: String,
    pub corp_code: String,
    pub score: u32,
}

const MIN_LIST_SCORE: u32 = 60;
const MIN_BEST_SCORE: u32 = 80;
const MAX_CANDIDATES: usize = 5;

/// Strips corporate suffixes, whitespace and casing differences so that
/// "(주)삼성전자" and "삼성전자 주식회사" compare equal.
fn normalize(name: &str) -> String {
    let mut s = name.to_lowercase();
    for suffix in ["주식회사", "(주)", "(유)"] {
        s = s.replace(suffix, "");
    }
    s.split_whitespace().collect::<Vec<_>>().join("")
}

fn token_jaccard(a: &str, b: &str) -> f64 {
    let set_a: HashSet<char> = a.chars().collect();
    let set_b: HashSet<char> = b.chars().collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count() as f64;
    let union = set_a.union(&set_b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Classic Levenshtein edit distance.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (n, m) = (a.len(), b.len());
    let mut prev: Vec<usize> = (0..=m).collect();
    let mut curr = vec![0usize; m + 1];

    for i in 1..=n {
        curr[0] = i;
        for j in 1..=m {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[m]
}

fn similarity_score(query_norm: &str, candidate_norm: &str) -> u32 {
    let jaccard = token_jaccard(query_norm, candidate_norm);
    let max_len = query_norm.chars().count().max(candidate_norm.chars().count()).max(1);
    let distance = edit_distance(query_norm, candidate_norm);
    let edit_similarity = 1.0 - (distance as f64 / max_len as f64);
    let combined = 0.6 * jaccard + 0.4 * edit_similarity.max(0.0);
    (combined * 100.0).round().clamp(0.0, 100.0) as u32
}

struct Directory {
    records: Vec<CompanyRecord>,
}

/// Process-wide company directory with fuzzy resolution.
///
/// Shared across runs (spec §3's lifecycle note); rebuilt copy-on-write via
/// [`RwLock`] so readers always see a consistent snapshot.
pub struct CompanyResolver {
    directory: RwLock<Option<Arc<Directory>>>,
}

impl Default for CompanyResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CompanyResolver {
    pub fn new() -> Self {
        Self {
            directory: RwLock::new(None),
        }
    }

    /// Loads the directory on first use via `dart_client`, consulting the
    /// content cache first (7-day TTL per spec §4.2).
    pub async fn ensure_loaded(
        &self,
        dart_client: &dyn DartApiClient,
        cache: &ContentCache,
    ) -> DeepSearchResult<()> {
        if self.directory.read().unwrap().is_some() {
            return Ok(());
        }

        let bytes = cache
            .get_or_fetch(Namespace::CompanyDirectory, "corp_code_catalogue", || async {
                dart_client.fetch_company_catalogue().await
            })
            .await?;

        let records: Vec<CompanyRecord> = serde_json::from_slice::<Vec<RawRecord>>(&bytes)
            .unwrap_or_default()
            .into_iter()
            .map(|raw| CompanyRecord {
                normalized_name: normalize(&raw.corp_name),
                corp_code: raw.corp_code,
                corp_name: raw.corp_name,
                stock_code: raw.stock_code,
            })
            .collect();

        log_info!(count = records.len(), "company directory loaded");
        *self.directory.write().unwrap() = Some(Arc::new(Directory { records }));
        Ok(())
    }

    /// Up to 5 candidates with `score >= 60`.
    pub fn resolve(&self, name: &str) -> Vec<ResolveCandidate> {
        let Some(dir) = self.directory.read().unwrap().clone() else {
            return Vec::new();
        };

        let query_norm = normalize(name);
        let mut candidates: Vec<ResolveCandidate> = dir
            .records
            .iter()
            .map(|record| ResolveCandidate {
                canonical_name: record.corp_name.clone(),
                corp_code: record.corp_code.clone(),
                score: similarity_score(&query_norm, &record.normalized_name),
            })
            .filter(|c| c.score >= MIN_LIST_SCORE)
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.canonical_name.len().cmp(&b.canonical_name.len()))
                .then_with(|| a.canonical_name.cmp(&b.canonical_name))
        });
        candidates.truncate(MAX_CANDIDATES);
        candidates
    }

    /// Single top candidate with `score >= 80`.
    pub fn best(&self, name: &str) -> Option<(String, String)> {
        self.resolve(name)
            .into_iter()
            .find(|c| c.score >= MIN_BEST_SCORE)
            .map(|c| (c.canonical_name, c.corp_code))
    }
}

#[derive(Debug, serde::Deserialize)]
struct RawRecord {
    corp_code: String,
    corp_name: String,
    stock_code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_suffixes_and_whitespace() {
        assert_eq!(normalize("삼성전자 주식회사"), normalize("(주)삼성전자"));
    }

    #[test]
    fn exact_match_scores_one_hundred() {
        assert_eq!(similarity_score("samsung", "samsung"), 100);
    }

    #[test]
    fn unrelated_names_score_low() {
        assert!(similarity_score("samsung", "zzz") < MIN_LIST_SCORE);
    }

    #[test]
    fn resolve_without_directory_loaded_is_empty() {
        let resolver = CompanyResolver::new();
        assert!(resolver.resolve("삼성전자").is_empty());
        assert!(resolver.best("삼성전자").is_none());
    }
}
