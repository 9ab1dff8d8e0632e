//! C6: Search Executor.
//!
//! Builds a Cartesian sub-query set over (company OR no-company) x (doc-type
//! OR no-doc-type), pages each sub-query forward, merges and deduplicates by
//! `rcept_no`, and enforces the date-range guard (invariant §3.4).

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};

use crate::cache::{ContentCache, Namespace};
use crate::dart_client::{CatalogPage, DartApiClient, SearchParams};
use crate::logging::log_debug;
use crate::model::{ExpandedQuery, FilingRef, PartialFailure};

const MAX_DOCS_TO_FILTER: usize = 100;
const DEFAULT_SUBQUERY_CONCURRENCY: usize = 5;

/// Result of running C6 for one [`ExpandedQuery`].
pub struct SearchResult {
    pub filings: Vec<FilingRef>,
    pub partial_failures: Vec<PartialFailure>,
    /// `true` when every sub-query failed (spec §4.6: surfaces
    /// `SearchUnavailable` to the caller).
    pub all_failed: bool,
}

pub struct SearchExecutor {
    dart_client: Arc<dyn DartApiClient>,
    cache: Arc<ContentCache>,
    concurrency: usize,
    max_results_per_search: u32,
}

impl SearchExecutor {
    pub fn new(dart_client: Arc<dyn DartApiClient>, cache: Arc<ContentCache>, max_results_per_search: u32) -> Self {
        Self {
            dart_client,
            cache,
            concurrency: DEFAULT_SUBQUERY_CONCURRENCY,
            max_results_per_search,
        }
    }

    pub async fn search(&self, expanded: &ExpandedQuery) -> SearchResult {
        let sub_queries = build_sub_queries(expanded);
        log_debug!(phase = "search", sub_queries = sub_queries.len(), "entering search phase");

        let results: Vec<Result<Vec<FilingRef>, PartialFailure>> = stream::iter(sub_queries)
            .map(|(corp_code, doc_type)| {
                let expanded = expanded.clone();
                async move { self.run_sub_query(&expanded, corp_code, doc_type).await }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let total = results.len();
        let mut partial_failures = Vec::new();
        let mut merged: Vec<FilingRef> = Vec::new();
        let mut seen = HashSet::new();

        for result in results {
            match result {
                Ok(filings) => {
                    for filing in filings {
                        if seen.insert(filing.rcept_no.clone()) {
                            merged.push(filing);
                        }
                    }
                }
                Err(failure) => partial_failures.push(failure),
            }
        }

        merged.sort_by(|a, b| b.rcept_dt.cmp(&a.rcept_dt));
        merged.truncate(MAX_DOCS_TO_FILTER);

        log_debug!(
            phase = "search",
            filings = merged.len(),
            partial_failures = partial_failures.len(),
            "search phase complete"
        );

        SearchResult {
            filings: merged,
            all_failed: total > 0 && partial_failures.len() == total,
            partial_failures,
        }
    }

    async fn run_sub_query(
        &self,
        expanded: &ExpandedQuery,
        corp_code: Option<String>,
        doc_type: Option<String>,
    ) -> Result<Vec<FilingRef>, PartialFailure> {
        let mut page_no = 1;
        let mut collected = Vec::new();

        loop {
            let params = SearchParams {
                bgn_de: expanded.date_range.begin.clone(),
                end_de: expanded.date_range.end.clone(),
                pblntf_detail_ty: doc_type.clone(),
                corp_code: corp_code.clone(),
                page_no,
                page_count: 100,
            };

            let fingerprint_key = params.canonical();
            let fetch_result = self
                .cache
                .get_or_fetch(Namespace::SearchList, &fingerprint_key, || {
                    let dart_client = self.dart_client.clone();
                    let params = params.clone();
                    async move {
                        let page = dart_client.search_catalogue(&params).await?;
                        serde_json::to_vec(&SerializablePage::from(&page))
                            .map_err(|e| crate::error::DeepSearchError::internal(e.to_string()))
                    }
                })
                .await;

            let bytes = fetch_result.map_err(|e| PartialFailure {
                phase: "search".to_string(),
                kind: "SubQueryFailed".to_string(),
                message: e.to_string(),
            })?;

            let page: SerializablePage = serde_json::from_slice(&bytes).map_err(|e| PartialFailure {
                phase: "search".to_string(),
                kind: "SubQueryFailed".to_string(),
                message: format!("cached page deserialization failed: {e}"),
            })?;

            let filtered: Vec<FilingRef> = page
                .filings
                .into_iter()
                .filter(|f| expanded.date_range.contains(&f.rcept_dt))
                .collect();

            collected.extend(filtered);

            if !page.has_more || collected.len() as u32 >= self.max_results_per_search {
                break;
            }
            page_no += 1;
        }

        collected.truncate(self.max_results_per_search as usize);
        Ok(collected)
    }
}

/// Cartesian (company OR none) x (doc-type OR none) sub-query set, per spec
/// §4.6: when `companies` is empty, one search without `corp_code` is issued
/// per doc-type.
fn build_sub_queries(expanded: &ExpandedQuery) -> Vec<(Option<String>, Option<String>)> {
    let corp_codes: Vec<Option<String>> = if expanded.corp_codes.is_empty() {
        vec![None]
    } else {
        expanded.corp_codes.clone()
    };
    let doc_types: Vec<Option<String>> = if expanded.doc_types.is_empty() {
        vec![None]
    } else {
        expanded.doc_types.iter().cloned().map(Some).collect()
    };

    let mut sub_queries = Vec::with_capacity(corp_codes.len() * doc_types.len());
    for corp_code in &corp_codes {
        for doc_type in &doc_types {
            sub_queries.push((corp_code.clone(), doc_type.clone()));
        }
    }
    sub_queries
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct SerializablePage {
    filings: Vec<FilingRef>,
    has_more: bool,
}

impl From<&CatalogPage> for SerializablePage {
    fn from(page: &CatalogPage) -> Self {
        Self {
            filings: page.filings.clone(),
            has_more: page.has_more,
        }
    }
}

/// A sub-query's window invalidates only when it includes "today" (spec
/// §4.6); callers should bypass the cache for the final page when this holds.
pub fn window_includes_today(end_de: &str) -> bool {
    let today = Utc::now().format("%Y%m%d").to_string();
    end_de >= today.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DateRange;

    fn sample_expanded() -> ExpandedQuery {
        ExpandedQuery {
            companies: vec!["A".to_string()],
            corp_codes: vec![Some("00123456".to_string())],
            doc_types: vec!["B001".to_string(), "E003".to_string()],
            date_range: DateRange {
                begin: "20240101".to_string(),
                end: "20240601".to_string(),
            },
            keywords: vec![],
            original_query: "q".to_string(),
        }
    }

    #[test]
    fn sub_queries_cover_the_cartesian_product() {
        let subs = build_sub_queries(&sample_expanded());
        assert_eq!(subs.len(), 2);
    }

    #[test]
    fn no_company_yields_single_search_per_doc_type() {
        let mut expanded = sample_expanded();
        expanded.companies.clear();
        expanded.corp_codes.clear();
        let subs = build_sub_queries(&expanded);
        assert_eq!(subs.len(), 2);
        assert!(subs.iter().all(|(c, _)| c.is_none()));
    }
}
