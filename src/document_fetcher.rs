//! C8: Document Fetcher.
//!
//! Concurrent retrieval of filing bodies via the best available source:
//! structured API, document archive, then web viewer. Each fetch fails
//! independently; a Filing with a fetch failure is retained with
//! `source = none` and a populated `fetch_error` (invariant §3.3).

use std::sync::Arc;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};

use crate::cache::{ContentCache, Namespace};
use crate::dart_client::{has_structured_endpoint, DartApiClient};
use crate::error::DeepSearchError;
use crate::logging::log_debug;
use crate::model::{FetchErrorInfo, Filing, FilingRef, FilingSource};

const DEFAULT_FETCH_CONCURRENCY: usize = 3;
const CONTENT_CHAR_LIMIT: usize = 1500;

pub struct DocumentFetcher {
    dart_client: Arc<dyn DartApiClient>,
    cache: Arc<ContentCache>,
    concurrency: usize,
}

impl DocumentFetcher {
    pub fn new(dart_client: Arc<dyn DartApiClient>, cache: Arc<ContentCache>, concurrency: usize) -> Self {
        Self {
            dart_client,
            cache,
            concurrency: concurrency.max(1),
        }
    }

    /// Fetch every surviving FilingRef, preserving C7's order regardless of
    /// fetch completion order.
    pub async fn fetch_all(&self, refs: Vec<FilingRef>) -> Vec<Filing> {
        log_debug!(phase = "fetch", documents = refs.len(), "entering fetch phase");
        let indexed: Vec<(usize, FilingRef)> = refs.into_iter().enumerate().collect();

        let mut results: Vec<(usize, Filing)> = stream::iter(indexed)
            .map(|(idx, filing_ref)| async move { (idx, self.fetch_one(filing_ref).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        results.sort_by_key(|(idx, _)| *idx);
        let filings: Vec<Filing> = results.into_iter().map(|(_, filing)| filing).collect();
        log_debug!(
            phase = "fetch",
            failed = filings.iter().filter(|f| f.fetch_error.is_some()).count(),
            "fetch phase complete"
        );
        filings
    }

    async fn fetch_one(&self, filing_ref: FilingRef) -> Filing {
        if has_structured_endpoint(&filing_ref.pblntf_detail_ty) {
            match self.fetch_structured(&filing_ref).await {
                Ok(data) => {
                    return Filing {
                        filing_ref,
                        content: String::new(),
                        structured_data: Some(data),
                        source: FilingSource::StructuredApi,
                        fetched_at: Utc::now(),
                        fetch_error: None,
                    };
                }
                Err(err) => {
                    return self.try_archive_then_viewer(filing_ref, Some(err)).await;
                }
            }
        }

        self.try_archive_then_viewer(filing_ref, None).await
    }

    async fn try_archive_then_viewer(&self, filing_ref: FilingRef, prior: Option<DeepSearchError>) -> Filing {
        match self.fetch_archive(&filing_ref).await {
            Ok(content) => Filing {
                filing_ref,
                content: truncate(&content),
                structured_data: None,
                source: FilingSource::DocumentArchive,
                fetched_at: Utc::now(),
                fetch_error: None,
            },
            Err(archive_err) => match self.fetch_viewer(&filing_ref).await {
                Ok(content) => Filing {
                    filing_ref,
                    content: truncate(&content),
                    structured_data: None,
                    source: FilingSource::WebViewer,
                    fetched_at: Utc::now(),
                    fetch_error: None,
                },
                Err(viewer_err) => {
                    let message = prior
                        .map(|e| e.to_string())
                        .unwrap_or(archive_err.to_string())
                        + &format!("; {viewer_err}");
                    Filing {
                        filing_ref,
                        content: String::new(),
                        structured_data: None,
                        source: FilingSource::None,
                        fetched_at: Utc::now(),
                        fetch_error: Some(FetchErrorInfo {
                            kind: "FetchFailed".to_string(),
                            message,
                        }),
                    }
                }
            },
        }
    }

    async fn fetch_structured(
        &self,
        filing_ref: &FilingRef,
    ) -> Result<std::collections::HashMap<String, serde_json::Value>, DeepSearchError> {
        let key = format!("{}:{}", filing_ref.rcept_no, filing_ref.pblntf_detail_ty);
        let dart_client = self.dart_client.clone();
        let rcept_no = filing_ref.rcept_no.clone();
        let doc_type = filing_ref.pblntf_detail_ty.clone();

        let bytes = self
            .cache
            .get_or_fetch(Namespace::MajorReportBody, &key, || async move {
                let data = dart_client.fetch_structured_detail(&rcept_no, &doc_type).await?;
                serde_json::to_vec(&data).map_err(|e| DeepSearchError::internal(e.to_string()))
            })
            .await?;

        serde_json::from_slice(&bytes).map_err(|e| DeepSearchError::fetch_failed(e.to_string()))
    }

    async fn fetch_archive(&self, filing_ref: &FilingRef) -> Result<String, DeepSearchError> {
        let dart_client = self.dart_client.clone();
        let rcept_no = filing_ref.rcept_no.clone();

        let bytes = self
            .cache
            .get_or_fetch(Namespace::DocumentArchive, &filing_ref.rcept_no, || async move {
                let content = dart_client.fetch_document_archive(&rcept_no).await?;
                Ok(content.into_bytes())
            })
            .await?;

        String::from_utf8(bytes.to_vec()).map_err(|e| DeepSearchError::fetch_failed(e.to_string()))
    }

    async fn fetch_viewer(&self, filing_ref: &FilingRef) -> Result<String, DeepSearchError> {
        self.dart_client.fetch_web_viewer(&filing_ref.rcept_no).await
    }
}

fn truncate(content: &str) -> String {
    content.chars().take(CONTENT_CHAR_LIMIT).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_limits_to_char_budget() {
        let long = "a".repeat(CONTENT_CHAR_LIMIT + 500);
        assert_eq!(truncate(&long).chars().count(), CONTENT_CHAR_LIMIT);
    }
}
