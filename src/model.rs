//! Shared data model for the deep-search pipeline.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive date window, `YYYYMMDD` strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub begin: String,
    pub end: String,
}

impl DateRange {
    pub fn contains(&self, rcept_dt: &str) -> bool {
        self.begin.as_str() <= rcept_dt && rcept_dt <= self.end.as_str()
    }
}

/// Run options accompanying a [`Query`], mirroring spec §3's "run options".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    pub max_attempts: u32,
    pub max_results_per_search: u32,
    pub concurrency: usize,
    pub language: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_results_per_search: 30,
            concurrency: 5,
            language: "ko".to_string(),
        }
    }
}

/// Immutable user input to a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub options: RunOptions,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            options: RunOptions::default(),
        }
    }
}

/// Structured search parameters produced by the query expander (C5).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpandedQuery {
    pub companies: Vec<String>,
    /// Aligned 1:1 with `companies`; `None` where unresolved.
    pub corp_codes: Vec<Option<String>>,
    /// Ordered detail-type codes; empty means "any".
    pub doc_types: Vec<String>,
    pub date_range: DateRange,
    /// Deduplicated, non-empty tokens.
    pub keywords: Vec<String>,
    pub original_query: String,
}

impl ExpandedQuery {
    /// `date_range.begin <= date_range.end`; `corp_codes` entries are `^\d{8}$`
    /// or `None`; `doc_types` entries match `^[A-J]\d{3}$`.
    pub fn validate(&self) -> Result<(), String> {
        if self.date_range.begin > self.date_range.end {
            return Err(format!(
                "date_range.begin ({}) > date_range.end ({})",
                self.date_range.begin, self.date_range.end
            ));
        }
        for code in self.corp_codes.iter().flatten() {
            if code.len() != 8 || !code.chars().all(|c| c.is_ascii_digit()) {
                return Err(format!("corp_code {code:?} is not an 8-digit code"));
            }
        }
        for doc_type in &self.doc_types {
            if !is_valid_doc_type(doc_type) {
                return Err(format!("doc_type {doc_type:?} does not match [A-J]\\d{{3}}"));
            }
        }
        Ok(())
    }
}

/// Validates a detail-type code against the taxonomy regex `^[A-J]\d{3}$`.
pub fn is_valid_doc_type(code: &str) -> bool {
    let bytes = code.as_bytes();
    bytes.len() == 4
        && (b'A'..=b'J').contains(&bytes[0])
        && bytes[1..].iter().all(u8::is_ascii_digit)
}

/// Minimal identifier of a disclosure, as returned by the catalogue search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilingRef {
    /// 14-char receipt number, primary key.
    pub rcept_no: String,
    pub corp_name: String,
    pub corp_code: String,
    pub report_nm: String,
    /// `YYYYMMDD`.
    pub rcept_dt: String,
    pub flr_nm: String,
    pub pblntf_detail_ty: String,
}

/// Where a [`Filing`]'s body data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilingSource {
    StructuredApi,
    DocumentArchive,
    WebViewer,
    None,
}

/// A [`FilingRef`] enriched with body data after C8 fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filing {
    #[serde(flatten)]
    pub filing_ref: FilingRef,
    /// Cleaned plain text, truncated to `DOCUMENT_CONTENT_LIMIT` chars.
    pub content: String,
    pub structured_data: Option<HashMap<String, serde_json::Value>>,
    pub source: FilingSource,
    pub fetched_at: DateTime<Utc>,
    pub fetch_error: Option<FetchErrorInfo>,
}

impl Filing {
    pub fn rcept_no(&self) -> &str {
        &self.filing_ref.rcept_no
    }

    /// Invariant §3.3: non-empty content/structured_data XOR a populated
    /// `fetch_error`.
    pub fn has_body(&self) -> bool {
        !self.content.is_empty() || self.structured_data.as_ref().is_some_and(|m| !m.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchErrorInfo {
    pub kind: String,
    pub message: String,
}

/// A single recorded partial failure, surfaced in [`Telemetry`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialFailure {
    pub phase: String,
    pub kind: String,
    pub message: String,
}

/// Per-run telemetry accumulated by the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Telemetry {
    pub attempts: u32,
    pub phase_latencies_ms: HashMap<String, u64>,
    pub partial_failures: Vec<PartialFailure>,
    pub cache_hit_rate: f64,
    pub llm_calls: u32,
    pub duration_ms: u64,
}

/// Confidence tier surfaced in the response envelope summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeSummary {
    pub total_documents: usize,
    pub date_range: DateRange,
    pub companies: Vec<String>,
    pub confidence: Confidence,
}

/// The stable JSON response returned above the tool boundary, per spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub query: String,
    /// Empty when `kind = Cancelled`.
    pub answer: String,
    pub summary: EnvelopeSummary,
    pub documents: Vec<Filing>,
    pub telemetry: Telemetry,
    pub kind: EnvelopeKind,
}

/// The two outcomes surfaced above the tool boundary, per spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    Completed,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_doc_type_taxonomy() {
        assert!(is_valid_doc_type("B001"));
        assert!(is_valid_doc_type("J999"));
        assert!(!is_valid_doc_type("K001"));
        assert!(!is_valid_doc_type("B01"));
        assert!(!is_valid_doc_type("b001"));
    }

    #[test]
    fn expanded_query_rejects_inverted_date_range() {
        let q = ExpandedQuery {
            date_range: DateRange {
                begin: "20240601".to_string(),
                end: "20240101".to_string(),
            },
            ..Default::default()
        };
        assert!(q.validate().is_err());
    }

    #[test]
    fn expanded_query_rejects_malformed_corp_code() {
        let q = ExpandedQuery {
            date_range: DateRange {
                begin: "20240101".to_string(),
                end: "20240601".to_string(),
            },
            corp_codes: vec![Some("abc".to_string())],
            ..Default::default()
        };
        assert!(q.validate().is_err());
    }

    #[test]
    fn date_range_contains_is_inclusive() {
        let r = DateRange {
            begin: "20240101".to_string(),
            end: "20240601".to_string(),
        };
        assert!(r.contains("20240101"));
        assert!(r.contains("20240601"));
        assert!(!r.contains("20231231"));
        assert!(!r.contains("20240602"));
    }
}
