//! C5: Query Expander.
//!
//! Calls the LLM with a structured-extraction prompt to produce a JSON
//! [`ExpandedQuery`]. C4 pre-processes recognized date tokens; C3
//! post-processes every company string. On LLM failure, falls back to
//! rule-based extraction.

use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use crate::company_resolver::CompanyResolver;
use crate::date_parser;
use crate::error::{DeepSearchError, DeepSearchResult};
use crate::llm::{LlmClient, Message, ResponseParser};
use crate::logging::{log_debug, log_warn};
use crate::model::{is_valid_doc_type, DateRange, ExpandedQuery};

static QUOTED_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r#"["'“”']([^"'“”']{2,30})["'“”']"#).unwrap());

/// Capability selected at construction: LLM-backed with a rule-based
/// fallback, or rule-only.
pub struct QueryExpander {
    llm: Option<Arc<dyn LlmClient>>,
    resolver: Arc<CompanyResolver>,
}

#[derive(Debug, Deserialize)]
struct LlmExpansion {
    #[serde(default)]
    companies: Vec<String>,
    #[serde(default)]
    doc_types: Vec<String>,
    #[serde(default)]
    date_phrase: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
}

impl QueryExpander {
    pub fn new(llm: Option<Arc<dyn LlmClient>>, resolver: Arc<CompanyResolver>) -> Self {
        Self { llm, resolver }
    }

    fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "companies": {"type": "array", "items": {"type": "string"}},
                "doc_types": {"type": "array", "items": {"type": "string"}},
                "date_phrase": {"type": "string"},
                "keywords": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["companies", "doc_types", "keywords"]
        })
    }

    /// Expand `query_text` into a validated [`ExpandedQuery`].
    ///
    /// # Errors
    ///
    /// Returns [`DeepSearchError::ExpansionFailed`] if the resulting query
    /// fails validation (spec §4.5).
    pub async fn expand(&self, query_text: &str) -> DeepSearchResult<ExpandedQuery> {
        let today = Utc::now().date_naive();

        let raw = match &self.llm {
            Some(llm) => match self.call_llm(llm.as_ref(), query_text).await {
                Ok(extraction) => extraction,
                Err(err) => {
                    log_warn!(error = %err, "query expansion LLM call failed, falling back to rules");
                    rule_based_extraction(query_text)
                }
            },
            None => rule_based_extraction(query_text),
        };

        let date_range = match raw.date_phrase.as_deref() {
            Some(phrase) => date_parser::parse(phrase, today).range,
            None => date_parser::parse(query_text, today).range,
        };

        let doc_types: Vec<String> = raw
            .doc_types
            .into_iter()
            .filter(|code| is_valid_doc_type(code))
            .collect();

        let (companies, corp_codes) = self.resolve_companies(&raw.companies);

        let keywords = dedupe_keywords(raw.keywords);

        let expanded = ExpandedQuery {
            companies,
            corp_codes,
            doc_types,
            date_range,
            keywords,
            original_query: query_text.to_string(),
        };

        expanded
            .validate()
            .map_err(DeepSearchError::expansion_failed)?;

        Ok(expanded)
    }

    fn resolve_companies(&self, names: &[String]) -> (Vec<String>, Vec<Option<String>>) {
        let mut companies = Vec::new();
        let mut corp_codes = Vec::new();
        for name in names {
            match self.resolver.best(name) {
                Some((canonical, code)) => {
                    companies.push(canonical);
                    corp_codes.push(Some(code));
                }
                None => {
                    companies.push(name.clone());
                    corp_codes.push(None);
                }
            }
        }
        (companies, corp_codes)
    }

    async fn call_llm(&self, llm: &dyn LlmClient, query_text: &str) -> DeepSearchResult<LlmExpansion> {
        let messages = vec![
            Message::system(
                "Extract structured search parameters from a Korean corporate disclosure \
                 question: company names, DART detail-type codes (pattern [A-J]\\d{3}), a \
                 date phrase if present, and keywords.",
            ),
            Message::user(query_text),
        ];

        let completion = llm
            .complete(messages, Some(Self::schema()), None)
            .await
            .map_err(|e| DeepSearchError::llm_unavailable(e.to_string()))?;

        let value = match completion.structured_response {
            Some(v) => v,
            None => ResponseParser::parse_llm_output(&completion.content)
                .map_err(|e| DeepSearchError::llm_unavailable(e.to_string()))?,
        };

        log_debug!(phase = "query_expander", "LLM extraction succeeded");
        serde_json::from_value(value)
            .map_err(|e| DeepSearchError::llm_unavailable(format!("malformed extraction: {e}")))
    }
}

/// Extract quoted company names, regex date phrases, leave `doc_types` empty.
fn rule_based_extraction(query_text: &str) -> LlmExpansion {
    let companies = QUOTED_NAME
        .captures_iter(query_text)
        .map(|c| c[1].to_string())
        .collect();

    let keywords = query_text
        .split_whitespace()
        .filter(|w| w.chars().count() > 1)
        .map(str::to_string)
        .collect();

    LlmExpansion {
        companies,
        doc_types: Vec::new(),
        date_phrase: Some(query_text.to_string()),
        keywords,
    }
}

fn dedupe_keywords(keywords: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    keywords
        .into_iter()
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rule_fallback_produces_a_valid_expansion() {
        let expander = QueryExpander::new(None, Arc::new(CompanyResolver::new()));
        let expanded = expander
            .expand("\"메리츠금융\"의 최근 3개월 공시")
            .await
            .unwrap();
        assert_eq!(expanded.companies, vec!["메리츠금융".to_string()]);
        assert!(expanded.doc_types.is_empty());
        assert!(expanded.date_range.begin <= expanded.date_range.end);
    }

    #[test]
    fn dedupe_keywords_removes_duplicates_and_blanks() {
        let out = dedupe_keywords(vec!["a".into(), "a".into(), "".into(), "b".into()]);
        assert_eq!(out, vec!["a".to_string(), "b".to_string()]);
    }
}
