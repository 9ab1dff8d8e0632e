//! C7: Document Filter.
//!
//! Given up to 100 candidate FilingRefs, returns at most 30 relevant ones in
//! preference order. Two strategies selected at construction: LLM-backed
//! (with a rule-based fallback on failure) or rule-only.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::llm::{LlmClient, Message, ResponseParser};
use crate::logging::log_warn;
use crate::model::{ExpandedQuery, FilingRef};

const MAX_DOCS_TO_RETURN: usize = 30;
const MIN_RECENT_FALLBACK: usize = 5;
const BATCH_SIZE: usize = 100;

pub struct DocumentFilter {
    llm: Option<Arc<dyn LlmClient>>,
}

#[derive(Debug, Deserialize)]
struct LlmFilterResponse {
    #[serde(default)]
    relevant: Vec<RelevantEntry>,
}

#[derive(Debug, Deserialize)]
struct RelevantEntry {
    rcept_no: String,
    #[serde(default)]
    #[allow(dead_code)]
    reason: String,
}

impl DocumentFilter {
    pub fn new(llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self { llm }
    }

    pub async fn filter(
        &self,
        original_query: &str,
        expanded: &ExpandedQuery,
        candidates: Vec<FilingRef>,
    ) -> Vec<FilingRef> {
        if let Some(llm) = &self.llm {
            match self.llm_filter(llm.as_ref(), original_query, &candidates).await {
                Ok(selected) => return selected,
                Err(err) => {
                    log_warn!(error = %err, "document filter LLM call failed, falling back to rules");
                }
            }
        }
        rule_filter(expanded, candidates)
    }

    async fn llm_filter(
        &self,
        llm: &dyn LlmClient,
        original_query: &str,
        candidates: &[FilingRef],
    ) -> Result<Vec<FilingRef>, crate::error::DeepSearchError> {
        let known_ids: HashSet<&str> = candidates.iter().map(|f| f.rcept_no.as_str()).collect();

        let batch_summary: Vec<_> = candidates
            .iter()
            .take(BATCH_SIZE)
            .map(|f| {
                json!({
                    "rcept_no": f.rcept_no,
                    "corp_name": f.corp_name,
                    "report_nm": f.report_nm,
                    "rcept_dt": f.rcept_dt,
                    "doc_type": f.pblntf_detail_ty,
                })
            })
            .collect();

        let messages = vec![
            Message::system(
                "You select plausibly relevant disclosures for a research question. Return \
                 only rcept_no values taken from the provided candidate list, each with a \
                 brief reason.",
            ),
            Message::user(
                json!({
                    "query": original_query,
                    "candidates": batch_summary,
                })
                .to_string(),
            ),
        ];

        let schema = json!({
            "type": "object",
            "properties": {
                "relevant": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "rcept_no": {"type": "string"},
                            "reason": {"type": "string"}
                        },
                        "required": ["rcept_no"]
                    }
                }
            },
            "required": ["relevant"]
        });

        let completion = llm
            .complete(messages, Some(schema), None)
            .await
            .map_err(|e| crate::error::DeepSearchError::llm_unavailable(e.to_string()))?;

        let value = match completion.structured_response {
            Some(v) => v,
            None => ResponseParser::parse_llm_output(&completion.content)
                .map_err(|e| crate::error::DeepSearchError::llm_unavailable(e.to_string()))?,
        };

        let parsed: LlmFilterResponse = serde_json::from_value(value)
            .map_err(|e| crate::error::DeepSearchError::llm_unavailable(format!("malformed filter response: {e}")))?;

        let mut seen = HashSet::new();
        let by_id: std::collections::HashMap<&str, &FilingRef> =
            candidates.iter().map(|f| (f.rcept_no.as_str(), f)).collect();

        let selected = parsed
            .relevant
            .into_iter()
            .filter(|entry| known_ids.contains(entry.rcept_no.as_str()))
            .filter(|entry| seen.insert(entry.rcept_no.clone()))
            .filter_map(|entry| by_id.get(entry.rcept_no.as_str()).map(|f| (*f).clone()))
            .take(MAX_DOCS_TO_RETURN)
            .collect();

        Ok(selected)
    }
}

/// Score each candidate: +2 per keyword in `report_nm`, +3 exact company
/// match, +1 doc-type match, freshness tiebreak. Keep top 30 with score > 0;
/// if fewer than 5 score > 0, keep the 5 most recent regardless.
fn rule_filter(expanded: &ExpandedQuery, mut candidates: Vec<FilingRef>) -> Vec<FilingRef> {
    let mut scored: Vec<(i32, FilingRef)> = candidates
        .drain(..)
        .map(|filing| {
            let mut score = 0;
            for keyword in &expanded.keywords {
                if filing.report_nm.contains(keyword.as_str()) {
                    score += 2;
                }
            }
            if expanded.companies.iter().any(|c| c == &filing.corp_name) {
                score += 3;
            }
            if expanded.doc_types.contains(&filing.pblntf_detail_ty) {
                score += 1;
            }
            (score, filing)
        })
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.rcept_dt.cmp(&a.1.rcept_dt)));

    let positive_count = scored.iter().filter(|(score, _)| *score > 0).count();

    if positive_count < MIN_RECENT_FALLBACK {
        let mut by_date = scored;
        by_date.sort_by(|a, b| b.1.rcept_dt.cmp(&a.1.rcept_dt));
        return by_date
            .into_iter()
            .take(MIN_RECENT_FALLBACK)
            .map(|(_, f)| f)
            .collect();
    }

    scored
        .into_iter()
        .filter(|(score, _)| *score > 0)
        .take(MAX_DOCS_TO_RETURN)
        .map(|(_, f)| f)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DateRange;

    fn filing(rcept_no: &str, corp_name: &str, report_nm: &str, rcept_dt: &str, doc_type: &str) -> FilingRef {
        FilingRef {
            rcept_no: rcept_no.to_string(),
            corp_name: corp_name.to_string(),
            corp_code: "00000000".to_string(),
            report_nm: report_nm.to_string(),
            rcept_dt: rcept_dt.to_string(),
            flr_nm: corp_name.to_string(),
            pblntf_detail_ty: doc_type.to_string(),
        }
    }

    fn expanded() -> ExpandedQuery {
        ExpandedQuery {
            companies: vec!["삼성전자".to_string()],
            corp_codes: vec![Some("00123456".to_string())],
            doc_types: vec!["B001".to_string()],
            date_range: DateRange {
                begin: "20240101".to_string(),
                end: "20240601".to_string(),
            },
            keywords: vec!["합병".to_string()],
            original_query: "q".to_string(),
        }
    }

    #[test]
    fn scores_keyword_and_company_and_doctype_matches() {
        let candidates = vec![
            filing("1", "삼성전자", "합병 비율 공시", "20240301", "B001"),
            filing("2", "다른회사", "실적 공시", "20240101", "C001"),
        ];
        let result = rule_filter(&expanded(), candidates);
        assert_eq!(result[0].rcept_no, "1");
    }

    #[test]
    fn keeps_five_most_recent_when_nothing_scores() {
        let candidates: Vec<_> = (0..8)
            .map(|i| filing(&i.to_string(), "무관", "무관 공시", &format!("2024010{i}"), "Z001"))
            .collect();
        let result = rule_filter(&expanded(), candidates);
        assert_eq!(result.len(), MIN_RECENT_FALLBACK);
    }
}
