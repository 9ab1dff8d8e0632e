//! C9: Sufficiency Checker.
//!
//! Decides whether the current evidence answers the query, optionally
//! proposing a refinement to loop back to C5/C6 with.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, NaiveDate};
use serde::Deserialize;
use serde_json::json;

use crate::llm::{LlmClient, Message, ResponseParser};
use crate::logging::log_debug;
use crate::model::{ExpandedQuery, Filing};

const MIN_SUFFICIENT_BODIES: usize = 3;

/// A proposed broadening of the previous [`ExpandedQuery`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedRefinement {
    pub broaden_date_range_pct: u32,
    pub drop_least_specific_doc_type: bool,
}

#[derive(Debug, Clone)]
pub struct SufficiencyDecision {
    pub sufficient: bool,
    pub reasons: Vec<String>,
    pub missing_aspects: Vec<String>,
    pub proposed_refinement: Option<ProposedRefinement>,
}

pub struct SufficiencyChecker {
    llm: Option<Arc<dyn LlmClient>>,
}

#[derive(Debug, Deserialize)]
struct LlmSufficiency {
    sufficient: bool,
    #[serde(default)]
    reasons: Vec<String>,
    #[serde(default)]
    missing_aspects: Vec<String>,
    #[serde(default)]
    broaden_date_range: bool,
}

impl SufficiencyChecker {
    pub fn new(llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self { llm }
    }

    /// Per spec §4.9's three rules, in priority order.
    pub async fn check(
        &self,
        original_query: &str,
        filings: &[Filing],
        attempts_used: u32,
        max_attempts: u32,
        any_sub_query_failed: bool,
    ) -> SufficiencyDecision {
        if attempts_used >= max_attempts {
            return SufficiencyDecision {
                sufficient: true,
                reasons: vec!["max attempts reached".to_string()],
                missing_aspects: vec![],
                proposed_refinement: None,
            };
        }

        let bodies_with_content = filings.iter().filter(|f| f.has_body()).count();
        if bodies_with_content < MIN_SUFFICIENT_BODIES && any_sub_query_failed {
            return SufficiencyDecision {
                sufficient: false,
                reasons: vec!["fewer than 3 filings fetched and a sub-query failed".to_string()],
                missing_aspects: vec!["more candidate filings".to_string()],
                proposed_refinement: Some(ProposedRefinement {
                    broaden_date_range_pct: 50,
                    drop_least_specific_doc_type: true,
                }),
            };
        }

        match &self.llm {
            Some(llm) => self.llm_check(llm.as_ref(), original_query, filings).await,
            None => SufficiencyDecision {
                sufficient: true,
                reasons: vec!["no LLM configured".to_string()],
                missing_aspects: vec![],
                proposed_refinement: None,
            },
        }
    }

    async fn llm_check(&self, llm: &dyn LlmClient, original_query: &str, filings: &[Filing]) -> SufficiencyDecision {
        let summaries: Vec<_> = filings
            .iter()
            .take(20)
            .map(|f| {
                json!({
                    "corp_name": f.filing_ref.corp_name,
                    "report_nm": f.filing_ref.report_nm,
                    "rcept_dt": f.filing_ref.rcept_dt,
                    "has_body": f.has_body(),
                })
            })
            .collect();

        let messages = vec![
            Message::system(
                "Decide whether the retrieved disclosures sufficiently answer the research \
                 question. Respond with sufficient (bool), reasons, missing_aspects, and \
                 broaden_date_range (bool) if a follow-up search should widen the date window.",
            ),
            Message::user(
                json!({
                    "query": original_query,
                    "filings": summaries,
                })
                .to_string(),
            ),
        ];

        let schema = json!({
            "type": "object",
            "properties": {
                "sufficient": {"type": "boolean"},
                "reasons": {"type": "array", "items": {"type": "string"}},
                "missing_aspects": {"type": "array", "items": {"type": "string"}},
                "broaden_date_range": {"type": "boolean"}
            },
            "required": ["sufficient"]
        });

        let fallback = SufficiencyDecision {
            sufficient: true,
            reasons: vec!["sufficiency LLM call failed, defaulting to sufficient".to_string()],
            missing_aspects: vec![],
            proposed_refinement: None,
        };

        let completion = match llm.complete(messages, Some(schema), None).await {
            Ok(c) => c,
            Err(_) => return fallback,
        };

        let value = match completion.structured_response {
            Some(v) => v,
            None => match ResponseParser::parse_llm_output(&completion.content) {
                Ok(v) => v,
                Err(_) => return fallback,
            },
        };

        let Ok(parsed) = serde_json::from_value::<LlmSufficiency>(value) else {
            return fallback;
        };

        log_debug!(phase = "sufficiency", sufficient = parsed.sufficient, "LLM sufficiency decision");

        SufficiencyDecision {
            sufficient: parsed.sufficient,
            reasons: parsed.reasons,
            missing_aspects: parsed.missing_aspects,
            proposed_refinement: if parsed.sufficient {
                None
            } else {
                Some(ProposedRefinement {
                    broaden_date_range_pct: if parsed.broaden_date_range { 50 } else { 0 },
                    drop_least_specific_doc_type: false,
                })
            },
        }
    }
}

/// Apply a [`ProposedRefinement`] to the previous [`ExpandedQuery`],
/// returning `None` if the result would be identical (loop termination per
/// spec §4.9).
pub fn apply_refinement(previous: &ExpandedQuery, refinement: &ProposedRefinement) -> Option<ExpandedQuery> {
    let mut next = previous.clone();

    if refinement.broaden_date_range_pct > 0 {
        if let (Some(begin), Some(end)) = (
            NaiveDate::parse_from_str(&previous.date_range.begin, "%Y%m%d").ok(),
            NaiveDate::parse_from_str(&previous.date_range.end, "%Y%m%d").ok(),
        ) {
            let span = (end - begin).num_days().max(1);
            let extra = span * refinement.broaden_date_range_pct as i64 / 100;
            let widened = begin - ChronoDuration::days(extra);
            next.date_range.begin = widened.format("%Y%m%d").to_string();
        }
    }

    if refinement.drop_least_specific_doc_type && next.doc_types.len() > 1 {
        next.doc_types.pop();
    }

    if *next == *previous {
        None
    } else {
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DateRange;

    #[tokio::test]
    async fn max_attempts_forces_sufficient() {
        let checker = SufficiencyChecker::new(None);
        let decision = checker.check("q", &[], 3, 3, false).await;
        assert!(decision.sufficient);
    }

    #[tokio::test]
    async fn sparse_results_with_failure_propose_broadening() {
        let checker = SufficiencyChecker::new(None);
        let decision = checker.check("q", &[], 1, 3, true).await;
        assert!(!decision.sufficient);
        assert!(decision.proposed_refinement.is_some());
    }

    #[tokio::test]
    async fn no_llm_configured_defaults_to_sufficient() {
        let checker = SufficiencyChecker::new(None);
        let decision = checker.check("q", &[], 1, 3, false).await;
        assert!(decision.sufficient);
    }

    #[test]
    fn refinement_returns_none_when_no_change_possible() {
        let expanded = ExpandedQuery {
            date_range: DateRange {
                begin: "20240101".to_string(),
                end: "20240101".to_string(),
            },
            ..Default::default()
        };
        let refinement = ProposedRefinement {
            broaden_date_range_pct: 0,
            drop_least_specific_doc_type: false,
        };
        assert!(apply_refinement(&expanded, &refinement).is_none());
    }
}
