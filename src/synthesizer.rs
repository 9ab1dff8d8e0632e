//! C10: Synthesizer.
//!
//! Analyzes the final Filing list, selects key findings and a timeline, and
//! calls the LLM for a narrative answer (falling back to a deterministic
//! template on LLM failure).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde_json::json;

use crate::llm::{LlmClient, Message};
use crate::logging::log_warn;
use crate::model::{Confidence, DateRange, EnvelopeSummary, ExpandedQuery, Filing, ResponseEnvelope, Telemetry};
use crate::model::EnvelopeKind;

const MAX_KEY_FINDINGS: usize = 5;
const SNIPPET_CHARS: usize = 280;
const MAX_TIMELINE_DATES: usize = 10;
const MAX_TIMELINE_EVENTS_PER_DATE: usize = 3;

#[derive(Debug, Clone)]
pub struct Analysis {
    pub total_count: usize,
    pub companies: HashSet<String>,
    pub date_span: DateRange,
    pub report_types: HashMap<String, u32>,
    pub keywords_found: HashSet<String>,
}

#[derive(Debug, Clone)]
pub struct KeyFinding {
    pub corp_name: String,
    pub rcept_dt: String,
    pub report_nm: String,
    pub snippet: String,
    pub rcept_no: String,
}

#[derive(Debug, Clone)]
pub struct TimelineEntry {
    pub rcept_dt: String,
    pub events: Vec<String>,
}

pub struct Synthesizer {
    llm: Option<Arc<dyn LlmClient>>,
}

impl Synthesizer {
    pub fn new(llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self { llm }
    }

    pub async fn synthesize(
        &self,
        original_query: &str,
        expanded: &ExpandedQuery,
        filings: Vec<Filing>,
        telemetry: Telemetry,
    ) -> ResponseEnvelope {
        let analysis = analyze(&filings, expanded);
        let key_findings = select_key_findings(&filings);
        let timeline = build_timeline(&filings);

        let answer = match &self.llm {
            Some(llm) => {
                match self.narrative(llm.as_ref(), original_query, &analysis, &key_findings, &timeline).await {
                    Ok(text) => text,
                    Err(err) => {
                        log_warn!(error = %err, "synthesizer LLM call failed, using template answer");
                        template_answer(&analysis, &filings)
                    }
                }
            }
            None => template_answer(&analysis, &filings),
        };

        let confidence = if filings.iter().all(|f| !f.has_body()) {
            Confidence::Low
        } else if filings.len() >= MIN_RECENT_FOR_HIGH_CONFIDENCE {
            Confidence::High
        } else {
            Confidence::Medium
        };

        ResponseEnvelope {
            query: original_query.to_string(),
            answer,
            summary: EnvelopeSummary {
                total_documents: filings.len(),
                date_range: expanded.date_range.clone(),
                companies: analysis.companies.iter().cloned().collect(),
                confidence,
            },
            documents: filings,
            telemetry,
            kind: EnvelopeKind::Completed,
        }
    }

    async fn narrative(
        &self,
        llm: &dyn LlmClient,
        original_query: &str,
        analysis: &Analysis,
        key_findings: &[KeyFinding],
        timeline: &[TimelineEntry],
    ) -> Result<String, crate::error::DeepSearchError> {
        let messages = vec![
            Message::system(
                "You write a concise analytic answer to a Korean corporate disclosure question, \
                 grounded only in the provided filings. State explicitly when evidence is \
                 unavailable.",
            ),
            Message::user(
                json!({
                    "query": original_query,
                    "analysis": {
                        "total_count": analysis.total_count,
                        "companies": analysis.companies,
                        "date_span": analysis.date_span,
                        "report_types": analysis.report_types,
                    },
                    "key_findings": key_findings.iter().map(|f| json!({
                        "corp_name": f.corp_name,
                        "rcept_dt": f.rcept_dt,
                        "report_nm": f.report_nm,
                        "snippet": f.snippet,
                    })).collect::<Vec<_>>(),
                    "timeline": timeline.iter().map(|t| json!({
                        "rcept_dt": t.rcept_dt,
                        "events": t.events,
                    })).collect::<Vec<_>>(),
                })
                .to_string(),
            ),
        ];

        let completion = llm
            .complete(messages, None, None)
            .await
            .map_err(|e| crate::error::DeepSearchError::llm_unavailable(e.to_string()))?;

        Ok(completion.content)
    }
}

const MIN_RECENT_FOR_HIGH_CONFIDENCE: usize = 3;

fn analyze(filings: &[Filing], expanded: &ExpandedQuery) -> Analysis {
    let mut companies = HashSet::new();
    let mut report_types = HashMap::new();
    let mut keywords_found = HashSet::new();
    let mut min_date: Option<String> = None;
    let mut max_date: Option<String> = None;

    for filing in filings {
        companies.insert(filing.filing_ref.corp_name.clone());
        *report_types.entry(filing.filing_ref.pblntf_detail_ty.clone()).or_insert(0) += 1;

        for keyword in &expanded.keywords {
            if filing.filing_ref.report_nm.contains(keyword.as_str()) || filing.content.contains(keyword.as_str()) {
                keywords_found.insert(keyword.clone());
            }
        }

        let dt = &filing.filing_ref.rcept_dt;
        min_date = Some(match min_date {
            Some(m) if m <= *dt => m,
            _ => dt.clone(),
        });
        max_date = Some(match max_date {
            Some(m) if m >= *dt => m,
            _ => dt.clone(),
        });
    }

    Analysis {
        total_count: filings.len(),
        companies,
        date_span: DateRange {
            begin: min_date.unwrap_or_else(|| expanded.date_range.begin.clone()),
            end: max_date.unwrap_or_else(|| expanded.date_range.end.clone()),
        },
        report_types,
        keywords_found,
    }
}

fn select_key_findings(filings: &[Filing]) -> Vec<KeyFinding> {
    filings
        .iter()
        .take(MAX_KEY_FINDINGS)
        .map(|f| KeyFinding {
            corp_name: f.filing_ref.corp_name.clone(),
            rcept_dt: f.filing_ref.rcept_dt.clone(),
            report_nm: f.filing_ref.report_nm.clone(),
            snippet: f.content.chars().take(SNIPPET_CHARS).collect(),
            rcept_no: f.filing_ref.rcept_no.clone(),
        })
        .collect()
}

fn build_timeline(filings: &[Filing]) -> Vec<TimelineEntry> {
    let mut by_date: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for filing in filings {
        let entry = by_date.entry(filing.filing_ref.rcept_dt.clone()).or_default();
        if entry.len() < MAX_TIMELINE_EVENTS_PER_DATE {
            entry.push(format!("{}: {}", filing.filing_ref.corp_name, filing.filing_ref.report_nm));
        }
    }

    by_date
        .into_iter()
        .rev()
        .take(MAX_TIMELINE_DATES)
        .map(|(rcept_dt, events)| TimelineEntry { rcept_dt, events })
        .collect()
}

fn template_answer(analysis: &Analysis, filings: &[Filing]) -> String {
    if filings.is_empty() || filings.iter().all(|f| !f.has_body()) {
        return "No disclosure evidence could be retrieved for this question.".to_string();
    }
    format!(
        "Found {} disclosures across {} companies between {} and {}.",
        analysis.total_count,
        analysis.companies.len(),
        analysis.date_span.begin,
        analysis.date_span.end
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FilingRef, FilingSource};
    use chrono::Utc;

    fn filing(corp: &str, dt: &str, report: &str) -> Filing {
        Filing {
            filing_ref: FilingRef {
                rcept_no: format!("{corp}{dt}"),
                corp_name: corp.to_string(),
                corp_code: "00000000".to_string(),
                report_nm: report.to_string(),
                rcept_dt: dt.to_string(),
                flr_nm: corp.to_string(),
                pblntf_detail_ty: "B001".to_string(),
            },
            content: "본문 내용".to_string(),
            structured_data: None,
            source: FilingSource::DocumentArchive,
            fetched_at: Utc::now(),
            fetch_error: None,
        }
    }

    #[test]
    fn analysis_tracks_companies_and_date_span() {
        let filings = vec![filing("A", "20240101", "r1"), filing("B", "20240601", "r2")];
        let expanded = ExpandedQuery::default();
        let analysis = analyze(&filings, &expanded);
        assert_eq!(analysis.total_count, 2);
        assert_eq!(analysis.companies.len(), 2);
        assert_eq!(analysis.date_span.begin, "20240101");
        assert_eq!(analysis.date_span.end, "20240601");
    }

    #[test]
    fn template_answer_flags_missing_evidence() {
        let analysis = Analysis {
            total_count: 0,
            companies: HashSet::new(),
            date_span: DateRange { begin: "x".into(), end: "y".into() },
            report_types: HashMap::new(),
            keywords_found: HashSet::new(),
        };
        assert!(template_answer(&analysis, &[]).contains("No disclosure evidence"));
    }

    #[test]
    fn timeline_groups_by_date_descending() {
        let filings = vec![filing("A", "20240101", "r1"), filing("B", "20240601", "r2")];
        let timeline = build_timeline(&filings);
        assert_eq!(timeline[0].rcept_dt, "20240601");
    }
}
