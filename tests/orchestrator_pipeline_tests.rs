//! End-to-end pipeline tests driving [`Orchestrator::run`] against a fake
//! `DartApiClient` and a fake `LlmClient`, the way the teacher's own
//! `tests/common.rs` built hand-rolled provider fakes for its integration
//! suite.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use dart_deep_search::cache::ContentCache;
use dart_deep_search::company_resolver::CompanyResolver;
use dart_deep_search::dart_client::{CatalogPage, DartApiClient, SearchParams};
use dart_deep_search::error::{DeepSearchError, DeepSearchResult};
use dart_deep_search::llm::{Completion, LlmClient, Message, RequestConfig};
use dart_deep_search::model::{EnvelopeKind, FilingRef, Query};
use dart_deep_search::orchestrator::{CancellationToken, Orchestrator};
use serial_test::serial;

struct FakeDartClient {
    filings: Vec<FilingRef>,
}

#[async_trait]
impl DartApiClient for FakeDartClient {
    async fn fetch_company_catalogue(&self) -> DeepSearchResult<Vec<u8>> {
        let records = vec![json!({
            "corp_code": "00126380",
            "corp_name": "삼성전자",
            "stock_code": "005930",
        })];
        Ok(serde_json::to_vec(&records).unwrap())
    }

    async fn search_catalogue(&self, params: &SearchParams) -> DeepSearchResult<CatalogPage> {
        let filings = if params.page_no == 1 {
            self.filings.clone()
        } else {
            Vec::new()
        };
        Ok(CatalogPage {
            filings,
            has_more: false,
        })
    }

    async fn fetch_structured_detail(
        &self,
        _rcept_no: &str,
        _doc_type: &str,
    ) -> DeepSearchResult<HashMap<String, serde_json::Value>> {
        Err(DeepSearchError::fetch_failed("no structured endpoint in this fake"))
    }

    async fn fetch_document_archive(&self, rcept_no: &str) -> DeepSearchResult<String> {
        Ok(format!("{rcept_no}에 대한 공시 본문 합병 비율 변경"))
    }

    async fn fetch_web_viewer(&self, _rcept_no: &str) -> DeepSearchResult<String> {
        Err(DeepSearchError::fetch_failed("archive already served this fake"))
    }
}

/// Like [`FakeDartClient`] but `fetch_document_archive` sleeps well past a
/// test's cancellation deadline, so the FETCH phase is still in flight when
/// cancellation fires.
struct SlowDartClient {
    filings: Vec<FilingRef>,
}

#[async_trait]
impl DartApiClient for SlowDartClient {
    async fn fetch_company_catalogue(&self) -> DeepSearchResult<Vec<u8>> {
        let records = vec![json!({
            "corp_code": "00126380",
            "corp_name": "삼성전자",
            "stock_code": "005930",
        })];
        Ok(serde_json::to_vec(&records).unwrap())
    }

    async fn search_catalogue(&self, params: &SearchParams) -> DeepSearchResult<CatalogPage> {
        let filings = if params.page_no == 1 {
            self.filings.clone()
        } else {
            Vec::new()
        };
        Ok(CatalogPage {
            filings,
            has_more: false,
        })
    }

    async fn fetch_structured_detail(
        &self,
        _rcept_no: &str,
        _doc_type: &str,
    ) -> DeepSearchResult<HashMap<String, serde_json::Value>> {
        Err(DeepSearchError::fetch_failed("no structured endpoint in this fake"))
    }

    async fn fetch_document_archive(&self, rcept_no: &str) -> DeepSearchResult<String> {
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        Ok(format!("{rcept_no}에 대한 공시 본문 합병 비율 변경"))
    }

    async fn fetch_web_viewer(&self, _rcept_no: &str) -> DeepSearchResult<String> {
        Err(DeepSearchError::fetch_failed("archive already served this fake"))
    }
}

/// Always answers the query-expander schema with a fixed extraction,
/// regardless of the prompt, so the orchestrator test doesn't depend on
/// prompt wording.
struct FakeLlmClient;

#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn complete(
        &self,
        messages: Vec<Message>,
        _json_schema: Option<serde_json::Value>,
        _config: Option<RequestConfig>,
    ) -> dart_deep_search::llm::LlmResult<Completion> {
        let system_prompt = messages.first().map(|m| m.content.as_str()).unwrap_or_default();
        let user_content = messages.get(1).map(|m| m.content.as_str()).unwrap_or_default();

        let body = if system_prompt.contains("sufficiently answer") {
            json!({"sufficient": true, "reasons": ["enough evidence"], "missing_aspects": []})
        } else if system_prompt.contains("select plausibly relevant") {
            let parsed: serde_json::Value = serde_json::from_str(user_content).unwrap_or(json!({}));
            let rcept_nos: Vec<serde_json::Value> = parsed["candidates"]
                .as_array()
                .into_iter()
                .flatten()
                .map(|c| json!({"rcept_no": c["rcept_no"]}))
                .collect();
            json!({"relevant": rcept_nos})
        } else if system_prompt.contains("concise analytic answer") {
            json!({}) // unused: synthesizer only reads `content`, not structured_response, here
        } else {
            json!({
                "companies": ["삼성전자"],
                "doc_types": ["B001"],
                "date_phrase": "최근 3개월",
                "keywords": ["합병"],
            })
        };

        Ok(Completion {
            content: body.to_string(),
            structured_response: Some(body),
            usage: None,
            model: Some("fake-model".to_string()),
        })
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

fn sample_filing() -> FilingRef {
    let today = chrono::Utc::now().format("%Y%m%d").to_string();
    FilingRef {
        rcept_no: "20240101000001".to_string(),
        corp_name: "삼성전자".to_string(),
        corp_code: "00126380".to_string(),
        report_nm: "합병 비율 변경 보고서".to_string(),
        rcept_dt: today,
        flr_nm: "삼성전자".to_string(),
        pblntf_detail_ty: "B001".to_string(),
    }
}

#[tokio::test]
#[serial]
async fn full_pipeline_resolves_company_and_completes_with_one_attempt() {
    let dart_client: Arc<dyn DartApiClient> = Arc::new(FakeDartClient {
        filings: vec![sample_filing()],
    });
    let cache = Arc::new(ContentCache::new(16 * 1024 * 1024));
    let resolver = Arc::new(CompanyResolver::new());
    let llm: Arc<dyn LlmClient> = Arc::new(FakeLlmClient);

    let orchestrator = build_orchestrator(dart_client, cache, resolver, Some(llm));

    let envelope = orchestrator
        .run(Query::new("삼성전자의 최근 합병 공시 알려줘"), CancellationToken::new())
        .await;

    assert_eq!(envelope.kind, EnvelopeKind::Completed);
    assert_eq!(envelope.telemetry.attempts, 1);
    assert!(envelope.summary.companies.contains(&"삼성전자".to_string()));
}

#[tokio::test]
#[serial]
async fn cancellation_before_run_returns_cancelled_envelope_without_synthesis() {
    let dart_client: Arc<dyn DartApiClient> = Arc::new(FakeDartClient {
        filings: vec![sample_filing()],
    });
    let cache = Arc::new(ContentCache::new(16 * 1024 * 1024));
    let resolver = Arc::new(CompanyResolver::new());

    let orchestrator = build_orchestrator(dart_client, cache, resolver, None);

    let token = CancellationToken::new();
    token.cancel();
    let envelope = orchestrator.run(Query::new("q"), token).await;

    assert_eq!(envelope.kind, EnvelopeKind::Cancelled);
    assert!(envelope.answer.is_empty());
    assert!(envelope.documents.is_empty());
}

#[tokio::test]
#[serial]
async fn cancellation_mid_fetch_returns_promptly_instead_of_waiting_out_the_phase() {
    let dart_client: Arc<dyn DartApiClient> = Arc::new(SlowDartClient {
        filings: vec![sample_filing()],
    });
    let cache = Arc::new(ContentCache::new(16 * 1024 * 1024));
    let resolver = Arc::new(CompanyResolver::new());
    let llm: Arc<dyn LlmClient> = Arc::new(FakeLlmClient);

    let orchestrator = build_orchestrator(dart_client, cache, resolver, Some(llm));
    let token = CancellationToken::new();

    let cancel_token = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel_token.cancel();
    });

    let started = std::time::Instant::now();
    let envelope = orchestrator.run(Query::new("삼성전자 최근 공시"), token).await;
    let elapsed = started.elapsed();

    assert_eq!(envelope.kind, EnvelopeKind::Cancelled);
    assert!(elapsed < std::time::Duration::from_secs(1), "took {elapsed:?}, should abort well within 1s");
}

fn build_orchestrator(
    dart_client: Arc<dyn DartApiClient>,
    cache: Arc<ContentCache>,
    resolver: Arc<CompanyResolver>,
    llm: Option<Arc<dyn LlmClient>>,
) -> Orchestrator {
    Orchestrator::assemble(dart_client, cache, resolver, llm, 30, 3)
}
