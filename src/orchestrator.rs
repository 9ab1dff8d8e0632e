//! C11: Orchestrator.
//!
//! Drives the state machine `EXPAND -> SEARCH -> FILTER -> FETCH ->
//! SUFFICIENCY -> {SYNTHESIZE | EXPAND}` described in spec §4.11, wiring
//! C1-C10 together and accumulating run [`Telemetry`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Notify;

use crate::cache::ContentCache;
use crate::company_resolver::CompanyResolver;
use crate::config::DeepSearchConfig;
use crate::dart_client::{DartApiClient, HttpDartApiClient};
use crate::document_fetcher::DocumentFetcher;
use crate::document_filter::DocumentFilter;
use crate::error::DeepSearchError;
use crate::llm::{LlmClient, UnifiedLlmClient};
use crate::logging::{log_debug, log_warn};
use crate::model::{
    Confidence, DateRange, EnvelopeKind, EnvelopeSummary, ExpandedQuery, Filing, PartialFailure, Query,
    ResponseEnvelope, Telemetry,
};
use crate::query_expander::QueryExpander;
use crate::rate_limited_client::{HostRateLimit, RateLimitedClient};
use crate::search_executor::{SearchExecutor, SearchResult};
use crate::sufficiency::{apply_refinement, SufficiencyChecker};
use crate::synthesizer::Synthesizer;

const DEFAULT_CACHE_BYTES: usize = 512 * 1024 * 1024;
const DART_BASE_URL: &str = "https://opendart.fss.or.kr";

/// Cooperative cancellation signal shared across a run.
///
/// Components check it between phases; per spec §5 a cancelled run must stop
/// within 1s and never reach synthesis.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves as soon as `cancel()` is called (or immediately if it
    /// already has been). Raced against a phase's future via `select!` so a
    /// concurrent fan-out is dropped, not merely checked between phases.
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// Wires every component together and drives one run of the pipeline.
pub struct Orchestrator {
    dart_client: Arc<dyn DartApiClient>,
    cache: Arc<ContentCache>,
    resolver: Arc<CompanyResolver>,
    llm: Option<Arc<dyn LlmClient>>,
    query_expander: QueryExpander,
    search_executor: SearchExecutor,
    document_filter: DocumentFilter,
    document_fetcher: DocumentFetcher,
    sufficiency: SufficiencyChecker,
    synthesizer: Synthesizer,
}

impl Orchestrator {
    /// Build an orchestrator from process configuration.
    ///
    /// An LLM that fails to configure or validate degrades every LLM-backed
    /// capability to its rule-based fallback rather than failing the whole
    /// run (spec §9 open question: LLM availability is a capability, not a
    /// hard dependency).
    pub fn new(config: &DeepSearchConfig) -> Self {
        let rate_limited = RateLimitedClient::new(HostRateLimit {
            requests_per_day: config.api_rate_limit_per_day,
            burst_per_second: 5,
        });
        let dart_client: Arc<dyn DartApiClient> = Arc::new(
            HttpDartApiClient::new(rate_limited, DART_BASE_URL, config.dart_api_key.clone())
                .with_request_deadline(std::time::Duration::from_millis(config.parse_timeout_ms)),
        );
        let cache = Arc::new(ContentCache::new(DEFAULT_CACHE_BYTES));
        let resolver = Arc::new(CompanyResolver::new());

        let llm: Option<Arc<dyn LlmClient>> = match UnifiedLlmClient::from_config(config.llm.clone()) {
            Ok(client) => Some(Arc::new(client)),
            Err(err) => {
                log_warn!(error = %err, "LLM configuration invalid, running with rule-based fallbacks only");
                None
            }
        };

        Self::assemble(
            dart_client,
            cache,
            resolver,
            llm,
            config.max_search_results,
            config.parallel_downloads,
        )
    }

    /// Low-level constructor taking already-built components directly,
    /// bypassing environment loading. Used by [`Self::new`] and by tests that
    /// substitute fakes for the filing API and the LLM.
    pub fn assemble(
        dart_client: Arc<dyn DartApiClient>,
        cache: Arc<ContentCache>,
        resolver: Arc<CompanyResolver>,
        llm: Option<Arc<dyn LlmClient>>,
        max_search_results: u32,
        parallel_downloads: usize,
    ) -> Self {
        Self {
            dart_client: dart_client.clone(),
            cache: cache.clone(),
            resolver: resolver.clone(),
            llm: llm.clone(),
            query_expander: QueryExpander::new(llm.clone(), resolver),
            search_executor: SearchExecutor::new(dart_client.clone(), cache.clone(), max_search_results),
            document_filter: DocumentFilter::new(llm.clone()),
            document_fetcher: DocumentFetcher::new(dart_client, cache, parallel_downloads),
            sufficiency: SufficiencyChecker::new(llm.clone()),
            synthesizer: Synthesizer::new(llm),
        }
    }

    /// Run the pipeline for `query`, returning a [`ResponseEnvelope`].
    ///
    /// Never returns an `Err`: every failure mode is captured either as a
    /// [`PartialFailure`] folded into telemetry, or as the envelope's `kind`
    /// and `answer` fields.
    pub async fn run(&self, query: Query, cancellation: CancellationToken) -> ResponseEnvelope {
        let run_start = Instant::now();
        let run_id = uuid::Uuid::new_v4();
        let mut telemetry = Telemetry::default();
        let max_attempts = query.options.max_attempts.max(1);

        log_debug!(run_id = %run_id, max_attempts, "run starting");

        if let Err(err) = self.resolver.ensure_loaded(self.dart_client.as_ref(), &self.cache).await {
            log_warn!(run_id = %run_id, error = %err, "company directory failed to load, fuzzy resolution degraded");
        }

        let mut current_expansion: Option<ExpandedQuery> = None;
        let mut filings: Vec<Filing> = Vec::new();
        let mut attempts_used: u32 = 0;

        let mut envelope = loop {
            if cancellation.is_cancelled() {
                break cancelled_envelope(&query.text);
            }
            attempts_used += 1;
            telemetry.attempts = attempts_used;
            log_debug!(run_id = %run_id, attempt = attempts_used, "attempt starting");

            // EXPAND
            let phase_start = Instant::now();
            let expanded = match &current_expansion {
                Some(prev) => prev.clone(),
                None => match self.query_expander.expand(&query.text).await {
                    Ok(e) => e,
                    Err(err) => {
                        log_warn!(run_id = %run_id, error = %err, "expand phase failed");
                        record_failure(&mut telemetry, "expand", &err);
                        if attempts_used == 1 {
                            break abort_envelope(&query.text, &err);
                        }
                        break self
                            .synthesizer
                            .synthesize(&query.text, &ExpandedQuery::default(), filings, telemetry.clone())
                            .await;
                    }
                },
            };
            record_latency(&mut telemetry, "expand", phase_start);
            if self.llm.is_some() && current_expansion.is_none() {
                telemetry.llm_calls += 1;
            }

            if cancellation.is_cancelled() {
                break cancelled_envelope(&query.text);
            }

            // SEARCH
            let phase_start = Instant::now();
            let SearchResult {
                filings: candidates,
                partial_failures,
                all_failed,
            } = tokio::select! {
                result = self.search_executor.search(&expanded) => result,
                _ = cancellation.cancelled() => break cancelled_envelope(&query.text),
            };
            record_latency(&mut telemetry, "search", phase_start);
            let any_sub_query_failed = !partial_failures.is_empty();
            telemetry.partial_failures.extend(partial_failures);

            if all_failed {
                let err = DeepSearchError::search_unavailable("every catalogue sub-query failed");
                log_warn!(run_id = %run_id, error = %err, "search phase failed");
                if attempts_used == 1 {
                    break abort_envelope(&query.text, &err);
                }
                break self.synthesizer.synthesize(&query.text, &expanded, filings, telemetry.clone()).await;
            }

            if cancellation.is_cancelled() {
                break cancelled_envelope(&query.text);
            }

            // FILTER
            let phase_start = Instant::now();
            let filtered = tokio::select! {
                result = self.document_filter.filter(&query.text, &expanded, candidates) => result,
                _ = cancellation.cancelled() => break cancelled_envelope(&query.text),
            };
            record_latency(&mut telemetry, "filter", phase_start);
            if self.llm.is_some() {
                telemetry.llm_calls += 1;
            }

            if cancellation.is_cancelled() {
                break cancelled_envelope(&query.text);
            }

            // FETCH
            let phase_start = Instant::now();
            filings = tokio::select! {
                result = self.document_fetcher.fetch_all(filtered) => result,
                _ = cancellation.cancelled() => break cancelled_envelope(&query.text),
            };
            record_latency(&mut telemetry, "fetch", phase_start);

            if cancellation.is_cancelled() {
                break cancelled_envelope(&query.text);
            }

            // SUFFICIENCY
            let phase_start = Instant::now();
            let decision = self
                .sufficiency
                .check(&query.text, &filings, attempts_used, max_attempts, any_sub_query_failed)
                .await;
            record_latency(&mut telemetry, "sufficiency", phase_start);
            if self.llm.is_some() {
                telemetry.llm_calls += 1;
            }

            if decision.sufficient || attempts_used >= max_attempts {
                telemetry.cache_hit_rate = self.cache.hit_rate();
                break self.synthesizer.synthesize(&query.text, &expanded, filings, telemetry.clone()).await;
            }

            let refined = decision.proposed_refinement.as_ref().and_then(|r| apply_refinement(&expanded, r));
            match refined {
                Some(next) => current_expansion = Some(next),
                None => {
                    telemetry.cache_hit_rate = self.cache.hit_rate();
                    break self.synthesizer.synthesize(&query.text, &expanded, filings, telemetry.clone()).await;
                }
            }
        };

        envelope.telemetry.duration_ms = run_start.elapsed().as_millis() as u64;
        log_debug!(
            run_id = %run_id,
            kind = ?envelope.kind,
            attempts = envelope.telemetry.attempts,
            duration_ms = envelope.telemetry.duration_ms,
            "run complete"
        );
        envelope
    }
}

fn record_latency(telemetry: &mut Telemetry, phase: &str, started: Instant) {
    telemetry
        .phase_latencies_ms
        .insert(phase.to_string(), started.elapsed().as_millis() as u64);
}

fn record_failure(telemetry: &mut Telemetry, phase: &str, err: &DeepSearchError) {
    telemetry.partial_failures.push(PartialFailure {
        phase: phase.to_string(),
        kind: format!("{:?}", err.category()),
        message: err.to_string(),
    });
}

fn cancelled_envelope(query_text: &str) -> ResponseEnvelope {
    ResponseEnvelope {
        query: query_text.to_string(),
        answer: String::new(),
        summary: EnvelopeSummary {
            total_documents: 0,
            date_range: DateRange {
                begin: String::new(),
                end: String::new(),
            },
            companies: Vec::new(),
            confidence: Confidence::Low,
        },
        documents: Vec::new(),
        telemetry: Telemetry::default(),
        kind: EnvelopeKind::Cancelled,
    }
}

fn abort_envelope(query_text: &str, err: &DeepSearchError) -> ResponseEnvelope {
    ResponseEnvelope {
        query: query_text.to_string(),
        answer: err.user_message(),
        summary: EnvelopeSummary {
            total_documents: 0,
            date_range: DateRange {
                begin: String::new(),
                end: String::new(),
            },
            companies: Vec::new(),
            confidence: Confidence::Low,
        },
        documents: Vec::new(),
        telemetry: Telemetry::default(),
        kind: EnvelopeKind::Completed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dart_client::{CatalogPage, SearchParams};
    use crate::error::DeepSearchResult;
    use crate::model::FilingRef;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct EmptyDartClient;

    #[async_trait]
    impl DartApiClient for EmptyDartClient {
        async fn fetch_company_catalogue(&self) -> DeepSearchResult<Vec<u8>> {
            Ok(b"[]".to_vec())
        }

        async fn search_catalogue(&self, _params: &SearchParams) -> DeepSearchResult<CatalogPage> {
            Ok(CatalogPage {
                filings: Vec::<FilingRef>::new(),
                has_more: false,
            })
        }

        async fn fetch_structured_detail(
            &self,
            _rcept_no: &str,
            _doc_type: &str,
        ) -> DeepSearchResult<HashMap<String, serde_json::Value>> {
            Err(DeepSearchError::fetch_failed("no structured detail in this fake"))
        }

        async fn fetch_document_archive(&self, _rcept_no: &str) -> DeepSearchResult<String> {
            Err(DeepSearchError::fetch_failed("no archive in this fake"))
        }

        async fn fetch_web_viewer(&self, _rcept_no: &str) -> DeepSearchResult<String> {
            Err(DeepSearchError::fetch_failed("no viewer in this fake"))
        }
    }

    fn test_orchestrator() -> Orchestrator {
        let dart_client: Arc<dyn DartApiClient> = Arc::new(EmptyDartClient);
        let cache = Arc::new(ContentCache::new(1024 * 1024));
        let resolver = Arc::new(CompanyResolver::new());
        Orchestrator::assemble(dart_client, cache, resolver, None, 30, 3)
    }

    #[tokio::test]
    async fn empty_catalogue_still_synthesizes_a_completed_envelope() {
        let orchestrator = test_orchestrator();
        let envelope = orchestrator.run(Query::new("\"삼성전자\" 최근 공시"), CancellationToken::new()).await;
        assert_eq!(envelope.kind, EnvelopeKind::Completed);
        assert!(envelope.documents.is_empty());
    }

    #[tokio::test]
    async fn pre_cancelled_token_short_circuits_to_cancelled_envelope() {
        let orchestrator = test_orchestrator();
        let token = CancellationToken::new();
        token.cancel();
        let envelope = orchestrator.run(Query::new("q"), token).await;
        assert_eq!(envelope.kind, EnvelopeKind::Cancelled);
    }
}
