//! C1: Rate-Limited HTTP Client.
//!
//! One token bucket per host (default: 1000 requests/day, burst 5/second),
//! wrapping a retrying GET. Transient network errors and HTTP 5xx/429 are
//! retried up to 3 times with exponential backoff (base 500ms, factor 2,
//! jitter +/-25%); other 4xx are not retried.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use governor::{Quota, RateLimiter};
use tokio::time::timeout;

use crate::error::{DeepSearchError, DeepSearchResult};
use crate::logging::{log_debug, log_warn};

type HostLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

const MAX_RETRIES: u32 = 3;
const BASE_DELAY_MS: u64 = 500;
const BACKOFF_FACTOR: f64 = 2.0;
const JITTER_FRACTION: f64 = 0.25;

/// Refill policy for one host's token bucket.
#[derive(Debug, Clone, Copy)]
pub struct HostRateLimit {
    pub requests_per_day: u32,
    pub burst_per_second: u32,
}

impl Default for HostRateLimit {
    fn default() -> Self {
        Self {
            requests_per_day: 1000,
            burst_per_second: 5,
        }
    }
}

fn build_limiter(limit: HostRateLimit) -> HostLimiter {
    let per_day = limit.requests_per_day.max(1);
    let period = Duration::from_secs(86_400) / per_day;
    let burst = NonZeroU32::new(limit.burst_per_second.max(1)).expect("burst > 0");
    RateLimiter::direct(Quota::with_period(period).expect("non-zero period").allow_burst(burst))
}

/// Rate-limited HTTP GET client, one token bucket per host.
#[derive(Debug)]
pub struct RateLimitedClient {
    client: reqwest::Client,
    limiters: DashMap<String, Arc<HostLimiter>>,
    default_limit: HostRateLimit,
    host_limits: HashMap<String, HostRateLimit>,
}

impl RateLimitedClient {
    pub fn new(default_limit: HostRateLimit) -> Self {
        Self {
            client: reqwest::Client::new(),
            limiters: DashMap::new(),
            default_limit,
            host_limits: HashMap::new(),
        }
    }

    /// Override the rate limit for a specific host.
    pub fn with_host_limit(mut self, host: impl Into<String>, limit: HostRateLimit) -> Self {
        self.host_limits.insert(host.into(), limit);
        self
    }

    fn limiter_for(&self, host: &str) -> Arc<HostLimiter> {
        if let Some(limiter) = self.limiters.get(host) {
            return limiter.clone();
        }
        let limit = self.host_limits.get(host).copied().unwrap_or(self.default_limit);
        let limiter = Arc::new(build_limiter(limit));
        self.limiters.insert(host.to_string(), limiter.clone());
        limiter
    }

    /// `get(url, params) -> (body, status)`. `deadline` bounds how long the
    /// call may block waiting for a token before failing with
    /// [`DeepSearchError::RateLimited`].
    pub async fn get(
        &self,
        url: &str,
        params: &[(&str, &str)],
        deadline: Duration,
    ) -> DeepSearchResult<(String, reqwest::StatusCode)> {
        let host = reqwest::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());

        let limiter = self.limiter_for(&host);
        timeout(deadline, limiter.until_ready())
            .await
            .map_err(|_| DeepSearchError::rate_limited(format!("token bucket exhausted for {host}")))?;

        self.execute_with_retry(url, params).await
    }

    async fn execute_with_retry(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> DeepSearchResult<(String, reqwest::StatusCode)> {
        let mut attempt = 0;
        loop {
            match self.execute_once(url, params).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if attempt < MAX_RETRIES && err.is_retryable() => {
                    let delay = backoff_delay(attempt);
                    log_warn!(
                        url = %url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying rate-limited HTTP request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn execute_once(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> DeepSearchResult<(String, reqwest::StatusCode)> {
        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| DeepSearchError::fetch_failed(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(DeepSearchError::rate_limited(format!(
                "{url} returned {status}"
            )));
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeepSearchError::fetch_failed(format!(
                "{url} returned {status}: {body}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| DeepSearchError::fetch_failed(format!("failed reading body: {e}")))?;

        log_debug!(url = %url, status = %status, "HTTP GET completed");
        Ok((body, status))
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let base = BASE_DELAY_MS as f64 * BACKOFF_FACTOR.powi(attempt as i32);
    let jitter = base * JITTER_FRACTION * (fastrand::f64() * 2.0 - 1.0);
    Duration::from_millis((base + jitter).max(0.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_delay_grows_with_attempt_and_stays_within_jitter_bounds() {
        for attempt in 0..3 {
            let delay = backoff_delay(attempt);
            let base = BASE_DELAY_MS as f64 * BACKOFF_FACTOR.powi(attempt as i32);
            let lower = (base * (1.0 - JITTER_FRACTION)).max(0.0);
            let upper = base * (1.0 + JITTER_FRACTION);
            let millis = delay.as_millis() as f64;
            assert!(millis >= lower - 1.0 && millis <= upper + 1.0, "attempt {attempt}: {millis}");
        }
    }

    #[tokio::test]
    async fn limiter_for_same_host_is_reused() {
        let client = RateLimitedClient::new(HostRateLimit::default());
        let a = client.limiter_for("dart.fss.or.kr");
        let b = client.limiter_for("dart.fss.or.kr");
        assert!(Arc::ptr_eq(&a, &b));
    }
}
