//! Integration coverage for the content cache's eviction behavior and the
//! company resolver's directory (re)load, marked `#[serial]` since both hold
//! process-wide state that must not interleave with a concurrent reload in
//! another test.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dart_deep_search::cache::{ContentCache, Namespace};
use dart_deep_search::company_resolver::CompanyResolver;
use dart_deep_search::dart_client::{CatalogPage, DartApiClient, SearchParams};
use dart_deep_search::error::{DeepSearchError, DeepSearchResult};
use serde_json::json;
use serial_test::serial;
use std::collections::HashMap;

struct DirectoryOnlyClient {
    loads: AtomicU32,
}

#[async_trait]
impl DartApiClient for DirectoryOnlyClient {
    async fn fetch_company_catalogue(&self) -> DeepSearchResult<Vec<u8>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let records = vec![
            json!({"corp_code": "00126380", "corp_name": "삼성전자", "stock_code": "005930"}),
            json!({"corp_code": "00164779", "corp_name": "SK하이닉스", "stock_code": "000660"}),
        ];
        Ok(serde_json::to_vec(&records).unwrap())
    }

    async fn search_catalogue(&self, _params: &SearchParams) -> DeepSearchResult<CatalogPage> {
        unimplemented!("not exercised by this test")
    }

    async fn fetch_structured_detail(
        &self,
        _rcept_no: &str,
        _doc_type: &str,
    ) -> DeepSearchResult<HashMap<String, serde_json::Value>> {
        Err(DeepSearchError::fetch_failed("unused"))
    }

    async fn fetch_document_archive(&self, _rcept_no: &str) -> DeepSearchResult<String> {
        Err(DeepSearchError::fetch_failed("unused"))
    }

    async fn fetch_web_viewer(&self, _rcept_no: &str) -> DeepSearchResult<String> {
        Err(DeepSearchError::fetch_failed("unused"))
    }
}

#[tokio::test]
#[serial]
async fn resolver_loads_directory_once_and_reuses_the_cached_snapshot() {
    let client = DirectoryOnlyClient { loads: AtomicU32::new(0) };
    let cache = ContentCache::new(1024 * 1024);
    let resolver = CompanyResolver::new();

    resolver.ensure_loaded(&client, &cache).await.unwrap();
    resolver.ensure_loaded(&client, &cache).await.unwrap();

    assert_eq!(client.loads.load(Ordering::SeqCst), 1);

    let best = resolver.best("삼성전자").unwrap();
    assert_eq!(best.0, "삼성전자");
    assert_eq!(best.1, "00126380");

    let fuzzy = resolver.resolve("SK 하이닉스");
    assert!(fuzzy.iter().any(|c| c.corp_code == "00164779"));
}

#[tokio::test]
#[serial]
async fn cache_evicts_oldest_entry_once_byte_budget_is_exceeded() {
    let cache = ContentCache::new(16);

    cache
        .get_or_fetch(Namespace::SearchList, "a", || async { Ok(b"12345678".to_vec()) })
        .await
        .unwrap();
    cache
        .get_or_fetch(Namespace::SearchList, "b", || async { Ok(b"12345678".to_vec()) })
        .await
        .unwrap();
    // Pushes total past the 16-byte budget; "a" should be evicted first.
    cache
        .get_or_fetch(Namespace::SearchList, "c", || async { Ok(b"12345678".to_vec()) })
        .await
        .unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();
    cache
        .get_or_fetch(Namespace::SearchList, "a", || async move {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok(b"refetched".to_vec())
        })
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1, "evicted entry should be treated as a miss");
}
