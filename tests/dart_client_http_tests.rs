//! Integration tests for [`HttpDartApiClient`] against a fake filing API
//! server, and the rate-limited client's retry behavior under it.

use dart_deep_search::dart_client::{DartApiClient, HttpDartApiClient, SearchParams};
use dart_deep_search::rate_limited_client::{HostRateLimit, RateLimitedClient};
use serial_test::serial;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn unlimited_client() -> RateLimitedClient {
    RateLimitedClient::new(HostRateLimit {
        requests_per_day: u32::MAX,
        burst_per_second: 100,
    })
}

#[tokio::test]
#[serial]
async fn search_catalogue_parses_list_response_and_pagination_flag() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list.json"))
        .and(query_param("bgn_de", "20240101"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"list":[{"rcept_no":"20240101000001","corp_name":"삼성전자","corp_code":"00126380","report_nm":"분기보고서","rcept_dt":"20240101","flr_nm":"삼성전자","pblntf_detail_ty":"B001"}],"total_count":1}"#,
        ))
        .mount(&server)
        .await;

    let client = HttpDartApiClient::new(unlimited_client(), server.uri(), "test-key");
    let page = client
        .search_catalogue(&SearchParams {
            bgn_de: "20240101".to_string(),
            end_de: "20240601".to_string(),
            pblntf_detail_ty: None,
            corp_code: None,
            page_no: 1,
            page_count: 100,
        })
        .await
        .unwrap();

    assert_eq!(page.filings.len(), 1);
    assert_eq!(page.filings[0].corp_name, "삼성전자");
    assert!(!page.has_more);
}

#[tokio::test]
#[serial]
async fn fetch_document_archive_cleans_xml_to_plain_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/document.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<doc><title>임시공시</title><body>합병 비율 변경</body></doc>"),
        )
        .mount(&server)
        .await;

    let client = HttpDartApiClient::new(unlimited_client(), server.uri(), "test-key");
    let content = client.fetch_document_archive("20240101000001").await.unwrap();
    assert_eq!(content, "임시공시 합병 비율 변경");
}

#[tokio::test]
#[serial]
async fn server_error_then_success_is_retried_transparently() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/list.json"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"list":[],"total_count":0}"#))
        .mount(&server)
        .await;

    let client = HttpDartApiClient::new(unlimited_client(), server.uri(), "test-key");
    let page = client
        .search_catalogue(&SearchParams {
            bgn_de: "20240101".to_string(),
            end_de: "20240601".to_string(),
            pblntf_detail_ty: None,
            corp_code: None,
            page_no: 1,
            page_count: 100,
        })
        .await
        .unwrap();

    assert!(page.filings.is_empty());
}

#[tokio::test]
#[serial]
async fn client_error_is_not_retried_and_surfaces_fetch_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/document.xml"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpDartApiClient::new(unlimited_client(), server.uri(), "test-key");
    let result = client.fetch_document_archive("missing").await;
    assert!(result.is_err());
}
