//! Transport adapter boundary: the thin client that talks the filing API's
//! wire formats.
//!
//! Out of scope as a component to *design* (spec §1) — but the orchestrator
//! still needs a trait to call through, so [`DartApiClient`] is the seam and
//! [`HttpDartApiClient`] a minimal concrete implementation: JSON catalogue
//! search, a structured JSON detail endpoint, a ZIP/XML document archive
//! cleaned via `quick-xml`, and an HTML web viewer cleaned via `scraper`.
//! Peripheral single-shot lookup tools (company-by-name, financial
//! statements) are not implemented here.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{DeepSearchError, DeepSearchResult};
use crate::model::FilingRef;
use crate::rate_limited_client::RateLimitedClient;

const DEFAULT_REQUEST_DEADLINE: Duration = Duration::from_secs(30);

/// One page of catalogue search parameters, per spec §4.6.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub bgn_de: String,
    pub end_de: String,
    pub pblntf_detail_ty: Option<String>,
    pub corp_code: Option<String>,
    pub page_no: u32,
    pub page_count: u32,
}

impl SearchParams {
    /// Canonical parameter string used for cache fingerprinting.
    pub fn canonical(&self) -> String {
        format!(
            "bgn_de={}&end_de={}&pblntf_detail_ty={}&corp_code={}&page_no={}&page_count={}",
            self.bgn_de,
            self.end_de,
            self.pblntf_detail_ty.as_deref().unwrap_or(""),
            self.corp_code.as_deref().unwrap_or(""),
            self.page_no,
            self.page_count,
        )
    }
}

/// One page of catalogue search results.
#[derive(Debug, Clone)]
pub struct CatalogPage {
    pub filings: Vec<FilingRef>,
    pub has_more: bool,
}

/// Doc-types with a dedicated structured detail endpoint (spec §4.8 step 1).
pub fn has_structured_endpoint(doc_type: &str) -> bool {
    matches!(doc_type, "B001" | "A001")
}

/// Boundary trait to the filing API; concrete transport details live in
/// [`HttpDartApiClient`].
#[async_trait]
pub trait DartApiClient: Send + Sync {
    /// Full `{corp_code, corp_name, stock_code}` catalogue, as raw JSON bytes
    /// (company_resolver owns deserialization).
    async fn fetch_company_catalogue(&self) -> DeepSearchResult<Vec<u8>>;

    async fn search_catalogue(&self, params: &SearchParams) -> DeepSearchResult<CatalogPage>;

    async fn fetch_structured_detail(
        &self,
        rcept_no: &str,
        doc_type: &str,
    ) -> DeepSearchResult<HashMap<String, Value>>;

    /// ZIP-of-XML document archive, cleaned to plain text.
    async fn fetch_document_archive(&self, rcept_no: &str) -> DeepSearchResult<String>;

    /// HTML web viewer, cleaned to plain text.
    async fn fetch_web_viewer(&self, rcept_no: &str) -> DeepSearchResult<String>;
}

/// HTTP implementation on top of [`RateLimitedClient`] (C1).
pub struct HttpDartApiClient {
    client: RateLimitedClient,
    base_url: String,
    api_key: String,
    request_deadline: Duration,
}

impl HttpDartApiClient {
    pub fn new(client: RateLimitedClient, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            request_deadline: DEFAULT_REQUEST_DEADLINE,
        }
    }

    /// Overrides the per-request deadline (`DART_PARSE_TIMEOUT_MS`), default 30s.
    pub fn with_request_deadline(mut self, deadline: Duration) -> Self {
        self.request_deadline = deadline;
        self
    }

    fn auth_param(&self) -> (&'static str, &str) {
        ("crtfc_key", self.api_key.as_str())
    }
}

#[async_trait]
impl DartApiClient for HttpDartApiClient {
    async fn fetch_company_catalogue(&self) -> DeepSearchResult<Vec<u8>> {
        let url = format!("{}/corpCode.xml", self.base_url);
        let (body, _status) = self
            .client
            .get(&url, &[self.auth_param()], self.request_deadline)
            .await?;

        let records = parse_corp_code_xml(&body)?;
        serde_json::to_vec(&records)
            .map_err(|e| DeepSearchError::internal(format!("failed to serialize catalogue: {e}")))
    }

    async fn search_catalogue(&self, params: &SearchParams) -> DeepSearchResult<CatalogPage> {
        let url = format!("{}/list.json", self.base_url);
        let page_no = params.page_no.to_string();
        let page_count = params.page_count.to_string();

        let mut query = vec![
            self.auth_param(),
            ("bgn_de", params.bgn_de.as_str()),
            ("end_de", params.end_de.as_str()),
            ("page_no", page_no.as_str()),
            ("page_count", page_count.as_str()),
            ("sort", "date"),
            ("sort_mth", "desc"),
        ];
        if let Some(ty) = &params.pblntf_detail_ty {
            query.push(("pblntf_detail_ty", ty.as_str()));
        }
        if let Some(code) = &params.corp_code {
            query.push(("corp_code", code.as_str()));
        }

        let (body, _status) = self.client.get(&url, &query, self.request_deadline).await?;
        parse_list_response(&body, params.page_count)
    }

    async fn fetch_structured_detail(
        &self,
        rcept_no: &str,
        doc_type: &str,
    ) -> DeepSearchResult<HashMap<String, Value>> {
        let url = format!("{}/{}.json", self.base_url, doc_type.to_lowercase());
        let (body, _status) = self
            .client
            .get(&url, &[self.auth_param(), ("rcept_no", rcept_no)], self.request_deadline)
            .await?;

        serde_json::from_str(&body)
            .map_err(|e| DeepSearchError::fetch_failed(format!("invalid structured detail for {rcept_no}: {e}")))
    }

    async fn fetch_document_archive(&self, rcept_no: &str) -> DeepSearchResult<String> {
        let url = format!("{}/document.xml", self.base_url);
        let (body, _status) = self
            .client
            .get(&url, &[self.auth_param(), ("rcept_no", rcept_no)], self.request_deadline)
            .await?;

        clean_xml(&body)
    }

    async fn fetch_web_viewer(&self, rcept_no: &str) -> DeepSearchResult<String> {
        let url = format!("{}/viewer.do", self.base_url);
        let (body, _status) = self
            .client
            .get(&url, &[self.auth_param(), ("rcept_no", rcept_no)], self.request_deadline)
            .await?;

        Ok(clean_html(&body))
    }
}

#[derive(Debug, Deserialize)]
struct ListResponseItem {
    rcept_no: String,
    corp_name: String,
    corp_code: String,
    report_nm: String,
    rcept_dt: String,
    flr_nm: String,
    pblntf_detail_ty: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    list: Vec<ListResponseItem>,
    #[serde(default)]
    total_count: u32,
}

fn parse_list_response(body: &str, page_count: u32) -> DeepSearchResult<CatalogPage> {
    let parsed: ListResponse = serde_json::from_str(body)
        .map_err(|e| DeepSearchError::fetch_failed(format!("invalid catalogue response: {e}")))?;

    let filings = parsed
        .list
        .into_iter()
        .map(|item| FilingRef {
            rcept_no: item.rcept_no,
            corp_name: item.corp_name,
            corp_code: item.corp_code,
            report_nm: item.report_nm,
            rcept_dt: item.rcept_dt,
            flr_nm: item.flr_nm,
            pblntf_detail_ty: item.pblntf_detail_ty,
        })
        .collect::<Vec<_>>();

    let has_more = filings.len() as u32 >= page_count && parsed.total_count > filings.len() as u32;
    Ok(CatalogPage { filings, has_more })
}

fn parse_corp_code_xml(xml: &str) -> DeepSearchResult<Vec<Value>> {
    use quick_xml::events::Event;
    use quick_xml::reader::Reader;

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut records = Vec::new();
    let mut current: HashMap<String, String> = HashMap::new();
    let mut current_tag = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                current_tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
            }
            Ok(Event::Text(t)) => {
                if !current_tag.is_empty() {
                    let text = t.unescape().unwrap_or_default().to_string();
                    current.insert(current_tag.clone(), text);
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "list" && !current.is_empty() {
                    records.push(serde_json::json!({
                        "corp_code": current.get("corp_code").cloned().unwrap_or_default(),
                        "corp_name": current.get("corp_name").cloned().unwrap_or_default(),
                        "stock_code": current.get("stock_code").filter(|s| !s.is_empty()),
                    }));
                    current.clear();
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(DeepSearchError::fetch_failed(format!(
                    "malformed company catalogue XML: {e}"
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(records)
}

/// Strip XML markup, normalize whitespace, collapse to lines of text.
fn clean_xml(xml: &str) -> DeepSearchResult<String> {
    use quick_xml::events::Event;
    use quick_xml::reader::Reader;

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Text(t)) => {
                let chunk = t.unescape().unwrap_or_default();
                if !chunk.trim().is_empty() {
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(chunk.trim());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(DeepSearchError::fetch_failed(format!(
                    "malformed document archive XML: {e}"
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(normalize_whitespace(&text))
}

/// Strip boilerplate navigation, normalize whitespace, collapse tables to
/// `key:value` lines, per spec §4.8.
fn clean_html(html: &str) -> String {
    use scraper::{Html, Selector};

    let document = Html::parse_document(html);
    let nav_selector = Selector::parse("nav, header, footer, script, style").expect("static selector");
    let row_selector = Selector::parse("tr").expect("static selector");
    let cell_selector = Selector::parse("td, th").expect("static selector");
    let body_selector = Selector::parse("body").expect("static selector");

    let skip_nodes: std::collections::HashSet<_> = document
        .select(&nav_selector)
        .flat_map(|el| el.descendants().map(|d| d.id()))
        .collect();

    let mut lines = Vec::new();
    let mut table_rows = 0usize;

    for row in document.select(&row_selector) {
        if skip_nodes.contains(&row.id()) {
            continue;
        }
        table_rows += 1;
        let cells: Vec<String> = row
            .select(&cell_selector)
            .map(|c| normalize_whitespace(&c.text().collect::<String>()))
            .filter(|s| !s.is_empty())
            .collect();
        if cells.len() >= 2 {
            lines.push(format!("{}:{}", cells[0], cells[1..].join(" ")));
        } else if let Some(only) = cells.into_iter().next() {
            lines.push(only);
        }
    }

    if table_rows == 0 {
        if let Some(body) = document.select(&body_selector).next() {
            let prose = normalize_whitespace(&body.text().collect::<String>());
            if !prose.is_empty() {
                lines.push(prose);
            }
        }
    }

    normalize_whitespace(&lines.join("\n"))
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_endpoint_recognizes_major_report() {
        assert!(has_structured_endpoint("B001"));
        assert!(!has_structured_endpoint("E001"));
    }

    #[test]
    fn canonical_params_include_pagination() {
        let params = SearchParams {
            bgn_de: "20240101".to_string(),
            end_de: "20240601".to_string(),
            pblntf_detail_ty: Some("B001".to_string()),
            corp_code: None,
            page_no: 2,
            page_count: 100,
        };
        assert!(params.canonical().contains("page_no=2"));
    }

    #[test]
    fn clean_xml_extracts_text_only() {
        let xml = "<doc><title>제목</title><body>본문 내용</body></doc>";
        let cleaned = clean_xml(xml).unwrap();
        assert_eq!(cleaned, "제목 본문 내용");
    }

    #[test]
    fn clean_html_strips_tags_and_normalizes_whitespace() {
        let html = "<html><body><p>  hello   world  </p></body></html>";
        let cleaned = clean_html(html);
        assert!(cleaned.contains("hello world"));
    }
}
