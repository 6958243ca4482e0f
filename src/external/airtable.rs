//! Airtable REST client.
//!
//! Lists follow the `offset` cursor over pages of at most 100 records.
//! Requests are spaced by `request_interval_ms` to stay under Airtable's
//! limit of five requests per second per base.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::settings::AirtableConfig;
use crate::error::{AppError, AppResult};
use crate::external::client::build_http_client;
use crate::external::records::{FieldMap, Record, RecordStore};

/// Largest page Airtable returns
pub const PAGE_SIZE: usize = 100;

const SERVICE: &str = "airtable";

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    records: Vec<Record>,
    offset: Option<String>,
}

pub struct AirtableClient {
    http: reqwest::Client,
    base_url: Url,
    base_id: String,
    api_key: String,
    request_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl AirtableClient {
    pub fn new(config: &AirtableConfig) -> AppResult<Self> {
        if !config.is_configured() {
            return Err(AppError::Configuration {
                key: "airtable".to_string(),
                source: anyhow::anyhow!("airtable.base_id and airtable.api_key must be set"),
            });
        }
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| AppError::validation("airtable.base_url", e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::validation(
                "airtable.base_url",
                "must be an absolute http(s) URL",
            ));
        }

        Ok(Self {
            http: build_http_client(Duration::from_secs(config.timeout_seconds))?,
            base_url,
            base_id: config.base_id.clone(),
            api_key: config.api_key.clone(),
            request_interval: Duration::from_millis(config.request_interval_ms),
            last_request: Mutex::new(None),
        })
    }

    fn table_url(&self, table: &str, record_id: Option<&str>) -> AppResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                AppError::validation("airtable.base_url", "must be an absolute http(s) URL")
            })?;
            segments.pop_if_empty().push(&self.base_id).push(table);
            if let Some(id) = record_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    /// Wait until `request_interval` has passed since the previous request.
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let next = previous + self.request_interval;
            if next > Instant::now() {
                tokio::time::sleep_until(next).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn execute(&self, request: RequestBuilder, what: &str) -> AppResult<Response> {
        self.throttle().await;
        let response = request.bearer_auth(&self.api_key).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => Err(AppError::not_found(SERVICE, "resource", what)),
            StatusCode::TOO_MANY_REQUESTS => Err(AppError::external(
                SERVICE,
                format!("rate limited while requesting {}", what),
            )),
            _ => Err(AppError::external(
                SERVICE,
                format!("{} returned {}: {}", what, status, truncate(&body, 300)),
            )),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[async_trait]
impl RecordStore for AirtableClient {
    async fn list_records(&self, table: &str, max_records: usize) -> AppResult<Vec<Record>> {
        let mut records = Vec::new();
        let mut offset: Option<String> = None;
        let mut pages = 0;

        while records.len() < max_records {
            let mut url = self.table_url(table, None)?;
            {
                let mut query = url.query_pairs_mut();
                let page_size = PAGE_SIZE.min(max_records - records.len());
                query.append_pair("pageSize", &page_size.to_string());
                if let Some(cursor) = &offset {
                    query.append_pair("offset", cursor);
                }
            }

            let page: ListResponse = self
                .execute(self.http.get(url), &format!("list {}", table))
                .await?
                .json()
                .await?;
            pages += 1;
            let fetched = page.records.len();
            records.extend(page.records);

            match page.offset {
                Some(next) if fetched > 0 => offset = Some(next),
                _ => break,
            }
        }

        records.truncate(max_records);
        tracing::debug!(table, pages, count = records.len(), "Fetched Airtable records");
        Ok(records)
    }

    async fn get_record(&self, table: &str, record_id: &str) -> AppResult<Record> {
        let url = self.table_url(table, Some(record_id))?;
        let record = self
            .execute(self.http.get(url), &format!("{}/{}", table, record_id))
            .await?
            .json()
            .await?;
        Ok(record)
    }

    async fn update_record(
        &self,
        table: &str,
        record_id: &str,
        fields: FieldMap,
    ) -> AppResult<Record> {
        let url = self.table_url(table, Some(record_id))?;
        let request = self.http.patch(url).json(&json!({ "fields": fields }));
        let record = self
            .execute(request, &format!("update {}/{}", table, record_id))
            .await?
            .json()
            .await?;
        tracing::debug!(table, record_id, "Updated Airtable record");
        Ok(record)
    }

    fn name(&self) -> &'static str {
        SERVICE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> AirtableConfig {
        AirtableConfig {
            base_url: base_url.to_string(),
            base_id: "appBase".to_string(),
            api_key: "key123".to_string(),
            request_interval_ms: 0,
            ..AirtableConfig::default()
        }
    }

    fn records(ids: &[&str]) -> Value {
        Value::Array(
            ids.iter()
                .map(|id| json!({ "id": id, "fields": { "Title": format!("title {}", id) } }))
                .collect(),
        )
    }

    #[test]
    fn test_requires_credentials() {
        let err = AirtableClient::new(&AirtableConfig::default()).err().unwrap();
        assert!(matches!(err, AppError::Configuration { .. }));
    }

    #[test]
    fn test_table_url_encodes_segments() {
        let client = AirtableClient::new(&config("https://api.airtable.com/v0")).unwrap();
        let url = client.table_url("Bills (法案)", Some("rec1")).unwrap();
        assert!(url.as_str().starts_with("https://api.airtable.com/v0/appBase/Bills%20(%E6%B3%95%E6%A1%88)/rec1"));
    }

    #[tokio::test]
    async fn test_list_follows_offset_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/appBase/Issues"))
            .and(query_param("offset", "itr1"))
            .and(header("authorization", "Bearer key123"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "records": records(&["rec3"]) })),
            )
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/appBase/Issues"))
            .and(header("authorization", "Bearer key123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "records": records(&["rec1", "rec2"]),
                "offset": "itr1"
            })))
            .mount(&server)
            .await;

        let client = AirtableClient::new(&config(&server.uri())).unwrap();
        let result = client.list_records("Issues", 1000).await.unwrap();

        let ids: Vec<&str> = result.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["rec1", "rec2", "rec3"]);
    }

    #[tokio::test]
    async fn test_list_stops_at_max_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/appBase/Issues"))
            .and(query_param("pageSize", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "records": records(&["rec1", "rec2"]),
                "offset": "itr1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = AirtableClient::new(&config(&server.uri())).unwrap();
        let result = client.list_records("Issues", 2).await.unwrap();
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_update_sends_patch() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/appBase/Bills/recB1"))
            .and(body_json(json!({ "fields": { "Quality_Score": 80.0 } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "recB1",
                "fields": { "Quality_Score": 80.0 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = AirtableClient::new(&config(&server.uri())).unwrap();
        let mut fields = FieldMap::new();
        fields.insert("Quality_Score".to_string(), json!(80.0));
        let record = client.update_record("Bills", "recB1", fields).await.unwrap();
        assert_eq!(record.number("Quality_Score"), Some(80.0));
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/appBase/Issues/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/appBase/Issues"))
            .respond_with(ResponseTemplate::new(422).set_body_string("INVALID_REQUEST"))
            .mount(&server)
            .await;

        let client = AirtableClient::new(&config(&server.uri())).unwrap();
        let err = client.get_record("Issues", "missing").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));

        let err = client.list_records("Issues", 10).await.unwrap_err();
        match err {
            AppError::External { service, message } => {
                assert_eq!(service, "airtable");
                assert!(message.contains("INVALID_REQUEST"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
