use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::directory::query::{fallback_query, name_query, website_query};
use crate::directory::DirectoryClient;
use crate::errors::DirectoryError;
use crate::models::company::{CompanyId, DirectoryRecord};

/// Search endpoints answer with bare ids or lightweight records; accept both.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchHit {
    Id(CompanyId),
    Record(DirectoryRecord),
}

impl SearchHit {
    fn id(&self) -> CompanyId {
        match self {
            SearchHit::Id(id) => *id,
            SearchHit::Record(record) => record.id,
        }
    }

    fn into_record(self) -> DirectoryRecord {
        match self {
            SearchHit::Id(id) => DirectoryRecord {
                id,
                ..Default::default()
            },
            SearchHit::Record(record) => record,
        }
    }
}

/// REST client for the company directory (`POST /search`, `GET /collect/{id}`).
#[derive(Clone)]
pub struct HttpDirectoryClient {
    client: Client,
    base_url: String,
    fallback_url: Option<String>,
    api_key: String,
}

impl HttpDirectoryClient {
    pub fn new(
        base_url: &str,
        api_key: String,
        fallback_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build directory HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            fallback_url: fallback_url.map(|u| u.trim_end_matches('/').to_string()),
            api_key,
        })
    }

    async fn search(&self, base: &str, body: &Value) -> Result<Vec<SearchHit>, DirectoryError> {
        let url = format!("{base}/search");
        let response = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .json(body)
            .send()
            .await?;

        let response = check_status(response).await?;
        let hits: Vec<SearchHit> = response.json().await?;
        debug!("Directory search at {url} returned {} hits", hits.len());
        Ok(hits)
    }
}

/// Maps directory status codes onto the error taxonomy.
async fn check_status(response: Response) -> Result<Response, DirectoryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::TOO_MANY_REQUESTS {
        warn!("Directory API rate limited the request");
        return Err(DirectoryError::RateLimited);
    }
    if status.is_server_error() {
        warn!("Directory API returned {}: {}", status, body);
        return Err(DirectoryError::Unavailable(format!("status {status}")));
    }
    Err(DirectoryError::Malformed(format!("status {status}: {body}")))
}

#[async_trait]
impl DirectoryClient for HttpDirectoryClient {
    async fn search_by_website(&self, website: &str) -> Result<Vec<CompanyId>, DirectoryError> {
        let hits = self.search(&self.base_url, &website_query(website)).await?;
        Ok(hits.iter().map(SearchHit::id).collect())
    }

    async fn search_by_name(
        &self,
        name: &str,
        limit: usize,
    ) -> Result<Vec<DirectoryRecord>, DirectoryError> {
        let hits = self.search(&self.base_url, &name_query(name, limit)).await?;
        Ok(hits
            .into_iter()
            .take(limit)
            .map(SearchHit::into_record)
            .collect())
    }

    async fn fetch_by_id(&self, id: CompanyId) -> Result<Option<DirectoryRecord>, DirectoryError> {
        let response = self
            .client
            .get(format!("{}/collect/{}", self.base_url, id))
            .header("apikey", &self.api_key)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Directory has no record for id {id}");
            return Ok(None);
        }

        let response = check_status(response).await?;
        Ok(Some(response.json().await?))
    }

    async fn search_fallback(
        &self,
        normalized_name: &str,
    ) -> Result<Vec<DirectoryRecord>, DirectoryError> {
        let Some(fallback_url) = &self.fallback_url else {
            return Ok(Vec::new());
        };
        let hits = self
            .search(fallback_url, &fallback_query(normalized_name))
            .await?;
        Ok(hits.into_iter().map(SearchHit::into_record).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, State},
        http::StatusCode as AxumStatus,
        routing::{get, post},
        Json, Router,
    };
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Clone)]
    struct FakeApi {
        search_status: u16,
        hits: Arc<Value>,
    }

    async fn handle_search(
        State(api): State<FakeApi>,
        Json(body): Json<Value>,
    ) -> (AxumStatus, Json<Value>) {
        let status = AxumStatus::from_u16(api.search_status).unwrap();
        if !status.is_success() {
            return (status, Json(json!({ "error": "nope" })));
        }
        // website searches answer with ids only
        if body["query"]["bool"]["must"].is_array() {
            let ids: Vec<Value> = api
                .hits
                .as_array()
                .unwrap()
                .iter()
                .map(|h| h["id"].clone())
                .collect();
            return (status, Json(Value::Array(ids)));
        }
        (status, Json((*api.hits).clone()))
    }

    async fn handle_collect(Path(id): Path<i64>) -> (AxumStatus, Json<Value>) {
        if id == 42 {
            (
                AxumStatus::OK,
                Json(json!({
                    "id": 42,
                    "name": "Acme Corporation",
                    "website": "acme.com",
                    "industry": "Manufacturing",
                    "employee_count": 1200,
                    "founded": 1949,
                    "location": "Springfield"
                })),
            )
        } else {
            (AxumStatus::NOT_FOUND, Json(json!({ "error": "not found" })))
        }
    }

    async fn spawn_api(search_status: u16, hits: Value) -> String {
        let app = Router::new()
            .route("/search", post(handle_search))
            .route("/collect/:id", get(handle_collect))
            .with_state(FakeApi {
                search_status,
                hits: Arc::new(hits),
            });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(base: &str, fallback: Option<&str>) -> HttpDirectoryClient {
        HttpDirectoryClient::new(base, "test-key".to_string(), fallback, Duration::from_secs(5))
            .unwrap()
    }

    fn sample_hits() -> Value {
        json!([
            { "id": 42, "name": "Acme Corporation", "website": "acme.com", "_score": 8.0 },
            { "id": 43, "name": "Acme Anvils", "_score": 3.5 }
        ])
    }

    #[tokio::test]
    async fn test_search_by_website_returns_ids_in_order() {
        let base = spawn_api(200, sample_hits()).await;
        let ids = client(&base, None).search_by_website("acme.com").await.unwrap();
        assert_eq!(ids, vec![CompanyId(42), CompanyId(43)]);
    }

    #[tokio::test]
    async fn test_search_by_name_parses_records_and_scores() {
        let base = spawn_api(200, sample_hits()).await;
        let records = client(&base, None).search_by_name("Acme Corp", 5).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "Acme Corporation");
        assert_eq!(records[0].relevance_score, 8.0);
        assert_eq!(records[1].website, None);
    }

    #[tokio::test]
    async fn test_null_name_or_score_keeps_the_other_hits() {
        let hits = json!([
            { "id": 42, "name": "Acme Corporation", "_score": 8.0 },
            { "id": 43, "name": "Acme Anvils", "_score": null },
            { "id": 44, "name": null, "_score": 1.5 }
        ]);
        let base = spawn_api(200, hits).await;
        let records = client(&base, None).search_by_name("Acme", 5).await.unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].relevance_score, 8.0);
        assert_eq!(records[1].relevance_score, 0.0);
        assert_eq!(records[1].name, "Acme Anvils");
        assert_eq!(records[2].name, "");
        assert_eq!(records[2].id, CompanyId(44));
    }

    #[tokio::test]
    async fn test_search_by_name_respects_limit() {
        let base = spawn_api(200, sample_hits()).await;
        let records = client(&base, None).search_by_name("Acme", 1).await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_by_id_found_and_missing() {
        let base = spawn_api(200, json!([])).await;
        let c = client(&base, None);
        let record = c.fetch_by_id(CompanyId(42)).await.unwrap().unwrap();
        assert_eq!(record.industry.as_deref(), Some("Manufacturing"));
        assert_eq!(record.employee_count, Some(1200));
        assert!(c.fetch_by_id(CompanyId(7)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rate_limit_status_maps_to_rate_limited() {
        let base = spawn_api(429, json!([])).await;
        let err = client(&base, None).search_by_website("acme.com").await.unwrap_err();
        assert!(matches!(err, DirectoryError::RateLimited));
    }

    #[tokio::test]
    async fn test_server_error_maps_to_unavailable() {
        let base = spawn_api(503, json!([])).await;
        let err = client(&base, None).search_by_name("acme", 5).await.unwrap_err();
        assert!(matches!(err, DirectoryError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_client_error_maps_to_malformed() {
        let base = spawn_api(400, json!([])).await;
        let err = client(&base, None).search_by_name("acme", 5).await.unwrap_err();
        assert!(matches!(err, DirectoryError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_unavailable() {
        // nothing listens on the discard port
        let err = client("http://127.0.0.1:9", None)
            .search_by_website("acme.com")
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_fallback_without_index_is_empty() {
        let base = spawn_api(200, sample_hits()).await;
        let records = client(&base, None).search_fallback("acme").await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_fallback_queries_secondary_index() {
        let primary = spawn_api(503, json!([])).await;
        let fallback = spawn_api(200, sample_hits()).await;
        let records = client(&primary, Some(&fallback))
            .search_fallback("acme")
            .await
            .unwrap();
        assert_eq!(records[0].id, CompanyId(42));
    }
}
