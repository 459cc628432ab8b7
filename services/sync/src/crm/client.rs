use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use super::models::{
    AssociationResponse, Company, CrmPipeline, Deal, Owner, PipelinesResponse, SearchResponse,
};

/// Server-side page size for the deal search endpoint.
const PAGE_SIZE: u32 = 100;

/// Properties requested for every deal.
const DEAL_PROPERTIES: [&str; 5] = ["dealname", "dealstage", "pipeline", "amount", "lastmodified"];

#[derive(Debug, Clone)]
pub struct CrmClientConfig {
    pub base_url: String,
    pub api_token: String,
    pub pipeline_id: String,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl CrmClientConfig {
    /// Load CRM config from environment.
    ///
    /// Returns `Ok(None)` if the CRM is not configured (base URL / token
    /// missing). Returns `Err` if the CRM IS configured but
    /// `CRM_PIPELINE_ID` is missing or blank (fail-fast on
    /// misconfiguration).
    pub fn from_env() -> Result<Option<Self>, String> {
        let base_url = match std::env::var("CRM_BASE_URL").ok() {
            Some(v) => v,
            None => return Ok(None),
        };
        let api_token = match std::env::var("CRM_API_TOKEN").ok() {
            Some(v) => v,
            None => return Ok(None),
        };

        // The CRM IS configured — the source pipeline is now mandatory
        let pipeline_id = std::env::var("CRM_PIPELINE_ID")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                "CRM_PIPELINE_ID is required when CRM credentials are set, but not found"
                    .to_string()
            })?;

        let max_retries = std::env::var("CRM_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3);
        let timeout_secs = std::env::var("CRM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        Ok(Some(Self {
            base_url,
            api_token,
            pipeline_id,
            max_retries,
            timeout_secs,
        }))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CrmClientError {
    #[error("HTTP {status}: {body}")]
    HttpError { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

#[derive(Clone)]
pub struct CrmClient {
    client: Client,
    config: CrmClientConfig,
    scope_warning_emitted: Arc<AtomicBool>,
}

impl CrmClient {
    pub fn new(config: CrmClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            config,
            scope_warning_emitted: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &CrmClientConfig {
        &self.config
    }

    /// For testing: point the client at a specific base URL (e.g., wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.to_string();
        self
    }

    /// Fetch every deal in the configured pipeline modified at or after
    /// `since`, following the opaque `after` cursor until the source reports
    /// no further pages.
    pub async fn search_deals(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Deal>, CrmClientError> {
        let url = format!("{}/v1/deals/search", self.config.base_url);
        let mut after: Option<String> = None;
        let mut all_deals = Vec::new();

        loop {
            let mut filters = vec![serde_json::json!({
                "property": "pipeline",
                "operator": "eq",
                "value": self.config.pipeline_id,
            })];
            if let Some(since) = since {
                filters.push(serde_json::json!({
                    "property": "lastmodified",
                    "operator": "gte",
                    "value": since.to_rfc3339(),
                }));
            }

            let mut body = serde_json::json!({
                "filters": filters,
                "properties": DEAL_PROPERTIES,
                "limit": PAGE_SIZE,
            });
            if let Some(cursor) = &after {
                body["after"] = serde_json::Value::String(cursor.clone());
            }

            let page: SearchResponse = self
                .send_with_retry(|| self.client.post(&url).json(&body))
                .await?;

            let next = page.next_cursor().map(str::to_string);
            all_deals.extend(page.results);

            match next {
                Some(cursor) => after = Some(cursor),
                None => break,
            }
        }

        Ok(all_deals)
    }

    /// Company lookup; all errors propagate to the caller.
    pub async fn fetch_company(&self, id: &str) -> Result<Company, CrmClientError> {
        let url = format!("{}/v1/companies/{id}", self.config.base_url);
        self.send_with_retry(|| self.client.get(&url)).await
    }

    /// Owner lookup. A 403 means the configured token lacks the optional
    /// owners scope; that degrades to `None` with a one-time warning rather
    /// than failing the caller. All other errors propagate.
    pub async fn fetch_owner(&self, id: &str) -> Result<Option<Owner>, CrmClientError> {
        let url = format!("{}/v1/owners/{id}", self.config.base_url);
        match self.send_with_retry(|| self.client.get(&url)).await {
            Ok(owner) => Ok(Some(owner)),
            Err(CrmClientError::HttpError {
                status: StatusCode::FORBIDDEN,
                ..
            }) => {
                if !self.scope_warning_emitted.swap(true, Ordering::Relaxed) {
                    tracing::warn!(
                        "CRM token lacks the owners scope; proceeding without owner lookups"
                    );
                }
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// The company associated with a deal, or `None` when no association
    /// exists. Absence is a data condition, not an error.
    pub async fn associated_company_id(
        &self,
        deal_id: &str,
    ) -> Result<Option<String>, CrmClientError> {
        self.fetch_association(deal_id, "companies").await
    }

    /// The owner associated with a deal, or `None` when no association exists.
    pub async fn associated_owner_id(
        &self,
        deal_id: &str,
    ) -> Result<Option<String>, CrmClientError> {
        self.fetch_association(deal_id, "owners").await
    }

    /// Available pipelines and their stages, for configuration discovery.
    pub async fn list_pipelines(&self) -> Result<Vec<CrmPipeline>, CrmClientError> {
        let url = format!("{}/v1/pipelines/deals", self.config.base_url);
        let response: PipelinesResponse = self.send_with_retry(|| self.client.get(&url)).await?;
        Ok(response.results)
    }

    async fn fetch_association(
        &self,
        deal_id: &str,
        to_type: &str,
    ) -> Result<Option<String>, CrmClientError> {
        let url = format!(
            "{}/v1/deals/{deal_id}/associations/{to_type}",
            self.config.base_url
        );
        let response: AssociationResponse = self.send_with_retry(|| self.client.get(&url)).await?;
        Ok(response.results.into_iter().next().map(|r| r.id))
    }

    /// Send a request, retrying transient failures with exponential backoff.
    /// 429 honors Retry-After (capped at 60s); 5xx and connect/timeout
    /// errors back off `min(2^attempt, 30)` seconds; other 4xx fail fast.
    async fn send_with_retry<T, F>(&self, build: F) -> Result<T, CrmClientError>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_error = String::new();

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff_secs = std::cmp::min(1u64 << attempt, 30);
                tracing::warn!(attempt, backoff_secs, "retrying after backoff");
                tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
            }

            let response = match build()
                .bearer_auth(&self.config.api_token)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_timeout() || e.is_connect() {
                        continue;
                    }
                    return Err(CrmClientError::RequestError(e));
                }
            };

            let status = response.status();

            if status.is_success() {
                return response
                    .json::<T>()
                    .await
                    .map_err(CrmClientError::RequestError);
            }

            // Honor Retry-After header for 429
            if status == StatusCode::TOO_MANY_REQUESTS {
                if let Some(retry_after) = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                {
                    let wait = std::cmp::min(retry_after, 60);
                    tracing::warn!(wait, "rate-limited, waiting Retry-After");
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                }
                last_error = "429 Too Many Requests".to_string();
                continue;
            }

            // Retry on 5xx
            if status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                last_error = format!("{status}: {body}");
                continue;
            }

            // Fail fast on 4xx (except 429 handled above)
            let body = response.text().await.unwrap_or_default();
            return Err(CrmClientError::HttpError { status, body });
        }

        Err(CrmClientError::MaxRetriesExceeded {
            attempts: self.config.max_retries + 1,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> CrmClientConfig {
        CrmClientConfig {
            base_url: "http://localhost".to_string(),
            api_token: "fake-token".to_string(),
            pipeline_id: "consulting".to_string(),
            max_retries: 2,
            timeout_secs: 5,
        }
    }

    fn test_client(server: &MockServer) -> CrmClient {
        CrmClient::new(test_config())
            .unwrap()
            .with_base_url(&server.uri())
    }

    fn make_deal_json(id: &str, name: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "properties": {
                "dealname": name,
                "dealstage": "execution",
                "pipeline": "consulting",
                "amount": "1000.00"
            }
        })
    }

    #[tokio::test]
    async fn search_deals_single_page() {
        let server = MockServer::start().await;

        let response = serde_json::json!({
            "results": [make_deal_json("1", "Alpha"), make_deal_json("2", "Beta")]
        });

        Mock::given(method("POST"))
            .and(path("/v1/deals/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let deals = client.search_deals(None).await.unwrap();
        assert_eq!(deals.len(), 2);
        assert_eq!(deals[0].name(), Some("Alpha"));
    }

    #[tokio::test]
    async fn search_deals_follows_cursor() {
        let server = MockServer::start().await;

        // Page 2 (matches only when the cursor is echoed back)
        let page2 = serde_json::json!({
            "results": [make_deal_json("3", "Gamma")]
        });
        Mock::given(method("POST"))
            .and(path("/v1/deals/search"))
            .and(body_partial_json(serde_json::json!({ "after": "cursor-1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(&page2))
            .mount(&server)
            .await;

        // Page 1 (no cursor) — mounted second so the cursor match wins
        let page1 = serde_json::json!({
            "results": [make_deal_json("1", "Alpha"), make_deal_json("2", "Beta")],
            "paging": { "next": { "after": "cursor-1" } }
        });
        Mock::given(method("POST"))
            .and(path("/v1/deals/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&page1))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let deals = client.search_deals(None).await.unwrap();
        assert_eq!(deals.len(), 3);
        assert_eq!(deals[2].name(), Some("Gamma"));
    }

    #[tokio::test]
    async fn search_deals_sends_since_filter() {
        let server = MockServer::start().await;
        let since = chrono::DateTime::parse_from_rfc3339("2026-03-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        Mock::given(method("POST"))
            .and(path("/v1/deals/search"))
            .and(body_partial_json(serde_json::json!({
                "filters": [
                    { "property": "pipeline", "operator": "eq", "value": "consulting" },
                    { "property": "lastmodified", "operator": "gte", "value": "2026-03-01T00:00:00+00:00" }
                ]
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "results": [] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let deals = client.search_deals(Some(since)).await.unwrap();
        assert!(deals.is_empty());
    }

    #[tokio::test]
    async fn fetch_company_propagates_errors() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/companies/42"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such company"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.fetch_company("42").await.unwrap_err();
        assert!(matches!(
            err,
            CrmClientError::HttpError {
                status: StatusCode::NOT_FOUND,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn fetch_owner_degrades_on_missing_scope() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/owners/9"))
            .respond_with(ResponseTemplate::new(403).set_body_string("missing scope"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let owner = client.fetch_owner("9").await.unwrap();
        assert!(owner.is_none());

        // Second call degrades the same way (warning only fires once)
        let owner = client.fetch_owner("9").await.unwrap();
        assert!(owner.is_none());
    }

    #[tokio::test]
    async fn fetch_owner_propagates_other_errors() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/owners/9"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.fetch_owner("9").await.unwrap_err();
        assert!(matches!(err, CrmClientError::HttpError { .. }));
    }

    #[tokio::test]
    async fn association_lookup_returns_first_id() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/deals/7/associations/companies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{ "id": "company-1" }, { "id": "company-2" }]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let id = client.associated_company_id("7").await.unwrap();
        assert_eq!(id.as_deref(), Some("company-1"));
    }

    #[tokio::test]
    async fn association_lookup_empty_is_none() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/deals/7/associations/owners"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "results": [] })),
            )
            .mount(&server)
            .await;

        let client = test_client(&server);
        let id = client.associated_owner_id("7").await.unwrap();
        assert!(id.is_none());
    }

    #[tokio::test]
    async fn retries_on_500() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/deals/search"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/deals/search"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "results": [make_deal_json("1", "Alpha")]
                })),
            )
            .mount(&server)
            .await;

        let client = test_client(&server);
        let deals = client.search_deals(None).await.unwrap();
        assert_eq!(deals.len(), 1);
    }

    #[tokio::test]
    async fn fails_fast_on_401() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/deals/search"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.search_deals(None).await.unwrap_err();
        match err {
            CrmClientError::HttpError { status, body } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(body, "unauthorized");
            }
            other => panic!("expected HttpError, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn max_retries_exceeded() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/deals/search"))
            .respond_with(ResponseTemplate::new(500).set_body_string("always failing"))
            .mount(&server)
            .await;

        let mut config = test_config();
        config.max_retries = 1;
        let client = CrmClient::new(config).unwrap().with_base_url(&server.uri());

        let err = client.search_deals(None).await.unwrap_err();
        assert!(matches!(err, CrmClientError::MaxRetriesExceeded { .. }));
    }

    #[tokio::test]
    async fn uses_bearer_auth() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/pipelines/deals"))
            .and(wiremock::matchers::header(
                "Authorization",
                "Bearer fake-token",
            ))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "results": [] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        client.list_pipelines().await.unwrap();
    }

    #[tokio::test]
    async fn list_pipelines_returns_stages() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/pipelines/deals"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{
                    "id": "consulting",
                    "label": "Consulting",
                    "stages": [
                        { "id": "qualification", "label": "Qualification" },
                        { "id": "execution", "label": "Execution" }
                    ]
                }]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let pipelines = client.list_pipelines().await.unwrap();
        assert_eq!(pipelines.len(), 1);
        assert_eq!(pipelines[0].stages.len(), 2);
        assert_eq!(pipelines[0].stages[1].id, "execution");
    }

    // ── Config tests ─────────────────────────────────────────────

    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn from_env_returns_none_when_no_crm_creds() {
        let _g = ENV_LOCK.lock().unwrap();
        std::env::remove_var("CRM_BASE_URL");
        std::env::remove_var("CRM_API_TOKEN");
        std::env::remove_var("CRM_PIPELINE_ID");
        let result = CrmClientConfig::from_env().unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn from_env_fails_when_creds_set_but_no_pipeline() {
        let _g = ENV_LOCK.lock().unwrap();
        std::env::set_var("CRM_BASE_URL", "https://crm.example.com");
        std::env::set_var("CRM_API_TOKEN", "tok");
        std::env::remove_var("CRM_PIPELINE_ID");
        let err = CrmClientConfig::from_env().unwrap_err();
        assert!(err.contains("CRM_PIPELINE_ID"), "got: {err}");
        std::env::remove_var("CRM_BASE_URL");
        std::env::remove_var("CRM_API_TOKEN");
    }

    #[test]
    fn from_env_rejects_blank_pipeline() {
        let _g = ENV_LOCK.lock().unwrap();
        std::env::set_var("CRM_BASE_URL", "https://crm.example.com");
        std::env::set_var("CRM_API_TOKEN", "tok");
        std::env::set_var("CRM_PIPELINE_ID", "   ");
        let result = CrmClientConfig::from_env();
        assert!(result.is_err());
        std::env::remove_var("CRM_BASE_URL");
        std::env::remove_var("CRM_API_TOKEN");
        std::env::remove_var("CRM_PIPELINE_ID");
    }

    #[test]
    fn from_env_succeeds_with_all_vars() {
        let _g = ENV_LOCK.lock().unwrap();
        std::env::set_var("CRM_BASE_URL", "https://crm.example.com");
        std::env::set_var("CRM_API_TOKEN", "tok");
        std::env::set_var("CRM_PIPELINE_ID", "consulting");
        std::env::set_var("CRM_MAX_RETRIES", "5");
        let cfg = CrmClientConfig::from_env().unwrap().unwrap();
        assert_eq!(cfg.pipeline_id, "consulting");
        assert_eq!(cfg.max_retries, 5);
        assert_eq!(cfg.timeout_secs, 30);
        std::env::remove_var("CRM_BASE_URL");
        std::env::remove_var("CRM_API_TOKEN");
        std::env::remove_var("CRM_PIPELINE_ID");
        std::env::remove_var("CRM_MAX_RETRIES");
    }
}
