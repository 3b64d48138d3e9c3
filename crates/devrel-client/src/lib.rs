//! # DevRel Client
//! Thin reqwest client for the DevRel API, used by plugin runtimes and
//! scripts. Requests go through [`fetch_with_retry`].

pub mod retry;

pub use retry::{fetch_with_retry, RetryPolicy};

use devrel_core::error::{DevRelError, Result};
use devrel_core::types::Page;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of an event ingest call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub accepted: usize,
    pub event_ids: Vec<String>,
    pub duplicates: Vec<String>,
}

/// One event as a plugin runtime delivers it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEvent {
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub payload: Value,
}

pub struct DevRelClient {
    base_url: String,
    token: Option<String>,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl DevRelClient {
    /// Client with a cookie store, so `login` keeps the session.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| DevRelError::Http(format!("Build client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            retry: RetryPolicy::default(),
            client,
        })
    }

    /// Authenticate every request with an API token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.client.request(method, format!("{}{path}", self.base_url));
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        let resp = fetch_with_retry(req, &self.retry).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(api_error(status, resp).await);
        }
        resp.json()
            .await
            .map_err(|e| DevRelError::Http(format!("Decode response: {e}")))
    }

    pub async fn health(&self) -> Result<Value> {
        self.send(self.request(Method::GET, "/api/health")).await
    }

    /// Sign in; the session cookie is kept for later calls.
    pub async fn login(&self, email: &str, password: &str) -> Result<Value> {
        let body = serde_json::json!({ "email": email, "password": password });
        let resp: Value = self.send(self.request(Method::POST, "/api/auth/login").json(&body)).await?;
        Ok(resp["user"].clone())
    }

    pub async fn list_campaigns(&self, page: u32, limit: u32) -> Result<Page<Value>> {
        let req = self
            .request(Method::GET, "/api/campaigns")
            .query(&[("page", page), ("limit", limit)]);
        self.send(req).await
    }

    pub async fn create_campaign(&self, campaign: &Value) -> Result<Value> {
        self.send(self.request(Method::POST, "/api/campaigns").json(campaign)).await
    }

    pub async fn ingest_events(&self, plugin_id: &str, events: &[OutboundEvent]) -> Result<IngestSummary> {
        let req = self
            .request(Method::POST, &format!("/api/plugins/{plugin_id}/events"))
            .json(&serde_json::json!({ "events": events }));
        let summary: IngestSummary = self.send(req).await?;
        tracing::debug!(
            "Ingested {} event(s) into {}, {} duplicate(s)",
            summary.accepted,
            plugin_id,
            summary.duplicates.len()
        );
        Ok(summary)
    }

    /// Report the outcome of processing one event.
    pub async fn report_event(&self, plugin_id: &str, event_id: &str, error: Option<&str>) -> Result<Value> {
        let body = match error {
            Some(e) => serde_json::json!({ "status": "failed", "error": e }),
            None => serde_json::json!({ "status": "processed" }),
        };
        let path = format!("/api/plugins/{plugin_id}/events/{event_id}/result");
        self.send(self.request(Method::POST, &path).json(&body)).await
    }

    pub async fn update_run(&self, plugin_id: &str, run_id: &str, update: &Value) -> Result<Value> {
        let path = format!("/api/plugins/{plugin_id}/runs/{run_id}");
        self.send(self.request(Method::PATCH, &path).json(update)).await
    }
}

/// Map an `{error, code}` response onto the shared error type.
async fn api_error(status: StatusCode, resp: Response) -> DevRelError {
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|v| v["error"].as_str().map(String::from))
        .unwrap_or(text);
    match status {
        StatusCode::BAD_REQUEST => DevRelError::Validation(message),
        StatusCode::UNAUTHORIZED => DevRelError::Unauthorized(message),
        StatusCode::FORBIDDEN => DevRelError::Forbidden(message),
        StatusCode::NOT_FOUND => DevRelError::NotFound(message),
        StatusCode::CONFLICT => DevRelError::Conflict(message),
        _ => DevRelError::Http(format!("{status}: {message}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devrel_core::DevRelConfig;
    use devrel_gateway::{build_router, AppState};
    use devrel_platform::PlatformDb;

    const PASSWORD: &str = "correct-horse-battery";

    async fn serve_gateway() -> String {
        let db = PlatformDb::open_in_memory().unwrap();
        db.bootstrap_tenant("Acme", "acme", "owner@acme.dev", PASSWORD).unwrap();
        let mut config = DevRelConfig::default();
        config.auth.jwt_secret = "client-test-secret-0123456789abcdef".into();
        let router = build_router(AppState::new(db, config));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_session_roundtrip() {
        let base = serve_gateway().await;
        let client = DevRelClient::new(&base).unwrap();

        let err = client.list_campaigns(1, 10).await.unwrap_err();
        assert!(matches!(err, DevRelError::Unauthorized(_)));

        let user = client.login("owner@acme.dev", PASSWORD).await.unwrap();
        assert_eq!(user["role"], "owner");

        client
            .create_campaign(&serde_json::json!({"name": "Launch week", "budget": 100}))
            .await
            .unwrap();
        let page = client.list_campaigns(1, 10).await.unwrap();
        assert_eq!(page.pagination.total, 1);
        assert_eq!(page.items[0]["name"], "Launch week");

        let err = client.create_campaign(&serde_json::json!({"name": ""})).await.unwrap_err();
        assert!(matches!(err, DevRelError::Validation(_)));
    }

    #[tokio::test]
    async fn test_plugin_runtime_flow() {
        let base = serve_gateway().await;
        let session = DevRelClient::new(&base).unwrap();
        session.login("owner@acme.dev", PASSWORD).await.unwrap();
        let plugin: Value = session
            .send(
                session
                    .request(Method::POST, "/api/plugins")
                    .json(&serde_json::json!({"key": "discord", "name": "Discord"})),
            )
            .await
            .unwrap();
        let plugin_id = plugin["id"].as_str().unwrap();
        let created: Value = session
            .send(
                session
                    .request(Method::POST, "/api/tokens")
                    .json(&serde_json::json!({"name": "runtime", "scopes": ["ingest"]})),
            )
            .await
            .unwrap();

        let runtime = DevRelClient::new(&base)
            .unwrap()
            .with_token(created["token"].as_str().unwrap());
        let events = vec![
            OutboundEvent {
                event_type: "member_joined".into(),
                external_id: Some("m-1".into()),
                payload: serde_json::json!({"user": "ada"}),
            },
            OutboundEvent {
                event_type: "member_joined".into(),
                external_id: Some("m-1".into()),
                payload: serde_json::json!({"user": "ada"}),
            },
        ];
        let summary = runtime.ingest_events(plugin_id, &events).await.unwrap();
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.duplicates, vec!["m-1".to_string()]);

        // ingest-only tokens cannot report results
        let err = runtime
            .report_event(plugin_id, &summary.event_ids[0], None)
            .await
            .unwrap_err();
        assert!(matches!(err, DevRelError::Forbidden(_)));

        let processed = session
            .report_event(plugin_id, &summary.event_ids[0], Some("bad payload"))
            .await
            .unwrap();
        assert_eq!(processed["status"], "failed");
    }
}
