//! HTTP client for the CMS collection API
//!
//! A single pooled `reqwest::Client` with keep-alive is shared by every call
//! of a run. Retries, concurrency limiting and dry-run interception live in
//! [`ResilientStore`](super::resilience::ResilientStore), which wraps this
//! client.

use async_trait::async_trait;
use log::debug;
use reqwest::{Method, StatusCode, Url};
use serde_json::{Value, json};
use std::time::Duration;

use super::error::TransportError;
use super::models::{MutationResult, Page, RemoteId};
use super::query::ListQuery;
use super::store::RemoteStore;

/// Longest error body kept in a `TransportError::Status` message
const MAX_ERROR_BODY: usize = 300;

#[derive(Debug, Clone)]
pub struct CmsClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl CmsClient {
    pub fn new(
        base_url: Url,
        token: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(TransportError::from_reqwest)?;

        Ok(Self {
            http,
            base_url,
            token: token.into(),
        })
    }

    /// `{base}/{collection}[/{id}]`, tolerant of a trailing slash on the base
    fn endpoint(&self, collection: &str, id: Option<&RemoteId>) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        let collection = collection.trim_matches('/');
        match id {
            Some(id) => format!("{}/{}/{}", base, collection, id),
            None => format!("{}/{}", base, collection),
        }
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        params: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        debug!("{} {}", method, url);

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(&self.token)
            .query(params);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(TransportError::from_reqwest)?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: error_message(status, &text),
            });
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        response
            .json::<Value>()
            .await
            .map_err(TransportError::from_reqwest)
    }
}

/// Prefer the API's own `error.message`, fall back to a truncated body
fn error_message(status: StatusCode, body: &str) -> String {
    let api_message = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        v.get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
    });

    match api_message {
        Some(message) => message,
        None if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
        None => body.chars().take(MAX_ERROR_BODY).collect(),
    }
}

/// Extract `data.id` from a mutation response
fn mutated_id(body: &Value) -> Result<RemoteId, TransportError> {
    let id = body
        .get("data")
        .and_then(|data| data.get("id"))
        .ok_or_else(|| TransportError::Decode("response is missing 'data.id'".to_string()))?;
    RemoteId::from_json(id)
}

#[async_trait]
impl RemoteStore for CmsClient {
    async fn list(&self, collection: &str, query: &ListQuery) -> Result<Page, TransportError> {
        let url = self.endpoint(collection, None);
        let body = self.send(Method::GET, &url, &query.to_params(), None).await?;
        Page::from_json(&body)
    }

    async fn create(
        &self,
        collection: &str,
        fields: &Value,
    ) -> Result<MutationResult, TransportError> {
        let url = self.endpoint(collection, None);
        let payload = json!({ "data": fields });
        let body = self.send(Method::POST, &url, &[], Some(&payload)).await?;
        Ok(MutationResult::Applied(mutated_id(&body)?))
    }

    async fn update(
        &self,
        collection: &str,
        id: &RemoteId,
        fields: &Value,
    ) -> Result<MutationResult, TransportError> {
        let url = self.endpoint(collection, Some(id));
        let payload = json!({ "data": fields });
        let body = self.send(Method::PUT, &url, &[], Some(&payload)).await?;
        // Some deployments answer PUT with 204; the id is already known
        match mutated_id(&body) {
            Ok(updated) => Ok(MutationResult::Applied(updated)),
            Err(_) => Ok(MutationResult::Applied(id.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> CmsClient {
        CmsClient::new(Url::parse(base).unwrap(), "token", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_endpoint_building() {
        let client = client("https://cms.example.com/api/");

        assert_eq!(
            client.endpoint("products", None),
            "https://cms.example.com/api/products"
        );
        assert_eq!(
            client.endpoint("/products/", Some(&RemoteId::from(42))),
            "https://cms.example.com/api/products/42"
        );
    }

    #[test]
    fn test_error_message_prefers_api_message() {
        let body = r#"{"error": {"status": 400, "message": "name must be unique"}}"#;
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, body),
            "name must be unique"
        );
    }

    #[test]
    fn test_error_message_falls_back_to_reason() {
        assert_eq!(
            error_message(StatusCode::SERVICE_UNAVAILABLE, ""),
            "Service Unavailable"
        );
        let long = "x".repeat(1000);
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, &long).len(),
            MAX_ERROR_BODY
        );
    }

    #[test]
    fn test_mutated_id() {
        let body = serde_json::json!({"data": {"id": 9, "attributes": {}}});
        assert_eq!(mutated_id(&body).unwrap(), RemoteId::from(9));
        assert!(mutated_id(&serde_json::json!({})).is_err());
    }
}
