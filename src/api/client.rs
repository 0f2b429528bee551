//! Thin JSON-over-HTTP client for the clinic backend.

use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::error::ApiError;

/// Reachability probes give up quickly so offline use stays snappy.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared HTTP plumbing: base URL, timeout, bearer auth and status mapping.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Joins `path` onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// True if `GET /health` answers with a success status.
    pub async fn check_health(&self) -> bool {
        match self
            .http
            .get(self.url("health"))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("Health check failed: {}", e);
                false
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> Result<T, ApiError> {
        let request = self.request(Method::GET, path, token);
        decode(send(request).await?).await
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
        body: &B,
    ) -> Result<T, ApiError> {
        let request = self.request(Method::POST, path, token).json(body);
        decode(send(request).await?).await
    }

    pub async fn put_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
        body: &B,
    ) -> Result<T, ApiError> {
        let request = self.request(Method::PUT, path, token).json(body);
        decode(send(request).await?).await
    }

    /// Issues a DELETE; any success status counts, the body is ignored.
    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<(), ApiError> {
        let request = self.request(Method::DELETE, path, token);
        send(request).await.map(|_| ())
    }

    fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let url = self.url(path);
        tracing::debug!("{} {}", method, url);
        let request = self.http.request(method, url);
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Sends the request and turns non-success statuses into errors.
async fn send(request: RequestBuilder) -> Result<Response, ApiError> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ApiError::from_status(status.as_u16(), &body))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let client = ApiClient::new("http://localhost:8000/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000/api");
        assert_eq!(
            client.url("/patients/"),
            "http://localhost:8000/api/patients/"
        );
        assert_eq!(
            client.url("patients/501/"),
            "http://localhost:8000/api/patients/501/"
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unhealthy() {
        // Port 9 (discard) is never served in test environments
        let client = ApiClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        assert!(!client.check_health().await);
    }

    #[tokio::test]
    async fn test_transport_failure_is_network_error() {
        let client = ApiClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let err = client
            .get_json::<serde_json::Value>("patients/", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Network(_)), "got {:?}", err);
    }
}
