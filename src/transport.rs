use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The underlying HTTP client could not be built.
    #[error("transport init failed: {0}")]
    Init(String),

    /// The request never produced an HTTP response.
    #[error("{0}")]
    Request(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    /// Decoded JSON body; `None` when the body was empty or not JSON.
    pub body: Option<Value>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(
        &self,
        url: &str,
        body: &Value,
        headers: &[(String, String)],
    ) -> Result<TransportResponse, TransportError>;
}

/// reqwest-backed transport. The client is built on first use and pooled
/// for every request after that.
pub struct HttpTransport {
    client: OnceCell<Client>,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            client: OnceCell::new(),
            request_timeout,
        }
    }

    async fn client(&self) -> Result<&Client, TransportError> {
        self.client
            .get_or_try_init(|| async {
                debug!("Building HTTP client (timeout {:?})", self.request_timeout);
                Client::builder()
                    .timeout(self.request_timeout)
                    .build()
                    .map_err(|e| TransportError::Init(e.to_string()))
            })
            .await
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(
        &self,
        url: &str,
        body: &Value,
        headers: &[(String, String)],
    ) -> Result<TransportResponse, TransportError> {
        let client = self.client().await?;

        let mut request = client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Request(format!("Failed to read response: {}", e)))?;

        Ok(TransportResponse {
            status,
            body: serde_json::from_slice(&bytes).ok(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_post_sends_body_and_headers() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/webhooks/claude"))
            .and(header("Authorization", "Bearer secret"))
            .and(body_json(json!({ "type": "session.get", "sessionId": "s-1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::new(Duration::from_secs(5));
        let url = format!("{}/api/webhooks/claude", mock_server.uri());
        let response = transport
            .post(
                &url,
                &json!({ "type": "session.get", "sessionId": "s-1" }),
                &[("Authorization".to_string(), "Bearer secret".to_string())],
            )
            .await
            .unwrap();

        assert!(response.is_success());
        assert_eq!(response.body, Some(json!({ "success": true })));
    }

    #[tokio::test]
    async fn test_non_json_body_is_none() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::new(Duration::from_secs(5));
        let response = transport
            .post(&mock_server.uri(), &json!({}), &[])
            .await
            .unwrap();

        assert_eq!(response.status, 502);
        assert!(!response.is_success());
        assert_eq!(response.body, None);
    }

    #[tokio::test]
    async fn test_slow_server_hits_request_timeout() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::new(Duration::from_millis(100));
        let result = transport.post(&mock_server.uri(), &json!({}), &[]).await;

        assert!(matches!(result, Err(TransportError::Request(_))));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_request_error() {
        let transport = HttpTransport::new(Duration::from_secs(1));
        let result = transport.post("http://127.0.0.1:1/hook", &json!({}), &[]).await;

        assert!(matches!(result, Err(TransportError::Request(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_callers_share_one_client() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
            .expect(8)
            .mount(&mock_server)
            .await;

        let transport = Arc::new(HttpTransport::new(Duration::from_secs(5)));
        let url = mock_server.uri();
        let handles = (0..8).map(|i| {
            let transport = transport.clone();
            let url = url.clone();
            tokio::spawn(async move {
                let body = json!({ "type": "session.get", "sessionId": format!("s-{}", i) });
                let response = transport.post(&url, &body, &[]).await?;
                let client = transport.client().await?;
                Ok::<_, TransportError>((response, client as *const Client as usize))
            })
        });
        let results = join_all(handles).await;

        let mut addresses = Vec::new();
        for result in results {
            let (response, address) = result.unwrap().unwrap();
            assert!(response.is_success());
            addresses.push(address);
        }
        assert!(addresses.windows(2).all(|pair| pair[0] == pair[1]));
    }
}
