//! HTTP client for the ledgerbox sync endpoints.

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use std::sync::RwLock;
use std::time::Duration;

use ledgerbox_core::sync::{BatchRequest, BatchResult, ChangeFeed, SyncItem};

use crate::error::{DeviceSyncError, Result};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;

/// `{ success: false, error }` body returned by the server on failure.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: String,
}

/// Transport used by the reconciler to reach the server.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn push_batch(&self, items: Vec<SyncItem>) -> Result<BatchResult>;

    async fn pull_changes(&self, since: Option<String>, limit: Option<i64>) -> Result<ChangeFeed>;
}

#[derive(Debug, Clone)]
pub struct SyncApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl SyncApiClient {
    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("API response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("API response error ({}): {}", status, preview);
    }

    /// Create a new sync client.
    ///
    /// * `base_url` - server origin, e.g. `https://sync.example.com`
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn headers(&self, token: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| DeviceSyncError::auth("Invalid access token format"))?;
        headers.insert(AUTHORIZATION, auth_value);
        Ok(headers)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(&body) {
                return Err(DeviceSyncError::api(status.as_u16(), error.error));
            }
            return Err(DeviceSyncError::api(
                status.as_u16(),
                format!("Request failed: {}", body),
            ));
        }

        serde_json::from_str(&body).map_err(|e| {
            log::error!("Failed to deserialize response. Body: {}, Error: {}", body, e);
            DeviceSyncError::api(status.as_u16(), format!("Failed to parse response: {}", e))
        })
    }

    /// Push a batch of local changes.
    ///
    /// POST /api/sync/batch
    pub async fn push_batch(&self, token: &str, items: Vec<SyncItem>) -> Result<BatchResult> {
        if items.is_empty() {
            return Err(DeviceSyncError::invalid_request("Batch must contain items"));
        }
        let url = format!("{}/api/sync/batch", self.base_url);
        let response = self
            .client
            .post(&url)
            .headers(self.headers(token)?)
            .json(&BatchRequest { items })
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// Fetch records changed after a cursor, tombstones included.
    ///
    /// GET /api/sync/changes?since={cursor}&limit={n}
    pub async fn pull_changes(
        &self,
        token: &str,
        since: Option<&str>,
        limit: Option<i64>,
    ) -> Result<ChangeFeed> {
        let url = format!("{}/api/sync/changes", self.base_url);
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(value) = since {
            query.push(("since", value.to_string()));
        }
        if let Some(value) = limit {
            query.push(("limit", value.to_string()));
        }

        let mut request = self.client.get(&url).headers(self.headers(token)?);
        if !query.is_empty() {
            request = request.query(&query);
        }
        let response = request.send().await?;
        Self::parse_response(response).await
    }
}

/// [`SyncTransport`] that authenticates with the current session token.
pub struct BearerTransport {
    client: SyncApiClient,
    token: RwLock<Option<String>>,
}

impl BearerTransport {
    pub fn new(client: SyncApiClient, token: Option<String>) -> Self {
        Self {
            client,
            token: RwLock::new(token),
        }
    }

    /// Swaps the session token, e.g. after sign-in or sign-out.
    pub fn set_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = token;
        }
    }

    fn current_token(&self) -> Result<String> {
        self.token
            .read()
            .ok()
            .and_then(|guard| guard.clone())
            .ok_or_else(|| DeviceSyncError::auth("No session token"))
    }
}

#[async_trait]
impl SyncTransport for BearerTransport {
    async fn push_batch(&self, items: Vec<SyncItem>) -> Result<BatchResult> {
        let token = self.current_token()?;
        self.client.push_batch(&token, items).await
    }

    async fn pull_changes(&self, since: Option<String>, limit: Option<i64>) -> Result<ChangeFeed> {
        let token = self.current_token()?;
        self.client
            .pull_changes(&token, since.as_deref(), limit)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiRetryClass;
    use ledgerbox_core::sync::SyncEntity;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::Mutex as TokioMutex;

    #[derive(Debug, Clone)]
    struct CapturedRequest {
        request_line: String,
        authorization: Option<String>,
        body: String,
    }

    fn header_end_offset(buffer: &[u8]) -> Option<usize> {
        buffer.windows(4).position(|window| window == b"\r\n\r\n")
    }

    async fn read_http_request(stream: &mut tokio::net::TcpStream) -> Option<CapturedRequest> {
        let mut buffer = Vec::new();
        loop {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                return None;
            }
            buffer.extend_from_slice(&chunk[..read]);
            if header_end_offset(&buffer).is_some() {
                break;
            }
        }

        let header_end = header_end_offset(&buffer)?;
        let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
        let mut lines = head.lines();
        let request_line = lines.next()?.to_string();

        let mut headers = HashMap::new();
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        let content_length = headers
            .get("content-length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);

        let mut body = buffer[header_end + 4..].to_vec();
        while body.len() < content_length {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..read]);
        }

        Some(CapturedRequest {
            request_line,
            authorization: headers.get("authorization").cloned(),
            body: String::from_utf8_lossy(&body).to_string(),
        })
    }

    async fn write_http_response(
        stream: &mut tokio::net::TcpStream,
        status: u16,
        body: &str,
    ) -> std::io::Result<()> {
        let response = format!(
            "HTTP/1.1 {} Status\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await
    }

    async fn start_mock_server(
        responses: Vec<(u16, String)>,
    ) -> (String, Arc<TokioMutex<Vec<CapturedRequest>>>) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let captured = Arc::new(TokioMutex::new(Vec::new()));
        let scripted = Arc::new(TokioMutex::new(VecDeque::from(responses)));
        let captured_clone = Arc::clone(&captured);

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let captured_inner = Arc::clone(&captured_clone);
                let scripted_inner = Arc::clone(&scripted);
                tokio::spawn(async move {
                    let Some(request) = read_http_request(&mut stream).await else {
                        return;
                    };
                    captured_inner.lock().await.push(request);
                    let (status, body) = scripted_inner
                        .lock()
                        .await
                        .pop_front()
                        .unwrap_or((500, r#"{"success":false,"error":"unexpected"}"#.into()));
                    let _ = write_http_response(&mut stream, status, &body).await;
                });
            }
        });

        (format!("http://{}", addr), captured)
    }

    #[tokio::test]
    async fn push_batch_sends_bearer_and_items() {
        let (base_url, captured) = start_mock_server(vec![(
            200,
            r#"{"success":1,"failed":0,"total":1,"errors":[]}"#.to_string(),
        )])
        .await;
        let client = SyncApiClient::new(&base_url).expect("client");

        let result = client
            .push_batch(
                "tok",
                vec![SyncItem::delete(SyncEntity::Receipt, "r1")],
            )
            .await
            .expect("push");
        assert_eq!(result.success, 1);

        let requests = captured.lock().await;
        assert!(requests[0].request_line.starts_with("POST /api/sync/batch"));
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer tok"));
        let body: serde_json::Value = serde_json::from_str(&requests[0].body).expect("json body");
        assert_eq!(body["items"][0]["entityType"], "receipt");
        assert_eq!(body["items"][0]["operation"], "delete");
    }

    #[tokio::test]
    async fn error_body_message_is_surfaced() {
        let (base_url, _captured) = start_mock_server(vec![(
            401,
            r#"{"success":false,"error":"Unauthorized"}"#.to_string(),
        )])
        .await;
        let client = SyncApiClient::new(&base_url).expect("client");

        let err = client
            .push_batch("tok", vec![SyncItem::delete(SyncEntity::Device, "d1")])
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(401));
        assert_eq!(err.retry_class(), ApiRetryClass::ReauthRequired);
        assert!(err.to_string().contains("Unauthorized"));
    }

    #[tokio::test]
    async fn pull_changes_passes_cursor() {
        let (base_url, captured) = start_mock_server(vec![(
            200,
            r#"{"changes":[],"cursor":"2026-01-01T00:00:00.000Z"}"#.to_string(),
        )])
        .await;
        let transport = BearerTransport::new(
            SyncApiClient::new(&base_url).expect("client"),
            Some("tok".to_string()),
        );

        let feed = transport
            .pull_changes(Some("2026-01-01T00:00:00.000Z".to_string()), Some(50))
            .await
            .expect("pull");
        assert!(feed.changes.is_empty());

        let requests = captured.lock().await;
        assert!(requests[0].request_line.starts_with("GET /api/sync/changes?since="));
        assert!(requests[0].request_line.contains("limit=50"));
    }

    #[tokio::test]
    async fn transport_without_token_requires_reauth() {
        let transport = BearerTransport::new(
            SyncApiClient::new("http://127.0.0.1:9").expect("client"),
            None,
        );
        let err = transport.pull_changes(None, None).await.unwrap_err();
        assert_eq!(err.retry_class(), ApiRetryClass::ReauthRequired);
    }
}
