//! Request Relay
//!
//! Replays a forwarded request to its origin and hands the response back.
//! One upstream call per request, bounded timeout, no retry - a transport
//! failure surfaces as a synthesized 502, a non-2xx upstream status is a
//! perfectly valid answer.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Marker appended when a relayed body exceeds the configured cap.
pub const TRUNCATION_MARKER: &str = "\n...[truncated]";

/// Headers that manage the client<->proxy connection and must not be
/// replayed upstream or echoed back. `host` and `content-length` are
/// recomputed by the HTTP client for the outbound call.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "proxy-connection",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
    "te",
    "trailer",
    "host",
    "content-length",
];

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("unsupported method: {0}")]
    InvalidMethod(String),

    #[error("invalid target url: {0}")]
    InvalidUrl(String),

    #[error("upstream timed out")]
    Timeout,

    #[error("upstream transport failure: {0}")]
    Transport(String),
}

/// Outbound request description, already decoupled from the inbound
/// connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
}

/// Origin response relayed back to the caller. The body stays raw bytes:
/// compressed or binary payloads must reach the client exactly as the
/// origin sent them.
#[derive(Debug, Clone)]
pub struct RelayResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl RelayResponse {
    /// Lossy text rendering of the body, for JSON-facing callers that
    /// want a preview rather than the raw bytes.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Seam between the pipeline and the network, so tests can assert a
/// blocked request never reaches the origin.
#[async_trait]
pub trait Relay: Send + Sync {
    async fn forward(&self, request: ForwardRequest) -> Result<RelayResponse, RelayError>;
}

/// Strip connection-management headers, keep everything else.
pub fn filter_headers(headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| !HOP_BY_HOP.contains(&name.to_ascii_lowercase().as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Cap an overlong body, appending the truncation marker. Valid UTF-8
/// bodies are measured and cut in characters; anything else is cut at a
/// byte boundary so binary payloads under the cap pass through untouched.
pub fn truncate_body(body: Bytes, cap: usize) -> Bytes {
    match std::str::from_utf8(&body) {
        Ok(text) => {
            if text.chars().count() <= cap {
                return body;
            }
            let mut truncated: String = text.chars().take(cap).collect();
            truncated.push_str(TRUNCATION_MARKER);
            Bytes::from(truncated)
        }
        Err(_) => {
            if body.len() <= cap {
                return body;
            }
            let mut truncated = body.slice(..cap).to_vec();
            truncated.extend_from_slice(TRUNCATION_MARKER.as_bytes());
            Bytes::from(truncated)
        }
    }
}

/// reqwest-backed relay with a client-level timeout.
pub struct HttpRelay {
    client: reqwest::Client,
    body_cap: usize,
}

impl HttpRelay {
    pub fn new(timeout_secs: u64, body_cap: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("failed to build relay HTTP client");
        Self { client, body_cap }
    }
}

#[async_trait]
impl Relay for HttpRelay {
    async fn forward(&self, request: ForwardRequest) -> Result<RelayResponse, RelayError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| RelayError::InvalidMethod(request.method.clone()))?;
        let url = reqwest::Url::parse(&request.url)
            .map_err(|_| RelayError::InvalidUrl(request.url.clone()))?;

        let mut outbound = self.client.request(method, url);
        for (name, value) in filter_headers(&request.headers) {
            outbound = outbound.header(name, value);
        }
        if !request.body.is_empty() {
            outbound = outbound.body(request.body);
        }

        let response = outbound.send().await.map_err(|e| {
            if e.is_timeout() {
                RelayError::Timeout
            } else {
                RelayError::Transport(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let mut headers = BTreeMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_string(), value.to_string());
            }
        }
        let headers = filter_headers(&headers);

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                RelayError::Timeout
            } else {
                RelayError::Transport(e.to_string())
            }
        })?;

        Ok(RelayResponse {
            status,
            headers,
            body: truncate_body(body, self.body_cap),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_strips_hop_by_hop_headers() {
        let mut headers = BTreeMap::new();
        headers.insert("Connection".to_string(), "keep-alive".to_string());
        headers.insert("Host".to_string(), "example.com".to_string());
        headers.insert("Transfer-Encoding".to_string(), "chunked".to_string());
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("X-Custom".to_string(), "1".to_string());

        let filtered = filter_headers(&headers);
        assert_eq!(filtered.len(), 2);
        assert!(filtered.contains_key("Content-Type"));
        assert!(filtered.contains_key("X-Custom"));
    }

    #[test]
    fn truncation_only_past_cap() {
        assert_eq!(truncate_body(Bytes::from("short"), 10), "short");
        assert_eq!(truncate_body(Bytes::from("exact"), 5), "exact");

        let long = Bytes::from("x".repeat(25));
        let truncated = truncate_body(long, 20);
        let text = std::str::from_utf8(&truncated).unwrap();
        assert!(text.starts_with(&"x".repeat(20)));
        assert!(text.ends_with(TRUNCATION_MARKER));
        assert_eq!(text.chars().count(), 20 + TRUNCATION_MARKER.chars().count());
    }

    #[test]
    fn binary_body_under_cap_is_untouched() {
        let blob = Bytes::from_static(&[0x1f, 0x8b, 0x08, 0x00, 0xff, 0xfe]);
        assert_eq!(truncate_body(blob.clone(), 20_000), blob);
    }

    #[test]
    fn binary_body_past_cap_is_cut_at_a_byte_boundary() {
        let blob = Bytes::from(vec![0xffu8; 30]);
        let truncated = truncate_body(blob, 20);
        assert_eq!(&truncated[..20], &[0xffu8; 20][..]);
        assert!(truncated.ends_with(TRUNCATION_MARKER.as_bytes()));
    }

    #[tokio::test]
    async fn compressed_origin_body_relays_byte_for_byte() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // A gzip header prefix: not valid UTF-8, must come back unchanged.
        const BLOB: &[u8] = &[0x1f, 0x8b, 0x08, 0x00, 0xff, 0xfe];

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let origin = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await.unwrap();
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                BLOB.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(BLOB).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        let relay = HttpRelay::new(5, 20_000);
        let response = relay
            .forward(ForwardRequest {
                method: "GET".to_string(),
                url: format!("http://{}/blob.gz", addr),
                headers: BTreeMap::new(),
                body: String::new(),
            })
            .await
            .unwrap();
        origin.await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(
            response.headers.get("content-encoding").map(String::as_str),
            Some("gzip")
        );
        assert_eq!(response.body.as_ref(), BLOB);
    }

    #[tokio::test]
    async fn invalid_url_is_a_relay_error() {
        let relay = HttpRelay::new(1, 20_000);
        let err = relay
            .forward(ForwardRequest {
                method: "GET".to_string(),
                url: "/relative/path".to_string(),
                headers: BTreeMap::new(),
                body: String::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn invalid_method_is_a_relay_error() {
        let relay = HttpRelay::new(1, 20_000);
        let err = relay
            .forward(ForwardRequest {
                method: "GE T".to_string(),
                url: "http://example.com/".to_string(),
                headers: BTreeMap::new(),
                body: String::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidMethod(_)));
    }
}
