/// Answering backend: the remote service that turns a question or an image URL into text
use crate::error::{AskError, RemoteError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;
use tracing::debug;

#[async_trait]
pub trait AnswerBackend: Send + Sync {
    /// Answer a free-text question. An empty string means "no answer".
    async fn answer_text(&self, text: &str) -> std::result::Result<String, RemoteError>;

    /// Describe the image behind `url`
    async fn answer_image(&self, url: &str) -> std::result::Result<String, RemoteError>;
}

/// Body returned by the answering proxy, on success or failure
#[derive(Debug, Default, Deserialize)]
struct ProxyReply {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// JSON-over-HTTP client for the local answering proxy.
///
/// `POST {base}/ask {"text"}` and `POST {base}/ask-image {"url"}`; both reply
/// `{"answer"}` or `{"error"}`. Timeouts are applied by the caller.
pub struct HttpBackend {
    client: Client<HttpConnector, Full<Bytes>>,
    text_url: Uri,
    image_url: Uri,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = base_url.trim_end_matches('/');
        let text_url = parse_uri(&format!("{}/ask", base))?;
        let image_url = parse_uri(&format!("{}/ask-image", base))?;
        let client = Client::builder(TokioExecutor::new()).build_http();

        Ok(Self {
            client,
            text_url,
            image_url,
        })
    }

    async fn post_json(
        &self,
        uri: &Uri,
        body: serde_json::Value,
    ) -> std::result::Result<String, RemoteError> {
        let payload = serde_json::to_vec(&body)
            .map_err(|e| RemoteError::new(format!("Failed to encode request: {}", e)))?;
        let req = Request::post(uri.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(payload)))
            .map_err(|e| RemoteError::new(format!("Invalid request: {}", e)))?;

        debug!("POST {}", uri);
        let resp = self
            .client
            .request(req)
            .await
            .map_err(|e| RemoteError::new(format!("Network error: {}", e)))?;

        let status = resp.status().as_u16();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| {
                RemoteError::with_status(format!("Failed to read response: {}", e), status)
            })?
            .to_bytes();

        parse_reply(status, &body)
    }
}

#[async_trait]
impl AnswerBackend for HttpBackend {
    async fn answer_text(&self, text: &str) -> std::result::Result<String, RemoteError> {
        self.post_json(&self.text_url, serde_json::json!({ "text": text }))
            .await
    }

    async fn answer_image(&self, url: &str) -> std::result::Result<String, RemoteError> {
        self.post_json(&self.image_url, serde_json::json!({ "url": url }))
            .await
    }
}

fn parse_uri(s: &str) -> Result<Uri> {
    s.parse::<Uri>()
        .map_err(|e| AskError::Config(format!("Invalid backend URL {}: {}", s, e)))
}

/// Normalize a proxy reply into an answer or a single error message
fn parse_reply(status: u16, body: &[u8]) -> std::result::Result<String, RemoteError> {
    let parsed = serde_json::from_slice::<ProxyReply>(body).ok();

    if !(200..300).contains(&status) {
        let message = parsed
            .and_then(|r| r.error)
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| format!("Request failed ({})", status));
        return Err(RemoteError::with_status(message, status));
    }

    let reply = parsed.ok_or_else(|| {
        RemoteError::with_status("Malformed response from answering service", status)
    })?;
    Ok(reply.answer.unwrap_or_default())
}
