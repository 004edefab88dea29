//! REST requester using `reqwest`.

use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Method, Params, RequestError, Requester};

/// Configuration for [`HttpRequester`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Base URL every request path is appended to.
    pub base_url: String,

    /// Per-request timeout, covering connect and body download.
    pub timeout: Duration,

    /// Header that carries the session token in both directions.
    ///
    /// The server sets it on responses that establish or refresh a
    /// session; the requester echoes the latest value on every request.
    pub session_header: String,

    /// Value of the `User-Agent` header.
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "https://mixer.com/api/v1".to_string(),
            timeout: Duration::from_secs(10),
            session_header: "x-session-token".to_string(),
            user_agent: concat!("mixer-rs/", env!("CARGO_PKG_VERSION"))
                .to_string(),
        }
    }
}

/// A [`Requester`] backed by a shared `reqwest::Client`.
///
/// `GET` parameters go into the query string, every other verb sends
/// them as a JSON body. Retries and pooling policy are left to
/// `reqwest`'s defaults.
pub struct HttpRequester {
    client: reqwest::Client,
    config: HttpConfig,
    token: Mutex<Option<String>>,
}

impl HttpRequester {
    /// Builds a requester from the given config.
    pub fn new(config: HttpConfig) -> Result<Self, RequestError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| RequestError::Network(e.to_string()))?;
        tracing::debug!(base_url = %config.base_url, "HTTP requester ready");
        Ok(Self {
            client,
            config,
            token: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

impl Requester for HttpRequester {
    async fn request(
        &self,
        method: Method,
        path: &str,
        params: &Params,
    ) -> Result<Value, RequestError> {
        let mut builder = self.client.request(to_reqwest(method), self.url(path));

        if method == Method::Get {
            builder = builder.query(&query_pairs(params));
        } else if !params.is_empty() {
            builder = builder.json(params);
        }
        if let Some(token) = self.session_token() {
            builder = builder.header(self.config.session_header.as_str(), token);
        }

        tracing::trace!(%method, path, "sending request");
        let response = builder
            .send()
            .await
            .map_err(|e| RequestError::Network(e.to_string()))?;

        let status = response.status();
        let refreshed = response
            .headers()
            .get(self.config.session_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        if refreshed.is_some() {
            self.set_session_token(refreshed);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RequestError::Network(e.to_string()))?;

        if status.is_success() {
            if bytes.is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_slice(&bytes)
                .map_err(|e| RequestError::InvalidBody(e.to_string()))
        } else {
            tracing::debug!(%method, path, status = status.as_u16(), "request rejected");
            Err(RequestError::Http {
                status: status.as_u16(),
                body: serde_json::from_slice(&bytes).unwrap_or(Value::Null),
            })
        }
    }

    fn session_token(&self) -> Option<String> {
        self.token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_session_token(&self, token: Option<String>) {
        *self
            .token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = token;
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

/// Flattens JSON params into query pairs. Strings go in bare, everything
/// else as its JSON literal.
fn query_pairs(params: &Params) -> Vec<(String, String)> {
    params
        .iter()
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}
