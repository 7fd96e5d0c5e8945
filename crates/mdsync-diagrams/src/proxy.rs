//! HTTP client for the external `PlantUML` server.

use std::time::Duration;

use ureq::Agent;

/// Proxy request failure.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("I/O error: {0}")]
    Io(String),
}

/// Response relayed from the `PlantUML` server.
#[derive(Debug)]
pub struct ProxyResponse {
    /// Upstream status code, passed through unchanged.
    pub status: u16,
    /// Upstream `Content-Type`, if any.
    pub content_type: Option<String>,
    /// Response body.
    pub body: Vec<u8>,
}

/// Create HTTP agent with the specified timeout.
fn create_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

/// Fetches rendered diagrams from a `PlantUML` server.
///
/// Requests are blocking; async callers should run them on a blocking thread.
#[derive(Debug, Clone)]
pub struct PlantUmlProxy {
    agent: Agent,
    server_url: String,
}

impl PlantUmlProxy {
    /// Create a proxy for `server_url` (e.g. `http://plantuml:8080`).
    #[must_use]
    pub fn new(server_url: impl Into<String>, timeout: Duration) -> Self {
        let server_url: String = server_url.into();
        Self {
            agent: create_agent(timeout),
            server_url: server_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Upstream URL for a proxied path such as `png/~h4142`.
    #[must_use]
    pub fn upstream_url(&self, path: &str) -> String {
        format!("{}/{}", self.server_url, path.trim_start_matches('/'))
    }

    /// Fetch `path` from the server.
    ///
    /// Non-success statuses are returned as responses, not errors.
    pub fn fetch(&self, path: &str) -> Result<ProxyResponse, ProxyError> {
        let url = self.upstream_url(path);
        let response = self
            .agent
            .get(&url)
            .call()
            .map_err(|e| ProxyError::Http(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response
            .into_body()
            .read_to_vec()
            .map_err(|e| ProxyError::Io(e.to_string()))?;

        if status >= 400 {
            tracing::warn!(url = %url, status, "PlantUML server returned an error");
        }

        Ok(ProxyResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_url_joins_single_slash() {
        let proxy = PlantUmlProxy::new("http://plantuml:8080/", Duration::from_secs(1));
        assert_eq!(
            proxy.upstream_url("/png/~h4142"),
            "http://plantuml:8080/png/~h4142"
        );
        assert_eq!(
            proxy.upstream_url("svg/~h4142"),
            "http://plantuml:8080/svg/~h4142"
        );
    }

    #[test]
    fn test_fetch_unreachable_server_is_http_error() {
        let proxy = PlantUmlProxy::new("http://127.0.0.1:1", Duration::from_millis(500));
        let err = proxy.fetch("png/~h41").unwrap_err();
        assert!(matches!(err, ProxyError::Http(_)));
    }
}
