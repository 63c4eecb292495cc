//! HTTP transport with per-call timeout.
//!
//! Uses async reqwest internally with tokio::time::timeout,
//! but presents a sync interface so the harvest loop stays sequential.

use std::sync::LazyLock;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::RequestError;

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport-level settings
#[derive(Debug, Clone, Copy)]
pub struct HttpConfig {
    /// Per-call timeout covering send and body read
    pub read_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(10),
        }
    }
}

/// A complete HTTP response: status, lower-cased headers and body text.
///
/// Non-2xx statuses are still responses; classification happens in the
/// rate governor so quota headers are read even on errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Builder-style header insert (name is lower-cased)
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Explicit pagination signal from the `Link` header.
    ///
    /// `Some(true)` if a `rel="next"` link is present, `Some(false)` if a
    /// `Link` header exists without one, `None` if there is no `Link` header.
    pub fn has_next_page(&self) -> Option<bool> {
        let link = self.header("link")?;
        Some(parse_link_header(link).iter().any(|(_, rel)| *rel == "next"))
    }
}

/// Parse a `Link` header into `(url, rel)` pairs.
///
/// Format: `<https://...&page=2>; rel="next", <https://...&page=9>; rel="last"`
pub fn parse_link_header(value: &str) -> Vec<(&str, &str)> {
    value
        .split(',')
        .filter_map(|part| {
            let part = part.trim();
            let url = part.strip_prefix('<')?.split('>').next()?;
            let rel = part
                .split(';')
                .skip(1)
                .map(str::trim)
                .find_map(|param| param.strip_prefix("rel="))?
                .trim_matches('"');
            Some((url, rel))
        })
        .collect()
}

/// Blocking GET; returns any HTTP status as `Ok`, only transport failures as `Err`.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> Result<ApiResponse, RequestError>;
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// reqwest-backed transport with default headers (auth, accept, user agent)
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    read_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &HttpConfig, default_headers: &[(&str, String)]) -> Result<Self, RequestError> {
        let mut headers = HeaderMap::new();
        for (name, value) in default_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| RequestError::Network(format!("invalid header name {name}: {e}")))?;
            let mut value = HeaderValue::from_str(value)
                .map_err(|e| RequestError::Network(format!("invalid header value: {e}")))?;
            if name == reqwest::header::AUTHORIZATION {
                value.set_sensitive(true);
            }
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(4)
            .default_headers(headers)
            .build()
            .map_err(|e| RequestError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            read_timeout: config.read_timeout,
        })
    }

    async fn fetch(&self, url: &str) -> Result<ApiResponse, reqwest::Error> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let body = response.text().await?;
        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<ApiResponse, RequestError> {
        SHARED_RUNTIME.handle().block_on(async {
            match tokio::time::timeout(self.read_timeout, self.fetch(url)).await {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(e)) if e.is_timeout() => Err(RequestError::Timeout(self.read_timeout)),
                // Strip URL from error to avoid leaking tokens in query strings
                Ok(Err(e)) => Err(RequestError::Network(e.without_url().to_string())),
                Err(_) => Err(RequestError::Timeout(self.read_timeout)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GITHUB_LINK: &str = "<https://api.github.com/repositories/1/releases?per_page=100&page=2>; rel=\"next\", <https://api.github.com/repositories/1/releases?per_page=100&page=5>; rel=\"last\"";

    #[test]
    fn parse_link_next_and_last() {
        let links = parse_link_header(GITHUB_LINK);
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].1, "next");
        assert!(links[0].0.ends_with("page=2"));
        assert_eq!(links[1].1, "last");
    }

    #[test]
    fn parse_link_garbage() {
        assert!(parse_link_header("").is_empty());
        assert!(parse_link_header("not a link").is_empty());
    }

    #[test]
    fn next_page_signal() {
        let with_next = ApiResponse::new(200, "[]").with_header("Link", GITHUB_LINK);
        assert_eq!(with_next.has_next_page(), Some(true));

        let last = ApiResponse::new(200, "[]").with_header(
            "link",
            "<https://api.github.com/x?page=1>; rel=\"prev\", <https://api.github.com/x?page=1>; rel=\"first\"",
        );
        assert_eq!(last.has_next_page(), Some(false));

        assert_eq!(ApiResponse::new(200, "[]").has_next_page(), None);
    }

    #[test]
    fn header_lookup_case_insensitive() {
        let r = ApiResponse::new(200, "").with_header("X-RateLimit-Remaining", "42");
        assert_eq!(r.header("x-ratelimit-remaining"), Some("42"));
        assert_eq!(r.header("X-RATELIMIT-REMAINING"), Some("42"));
        assert_eq!(r.header("retry-after"), None);
    }
}
