//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the archiver, including:
//! - Building HTTP clients with proper user agent strings
//! - Politeness pacing (sleeping before every request)
//! - GET requests to fetch listing and topic pages
//! - Error classification
//!
//! Failures are never retried here. Callers skip the page and move on.

use crate::config::UserAgentConfig;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Maximum number of redirects followed for one request
const MAX_REDIRECTS: usize = 10;

/// Errors produced while fetching a single page
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with a non-success status
    #[error("HTTP {status_code} for {url}")]
    HttpError { url: String, status_code: u16 },

    /// The request never produced a response (timeout, refused, TLS, ...)
    #[error("Network error for {url}: {error}")]
    NetworkError { url: String, error: String },

    /// The response is not an HTML document
    #[error("Unexpected content type '{content_type}' for {url}")]
    ContentMismatch { url: String, content_type: String },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            Self::HttpError { url, .. }
            | Self::NetworkError { url, .. }
            | Self::ContentMismatch { url, .. } => url,
        }
    }
}

/// Capability to retrieve the HTML of one page
///
/// Implementations honor `delay` by sleeping before the request is sent.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url, delay: Duration) -> Result<String, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Overall per-request timeout
///
/// # Example
///
/// ```no_run
/// use threadkeeper::config::UserAgentConfig;
/// use threadkeeper::crawler::build_http_client;
/// use std::time::Duration;
///
/// let config = UserAgentConfig {
///     crawler_name: "Threadkeeper".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    // Format: CrawlerName/Version (+ContactURL; ContactEmail)
    let user_agent = format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    );

    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// `PageFetcher` backed by a reqwest client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds the fetcher and its client from the user agent configuration
    pub fn from_config(config: &UserAgentConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config, timeout)?))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, delay: Duration) -> Result<String, FetchError> {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        tracing::trace!("GET {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify_network_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpError {
                url: url.to_string(),
                status_code: status.as_u16(),
            });
        }

        // A missing Content-Type is accepted; an explicit non-HTML one is not
        if let Some(content_type) = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            if !is_html(content_type) {
                return Err(FetchError::ContentMismatch {
                    url: url.to_string(),
                    content_type: content_type.to_string(),
                });
            }
        }

        response
            .text()
            .await
            .map_err(|e| classify_network_error(url, e))
    }
}

fn is_html(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "text/html" || mime == "application/xhtml+xml"
}

fn classify_network_error(url: &Url, error: reqwest::Error) -> FetchError {
    let description = if error.is_timeout() {
        "Request timeout".to_string()
    } else if error.is_connect() {
        "Connection refused".to_string()
    } else if error.is_redirect() {
        "Too many redirects".to_string()
    } else {
        error.to_string()
    };

    FetchError::NetworkError {
        url: url.to_string(),
        error: description,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config() -> UserAgentConfig {
        UserAgentConfig {
            crawler_name: "TestArchiver".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::from_config(&create_test_config(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_build_http_client() {
        let client = build_http_client(&create_test_config(), Duration::from_secs(30));
        assert!(client.is_ok());
    }

    #[test]
    fn test_is_html() {
        assert!(is_html("text/html"));
        assert!(is_html("text/html; charset=UTF-8"));
        assert!(is_html("TEXT/HTML"));
        assert!(!is_html("application/json"));
        assert!(!is_html("text/plain"));
    }

    #[tokio::test]
    async fn test_fetch_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/viewforum.php"))
            .and(header_exists("user-agent"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<html>ok</html>", "text/html"),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/viewforum.php?f=1", server.uri())).unwrap();
        let body = fetcher().fetch(&url, Duration::ZERO).await.unwrap();
        assert_eq!(body, "<html>ok</html>");
    }

    #[tokio::test]
    async fn test_fetch_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let err = fetcher().fetch(&url, Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, FetchError::HttpError { status_code: 404, .. }));
        assert_eq!(err.url(), url.as_str());
    }

    #[tokio::test]
    async fn test_fetch_content_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("{}", "application/json"))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/api", server.uri())).unwrap();
        let err = fetcher().fetch(&url, Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, FetchError::ContentMismatch { .. }));
    }

    #[tokio::test]
    async fn test_fetch_honors_delay() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<p></p>", "text/html"))
            .mount(&server)
            .await;

        let url = Url::parse(&server.uri()).unwrap();
        let started = std::time::Instant::now();
        fetcher()
            .fetch(&url, Duration::from_millis(150))
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(150));
    }
}
