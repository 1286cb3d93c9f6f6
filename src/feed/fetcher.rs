use futures::StreamExt;
use reqwest::redirect::Policy;
use std::time::Duration;
use thiserror::Error;

/// `User-Agent` sent with every feed request unless configured otherwise.
pub const USER_AGENT: &str = "Feeda_feed_aggregator/1.0";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

const MAX_REDIRECTS: usize = 10;

/// Errors that can occur while retrieving a feed document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the configured size limit
    #[error("Response too large (limit {limit} bytes)")]
    ResponseTooLarge { limit: usize },
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// The sync was interrupted before this fetch finished
    #[error("Cancelled")]
    Cancelled,
}

/// Build the HTTP client shared by every fetch.
///
/// The timeout set here covers the whole request including the body; the
/// fetch functions add their own outer timeout on top.
pub fn build_client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client, FetchError> {
    let client = reqwest::Client::builder()
        .user_agent(user_agent)
        .redirect(redirect_policy())
        .timeout(timeout)
        .pool_idle_timeout(Duration::from_secs(30))
        .build()?;
    Ok(client)
}

fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error(format!("Too many redirects (max {})", MAX_REDIRECTS));
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

/// GET a feed document and return its raw body.
///
/// # Errors
///
/// - [`FetchError::Timeout`] - No complete response within `timeout`
/// - [`FetchError::HttpStatus`] - Non-2xx HTTP response
/// - [`FetchError::ResponseTooLarge`] - Body exceeded `max_size`
/// - [`FetchError::Network`] - Connection, TLS or body read errors
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    max_size: usize,
) -> Result<Vec<u8>, FetchError> {
    let bytes = tokio::time::timeout(timeout, request_body(client, url, max_size))
        .await
        .map_err(|_| FetchError::Timeout)??;

    tracing::debug!(url = %url, bytes = bytes.len(), "Fetched feed");
    Ok(bytes)
}

async fn request_body(
    client: &reqwest::Client,
    url: &str,
    max_size: usize,
) -> Result<Vec<u8>, FetchError> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    read_limited_bytes(response, max_size).await
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge { limit });
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge { limit });
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>t</title></channel></rss>"#;

    fn client() -> reqwest::Client {
        build_client(USER_AGENT, DEFAULT_TIMEOUT).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_success_sends_user_agent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .and(header("User-Agent", USER_AGENT))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/rss+xml"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed", mock_server.uri());
        let body = fetch_feed(&client(), &url, DEFAULT_TIMEOUT, DEFAULT_MAX_FEED_SIZE)
            .await
            .unwrap();
        assert_eq!(body, VALID_RSS.as_bytes());
    }

    #[tokio::test]
    async fn test_fetch_404_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed", mock_server.uri());
        let result = fetch_feed(&client(), &url, DEFAULT_TIMEOUT, DEFAULT_MAX_FEED_SIZE).await;
        match result {
            Err(FetchError::HttpStatus(404)) => {}
            other => panic!("Expected HttpStatus(404), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed", mock_server.uri());
        let result = fetch_feed(&client(), &url, DEFAULT_TIMEOUT, DEFAULT_MAX_FEED_SIZE).await;
        assert!(matches!(result, Err(FetchError::HttpStatus(503))));
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed", mock_server.uri());
        let result = fetch_feed(
            &client(),
            &url,
            Duration::from_millis(200),
            DEFAULT_MAX_FEED_SIZE,
        )
        .await;
        assert!(matches!(result, Err(FetchError::Timeout)));
    }

    #[tokio::test]
    async fn test_response_too_large() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed", mock_server.uri());
        let result = fetch_feed(&client(), &url, DEFAULT_TIMEOUT, 1024).await;
        assert!(matches!(
            result,
            Err(FetchError::ResponseTooLarge { limit: 1024 })
        ));
    }

    #[tokio::test]
    async fn test_follows_redirect() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(301)
                    .insert_header("Location", format!("{}/new", mock_server.uri()).as_str()),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&mock_server)
            .await;

        let url = format!("{}/old", mock_server.uri());
        let body = fetch_feed(&client(), &url, DEFAULT_TIMEOUT, DEFAULT_MAX_FEED_SIZE)
            .await
            .unwrap();
        assert_eq!(body, VALID_RSS.as_bytes());
    }
}
