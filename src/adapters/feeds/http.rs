//! HTTP Feed - Rate-limited Proposition Table Client
//!
//! Wraps reqwest with a client-side rate limit and exponential-backoff
//! retries on transport and server errors. Rate-limit (429) and
//! forbidden (403) answers are returned straight away so the refresh
//! gate can back off and reuse the last good table.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use super::parse_table;
use crate::domain::proposition::RawProposition;
use crate::ports::PropositionSource;

/// Configuration for the HTTP proposition client.
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    /// Endpoint serving the proposition table.
    pub url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Maximum retries on transient errors.
    pub max_retries: u32,
    /// Base delay between retries (exponential backoff).
    pub retry_base_delay: Duration,
    /// Outbound requests allowed per minute, retries included.
    pub requests_per_minute: u32,
}

impl HttpSourceConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(20),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(500),
            requests_per_minute: 10,
        }
    }
}

/// Proposition source backed by an HTTP endpoint.
pub struct HttpSource {
    http: Client,
    config: HttpSourceConfig,
    limiter: DefaultDirectRateLimiter,
}

impl HttpSource {
    pub fn new(config: HttpSourceConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(2)
            .build()
            .context("Failed to build HTTP client")?;

        let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let limiter = RateLimiter::direct(Quota::per_minute(per_minute));

        Ok(Self {
            http,
            config,
            limiter,
        })
    }
}

#[async_trait]
impl PropositionSource for HttpSource {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self), fields(url = %self.config.url))]
    async fn fetch(&self) -> Result<Vec<RawProposition>> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = self.config.retry_base_delay * 2u32.pow(attempt - 1);
                debug!(attempt, delay_ms = delay.as_millis(), "Retrying fetch");
                sleep(delay).await;
            }

            self.limiter.until_ready().await;

            match self.http.get(&self.config.url).send().await {
                Ok(response) => match response.status() {
                    StatusCode::OK => {
                        let text = response.text().await.context("Failed to read body")?;
                        let rows = parse_table(&text)?;
                        debug!(rows = rows.len(), "Proposition table fetched");
                        return Ok(rows);
                    }
                    StatusCode::TOO_MANY_REQUESTS => {
                        anyhow::bail!("Rate limited by proposition feed");
                    }
                    StatusCode::FORBIDDEN => {
                        anyhow::bail!("Proposition feed refused the request (403)");
                    }
                    status if status.is_server_error() => {
                        warn!(status = %status, "Server error, retrying");
                        last_error = Some(anyhow::anyhow!("Server error: {status}"));
                    }
                    status => {
                        let body = response.text().await.unwrap_or_default();
                        anyhow::bail!("Feed error {status}: {body}");
                    }
                },
                Err(e) => {
                    warn!(error = %e, attempt, "Request failed");
                    last_error = Some(e.into());
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Max retries exceeded")))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::http::StatusCode as AxumStatus;
    use axum::routing::get;
    use axum::Router;

    use super::*;

    const TABLE: &str = r#"[{"player":"S. Curry","market":"Threes","line":4.5,
        "price_favorable":-115,"price_unfavorable":-105,"group":"GSW@LAL"}]"#;

    /// Serves `responses` in order (the last one repeats) and counts hits.
    async fn serve(responses: Vec<(AxumStatus, &'static str)>) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let app = Router::new().route(
            "/props",
            get(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let (status, body) = responses[n.min(responses.len() - 1)];
                async move { (status, body) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        (format!("http://{addr}/props"), hits)
    }

    fn source(url: String) -> HttpSource {
        let mut config = HttpSourceConfig::new(url);
        config.retry_base_delay = Duration::from_millis(5);
        config.requests_per_minute = 600;
        HttpSource::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_fetches_table() {
        let (url, hits) = serve(vec![(AxumStatus::OK, TABLE)]).await;
        let rows = source(url).fetch().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].player, "S. Curry");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_error_retried() {
        let (url, hits) = serve(vec![
            (AxumStatus::INTERNAL_SERVER_ERROR, ""),
            (AxumStatus::OK, TABLE),
        ])
        .await;
        let rows = source(url).fetch().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_not_retried() {
        let (url, hits) = serve(vec![(AxumStatus::TOO_MANY_REQUESTS, "")]).await;
        let err = source(url).fetch().await.unwrap_err();
        assert!(err.to_string().contains("Rate limited"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
