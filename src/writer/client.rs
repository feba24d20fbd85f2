use super::MetricSink;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Response bodies are cut to this many characters in logs.
const MAX_LOGGED_BODY: usize = 200;

/// Connection settings for the writer.
#[derive(Clone, Debug)]
pub struct WriterConfig {
    /// Base URL, e.g. "http://localhost:8428"
    pub base_url: String,
    /// Bearer token attached to every request
    pub token: Option<String>,
    /// Verify TLS certificates (only matters for https)
    pub verify_ssl: bool,
    /// Timeout for GET /health
    pub health_timeout: Duration,
    /// Timeout for each POST /write attempt
    pub write_timeout: Duration,
    /// Attempts per payload, including the first
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every further retry
    pub retry_backoff: Duration,
}

impl WriterConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            verify_ssl: true,
            health_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(30),
            max_attempts: 3,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

/// Outcome of delivering one payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// 2xx response after `attempts` tries
    Accepted { attempts: u32 },
    /// 401: credential rejected, never retried
    Unauthorized,
    /// Any other non-success status, never retried
    Rejected { status: u16 },
    /// Every attempt failed at the transport level
    Exhausted { attempts: u32 },
    /// The HTTP client could not be built
    ClientUnavailable,
}

impl Delivery {
    pub fn is_success(&self) -> bool {
        matches!(self, Delivery::Accepted { .. })
    }
}

/// HTTP writer for VictoriaMetrics' InfluxDB-compatible endpoints.
///
/// Keeps one connection pool for its whole life. The pool is created on
/// first use and again after [`MetricSink::close`].
pub struct VictoriaMetricsWriter {
    config: WriterConfig,
    health_url: String,
    write_url: String,
    headers: HeaderMap,
    client: Mutex<Option<Client>>,
}

impl VictoriaMetricsWriter {
    pub fn new(config: WriterConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .context("Token contains characters not allowed in an HTTP header")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        Ok(Self {
            health_url: format!("{}/health", config.base_url),
            write_url: format!("{}/write", config.base_url),
            headers,
            config,
            client: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// True while a connection pool is held.
    pub fn is_open(&self) -> bool {
        self.lock_client().is_some()
    }

    /// GET /health; true only on 200. Never fails.
    pub async fn health_check(&self) -> bool {
        let client = match self.client() {
            Ok(client) => client,
            Err(e) => {
                error!(error = %e, "Failed to build HTTP client");
                return false;
            }
        };

        match client
            .get(&self.health_url)
            .timeout(self.config.health_timeout)
            .send()
            .await
        {
            Ok(response) if response.status() == StatusCode::OK => true,
            Ok(response) => {
                warn!(
                    base_url = %self.config.base_url,
                    status = response.status().as_u16(),
                    "VictoriaMetrics health check failed"
                );
                false
            }
            Err(e) => {
                error!(
                    base_url = %self.config.base_url,
                    error = %e,
                    "Failed to connect to VictoriaMetrics"
                );
                false
            }
        }
    }

    /// POST a payload to /write with retry on transport errors.
    ///
    /// Status responses are final: 2xx is success, 401 and everything else
    /// are reported without retrying. Connection errors and timeouts are
    /// retried with exponential backoff up to `max_attempts`.
    pub async fn send(&self, payload: String) -> Delivery {
        let max_attempts = self.config.max_attempts;

        for attempt in 1..=max_attempts {
            let client = match self.client() {
                Ok(client) => client,
                Err(e) => {
                    error!(error = %e, "Failed to build HTTP client");
                    return Delivery::ClientUnavailable;
                }
            };

            let result = client
                .post(&self.write_url)
                .body(payload.clone())
                .timeout(self.config.write_timeout)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Delivery::Accepted { attempts: attempt };
                    }
                    if status == StatusCode::UNAUTHORIZED {
                        error!(
                            "Authentication failed for VictoriaMetrics (HTTP 401). \
                             Check your token configuration."
                        );
                        return Delivery::Unauthorized;
                    }

                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<failed to read body>".to_string());
                    warn!(
                        status = status.as_u16(),
                        body = %truncate(&body, MAX_LOGGED_BODY),
                        "VictoriaMetrics rejected payload"
                    );
                    return Delivery::Rejected {
                        status: status.as_u16(),
                    };
                }
                Err(e) if attempt < max_attempts => {
                    let delay = self.backoff(attempt);
                    debug!(
                        attempt = attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Write attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(
                        attempts = max_attempts,
                        error = %e,
                        "Failed to write to VictoriaMetrics after {} attempts",
                        max_attempts
                    );
                }
            }
        }

        Delivery::Exhausted {
            attempts: max_attempts,
        }
    }

    /// Delay after failed attempt `attempt` (1-based).
    pub(super) fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.config.retry_backoff.saturating_mul(factor)
    }

    fn client(&self) -> Result<Client> {
        let mut slot = self.lock_client();
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .user_agent(concat!("vmexport/", env!("CARGO_PKG_VERSION")))
            .default_headers(self.headers.clone())
            .danger_accept_invalid_certs(!self.config.verify_ssl)
            .build()
            .context("Failed to build HTTP client")?;

        debug!(base_url = %self.config.base_url, "Opened connection pool");
        *slot = Some(client.clone());
        Ok(client)
    }

    fn lock_client(&self) -> std::sync::MutexGuard<'_, Option<Client>> {
        self.client.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MetricSink for VictoriaMetricsWriter {
    async fn write_single(&self, line: String) -> bool {
        self.send(line).await.is_success()
    }

    async fn write_batch(&self, lines: Vec<String>) -> bool {
        if lines.is_empty() {
            return true;
        }
        debug!(count = lines.len(), "Writing batch to VictoriaMetrics");
        self.send(lines.join("\n")).await.is_success()
    }

    async fn close(&self) {
        if self.lock_client().take().is_some() {
            info!(base_url = %self.config.base_url, "Closed VictoriaMetrics connection pool");
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
