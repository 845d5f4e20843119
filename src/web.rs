use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{redirect, Client, Response};
use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

use crate::types::{CheckResult, StatusLabel};

/// Probes web endpoints with a HEAD request and a single GET fallback.
///
/// Any HTTP status counts as reachable; only transport failures (refused,
/// DNS, TLS, timeout) trigger the fallback or an `Offline` result.
#[derive(Debug, Clone)]
pub struct WebProber {
    client: Client,
}

impl WebProber {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(redirect::Policy::none())
            .danger_accept_invalid_certs(true)
            .pool_max_idle_per_host(0)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }

    /// Probe `url`, giving each of the two attempts `timeout`.
    pub async fn probe(&self, url: &Url, timeout: Duration) -> CheckResult {
        let attempted_at = OffsetDateTime::now_utc();
        let start = Instant::now();

        let status = match self.attempt(self.client.head(url.clone()), timeout).await {
            Ok(resp) => StatusLabel::Online(resp.status().as_u16()),
            Err(head_err) => {
                debug!(%url, error = %head_err, "HEAD failed, falling back to GET");
                match self.attempt(self.client.get(url.clone()), timeout).await {
                    Ok(resp) => StatusLabel::OnlineFallback(resp.status().as_u16()),
                    Err(get_err) => {
                        debug!(%url, error = %get_err, "GET fallback failed");
                        StatusLabel::Offline
                    }
                }
            }
        };

        CheckResult::new(url.as_str(), status, Some(start.elapsed()), attempted_at)
    }

    // The response is dropped without reading the body.
    async fn attempt(
        &self,
        req: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> reqwest::Result<Response> {
        req.timeout(timeout).send().await
    }
}
