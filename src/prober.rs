use std::time::Duration;

use anyhow::Result;
use tracing::debug;

use crate::classify::{classify, Target, FTP_CONTROL_PORT};
use crate::socket::{GreetingPolicy, SocketProber};
use crate::types::CheckResult;
use crate::web::WebProber;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Browser-like identity; some mirror front-ends reject unknown agents.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Per-attempt deadline for web requests; whole connect + greeting budget for sockets.
    pub timeout: Duration,
    pub user_agent: String,
    pub greeting_policy: GreetingPolicy,
    /// Port on which the socket prober waits for an FTP greeting.
    pub control_port: u16,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            greeting_policy: GreetingPolicy::default(),
            control_port: FTP_CONTROL_PORT,
        }
    }
}

/// Single-endpoint reachability check: classify, then dispatch to the web or
/// socket prober. Cheap to clone and safe to call from many tasks at once.
#[derive(Debug, Clone)]
pub struct Prober {
    timeout: Duration,
    web: WebProber,
    socket: SocketProber,
}

impl Prober {
    pub fn new(config: ProbeConfig) -> Result<Self> {
        Ok(Self {
            timeout: config.timeout,
            web: WebProber::new(&config.user_agent)?,
            socket: SocketProber::new(config.greeting_policy, config.control_port),
        })
    }

    pub async fn probe(&self, address: &str) -> CheckResult {
        self.probe_with_timeout(address, self.timeout).await
    }

    /// Never fails: every outcome, including malformed input, is a `CheckResult`.
    pub async fn probe_with_timeout(&self, address: &str, timeout: Duration) -> CheckResult {
        let result = match classify(address) {
            Err(e) => {
                debug!(error = %e, "skipping network probe");
                return CheckResult::invalid(address);
            }
            Ok(Target::Web(url)) => {
                let mut r = self.web.probe(&url, timeout).await;
                r.address = address.to_string();
                r
            }
            Ok(Target::Socket { host, port }) => {
                self.socket.probe(address, &host, port, timeout).await
            }
        };
        debug!(address, status = %result.status, latency_ms = ?result.latency_ms, "probe finished");
        result
    }
}
