use std::time::Duration;

use ::time::OffsetDateTime;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tracing::debug;

use crate::classify::FTP_CONTROL_PORT;
use crate::types::{CheckResult, StatusLabel};

/// FTP "service ready" reply code.
const GREETING_PREFIX: &[u8] = b"220";

/// What to conclude when the control port accepts a connection but sends no
/// `220` greeting before the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GreetingPolicy {
    /// The accepted connect alone proves reachability.
    #[default]
    ConnectOnly,
    /// Only a `220` greeting proves reachability.
    RequireGreeting,
}

/// Probes bare TCP endpoints, waiting for an FTP greeting on the control port.
#[derive(Debug, Clone)]
pub struct SocketProber {
    policy: GreetingPolicy,
    control_port: u16,
}

impl Default for SocketProber {
    fn default() -> Self {
        Self::new(GreetingPolicy::default(), FTP_CONTROL_PORT)
    }
}

enum Greeting {
    Confirmed,
    Closed,
    Unexpected,
    Silent,
}

impl SocketProber {
    pub fn new(policy: GreetingPolicy, control_port: u16) -> Self {
        Self { policy, control_port }
    }

    /// Connect to `host:port` within `timeout` (connect and greeting wait share it).
    ///
    /// `address` is echoed into the result untouched.
    pub async fn probe(&self, address: &str, host: &str, port: u16, timeout: Duration) -> CheckResult {
        let attempted_at = OffsetDateTime::now_utc();
        let start = Instant::now();
        let deadline = start + timeout;

        let status = match time::timeout_at(deadline, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => {
                if port == self.control_port {
                    self.classify_greeting(read_greeting(stream, deadline).await)
                } else {
                    StatusLabel::OnlineTcp(port)
                }
            }
            Ok(Err(e)) => {
                debug!(host, port, error = %e, "tcp connect failed");
                StatusLabel::ConnectionError
            }
            Err(_) => {
                debug!(host, port, ?timeout, "tcp connect timed out");
                StatusLabel::TimedOut
            }
        };

        CheckResult::new(address, status, Some(start.elapsed()), attempted_at)
    }

    fn classify_greeting(&self, greeting: Greeting) -> StatusLabel {
        match (greeting, self.policy) {
            (Greeting::Confirmed, _) => StatusLabel::OnlineGreeting,
            (_, GreetingPolicy::ConnectOnly) => StatusLabel::OnlineConnectOnly,
            (Greeting::Silent, GreetingPolicy::RequireGreeting) => StatusLabel::TimedOut,
            (Greeting::Closed | Greeting::Unexpected, GreetingPolicy::RequireGreeting) => {
                StatusLabel::ConnectionError
            }
        }
    }
}

/// Read until the buffer can be judged against the `220` prefix, the peer
/// closes, or the deadline passes. The stream is dropped (closed) on return.
async fn read_greeting(mut stream: TcpStream, deadline: Instant) -> Greeting {
    let mut buf = Vec::with_capacity(64);
    let mut chunk = [0u8; 64];
    loop {
        match time::timeout_at(deadline, stream.read(&mut chunk)).await {
            Ok(Ok(0)) => return Greeting::Closed,
            Ok(Ok(n)) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.len() >= GREETING_PREFIX.len() {
                    return if buf.starts_with(GREETING_PREFIX) {
                        Greeting::Confirmed
                    } else {
                        debug!(reply = %String::from_utf8_lossy(&buf).trim_end(), "unexpected greeting");
                        Greeting::Unexpected
                    };
                }
            }
            Ok(Err(e)) => {
                debug!(error = %e, "greeting read failed");
                return Greeting::Closed;
            }
            Err(_) => return Greeting::Silent,
        }
    }
}
