use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;

/// One endpoint record from the mirror directory.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub category: String,
}

impl Endpoint {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            url: url.into(),
            category: String::new(),
        }
    }
}

/// Classification outcome of a single probe.
///
/// Every `Online*` variant means the endpoint answered; everything else means it did not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusLabel {
    /// The first (HEAD) web request got a response with this status code.
    Online(u16),
    /// The HEAD request failed but the GET fallback got this status code.
    OnlineFallback(u16),
    /// Control-port connect followed by a `220` service-ready greeting.
    OnlineGreeting,
    /// Control-port connect accepted, no greeting seen before the deadline.
    OnlineConnectOnly,
    /// Plain TCP connect accepted on a non-control port.
    OnlineTcp(u16),
    Offline,
    ConnectionError,
    TimedOut,
    InvalidAddress,
}

impl StatusLabel {
    pub fn is_online(&self) -> bool {
        matches!(
            self,
            StatusLabel::Online(_)
                | StatusLabel::OnlineFallback(_)
                | StatusLabel::OnlineGreeting
                | StatusLabel::OnlineConnectOnly
                | StatusLabel::OnlineTcp(_)
        )
    }
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusLabel::Online(code) => write!(f, "Online ({code})"),
            StatusLabel::OnlineFallback(code) => write!(f, "Online (fallback, {code})"),
            StatusLabel::OnlineGreeting => f.write_str("Online (protocol-greeting confirmed)"),
            StatusLabel::OnlineConnectOnly => f.write_str("Online (connect-only)"),
            StatusLabel::OnlineTcp(port) => write!(f, "Online (TCP:{port})"),
            StatusLabel::Offline => f.write_str("Offline"),
            StatusLabel::ConnectionError => f.write_str("Connection Error"),
            StatusLabel::TimedOut => f.write_str("Timed Out"),
            StatusLabel::InvalidAddress => f.write_str("Invalid Address"),
        }
    }
}

impl FromStr for StatusLabel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let label = match s {
            "Online (protocol-greeting confirmed)" => StatusLabel::OnlineGreeting,
            "Online (connect-only)" => StatusLabel::OnlineConnectOnly,
            "Offline" => StatusLabel::Offline,
            "Connection Error" => StatusLabel::ConnectionError,
            "Timed Out" => StatusLabel::TimedOut,
            "Invalid Address" => StatusLabel::InvalidAddress,
            other => {
                let inner = other
                    .strip_prefix("Online (")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| anyhow::anyhow!("unknown status label: {other}"))?;
                if let Some(code) = inner.strip_prefix("fallback, ") {
                    StatusLabel::OnlineFallback(code.parse()?)
                } else if let Some(port) = inner.strip_prefix("TCP:") {
                    StatusLabel::OnlineTcp(port.parse()?)
                } else {
                    StatusLabel::Online(inner.parse()?)
                }
            }
        };
        Ok(label)
    }
}

impl Serialize for StatusLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StatusLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Result of one probe against one address. Built fresh for every attempt.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub address: String,
    pub reachable: bool,
    pub status: StatusLabel,
    pub latency_ms: Option<u64>,
    #[serde(with = "time::serde::rfc3339")]
    pub attempted_at: OffsetDateTime,
}

impl CheckResult {
    /// `reachable` is derived from the label so the two can never disagree.
    pub fn new(
        address: impl Into<String>,
        status: StatusLabel,
        latency: Option<Duration>,
        attempted_at: OffsetDateTime,
    ) -> Self {
        Self {
            address: address.into(),
            reachable: status.is_online(),
            status,
            latency_ms: latency.map(|d| d.as_millis() as u64),
            attempted_at,
        }
    }

    pub fn invalid(address: impl Into<String>) -> Self {
        Self::new(
            address,
            StatusLabel::InvalidAddress,
            None,
            OffsetDateTime::now_utc(),
        )
    }
}

/// A check result paired with the id of the endpoint it belongs to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EndpointCheck {
    pub id: String,
    pub result: CheckResult,
}

/// Aggregate results and counters for one scan.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ScanReport {
    pub total: u64,
    pub done: u64,
    pub online: u64,
    pub offline: u64,
    /// Mean latency over reachable entries; `None` when nothing answered.
    pub avg_latency_ms: Option<u64>,
    pub entries: Vec<EndpointCheck>,
}

impl ScanReport {
    pub fn average_online_latency(entries: &[EndpointCheck]) -> Option<u64> {
        let latencies: Vec<u64> = entries
            .iter()
            .filter(|e| e.result.reachable)
            .filter_map(|e| e.result.latency_ms)
            .collect();
        if latencies.is_empty() {
            return None;
        }
        let sum: u64 = latencies.iter().sum();
        Some((sum as f64 / latencies.len() as f64).round() as u64)
    }
}
