use thiserror::Error;
use url::{Host, Url};

/// Conventional FTP control port, used when a bare-socket address names no port.
pub const FTP_CONTROL_PORT: u16 = 21;

/// Protocol family of a target address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Web,
    BareSocket,
}

/// A syntactically valid target, ready to be probed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Web(Url),
    Socket { host: String, port: u16 },
}

impl Target {
    pub fn protocol(&self) -> Protocol {
        match self {
            Target::Web(_) => Protocol::Web,
            Target::Socket { .. } => Protocol::BareSocket,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid address {address:?}: {reason}")]
pub struct InvalidAddress {
    pub address: String,
    pub reason: String,
}

impl InvalidAddress {
    fn new(address: &str, reason: impl Into<String>) -> Self {
        Self {
            address: address.to_string(),
            reason: reason.into(),
        }
    }
}

/// Classify an address string as a web or bare-socket target.
///
/// - `http`/`https` schemes are `Web`.
/// - Any other scheme is `BareSocket`, port defaulting to 21.
/// - Input without `://` is read as `ftp://<input>`, so `host` and `host:port` work.
///
/// Never panics; bad input comes back as `InvalidAddress`.
pub fn classify(address: &str) -> Result<Target, InvalidAddress> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(InvalidAddress::new(address, "empty address"));
    }

    let parsed = if trimmed.contains("://") {
        Url::parse(trimmed)
    } else {
        Url::parse(&format!("ftp://{trimmed}"))
    }
    .map_err(|e| InvalidAddress::new(address, e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => Ok(Target::Web(parsed)),
        _ => {
            let host = match parsed.host() {
                Some(Host::Domain(d)) if !d.is_empty() => d.to_string(),
                Some(Host::Ipv4(ip)) => ip.to_string(),
                Some(Host::Ipv6(ip)) => ip.to_string(),
                _ => return Err(InvalidAddress::new(address, "missing host")),
            };
            let port = parsed.port().unwrap_or(FTP_CONTROL_PORT);
            Ok(Target::Socket { host, port })
        }
    }
}
