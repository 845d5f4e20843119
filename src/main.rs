use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use tracing::info;

use mirror_probe::batch::{self, BatchConfig, BatchScheduler, ScanProgress};
use mirror_probe::catalog;
use mirror_probe::prober::{ProbeConfig, Prober, DEFAULT_USER_AGENT};
use mirror_probe::server::{self, AppState};
use mirror_probe::socket::GreetingPolicy;
use mirror_probe::types::{CheckResult, Endpoint, ScanReport};

/// mirror-probe: check which local file mirrors (HTTP/HTTPS/FTP) are reachable from here.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "mirror-probe",
    version,
    about = "Check which local file mirrors (HTTP/HTTPS/FTP) are reachable from this network.",
    long_about = None
)]
struct Cli {
    /// Addresses to check (e.g. http://10.16.100.244/ or ftp://172.16.50.4).
    addresses: Vec<String>,

    /// JSON catalog of endpoints: [{"id", "name", "url", "category"}].
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Plain-text mirror list (numbered headers followed by "- http://..." lines).
    #[arg(long)]
    list: Option<PathBuf>,

    /// Per-attempt timeout in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 5000)]
    timeout_ms: u64,

    /// Maximum checks per batch window (also the concurrency cap).
    #[arg(long = "batch-size", default_value_t = batch::DEFAULT_MAX_SIZE)]
    batch_size: usize,

    /// Milliseconds a partial batch window waits before flushing.
    #[arg(long = "batch-wait-ms", default_value_t = 200)]
    batch_wait_ms: u64,

    /// What a silent FTP control port means.
    #[arg(long = "greeting-policy", value_enum, default_value_t = PolicyArg::ConnectOnly)]
    greeting_policy: PolicyArg,

    /// User-Agent header for web probes.
    #[arg(long = "user-agent", default_value = DEFAULT_USER_AGENT)]
    user_agent: String,

    /// Write the scan report as pretty JSON to this path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Only print reachable endpoints in the table.
    #[arg(long = "online-only", default_value_t = false)]
    online_only: bool,

    /// Serve the HTTP API on this address instead of running a one-shot scan.
    #[arg(long)]
    serve: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    ConnectOnly,
    RequireGreeting,
}

impl From<PolicyArg> for GreetingPolicy {
    fn from(p: PolicyArg) -> Self {
        match p {
            PolicyArg::ConnectOnly => GreetingPolicy::ConnectOnly,
            PolicyArg::RequireGreeting => GreetingPolicy::RequireGreeting,
        }
    }
}

impl Cli {
    fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            timeout: Duration::from_millis(self.timeout_ms),
            user_agent: self.user_agent.clone(),
            greeting_policy: self.greeting_policy.into(),
            ..ProbeConfig::default()
        }
    }

    fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            max_size: self.batch_size,
            max_wait: Duration::from_millis(self.batch_wait_ms),
        }
    }

    fn endpoints(&self) -> Result<Vec<Endpoint>> {
        let mut sources = Vec::new();
        if let Some(path) = &self.catalog {
            sources.push(catalog::load_catalog(path)?);
        }
        if let Some(path) = &self.list {
            sources.push(catalog::load_mirror_list(path)?);
        }
        sources.push(catalog::endpoints_from_addresses(&self.addresses));
        catalog::merge_endpoints(sources)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let endpoints = cli.endpoints()?;
    let prober = Prober::new(cli.probe_config())?;
    let scheduler = BatchScheduler::new(prober.clone(), cli.batch_config());

    info!(
        endpoints = endpoints.len(),
        timeout_ms = cli.timeout_ms,
        batch_size = cli.batch_size,
        batch_wait_ms = cli.batch_wait_ms,
        policy = ?cli.greeting_policy,
        "mirror-probe configured"
    );

    if let Some(bind) = cli.serve.as_deref() {
        let state = AppState::new(prober, scheduler, endpoints);
        return server::spawn_server(bind, state).await;
    }

    if endpoints.is_empty() {
        bail!("nothing to check: pass addresses, --catalog or --list");
    }

    let report = batch::scan_endpoints(&scheduler, &endpoints, ScanProgress::new()).await?;
    print_results_table(&report, &endpoints, cli.online_only);
    if let Some(path) = cli.output.as_deref() {
        write_report_json(path, &report)?;
        info!("wrote JSON report to {}", path.display());
    }
    Ok(())
}

fn print_results_table(report: &ScanReport, endpoints: &[Endpoint], online_only: bool) {
    // Completion order is arbitrary; show rows in input order.
    let by_id: HashMap<&str, &CheckResult> = report
        .entries
        .iter()
        .map(|e| (e.id.as_str(), &e.result))
        .collect();
    let rows: Vec<_> = endpoints
        .iter()
        .filter_map(|ep| by_id.get(ep.id.as_str()).map(|r| (ep, *r)))
        .filter(|(_, r)| !online_only || r.reachable)
        .collect();

    let mut id_w = "id".len();
    let mut addr_w = "address".len();
    let mut status_w = "status".len();
    for (ep, r) in &rows {
        id_w = id_w.max(ep.id.len());
        addr_w = addr_w.max(r.address.len().min(60));
        status_w = status_w.max(r.status.to_string().len());
    }
    let lat_w = "latency_ms".len();

    let avg = report
        .avg_latency_ms
        .map(|ms| format!("{ms} ms"))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "\nOnline: {}  Offline: {}  Avg latency: {}  (checked: {})",
        report.online, report.offline, avg, report.done
    );
    println!(
        "{:<id_w$}  {:<addr_w$}  {:<status_w$}  {:>lat_w$}",
        "id", "address", "status", "latency_ms",
    );
    println!(
        "{:-<id_w$}  {:-<addr_w$}  {:-<status_w$}  {:-<lat_w$}",
        "", "", "", "",
    );
    for (ep, r) in rows {
        let mut addr = r.address.clone();
        if addr.len() > 60 {
            let mut cut = 60;
            while !addr.is_char_boundary(cut) {
                cut -= 1;
            }
            addr.truncate(cut);
        }
        let latency = r
            .latency_ms
            .map(|ms| ms.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<id_w$}  {:<addr_w$}  {:<status_w$}  {:>lat_w$}",
            ep.id,
            addr,
            r.status.to_string(),
            latency,
        );
    }
}

fn write_report_json(path: &Path, report: &ScanReport) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}
