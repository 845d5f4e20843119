use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::prober::Prober;
use crate::types::{CheckResult, Endpoint, EndpointCheck, ScanReport};

pub const DEFAULT_MAX_SIZE: usize = 50;
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    /// Window size; doubles as the in-flight probe cap.
    pub max_size: usize,
    /// Longest a window stays open after its first submission.
    pub max_wait: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

struct Job {
    address: String,
    reply: oneshot::Sender<CheckResult>,
}

/// Groups submitted checks into bounded windows and runs each window through
/// the prober concurrently.
///
/// A window is flushed when it holds `max_size` checks or `max_wait` after its
/// first submission, whichever comes first. The next window only starts once
/// the current one has finished, so submitting thousands of addresses up front
/// never puts more than `max_size` probes in flight.
///
/// Must be created inside a tokio runtime. The background task stops after
/// every handle is dropped and the last window is done.
#[derive(Clone)]
pub struct BatchScheduler {
    tx: mpsc::UnboundedSender<Job>,
}

impl BatchScheduler {
    pub fn new(prober: Prober, config: BatchConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_windows(prober, config, rx));
        Self { tx }
    }

    /// Queue one address. Never blocks; the returned handle resolves when its
    /// probe finishes, independently of the rest of the window.
    pub fn submit(&self, address: impl Into<String>) -> PendingCheck {
        let (reply, rx) = oneshot::channel();
        let job = Job {
            address: address.into(),
            reply,
        };
        // On a closed channel the job (and its sender) is dropped, so the handle reports it.
        let _ = self.tx.send(job);
        PendingCheck { rx }
    }
}

/// Outstanding result of a submitted check.
pub struct PendingCheck {
    rx: oneshot::Receiver<CheckResult>,
}

impl Future for PendingCheck {
    type Output = Result<CheckResult>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.map_err(|_| anyhow!("batch scheduler stopped before the check completed")))
    }
}

async fn run_windows(prober: Prober, config: BatchConfig, mut rx: mpsc::UnboundedReceiver<Job>) {
    let max_size = config.max_size.max(1);
    let mut window: Vec<Job> = Vec::with_capacity(max_size);
    let mut flushed = 0u64;

    // Idle: wait for the first job of the next window.
    while let Some(first) = rx.recv().await {
        window.push(first);
        let deadline = Instant::now() + config.max_wait;

        // Accumulating
        while window.len() < max_size {
            tokio::select! {
                job = rx.recv() => match job {
                    Some(job) => window.push(job),
                    None => break,
                },
                _ = time::sleep_until(deadline) => break,
            }
        }

        // Flushing
        flushed += 1;
        debug!(window = flushed, size = window.len(), "flushing batch window");
        flush_window(&prober, window.drain(..)).await;
    }
    debug!(windows = flushed, "batch scheduler stopped");
}

async fn flush_window(prober: &Prober, jobs: impl Iterator<Item = Job>) {
    let mut set = JoinSet::new();
    for job in jobs {
        let prober = prober.clone();
        set.spawn(async move {
            let result = prober.probe(&job.address).await;
            // Submitter may have dropped its handle.
            let _ = job.reply.send(result);
        });
    }
    while let Some(res) = set.join_next().await {
        if let Err(e) = res {
            warn!(error = %e, "probe task failed");
        }
    }
}

/// Progress counters shared with observers while a scan runs.
#[derive(Clone, Debug)]
pub struct ScanProgress {
    pub total: Arc<AtomicU64>,
    pub done: Arc<AtomicU64>,
    pub online: Arc<AtomicU64>,
    pub entries: Arc<Mutex<Vec<EndpointCheck>>>,
}

impl ScanProgress {
    pub fn new() -> Self {
        Self {
            total: Arc::new(AtomicU64::new(0)),
            done: Arc::new(AtomicU64::new(0)),
            online: Arc::new(AtomicU64::new(0)),
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Submit every endpoint up front and collect results in completion order.
///
/// Each entry carries the endpoint id; order says nothing about submission order.
pub async fn scan_endpoints(
    scheduler: &BatchScheduler,
    endpoints: &[Endpoint],
    progress: ScanProgress,
) -> Result<ScanReport> {
    let total = endpoints.len() as u64;
    progress.total.store(total, Ordering::Relaxed);
    info!(total, "starting scan");

    let mut set = JoinSet::new();
    for endpoint in endpoints {
        let pending = scheduler.submit(endpoint.url.clone());
        let id = endpoint.id.clone();
        let progress = progress.clone();
        set.spawn(async move {
            let result = pending.await?;
            if result.reachable {
                progress.online.fetch_add(1, Ordering::Relaxed);
            }
            progress
                .entries
                .lock()
                .await
                .push(EndpointCheck { id, result });
            progress.done.fetch_add(1, Ordering::Relaxed);
            anyhow::Ok(())
        });
    }

    while let Some(res) = set.join_next().await {
        res??;
    }

    let entries = progress.entries.lock().await.clone();
    let done = progress.done.load(Ordering::Relaxed);
    let online = progress.online.load(Ordering::Relaxed);
    info!(total, online, offline = done - online, "scan finished");

    Ok(ScanReport {
        total,
        done,
        online,
        offline: done - online,
        avg_latency_ms: ScanReport::average_online_latency(&entries),
        entries,
    })
}
