//! Closed-loop load driver.
//!
//! Spawns one task per client. Each task obtains its own requester, sets it
//! up, issues calls back to back until its quota is met or the run is
//! cancelled, and tears the requester down. Per-call failures are counted,
//! never retried; a requester that cannot be built aborts the run.

use crate::client::telemetry::{
    increment_request_errors, increment_requesters_created, increment_requests,
    record_request_duration,
};
use futures::stream::{FuturesUnordered, StreamExt};
use labench_grpc_core::{Requester, RequesterFactory};
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Counters shared by every worker in a run.
#[derive(Debug, Default)]
struct RunCounters {
    requests: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug)]
pub struct RunSummary {
    pub clients: usize,
    pub requests: u64,
    pub errors: u64,
    pub duration: Duration,
    /// Sorted latencies of successful calls.
    latencies: Vec<Duration>,
}

impl RunSummary {
    pub fn throughput(&self) -> f64 {
        self.requests as f64 / self.duration.as_secs_f64()
    }

    /// Latency at percentile `p` (0-100) of successful calls.
    pub fn percentile(&self, p: f64) -> Option<Duration> {
        if self.latencies.is_empty() {
            return None;
        }
        let rank = (p.clamp(0.0, 100.0) / 100.0) * (self.latencies.len() - 1) as f64;
        self.latencies.get(rank.round() as usize).copied()
    }

    pub fn report(&self) {
        let ms = |d: Option<Duration>| d.map_or(0.0, |d| d.as_secs_f64() * 1000.0);

        println!("\n=== Run Summary ===");
        println!(
            "{:<10} | {:>10} | {:>8} | {:>10} | {:>15} | {:>8} | {:>8} | {:>8}",
            "Clients", "Requests", "Errors", "Time (ms)", "Throughput (/s)", "p50 ms", "p90 ms", "p99 ms"
        );
        println!("{}", "-".repeat(99));
        println!(
            "{:<10} | {:>10} | {:>8} | {:>10.2} | {:>15.2} | {:>8.2} | {:>8.2} | {:>8.2}",
            self.clients,
            self.requests,
            self.errors,
            self.duration.as_secs_f64() * 1000.0,
            self.throughput(),
            ms(self.percentile(50.0)),
            ms(self.percentile(90.0)),
            ms(self.percentile(99.0)),
        );
    }
}

/// Runs `clients` workers against `factory`, `requests` calls each.
pub async fn run<F>(
    factory: Arc<F>,
    clients: usize,
    requests: u64,
    shutdown: CancellationToken,
) -> anyhow::Result<RunSummary>
where
    F: RequesterFactory + 'static,
{
    let counters = Arc::new(RunCounters::default());
    let start = Instant::now();

    let mut tasks = FuturesUnordered::new();
    for worker in 0..clients as u64 {
        let factory = Arc::clone(&factory);
        let counters = Arc::clone(&counters);
        let shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            run_worker(&*factory, worker, requests, &counters, &shutdown).await
        }));
    }

    let mut latencies = Vec::new();
    while let Some(joined) = tasks.next().await {
        match joined? {
            Ok(mut worker_latencies) => latencies.append(&mut worker_latencies),
            Err(e) => {
                // Stop the remaining workers before surfacing the failure.
                shutdown.cancel();
                return Err(e.into());
            }
        }
    }
    latencies.sort_unstable();

    Ok(RunSummary {
        clients,
        requests: counters.requests.load(Ordering::Relaxed),
        errors: counters.errors.load(Ordering::Relaxed),
        duration: start.elapsed(),
        latencies,
    })
}

#[cfg_attr(feature = "tracing", tracing::instrument(skip(factory, counters, shutdown)))]
async fn run_worker<F: RequesterFactory>(
    factory: &F,
    worker: u64,
    requests: u64,
    counters: &RunCounters,
    shutdown: &CancellationToken,
) -> labench_grpc_core::Result<Vec<Duration>> {
    let mut requester = factory.get_requester(worker).await?;
    increment_requesters_created();
    requester.setup()?;

    let mut latencies = Vec::with_capacity(requests.min(1 << 16) as usize);
    for _ in 0..requests {
        let start = Instant::now();
        let result = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            result = requester.request() => result,
        };
        let elapsed = start.elapsed();

        counters.requests.fetch_add(1, Ordering::Relaxed);
        increment_requests();
        record_request_duration(elapsed.as_secs_f64() * 1000.0);

        match result {
            Ok(()) => latencies.push(elapsed),
            Err(_status) => {
                counters.errors.fetch_add(1, Ordering::Relaxed);
                increment_request_errors();
                #[cfg(feature = "tracing")]
                tracing::debug!(code = ?_status.code(), message = _status.message(), "Call failed");
            }
        }
    }

    requester.teardown()?;
    Ok(latencies)
}
