//! Driving producers.
//!
//! [`run_fetch`] runs one producer's `fetch_blocks` against its own bounded
//! queue and forwards every record to a shared sink. [`fetch_all`] does the
//! same for every instance of a registry concurrently, one task per instance.
//! Scheduling (when to call these) is left to the caller.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::FetchError;
use crate::producer::{ProducerRef, RecordSender};
use crate::registry::Registry;

/// Knobs for a fetch run.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Capacity of each instance's queue. A full queue blocks the producer.
    pub queue_capacity: usize,
    /// Cancel an instance's fetch after this long.
    pub timeout: Option<Duration>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            timeout: None,
        }
    }
}

/// Result of one instance's fetch.
#[derive(Debug)]
pub struct FetchOutcome {
    pub name: String,
    pub kind: String,
    /// Records forwarded to the sink, including those sent before a failure.
    pub records: usize,
    pub result: Result<(), FetchError>,
    pub elapsed: Duration,
}

impl FetchOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Fetch from one producer, forwarding records into `sink`.
///
/// If `sink` is closed the forwarding loop stops, which closes this
/// instance's queue and ends the fetch with [`FetchError::QueueClosed`].
pub async fn run_fetch(
    producer: ProducerRef,
    cancel: &CancellationToken,
    options: &FetchOptions,
    sink: RecordSender,
) -> FetchOutcome {
    let started = std::time::Instant::now();
    let token = cancel.child_token();
    let (tx, mut rx) = mpsc::channel(options.queue_capacity.max(1));

    let fetch = {
        let producer = producer.clone();
        let token = token.clone();
        async move {
            // `tx` is dropped when the fetch returns, which ends the forwarder.
            producer.fetch_blocks(&token, &tx).await
        }
    };
    let forward = async move {
        let mut forwarded = 0usize;
        while let Some(record) = rx.recv().await {
            if sink.send(record).await.is_err() {
                break;
            }
            forwarded += 1;
        }
        forwarded
    };

    let drive = async { tokio::join!(fetch, forward) };
    tokio::pin!(drive);

    let (result, records) = match options.timeout {
        Some(limit) => tokio::select! {
            out = &mut drive => out,
            _ = tokio::time::sleep(limit) => {
                warn!(name = %producer.name(), ?limit, "fetch timed out, cancelling");
                token.cancel();
                drive.await
            }
        },
        None => drive.await,
    };

    let outcome = FetchOutcome {
        name: producer.name().to_string(),
        kind: producer.kind().to_string(),
        records,
        result,
        elapsed: started.elapsed(),
    };

    match &outcome.result {
        Ok(()) => info!(
            name = %outcome.name,
            kind = %outcome.kind,
            records = outcome.records,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "fetch complete"
        ),
        Err(e) if e.is_cancelled() => info!(
            name = %outcome.name,
            records = outcome.records,
            "fetch cancelled"
        ),
        Err(e) => warn!(
            name = %outcome.name,
            kind = %outcome.kind,
            records = outcome.records,
            error = %e,
            "fetch failed"
        ),
    }
    outcome
}

/// Fetch every live instance of `registry` concurrently into `sink`.
///
/// Outcomes are returned sorted by instance name. One failing instance does
/// not affect the others.
pub async fn fetch_all(
    registry: &Registry,
    cancel: &CancellationToken,
    options: &FetchOptions,
    sink: RecordSender,
) -> Vec<FetchOutcome> {
    let mut tasks = JoinSet::new();
    for (_, producer) in registry.instances() {
        let cancel = cancel.clone();
        let options = options.clone();
        let sink = sink.clone();
        tasks.spawn(async move { run_fetch(producer, &cancel, &options, sink).await });
    }
    drop(sink);

    let mut outcomes = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => warn!(error = %e, "fetch task panicked"),
        }
    }
    outcomes.sort_by(|a, b| a.name.cmp(&b.name));
    outcomes
}
