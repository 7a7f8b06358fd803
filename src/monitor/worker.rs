//! Background sampling worker.
//!
//! One named thread drives a current-thread tokio runtime. Each tick reads
//! the latest component metrics from a `watch` channel, samples host stats
//! and sends a snapshot over a bounded `mpsc` channel. Samples taken while
//! the channel is full are dropped. A `oneshot` stops the loop.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;

use super::host::{HostSampler, HostStats};
use super::metric::{ComponentMetrics, PerformanceSnapshot};

pub(crate) const THREAD_NAME: &str = "theme-monitor";

/// Handle to the sampling thread. Dropping it stops and joins the thread.
#[derive(Debug)]
pub(crate) struct Worker {
    handle: Option<JoinHandle<()>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Worker {
    pub(crate) fn spawn(
        interval: Duration,
        system_stats: bool,
        metrics: watch::Receiver<ComponentMetrics>,
        snapshots: mpsc::Sender<PerformanceSnapshot>,
    ) -> io::Result<Self> {
        let (shutdown, stop_rx) = oneshot::channel();
        let handle = thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn(move || run(interval, system_stats, metrics, snapshots, stop_rx))?;
        Ok(Self {
            handle: Some(handle),
            shutdown: Some(shutdown),
        })
    }

    pub(crate) fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the loop and wait for the thread. Idempotent.
    pub(crate) fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("monitor worker panicked");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    interval: Duration,
    system_stats: bool,
    metrics: watch::Receiver<ComponentMetrics>,
    snapshots: mpsc::Sender<PerformanceSnapshot>,
    mut stop: oneshot::Receiver<()>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(rt) => rt,
        Err(err) => {
            tracing::error!(error = %err, "failed to build monitor runtime");
            return;
        }
    };

    runtime.block_on(async move {
        let mut sampler = HostSampler::default();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::debug!(interval_ms = interval.as_millis() as u64, "monitor worker started");
        loop {
            tokio::select! {
                // A dropped sender also ends the loop.
                _ = &mut stop => break,
                _ = ticker.tick() => {
                    let host = if system_stats { sampler.sample() } else { HostStats::default() };
                    let components = metrics.borrow().clone();
                    let snapshot = PerformanceSnapshot::capture(&components, host);
                    match snapshots.try_send(snapshot) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            tracing::trace!("snapshot queue full; dropping sample");
                        }
                        Err(TrySendError::Closed(_)) => break,
                    }
                }
            }
        }
        tracing::debug!("monitor worker stopped");
    });
}
