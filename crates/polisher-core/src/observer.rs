//! Mutation observer bridge and rescan scheduling.
//!
//! Host mutations and a fixed-interval ticker both produce [`RescanReason`]
//! signals. A single [`RescanScheduler`] task consumes them: mutation bursts
//! are debounced on the trailing edge (bounded by a maximum delay so a page
//! that never goes quiet still gets scanned), while periodic and manual
//! signals scan at once.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use polisher_config::TimingConfig;
use polisher_protocols::{HostDocument, MutationRecord, NodeId};

/// Why a rescan was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescanReason {
    Mutation,
    Periodic,
    Manual,
}

/// Forwards relevant host mutations as rescan signals.
pub struct MutationBridge;

impl MutationBridge {
    /// Subscribe to `doc` and forward until cancelled.
    ///
    /// The subscription is taken before this returns, so no mutation made
    /// after `start` is missed.
    pub fn start(
        doc: Arc<dyn HostDocument>,
        root: NodeId,
        signals: mpsc::UnboundedSender<RescanReason>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let mut mutations = doc.subscribe();
        tokio::spawn(async move {
            loop {
                let record = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    record = mutations.recv() => record,
                };
                let forward = match record {
                    Ok(record) => Self::is_relevant(doc.as_ref(), root, &record),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Mutation observer lagged, requesting a rescan");
                        true
                    }
                    Err(RecvError::Closed) => break,
                };
                if forward && signals.send(RescanReason::Mutation).is_err() {
                    break;
                }
            }
            debug!("Mutation bridge stopped");
        })
    }

    /// Whether a record adds at least one node of the host's own inside
    /// `root`. Our own insertions, and removals, are not.
    pub fn is_relevant(doc: &dyn HostDocument, root: NodeId, record: &MutationRecord) -> bool {
        let relevant = record.added.iter().any(|node| {
            !doc.is_owned(*node) && (*node == root || doc.ancestors(*node).contains(&root))
        });
        if !relevant {
            trace!(target_node = %record.target, "Ignoring mutation");
        }
        relevant
    }
}

/// Fixed-interval fallback for mutations the observer cannot see.
pub struct PeriodicRescan;

impl PeriodicRescan {
    pub fn start(
        interval: Duration,
        signals: mpsc::UnboundedSender<RescanReason>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if signals.send(RescanReason::Periodic).is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("Periodic rescan stopped");
        })
    }
}

/// Coalesces rescan signals into scans.
#[derive(Debug, Clone, Copy)]
pub struct RescanScheduler {
    debounce: Duration,
    max_delay: Duration,
}

impl RescanScheduler {
    pub fn new(debounce: Duration, max_delay: Duration) -> Self {
        Self {
            debounce,
            max_delay: max_delay.max(debounce),
        }
    }

    pub fn from_timing(timing: &TimingConfig) -> Self {
        Self::new(timing.debounce(), timing.max_debounce())
    }

    /// Run `scan` for every coalesced signal until cancelled or every
    /// sender is gone. Scans never overlap.
    pub fn spawn<F>(
        self,
        mut signals: mpsc::UnboundedReceiver<RescanReason>,
        cancel: CancellationToken,
        mut scan: F,
    ) -> JoinHandle<()>
    where
        F: FnMut(RescanReason) + Send + 'static,
    {
        tokio::spawn(async move {
            // Trailing-edge deadline and the start of the current burst.
            let mut pending: Option<(Instant, Instant)> = None;
            loop {
                let deadline = pending.map(|(deadline, _)| deadline);
                let due = async move {
                    match deadline {
                        Some(deadline) => tokio::time::sleep_until(deadline).await,
                        None => std::future::pending().await,
                    }
                };

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = due => {
                        pending = None;
                        scan(RescanReason::Mutation);
                    }
                    signal = signals.recv() => match signal {
                        Some(RescanReason::Mutation) => {
                            let now = Instant::now();
                            let burst_start = pending.map(|(_, start)| start).unwrap_or(now);
                            let deadline = (now + self.debounce).min(burst_start + self.max_delay);
                            pending = Some((deadline, burst_start));
                        }
                        Some(reason) => {
                            pending = None;
                            scan(reason);
                        }
                        None => break,
                    },
                }
            }
            debug!("Rescan scheduler stopped");
        })
    }
}

#[cfg(test)]
#[path = "observer_tests.rs"]
mod tests;
