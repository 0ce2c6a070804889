//! Polling scheduler and bounded fan-out executor.
//!
//! The scheduler drives an unbounded fixed-interval loop. Each tick it lists
//! the arrays, hands them to the fan-out executor, measures the wall-clock
//! cost of the tick, and sleeps for the remainder of the interval. When
//! collection takes longer than the interval it logs a warning and sleeps for
//! the elapsed time instead, degrading to back-to-back execution rather than
//! stacking work.
//!
//! The fan-out executor runs the three collector kinds as strictly sequential
//! phases per tick (metrics, then failures, then event log) to bound peak
//! concurrent load on the proxy. Within a phase, arrays fan out concurrently
//! up to the worker pool size; each task catches and logs its own failure so
//! one array can never abort or block another.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::collect::{events, failures, metrics, CollectionContext};
use crate::point::StorageArray;

/// The three collection task kinds, in phase order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectorKind {
    /// Disk/system/volume performance counters.
    SystemMetrics,
    /// Failure-state deduplication.
    FailureState,
    /// Event-log synchronization.
    EventLog,
}

impl CollectorKind {
    /// Phase execution order within a tick.
    pub const PHASE_ORDER: [CollectorKind; 3] = [
        CollectorKind::SystemMetrics,
        CollectorKind::FailureState,
        CollectorKind::EventLog,
    ];

    /// Stable name for log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectorKind::SystemMetrics => "system_metrics",
            CollectorKind::FailureState => "failure_state",
            CollectorKind::EventLog => "event_log",
        }
    }
}

impl std::fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounded worker pool running one task per (array, collector kind) pair.
pub struct FanOutExecutor {
    workers: usize,
}

impl FanOutExecutor {
    /// Build an executor with a fixed pool size.
    pub fn new(workers: usize) -> Self {
        Self { workers }
    }

    /// Run one full tick: all three phases, each awaited to completion before
    /// the next begins.
    pub async fn run_tick(&self, ctx: &CollectionContext, arrays: &[StorageArray]) {
        for kind in CollectorKind::PHASE_ORDER {
            self.run_phase(ctx, arrays, kind).await;
        }
    }

    /// Run one phase across all arrays with bounded concurrency, waiting for
    /// every submitted task regardless of individual success or failure.
    async fn run_phase(&self, ctx: &CollectionContext, arrays: &[StorageArray], kind: CollectorKind) {
        stream::iter(arrays)
            .for_each_concurrent(self.workers, |array| async move {
                let outcome = match kind {
                    CollectorKind::SystemMetrics => metrics::collect(ctx, array).await,
                    CollectorKind::FailureState => failures::collect(ctx, array).await,
                    CollectorKind::EventLog => events::collect(ctx, array).await,
                };
                if let Err(err) = outcome {
                    error!(
                        array = %array.display_name(),
                        array_id = %array.id,
                        collector = %kind,
                        %err,
                        "collection task failed; will retry on the next tick"
                    );
                }
            })
            .await;
    }
}

/// Compute the sleep before the next tick.
///
/// Returns the delay and whether the tick overran the interval. An overrun
/// sleeps for the elapsed time itself, so there is never a negative sleep and
/// work never stacks.
pub fn tick_delay(interval: Duration, elapsed: Duration) -> (Duration, bool) {
    if elapsed >= interval {
        (elapsed, true)
    } else {
        (interval - elapsed, false)
    }
}

/// Fixed-interval polling loop.
pub struct Scheduler {
    ctx: CollectionContext,
    executor: FanOutExecutor,
    interval: Duration,
}

impl Scheduler {
    /// Build a scheduler from the collection context; pool size and interval
    /// come from its configuration.
    pub fn new(ctx: CollectionContext) -> Self {
        let interval = ctx.config.interval();
        let executor = FanOutExecutor::new(ctx.config.collector.workers);
        Self {
            ctx,
            executor,
            interval,
        }
    }

    /// Run the polling loop forever.
    ///
    /// This is the process's only top-level control flow: no iteration is
    /// skipped, there is no maximum iteration count, and task errors never
    /// propagate here. The loop ends only when the process is terminated.
    pub async fn run(&self) {
        let mut iteration: u64 = 1;
        loop {
            let started = Instant::now();
            self.tick().await;
            let elapsed = started.elapsed();

            let (delay, overran) = tick_delay(self.interval, elapsed);
            if overran {
                warn!(
                    elapsed_secs = elapsed.as_secs_f64(),
                    interval_secs = self.interval.as_secs_f64(),
                    "the configured interval is not long enough for one collection pass"
                );
            }
            if self.ctx.config.logging.show_iteration {
                info!(
                    iteration,
                    interval_secs = self.interval.as_secs_f64(),
                    elapsed_secs = elapsed.as_secs_f64(),
                    "tick complete"
                );
                iteration += 1;
            }

            tokio::time::sleep(delay).await;
        }
    }

    /// Run a single tick: discover arrays and fan the collectors out.
    pub async fn tick(&self) {
        match self.ctx.proxy.list_arrays().await {
            Ok(arrays) => {
                info!(count = arrays.len(), "discovered storage arrays");
                if self.ctx.config.logging.show_array_names {
                    for array in &arrays {
                        info!(array = %array.display_name(), id = %array.id, "storage array");
                    }
                }
                self.executor.run_tick(&self.ctx, &arrays).await;
            }
            Err(err) => {
                warn!(%err, "unable to retrieve the storage-array list; skipping this tick");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_interval_is_slept_when_tick_is_fast() {
        let (delay, overran) = tick_delay(Duration::from_secs(5), Duration::from_secs(3));
        assert_eq!(delay, Duration::from_secs(2));
        assert!(!overran);
    }

    #[test]
    fn overrun_sleeps_for_the_elapsed_time() {
        let (delay, overran) = tick_delay(Duration::from_secs(5), Duration::from_secs(7));
        assert_eq!(delay, Duration::from_secs(7));
        assert!(overran);
    }

    #[test]
    fn exact_boundary_counts_as_overrun() {
        let (delay, overran) = tick_delay(Duration::from_secs(5), Duration::from_secs(5));
        assert_eq!(delay, Duration::from_secs(5));
        assert!(overran);
    }

    #[test]
    fn phase_order_is_metrics_then_failures_then_events() {
        assert_eq!(
            CollectorKind::PHASE_ORDER,
            [
                CollectorKind::SystemMetrics,
                CollectorKind::FailureState,
                CollectorKind::EventLog,
            ]
        );
    }
}
