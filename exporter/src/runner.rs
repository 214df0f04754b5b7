//! Refresh loop driving collection passes at a fixed interval.
//!
//! Passes never overlap: the loop awaits the outcome of pass N before
//! scheduling pass N+1, and pass N+1 starts no earlier than `refresh` after
//! the start of pass N. A failed pass is logged and counted under its error
//! kind, and the loop carries on. The loop ends only when the shutdown
//! future resolves.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::collector::Collector;
use crate::error::ExporterError;
use crate::metrics::MetricsRegistry;
use crate::rpc::Connector;

/// Kind recorded when a pass panics instead of returning an error.
pub const PANIC_KIND: &str = "panic";

/// A unit of blocking work executed once per refresh interval.
pub trait Pass: Send + Sync + 'static {
    fn run_once(&self) -> Result<(), ExporterError>;
}

impl<C> Pass for Collector<C>
where
    C: Connector + 'static,
{
    fn run_once(&self) -> Result<(), ExporterError> {
        Collector::run_once(self)
    }
}

/// Outcome of one pass as seen by the loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    Ok,
    /// Error kind recorded on the error counter.
    Failed(&'static str),
}

pub struct Runner<P: Pass> {
    pass: Arc<P>,
    metrics: Arc<MetricsRegistry>,
    refresh: Duration,
}

impl<P: Pass> Runner<P> {
    pub fn new(pass: P, metrics: Arc<MetricsRegistry>, refresh: Duration) -> Self {
        Self {
            pass: Arc::new(pass),
            metrics,
            refresh,
        }
    }

    /// Runs one pass on the blocking pool and records its outcome and
    /// duration.
    pub async fn run_pass(&self) -> PassOutcome {
        let started = Instant::now();
        let pass = self.pass.clone();
        let joined = tokio::task::spawn_blocking(move || pass.run_once()).await;

        let outcome = match joined {
            Ok(Ok(())) => PassOutcome::Ok,
            Ok(Err(err)) => {
                tracing::error!(kind = err.kind(), "collection pass failed: {err:?}");
                PassOutcome::Failed(err.kind())
            }
            Err(join_err) => {
                tracing::error!("collection pass panicked: {join_err}");
                PassOutcome::Failed(PANIC_KIND)
            }
        };
        if let PassOutcome::Failed(kind) = outcome {
            self.metrics.record_error(kind);
        }

        let elapsed = started.elapsed();
        self.metrics
            .exporter
            .process_time
            .inc_by(elapsed.as_secs_f64());
        tracing::info!("Refresh took {} seconds", elapsed.as_secs_f64());

        outcome
    }

    /// Runs passes until `shutdown` resolves.
    ///
    /// The first pass starts immediately. Between passes the loop sleeps
    /// until `refresh` has elapsed since the previous pass started; a pass
    /// that overruns the interval is followed by the next one right away.
    pub async fn run<S>(&self, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut next_start = Instant::now();

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("refresh loop stopping");
                    return;
                }
                _ = tokio::time::sleep_until(next_start) => {}
            }

            let started = Instant::now();
            self.run_pass().await;
            next_start = started + self.refresh;
        }
    }
}
