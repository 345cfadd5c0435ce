//! Poll cycles over all configured pairs

use std::future::Future;
use std::time::Duration;

use super::PairReconciler;
use crate::config::{MirrorConfig, PairSpec};
use crate::error::MirrorError;
use crate::remote::RemoteStore;
use crate::types::CycleReport;

/// Runs every pair once per cycle, then sleeps.
///
/// Holds only immutable configuration. Each cycle builds its pairs from
/// scratch, so a failed cycle leaves nothing behind and the next cycle is
/// the retry.
#[derive(Debug, Clone)]
pub struct PollScheduler {
    pairs: Vec<PairSpec>,
    interval: Duration,
}

impl PollScheduler {
    pub fn new(pairs: Vec<PairSpec>, interval: Duration) -> Self {
        Self { pairs, interval }
    }

    pub fn from_config(config: &MirrorConfig) -> Self {
        Self::new(config.pairs.clone(), config.interval)
    }

    pub fn pairs(&self) -> &[PairSpec] {
        &self.pairs
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Reconcile every pair in order. A failing pair is logged and skipped.
    pub async fn run_cycle(&self, store: &dyn RemoteStore) -> CycleReport {
        let reconciler = PairReconciler::new(store);
        let mut report = CycleReport::default();

        for spec in &self.pairs {
            let pair = spec.to_pair();
            match reconciler.sync(&pair).await {
                Ok(outcome) => {
                    tracing::debug!(pair = %pair, outcome = %outcome, "Pair reconciled");
                    report.record(outcome);
                }
                Err(e @ MirrorError::MalformedMetadata { .. }) => {
                    tracing::error!(
                        pair = %pair,
                        backend = store.name(),
                        kind = e.kind(),
                        "Remote returned malformed metadata, skipping pair: {}",
                        e
                    );
                    report.record_failure();
                }
                Err(e) => {
                    tracing::warn!(
                        pair = %pair,
                        kind = e.kind(),
                        retryable = e.is_retryable(),
                        "Sync failed, skipping pair this cycle: {}",
                        e
                    );
                    report.record_failure();
                }
            }
        }

        report
    }

    /// Cycle until `shutdown` resolves.
    ///
    /// `shutdown` is only observed between cycles: a transfer in flight
    /// always runs to completion. The sleep starts after a cycle's work
    /// ends, so the period is work time plus interval. Returns the number
    /// of cycles run.
    pub async fn run_until<F>(&self, store: &dyn RemoteStore, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut cycles = 0u64;

        loop {
            let report = self.run_cycle(store).await;
            cycles += 1;

            tracing::info!(
                uploaded = report.uploaded,
                downloaded = report.downloaded,
                unchanged = report.unchanged,
                failed = report.failed,
                "Sync done, waiting {} seconds",
                self.interval.as_secs()
            );

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping after {} cycles", cycles);
                    return cycles;
                }
            }
        }
    }

    /// Cycle forever
    pub async fn run_forever(&self, store: &dyn RemoteStore) {
        self.run_until(store, std::future::pending::<()>()).await;
    }
}
