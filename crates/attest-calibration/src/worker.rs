//! Background worker for periodic recalibration

use crate::{CalibrationConfig, CalibrationEngine, CalibrationError};
use attest_domain::EvidenceStorage;
use attest_ledger::EvidenceLedger;
use chrono::Utc;
use std::fmt::Display;
use tokio::time::{interval, Duration};

/// Background worker that recomputes calibration on a schedule
///
/// Each tick reads the ledger's outcome entries and, if any arrived since
/// the previous tick, publishes a new snapshot.
///
/// # Examples
///
/// ```no_run
/// use attest_calibration::{CalibrationConfig, CalibrationWorker};
/// use attest_ledger::{EvidenceLedger, SqliteStorage};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let ledger = EvidenceLedger::new(SqliteStorage::new("attest.db")?)?;
///     let mut worker = CalibrationWorker::new(CalibrationConfig::default());
///
///     // Run until Ctrl+C
///     worker.run(&ledger).await?;
///     Ok(())
/// }
/// ```
pub struct CalibrationWorker {
    engine: CalibrationEngine,
    interval: Duration,
}

impl CalibrationWorker {
    /// Create a worker with the given configuration
    pub fn new(config: CalibrationConfig) -> Self {
        let interval = config.recompute_interval();
        Self::with_engine(CalibrationEngine::new(config), interval)
    }

    /// Create a worker around an existing engine
    pub fn with_engine(engine: CalibrationEngine, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// The engine the worker drives
    pub fn engine(&self) -> &CalibrationEngine {
        &self.engine
    }

    /// Run until a shutdown signal (Ctrl+C) is received
    ///
    /// A failed recomputation is logged and retried on the next tick.
    pub async fn run<S>(&mut self, ledger: &EvidenceLedger<S>) -> Result<(), CalibrationError>
    where
        S: EvidenceStorage,
        S::Error: Display,
    {
        let mut ticker = interval(self.interval);
        tracing::info!("Calibration worker started (interval: {:?})", self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.engine.recompute_from_ledger(ledger, Utc::now()) {
                        tracing::error!("Calibration recompute failed: {}", e);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutdown signal received, stopping calibration worker");
                    break;
                }
            }
        }

        tracing::info!(
            "Calibration worker stopped at snapshot version {}",
            self.engine.snapshot().version
        );
        Ok(())
    }

    /// Run a fixed number of ticks, stopping at the first failure
    pub async fn run_cycles<S>(
        &mut self,
        ledger: &EvidenceLedger<S>,
        cycles: usize,
    ) -> Result<usize, CalibrationError>
    where
        S: EvidenceStorage,
        S::Error: Display,
    {
        let mut ticker = interval(self.interval);
        let mut published = 0;

        for cycle in 0..cycles {
            ticker.tick().await;
            tracing::debug!("Calibration cycle {}/{}", cycle + 1, cycles);

            match self.engine.recompute_from_ledger(ledger, Utc::now()) {
                Ok(Some(_)) => published += 1,
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Calibration cycle {}/{} failed: {}", cycle + 1, cycles, e);
                    return Err(e);
                }
            }
        }

        tracing::info!(
            "Calibration worker finished {} cycles, {} snapshots published",
            cycles,
            published
        );
        Ok(published)
    }
}
