//! Counters accumulated across defeater sweeps

use attest_domain::{DefeaterType, ResolutionAction};
use std::collections::BTreeMap;

/// Metrics collected by the defeater engine
///
/// Tracks detections per defeater type, resolutions per action and the claim
/// status changes the engine made.
#[derive(Debug, Clone, Default)]
pub struct DefeaterMetrics {
    /// New defeaters registered, per type
    pub detected: BTreeMap<DefeaterType, usize>,

    /// Defeaters resolved, per action
    pub resolved: BTreeMap<&'static str, usize>,

    /// Claims moved to defeated or contradicted
    pub defeated: usize,

    /// Claims moved back to active
    pub reinstated: usize,

    /// Claims marked stale by propagation
    pub marked_stale: usize,

    /// Claims whose defeat state could not be decided
    pub unverified: usize,

    /// Sweeps that ran into the fixpoint cap
    pub fixpoint_exceeded: usize,

    /// Sweeps completed
    pub sweep_count: usize,

    /// Total sweep time in milliseconds
    pub total_runtime_ms: u64,
}

impl DefeaterMetrics {
    /// Create new empty metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly registered defeater
    pub fn record_detection(&mut self, defeater_type: DefeaterType) {
        *self.detected.entry(defeater_type).or_insert(0) += 1;
    }

    /// Record a resolution
    pub fn record_resolution(&mut self, action: ResolutionAction) {
        *self.resolved.entry(action.as_str()).or_insert(0) += 1;
    }

    /// Record claims that lost to a full defeater
    pub fn record_defeats(&mut self, count: usize) {
        self.defeated += count;
    }

    /// Record reinstated claims
    pub fn record_reinstatements(&mut self, count: usize) {
        self.reinstated += count;
    }

    /// Record claims marked stale
    pub fn record_stale(&mut self, count: usize) {
        self.marked_stale += count;
    }

    /// Record claims left unverified
    pub fn record_unverified(&mut self, count: usize) {
        self.unverified += count;
    }

    /// Record a completed sweep
    pub fn record_sweep(&mut self, runtime_ms: u64, fixpoint_exceeded: bool) {
        self.sweep_count += 1;
        self.total_runtime_ms += runtime_ms;
        if fixpoint_exceeded {
            self.fixpoint_exceeded += 1;
        }
    }

    /// Defeaters registered across all types
    pub fn total_detected(&self) -> usize {
        self.detected.values().sum()
    }

    /// Resolutions across all actions
    pub fn total_resolved(&self) -> usize {
        self.resolved.values().sum()
    }

    /// Reset all metrics
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Generate a summary report of metrics
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Defeater Metrics Summary".to_string(),
            "========================".to_string(),
            format!("Sweeps: {}", self.sweep_count),
            format!("Total runtime: {}ms", self.total_runtime_ms),
            format!("Claims defeated: {}", self.defeated),
            format!("Claims reinstated: {}", self.reinstated),
            format!("Claims marked stale: {}", self.marked_stale),
            format!("Claims unverified: {}", self.unverified),
            String::new(),
        ];

        if !self.detected.is_empty() {
            lines.push("Detections by type:".to_string());
            for (defeater_type, count) in &self.detected {
                lines.push(format!("  {}: {}", defeater_type, count));
            }
            lines.push(format!("  Total: {}", self.total_detected()));
            lines.push(String::new());
        }

        if !self.resolved.is_empty() {
            lines.push("Resolutions by action:".to_string());
            for (action, count) in &self.resolved {
                lines.push(format!("  {}: {}", action, count));
            }
            lines.push(format!("  Total: {}", self.total_resolved()));
        }

        if self.fixpoint_exceeded > 0 {
            lines.push(format!(
                "Sweeps that hit the fixpoint cap: {}",
                self.fixpoint_exceeded
            ));
        }

        lines.join("\n")
    }
}
