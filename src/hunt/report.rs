//! Batch driver and the final report.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::locator::{FailureReason, FailureRecord, LocateOutcome, Locator};
use crate::oracle::{LineChannel, Oracle};
use crate::position::Position;
use crate::protocol::ProtocolSettings;

/// Overall verdict of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HuntStatus {
    /// Every position resolved.
    Passed,
    /// At least one position was pinned as a failure.
    Failed,
    /// An engine became unreachable before the batch finished.
    Aborted,
}

/// Result of running the locator over a batch of starting positions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HuntReport {
    pub depth: u32,
    /// Positions the locator finished (resolved or failed).
    pub checked: usize,
    pub resolved: usize,
    /// In input order.
    pub failures: Vec<FailureRecord>,
    /// Set when an engine became unreachable; later positions were skipped.
    pub aborted: Option<String>,
}

impl HuntReport {
    pub fn new(depth: u32) -> Self {
        Self {
            depth,
            ..Self::default()
        }
    }

    pub fn passed(&self) -> bool {
        self.status() == HuntStatus::Passed
    }

    /// An abort outranks any failures gathered before it.
    pub fn status(&self) -> HuntStatus {
        if self.aborted.is_some() {
            HuntStatus::Aborted
        } else if self.failures.is_empty() {
            HuntStatus::Passed
        } else {
            HuntStatus::Failed
        }
    }

    /// `(protocol faults, set disagreements, exhausted depth)`.
    pub fn counts_by_kind(&self) -> (usize, usize, usize) {
        self.failures.iter().fold((0, 0, 0), |(p, s, e), f| match f.reason {
            FailureReason::ProtocolFault { .. } => (p + 1, s, e),
            FailureReason::SetDisagreement { .. } => (p, s + 1, e),
            FailureReason::ExhaustedDepth { .. } => (p, s, e + 1),
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for HuntReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "==== FINAL REPORT ====")?;
        let (faults, sets, exhausted) = self.counts_by_kind();
        writeln!(
            f,
            "depth {}: {}/{} positions agree; {} set disagreements, {} exhausted, {} protocol faults",
            self.depth,
            self.resolved,
            self.checked,
            sets,
            exhausted,
            faults
        )?;
        if let Some(reason) = &self.aborted {
            writeln!(f, "ABORTED: {reason}")?;
        }
        if self.failures.is_empty() {
            return Ok(());
        }
        writeln!(f, "Positions to fix:")?;
        for failure in &self.failures {
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

/// Runs the locator over `positions` in order and collects every failure.
pub fn run<R: LineChannel, T: LineChannel>(
    reference: &mut Oracle<R>,
    under_test: &mut Oracle<T>,
    settings: &ProtocolSettings,
    positions: &[Position],
    depth: u32,
) -> HuntReport {
    run_with_observer(reference, under_test, settings, positions, depth, |_, _, _| {})
}

/// Like [`run`], calling `observer(index, position, outcome)` after each
/// position.
///
/// Disagreements never stop the batch. An engine that can no longer be
/// reached does: the report keeps what was gathered and records why it
/// stopped.
pub fn run_with_observer<R, T, F>(
    reference: &mut Oracle<R>,
    under_test: &mut Oracle<T>,
    settings: &ProtocolSettings,
    positions: &[Position],
    depth: u32,
    mut observer: F,
) -> HuntReport
where
    R: LineChannel,
    T: LineChannel,
    F: FnMut(usize, &Position, &LocateOutcome),
{
    let mut report = HuntReport::new(depth);
    let mut locator = Locator::new(reference, under_test, settings);

    for (idx, position) in positions.iter().enumerate() {
        let outcome = match locator.locate(position, depth) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(%position, error = %e, "aborting batch");
                report.aborted = Some(format!("{position}: {e}"));
                break;
            }
        };
        observer(idx, position, &outcome);

        report.checked += 1;
        match outcome.into_failure() {
            Some(failure) => report.failures.push(failure),
            None => report.resolved += 1,
        }
    }

    info!(
        checked = report.checked,
        resolved = report.resolved,
        failed = report.failures.len(),
        "batch finished"
    );
    report
}
