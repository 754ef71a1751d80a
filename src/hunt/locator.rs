use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::divide::{DivideDiff, join_set};
use crate::error::HuntError;
use crate::oracle::{LineChannel, Oracle, Role};
use crate::position::{PerftQuery, Position};
use crate::protocol::{PerftResult, ProtocolSettings, ReplyEnd, read_reply, send_query};

/// Verdict of comparing one pair of replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DivergenceOutcome {
    Resolved,
    /// The engines disagree on which moves exist.
    SetMismatch {
        missing: BTreeSet<String>,
        extra: BTreeSet<String>,
    },
    /// Same moves, different subtree sizes for `wrong`.
    CountMismatch { wrong: BTreeSet<String> },
}

pub fn compare(reference: &PerftResult, under_test: &PerftResult) -> DivergenceOutcome {
    let diff = DivideDiff::between(reference.counts(), under_test.counts());
    if !diff.sets_match() {
        return DivergenceOutcome::SetMismatch {
            missing: diff.missing,
            extra: diff.extra,
        };
    }
    if diff.counts.is_empty() {
        DivergenceOutcome::Resolved
    } else {
        DivergenceOutcome::CountMismatch {
            wrong: diff.counts.into_iter().map(|c| c.mv).collect(),
        }
    }
}

/// Why a starting position could not be reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// An engine's reply ended or stalled before the sentinel.
    ProtocolFault { oracle: Role, end: ReplyEnd },
    /// Move generation itself differs at the pinned query.
    SetDisagreement {
        missing: BTreeSet<String>,
        extra: BTreeSet<String>,
    },
    /// Counts differ at the pinned query but no single move could be
    /// blamed. `subtree_agrees` is set when one ply deeper both engines
    /// matched move by move, which points at aggregate counting rather than
    /// move legality.
    ExhaustedDepth {
        unresolved: BTreeSet<String>,
        subtree_agrees: bool,
    },
}

impl FailureReason {
    pub fn label(&self) -> &'static str {
        match self {
            FailureReason::ProtocolFault { .. } => "protocol-fault",
            FailureReason::SetDisagreement { .. } => "set-disagreement",
            FailureReason::ExhaustedDepth { .. } => "exhausted-depth",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ProtocolFault { oracle, end } => {
                let what = match end {
                    ReplyEnd::TimedOut => "timed out",
                    _ => "ended",
                };
                write!(f, "no reply: {oracle} engine output {what} before the sentinel")
            }
            FailureReason::SetDisagreement { missing, extra } => {
                write!(f, "Moves MISSING: {}\n\tMoves EXTRA: {}", join_set(missing), join_set(extra))
            }
            FailureReason::ExhaustedDepth {
                unresolved,
                subtree_agrees: true,
            } => write!(
                f,
                "count differs for {} but its subtree agrees move by move; check aggregate counting",
                join_set(unresolved)
            ),
            FailureReason::ExhaustedDepth { unresolved, .. } => {
                write!(f, "depth exhausted with counts still differing for {}", join_set(unresolved))
            }
        }
    }
}

/// One query/compare cycle, kept for the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BisectStep {
    pub query: PerftQuery,
    pub reference_nodes: u64,
    pub under_test_nodes: u64,
    /// Moves whose counts differed (empty on agreement or set mismatch).
    pub differing: BTreeSet<String>,
    /// The move appended to the prefix for the next step.
    pub chosen: Option<String>,
    /// `(role, reported, summed)` for engines whose total line disagreed
    /// with their own per-move lines.
    pub total_mismatches: Vec<(Role, u64, u64)>,
}

impl BisectStep {
    fn new(query: &PerftQuery, reference: &PerftResult, under_test: &PerftResult) -> Self {
        let total_mismatches = [(Role::Reference, reference), (Role::UnderTest, under_test)]
            .into_iter()
            .filter_map(|(role, r)| r.total_mismatch().map(|(rep, sum)| (role, rep, sum)))
            .collect();
        Self {
            query: query.clone(),
            reference_nodes: reference.total(),
            under_test_nodes: under_test.total(),
            differing: BTreeSet::new(),
            chosen: None,
            total_mismatches,
        }
    }
}

/// A starting position the engines could not be reconciled on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub start: Position,
    /// The query at which the disagreement was pinned down.
    pub pinned: PerftQuery,
    pub reason: FailureReason,
    pub trail: Vec<BisectStep>,
}

impl FailureRecord {
    /// Moves appended to `start` before the pinned query.
    pub fn prefix(&self) -> &[String] {
        &self.pinned.position().moves()[self.start.ply()..]
    }
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.pinned.position_command())?;
        writeln!(f, "{}", self.pinned.go_command())?;
        writeln!(f, "\t[{}] {}", self.reason.label(), self.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocateOutcome {
    /// Both engines agree on every move at the starting position.
    Resolved { trail: Vec<BisectStep> },
    Failed(FailureRecord),
}

impl LocateOutcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, LocateOutcome::Resolved { .. })
    }

    pub fn failure(&self) -> Option<&FailureRecord> {
        match self {
            LocateOutcome::Failed(record) => Some(record),
            LocateOutcome::Resolved { .. } => None,
        }
    }

    pub fn into_failure(self) -> Option<FailureRecord> {
        match self {
            LocateOutcome::Failed(record) => Some(record),
            LocateOutcome::Resolved { .. } => None,
        }
    }

    pub fn trail(&self) -> &[BisectStep] {
        match self {
            LocateOutcome::Resolved { trail } => trail,
            LocateOutcome::Failed(record) => &record.trail,
        }
    }
}

/// Drives both engines through the bisection for one starting position.
pub struct Locator<'a, R, T> {
    reference: &'a mut Oracle<R>,
    under_test: &'a mut Oracle<T>,
    settings: &'a ProtocolSettings,
}

impl<'a, R: LineChannel, T: LineChannel> Locator<'a, R, T> {
    pub fn new(
        reference: &'a mut Oracle<R>,
        under_test: &'a mut Oracle<T>,
        settings: &'a ProtocolSettings,
    ) -> Self {
        Self {
            reference,
            under_test,
            settings,
        }
    }

    /// Issues `query` to both engines, then collects both replies.
    fn exchange(&mut self, query: &PerftQuery) -> Result<(PerftResult, PerftResult), HuntError> {
        send_query(self.reference, query)?;
        send_query(self.under_test, query)?;

        let timeout = self.settings.budget.for_depth(query.depth());
        let reference = read_reply(self.reference, &self.settings.sentinel, timeout)?;
        let under_test = read_reply(self.under_test, &self.settings.sentinel, timeout)?;
        Ok((reference, under_test))
    }

    /// Narrows a disagreement at `start` down to the shortest move prefix
    /// that still shows it.
    ///
    /// Each step queries both engines at the current prefix and depth. Equal
    /// replies end the search; different move sets end it with a
    /// set disagreement; differing counts append one offending move and
    /// continue one ply deeper. Moves with differing counts are equally good
    /// evidence, so the choice among them is arbitrary; the
    /// lexicographically smallest is taken to keep runs reproducible.
    #[instrument(skip(self, start), fields(start = %start))]
    pub fn locate(&mut self, start: &Position, max_depth: u32) -> Result<LocateOutcome, HuntError> {
        let mut query = PerftQuery::new(start.clone(), max_depth)?;
        let mut trail: Vec<BisectStep> = Vec::new();
        // Query and differing moves of the previous step, if it recursed.
        let mut parent: Option<(PerftQuery, BTreeSet<String>)> = None;

        loop {
            debug!(cmd = %query.position_command(), depth = query.depth(), "bisect step");
            let (reference, under_test) = self.exchange(&query)?;
            let mut step = BisectStep::new(&query, &reference, &under_test);

            let fault = [(Role::Reference, &reference), (Role::UnderTest, &under_test)]
                .into_iter()
                .find(|(_, r)| !r.is_valid())
                .map(|(oracle, r)| FailureReason::ProtocolFault { oracle, end: r.end() });
            if let Some(reason) = fault {
                warn!(%reason, "protocol fault");
                trail.push(step);
                return Ok(failed(start, query, reason, trail));
            }

            match compare(&reference, &under_test) {
                DivergenceOutcome::Resolved => {
                    trail.push(step);
                    return Ok(match parent {
                        None => {
                            info!(depth = max_depth, "engines agree");
                            LocateOutcome::Resolved { trail }
                        }
                        Some((parent_query, unresolved)) => failed(
                            start,
                            parent_query,
                            FailureReason::ExhaustedDepth {
                                unresolved,
                                subtree_agrees: true,
                            },
                            trail,
                        ),
                    });
                }
                DivergenceOutcome::SetMismatch { missing, extra } => {
                    trail.push(step);
                    return Ok(failed(
                        start,
                        query,
                        FailureReason::SetDisagreement { missing, extra },
                        trail,
                    ));
                }
                DivergenceOutcome::CountMismatch { wrong } => {
                    step.differing = wrong.clone();
                    let chosen = wrong.first().filter(|_| query.depth() > 1).cloned();
                    let Some(chosen) = chosen else {
                        trail.push(step);
                        return Ok(failed(
                            start,
                            query,
                            FailureReason::ExhaustedDepth {
                                unresolved: wrong,
                                subtree_agrees: false,
                            },
                            trail,
                        ));
                    };
                    debug!(mv = %chosen, differing = wrong.len(), "descending");
                    step.chosen = Some(chosen.clone());
                    trail.push(step);

                    let next = PerftQuery::new(query.position().with_move(&chosen), query.depth() - 1)?;
                    parent = Some((query, wrong));
                    query = next;
                }
            }
        }
    }
}

fn failed(
    start: &Position,
    pinned: PerftQuery,
    reason: FailureReason,
    trail: Vec<BisectStep>,
) -> LocateOutcome {
    info!(
        kind = reason.label(),
        cmd = %pinned.position_command(),
        depth = pinned.depth(),
        "disagreement pinned"
    );
    LocateOutcome::Failed(FailureRecord {
        start: start.clone(),
        pinned,
        reason,
        trail,
    })
}
