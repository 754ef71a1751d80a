use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::reply::{DEFAULT_SENTINEL, PerftResult, ReplyEnd, ReplyParser};
use crate::error::HuntError;
use crate::oracle::{LineChannel, Oracle, ReadLine};
use crate::position::PerftQuery;

/// Upper bound on how long one perft reply may take.
///
/// Perft cost grows steeply with depth, so the bound is
/// `base + per_depth_sq * depth²`. The sentinel line normally ends the wait
/// long before the bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryBudget {
    pub base: Duration,
    pub per_depth_sq: Duration,
}

impl QueryBudget {
    pub fn new(base: Duration, per_depth_sq: Duration) -> Self {
        Self { base, per_depth_sq }
    }

    pub fn for_depth(&self, depth: u32) -> Duration {
        self.base
            .saturating_add(self.per_depth_sq.saturating_mul(depth.saturating_mul(depth)))
    }
}

impl Default for QueryBudget {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            per_depth_sq: Duration::from_secs(10),
        }
    }
}

/// Everything the adapter needs besides the oracle itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolSettings {
    pub sentinel: String,
    pub budget: QueryBudget,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            sentinel: DEFAULT_SENTINEL.to_string(),
            budget: QueryBudget::default(),
        }
    }
}

/// Writes the `position` / `go perft` pair.
pub fn send_query<C: LineChannel>(oracle: &mut Oracle<C>, query: &PerftQuery) -> Result<(), HuntError> {
    oracle.send(&query.position_command())?;
    oracle.send(&query.go_command())
}

/// Skips the tail of every abandoned reply. Returns the end condition when
/// the engine is still not caught up.
fn drain_stale<C: LineChannel>(
    oracle: &mut Oracle<C>,
    sentinel: &str,
    deadline: Instant,
) -> Result<Option<ReplyEnd>, HuntError> {
    while oracle.stale_replies() > 0 {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match oracle.read_line(remaining)? {
            ReadLine::Line(line) => {
                if line.contains(sentinel) {
                    oracle.settle_stale();
                    debug!(oracle = %oracle.role(), left = oracle.stale_replies(), "drained stale reply");
                }
            }
            ReadLine::Eof => return Ok(Some(ReplyEnd::EndOfStream)),
            ReadLine::TimedOut => return Ok(Some(ReplyEnd::TimedOut)),
        }
    }
    Ok(None)
}

/// Reads one reply until the sentinel, end of stream, or `timeout`.
///
/// A timed-out reply is still owed by the engine; the oracle remembers it
/// so the next read skips it.
pub fn read_reply<C: LineChannel>(
    oracle: &mut Oracle<C>,
    sentinel: &str,
    timeout: Duration,
) -> Result<PerftResult, HuntError> {
    let deadline = Instant::now() + timeout;
    let mut parser = ReplyParser::new(sentinel);

    if let Some(end) = drain_stale(oracle, sentinel, deadline)? {
        if end == ReplyEnd::TimedOut {
            oracle.mark_abandoned();
        }
        return Ok(parser.finish(end));
    }

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match oracle.read_line(remaining)? {
            ReadLine::Line(line) => {
                if parser.feed(&line) {
                    break;
                }
            }
            ReadLine::Eof => {
                warn!(oracle = %oracle.role(), "engine output ended before the sentinel");
                return Ok(parser.finish(ReplyEnd::EndOfStream));
            }
            ReadLine::TimedOut => {
                warn!(oracle = %oracle.role(), timeout_ms = timeout.as_millis() as u64, "no sentinel before timeout");
                oracle.mark_abandoned();
                return Ok(parser.finish(ReplyEnd::TimedOut));
            }
        }
    }

    let result = parser.finish(ReplyEnd::EndOfStream);
    if let Some((reported, summed)) = result.total_mismatch() {
        warn!(oracle = %oracle.role(), reported, summed, "engine total disagrees with its per-move lines");
    }
    Ok(result)
}

/// Sends `query` and reads the reply.
#[instrument(skip_all, fields(oracle = %oracle.role(), depth = perft.depth()))]
pub fn query<C: LineChannel>(
    oracle: &mut Oracle<C>,
    perft: &PerftQuery,
    settings: &ProtocolSettings,
) -> Result<PerftResult, HuntError> {
    send_query(oracle, perft)?;
    read_reply(oracle, &settings.sentinel, settings.budget.for_depth(perft.depth()))
}
