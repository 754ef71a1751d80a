use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default sentinel: both Stockfish (`Nodes searched: N`) and most
/// home-grown engines print a total line containing this word.
pub const DEFAULT_SENTINEL: &str = "Nodes";

/// How a reply stream stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyEnd {
    /// The sentinel line was seen. `reported_total` is its trailing number, if any.
    Sentinel { reported_total: Option<u64> },
    EndOfStream,
    TimedOut,
}

impl ReplyEnd {
    pub fn is_sentinel(&self) -> bool {
        matches!(self, ReplyEnd::Sentinel { .. })
    }
}

/// Per-move node counts returned by one `go perft` query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerftResult {
    counts: BTreeMap<String, u64>,
    end: ReplyEnd,
}

impl PerftResult {
    pub fn new(counts: BTreeMap<String, u64>, end: ReplyEnd) -> Self {
        Self { counts, end }
    }

    /// A well-formed reply, as an engine that printed the sentinel would give.
    pub fn complete<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        Self {
            counts: pairs.into_iter().map(|(m, n)| (m.into(), n)).collect(),
            end: ReplyEnd::Sentinel {
                reported_total: None,
            },
        }
    }

    /// True when the sentinel was observed. An empty valid result is a
    /// position with no legal moves; an invalid one is a protocol fault.
    pub fn is_valid(&self) -> bool {
        self.end.is_sentinel()
    }

    pub fn end(&self) -> ReplyEnd {
        self.end
    }

    pub fn counts(&self) -> &BTreeMap<String, u64> {
        &self.counts
    }

    pub fn get(&self, mv: &str) -> Option<u64> {
        self.counts.get(mv).copied()
    }

    pub fn moves(&self) -> BTreeSet<&str> {
        self.counts.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of the per-move counts, saturating at `u64::MAX`. A broken
    /// engine can print any count, so the sum must not be trusted to fit.
    pub fn total(&self) -> u64 {
        self.counts
            .values()
            .fold(0u64, |acc, &n| acc.saturating_add(n))
    }

    pub fn reported_total(&self) -> Option<u64> {
        match self.end {
            ReplyEnd::Sentinel { reported_total } => reported_total,
            _ => None,
        }
    }

    /// `Some((reported, summed))` when the engine's own total line disagrees
    /// with the sum of its per-move lines.
    pub fn total_mismatch(&self) -> Option<(u64, u64)> {
        let reported = self.reported_total()?;
        let summed = self.total();
        (reported != summed).then_some((reported, summed))
    }
}

/// Parses a `<move>: <count>` line. Anything else yields `None`.
pub fn parse_divide_line(line: &str) -> Option<(&str, u64)> {
    split_divide_line(line, ':')
}

pub(crate) fn split_divide_line(line: &str, sep: char) -> Option<(&str, u64)> {
    let (mv, count) = line.trim().split_once(sep)?;
    let mv = mv.trim();
    if mv.is_empty() || mv.contains(char::is_whitespace) {
        return None;
    }
    let count = count.trim().parse::<u64>().ok()?;
    Some((mv, count))
}

fn trailing_number(line: &str) -> Option<u64> {
    line.split(|c: char| c.is_whitespace() || c == ':' || c == '=')
        .filter(|s| !s.is_empty())
        .next_back()?
        .parse()
        .ok()
}

/// Incremental reply parser: feed lines until it reports completion.
#[derive(Debug, Clone)]
pub struct ReplyParser {
    sentinel: String,
    counts: BTreeMap<String, u64>,
    end: Option<ReplyEnd>,
}

impl ReplyParser {
    pub fn new(sentinel: impl Into<String>) -> Self {
        Self {
            sentinel: sentinel.into(),
            counts: BTreeMap::new(),
            end: None,
        }
    }

    /// Consumes one reply line. Returns `true` once the sentinel was seen;
    /// later lines are ignored.
    pub fn feed(&mut self, line: &str) -> bool {
        if self.end.is_some() {
            return true;
        }
        if line.contains(self.sentinel.as_str()) {
            self.end = Some(ReplyEnd::Sentinel {
                reported_total: trailing_number(line),
            });
            return true;
        }
        if let Some((mv, count)) = parse_divide_line(line) {
            if let Some(&first) = self.counts.get(mv) {
                warn!(mv, first, count, "duplicate move in perft reply; keeping the first");
            } else {
                self.counts.insert(mv.to_string(), count);
            }
        }
        false
    }

    pub fn is_done(&self) -> bool {
        self.end.is_some()
    }

    /// Closes the parse. `unterminated` is used when no sentinel was seen.
    pub fn finish(self, unterminated: ReplyEnd) -> PerftResult {
        PerftResult {
            counts: self.counts,
            end: self.end.unwrap_or(unterminated),
        }
    }
}

/// Parses a complete reply held in memory. Reading stops at the sentinel;
/// running out of lines first gives an invalid result.
pub fn parse_reply<I, S>(lines: I, sentinel: &str) -> PerftResult
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parser = ReplyParser::new(sentinel);
    for line in lines {
        if parser.feed(line.as_ref()) {
            break;
        }
    }
    parser.finish(ReplyEnd::EndOfStream)
}
