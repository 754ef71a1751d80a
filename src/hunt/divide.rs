//! Comparing two divide listings (`move: count` per root move).
//!
//! Used by the locator on live replies and by `perft-hunt diff` on saved
//! engine output.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::protocol::reply::split_divide_line;

/// A move both sides list, with different subtree sizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountDiff {
    pub mv: String,
    pub reference: u64,
    pub under_test: u64,
}

/// Everything that differs between a reference listing and a test listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivideDiff {
    /// Listed by the reference only.
    pub missing: BTreeSet<String>,
    /// Listed by the engine under test only.
    pub extra: BTreeSet<String>,
    /// Listed by both, sorted by move.
    pub counts: Vec<CountDiff>,
}

impl DivideDiff {
    pub fn between(reference: &BTreeMap<String, u64>, under_test: &BTreeMap<String, u64>) -> Self {
        let missing = reference
            .keys()
            .filter(|mv| !under_test.contains_key(*mv))
            .cloned()
            .collect();
        let extra = under_test
            .keys()
            .filter(|mv| !reference.contains_key(*mv))
            .cloned()
            .collect();
        let counts = reference
            .iter()
            .filter_map(|(mv, &r)| match under_test.get(mv) {
                Some(&t) if t != r => Some(CountDiff {
                    mv: mv.clone(),
                    reference: r,
                    under_test: t,
                }),
                _ => None,
            })
            .collect();
        Self {
            missing,
            extra,
            counts,
        }
    }

    pub fn sets_match(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.sets_match() && self.counts.is_empty()
    }
}

impl fmt::Display for DivideDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "listings agree");
        }
        writeln!(f, "Moves MISSING:\t{}", join_set(&self.missing))?;
        writeln!(f, "Moves EXTRA:\t{}", join_set(&self.extra))?;
        if !self.counts.is_empty() {
            writeln!(f, "move\treference\tunder-test")?;
            for c in &self.counts {
                writeln!(f, "{}\t{}\t{}", c.mv, c.reference, c.under_test)?;
            }
        }
        Ok(())
    }
}

pub(crate) fn join_set(set: &BTreeSet<String>) -> String {
    if set.is_empty() {
        "{}".to_string()
    } else {
        set.iter().cloned().collect::<Vec<_>>().join(" ")
    }
}

/// Reads a saved divide listing. Accepts `move: count` and `move - count`;
/// every other line is ignored. A repeated move keeps its first count, the
/// same rule [`ReplyParser`](crate::protocol::ReplyParser) applies to live
/// replies.
pub fn parse_divide_text(text: &str) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for line in text.lines() {
        let parsed = split_divide_line(line, ':').or_else(|| split_divide_line(line, '-'));
        if let Some((mv, count)) = parsed {
            counts.entry(mv.to_string()).or_insert(count);
        }
    }
    counts
}

pub fn diff_divide_text(reference: &str, under_test: &str) -> DivideDiff {
    DivideDiff::between(&parse_divide_text(reference), &parse_divide_text(under_test))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dash_and_colon_listings_compare_equal() {
        let mine = "b1a3 - 120142144\ng1f3 - 147678554\n";
        let stock = "g1f3: 147678554\nb1a3: 120142144\n\nNodes searched: 267820698\n";
        assert!(diff_divide_text(stock, mine).is_empty());
    }

    #[test]
    fn repeated_move_reads_the_same_offline_and_live() {
        let text = "e2e4: 20\ne2e4: 7\nd2d4: 20\n\nNodes searched: 47\n";
        let live = crate::protocol::parse_reply(text.lines(), crate::protocol::DEFAULT_SENTINEL);
        assert_eq!(&parse_divide_text(text), live.counts());
    }

    #[test]
    fn reports_every_kind_of_difference() {
        let stock = "a2a3: 380\nb2b3: 420\nc2c3: 420\n";
        let mine = "a2a3: 380\nb2b3: 421\nh2h5: 1\n";
        let diff = diff_divide_text(stock, mine);

        assert_eq!(diff.missing, BTreeSet::from(["c2c3".to_string()]));
        assert_eq!(diff.extra, BTreeSet::from(["h2h5".to_string()]));
        assert_eq!(
            diff.counts,
            vec![CountDiff {
                mv: "b2b3".into(),
                reference: 420,
                under_test: 421
            }]
        );
        assert!(!diff.sets_match());
    }
}
