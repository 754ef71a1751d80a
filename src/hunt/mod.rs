//! Locating where two perft engines part ways.

pub mod divide;
pub mod locator;
pub mod report;

pub use divide::{CountDiff, DivideDiff, diff_divide_text, parse_divide_text};
pub use locator::{
    BisectStep, DivergenceOutcome, FailureReason, FailureRecord, LocateOutcome, Locator, compare,
};
pub use report::{HuntReport, HuntStatus, run, run_with_observer};
