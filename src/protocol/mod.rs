//! The perft text protocol: commands out, `move: count` lines back.

pub mod adapter;
pub mod reply;

pub use adapter::{ProtocolSettings, QueryBudget, query, read_reply, send_query};
pub use reply::{DEFAULT_SENTINEL, PerftResult, ReplyEnd, ReplyParser, parse_divide_line, parse_reply};
