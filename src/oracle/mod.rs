//! The engines being compared, seen as line-oriented channels.
//!
//! [`LineChannel`] is the transport seam: a spawned process in production
//! ([`process::EngineProcess`]), a scripted fake in tests. [`Oracle`] adds
//! the identity and bookkeeping the protocol layer needs.

pub mod process;

use std::fmt;
use std::io;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::HuntError;

/// Result of waiting for one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadLine {
    Line(String),
    Eof,
    TimedOut,
}

/// A bidirectional, newline-delimited text channel to one engine.
pub trait LineChannel {
    /// Writes `line` plus a newline and flushes.
    fn send_line(&mut self, line: &str) -> io::Result<()>;

    /// Waits at most `timeout` for the next line (without its terminator).
    fn read_line(&mut self, timeout: Duration) -> io::Result<ReadLine>;

    /// Releases the engine. The default does nothing.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<C: LineChannel + ?Sized> LineChannel for Box<C> {
    fn send_line(&mut self, line: &str) -> io::Result<()> {
        (**self).send_line(line)
    }

    fn read_line(&mut self, timeout: Duration) -> io::Result<ReadLine> {
        (**self).read_line(timeout)
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// Which side of the comparison an engine is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Reference,
    UnderTest,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Reference => write!(f, "reference"),
            Role::UnderTest => write!(f, "under-test"),
        }
    }
}

/// How to get an engine past its startup chatter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handshake {
    /// Discard lines until one contains this marker (e.g. `Stockfish`).
    Banner(String),
    /// Send `uci` and discard lines until `uciok`.
    Uci,
}

impl Handshake {
    pub fn from_banner(banner: Option<&str>) -> Self {
        match banner {
            Some(marker) if !marker.is_empty() => Handshake::Banner(marker.to_string()),
            _ => Handshake::Uci,
        }
    }
}

/// One engine under the harness's exclusive control.
pub struct Oracle<C> {
    role: Role,
    name: String,
    channel: C,
    stale_replies: usize,
}

impl<C: LineChannel> Oracle<C> {
    pub fn new(role: Role, name: impl Into<String>, channel: C) -> Self {
        Self {
            role,
            name: name.into(),
            channel,
            stale_replies: 0,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Replies that were abandoned on timeout and may still arrive.
    pub fn stale_replies(&self) -> usize {
        self.stale_replies
    }

    pub(crate) fn mark_abandoned(&mut self) {
        self.stale_replies += 1;
    }

    pub(crate) fn settle_stale(&mut self) {
        self.stale_replies = self.stale_replies.saturating_sub(1);
    }

    /// Sends one command line. A closed pipe means the engine is gone.
    pub fn send(&mut self, line: &str) -> Result<(), HuntError> {
        debug!(oracle = %self.role, line, "send");
        self.channel.send_line(line).map_err(|e| match e.kind() {
            io::ErrorKind::BrokenPipe | io::ErrorKind::NotConnected => {
                HuntError::OracleClosed { oracle: self.role }
            }
            _ => HuntError::Io(e),
        })
    }

    pub fn read_line(&mut self, timeout: Duration) -> Result<ReadLine, HuntError> {
        Ok(self.channel.read_line(timeout)?)
    }

    /// Reads past the engine's banner before the first query.
    pub fn handshake(&mut self, handshake: &Handshake, timeout: Duration) -> Result<(), HuntError> {
        let marker = match handshake {
            Handshake::Banner(marker) => marker.as_str(),
            Handshake::Uci => {
                self.send("uci")?;
                "uciok"
            }
        };

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.read_line(remaining)? {
                ReadLine::Line(line) => {
                    debug!(oracle = %self.role, %line, "banner");
                    if line.contains(marker) {
                        info!(oracle = %self.role, name = %self.name, "engine ready");
                        return Ok(());
                    }
                }
                ReadLine::Eof => {
                    return Err(HuntError::Handshake {
                        oracle: self.role,
                        reason: format!("stream ended before `{marker}`"),
                    });
                }
                ReadLine::TimedOut => {
                    return Err(HuntError::Handshake {
                        oracle: self.role,
                        reason: format!("no `{marker}` within {}ms", timeout.as_millis()),
                    });
                }
            }
        }
    }

    /// Asks the engine to exit and releases the channel.
    pub fn shutdown(&mut self) -> Result<(), HuntError> {
        info!(oracle = %self.role, name = %self.name, "shutting down");
        Ok(self.channel.close()?)
    }

    pub fn into_channel(self) -> C {
        self.channel
    }
}
