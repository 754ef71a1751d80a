//! Scripted in-memory engines for driving the protocol and locator.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::time::Duration;

use perft_hunt::oracle::{LineChannel, Oracle, ReadLine, Role};
use perft_hunt::protocol::{ProtocolSettings, QueryBudget};

#[derive(Debug, Clone)]
enum Script {
    /// Printed right away.
    Reply(Vec<String>),
    /// Printed only once the next command arrives.
    Late(Vec<String>),
    /// Partial output, then the engine exits.
    Dies(Vec<String>),
}

/// A fake engine answering `go perft` from a table keyed by the
/// `position` arguments and depth. Unknown queries get no answer.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    scripts: HashMap<(String, u32), Script>,
    current: String,
    output: VecDeque<String>,
    deferred: Vec<String>,
    closed: bool,
    pub sent: Vec<String>,
}

pub fn divide_lines(pairs: &[(&str, u64)]) -> Vec<String> {
    let mut lines: Vec<String> = pairs.iter().map(|(m, n)| format!("{m}: {n}")).collect();
    let total: u64 = pairs.iter().map(|(_, n)| n).sum();
    lines.push(String::new());
    lines.push(format!("Nodes searched: {total}"));
    lines
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn banner(mut self, line: &str) -> Self {
        self.output.push_back(line.to_string());
        self
    }

    /// `position` is the command argument, e.g. `startpos moves e2e4`.
    pub fn divide(self, position: &str, depth: u32, pairs: &[(&str, u64)]) -> Self {
        self.raw(position, depth, divide_lines(pairs))
    }

    pub fn raw(mut self, position: &str, depth: u32, lines: Vec<String>) -> Self {
        self.scripts
            .insert((position.to_string(), depth), Script::Reply(lines));
        self
    }

    pub fn late(mut self, position: &str, depth: u32, pairs: &[(&str, u64)]) -> Self {
        self.scripts
            .insert((position.to_string(), depth), Script::Late(divide_lines(pairs)));
        self
    }

    pub fn dies(mut self, position: &str, depth: u32, partial: &[(&str, u64)]) -> Self {
        let lines = partial.iter().map(|(m, n)| format!("{m}: {n}")).collect();
        self.scripts
            .insert((position.to_string(), depth), Script::Dies(lines));
        self
    }

    pub fn go_commands(&self) -> Vec<&str> {
        self.sent
            .iter()
            .filter(|l| l.starts_with("go perft"))
            .map(String::as_str)
            .collect()
    }

    pub fn position_commands(&self) -> Vec<&str> {
        self.sent
            .iter()
            .filter(|l| l.starts_with("position"))
            .map(String::as_str)
            .collect()
    }
}

impl LineChannel for ScriptedEngine {
    fn send_line(&mut self, line: &str) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        self.sent.push(line.to_string());
        self.output.extend(self.deferred.drain(..));

        if let Some(rest) = line.strip_prefix("position ") {
            self.current = rest.to_string();
        } else if let Some(depth) = line.strip_prefix("go perft ") {
            let depth: u32 = depth.trim().parse().unwrap();
            match self.scripts.get(&(self.current.clone(), depth)).cloned() {
                Some(Script::Reply(lines)) => self.output.extend(lines),
                Some(Script::Late(lines)) => self.deferred = lines,
                Some(Script::Dies(lines)) => {
                    self.output.extend(lines);
                    self.closed = true;
                }
                None => {}
            }
        } else if line == "uci" {
            self.output.push_back("id name Scripted".to_string());
            self.output.push_back("uciok".to_string());
        }
        Ok(())
    }

    fn read_line(&mut self, _timeout: Duration) -> io::Result<ReadLine> {
        Ok(match self.output.pop_front() {
            Some(line) => ReadLine::Line(line),
            None if self.closed => ReadLine::Eof,
            None => ReadLine::TimedOut,
        })
    }
}

pub fn settings() -> ProtocolSettings {
    ProtocolSettings {
        budget: QueryBudget::new(Duration::from_millis(1), Duration::ZERO),
        ..ProtocolSettings::default()
    }
}

pub fn reference(engine: ScriptedEngine) -> Oracle<ScriptedEngine> {
    Oracle::new(Role::Reference, "reference", engine)
}

pub fn under_test(engine: ScriptedEngine) -> Oracle<ScriptedEngine> {
    Oracle::new(Role::UnderTest, "under-test", engine)
}
