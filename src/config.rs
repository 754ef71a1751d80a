use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::HuntError;
use crate::oracle::Handshake;
use crate::position::{BoardToken, Position};
use crate::protocol::{DEFAULT_SENTINEL, ProtocolSettings, QueryBudget};

/// Well-known perft test positions, used when no batch is given.
pub const STANDARD_POSITIONS: &[&str] = &[
    "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
    // Kiwipete
    "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
    "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
    "r2q1rk1/pP1p2pp/Q4n2/bbp1p3/Np6/1B3NBn/pPPP1PPP/R3K2R b KQ - 0 1",
    "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
    "r4rk1/1pp1qppp/p1np1n2/2b1p1B1/2B1P1b1/P1NP1N2/1PP1QPPP/R4RK1 w - - 0 10",
];

/// How to launch one engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Substring of the engine's identification line. Without it the
    /// engine is handshaken with `uci` / `uciok`.
    pub banner: Option<String>,
    /// Name used in logs and the report. Defaults to the program's file name.
    pub name: Option<String>,
}

impl EngineSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn handshake(&self) -> Handshake {
        Handshake::from_banner(self.banner.as_deref())
    }

    pub fn display_name(&self) -> &str {
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            return name;
        }
        Path::new(&self.program)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.program)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub base_ms: u64,
    pub per_depth_sq_ms: u64,
    pub handshake_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        let budget = QueryBudget::default();
        Self {
            base_ms: budget.base.as_millis() as u64,
            per_depth_sq_ms: budget.per_depth_sq.as_millis() as u64,
            handshake_ms: 10_000,
        }
    }
}

impl TimeoutConfig {
    pub fn budget(&self) -> QueryBudget {
        QueryBudget::new(
            Duration::from_millis(self.base_ms),
            Duration::from_millis(self.per_depth_sq_ms),
        )
    }

    pub fn handshake(&self) -> Duration {
        Duration::from_millis(self.handshake_ms)
    }
}

/// Settings for one hunt run, usually read from a JSON file and then
/// overridden from the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HuntConfig {
    pub reference: EngineSpec,
    pub under_test: EngineSpec,
    pub depth: u32,
    /// Inline positions (`startpos`, `fen ...` or a bare FEN, optionally
    /// followed by `moves ...`).
    pub positions: Vec<String>,
    pub positions_file: Option<PathBuf>,
    pub sentinel: String,
    pub timeout: TimeoutConfig,
}

impl Default for HuntConfig {
    fn default() -> Self {
        Self {
            reference: EngineSpec {
                program: "stockfish".to_string(),
                args: Vec::new(),
                banner: Some("Stockfish".to_string()),
                name: None,
            },
            under_test: EngineSpec::default(),
            depth: 5,
            positions: Vec::new(),
            positions_file: None,
            sentinel: DEFAULT_SENTINEL.to_string(),
            timeout: TimeoutConfig::default(),
        }
    }
}

impl HuntConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, HuntError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn validate(&self) -> Result<(), HuntError> {
        if self.depth == 0 {
            return Err(HuntError::InvalidDepth(self.depth));
        }
        for (what, spec) in [("reference", &self.reference), ("under_test", &self.under_test)] {
            if spec.program.trim().is_empty() {
                return Err(HuntError::Config(format!("{what}.program is not set")));
            }
        }
        if self.sentinel.trim().is_empty() {
            return Err(HuntError::Config("sentinel must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn protocol_settings(&self) -> ProtocolSettings {
        ProtocolSettings {
            sentinel: self.sentinel.clone(),
            budget: self.timeout.budget(),
        }
    }

    /// Inline positions followed by the batch file's, or the standard set
    /// when both are empty.
    pub fn start_positions(&self) -> Result<Vec<Position>, HuntError> {
        let mut out = Vec::with_capacity(self.positions.len());
        for token in &self.positions {
            out.push(token.parse::<Position>().map_err(HuntError::Config)?);
        }
        if let Some(path) = &self.positions_file {
            out.extend(load_batch_file(path)?);
        }
        if out.is_empty() {
            for fen in STANDARD_POSITIONS {
                out.push(Position::new(BoardToken::Fen((*fen).to_string())));
            }
        }
        Ok(out)
    }
}

/// Parses a batch listing: one board token per line. Blank lines and `#`
/// comments are skipped, and EPD operations after the first `;` are
/// dropped.
pub fn parse_batch(text: &str) -> Result<Vec<Position>, (usize, String)> {
    let mut out = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.split(';').next().unwrap_or("").trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let position: Position = line.parse().map_err(|e| (idx + 1, e))?;
        out.push(position);
    }
    Ok(out)
}

pub fn load_batch_file<P: AsRef<Path>>(path: P) -> Result<Vec<Position>, HuntError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    parse_batch(&text).map_err(|(line, reason)| HuntError::BatchFile {
        path: path.to_path_buf(),
        line,
        reason,
    })
}
