use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HuntError;

/// The board part of a `position` command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoardToken {
    StartPos,
    Fen(String),
}

impl FromStr for BoardToken {
    type Err = String;

    /// Accepts `startpos`, `fen <fen>` or a bare FEN.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty board token".to_string());
        }
        if s == "startpos" {
            return Ok(BoardToken::StartPos);
        }
        let fen = s.strip_prefix("fen ").unwrap_or(s).trim();
        if fen.is_empty() || fen == "fen" {
            return Err("`fen` without a FEN string".to_string());
        }
        // Collapse runs of whitespace so the command line is canonical.
        Ok(BoardToken::Fen(
            fen.split_whitespace().collect::<Vec<_>>().join(" "),
        ))
    }
}

impl fmt::Display for BoardToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoardToken::StartPos => write!(f, "startpos"),
            BoardToken::Fen(fen) => write!(f, "fen {}", fen),
        }
    }
}

/// A base board plus the moves already played from it.
///
/// Positions are never edited in place; [`Position::with_move`] derives a
/// new one whose prefix extends this one by exactly one move.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    board: BoardToken,
    moves: Vec<String>,
}

impl Position {
    pub fn new(board: BoardToken) -> Self {
        Self {
            board,
            moves: Vec::new(),
        }
    }

    pub fn startpos() -> Self {
        Self::new(BoardToken::StartPos)
    }

    pub fn board(&self) -> &BoardToken {
        &self.board
    }

    pub fn moves(&self) -> &[String] {
        &self.moves
    }

    pub fn ply(&self) -> usize {
        self.moves.len()
    }

    pub fn with_move(&self, mv: &str) -> Position {
        let mut moves = Vec::with_capacity(self.moves.len() + 1);
        moves.extend(self.moves.iter().cloned());
        moves.push(mv.to_string());
        Position {
            board: self.board.clone(),
            moves,
        }
    }

    /// Same board with the prefix dropped.
    pub fn root(&self) -> Position {
        Position::new(self.board.clone())
    }

    /// `position <board> [moves m1 m2 ...]`, without the trailing newline.
    pub fn to_command(&self) -> String {
        if self.moves.is_empty() {
            format!("position {}", self.board)
        } else {
            format!("position {} moves {}", self.board, self.moves.join(" "))
        }
    }
}

impl FromStr for Position {
    type Err = String;

    /// Parses the argument part of a `position` command, e.g.
    /// `startpos moves e2e4 e7e5`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix("position ").unwrap_or(s);
        let (board, moves) = match s.find(" moves") {
            Some(idx) => (&s[..idx], s[idx + " moves".len()..].trim()),
            None => (s, ""),
        };
        Ok(Position {
            board: board.parse()?,
            moves: moves.split_whitespace().map(str::to_string).collect(),
        })
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.board)?;
        if !self.moves.is_empty() {
            write!(f, " moves {}", self.moves.join(" "))?;
        }
        Ok(())
    }
}

/// One perft request: a position and a depth of at least one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerftQuery {
    position: Position,
    depth: u32,
}

impl PerftQuery {
    pub fn new(position: Position, depth: u32) -> Result<Self, HuntError> {
        if depth == 0 {
            return Err(HuntError::InvalidDepth(depth));
        }
        Ok(Self { position, depth })
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn position_command(&self) -> String {
        self.position.to_command()
    }

    pub fn go_command(&self) -> String {
        format!("go perft {}", self.depth)
    }
}

impl fmt::Display for PerftQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.position_command(), self.go_command())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KIWI: &str = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";

    #[test]
    fn command_omits_moves_clause_for_empty_prefix() {
        let pos = Position::new(BoardToken::Fen(KIWI.to_string()));
        assert_eq!(pos.to_command(), format!("position fen {KIWI}"));
    }

    #[test]
    fn with_move_extends_without_touching_parent() {
        let root = Position::startpos();
        let child = root.with_move("e2e4");
        let grandchild = child.with_move("e7e5");

        assert!(root.moves().is_empty());
        assert_eq!(child.moves(), ["e2e4"]);
        assert_eq!(
            grandchild.to_command(),
            "position startpos moves e2e4 e7e5"
        );
        assert_eq!(grandchild.root(), root);
    }

    #[test]
    fn parses_command_arguments_back() {
        let pos: Position = format!("fen {KIWI} moves e1g1 a8b8").parse().unwrap();
        assert_eq!(pos.board(), &BoardToken::Fen(KIWI.to_string()));
        assert_eq!(pos.moves(), ["e1g1", "a8b8"]);
    }

    #[test]
    fn bare_fen_and_whitespace_are_normalised() {
        let token: BoardToken = "  8/8/8/8/8/8/8/K6k   w - -  0 1 ".parse().unwrap();
        assert_eq!(token.to_string(), "fen 8/8/8/8/8/8/8/K6k w - - 0 1");
        assert!("".parse::<BoardToken>().is_err());
        assert!("fen ".parse::<BoardToken>().is_err());
    }

    #[test]
    fn zero_depth_query_is_rejected() {
        assert!(matches!(
            PerftQuery::new(Position::startpos(), 0),
            Err(HuntError::InvalidDepth(0))
        ));
        let q = PerftQuery::new(Position::startpos(), 3).unwrap();
        assert_eq!(q.go_command(), "go perft 3");
    }
}
