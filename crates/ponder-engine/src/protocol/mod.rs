//! Line protocol spoken by the analysis engines.
//!
//! Engines read one command per line on stdin and write free-form output
//! lines on stdout. An exchange sends a short command sequence and then waits
//! for a terminator line: `readyok` after the handshake and new-game resets,
//! and `bestmove ...` at the end of a search.
//!
//! [`parse_analysis`] turns the lines of one completed search into an
//! [`Analysis`]. It only extracts tokens; it does not interpret scores.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Literal acknowledging `isready`.
pub const READY_OK: &str = "readyok";

/// Token that starts the final line of a search.
pub const BEST_MOVE: &str = "bestmove";

const SCORE_MATE: &str = "score mate";
const SCORE_CP: &str = "score cp";
const PV_MARKER: &str = " pv ";

/// Predicate marking the last line of an exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Terminator {
    prefix: String,
}

impl Terminator {
    /// Matches any line starting with `prefix`.
    #[must_use]
    pub fn line_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Terminator for handshake and reset exchanges.
    #[must_use]
    pub fn ready() -> Self {
        Self::line_prefix(READY_OK)
    }

    /// Terminator for search exchanges.
    #[must_use]
    pub fn best_move() -> Self {
        Self::line_prefix(BEST_MOVE)
    }

    /// Returns `true` when `line` ends the exchange.
    #[must_use]
    pub fn matches(&self, line: &str) -> bool {
        line.starts_with(&self.prefix)
    }

    /// The prefix this terminator looks for.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

/// How long an engine may search one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBudget {
    /// Search for a fixed number of milliseconds.
    MoveTime(u64),
    /// Search to a fixed depth in plies.
    Depth(u32),
}

impl SearchBudget {
    /// The `go` command requesting this budget.
    #[must_use]
    pub fn go_command(self) -> String {
        match self {
            Self::MoveTime(millis) => format!("go movetime {millis}"),
            Self::Depth(depth) => format!("go depth {depth}"),
        }
    }
}

impl Default for SearchBudget {
    fn default() -> Self {
        Self::MoveTime(ponder_config::DEFAULT_MOVETIME_MS)
    }
}

/// One command sequence together with the line that completes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    commands: Vec<String>,
    terminator: Terminator,
}

impl Exchange {
    /// Builds an exchange from raw commands.
    #[must_use]
    pub fn new<I, S>(commands: I, terminator: Terminator) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
            terminator,
        }
    }

    /// Identify-and-ready handshake run once per worker at start-up.
    #[must_use]
    pub fn handshake() -> Self {
        Self::new(["uci", "isready"], Terminator::ready())
    }

    /// Clears engine state between games.
    #[must_use]
    pub fn new_game() -> Self {
        Self::new(["ucinewgame", "isready"], Terminator::ready())
    }

    /// Searches `fen` within `budget`. The position is sent verbatim.
    #[must_use]
    pub fn search(fen: &str, budget: SearchBudget) -> Self {
        Self::new(
            [format!("position fen {fen}"), budget.go_command()],
            Terminator::best_move(),
        )
    }

    /// Commands written to the engine, in order.
    #[must_use]
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Predicate marking the final output line.
    #[must_use]
    pub const fn terminator(&self) -> &Terminator {
        &self.terminator
    }
}

/// Engine evaluation extracted from a `score` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Evaluation {
    /// Score in centipawns.
    #[serde(rename = "cp")]
    Centipawns(i64),
    /// Forced mate in `n` moves; negative when the side to move is mated.
    #[serde(rename = "mate")]
    Mate(i64),
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Centipawns(cp) => write!(f, "{cp}"),
            Self::Mate(moves) => write!(f, "mate in {moves}"),
        }
    }
}

/// Structured result of one search exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    bestmove: String,
    pv: Vec<String>,
    evaluation: Option<Evaluation>,
}

impl Analysis {
    /// Builds an analysis result.
    #[must_use]
    pub const fn new(bestmove: String, pv: Vec<String>, evaluation: Option<Evaluation>) -> Self {
        Self {
            bestmove,
            pv,
            evaluation,
        }
    }

    /// The engine's preferred move.
    #[must_use]
    pub fn bestmove(&self) -> &str {
        &self.bestmove
    }

    /// Principal variation from the last `pv` line, possibly empty.
    #[must_use]
    pub fn principal_variation(&self) -> &[String] {
        &self.pv
    }

    /// Evaluation from the last `score` line, if any.
    #[must_use]
    pub const fn evaluation(&self) -> Option<Evaluation> {
        self.evaluation
    }
}

/// Parses the output of one search exchange.
///
/// Later `score` and `pv` lines overwrite earlier ones. Returns `None` when no
/// line starts with `bestmove`; callers treat that as "no usable result".
#[must_use]
pub fn parse_analysis<S: AsRef<str>>(lines: &[S]) -> Option<Analysis> {
    let mut bestmove = None;
    let mut pv = Vec::new();
    let mut evaluation = None;

    for line in lines.iter().map(AsRef::as_ref) {
        if line.starts_with(BEST_MOVE) {
            bestmove = line.split_whitespace().nth(1).map(str::to_owned);
        }

        if line.contains(SCORE_MATE) {
            if let Some(moves) = capture_integer(line, SCORE_MATE) {
                evaluation = Some(Evaluation::Mate(moves));
            }
        } else if line.contains(SCORE_CP) {
            if let Some(cp) = capture_integer(line, SCORE_CP) {
                evaluation = Some(Evaluation::Centipawns(cp));
            }
        }

        if let Some((_, moves)) = line.split_once(PV_MARKER) {
            pv = moves.split_whitespace().map(str::to_owned).collect();
        }
    }

    bestmove.map(|bestmove| Analysis::new(bestmove, pv, evaluation))
}

/// Finds `<marker> <int>` in `line` and returns the integer.
fn capture_integer(line: &str, marker: &str) -> Option<i64> {
    line.match_indices(marker).find_map(|(start, _)| {
        let rest = line.get(start + marker.len()..)?.strip_prefix(' ')?;
        leading_integer(rest)
    })
}

fn leading_integer(text: &str) -> Option<i64> {
    let sign = usize::from(text.starts_with('-'));
    let digits = text
        .get(sign..)?
        .chars()
        .take_while(char::is_ascii_digit)
        .count();
    if digits == 0 {
        return None;
    }
    text.get(..sign + digits)?.parse().ok()
}
