use std::path::PathBuf;

use thiserror::Error;

/// Misuse of a [`HistoryBuffer`](super::history::HistoryBuffer), or a failure
/// of the source it pulls from.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("end of input")]
    EndOfInput,
    #[error("history cursor is already at the start of the window")]
    AtStart,
    #[error("cannot rewind {requested} element(s), only {available} retained")]
    Underflow { requested: usize, available: usize },
    #[error("checkpoint at {checkpoint} is ahead of the cursor at {position}")]
    InvalidCheckpoint { checkpoint: usize, position: usize },
    #[error(transparent)]
    Source(#[from] anyhow::Error),
}
impl HistoryError {
    /// Unwraps source failures so typed errors from an upstream stage stay
    /// reachable through `anyhow::Error::downcast_ref`.
    pub fn into_anyhow(self) -> anyhow::Error {
        match self {
            Self::Source(e) => e,
            e => anyhow::Error::new(e),
        }
    }
}

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("could not locate include `{path}` (included from {})", .from.display())]
    IncludeNotFound { path: String, from: PathBuf },
    #[error("{}:{line}: malformed `{directive}` directive: {reason}", .file.display())]
    MalformedDirective {
        directive: String,
        file: PathBuf,
        line: u32,
        reason: String,
    },
    #[error("{what} nesting exceeds the limit of {limit}")]
    NestingTooDeep { what: &'static str, limit: usize },
}

/// Fatal parse failure; the display form mirrors `<line> [<token>]: <message>`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{line} [{token}]: {message}")]
pub struct SyntaxError {
    pub line: u32,
    pub token: String,
    pub message: String,
}
impl SyntaxError {
    pub fn new(line: u32, token: &str, message: impl Into<String>) -> Self {
        Self {
            line,
            token: token.to_owned(),
            message: message.into(),
        }
    }
}
