//! Plumbing shared by every pipeline stage.
mod error;
mod history;

pub use error::{HistoryError, PreprocessError, SyntaxError};
pub use history::{CharSource, Checkpoint, HistoryBuffer, IterSource, Source};

#[cfg(test)]
mod tests;
