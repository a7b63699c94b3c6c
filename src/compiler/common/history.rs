//! Bounded replay window over a pull-based source.
//!
//! Every stage of the pipeline pulls its input through a [`HistoryBuffer`] so
//! it can look ahead and then step back without re-reading from the origin.
use std::collections::VecDeque;

use anyhow::Result;

use super::error::HistoryError;

/// A forward-only producer. `Ok(None)` signals exhaustion.
pub trait Source {
    type Item;
    fn pull(&mut self) -> Result<Option<Self::Item>>;
}

/// Adapts any iterator into an infallible [`Source`].
pub struct IterSource<I>(pub I);
impl<I: Iterator> Source for IterSource<I> {
    type Item = I::Item;
    fn pull(&mut self) -> Result<Option<Self::Item>> {
        Ok(self.0.next())
    }
}

pub type CharSource = IterSource<std::vec::IntoIter<char>>;
impl CharSource {
    pub fn from_text(text: &str) -> Self {
        IterSource(text.chars().collect::<Vec<_>>().into_iter())
    }
}

/// Absolute stream position captured by [`HistoryBuffer::checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

pub struct HistoryBuffer<S: Source> {
    source: S,
    window: VecDeque<S::Item>,
    capacity: usize,
    // Index into `window` of the element the next `next()` returns.
    cursor: usize,
    // Number of elements produced that are no longer in the window.
    evicted: usize,
}
impl<S: Source> HistoryBuffer<S>
where
    S::Item: Clone,
{
    pub fn new(source: S) -> Self {
        Self {
            source,
            window: VecDeque::new(),
            capacity: 0,
            cursor: 0,
            evicted: 0,
        }
    }
    pub fn with_capacity(source: S, capacity: usize) -> Self {
        let mut out = Self::new(source);
        out.set_capacity(capacity);
        out
    }

    /// Sets the replay depth. Shrinking only drops elements already behind
    /// the cursor; pending replays are kept until they are consumed.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        while self.window.len() > capacity && self.cursor > 0 {
            self.window.pop_front();
            self.cursor -= 1;
            self.evicted += 1;
        }
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn next(&mut self) -> std::result::Result<S::Item, HistoryError> {
        if self.cursor < self.window.len() {
            let item = self.window[self.cursor].clone();
            self.cursor += 1;
            return Ok(item);
        }

        let item = self.source.pull()?.ok_or(HistoryError::EndOfInput)?;
        if self.capacity == 0 {
            self.evicted += 1;
            return Ok(item);
        }
        self.window.push_back(item.clone());
        self.cursor += 1;
        while self.window.len() > self.capacity {
            self.window.pop_front();
            self.cursor -= 1;
            self.evicted += 1;
        }
        Ok(item)
    }

    /// Moves the cursor back `count` elements and returns the element that
    /// the following `next()` will yield again.
    pub fn prev(&mut self, count: usize) -> std::result::Result<S::Item, HistoryError> {
        if self.cursor == 0 {
            return Err(HistoryError::AtStart);
        }
        if count == 0 || count > self.cursor {
            return Err(HistoryError::Underflow {
                requested: count,
                available: self.cursor,
            });
        }
        self.cursor -= count;
        Ok(self.window[self.cursor].clone())
    }

    /// `next()` with exhaustion folded into `None` and source failures
    /// passed through untouched.
    pub fn try_next(&mut self) -> Result<Option<S::Item>> {
        match self.next() {
            Ok(item) => Ok(Some(item)),
            Err(HistoryError::EndOfInput) => Ok(None),
            Err(e) => Err(e.into_anyhow()),
        }
    }
    /// Steps back over `count` elements, `0` being a no-op.
    pub fn rewind(&mut self, count: usize) -> Result<()> {
        if count > 0 {
            self.prev(count).map_err(HistoryError::into_anyhow)?;
        }
        Ok(())
    }

    pub fn position(&self) -> usize {
        self.evicted + self.cursor
    }
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.position())
    }
    pub fn rollback(&mut self, checkpoint: Checkpoint) -> std::result::Result<(), HistoryError> {
        let position = self.position();
        if checkpoint.0 > position {
            return Err(HistoryError::InvalidCheckpoint {
                checkpoint: checkpoint.0,
                position,
            });
        }
        let count = position - checkpoint.0;
        if count > 0 {
            self.prev(count)?;
        }
        Ok(())
    }
}
