use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use eegwire_core::{Frame, GroupId};

use crate::sink::FrameSink;

/// In-memory sink.
/// Keeps every published frame, mainly for tests.
#[derive(Clone, Default)]
pub struct MemorySink {
    frames: Arc<Mutex<Vec<Frame>>>,
    flushes: Arc<Mutex<usize>>,
}

/// Error type for MemorySink
#[derive(Debug)]
pub enum MemorySinkError {
    MutexPoisoned(String),
}

impl std::error::Error for MemorySinkError {}

impl fmt::Display for MemorySinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemorySinkError::MutexPoisoned(msg) => write!(f, "Mutex poisoned: {}", msg),
        }
    }
}

impl<T> From<PoisonError<T>> for MemorySinkError {
    fn from(err: PoisonError<T>) -> Self {
        MemorySinkError::MutexPoisoned(err.to_string())
    }
}

impl MemorySink {
    /// All frames published so far, in publish order.
    pub fn frames(&self) -> Result<Vec<Frame>, MemorySinkError> {
        Ok(self.frames.lock()?.clone())
    }

    pub fn frames_for(&self, group: GroupId) -> Result<Vec<Frame>, MemorySinkError> {
        let frames = self.frames.lock()?;
        Ok(frames.iter().filter(|f| f.group == group).cloned().collect())
    }

    pub fn flush_count(&self) -> Result<usize, MemorySinkError> {
        Ok(*self.flushes.lock()?)
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    type Error = MemorySinkError;

    async fn publish(&self, frame: &Frame) -> Result<(), Self::Error> {
        let mut frames = self.frames.lock()?;
        frames.push(frame.clone());
        Ok(())
    }

    async fn flush(&self) -> Result<(), Self::Error> {
        let mut flushes = self.flushes.lock()?;
        *flushes += 1;
        Ok(())
    }
}
