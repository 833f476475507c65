use async_trait::async_trait;
use eegwire_core::Frame;
use tracing::debug;

use super::FrameSink;
use crate::clock::wall_time;

/// Sink that only logs frame summaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl FrameSink for LogSink {
    type Error = std::convert::Infallible;

    async fn publish(&self, frame: &Frame) -> Result<(), Self::Error> {
        let last_sample = frame.last_timestamp().and_then(wall_time);
        debug!(
            group = %frame.group,
            counter = frame.counter,
            first_index = frame.first_index,
            channels = frame.channels,
            samples = frame.samples,
            last_sample = ?last_sample,
            "Frame"
        );
        Ok(())
    }

    async fn flush(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}
