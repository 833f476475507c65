pub mod file;
pub mod log;
pub mod memory;

use async_trait::async_trait;
use eegwire_core::Frame;

/// Destination for completed frames.
///
/// Every group task publishes into the same sink, so implementations must
/// tolerate concurrent calls from different groups. Calls for one group
/// arrive in frame order.
#[async_trait]
pub trait FrameSink: Send + Sync + 'static {
    /// Error type specific to this sink implementation
    type Error: std::error::Error + Send + Sync + 'static;

    /// Publish one completed frame.
    async fn publish(&self, frame: &Frame) -> Result<(), Self::Error>;

    /// Push buffered output to its destination.
    async fn flush(&self) -> Result<(), Self::Error>;
}
