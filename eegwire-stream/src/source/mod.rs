pub mod mock;
pub mod tcp;

use async_trait::async_trait;
use eegwire_core::Notification;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Trait for receiving raw notifications from a headset or a bridge.
///
/// Implementations spawn background tasks that push notifications, already
/// stamped with the host receive clock, into an mpsc channel. The receiver
/// is returned from `start`.
#[async_trait]
pub trait NotificationSource: Send + Sync + 'static {
    /// Error type for this source implementation.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Start receiving notifications.
    ///
    /// The background tasks run until the cancellation token is cancelled
    /// or the returned receiver is dropped.
    async fn start(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Notification>, Self::Error>;
}
