use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};
use tokio::{
    io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpListener,
    sync::mpsc,
    time::sleep,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use super::NotificationSource;
use crate::clock::HostClock;
use eegwire_core::{Notification, SourceId};

pub const ENVELOPE_PREAMBLE: u16 = 0xE45A;
pub const ENVELOPE_VERSION: u8 = 0x01;
pub const HANDSHAKE: &[u8; 5] = b"HELLO";

/// One notification as forwarded by a bridge process.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct Envelope<'a> {
    pub preamble: u16,
    pub version: u8,
    /// Characteristic short id.
    pub source: u16,
    pub payload: &'a [u8],
}

impl<'a> Envelope<'a> {
    pub fn new(source: SourceId, payload: &'a [u8]) -> Self {
        Self {
            preamble: ENVELOPE_PREAMBLE,
            version: ENVELOPE_VERSION,
            source: source.0,
            payload,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TcpSourceError {
    #[error("Handshake failed: expected HELLO, got {0:?}")]
    HandshakeMismatch([u8; 5]),

    #[error("Postcard deserialization failed: {0}")]
    Postcard(#[from] postcard::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid envelope preamble: {0:#06X}")]
    InvalidPreamble(u16),

    #[error("Unsupported envelope version: {0}")]
    UnsupportedVersion(u8),

    #[error("Internal notification channel closed")]
    ChannelClosed,
}

/// Accepts bridge connections that forward headset notifications.
///
/// A bridge opens a TCP connection, sends `HELLO`, and then streams
/// postcard-encoded [`Envelope`]s. Each envelope is stamped with the host
/// clock as soon as its bytes are read.
pub struct TcpSource {
    addr: SocketAddr,
    clock: HostClock,
}

impl TcpSource {
    pub fn new(addr: SocketAddr, clock: HostClock) -> Self {
        Self { addr, clock }
    }
}

#[async_trait]
impl NotificationSource for TcpSource {
    type Error = io::Error;

    async fn start(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Notification>, Self::Error> {
        let (tx, rx) = mpsc::channel(512);
        let addr = self.addr;

        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "TCP notification source started");

        tokio::spawn(run_server_loop(listener, tx, cancel, self.clock));

        Ok(rx)
    }
}

#[instrument(name = "server_loop", skip_all)]
async fn run_server_loop(
    listener: TcpListener,
    tx: mpsc::Sender<Notification>,
    cancel: CancellationToken,
    clock: HostClock,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Closing TCP notification source");
                break;
            }
            client = listener.accept() => {
                match client {
                    Ok((stream, addr)) => {
                        info!(%addr, "Bridge connected");

                        let cancel = cancel.clone();
                        let tx = tx.clone();

                        tokio::spawn(async move {
                            if let Err(e) = handle_bridge(stream, tx, cancel, clock).await {
                                error!(error = %e, %addr, "Bridge connection closed with error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        if is_transient_error(&e) {
                            sleep(Duration::from_millis(100)).await;
                        } else {
                            break;
                        }
                    }
                }
            }
        }
    }
}

fn is_transient_error(e: &std::io::Error) -> bool {
    use std::io::ErrorKind::*;
    matches!(
        e.kind(),
        ConnectionRefused | ConnectionAborted | ConnectionReset | OutOfMemory | Other
    )
}

#[instrument(name = "bridge", skip_all)]
async fn handle_bridge<S>(
    mut stream: S,
    tx: mpsc::Sender<Notification>,
    cancel: CancellationToken,
    clock: HostClock,
) -> Result<(), TcpSourceError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut hello = [0u8; 5];
    stream.read_exact(&mut hello).await?;

    if &hello != HANDSHAKE {
        return Err(TcpSourceError::HandshakeMismatch(hello));
    }
    stream.write_all(HANDSHAKE).await?;
    info!("Handshake complete");

    let mut buf: Vec<u8> = Vec::with_capacity(128);
    let mut tmp = [0u8; 256];
    let mut forwarded = 0u64;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Shutdown signal received");
                break;
            }
            read = stream.read(&mut tmp) => {
                let n = match read? {
                    0 => {
                        info!(forwarded, "Bridge closed connection");
                        break;
                    }
                    n => n,
                };
                let receive_clock = clock.now();

                buf.extend_from_slice(&tmp[..n]);

                while !buf.is_empty() {
                    let (envelope, rest) = match postcard::take_from_bytes::<Envelope>(&buf) {
                        Ok(v) => v,
                        Err(postcard::Error::DeserializeUnexpectedEnd) => break,
                        Err(e) => return Err(TcpSourceError::Postcard(e)),
                    };

                    if envelope.preamble != ENVELOPE_PREAMBLE {
                        return Err(TcpSourceError::InvalidPreamble(envelope.preamble));
                    }
                    if envelope.version != ENVELOPE_VERSION {
                        warn!(version = envelope.version, "Unsupported envelope version");
                        return Err(TcpSourceError::UnsupportedVersion(envelope.version));
                    }

                    let notification = Notification::new(
                        SourceId(envelope.source),
                        envelope.payload,
                        receive_clock,
                    );
                    if tx.send(notification).await.is_err() {
                        error!("Internal notification channel closed");
                        return Err(TcpSourceError::ChannelClosed);
                    }
                    forwarded += 1;

                    buf = rest.to_vec();
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn bridge_session(
        frames: Vec<u8>,
    ) -> (Result<(), TcpSourceError>, Vec<Notification>, [u8; 5]) {
        let (mut bridge, host) = io::duplex(1024);
        let (tx, mut rx) = mpsc::channel(16);
        let handler = tokio::spawn(handle_bridge(
            host,
            tx,
            CancellationToken::new(),
            HostClock::new(),
        ));

        bridge.write_all(&frames).await.unwrap();
        let mut reply = [0u8; 5];
        bridge.read_exact(&mut reply).await.unwrap();
        drop(bridge);

        let result = handler.await.unwrap();
        let mut notifications = Vec::new();
        while let Some(notification) = rx.recv().await {
            notifications.push(notification);
        }
        (result, notifications, reply)
    }

    #[tokio::test]
    async fn forwards_envelopes_after_handshake() {
        let mut frames = HANDSHAKE.to_vec();
        frames.extend(Envelope::new(SourceId(0x0003), &[1, 2, 3]).to_bytes().unwrap());
        frames.extend(Envelope::new(SourceId(0x000b), &[9; 20]).to_bytes().unwrap());

        let (result, notifications, reply) = bridge_session(frames).await;

        assert!(result.is_ok());
        assert_eq!(&reply, HANDSHAKE);
        assert_eq!(notifications.len(), 2);
        assert_eq!(notifications[0].source, SourceId(0x0003));
        assert_eq!(notifications[0].payload.as_ref(), &[1, 2, 3]);
        assert_eq!(notifications[1].payload.len(), 20);
        assert!(notifications[0].receive_clock > 0.0);
    }

    #[tokio::test]
    async fn rejects_bad_preamble() {
        let mut frames = HANDSHAKE.to_vec();
        let mut envelope = Envelope::new(SourceId(0x0003), &[1]);
        envelope.preamble = 0xBEEF;
        frames.extend(envelope.to_bytes().unwrap());

        let (result, notifications, _) = bridge_session(frames).await;

        assert!(matches!(result, Err(TcpSourceError::InvalidPreamble(0xBEEF))));
        assert!(notifications.is_empty());
    }

    #[tokio::test]
    async fn rejects_wrong_handshake() {
        let (mut bridge, host) = io::duplex(64);
        let (tx, _rx) = mpsc::channel(1);
        let handler = tokio::spawn(handle_bridge(
            host,
            tx,
            CancellationToken::new(),
            HostClock::new(),
        ));

        bridge.write_all(b"HOLA!").await.unwrap();

        let result = handler.await.unwrap();
        assert!(matches!(result, Err(TcpSourceError::HandshakeMismatch(_))));
    }
}
