use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use eegwire_core::protocol::TelemetryReading;
use eegwire_core::{Advisory, AdvisoryKind, GroupId};

/// Shared counters for a running stream.
pub struct StreamState {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    startup_time: Instant,
    last_notification: Option<Instant>,
    notifications: u64,
    frames: HashMap<GroupId, u64>,
    advisories: HashMap<AdvisoryKind, u64>,
    control_messages: u64,
    last_telemetry: Option<TelemetryReading>,
}

/// Point-in-time copy of [`StreamState`].
#[derive(Debug, Clone, Default)]
pub struct StreamStats {
    pub notifications: u64,
    pub frames: BTreeMap<GroupId, u64>,
    pub advisories: BTreeMap<AdvisoryKind, u64>,
    pub control_messages: u64,
    pub last_telemetry: Option<TelemetryReading>,
    pub uptime: Duration,
}

impl StreamStats {
    pub fn frames_for(&self, group: GroupId) -> u64 {
        self.frames.get(&group).copied().unwrap_or(0)
    }

    pub fn advisories_of(&self, kind: AdvisoryKind) -> u64 {
        self.advisories.get(&kind).copied().unwrap_or(0)
    }
}

impl StreamState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                startup_time: Instant::now(),
                last_notification: None,
                notifications: 0,
                frames: HashMap::new(),
                advisories: HashMap::new(),
                control_messages: 0,
                last_telemetry: None,
            })),
        }
    }

    /// Record that a notification arrived from the source.
    pub async fn notification_received(&self) {
        let mut inner = self.inner.lock().await;
        inner.notifications += 1;
        inner.last_notification = Some(Instant::now());
    }

    pub async fn frame_published(&self, group: GroupId) {
        let mut inner = self.inner.lock().await;
        *inner.frames.entry(group).or_default() += 1;
    }

    pub async fn record_advisories(&self, advisories: &[Advisory]) {
        if advisories.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().await;
        for advisory in advisories {
            *inner.advisories.entry(advisory.kind()).or_default() += 1;
        }
    }

    pub async fn control_received(&self) {
        let mut inner = self.inner.lock().await;
        inner.control_messages += 1;
    }

    pub async fn telemetry_received(&self, reading: TelemetryReading) {
        let mut inner = self.inner.lock().await;
        inner.last_telemetry = Some(reading);
    }

    /// Time since the last notification, or since startup if none arrived.
    pub async fn idle_for(&self) -> Duration {
        let inner = self.inner.lock().await;
        inner
            .last_notification
            .unwrap_or(inner.startup_time)
            .elapsed()
    }

    pub async fn snapshot(&self) -> StreamStats {
        let inner = self.inner.lock().await;
        StreamStats {
            notifications: inner.notifications,
            frames: inner.frames.iter().map(|(k, v)| (*k, *v)).collect(),
            advisories: inner.advisories.iter().map(|(k, v)| (*k, *v)).collect(),
            control_messages: inner.control_messages,
            last_telemetry: inner.last_telemetry,
            uptime: inner.startup_time.elapsed(),
        }
    }
}

impl Default for StreamState {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StreamState {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
