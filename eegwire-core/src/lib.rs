pub mod assembler;
pub mod clock;
pub mod control;
pub mod diagnostics;
pub mod group;
pub mod pipeline;
pub mod presets;
pub mod protocol;
pub mod sequence;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use diagnostics::{Advisory, AdvisoryKind};
pub use group::{ClockOptions, ConfigError, GroupSpec, PipelineOptions, ResyncPolicy, Timing};
pub use pipeline::{GroupOutcome, GroupPipeline, Outcome, Output, Pipeline, Route, Router};

// We use `Box<[T]>` for buffers that never grow once built. This keeps
// allocations compact and makes accidental pushes a compile error.
type BoxList<T> = Box<[T]>;

/// Short identifier of the characteristic a notification arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub u16);

impl SourceId {
    /// Full 128-bit characteristic UUID in its canonical textual form.
    pub fn uuid(&self) -> String {
        format!("273e{:04x}-4c4d-454d-96be-f03bac821358", self.0)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

/// Logical channel group. Each group owns its own assembler, counter
/// tracker and clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupId {
    Eeg,
    Ppg,
    Accelerometer,
    Gyroscope,
    Telemetry,
}

impl GroupId {
    pub const ALL: [GroupId; 5] = [
        GroupId::Eeg,
        GroupId::Ppg,
        GroupId::Accelerometer,
        GroupId::Gyroscope,
        GroupId::Telemetry,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            GroupId::Eeg => "eeg",
            GroupId::Ppg => "ppg",
            GroupId::Accelerometer => "accelerometer",
            GroupId::Gyroscope => "gyroscope",
            GroupId::Telemetry => "telemetry",
        }
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw notification as delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Characteristic the payload arrived on.
    pub source: SourceId,
    /// Undecoded payload bytes.
    pub payload: BoxList<u8>,
    /// Host receive time in seconds. Only ever compared against other
    /// receive times from the same host clock.
    pub receive_clock: f64,
}

impl Notification {
    pub fn new(source: SourceId, payload: impl Into<Box<[u8]>>, receive_clock: f64) -> Self {
        Self {
            source,
            payload: payload.into(),
            receive_clock,
        }
    }
}

/// A completed, timestamped block of samples for one group.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub group: GroupId,
    /// Counter of the packet that completed the round.
    pub counter: u16,
    /// Absolute index of the first sample in this frame.
    pub first_index: u64,
    pub channels: usize,
    pub samples: usize,
    /// Row-major `channels x samples` matrix, gains applied.
    pub values: BoxList<f64>,
    /// One timestamp per sample column.
    pub timestamps: BoxList<f64>,
}

impl Frame {
    /// Samples of a single channel.
    pub fn row(&self, channel: usize) -> &[f64] {
        let start = channel * self.samples;
        &self.values[start..start + self.samples]
    }

    /// Values of every channel at one sample column.
    pub fn column(&self, sample: usize) -> impl Iterator<Item = f64> + '_ {
        (0..self.channels).map(move |channel| self.values[channel * self.samples + sample])
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.timestamps.last().copied()
    }
}
