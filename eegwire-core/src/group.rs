use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::protocol::Layout;
use crate::{GroupId, SourceId};

/// What to do when a packet arrives for a slot that is already filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResyncPolicy {
    /// The most recent packet replaces the stale one.
    #[default]
    Overwrite,
    /// The slot keeps its first packet and the late one is discarded.
    KeepFirst,
}

/// How a group's samples are timestamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
    /// Linear regression of sample index against receive time.
    Regression,
    /// Every sample of a round gets the round's earliest receive time.
    Receive,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockOptions {
    pub initial_covariance: f64,
    /// Largest accepted relative deviation of the fitted sample period
    /// from the nominal one.
    pub max_rate_deviation: f64,
}

impl Default for ClockOptions {
    fn default() -> Self {
        Self {
            initial_covariance: 1e-4,
            max_rate_deviation: 0.2,
        }
    }
}

impl ClockOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.initial_covariance.is_finite() && self.initial_covariance > 0.0) {
            return Err(ConfigError::InvalidClockOptions(
                "initial_covariance must be finite and positive",
            ));
        }
        if !(self.max_rate_deviation.is_finite() && self.max_rate_deviation > 0.0) {
            return Err(ConfigError::InvalidClockOptions(
                "max_rate_deviation must be finite and positive",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineOptions {
    pub resync: ResyncPolicy,
    pub clock: ClockOptions,
}

/// Static description of one channel group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub id: GroupId,
    pub layout: Layout,
    /// Member sources in output channel order. Fixed for the lifetime of the
    /// group.
    pub members: Vec<SourceId>,
    /// Nominal samples per second.
    pub sample_rate: f64,
    /// Per-channel gain, one entry per output channel. Empty means unity.
    #[serde(default)]
    pub gains: Vec<f64>,
    pub timing: Timing,
    #[serde(default)]
    pub channel_names: Vec<String>,
    #[serde(default)]
    pub unit: String,
}

impl GroupSpec {
    pub fn channel_count(&self) -> usize {
        self.members.len() * self.layout.channels()
    }

    pub fn samples_per_round(&self) -> usize {
        self.layout.samples()
    }

    pub fn gain(&self, channel: usize) -> f64 {
        self.gains.get(channel).copied().unwrap_or(1.0)
    }

    /// Name of an output channel, falling back to `ch<N>`.
    pub fn channel_name(&self, channel: usize) -> String {
        self.channel_names
            .get(channel)
            .cloned()
            .unwrap_or_else(|| format!("ch{channel}"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.members.is_empty() {
            return Err(ConfigError::NoMembers(self.id));
        }

        let mut seen = HashSet::new();
        for member in &self.members {
            if !seen.insert(member) {
                return Err(ConfigError::DuplicateMember {
                    group: self.id,
                    source_id: *member,
                });
            }
        }

        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(ConfigError::InvalidSampleRate {
                group: self.id,
                rate: self.sample_rate,
            });
        }

        let channels = self.channel_count();
        if !self.gains.is_empty() && self.gains.len() != channels {
            return Err(ConfigError::GainCount {
                group: self.id,
                gains: self.gains.len(),
                channels,
            });
        }
        if !self.channel_names.is_empty() && self.channel_names.len() != channels {
            return Err(ConfigError::ChannelNameCount {
                group: self.id,
                names: self.channel_names.len(),
                channels,
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("group {0} has no members")]
    NoMembers(GroupId),
    #[error("group {group} lists source {source_id} more than once")]
    DuplicateMember { group: GroupId, source_id: SourceId },
    #[error("group {0} is configured more than once")]
    DuplicateGroup(GroupId),
    #[error("source {source_id} is routed to both {first} and {second}")]
    SourceConflict {
        source_id: SourceId,
        first: String,
        second: String,
    },
    #[error("group {group} has invalid sample rate {rate}")]
    InvalidSampleRate { group: GroupId, rate: f64 },
    #[error("group {group} has {gains} gains for {channels} channels")]
    GainCount {
        group: GroupId,
        gains: usize,
        channels: usize,
    },
    #[error("group {group} has {names} channel names for {channels} channels")]
    ChannelNameCount {
        group: GroupId,
        names: usize,
        channels: usize,
    },
    #[error("invalid clock options: {0}")]
    InvalidClockOptions(&'static str),
}
