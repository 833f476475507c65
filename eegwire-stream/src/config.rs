use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eegwire_core::{
    ClockOptions, GroupId, GroupSpec, PipelineOptions, ResyncPolicy, SourceId, presets,
};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub stream: StreamConfig,
    pub clock: ClockOptions,
    pub source: SourceConfig,
    pub sink: SinkConfig,
    pub groups: GroupsConfig,
    /// Full replacements for preset groups, matched by id.
    #[serde(rename = "group")]
    pub group_overrides: Vec<GroupSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Stop after this many seconds without a notification. Zero disables
    /// the watchdog.
    pub idle_timeout_secs: u64,
    pub resync_policy: ResyncPolicy,
    /// Capacity of each per-group channel. Notifications arriving while a
    /// channel is full are dropped.
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 60,
            resync_policy: ResyncPolicy::default(),
            channel_capacity: 256,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    Mock {
        /// Upper bound of the simulated delivery delay
        #[serde(default = "default_jitter_ms")]
        jitter_ms: f64,
        /// Chance that any single notification is lost
        #[serde(default = "default_drop_probability")]
        drop_probability: f64,
    },
    Tcp {
        addr: SocketAddr,
    },
}

fn default_jitter_ms() -> f64 {
    8.0
}

fn default_drop_probability() -> f64 {
    0.001
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Mock {
            jitter_ms: default_jitter_ms(),
            drop_probability: default_drop_probability(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkConfig {
    #[default]
    Log,
    Csv {
        dir: PathBuf,
    },
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GroupsConfig {
    pub eeg: bool,
    pub ppg: bool,
    pub accelerometer: bool,
    pub gyroscope: bool,
    pub telemetry: bool,
    pub control: bool,
}

impl Default for GroupsConfig {
    fn default() -> Self {
        Self {
            eeg: true,
            ppg: true,
            accelerometer: true,
            gyroscope: true,
            telemetry: true,
            control: true,
        }
    }
}

impl GroupsConfig {
    pub fn enabled(&self, id: GroupId) -> bool {
        match id {
            GroupId::Eeg => self.eeg,
            GroupId::Ppg => self.ppg,
            GroupId::Accelerometer => self.accelerometer,
            GroupId::Gyroscope => self.gyroscope,
            GroupId::Telemetry => self.telemetry,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Enabled groups, presets unless overridden.
    pub fn group_specs(&self) -> Vec<GroupSpec> {
        GroupId::ALL
            .into_iter()
            .filter(|id| self.groups.enabled(*id))
            .map(|id| {
                self.group_overrides
                    .iter()
                    .find(|spec| spec.id == id)
                    .cloned()
                    .unwrap_or_else(|| presets::for_group(id))
            })
            .collect()
    }

    pub fn control_source(&self) -> Option<SourceId> {
        self.groups.control.then_some(presets::CONTROL)
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            resync: self.stream.resync_policy,
            clock: self.clock,
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.stream.idle_timeout_secs > 0)
            .then(|| Duration::from_secs(self.stream.idle_timeout_secs))
    }
}
