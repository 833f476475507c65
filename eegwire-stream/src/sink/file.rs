use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use eegwire_core::{Frame, GroupId, GroupSpec};
use tracing::info;

use super::FrameSink;

#[derive(Debug, thiserror::Error)]
pub enum CsvSinkError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No recording open for group {0}")]
    UnknownGroup(GroupId),

    #[error("Frame for {group} has {actual} channels, recording has {expected}")]
    ChannelMismatch {
        group: GroupId,
        expected: usize,
        actual: usize,
    },

    #[error("Mutex poisoned: {0}")]
    MutexPoisoned(String),

    #[error("Writer task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl<T> From<PoisonError<T>> for CsvSinkError {
    fn from(err: PoisonError<T>) -> Self {
        CsvSinkError::MutexPoisoned(err.to_string())
    }
}

struct Recording {
    writer: csv::Writer<File>,
    channels: usize,
}

type Recordings = Arc<Mutex<HashMap<GroupId, Recording>>>;

/// Records every group to its own CSV file, one row per sample.
///
/// Columns are `timestamp` followed by the group's channel names. File
/// writes run on the blocking thread pool.
pub struct CsvSink {
    dir: PathBuf,
    recordings: Recordings,
}

impl CsvSink {
    /// Creates `dir` if needed and opens `<group>.csv` for every group,
    /// truncating earlier recordings.
    pub fn create(dir: impl AsRef<Path>, groups: &[GroupSpec]) -> Result<Self, CsvSinkError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut recordings = HashMap::with_capacity(groups.len());
        for spec in groups {
            let path = Self::path_for(&dir, spec.id);
            let mut writer = csv::WriterBuilder::new()
                .delimiter(b',')
                .from_path(&path)?;

            let channels = spec.channel_count();
            let header: Vec<String> = std::iter::once("timestamp".to_string())
                .chain((0..channels).map(|channel| spec.channel_name(channel)))
                .collect();
            writer.write_record(&header)?;

            info!(group = %spec.id, path = ?path, "Recording group");
            recordings.insert(spec.id, Recording { writer, channels });
        }

        Ok(Self {
            dir,
            recordings: Arc::new(Mutex::new(recordings)),
        })
    }

    pub fn path_for(dir: &Path, group: GroupId) -> PathBuf {
        dir.join(format!("{group}.csv"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn write_frame(recordings: &Recordings, frame: &Frame) -> Result<(), CsvSinkError> {
    let mut recordings = recordings.lock()?;
    let recording = recordings
        .get_mut(&frame.group)
        .ok_or(CsvSinkError::UnknownGroup(frame.group))?;

    if recording.channels != frame.channels {
        return Err(CsvSinkError::ChannelMismatch {
            group: frame.group,
            expected: recording.channels,
            actual: frame.channels,
        });
    }

    for (sample, timestamp) in frame.timestamps.iter().enumerate() {
        let record = std::iter::once(timestamp.to_string())
            .chain(frame.column(sample).map(|value| value.to_string()));
        recording.writer.write_record(record)?;
    }

    Ok(())
}

fn flush_all(recordings: &Recordings) -> Result<(), CsvSinkError> {
    let mut recordings = recordings.lock()?;
    for recording in recordings.values_mut() {
        recording.writer.flush()?;
    }
    Ok(())
}

#[async_trait]
impl FrameSink for CsvSink {
    type Error = CsvSinkError;

    async fn publish(&self, frame: &Frame) -> Result<(), Self::Error> {
        let recordings = Arc::clone(&self.recordings);
        let frame = frame.clone();
        tokio::task::spawn_blocking(move || write_frame(&recordings, &frame)).await?
    }

    async fn flush(&self) -> Result<(), Self::Error> {
        let recordings = Arc::clone(&self.recordings);
        tokio::task::spawn_blocking(move || flush_all(&recordings)).await?
    }
}
