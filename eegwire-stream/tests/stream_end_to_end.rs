use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eegwire_core::protocol::{EEG_SCALE, encode};
use eegwire_core::{
    AdvisoryKind, Frame, GroupId, Notification, PipelineOptions, SourceId, presets,
};
use eegwire_stream::sink::memory::MemorySinkError;
use eegwire_stream::{
    FrameSink, HostClock, MemorySink, MockSource, NotificationSource, StreamSetup, StreamState,
    run_stream,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Replays a fixed list of notifications, then closes.
struct ScriptedSource {
    notifications: Vec<Notification>,
}

#[async_trait]
impl NotificationSource for ScriptedSource {
    type Error = Infallible;

    async fn start(
        &self,
        _cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Notification>, Self::Error> {
        let (tx, rx) = mpsc::channel(16);
        let notifications = self.notifications.clone();
        tokio::spawn(async move {
            for notification in notifications {
                if tx.send(notification).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}

/// Never sends anything but keeps the channel open until cancelled.
struct SilentSource;

#[async_trait]
impl NotificationSource for SilentSource {
    type Error = Infallible;

    async fn start(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Notification>, Self::Error> {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            cancel.cancelled().await;
            drop(tx);
        });
        Ok(rx)
    }
}

/// Holds EEG frames until `gate` is cancelled, passes the rest through.
struct GatedSink {
    inner: MemorySink,
    gate: CancellationToken,
}

#[async_trait]
impl FrameSink for GatedSink {
    type Error = MemorySinkError;

    async fn publish(&self, frame: &Frame) -> Result<(), Self::Error> {
        if frame.group == GroupId::Eeg {
            self.gate.cancelled().await;
        }
        self.inner.publish(frame).await
    }

    async fn flush(&self) -> Result<(), Self::Error> {
        self.inner.flush().await
    }
}

const EEG_MEMBERS: [SourceId; 5] = [
    presets::TP9,
    presets::AF7,
    presets::AF8,
    presets::TP10,
    presets::RIGHT_AUX,
];

fn eeg(source: SourceId, counter: u16, offset: u16, receive: f64) -> Notification {
    let payload = encode::eeg(counter, &[2048 + offset; 12]).unwrap();
    Notification::new(source, payload.to_vec(), receive)
}

fn setup(groups: Vec<eegwire_core::GroupSpec>) -> StreamSetup {
    StreamSetup {
        groups,
        control: Some(presets::CONTROL),
        options: PipelineOptions::default(),
        idle_timeout: None,
        channel_capacity: 256,
    }
}

/// Round 100, lost round 101, round 102 with TP9 delivered twice, one
/// telemetry packet, a chunked control reply and a stray source.
fn session() -> Vec<Notification> {
    let mut notifications = Vec::new();
    for (i, source) in EEG_MEMBERS.iter().enumerate() {
        notifications.push(eeg(*source, 100, 0, 10.0 + i as f64 * 0.001));
    }

    for chunk in encode::control(r#"{"hn":"Muse-7A2C","bp":83,"rc":0}"#).unwrap() {
        notifications.push(Notification::new(presets::CONTROL, chunk.to_vec(), 10.02));
    }

    let telemetry = encode::telemetry(9, 512 * 80, 3000, 2000, 30);
    notifications.push(Notification::new(presets::TELEMETRY, telemetry.to_vec(), 10.03));

    notifications.push(Notification::new(SourceId(0x0042), vec![0u8; 20], 10.04));

    let second = 10.0 + 24.0 / 256.0;
    notifications.push(eeg(presets::TP9, 102, 100, second));
    notifications.push(eeg(presets::TP9, 102, 200, second + 0.001));
    for (i, source) in EEG_MEMBERS.iter().enumerate().skip(1) {
        notifications.push(eeg(*source, 102, 0, second + i as f64 * 0.001));
    }
    notifications
}

#[tokio::test]
async fn scripted_session_reaches_sink() -> color_eyre::Result<()> {
    let source = ScriptedSource {
        notifications: session(),
    };
    let sink = Arc::new(MemorySink::default());
    let state = StreamState::new();

    let stats = run_stream(
        source,
        Arc::clone(&sink),
        setup(vec![presets::eeg(), presets::telemetry()]),
        state,
        CancellationToken::new(),
    )
    .await?;

    let eeg_frames = sink.frames_for(GroupId::Eeg)?;
    assert_eq!(eeg_frames.len(), 2);
    assert_eq!((eeg_frames[0].first_index, eeg_frames[1].first_index), (0, 24));
    assert!(eeg_frames[1].row(0).iter().all(|v| *v == 200.0 * EEG_SCALE));
    assert!(eeg_frames[1].timestamps[0] >= eeg_frames[0].timestamps[11]);

    let telemetry = sink.frames_for(GroupId::Telemetry)?;
    assert_eq!(telemetry.len(), 1);

    assert_eq!(stats.notifications, session().len() as u64);
    assert_eq!(stats.frames_for(GroupId::Eeg), 2);
    assert_eq!(stats.frames_for(GroupId::Telemetry), 1);
    assert_eq!(stats.advisories_of(AdvisoryKind::SampleGap), 1);
    assert_eq!(stats.advisories_of(AdvisoryKind::ResyncOverwrite), 1);
    assert_eq!(stats.advisories_of(AdvisoryKind::UnroutedSource), 1);
    assert_eq!(stats.control_messages, 1);

    let reading = stats.last_telemetry.expect("telemetry reading");
    assert_eq!(reading.counter, 9);
    assert!((reading.battery - 80.0).abs() < 1e-9);

    assert_eq!(sink.flush_count()?, 1);
    Ok(())
}

#[tokio::test]
async fn idle_timeout_stops_silent_stream() -> color_eyre::Result<()> {
    let sink = Arc::new(MemorySink::default());
    let mut setup = setup(presets::all());
    setup.idle_timeout = Some(Duration::from_millis(300));

    let stats = tokio::time::timeout(
        Duration::from_secs(5),
        run_stream(
            SilentSource,
            Arc::clone(&sink),
            setup,
            StreamState::new(),
            CancellationToken::new(),
        ),
    )
    .await??;

    assert_eq!(stats.notifications, 0);
    assert!(sink.frames()?.is_empty());
    assert_eq!(sink.flush_count()?, 1);
    Ok(())
}

#[tokio::test]
async fn mock_source_streams_until_cancelled() -> color_eyre::Result<()> {
    let groups = presets::all();
    let source = MockSource::new(
        groups.clone(),
        Some(presets::CONTROL),
        2.0,
        0.0,
        HostClock::new(),
    );
    let sink = Arc::new(MemorySink::default());
    let cancel = CancellationToken::new();

    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(400)).await;
        stopper.cancel();
    });

    let stats = run_stream(
        source,
        Arc::clone(&sink),
        setup(groups),
        StreamState::new(),
        cancel,
    )
    .await?;

    assert!(stats.notifications > 0);
    assert!(stats.frames_for(GroupId::Eeg) > 0);
    assert_eq!(stats.advisories_of(AdvisoryKind::UnroutedSource), 0);
    assert_eq!(stats.advisories_of(AdvisoryKind::MalformedPacket), 0);

    for frame in sink.frames_for(GroupId::Eeg)? {
        assert_eq!((frame.channels, frame.samples), (5, 12));
        assert!(frame.timestamps.windows(2).all(|pair| pair[1] > pair[0]));
    }
    Ok(())
}

#[tokio::test]
async fn stalled_group_does_not_block_others() -> color_eyre::Result<()> {
    let mut notifications = Vec::new();
    for counter in 0..5u16 {
        for source in EEG_MEMBERS {
            notifications.push(eeg(source, counter, 0, 1.0 + f64::from(counter) * 0.05));
        }
    }
    for counter in 1..=2u16 {
        let telemetry = encode::telemetry(counter, 512 * 70, 3000, 2000, 30);
        notifications.push(Notification::new(
            presets::TELEMETRY,
            telemetry.to_vec(),
            2.0 + f64::from(counter),
        ));
    }

    let memory = MemorySink::default();
    let gate = CancellationToken::new();
    let sink = Arc::new(GatedSink {
        inner: memory.clone(),
        gate: gate.clone(),
    });

    // EEG stays stuck until telemetry got through on its own
    let watcher = memory.clone();
    tokio::spawn(async move {
        loop {
            match watcher.frames_for(GroupId::Telemetry) {
                Ok(frames) if frames.len() == 2 => break,
                _ => tokio::time::sleep(Duration::from_millis(5)).await,
            }
        }
        gate.cancel();
    });

    let mut setup = setup(vec![presets::eeg(), presets::telemetry()]);
    setup.channel_capacity = 2;

    let stats = tokio::time::timeout(
        Duration::from_secs(5),
        run_stream(
            ScriptedSource { notifications },
            sink,
            setup,
            StreamState::new(),
            CancellationToken::new(),
        ),
    )
    .await??;

    assert_eq!(stats.frames_for(GroupId::Telemetry), 2);
    assert!(stats.frames_for(GroupId::Eeg) < 5);
    assert!(stats.advisories_of(AdvisoryKind::NotificationDropped) > 0);
    assert_eq!(memory.flush_count()?, 1);
    Ok(())
}
