use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use eegwire_core::control::ControlReassembler;
use eegwire_core::protocol::TelemetryReading;
use eegwire_core::{
    Advisory, GroupId, GroupPipeline, GroupSpec, Notification, PipelineOptions, Route, Router,
    SourceId,
};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::control::ControlResponse;
use crate::sink::FrameSink;
use crate::source::NotificationSource;
use crate::state::{StreamState, StreamStats};

/// Everything needed to turn notifications into frames.
#[derive(Debug, Clone)]
pub struct StreamSetup {
    pub groups: Vec<GroupSpec>,
    pub control: Option<SourceId>,
    pub options: PipelineOptions,
    /// Stop after this long without a notification.
    pub idle_timeout: Option<Duration>,
    pub channel_capacity: usize,
}

const WATCHDOG_PERIOD: Duration = Duration::from_millis(500);

/// Runs the stream until the source closes, the idle watchdog fires, or
/// `cancel` is cancelled.
///
/// Each group gets its own task owning its [`GroupPipeline`]; this task only
/// routes. On exit all group tasks are drained, incomplete rounds are
/// dropped and the sink is flushed.
pub async fn run_stream<N, S>(
    source: N,
    sink: Arc<S>,
    setup: StreamSetup,
    state: StreamState,
    cancel: CancellationToken,
) -> color_eyre::Result<StreamStats>
where
    N: NotificationSource,
    S: FrameSink,
{
    let router = Router::new(&setup.groups, setup.control)?;
    let capacity = setup.channel_capacity.max(1);

    let mut senders: HashMap<GroupId, mpsc::Sender<Notification>> = HashMap::new();
    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    for spec in setup.groups {
        let pipeline = GroupPipeline::new(spec, &setup.options)?;
        let (tx, rx) = mpsc::channel(capacity);
        senders.insert(pipeline.id(), tx);
        handles.push(tokio::spawn(run_group(
            pipeline,
            rx,
            Arc::clone(&sink),
            state.clone(),
        )));
    }

    let control_tx = match setup.control {
        Some(_) => {
            let (tx, rx) = mpsc::channel(capacity);
            handles.push(tokio::spawn(run_control(rx, state.clone())));
            Some(tx)
        }
        None => None,
    };

    let mut notifications = source.start(cancel.clone()).await?;
    info!(groups = senders.len(), "Stream started");

    let mut watchdog = tokio::time::interval(WATCHDOG_PERIOD);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Stream cancelled");
                break;
            }
            _ = watchdog.tick(), if setup.idle_timeout.is_some() => {
                let idle = state.idle_for().await;
                if setup.idle_timeout.is_some_and(|timeout| idle >= timeout) {
                    warn!(idle_secs = idle.as_secs_f64(), "No data received, stopping stream");
                    break;
                }
            }
            notification = notifications.recv() => {
                let Some(notification) = notification else {
                    info!("Notification source closed");
                    break;
                };
                state.notification_received().await;

                let source_id = notification.source;
                let delivery = match router.route(source_id) {
                    Some(Route::Group(group)) => match senders.get(&group) {
                        Some(tx) => deliver(tx, notification, Some(group)),
                        None => Delivery::Sent,
                    },
                    Some(Route::Control) => match &control_tx {
                        Some(tx) => deliver(tx, notification, None),
                        None => Delivery::Sent,
                    },
                    None => {
                        warn!(source = %source_id, "Notification from unrouted source");
                        Delivery::Dropped(Advisory::UnroutedSource { source_id })
                    }
                };
                match delivery {
                    Delivery::Sent => {}
                    Delivery::Dropped(advisory) => {
                        state.record_advisories(std::slice::from_ref(&advisory)).await;
                    }
                    Delivery::Closed => {
                        error!("Worker channel closed, stopping stream");
                        break;
                    }
                }
            }
        }
    }

    // stops the source tasks; dropping the senders lets the workers drain
    cancel.cancel();
    drop(senders);
    drop(control_tx);
    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "Worker task failed");
        }
    }

    sink.flush().await?;

    let stats = state.snapshot().await;
    info!(
        notifications = stats.notifications,
        frames = ?stats.frames,
        advisories = ?stats.advisories,
        "Stream stopped"
    );
    Ok(stats)
}

enum Delivery {
    Sent,
    Dropped(Advisory),
    Closed,
}

/// Hands a notification to a worker without waiting, so a stalled group
/// cannot hold up the others. `group` is `None` for the control worker.
fn deliver(
    tx: &mpsc::Sender<Notification>,
    notification: Notification,
    group: Option<GroupId>,
) -> Delivery {
    let source_id = notification.source;
    match tx.try_send(notification) {
        Ok(()) => Delivery::Sent,
        Err(TrySendError::Full(_)) => {
            warn!(group = ?group, source = %source_id, "Worker queue full, dropping notification");
            Delivery::Dropped(Advisory::NotificationDropped { group, source_id })
        }
        Err(TrySendError::Closed(_)) => Delivery::Closed,
    }
}

#[instrument(name = "group", skip_all, fields(group = %pipeline.id()))]
async fn run_group<S: FrameSink>(
    mut pipeline: GroupPipeline,
    mut rx: mpsc::Receiver<Notification>,
    sink: Arc<S>,
    state: StreamState,
) {
    info!("Group worker started");

    while let Some(notification) = rx.recv().await {
        let outcome = pipeline.submit(
            notification.source,
            &notification.payload,
            notification.receive_clock,
        );
        state.record_advisories(&outcome.advisories).await;

        let Some(frame) = outcome.frame else {
            continue;
        };

        if let Some(reading) = TelemetryReading::from_frame(&frame) {
            debug!(
                battery = reading.battery,
                fuel_gauge = reading.fuel_gauge,
                temperature = reading.temperature,
                "Telemetry"
            );
            state.telemetry_received(reading).await;
        }

        match sink.publish(&frame).await {
            Ok(()) => state.frame_published(frame.group).await,
            Err(e) => error!(error = %e, counter = frame.counter, "Failed to publish frame"),
        }
    }

    if pipeline.pending() > 0 {
        debug!(pending = pipeline.pending(), "Discarding incomplete round");
        pipeline.discard_pending();
    }
    info!(frames = pipeline.frames_emitted(), "Group worker stopped");
}

#[instrument(name = "control", skip_all)]
async fn run_control(mut rx: mpsc::Receiver<Notification>, state: StreamState) {
    let mut reassembler = ControlReassembler::new();

    while let Some(notification) = rx.recv().await {
        let Some(message) = reassembler.submit(&notification.payload) else {
            continue;
        };

        let response = ControlResponse::parse(message);
        if response.is_structured() {
            info!(
                device = response.device_name(),
                serial = response.serial_number(),
                battery = response.battery_percent(),
                rc = response.return_code(),
                "Control response"
            );
        } else {
            info!(raw = %response.raw, "Control message");
        }
        state.control_received().await;
    }

    if !reassembler.pending().is_empty() {
        debug!(pending = reassembler.pending(), "Discarding partial control message");
    }
}
