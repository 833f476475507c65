use std::f64::consts::TAU;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eegwire_core::protocol::{
    ACCELEROMETER_SCALE, GYROSCOPE_SCALE, IMU_AXES, IMU_SAMPLES_PER_PACKET, Layout, ParseResult,
    encode,
};
use eegwire_core::{GroupSpec, Notification, SourceId};
use rand::Rng;
use rand::seq::SliceRandom;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::NotificationSource;
use crate::clock::HostClock;

/// Status reply a headset sends after connecting.
const STATUS_REPLY: &str =
    r#"{"hn":"Muse-MOCK","sn":"0000-MOCK-0000","ma":"00-55-da-b0-00-00","bp":80,"ps":50,"rc":0}"#;

/// Mock source that synthesizes headset traffic.
///
/// Each group gets its own generator task ticking at the group's round
/// period. Members of a round are delivered in random order with random
/// delivery delay, and single notifications can be dropped.
pub struct MockSource {
    groups: Arc<Vec<GroupSpec>>,
    control: Option<SourceId>,
    /// Upper bound of the delivery delay in seconds.
    jitter: f64,
    drop_probability: f64,
    clock: HostClock,
}

impl MockSource {
    pub fn new(
        groups: Vec<GroupSpec>,
        control: Option<SourceId>,
        jitter_ms: f64,
        drop_probability: f64,
        clock: HostClock,
    ) -> Self {
        Self {
            groups: Arc::new(groups),
            control,
            jitter: (jitter_ms / 1000.0).max(0.0),
            drop_probability: drop_probability.clamp(0.0, 1.0),
            clock,
        }
    }
}

struct Generator {
    spec: GroupSpec,
    counter: u16,
    round: u64,
    jitter: f64,
    drop_probability: f64,
    clock: HostClock,
}

impl Generator {
    fn period(&self) -> Duration {
        Duration::from_secs_f64(self.spec.samples_per_round() as f64 / self.spec.sample_rate)
    }

    fn next_round(&mut self) -> Vec<Notification> {
        let mut rng = rand::rng();
        let received = self.clock.now();
        let first_sample = self.round * self.spec.samples_per_round() as u64;

        let mut members: Vec<(usize, SourceId)> =
            self.spec.members.iter().copied().enumerate().collect();
        members.shuffle(&mut rng);

        let mut notifications = Vec::with_capacity(members.len());
        for (position, source) in members {
            if rng.random_bool(self.drop_probability) {
                debug!(group = %self.spec.id, %source, counter = self.counter, "Dropping notification");
                continue;
            }

            let payload = match self.synthesize(position, first_sample, &mut rng) {
                Ok(payload) => payload,
                Err(error) => {
                    warn!(group = %self.spec.id, %error, "Failed to encode mock payload");
                    continue;
                }
            };

            let delay = if self.jitter > 0.0 {
                rng.random_range(0.0..self.jitter)
            } else {
                0.0
            };
            notifications.push(Notification::new(source, payload.to_vec(), received + delay));
        }

        self.counter = self.counter.wrapping_add(1);
        self.round += 1;
        notifications
    }

    fn synthesize(
        &self,
        member: usize,
        first_sample: u64,
        rng: &mut impl Rng,
    ) -> ParseResult<[u8; 20]> {
        let rate = self.spec.sample_rate;
        let time = |sample: usize| (first_sample + sample as u64) as f64 / rate;
        let counter = self.counter;

        match self.spec.layout {
            Layout::Eeg => {
                // 10 Hz alpha rhythm with a per-electrode phase
                let raw = std::array::from_fn(|s| {
                    let microvolts = 20.0 * (TAU * 10.0 * time(s) + member as f64).sin()
                        + rng.random_range(-5.0..5.0);
                    encode::eeg_raw_from_microvolts(microvolts)
                });
                encode::eeg(counter, &raw)
            }
            Layout::Ppg => {
                // 72 bpm pulse on top of a per-led baseline
                let raw = std::array::from_fn(|s| {
                    let value = 80_000.0
                        + 10_000.0 * member as f64
                        + 2_000.0 * (TAU * 1.2 * time(s)).sin()
                        + rng.random_range(-50.0..50.0);
                    value.clamp(0.0, 16_777_215.0) as u32
                });
                encode::ppg(counter, &raw)
            }
            layout @ (Layout::Accelerometer | Layout::Gyroscope) => {
                let mut raw = [0i16; IMU_AXES * IMU_SAMPLES_PER_PACKET];
                for (position, field) in raw.iter_mut().enumerate() {
                    let axis = position % IMU_AXES;
                    let value = match layout {
                        // at rest, gravity along z
                        Layout::Accelerometer => {
                            let gravity = if axis == 2 { 1.0 } else { 0.0 };
                            encode::imu_raw(
                                gravity + rng.random_range(-0.01..0.01),
                                ACCELEROMETER_SCALE,
                            )
                        }
                        _ => encode::imu_raw(rng.random_range(-2.0..2.0), GYROSCOPE_SCALE),
                    };
                    *field = value;
                }
                Ok(encode::imu(counter, &raw))
            }
            Layout::Telemetry => Ok(encode::telemetry(counter, 80 * 512, 1682, 0, 30)),
        }
    }
}

async fn run_generator(
    mut generator: Generator,
    tx: mpsc::Sender<Notification>,
    cancel: CancellationToken,
) {
    let group = generator.spec.id;
    let mut interval = tokio::time::interval(generator.period());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(%group, "Mock generator shutting down");
                break;
            }
            _ = interval.tick() => {
                for notification in generator.next_round() {
                    if tx.send(notification).await.is_err() {
                        info!(%group, "Channel closed, mock generator shutting down");
                        return;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl NotificationSource for MockSource {
    type Error = std::convert::Infallible;

    async fn start(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Notification>, Self::Error> {
        let (tx, rx) = mpsc::channel(512);

        info!(
            groups = self.groups.len(),
            jitter_secs = self.jitter,
            drop_probability = self.drop_probability,
            "Starting mock notification source"
        );

        if let Some(source) = self.control {
            let tx = tx.clone();
            let received = self.clock.now();
            tokio::spawn(async move {
                let chunks = match encode::control(STATUS_REPLY) {
                    Ok(chunks) => chunks,
                    Err(error) => {
                        warn!(%error, "Failed to encode mock status reply");
                        return;
                    }
                };
                for chunk in chunks {
                    let notification = Notification::new(source, chunk.to_vec(), received);
                    if tx.send(notification).await.is_err() {
                        return;
                    }
                }
            });
        }

        for spec in self.groups.iter() {
            let generator = Generator {
                spec: spec.clone(),
                counter: 0,
                round: 0,
                jitter: self.jitter,
                drop_probability: self.drop_probability,
                clock: self.clock,
            };
            tokio::spawn(run_generator(generator, tx.clone(), cancel.clone()));
        }

        Ok(rx)
    }
}
