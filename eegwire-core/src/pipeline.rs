use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

use tracing::{debug, trace, warn};

use crate::assembler::{AssemblyError, FrameAssembler, Round};
use crate::clock::ClockModel;
use crate::control::ControlReassembler;
use crate::diagnostics::Advisory;
use crate::group::{ConfigError, GroupSpec, PipelineOptions, Timing};
use crate::sequence::{SequenceEvent, SequenceTracker};
use crate::{BoxList, Frame, GroupId, Notification, SourceId};

#[derive(Debug, Default)]
pub struct GroupOutcome {
    pub frame: Option<Frame>,
    pub advisories: Vec<Advisory>,
}

/// Everything one channel group needs, owned in one place: decode,
/// assemble, sequence and timestamp.
#[derive(Debug)]
pub struct GroupPipeline {
    spec: GroupSpec,
    assembler: FrameAssembler,
    sequence: SequenceTracker,
    clock: Option<ClockModel>,
    // last emitted timestamp; later rounds never start before it
    floor: Option<f64>,
    frames: u64,
}

impl GroupPipeline {
    pub fn new(spec: GroupSpec, options: &PipelineOptions) -> Result<Self, ConfigError> {
        spec.validate()?;
        options.clock.validate()?;

        let layout = spec.layout;
        let assembler = FrameAssembler::new(
            spec.id,
            &spec.members,
            (layout.channels(), layout.samples()),
            options.resync,
        );
        let clock = match spec.timing {
            Timing::Regression => Some(ClockModel::new(spec.sample_rate, &options.clock)),
            Timing::Receive => None,
        };

        Ok(Self {
            sequence: SequenceTracker::new(layout.samples()),
            assembler,
            clock,
            floor: None,
            frames: 0,
            spec,
        })
    }

    pub fn id(&self) -> GroupId {
        self.spec.id
    }

    pub fn spec(&self) -> &GroupSpec {
        &self.spec
    }

    pub fn clock(&self) -> Option<&ClockModel> {
        self.clock.as_ref()
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames
    }

    pub fn pending(&self) -> usize {
        self.assembler.pending()
    }

    /// Drops a partially assembled round, e.g. on shutdown.
    pub fn discard_pending(&mut self) {
        self.assembler.discard();
    }

    pub fn submit(
        &mut self,
        source_id: SourceId,
        payload: &[u8],
        receive_clock: f64,
    ) -> GroupOutcome {
        let group = self.spec.id;
        let mut outcome = GroupOutcome::default();

        let packet = match self.spec.layout.decode(payload) {
            Ok(packet) => packet,
            Err(error) => {
                warn!(%group, source = %source_id, %error, "Dropping malformed packet");
                outcome.advisories.push(Advisory::MalformedPacket {
                    group,
                    source_id,
                    error,
                });
                return outcome;
            }
        };

        let submission = match self.assembler.submit(source_id, packet, receive_clock) {
            Ok(submission) => submission,
            Err(AssemblyError::UnknownSource { .. }) => {
                warn!(%group, source = %source_id, "Source is not a member of this group");
                outcome
                    .advisories
                    .push(Advisory::UnroutedSource { source_id });
                return outcome;
            }
            Err(error @ AssemblyError::ShapeMismatch { .. }) => {
                // the layout fixes the shape, so this only trips on a
                // misconfigured assembler
                warn!(%group, source = %source_id, %error, "Dropping packet");
                return outcome;
            }
        };

        outcome.advisories.extend(submission.resync);
        if let Some(round) = submission.round {
            outcome.frame = Some(self.complete(round, &mut outcome.advisories));
        }
        outcome
    }

    fn complete(&mut self, round: Round, advisories: &mut Vec<Advisory>) -> Frame {
        let group = self.spec.id;
        let samples = self.spec.samples_per_round();
        let sequenced = self.sequence.observe(round.counter);

        match sequenced.event {
            Some(SequenceEvent::Gap {
                last_counter,
                counter,
                missing,
            }) => {
                warn!(%group, last_counter, counter, missing, "Sample gap");
                advisories.push(Advisory::SampleGap {
                    group,
                    last_counter,
                    counter,
                    missing,
                });
            }
            Some(SequenceEvent::Regression {
                last_counter,
                counter,
            }) => {
                warn!(%group, last_counter, counter, "Counter regression");
                advisories.push(Advisory::CounterRegression {
                    group,
                    last_counter,
                    counter,
                });
            }
            None => {}
        }

        let earliest = round.earliest_receive();
        let mut timestamps: BoxList<f64> = match &mut self.clock {
            Some(clock) => {
                let last_index = sequenced.first_index + samples as u64 - 1;
                if let Err(error) = clock.update(last_index as f64, earliest) {
                    warn!(%group, counter = round.counter, %error, "Clock update rejected");
                    advisories.push(Advisory::ClockDivergence {
                        group,
                        counter: round.counter,
                        error,
                    });
                }
                clock.timestamps(sequenced.first_index, samples)
            }
            None => vec![earliest; samples].into_boxed_slice(),
        };
        self.hold_floor(&mut timestamps);

        let values = self.stack(&round);
        self.frames += 1;

        trace!(
            %group,
            counter = round.counter,
            first_index = sequenced.first_index,
            "Frame complete"
        );

        Frame {
            group,
            counter: round.counter,
            first_index: sequenced.first_index,
            channels: self.spec.channel_count(),
            samples,
            values,
            timestamps,
        }
    }

    fn hold_floor(&mut self, timestamps: &mut [f64]) {
        if let (Some(floor), Some(&first)) = (self.floor, timestamps.first()) {
            if first < floor {
                let shift = floor - first;
                debug!(group = %self.spec.id, shift, "Shifting round to keep timestamps monotonic");
                timestamps.iter_mut().for_each(|t| *t += shift);
            }
        }
        if let Some(&last) = timestamps.last() {
            self.floor = Some(last);
        }
    }

    fn stack(&self, round: &Round) -> BoxList<f64> {
        let mut values =
            Vec::with_capacity(self.spec.channel_count() * self.spec.samples_per_round());
        let mut channel = 0;
        for packet in &round.packets {
            for row in 0..packet.channels {
                let gain = self.spec.gain(channel);
                values.extend(packet.row(row).iter().map(|v| v * gain));
                channel += 1;
            }
        }
        values.into_boxed_slice()
    }
}

/// Where notifications from one source go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Group(GroupId),
    Control,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Group(group) => write!(f, "group {group}"),
            Route::Control => f.write_str("control"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: HashMap<SourceId, Route>,
}

impl Router {
    pub fn new(specs: &[GroupSpec], control: Option<SourceId>) -> Result<Self, ConfigError> {
        let mut router = Self::default();
        let mut groups = Vec::with_capacity(specs.len());

        for spec in specs {
            if groups.contains(&spec.id) {
                return Err(ConfigError::DuplicateGroup(spec.id));
            }
            groups.push(spec.id);

            for member in &spec.members {
                router.insert(*member, Route::Group(spec.id))?;
            }
        }
        if let Some(source_id) = control {
            router.insert(source_id, Route::Control)?;
        }

        Ok(router)
    }

    fn insert(&mut self, source_id: SourceId, route: Route) -> Result<(), ConfigError> {
        match self.routes.entry(source_id) {
            Entry::Occupied(existing) => Err(ConfigError::SourceConflict {
                source_id,
                first: existing.get().to_string(),
                second: route.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(route);
                Ok(())
            }
        }
    }

    pub fn route(&self, source_id: SourceId) -> Option<Route> {
        self.routes.get(&source_id).copied()
    }

    pub fn sources(&self) -> impl Iterator<Item = (SourceId, Route)> + '_ {
        self.routes.iter().map(|(source, route)| (*source, *route))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Frame(Frame),
    Control(String),
}

#[derive(Debug, Default)]
pub struct Outcome {
    pub output: Option<Output>,
    pub advisories: Vec<Advisory>,
}

/// Single-threaded driver: routes each notification to its group pipeline
/// or to the control reassembler.
#[derive(Debug)]
pub struct Pipeline {
    router: Router,
    groups: HashMap<GroupId, GroupPipeline>,
    control: ControlReassembler,
}

impl Pipeline {
    pub fn new(
        specs: Vec<GroupSpec>,
        control: Option<SourceId>,
        options: &PipelineOptions,
    ) -> Result<Self, ConfigError> {
        let router = Router::new(&specs, control)?;
        let groups = specs
            .into_iter()
            .map(|spec| GroupPipeline::new(spec, options).map(|group| (group.id(), group)))
            .collect::<Result<_, _>>()?;

        Ok(Self {
            router,
            groups,
            control: ControlReassembler::new(),
        })
    }

    pub fn on_notification(&mut self, notification: &Notification) -> Outcome {
        let source_id = notification.source;

        match self.router.route(source_id) {
            Some(Route::Group(id)) => match self.groups.get_mut(&id) {
                Some(group) => {
                    let outcome = group.submit(
                        source_id,
                        &notification.payload,
                        notification.receive_clock,
                    );
                    Outcome {
                        output: outcome.frame.map(Output::Frame),
                        advisories: outcome.advisories,
                    }
                }
                None => Self::unrouted(source_id),
            },
            Some(Route::Control) => Outcome {
                output: self
                    .control
                    .submit(&notification.payload)
                    .map(Output::Control),
                advisories: Vec::new(),
            },
            None => Self::unrouted(source_id),
        }
    }

    fn unrouted(source_id: SourceId) -> Outcome {
        warn!(source = %source_id, "Notification from unrouted source");
        Outcome {
            output: None,
            advisories: vec![Advisory::UnroutedSource { source_id }],
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn group(&self, id: GroupId) -> Option<&GroupPipeline> {
        self.groups.get(&id)
    }
}
