use std::fmt;

use crate::clock::ClockDivergence;
use crate::group::ResyncPolicy;
use crate::protocol::ProtocolError;
use crate::{GroupId, SourceId};

/// A non-fatal report raised while processing the stream. Advisories never
/// stop frame production.
#[derive(Debug, Clone, PartialEq)]
pub enum Advisory {
    SampleGap {
        group: GroupId,
        last_counter: u16,
        counter: u16,
        missing: u16,
    },
    CounterRegression {
        group: GroupId,
        last_counter: u16,
        counter: u16,
    },
    ResyncOverwrite {
        group: GroupId,
        source_id: SourceId,
        previous_counter: u16,
        counter: u16,
        policy: ResyncPolicy,
    },
    MalformedPacket {
        group: GroupId,
        source_id: SourceId,
        error: ProtocolError,
    },
    ClockDivergence {
        group: GroupId,
        counter: u16,
        error: ClockDivergence,
    },
    UnroutedSource { source_id: SourceId },
    /// A worker queue was full. `group` is `None` for the control queue.
    NotificationDropped {
        group: Option<GroupId>,
        source_id: SourceId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AdvisoryKind {
    SampleGap,
    CounterRegression,
    ResyncOverwrite,
    MalformedPacket,
    ClockDivergence,
    UnroutedSource,
    NotificationDropped,
}

impl Advisory {
    pub fn kind(&self) -> AdvisoryKind {
        match self {
            Advisory::SampleGap { .. } => AdvisoryKind::SampleGap,
            Advisory::CounterRegression { .. } => AdvisoryKind::CounterRegression,
            Advisory::ResyncOverwrite { .. } => AdvisoryKind::ResyncOverwrite,
            Advisory::MalformedPacket { .. } => AdvisoryKind::MalformedPacket,
            Advisory::ClockDivergence { .. } => AdvisoryKind::ClockDivergence,
            Advisory::UnroutedSource { .. } => AdvisoryKind::UnroutedSource,
            Advisory::NotificationDropped { .. } => AdvisoryKind::NotificationDropped,
        }
    }

    pub fn group(&self) -> Option<GroupId> {
        match self {
            Advisory::SampleGap { group, .. }
            | Advisory::CounterRegression { group, .. }
            | Advisory::ResyncOverwrite { group, .. }
            | Advisory::MalformedPacket { group, .. }
            | Advisory::ClockDivergence { group, .. } => Some(*group),
            Advisory::NotificationDropped { group, .. } => *group,
            Advisory::UnroutedSource { .. } => None,
        }
    }

    /// Packet counter the advisory refers to, when known.
    pub fn counter(&self) -> Option<u16> {
        match self {
            Advisory::SampleGap { counter, .. }
            | Advisory::CounterRegression { counter, .. }
            | Advisory::ResyncOverwrite { counter, .. }
            | Advisory::ClockDivergence { counter, .. } => Some(*counter),
            Advisory::MalformedPacket { .. }
            | Advisory::UnroutedSource { .. }
            | Advisory::NotificationDropped { .. } => None,
        }
    }
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::SampleGap {
                group,
                last_counter,
                counter,
                missing,
            } => write!(
                f,
                "{group}: {missing} round(s) lost between counters {last_counter} and {counter}"
            ),
            Advisory::CounterRegression {
                group,
                last_counter,
                counter,
            } => write!(
                f,
                "{group}: counter went from {last_counter} to {counter}"
            ),
            Advisory::ResyncOverwrite {
                group,
                source_id,
                previous_counter,
                counter,
                policy,
            } => {
                let kept = match policy {
                    ResyncPolicy::Overwrite => counter,
                    ResyncPolicy::KeepFirst => previous_counter,
                };
                write!(
                    f,
                    "{group}: source {source_id} delivered counter {counter} while \
                     {previous_counter} was pending, kept {kept}"
                )
            }
            Advisory::MalformedPacket {
                group,
                source_id,
                error,
            } => write!(f, "{group}: dropped packet from {source_id}: {error}"),
            Advisory::ClockDivergence {
                group,
                counter,
                error,
            } => write!(f, "{group}: clock update at counter {counter} rejected: {error}"),
            Advisory::UnroutedSource { source_id } => {
                write!(f, "no route for source {source_id}")
            }
            Advisory::NotificationDropped {
                group: Some(group),
                source_id,
            } => write!(f, "{group}: queue full, dropped notification from {source_id}"),
            Advisory::NotificationDropped {
                group: None,
                source_id,
            } => write!(f, "control queue full, dropped notification from {source_id}"),
        }
    }
}
