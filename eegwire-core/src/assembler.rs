//! Collects one packet per member source into a round.

use tracing::warn;

use crate::diagnostics::Advisory;
use crate::group::ResyncPolicy;
use crate::protocol::DecodedPacket;
use crate::{BoxList, GroupId, SourceId};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AssemblyError {
    #[error("source {source_id} is not a member of group {group}")]
    UnknownSource { group: GroupId, source_id: SourceId },
    #[error("group {group}: packet shape {actual:?} does not match {expected:?}")]
    ShapeMismatch {
        group: GroupId,
        expected: (usize, usize),
        actual: (usize, usize),
    },
}

#[derive(Debug, Clone)]
struct Slot {
    packet: DecodedPacket,
    receive_clock: f64,
}

/// One packet from every member, in member order.
#[derive(Debug, Clone)]
pub struct Round {
    /// Counter of the packet that completed the round.
    pub counter: u16,
    pub packets: Vec<DecodedPacket>,
    pub receive_clocks: Vec<f64>,
}

impl Round {
    pub fn earliest_receive(&self) -> f64 {
        self.receive_clocks
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min)
    }
}

#[derive(Debug, Default)]
pub struct Submission {
    pub round: Option<Round>,
    pub resync: Option<Advisory>,
}

#[derive(Debug)]
pub struct FrameAssembler {
    group: GroupId,
    members: BoxList<SourceId>,
    shape: (usize, usize),
    policy: ResyncPolicy,
    slots: BoxList<Option<Slot>>,
    filled: usize,
}

impl FrameAssembler {
    pub fn new(
        group: GroupId,
        members: &[SourceId],
        shape: (usize, usize),
        policy: ResyncPolicy,
    ) -> Self {
        Self {
            group,
            members: members.into(),
            shape,
            policy,
            slots: members.iter().map(|_| None).collect(),
            filled: 0,
        }
    }

    pub fn submit(
        &mut self,
        source_id: SourceId,
        packet: DecodedPacket,
        receive_clock: f64,
    ) -> Result<Submission, AssemblyError> {
        let index = self
            .members
            .iter()
            .position(|member| *member == source_id)
            .ok_or(AssemblyError::UnknownSource {
                group: self.group,
                source_id,
            })?;

        if packet.shape() != self.shape {
            return Err(AssemblyError::ShapeMismatch {
                group: self.group,
                expected: self.shape,
                actual: packet.shape(),
            });
        }

        let counter = packet.counter;
        let mut submission = Submission::default();

        match &self.slots[index] {
            Some(existing) => {
                let previous_counter = existing.packet.counter;
                warn!(
                    group = %self.group,
                    source = %source_id,
                    previous_counter,
                    counter,
                    policy = ?self.policy,
                    "Slot already filled, resynchronizing"
                );
                submission.resync = Some(Advisory::ResyncOverwrite {
                    group: self.group,
                    source_id,
                    previous_counter,
                    counter,
                    policy: self.policy,
                });

                if self.policy == ResyncPolicy::KeepFirst {
                    return Ok(submission);
                }
            }
            None => self.filled += 1,
        }

        self.slots[index] = Some(Slot {
            packet,
            receive_clock,
        });

        if self.filled == self.slots.len() {
            submission.round = Some(self.drain(counter));
        }

        Ok(submission)
    }

    fn drain(&mut self, counter: u16) -> Round {
        let (packets, receive_clocks) = self
            .slots
            .iter_mut()
            .filter_map(Option::take)
            .map(|slot| (slot.packet, slot.receive_clock))
            .unzip();
        self.filled = 0;

        Round {
            counter,
            packets,
            receive_clocks,
        }
    }

    /// Number of slots holding a packet for the in-flight round.
    pub fn pending(&self) -> usize {
        self.filled
    }

    /// Drops the in-flight round.
    pub fn discard(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.filled = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Layout, encode};

    const A: SourceId = SourceId(1);
    const B: SourceId = SourceId(2);

    fn ppg(counter: u16, fill: u32) -> DecodedPacket {
        Layout::Ppg
            .decode(&encode::ppg(counter, &[fill; 6]).unwrap())
            .unwrap()
    }

    fn assembler(policy: ResyncPolicy) -> FrameAssembler {
        FrameAssembler::new(GroupId::Ppg, &[A, B], (1, 6), policy)
    }

    #[test]
    fn drains_in_member_order() {
        let mut assembler = assembler(ResyncPolicy::Overwrite);

        let first = assembler.submit(B, ppg(3, 20), 1.5).unwrap();
        assert!(first.round.is_none());
        assert_eq!(assembler.pending(), 1);

        let round = assembler.submit(A, ppg(3, 10), 1.2).unwrap().round.unwrap();

        assert_eq!(round.counter, 3);
        assert_eq!(round.packets[0].values[0], 10.0);
        assert_eq!(round.packets[1].values[0], 20.0);
        assert_eq!(round.earliest_receive(), 1.2);
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn overwrite_keeps_latest() {
        let mut assembler = assembler(ResyncPolicy::Overwrite);
        assembler.submit(A, ppg(4, 1), 0.0).unwrap();

        let resync = assembler.submit(A, ppg(5, 2), 0.1).unwrap();
        assert!(matches!(
            resync.resync,
            Some(Advisory::ResyncOverwrite {
                previous_counter: 4,
                counter: 5,
                ..
            })
        ));
        assert!(resync.round.is_none());

        let round = assembler.submit(B, ppg(5, 3), 0.2).unwrap().round.unwrap();
        assert_eq!(round.packets[0].values[0], 2.0);
    }

    #[test]
    fn keep_first_discards_late_duplicate() {
        let mut assembler = assembler(ResyncPolicy::KeepFirst);
        assembler.submit(A, ppg(4, 1), 0.0).unwrap();

        let resync = assembler.submit(A, ppg(5, 2), 0.1).unwrap();
        assert!(resync.resync.is_some());

        let round = assembler.submit(B, ppg(4, 3), 0.2).unwrap().round.unwrap();
        assert_eq!(round.packets[0].values[0], 1.0);
        assert_eq!(round.receive_clocks, vec![0.0, 0.2]);
    }

    #[test]
    fn rejects_unknown_source_and_shape() {
        let mut assembler = assembler(ResyncPolicy::Overwrite);

        assert_eq!(
            assembler.submit(SourceId(9), ppg(0, 0), 0.0).unwrap_err(),
            AssemblyError::UnknownSource {
                group: GroupId::Ppg,
                source_id: SourceId(9),
            }
        );

        let eeg = Layout::Eeg
            .decode(&encode::eeg(0, &[2048; 12]).unwrap())
            .unwrap();
        assert!(matches!(
            assembler.submit(A, eeg, 0.0),
            Err(AssemblyError::ShapeMismatch { .. })
        ));
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn discard_clears_partial_round() {
        let mut assembler = assembler(ResyncPolicy::Overwrite);
        assembler.submit(A, ppg(1, 0), 0.0).unwrap();

        assembler.discard();

        assert_eq!(assembler.pending(), 0);
        assert!(assembler.submit(B, ppg(2, 0), 0.0).unwrap().round.is_none());
    }
}
