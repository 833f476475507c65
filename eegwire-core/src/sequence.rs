//! Packet counter tracking and absolute sample indexing.
//!
//! The device stamps every round with a 16-bit counter. Consecutive
//! counters differ by one modulo 2^16; anything else is either lost rounds
//! or a regression.

/// Largest forward counter jump still treated as lost rounds. Larger
/// wrapping deltas are backwards steps.
pub const MAX_FORWARD_GAP: u16 = i16::MAX as u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceEvent {
    /// `missing` whole rounds were never received.
    Gap {
        last_counter: u16,
        counter: u16,
        missing: u16,
    },
    /// The counter repeated or stepped backwards.
    Regression { last_counter: u16, counter: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sequenced {
    /// Absolute index of the round's first sample.
    pub first_index: u64,
    pub event: Option<SequenceEvent>,
}

#[derive(Debug, Clone)]
pub struct SequenceTracker {
    samples_per_round: u64,
    last_counter: Option<u16>,
    next_index: u64,
}

impl SequenceTracker {
    pub fn new(samples_per_round: usize) -> Self {
        Self {
            samples_per_round: samples_per_round as u64,
            last_counter: None,
            next_index: 0,
        }
    }

    pub fn observe(&mut self, counter: u16) -> Sequenced {
        let last_counter = self.last_counter.unwrap_or(counter.wrapping_sub(1));
        let delta = counter.wrapping_sub(last_counter);
        self.last_counter = Some(counter);

        let (rounds, event) = match delta {
            1 => (1, None),
            2..=MAX_FORWARD_GAP => (
                u64::from(delta),
                Some(SequenceEvent::Gap {
                    last_counter,
                    counter,
                    missing: delta - 1,
                }),
            ),
            _ => (
                1,
                Some(SequenceEvent::Regression {
                    last_counter,
                    counter,
                }),
            ),
        };

        let first_index = self.next_index + (rounds - 1) * self.samples_per_round;
        self.next_index = first_index + self.samples_per_round;

        Sequenced { first_index, event }
    }

    pub fn last_counter(&self) -> Option<u16> {
        self.last_counter
    }

    /// Index the next in-order round will start at.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }
}
