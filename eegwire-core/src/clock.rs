//! Maps sample indices to host time.
//!
//! The device clock and the host clock drift apart, and notification
//! delivery adds jitter. The model fits `t = t0 + slope * index` with a
//! single-parameter recursive least squares update, one observation per
//! completed round.

use tracing::debug;

use crate::group::ClockOptions;
use crate::BoxList;

/// Smallest magnitude allowed for the gain denominator.
pub const DENOMINATOR_FLOOR: f64 = 1e-9;

/// `P * x^2` the covariance is reset to once an update stops contracting it.
/// The update only contracts while `P * x^2 < 0.5`, which a jump in the
/// sample index after lost rounds can break.
pub const RESEED_GAIN: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum ClockDivergence {
    #[error("covariance degenerated to {covariance}")]
    Covariance { covariance: f64 },
    #[error("slope {proposed:e} s/sample is outside {limit} of nominal {nominal:e}")]
    Slope {
        proposed: f64,
        nominal: f64,
        limit: f64,
    },
}

#[derive(Debug, Clone)]
pub struct ClockModel {
    t0: Option<f64>,
    slope: f64,
    covariance: f64,
    initial_covariance: f64,
    nominal_slope: f64,
    max_rate_deviation: f64,
    reseeds: u64,
}

impl ClockModel {
    pub fn new(sample_rate: f64, options: &ClockOptions) -> Self {
        let nominal_slope = 1.0 / sample_rate;
        Self {
            t0: None,
            slope: nominal_slope,
            covariance: options.initial_covariance,
            initial_covariance: options.initial_covariance,
            nominal_slope,
            max_rate_deviation: options.max_rate_deviation,
            reseeds: 0,
        }
    }

    /// Folds in one observation: sample `index` was received at `receive`.
    ///
    /// The first call fixes `t0`. When the covariance update would not
    /// shrink `P` (negative, growing or non-finite), `P` is re-seeded to
    /// [`RESEED_GAIN`] `/ x^2` and the update is retried, keeping the slope.
    /// A rejected update leaves the model as it was.
    pub fn update(&mut self, index: f64, receive: f64) -> Result<(), ClockDivergence> {
        let t0 = *self.t0.get_or_insert(receive);
        let elapsed = receive - t0;
        let x2 = index * index;

        let mut p = self.covariance;
        let mut covariance = contract(p, x2);
        let mut reseeded = false;
        if !contracts(p, covariance) {
            p = self.initial_covariance.min(RESEED_GAIN / x2);
            covariance = contract(p, x2);
            reseeded = true;
        }
        if !contracts(p, covariance) {
            return Err(ClockDivergence::Covariance { covariance });
        }

        let slope = self.slope + covariance * index * (elapsed - index * self.slope);
        let deviation = (slope / self.nominal_slope - 1.0).abs();
        if !slope.is_finite() || deviation > self.max_rate_deviation {
            return Err(ClockDivergence::Slope {
                proposed: slope,
                nominal: self.nominal_slope,
                limit: self.max_rate_deviation,
            });
        }

        if reseeded {
            debug!(
                index,
                previous = self.covariance,
                covariance,
                "Re-seeded clock covariance"
            );
            self.reseeds += 1;
        }
        self.covariance = covariance;
        self.slope = slope;
        Ok(())
    }

    /// Host times of `count` consecutive samples starting at `first_index`.
    /// Before the first update `t0` is taken as zero.
    pub fn timestamps(&self, first_index: u64, count: usize) -> BoxList<f64> {
        let t0 = self.t0.unwrap_or(0.0);
        (0..count as u64)
            .map(|offset| t0 + self.slope * (first_index + offset) as f64)
            .collect()
    }

    pub fn t0(&self) -> Option<f64> {
        self.t0
    }

    /// Fitted seconds per sample.
    pub fn slope(&self) -> f64 {
        self.slope
    }

    pub fn covariance(&self) -> f64 {
        self.covariance
    }

    /// Number of times the covariance had to be re-seeded.
    pub fn reseeds(&self) -> u64 {
        self.reseeds
    }
}

/// `P' = P - P^2 x^2 / (1 - P x^2)` with the denominator kept off zero.
fn contract(p: f64, x2: f64) -> f64 {
    let mut denominator = 1.0 - p * x2;
    if denominator.abs() < DENOMINATOR_FLOOR {
        denominator = DENOMINATOR_FLOOR.copysign(denominator);
    }
    p - (p * p * x2) / denominator
}

fn contracts(previous: f64, next: f64) -> bool {
    next.is_finite() && next > 0.0 && next <= previous
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    #[test]
    fn first_observation_fixes_t0() {
        let mut clock = ClockModel::new(256.0, &ClockOptions::default());

        clock.update(11.0, 1000.0).unwrap();
        clock.update(23.0, 1000.05).unwrap();

        assert_eq!(clock.t0(), Some(1000.0));
        let timestamps = clock.timestamps(0, 3);
        assert_eq!(timestamps[0], 1000.0);
        assert!(timestamps.windows(2).all(|pair| pair[1] > pair[0]));
    }

    #[test]
    fn converges_to_true_rate_under_jitter() {
        let true_slope = 1.0 / 250.0;
        let mut rng = StdRng::seed_from_u64(7);
        let mut clock = ClockModel::new(256.0, &ClockOptions::default());

        for round in 0..2000u64 {
            let last_index = (round * 12 + 11) as f64;
            let jitter = rng.random_range(0.0..0.010);
            let receive = 50.0 + true_slope * last_index + jitter;
            clock.update(last_index, receive).unwrap();
        }

        assert!((clock.slope() - true_slope).abs() < 1e-5);
        assert!(clock.covariance() > 0.0);
    }

    #[test]
    fn rejects_slope_outside_bound() {
        let mut clock = ClockModel::new(256.0, &ClockOptions::default());
        clock.update(11.0, 0.0).unwrap();
        let before = clock.slope();

        // a round "arriving" a minute late would imply a wildly slow clock
        let error = clock.update(23.0, 60.0).unwrap_err();

        assert!(matches!(error, ClockDivergence::Slope { .. }));
        assert_eq!(clock.slope(), before);
    }

    #[test]
    fn degenerate_covariance_is_reseeded() {
        let options = ClockOptions {
            initial_covariance: 1.0,
            ..ClockOptions::default()
        };
        let mut clock = ClockModel::new(64.0, &options);

        // 1 - P x^2 == 0 would drive P' negative
        clock.update(1.0, 0.0).unwrap();

        assert_eq!(clock.reseeds(), 1);
        assert!(clock.covariance() > 0.0);
        assert!(clock.covariance() < RESEED_GAIN);
    }

    #[test]
    fn non_finite_index_is_rejected() {
        let mut clock = ClockModel::new(256.0, &ClockOptions::default());
        clock.update(11.0, 3.0).unwrap();
        let (slope, covariance) = (clock.slope(), clock.covariance());

        let error = clock.update(f64::NAN, 3.05).unwrap_err();

        assert!(matches!(error, ClockDivergence::Covariance { .. }));
        assert_eq!(clock.slope(), slope);
        assert_eq!(clock.covariance(), covariance);
    }

    #[test]
    fn keeps_refining_after_lost_rounds() {
        let true_slope = 1.0 / 256.0;
        let mut rng = StdRng::seed_from_u64(11);
        let mut clock = ClockModel::new(256.0, &ClockOptions::default());
        let mut observe = |clock: &mut ClockModel, round: u64| {
            let last_index = (round * 12 + 11) as f64;
            let receive = 20.0 + true_slope * last_index + rng.random_range(0.0..0.010);
            clock.update(last_index, receive)
        };

        for round in 0..30 {
            observe(&mut clock, round).unwrap();
        }
        // 75 rounds lost, then the stream continues
        observe(&mut clock, 105).unwrap();
        let after_gap = clock.covariance();
        for round in 106..1105 {
            observe(&mut clock, round).unwrap();
        }

        assert_eq!(clock.reseeds(), 1);
        assert!(clock.covariance() < after_gap);
        assert!((clock.slope() - true_slope).abs() < 1e-5);
    }
}
