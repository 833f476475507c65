use std::fmt;

use serde::{Deserialize, Serialize};

use super::bits::BitReader;
use super::error::{ParseResult, ProtocolError};
use super::*;
use crate::BoxList;

/// Packing scheme of a notification payload. Every layout starts with a
/// big-endian 16-bit packet counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// 12 unsigned 12-bit samples, converted to microvolts.
    Eeg,
    /// 3 samples of signed 16-bit x/y/z, converted to g.
    Accelerometer,
    /// 3 samples of signed 16-bit x/y/z, converted to deg/s.
    Gyroscope,
    /// 6 unsigned 24-bit samples, raw counts.
    Ppg,
    /// Battery, fuel gauge, adc voltage and temperature as unsigned
    /// 16-bit fields.
    Telemetry,
}

impl Layout {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Layout::Eeg => "eeg",
            Layout::Accelerometer => "accelerometer",
            Layout::Gyroscope => "gyroscope",
            Layout::Ppg => "ppg",
            Layout::Telemetry => "telemetry",
        }
    }

    /// Minimum payload length this layout needs.
    pub const fn size(&self) -> usize {
        let bits = match self {
            Layout::Eeg => EEG_SAMPLES_PER_PACKET * EEG_BITS as usize,
            Layout::Accelerometer | Layout::Gyroscope => {
                IMU_AXES * IMU_SAMPLES_PER_PACKET * IMU_BITS as usize
            }
            Layout::Ppg => PPG_SAMPLES_PER_PACKET * PPG_BITS as usize,
            Layout::Telemetry => TELEMETRY_FIELDS * TELEMETRY_BITS as usize,
        };
        COUNTER_SIZE + bits / 8
    }

    pub const fn channels(&self) -> usize {
        match self {
            Layout::Eeg | Layout::Ppg => 1,
            Layout::Accelerometer | Layout::Gyroscope => IMU_AXES,
            Layout::Telemetry => TELEMETRY_FIELDS,
        }
    }

    pub const fn samples(&self) -> usize {
        match self {
            Layout::Eeg => EEG_SAMPLES_PER_PACKET,
            Layout::Accelerometer | Layout::Gyroscope => IMU_SAMPLES_PER_PACKET,
            Layout::Ppg => PPG_SAMPLES_PER_PACKET,
            Layout::Telemetry => 1,
        }
    }

    /// Multiplier applied to raw integer fields. Telemetry fields carry
    /// per-field conversions instead.
    pub const fn scale(&self) -> f64 {
        match self {
            Layout::Eeg => EEG_SCALE,
            Layout::Accelerometer => ACCELEROMETER_SCALE,
            Layout::Gyroscope => GYROSCOPE_SCALE,
            Layout::Ppg | Layout::Telemetry => 1.0,
        }
    }

    /// Decodes a payload. Bytes past [`Layout::size`] are ignored.
    pub fn decode(&self, payload: &[u8]) -> ParseResult<DecodedPacket> {
        let needed = self.size();
        if payload.len() < needed {
            return Err(ProtocolError::MalformedPacket {
                layout: *self,
                needed,
                available: payload.len(),
            });
        }

        let mut reader = BitReader::new(&payload[..needed]);
        let counter = reader.read_u16();

        let values: Vec<f64> = match self {
            Layout::Eeg => (0..EEG_SAMPLES_PER_PACKET)
                .map(|_| EEG_SCALE * (f64::from(reader.read(EEG_BITS)) - EEG_MIDPOINT))
                .collect(),
            Layout::Accelerometer | Layout::Gyroscope => {
                // wire order is sample-major (x0 y0 z0 x1 ...), the matrix is
                // axis-major
                let scale = self.scale();
                let mut values = vec![0.0; IMU_AXES * IMU_SAMPLES_PER_PACKET];
                for position in 0..values.len() {
                    let (sample, axis) = (position / IMU_AXES, position % IMU_AXES);
                    values[axis * IMU_SAMPLES_PER_PACKET + sample] =
                        scale * f64::from(reader.read_i16());
                }
                values
            }
            Layout::Ppg => (0..PPG_SAMPLES_PER_PACKET)
                .map(|_| f64::from(reader.read(PPG_BITS)))
                .collect(),
            Layout::Telemetry => {
                let battery = f64::from(reader.read_u16()) / BATTERY_DIVISOR;
                let fuel_gauge = f64::from(reader.read_u16()) * FUEL_GAUGE_SCALE;
                let adc_volt = f64::from(reader.read_u16());
                let temperature = f64::from(reader.read_u16());
                vec![battery, fuel_gauge, adc_volt, temperature]
            }
        };

        Ok(DecodedPacket {
            counter,
            channels: self.channels(),
            samples: self.samples(),
            values: values.into_boxed_slice(),
            scale: self.scale(),
        })
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of [`Layout::decode`].
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPacket {
    pub counter: u16,
    pub channels: usize,
    pub samples: usize,
    /// Row-major `channels x samples` matrix in physical units.
    pub values: BoxList<f64>,
    pub scale: f64,
}

impl DecodedPacket {
    pub fn shape(&self) -> (usize, usize) {
        (self.channels, self.samples)
    }

    pub fn row(&self, channel: usize) -> &[f64] {
        let start = channel * self.samples;
        &self.values[start..start + self.samples]
    }
}
