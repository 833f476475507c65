mod bits;
pub mod encode;
mod error;
mod layout;
mod telemetry;

pub use error::{ParseResult, ProtocolError};
pub use layout::{DecodedPacket, Layout};
pub use telemetry::TelemetryReading;

// notification structure : counter(2) + packed fields

pub const NOTIFICATION_SIZE: usize = 20;
pub const COUNTER_SIZE: usize = 2;
pub const COUNTER_BITS: u32 = 16;

pub const EEG_SAMPLES_PER_PACKET: usize = 12;
pub const EEG_BITS: u32 = 12;
pub const EEG_SCALE: f64 = 0.48828125;
pub const EEG_MIDPOINT: f64 = 2048.0;

pub const IMU_AXES: usize = 3;
pub const IMU_SAMPLES_PER_PACKET: usize = 3;
pub const IMU_BITS: u32 = 16;
pub const ACCELEROMETER_SCALE: f64 = 0.0000610352;
pub const GYROSCOPE_SCALE: f64 = 0.0074768;

pub const PPG_SAMPLES_PER_PACKET: usize = 6;
pub const PPG_BITS: u32 = 24;

pub const TELEMETRY_FIELDS: usize = 4;
pub const TELEMETRY_BITS: u32 = 16;
pub const BATTERY_DIVISOR: f64 = 512.0;
pub const FUEL_GAUGE_SCALE: f64 = 2.2;

pub const CONTROL_TERMINATOR: u8 = b'}';
pub const CONTROL_CHUNK_SIZE: usize = NOTIFICATION_SIZE - 1;
