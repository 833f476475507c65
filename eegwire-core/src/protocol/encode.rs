//! Payload builders. The inverse of [`Layout::decode`](super::Layout::decode),
//! used by the mock source and by tests.

use super::bits::BitWriter;
use super::error::{ParseResult, ProtocolError};
use super::*;

type Payload = [u8; NOTIFICATION_SIZE];

fn pack(counter: u16, fields: impl IntoIterator<Item = u32>, bits: u32) -> ParseResult<Payload> {
    let mut writer = BitWriter::new();
    writer.write(u32::from(counter), COUNTER_BITS);
    for value in fields {
        if bits < 32 && value >> bits != 0 {
            return Err(ProtocolError::FieldOverflow { value, bits });
        }
        writer.write(value, bits);
    }

    let bytes = writer.finish();
    let mut payload = [0u8; NOTIFICATION_SIZE];
    let len = bytes.len().min(NOTIFICATION_SIZE);
    payload[..len].copy_from_slice(&bytes[..len]);
    Ok(payload)
}

/// Packs 12 raw 12-bit EEG samples.
pub fn eeg(counter: u16, raw: &[u16; EEG_SAMPLES_PER_PACKET]) -> ParseResult<Payload> {
    pack(counter, raw.iter().map(|v| u32::from(*v)), EEG_BITS)
}

/// Raw 12-bit field for a microvolt value, rounded and clamped.
pub fn eeg_raw_from_microvolts(microvolts: f64) -> u16 {
    let raw = (microvolts / EEG_SCALE + EEG_MIDPOINT).round();
    raw.clamp(0.0, 4095.0) as u16
}

/// Packs 9 signed IMU fields in wire order (x0 y0 z0 x1 y1 z1 x2 y2 z2).
pub fn imu(counter: u16, raw: &[i16; IMU_AXES * IMU_SAMPLES_PER_PACKET]) -> Payload {
    let mut writer = BitWriter::new();
    writer.write(u32::from(counter), COUNTER_BITS);
    for value in raw {
        writer.write(u32::from(*value as u16), IMU_BITS);
    }

    let mut payload = [0u8; NOTIFICATION_SIZE];
    payload.copy_from_slice(&writer.finish());
    payload
}

/// Raw signed IMU field for a value in physical units, rounded and clamped.
pub fn imu_raw(value: f64, scale: f64) -> i16 {
    (value / scale)
        .round()
        .clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

/// Packs 6 raw 24-bit PPG samples.
pub fn ppg(counter: u16, raw: &[u32; PPG_SAMPLES_PER_PACKET]) -> ParseResult<Payload> {
    pack(counter, raw.iter().copied(), PPG_BITS)
}

/// Packs a telemetry payload. The device pads telemetry notifications to
/// the full 20 bytes.
pub fn telemetry(
    counter: u16,
    battery: u16,
    fuel_gauge: u16,
    adc_volt: u16,
    temperature: u16,
) -> Payload {
    let mut payload = [0u8; NOTIFICATION_SIZE];
    let fields = [counter, battery, fuel_gauge, adc_volt, temperature];
    for (chunk, field) in payload.chunks_mut(2).zip(fields) {
        chunk.copy_from_slice(&field.to_be_bytes());
    }
    payload
}

/// Splits an ASCII control message into length-prefixed chunks.
pub fn control(message: &str) -> ParseResult<Vec<Payload>> {
    if let Some(byte) = message.bytes().find(|b| !b.is_ascii()) {
        return Err(ProtocolError::NonAscii(byte));
    }

    Ok(message
        .as_bytes()
        .chunks(CONTROL_CHUNK_SIZE)
        .map(|chunk| {
            let mut payload = [0u8; NOTIFICATION_SIZE];
            payload[0] = chunk.len() as u8;
            payload[1..=chunk.len()].copy_from_slice(chunk);
            payload
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_oversized_fields() {
        let mut raw = [0u16; 12];
        raw[4] = 4096;

        assert_eq!(
            eeg(0, &raw).unwrap_err(),
            ProtocolError::FieldOverflow {
                value: 4096,
                bits: 12
            }
        );
        assert!(ppg(0, &[1 << 24, 0, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn control_chunks_are_length_prefixed() {
        let message = r#"{"hn":"Muse-1234","rc":0}"#;

        let chunks = control(message).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0][0] as usize, CONTROL_CHUNK_SIZE);
        assert_eq!(chunks[1][0] as usize, message.len() - CONTROL_CHUNK_SIZE);
        assert_eq!(&chunks[0][1..], &message.as_bytes()[..CONTROL_CHUNK_SIZE]);
    }

    #[test]
    fn imu_raw_clamps() {
        assert_eq!(imu_raw(1.0, ACCELEROMETER_SCALE), 16384);
        assert_eq!(imu_raw(1e9, GYROSCOPE_SCALE), i16::MAX);
    }
}
