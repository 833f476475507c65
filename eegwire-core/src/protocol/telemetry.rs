use super::*;
use crate::{Frame, GroupId};

/// Device status carried on the telemetry characteristic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryReading {
    pub counter: u16,
    /// Battery charge in percent.
    pub battery: f64,
    /// Fuel gauge voltage in millivolts.
    pub fuel_gauge: f64,
    pub adc_volt: f64,
    pub temperature: f64,
}

impl TelemetryReading {
    pub fn from_packet(packet: &DecodedPacket) -> Option<Self> {
        if packet.shape() != (TELEMETRY_FIELDS, 1) {
            return None;
        }
        Self::from_fields(packet.counter, &packet.values)
    }

    pub fn from_frame(frame: &Frame) -> Option<Self> {
        if frame.group != GroupId::Telemetry || frame.samples != 1 {
            return None;
        }
        Self::from_fields(frame.counter, &frame.values)
    }

    fn from_fields(counter: u16, values: &[f64]) -> Option<Self> {
        match *values {
            [battery, fuel_gauge, adc_volt, temperature] => Some(Self {
                counter,
                battery,
                fuel_gauge,
                adc_volt,
                temperature,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_packet_fields() {
        let payload = encode::telemetry(12, 256 * 100, 1700, 0, 31);
        let packet = Layout::Telemetry.decode(&payload).unwrap();

        let reading = TelemetryReading::from_packet(&packet).unwrap();

        assert_eq!(reading.counter, 12);
        assert_eq!(reading.battery, 50.0);
        assert!((reading.fuel_gauge - 3740.0).abs() < 1e-9);
        assert_eq!(reading.temperature, 31.0);
    }

    #[test]
    fn rejects_other_shapes() {
        let payload = encode::ppg(0, &[0; 6]).unwrap();
        let packet = Layout::Ppg.decode(&payload).unwrap();

        assert!(TelemetryReading::from_packet(&packet).is_none());
    }
}
