//! Channel groups of the headset as it ships.

use crate::group::{GroupSpec, Timing};
use crate::protocol::Layout;
use crate::{GroupId, SourceId};

pub const CONTROL: SourceId = SourceId(0x0001);
pub const TP9: SourceId = SourceId(0x0003);
pub const AF7: SourceId = SourceId(0x0004);
pub const AF8: SourceId = SourceId(0x0005);
pub const TP10: SourceId = SourceId(0x0006);
pub const RIGHT_AUX: SourceId = SourceId(0x0007);
pub const GYROSCOPE: SourceId = SourceId(0x0009);
pub const ACCELEROMETER: SourceId = SourceId(0x000a);
pub const TELEMETRY: SourceId = SourceId(0x000b);
pub const PPG_AMBIENT: SourceId = SourceId(0x000f);
pub const PPG_INFRARED: SourceId = SourceId(0x0010);
pub const PPG_RED: SourceId = SourceId(0x0011);

pub const EEG_RATE: f64 = 256.0;
pub const PPG_RATE: f64 = 64.0;
pub const IMU_RATE: f64 = 52.0;
pub const TELEMETRY_RATE: f64 = 1.0;

fn names(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

pub fn eeg() -> GroupSpec {
    GroupSpec {
        id: GroupId::Eeg,
        layout: Layout::Eeg,
        members: vec![TP9, AF7, AF8, TP10, RIGHT_AUX],
        sample_rate: EEG_RATE,
        gains: Vec::new(),
        timing: Timing::Regression,
        channel_names: names(&["TP9", "AF7", "AF8", "TP10", "Right AUX"]),
        unit: "microvolts".into(),
    }
}

pub fn ppg() -> GroupSpec {
    GroupSpec {
        id: GroupId::Ppg,
        layout: Layout::Ppg,
        members: vec![PPG_AMBIENT, PPG_INFRARED, PPG_RED],
        sample_rate: PPG_RATE,
        gains: Vec::new(),
        timing: Timing::Regression,
        channel_names: names(&["LUX", "IR", "RED"]),
        unit: "raw".into(),
    }
}

pub fn accelerometer() -> GroupSpec {
    GroupSpec {
        id: GroupId::Accelerometer,
        layout: Layout::Accelerometer,
        members: vec![ACCELEROMETER],
        sample_rate: IMU_RATE,
        gains: Vec::new(),
        timing: Timing::Receive,
        channel_names: names(&["ACC_X", "ACC_Y", "ACC_Z"]),
        unit: "g".into(),
    }
}

pub fn gyroscope() -> GroupSpec {
    GroupSpec {
        id: GroupId::Gyroscope,
        layout: Layout::Gyroscope,
        members: vec![GYROSCOPE],
        sample_rate: IMU_RATE,
        gains: Vec::new(),
        timing: Timing::Receive,
        channel_names: names(&["GYRO_X", "GYRO_Y", "GYRO_Z"]),
        unit: "dps".into(),
    }
}

pub fn telemetry() -> GroupSpec {
    GroupSpec {
        id: GroupId::Telemetry,
        layout: Layout::Telemetry,
        members: vec![TELEMETRY],
        sample_rate: TELEMETRY_RATE,
        gains: Vec::new(),
        timing: Timing::Receive,
        channel_names: names(&["battery", "fuel_gauge", "adc_volt", "temperature"]),
        unit: "mixed".into(),
    }
}

pub fn for_group(id: GroupId) -> GroupSpec {
    match id {
        GroupId::Eeg => eeg(),
        GroupId::Ppg => ppg(),
        GroupId::Accelerometer => accelerometer(),
        GroupId::Gyroscope => gyroscope(),
        GroupId::Telemetry => telemetry(),
    }
}

pub fn all() -> Vec<GroupSpec> {
    GroupId::ALL.into_iter().map(for_group).collect()
}
