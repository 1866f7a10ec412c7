//! Device descriptor types

use serde::{Deserialize, Serialize};

/// Raw status word constants reported by the tracking service.
pub mod status {
    pub const STREAMING: u32 = 0x0000_0001;
    pub const PAUSED: u32 = 0x0000_0002;
    pub const ROBUST: u32 = 0x0000_0004;
    pub const SMUDGED: u32 = 0x0000_0008;
    pub const LOW_RESOURCE: u32 = 0x0000_0010;

    pub const UNKNOWN_FAILURE: u32 = 0xE801_0000;
    pub const BAD_CALIBRATION: u32 = 0xE801_0001;
    pub const BAD_FIRMWARE: u32 = 0xE801_0002;
    pub const BAD_TRANSPORT: u32 = 0xE801_0003;
    pub const BAD_CONTROL: u32 = 0xE801_0004;
}

/// Device status word.
///
/// Healthy devices report a combination of flag bits; a failed device reports
/// one of the failure codes in place of the flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct DeviceStatus(pub u32);

/// Failure codes a device can report in its status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFailure {
    Unknown,
    BadCalibration,
    BadFirmware,
    BadTransport,
    BadControl,
}

impl DeviceStatus {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// Decode a failure code, if the status word holds one.
    pub fn failure(&self) -> Option<DeviceFailure> {
        match self.0 {
            status::UNKNOWN_FAILURE => Some(DeviceFailure::Unknown),
            status::BAD_CALIBRATION => Some(DeviceFailure::BadCalibration),
            status::BAD_FIRMWARE => Some(DeviceFailure::BadFirmware),
            status::BAD_TRANSPORT => Some(DeviceFailure::BadTransport),
            status::BAD_CONTROL => Some(DeviceFailure::BadControl),
            _ => None,
        }
    }

    /// Check if a flag is set. Always false while a failure code is reported.
    pub fn has_flag(&self, flag: u32) -> bool {
        self.failure().is_none() && (self.0 & flag) != 0
    }

    pub fn is_streaming(&self) -> bool {
        self.has_flag(status::STREAMING)
    }

    pub fn is_paused(&self) -> bool {
        self.has_flag(status::PAUSED)
    }

    pub fn is_smudged(&self) -> bool {
        self.has_flag(status::SMUDGED)
    }
}

/// Hardware product family, decoded from the product id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum DeviceProduct {
    Peripheral,
    Dragonfly,
    Nightcrawler,
    Rigel,
    StereoIr170,
    ThreeDi,
    Lmc2,
    Unknown(u32),
}

impl From<u32> for DeviceProduct {
    fn from(pid: u32) -> Self {
        match pid {
            0x0003 => DeviceProduct::Peripheral,
            0x1102 => DeviceProduct::Dragonfly,
            0x1201 => DeviceProduct::Nightcrawler,
            0x1202 => DeviceProduct::Rigel,
            0x1203 => DeviceProduct::StereoIr170,
            0x1204 => DeviceProduct::ThreeDi,
            0x1206 => DeviceProduct::Lmc2,
            other => DeviceProduct::Unknown(other),
        }
    }
}

impl From<DeviceProduct> for u32 {
    fn from(product: DeviceProduct) -> Self {
        match product {
            DeviceProduct::Peripheral => 0x0003,
            DeviceProduct::Dragonfly => 0x1102,
            DeviceProduct::Nightcrawler => 0x1201,
            DeviceProduct::Rigel => 0x1202,
            DeviceProduct::StereoIr170 => 0x1203,
            DeviceProduct::ThreeDi => 0x1204,
            DeviceProduct::Lmc2 => 0x1206,
            DeviceProduct::Unknown(pid) => pid,
        }
    }
}

/// Fixed-size device properties returned alongside the serial bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceProperties {
    /// Number of serial bytes the provider wrote into the caller's buffer
    pub serial_len: usize,
    pub product: DeviceProduct,
    pub status: DeviceStatus,
    pub caps: u32,
    /// Distance between the cameras, in micrometres
    pub baseline_um: u32,
    /// Horizontal field of view in radians
    pub h_fov: f32,
    /// Vertical field of view in radians
    pub v_fov: f32,
    /// Maximum tracking range, in micrometres
    pub range_um: u32,
}

/// Outcome of a single `device_info` attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DescriptorFetch {
    /// The serial fit in the buffer
    Complete(DeviceProperties),
    /// The buffer was too small; `required` is the exact serial length
    InsufficientBuffer { required: usize },
}

/// Complete description of one physical device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct DeviceDescriptor {
    pub serial: String,
    pub product: DeviceProduct,
    pub status: DeviceStatus,
    pub caps: u32,
    pub baseline_um: u32,
    pub h_fov: f32,
    pub v_fov: f32,
    pub range_um: u32,
}

impl DeviceDescriptor {
    /// Assemble a descriptor from fetched properties and the owned serial.
    pub fn from_properties(props: &DeviceProperties, serial: String) -> Self {
        Self {
            serial,
            product: props.product,
            status: props.status,
            caps: props.caps,
            baseline_um: props.baseline_um,
            h_fov: props.h_fov,
            v_fov: props.v_fov,
            range_um: props.range_um,
        }
    }
}
