//! Tracking frame types

use serde::{Deserialize, Serialize};

/// A three-component vector in millimetres (device space).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Unit quaternion describing an orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };
}

/// Which hand a pose belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum HandSide {
    Left,
    Right,
}

impl std::fmt::Display for HandSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandSide::Left => f.write_str("left"),
            HandSide::Right => f.write_str("right"),
        }
    }
}

/// Palm pose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct Palm {
    /// Centre of the palm
    pub position: Vector3,
    /// Palm position with temporal smoothing applied
    pub stabilized_position: Vector3,
    /// Rate of change of the palm position (mm/s)
    pub velocity: Vector3,
    /// Normal vector pointing out of the palm
    pub normal: Vector3,
    /// Direction from the palm position toward the fingers
    pub direction: Vector3,
    pub orientation: Quaternion,
    /// Estimated palm width (mm)
    pub width: f32,
}

/// A bone segment between two joints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct Bone {
    pub prev_joint: Vector3,
    pub next_joint: Vector3,
    pub width: f32,
    pub rotation: Quaternion,
}

/// Finger identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum Finger {
    #[default]
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

/// One finger: metacarpal, proximal, intermediate and distal bones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct Digit {
    pub finger: Finger,
    pub bones: [Bone; 4],
    pub is_extended: bool,
}

impl Digit {
    /// Tip of the distal bone.
    pub fn tip(&self) -> Vector3 {
        self.bones[3].next_joint
    }
}

/// One tracked hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct Hand {
    /// Identifier that persists while the hand stays in view
    #[serde(default)]
    pub id: u32,
    pub side: HandSide,
    #[serde(default)]
    pub confidence: f32,
    /// Microseconds this hand has been continuously visible
    #[serde(default)]
    pub visible_time_us: u64,
    #[serde(default)]
    pub pinch_distance: f32,
    #[serde(default)]
    pub grab_angle: f32,
    #[serde(default)]
    pub pinch_strength: f32,
    #[serde(default)]
    pub grab_strength: f32,
    #[serde(default)]
    pub palm: Palm,
    /// Auxiliary landmarks, thumb first
    #[serde(default)]
    pub digits: Vec<Digit>,
    #[serde(default)]
    pub arm: Option<Bone>,
}

impl Hand {
    /// Create a hand with only its side and palm position set.
    pub fn new(side: HandSide, position: Vector3) -> Self {
        Self {
            id: 0,
            side,
            confidence: 1.0,
            visible_time_us: 0,
            pinch_distance: 0.0,
            grab_angle: 0.0,
            pinch_strength: 0.0,
            grab_strength: 0.0,
            palm: Palm { position, stabilized_position: position, ..Palm::default() },
            digits: Vec::new(),
            arm: None,
        }
    }

    pub fn digit(&self, finger: Finger) -> Option<&Digit> {
        self.digits.iter().find(|d| d.finger == finger)
    }
}

/// One snapshot of everything the device tracked at a point in time.
///
/// Frames are immutable once published; the cache replaces them wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct TrackingFrame {
    /// Tracking frame sequence number (non-decreasing at the source)
    pub frame_id: i64,
    /// Device timestamp in microseconds
    #[serde(default)]
    pub timestamp_us: i64,
    /// Instantaneous tracking frame rate reported by the device
    #[serde(default)]
    pub framerate: f32,
    #[serde(default)]
    pub hands: Vec<Hand>,
}

impl TrackingFrame {
    pub fn new(frame_id: i64, hands: Vec<Hand>) -> Self {
        Self { frame_id, timestamp_us: 0, framerate: 0.0, hands }
    }

    pub fn hand_count(&self) -> usize {
        self.hands.len()
    }

    /// First hand on the given side, if tracked.
    pub fn hand(&self, side: HandSide) -> Option<&Hand> {
        self.hands.iter().find(|h| h.side == side)
    }

    pub fn left(&self) -> Option<&Hand> {
        self.hand(HandSide::Left)
    }

    pub fn right(&self) -> Option<&Hand> {
        self.hand(HandSide::Right)
    }
}
