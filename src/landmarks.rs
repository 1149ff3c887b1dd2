// src/landmarks.rs - Detector landmark types and topology indices
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

pub const POSE_LANDMARK_COUNT: usize = 33;
pub const HAND_LANDMARK_COUNT: usize = 21;
pub const FACE_LANDMARK_COUNT: usize = 468;

/// One normalized detector point. `x`/`y` are in [0, 1] relative to the
/// source frame, `z` is relative depth with detector-defined scale.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default = "default_visibility")]
    pub visibility: f64,
}

fn default_visibility() -> f64 {
    1.0
}

impl Landmark {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z, visibility: 1.0 }
    }

    pub fn with_visibility(mut self, visibility: f64) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn is_visible(&self, threshold: f64) -> bool {
        self.visibility >= threshold
    }

    pub fn xy(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    /// Pixel coordinates for a frame of the given size.
    pub fn to_pixel(&self, width: f64, height: f64) -> Vector2<f64> {
        Vector2::new(self.x * width, self.y * height)
    }

    /// Tracking space: x right, y up, z away from the camera, with x/y scaled
    /// to pixels and z scaled by `width * z_scale`. `mirror` reflects x.
    pub fn to_tracking_space(&self, width: f64, height: f64, z_scale: f64, mirror: bool) -> Vector3<f64> {
        let x = if mirror { 1.0 - self.x } else { self.x };
        Vector3::new(x * width, -self.y * height, self.z * width * z_scale)
    }
}

/// Detector output for one frame. Any region may be absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameInputs {
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default)]
    pub face: Option<Vec<Landmark>>,
    #[serde(default)]
    pub pose: Option<Vec<Landmark>>,
    #[serde(default)]
    pub left_hand: Option<Vec<Landmark>>,
    #[serde(default)]
    pub right_hand: Option<Vec<Landmark>>,
}

impl FrameInputs {
    pub fn hand(&self, side: Side) -> Option<&[Landmark]> {
        match side {
            Side::Left => self.left_hand.as_deref(),
            Side::Right => self.right_hand.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// The detector side feeding this rig side.
    pub fn source(self, mirror: bool) -> Self {
        if mirror {
            self.opposite()
        } else {
            self
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

/// BlazePose body topology (33 points).
pub mod pose {
    use super::Side;

    pub const NOSE: usize = 0;
    pub const LEFT_EAR: usize = 7;
    pub const RIGHT_EAR: usize = 8;
    pub const LEFT_SHOULDER: usize = 11;
    pub const RIGHT_SHOULDER: usize = 12;
    pub const LEFT_ELBOW: usize = 13;
    pub const RIGHT_ELBOW: usize = 14;
    pub const LEFT_WRIST: usize = 15;
    pub const RIGHT_WRIST: usize = 16;
    pub const LEFT_PINKY: usize = 17;
    pub const RIGHT_PINKY: usize = 18;
    pub const LEFT_INDEX: usize = 19;
    pub const RIGHT_INDEX: usize = 20;
    pub const LEFT_HIP: usize = 23;
    pub const RIGHT_HIP: usize = 24;
    pub const LEFT_KNEE: usize = 25;
    pub const RIGHT_KNEE: usize = 26;
    pub const LEFT_ANKLE: usize = 27;
    pub const RIGHT_ANKLE: usize = 28;
    pub const LEFT_FOOT_INDEX: usize = 31;
    pub const RIGHT_FOOT_INDEX: usize = 32;

    /// Per-side landmark indices.
    #[derive(Debug, Clone, Copy)]
    pub struct SideIndices {
        pub ear: usize,
        pub shoulder: usize,
        pub elbow: usize,
        pub wrist: usize,
        pub pinky: usize,
        pub index: usize,
        pub hip: usize,
        pub knee: usize,
        pub ankle: usize,
        pub foot_index: usize,
    }

    pub fn side(side: Side) -> SideIndices {
        match side {
            Side::Left => SideIndices {
                ear: LEFT_EAR,
                shoulder: LEFT_SHOULDER,
                elbow: LEFT_ELBOW,
                wrist: LEFT_WRIST,
                pinky: LEFT_PINKY,
                index: LEFT_INDEX,
                hip: LEFT_HIP,
                knee: LEFT_KNEE,
                ankle: LEFT_ANKLE,
                foot_index: LEFT_FOOT_INDEX,
            },
            Side::Right => SideIndices {
                ear: RIGHT_EAR,
                shoulder: RIGHT_SHOULDER,
                elbow: RIGHT_ELBOW,
                wrist: RIGHT_WRIST,
                pinky: RIGHT_PINKY,
                index: RIGHT_INDEX,
                hip: RIGHT_HIP,
                knee: RIGHT_KNEE,
                ankle: RIGHT_ANKLE,
                foot_index: RIGHT_FOOT_INDEX,
            },
        }
    }
}

/// Hand topology (21 points per hand).
pub mod hand {
    pub const WRIST: usize = 0;
    pub const THUMB_CMC: usize = 1;
    pub const THUMB_MCP: usize = 2;
    pub const THUMB_IP: usize = 3;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_MCP: usize = 5;
    pub const INDEX_PIP: usize = 6;
    pub const INDEX_DIP: usize = 7;
    pub const INDEX_TIP: usize = 8;
    pub const MIDDLE_MCP: usize = 9;
    pub const MIDDLE_PIP: usize = 10;
    pub const MIDDLE_DIP: usize = 11;
    pub const MIDDLE_TIP: usize = 12;
    pub const RING_MCP: usize = 13;
    pub const RING_PIP: usize = 14;
    pub const RING_DIP: usize = 15;
    pub const RING_TIP: usize = 16;
    pub const PINKY_MCP: usize = 17;
    pub const PINKY_PIP: usize = 18;
    pub const PINKY_DIP: usize = 19;
    pub const PINKY_TIP: usize = 20;

    pub const THUMB_CHAIN: [usize; 5] = [WRIST, THUMB_CMC, THUMB_MCP, THUMB_IP, THUMB_TIP];
}

/// Face mesh indices.
pub mod face {
    /// Eye contours: nine lower points (corners at 0 and 8), then seven upper
    /// points. Lower point `i` pairs with upper point `8 + i` for i in 1..=7.
    pub const LEFT_EYE: [usize; 16] = [
        33, 7, 163, 144, 145, 153, 154, 155, 133, 246, 161, 160, 159, 158, 157, 173,
    ];
    pub const RIGHT_EYE: [usize; 16] = [
        263, 249, 390, 373, 374, 380, 381, 382, 362, 466, 388, 387, 386, 385, 384, 398,
    ];

    pub const MOUTH_LEFT_CORNER: usize = 78;
    pub const MOUTH_RIGHT_CORNER: usize = 308;
    /// Upper/lower lip pairs measuring the mouth opening.
    pub const MOUTH_VERTICAL_PAIRS: [(usize, usize); 3] = [(81, 178), (13, 14), (311, 402)];

    pub const FOREHEAD: usize = 10;
    pub const CHIN: usize = 152;
    pub const RIGHT_CHEEK: usize = 234;
    pub const LEFT_CHEEK: usize = 454;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landmark_visibility() {
        let lm = Landmark::new(0.5, 0.5, 0.0).with_visibility(0.7);
        assert!(lm.is_visible(0.5));
        assert!(!lm.is_visible(0.9));
    }

    #[test]
    fn test_tracking_space_flips_y_and_scales_z() {
        let lm = Landmark::new(0.25, 0.5, 0.1);
        let p = lm.to_tracking_space(1000.0, 500.0, 0.3, false);
        assert_eq!(p, Vector3::new(250.0, -250.0, 30.0));
        let mirrored = lm.to_tracking_space(1000.0, 500.0, 0.3, true);
        assert_eq!(mirrored.x, 750.0);
    }

    #[test]
    fn test_side_source_with_mirror() {
        assert_eq!(Side::Left.source(false), Side::Left);
        assert_eq!(Side::Left.source(true), Side::Right);
        assert_eq!(pose::side(Side::Right).shoulder, pose::RIGHT_SHOULDER);
    }

    #[test]
    fn test_frame_inputs_deserialize_defaults() {
        let json = r#"{"pose": [{"x": 0.1, "y": 0.2}]}"#;
        let frame: FrameInputs = serde_json::from_str(json).unwrap();
        let pose = frame.pose.as_ref().unwrap();
        assert_eq!(pose[0].z, 0.0);
        assert_eq!(pose[0].visibility, 1.0);
        assert!(frame.face.is_none());
        assert!(frame.hand(Side::Left).is_none());
    }
}
