// src/hand.rs - Hand landmarks to wrist and finger rotations
use crate::config::{BodyConfig, KalmanConfig, ScreenConfig};
use crate::error::{Result, RetargetError};
use crate::geometry::{first_non_finite, look_rotation, orthonormalize, triangle_normal, DEGENERACY_EPSILON};
use crate::kalman::FilterBank;
use crate::landmarks::{hand, Landmark, Side, HAND_LANDMARK_COUNT};
use crate::skeleton::{Finger, JointId, Segment};
use nalgebra::{UnitQuaternion, Vector3};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Landmark chain (base, two inner joints, tip) for each finger.
fn finger_chain(finger: Finger) -> [usize; 4] {
    match finger {
        Finger::Thumb => [hand::THUMB_CMC, hand::THUMB_MCP, hand::THUMB_IP, hand::THUMB_TIP],
        Finger::Index => [hand::INDEX_MCP, hand::INDEX_PIP, hand::INDEX_DIP, hand::INDEX_TIP],
        Finger::Middle => [hand::MIDDLE_MCP, hand::MIDDLE_PIP, hand::MIDDLE_DIP, hand::MIDDLE_TIP],
        Finger::Ring => [hand::RING_MCP, hand::RING_PIP, hand::RING_DIP, hand::RING_TIP],
        Finger::Little => [hand::PINKY_MCP, hand::PINKY_PIP, hand::PINKY_DIP, hand::PINKY_TIP],
    }
}

/// Two knuckles that, with the wrist, span the palm plane around a finger.
/// Ordered thumb side first so every finger sees the same normal direction.
fn palm_plane(finger: Finger) -> (usize, usize) {
    match finger {
        Finger::Thumb => (hand::THUMB_CMC, hand::INDEX_MCP),
        Finger::Index => (hand::INDEX_MCP, hand::MIDDLE_MCP),
        Finger::Middle => (hand::MIDDLE_MCP, hand::RING_MCP),
        Finger::Ring | Finger::Little => (hand::RING_MCP, hand::PINKY_MCP),
    }
}

fn side_sign(side: Side) -> f64 {
    match side {
        Side::Left => 1.0,
        Side::Right => -1.0,
    }
}

#[derive(Debug, Clone, Default)]
pub struct HandPose {
    pub targets: BTreeMap<JointId, UnitQuaternion<f64>>,
    /// Unit normal pointing out of the palm.
    pub palm_normal: Option<Vector3<f64>>,
    /// Set when the palm was edge-on to the camera and the wrist kept its
    /// previous rotation.
    pub wrist_held: bool,
}

/// Wrist and finger solver for one rig hand.
pub struct HandRetargeter {
    side: Side,
    screen: ScreenConfig,
    mirror: bool,
    edge_on_sine: f64,
    fingers: bool,
    filters: FilterBank<HAND_LANDMARK_COUNT>,
    /// Set while the hand is out of view; the next measured frame restarts
    /// the filters.
    lost: bool,
}

impl HandRetargeter {
    pub fn new(side: Side, body: &BodyConfig, screen: ScreenConfig, kalman: KalmanConfig, fingers: bool) -> Self {
        Self {
            side,
            screen,
            mirror: body.mirror,
            edge_on_sine: body.hand_edge_on_degrees.to_radians().sin(),
            fingers,
            filters: FilterBank::new(kalman.process_noise, kalman.measurement_noise),
            lost: false,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn reset(&mut self) {
        self.filters.reset();
        self.lost = false;
    }

    /// Marks the hand as not detected this frame.
    pub fn mark_lost(&mut self) {
        self.lost = true;
    }

    /// Solves one frame of 21 hand points.
    ///
    /// Positions are taken relative to the wrist and divided by the thumb
    /// chain length so the detector's depth scale cancels out. Non-finite
    /// points or a zero-length thumb chain reject the frame before any filter
    /// is updated.
    pub fn retarget(&mut self, landmarks: &[Landmark], faults: &mut Vec<RetargetError>) -> Result<HandPose> {
        if landmarks.len() < HAND_LANDMARK_COUNT {
            self.lost = true;
            return Err(RetargetError::MissingInput(format!(
                "{} hand has {} points, need {}",
                self.side.as_str(),
                landmarks.len(),
                HAND_LANDMARK_COUNT
            )));
        }

        let (w, h) = (self.screen.width, self.screen.height);
        let raw: [Vector3<f64>; HAND_LANDMARK_COUNT] =
            std::array::from_fn(|i| landmarks[i].to_tracking_space(w, h, 1.0, self.mirror));
        if let Some(index) = first_non_finite(&raw) {
            return Err(RetargetError::GeometricDegeneracy(format!(
                "{} hand point {} is not finite",
                self.side.as_str(),
                index
            )));
        }

        let thumb_length: f64 = hand::THUMB_CHAIN
            .windows(2)
            .map(|pair| (raw[pair[1]] - raw[pair[0]]).norm())
            .sum();
        if thumb_length < DEGENERACY_EPSILON {
            return Err(RetargetError::GeometricDegeneracy(format!(
                "{} thumb chain has zero length",
                self.side.as_str()
            )));
        }
        let wrist = raw[hand::WRIST];
        let normalized: [Vector3<f64>; HAND_LANDMARK_COUNT] =
            std::array::from_fn(|i| (raw[i] - wrist) / thumb_length);
        if std::mem::take(&mut self.lost) {
            debug!("{} hand re-acquired, filters restarted", self.side.as_str());
            self.filters.reset();
        }
        let points = self.filters.update_all(&normalized);

        let mut out = HandPose::default();
        self.solve_wrist(&points, &mut out, faults);
        if self.fingers {
            self.solve_fingers(&points, &mut out, faults);
        }
        trace!("{} hand solved {} bones", self.side.as_str(), out.targets.len());
        Ok(out)
    }

    fn solve_wrist(&self, points: &[Vector3<f64>; HAND_LANDMARK_COUNT], out: &mut HandPose, faults: &mut Vec<RetargetError>) {
        let wrist = points[hand::WRIST];
        let to_middle = points[hand::MIDDLE_MCP] - wrist;
        let to_index = points[hand::INDEX_MCP] - wrist;

        let (u_middle, u_index) = match orthonormalize(&to_middle, &to_index) {
            Ok(basis) => basis,
            Err(e) => {
                faults.push(e);
                return;
            }
        };
        // Orthonormal inputs, so this is already unit length.
        let normal = u_index.cross(&u_middle);
        let palm_normal = normal * side_sign(self.side);
        out.palm_normal = Some(palm_normal);

        if palm_normal.z.abs() < self.edge_on_sine {
            debug!("{} palm edge-on, wrist held", self.side.as_str());
            out.wrist_held = true;
            return;
        }

        let look = wrist - points[hand::MIDDLE_MCP];
        let up = normal.cross(&look);
        match look_rotation(&look, &up) {
            Ok(q) => {
                out.targets.insert(JointId::Hand(self.side), q);
            }
            Err(e) => faults.push(e),
        }
    }

    /// Each segment looks back toward its base with the in-palm axis across
    /// the knuckles as up.
    fn solve_fingers(&self, points: &[Vector3<f64>; HAND_LANDMARK_COUNT], out: &mut HandPose, faults: &mut Vec<RetargetError>) {
        let wrist = points[hand::WRIST];
        for finger in Finger::ALL {
            let (a, b) = palm_plane(finger);
            let normal = match triangle_normal(&wrist, &points[a], &points[b]) {
                Ok(n) => n,
                Err(e) => {
                    faults.push(e);
                    continue;
                }
            };
            let chain = finger_chain(finger);
            for (k, segment) in Segment::ALL.into_iter().enumerate() {
                let look = points[chain[k]] - points[chain[k + 1]];
                let up = normal.cross(&look);
                match look_rotation(&look, &up) {
                    Ok(q) => {
                        out.targets.insert(JointId::Finger(self.side, finger, segment), q);
                    }
                    Err(e) => faults.push(e),
                }
            }
        }
    }
}
