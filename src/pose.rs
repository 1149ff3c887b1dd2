// src/pose.rs - Body landmarks to bone look rotations
use crate::config::{BodyConfig, HeadSource, KalmanConfig, RegionToggles, ScreenConfig};
use crate::error::{Result, RetargetError};
use crate::geometry::{
    first_non_finite, lerp, look_rotation, midpoint, project_onto_axis, triangle_normal, world_up,
};
use crate::kalman::FilterBank;
use crate::landmarks::{pose, Landmark, Side, POSE_LANDMARK_COUNT};
use crate::skeleton::JointId;
use nalgebra::{UnitQuaternion, Vector3};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// World-space look rotations for the bones that had a stable, visible
/// landmark set this frame. Bones missing from `targets` hold their pose.
#[derive(Debug, Clone, Default)]
pub struct PoseJointRotations {
    pub targets: BTreeMap<JointId, UnitQuaternion<f64>>,
    /// Smoothed tracking-space position of every bone that was solved.
    pub positions: BTreeMap<JointId, Vector3<f64>>,
    pub torso_forward: Option<Vector3<f64>>,
}

/// Turns a 33-point body landmark set into bone rotations.
///
/// Every landmark runs through its own filter channel before any direction is
/// derived from it.
pub struct PoseRetargeter {
    config: BodyConfig,
    screen: ScreenConfig,
    regions: RegionToggles,
    filters: FilterBank<POSE_LANDMARK_COUNT>,
    last_forward: Option<Vector3<f64>>,
    /// Set after a frame without a usable body; the next measured frame
    /// restarts the filters.
    lost: bool,
}

impl PoseRetargeter {
    pub fn new(config: BodyConfig, screen: ScreenConfig, regions: RegionToggles, kalman: KalmanConfig) -> Self {
        Self {
            config,
            screen,
            regions,
            filters: FilterBank::new(kalman.process_noise, kalman.measurement_noise),
            last_forward: None,
            lost: false,
        }
    }

    pub fn last_forward(&self) -> Option<Vector3<f64>> {
        self.last_forward
    }

    pub fn reset(&mut self) {
        self.filters.reset();
        self.last_forward = None;
        self.lost = false;
    }

    /// Marks the body as not detected this frame.
    pub fn mark_lost(&mut self) {
        self.lost = true;
    }

    /// Solves one frame. `hand_driven` lists rig sides whose wrist comes from
    /// hand landmarks this frame; the body wrist estimate is skipped for them.
    ///
    /// Fails only when the whole frame is unusable (missing points, occluded
    /// shoulders or non-finite coordinates); in that case no filter is
    /// touched.
    pub fn retarget(
        &mut self,
        landmarks: &[Landmark],
        hand_driven: &[Side],
        faults: &mut Vec<RetargetError>,
    ) -> Result<PoseJointRotations> {
        if landmarks.len() < POSE_LANDMARK_COUNT {
            self.lost = true;
            return Err(RetargetError::MissingInput(format!(
                "body has {} points, need {}",
                landmarks.len(),
                POSE_LANDMARK_COUNT
            )));
        }
        let gate = self.config.shoulder_visibility;
        for index in [pose::LEFT_SHOULDER, pose::RIGHT_SHOULDER] {
            if !landmarks[index].is_visible(gate) {
                self.lost = true;
                return Err(RetargetError::LowConfidence(format!(
                    "shoulder landmark {} visibility {:.2} below {:.2}",
                    index, landmarks[index].visibility, gate
                )));
            }
        }

        let (w, h) = (self.screen.width, self.screen.height);
        let (z_scale, mirror) = (self.config.z_scale, self.config.mirror);
        let measured: [Vector3<f64>; POSE_LANDMARK_COUNT] =
            std::array::from_fn(|i| landmarks[i].to_tracking_space(w, h, z_scale, mirror));
        if let Some(index) = first_non_finite(&measured) {
            return Err(RetargetError::GeometricDegeneracy(format!(
                "body point {} is not finite",
                index
            )));
        }
        if std::mem::take(&mut self.lost) {
            debug!("Body re-acquired, filters restarted");
            self.filters.reset();
        }
        let points = self.filters.update_all(&measured);

        let mut out = PoseJointRotations::default();
        let idx = |side: Side| pose::side(side.source(mirror));
        let (left, right) = (idx(Side::Left), idx(Side::Right));
        let p = |i: usize| points[i];

        let forward = match triangle_normal(&p(left.shoulder), &p(left.hip), &p(right.hip)) {
            Ok(forward) => {
                self.last_forward = Some(forward);
                forward
            }
            Err(e) => {
                debug!("Torso forward degenerate, holding previous: {}", e);
                faults.push(e);
                match self.last_forward {
                    Some(forward) => forward,
                    None => return Ok(out),
                }
            }
        };
        out.torso_forward = Some(forward);

        let hip = midpoint(&p(left.hip), &p(right.hip));
        let neck = midpoint(&p(left.shoulder), &p(right.shoulder));
        let spine = lerp(&hip, &neck, self.config.spine_bias);
        let mid_ear = midpoint(&p(left.ear), &p(right.ear));
        let head = match project_onto_axis(&p(pose::NOSE), &neck, &mid_ear) {
            Ok(head) => Some(head),
            Err(e) => {
                faults.push(e);
                None
            }
        };

        if self.regions.torso {
            out.positions.insert(JointId::Hips, hip);
            out.positions.insert(JointId::Spine, spine);
            out.positions.insert(JointId::Neck, neck);
            insert_target(&mut out, faults, JointId::Hips, look_rotation(&forward, &world_up()));
            insert_target(&mut out, faults, JointId::Spine, look_rotation(&(spine - neck), &forward));
            if let Some(head) = head {
                insert_target(&mut out, faults, JointId::Neck, look_rotation(&(neck - head), &forward));
            }
        }

        if self.regions.head && self.config.head_source == HeadSource::Body {
            if let Some(head) = head {
                let nose = p(pose::NOSE);
                out.positions.insert(JointId::Head, head);
                let rotation = triangle_normal(&nose, &p(right.ear), &p(left.ear))
                    .and_then(|up| look_rotation(&(nose - head), &up));
                insert_target(&mut out, faults, JointId::Head, rotation);
            }
        }

        let visible = |indices: &[usize]| {
            indices
                .iter()
                .all(|&i| landmarks[i].is_visible(self.config.limb_visibility))
        };

        for side in Side::BOTH {
            let s = idx(side);

            if self.regions.arms {
                if visible(&[s.shoulder, s.elbow, s.wrist]) {
                    let mut ids = vec![JointId::UpperArm(side), JointId::LowerArm(side)];
                    let mut chain = vec![p(s.shoulder), p(s.elbow), p(s.wrist)];
                    let body_wrist = self.regions.hands && !hand_driven.contains(&side);
                    if body_wrist && visible(&[s.pinky, s.index]) {
                        ids.push(JointId::Hand(side));
                        chain.push(midpoint(&p(s.pinky), &p(s.index)));
                    }
                    solve_chain(&mut out, faults, &forward, &ids, &chain);
                } else {
                    faults.push(RetargetError::LowConfidence(format!("{} arm occluded", side.as_str())));
                }
            }

            if self.regions.legs {
                if visible(&[s.hip, s.knee, s.ankle]) {
                    let mut ids = vec![JointId::UpperLeg(side), JointId::LowerLeg(side)];
                    let mut chain = vec![p(s.hip), p(s.knee), p(s.ankle)];
                    if visible(&[s.foot_index]) {
                        ids.push(JointId::Foot(side));
                        chain.push(p(s.foot_index));
                    }
                    solve_chain(&mut out, faults, &forward, &ids, &chain);
                } else {
                    faults.push(RetargetError::LowConfidence(format!("{} leg occluded", side.as_str())));
                }
            }
        }

        trace!("Body frame solved {} bones", out.targets.len());
        Ok(out)
    }
}

fn insert_target(
    out: &mut PoseJointRotations,
    faults: &mut Vec<RetargetError>,
    id: JointId,
    rotation: Result<UnitQuaternion<f64>>,
) {
    match rotation {
        Ok(q) => {
            out.targets.insert(id, q);
        }
        Err(e) => {
            debug!("{} held: {}", id, e);
            faults.push(e);
        }
    }
}

/// Solves a limb chain. `points[k]` is the position of `ids[k]`; the last
/// point is the end of the final bone. The root bone uses the torso forward as
/// up, each later bone its parent segment. A straight limb makes the parent
/// segment parallel to the bone, so the up axis the parent bone ended up with
/// is used instead.
fn solve_chain(
    out: &mut PoseJointRotations,
    faults: &mut Vec<RetargetError>,
    forward: &Vector3<f64>,
    ids: &[JointId],
    points: &[Vector3<f64>],
) {
    let mut carried_up = *forward;
    for (k, &id) in ids.iter().enumerate() {
        out.positions.insert(id, points[k]);
        let look = points[k] - points[k + 1];
        let rotation = if k == 0 {
            look_rotation(&look, forward)
        } else {
            let parent_segment = points[k - 1] - points[k];
            look_rotation(&look, &parent_segment).or_else(|_| look_rotation(&look, &carried_up))
        };
        if let Ok(q) = &rotation {
            carried_up = q * Vector3::y();
        }
        insert_target(out, faults, id, rotation);
    }
}
