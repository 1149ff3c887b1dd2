// src/skeleton.rs - Rig joints, bind pose and forward calibration
use crate::error::{Result, RetargetError};
use crate::geometry::{look_rotation, world_up};
use crate::landmarks::Side;
use anyhow::Context;
use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Little,
}

impl Finger {
    pub const ALL: [Finger; 5] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Little,
    ];

    fn as_str(self) -> &'static str {
        match self {
            Finger::Thumb => "thumb",
            Finger::Index => "index",
            Finger::Middle => "middle",
            Finger::Ring => "ring",
            Finger::Little => "little",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    Proximal,
    Intermediate,
    Distal,
}

impl Segment {
    pub const ALL: [Segment; 3] = [Segment::Proximal, Segment::Intermediate, Segment::Distal];

    fn as_str(self) -> &'static str {
        match self {
            Segment::Proximal => "proximal",
            Segment::Intermediate => "intermediate",
            Segment::Distal => "distal",
        }
    }

    fn next(self) -> Option<Segment> {
        match self {
            Segment::Proximal => Some(Segment::Intermediate),
            Segment::Intermediate => Some(Segment::Distal),
            Segment::Distal => None,
        }
    }

    fn previous(self) -> Option<Segment> {
        match self {
            Segment::Proximal => None,
            Segment::Intermediate => Some(Segment::Proximal),
            Segment::Distal => Some(Segment::Intermediate),
        }
    }
}

/// Humanoid bone identifier. Every id maps to a dense index in
/// `0..JointId::COUNT`, which the skeleton uses instead of string keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum JointId {
    Hips,
    Spine,
    Neck,
    Head,
    UpperArm(Side),
    LowerArm(Side),
    Hand(Side),
    UpperLeg(Side),
    LowerLeg(Side),
    Foot(Side),
    Finger(Side, Finger, Segment),
}

const CORE_COUNT: usize = 4;
const LIMB_BONES_PER_SIDE: usize = 6;
const FINGER_BONES_PER_SIDE: usize = 15;
const FINGER_BASE: usize = CORE_COUNT + 2 * LIMB_BONES_PER_SIDE;

fn side_index(side: Side) -> usize {
    match side {
        Side::Left => 0,
        Side::Right => 1,
    }
}

impl JointId {
    pub const COUNT: usize = FINGER_BASE + 2 * FINGER_BONES_PER_SIDE;

    pub fn index(self) -> usize {
        let limb = |side: Side, k: usize| CORE_COUNT + side_index(side) * LIMB_BONES_PER_SIDE + k;
        match self {
            JointId::Hips => 0,
            JointId::Spine => 1,
            JointId::Neck => 2,
            JointId::Head => 3,
            JointId::UpperArm(s) => limb(s, 0),
            JointId::LowerArm(s) => limb(s, 1),
            JointId::Hand(s) => limb(s, 2),
            JointId::UpperLeg(s) => limb(s, 3),
            JointId::LowerLeg(s) => limb(s, 4),
            JointId::Foot(s) => limb(s, 5),
            JointId::Finger(s, f, seg) => {
                FINGER_BASE + side_index(s) * FINGER_BONES_PER_SIDE + f as usize * 3 + seg as usize
            }
        }
    }

    pub fn from_index(index: usize) -> Option<JointId> {
        match index {
            0 => Some(JointId::Hips),
            1 => Some(JointId::Spine),
            2 => Some(JointId::Neck),
            3 => Some(JointId::Head),
            i if i < FINGER_BASE => {
                let i = i - CORE_COUNT;
                let side = Side::BOTH[i / LIMB_BONES_PER_SIDE];
                Some(match i % LIMB_BONES_PER_SIDE {
                    0 => JointId::UpperArm(side),
                    1 => JointId::LowerArm(side),
                    2 => JointId::Hand(side),
                    3 => JointId::UpperLeg(side),
                    4 => JointId::LowerLeg(side),
                    _ => JointId::Foot(side),
                })
            }
            i if i < Self::COUNT => {
                let i = i - FINGER_BASE;
                let side = Side::BOTH[i / FINGER_BONES_PER_SIDE];
                let i = i % FINGER_BONES_PER_SIDE;
                Some(JointId::Finger(side, Finger::ALL[i / 3], Segment::ALL[i % 3]))
            }
            _ => None,
        }
    }

    pub fn all() -> impl Iterator<Item = JointId> {
        (0..Self::COUNT).filter_map(JointId::from_index)
    }

    /// Next bone along the chain, whose bind position defines this bone's
    /// forward direction.
    pub fn child(self) -> Option<JointId> {
        match self {
            JointId::Spine => Some(JointId::Neck),
            JointId::Neck => Some(JointId::Head),
            JointId::UpperArm(s) => Some(JointId::LowerArm(s)),
            JointId::LowerArm(s) => Some(JointId::Hand(s)),
            JointId::Hand(s) => Some(JointId::Finger(s, Finger::Middle, Segment::Proximal)),
            JointId::UpperLeg(s) => Some(JointId::LowerLeg(s)),
            JointId::LowerLeg(s) => Some(JointId::Foot(s)),
            JointId::Finger(s, f, seg) => seg.next().map(|n| JointId::Finger(s, f, n)),
            JointId::Hips | JointId::Head | JointId::Foot(_) => None,
        }
    }

    /// Parent bone whose segment supplies the up reference for this bone.
    /// Chain roots (spine, neck, upper limbs) take the torso forward instead.
    pub fn parent(self) -> Option<JointId> {
        match self {
            JointId::LowerArm(s) => Some(JointId::UpperArm(s)),
            JointId::Hand(s) => Some(JointId::LowerArm(s)),
            JointId::LowerLeg(s) => Some(JointId::UpperLeg(s)),
            JointId::Foot(s) => Some(JointId::LowerLeg(s)),
            JointId::Finger(s, f, seg) => Some(match seg.previous() {
                Some(prev) => JointId::Finger(s, f, prev),
                None => JointId::Hand(s),
            }),
            _ => None,
        }
    }

    pub fn side(self) -> Option<Side> {
        match self {
            JointId::UpperArm(s)
            | JointId::LowerArm(s)
            | JointId::Hand(s)
            | JointId::UpperLeg(s)
            | JointId::LowerLeg(s)
            | JointId::Foot(s)
            | JointId::Finger(s, _, _) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JointId::Hips => write!(f, "hips"),
            JointId::Spine => write!(f, "spine"),
            JointId::Neck => write!(f, "neck"),
            JointId::Head => write!(f, "head"),
            JointId::UpperArm(s) => write!(f, "{}_upper_arm", s.as_str()),
            JointId::LowerArm(s) => write!(f, "{}_lower_arm", s.as_str()),
            JointId::Hand(s) => write!(f, "{}_hand", s.as_str()),
            JointId::UpperLeg(s) => write!(f, "{}_upper_leg", s.as_str()),
            JointId::LowerLeg(s) => write!(f, "{}_lower_leg", s.as_str()),
            JointId::Foot(s) => write!(f, "{}_foot", s.as_str()),
            JointId::Finger(s, finger, seg) => {
                write!(f, "{}_{}_{}", s.as_str(), finger.as_str(), seg.as_str())
            }
        }
    }
}

impl FromStr for JointId {
    type Err = RetargetError;

    fn from_str(s: &str) -> Result<Self> {
        JointId::all()
            .find(|id| id.to_string() == s)
            .ok_or_else(|| RetargetError::InvalidConfig(format!("unknown joint name '{}'", s)))
    }
}

impl From<JointId> for String {
    fn from(id: JointId) -> String {
        id.to_string()
    }
}

impl TryFrom<String> for JointId {
    type Error = RetargetError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// Bind-pose placement of one bone, in world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BindJoint {
    pub position: [f64; 3],
    /// Rest rotation as `[x, y, z, w]`.
    #[serde(default = "identity_xyzw")]
    pub rotation: [f64; 4],
}

fn identity_xyzw() -> [f64; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

impl BindJoint {
    pub fn at(x: f64, y: f64, z: f64) -> Self {
        Self {
            position: [x, y, z],
            rotation: identity_xyzw(),
        }
    }

    pub fn position(&self) -> Vector3<f64> {
        Vector3::from(self.position)
    }

    pub fn rest_rotation(&self) -> Result<UnitQuaternion<f64>> {
        let [x, y, z, w] = self.rotation;
        let q = Quaternion::new(w, x, y, z);
        if !(q.norm() > crate::geometry::DEGENERACY_EPSILON) {
            return Err(RetargetError::InvalidConfig(
                "rest rotation has zero length".to_string(),
            ));
        }
        Ok(UnitQuaternion::from_quaternion(q))
    }
}

/// The rig's default pose, supplied once at setup.
///
/// `end_sites` holds positions for leaf bones (head, feet, finger tips) so
/// they can be calibrated without a child bone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BindPose {
    pub joints: BTreeMap<JointId, BindJoint>,
    #[serde(default)]
    pub end_sites: BTreeMap<JointId, [f64; 3]>,
}

impl BindPose {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading bind pose {}", path.display()))?;
        let pose: BindPose = serde_json::from_str(&content)
            .with_context(|| format!("parsing bind pose {}", path.display()))?;
        Ok(pose)
    }

    pub fn position(&self, id: JointId) -> Option<Vector3<f64>> {
        self.joints.get(&id).map(BindJoint::position)
    }

    pub fn end_site(&self, id: JointId) -> Option<Vector3<f64>> {
        self.end_sites.get(&id).map(|p| Vector3::from(*p))
    }

    /// Metre-scale humanoid in a T-pose, facing -Z with +Y up and its left
    /// side toward +X. Palms face down and thumbs point forward. All rest
    /// rotations are identity.
    pub fn t_pose() -> Self {
        let mut pose = BindPose::default();
        let mut put = |id: JointId, x: f64, y: f64, z: f64| {
            pose.joints.insert(id, BindJoint::at(x, y, z));
        };

        put(JointId::Hips, 0.0, 1.0, 0.0);
        put(JointId::Spine, 0.0, 1.1, 0.0);
        put(JointId::Neck, 0.0, 1.45, 0.0);
        put(JointId::Head, 0.0, 1.55, 0.0);

        for side in Side::BOTH {
            let sx = match side {
                Side::Left => 1.0,
                Side::Right => -1.0,
            };
            put(JointId::UpperArm(side), 0.2 * sx, 1.4, 0.0);
            put(JointId::LowerArm(side), 0.45 * sx, 1.4, 0.0);
            put(JointId::Hand(side), 0.7 * sx, 1.4, 0.0);
            put(JointId::UpperLeg(side), 0.1 * sx, 0.95, 0.0);
            put(JointId::LowerLeg(side), 0.1 * sx, 0.5, 0.0);
            put(JointId::Foot(side), 0.1 * sx, 0.08, 0.0);

            for (finger, z) in [
                (Finger::Index, -0.02),
                (Finger::Middle, 0.0),
                (Finger::Ring, 0.02),
                (Finger::Little, 0.04),
            ] {
                for (seg, x) in Segment::ALL.iter().zip([0.8, 0.84, 0.87]) {
                    put(JointId::Finger(side, finger, *seg), x * sx, 1.4, z);
                }
            }
            for (seg, (x, z)) in Segment::ALL
                .iter()
                .zip([(0.73, -0.04), (0.76, -0.06), (0.78, -0.07)])
            {
                put(JointId::Finger(side, Finger::Thumb, *seg), x * sx, 1.39, z);
            }
        }

        pose.end_sites.insert(JointId::Head, [0.0, 1.55, -0.1]);
        for side in Side::BOTH {
            let sx = match side {
                Side::Left => 1.0,
                Side::Right => -1.0,
            };
            pose.end_sites
                .insert(JointId::Foot(side), [0.1 * sx, 0.0, -0.12]);
            for (finger, z) in [
                (Finger::Index, -0.02),
                (Finger::Middle, 0.0),
                (Finger::Ring, 0.02),
                (Finger::Little, 0.04),
            ] {
                pose.end_sites.insert(
                    JointId::Finger(side, finger, Segment::Distal),
                    [0.9 * sx, 1.4, z],
                );
            }
            pose.end_sites.insert(
                JointId::Finger(side, Finger::Thumb, Segment::Distal),
                [0.8 * sx, 1.39, -0.08],
            );
        }
        pose
    }
}

/// One controllable bone.
#[derive(Debug, Clone)]
pub struct Joint {
    pub id: JointId,
    pub rest_rotation: UnitQuaternion<f64>,
    /// `LookRotation(bind - child, reference)` at setup; `None` when the bone
    /// had nothing to look at. Never changes after calibration.
    forward_calibration: Option<UnitQuaternion<f64>>,
    pub bind_position: Vector3<f64>,
    /// Latest smoothed position fed from the landmark stream.
    pub current_estimate: Option<Vector3<f64>>,
    rotation: UnitQuaternion<f64>,
}

impl Joint {
    pub fn forward_calibration(&self) -> Option<&UnitQuaternion<f64>> {
        self.forward_calibration.as_ref()
    }

    /// Last applied world rotation; the rest rotation until the first update.
    pub fn rotation(&self) -> UnitQuaternion<f64> {
        self.rotation
    }
}

/// Fixed-capacity skeleton indexed by `JointId::index`.
#[derive(Debug, Clone)]
pub struct SkeletonGraph {
    joints: Vec<Option<Joint>>,
}

impl SkeletonGraph {
    /// Builds the joint table and runs the one-time forward calibration.
    pub fn from_bind_pose(bind: &BindPose, reference_forward: &Vector3<f64>) -> Result<Self> {
        let mut joints: Vec<Option<Joint>> = vec![None; JointId::COUNT];
        let mut uncalibrated = 0usize;

        for (&id, bind_joint) in &bind.joints {
            let position = bind_joint.position();
            let rest_rotation = bind_joint.rest_rotation()?;
            let forward_calibration = match calibrate(id, &position, bind, reference_forward) {
                Ok(forward) => forward,
                Err(e) => {
                    warn!("Joint {} left uncalibrated: {}", id, e);
                    None
                }
            };
            if forward_calibration.is_none() {
                uncalibrated += 1;
            }
            joints[id.index()] = Some(Joint {
                id,
                rest_rotation,
                forward_calibration,
                bind_position: position,
                current_estimate: None,
                rotation: rest_rotation,
            });
        }

        debug!(
            "Skeleton calibrated: {} joints, {} without forward",
            bind.joints.len(),
            uncalibrated
        );
        Ok(Self { joints })
    }

    pub fn joint(&self, id: JointId) -> Option<&Joint> {
        self.joints[id.index()].as_ref()
    }

    pub fn contains(&self, id: JointId) -> bool {
        self.joint(id).is_some()
    }

    pub fn joints(&self) -> impl Iterator<Item = &Joint> {
        self.joints.iter().flatten()
    }

    /// Applies a world-space target and returns the composed bone rotation:
    /// `target * inverse(forward_calibration) * rest_rotation`.
    pub fn set_rotation(&mut self, id: JointId, target: &UnitQuaternion<f64>) -> Result<UnitQuaternion<f64>> {
        let joint = self.joints[id.index()]
            .as_mut()
            .ok_or_else(|| RetargetError::UncalibratedJoint(id.to_string()))?;
        let forward = joint
            .forward_calibration
            .ok_or_else(|| RetargetError::UncalibratedJoint(id.to_string()))?;
        joint.rotation = target * forward.inverse() * joint.rest_rotation;
        Ok(joint.rotation)
    }

    /// `set_rotation(LookRotation(look, up))`. A degenerate look/up pair leaves
    /// the joint untouched.
    pub fn set_look_rotation(
        &mut self,
        id: JointId,
        look: &Vector3<f64>,
        up: &Vector3<f64>,
    ) -> Result<UnitQuaternion<f64>> {
        let target = look_rotation(look, up)?;
        self.set_rotation(id, &target)
    }

    /// Applies a rotation expressed relative to the rest pose:
    /// `delta * rest_rotation`. Used for the face-driven head.
    pub fn set_relative_rotation(&mut self, id: JointId, delta: &UnitQuaternion<f64>) -> Result<UnitQuaternion<f64>> {
        let joint = self.joints[id.index()]
            .as_mut()
            .ok_or_else(|| RetargetError::UncalibratedJoint(id.to_string()))?;
        joint.rotation = delta * joint.rest_rotation;
        Ok(joint.rotation)
    }

    pub fn record_position(&mut self, id: JointId, position: Vector3<f64>) {
        if let Some(joint) = self.joints[id.index()].as_mut() {
            joint.current_estimate = Some(position);
        }
    }

    pub fn rotation(&self, id: JointId) -> Option<UnitQuaternion<f64>> {
        self.joint(id).map(Joint::rotation)
    }

    /// Returns every joint to its rest rotation and forgets tracked positions.
    pub fn reset(&mut self) {
        for joint in self.joints.iter_mut().flatten() {
            joint.rotation = joint.rest_rotation;
            joint.current_estimate = None;
        }
    }
}

fn calibrate(
    id: JointId,
    position: &Vector3<f64>,
    bind: &BindPose,
    reference_forward: &Vector3<f64>,
) -> Result<Option<UnitQuaternion<f64>>> {
    if id == JointId::Head {
        // The head looks along the gaze, so its calibration uses world up.
        return match bind.end_site(id) {
            Some(nose) => look_rotation(&(nose - position), &world_up()).map(Some),
            None => Ok(None),
        };
    }
    if let Some(child) = id.child().and_then(|c| bind.position(c)) {
        return look_rotation(&(position - child), reference_forward).map(Some);
    }
    if let Some(end) = bind.end_site(id) {
        return look_rotation(&(position - end), reference_forward).map(Some);
    }
    if id.parent().is_none() && id.child().is_none() {
        return look_rotation(reference_forward, &world_up()).map(Some);
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_quat(a: &UnitQuaternion<f64>, b: &UnitQuaternion<f64>, eps: f64) -> bool {
        a.angle_to(b) < eps
    }

    fn reference() -> Vector3<f64> {
        Vector3::new(0.0, 0.0, -1.0)
    }

    #[test]
    fn test_index_round_trip_covers_all_joints() {
        let ids: Vec<JointId> = JointId::all().collect();
        assert_eq!(ids.len(), JointId::COUNT);
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(id.index(), i);
        }
        assert_eq!(JointId::from_index(JointId::COUNT), None);
    }

    #[test]
    fn test_names_parse_back() {
        let id = JointId::Finger(Side::Left, Finger::Index, Segment::Proximal);
        assert_eq!(id.to_string(), "left_index_proximal");
        assert_eq!("left_index_proximal".parse::<JointId>().unwrap(), id);
        assert_eq!("right_upper_arm".parse::<JointId>().unwrap(), JointId::UpperArm(Side::Right));
        assert!("tail".parse::<JointId>().is_err());
    }

    #[test]
    fn test_chain_links() {
        assert_eq!(JointId::Spine.child(), Some(JointId::Neck));
        assert_eq!(JointId::Hand(Side::Left).child(), Some(JointId::Finger(Side::Left, Finger::Middle, Segment::Proximal)));
        assert_eq!(JointId::Finger(Side::Right, Finger::Ring, Segment::Distal).child(), None);
        assert_eq!(JointId::LowerLeg(Side::Right).parent(), Some(JointId::UpperLeg(Side::Right)));
        assert_eq!(JointId::UpperArm(Side::Left).parent(), None);
        assert_eq!(
            JointId::Finger(Side::Left, Finger::Thumb, Segment::Proximal).parent(),
            Some(JointId::Hand(Side::Left))
        );
    }

    #[test]
    fn test_t_pose_calibrates_every_bone() {
        let skeleton = SkeletonGraph::from_bind_pose(&BindPose::t_pose(), &reference()).unwrap();
        assert_eq!(skeleton.joints().count(), JointId::COUNT);
        for joint in skeleton.joints() {
            assert!(joint.forward_calibration().is_some(), "{} uncalibrated", joint.id);
        }
    }

    #[test]
    fn test_rotation_composition_identity() {
        let mut bind = BindPose::t_pose();
        let rest = UnitQuaternion::from_euler_angles(0.3, -0.2, 0.9);
        let q = rest.quaternion();
        bind.joints.get_mut(&JointId::LowerArm(Side::Left)).unwrap().rotation = [q.i, q.j, q.k, q.w];

        let mut skeleton = SkeletonGraph::from_bind_pose(&bind, &reference()).unwrap();
        let id = JointId::LowerArm(Side::Left);
        let look = bind.position(id).unwrap() - bind.position(JointId::Hand(Side::Left)).unwrap();
        let out = skeleton.set_look_rotation(id, &look, &reference()).unwrap();
        assert!(approx_quat(&out, &rest, 1e-6));
    }

    #[test]
    fn test_hips_calibrated_from_reference_axis() {
        let mut skeleton = SkeletonGraph::from_bind_pose(&BindPose::t_pose(), &reference()).unwrap();
        let out = skeleton
            .set_look_rotation(JointId::Hips, &reference(), &world_up())
            .unwrap();
        assert!(approx_quat(&out, &UnitQuaternion::identity(), 1e-6));
    }

    #[test]
    fn test_parallel_look_holds_previous_rotation() {
        let mut skeleton = SkeletonGraph::from_bind_pose(&BindPose::t_pose(), &reference()).unwrap();
        let id = JointId::UpperArm(Side::Right);
        let turned = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.5);
        let applied = skeleton.set_rotation(id, &turned).unwrap();

        let err = skeleton
            .set_look_rotation(id, &Vector3::x(), &(Vector3::x() * 2.0))
            .unwrap_err();
        assert!(matches!(err, RetargetError::GeometricDegeneracy(_)));
        assert_eq!(skeleton.rotation(id), Some(applied));
    }

    #[test]
    fn test_missing_and_uncalibrated_joints() {
        let mut bind = BindPose::default();
        bind.joints.insert(JointId::LowerArm(Side::Left), BindJoint::at(0.0, 0.0, 0.0));
        let mut skeleton = SkeletonGraph::from_bind_pose(&bind, &reference()).unwrap();

        // No hand in the bind pose, so the lower arm has nothing to look at.
        let err = skeleton
            .set_rotation(JointId::LowerArm(Side::Left), &UnitQuaternion::identity())
            .unwrap_err();
        assert!(matches!(err, RetargetError::UncalibratedJoint(_)));
        assert!(skeleton
            .set_rotation(JointId::Hips, &UnitQuaternion::identity())
            .is_err());

        // Relative rotations only need the rest pose.
        let delta = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.2);
        let out = skeleton
            .set_relative_rotation(JointId::LowerArm(Side::Left), &delta)
            .unwrap();
        assert!(approx_quat(&out, &delta, 1e-6));
    }

    #[test]
    fn test_bind_pose_json_round_trip() {
        let bind = BindPose::t_pose();
        let json = serde_json::to_string(&bind).unwrap();
        assert!(json.contains("\"left_index_proximal\""));
        let back: BindPose = serde_json::from_str(&json).unwrap();
        assert_eq!(back.joints.len(), bind.joints.len());
        assert_eq!(back.end_site(JointId::Head), bind.end_site(JointId::Head));
    }

    #[test]
    fn test_reset_restores_rest() {
        let mut skeleton = SkeletonGraph::from_bind_pose(&BindPose::t_pose(), &reference()).unwrap();
        let id = JointId::Spine;
        skeleton.record_position(id, Vector3::new(1.0, 2.0, 3.0));
        skeleton
            .set_rotation(id, &UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 1.0))
            .unwrap();
        skeleton.reset();
        let joint = skeleton.joint(id).unwrap();
        assert_eq!(joint.rotation(), joint.rest_rotation);
        assert!(joint.current_estimate.is_none());
    }
}
