// src/tracking.rs - Per-frame retargeting pipeline
use crate::config::{HeadPoseMode, HeadSource, RetargetConfig};
use crate::error::{Result, RetargetError};
use crate::expression::{ExpressionMapper, ExpressionSignals};
use crate::face::{CanonicalFaceModel, FaceLandmarkAnalyzer, FaceMetrics, PnpSolver};
use crate::hand::HandRetargeter;
use crate::handoff::LatestFrameSlot;
use crate::landmarks::{FrameInputs, Side};
use crate::pose::PoseRetargeter;
use crate::skeleton::{BindPose, JointId, SkeletonGraph};
use anyhow::Context;
use nalgebra::UnitQuaternion;
use std::collections::BTreeMap;
use tracing::{debug, info, trace, warn};

/// Everything one frame produced for the rig and the expression renderer.
#[derive(Debug, Clone, Default)]
pub struct FrameOutputs {
    pub timestamp: f64,
    /// Final bone rotations for the joints updated this frame. Joints not
    /// listed keep their previous rotation.
    pub joint_rotations: BTreeMap<JointId, UnitQuaternion<f64>>,
    pub face: Option<FaceMetrics>,
    pub expression: Option<ExpressionSignals>,
    /// Face-derived head rotation before it is composed with the rest pose.
    pub head_rotation: Option<UnitQuaternion<f64>>,
    /// Recoverable problems hit while solving this frame.
    pub faults: Vec<RetargetError>,
}

impl FrameOutputs {
    pub fn rotation(&self, id: JointId) -> Option<&UnitQuaternion<f64>> {
        self.joint_rotations.get(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.joint_rotations.is_empty() && self.expression.is_none()
    }
}

/// Owns the analyzers, their filters, and the calibrated skeleton. Call
/// `retarget` once per frame from a single thread.
pub struct Retargeter {
    config: RetargetConfig,
    skeleton: SkeletonGraph,
    face: FaceLandmarkAnalyzer,
    body: PoseRetargeter,
    hands: [HandRetargeter; 2],
    expression: ExpressionMapper,
    frame_counter: u64,
}

impl Retargeter {
    pub fn new(config: RetargetConfig, bind: &BindPose) -> Result<Self> {
        config.validate()?;
        let skeleton = SkeletonGraph::from_bind_pose(bind, &config.reference_forward())?;

        let face = FaceLandmarkAnalyzer::new(
            config.face.clone(),
            config.screen,
            config.expression.mouth_thresholds,
        );
        let body = PoseRetargeter::new(config.body, config.screen, config.regions, config.kalman);
        let hands = Side::BOTH.map(|side| {
            HandRetargeter::new(side, &config.body, config.screen, config.kalman, config.regions.fingers)
        });
        let expression = ExpressionMapper::new(config.expression);

        info!(
            "Retargeter ready: {} joints, {}x{} screen, head mode {:?}",
            skeleton.joints().count(),
            config.screen.width,
            config.screen.height,
            config.face.head_mode
        );

        Ok(Self {
            config,
            skeleton,
            face,
            body,
            hands,
            expression,
            frame_counter: 0,
        })
    }

    /// Installs the external PnP solver and the canonical face model it
    /// solves against.
    pub fn with_solver(mut self, model: CanonicalFaceModel, solver: Box<dyn PnpSolver>) -> Self {
        self.face = self.face.with_solver(model, solver);
        self
    }

    /// Like `with_solver`, loading the face model from
    /// `face.canonical_model_path`.
    pub fn with_configured_solver(self, solver: Box<dyn PnpSolver>) -> anyhow::Result<Self> {
        let path = self
            .config
            .face
            .canonical_model_path
            .clone()
            .context("face.canonical_model_path is not set")?;
        let model = CanonicalFaceModel::load(&path)?;
        Ok(self.with_solver(model, solver))
    }

    pub fn config(&self) -> &RetargetConfig {
        &self.config
    }

    pub fn skeleton(&self) -> &SkeletonGraph {
        &self.skeleton
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_counter
    }

    pub fn set_head_mode(&mut self, mode: HeadPoseMode) {
        self.config.face.head_mode = mode;
        self.face.set_head_mode(mode);
    }

    /// Runs one frame. Regions absent from `frame` are skipped and their
    /// joints hold the last applied rotation.
    pub fn retarget(&mut self, frame: &FrameInputs) -> FrameOutputs {
        let mut out = FrameOutputs {
            timestamp: frame.timestamp,
            ..FrameOutputs::default()
        };
        self.frame_counter += 1;

        self.process_face(frame, &mut out);
        let hand_driven = self.process_hands(frame, &mut out);
        self.process_body(frame, &hand_driven, &mut out);

        if !out.faults.is_empty() {
            debug!(
                "Frame {} finished with {} fault(s)",
                self.frame_counter,
                out.faults.len()
            );
        }
        out
    }

    /// Runs the newest published frame, if one arrived since the last poll.
    pub fn poll(&mut self, slot: &LatestFrameSlot) -> Option<FrameOutputs> {
        let frame = slot.take_latest()?;
        Some(self.retarget(&frame))
    }

    /// Drops all filter history and solver seeds and returns the rig to rest.
    pub fn reset(&mut self) {
        self.face.reset();
        self.body.reset();
        for hand in self.hands.iter_mut() {
            hand.reset();
        }
        self.skeleton.reset();
        info!("Retargeter reset after {} frames", self.frame_counter);
    }

    fn process_face(&mut self, frame: &FrameInputs, out: &mut FrameOutputs) {
        let regions = self.config.regions;
        let face_drives_head = regions.head && self.config.body.head_source == HeadSource::Face;
        if !regions.face && !face_drives_head {
            return;
        }
        let Some(landmarks) = frame.face.as_deref() else {
            trace!("No face this frame");
            return;
        };

        let metrics = match self.face.analyze(landmarks, &mut out.faults) {
            Ok(metrics) => metrics,
            Err(e) => {
                debug!("Face skipped: {}", e);
                out.faults.push(e);
                return;
            }
        };

        if face_drives_head {
            if let Some(q) = metrics.head_rotation {
                out.head_rotation = Some(q);
                if self.skeleton.contains(JointId::Head) {
                    match self.skeleton.set_relative_rotation(JointId::Head, &q) {
                        Ok(rotation) => {
                            out.joint_rotations.insert(JointId::Head, rotation);
                        }
                        Err(e) => out.faults.push(e),
                    }
                }
            }
        }
        if regions.face {
            out.expression = Some(self.expression.map(&metrics));
        }
        out.face = Some(metrics);
    }

    /// Returns the rig sides whose wrist came from a hand landmark list.
    fn process_hands(&mut self, frame: &FrameInputs, out: &mut FrameOutputs) -> Vec<Side> {
        let mut driven = Vec::new();
        if !self.config.regions.hands {
            return driven;
        }
        let mirror = self.config.body.mirror;

        for hand in self.hands.iter_mut() {
            let side = hand.side();
            let Some(landmarks) = frame.hand(side.source(mirror)) else {
                trace!("No {} hand this frame", side.as_str());
                hand.mark_lost();
                continue;
            };
            match hand.retarget(landmarks, &mut out.faults) {
                Ok(pose) => {
                    driven.push(side);
                    for (id, target) in &pose.targets {
                        apply_target(&mut self.skeleton, out, *id, target);
                    }
                }
                Err(e) => {
                    debug!("{} hand skipped: {}", side.as_str(), e);
                    out.faults.push(e);
                }
            }
        }
        driven
    }

    fn process_body(&mut self, frame: &FrameInputs, hand_driven: &[Side], out: &mut FrameOutputs) {
        let regions = self.config.regions;
        let body_head = regions.head && self.config.body.head_source == HeadSource::Body;
        if !(regions.torso || regions.arms || regions.legs || regions.hands || body_head) {
            return;
        }
        let Some(landmarks) = frame.pose.as_deref() else {
            trace!("No body this frame");
            self.body.mark_lost();
            return;
        };

        match self.body.retarget(landmarks, hand_driven, &mut out.faults) {
            Ok(pose) => {
                for (id, position) in pose.positions {
                    self.skeleton.record_position(id, position);
                }
                for (id, target) in &pose.targets {
                    apply_target(&mut self.skeleton, out, *id, target);
                }
            }
            Err(e) => {
                warn!("Body skipped: {}", e);
                out.faults.push(e);
            }
        }
    }
}

/// Rigs without a bone (a face-only avatar with no fingers, say) silently
/// ignore targets for it.
fn apply_target(
    skeleton: &mut SkeletonGraph,
    out: &mut FrameOutputs,
    id: JointId,
    target: &UnitQuaternion<f64>,
) {
    if !skeleton.contains(id) {
        return;
    }
    match skeleton.set_rotation(id, target) {
        Ok(rotation) => {
            out.joint_rotations.insert(id, rotation);
        }
        Err(e) => {
            debug!("{} not applied: {}", id, e);
            out.faults.push(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::PnpProblem;
    use crate::landmarks::{pose, Landmark};
    use nalgebra::Vector3;

    fn retargeter() -> Retargeter {
        Retargeter::new(RetargetConfig::default(), &BindPose::t_pose()).unwrap()
    }

    #[test]
    fn test_empty_frame_produces_nothing() {
        let mut r = retargeter();
        let out = r.retarget(&FrameInputs {
            timestamp: 1.5,
            ..FrameInputs::default()
        });
        assert_eq!(out.timestamp, 1.5);
        assert!(out.is_empty());
        assert!(out.faults.is_empty());
        assert_eq!(r.frame_count(), 1);
    }

    #[test]
    fn test_default_config_builds() {
        let r = Retargeter::new(RetargetConfig::default(), &BindPose::t_pose()).unwrap();
        assert_eq!(r.config().reference_forward(), Vector3::new(0.0, 0.0, -1.0));
        assert_eq!(r.frame_count(), 0);
    }

    #[test]
    fn test_body_gap_restarts_smoothing() {
        let body = |elbow_y: f64| {
            let mut lm = vec![Landmark::new(0.5, 0.5, 0.0); crate::landmarks::POSE_LANDMARK_COUNT];
            for (i, x, y) in [
                (pose::LEFT_SHOULDER, 0.6, 0.3),
                (pose::RIGHT_SHOULDER, 0.4, 0.3),
                (pose::LEFT_ELBOW, 0.75, elbow_y),
                (pose::RIGHT_ELBOW, 0.25, 0.3),
                (pose::LEFT_WRIST, 0.9, 0.3),
                (pose::RIGHT_WRIST, 0.1, 0.3),
                (pose::LEFT_HIP, 0.6, 0.6),
                (pose::RIGHT_HIP, 0.4, 0.6),
            ] {
                lm[i] = Landmark::new(x, y, 0.0);
            }
            FrameInputs {
                pose: Some(lm),
                ..FrameInputs::default()
            }
        };
        let arm = JointId::UpperArm(Side::Left);

        let mut fresh = retargeter();
        let expected = fresh.retarget(&body(0.3));
        assert!(expected.rotation(arm).is_some());

        let mut r = retargeter();
        r.retarget(&body(0.45));
        r.retarget(&FrameInputs::default());
        let out = r.retarget(&body(0.3));
        assert_eq!(out.rotation(arm), expected.rotation(arm));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = RetargetConfig::default();
        config.kalman.measurement_noise = -1.0;
        let err = Retargeter::new(config, &BindPose::t_pose()).err().unwrap();
        assert!(matches!(err, RetargetError::InvalidConfig(_)));
    }

    #[test]
    fn test_short_face_is_reported_not_fatal() {
        let mut r = retargeter();
        let out = r.retarget(&FrameInputs {
            face: Some(vec![Landmark::default(); 10]),
            ..FrameInputs::default()
        });
        assert!(out.face.is_none());
        assert!(matches!(out.faults[0], RetargetError::MissingInput(_)));
    }

    #[test]
    fn test_missing_rig_bone_is_ignored() {
        let mut bind = BindPose::t_pose();
        bind.joints.retain(|id, _| !matches!(id, JointId::UpperArm(_)));
        let mut armless = Retargeter::new(RetargetConfig::default(), &bind).unwrap();
        let mut out = FrameOutputs::default();
        apply_target(
            &mut armless.skeleton,
            &mut out,
            JointId::UpperArm(Side::Left),
            &UnitQuaternion::identity(),
        );
        assert!(out.joint_rotations.is_empty());
        assert!(out.faults.is_empty());
    }

    fn noop_solver(
        _: &PnpProblem<'_>,
        _: &mut Vector3<f64>,
        _: &mut Vector3<f64>,
        _: bool,
    ) -> Result<()> {
        Ok(())
    }

    #[test]
    fn test_configured_solver_loads_model() {
        assert!(retargeter().with_configured_solver(Box::new(noop_solver)).is_err());

        let path = std::env::temp_dir().join(format!("avatar_retarget_model_{}.txt", std::process::id()));
        std::fs::write(&path, "0.0\n1.0\n2.0\n").unwrap();
        let mut config = RetargetConfig::default();
        config.face.canonical_model_path = Some(path.clone());
        let r = Retargeter::new(config, &BindPose::t_pose())
            .unwrap()
            .with_configured_solver(Box::new(noop_solver))
            .unwrap();
        assert!(r.face.has_solver());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_poll_consumes_slot_once() {
        let mut r = retargeter();
        let slot = LatestFrameSlot::new();
        assert!(r.poll(&slot).is_none());
        slot.publish(FrameInputs {
            timestamp: 3.0,
            ..FrameInputs::default()
        });
        assert_eq!(r.poll(&slot).map(|o| o.timestamp), Some(3.0));
        assert!(r.poll(&slot).is_none());
    }
}
