// src/face.rs - Mouth/eye aperture metrics and head rotation from the face mesh
use crate::config::{FaceConfig, HeadPoseMode, MouthThresholds, ScreenConfig};
use crate::error::{Result, RetargetError};
use crate::geometry::{clamp_turn_and_tilt, look_rotation, rotation_from_vector, yaw_rotation};
use crate::landmarks::{face, Landmark, FACE_LANDMARK_COUNT};
use anyhow::Context;
use nalgebra::{Matrix3, UnitQuaternion, Vector2, Vector3};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, trace, warn};

/// Guards the mouth ratio against a zero-width mouth.
const MOUTH_WIDTH_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MouthShape {
    Close,
    Small,
    Mid,
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EyeShape {
    Close,
    Open,
}

impl EyeShape {
    /// `Close` iff `ratio <= threshold`.
    pub fn classify(ratio: f64, threshold: f64) -> Self {
        if ratio > threshold {
            EyeShape::Open
        } else {
            EyeShape::Close
        }
    }
}

impl MouthThresholds {
    pub fn bucket(&self, ratio: f64) -> MouthShape {
        if ratio >= self.large {
            MouthShape::Large
        } else if ratio >= self.mid {
            MouthShape::Mid
        } else if ratio >= self.small {
            MouthShape::Small
        } else {
            MouthShape::Close
        }
    }
}

/// Per-frame face measurements.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceMetrics {
    pub mouth_ratio: f64,
    pub left_eye_ratio: f64,
    pub right_eye_ratio: f64,
    pub mouth_shape: MouthShape,
    pub left_eye: EyeShape,
    pub right_eye: EyeShape,
    /// Omitted when the solve failed this frame.
    pub head_rotation: Option<UnitQuaternion<f64>>,
}

/// Pinhole intrinsics handed to the solver.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraIntrinsics {
    pub matrix: Matrix3<f64>,
    pub distortion: [f64; 4],
}

impl CameraIntrinsics {
    /// Focal length equal to the frame width, principal point at the centre,
    /// no lens distortion.
    pub fn for_frame(width: f64, height: f64) -> Self {
        Self {
            matrix: Matrix3::new(
                width, 0.0, width / 2.0,
                0.0, width, height / 2.0,
                0.0, 0.0, 1.0,
            ),
            distortion: [0.0; 4],
        }
    }
}

/// Inputs of one perspective-n-point solve.
#[derive(Debug)]
pub struct PnpProblem<'a> {
    pub width: f64,
    pub height: f64,
    pub model_points: &'a [Vector3<f64>],
    /// Pixel coordinates, one per model point.
    pub image_points: &'a [Vector2<f64>],
    pub camera: &'a CameraIntrinsics,
}

/// External perspective-n-point solver.
///
/// Implementations update `rotation` (axis-angle, radians) and `translation`
/// in place. When `use_extrinsic_guess` is set the incoming values seed the
/// solve.
pub trait PnpSolver: Send {
    fn solve_pnp(
        &mut self,
        problem: &PnpProblem<'_>,
        rotation: &mut Vector3<f64>,
        translation: &mut Vector3<f64>,
        use_extrinsic_guess: bool,
    ) -> Result<()>;
}

impl<F> PnpSolver for F
where
    F: FnMut(&PnpProblem<'_>, &mut Vector3<f64>, &mut Vector3<f64>, bool) -> Result<()> + Send,
{
    fn solve_pnp(
        &mut self,
        problem: &PnpProblem<'_>,
        rotation: &mut Vector3<f64>,
        translation: &mut Vector3<f64>,
        use_extrinsic_guess: bool,
    ) -> Result<()> {
        self(problem, rotation, translation, use_extrinsic_guess)
    }
}

/// Reference 3D face mesh matched against the detected points.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalFaceModel {
    points: Vec<Vector3<f64>>,
}

impl CanonicalFaceModel {
    pub fn new(points: Vec<Vector3<f64>>) -> Self {
        Self { points }
    }

    /// Parses one coordinate per line, grouped into x/y/z triples. Blank
    /// lines are skipped.
    pub fn from_text(text: &str) -> Result<Self> {
        let values = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| {
                l.parse::<f64>().map_err(|e| {
                    RetargetError::InvalidConfig(format!("bad face model value '{}': {}", l, e))
                })
            })
            .collect::<Result<Vec<f64>>>()?;

        if values.len() % 3 != 0 {
            return Err(RetargetError::InvalidConfig(format!(
                "face model has {} values, not a multiple of 3",
                values.len()
            )));
        }
        let points = values
            .chunks_exact(3)
            .map(|c| Vector3::new(c[0], c[1], c[2]))
            .collect();
        Ok(Self { points })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading face model {}", path.display()))?;
        let model = Self::from_text(&text)
            .with_context(|| format!("parsing face model {}", path.display()))?;
        debug!("Loaded face model with {} points", model.len());
        Ok(model)
    }

    pub fn points(&self) -> &[Vector3<f64>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// `sum(vertical lip gaps) / (2 * mouth width + 1e-6)` on normalized image
/// coordinates.
pub fn mouth_aspect_ratio(landmarks: &[Landmark]) -> Result<f64> {
    require_mesh(landmarks)?;
    let p = |i: usize| landmarks[i].xy();
    let opening: f64 = face::MOUTH_VERTICAL_PAIRS
        .iter()
        .map(|&(upper, lower)| (p(upper) - p(lower)).norm())
        .sum();
    let width = (p(face::MOUTH_LEFT_CORNER) - p(face::MOUTH_RIGHT_CORNER)).norm();
    Ok(opening / (2.0 * width + MOUTH_WIDTH_EPSILON))
}

/// Mean of the seven lid gaps divided by the corner-to-corner width.
pub fn eye_aspect_ratio(landmarks: &[Landmark], contour: &[usize; 16]) -> Result<f64> {
    require_mesh(landmarks)?;
    let p = |i: usize| landmarks[contour[i]].xy();
    let width = (p(0) - p(8)).norm();
    if !(width > crate::geometry::DEGENERACY_EPSILON) {
        return Err(RetargetError::GeometricDegeneracy(
            "eye corners coincide".to_string(),
        ));
    }
    let total: f64 = (1..=7).map(|i| (p(i) - p(8 + i)).norm()).sum();
    Ok(total / width / 7.0)
}

fn require_mesh(landmarks: &[Landmark]) -> Result<()> {
    if landmarks.len() < FACE_LANDMARK_COUNT {
        return Err(RetargetError::MissingInput(format!(
            "face mesh has {} points, need {}",
            landmarks.len(),
            FACE_LANDMARK_COUNT
        )));
    }
    Ok(())
}

/// Eye state reported before the first usable measurement. A zero ratio
/// classifies as closed under any positive threshold.
const UNSEEN_EYE: (f64, EyeShape) = (0.0, EyeShape::Close);

/// Consumes face meshes and produces `FaceMetrics`.
///
/// Holds the previous solve's rotation and translation to seed the next one,
/// and the last eye states so a degenerate eye keeps its classification.
pub struct FaceLandmarkAnalyzer {
    config: FaceConfig,
    screen: ScreenConfig,
    mouth_thresholds: MouthThresholds,
    camera: CameraIntrinsics,
    model: Option<CanonicalFaceModel>,
    solver: Option<Box<dyn PnpSolver>>,
    rotation_vector: Option<Vector3<f64>>,
    translation_vector: Vector3<f64>,
    last_left: (f64, EyeShape),
    last_right: (f64, EyeShape),
}

impl FaceLandmarkAnalyzer {
    pub fn new(config: FaceConfig, screen: ScreenConfig, mouth_thresholds: MouthThresholds) -> Self {
        Self {
            camera: CameraIntrinsics::for_frame(screen.width, screen.height),
            config,
            screen,
            mouth_thresholds,
            model: None,
            solver: None,
            rotation_vector: None,
            translation_vector: Vector3::zeros(),
            last_left: UNSEEN_EYE,
            last_right: UNSEEN_EYE,
        }
    }

    pub fn with_solver(mut self, model: CanonicalFaceModel, solver: Box<dyn PnpSolver>) -> Self {
        self.model = Some(model);
        self.solver = Some(solver);
        self
    }

    pub fn has_solver(&self) -> bool {
        self.solver.is_some() && self.model.is_some()
    }

    pub fn head_mode(&self) -> HeadPoseMode {
        self.config.head_mode
    }

    pub fn set_head_mode(&mut self, mode: HeadPoseMode) {
        self.config.head_mode = mode;
    }

    /// Forgets the solver seed and the held eye states; the next solve runs
    /// without a guess.
    pub fn reset(&mut self) {
        self.rotation_vector = None;
        self.translation_vector = Vector3::zeros();
        self.last_left = UNSEEN_EYE;
        self.last_right = UNSEEN_EYE;
    }

    /// Analyzes one face mesh. Only a missing or short mesh fails the call;
    /// per-part failures are pushed to `faults` and the affected output holds
    /// or is omitted.
    pub fn analyze(&mut self, landmarks: &[Landmark], faults: &mut Vec<RetargetError>) -> Result<FaceMetrics> {
        require_mesh(landmarks)?;

        let mouth_ratio = mouth_aspect_ratio(landmarks)?;
        let threshold = self.config.eye_open_threshold;
        let left = Self::eye_state(landmarks, &face::LEFT_EYE, threshold, &mut self.last_left, faults);
        let right = Self::eye_state(landmarks, &face::RIGHT_EYE, threshold, &mut self.last_right, faults);

        let head_rotation = match self.head_rotation(landmarks) {
            Ok(q) => Some(q),
            Err(e) => {
                if self.config.head_mode == HeadPoseMode::Pnp && !self.has_solver() {
                    debug!("Head rotation omitted: {}", e);
                } else {
                    warn!("Head rotation omitted: {}", e);
                }
                faults.push(e);
                None
            }
        };

        trace!(
            "Face metrics: mar={:.3} left_ear={:.3} right_ear={:.3}",
            mouth_ratio,
            left.0,
            right.0
        );

        Ok(FaceMetrics {
            mouth_ratio,
            left_eye_ratio: left.0,
            right_eye_ratio: right.0,
            mouth_shape: self.mouth_thresholds.bucket(mouth_ratio),
            left_eye: left.1,
            right_eye: right.1,
            head_rotation,
        })
    }

    fn eye_state(
        landmarks: &[Landmark],
        contour: &[usize; 16],
        threshold: f64,
        last: &mut (f64, EyeShape),
        faults: &mut Vec<RetargetError>,
    ) -> (f64, EyeShape) {
        match eye_aspect_ratio(landmarks, contour) {
            Ok(ratio) => {
                *last = (ratio, EyeShape::classify(ratio, threshold));
            }
            Err(e) => {
                debug!("Eye state held: {}", e);
                faults.push(e);
            }
        }
        *last
    }

    /// Raw head rotation for the configured mode, then the yaw offset and
    /// the turn/tilt clamp.
    pub fn head_rotation(&mut self, landmarks: &[Landmark]) -> Result<UnitQuaternion<f64>> {
        let raw = match self.config.head_mode {
            HeadPoseMode::Pnp => self.solve_head_pnp(landmarks)?,
            HeadPoseMode::Triangulate => self.triangulate_head(landmarks)?,
        };
        let offset = yaw_rotation(self.config.head_yaw_offset_degrees);
        Ok(clamp_turn_and_tilt(&(offset * raw), self.config.head_clamp_degrees))
    }

    fn solve_head_pnp(&mut self, landmarks: &[Landmark]) -> Result<UnitQuaternion<f64>> {
        let (model, solver) = match (self.model.as_ref(), self.solver.as_mut()) {
            (Some(model), Some(solver)) => (model, solver),
            _ => {
                return Err(RetargetError::ExternalSolverFailure(
                    "no solver or face model configured".to_string(),
                ))
            }
        };

        // Detectors with iris refinement append points after the mesh.
        let mesh = &landmarks[..landmarks.len().min(FACE_LANDMARK_COUNT)];
        if mesh.len() != model.len() {
            return Err(RetargetError::ExternalSolverFailure(format!(
                "{} image points for {} model points",
                mesh.len(),
                model.len()
            )));
        }
        let image_points: Vec<Vector2<f64>> = mesh
            .iter()
            .map(|l| l.to_pixel(self.screen.width, self.screen.height))
            .collect();

        let problem = PnpProblem {
            width: self.screen.width,
            height: self.screen.height,
            model_points: model.points(),
            image_points: &image_points,
            camera: &self.camera,
        };

        let use_guess = self.rotation_vector.is_some();
        let mut rotation = self.rotation_vector.unwrap_or_else(Vector3::zeros);
        let mut translation = self.translation_vector;
        solver.solve_pnp(&problem, &mut rotation, &mut translation, use_guess)?;

        // Only a usable result becomes the next seed.
        let q = rotation_from_vector(&rotation)?;
        self.rotation_vector = Some(rotation);
        self.translation_vector = translation;
        Ok(q)
    }

    /// Basis from the forehead-chin and cheek-to-cheek axes in tracking space.
    fn triangulate_head(&self, landmarks: &[Landmark]) -> Result<UnitQuaternion<f64>> {
        require_mesh(landmarks)?;
        let p = |i: usize| landmarks[i].to_tracking_space(self.screen.width, self.screen.height, 1.0, false);
        let across = p(face::LEFT_CHEEK) - p(face::RIGHT_CHEEK);
        let up = p(face::FOREHEAD) - p(face::CHIN);
        let forward = up.cross(&across);
        look_rotation(&forward, &up)
    }
}
