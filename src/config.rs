// src/config.rs - Setup-time options for the retargeting pipeline
use crate::error::{Result, RetargetError};
use anyhow::Context;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetargetConfig {
    #[serde(default)]
    pub screen: ScreenConfig,
    #[serde(default)]
    pub kalman: KalmanConfig,
    #[serde(default)]
    pub face: FaceConfig,
    #[serde(default)]
    pub expression: ExpressionConfig,
    #[serde(default)]
    pub body: BodyConfig,
    #[serde(default)]
    pub regions: RegionToggles,
    /// World axis used as the up reference when calibrating bone forwards.
    #[serde(default = "default_reference_forward")]
    pub reference_forward: [f64; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenConfig {
    #[serde(default = "default_width")]
    pub width: f64,
    #[serde(default = "default_height")]
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KalmanConfig {
    #[serde(default = "default_process_noise")]
    pub process_noise: f64,
    #[serde(default = "default_measurement_noise")]
    pub measurement_noise: f64,
}

/// How head rotation is recovered from the face mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadPoseMode {
    /// External perspective-n-point solve against the canonical face model.
    #[default]
    Pnp,
    /// Direct basis from forehead/chin and cheek landmarks.
    Triangulate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceConfig {
    #[serde(default)]
    pub head_mode: HeadPoseMode,
    #[serde(default = "default_eye_open_threshold")]
    pub eye_open_threshold: f64,
    #[serde(default = "default_head_clamp")]
    pub head_clamp_degrees: f64,
    #[serde(default = "default_head_yaw_offset")]
    pub head_yaw_offset_degrees: f64,
    /// Canonical face model, one coordinate per line.
    #[serde(default)]
    pub canonical_model_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    #[default]
    Discrete,
    Continuous,
}

/// How per-eye states fold into a single eyelid control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EyeCombine {
    /// Closed only when both eyes are closed.
    #[default]
    BothClosed,
    EitherClosed,
    /// No combined state; each eye drives its own control.
    PerSide,
}

/// Lower bounds of the Small, Mid and Large mouth buckets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MouthThresholds {
    pub small: f64,
    pub mid: f64,
    pub large: f64,
}

impl Default for MouthThresholds {
    fn default() -> Self {
        Self {
            small: 0.08,
            mid: 0.25,
            large: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpressionConfig {
    #[serde(default)]
    pub output_mode: OutputMode,
    #[serde(default)]
    pub mouth_thresholds: MouthThresholds,
    #[serde(default)]
    pub eye_combine: EyeCombine,
    #[serde(default = "default_blendshape_scale")]
    pub blendshape_scale: f64,
}

/// Which landmark source drives the head bone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadSource {
    #[default]
    Face,
    Body,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyConfig {
    #[serde(default = "default_shoulder_visibility")]
    pub shoulder_visibility: f64,
    #[serde(default = "default_limb_visibility")]
    pub limb_visibility: f64,
    #[serde(default = "default_spine_bias")]
    pub spine_bias: f64,
    #[serde(default = "default_z_scale")]
    pub z_scale: f64,
    #[serde(default)]
    pub mirror: bool,
    #[serde(default)]
    pub head_source: HeadSource,
    /// Minimum angle between the palm plane and the image plane's normal
    /// below which the wrist holds its last rotation.
    #[serde(default = "default_hand_edge_on")]
    pub hand_edge_on_degrees: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionToggles {
    #[serde(default = "default_true")]
    pub face: bool,
    #[serde(default = "default_true")]
    pub torso: bool,
    #[serde(default = "default_true")]
    pub head: bool,
    #[serde(default = "default_true")]
    pub arms: bool,
    #[serde(default = "default_true")]
    pub legs: bool,
    #[serde(default = "default_true")]
    pub hands: bool,
    #[serde(default = "default_true")]
    pub fingers: bool,
}

fn default_width() -> f64 { 1920.0 }
fn default_height() -> f64 { 1080.0 }
fn default_process_noise() -> f64 { 0.125 }
fn default_measurement_noise() -> f64 { 1.0 }
fn default_eye_open_threshold() -> f64 { 0.33 }
fn default_head_clamp() -> f64 { 40.0 }
fn default_head_yaw_offset() -> f64 { 180.0 }
fn default_blendshape_scale() -> f64 { 100.0 }
fn default_shoulder_visibility() -> f64 { 0.9 }
fn default_limb_visibility() -> f64 { 0.5 }
fn default_spine_bias() -> f64 { 0.8 }
fn default_z_scale() -> f64 { 0.3 }
fn default_hand_edge_on() -> f64 { 20.0 }
fn default_reference_forward() -> [f64; 3] { [0.0, 0.0, -1.0] }
fn default_true() -> bool { true }

impl Default for RetargetConfig {
    fn default() -> Self {
        Self {
            screen: ScreenConfig::default(),
            kalman: KalmanConfig::default(),
            face: FaceConfig::default(),
            expression: ExpressionConfig::default(),
            body: BodyConfig::default(),
            regions: RegionToggles::default(),
            reference_forward: default_reference_forward(),
        }
    }
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Default for KalmanConfig {
    fn default() -> Self {
        Self {
            process_noise: default_process_noise(),
            measurement_noise: default_measurement_noise(),
        }
    }
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            head_mode: HeadPoseMode::default(),
            eye_open_threshold: default_eye_open_threshold(),
            head_clamp_degrees: default_head_clamp(),
            head_yaw_offset_degrees: default_head_yaw_offset(),
            canonical_model_path: None,
        }
    }
}

impl Default for ExpressionConfig {
    fn default() -> Self {
        Self {
            output_mode: OutputMode::default(),
            mouth_thresholds: MouthThresholds::default(),
            eye_combine: EyeCombine::default(),
            blendshape_scale: default_blendshape_scale(),
        }
    }
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            shoulder_visibility: default_shoulder_visibility(),
            limb_visibility: default_limb_visibility(),
            spine_bias: default_spine_bias(),
            z_scale: default_z_scale(),
            mirror: false,
            head_source: HeadSource::default(),
            hand_edge_on_degrees: default_hand_edge_on(),
        }
    }
}

impl Default for RegionToggles {
    fn default() -> Self {
        Self {
            face: true,
            torso: true,
            head: true,
            arms: true,
            legs: true,
            hands: true,
            fingers: true,
        }
    }
}

impl RetargetConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: RetargetConfig = serde_json::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn reference_forward(&self) -> Vector3<f64> {
        Vector3::from(self.reference_forward)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(RetargetError::InvalidConfig(msg));

        if !(self.screen.width > 0.0 && self.screen.height > 0.0) {
            return invalid(format!(
                "screen size must be positive, got {}x{}",
                self.screen.width, self.screen.height
            ));
        }
        if !(self.kalman.process_noise > 0.0 && self.kalman.measurement_noise > 0.0) {
            return invalid("kalman noise constants must be positive".to_string());
        }
        let m = &self.expression.mouth_thresholds;
        if !(0.0 <= m.small && m.small < m.mid && m.mid < m.large) {
            return invalid(format!(
                "mouth thresholds must be increasing, got {} {} {}",
                m.small, m.mid, m.large
            ));
        }
        if !(self.face.eye_open_threshold > 0.0) {
            return invalid("eye open threshold must be positive".to_string());
        }
        if !(0.0..=180.0).contains(&self.face.head_clamp_degrees) {
            return invalid("head clamp must be within 0..=180 degrees".to_string());
        }
        for (name, value) in [
            ("shoulder_visibility", self.body.shoulder_visibility),
            ("limb_visibility", self.body.limb_visibility),
            ("spine_bias", self.body.spine_bias),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{} must be within 0..=1, got {}", name, value));
            }
        }
        if !(0.0..90.0).contains(&self.body.hand_edge_on_degrees) {
            return invalid("hand edge-on angle must be within 0..90 degrees".to_string());
        }
        if self.reference_forward().norm() < crate::geometry::DEGENERACY_EPSILON {
            return invalid("reference forward axis has zero length".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RetargetConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.kalman.process_noise, 0.125);
        assert_eq!(config.face.eye_open_threshold, 0.33);
        assert_eq!(config.expression.eye_combine, EyeCombine::BothClosed);
        assert_eq!(config.reference_forward(), Vector3::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn test_default_matches_empty_json() {
        let parsed: RetargetConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, RetargetConfig::default());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{
            "screen": {"width": 640},
            "face": {"head_mode": "triangulate"},
            "body": {"mirror": true},
            "regions": {"legs": false}
        }"#;
        let config: RetargetConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.screen.width, 640.0);
        assert_eq!(config.screen.height, 1080.0);
        assert_eq!(config.face.head_mode, HeadPoseMode::Triangulate);
        assert_eq!(config.face.head_clamp_degrees, 40.0);
        assert!(config.body.mirror);
        assert!(!config.regions.legs);
        assert!(config.regions.arms);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RetargetConfig::default();
        config.expression.mouth_thresholds = MouthThresholds {
            small: 0.3,
            mid: 0.2,
            large: 0.5,
        };
        assert!(matches!(config.validate(), Err(RetargetError::InvalidConfig(_))));

        let mut config = RetargetConfig::default();
        config.kalman.measurement_noise = 0.0;
        assert!(config.validate().is_err());

        let mut config = RetargetConfig::default();
        config.screen.height = -1.0;
        assert!(config.validate().is_err());

        let mut config = RetargetConfig::default();
        config.body.spine_bias = 1.5;
        assert!(config.validate().is_err());
    }
}
