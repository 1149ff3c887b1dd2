// src/expression.rs - Face metrics to avatar expression signals
use crate::config::{EyeCombine, ExpressionConfig, OutputMode};
use crate::face::{EyeShape, FaceMetrics, MouthShape};
use serde::Serialize;
use std::collections::BTreeMap;

pub const MOUTH_OPEN: &str = "mouth_open";
pub const EYE_CLOSE: &str = "eye_close";
pub const EYE_CLOSE_LEFT: &str = "eye_close_left";
pub const EYE_CLOSE_RIGHT: &str = "eye_close_right";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum MouthSignal {
    Shape(MouthShape),
    /// Raw mouth aspect ratio.
    Ratio(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EyeSignal {
    Combined(EyeShape),
    PerSide { left: EyeShape, right: EyeShape },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpressionSignals {
    pub mouth: MouthSignal,
    pub eyes: EyeSignal,
    /// Blendshape name to weight in `0..=blendshape_scale`.
    pub weights: BTreeMap<&'static str, f64>,
}

impl ExpressionSignals {
    pub fn weight(&self, name: &str) -> Option<f64> {
        self.weights.get(name).copied()
    }
}

/// Stateless mapping from `FaceMetrics` to mouth and eye signals.
#[derive(Debug, Clone)]
pub struct ExpressionMapper {
    config: ExpressionConfig,
}

impl ExpressionMapper {
    pub fn new(config: ExpressionConfig) -> Self {
        Self { config }
    }

    pub fn output_mode(&self) -> OutputMode {
        self.config.output_mode
    }

    pub fn map(&self, metrics: &FaceMetrics) -> ExpressionSignals {
        let scale = self.config.blendshape_scale;
        let mut weights = BTreeMap::new();

        let mouth = match self.config.output_mode {
            OutputMode::Discrete => {
                let shape = metrics.mouth_shape;
                weights.insert(MOUTH_OPEN, mouth_shape_level(shape) * scale);
                MouthSignal::Shape(shape)
            }
            OutputMode::Continuous => {
                weights.insert(MOUTH_OPEN, (metrics.mouth_ratio * scale).clamp(0.0, scale));
                MouthSignal::Ratio(metrics.mouth_ratio)
            }
        };

        let closed = |shape: EyeShape| if shape == EyeShape::Close { scale } else { 0.0 };
        let eyes = match self.config.eye_combine {
            EyeCombine::BothClosed | EyeCombine::EitherClosed => {
                let shape = combine_eyes(metrics.left_eye, metrics.right_eye, self.config.eye_combine);
                weights.insert(EYE_CLOSE, closed(shape));
                EyeSignal::Combined(shape)
            }
            EyeCombine::PerSide => {
                weights.insert(EYE_CLOSE_LEFT, closed(metrics.left_eye));
                weights.insert(EYE_CLOSE_RIGHT, closed(metrics.right_eye));
                EyeSignal::PerSide {
                    left: metrics.left_eye,
                    right: metrics.right_eye,
                }
            }
        };

        ExpressionSignals { mouth, eyes, weights }
    }
}

/// Folds two eye states into one. `PerSide` falls back to the both-closed rule.
pub fn combine_eyes(left: EyeShape, right: EyeShape, policy: EyeCombine) -> EyeShape {
    let closed = match policy {
        EyeCombine::EitherClosed => left == EyeShape::Close || right == EyeShape::Close,
        EyeCombine::BothClosed | EyeCombine::PerSide => {
            left == EyeShape::Close && right == EyeShape::Close
        }
    };
    if closed {
        EyeShape::Close
    } else {
        EyeShape::Open
    }
}

fn mouth_shape_level(shape: MouthShape) -> f64 {
    match shape {
        MouthShape::Close => 0.0,
        MouthShape::Small => 1.0 / 3.0,
        MouthShape::Mid => 2.0 / 3.0,
        MouthShape::Large => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(mouth_ratio: f64, mouth_shape: MouthShape, left: EyeShape, right: EyeShape) -> FaceMetrics {
        FaceMetrics {
            mouth_ratio,
            left_eye_ratio: 0.0,
            right_eye_ratio: 0.0,
            mouth_shape,
            left_eye: left,
            right_eye: right,
            head_rotation: None,
        }
    }

    #[test]
    fn test_combined_eye_requires_both_closed_by_default() {
        let mapper = ExpressionMapper::new(ExpressionConfig::default());
        let winking = mapper.map(&metrics(0.0, MouthShape::Close, EyeShape::Close, EyeShape::Open));
        assert_eq!(winking.eyes, EyeSignal::Combined(EyeShape::Open));
        assert_eq!(winking.weight(EYE_CLOSE), Some(0.0));

        let blinking = mapper.map(&metrics(0.0, MouthShape::Close, EyeShape::Close, EyeShape::Close));
        assert_eq!(blinking.eyes, EyeSignal::Combined(EyeShape::Close));
        assert_eq!(blinking.weight(EYE_CLOSE), Some(100.0));
    }

    #[test]
    fn test_either_closed_and_per_side_policies() {
        assert_eq!(
            combine_eyes(EyeShape::Open, EyeShape::Close, EyeCombine::EitherClosed),
            EyeShape::Close
        );

        let mapper = ExpressionMapper::new(ExpressionConfig {
            eye_combine: EyeCombine::PerSide,
            ..ExpressionConfig::default()
        });
        let signals = mapper.map(&metrics(0.0, MouthShape::Close, EyeShape::Close, EyeShape::Open));
        assert_eq!(
            signals.eyes,
            EyeSignal::PerSide {
                left: EyeShape::Close,
                right: EyeShape::Open
            }
        );
        assert_eq!(signals.weight(EYE_CLOSE_LEFT), Some(100.0));
        assert_eq!(signals.weight(EYE_CLOSE_RIGHT), Some(0.0));
        assert_eq!(signals.weight(EYE_CLOSE), None);
    }

    #[test]
    fn test_discrete_mouth_passes_bucket() {
        let mapper = ExpressionMapper::new(ExpressionConfig::default());
        let signals = mapper.map(&metrics(0.6, MouthShape::Large, EyeShape::Open, EyeShape::Open));
        assert_eq!(signals.mouth, MouthSignal::Shape(MouthShape::Large));
        assert_eq!(signals.weight(MOUTH_OPEN), Some(100.0));
    }

    #[test]
    fn test_continuous_mouth_scales_ratio() {
        let mapper = ExpressionMapper::new(ExpressionConfig {
            output_mode: OutputMode::Continuous,
            ..ExpressionConfig::default()
        });
        let signals = mapper.map(&metrics(0.4, MouthShape::Mid, EyeShape::Open, EyeShape::Open));
        assert_eq!(signals.mouth, MouthSignal::Ratio(0.4));
        assert!((signals.weight(MOUTH_OPEN).unwrap() - 40.0).abs() < 1e-9);

        let wide = mapper.map(&metrics(1.8, MouthShape::Large, EyeShape::Open, EyeShape::Open));
        assert_eq!(wide.weight(MOUTH_OPEN), Some(100.0));
    }
}
