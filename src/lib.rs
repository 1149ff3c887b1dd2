// src/lib.rs - Landmark-to-rig retargeting core
pub mod config;
pub mod data;
pub mod error;
pub mod expression;
pub mod face;
pub mod geometry;
pub mod hand;
pub mod handoff;
pub mod kalman;
pub mod landmarks;
pub mod pose;
pub mod skeleton;
pub mod tracking;

pub use config::RetargetConfig;
pub use data::{CsvRecorder, OutputSink, SinkSet};
pub use error::{Result, RetargetError};
pub use expression::{ExpressionMapper, ExpressionSignals};
pub use face::{CanonicalFaceModel, FaceLandmarkAnalyzer, FaceMetrics, PnpProblem, PnpSolver};
pub use handoff::LatestFrameSlot;
pub use landmarks::{FrameInputs, Landmark, Side};
pub use skeleton::{BindPose, JointId, SkeletonGraph};
pub use tracking::{FrameOutputs, Retargeter};
