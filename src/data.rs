// src/data.rs - Output sinks and CSV session recording
use crate::expression::{EYE_CLOSE, EYE_CLOSE_LEFT, EYE_CLOSE_RIGHT, MOUTH_OPEN};
use crate::tracking::FrameOutputs;
use anyhow::{Context, Result};
use chrono::Local;
use csv::Writer;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A consumer of per-frame results (animator, recorder, debug overlay).
pub trait OutputSink {
    fn name(&self) -> &str;
    fn consume(&mut self, frame: &FrameOutputs) -> Result<()>;

    /// Called once when the stream ends.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Named fan-out to any number of sinks, chosen by the caller.
#[derive(Default)]
pub struct SinkSet {
    sinks: Vec<Box<dyn OutputSink>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, sink: Box<dyn OutputSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Removes the sink called `name`, returning whether one was found.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.sinks.len();
        self.sinks.retain(|s| s.name() != name);
        self.sinks.len() != before
    }

    /// Delivers `frame` to every sink. A failing sink is logged and does not
    /// stop delivery to the others; the first error is returned.
    pub fn dispatch(&mut self, frame: &FrameOutputs) -> Result<()> {
        let mut first_error = None;
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.consume(frame) {
                warn!("Sink {} failed: {:#}", sink.name(), e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn finish(&mut self) -> Result<()> {
        for sink in self.sinks.iter_mut() {
            sink.finish()
                .with_context(|| format!("finishing sink {}", sink.name()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct RotationRecord {
    timestamp: f64,
    frame: u64,
    joint: String,
    x: f64,
    y: f64,
    z: f64,
    w: f64,
}

#[derive(Debug, Serialize)]
struct ExpressionRecord {
    timestamp: f64,
    frame: u64,
    mouth_ratio: f64,
    mouth_shape: String,
    left_eye_ratio: f64,
    right_eye_ratio: f64,
    left_eye: String,
    right_eye: String,
    mouth_open: Option<f64>,
    eye_close: Option<f64>,
    eye_close_left: Option<f64>,
    eye_close_right: Option<f64>,
}

#[derive(Debug, Default, Serialize)]
struct SessionSummary {
    session: String,
    frames: u64,
    rotations: u64,
    expression_frames: u64,
    faults: BTreeMap<&'static str, u64>,
}

/// Streams rotations and expression signals to CSV files under
/// `<output_dir>/<session>/`, plus a `summary.json` on finish.
pub struct CsvRecorder {
    session_dir: PathBuf,
    rotations: Writer<File>,
    expressions: Writer<File>,
    summary: SessionSummary,
}

impl CsvRecorder {
    pub fn new(output_dir: impl AsRef<Path>, session_name: Option<String>) -> Result<Self> {
        let session_name = session_name.unwrap_or_else(|| {
            format!("session_{}", Local::now().format("%Y%m%d_%H%M%S"))
        });
        let session_dir = output_dir.as_ref().join(&session_name);
        std::fs::create_dir_all(&session_dir)
            .with_context(|| format!("creating {}", session_dir.display()))?;

        let open = |file: &str| -> Result<Writer<File>> {
            let path = session_dir.join(file);
            let handle = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
            Ok(Writer::from_writer(handle))
        };
        let rotations = open("rotations.csv")?;
        let expressions = open("expressions.csv")?;

        info!("Recording session to {}", session_dir.display());
        Ok(Self {
            session_dir,
            rotations,
            expressions,
            summary: SessionSummary {
                session: session_name,
                ..SessionSummary::default()
            },
        })
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    fn write_frame(&mut self, frame: &FrameOutputs) -> Result<()> {
        let index = self.summary.frames;
        for (id, q) in &frame.joint_rotations {
            let c = q.coords;
            self.rotations.serialize(RotationRecord {
                timestamp: frame.timestamp,
                frame: index,
                joint: id.to_string(),
                x: c.x,
                y: c.y,
                z: c.z,
                w: c.w,
            })?;
            self.summary.rotations += 1;
        }

        if let (Some(face), Some(signals)) = (&frame.face, &frame.expression) {
            self.expressions.serialize(ExpressionRecord {
                timestamp: frame.timestamp,
                frame: index,
                mouth_ratio: face.mouth_ratio,
                mouth_shape: format!("{:?}", face.mouth_shape),
                left_eye_ratio: face.left_eye_ratio,
                right_eye_ratio: face.right_eye_ratio,
                left_eye: format!("{:?}", face.left_eye),
                right_eye: format!("{:?}", face.right_eye),
                mouth_open: signals.weight(MOUTH_OPEN),
                eye_close: signals.weight(EYE_CLOSE),
                eye_close_left: signals.weight(EYE_CLOSE_LEFT),
                eye_close_right: signals.weight(EYE_CLOSE_RIGHT),
            })?;
            self.summary.expression_frames += 1;
        }

        for fault in &frame.faults {
            *self.summary.faults.entry(fault.kind()).or_insert(0) += 1;
        }
        self.summary.frames += 1;
        Ok(())
    }
}

impl OutputSink for CsvRecorder {
    fn name(&self) -> &str {
        "csv"
    }

    fn consume(&mut self, frame: &FrameOutputs) -> Result<()> {
        self.write_frame(frame)
            .with_context(|| format!("recording frame at t={}", frame.timestamp))
    }

    fn finish(&mut self) -> Result<()> {
        self.rotations.flush()?;
        self.expressions.flush()?;
        let path = self.session_dir.join("summary.json");
        let json = serde_json::to_string_pretty(&self.summary)?;
        std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        info!(
            "Session {} closed: {} frames, {} rotations",
            self.summary.session, self.summary.frames, self.summary.rotations
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RetargetError;
    use crate::skeleton::JointId;
    use nalgebra::UnitQuaternion;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("avatar_retarget_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    struct Counting {
        name: &'static str,
        seen: Rc<RefCell<Vec<f64>>>,
        fail: bool,
    }

    impl OutputSink for Counting {
        fn name(&self) -> &str {
            self.name
        }

        fn consume(&mut self, frame: &FrameOutputs) -> Result<()> {
            self.seen.borrow_mut().push(frame.timestamp);
            if self.fail {
                anyhow::bail!("sink {} is broken", self.name);
            }
            Ok(())
        }
    }

    #[test]
    fn test_sink_set_fans_out_past_failures() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut sinks = SinkSet::new();
        for (name, fail) in [("broken", true), ("animator", false)] {
            sinks.add(Box::new(Counting {
                name,
                seen: seen.clone(),
                fail,
            }));
        }
        assert_eq!(sinks.names(), vec!["broken", "animator"]);

        let frame = FrameOutputs {
            timestamp: 0.5,
            ..FrameOutputs::default()
        };
        assert!(sinks.dispatch(&frame).is_err());
        assert_eq!(seen.borrow().len(), 2);

        assert!(sinks.remove("broken"));
        assert!(!sinks.remove("broken"));
        assert!(sinks.dispatch(&frame).is_ok());
        assert_eq!(sinks.len(), 1);
    }

    #[test]
    fn test_csv_recorder_writes_session() {
        let dir = scratch_dir("csv");
        let mut recorder = CsvRecorder::new(&dir, Some("take_1".to_string())).unwrap();

        let mut frame = FrameOutputs {
            timestamp: 0.25,
            ..FrameOutputs::default()
        };
        frame.joint_rotations.insert(JointId::Hips, UnitQuaternion::identity());
        frame
            .faults
            .push(RetargetError::LowConfidence("left arm occluded".to_string()));
        recorder.consume(&frame).unwrap();
        recorder.finish().unwrap();

        let session = dir.join("take_1");
        let rotations = std::fs::read_to_string(session.join("rotations.csv")).unwrap();
        let mut lines = rotations.lines();
        assert_eq!(lines.next(), Some("timestamp,frame,joint,x,y,z,w"));
        assert_eq!(lines.next(), Some("0.25,0,hips,0.0,0.0,0.0,1.0"));

        let summary = std::fs::read_to_string(session.join("summary.json")).unwrap();
        let summary: serde_json::Value = serde_json::from_str(&summary).unwrap();
        assert_eq!(summary["frames"], 1);
        assert_eq!(summary["faults"]["low_confidence"], 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_default_session_name_uses_timestamp() {
        let dir = scratch_dir("session");
        let recorder = CsvRecorder::new(&dir, None).unwrap();
        let name = recorder
            .session_dir()
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap()
            .to_string();
        assert!(name.starts_with("session_"));
        assert_eq!(name.len(), "session_".len() + 15);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
