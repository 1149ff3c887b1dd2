// src/main.rs - Replays recorded landmark frames through the retargeter
use anyhow::{bail, Context, Result};
use avatar_retarget::config::HeadPoseMode;
use avatar_retarget::{
    BindPose, CsvRecorder, FrameInputs, LatestFrameSlot, Retargeter, RetargetConfig, SinkSet,
};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

const USAGE: &str = "usage: retarget_replay [--realtime] <frames.jsonl> [config.json] [rig.json]";

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let mut realtime = false;
    let mut positional = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--realtime" => realtime = true,
            "-h" | "--help" => {
                println!("{}", USAGE);
                return Ok(());
            }
            _ => positional.push(PathBuf::from(arg)),
        }
    }
    let Some(frames_path) = positional.first() else {
        bail!(USAGE);
    };

    let mut config = match positional.get(1) {
        Some(path) => RetargetConfig::load(path)?,
        None => RetargetConfig::default(),
    };
    // The replay tool has no PnP backend linked in.
    if config.face.head_mode == HeadPoseMode::Pnp {
        info!("No PnP solver available, using triangulated head pose");
        config.face.head_mode = HeadPoseMode::Triangulate;
    }
    let bind = match positional.get(2) {
        Some(path) => BindPose::load(path)?,
        None => BindPose::t_pose(),
    };

    let mut retargeter = Retargeter::new(config, &bind).context("setting up retargeter")?;
    let frames = read_frames(frames_path)?;
    info!("Loaded {} frames from {}", frames.len(), frames_path.display());

    let mut sinks = SinkSet::new();
    sinks.add(Box::new(CsvRecorder::new(output_dir(), None)?));

    let processed = if realtime {
        replay_realtime(&mut retargeter, frames, &mut sinks)?
    } else {
        let mut count = 0;
        for frame in &frames {
            let out = retargeter.retarget(frame);
            sinks.dispatch(&out)?;
            count += 1;
        }
        count
    };
    sinks.finish()?;

    println!("Processed {} frames", processed);
    Ok(())
}

/// One `FrameInputs` JSON object per line. Malformed lines are skipped.
fn read_frames(path: &Path) -> Result<Vec<FrameInputs>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut frames = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("reading {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<FrameInputs>(&line) {
            Ok(frame) => frames.push(frame),
            Err(e) => warn!("Skipping line {}: {}", number + 1, e),
        }
    }
    Ok(frames)
}

/// Feeds frames from a producer thread paced by their timestamps; the solver
/// only ever sees the newest one.
fn replay_realtime(retargeter: &mut Retargeter, frames: Vec<FrameInputs>, sinks: &mut SinkSet) -> Result<usize> {
    let slot = LatestFrameSlot::new();
    let done = Arc::new(AtomicBool::new(false));

    let producer = {
        let slot = slot.clone();
        let done = done.clone();
        thread::spawn(move || {
            let mut previous = frames.first().map(|f| f.timestamp);
            for frame in frames {
                if let Some(prev) = previous {
                    let wait = (frame.timestamp - prev).max(0.0);
                    thread::sleep(Duration::from_secs_f64(wait));
                }
                previous = Some(frame.timestamp);
                slot.publish(frame);
            }
            done.store(true, Ordering::Release);
        })
    };

    let mut count = 0;
    loop {
        match retargeter.poll(&slot) {
            Some(out) => {
                sinks.dispatch(&out)?;
                count += 1;
            }
            None if done.load(Ordering::Acquire) => {
                // Catch a frame published just before the flag flipped.
                if let Some(out) = retargeter.poll(&slot) {
                    sinks.dispatch(&out)?;
                    count += 1;
                }
                break;
            }
            None => thread::sleep(Duration::from_millis(1)),
        }
    }

    if producer.join().is_err() {
        warn!("Frame producer panicked");
    }
    info!("Dropped {} frames while the solver was busy", slot.dropped_count());
    Ok(count)
}

fn output_dir() -> PathBuf {
    directories::UserDirs::new()
        .and_then(|dirs| dirs.document_dir().map(|p| p.join("AvatarRetarget")))
        .unwrap_or_else(|| PathBuf::from("./output"))
}
