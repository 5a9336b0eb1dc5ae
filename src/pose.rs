// src/pose.rs - Pose landmark types and providers
use anyhow::{Context, Result};
use image::DynamicImage;
use nalgebra::Vector2;
use serde::Deserialize;
use std::io::{BufRead, BufReader, Cursor, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Number of landmarks in a BlazePose body estimate.
pub const POSE_LANDMARK_COUNT: usize = 33;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    pub visibility: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, visibility: 1.0 }
    }

    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// BlazePose indices for the joints this app reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoseLandmark {
    Nose = 0,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
}

impl PoseLandmark {
    pub fn index(self) -> usize {
        self as usize
    }
}

pub const SKELETON_CONNECTIONS: &[(PoseLandmark, PoseLandmark)] = &[
    (PoseLandmark::LeftShoulder, PoseLandmark::RightShoulder),
    (PoseLandmark::LeftShoulder, PoseLandmark::LeftElbow),
    (PoseLandmark::LeftElbow, PoseLandmark::LeftWrist),
    (PoseLandmark::RightShoulder, PoseLandmark::RightElbow),
    (PoseLandmark::RightElbow, PoseLandmark::RightWrist),
    (PoseLandmark::LeftShoulder, PoseLandmark::LeftHip),
    (PoseLandmark::RightShoulder, PoseLandmark::RightHip),
    (PoseLandmark::LeftHip, PoseLandmark::RightHip),
    (PoseLandmark::LeftHip, PoseLandmark::LeftKnee),
    (PoseLandmark::LeftKnee, PoseLandmark::LeftAnkle),
    (PoseLandmark::RightHip, PoseLandmark::RightKnee),
    (PoseLandmark::RightKnee, PoseLandmark::RightAnkle),
];

/// All landmarks reported for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoseFrame {
    landmarks: Vec<Landmark>,
}

impl PoseFrame {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self { landmarks }
    }

    /// Returns the joint if the provider reported it with finite coordinates.
    pub fn get(&self, joint: PoseLandmark) -> Option<&Landmark> {
        self.landmarks
            .get(joint.index())
            .filter(|lm| lm.is_finite())
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }
}

#[derive(Debug, Error)]
pub enum PoseError {
    #[error("pose helper closed its output")]
    HelperExited,
    #[error("malformed pose helper reply: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("landmark {index} has {len} coordinates, expected at least 2")]
    Shape { index: usize, len: usize },
    #[error("pose helper i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),
}

/// Source of per-frame body landmarks. `Ok(None)` means no person was found.
pub trait PoseProvider {
    fn name(&self) -> &str;

    fn detect(&mut self, frame: &DynamicImage) -> Result<Option<PoseFrame>, PoseError>;

    /// Hint for providers that synthesize motion; real estimators ignore it.
    fn set_motion(&mut self, _motion: SimulatedMotion) {}
}

#[derive(Deserialize)]
struct HelperReply {
    landmarks: Option<Vec<Vec<f64>>>,
}

/// Parses one helper reply line: `{"landmarks": [[x, y, visibility], ...]}` or
/// `{"landmarks": null}` when nobody is in frame.
pub fn parse_helper_reply(line: &str) -> Result<Option<PoseFrame>, PoseError> {
    let reply: HelperReply = serde_json::from_str(line.trim())?;
    let Some(points) = reply.landmarks else {
        return Ok(None);
    };

    let mut landmarks = Vec::with_capacity(points.len());
    for (index, point) in points.iter().enumerate() {
        if point.len() < 2 {
            return Err(PoseError::Shape { index, len: point.len() });
        }
        landmarks.push(Landmark {
            x: point[0],
            y: point[1],
            visibility: point.get(2).copied().unwrap_or(1.0),
        });
    }

    Ok(Some(PoseFrame::new(landmarks)))
}

/// Runs an external pose estimator as a child process.
///
/// Each frame is sent as a little-endian `u32` byte length followed by PNG
/// bytes; the helper answers with one JSON line per frame.
pub struct ProcessPoseProvider {
    label: String,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ProcessPoseProvider {
    pub fn spawn(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .context("Pose helper command is empty")?;

        info!("Starting pose helper: {}", command.join(" "));
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start pose helper `{}`", program))?;

        let stdin = child.stdin.take().context("Pose helper has no stdin")?;
        let stdout = child.stdout.take().context("Pose helper has no stdout")?;

        Ok(Self {
            label: program.clone(),
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }
}

impl PoseProvider for ProcessPoseProvider {
    fn name(&self) -> &str {
        &self.label
    }

    fn detect(&mut self, frame: &DynamicImage) -> Result<Option<PoseFrame>, PoseError> {
        let mut png = Vec::new();
        frame.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)?;

        self.stdin.write_all(&(png.len() as u32).to_le_bytes())?;
        self.stdin.write_all(&png)?;
        self.stdin.flush()?;

        let mut line = String::new();
        if self.stdout.read_line(&mut line)? == 0 {
            return Err(PoseError::HelperExited);
        }
        parse_helper_reply(&line)
    }
}

impl Drop for ProcessPoseProvider {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            debug!("Pose helper already stopped: {}", e);
        }
        let _ = self.child.wait();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedMotion {
    Squat,
    Compressions,
}

/// Animated side-on figure used when no pose helper is configured.
pub struct SimulatedPose {
    sim_time: f64,
    motion: SimulatedMotion,
}

const SIM_FRAME_DT: f64 = 0.033;
const SIM_SEGMENT: f64 = 0.2;
const SIM_TORSO: f64 = 0.25;

impl SimulatedPose {
    pub fn new() -> Self {
        Self {
            sim_time: 0.0,
            motion: SimulatedMotion::Squat,
        }
    }

    fn generate(&self) -> PoseFrame {
        let t = self.sim_time;
        let mut landmarks = vec![Landmark::new(0.5, 0.5); POSE_LANDMARK_COUNT];
        let mut set = |joint: PoseLandmark, x: f64, y: f64| {
            landmarks[joint.index()] = Landmark::new(x, y);
        };

        match self.motion {
            SimulatedMotion::Squat => {
                // Knee angle sweeps 175 -> 65 -> 175 every four seconds
                let phase = (1.0 - (t * std::f64::consts::PI / 2.0).cos()) / 2.0;
                let knee_angle = 175.0 - 110.0 * phase;
                let tilt = ((180.0 - knee_angle) / 2.0).to_radians();
                let lean = tilt * 0.6;

                for (offset, hip, knee, ankle, shoulder, wrist) in [
                    (0.0, PoseLandmark::LeftHip, PoseLandmark::LeftKnee, PoseLandmark::LeftAnkle,
                        PoseLandmark::LeftShoulder, PoseLandmark::LeftWrist),
                    (0.03, PoseLandmark::RightHip, PoseLandmark::RightKnee, PoseLandmark::RightAnkle,
                        PoseLandmark::RightShoulder, PoseLandmark::RightWrist),
                ] {
                    let ankle_pos = (0.5 + offset, 0.9);
                    let knee_pos = (
                        ankle_pos.0 + tilt.sin() * SIM_SEGMENT,
                        ankle_pos.1 - tilt.cos() * SIM_SEGMENT,
                    );
                    let hip_pos = (
                        knee_pos.0 - tilt.sin() * SIM_SEGMENT,
                        knee_pos.1 - tilt.cos() * SIM_SEGMENT,
                    );
                    let shoulder_pos = (
                        hip_pos.0 + lean.sin() * SIM_TORSO,
                        hip_pos.1 - lean.cos() * SIM_TORSO,
                    );
                    set(ankle, ankle_pos.0, ankle_pos.1);
                    set(knee, knee_pos.0, knee_pos.1);
                    set(hip, hip_pos.0, hip_pos.1);
                    set(shoulder, shoulder_pos.0, shoulder_pos.1);
                    set(wrist, shoulder_pos.0 + 0.15, shoulder_pos.1 + 0.05);
                }
            }
            SimulatedMotion::Compressions => {
                // Roughly 110 compressions per minute
                let push = ((t * 110.0 / 60.0 * 2.0 * std::f64::consts::PI).sin() + 1.0) / 2.0;
                let wrist_y = 0.55 + 0.2 * push;
                set(PoseLandmark::LeftShoulder, 0.45, 0.35 + 0.1 * push);
                set(PoseLandmark::RightShoulder, 0.55, 0.35 + 0.1 * push);
                set(PoseLandmark::LeftWrist, 0.48, wrist_y);
                set(PoseLandmark::RightWrist, 0.52, wrist_y);
                set(PoseLandmark::LeftHip, 0.4, 0.6);
                set(PoseLandmark::RightHip, 0.45, 0.6);
                set(PoseLandmark::LeftKnee, 0.35, 0.85);
                set(PoseLandmark::RightKnee, 0.4, 0.85);
                set(PoseLandmark::LeftAnkle, 0.2, 0.88);
                set(PoseLandmark::RightAnkle, 0.25, 0.88);
            }
        }

        PoseFrame::new(landmarks)
    }
}

impl Default for SimulatedPose {
    fn default() -> Self {
        Self::new()
    }
}

impl PoseProvider for SimulatedPose {
    fn name(&self) -> &str {
        "simulation"
    }

    fn detect(&mut self, _frame: &DynamicImage) -> Result<Option<PoseFrame>, PoseError> {
        let frame = self.generate();
        self.sim_time += SIM_FRAME_DT;
        Ok(Some(frame))
    }

    fn set_motion(&mut self, motion: SimulatedMotion) {
        if self.motion != motion {
            self.motion = motion;
            self.sim_time = 0.0;
        }
    }
}

/// Builds the configured provider, falling back to simulation if the helper
/// cannot be started.
pub fn create_provider(helper_command: &[String]) -> Box<dyn PoseProvider> {
    if helper_command.is_empty() {
        info!("No pose helper configured, using simulation mode");
        return Box::new(SimulatedPose::new());
    }

    match ProcessPoseProvider::spawn(helper_command) {
        Ok(provider) => Box::new(provider),
        Err(e) => {
            warn!("Pose helper unavailable ({:#}), using simulation mode", e);
            Box::new(SimulatedPose::new())
        }
    }
}
