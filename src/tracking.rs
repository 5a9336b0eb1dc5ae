// src/tracking.rs - Squat rep segmentation from pose landmarks
use crate::pose::{PoseFrame, PoseLandmark};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

pub const NEUTRAL_KNEE_ANGLE: f64 = 180.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Knee angle above which the user counts as standing (degrees).
    pub standing_angle: f64,
    /// Knee angle below which a rep starts (degrees).
    pub descending_angle: f64,
    /// Hip drop, as a fraction of the standing hip height, that maps to 100% depth.
    pub depth_range_factor: f64,
    /// Torso lean from vertical that flags a rep as leaning forward (degrees).
    pub max_forward_lean: f64,
    /// Reps closing below this depth are flagged as shallow.
    pub shallow_depth: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            standing_angle: 160.0,
            descending_angle: 140.0,
            depth_range_factor: 0.4,
            max_forward_lean: 45.0,
            shallow_depth: 60.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormIssue {
    ForwardLean,
    ShallowDepth,
}

impl FormIssue {
    pub fn label(&self) -> &'static str {
        match self {
            FormIssue::ForwardLean => "Leaning forward",
            FormIssue::ShallowDepth => "Not deep enough",
        }
    }
}

impl fmt::Display for FormIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SquatRep {
    pub lowest_angle: f64,
    pub max_depth: f64,
    /// Largest torso lean from vertical seen during the rep (degrees).
    pub back_angle: f64,
    pub form_issues: Vec<FormIssue>,
}

impl SquatRep {
    fn open(knee_angle: f64, depth: f64, back_angle: Option<f64>) -> Self {
        Self {
            lowest_angle: knee_angle,
            max_depth: depth,
            back_angle: back_angle.unwrap_or(0.0),
            form_issues: Vec::new(),
        }
    }

    fn track(&mut self, knee_angle: f64, depth: f64, back_angle: Option<f64>) {
        self.lowest_angle = self.lowest_angle.min(knee_angle);
        self.max_depth = self.max_depth.max(depth);
        if let Some(back) = back_angle {
            self.back_angle = self.back_angle.max(back);
        }
    }

    fn finalize(&mut self, config: &TrackerConfig) {
        if self.back_angle > config.max_forward_lean {
            self.form_issues.push(FormIssue::ForwardLean);
        }
        if self.max_depth < config.shallow_depth {
            self.form_issues.push(FormIssue::ShallowDepth);
        }
    }
}

/// Horizontal reference lines in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthGuides {
    pub standing_y: f64,
    pub target_y: f64,
    pub current_y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FormMeasurements {
    /// Ankle separation in percent of frame size.
    pub foot_distance: f64,
    /// Where the hip centre sits between the ankles, 50 = centred.
    pub weight_balance: f64,
    /// Horizontal hip-to-ankle offset in percent of frame width.
    pub forward_shift: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SquatMetrics {
    pub knee_angle: f64,
    pub depth_percentage: f64,
    pub squat_count: u32,
    pub in_squat: bool,
    pub rep_completed: bool,
    pub guides: Option<DepthGuides>,
    pub measurements: Option<FormMeasurements>,
}

impl SquatMetrics {
    pub fn neutral(squat_count: u32) -> Self {
        Self {
            knee_angle: NEUTRAL_KNEE_ANGLE,
            depth_percentage: 0.0,
            squat_count,
            in_squat: false,
            rep_completed: false,
            guides: None,
            measurements: None,
        }
    }
}

impl Default for SquatMetrics {
    fn default() -> Self {
        Self::neutral(0)
    }
}

/// Interior angle at `b` formed by `a-b-c`, in degrees.
///
/// Returns the neutral angle when either arm of the joint has zero length.
pub fn joint_angle(a: &Vector2<f64>, b: &Vector2<f64>, c: &Vector2<f64>) -> f64 {
    let ba = a - b;
    let bc = c - b;

    let norms = ba.norm() * bc.norm();
    if norms == 0.0 || !norms.is_finite() {
        return NEUTRAL_KNEE_ANGLE;
    }

    let cos_angle = (ba.dot(&bc) / norms).clamp(-1.0, 1.0);
    cos_angle.acos().to_degrees()
}

/// Torso lean from vertical, in degrees. Image y grows downwards.
pub fn torso_lean(shoulder: &Vector2<f64>, hip: &Vector2<f64>) -> f64 {
    let torso = shoulder - hip;
    let norm = torso.norm();
    if norm == 0.0 {
        return 0.0;
    }
    let up = Vector2::new(0.0, -1.0);
    (torso.dot(&up) / norm).clamp(-1.0, 1.0).acos().to_degrees()
}

/// Hip drop below the standing baseline as a percentage of the full range.
pub fn depth_percentage(hip_height: f64, baseline: f64, range_factor: f64) -> f64 {
    let max_drop = baseline * range_factor;
    if max_drop <= 0.0 {
        return 0.0;
    }
    ((hip_height - baseline) / max_drop * 100.0).clamp(0.0, 100.0)
}

pub fn form_measurements(pose: &PoseFrame) -> Option<FormMeasurements> {
    let left_ankle = pose.get(PoseLandmark::LeftAnkle)?;
    let right_ankle = pose.get(PoseLandmark::RightAnkle)?;
    let left_hip = pose.get(PoseLandmark::LeftHip)?;
    let right_hip = pose.get(PoseLandmark::RightHip)?;

    let foot_distance = (left_ankle.position() - right_ankle.position()).norm() * 100.0;

    let ankle_mid_x = (left_ankle.x + right_ankle.x) / 2.0;
    let hip_mid_x = (left_hip.x + right_hip.x) / 2.0;
    let forward_shift = (hip_mid_x - ankle_mid_x).abs() * 100.0;

    let stance = left_ankle.x - right_ankle.x;
    let weight_balance = if stance.abs() < f64::EPSILON {
        50.0
    } else {
        ((hip_mid_x - right_ankle.x) / stance * 100.0).clamp(0.0, 100.0)
    };

    Some(FormMeasurements {
        foot_distance,
        weight_balance,
        forward_shift,
    })
}

/// Per-session squat state: standing baseline, open rep and finished reps.
pub struct SquatTracker {
    config: TrackerConfig,
    initial_hip_height: Option<f64>,
    squat_count: u32,
    current_squat: Option<SquatRep>,
    squat_history: Vec<SquatRep>,
}

impl SquatTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            initial_hip_height: None,
            squat_count: 0,
            current_squat: None,
            squat_history: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        info!("Resetting squat tracker after {} reps", self.squat_count);
        self.initial_hip_height = None;
        self.squat_count = 0;
        self.current_squat = None;
        self.squat_history.clear();
    }

    pub fn squat_count(&self) -> u32 {
        self.squat_count
    }

    pub fn in_squat(&self) -> bool {
        self.current_squat.is_some()
    }

    pub fn current_squat(&self) -> Option<&SquatRep> {
        self.current_squat.as_ref()
    }

    pub fn initial_hip_height(&self) -> Option<f64> {
        self.initial_hip_height
    }

    pub fn history(&self) -> &[SquatRep] {
        &self.squat_history
    }

    /// Feeds one frame of landmarks. Uses the left leg; the user stands side-on.
    pub fn process_pose(&mut self, pose: Option<&PoseFrame>, frame_height: f64) -> SquatMetrics {
        let Some(pose) = pose else {
            return SquatMetrics::neutral(self.squat_count);
        };

        let (Some(hip), Some(knee), Some(ankle)) = (
            pose.get(PoseLandmark::LeftHip),
            pose.get(PoseLandmark::LeftKnee),
            pose.get(PoseLandmark::LeftAnkle),
        ) else {
            return SquatMetrics::neutral(self.squat_count);
        };

        let knee_angle = joint_angle(&hip.position(), &knee.position(), &ankle.position());
        let back_angle = pose
            .get(PoseLandmark::LeftShoulder)
            .map(|shoulder| torso_lean(&shoulder.position(), &hip.position()));

        let mut metrics = self.update(knee_angle, hip.y * frame_height, back_angle);
        metrics.measurements = form_measurements(pose);
        metrics
    }

    /// Advances the rep state machine with an already measured knee angle and
    /// hip height in pixels.
    pub fn update(&mut self, knee_angle: f64, hip_height: f64, back_angle: Option<f64>) -> SquatMetrics {
        if !knee_angle.is_finite() || !hip_height.is_finite() {
            return SquatMetrics::neutral(self.squat_count);
        }

        if knee_angle > self.config.standing_angle {
            self.initial_hip_height = Some(hip_height);
        }

        let Some(baseline) = self.initial_hip_height else {
            return SquatMetrics::neutral(self.squat_count);
        };

        let depth = depth_percentage(hip_height, baseline, self.config.depth_range_factor);
        let mut rep_completed = false;

        match self.current_squat.take() {
            None => {
                if knee_angle < self.config.descending_angle {
                    debug!("Rep started at {:.1} degrees", knee_angle);
                    self.current_squat = Some(SquatRep::open(knee_angle, depth, back_angle));
                }
            }
            Some(mut rep) => {
                rep.track(knee_angle, depth, back_angle);
                if knee_angle > self.config.standing_angle {
                    rep.finalize(&self.config);
                    self.squat_count += 1;
                    info!(
                        "Rep {} complete: lowest angle {:.1}, depth {:.1}%",
                        self.squat_count, rep.lowest_angle, rep.max_depth
                    );
                    self.squat_history.push(rep);
                    rep_completed = true;
                } else {
                    self.current_squat = Some(rep);
                }
            }
        }

        SquatMetrics {
            knee_angle,
            depth_percentage: depth,
            squat_count: self.squat_count,
            in_squat: self.in_squat(),
            rep_completed,
            guides: Some(DepthGuides {
                standing_y: baseline,
                target_y: baseline * (1.0 + self.config.depth_range_factor),
                current_y: hip_height,
            }),
            measurements: None,
        }
    }
}

impl Default for SquatTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{Landmark, POSE_LANDMARK_COUNT};

    fn side_pose(hip: (f64, f64), knee: (f64, f64), ankle: (f64, f64)) -> PoseFrame {
        let mut landmarks = vec![Landmark::new(0.5, 0.5); POSE_LANDMARK_COUNT];
        landmarks[PoseLandmark::LeftHip.index()] = Landmark::new(hip.0, hip.1);
        landmarks[PoseLandmark::LeftKnee.index()] = Landmark::new(knee.0, knee.1);
        landmarks[PoseLandmark::LeftAnkle.index()] = Landmark::new(ankle.0, ankle.1);
        landmarks[PoseLandmark::LeftShoulder.index()] = Landmark::new(hip.0, hip.1 - 0.25);
        PoseFrame::new(landmarks)
    }

    #[test]
    fn test_joint_angle_basic_shapes() {
        let hip = Vector2::new(0.5, 0.3);
        let knee = Vector2::new(0.5, 0.5);
        let ankle = Vector2::new(0.5, 0.7);
        assert!((joint_angle(&hip, &knee, &ankle) - 180.0).abs() < 1e-9);

        let hip = Vector2::new(0.3, 0.5);
        assert!((joint_angle(&hip, &knee, &ankle) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_joint_angle_degenerate_is_neutral() {
        let p = Vector2::new(0.5, 0.5);
        assert_eq!(joint_angle(&p, &p, &Vector2::new(0.5, 0.9)), NEUTRAL_KNEE_ANGLE);
    }

    #[test]
    fn test_single_rep_from_angle_sequence() {
        let mut tracker = SquatTracker::default();
        let frames = [
            (180.0, 300.0),
            (180.0, 300.0),
            (135.0, 340.0),
            (120.0, 380.0),
            (135.0, 340.0),
            (180.0, 300.0),
        ];

        for (angle, hip) in frames {
            tracker.update(angle, hip, None);
        }

        assert_eq!(tracker.squat_count(), 1);
        assert_eq!(tracker.history().len(), 1);
        assert_eq!(tracker.history()[0].lowest_angle, 120.0);
        assert!(!tracker.in_squat());
        assert!(tracker.current_squat().is_none());
    }

    #[test]
    fn test_rep_tracks_max_depth() {
        let mut tracker = SquatTracker::default();
        // baseline 300 -> max drop 120 px
        tracker.update(170.0, 300.0, None);
        tracker.update(130.0, 330.0, None);
        tracker.update(100.0, 408.0, None);
        tracker.update(130.0, 330.0, None);
        let metrics = tracker.update(170.0, 300.0, None);

        assert!(metrics.rep_completed);
        assert!((tracker.history()[0].max_depth - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_in_squat_matches_open_rep() {
        let mut tracker = SquatTracker::default();
        tracker.update(175.0, 300.0, None);
        assert!(!tracker.in_squat());

        let metrics = tracker.update(130.0, 350.0, None);
        assert!(metrics.in_squat);
        assert!(tracker.current_squat().is_some());

        // Between thresholds: still in the rep
        let metrics = tracker.update(150.0, 320.0, None);
        assert!(metrics.in_squat);
        assert_eq!(tracker.squat_count(), 0);
    }

    #[test]
    fn test_no_reps_without_standing_baseline() {
        let mut tracker = SquatTracker::default();
        for angle in [130.0, 100.0, 150.0, 130.0] {
            let metrics = tracker.update(angle, 400.0, None);
            assert_eq!(metrics.knee_angle, NEUTRAL_KNEE_ANGLE);
            assert_eq!(metrics.depth_percentage, 0.0);
        }
        assert!(tracker.initial_hip_height().is_none());
        assert!(!tracker.in_squat());
    }

    #[test]
    fn test_depth_percentage_is_clamped() {
        for step in 0..=200 {
            let hip = step as f64 * 5.0;
            let depth = depth_percentage(hip, 300.0, 0.4);
            assert!((0.0..=100.0).contains(&depth), "depth {} for hip {}", depth, hip);
        }
        assert_eq!(depth_percentage(250.0, 300.0, 0.4), 0.0);
        assert_eq!(depth_percentage(1000.0, 300.0, 0.4), 100.0);
        assert!((depth_percentage(360.0, 300.0, 0.4) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_baseline_yields_zero_depth() {
        assert_eq!(depth_percentage(100.0, 0.0, 0.4), 0.0);
    }

    #[test]
    fn test_missing_pose_is_neutral() {
        let mut tracker = SquatTracker::default();
        let metrics = tracker.process_pose(None, 480.0);
        assert_eq!(metrics, SquatMetrics::neutral(0));

        let partial = PoseFrame::new(vec![Landmark::new(0.5, 0.5); 20]);
        let metrics = tracker.process_pose(Some(&partial), 480.0);
        assert_eq!(metrics.knee_angle, NEUTRAL_KNEE_ANGLE);
        assert!(metrics.guides.is_none());
    }

    #[test]
    fn test_process_pose_counts_rep() {
        let mut tracker = SquatTracker::default();
        let standing = side_pose((0.5, 0.5), (0.5, 0.7), (0.5, 0.9));
        let bottom = side_pose((0.3, 0.7), (0.5, 0.7), (0.5, 0.9));

        let metrics = tracker.process_pose(Some(&standing), 480.0);
        assert_eq!(metrics.guides.unwrap().standing_y, 240.0);
        assert!(metrics.measurements.is_some());

        let metrics = tracker.process_pose(Some(&bottom), 480.0);
        assert!((metrics.knee_angle - 90.0).abs() < 1e-6);
        assert!(metrics.in_squat);

        tracker.process_pose(Some(&standing), 480.0);
        assert_eq!(tracker.squat_count(), 1);
        // (336 - 240) / 96 -> full depth
        assert!((tracker.history()[0].max_depth - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_form_issues_flagged_on_close() {
        let mut tracker = SquatTracker::default();
        tracker.update(170.0, 300.0, Some(5.0));
        tracker.update(130.0, 330.0, Some(50.0));
        tracker.update(170.0, 300.0, Some(5.0));

        let rep = &tracker.history()[0];
        assert_eq!(rep.back_angle, 50.0);
        assert_eq!(rep.form_issues, vec![FormIssue::ForwardLean, FormIssue::ShallowDepth]);
    }

    #[test]
    fn test_torso_lean() {
        let hip = Vector2::new(0.5, 0.6);
        assert!(torso_lean(&Vector2::new(0.5, 0.3), &hip).abs() < 1e-9);
        assert!((torso_lean(&Vector2::new(0.8, 0.6), &hip) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_form_measurements() {
        let mut landmarks = vec![Landmark::new(0.5, 0.5); POSE_LANDMARK_COUNT];
        landmarks[PoseLandmark::LeftAnkle.index()] = Landmark::new(0.6, 0.9);
        landmarks[PoseLandmark::RightAnkle.index()] = Landmark::new(0.4, 0.9);
        landmarks[PoseLandmark::LeftHip.index()] = Landmark::new(0.55, 0.5);
        landmarks[PoseLandmark::RightHip.index()] = Landmark::new(0.45, 0.5);
        let m = form_measurements(&PoseFrame::new(landmarks)).unwrap();

        assert!((m.foot_distance - 20.0).abs() < 1e-9);
        assert!(m.forward_shift.abs() < 1e-9);
        assert!((m.weight_balance - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset_clears_session() {
        let mut tracker = SquatTracker::default();
        for (angle, hip) in [(170.0, 300.0), (120.0, 380.0), (170.0, 300.0), (120.0, 380.0)] {
            tracker.update(angle, hip, None);
        }
        assert_eq!(tracker.squat_count(), 1);
        assert!(tracker.in_squat());

        tracker.reset();
        assert_eq!(tracker.squat_count(), 0);
        assert!(tracker.history().is_empty());
        assert!(!tracker.in_squat());
        assert!(tracker.initial_hip_height().is_none());
    }
}
