// src/cpr.rs - CPR compression cadence analysis
use crate::pose::{PoseFrame, PoseLandmark};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CprConfig {
    /// Depth a sample must exceed to register a compression peak.
    pub peak_threshold: f64,
    pub min_interval_secs: f64,
    pub max_interval_secs: f64,
    /// Without a peak for this long the rate drops to zero.
    pub idle_reset_secs: f64,
    /// Number of inter-peak intervals averaged for the rate.
    pub interval_window: usize,
    pub target_depth_min: f64,
    pub target_depth_max: f64,
    pub depth_penalty_per_unit: f64,
    pub target_rate_min: f64,
    pub target_rate_max: f64,
    pub rate_penalty_per_bpm: f64,
    /// Samples kept to find the hands' resting height.
    pub rest_window: usize,
}

impl Default for CprConfig {
    fn default() -> Self {
        Self {
            peak_threshold: 10.0,
            min_interval_secs: 0.1,
            max_interval_secs: 2.0,
            idle_reset_secs: 2.0,
            interval_window: 3,
            target_depth_min: 15.0,
            target_depth_max: 30.0,
            depth_penalty_per_unit: 3.0,
            target_rate_min: 100.0,
            target_rate_max: 120.0,
            rate_penalty_per_bpm: 2.0,
            rest_window: 90,
        }
    }
}

impl CprConfig {
    pub fn depth_score(&self, depth: f64) -> f64 {
        let depth = depth.abs();
        if depth < self.target_depth_min {
            (100.0 - (self.target_depth_min - depth) * self.depth_penalty_per_unit).max(0.0)
        } else if depth > self.target_depth_max {
            (100.0 - (depth - self.target_depth_max) * self.depth_penalty_per_unit).max(0.0)
        } else {
            100.0
        }
    }

    pub fn rate_score(&self, rate: f64) -> f64 {
        if !rate.is_finite() {
            return 0.0;
        }
        if (self.target_rate_min..=self.target_rate_max).contains(&rate) {
            return 100.0;
        }
        let centre = (self.target_rate_min + self.target_rate_max) / 2.0;
        (100.0 - (centre - rate).abs() * self.rate_penalty_per_bpm).max(0.0)
    }
}

/// Fixed-capacity ring of the most recent inter-peak intervals (seconds).
#[derive(Debug, Clone)]
pub struct IntervalWindow {
    intervals: VecDeque<f64>,
    capacity: usize,
}

impl IntervalWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            intervals: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, interval: f64) {
        if self.intervals.len() == self.capacity {
            self.intervals.pop_front();
        }
        self.intervals.push_back(interval);
    }

    pub fn mean(&self) -> Option<f64> {
        if self.intervals.is_empty() {
            return None;
        }
        Some(self.intervals.iter().sum::<f64>() / self.intervals.len() as f64)
    }

    pub fn clear(&mut self) {
        self.intervals.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.intervals.iter()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CprReading {
    /// Compressions per minute.
    pub rate: f64,
    pub depth_score: f64,
    pub rate_score: f64,
    pub compression_count: u32,
}

pub struct CprAnalyzer {
    config: CprConfig,
    last_peak: Option<Instant>,
    is_compression: bool,
    compression_count: u32,
    recent_intervals: IntervalWindow,
    current_rate: f64,
}

impl CprAnalyzer {
    pub fn new(config: CprConfig) -> Self {
        let recent_intervals = IntervalWindow::new(config.interval_window);
        Self {
            config,
            last_peak: None,
            is_compression: false,
            compression_count: 0,
            recent_intervals,
            current_rate: 0.0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }

    pub fn current_rate(&self) -> f64 {
        self.current_rate
    }

    pub fn compression_count(&self) -> u32 {
        self.compression_count
    }

    pub fn is_compression(&self) -> bool {
        self.is_compression
    }

    pub fn recent_intervals(&self) -> &IntervalWindow {
        &self.recent_intervals
    }

    /// Analyzes a depth sample stamped with the current wall-clock time.
    pub fn analyze(&mut self, depth: Option<f64>) -> CprReading {
        self.analyze_at(depth, Instant::now())
    }

    pub fn analyze_at(&mut self, depth: Option<f64>, now: Instant) -> CprReading {
        let Some(depth) = depth.filter(|d| d.is_finite()) else {
            return CprReading {
                compression_count: self.compression_count,
                ..CprReading::default()
            };
        };

        // Idle is measured from the previous peak, before a new one is recorded.
        if let Some(last) = self.last_peak {
            if now.duration_since(last).as_secs_f64() > self.config.idle_reset_secs {
                self.recent_intervals.clear();
            }
        }

        if !self.is_compression && depth > self.config.peak_threshold {
            self.is_compression = true;
            if let Some(last) = self.last_peak {
                let interval = now.duration_since(last).as_secs_f64();
                if (self.config.min_interval_secs..=self.config.max_interval_secs).contains(&interval) {
                    self.recent_intervals.push(interval);
                }
            }
            self.last_peak = Some(now);
            self.compression_count += 1;
        } else if self.is_compression && depth < self.config.peak_threshold / 2.0 {
            self.is_compression = false;
        }

        self.current_rate = match self.recent_intervals.mean() {
            Some(mean) if mean > 0.0 => 60.0 / mean,
            _ => 0.0,
        };

        let depth_score = self.config.depth_score(depth);
        debug!(
            "Depth: {:.1}, Rate: {:.1}, Count: {}",
            depth, self.current_rate, self.compression_count
        );

        CprReading {
            rate: self.current_rate,
            depth_score,
            rate_score: self.config.rate_score(self.current_rate),
            compression_count: self.compression_count,
        }
    }
}

impl Default for CprAnalyzer {
    fn default() -> Self {
        Self::new(CprConfig::default())
    }
}

/// Turns wrist landmarks into a compression depth: how far the hands sit
/// below their highest recent position, in percent of frame height.
pub struct CompressionDepthEstimator {
    recent_heights: VecDeque<f64>,
    capacity: usize,
}

impl CompressionDepthEstimator {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            recent_heights: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn reset(&mut self) {
        self.recent_heights.clear();
    }

    pub fn estimate(&mut self, pose: Option<&PoseFrame>) -> Option<f64> {
        let pose = pose?;
        let left = pose.get(PoseLandmark::LeftWrist)?;
        let right = pose.get(PoseLandmark::RightWrist)?;
        let hands_y = (left.y + right.y) / 2.0;

        if self.recent_heights.len() == self.capacity {
            self.recent_heights.pop_front();
        }
        self.recent_heights.push_back(hands_y);

        let rest = self
            .recent_heights
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
        Some((hands_y - rest) * 100.0)
    }
}
