// src/summary.rs - Post-session scoring over finished reps
use crate::tracking::{FormIssue, SquatRep};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RepQuality {
    Excellent,
    Good,
    Okay,
    Shallow,
}

impl RepQuality {
    /// Grades a depth percentage: >=90 excellent, >=75 good, >=60 okay.
    pub fn classify(depth: f64) -> Self {
        if depth >= 90.0 {
            RepQuality::Excellent
        } else if depth >= 75.0 {
            RepQuality::Good
        } else if depth >= 60.0 {
            RepQuality::Okay
        } else {
            RepQuality::Shallow
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RepQuality::Excellent => "PERFECT!",
            RepQuality::Good => "GOOD",
            RepQuality::Okay => "NOT BAD",
            RepQuality::Shallow => "NEEDS IMPROVEMENT",
        }
    }
}

impl fmt::Display for RepQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepSummary {
    pub number: usize,
    pub depth: f64,
    pub lowest_angle: f64,
    pub quality: RepQuality,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub total_reps: usize,
    pub avg_depth: f64,
    pub avg_knee_angle: f64,
    pub best_depth: f64,
    pub worst_depth: f64,
    pub overall_grade: RepQuality,
    pub depth_consistency: f64,
    pub angle_consistency: f64,
    pub most_common_issue: Option<FormIssue>,
    pub reps: Vec<RepSummary>,
}

impl SessionSummary {
    /// Returns `None` for a session without any finished reps.
    pub fn from_history(history: &[SquatRep]) -> Option<Self> {
        if history.is_empty() {
            return None;
        }

        let depths: Vec<f64> = history.iter().map(|rep| rep.max_depth).collect();
        let angles: Vec<f64> = history.iter().map(|rep| rep.lowest_angle).collect();
        let avg_depth = mean(&depths);

        let reps = history
            .iter()
            .enumerate()
            .map(|(i, rep)| RepSummary {
                number: i + 1,
                depth: rep.max_depth,
                lowest_angle: rep.lowest_angle,
                quality: RepQuality::classify(rep.max_depth),
            })
            .collect();

        Some(Self {
            total_reps: history.len(),
            avg_depth,
            avg_knee_angle: mean(&angles),
            best_depth: depths.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            worst_depth: depths.iter().copied().fold(f64::INFINITY, f64::min),
            overall_grade: RepQuality::classify(avg_depth),
            depth_consistency: consistency(&depths),
            angle_consistency: consistency(&angles),
            most_common_issue: most_common_issue(history),
            reps,
        })
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// 100 minus twice the mean absolute deviation, floored at 0.
pub fn consistency(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let avg = mean(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - avg).abs()).collect();
    (100.0 - mean(&deviations) * 2.0).max(0.0)
}

/// Most frequent issue across reps; ties go to the issue seen first.
pub fn most_common_issue(history: &[SquatRep]) -> Option<FormIssue> {
    let mut counts: Vec<(FormIssue, usize)> = Vec::new();
    for issue in history.iter().flat_map(|rep| rep.form_issues.iter()) {
        match counts.iter_mut().find(|(seen, _)| seen == issue) {
            Some((_, count)) => *count += 1,
            None => counts.push((*issue, 1)),
        }
    }

    counts
        .into_iter()
        .fold(None, |best: Option<(FormIssue, usize)>, (issue, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((issue, count)),
        })
        .map(|(issue, _)| issue)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rep(depth: f64, angle: f64, issues: &[FormIssue]) -> SquatRep {
        SquatRep {
            lowest_angle: angle,
            max_depth: depth,
            back_angle: 0.0,
            form_issues: issues.to_vec(),
        }
    }

    #[test]
    fn test_quality_band_boundaries() {
        assert_eq!(RepQuality::classify(100.0), RepQuality::Excellent);
        assert_eq!(RepQuality::classify(90.0), RepQuality::Excellent);
        assert_eq!(RepQuality::classify(89.999), RepQuality::Good);
        assert_eq!(RepQuality::classify(75.0), RepQuality::Good);
        assert_eq!(RepQuality::classify(74.999), RepQuality::Okay);
        assert_eq!(RepQuality::classify(60.0), RepQuality::Okay);
        assert_eq!(RepQuality::classify(59.999), RepQuality::Shallow);
        assert_eq!(RepQuality::classify(0.0), RepQuality::Shallow);
    }

    #[test]
    fn test_empty_history_has_no_summary() {
        assert!(SessionSummary::from_history(&[]).is_none());
    }

    #[test]
    fn test_summary_aggregates() {
        let history = vec![
            rep(95.0, 80.0, &[]),
            rep(70.0, 100.0, &[FormIssue::ShallowDepth]),
            rep(80.0, 90.0, &[]),
        ];
        let summary = SessionSummary::from_history(&history).unwrap();

        assert_eq!(summary.total_reps, 3);
        assert!((summary.avg_depth - 81.666_666_666).abs() < 1e-6);
        assert_eq!(summary.avg_knee_angle, 90.0);
        assert_eq!(summary.best_depth, 95.0);
        assert_eq!(summary.worst_depth, 70.0);
        assert_eq!(summary.overall_grade, RepQuality::Good);
        assert_eq!(summary.most_common_issue, Some(FormIssue::ShallowDepth));

        let qualities: Vec<RepQuality> = summary.reps.iter().map(|r| r.quality).collect();
        assert_eq!(qualities, vec![RepQuality::Excellent, RepQuality::Okay, RepQuality::Good]);
        assert_eq!(summary.reps[2].number, 3);
    }

    #[test]
    fn test_consistency() {
        assert_eq!(consistency(&[80.0, 80.0, 80.0]), 100.0);
        // mean abs deviation 10 -> 80
        assert_eq!(consistency(&[70.0, 90.0]), 80.0);
        assert_eq!(consistency(&[0.0, 100.0]), 0.0);
        assert_eq!(consistency(&[]), 0.0);
    }

    #[test]
    fn test_most_common_issue_ties_prefer_first_seen() {
        let history = vec![
            rep(50.0, 120.0, &[FormIssue::ForwardLean, FormIssue::ShallowDepth]),
            rep(50.0, 120.0, &[FormIssue::ShallowDepth, FormIssue::ForwardLean]),
        ];
        assert_eq!(most_common_issue(&history), Some(FormIssue::ForwardLean));
        assert_eq!(most_common_issue(&[rep(95.0, 80.0, &[])]), None);
    }
}
