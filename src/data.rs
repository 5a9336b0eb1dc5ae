// src/data.rs
use crate::summary::{RepQuality, SessionSummary};
use crate::tracking::SquatRep;
use anyhow::Result;
use chrono::Local;
use csv::Writer;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Serialize)]
struct RepRecord {
    rep: usize,
    lowest_angle: f64,
    max_depth: f64,
    back_angle: f64,
    quality: String,
    form_issues: String,
}

impl RepRecord {
    fn new(number: usize, rep: &SquatRep) -> Self {
        let form_issues = rep
            .form_issues
            .iter()
            .map(|issue| issue.label())
            .collect::<Vec<_>>()
            .join("; ");

        Self {
            rep: number,
            lowest_angle: rep.lowest_angle,
            max_depth: rep.max_depth,
            back_angle: rep.back_angle,
            quality: RepQuality::classify(rep.max_depth).label().to_string(),
            form_issues,
        }
    }
}

pub struct SessionExporter {
    output_dir: PathBuf,
    session_name: String,
}

impl SessionExporter {
    pub fn new(output_dir: impl AsRef<Path>, session_name: Option<String>) -> Self {
        let session_name = session_name.unwrap_or_else(|| {
            format!("session_{}", Local::now().format("%Y%m%d_%H%M%S"))
        });

        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            session_name,
        }
    }

    pub fn session_dir(&self) -> PathBuf {
        self.output_dir.join(&self.session_name)
    }

    /// Writes reps.csv, summary.json and report.html; returns the session folder.
    pub fn export(&self, history: &[SquatRep], summary: &SessionSummary) -> Result<PathBuf> {
        let dir = self.session_dir();
        std::fs::create_dir_all(&dir)?;

        self.export_csv(history)?;
        self.export_summary(summary)?;
        self.generate_report(summary)?;

        info!("Exported {} reps to {}", history.len(), dir.display());
        Ok(dir)
    }

    pub fn export_csv(&self, history: &[SquatRep]) -> Result<PathBuf> {
        let csv_path = self.session_dir().join("reps.csv");
        if let Some(parent) = csv_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = File::create(&csv_path)?;
        let mut writer = Writer::from_writer(file);
        for (i, rep) in history.iter().enumerate() {
            writer.serialize(RepRecord::new(i + 1, rep))?;
        }

        writer.flush()?;
        Ok(csv_path)
    }

    pub fn export_summary(&self, summary: &SessionSummary) -> Result<PathBuf> {
        let json_path = self.session_dir().join("summary.json");
        if let Some(parent) = json_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = File::create(&json_path)?;
        serde_json::to_writer_pretty(file, summary)?;
        Ok(json_path)
    }

    pub fn generate_report(&self, summary: &SessionSummary) -> Result<PathBuf> {
        let report_path = self.session_dir().join("report.html");
        if let Some(parent) = report_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&report_path, self.create_html_report(summary))?;
        Ok(report_path)
    }

    fn create_html_report(&self, summary: &SessionSummary) -> String {
        let rows: String = summary
            .reps
            .iter()
            .map(|rep| {
                format!(
                    "        <tr><td>{}</td><td>{:.1}%</td><td>{:.1}&deg;</td><td>{}</td></tr>\n",
                    rep.number, rep.depth, rep.lowest_angle, rep.quality
                )
            })
            .collect();

        let common_issue = summary
            .most_common_issue
            .map(|issue| issue.label().to_string())
            .unwrap_or_else(|| "None".to_string());

        format!(r#"
<!DOCTYPE html>
<html>
<head>
    <title>Squat Session Report - {name}</title>
    <style>
        body {{ font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif; margin: 40px; background: #f5f5f5; }}
        h1 {{ color: #333; }}
        .stats {{ background: white; padding: 20px; border-radius: 8px; box-shadow: 0 2px 4px rgba(0,0,0,0.1); }}
        .stat-item {{ margin: 10px 0; }}
        .stat-label {{ font-weight: bold; color: #666; }}
        .stat-value {{ color: #4682EA; font-size: 1.2em; }}
        table {{ border-collapse: collapse; margin-top: 20px; background: white; }}
        td, th {{ padding: 6px 14px; border-bottom: 1px solid #ddd; }}
    </style>
</head>
<body>
    <h1>Squat Session Report</h1>
    <div class="stats">
        <h2>Session: {name}</h2>
        <div class="stat-item">
            <span class="stat-label">Total Reps:</span>
            <span class="stat-value">{total}</span>
        </div>
        <div class="stat-item">
            <span class="stat-label">Overall Grade:</span>
            <span class="stat-value">{grade}</span>
        </div>
        <div class="stat-item">
            <span class="stat-label">Average Depth:</span>
            <span class="stat-value">{avg_depth:.1}%</span>
        </div>
        <div class="stat-item">
            <span class="stat-label">Average Knee Angle:</span>
            <span class="stat-value">{avg_angle:.1}&deg;</span>
        </div>
        <div class="stat-item">
            <span class="stat-label">Depth Consistency:</span>
            <span class="stat-value">{consistency:.0}%</span>
        </div>
        <div class="stat-item">
            <span class="stat-label">Most Common Issue:</span>
            <span class="stat-value">{issue}</span>
        </div>
    </div>
    <table>
        <tr><th>Rep</th><th>Depth</th><th>Lowest Angle</th><th>Quality</th></tr>
{rows}    </table>
</body>
</html>
"#,
            name = self.session_name,
            total = summary.total_reps,
            grade = summary.overall_grade,
            avg_depth = summary.avg_depth,
            avg_angle = summary.avg_knee_angle,
            consistency = summary.depth_consistency,
            issue = common_issue,
            rows = rows,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::FormIssue;
    use tempfile::tempdir;

    fn history() -> Vec<SquatRep> {
        vec![
            SquatRep {
                lowest_angle: 85.0,
                max_depth: 92.0,
                back_angle: 20.0,
                form_issues: vec![],
            },
            SquatRep {
                lowest_angle: 130.0,
                max_depth: 40.0,
                back_angle: 50.0,
                form_issues: vec![FormIssue::ForwardLean, FormIssue::ShallowDepth],
            },
        ]
    }

    #[test]
    fn test_session_name_defaults_to_timestamp() {
        let exporter = SessionExporter::new("out", None);
        let name = exporter.session_dir();
        let name = name.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("session_"));
        assert_eq!(name.len(), "session_20250101_120000".len());
    }

    #[test]
    fn test_export_writes_all_files() {
        let dir = tempdir().unwrap();
        let history = history();
        let summary = SessionSummary::from_history(&history).unwrap();
        let exporter = SessionExporter::new(dir.path(), Some("session_test".into()));

        let session_dir = exporter.export(&history, &summary).unwrap();
        assert_eq!(session_dir, dir.path().join("session_test"));

        let csv = std::fs::read_to_string(session_dir.join("reps.csv")).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "rep,lowest_angle,max_depth,back_angle,quality,form_issues");
        assert!(lines[1].starts_with("1,85.0,92.0,20.0,PERFECT!,"));
        assert!(lines[2].contains("NEEDS IMPROVEMENT"));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(session_dir.join("summary.json")).unwrap())
                .unwrap();
        assert_eq!(json["total_reps"], 2);
        assert_eq!(json["reps"].as_array().unwrap().len(), 2);

        let html = std::fs::read_to_string(session_dir.join("report.html")).unwrap();
        assert!(html.contains("Session: session_test"));
        assert!(html.contains("<td>2</td>"));
    }
}
