// src/app.rs
use crate::config::AppConfig;
use crate::cpr::{CompressionDepthEstimator, CprAnalyzer, CprReading};
use crate::data::SessionExporter;
use crate::pose::{create_provider, PoseFrame, PoseProvider, SimulatedMotion};
use crate::summary::SessionSummary;
use crate::tracking::{SquatMetrics, SquatTracker};
use crate::ui::{self, RecordingIndicator, Theme, VideoWidget};
use crate::video::VideoSource;

use chrono::{DateTime, Local};
use eframe::egui;
use egui_extras::{Column, TableBuilder};
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExerciseMode {
    Squat,
    Cpr,
}

impl ExerciseMode {
    fn motion(self) -> SimulatedMotion {
        match self {
            ExerciseMode::Squat => SimulatedMotion::Squat,
            ExerciseMode::Cpr => SimulatedMotion::Compressions,
        }
    }
}

enum SummaryAction {
    None,
    Export,
    Continue,
}

pub enum Screen {
    Instructions,
    Live,
    Summary(SessionSummary),
}

pub struct SquatTrackerApp {
    config: AppConfig,

    // Core components
    video_source: VideoSource,
    pose_provider: Box<dyn PoseProvider>,
    tracker: SquatTracker,
    cpr: CprAnalyzer,
    cpr_depth: CompressionDepthEstimator,

    // UI state
    mode: ExerciseMode,
    screen: Screen,
    theme: Theme,
    video_widget: VideoWidget,
    indicator: RecordingIndicator,
    status: Option<String>,

    // Recording state
    is_recording: bool,
    is_paused: bool,
    recording_start: Option<DateTime<Local>>,

    // Latest frame results
    current_pose: Option<PoseFrame>,
    metrics: SquatMetrics,
    cpr_reading: CprReading,

    // Removed on exit
    downloaded_video: Option<PathBuf>,
}

impl SquatTrackerApp {
    pub fn new(
        config: AppConfig,
        video_source: VideoSource,
        mode: ExerciseMode,
        downloaded_video: Option<PathBuf>,
    ) -> Self {
        let mut pose_provider = create_provider(&config.pose_helper);
        pose_provider.set_motion(mode.motion());
        info!("Pose provider: {}", pose_provider.name());

        Self {
            tracker: SquatTracker::new(config.tracker.clone()),
            cpr: CprAnalyzer::new(config.cpr.clone()),
            cpr_depth: CompressionDepthEstimator::new(config.cpr.rest_window),
            config,
            video_source,
            pose_provider,
            mode,
            screen: Screen::Instructions,
            theme: Theme::default(),
            video_widget: VideoWidget::new(),
            indicator: RecordingIndicator::default(),
            status: None,
            is_recording: false,
            is_paused: false,
            recording_start: None,
            current_pose: None,
            metrics: SquatMetrics::default(),
            cpr_reading: CprReading::default(),
            downloaded_video,
        }
    }

    /// Capture, detect and analyze one frame. Failures skip the frame.
    fn process_frame(&mut self, ctx: &egui::Context) {
        if self.is_paused && self.video_source.is_file() {
            return;
        }

        let frame = match self.video_source.read_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Skipping frame: {:#}", e);
                return;
            }
        };

        let pose = match self.pose_provider.detect(&frame) {
            Ok(pose) => pose,
            Err(e) => {
                warn!("Pose detection failed: {}", e);
                None
            }
        };

        if self.is_recording {
            match self.mode {
                ExerciseMode::Squat => {
                    self.metrics = self.tracker.process_pose(pose.as_ref(), frame.height() as f64);
                    if self.metrics.rep_completed {
                        self.status = Some(format!("Rep {} done", self.metrics.squat_count));
                    }
                }
                ExerciseMode::Cpr => {
                    let depth = self.cpr_depth.estimate(pose.as_ref());
                    self.cpr_reading = self.cpr.analyze(depth);
                }
            }
        } else {
            self.metrics = SquatMetrics::neutral(self.tracker.squat_count());
            self.cpr_reading = CprReading {
                compression_count: self.cpr.compression_count(),
                ..CprReading::default()
            };
        }

        self.video_widget.update_frame(ctx, &frame);
        self.current_pose = pose;
    }

    fn handle_keys(&mut self, ctx: &egui::Context) {
        let (space, quit) = ctx.input(|i| (i.key_pressed(egui::Key::Space), i.key_pressed(egui::Key::Q)));

        if quit {
            info!("Quit requested");
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            return;
        }

        if space {
            match self.screen {
                Screen::Instructions => self.screen = Screen::Live,
                Screen::Live if self.video_source.is_file() => {
                    self.is_paused = !self.is_paused;
                    debug!("Playback {}", if self.is_paused { "paused" } else { "resumed" });
                }
                _ => {}
            }
        }
    }

    fn start_recording(&mut self) {
        self.screen = Screen::Live;
        self.is_recording = true;
        self.recording_start = Some(Local::now());
        self.status = None;
        info!("Recording started ({:?} mode)", self.mode);
    }

    fn stop_recording(&mut self) {
        self.is_recording = false;
        self.recording_start = None;

        match self.mode {
            ExerciseMode::Squat => match SessionSummary::from_history(self.tracker.history()) {
                Some(summary) => {
                    info!("Session finished with {} reps", summary.total_reps);
                    self.screen = Screen::Summary(summary);
                }
                None => {
                    self.status = Some("No reps recorded yet".to_string());
                }
            },
            ExerciseMode::Cpr => {
                let count = self.cpr.compression_count();
                info!("CPR session finished with {} compressions", count);
                self.status = Some(format!("{} compressions recorded", count));
            }
        }
    }

    fn continue_session(&mut self) {
        self.tracker.reset();
        self.cpr.reset();
        self.cpr_depth.reset();
        self.metrics = SquatMetrics::default();
        self.cpr_reading = CprReading::default();
        self.status = None;
        self.screen = Screen::Live;
    }

    fn set_mode(&mut self, mode: ExerciseMode) {
        if mode == self.mode {
            return;
        }
        self.mode = mode;
        self.pose_provider.set_motion(mode.motion());
        self.continue_session();
        info!("Switched to {:?} mode", mode);
    }

    fn open_video_dialog(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Video", &["mp4", "mov", "avi", "mkv", "webm"])
            .pick_file()
        else {
            return;
        };

        match VideoSource::open_file(&path, self.config.max_frame_width) {
            Ok(source) => {
                info!("Opened {}", path.display());
                self.video_source = source;
                self.is_paused = false;
                self.is_recording = false;
                self.continue_session();
            }
            Err(e) => {
                warn!("Could not open {}: {:#}", path.display(), e);
                self.status = Some(format!("Could not open video: {}", e));
            }
        }
    }

    fn export_session(&mut self, summary: &SessionSummary) {
        let exporter = SessionExporter::new(&self.config.output_directory, None);
        self.status = Some(match exporter.export(self.tracker.history(), summary) {
            Ok(dir) => format!("Saved to {}", dir.display()),
            Err(e) => {
                warn!("Export failed: {:#}", e);
                format!("Export failed: {}", e)
            }
        });
    }

    fn render_header(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.add_space(8.0);
            ui.horizontal(|ui| {
                ui.heading("Squat Form Analyzer");
                ui.separator();

                let mut mode = self.mode;
                ui.add_enabled_ui(!self.is_recording, |ui| {
                    ui.selectable_value(&mut mode, ExerciseMode::Squat, "🏋 Squat");
                    ui.selectable_value(&mut mode, ExerciseMode::Cpr, "❤ CPR");
                });
                self.set_mode(mode);

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui
                        .add_enabled(!self.is_recording, egui::Button::new("📁 Open Video"))
                        .clicked()
                    {
                        self.open_video_dialog();
                    }
                    ui.label(
                        egui::RichText::new(self.video_source.describe()).color(self.theme.text_secondary),
                    );
                });
            });
            ui.add_space(8.0);
        });
    }

    fn render_control_panel(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("controls").show(ctx, |ui| {
            ui.add_space(10.0);
            ui.horizontal(|ui| {
                let start = ui.add_enabled(
                    !self.is_recording,
                    egui::Button::new("⏺ Start").fill(self.theme.success).min_size(egui::vec2(120.0, 40.0)),
                );
                if start.clicked() {
                    self.start_recording();
                }

                let stop = ui.add_enabled(
                    self.is_recording,
                    egui::Button::new("⏹ Stop").fill(self.theme.error).min_size(egui::vec2(120.0, 40.0)),
                );
                if stop.clicked() {
                    self.stop_recording();
                }

                if self.video_source.is_file() && self.is_paused {
                    ui.separator();
                    ui.label("⏸ Paused");
                }

                if let Some(status) = &self.status {
                    ui.separator();
                    ui.label(status);
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if let Some(start) = self.recording_start {
                        let elapsed = Local::now().signed_duration_since(start).num_seconds().max(0);
                        ui.label(
                            egui::RichText::new(format!("Recording: {:02}:{:02}", elapsed / 60, elapsed % 60))
                                .color(self.theme.error),
                        );
                    }
                });
            });
            ui.add_space(10.0);
        });
    }

    fn render_metrics_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("metrics")
            .resizable(false)
            .min_width(220.0)
            .show(ctx, |ui| {
                ui.add_space(10.0);
                let theme = &self.theme;
                match self.mode {
                    ExerciseMode::Squat => {
                        let m = &self.metrics;
                        ui::metric_card(ui, theme, "REPS", m.squat_count.to_string(), theme.primary);
                        ui.add_space(8.0);
                        ui::metric_card(
                            ui,
                            theme,
                            "KNEE ANGLE",
                            format!("{:.0}°", m.knee_angle),
                            theme.knee_angle_color(m.knee_angle),
                        );
                        ui.add_space(8.0);
                        ui::metric_card(
                            ui,
                            theme,
                            "DEPTH",
                            format!("{:.0}%", m.depth_percentage),
                            theme.depth_color(m.depth_percentage),
                        );

                        if m.in_squat {
                            let label = match self.tracker.current_squat() {
                                Some(rep) => format!("IN SQUAT (max {:.0}%)", rep.max_depth),
                                None => "IN SQUAT".to_string(),
                            };
                            ui.add_space(8.0);
                            ui.colored_label(theme.primary, label);
                        }

                        if let Some(measurements) = m.measurements {
                            ui.add_space(12.0);
                            ui.label(format!("Foot distance: {:.1}%", measurements.foot_distance));
                            ui.label(format!("Weight balance: {:.0}", measurements.weight_balance));
                            ui.label(format!("Forward shift: {:.1}%", measurements.forward_shift));
                        }
                    }
                    ExerciseMode::Cpr => {
                        let r = &self.cpr_reading;
                        ui::metric_card(
                            ui,
                            theme,
                            "RATE",
                            format!("{:.0}/min", r.rate),
                            theme.score_color(r.rate_score),
                        );
                        ui.add_space(8.0);
                        ui::metric_card(
                            ui,
                            theme,
                            "COMPRESSIONS",
                            r.compression_count.to_string(),
                            theme.primary,
                        );
                        ui.add_space(12.0);
                        ui::score_bar(ui, theme, "Depth", r.depth_score);
                        ui::score_bar(ui, theme, "Rate ", r.rate_score);

                        if self.cpr.is_compression() {
                            ui.add_space(8.0);
                            ui.colored_label(theme.success, "COMPRESSING");
                        }
                    }
                }
            });
    }

    fn render_live(&mut self, ui: &mut egui::Ui) {
        let max_size = ui.available_size();
        let rect = ui
            .vertical_centered(|ui| self.video_widget.show(ui, max_size))
            .inner;
        let painter = ui.painter_at(rect);

        if let Some(pose) = &self.current_pose {
            ui::draw_skeleton(&painter, rect, pose, &self.theme);
        }
        if self.is_recording && self.mode == ExerciseMode::Squat {
            if let Some(guides) = &self.metrics.guides {
                ui::draw_depth_guides(&painter, rect, guides, self.video_widget.frame_height(), &self.theme);
            }
        }
        if self.is_recording {
            self.indicator.draw(ui, rect);
        }
        if matches!(self.screen, Screen::Instructions) {
            ui::draw_instructions(&painter, rect, &self.theme);
        }
    }

    fn render_summary(&self, ui: &mut egui::Ui, summary: &SessionSummary) -> SummaryAction {
        let theme = &self.theme;
        let mut action = SummaryAction::None;

        ui.vertical_centered(|ui| {
            ui.heading(egui::RichText::new("Squat Session Summary").size(32.0).color(theme.primary));
        });
        ui.add_space(16.0);

        ui.group(|ui| {
            ui.heading(egui::RichText::new("Overall Performance").color(theme.primary));
            ui.label(egui::RichText::new(format!("Total Squats: {}", summary.total_reps)).size(20.0));
            ui.label(egui::RichText::new(format!("Average Depth: {:.1}%", summary.avg_depth)).size(20.0));
            ui.label(format!("Average Knee Angle: {:.1}°", summary.avg_knee_angle));
            ui.label(format!(
                "Best / Worst Depth: {:.1}% / {:.1}%",
                summary.best_depth, summary.worst_depth
            ));
            ui.label(format!(
                "Consistency: depth {:.0}%, angle {:.0}%",
                summary.depth_consistency, summary.angle_consistency
            ));
            if let Some(issue) = summary.most_common_issue {
                ui.label(format!("Most common issue: {}", issue));
            }
            ui.add_space(8.0);
            ui.label(
                egui::RichText::new(format!("Overall Grade: {}", summary.overall_grade))
                    .size(28.0)
                    .strong()
                    .color(theme.quality_color(summary.overall_grade)),
            );
        });

        ui.add_space(16.0);
        ui.heading(egui::RichText::new("Individual Rep Details").color(theme.primary));

        let history = self.tracker.history();
        TableBuilder::new(ui)
            .striped(true)
            .max_scroll_height(300.0)
            .column(Column::exact(80.0))
            .column(Column::exact(100.0))
            .column(Column::exact(120.0))
            .column(Column::exact(200.0))
            .column(Column::remainder())
            .header(24.0, |mut header| {
                for title in ["Rep", "Depth", "Knee Angle", "Grade", "Form"] {
                    header.col(|ui| {
                        ui.strong(title);
                    });
                }
            })
            .body(|mut body| {
                for (rep, detail) in summary.reps.iter().zip(history) {
                    body.row(22.0, |mut row| {
                        row.col(|ui| {
                            ui.label(format!("#{}", rep.number));
                        });
                        row.col(|ui| {
                            ui.label(format!("{:.1}%", rep.depth));
                        });
                        row.col(|ui| {
                            ui.label(format!("{:.1}°", rep.lowest_angle));
                        });
                        row.col(|ui| {
                            ui.colored_label(theme.quality_color(rep.quality), rep.quality.label());
                        });
                        row.col(|ui| {
                            let issues: Vec<&str> = detail.form_issues.iter().map(|i| i.label()).collect();
                            ui.label(if issues.is_empty() { "-".to_string() } else { issues.join(", ") });
                        });
                    });
                }
            });

        ui.add_space(16.0);
        ui.horizontal(|ui| {
            if ui.add_sized([140.0, 40.0], egui::Button::new("💾 Export")).clicked() {
                action = SummaryAction::Export;
            }
            if ui.add_sized([140.0, 40.0], egui::Button::new("▶ Continue")).clicked() {
                action = SummaryAction::Continue;
            }
            if let Some(status) = &self.status {
                ui.label(status);
            }
        });
        action
    }
}

impl eframe::App for SquatTrackerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_keys(ctx);

        if let Screen::Summary(summary) = &self.screen {
            let mut action = SummaryAction::None;
            egui::CentralPanel::default().show(ctx, |ui| action = self.render_summary(ui, summary));

            match action {
                SummaryAction::Export => {
                    let summary = summary.clone();
                    self.export_session(&summary);
                }
                SummaryAction::Continue => self.continue_session(),
                SummaryAction::None => {}
            }
            self.render_header(ctx);
        } else {
            self.process_frame(ctx);
            self.render_header(ctx);
            self.render_control_panel(ctx);
            self.render_metrics_panel(ctx);
            egui::CentralPanel::default().show(ctx, |ui| self.render_live(ui));
        }

        ctx.request_repaint();
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        if let Some(path) = self.downloaded_video.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => info!("Removed downloaded video {}", path.display()),
                Err(e) => warn!("Could not remove {}: {}", path.display(), e),
            }
        }
    }
}
