// src/main.rs
mod app;
mod config;
mod cpr;
mod data;
mod pose;
mod summary;
mod tracking;
mod ui;
mod video;

use anyhow::{anyhow, Result};
use app::{ExerciseMode, SquatTrackerApp};
use clap::Parser;
use config::AppConfig;
use eframe::egui;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use video::VideoSource;

#[derive(Parser, Debug)]
#[command(name = "squat_tracker", about = "Real-time squat form feedback from a webcam or video")]
struct Args {
    /// TOML settings file (defaults to ./squat_tracker.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Analyze a local video file instead of the camera
    #[arg(long, conflicts_with = "url")]
    video: Option<PathBuf>,

    /// Download a video with yt-dlp and analyze it
    #[arg(long)]
    url: Option<String>,

    /// Camera index, overrides the config file
    #[arg(long)]
    camera: Option<u32>,

    #[arg(long, value_enum, default_value_t = ExerciseMode::Squat)]
    mode: ExerciseMode,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run(Args::parse()) {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = AppConfig::load_or_default(args.config.as_deref())?;
    if let Some(camera) = args.camera {
        config.camera_index = camera;
    }

    let mut downloaded = None;
    let video_source = if let Some(url) = &args.url {
        let path = video::download_video(url, &video::download_destination())?;
        downloaded = Some(path.clone());
        VideoSource::open_file(&path, config.max_frame_width)
    } else if let Some(path) = &args.video {
        VideoSource::open_file(path, config.max_frame_width)
    } else {
        log_cameras();
        VideoSource::open_camera(config.camera_index)
    };

    let video_source = match video_source {
        Ok(source) => source,
        Err(e) => {
            if let Some(path) = &downloaded {
                let _ = std::fs::remove_file(path);
            }
            return Err(e.context("Could not open video source"));
        }
    };
    info!("Video source: {}", video_source.describe());

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([960.0, 640.0]),
        centered: true,
        ..Default::default()
    };

    let app = SquatTrackerApp::new(config, video_source, args.mode, downloaded);
    eframe::run_native(
        "Squat Form Analyzer",
        options,
        Box::new(|cc| {
            cc.egui_ctx.set_visuals(create_visuals());
            Box::new(app)
        }),
    )
    .map_err(|e| anyhow!("Error running application: {}", e))
}

fn log_cameras() {
    match nokhwa::query(nokhwa::utils::ApiBackend::Auto) {
        Ok(cameras) => {
            info!("Found {} camera(s)", cameras.len());
            for (i, camera) in cameras.iter().enumerate() {
                info!("  [{}] {}", i, camera.human_name());
            }
        }
        Err(e) => warn!("Failed to query cameras: {}", e),
    }
}

fn create_visuals() -> egui::Visuals {
    let mut visuals = egui::Visuals::dark();

    visuals.widgets.noninteractive.bg_fill = egui::Color32::from_rgb(30, 30, 35);
    visuals.widgets.inactive.bg_fill = egui::Color32::from_rgb(45, 45, 52);
    visuals.widgets.hovered.bg_fill = egui::Color32::from_rgb(55, 55, 65);
    visuals.widgets.active.bg_fill = egui::Color32::from_rgb(66, 165, 245);

    for widget in [
        &mut visuals.widgets.noninteractive,
        &mut visuals.widgets.inactive,
        &mut visuals.widgets.hovered,
        &mut visuals.widgets.active,
    ] {
        widget.rounding = egui::Rounding::same(8.0);
    }
    visuals.window_rounding = egui::Rounding::same(12.0);

    visuals
}
