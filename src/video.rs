// src/video.rs - Camera capture and looping video file playback
use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::DynamicImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

pub enum VideoSource {
    Camera(Camera),
    File(VideoFileReader),
}

/// Scales `image` down to `max_width` keeping the aspect ratio. Narrower
/// images are returned untouched.
pub fn fit_to_width(image: DynamicImage, max_width: u32) -> DynamicImage {
    if max_width == 0 || image.width() <= max_width {
        return image;
    }
    let scale = max_width as f64 / image.width() as f64;
    let height = ((image.height() as f64 * scale).round() as u32).max(1);
    image.resize_exact(max_width, height, FilterType::Triangle)
}

fn parse_frame_rate(raw: &str) -> Option<f32> {
    match raw.split_once('/') {
        Some((num, den)) => {
            let num: f32 = num.trim().parse().ok()?;
            let den: f32 = den.trim().parse().ok()?;
            (den > 0.0).then(|| num / den)
        }
        None => raw.trim().parse().ok(),
    }
}

pub fn tool_available(tool: &str, version_flag: &str) -> bool {
    Command::new(tool).arg(version_flag).output().is_ok()
}

pub struct VideoFileReader {
    path: PathBuf,
    current_frame: usize,
    width: u32,
    height: u32,
    fps: f32,
    frames_cache: Vec<DynamicImage>,
}

impl VideoFileReader {
    /// Probes the file and decodes every frame up front.
    pub fn open(path: impl AsRef<Path>, max_width: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            return Err(anyhow!("Video file does not exist: {}", path.display()));
        }
        fs::File::open(&path)
            .with_context(|| format!("Cannot read video file {}", path.display()))?;

        if !tool_available("ffprobe", "-version") {
            return Err(anyhow!("FFmpeg is not installed or not in PATH. Please install FFmpeg to process videos."));
        }

        let output = Command::new("ffprobe")
            .args(["-v", "error", "-select_streams", "v:0"])
            .args(["-show_entries", "stream=width,height,r_frame_rate"])
            .args(["-of", "csv=p=0"])
            .arg(&path)
            .output()
            .context("Failed to run ffprobe")?;

        let info = String::from_utf8_lossy(&output.stdout);
        let parts: Vec<&str> = info.trim().split(',').collect();
        if parts.len() < 3 {
            return Err(anyhow!("Invalid video format or corrupted file: {}", path.display()));
        }

        let width = parts[0].trim().parse().map_err(|_| anyhow!("Invalid video width"))?;
        let height = parts[1].trim().parse().map_err(|_| anyhow!("Invalid video height"))?;
        let fps = parse_frame_rate(parts[2]).unwrap_or(30.0);

        let mut reader = Self {
            path,
            current_frame: 0,
            width,
            height,
            fps,
            frames_cache: Vec::new(),
        };
        reader.load_all_frames(max_width)?;
        Ok(reader)
    }

    fn load_all_frames(&mut self, max_width: u32) -> Result<()> {
        info!("Loading video frames from {}", self.path.display());

        if !tool_available("ffmpeg", "-version") {
            return Err(anyhow!("FFmpeg is not installed. Please install FFmpeg to process videos."));
        }

        let temp_dir = std::env::temp_dir().join(format!("squat_tracker_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&temp_dir)
            .with_context(|| format!("Cannot create temporary directory {}", temp_dir.display()))?;

        let status = Command::new("ffmpeg")
            .args(["-v", "error", "-i"])
            .arg(&self.path)
            .arg(temp_dir.join("frame_%05d.png"))
            .status()
            .context("Failed to extract frames with ffmpeg");

        let loaded = status.and_then(|status| {
            if !status.success() {
                return Err(anyhow!("FFmpeg frame extraction failed. The video format may be unsupported."));
            }
            Self::read_frames(&temp_dir, max_width)
        });
        let _ = fs::remove_dir_all(&temp_dir);

        self.frames_cache = loaded?;
        if self.frames_cache.is_empty() {
            return Err(anyhow!("No frames could be loaded from the video"));
        }

        info!(
            "Loaded {} frames ({}x{} @ {:.1} fps)",
            self.frames_cache.len(),
            self.width,
            self.height,
            self.fps
        );
        Ok(())
    }

    fn read_frames(dir: &Path, max_width: u32) -> Result<Vec<DynamicImage>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension() == Some(OsStr::new("png")))
            .collect();
        paths.sort();

        let mut frames = Vec::with_capacity(paths.len());
        for frame_path in paths {
            match image::open(&frame_path) {
                Ok(img) => frames.push(fit_to_width(img, max_width)),
                Err(e) => warn!("Failed to load frame {}: {}", frame_path.display(), e),
            }
        }
        Ok(frames)
    }

    #[cfg(test)]
    fn from_frames(frames: Vec<DynamicImage>) -> Self {
        let (width, height) = frames.first().map(|f| (f.width(), f.height())).unwrap_or((0, 0));
        Self {
            path: PathBuf::from("memory"),
            current_frame: 0,
            width,
            height,
            fps: 30.0,
            frames_cache: frames,
        }
    }

    /// Returns the next frame, wrapping back to the first at the end.
    pub fn next_frame(&mut self) -> Option<DynamicImage> {
        let frame = self.frames_cache.get(self.current_frame).cloned()?;
        self.current_frame += 1;
        if self.current_frame >= self.frames_cache.len() {
            debug!("Video reached the end, looping");
            self.current_frame = 0;
        }
        Some(frame)
    }

    pub fn total_frames(&self) -> usize {
        self.frames_cache.len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VideoSource {
    pub fn open_camera(index: u32) -> Result<Self> {
        info!("Opening camera index {}", index);

        let format = CameraFormat::new(Resolution::new(640, 480), FrameFormat::MJPEG, 30);
        let exact = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Exact(format));

        let mut camera = match Camera::new(CameraIndex::Index(index), exact) {
            Ok(camera) => camera,
            Err(e) => {
                warn!("640x480 MJPEG unavailable ({}), using the camera's default format", e);
                let fallback = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
                Camera::new(CameraIndex::Index(index), fallback)
                    .map_err(|e| anyhow!("Failed to open camera {}: {}", index, e))?
            }
        };

        camera
            .open_stream()
            .map_err(|e| anyhow!("Failed to open camera stream: {}", e))?;
        info!("Camera {} streaming at {}", index, camera.camera_format());
        Ok(VideoSource::Camera(camera))
    }

    pub fn open_file(path: impl AsRef<Path>, max_width: u32) -> Result<Self> {
        Ok(VideoSource::File(VideoFileReader::open(path, max_width)?))
    }

    pub fn is_file(&self) -> bool {
        matches!(self, VideoSource::File(_))
    }

    /// Camera frames come back mirrored so the user sees themselves as in a mirror.
    pub fn read_frame(&mut self) -> Result<DynamicImage> {
        match self {
            VideoSource::Camera(camera) => {
                let frame = camera
                    .frame()
                    .map_err(|e| anyhow!("Failed to capture frame: {}", e))?;
                let decoded = frame
                    .decode_image::<RgbFormat>()
                    .map_err(|e| anyhow!("Failed to decode frame: {}", e))?;
                Ok(DynamicImage::ImageRgb8(decoded).fliph())
            }
            VideoSource::File(reader) => reader
                .next_frame()
                .ok_or_else(|| anyhow!("Video has no frames")),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            VideoSource::Camera(camera) => format!("camera {}", camera.index()),
            VideoSource::File(reader) => {
                format!("{} ({} frames)", reader.path().display(), reader.total_frames())
            }
        }
    }
}

impl Drop for VideoSource {
    fn drop(&mut self) {
        if let VideoSource::Camera(camera) = self {
            let _ = camera.stop_stream();
        }
    }
}

/// Temp location for a downloaded video; the caller removes it on exit.
pub fn download_destination() -> PathBuf {
    std::env::temp_dir().join(format!("squat_tracker_{}.mp4", uuid::Uuid::new_v4()))
}

/// Fetches `url` to `dest` with yt-dlp.
pub fn download_video(url: &str, dest: &Path) -> Result<PathBuf> {
    if !tool_available("yt-dlp", "--version") {
        return Err(anyhow!("yt-dlp is not installed or not in PATH"));
    }

    info!("Downloading {} to {}", url, dest.display());
    let status = Command::new("yt-dlp")
        .args(["-f", "best[ext=mp4]/best", "--no-playlist", "-o"])
        .arg(dest)
        .arg(url)
        .status()
        .context("Failed to run yt-dlp")?;

    if !status.success() || !dest.exists() {
        return Err(anyhow!("yt-dlp could not download {}", url));
    }
    Ok(dest.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn solid(width: u32, height: u32, shade: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([shade, shade, shade])))
    }

    #[test]
    fn test_fit_to_width_downscales_wide_frames() {
        let scaled = fit_to_width(solid(1920, 1080, 0), 1280);
        assert_eq!((scaled.width(), scaled.height()), (1280, 720));
    }

    #[test]
    fn test_fit_to_width_keeps_small_frames() {
        let frame = fit_to_width(solid(640, 480, 0), 1280);
        assert_eq!((frame.width(), frame.height()), (640, 480));
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn test_file_playback_loops() {
        let mut reader = VideoFileReader::from_frames(vec![solid(4, 4, 10), solid(4, 4, 20)]);
        let shades: Vec<u8> = (0..5)
            .map(|_| reader.next_frame().unwrap().to_rgb8().get_pixel(0, 0)[0])
            .collect();
        assert_eq!(shades, vec![10, 20, 10, 20, 10]);
        assert_eq!(reader.total_frames(), 2);
    }

    #[test]
    fn test_missing_file_fails_to_open() {
        assert!(VideoFileReader::open("/definitely/not/here.mp4", 1280).is_err());
    }
}
