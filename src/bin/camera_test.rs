use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use std::process::Command;

fn check_tool(tool: &str, version_flag: &str) -> bool {
    match Command::new(tool).arg(version_flag).output() {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout);
            println!("✓ {} found: {}", tool, version.lines().next().unwrap_or("").trim());
            true
        }
        _ => {
            println!("✗ {} not found in PATH", tool);
            false
        }
    }
}

fn check_camera(index: u32) -> bool {
    let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);

    let mut camera = match Camera::new(CameraIndex::Index(index), format) {
        Ok(camera) => camera,
        Err(e) => {
            println!("✗ Failed to open camera {}: {}", index, e);
            println!("\nPossible causes:");
            println!("  - Camera is being used by another app");
            println!("  - Camera permissions not granted");
            println!("  - No camera connected");
            return false;
        }
    };
    println!("✓ Camera {} opened", index);

    if let Err(e) = camera.open_stream() {
        println!("✗ Failed to open stream: {}", e);
        return false;
    }

    let ok = match camera.frame() {
        Ok(frame) => {
            println!("✓ Frame captured ({}x{})", frame.resolution().width(), frame.resolution().height());
            true
        }
        Err(e) => {
            println!("✗ Failed to capture frame: {}", e);
            false
        }
    };
    let _ = camera.stop_stream();
    ok
}

fn main() {
    println!("Checking squat tracker setup...\n");

    let index = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(0);

    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => {
            println!("Found {} camera(s):", cameras.len());
            for (i, camera) in cameras.iter().enumerate() {
                println!("  [{}] {}", i, camera.human_name());
            }
        }
        Err(e) => println!("Failed to query cameras: {}", e),
    }
    println!();

    let camera_ok = check_camera(index);
    let ffmpeg_ok = check_tool("ffmpeg", "-version") && check_tool("ffprobe", "-version");
    // Only needed for --url.
    check_tool("yt-dlp", "--version");

    println!();
    if camera_ok && ffmpeg_ok {
        println!("All checks passed.");
    } else {
        println!("Some checks failed, see above.");
        std::process::exit(1);
    }
}
