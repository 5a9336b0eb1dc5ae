// src/ui.rs - Drawing helpers for the live view and summary
use crate::pose::{PoseFrame, SKELETON_CONNECTIONS};
use crate::summary::RepQuality;
use crate::tracking::DepthGuides;
use eframe::egui::{self, Color32, Pos2, Rect, Stroke, Vec2};
use image::DynamicImage;

pub const INSTRUCTIONS: &[&str] = &[
    "1. Stand sideways to the camera",
    "2. Keep your full body visible",
    "3. Press 'Start' to begin",
    "4. Squat until parallel",
    "5. Keep your back straight",
];

#[derive(Debug, Clone)]
pub struct Theme {
    pub primary: Color32,
    pub primary_light: Color32,
    pub surface: Color32,
    pub error: Color32,
    pub success: Color32,
    pub success_light: Color32,
    pub text_primary: Color32,
    pub text_secondary: Color32,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary: Color32::from_rgb(66, 165, 245),
            primary_light: Color32::from_rgb(227, 242, 253),
            surface: Color32::from_rgb(30, 30, 35),
            error: Color32::from_rgb(239, 83, 80),
            success: Color32::from_rgb(102, 187, 106),
            success_light: Color32::from_rgb(50, 205, 50),
            text_primary: Color32::WHITE,
            text_secondary: Color32::from_rgb(200, 200, 200),
        }
    }
}

impl Theme {
    /// Green inside the working range of 90-150 degrees.
    pub fn knee_angle_color(&self, angle: f64) -> Color32 {
        if (90.0..=150.0).contains(&angle) {
            self.success
        } else {
            self.primary
        }
    }

    pub fn depth_color(&self, depth: f64) -> Color32 {
        if depth >= 60.0 {
            self.success
        } else {
            self.primary
        }
    }

    pub fn quality_color(&self, quality: RepQuality) -> Color32 {
        match quality {
            RepQuality::Excellent => self.success,
            RepQuality::Good => self.success_light,
            RepQuality::Okay => self.primary,
            RepQuality::Shallow => self.error,
        }
    }

    /// Traffic-light colouring for 0-100 scores.
    pub fn score_color(&self, score: f64) -> Color32 {
        if score >= 70.0 {
            self.success
        } else if score >= 40.0 {
            self.primary
        } else {
            self.error
        }
    }
}

const MIN_DRAW_VISIBILITY: f64 = 0.5;

/// Maps a normalized landmark into the displayed video rect.
fn to_screen(rect: Rect, x: f64, y: f64) -> Pos2 {
    Pos2::new(
        rect.left() + x as f32 * rect.width(),
        rect.top() + y as f32 * rect.height(),
    )
}

pub fn draw_skeleton(painter: &egui::Painter, rect: Rect, pose: &PoseFrame, theme: &Theme) {
    for (from, to) in SKELETON_CONNECTIONS {
        if let (Some(a), Some(b)) = (pose.get(*from), pose.get(*to)) {
            if a.visibility < MIN_DRAW_VISIBILITY || b.visibility < MIN_DRAW_VISIBILITY {
                continue;
            }
            painter.line_segment(
                [to_screen(rect, a.x, a.y), to_screen(rect, b.x, b.y)],
                Stroke::new(2.0, theme.primary),
            );
        }
    }

    for landmark in pose
        .landmarks()
        .iter()
        .filter(|l| l.is_finite() && l.visibility >= MIN_DRAW_VISIBILITY)
    {
        if !(0.0..=1.0).contains(&landmark.x) || !(0.0..=1.0).contains(&landmark.y) {
            continue;
        }
        let pos = to_screen(rect, landmark.x, landmark.y);
        painter.circle_filled(pos, 4.0, theme.primary_light);
        painter.circle_stroke(pos, 6.0, Stroke::new(1.5, theme.text_primary));
    }
}

/// Standing line in green, target depth in red, current hip in blue.
/// Guide values are pixel rows of a frame `frame_height` tall.
pub fn draw_depth_guides(
    painter: &egui::Painter,
    rect: Rect,
    guides: &DepthGuides,
    frame_height: f64,
    theme: &Theme,
) {
    if frame_height <= 0.0 {
        return;
    }

    let lines = [
        (guides.standing_y, theme.success, 2.0),
        (guides.target_y, theme.error, 2.0),
        (guides.current_y, theme.primary, 1.0),
    ];
    for (y, color, width) in lines {
        let y = rect.top() + (y / frame_height) as f32 * rect.height();
        if y < rect.top() || y > rect.bottom() {
            continue;
        }
        painter.line_segment(
            [Pos2::new(rect.left(), y), Pos2::new(rect.right(), y)],
            Stroke::new(width, color),
        );
    }
}

pub fn draw_instructions(painter: &egui::Painter, rect: Rect, theme: &Theme) {
    painter.rect_filled(rect, egui::Rounding::ZERO, Color32::from_black_alpha(180));

    let mut y = rect.top() + rect.height() * 0.25;
    painter.text(
        Pos2::new(rect.center().x, y),
        egui::Align2::CENTER_CENTER,
        "Squat Form Analyzer",
        egui::FontId::proportional(42.0),
        theme.text_primary,
    );
    y += 80.0;

    for line in INSTRUCTIONS {
        painter.text(
            Pos2::new(rect.center().x, y),
            egui::Align2::CENTER_CENTER,
            *line,
            egui::FontId::proportional(28.0),
            theme.text_primary,
        );
        y += 50.0;
    }

    painter.text(
        Pos2::new(rect.center().x, y + 30.0),
        egui::Align2::CENTER_CENTER,
        "Press SPACE to begin",
        egui::FontId::proportional(28.0),
        theme.primary,
    );
}

pub fn metric_card(ui: &mut egui::Ui, theme: &Theme, label: &str, value: String, color: Color32) {
    egui::Frame::none()
        .fill(theme.surface)
        .rounding(egui::Rounding::same(8.0))
        .inner_margin(egui::Margin::same(12.0))
        .show(ui, |ui| {
            ui.set_min_width(160.0);
            ui.vertical(|ui| {
                ui.label(egui::RichText::new(label).size(16.0).color(theme.text_secondary));
                ui.label(egui::RichText::new(value).size(36.0).strong().color(color));
            });
        });
}

pub fn score_bar(ui: &mut egui::Ui, theme: &Theme, label: &str, score: f64) {
    ui.horizontal(|ui| {
        ui.label(label);

        let bar_width = 200.0;
        let bar_height = 20.0;
        let rect = ui.allocate_space(Vec2::new(bar_width, bar_height)).1;
        let painter = ui.painter();

        painter.rect_filled(rect, egui::Rounding::same(4.0), theme.surface);

        let fraction = (score / 100.0).clamp(0.0, 1.0) as f32;
        let fill_rect = Rect::from_min_size(rect.min, Vec2::new(bar_width * fraction, bar_height));
        painter.rect_filled(fill_rect, egui::Rounding::same(4.0), theme.score_color(score));

        painter.text(
            rect.center(),
            egui::Align2::CENTER_CENTER,
            format!("{:.0}", score),
            egui::FontId::proportional(12.0),
            theme.text_primary,
        );
    });
}

#[derive(Default)]
pub struct RecordingIndicator {
    pulse: f32,
}

impl RecordingIndicator {
    /// Pulsing REC badge in the top-right corner of `rect`.
    pub fn draw(&mut self, ui: &egui::Ui, rect: Rect) {
        self.pulse += ui.input(|i| i.unstable_dt) * 2.0;
        let pulse = (self.pulse.sin() + 1.0) * 0.5;

        let size = 10.0 + pulse * 4.0;
        let color = Color32::from_rgb(239, (83.0 + pulse * 30.0) as u8, 80);
        let pos = Pos2::new(rect.right() - 30.0, rect.top() + 30.0);

        let painter = ui.painter();
        painter.circle_filled(pos, size, color);
        painter.text(
            Pos2::new(pos.x - 20.0, pos.y),
            egui::Align2::RIGHT_CENTER,
            "REC",
            egui::FontId::proportional(16.0),
            color,
        );
    }
}

/// Displays the latest frame, letterboxed to the available space.
pub struct VideoWidget {
    texture: Option<egui::TextureHandle>,
    frame_size: [usize; 2],
}

impl VideoWidget {
    pub fn new() -> Self {
        Self {
            texture: None,
            frame_size: [640, 480],
        }
    }

    pub fn update_frame(&mut self, ctx: &egui::Context, frame: &DynamicImage) {
        let size = [frame.width() as usize, frame.height() as usize];
        let rgba = frame.to_rgba8();
        let color_image = egui::ColorImage::from_rgba_unmultiplied(size, rgba.as_raw());

        match self.texture.as_mut() {
            Some(texture) => texture.set(color_image, Default::default()),
            None => {
                self.texture = Some(ctx.load_texture("video_frame", color_image, Default::default()))
            }
        }
        self.frame_size = size;
    }

    pub fn frame_height(&self) -> f64 {
        self.frame_size[1] as f64
    }

    /// Returns the rect the frame was painted into so overlays can share it.
    pub fn show(&self, ui: &mut egui::Ui, max_size: Vec2) -> Rect {
        let aspect = self.frame_size[0] as f32 / self.frame_size[1].max(1) as f32;
        let mut size = Vec2::new(max_size.x, max_size.x / aspect);
        if size.y > max_size.y {
            size = Vec2::new(max_size.y * aspect, max_size.y);
        }

        let (rect, _response) = ui.allocate_exact_size(size, egui::Sense::hover());

        if let Some(texture) = &self.texture {
            ui.painter().image(
                texture.id(),
                rect,
                Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                Color32::WHITE,
            );
        } else {
            ui.painter().rect_filled(rect, egui::Rounding::same(4.0), Color32::from_rgb(50, 50, 55));
            ui.painter().text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                "No Video Signal",
                egui::FontId::proportional(16.0),
                Color32::from_rgb(150, 150, 155),
            );
        }
        rect
    }
}

impl Default for VideoWidget {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_knee_angle_card_color() {
        let theme = Theme::default();
        assert_eq!(theme.knee_angle_color(90.0), theme.success);
        assert_eq!(theme.knee_angle_color(150.0), theme.success);
        assert_eq!(theme.knee_angle_color(89.9), theme.primary);
        assert_eq!(theme.knee_angle_color(180.0), theme.primary);
    }

    #[test]
    fn test_depth_card_color() {
        let theme = Theme::default();
        assert_eq!(theme.depth_color(60.0), theme.success);
        assert_eq!(theme.depth_color(59.9), theme.primary);
        assert_eq!(theme.depth_color(0.0), theme.primary);
    }

    #[test]
    fn test_to_screen_maps_unit_square() {
        let rect = Rect::from_min_size(Pos2::new(10.0, 20.0), Vec2::new(200.0, 100.0));
        assert_eq!(to_screen(rect, 0.0, 0.0), Pos2::new(10.0, 20.0));
        assert_eq!(to_screen(rect, 0.5, 1.0), Pos2::new(110.0, 120.0));
    }
}
