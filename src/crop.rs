use eframe::egui;
use serde::{Deserialize, Serialize};

use crate::geometry::VideoSize;

/// Smallest width or height a crop box may be moved or resized to.
pub const MIN_CROP_SIZE: u32 = 16;

/// Half the side of a resize grip, in screen points.
pub const HANDLE_GRIP: f32 = 6.0;

/// Crop rectangle in source pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropBox {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

/// One of the eight resize grips around a crop box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handle {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Top,
    Bottom,
    Left,
    Right,
}

/// What sits under the pointer when a gesture begins.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HitTarget {
    Handle(Handle),
    Inside,
    Outside,
}

/// Effect of an arrow key on the crop box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NudgeMode {
    Move,
    /// Grow or shrink from the bottom and right edges.
    Resize,
}

impl CropBox {
    pub const fn new(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Rounds to whole source pixels. Negative values saturate to zero.
    pub fn from_f32(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self::new(
            min_x.round() as u32,
            min_y.round() as u32,
            max_x.round() as u32,
            max_y.round() as u32,
        )
    }

    pub fn width(&self) -> u32 {
        self.max_x.saturating_sub(self.min_x)
    }

    pub fn height(&self) -> u32 {
        self.max_y.saturating_sub(self.min_y)
    }

    /// True when the box covers no pixels, e.g. right after a click.
    pub fn is_degenerate(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Checks every crop invariant against the frame.
    pub fn is_valid(&self, video: VideoSize) -> bool {
        self.min_x < self.max_x
            && self.min_y < self.max_y
            && self.max_x <= video.width
            && self.max_y <= video.height
            && self.width() >= MIN_CROP_SIZE
            && self.height() >= MIN_CROP_SIZE
    }

    /// Translates by a source-pixel delta, shifting back inside the frame
    /// without changing the size.
    pub fn moved_by(&self, delta: egui::Vec2, video: VideoSize) -> Self {
        let width = self.width() as f32;
        let height = self.height() as f32;
        let min_x = shift_into(self.min_x as f32 + delta.x, width, video.width as f32);
        let min_y = shift_into(self.min_y as f32 + delta.y, height, video.height as f32);
        let min_x = min_x.round() as u32;
        let min_y = min_y.round() as u32;
        Self::new(
            min_x,
            min_y,
            min_x + self.width(),
            min_y + self.height(),
        )
    }

    /// Applies a source-pixel delta to the edges `handle` controls.
    ///
    /// Min edges stay within `[0, max - MIN_CROP_SIZE]`, max edges within
    /// `[min + MIN_CROP_SIZE, frame size]`.
    pub fn resized(&self, handle: Handle, delta: egui::Vec2, video: VideoSize) -> Self {
        let min_size = MIN_CROP_SIZE as f32;
        let (mut min_x, mut min_y) = (self.min_x as f32, self.min_y as f32);
        let (mut max_x, mut max_y) = (self.max_x as f32, self.max_y as f32);

        if handle.adjusts_min_x() {
            min_x = (self.min_x as f32 + delta.x)
                .max(0.0)
                .min(self.max_x as f32 - min_size);
        }
        if handle.adjusts_max_x() {
            max_x = (self.max_x as f32 + delta.x)
                .max(self.min_x as f32 + min_size)
                .min(video.width as f32);
        }
        if handle.adjusts_min_y() {
            min_y = (self.min_y as f32 + delta.y)
                .max(0.0)
                .min(self.max_y as f32 - min_size);
        }
        if handle.adjusts_max_y() {
            max_y = (self.max_y as f32 + delta.y)
                .max(self.min_y as f32 + min_size)
                .min(video.height as f32);
        }

        Self::from_f32(min_x, min_y, max_x, max_y)
    }

    /// Keyboard adjustment by whole pixels.
    pub fn nudged(&self, dx: i32, dy: i32, mode: NudgeMode, video: VideoSize) -> Self {
        let delta = egui::vec2(dx as f32, dy as f32);
        match mode {
            NudgeMode::Move => self.moved_by(delta, video),
            NudgeMode::Resize => self.resized(Handle::BottomRight, delta, video),
        }
    }
}

impl std::fmt::Display for CropBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{},{} {}x{}",
            self.min_x,
            self.min_y,
            self.width(),
            self.height()
        )
    }
}

fn shift_into(start: f32, extent: f32, limit: f32) -> f32 {
    let mut start = start;
    if start < 0.0 {
        start = 0.0;
    }
    if start + extent > limit {
        start = limit - extent;
    }
    start
}

impl Handle {
    pub const ALL: [Handle; 8] = [
        Handle::TopLeft,
        Handle::TopRight,
        Handle::BottomLeft,
        Handle::BottomRight,
        Handle::Top,
        Handle::Bottom,
        Handle::Left,
        Handle::Right,
    ];

    pub fn adjusts_min_x(self) -> bool {
        matches!(self, Handle::TopLeft | Handle::BottomLeft | Handle::Left)
    }

    pub fn adjusts_max_x(self) -> bool {
        matches!(self, Handle::TopRight | Handle::BottomRight | Handle::Right)
    }

    pub fn adjusts_min_y(self) -> bool {
        matches!(self, Handle::TopLeft | Handle::TopRight | Handle::Top)
    }

    pub fn adjusts_max_y(self) -> bool {
        matches!(self, Handle::BottomLeft | Handle::BottomRight | Handle::Bottom)
    }

    /// Where the grip is drawn on a screen-space crop rectangle.
    pub fn anchor(self, rect: egui::Rect) -> egui::Pos2 {
        match self {
            Handle::TopLeft => rect.left_top(),
            Handle::TopRight => rect.right_top(),
            Handle::BottomLeft => rect.left_bottom(),
            Handle::BottomRight => rect.right_bottom(),
            Handle::Top => rect.center_top(),
            Handle::Bottom => rect.center_bottom(),
            Handle::Left => rect.left_center(),
            Handle::Right => rect.right_center(),
        }
    }

    pub fn cursor_icon(self) -> egui::CursorIcon {
        match self {
            Handle::TopLeft | Handle::BottomRight => egui::CursorIcon::ResizeNwSe,
            Handle::TopRight | Handle::BottomLeft => egui::CursorIcon::ResizeNeSw,
            Handle::Top | Handle::Bottom => egui::CursorIcon::ResizeVertical,
            Handle::Left | Handle::Right => egui::CursorIcon::ResizeHorizontal,
        }
    }
}

/// Classifies a screen point against the on-screen crop rectangle.
///
/// Corner grips win over edge grips, which win over the interior.
pub fn hit_test(pos: egui::Pos2, rect: egui::Rect) -> HitTarget {
    let min = rect.min;
    let max = rect.max;
    let near = |a: f32, b: f32| (a - b).abs() <= HANDLE_GRIP;

    let corners = [
        (Handle::TopLeft, min),
        (Handle::TopRight, egui::pos2(max.x, min.y)),
        (Handle::BottomLeft, egui::pos2(min.x, max.y)),
        (Handle::BottomRight, max),
    ];
    for (handle, corner) in corners {
        if near(pos.x, corner.x) && near(pos.y, corner.y) {
            return HitTarget::Handle(handle);
        }
    }

    let within_x = pos.x >= min.x && pos.x <= max.x;
    let within_y = pos.y >= min.y && pos.y <= max.y;
    if near(pos.y, min.y) && within_x {
        return HitTarget::Handle(Handle::Top);
    }
    if near(pos.y, max.y) && within_x {
        return HitTarget::Handle(Handle::Bottom);
    }
    if near(pos.x, min.x) && within_y {
        return HitTarget::Handle(Handle::Left);
    }
    if near(pos.x, max.x) && within_y {
        return HitTarget::Handle(Handle::Right);
    }

    if rect.contains(pos) {
        HitTarget::Inside
    } else {
        HitTarget::Outside
    }
}

/// Text fields of the numeric crop dialog.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CropForm {
    pub x: String,
    pub y: String,
    pub width: String,
    pub height: String,
}

/// Parsed, not yet clamped, crop entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropEntry {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl CropForm {
    /// Prefills the fields from the current crop, or the whole frame.
    pub fn new(crop: Option<CropBox>, video: VideoSize) -> Self {
        let crop = crop.unwrap_or(CropBox::new(0, 0, video.width, video.height));
        Self {
            x: crop.min_x.to_string(),
            y: crop.min_y.to_string(),
            width: crop.width().to_string(),
            height: crop.height().to_string(),
        }
    }

    /// Non-numeric fields fall back to 0 for position and
    /// [`MIN_CROP_SIZE`] for size.
    pub fn entry(&self) -> CropEntry {
        CropEntry {
            x: parse_or(&self.x, 0),
            y: parse_or(&self.y, 0),
            width: parse_or(&self.width, MIN_CROP_SIZE as i64),
            height: parse_or(&self.height, MIN_CROP_SIZE as i64),
        }
    }

    pub fn submit(&self, video: VideoSize) -> Option<CropBox> {
        self.entry().to_crop_box(video)
    }
}

impl CropEntry {
    /// Clamps the entry into the frame. `None` if the frame cannot hold a
    /// minimum-size box.
    pub fn to_crop_box(&self, video: VideoSize) -> Option<CropBox> {
        let min_size = MIN_CROP_SIZE as i64;
        let frame_w = video.width as i64;
        let frame_h = video.height as i64;
        if frame_w < min_size || frame_h < min_size {
            return None;
        }

        let x = self.x.clamp(0, frame_w - min_size);
        let y = self.y.clamp(0, frame_h - min_size);
        let width = self.width.clamp(min_size, frame_w - x);
        let height = self.height.clamp(min_size, frame_h - y);

        Some(CropBox::new(
            x as u32,
            y as u32,
            (x + width) as u32,
            (y + height) as u32,
        ))
    }
}

fn parse_or(field: &str, default: i64) -> i64 {
    let field = field.trim();
    if let Ok(value) = field.parse::<i64>() {
        return value;
    }
    match field.parse::<f64>() {
        Ok(value) if value.is_finite() => value.round() as i64,
        _ => default,
    }
}
