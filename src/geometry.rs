//! Coordinate spaces of the video view.
//!
//! Three spaces are in play:
//! - screen: absolute egui points, as reported by the pointer
//! - display: the letterboxed rectangle the frame is painted into
//! - source: native pixels of the camera stream
//!
//! [`DisplayGeometry`] carries the placement of the frame on screen and
//! converts between display and source space.

use eframe::egui;
use serde::{Deserialize, Serialize};

use crate::crop::CropBox;

/// Native resolution of the active camera stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSize {
    pub width: u32,
    pub height: u32,
}

impl VideoSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width over height, `1.0` while the size is unknown.
    pub fn aspect_ratio(&self) -> f32 {
        if self.is_empty() {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    pub fn to_vec2(self) -> egui::Vec2 {
        egui::vec2(self.width as f32, self.height as f32)
    }
}

impl std::fmt::Display for VideoSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Placement of a source frame inside its container, in screen points.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DisplayGeometry {
    pub position: egui::Pos2,
    pub size: egui::Vec2,
}

impl DisplayGeometry {
    /// Largest centered rectangle of `source_aspect` that fits in `container`.
    pub fn contain(container: egui::Rect, source_aspect: f32) -> Self {
        let width = container.width();
        let height = container.height();
        if width <= 0.0 || height <= 0.0 || !source_aspect.is_finite() || source_aspect <= 0.0 {
            return Self {
                position: container.min,
                size: egui::Vec2::ZERO,
            };
        }

        let container_aspect = width / height;
        let size = if container_aspect > source_aspect {
            egui::vec2(height * source_aspect, height)
        } else {
            egui::vec2(width, width / source_aspect)
        };
        let offset = (container.size() - size) / 2.0;

        Self {
            position: container.min + offset,
            size,
        }
    }

    pub fn rect(&self) -> egui::Rect {
        egui::Rect::from_min_size(self.position, self.size)
    }

    pub fn is_empty(&self) -> bool {
        self.size.x <= 0.0 || self.size.y <= 0.0
    }

    /// Source pixels per display point along each axis.
    pub fn source_scale(&self, video: VideoSize) -> egui::Vec2 {
        if self.is_empty() {
            return egui::Vec2::ZERO;
        }
        video.to_vec2() / self.size
    }

    /// Maps a screen point onto the source frame. Not clamped.
    pub fn display_to_source(&self, point: egui::Pos2, video: VideoSize) -> egui::Pos2 {
        let local = point - self.position;
        (local * self.source_scale(video)).to_pos2()
    }

    /// Maps a source pixel back onto the screen.
    pub fn source_to_display(&self, point: egui::Pos2, video: VideoSize) -> egui::Pos2 {
        if video.is_empty() {
            return self.position;
        }
        self.position + point.to_vec2() * self.size / video.to_vec2()
    }

    /// Converts a pointer displacement into a source-pixel displacement.
    pub fn delta_to_source(&self, delta: egui::Vec2, video: VideoSize) -> egui::Vec2 {
        delta * self.source_scale(video)
    }

    /// Clamps a display-local point (relative to `position`) to the frame.
    pub fn clamp_local(&self, local: egui::Pos2) -> egui::Pos2 {
        egui::pos2(
            local.x.clamp(0.0, self.size.x.max(0.0)),
            local.y.clamp(0.0, self.size.y.max(0.0)),
        )
    }

    /// Screen rectangle covered by `crop`.
    pub fn crop_to_display(&self, crop: CropBox, video: VideoSize) -> egui::Rect {
        egui::Rect::from_min_max(
            self.source_to_display(egui::pos2(crop.min_x as f32, crop.min_y as f32), video),
            self.source_to_display(egui::pos2(crop.max_x as f32, crop.max_y as f32), video),
        )
    }
}
