//! Pointer and keyboard gestures that edit the crop box.
//!
//! The gesture snapshot is only touched by input handlers. Painting reads the
//! committed [`CropBox`] from settings, never the gesture.

use eframe::egui;

use crate::crop::{CropBox, Handle, HitTarget, NudgeMode, hit_test};
use crate::geometry::{DisplayGeometry, VideoSize};

/// In-flight pointer gesture. Points are in screen coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Gesture {
    #[default]
    Idle,
    Creating {
        start: egui::Pos2,
    },
    Moving {
        start: egui::Pos2,
        origin: CropBox,
    },
    Resizing {
        handle: Handle,
        start: egui::Pos2,
        origin: CropBox,
    },
}

/// One arrow-key step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nudge {
    pub dx: i32,
    pub dy: i32,
    pub mode: NudgeMode,
}

#[derive(Debug, Default)]
pub struct CropInteraction {
    gesture: Gesture,
}

impl CropInteraction {
    pub fn gesture(&self) -> Gesture {
        self.gesture
    }

    pub fn is_active(&self) -> bool {
        self.gesture != Gesture::Idle
    }

    /// Starts a gesture at `pos`. Returns `false` when the press is ignored:
    /// secondary buttons, or no frame on screen yet.
    pub fn pointer_down(
        &mut self,
        pos: egui::Pos2,
        button: egui::PointerButton,
        crop: Option<CropBox>,
        geometry: &DisplayGeometry,
        video: VideoSize,
    ) -> bool {
        if button != egui::PointerButton::Primary || geometry.is_empty() || video.is_empty() {
            return false;
        }

        self.gesture = match crop.map(|c| (c, hit_test(pos, geometry.crop_to_display(c, video)))) {
            Some((origin, HitTarget::Handle(handle))) => Gesture::Resizing {
                handle,
                start: pos,
                origin,
            },
            Some((origin, HitTarget::Inside)) => Gesture::Moving { start: pos, origin },
            _ => Gesture::Creating { start: pos },
        };
        log::debug!("crop gesture started: {:?}", self.gesture);
        true
    }

    /// Crop box implied by the pointer now being at `pos`, if a gesture is
    /// running.
    pub fn pointer_move(
        &self,
        pos: egui::Pos2,
        geometry: &DisplayGeometry,
        video: VideoSize,
    ) -> Option<CropBox> {
        match self.gesture {
            Gesture::Idle => None,
            Gesture::Creating { start } => Some(spanned_box(start, pos, geometry, video)),
            Gesture::Moving { start, origin } => {
                let delta = geometry.delta_to_source(pos - start, video);
                Some(origin.moved_by(delta, video))
            }
            Gesture::Resizing {
                handle,
                start,
                origin,
            } => {
                let delta = geometry.delta_to_source(pos - start, video);
                Some(origin.resized(handle, delta, video))
            }
        }
    }

    /// Ends the gesture. Returns whether one was running.
    pub fn pointer_up(&mut self) -> bool {
        let was_active = self.is_active();
        self.gesture = Gesture::Idle;
        was_active
    }

    /// Cursor to show while hovering (or dragging) at `pos`.
    pub fn cursor_icon(
        &self,
        pos: egui::Pos2,
        crop: Option<CropBox>,
        geometry: &DisplayGeometry,
        video: VideoSize,
    ) -> egui::CursorIcon {
        match self.gesture {
            Gesture::Resizing { handle, .. } => return handle.cursor_icon(),
            Gesture::Moving { .. } => return egui::CursorIcon::Grabbing,
            Gesture::Creating { .. } => return egui::CursorIcon::Crosshair,
            Gesture::Idle => {}
        }
        let target = crop
            .map(|c| hit_test(pos, geometry.crop_to_display(c, video)))
            .unwrap_or(HitTarget::Outside);
        match target {
            HitTarget::Handle(handle) => handle.cursor_icon(),
            HitTarget::Inside => egui::CursorIcon::Move,
            HitTarget::Outside => egui::CursorIcon::Crosshair,
        }
    }
}

/// Box spanned by two screen points, clamped to the displayed frame.
///
/// No minimum size is applied here; a fresh drag may be smaller than
/// [`crate::crop::MIN_CROP_SIZE`].
pub fn spanned_box(
    a: egui::Pos2,
    b: egui::Pos2,
    geometry: &DisplayGeometry,
    video: VideoSize,
) -> CropBox {
    let min = geometry.clamp_local((a.min(b) - geometry.position).to_pos2());
    let max = geometry.clamp_local((a.max(b) - geometry.position).to_pos2());
    let scale = geometry.source_scale(video);
    CropBox::from_f32(
        min.x * scale.x,
        min.y * scale.y,
        max.x * scale.x,
        max.y * scale.y,
    )
}

/// Arrow keys move the box by 1 px, 8 px with shift. Holding the command
/// modifier (ctrl outside macOS) resizes from the bottom-right instead.
pub fn arrow_nudge(modifiers: egui::Modifiers, pressed: impl Fn(egui::Key) -> bool) -> Option<Nudge> {
    let step = if modifiers.shift { 8 } else { 1 };
    let mode = if modifiers.command {
        NudgeMode::Resize
    } else {
        NudgeMode::Move
    };

    let mut dx = 0;
    let mut dy = 0;
    if pressed(egui::Key::ArrowLeft) {
        dx -= step;
    }
    if pressed(egui::Key::ArrowRight) {
        dx += step;
    }
    if pressed(egui::Key::ArrowUp) {
        dy -= step;
    }
    if pressed(egui::Key::ArrowDown) {
        dy += step;
    }

    if dx == 0 && dy == 0 {
        None
    } else {
        Some(Nudge { dx, dy, mode })
    }
}
