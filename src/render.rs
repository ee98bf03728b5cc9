//! Per-frame render loops.
//!
//! Each loop owns a [`Canvas`] (CPU pixels plus a lazily uploaded egui
//! texture) and a [`RenderLoop`] handle that keeps asking for the next frame
//! until it is cancelled.

use std::sync::Arc;

use eframe::egui;
use image::{RgbaImage, imageops};

use crate::camera::CameraFrame;
use crate::crop::CropBox;
use crate::geometry::VideoSize;

/// Mirror flags applied when a camera frame is painted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Flip {
    pub horizontal: bool,
    pub vertical: bool,
}

impl Flip {
    pub const NONE: Flip = Flip {
        horizontal: false,
        vertical: false,
    };

    pub const fn new(horizontal: bool, vertical: bool) -> Self {
        Self {
            horizontal,
            vertical,
        }
    }

    /// Flip equivalent to applying `self` and then `other`.
    pub fn then(self, other: Flip) -> Flip {
        Flip::new(
            self.horizontal ^ other.horizontal,
            self.vertical ^ other.vertical,
        )
    }

    pub fn apply(self, image: &mut RgbaImage) {
        if self.horizontal {
            imageops::flip_horizontal_in_place(image);
        }
        if self.vertical {
            imageops::flip_vertical_in_place(image);
        }
    }
}

/// Something that can be asked to run the next display frame.
pub trait FrameScheduler {
    fn request_frame(&self);
}

impl FrameScheduler for egui::Context {
    fn request_frame(&self) {
        self.request_repaint();
    }
}

/// Handle of a self-rescheduling per-frame task.
///
/// Dropping the handle cancels it.
#[derive(Debug)]
pub struct RenderLoop {
    name: &'static str,
    running: bool,
    ticks: u64,
}

impl RenderLoop {
    pub fn start<S: FrameScheduler + ?Sized>(name: &'static str, scheduler: &S) -> Self {
        log::debug!("render loop '{}' started", name);
        scheduler.request_frame();
        Self {
            name,
            running: true,
            ticks: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Runs `draw` and schedules the next frame. After cancellation this
    /// does nothing and returns `false`.
    pub fn tick<S: FrameScheduler + ?Sized>(&mut self, scheduler: &S, draw: impl FnOnce()) -> bool {
        if !self.is_running() {
            return false;
        }
        draw();
        self.ticks += 1;
        scheduler.request_frame();
        true
    }

    /// Stops the loop. Returns `true` only for the call that stopped it.
    pub fn cancel(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.running = false;
        log::debug!("render loop '{}' cancelled after {} ticks", self.name, self.ticks);
        true
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// RGBA pixel buffer shown through an egui texture.
pub struct Canvas {
    name: &'static str,
    pixels: RgbaImage,
    texture: Option<egui::TextureHandle>,
    dirty: bool,
}

impl Canvas {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            pixels: RgbaImage::new(0, 0),
            texture: None,
            dirty: false,
        }
    }

    pub fn size(&self) -> VideoSize {
        VideoSize::new(self.pixels.width(), self.pixels.height())
    }

    pub fn is_empty(&self) -> bool {
        self.size().is_empty()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Swaps in a new backing buffer; its size becomes the canvas size.
    pub fn replace(&mut self, pixels: RgbaImage) {
        self.pixels = pixels;
        self.dirty = true;
    }

    /// Drops the pixels so nothing is shown or saved.
    pub fn clear(&mut self) {
        if !self.is_empty() {
            self.replace(RgbaImage::new(0, 0));
        }
    }

    /// Texture with the latest pixels, uploading them if they changed.
    pub fn texture(&mut self, ctx: &egui::Context) -> Option<&egui::TextureHandle> {
        if self.is_empty() {
            return None;
        }
        if self.dirty || self.texture.is_none() {
            let size = [self.pixels.width() as usize, self.pixels.height() as usize];
            let image = egui::ColorImage::from_rgba_unmultiplied(size, self.pixels.as_raw());
            match &mut self.texture {
                Some(texture) => texture.set(image, egui::TextureOptions::LINEAR),
                None => {
                    self.texture = Some(ctx.load_texture(self.name, image, egui::TextureOptions::LINEAR))
                }
            }
            self.dirty = false;
        }
        self.texture.as_ref()
    }
}

/// Paints camera frames, flipped, into the full-resolution canvas.
pub struct SourceFrameLoop {
    task: RenderLoop,
    canvas: Canvas,
    drawn: Option<(u64, Flip)>,
}

impl SourceFrameLoop {
    pub fn start<S: FrameScheduler + ?Sized>(scheduler: &S) -> Self {
        Self {
            task: RenderLoop::start("source-frame", scheduler),
            canvas: Canvas::new("video-canvas"),
            drawn: None,
        }
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn canvas_mut(&mut self) -> &mut Canvas {
        &mut self.canvas
    }

    pub fn cancel(&mut self) -> bool {
        self.task.cancel()
    }

    /// Draws `frame` if it is new or the flip changed. Returns the stream
    /// size whenever the canvas had to be resized to it.
    pub fn tick<S: FrameScheduler + ?Sized>(
        &mut self,
        frame: Option<Arc<CameraFrame>>,
        flip: Flip,
        scheduler: &S,
    ) -> Option<VideoSize> {
        let canvas = &mut self.canvas;
        let drawn = &mut self.drawn;
        let mut resized = None;

        self.task.tick(scheduler, || {
            let Some(frame) = frame else { return };
            if *drawn == Some((frame.frame_number, flip)) {
                return;
            }
            let frame_number = frame.frame_number;
            let size = frame.size();
            let Some(mut pixels) = frame.to_image() else {
                log::warn!("dropping malformed {} frame #{}", size, frame_number);
                return;
            };
            if canvas.size() != size {
                log::info!("video canvas sized to {}", size);
                resized = Some(size);
            }
            flip.apply(&mut pixels);
            canvas.replace(pixels);
            *drawn = Some((frame_number, flip));
        });

        resized
    }
}

/// Continuously copies the crop region of the source canvas into a
/// crop-sized canvas.
pub struct CropPreviewLoop {
    task: RenderLoop,
    canvas: Canvas,
}

impl CropPreviewLoop {
    pub fn start<S: FrameScheduler + ?Sized>(scheduler: &S) -> Self {
        Self {
            task: RenderLoop::start("crop-preview", scheduler),
            canvas: Canvas::new("crop-canvas"),
        }
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn canvas_mut(&mut self) -> &mut Canvas {
        &mut self.canvas
    }

    pub fn cancel(&mut self) -> bool {
        self.task.cancel()
    }

    pub fn tick<S: FrameScheduler + ?Sized>(
        &mut self,
        source: &Canvas,
        crop: Option<CropBox>,
        scheduler: &S,
    ) {
        let canvas = &mut self.canvas;
        self.task.tick(scheduler, || {
            let sampled = crop
                .filter(|crop| !crop.is_degenerate() && !source.is_empty())
                .and_then(|crop| sample_region(source.pixels(), crop));
            match sampled {
                Some(pixels) => canvas.replace(pixels),
                None => canvas.clear(),
            }
        });
    }
}

/// Copies `crop` out of `source` into a buffer of exactly the crop size.
/// Parts of the crop outside `source` stay transparent.
pub fn sample_region(source: &RgbaImage, crop: CropBox) -> Option<RgbaImage> {
    let x = crop.min_x.min(source.width());
    let y = crop.min_y.min(source.height());
    let width = crop.width().min(source.width() - x);
    let height = crop.height().min(source.height() - y);
    if width == 0 || height == 0 {
        return None;
    }

    let region = imageops::crop_imm(source, x, y, width, height).to_image();
    if width == crop.width() && height == crop.height() {
        return Some(region);
    }
    let mut pixels = RgbaImage::new(crop.width(), crop.height());
    imageops::replace(&mut pixels, &region, 0, 0);
    Some(pixels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct CountingScheduler {
        requests: Cell<u32>,
    }

    impl FrameScheduler for CountingScheduler {
        fn request_frame(&self) {
            self.requests.set(self.requests.get() + 1);
        }
    }

    /// Frame whose red channel encodes x and green channel encodes y.
    fn gradient_frame(width: u32, height: u32, frame_number: u64) -> Arc<CameraFrame> {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, 0, 255]);
            }
        }
        Arc::new(CameraFrame {
            data,
            width,
            height,
            frame_number,
        })
    }

    fn gradient_image(width: u32, height: u32) -> RgbaImage {
        gradient_frame(width, height, 0).to_image().unwrap()
    }

    #[test]
    fn flip_is_self_inverse_and_commutative() {
        let h = Flip::new(true, false);
        let v = Flip::new(false, true);
        assert_eq!(h.then(h), Flip::NONE);
        assert_eq!(h.then(v), v.then(h));

        let original = gradient_image(5, 3);
        let mut image = original.clone();
        h.apply(&mut image);
        assert_ne!(image, original);
        h.apply(&mut image);
        assert_eq!(image, original);
    }

    #[test]
    fn both_flips_equal_half_turn() {
        let original = gradient_image(6, 4);
        let mut flipped = original.clone();
        Flip::new(true, true).apply(&mut flipped);
        assert_eq!(flipped, imageops::rotate180(&original));
    }

    #[test]
    fn render_loop_stops_scheduling_after_cancel() {
        let scheduler = CountingScheduler::default();
        let mut task = RenderLoop::start("test", &scheduler);
        assert_eq!(scheduler.requests.get(), 1);

        let mut draws = 0;
        assert!(task.tick(&scheduler, || draws += 1));
        assert_eq!((draws, scheduler.requests.get()), (1, 2));

        assert!(task.cancel());
        assert!(!task.cancel());
        assert!(!task.tick(&scheduler, || draws += 1));
        assert_eq!((draws, scheduler.requests.get()), (1, 2));
        assert_eq!(task.ticks(), 1);
    }

    #[test]
    fn source_loop_sizes_canvas_and_flips() {
        let scheduler = CountingScheduler::default();
        let mut source = SourceFrameLoop::start(&scheduler);
        assert_eq!(source.tick(None, Flip::NONE, &scheduler), None);
        assert!(source.canvas().is_empty());

        let resized = source.tick(Some(gradient_frame(8, 4, 1)), Flip::new(true, false), &scheduler);
        assert_eq!(resized, Some(VideoSize::new(8, 4)));
        assert_eq!(source.canvas().pixels().get_pixel(0, 0).0, [7, 0, 0, 255]);

        // Same size again: no resize report.
        let resized = source.tick(Some(gradient_frame(8, 4, 2)), Flip::new(false, true), &scheduler);
        assert_eq!(resized, None);
        assert_eq!(source.canvas().pixels().get_pixel(0, 0).0, [0, 3, 0, 255]);
    }

    #[test]
    fn source_loop_is_inert_once_cancelled() {
        let scheduler = CountingScheduler::default();
        let mut source = SourceFrameLoop::start(&scheduler);
        assert!(source.cancel());
        let before = scheduler.requests.get();
        assert_eq!(source.tick(Some(gradient_frame(4, 4, 1)), Flip::NONE, &scheduler), None);
        assert!(source.canvas().is_empty());
        assert_eq!(scheduler.requests.get(), before);
    }

    #[test]
    fn preview_tracks_crop_size_changes() {
        let scheduler = CountingScheduler::default();
        let mut source = SourceFrameLoop::start(&scheduler);
        source.tick(Some(gradient_frame(64, 48, 1)), Flip::NONE, &scheduler);

        let mut preview = CropPreviewLoop::start(&scheduler);
        preview.tick(source.canvas(), Some(CropBox::new(10, 5, 30, 25)), &scheduler);
        assert_eq!(preview.canvas().size(), VideoSize::new(20, 20));
        assert_eq!(preview.canvas().pixels().get_pixel(0, 0).0, [10, 5, 0, 255]);

        preview.tick(source.canvas(), Some(CropBox::new(40, 30, 64, 48)), &scheduler);
        assert_eq!(preview.canvas().size(), VideoSize::new(24, 18));
        assert_eq!(preview.canvas().pixels().get_pixel(23, 17).0, [63, 47, 0, 255]);
    }

    #[test]
    fn preview_skips_without_crop_or_source() {
        let scheduler = CountingScheduler::default();
        let empty = Canvas::new("empty");
        let mut preview = CropPreviewLoop::start(&scheduler);
        preview.tick(&empty, Some(CropBox::new(0, 0, 16, 16)), &scheduler);
        assert!(preview.canvas().is_empty());

        let mut source = SourceFrameLoop::start(&scheduler);
        source.tick(Some(gradient_frame(32, 32, 1)), Flip::NONE, &scheduler);
        preview.tick(source.canvas(), None, &scheduler);
        preview.tick(source.canvas(), Some(CropBox::new(4, 4, 4, 20)), &scheduler);
        assert!(preview.canvas().is_empty());
    }

    #[test]
    fn preview_empties_when_crop_collapses() {
        let scheduler = CountingScheduler::default();
        let mut source = SourceFrameLoop::start(&scheduler);
        source.tick(Some(gradient_frame(64, 48, 1)), Flip::NONE, &scheduler);

        let mut preview = CropPreviewLoop::start(&scheduler);
        preview.tick(source.canvas(), Some(CropBox::new(10, 10, 30, 30)), &scheduler);
        assert_eq!(preview.canvas().size(), VideoSize::new(20, 20));

        // Zero-width box from a drag inside the letterbox margin.
        preview.tick(source.canvas(), Some(CropBox::new(0, 5, 0, 40)), &scheduler);
        assert!(preview.canvas().is_empty());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crop.png");
        let saved = crate::export::export_canvas(
            Some(preview.canvas()),
            &path,
            crate::export::ExportFormat::Png,
        )
        .unwrap();
        assert!(saved.is_none());

        preview.tick(source.canvas(), Some(CropBox::new(10, 10, 30, 30)), &scheduler);
        assert_eq!(preview.canvas().size(), VideoSize::new(20, 20));
        preview.tick(source.canvas(), None, &scheduler);
        assert!(preview.canvas().is_empty());
    }

    #[test]
    fn region_outside_source_is_padded() {
        let source = gradient_image(20, 20);
        let pixels = sample_region(&source, CropBox::new(10, 10, 30, 26)).unwrap();
        assert_eq!(pixels.dimensions(), (20, 16));
        assert_eq!(pixels.get_pixel(9, 9).0, [19, 19, 0, 255]);
        assert_eq!(pixels.get_pixel(15, 3).0, [0, 0, 0, 0]);
        assert!(sample_region(&source, CropBox::new(25, 0, 40, 16)).is_none());
    }
}
