use chrono::Local;
use eframe::egui;

use crate::camera::{self, CameraCapture, CameraInfo, StreamStatus};
use crate::config::AppConfig;
use crate::crop::{CropBox, CropForm, HANDLE_GRIP, Handle};
use crate::export;
use crate::geometry::{DisplayGeometry, VideoSize};
use crate::interaction::{CropInteraction, arrow_nudge};
use crate::render::{CropPreviewLoop, SourceFrameLoop};
use crate::settings::{CameraSettings, SettingsStore};

const CROP_STROKE: egui::Color32 = egui::Color32::from_rgb(59, 130, 246);

/// Buttons and pickers report through this so panels can borrow `self`
/// immutably while they are drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UiAction {
    SelectDevice(usize),
    ToggleFlipHorizontal,
    ToggleFlipVertical,
    ClearCrop,
    ToggleShowCrop,
    EditCrop,
    Download,
}

/// Everything tied to one camera stream. Dropping it cancels both render
/// loops.
struct VideoView {
    source: SourceFrameLoop,
    preview: CropPreviewLoop,
    interaction: CropInteraction,
    geometry: DisplayGeometry,
}

impl VideoView {
    fn start(ctx: &egui::Context) -> Self {
        Self {
            source: SourceFrameLoop::start(ctx),
            preview: CropPreviewLoop::start(ctx),
            interaction: CropInteraction::default(),
            geometry: DisplayGeometry::default(),
        }
    }
}

pub struct WebcamCropper {
    config: AppConfig,
    settings: SettingsStore,
    devices: Vec<CameraInfo>,
    selected: Option<usize>,
    camera: Option<CameraCapture>,
    view: Option<VideoView>,
    crop_form: Option<CropForm>,
    last_error: Option<String>,
}

impl WebcamCropper {
    pub fn new(cc: &eframe::CreationContext<'_>, config: AppConfig) -> Self {
        let settings = SettingsStore::load(config.settings_path());
        let devices = camera::list_cameras();
        log::info!("Found {} camera(s)", devices.len());

        let mut app = Self {
            config,
            settings,
            devices,
            selected: None,
            camera: None,
            view: None,
            crop_form: None,
            last_error: None,
        };
        if let Some(idx) = camera::preferred_index(&app.devices, app.settings.preferred_device()) {
            app.select_device(idx, &cc.egui_ctx);
        }
        app
    }

    fn current_device(&self) -> Option<&CameraInfo> {
        self.selected.and_then(|idx| self.devices.get(idx))
    }

    fn current_settings(&self) -> CameraSettings {
        self.current_device()
            .map(|device| self.settings.settings(device))
            .unwrap_or_default()
    }

    fn update_settings(&mut self, edit: impl FnOnce(&mut CameraSettings)) {
        let Some(device) = self.selected.and_then(|idx| self.devices.get(idx)) else {
            return;
        };
        self.settings.update(device, edit);
    }

    fn set_crop_box(&mut self, crop: Option<CropBox>) {
        self.update_settings(|s| s.crop_box = crop);
    }

    /// Size of the live stream, or the last one seen for this camera.
    fn video_size(&self) -> VideoSize {
        self.view
            .as_ref()
            .map(|view| view.source.canvas().size())
            .filter(|size| !size.is_empty())
            .unwrap_or_else(|| self.current_settings().video_size)
    }

    fn set_video_size(&mut self, size: VideoSize) {
        self.update_settings(|s| {
            s.video_size = size;
            if let Some(crop) = s.crop_box {
                if crop.max_x > size.width || crop.max_y > size.height {
                    log::info!("Dropping crop {} that does not fit {}", crop, size);
                    s.crop_box = None;
                    s.show_crop = false;
                }
            }
        });
    }

    fn select_device(&mut self, idx: usize, ctx: &egui::Context) {
        if self.selected == Some(idx) && self.camera.is_some() {
            return;
        }
        let Some(device) = self.devices.get(idx).cloned() else {
            return;
        };

        self.stop_stream();
        self.selected = Some(idx);
        self.last_error = None;
        self.settings.set_preferred_device(&device.label);
        log::info!("Selected camera '{}'", device.label);

        match CameraCapture::open(&device, self.config.ideal_width) {
            Ok(capture) => {
                self.camera = Some(capture);
                self.view = Some(VideoView::start(ctx));
            }
            Err(e) => {
                log::error!("{}", e);
                self.last_error = Some(e.to_string());
            }
        }
    }

    /// Releases the camera and tears down the view of the old stream.
    fn stop_stream(&mut self) {
        if let Some(mut capture) = self.camera.take() {
            capture.stop();
        }
        self.view = None;
    }

    fn poll_stream(&mut self) {
        let Some(capture) = &self.camera else {
            return;
        };
        if let StreamStatus::Failed(e) = capture.status() {
            log::warn!("No video from '{}'", capture.device().label);
            self.last_error = Some(e.to_string());
            self.stop_stream();
        }
    }

    fn tick_loops(&mut self, ctx: &egui::Context) {
        let settings = self.current_settings();
        let frame = self.camera.as_ref().and_then(|c| c.latest_frame());
        let Some(view) = &mut self.view else {
            return;
        };

        let resized = view.source.tick(frame, settings.flip(), ctx);
        view.preview.tick(view.source.canvas(), settings.crop_box, ctx);

        if let Some(size) = resized {
            self.set_video_size(size);
        }
    }

    fn flush_settings(&mut self) {
        let gesture_active = self
            .view
            .as_ref()
            .is_some_and(|view| view.interaction.is_active());
        if gesture_active {
            return;
        }
        if let Err(e) = self.settings.flush() {
            log::error!("{}", e);
        }
    }

    fn apply(&mut self, action: UiAction, ctx: &egui::Context) {
        match action {
            UiAction::SelectDevice(idx) => self.select_device(idx, ctx),
            UiAction::ToggleFlipHorizontal => self.update_settings(|s| s.flip_horizontal = !s.flip_horizontal),
            UiAction::ToggleFlipVertical => self.update_settings(|s| s.flip_vertical = !s.flip_vertical),
            UiAction::ClearCrop => self.update_settings(|s| {
                s.crop_box = None;
                s.show_crop = false;
            }),
            UiAction::ToggleShowCrop => self.update_settings(|s| s.show_crop = !s.show_crop),
            UiAction::EditCrop => {
                let video = self.video_size();
                if !video.is_empty() {
                    self.crop_form = Some(CropForm::new(self.current_settings().crop_box, video));
                }
            }
            UiAction::Download => self.download(),
        }
    }

    /// Saves whichever canvas is on screen.
    fn download(&mut self) {
        let settings = self.current_settings();
        let Some(view) = &self.view else {
            return;
        };
        let canvas = if settings.show_crop && settings.crop_box.is_some() {
            view.preview.canvas()
        } else {
            view.source.canvas()
        };
        if canvas.is_empty() {
            return;
        }

        let format = self.config.export_format;
        let name = export::timestamped_file_name(&self.config.file_prefix, format, Local::now());
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Image", &["jpg", "jpeg", "png"])
            .set_directory(self.config.export_dir())
            .set_file_name(name)
            .save_file()
        else {
            return;
        };

        if let Err(e) = export::export_canvas(Some(canvas), &path, format) {
            log::error!("{}", e);
            self.last_error = Some(e.to_string());
        }
    }

    fn top_bar(&self, ctx: &egui::Context, actions: &mut Vec<UiAction>) {
        let settings = self.current_settings();
        egui::TopBottomPanel::top("device_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                match self.devices.len() {
                    0 => {
                        ui.label("No cameras found");
                    }
                    1 => {
                        ui.label(&self.devices[0].label);
                    }
                    _ => {
                        let selected_text = self
                            .current_device()
                            .map(|d| d.label.clone())
                            .unwrap_or_default();
                        egui::ComboBox::from_id_salt("device_picker")
                            .selected_text(selected_text)
                            .show_ui(ui, |ui| {
                                for (idx, device) in self.devices.iter().enumerate() {
                                    let selected = self.selected == Some(idx);
                                    if ui.selectable_label(selected, &device.label).clicked() && !selected {
                                        actions.push(UiAction::SelectDevice(idx));
                                    }
                                }
                            });
                    }
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui
                        .selectable_label(settings.flip_vertical, "⬍")
                        .on_hover_text("Flip vertically")
                        .clicked()
                    {
                        actions.push(UiAction::ToggleFlipVertical);
                    }
                    if ui
                        .selectable_label(settings.flip_horizontal, "⬌")
                        .on_hover_text("Flip horizontally")
                        .clicked()
                    {
                        actions.push(UiAction::ToggleFlipHorizontal);
                    }
                });
            });
        });
    }

    fn bottom_bar(&self, ctx: &egui::Context, actions: &mut Vec<UiAction>) {
        let settings = self.current_settings();
        let video = self.video_size();
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if !video.is_empty() {
                    ui.label(video.to_string());
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("Download").clicked() {
                        actions.push(UiAction::Download);
                    }
                    if ui
                        .add_enabled(!video.is_empty(), egui::Button::new("Edit crop…"))
                        .clicked()
                    {
                        actions.push(UiAction::EditCrop);
                    }
                    if let Some(crop) = settings.crop_box {
                        if ui.selectable_label(settings.show_crop, "Crop").clicked() {
                            actions.push(UiAction::ToggleShowCrop);
                        }
                        ui.label(crop.to_string());
                        if ui.button("×").on_hover_text("Clear crop").clicked() {
                            actions.push(UiAction::ClearCrop);
                        }
                    }
                });
            });
        });
    }

    fn crop_dialog(&mut self, ctx: &egui::Context) {
        let video = self.video_size();
        let Some(form) = &mut self.crop_form else {
            return;
        };

        let mut submit = false;
        let mut close = false;
        egui::Window::new("Crop")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                egui::Grid::new("crop_form").num_columns(2).show(ui, |ui| {
                    for (label, field) in [
                        ("X", &mut form.x),
                        ("Y", &mut form.y),
                        ("Width", &mut form.width),
                        ("Height", &mut form.height),
                    ] {
                        ui.label(label);
                        let response = ui.add(egui::TextEdit::singleline(field).desired_width(80.0));
                        if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                            submit = true;
                        }
                        ui.end_row();
                    }
                });
                ui.label(format!("Frame: {}", video));
                ui.horizontal(|ui| {
                    if ui.button("Apply").clicked() {
                        submit = true;
                    }
                    if ui.button("Cancel").clicked() {
                        close = true;
                    }
                });
            });

        if submit {
            match form.submit(video) {
                Some(crop) => self.set_crop_box(Some(crop)),
                None => log::warn!("Frame {} is too small to crop", video),
            }
            close = true;
        }
        if close || ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            self.crop_form = None;
        }
    }

    fn handle_keyboard(&mut self, ctx: &egui::Context) {
        if self.crop_form.is_some() || ctx.wants_keyboard_input() {
            return;
        }
        if self.view.as_ref().is_some_and(|view| view.interaction.is_active()) {
            return;
        }
        let Some(crop) = self.current_settings().crop_box else {
            return;
        };
        let video = self.video_size();
        if video.is_empty() {
            return;
        }

        if let Some(nudge) = ctx.input(|i| arrow_nudge(i.modifiers, |key| i.key_pressed(key))) {
            self.set_crop_box(Some(crop.nudged(nudge.dx, nudge.dy, nudge.mode, video)));
        }
    }

    /// Device to reopen after its stream failed.
    fn retry_target(&self) -> Option<usize> {
        if self.camera.is_some() || self.last_error.is_none() {
            return None;
        }
        self.selected
    }

    fn no_video(&mut self, ui: &mut egui::Ui) {
        let message = match (&self.last_error, self.devices.is_empty()) {
            (Some(error), _) => error.clone(),
            (None, true) => "No camera found".to_string(),
            (None, false) => "No video".to_string(),
        };
        let retry = self.retry_target();

        let mut clicked = false;
        ui.vertical_centered(|ui| {
            ui.add_space(ui.available_height() / 2.0 - 24.0);
            ui.label(message);
            if retry.is_some() && ui.button("Retry").clicked() {
                clicked = true;
            }
        });

        if let Some(idx) = retry.filter(|_| clicked) {
            let ctx = ui.ctx().clone();
            self.select_device(idx, &ctx);
        }
    }

    fn video_area(&mut self, ui: &mut egui::Ui) {
        let container = ui.available_rect_before_wrap();
        let settings = self.current_settings();
        let video = self.video_size();

        if self.view.is_none() {
            self.no_video(ui);
            return;
        }
        let Some(view) = &mut self.view else {
            return;
        };

        let full_uv = egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0));

        if let Some(crop) = settings.crop_box.filter(|_| settings.show_crop) {
            let crop_size = VideoSize::new(crop.width(), crop.height());
            let geometry = DisplayGeometry::contain(container, crop_size.aspect_ratio());
            if let Some(texture) = view.preview.canvas_mut().texture(ui.ctx()) {
                ui.painter_at(container)
                    .image(texture.id(), geometry.rect(), full_uv, egui::Color32::WHITE);
            }
            return;
        }

        view.geometry = DisplayGeometry::contain(container, video.aspect_ratio());
        let geometry = view.geometry;
        let response = ui.allocate_rect(container, egui::Sense::drag());
        let painter = ui.painter_at(container);

        match view.source.canvas_mut().texture(ui.ctx()) {
            Some(texture) => {
                painter.image(texture.id(), geometry.rect(), full_uv, egui::Color32::WHITE);
            }
            None => {
                painter.text(
                    container.center(),
                    egui::Align2::CENTER_CENTER,
                    "Starting camera…",
                    egui::FontId::proportional(16.0),
                    egui::Color32::GRAY,
                );
                return;
            }
        }

        // Pointer input
        let mut pending = None;
        let pressed_button = [
            egui::PointerButton::Primary,
            egui::PointerButton::Secondary,
            egui::PointerButton::Middle,
        ]
        .into_iter()
        .find(|button| response.drag_started_by(*button));
        if let Some(button) = pressed_button {
            let origin = ui
                .input(|i| i.pointer.press_origin())
                .or(response.interact_pointer_pos());
            if let Some(pos) = origin {
                view.interaction
                    .pointer_down(pos, button, settings.crop_box, &geometry, video);
            }
        }
        if response.dragged() {
            if let Some(pos) = response.interact_pointer_pos() {
                pending = view.interaction.pointer_move(pos, &geometry, video);
            }
        }
        if response.drag_stopped() {
            view.interaction.pointer_up();
        }
        if let Some(pos) = response.hover_pos() {
            let icon = view
                .interaction
                .cursor_icon(pos, settings.crop_box, &geometry, video);
            ui.ctx().set_cursor_icon(icon);
        }

        let crop = pending.or(settings.crop_box);
        if pending.is_some() {
            self.set_crop_box(pending);
        }

        if let Some(crop) = crop {
            paint_crop_overlay(&painter, geometry, geometry.crop_to_display(crop, video));
        }
    }
}

/// Dims everything outside the crop and draws its border and grips.
fn paint_crop_overlay(painter: &egui::Painter, geometry: DisplayGeometry, crop_rect: egui::Rect) {
    let image_rect = geometry.rect();
    let overlay_color = egui::Color32::from_black_alpha(150);

    // Top
    painter.rect_filled(
        egui::Rect::from_min_max(image_rect.min, egui::pos2(image_rect.max.x, crop_rect.min.y)),
        0.0,
        overlay_color,
    );
    // Bottom
    painter.rect_filled(
        egui::Rect::from_min_max(egui::pos2(image_rect.min.x, crop_rect.max.y), image_rect.max),
        0.0,
        overlay_color,
    );
    // Left
    painter.rect_filled(
        egui::Rect::from_min_max(
            egui::pos2(image_rect.min.x, crop_rect.min.y),
            egui::pos2(crop_rect.min.x, crop_rect.max.y),
        ),
        0.0,
        overlay_color,
    );
    // Right
    painter.rect_filled(
        egui::Rect::from_min_max(
            egui::pos2(crop_rect.max.x, crop_rect.min.y),
            egui::pos2(image_rect.max.x, crop_rect.max.y),
        ),
        0.0,
        overlay_color,
    );

    painter.rect_stroke(crop_rect, 0.0, egui::Stroke::new(2.0, CROP_STROKE));

    let handle_stroke = egui::Stroke::new(1.0, egui::Color32::BLACK);
    for handle in Handle::ALL {
        painter.circle(
            handle.anchor(crop_rect),
            HANDLE_GRIP * 0.75,
            egui::Color32::WHITE,
            handle_stroke,
        );
    }
}

impl eframe::App for WebcamCropper {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_stream();
        self.tick_loops(ctx);

        let mut actions = Vec::new();
        self.top_bar(ctx, &mut actions);
        self.bottom_bar(ctx, &mut actions);
        for action in actions {
            self.apply(action, ctx);
        }

        self.crop_dialog(ctx);

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(egui::Color32::BLACK))
            .show(ctx, |ui| self.video_area(ui));

        self.handle_keyboard(ctx);
        self.flush_settings();
    }
}

impl Drop for WebcamCropper {
    fn drop(&mut self) {
        self.stop_stream();
        if let Err(e) = self.settings.flush() {
            log::error!("{}", e);
        }
    }
}
