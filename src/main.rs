#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // hide console window on Windows in release

use eframe::egui;
use webcam_cropper::{AppConfig, WebcamCropper};

fn main() -> eframe::Result {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Webcam Cropper v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 720.0])
            .with_min_inner_size([480.0, 320.0])
            .with_title("Webcam Cropper"),
        ..Default::default()
    };

    eframe::run_native(
        "Webcam Cropper",
        options,
        Box::new(|cc| Ok(Box::new(WebcamCropper::new(cc, config)))),
    )
}
