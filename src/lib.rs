//! Live webcam viewer with a persistent, editable crop region.

pub mod app;
pub mod camera;
pub mod config;
pub mod crop;
pub mod export;
pub mod geometry;
pub mod interaction;
pub mod render;
pub mod settings;

pub use app::WebcamCropper;
pub use config::AppConfig;
