//! Camera capture module
//!
//! Enumerates cameras and captures frames with nokhwa on a background
//! thread. The render loop picks up the latest frame on each tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use image::RgbaImage;
use nokhwa::Camera;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use parking_lot::Mutex;

use crate::geometry::VideoSize;

/// Frame rate asked for alongside the ideal resolution.
const IDEAL_FPS: u32 = 30;

/// Consecutive `frame()` errors after which the device counts as gone.
const MAX_CAPTURE_FAILURES: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CameraError {
    #[error("Camera access was denied for '{device}': {reason}")]
    PermissionDenied { device: String, reason: String },

    #[error("Camera '{device}' is unavailable: {reason}")]
    DeviceUnavailable { device: String, reason: String },

    #[error("Failed to start stream on '{device}': {reason}")]
    Stream { device: String, reason: String },

    #[error("Failed to spawn capture thread: {0}")]
    Thread(String),
}

impl CameraError {
    /// Sorts an open failure into denied vs unavailable by its message.
    fn from_open_failure(device: &str, err: &nokhwa::NokhwaError) -> Self {
        let reason = err.to_string();
        let lowered = reason.to_lowercase();
        if lowered.contains("permission")
            || lowered.contains("denied")
            || lowered.contains("not authorized")
        {
            CameraError::PermissionDenied {
                device: device.to_string(),
                reason,
            }
        } else {
            CameraError::DeviceUnavailable {
                device: device.to_string(),
                reason,
            }
        }
    }
}

/// Camera frame data
pub struct CameraFrame {
    /// RGBA pixel data
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Frame number
    pub frame_number: u64,
}

impl CameraFrame {
    pub fn size(&self) -> VideoSize {
        VideoSize::new(self.width, self.height)
    }

    /// Copies the pixel data into an image, `None` if it does not match the
    /// dimensions.
    pub fn to_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
    }
}

/// Information about an available camera
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraInfo {
    /// Camera index
    pub index: u32,
    /// Human readable name
    pub label: String,
    /// Stable identity for settings; backend device id when known
    pub key: String,
}

impl CameraInfo {
    pub fn new(index: u32, label: impl Into<String>, misc: &str) -> Self {
        let label = label.into();
        let label = if label.trim().is_empty() {
            format!("Camera {}", index)
        } else {
            label
        };
        let key = if misc.trim().is_empty() {
            label.clone()
        } else {
            format!("{}#{}", label, misc.trim())
        };
        Self { index, label, key }
    }
}

/// List available cameras
pub fn list_cameras() -> Vec<CameraInfo> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(camera_list) => camera_list
            .iter()
            .enumerate()
            .map(|(idx, info)| CameraInfo::new(idx as u32, info.human_name(), &info.misc()))
            .collect(),
        Err(e) => {
            log::warn!("Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

/// Index of the device whose label matches `preferred`, else the first one.
pub fn preferred_index(devices: &[CameraInfo], preferred: Option<&str>) -> Option<usize> {
    if devices.is_empty() {
        return None;
    }
    preferred
        .and_then(|label| devices.iter().position(|d| d.label == label))
        .or(Some(0))
}

/// Lifecycle of a capture stream as seen from the UI thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamStatus {
    Starting,
    Live(VideoSize),
    Failed(CameraError),
    Stopped,
}

/// Latest decoded frames, triple buffered. Readers share a frame instead
/// of copying its pixels.
#[derive(Default)]
struct FrameSlots {
    slots: [Mutex<Option<Arc<CameraFrame>>>; 3],
    /// Index of the latest complete frame
    latest: AtomicU64,
    /// Frames published so far
    count: AtomicU64,
}

impl FrameSlots {
    fn publish(&self, frame: CameraFrame) {
        let idx = self.count.load(Ordering::Relaxed);
        *self.slots[(idx % 3) as usize].lock() = Some(Arc::new(frame));
        self.latest.store(idx, Ordering::Release);
        self.count.store(idx.wrapping_add(1), Ordering::Release);
    }

    fn latest(&self) -> Option<Arc<CameraFrame>> {
        if self.count.load(Ordering::Acquire) == 0 {
            return None;
        }
        let idx = self.latest.load(Ordering::Acquire);
        self.slots[(idx % 3) as usize].lock().clone()
    }

    fn next_frame_number(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// Camera capture interface
pub struct CameraCapture {
    /// Device being captured
    device: CameraInfo,
    frames: Arc<FrameSlots>,
    /// Whether capture is running
    running: Arc<AtomicBool>,
    /// Reported by the capture thread
    status: Arc<Mutex<StreamStatus>>,
    /// Capture thread handle
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl CameraCapture {
    /// Starts capturing from `device`, asking for `ideal_width` at 16:9.
    ///
    /// The device itself is opened on the capture thread; open failures
    /// show up in [`CameraCapture::status`].
    pub fn open(device: &CameraInfo, ideal_width: u32) -> Result<Self, CameraError> {
        let frames = Arc::new(FrameSlots::default());
        let running = Arc::new(AtomicBool::new(true));
        let status = Arc::new(Mutex::new(StreamStatus::Starting));

        let shared = CaptureShared {
            frames: frames.clone(),
            running: running.clone(),
            status: status.clone(),
        };
        let thread_device = device.clone();

        let thread_handle = std::thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || capture_thread(thread_device, ideal_width, shared))
            .map_err(|e| CameraError::Thread(e.to_string()))?;

        Ok(Self {
            device: device.clone(),
            frames,
            running,
            status,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn device(&self) -> &CameraInfo {
        &self.device
    }

    /// Latest captured frame, shared with the capture thread.
    pub fn latest_frame(&self) -> Option<Arc<CameraFrame>> {
        self.frames.latest()
    }

    pub fn status(&self) -> StreamStatus {
        self.status.lock().clone()
    }

    /// Stop capturing and release the device
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("Camera capture thread for '{}' panicked", self.device.label);
            }
            let mut status = self.status.lock();
            if !matches!(*status, StreamStatus::Failed(_)) {
                *status = StreamStatus::Stopped;
            }
        }
    }
}

impl Drop for CameraCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State shared between [`CameraCapture`] and its thread.
struct CaptureShared {
    frames: Arc<FrameSlots>,
    running: Arc<AtomicBool>,
    status: Arc<Mutex<StreamStatus>>,
}

/// Run of consecutive capture errors.
#[derive(Debug, Default)]
struct FailureStreak {
    count: u32,
}

impl FailureStreak {
    /// Counts one error. Returns `true` once the device should be given up.
    fn record(&mut self) -> bool {
        self.count += 1;
        self.count >= MAX_CAPTURE_FAILURES
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

impl CaptureShared {
    fn fail(&self, error: CameraError) {
        log::error!("{}", error);
        *self.status.lock() = StreamStatus::Failed(error);
        self.running.store(false, Ordering::Release);
    }
}

/// Opens the camera, preferring the format closest to the ideal width.
fn open_camera(device: &CameraInfo, ideal_width: u32) -> Result<Camera, CameraError> {
    let index = CameraIndex::Index(device.index);
    let ideal = CameraFormat::new(
        Resolution::new(ideal_width, ideal_width * 9 / 16),
        FrameFormat::MJPEG,
        IDEAL_FPS,
    );

    let attempts = [
        RequestedFormatType::Closest(ideal),
        RequestedFormatType::AbsoluteHighestResolution,
        RequestedFormatType::None,
    ];

    let mut last_error = None;
    for attempt in attempts {
        let described = format!("{:?}", attempt);
        let requested = RequestedFormat::new::<RgbAFormat>(attempt);
        match Camera::new(index.clone(), requested) {
            Ok(camera) => return Ok(camera),
            Err(e) => {
                log::warn!("Failed to open '{}' with {}: {}", device.label, described, e);
                last_error = Some(e);
            }
        }
    }

    Err(match last_error {
        Some(e) => CameraError::from_open_failure(&device.label, &e),
        None => CameraError::DeviceUnavailable {
            device: device.label.clone(),
            reason: "no format accepted".to_string(),
        },
    })
}

/// Camera capture thread
fn capture_thread(device: CameraInfo, ideal_width: u32, shared: CaptureShared) {
    log::info!("Starting camera capture thread ({})", device.label);

    let mut camera = match open_camera(&device, ideal_width) {
        Ok(camera) => camera,
        Err(e) => {
            shared.fail(e);
            return;
        }
    };

    if let Err(e) = camera.open_stream() {
        shared.fail(CameraError::Stream {
            device: device.label.clone(),
            reason: e.to_string(),
        });
        return;
    }

    let resolution = camera.resolution();
    let size = VideoSize::new(resolution.width(), resolution.height());
    log::info!("Camera opened: {} ({})", device.label, size);
    *shared.status.lock() = StreamStatus::Live(size);

    let mut failures = FailureStreak::default();

    while shared.running.load(Ordering::Acquire) {
        match camera.frame() {
            Ok(frame) => {
                failures.reset();
                match frame.decode_image::<RgbAFormat>() {
                    Ok(image) => {
                        let (width, height) = image.dimensions();
                        shared.frames.publish(CameraFrame {
                            data: image.into_raw(),
                            width,
                            height,
                            frame_number: shared.frames.next_frame_number(),
                        });
                    }
                    Err(e) => {
                        log::warn!("Failed to decode frame: {:?}", e);
                    }
                }
            }
            Err(e) => {
                if failures.record() {
                    shared.fail(CameraError::DeviceUnavailable {
                        device: device.label.clone(),
                        reason: format!("{} capture errors in a row, last: {}", failures.count, e),
                    });
                    break;
                }
                log::warn!("Failed to capture frame: {:?}", e);
                std::thread::sleep(std::time::Duration::from_millis(10));
            }
        }
    }

    if let Err(e) = camera.stop_stream() {
        log::warn!("Failed to stop stream on '{}': {:?}", device.label, e);
    }
    log::info!("Camera capture thread stopped ({})", device.label);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices() -> Vec<CameraInfo> {
        vec![
            CameraInfo::new(0, "Integrated Camera", "/dev/video0"),
            CameraInfo::new(1, "USB Capture", ""),
        ]
    }

    #[test]
    fn key_falls_back_to_label() {
        let devices = devices();
        assert_eq!(devices[0].key, "Integrated Camera#/dev/video0");
        assert_eq!(devices[1].key, "USB Capture");
        assert_eq!(CameraInfo::new(3, "  ", "").label, "Camera 3");
    }

    #[test]
    fn preferred_label_wins_over_first_device() {
        let devices = devices();
        assert_eq!(preferred_index(&devices, Some("USB Capture")), Some(1));
        assert_eq!(preferred_index(&devices, Some("Unplugged")), Some(0));
        assert_eq!(preferred_index(&devices, None), Some(0));
        assert_eq!(preferred_index(&[], Some("USB Capture")), None);
    }

    fn blank_frame(frame_number: u64) -> CameraFrame {
        CameraFrame {
            data: vec![0; 16],
            width: 2,
            height: 2,
            frame_number,
        }
    }

    #[test]
    fn frame_with_short_buffer_is_rejected() {
        let frame = CameraFrame {
            data: vec![0; 10],
            ..blank_frame(0)
        };
        assert_eq!(frame.size(), VideoSize::new(2, 2));
        assert!(frame.to_image().is_none());
    }

    #[test]
    fn readers_share_the_latest_frame() {
        let slots = FrameSlots::default();
        assert!(slots.latest().is_none());

        for n in 0..5 {
            assert_eq!(slots.next_frame_number(), n);
            slots.publish(blank_frame(n));
        }
        let first = slots.latest().unwrap();
        let second = slots.latest().unwrap();
        assert_eq!(first.frame_number, 4);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn streak_gives_up_only_on_consecutive_errors() {
        let mut streak = FailureStreak::default();
        for _ in 1..MAX_CAPTURE_FAILURES {
            assert!(!streak.record());
        }
        streak.reset();
        for _ in 1..MAX_CAPTURE_FAILURES {
            assert!(!streak.record());
        }
        assert!(streak.record());
    }

    #[test]
    fn repeated_capture_errors_fail_the_stream() {
        let shared = CaptureShared {
            frames: Arc::new(FrameSlots::default()),
            running: Arc::new(AtomicBool::new(true)),
            status: Arc::new(Mutex::new(StreamStatus::Live(VideoSize::new(2, 2)))),
        };
        shared.fail(CameraError::DeviceUnavailable {
            device: "USB Capture".into(),
            reason: "unplugged".into(),
        });
        assert!(!shared.running.load(Ordering::Acquire));
        assert!(matches!(*shared.status.lock(), StreamStatus::Failed(_)));
    }

    #[test]
    fn errors_read_naturally() {
        let err = CameraError::DeviceUnavailable {
            device: "USB Capture".into(),
            reason: "busy".into(),
        };
        assert_eq!(err.to_string(), "Camera 'USB Capture' is unavailable: busy");
    }
}
