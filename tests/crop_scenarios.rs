use eframe::egui;
use webcam_cropper::crop::{CropBox, CropForm, Handle, MIN_CROP_SIZE};
use webcam_cropper::geometry::{DisplayGeometry, VideoSize};
use webcam_cropper::interaction::{CropInteraction, Gesture};
use webcam_cropper::render::{Flip, sample_region};

const FHD: VideoSize = VideoSize::new(1920, 1080);

fn half_scale_view() -> DisplayGeometry {
    DisplayGeometry::contain(
        egui::Rect::from_min_size(egui::Pos2::ZERO, egui::vec2(960.0, 540.0)),
        FHD.aspect_ratio(),
    )
}

#[test]
fn drag_on_empty_view_creates_box_in_source_pixels() {
    let geometry = half_scale_view();
    let mut interaction = CropInteraction::default();

    assert!(interaction.pointer_down(
        egui::pos2(100.0, 100.0),
        egui::PointerButton::Primary,
        None,
        &geometry,
        FHD,
    ));
    assert!(matches!(interaction.gesture(), Gesture::Creating { .. }));

    let crop = interaction.pointer_move(egui::pos2(300.0, 200.0), &geometry, FHD);
    assert_eq!(crop, Some(CropBox::new(200, 200, 600, 400)));
    assert!(interaction.pointer_up());
    assert_eq!(interaction.gesture(), Gesture::Idle);
}

#[test]
fn secondary_button_never_starts_a_gesture() {
    let geometry = half_scale_view();
    let mut interaction = CropInteraction::default();
    assert!(!interaction.pointer_down(
        egui::pos2(100.0, 100.0),
        egui::PointerButton::Secondary,
        None,
        &geometry,
        FHD,
    ));
    assert_eq!(interaction.pointer_move(egui::pos2(300.0, 200.0), &geometry, FHD), None);
}

#[test]
fn top_left_handle_grows_and_stops_at_minimum_size() {
    let crop = CropBox::new(100, 100, 300, 300);

    let grown = crop.resized(Handle::TopLeft, egui::vec2(-50.0, -50.0), FHD);
    assert_eq!(grown, CropBox::new(50, 50, 300, 300));

    let squeezed = crop.resized(Handle::TopLeft, egui::vec2(500.0, 500.0), FHD);
    assert_eq!(squeezed, CropBox::new(284, 284, 300, 300));
    assert_eq!(squeezed.width(), MIN_CROP_SIZE);
}

#[test]
fn dragging_top_left_handle_through_the_view() {
    let geometry = half_scale_view();
    let crop = CropBox::new(100, 100, 300, 300);
    let corner = geometry.crop_to_display(crop, FHD).min;

    let mut interaction = CropInteraction::default();
    interaction.pointer_down(corner, egui::PointerButton::Primary, Some(crop), &geometry, FHD);
    assert!(matches!(
        interaction.gesture(),
        Gesture::Resizing {
            handle: Handle::TopLeft,
            ..
        }
    ));

    // 25 display points is 50 source pixels at this scale.
    let moved = interaction.pointer_move(corner - egui::vec2(25.0, 25.0), &geometry, FHD);
    assert_eq!(moved, Some(CropBox::new(50, 50, 300, 300)));
}

#[test]
fn form_entry_inside_frame_is_kept() {
    let form = CropForm {
        x: "10".into(),
        y: "10".into(),
        width: "20".into(),
        height: "20".into(),
    };
    assert_eq!(
        form.submit(VideoSize::new(100, 100)),
        Some(CropBox::new(10, 10, 30, 30))
    );
}

#[test]
fn moved_box_always_stays_inside_and_keeps_size() {
    let crop = CropBox::new(400, 300, 900, 700);
    for dx in [-5000.0, -401.0, -1.5, 0.0, 7.0, 1019.0, 1021.0, 9000.0] {
        for dy in [-5000.0, -300.0, 0.0, 379.0, 381.0, 9000.0] {
            let moved = crop.moved_by(egui::vec2(dx, dy), FHD);
            assert_eq!(moved.width(), crop.width(), "dx={dx} dy={dy}");
            assert_eq!(moved.height(), crop.height(), "dx={dx} dy={dy}");
            assert!(moved.max_x <= FHD.width && moved.max_y <= FHD.height);
        }
    }
}

#[test]
fn source_display_round_trip_within_a_pixel() {
    let geometry = DisplayGeometry::contain(
        egui::Rect::from_min_size(egui::pos2(13.0, 57.0), egui::vec2(1017.0, 733.0)),
        FHD.aspect_ratio(),
    );
    for (x, y) in [(0.0, 0.0), (1919.0, 1079.0), (640.0, 360.0), (1.0, 1077.0)] {
        let source = egui::pos2(x, y);
        let back = geometry.display_to_source(geometry.source_to_display(source, FHD), FHD);
        assert!((back.x - x).abs() <= 1.0 && (back.y - y).abs() <= 1.0);
    }
}

#[test]
fn flips_compose_like_rotations() {
    let image = image::RgbaImage::from_fn(7, 5, |x, y| image::Rgba([x as u8, y as u8, 0, 255]));

    let mut twice = image.clone();
    Flip::new(true, false).apply(&mut twice);
    Flip::new(true, false).apply(&mut twice);
    assert_eq!(twice, image);

    let mut both = image.clone();
    Flip::new(true, true).apply(&mut both);
    assert_eq!(both, image::imageops::rotate180(&image));

    assert_eq!(
        Flip::new(true, false).then(Flip::new(false, true)),
        Flip::new(false, true).then(Flip::new(true, false))
    );
}

#[test]
fn preview_buffer_matches_crop_size() {
    let image = image::RgbaImage::from_fn(64, 48, |x, y| image::Rgba([x as u8, y as u8, 9, 255]));
    let crop = CropBox::new(10, 12, 42, 40);
    let preview = sample_region(&image, crop).unwrap();
    assert_eq!(preview.dimensions(), (32, 28));
    assert_eq!(preview.get_pixel(0, 0).0, [10, 12, 9, 255]);
    assert_eq!(preview.get_pixel(31, 27).0, [41, 39, 9, 255]);
}
