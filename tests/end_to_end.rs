//! End-to-end conversions through the public API with the real image backend.
//!
//! Each test builds its input with the `image` encoders, runs it through the
//! queue and scheduler, and inspects the encoded output.

use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage, Rgba, RgbaImage};
use pixel_convert::batch::BatchScheduler;
use pixel_convert::imaging::{Converter, RustBackend, SearchOutcome};
use pixel_convert::package;
use pixel_convert::queue::{IncomingFile, ItemStatus, Queue};
use pixel_convert::settings::{
    ConversionSettings, OutputFormat, ResizeFit, ResizeMode, SettingsPatch, SizeUnit,
};
use std::io::{Cursor, Read};

fn jpeg(width: u32, height: u32) -> Vec<u8> {
    // Pseudo-random noise so JPEG sizes respond to quality
    let mut seed: u32 = 0x9e37_79b9;
    let img = RgbImage::from_fn(width, height, |x, y| {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        Rgb([(x % 256) as u8, (y % 256) as u8, (seed & 0xff) as u8])
    });
    let mut buf = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, 92)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

/// Square PNG in three horizontal bands: red top quarter, green middle half,
/// blue bottom quarter.
fn banded_png(size: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(size, size, |_, y| {
        if y < size / 4 {
            Rgba([255, 0, 0, 255])
        } else if y < size * 3 / 4 {
            Rgba([0, 255, 0, 255])
        } else {
            Rgba([0, 0, 255, 255])
        }
    });
    let mut buf = Vec::new();
    image::codecs::png::PngEncoder::new(&mut buf)
        .write_image(img.as_raw(), size, size, ExtendedColorType::Rgba8)
        .unwrap();
    buf
}

fn file(name: &str, mime: &str, bytes: Vec<u8>) -> IncomingFile {
    IncomingFile {
        name: name.to_string(),
        mime: Some(mime.to_string()),
        bytes,
    }
}

fn run(queue: &Queue) {
    let converter = Converter::new(RustBackend::new());
    queue.populate_dimensions(converter.backend());
    BatchScheduler::new(2).run(queue, &converter, None).unwrap();
}

fn run_with(queue: &Queue, patch: &SettingsPatch) {
    let converter = Converter::new(RustBackend::new());
    queue.populate_dimensions(converter.backend());
    queue.update_settings(patch);
    BatchScheduler::new(2).run(queue, &converter, None).unwrap();
}

#[test]
fn jpeg_to_webp_at_original_size() {
    let mut defaults = ConversionSettings::initial();
    defaults.output_format = OutputFormat::Webp;
    defaults.resize_mode = ResizeMode::None;
    let queue = Queue::new(defaults);
    queue.add_files(vec![file("photo.jpg", "image/jpeg", jpeg(800, 600))]);

    run(&queue);

    let item = &queue.items()[0];
    assert_eq!(item.status(), ItemStatus::Done);
    let out = item.output().unwrap();
    assert_eq!(out.mime(), "image/webp");
    assert!(out.size() > 0);
    assert_eq!((out.width, out.height), (800, 600));

    let artifact = package::download_one(item).unwrap();
    assert_eq!(artifact.file_name, "photo.webp");
    assert_eq!(artifact.mime, "image/webp");
}

#[test]
fn fixed_cover_crops_the_centered_band() {
    let queue = Queue::new(ConversionSettings::initial());
    queue.add_files(vec![file("square.png", "image/png", banded_png(1000))]);

    run_with(
        &queue,
        &SettingsPatch {
            output_format: Some(OutputFormat::Png),
            resize_mode: Some(ResizeMode::Fixed),
            resize_width: Some(500),
            resize_height: Some(250),
            resize_fit: Some(ResizeFit::Cover),
            ..SettingsPatch::default()
        },
    );

    let item = &queue.items()[0];
    assert_eq!(item.status(), ItemStatus::Done, "{:?}", item.error());
    let out = item.output().unwrap();
    let decoded = image::load_from_memory(&out.bytes).unwrap().to_rgba8();
    assert_eq!((decoded.width(), decoded.height()), (500, 250));

    // Scale 0.5 covers the width exactly, so the crop is source rows
    // 250..750: only the green band, edge to edge.
    for (x, y, pixel) in decoded.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        assert!(
            r <= 8 && g >= 247 && b <= 8 && a == 255,
            "pixel ({x}, {y}) is {:?}",
            pixel.0
        );
    }
}

#[test]
fn target_size_is_met_or_reported_unattainable() {
    let mut defaults = ConversionSettings::initial();
    defaults.output_format = OutputFormat::Jpg;
    defaults.resize_mode = ResizeMode::None;
    defaults.target_file_size = Some(50.0);
    defaults.target_file_size_unit = SizeUnit::Kb;
    let queue = Queue::new(defaults);
    queue.add_files(vec![file("big.jpg", "image/jpeg", jpeg(1200, 900))]);

    run(&queue);

    let item = &queue.items()[0];
    assert_eq!(item.status(), ItemStatus::Done, "{:?}", item.error());
    let out = item.output().unwrap();
    assert_eq!(out.mime(), "image/jpeg");
    assert!(out.derived_quality.is_some());
    assert!(
        out.size() <= 51_200 || out.search == Some(SearchOutcome::Unattainable),
        "{} bytes with outcome {:?}",
        out.size(),
        out.search
    );
}

#[test]
fn corrupt_file_fails_alone_and_is_left_out_of_archive() {
    let mut defaults = ConversionSettings::initial();
    defaults.output_format = OutputFormat::Png;
    let queue = Queue::new(defaults);
    queue.add_files(vec![
        file("good.jpg", "image/jpeg", jpeg(64, 48)),
        file("broken.jpg", "image/jpeg", b"definitely not a jpeg".to_vec()),
    ]);

    run(&queue);

    let items = queue.items();
    assert_eq!(items[0].status(), ItemStatus::Done);
    assert_eq!(items[1].status(), ItemStatus::Error);
    assert!(!items[1].error().unwrap().is_empty());

    let archive = package::download_all(&items, "converted-images.zip").unwrap();
    assert_eq!(archive.mime, "application/zip");
    let mut zip = zip::ZipArchive::new(Cursor::new(archive.bytes)).unwrap();
    assert_eq!(zip.len(), 1);
    let mut entry = zip.by_name("good.png").unwrap();
    let mut contents = Vec::new();
    entry.read_to_end(&mut contents).unwrap();
    assert_eq!(contents, items[0].output().unwrap().bytes);
}
