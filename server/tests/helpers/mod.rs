//! Reusable test helpers for file service integration tests.
//!
//! Builds in-memory images (including JPEGs carrying an EXIF block) and a
//! `FileService` over a `MemoryStore`.
#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;

use image::codecs::gif::GifEncoder;
use image::{DynamicImage, Frame, ImageFormat, Rgba, RgbaImage};
use storagesaver::config::Config;
use storagesaver::files::{FileService, MemoryStore, OwnerId, UploadRequest};
use storagesaver::media::{ContentSniffer, TypesTable};

pub const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
pub const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

/// Service over a fresh in-memory store, with the store handle for inspection.
pub fn service_with(config: Config) -> (Arc<MemoryStore>, FileService) {
    let store = Arc::new(MemoryStore::new());
    let service = FileService::new(
        store.clone(),
        ContentSniffer::new(TypesTable::bundled()),
        config,
    );
    (store, service)
}

pub fn service() -> (Arc<MemoryStore>, FileService, OwnerId) {
    let (store, service) = service_with(Config::default_for_test());
    (store, service, OwnerId::new())
}

pub fn upload_request(name: &str, data: Vec<u8>) -> UploadRequest {
    UploadRequest {
        name: name.to_string(),
        data: data.into(),
        overwrite: false,
        allow_images: true,
    }
}

fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

pub fn create_test_png(width: u32, height: u32) -> Vec<u8> {
    encode(&DynamicImage::new_rgba8(width, height), ImageFormat::Png)
}

pub fn create_test_jpeg(width: u32, height: u32) -> Vec<u8> {
    encode(&DynamicImage::new_rgb8(width, height), ImageFormat::Jpeg)
}

/// Two-frame GIF: a blue placeholder frame, then a red one.
pub fn create_two_frame_gif(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut buf);
        encoder
            .encode_frames([BLUE, RED].map(|color| Frame::new(RgbaImage::from_pixel(width, height, color))))
            .unwrap();
    }
    buf
}

/// JPEG with an APP1 EXIF block holding `Orientation` and `DateTime`.
pub fn create_test_jpeg_with_exif(
    width: u32,
    height: u32,
    orientation: u16,
    date_time: &str,
) -> Vec<u8> {
    assert_eq!(date_time.len(), 19, "EXIF DateTime is YYYY:MM:DD HH:MM:SS");

    // Little-endian TIFF: header, IFD0 with two entries, then the DateTime string.
    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"II*\0");
    tiff.extend_from_slice(&8u32.to_le_bytes());

    tiff.extend_from_slice(&2u16.to_le_bytes());
    // Orientation: SHORT, count 1, inline value
    tiff.extend_from_slice(&0x0112u16.to_le_bytes());
    tiff.extend_from_slice(&3u16.to_le_bytes());
    tiff.extend_from_slice(&1u32.to_le_bytes());
    tiff.extend_from_slice(&orientation.to_le_bytes());
    tiff.extend_from_slice(&[0, 0]);
    // DateTime: ASCII, count 20, at offset 38
    tiff.extend_from_slice(&0x0132u16.to_le_bytes());
    tiff.extend_from_slice(&2u16.to_le_bytes());
    tiff.extend_from_slice(&20u32.to_le_bytes());
    tiff.extend_from_slice(&38u32.to_le_bytes());
    // No next IFD
    tiff.extend_from_slice(&0u32.to_le_bytes());

    assert_eq!(tiff.len(), 38);
    tiff.extend_from_slice(date_time.as_bytes());
    tiff.push(0);

    let mut app1 = vec![0xFF, 0xE1];
    let length = u16::try_from(2 + 6 + tiff.len()).unwrap();
    app1.extend_from_slice(&length.to_be_bytes());
    app1.extend_from_slice(b"Exif\0\0");
    app1.extend_from_slice(&tiff);

    let jpeg = create_test_jpeg(width, height);
    let mut out = Vec::with_capacity(jpeg.len() + app1.len());
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&app1);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// Decode a `data:` URI payload into an image.
pub fn image_from_data_uri(uri: &str) -> DynamicImage {
    let bytes = storagesaver::media::data_uri::decode(uri).unwrap();
    image::load_from_memory(&bytes).unwrap()
}
