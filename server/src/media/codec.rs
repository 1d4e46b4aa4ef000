//! Image Codec
//!
//! Decodes raster bytes into a [`Surface`] (all frames for animated sources)
//! and encodes frames back to bytes. EXIF tags from the primary IFD are read
//! alongside and exposed as a JSON map.
//!
//! Decoding is CPU-bound and should be called inside `spawn_blocking`.

use std::collections::BTreeMap;
use std::io::Cursor;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, GenericImageView, ImageDecoder, ImageReader, Limits};

use super::error::MediaError;
use super::kind::ImageKind;
use crate::config::Config;

/// EXIF tag name to value, e.g. `{"Orientation": 8, "DateTime": "2023:07:26 10:53:00"}`.
pub type ExifMap = BTreeMap<String, serde_json::Value>;

/// EXIF orientation meaning "rotated 90 degrees the wrong way".
pub const ORIENTATION_ROTATED_LEFT: u16 = 8;

/// Size and dimension limits applied before and during decode.
#[derive(Debug, Clone, Copy)]
pub struct CodecLimits {
    pub max_processable_size: usize,
    pub max_image_dimension: u32,
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self::from(&Config::default_for_test())
    }
}

impl From<&Config> for CodecLimits {
    fn from(config: &Config) -> Self {
        Self {
            max_processable_size: config.max_processable_size,
            max_image_dimension: config.max_image_dimension,
        }
    }
}

impl CodecLimits {
    fn decoder_limits(self) -> Limits {
        let mut limits = Limits::default();
        limits.max_image_width = Some(self.max_image_dimension);
        limits.max_image_height = Some(self.max_image_dimension);
        limits
    }
}

/// A decoded raster image ready for pixel operations.
#[derive(Debug, Clone)]
pub struct Surface {
    kind: ImageKind,
    frames: Vec<DynamicImage>,
    exif: ExifMap,
}

impl Surface {
    /// Wrap an already decoded image as a single-frame surface.
    pub fn from_image(kind: ImageKind, image: DynamicImage) -> Self {
        Self {
            kind,
            frames: vec![image],
            exif: ExifMap::new(),
        }
    }

    pub const fn kind(&self) -> ImageKind {
        self.kind
    }

    /// Frame 0. Always present.
    pub fn primary(&self) -> &DynamicImage {
        &self.frames[0]
    }

    /// Dimensions of the primary frame.
    pub fn dimensions(&self) -> (u32, u32) {
        self.primary().dimensions()
    }

    /// Number of frames; 1 for still formats.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frame(&self, index: usize) -> Result<&DynamicImage, MediaError> {
        self.frames.get(index).ok_or(MediaError::FrameOutOfRange {
            index,
            count: self.frames.len(),
        })
    }

    /// Single-frame surface positioned at `index`.
    pub fn seek_frame(&self, index: usize) -> Result<Self, MediaError> {
        Ok(Self {
            kind: self.kind,
            frames: vec![self.frame(index)?.clone()],
            exif: self.exif.clone(),
        })
    }

    pub const fn exif(&self) -> &ExifMap {
        &self.exif
    }

    pub fn orientation(&self) -> Option<u16> {
        orientation_of(&self.exif)
    }

    pub fn date_time(&self) -> Option<&str> {
        date_time_of(&self.exif)
    }
}

/// Decode `bytes` as `kind`. GIFs keep every frame.
pub fn decode(bytes: &[u8], kind: ImageKind, limits: CodecLimits) -> Result<Surface, MediaError> {
    if bytes.len() > limits.max_processable_size {
        return Err(MediaError::TooLarge(bytes.len()));
    }

    let frames = match kind {
        ImageKind::Gif => decode_gif_frames(bytes, limits)?,
        ImageKind::Png | ImageKind::Jpeg => vec![decode_still(bytes, kind, limits)?],
    };

    Ok(Surface {
        kind,
        frames,
        exif: read_exif(bytes),
    })
}

fn decode_still(
    bytes: &[u8],
    kind: ImageKind,
    limits: CodecLimits,
) -> Result<DynamicImage, MediaError> {
    // Reader API enforces dimension limits before the pixel buffer is allocated
    let mut reader = ImageReader::with_format(Cursor::new(bytes), kind.format());
    reader.limits(limits.decoder_limits());

    reader
        .decode()
        .map_err(|e| MediaError::DecodeFailed(e.to_string()))
}

fn decode_gif_frames(bytes: &[u8], limits: CodecLimits) -> Result<Vec<DynamicImage>, MediaError> {
    let mut decoder =
        GifDecoder::new(Cursor::new(bytes)).map_err(|e| MediaError::DecodeFailed(e.to_string()))?;
    decoder
        .set_limits(limits.decoder_limits())
        .map_err(|e| MediaError::DecodeFailed(e.to_string()))?;

    let frames = decoder
        .into_frames()
        .collect_frames()
        .map_err(|e| MediaError::DecodeFailed(e.to_string()))?;

    if frames.is_empty() {
        return Err(MediaError::DecodeFailed("GIF contains no frames".into()));
    }

    Ok(frames
        .into_iter()
        .map(|frame| DynamicImage::ImageRgba8(frame.into_buffer()))
        .collect())
}

/// Encode one frame in `kind`'s format.
pub fn encode(image: &DynamicImage, kind: ImageKind) -> Result<Vec<u8>, MediaError> {
    let mut buf = Cursor::new(Vec::new());

    // JPEG has no alpha channel and the GIF encoder wants RGBA
    let result = match kind {
        ImageKind::Png => image.write_to(&mut buf, kind.format()),
        ImageKind::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()).write_to(&mut buf, kind.format()),
        ImageKind::Gif => {
            DynamicImage::ImageRgba8(image.to_rgba8()).write_to(&mut buf, kind.format())
        }
    };

    result.map_err(|e| MediaError::EncodeFailed(e.to_string()))?;
    Ok(buf.into_inner())
}

/// Read primary-IFD EXIF tags from a JPEG/PNG/TIFF container.
///
/// Returns an empty map when the blob carries no EXIF block.
pub fn read_exif(bytes: &[u8]) -> ExifMap {
    let Ok(exif) = exif::Reader::new().read_from_container(&mut Cursor::new(bytes)) else {
        return ExifMap::new();
    };

    exif.fields()
        .filter(|field| field.ifd_num == exif::In::PRIMARY)
        .filter(|field| field.tag.description().is_some())
        .map(|field| (field.tag.to_string(), field_value(field)))
        .collect()
}

/// Scalars become JSON numbers/strings (rationals as floats); everything else
/// uses the EXIF display form.
fn field_value(field: &exif::Field) -> serde_json::Value {
    use exif::Value;

    match &field.value {
        Value::Ascii(parts) => parts.first().map_or(serde_json::Value::Null, |part| {
            String::from_utf8_lossy(part)
                .trim_end_matches('\0')
                .to_string()
                .into()
        }),
        Value::Byte(v) if v.len() == 1 => v[0].into(),
        Value::Short(v) if v.len() == 1 => v[0].into(),
        Value::Long(v) if v.len() == 1 => v[0].into(),
        Value::SShort(v) if v.len() == 1 => v[0].into(),
        Value::SLong(v) if v.len() == 1 => v[0].into(),
        Value::Rational(v) if v.len() == 1 => v[0].to_f64().into(),
        Value::SRational(v) if v.len() == 1 => v[0].to_f64().into(),
        _ => field.display_value().to_string().into(),
    }
}

pub fn orientation_of(exif: &ExifMap) -> Option<u16> {
    exif.get("Orientation")
        .and_then(serde_json::Value::as_u64)
        .and_then(|v| u16::try_from(v).ok())
}

pub fn date_time_of(exif: &ExifMap) -> Option<&str> {
    exif.get("DateTime").and_then(serde_json::Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifEncoder;
    use image::{Delay, Frame, ImageFormat, Rgba, RgbaImage};

    fn create_test_png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::new_rgba8(width, height);
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn create_two_frame_gif(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut buf);
            let frames = [Rgba([0, 0, 255, 255]), Rgba([255, 0, 0, 255])].map(|color| {
                Frame::from_parts(
                    RgbaImage::from_pixel(width, height, color),
                    0,
                    0,
                    Delay::from_numer_denom_ms(100, 1),
                )
            });
            encoder.encode_frames(frames).unwrap();
        }
        buf
    }

    #[test]
    fn test_decode_png_single_frame() {
        let surface = decode(&create_test_png(40, 30), ImageKind::Png, CodecLimits::default())
            .unwrap();

        assert_eq!(surface.dimensions(), (40, 30));
        assert_eq!(surface.frame_count(), 1);
        assert!(surface.exif().is_empty());
        assert_eq!(surface.orientation(), None);
    }

    #[test]
    fn test_decode_gif_keeps_frames() {
        let surface =
            decode(&create_two_frame_gif(8, 6), ImageKind::Gif, CodecLimits::default()).unwrap();

        assert_eq!(surface.frame_count(), 2);
        assert_eq!(surface.dimensions(), (8, 6));

        let second = surface.seek_frame(1).unwrap();
        assert_eq!(second.frame_count(), 1);
        let pixel = second.primary().to_rgba8().get_pixel(3, 3).0;
        assert!(pixel[0] > 200 && pixel[2] < 50, "frame 1 is red, got {pixel:?}");
    }

    #[test]
    fn test_seek_past_end() {
        let surface = decode(&create_test_png(4, 4), ImageKind::Png, CodecLimits::default())
            .unwrap();
        assert!(matches!(
            surface.seek_frame(1),
            Err(MediaError::FrameOutOfRange { index: 1, count: 1 })
        ));
    }

    #[test]
    fn test_corrupt_bytes_fail_decode() {
        let err = decode(b"\x89PNG garbage", ImageKind::Png, CodecLimits::default());
        assert!(matches!(err, Err(MediaError::DecodeFailed(_))));
    }

    #[test]
    fn test_too_large_rejected_before_decode() {
        let limits = CodecLimits {
            max_processable_size: 16,
            max_image_dimension: 16384,
        };
        let err = decode(&create_test_png(10, 10), ImageKind::Png, limits);
        assert!(matches!(err, Err(MediaError::TooLarge(_))));
    }

    #[test]
    fn test_dimension_limit_enforced() {
        let limits = CodecLimits {
            max_processable_size: usize::MAX,
            max_image_dimension: 50,
        };
        let err = decode(&create_test_png(100, 10), ImageKind::Png, limits);
        assert!(matches!(err, Err(MediaError::DecodeFailed(_))));
    }

    #[test]
    fn test_encode_jpeg_from_rgba() {
        let img = DynamicImage::new_rgba8(12, 12);
        let bytes = encode(&img, ImageKind::Jpeg).unwrap();
        assert_eq!(&bytes[..2], b"\xff\xd8");
    }

    #[test]
    fn test_read_exif_from_non_exif_blob() {
        assert!(read_exif(b"just text").is_empty());
        assert!(read_exif(&create_test_png(2, 2)).is_empty());
    }

    #[test]
    fn test_exif_accessors() {
        let mut exif = ExifMap::new();
        exif.insert("Orientation".into(), 8.into());
        exif.insert("DateTime".into(), "2023:07:26 10:53:00".into());

        assert_eq!(orientation_of(&exif), Some(ORIENTATION_ROTATED_LEFT));
        assert_eq!(date_time_of(&exif), Some("2023:07:26 10:53:00"));
    }
}
