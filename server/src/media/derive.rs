//! Image Derivation
//!
//! Resized previews, square thumbnails, orientation correction and the static
//! frame used to preview animated GIFs. All functions are pure over a decoded
//! [`Surface`] and return freshly encoded bytes.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

use super::codec::{encode, Surface};
use super::data_uri;
use super::error::MediaError;
use super::kind::ImageKind;

/// Default edge length of listing thumbnails.
pub const THUMBNAIL_SIZE: u32 = 32;

/// Frame used as the static stand-in for an animated source. Frame 0 is a
/// placeholder in uploaded GIFs.
pub const ANIMATED_PREVIEW_FRAME: usize = 1;

/// Catmull-Rom is the bicubic filter.
const BICUBIC: FilterType = FilterType::CatmullRom;

/// An encoded derived image.
#[derive(Debug, Clone)]
pub struct Derived {
    pub data: Vec<u8>,
    pub kind: ImageKind,
    pub width: u32,
    pub height: u32,
}

impl Derived {
    fn encode(image: &DynamicImage, kind: ImageKind) -> Result<Self, MediaError> {
        let (width, height) = image.dimensions();
        Ok(Self {
            data: encode(image, kind)?,
            kind,
            width,
            height,
        })
    }

    /// `data:image/<fmt>;base64,<payload>`
    pub fn to_data_uri(&self) -> String {
        data_uri::encode(self.kind.mime_type(), &self.data)
    }
}

/// Width that keeps the aspect ratio at `target_height`: `floor(W * T / H)`.
///
/// Integer arithmetic; never less than 1.
pub fn scaled_width(width: u32, height: u32, target_height: u32) -> u32 {
    let scaled = u64::from(width) * u64::from(target_height) / u64::from(height.max(1));
    u32::try_from(scaled).unwrap_or(u32::MAX).max(1)
}

/// Resize to `target_height` keeping the aspect ratio, re-encoded in the
/// source kind.
pub fn resize(surface: &Surface, target_height: u32) -> Result<Derived, MediaError> {
    let (width, height) = surface.dimensions();
    let target_height = target_height.max(1);
    let target_width = scaled_width(width, height, target_height);

    let resized = surface
        .primary()
        .resize_exact(target_width, target_height, BICUBIC);

    Derived::encode(&resized, surface.kind())
}

/// Where to scale and crop to get a centered `size` x `size` square.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SquareCrop {
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub x: u32,
    pub y: u32,
}

impl SquareCrop {
    /// Scale the short side to `size`, center the long side.
    pub fn plan(width: u32, height: u32, size: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);

        if height > width {
            let scaled_height = scaled_width(height, width, size).max(size);
            Self {
                scaled_width: size,
                scaled_height,
                x: 0,
                y: (scaled_height - size) / 2,
            }
        } else {
            let scaled_width = scaled_width(width, height, size).max(size);
            Self {
                scaled_width,
                scaled_height: size,
                x: (scaled_width - size) / 2,
                y: 0,
            }
        }
    }
}

/// Exact `size` x `size` thumbnail.
///
/// Animated sources use [`ANIMATED_PREVIEW_FRAME`] and always encode as PNG;
/// still images keep their own kind.
pub fn thumbnail(surface: &Surface, size: u32) -> Result<Derived, MediaError> {
    let size = size.max(1);
    let (source, kind) = if surface.kind().is_animated() {
        (animated_preview_frame(surface), ImageKind::Png)
    } else {
        (surface.primary(), surface.kind())
    };

    let (width, height) = source.dimensions();
    let plan = SquareCrop::plan(width, height, size);

    let cropped = source
        .resize_exact(plan.scaled_width, plan.scaled_height, BICUBIC)
        .crop_imm(plan.x, plan.y, size, size);

    Derived::encode(&cropped, kind)
}

/// Rotate 90 degrees counter-clockwise with the canvas expanded, so width
/// and height swap. Corrects EXIF orientation 8.
pub fn rotate90(surface: &Surface) -> Result<Derived, MediaError> {
    Derived::encode(&surface.primary().rotate270(), surface.kind())
}

/// Static PNG preview of an animated source.
pub fn first_animated_frame(surface: &Surface) -> Result<Derived, MediaError> {
    Derived::encode(animated_preview_frame(surface), ImageKind::Png)
}

/// Gallery preview: the static frame for animated sources, otherwise a
/// resize to `height`.
pub fn preview(surface: &Surface, height: u32) -> Result<Derived, MediaError> {
    if surface.kind().is_animated() {
        first_animated_frame(surface)
    } else {
        resize(surface, height)
    }
}

/// Frame 1, or the last frame of a source too short to have one.
fn animated_preview_frame(surface: &Surface) -> &DynamicImage {
    let index = ANIMATED_PREVIEW_FRAME.min(surface.frame_count() - 1);
    surface.frame(index).unwrap_or_else(|_| surface.primary())
}
