//! Image preprocessing for classifier input.
//!
//! Turns an arbitrary uploaded image into a `[1, S, S, 3]` tensor (NHWC, batch of
//! one) normalized to the range the consuming model declares.
//!
//! Pipeline flow:
//! 1. Validate bytes (size bounds)
//! 2. Decode image
//! 3. Reject images below the configured minimum dimension
//! 4. `orientation.correct()` — fix EXIF rotation
//! 5. Pre-downscale oversized inputs
//! 6. Convert to RGB and stretch-resize to `S×S` (bilinear)
//! 7. `tensorize()` — normalize to `f32` and add the batch dimension
//!
//! **Stretch-to-fit**: step 6 does not preserve aspect ratio and never crops.
//! Non-square images are distorted; the classifiers were trained on square crops,
//! so accuracy on very elongated inputs is not representative.
//!
//! Steps 1-6 (`prepare`) run before any model is consulted, so an invalid upload
//! never triggers a model fetch. Step 7 runs once the model's input range is known.

use std::borrow::Cow;
use std::io::Cursor;

use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbImage};
use thiserror::Error;
use tracing::debug;

use crate::config;
use crate::tensor::{BufferTracker, InputRange, TensorBuffer, TensorError};

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

/// Maximum input image size (in bytes) before rejecting.
/// Prevents OOM on corrupt/adversarial files.
const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024; // 50 MB

/// Minimum valid image size in bytes (smallest valid PNG is ~67 bytes).
const MIN_IMAGE_BYTES: usize = 67;

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

/// The upload is not a usable image. The only user-visible failure of the pipeline.
#[derive(Error, Debug)]
pub enum InvalidImageError {
    #[error("Image data too small to be valid ({0} bytes)")]
    TooShort(usize),

    #[error("Image data exceeds {}MB limit", MAX_IMAGE_BYTES / (1024 * 1024))]
    TooLarge(usize),

    #[error("Failed to decode image: {0}")]
    Undecodable(String),

    #[error("Image is {width}x{height}, minimum is {min}x{min}")]
    TooSmall { width: u32, height: u32, min: u32 },

    #[error("Invalid base64 image payload: {0}")]
    Base64(String),

    #[error("Tensor construction failed: {0}")]
    Tensor(#[from] TensorError),
}

// ═══════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════

/// Resize filter quality levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeQuality {
    /// CatmullRom (cubic). Sharper, slower.
    High,
    /// Triangle (bilinear). Default.
    Fast,
}

impl ResizeQuality {
    fn filter(self) -> FilterType {
        match self {
            Self::High => FilterType::CatmullRom,
            Self::Fast => FilterType::Triangle,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// Square side length `S` of the model input.
    pub target_size: u32,
    /// Smallest accepted width and height, in pixels.
    pub min_dimension: u32,
    /// Inputs whose longest edge exceeds this are thumbnailed first.
    pub max_input_dimension: u32,
    pub resize_filter: ResizeQuality,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            target_size: config::DEFAULT_INPUT_SIZE,
            min_dimension: config::DEFAULT_MIN_DIMENSION,
            max_input_dimension: 2048,
            resize_filter: ResizeQuality::Fast,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Service traits
// ═══════════════════════════════════════════════════════════

/// Fixes image orientation from EXIF metadata.
///
/// Phone photos (the usual source of skin-lesion uploads) embed rotation in EXIF
/// tag 0x0112. Without correction, portrait photos reach the model sideways.
pub trait OrientationCorrector: Send + Sync {
    /// `raw_bytes`: original file bytes (needed for EXIF reading).
    /// Returns the corrected image. No-op if no EXIF or orientation=1.
    fn correct(&self, raw_bytes: &[u8], image: DynamicImage) -> DynamicImage;
}

/// Decodes and normalizes uploads for classifier input.
///
/// Pure transform: no I/O, no model calls.
pub trait ImagePreprocessor: Send + Sync {
    /// Validate, decode, orient and resize to `S×S` RGB.
    fn prepare(&self, image_bytes: &[u8]) -> Result<PreparedImage, InvalidImageError>;

    /// Build the tracked `[1, S, S, 3]` tensor for a model expecting `range`.
    fn tensorize(
        &self,
        image: &PreparedImage,
        range: InputRange,
    ) -> Result<PreprocessedTensor, InvalidImageError>;

    fn preprocess(
        &self,
        image_bytes: &[u8],
        range: InputRange,
    ) -> Result<PreprocessedTensor, InvalidImageError> {
        let prepared = self.prepare(image_bytes)?;
        self.tensorize(&prepared, range)
    }
}

// ═══════════════════════════════════════════════════════════
// Result types
// ═══════════════════════════════════════════════════════════

/// Decoded image resized to the model's square input size.
#[derive(Debug)]
pub struct PreparedImage {
    image: RgbImage,
    original_width: u32,
    original_height: u32,
}

impl PreparedImage {
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn original_dimensions(&self) -> (u32, u32) {
        (self.original_width, self.original_height)
    }
}

/// Model-ready input tensor. Owned by the call that created it; the buffer is
/// released when this value (or the buffer taken out of it) is dropped.
#[derive(Debug)]
pub struct PreprocessedTensor {
    buffer: TensorBuffer,
    range: InputRange,
    original_width: u32,
    original_height: u32,
}

impl PreprocessedTensor {
    pub fn shape(&self) -> &[usize] {
        self.buffer.shape()
    }

    pub fn buffer(&self) -> &TensorBuffer {
        &self.buffer
    }

    pub fn range(&self) -> InputRange {
        self.range
    }

    pub fn original_dimensions(&self) -> (u32, u32) {
        (self.original_width, self.original_height)
    }
}

// ═══════════════════════════════════════════════════════════
// PreprocessingPipeline
// ═══════════════════════════════════════════════════════════

/// Production preprocessor. Tensors it builds are registered with `tracker`.
pub struct PreprocessingPipeline {
    orientation: Box<dyn OrientationCorrector>,
    config: PreprocessConfig,
    tracker: BufferTracker,
}

impl PreprocessingPipeline {
    pub fn new(config: PreprocessConfig, tracker: BufferTracker) -> Self {
        Self {
            orientation: Box::new(ExifOrientationCorrector),
            config,
            tracker,
        }
    }

    /// Swap the orientation service (e.g. `NoOpOrientationCorrector` for scans
    /// that never carry EXIF data).
    pub fn with_orientation(mut self, orientation: Box<dyn OrientationCorrector>) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }
}

impl ImagePreprocessor for PreprocessingPipeline {
    fn prepare(&self, image_bytes: &[u8]) -> Result<PreparedImage, InvalidImageError> {
        validate_image_bytes(image_bytes)?;

        let img = image::load_from_memory(image_bytes)
            .map_err(|e| InvalidImageError::Undecodable(e.to_string()))?;
        let (orig_w, orig_h) = img.dimensions();

        let min = self.config.min_dimension;
        if orig_w < min || orig_h < min {
            return Err(InvalidImageError::TooSmall {
                width: orig_w,
                height: orig_h,
                min,
            });
        }

        let img = self.orientation.correct(image_bytes, img);
        let rgb = img.to_rgb8();
        let working = pre_downscale(&rgb, self.config.max_input_dimension);

        let target = self.config.target_size;
        let resized = image::imageops::resize(
            &*working,
            target,
            target,
            self.config.resize_filter.filter(),
        );

        debug!(
            original = format!("{orig_w}x{orig_h}"),
            output = format!("{target}x{target}"),
            "Image prepared for classifier"
        );

        Ok(PreparedImage {
            image: resized,
            original_width: orig_w,
            original_height: orig_h,
        })
    }

    fn tensorize(
        &self,
        image: &PreparedImage,
        range: InputRange,
    ) -> Result<PreprocessedTensor, InvalidImageError> {
        let (w, h) = image.image.dimensions();
        let mut data = Vec::with_capacity((w as usize) * (h as usize) * 3);
        for pixel in image.image.pixels() {
            data.extend(pixel.0.iter().map(|&c| range.normalize(c)));
        }

        let buffer = self
            .tracker
            .alloc(vec![1, h as usize, w as usize, 3], data)?;

        Ok(PreprocessedTensor {
            buffer,
            range,
            original_width: image.original_width,
            original_height: image.original_height,
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Orientation
// ═══════════════════════════════════════════════════════════

/// EXIF-based orientation correction for phone photos.
///
/// EXIF orientation values:
/// 1 = Normal, 2 = Mirrored, 3 = 180deg, 4 = Flipped V,
/// 5 = Mirrored + 90deg CW, 6 = 90deg CW, 7 = Mirrored + 270deg CW, 8 = 270deg CW
pub struct ExifOrientationCorrector;

impl OrientationCorrector for ExifOrientationCorrector {
    fn correct(&self, raw_bytes: &[u8], image: DynamicImage) -> DynamicImage {
        let orientation = read_exif_orientation(raw_bytes);
        apply_orientation(image, orientation)
    }
}

/// Read EXIF orientation tag from raw image bytes.
/// Returns 1 (normal) if no EXIF data or tag not present.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Returns the image unchanged. For scanner output (X-ray, CT) without EXIF.
pub struct NoOpOrientationCorrector;

impl OrientationCorrector for NoOpOrientationCorrector {
    fn correct(&self, _raw_bytes: &[u8], image: DynamicImage) -> DynamicImage {
        image
    }
}

// ═══════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════

pub fn validate_image_bytes(bytes: &[u8]) -> Result<(), InvalidImageError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(InvalidImageError::TooShort(bytes.len()));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(InvalidImageError::TooLarge(bytes.len()));
    }
    Ok(())
}

/// Decode a base64 upload, with or without a `data:image/...;base64,` prefix.
pub fn decode_data_url(payload: &str) -> Result<Vec<u8>, InvalidImageError> {
    let encoded = match payload.split_once("base64,") {
        Some((_, rest)) => rest,
        None => payload,
    };
    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| InvalidImageError::Base64(e.to_string()))
}

/// Shrink oversized images before the main resize.
/// `thumbnail` is much cheaper than a filtered resize on multi-megapixel photos.
fn pre_downscale(img: &RgbImage, max_dim: u32) -> Cow<'_, RgbImage> {
    let (w, h) = (img.width(), img.height());
    let largest = w.max(h);

    if largest <= max_dim {
        return Cow::Borrowed(img);
    }

    let scale = max_dim as f32 / largest as f32;
    let new_w = ((w as f32 * scale).round() as u32).max(1);
    let new_h = ((h as f32 * scale).round() as u32).max(1);

    debug!(
        from = format!("{w}x{h}"),
        to = format!("{new_w}x{new_h}"),
        "Pre-downscaling oversized image"
    );

    Cow::Owned(image::imageops::thumbnail(img, new_w, new_h))
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
