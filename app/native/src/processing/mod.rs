//! Post-processing pipeline.
//!
//! Turns the raw bytes of a fetched image into the JPEG that is set as the
//! desktop background:
//!
//! 1. geometry: cover-crop to the screen's aspect ratio, or letterbox
//! 2. effects, always in the order darken, desaturate, blur
//! 3. an optional low-resolution preview from the same crop
//!
//! The pipeline is pure. Identical input bytes and parameters produce
//! byte-identical output.

mod effects;
mod geometry;

use std::fmt;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use self::effects::{blur, darken, desaturate};
pub use self::geometry::{Geometry, Rect, ScreenSize};

/// JPEG quality of every artifact.
const JPEG_QUALITY: u8 = 95;

/// Length of the hex variant key.
const VARIANT_KEY_LEN: usize = 16;

/// Errors that can occur while processing an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    /// The parameters cannot produce an image.
    InvalidParams(String),
    /// The source bytes are not a decodable image.
    Decode(String),
    /// The result could not be encoded.
    Encode(String),
}

impl fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParams(reason) => write!(f, "Invalid processing parameters: {reason}"),
            Self::Decode(reason) => write!(f, "Failed to decode image: {reason}"),
            Self::Encode(reason) => write!(f, "Failed to encode processed image: {reason}"),
        }
    }
}

impl std::error::Error for ProcessingError {}

/// Pipeline parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostProcessParams {
    /// Blur radius in pixels; 0 disables.
    pub blur: u32,
    /// Darkening in percent (0-100).
    pub darken: u8,
    /// Desaturation in percent (0-100).
    pub desaturate: u8,
    /// Output size.
    pub screen: ScreenSize,
    /// Preview size, if a preview should be rendered.
    pub preview: Option<ScreenSize>,
    /// Crop to fill the screen instead of letterboxing.
    pub optimize_layout: bool,
}

impl Default for PostProcessParams {
    fn default() -> Self {
        Self {
            blur: 0,
            darken: 0,
            desaturate: 0,
            screen: ScreenSize::default_2k(),
            preview: None,
            optimize_layout: true,
        }
    }
}

impl PostProcessParams {
    /// Short stable key identifying these parameters in cache file names.
    #[must_use]
    pub fn variant_key(&self) -> String {
        let preview = self
            .preview
            .map_or_else(|| String::from("none"), |p| format!("{}x{}", p.width, p.height));
        let canonical = format!(
            "blur={};darken={};desaturate={};screen={}x{};preview={preview};optimize={}",
            self.blur,
            self.darken,
            self.desaturate,
            self.screen.width,
            self.screen.height,
            self.optimize_layout,
        );
        let mut key = hex::encode(Sha256::digest(canonical.as_bytes()));
        key.truncate(VARIANT_KEY_LEN);
        key
    }

    /// Checks the parameters before any pixel work.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::InvalidParams`] for empty sizes or
    /// percentages above 100.
    pub fn validate(&self) -> Result<(), ProcessingError> {
        if self.screen.is_empty() {
            return Err(ProcessingError::InvalidParams(format!(
                "screen size {}x{} is empty",
                self.screen.width, self.screen.height
            )));
        }
        if self.preview.is_some_and(ScreenSize::is_empty) {
            return Err(ProcessingError::InvalidParams("preview size is empty".into()));
        }
        if self.darken > 100 || self.desaturate > 100 {
            return Err(ProcessingError::InvalidParams(
                "darken and desaturate must be between 0 and 100".into(),
            ));
        }
        Ok(())
    }
}

/// Output of one pipeline run.
#[derive(Clone, PartialEq, Eq)]
pub struct ProcessedArtifact {
    /// Encoded JPEG at screen size.
    pub bytes: Vec<u8>,
    /// Encoded JPEG at preview size, when requested.
    pub preview: Option<Vec<u8>>,
    pub geometry: Geometry,
    pub variant_key: String,
}

impl fmt::Debug for ProcessedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessedArtifact")
            .field("bytes", &self.bytes.len())
            .field("preview", &self.preview.as_ref().map(Vec::len))
            .field("geometry", &self.geometry)
            .field("variant_key", &self.variant_key)
            .finish()
    }
}

/// Something that turns fetched bytes into a [`ProcessedArtifact`].
///
/// The orchestrator runs it on the blocking pool.
pub trait PostProcessor: Send + Sync {
    /// # Errors
    ///
    /// Returns [`ProcessingError`] when the image cannot be processed.
    fn process(&self, bytes: &[u8], params: &PostProcessParams) -> Result<ProcessedArtifact, ProcessingError>;
}

/// The [`process`] function as a [`PostProcessor`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ImagePipeline;

impl PostProcessor for ImagePipeline {
    fn process(&self, bytes: &[u8], params: &PostProcessParams) -> Result<ProcessedArtifact, ProcessingError> {
        process(bytes, params)
    }
}

/// Runs the full pipeline on encoded image bytes.
///
/// # Errors
///
/// Returns [`ProcessingError`] if the parameters are invalid or the image
/// cannot be decoded or encoded. Nothing is returned in that case.
pub fn process(bytes: &[u8], params: &PostProcessParams) -> Result<ProcessedArtifact, ProcessingError> {
    params.validate()?;

    let source = image::load_from_memory(bytes).map_err(|err| ProcessingError::Decode(err.to_string()))?;
    let (width, height) = source.dimensions();
    if width == 0 || height == 0 {
        return Err(ProcessingError::Decode("image has no pixels".into()));
    }

    let geometry = Geometry::compute(ScreenSize::new(width, height), params.screen, params.optimize_layout);
    let full = render(&source, &geometry, params, params.blur);

    let preview = params
        .preview
        .map(|size| {
            let preview_geometry = geometry.scaled_to(size);
            let radius = scale_radius(params.blur, size.width, params.screen.width);
            encode_jpeg(&render(&source, &preview_geometry, params, radius))
        })
        .transpose()?;

    Ok(ProcessedArtifact {
        bytes: encode_jpeg(&full)?,
        preview,
        geometry,
        variant_key: params.variant_key(),
    })
}

/// Blur radius for an output `width` pixels wide instead of `reference`.
fn scale_radius(radius: u32, width: u32, reference: u32) -> u32 {
    if radius == 0 {
        return 0;
    }
    let scaled = u64::from(radius) * u64::from(width) / u64::from(reference.max(1));
    u32::try_from(scaled).unwrap_or(u32::MAX).max(1)
}

fn render(source: &DynamicImage, geometry: &Geometry, params: &PostProcessParams, radius: u32) -> RgbImage {
    let Rect { x, y, width, height } = geometry.crop;
    let placement = geometry.placement;

    let scaled = source
        .crop_imm(x, y, width, height)
        .resize_exact(placement.width, placement.height, FilterType::CatmullRom)
        .to_rgb8();

    let mut canvas = if geometry.is_letterboxed() {
        let mut canvas = RgbImage::from_pixel(geometry.canvas.width, geometry.canvas.height, Rgb([0, 0, 0]));
        image::imageops::replace(&mut canvas, &scaled, i64::from(placement.x), i64::from(placement.y));
        canvas
    } else {
        scaled
    };

    darken(&mut canvas, params.darken);
    desaturate(&mut canvas, params.desaturate);
    blur(canvas, radius)
}

fn encode_jpeg(img: &RgbImage) -> Result<Vec<u8>, ProcessingError> {
    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY);
    img.write_with_encoder(encoder)
        .map_err(|err| ProcessingError::Encode(err.to_string()))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::ImageFormat;

    use super::*;

    /// Encodes a gradient so crops and effects have something to work on.
    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn params(width: u32, height: u32) -> PostProcessParams {
        PostProcessParams {
            screen: ScreenSize::new(width, height),
            ..PostProcessParams::default()
        }
    }

    #[test]
    fn test_output_matches_screen_size() {
        let artifact = process(&png_bytes(400, 200), &params(192, 108)).unwrap();
        let decoded = image::load_from_memory(&artifact.bytes).unwrap();

        assert_eq!(decoded.dimensions(), (192, 108));
        assert_eq!(image::guess_format(&artifact.bytes).unwrap(), ImageFormat::Jpeg);
        assert_eq!(artifact.geometry.crop, Rect::new(22, 0, 356, 200));
        assert!(artifact.preview.is_none());
    }

    #[test]
    fn test_letterbox_has_black_bars() {
        let params = PostProcessParams {
            optimize_layout: false,
            ..params(192, 192)
        };
        let artifact = process(&png_bytes(400, 200), &params).unwrap();
        let decoded = image::load_from_memory(&artifact.bytes).unwrap().to_rgb8();

        assert_eq!(artifact.geometry.placement, Rect::new(0, 48, 192, 96));
        let corner = decoded.get_pixel(0, 0).0;
        assert!(corner.iter().all(|&c| c < 8), "bar should be black: {corner:?}");
    }

    #[test]
    fn test_pipeline_is_deterministic() {
        let bytes = png_bytes(300, 300);
        let params = PostProcessParams {
            blur: 8,
            darken: 30,
            desaturate: 50,
            preview: Some(ScreenSize::new(64, 36)),
            ..params(160, 90)
        };

        let first = process(&bytes, &params).unwrap();
        let second = process(&bytes, &params).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_preview_is_rendered_at_preview_size() {
        let params = PostProcessParams {
            preview: Some(ScreenSize::new(48, 27)),
            ..params(192, 108)
        };
        let artifact = process(&png_bytes(400, 200), &params).unwrap();
        let preview = image::load_from_memory(artifact.preview.as_ref().unwrap()).unwrap();
        assert_eq!(preview.dimensions(), (48, 27));
    }

    #[test]
    fn test_undecodable_bytes_fail() {
        let err = process(b"definitely not an image", &params(100, 100)).unwrap_err();
        assert!(matches!(err, ProcessingError::Decode(_)));
    }

    #[test]
    fn test_invalid_params_fail_before_decoding() {
        let err = process(b"whatever", &params(0, 100)).unwrap_err();
        assert!(matches!(err, ProcessingError::InvalidParams(_)));

        let too_dark = PostProcessParams { darken: 101, ..params(10, 10) };
        assert!(too_dark.validate().is_err());
    }

    #[test]
    fn test_variant_key_tracks_parameters() {
        let base = params(1920, 1080);
        let blurred = PostProcessParams { blur: 4, ..base };

        assert_eq!(base.variant_key(), params(1920, 1080).variant_key());
        assert_ne!(base.variant_key(), blurred.variant_key());
        assert_eq!(base.variant_key().len(), 16);
    }

    #[test]
    fn test_scale_radius() {
        assert_eq!(scale_radius(0, 100, 1000), 0);
        assert_eq!(scale_radius(20, 480, 1920), 5);
        assert_eq!(scale_radius(2, 100, 1920), 1);
    }

    #[test]
    fn test_processing_error_display() {
        let err = ProcessingError::Decode("bad header".into());
        assert_eq!(err.to_string(), "Failed to decode image: bad header");
    }
}
