//! Pixel effects.
//!
//! All effects use integer arithmetic (or the `image` crate's deterministic
//! filters), so identical input always yields identical output.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbImage};

/// Radius up to which the blur runs at full resolution.
const DIRECT_BLUR_LIMIT: u32 = 5;

/// Downscale factor used for large blur radii.
const BLUR_SCALE_FACTOR: u32 = 4;

/// Scales every channel towards black by `percent` (0-100).
pub fn darken(img: &mut RgbImage, percent: u8) {
    if percent == 0 {
        return;
    }
    let keep = u16::from(100 - percent.min(100));
    for pixel in img.pixels_mut() {
        for channel in &mut pixel.0 {
            // keep <= 100, so the result always fits in u8
            *channel = u8::try_from(u16::from(*channel) * keep / 100).unwrap_or(u8::MAX);
        }
    }
}

/// Moves every pixel towards its luma by `percent` (0-100).
pub fn desaturate(img: &mut RgbImage, percent: u8) {
    if percent == 0 {
        return;
    }
    let amount = i32::from(percent.min(100));
    for pixel in img.pixels_mut() {
        let [r, g, b] = pixel.0.map(i32::from);
        let luma = (299 * r + 587 * g + 114 * b) / 1000;
        pixel.0 = [r, g, b].map(|c| {
            let mixed = c + (luma - c) * amount / 100;
            u8::try_from(mixed.clamp(0, 255)).unwrap_or(u8::MAX)
        });
    }
}

/// Gaussian-like blur with the given radius in pixels.
///
/// Small radii blur at full size; larger ones blur a downscaled copy and
/// scale it back up, which is much faster and visually equivalent at
/// wallpaper sizes.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn blur(img: RgbImage, radius: u32) -> RgbImage {
    if radius == 0 {
        return img;
    }

    let img = DynamicImage::ImageRgb8(img);
    if radius <= DIRECT_BLUR_LIMIT {
        return img.blur(radius as f32).to_rgb8();
    }

    let (width, height) = img.dimensions();
    let small = img.resize_exact(
        (width / BLUR_SCALE_FACTOR).max(1),
        (height / BLUR_SCALE_FACTOR).max(1),
        FilterType::CatmullRom,
    );
    let blurred = small.blur((radius / BLUR_SCALE_FACTOR).max(1) as f32);
    blurred.resize_exact(width, height, FilterType::CatmullRom).to_rgb8()
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    fn solid(color: [u8; 3]) -> RgbImage { RgbImage::from_pixel(8, 8, Rgb(color)) }

    #[test]
    fn test_darken_scales_channels() {
        let mut img = solid([200, 100, 50]);
        darken(&mut img, 50);
        assert_eq!(img.get_pixel(0, 0).0, [100, 50, 25]);
    }

    #[test]
    fn test_darken_full_is_black() {
        let mut img = solid([200, 100, 50]);
        darken(&mut img, 100);
        assert_eq!(img.get_pixel(3, 3).0, [0, 0, 0]);
    }

    #[test]
    fn test_desaturate_full_is_gray() {
        let mut img = solid([255, 0, 0]);
        desaturate(&mut img, 100);
        // 299 * 255 / 1000 = 76
        assert_eq!(img.get_pixel(0, 0).0, [76, 76, 76]);
    }

    #[test]
    fn test_desaturate_zero_is_identity() {
        let mut img = solid([10, 20, 30]);
        desaturate(&mut img, 0);
        assert_eq!(img.get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn test_blur_preserves_dimensions() {
        let img = RgbImage::from_fn(100, 60, |x, _| Rgb([u8::try_from(x % 256).unwrap(), 0, 0]));
        assert_eq!(blur(img.clone(), 3).dimensions(), (100, 60));
        assert_eq!(blur(img, 20).dimensions(), (100, 60));
    }

    #[test]
    fn test_blur_is_deterministic() {
        let img = RgbImage::from_fn(64, 64, |x, y| Rgb([(x * 4) as u8, (y * 4) as u8, 128]));
        assert_eq!(blur(img.clone(), 12), blur(img, 12));
    }
}
