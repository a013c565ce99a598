use image::{ImageBuffer, Rgba};

use crate::config::{OpacityConfig, RelativeRect};

/// Opacity hint reported when the hint is disabled or cannot be computed.
pub const NEUTRAL_OPACITY: f32 = 0.5;

/// Crops a sub-region from an image using relative coordinates.
///
/// Converts the relative rect (0.0–1.0) to absolute pixel coordinates,
/// clamps to image bounds, and returns the cropped sub-image.
pub fn crop_region(
    img: &ImageBuffer<Rgba<u8>, Vec<u8>>,
    region: &RelativeRect,
) -> ImageBuffer<Rgba<u8>, Vec<u8>> {
    let (w, h) = img.dimensions();

    let x0 = ((region.x.max(0.0) * w as f32) as u32).min(w);
    let y0 = ((region.y.max(0.0) * h as f32) as u32).min(h);
    let rw = ((region.width.max(0.0) * w as f32) as u32).min(w - x0);
    let rh = ((region.height.max(0.0) * h as f32) as u32).min(h - y0);

    image::imageops::crop_imm(img, x0, y0, rw, rh).to_image()
}

/// Standard deviation of BT.601 luma over all pixels, or `None` for an
/// empty image.
pub fn luma_stddev(img: &ImageBuffer<Rgba<u8>, Vec<u8>>) -> Option<f32> {
    let count = img.width() as u64 * img.height() as u64;
    if count == 0 {
        return None;
    }

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for pixel in img.pixels() {
        let luma = 0.299 * pixel[0] as f64 + 0.587 * pixel[1] as f64 + 0.114 * pixel[2] as f64;
        sum += luma;
        sum_sq += luma * luma;
    }

    let n = count as f64;
    let mean = sum / n;
    let variance = (sum_sq / n - mean * mean).max(0.0);
    Some(variance.sqrt() as f32)
}

/// Busyness of the opacity region mapped to 0..1.
///
/// A dimmed or faded table has little luma spread; the live action panel has
/// a lot. `low` maps to 0.0 and `high` to 1.0.
pub fn opacity_hint(frame: &ImageBuffer<Rgba<u8>, Vec<u8>>, config: &OpacityConfig) -> f32 {
    if !config.enabled {
        return NEUTRAL_OPACITY;
    }
    let region = crop_region(frame, &config.region);
    let Some(sd) = luma_stddev(&region) else {
        return NEUTRAL_OPACITY;
    };
    let span = (config.high - config.low).max(0.1);
    ((sd - config.low) / span).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_region() {
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_fn(100, 200, |x, y| Rgba([x as u8, y as u8, 0, 255]));

        let region = RelativeRect::new(0.1, 0.25, 0.5, 0.1);
        let cropped = crop_region(&img, &region);

        assert_eq!(cropped.dimensions(), (50, 20));
        assert_eq!(cropped.get_pixel(0, 0)[0], 10);
        assert_eq!(cropped.get_pixel(0, 0)[1], 50);
    }

    #[test]
    fn test_crop_region_clamps() {
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::new(100, 100);
        let cropped = crop_region(&img, &RelativeRect::new(0.9, 0.9, 0.5, 0.5));
        assert_eq!(cropped.dimensions(), (10, 10));
    }

    #[test]
    fn test_luma_stddev_flat_and_split() {
        let flat: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(4, 4, Rgba([90, 90, 90, 255]));
        assert!(luma_stddev(&flat).unwrap() < 1e-3);

        // Half black, half white: stddev is half the range
        let split: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::from_fn(4, 4, |x, _| {
            if x < 2 { Rgba([0, 0, 0, 255]) } else { Rgba([255, 255, 255, 255]) }
        });
        let sd = luma_stddev(&split).unwrap();
        assert!((sd - 127.5).abs() < 0.5, "sd = {}", sd);

        let empty: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::new(0, 0);
        assert!(luma_stddev(&empty).is_none());
    }

    #[test]
    fn test_opacity_hint_normalizes() {
        let config = OpacityConfig {
            region: RelativeRect::new(0.0, 0.0, 1.0, 1.0),
            ..OpacityConfig::default()
        };
        let flat: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(8, 8, Rgba([30, 30, 30, 255]));
        assert_eq!(opacity_hint(&flat, &config), 0.0);

        let busy: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::from_fn(8, 8, |x, y| {
            if (x + y) % 2 == 0 { Rgba([0, 0, 0, 255]) } else { Rgba([255, 255, 255, 255]) }
        });
        assert_eq!(opacity_hint(&busy, &config), 1.0);
    }

    #[test]
    fn test_opacity_hint_disabled_is_neutral() {
        let config = OpacityConfig {
            enabled: false,
            ..OpacityConfig::default()
        };
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::new(8, 8);
        assert_eq!(opacity_hint(&img, &config), NEUTRAL_OPACITY);
    }
}
