//! Page image preprocessing ahead of recognition.

use image::{DynamicImage, GrayImage, Luma};

const INK: Luma<u8> = Luma([0]);
const BACKGROUND: Luma<u8> = Luma([255]);

/// Default luminance cutoff for binarization.
pub const DEFAULT_BINARIZE_CUTOFF: u8 = 180;

/// A deterministic transform from a rendered page to an OCR-ready image.
pub trait Preprocessor: Send + Sync {
    fn prepare(&self, image: &DynamicImage) -> GrayImage;
}

/// Grayscale conversion followed by a fixed-cutoff threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binarize {
    /// Pixels darker than this become ink, the rest background.
    pub cutoff: u8,
}

impl Default for Binarize {
    fn default() -> Self {
        Self {
            cutoff: DEFAULT_BINARIZE_CUTOFF,
        }
    }
}

impl Binarize {
    pub fn new(cutoff: u8) -> Self {
        Self { cutoff }
    }
}

impl Preprocessor for Binarize {
    fn prepare(&self, image: &DynamicImage) -> GrayImage {
        let mut gray = image.to_luma8();
        for pixel in gray.pixels_mut() {
            *pixel = if pixel.0[0] < self.cutoff { INK } else { BACKGROUND };
        }
        gray
    }
}

/// Grayscale conversion only.
#[derive(Debug, Clone, Copy, Default)]
pub struct Grayscale;

impl Preprocessor for Grayscale {
    fn prepare(&self, image: &DynamicImage) -> GrayImage {
        image.to_luma8()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn sample() -> DynamicImage {
        let mut img = RgbImage::new(3, 1);
        img.put_pixel(0, 0, Rgb([10, 10, 10]));
        img.put_pixel(1, 0, Rgb([179, 179, 179]));
        img.put_pixel(2, 0, Rgb([180, 180, 180]));
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_binarize_splits_on_cutoff() {
        let out = Binarize::default().prepare(&sample());
        assert_eq!(out.dimensions(), (3, 1));
        assert_eq!(out.get_pixel(0, 0), &INK);
        assert_eq!(out.get_pixel(1, 0), &INK);
        assert_eq!(out.get_pixel(2, 0), &BACKGROUND);
    }

    #[test]
    fn test_binarize_is_deterministic() {
        let p = Binarize::new(100);
        assert_eq!(p.prepare(&sample()), p.prepare(&sample()));
    }

    #[test]
    fn test_output_is_two_level() {
        let out = Binarize::new(128).prepare(&sample());
        assert!(out.pixels().all(|p| *p == INK || *p == BACKGROUND));
    }

    #[test]
    fn test_grayscale_keeps_levels() {
        let out = Grayscale.prepare(&sample());
        assert_eq!(out.get_pixel(1, 0).0[0], 179);
    }
}
