//! Image clean-up applied before OCR.
//!
//! Grayscale, 2x Lanczos upscale, contrast stretch, sharpen, then an Otsu
//! global threshold to pure black and white. The pipeline is the same for
//! every input format and colour depth.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::filter::filter3x3;

/// Upscale factor applied before recognition.
pub const UPSCALE_FACTOR: u32 = 2;
/// Contrast enhancement factor around the image mean.
pub const CONTRAST_FACTOR: f32 = 2.0;

/// 3x3 sharpen: centre 32, neighbours -2, normalized by 16.
const SHARPEN_KERNEL: [f32; 9] = [
    -0.125, -0.125, -0.125, -0.125, 2.0, -0.125, -0.125, -0.125, -0.125,
];

/// Run the full pre-processing pipeline.
pub fn preprocess(image: &DynamicImage) -> GrayImage {
    let gray = image.to_luma8();
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray;
    }

    let upscaled = imageops::resize(
        &gray,
        width * UPSCALE_FACTOR,
        height * UPSCALE_FACTOR,
        FilterType::Lanczos3,
    );
    let contrasted = enhance_contrast(&upscaled, CONTRAST_FACTOR);
    let sharpened = sharpen(&contrasted);
    binarize(&sharpened)
}

/// Scale pixel distance from the rounded mean intensity by `factor`.
pub fn enhance_contrast(image: &GrayImage, factor: f32) -> GrayImage {
    let pixel_count = u64::from(image.width()) * u64::from(image.height());
    if pixel_count == 0 {
        return image.clone();
    }

    let sum: u64 = image.pixels().map(|p| u64::from(p.0[0])).sum();
    let mean = (sum as f64 / pixel_count as f64 + 0.5).floor() as f32;

    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let value = mean + (f32::from(pixel.0[0]) - mean) * factor;
        pixel.0[0] = value.round().clamp(0.0, 255.0) as u8;
    }
    out
}

pub fn sharpen(image: &GrayImage) -> GrayImage {
    filter3x3::<_, f32, u8>(image, &SHARPEN_KERNEL)
}

/// Otsu threshold: pixels above the level become white, the rest black.
pub fn binarize(image: &GrayImage) -> GrayImage {
    let level = otsu_level(image);
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        *pixel = if pixel.0[0] > level {
            Luma([255])
        } else {
            Luma([0])
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn gradient(width: u32, height: u32) -> DynamicImage {
        let img = RgbImage::from_fn(width, height, |x, y| {
            let v = ((x + y) * 255 / (width + height)) as u8;
            image::Rgb([v, v / 2, 255 - v])
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_output_is_doubled_and_binary() {
        let out = preprocess(&gradient(20, 10));
        assert_eq!(out.dimensions(), (40, 20));
        assert!(out.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn test_contrast_stretches_around_mean() {
        let img = GrayImage::from_raw(2, 1, vec![100, 140]).unwrap();
        let out = enhance_contrast(&img, 2.0);
        // mean is 120: 100 -> 80, 140 -> 160
        assert_eq!(out.as_raw(), &vec![80, 160]);
    }

    #[test]
    fn test_contrast_clamps() {
        let img = GrayImage::from_raw(2, 1, vec![0, 255]).unwrap();
        let out = enhance_contrast(&img, 2.0);
        assert_eq!(out.as_raw(), &vec![0, 255]);
    }

    #[test]
    fn test_sharpen_kernel_weights() {
        let mut image = GrayImage::from_pixel(5, 5, Luma([100]));
        image.put_pixel(2, 2, Luma([120]));
        let out = sharpen(&image);
        // (32 * 120 - 2 * 8 * 100) / 16
        assert_eq!(out.get_pixel(2, 2).0[0], 140);
        assert_eq!(out.get_pixel(0, 4).0[0], 100);
    }

    #[test]
    fn test_binarize_splits_two_levels() {
        let img = GrayImage::from_fn(4, 1, |x, _| if x < 2 { Luma([30]) } else { Luma([220]) });
        let out = binarize(&img);
        assert_eq!(out.as_raw(), &vec![0, 0, 255, 255]);
    }
}
