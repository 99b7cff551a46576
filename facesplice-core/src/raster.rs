//! Float raster helpers shared by the pipeline stages.
//!
//! Intermediate math runs on 3-channel `f32` buffers; `u8` only appears at
//! the codec boundary.

use image::{Rgb, Rgb32FImage, RgbImage};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("{stage}: dimension mismatch, {left:?} vs {right:?}")]
    IncompatibleDimensions {
        stage: &'static str,
        left: (u32, u32),
        right: (u32, u32),
    },
    #[error("Blur kernel size must be a positive odd integer, got {0}")]
    InvalidKernel(u32),
}

/// 3-channel floating-point raster used for every intermediate buffer
pub type FloatImage = Rgb32FImage;

pub fn to_float(image: &RgbImage) -> FloatImage {
    FloatImage::from_fn(image.width(), image.height(), |x, y| {
        let Rgb([r, g, b]) = *image.get_pixel(x, y);
        Rgb([r as f32, g as f32, b as f32])
    })
}

/// Round and saturate into 8-bit samples
pub fn to_rgb8(image: &FloatImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let Rgb(px) = *image.get_pixel(x, y);
        Rgb(px.map(|v| v.round().clamp(0.0, 255.0) as u8))
    })
}

/// Ensure two buffers taking part in the same per-pixel operation line up
pub fn ensure_same_dimensions(
    stage: &'static str,
    left: (u32, u32),
    right: (u32, u32),
) -> Result<(), RasterError> {
    if left != right {
        return Err(RasterError::IncompatibleDimensions { stage, left, right });
    }
    Ok(())
}

/// Binomial taps OpenCV substitutes for small kernels when no sigma is given
const SMALL_GAUSSIAN_TAB: [&[f32]; 4] = [
    &[1.0],
    &[0.25, 0.5, 0.25],
    &[0.0625, 0.25, 0.375, 0.25, 0.0625],
    &[0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125],
];

/// 1D Gaussian kernel of `size` taps, matching OpenCV's `getGaussianKernel`
/// with a zero sigma: fixed binomial taps up to 7, otherwise a sampled
/// Gaussian with `sigma = 0.3 * ((size - 1) * 0.5 - 1) + 0.8`.
pub fn gaussian_kernel(size: u32) -> Result<Vec<f32>, RasterError> {
    if size == 0 || size % 2 == 0 {
        return Err(RasterError::InvalidKernel(size));
    }
    if let Some(taps) = SMALL_GAUSSIAN_TAB.get((size / 2) as usize) {
        return Ok(taps.to_vec());
    }
    let sigma = 0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let half = (size / 2) as f64;
    let weights: Vec<f64> = (0..size)
        .map(|i| {
            let x = i as f64 - half;
            (-x * x / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();
    Ok(weights.iter().map(|w| (w / sum) as f32).collect())
}

/// Mirror an out-of-range coordinate back inside `0..len` without repeating
/// the edge sample (`gfedcb|abcdefgh|gfedcba`).
fn reflect_101(i: i64, len: i64) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let mut i = i.rem_euclid(period);
    if i >= len {
        i = period - i;
    }
    i as usize
}

/// Separable Gaussian blur with a `size`×`size` kernel
pub fn gaussian_blur(image: &FloatImage, size: u32) -> Result<FloatImage, RasterError> {
    let kernel = gaussian_kernel(size)?;
    let (width, height) = image.dimensions();
    if size == 1 || width == 0 || height == 0 {
        return Ok(image.clone());
    }
    let (w, h) = (width as i64, height as i64);
    let half = (size / 2) as i64;

    // Horizontal pass
    let mut temp = FloatImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let mut sum = [0.0f32; 3];
            for (k, &weight) in kernel.iter().enumerate() {
                let sx = reflect_101(x as i64 + k as i64 - half, w);
                let Rgb(px) = image.get_pixel(sx as u32, y);
                for c in 0..3 {
                    sum[c] += px[c] * weight;
                }
            }
            temp.put_pixel(x, y, Rgb(sum));
        }
    }

    // Vertical pass
    let mut output = FloatImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let mut sum = [0.0f32; 3];
            for (k, &weight) in kernel.iter().enumerate() {
                let sy = reflect_101(y as i64 + k as i64 - half, h);
                let Rgb(px) = temp.get_pixel(x, sy as u32);
                for c in 0..3 {
                    sum[c] += px[c] * weight;
                }
            }
            output.put_pixel(x, y, Rgb(sum));
        }
    }

    Ok(output)
}
