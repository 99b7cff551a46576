//! Local gain correction that matches a warped source face to the target's
//! lighting. Color mismatch is assumed to vary smoothly across the face, so
//! it is estimated from blurred copies of both images.

use crate::landmarks::{LandmarkError, LandmarkGroups, LandmarkSet};
use crate::raster::{ensure_same_dimensions, gaussian_blur, FloatImage, RasterError};
use image::Rgb;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ColorError {
    #[error("Landmark error: {0}")]
    Landmarks(#[from] LandmarkError),
    #[error("Raster error: {0}")]
    Raster(#[from] RasterError),
}

/// Default blur kernel as a fraction of the inter-pupillary distance
pub const COLOR_CORRECT_BLUR_FRAC: f64 = 0.6;

/// Source blur values at or below this are treated as near-black
const DARK_LIMIT: f32 = 1.0;
const DARK_OFFSET: f32 = 128.0;

pub struct ColorCorrector {
    groups: LandmarkGroups,
    blur_fraction: f64,
}

impl ColorCorrector {
    pub fn new(groups: LandmarkGroups, blur_fraction: f64) -> Self {
        Self {
            groups,
            blur_fraction,
        }
    }

    /// Blur kernel for a face, always a positive odd integer
    pub fn kernel_size(&self, landmarks: &LandmarkSet) -> Result<u32, ColorError> {
        let (lx, ly) = landmarks.centroid(&self.groups.left_eye_indices())?;
        let (rx, ry) = landmarks.centroid(&self.groups.right_eye_indices())?;
        let distance = (lx - rx).hypot(ly - ry);
        Ok(odd_kernel(self.blur_fraction * distance))
    }

    /// Rescale `source` (already in the target's frame) so its local color
    /// averages match those of `target`
    pub fn correct(
        &self,
        source: &FloatImage,
        target: &FloatImage,
        target_landmarks: &LandmarkSet,
    ) -> Result<FloatImage, ColorError> {
        ensure_same_dimensions("color correction", source.dimensions(), target.dimensions())?;

        let kernel = self.kernel_size(target_landmarks)?;
        log::debug!("Color correction blur kernel: {}", kernel);

        let target_blur = gaussian_blur(target, kernel)?;
        let source_blur = gaussian_blur(source, kernel)?;

        Ok(FloatImage::from_fn(source.width(), source.height(), |x, y| {
            let Rgb(src) = source.get_pixel(x, y);
            let Rgb(tb) = target_blur.get_pixel(x, y);
            let Rgb(sb) = source_blur.get_pixel(x, y);
            let mut out = [0.0f32; 3];
            for c in 0..3 {
                let denom = if sb[c] <= DARK_LIMIT {
                    sb[c] + DARK_OFFSET
                } else {
                    sb[c]
                };
                out[c] = src[c] * (tb[c] / denom);
            }
            Rgb(out)
        }))
    }
}

/// Round to the nearest integer, then bump even values (including zero) up
/// to the next odd one
fn odd_kernel(amount: f64) -> u32 {
    let k = amount.round().max(0.0) as u32;
    if k % 2 == 0 {
        k + 1
    } else {
        k
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::test_support::synthetic_face;
    use approx::assert_relative_eq;

    fn corrector() -> ColorCorrector {
        ColorCorrector::new(LandmarkGroups::default(), COLOR_CORRECT_BLUR_FRAC)
    }

    #[test]
    fn test_kernel_parity() {
        for i in 0..2000 {
            let k = odd_kernel(i as f64 * 0.173);
            assert!(k >= 1 && k % 2 == 1, "kernel {k} for step {i}");
        }
        assert_eq!(odd_kernel(0.0), 1);
        assert_eq!(odd_kernel(-3.0), 1);
        assert_eq!(odd_kernel(5.4), 5);
        assert_eq!(odd_kernel(5.6), 7);
        assert_eq!(odd_kernel(f64::NAN), 1);
    }

    #[test]
    fn test_kernel_from_eye_distance() {
        // Eye centers sit 0.38 of the face size apart
        let face = synthetic_face(0.0, 0.0, 100.0);
        let k = corrector().kernel_size(&face).unwrap();
        assert_eq!(k, 23);
    }

    #[test]
    fn test_identical_images_unchanged() {
        let face = synthetic_face(0.0, 0.0, 60.0);
        let image = FloatImage::from_fn(64, 64, |x, y| {
            Rgb([40.0 + x as f32, 90.0 + y as f32, 200.0])
        });
        let corrected = corrector().correct(&image, &image, &face).unwrap();
        for (a, b) in corrected.pixels().zip(image.pixels()) {
            for c in 0..3 {
                assert_relative_eq!(a[c], b[c], max_relative = 1e-5);
            }
        }
    }

    #[test]
    fn test_gain_matches_brightness() {
        let face = synthetic_face(0.0, 0.0, 60.0);
        let source = FloatImage::from_pixel(48, 48, Rgb([50.0, 100.0, 20.0]));
        let target = FloatImage::from_pixel(48, 48, Rgb([100.0, 50.0, 20.0]));
        let corrected = corrector().correct(&source, &target, &face).unwrap();
        let Rgb(px) = *corrected.get_pixel(20, 20);
        assert_relative_eq!(px[0], 100.0, max_relative = 1e-4);
        assert_relative_eq!(px[1], 50.0, max_relative = 1e-4);
        assert_relative_eq!(px[2], 20.0, max_relative = 1e-4);
    }

    #[test]
    fn test_dark_source_stays_finite() {
        let face = synthetic_face(0.0, 0.0, 60.0);
        let source = FloatImage::new(32, 32);
        let target = FloatImage::from_pixel(32, 32, Rgb([200.0, 200.0, 200.0]));
        let corrected = corrector().correct(&source, &target, &face).unwrap();
        for Rgb(px) in corrected.pixels() {
            assert!(px.iter().all(|v| v.is_finite() && *v == 0.0));
        }
    }

    #[test]
    fn test_size_mismatch() {
        let face = synthetic_face(0.0, 0.0, 60.0);
        let result = corrector().correct(&FloatImage::new(8, 8), &FloatImage::new(9, 8), &face);
        assert!(matches!(
            result,
            Err(ColorError::Raster(RasterError::IncompatibleDimensions { .. }))
        ));
    }
}
