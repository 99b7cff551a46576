use crate::mask::Mask;
use crate::raster::{ensure_same_dimensions, FloatImage, RasterError};
use image::Rgb;

/// Alpha-composite `overlay` onto `base`: `base * (1 - mask) + overlay * mask`
pub fn composite(
    base: &FloatImage,
    overlay: &FloatImage,
    mask: &Mask,
) -> Result<FloatImage, RasterError> {
    ensure_same_dimensions("composite", base.dimensions(), overlay.dimensions())?;
    ensure_same_dimensions("composite mask", base.dimensions(), mask.dimensions())?;

    Ok(FloatImage::from_fn(base.width(), base.height(), |x, y| {
        let Rgb(b) = base.get_pixel(x, y);
        let Rgb(o) = overlay.get_pixel(x, y);
        let Rgb(m) = mask.get_pixel(x, y);
        let mut out = [0.0f32; 3];
        for c in 0..3 {
            out[c] = b[c] * (1.0 - m[c]) + o[c] * m[c];
        }
        Rgb(out)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_weights() {
        let base = FloatImage::from_pixel(3, 1, Rgb([100.0, 0.0, 40.0]));
        let overlay = FloatImage::from_pixel(3, 1, Rgb([200.0, 80.0, 40.0]));
        let mut mask = Mask::new(3, 1);
        mask.put_pixel(1, 0, Rgb([1.0, 1.0, 1.0]));
        mask.put_pixel(2, 0, Rgb([0.25, 0.25, 0.25]));

        let out = composite(&base, &overlay, &mask).unwrap();
        assert_eq!(out.get_pixel(0, 0), &Rgb([100.0, 0.0, 40.0]));
        assert_eq!(out.get_pixel(1, 0), &Rgb([200.0, 80.0, 40.0]));
        assert_eq!(out.get_pixel(2, 0), &Rgb([125.0, 20.0, 40.0]));
    }

    #[test]
    fn test_composite_size_mismatch() {
        let base = FloatImage::new(4, 4);
        let mask = Mask::new(4, 3);
        assert!(composite(&base, &base, &mask).is_err());
    }
}
