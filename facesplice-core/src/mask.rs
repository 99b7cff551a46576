use crate::landmarks::{LandmarkError, LandmarkGroups, LandmarkSet};
use crate::raster::{ensure_same_dimensions, gaussian_blur, FloatImage, RasterError};
use image::{ImageBuffer, Luma, Rgb};
use imageproc::drawing::draw_polygon_mut;
use imageproc::geometry::convex_hull;
use imageproc::point::Point;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MaskError {
    #[error("Convex hull of {group} landmarks is degenerate ({points} distinct points)")]
    DegenerateHull { group: &'static str, points: usize },
    #[error("Landmark error: {0}")]
    Landmarks(#[from] LandmarkError),
    #[error("Raster error: {0}")]
    Raster(#[from] RasterError),
}

/// Channel-replicated blend weights in [0, 1]: 0 keeps the target pixel,
/// 1 takes the source pixel.
pub type Mask = FloatImage;

/// Default feathering kernel size
pub const FEATHER_AMOUNT: u32 = 11;

const OVERLAY_GROUP_NAMES: [&str; 2] = ["eyes and brows", "nose and mouth"];

pub struct MaskBuilder {
    groups: LandmarkGroups,
    feather_amount: u32,
}

impl MaskBuilder {
    pub fn new(groups: LandmarkGroups, feather_amount: u32) -> Self {
        Self {
            groups,
            feather_amount,
        }
    }

    /// Feathered mask covering the eye/brow and nose/mouth regions of
    /// `landmarks`, sized `width`x`height`
    pub fn build(
        &self,
        (width, height): (u32, u32),
        landmarks: &LandmarkSet,
    ) -> Result<Mask, MaskError> {
        let mut canvas: ImageBuffer<Luma<f32>, Vec<f32>> = ImageBuffer::new(width, height);

        for (group, indices) in OVERLAY_GROUP_NAMES.into_iter().zip(self.groups.overlay()) {
            let hull = Self::hull(group, &landmarks.select(&indices)?)?;
            draw_polygon_mut(&mut canvas, &hull, Luma([1.0]));
        }

        let mask = Mask::from_fn(width, height, |x, y| {
            let v = canvas.get_pixel(x, y)[0];
            Rgb([v, v, v])
        });

        self.feather(&mask)
    }

    /// Blur, square the region back off at `> 0`, then blur again. The
    /// threshold keeps the hull interior at full weight after the second pass.
    fn feather(&self, mask: &Mask) -> Result<Mask, MaskError> {
        let mut spread = gaussian_blur(mask, self.feather_amount)?;
        for Rgb(px) in spread.pixels_mut() {
            for v in px.iter_mut() {
                *v = if *v > 0.0 { 1.0 } else { 0.0 };
            }
        }

        let mut feathered = gaussian_blur(&spread, self.feather_amount)?;
        for Rgb(px) in feathered.pixels_mut() {
            for v in px.iter_mut() {
                *v = v.clamp(0.0, 1.0);
            }
        }
        Ok(feathered)
    }

    fn hull(group: &'static str, points: &[(f64, f64)]) -> Result<Vec<Point<i32>>, MaskError> {
        let mut pixels: Vec<Point<i32>> = Vec::with_capacity(points.len());
        for &(x, y) in points {
            let p = Point::new(x.round() as i32, y.round() as i32);
            if !pixels.contains(&p) {
                pixels.push(p);
            }
        }
        if pixels.len() < 3 {
            return Err(MaskError::DegenerateHull {
                group,
                points: pixels.len(),
            });
        }

        let hull = convex_hull(pixels.as_slice());
        if hull.len() < 3 || doubled_area(&hull) == 0 {
            return Err(MaskError::DegenerateHull {
                group,
                points: hull.len(),
            });
        }
        Ok(hull)
    }
}

/// Shoelace sum; zero for collinear outlines
fn doubled_area(polygon: &[Point<i32>]) -> i64 {
    let n = polygon.len();
    (0..n)
        .map(|i| {
            let (a, b) = (polygon[i], polygon[(i + 1) % n]);
            a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64
        })
        .sum::<i64>()
        .abs()
}

/// Pointwise maximum of two masks, so coverage from either one wins
pub fn combine_masks(a: &Mask, b: &Mask) -> Result<Mask, RasterError> {
    ensure_same_dimensions("combine masks", a.dimensions(), b.dimensions())?;
    Ok(Mask::from_fn(a.width(), a.height(), |x, y| {
        let Rgb(pa) = a.get_pixel(x, y);
        let Rgb(pb) = b.get_pixel(x, y);
        Rgb([pa[0].max(pb[0]), pa[1].max(pb[1]), pa[2].max(pb[2])])
    }))
}
