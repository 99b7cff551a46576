use crate::landmarks::{LandmarkError, LandmarkGroups, LandmarkSet};
use nalgebra::{Matrix2, Matrix3, Vector2};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlignmentError {
    #[error("Insufficient points in {0} landmarks to compute alignment")]
    InsufficientPoints(&'static str),
    #[error("Singular value decomposition failed")]
    Decomposition,
    #[error("Landmark error: {0}")]
    Landmarks(#[from] LandmarkError),
}

/// 2D affine transform stored as a homogeneous 3x3 matrix.
/// The bottom row is always `[0, 0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    matrix: Matrix3<f64>,
}

impl AffineTransform {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }

    /// Build from the 2x3 block `[linear | translation]`
    pub fn from_parts(linear: Matrix2<f64>, translation: Vector2<f64>) -> Self {
        Self {
            matrix: Matrix3::new(
                linear[(0, 0)], linear[(0, 1)], translation.x,
                linear[(1, 0)], linear[(1, 1)], translation.y,
                0.0, 0.0, 1.0,
            ),
        }
    }

    pub fn apply(&self, (x, y): (f64, f64)) -> (f64, f64) {
        let m = &self.matrix;
        (
            m[(0, 0)] * x + m[(0, 1)] * y + m[(0, 2)],
            m[(1, 0)] * x + m[(1, 1)] * y + m[(1, 2)],
        )
    }

    pub fn inverse(&self) -> Option<Self> {
        self.matrix.try_inverse().map(|matrix| Self { matrix })
    }

    /// Isotropic scale of the linear part
    pub fn scale(&self) -> f64 {
        let m = &self.matrix;
        (m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)]).abs().sqrt()
    }

    /// Rotation angle in radians
    pub fn rotation(&self) -> f64 {
        self.matrix[(1, 0)].atan2(self.matrix[(0, 0)])
    }

    pub fn translation(&self) -> (f64, f64) {
        (self.matrix[(0, 2)], self.matrix[(1, 2)])
    }
}

/// Centered point set with its centroid and pooled standard deviation
struct Normalized {
    centroid: Vector2<f64>,
    std_dev: f64,
    points: Vec<Vector2<f64>>,
}

impl Normalized {
    fn new(points: &[(f64, f64)], which: &'static str) -> Result<Self, AlignmentError> {
        let mut distinct: Vec<(f64, f64)> = Vec::new();
        for p in points {
            if !distinct.contains(p) {
                distinct.push(*p);
            }
        }
        if distinct.len() < 2 {
            return Err(AlignmentError::InsufficientPoints(which));
        }

        let n = points.len() as f64;
        let centroid = points
            .iter()
            .fold(Vector2::zeros(), |acc: Vector2<f64>, &(x, y)| acc + Vector2::new(x, y))
            / n;
        let centered: Vec<Vector2<f64>> = points
            .iter()
            .map(|&(x, y)| Vector2::new(x, y) - centroid)
            .collect();

        // One scalar over both coordinates, not per axis
        let sum_sq: f64 = centered.iter().map(|p| p.norm_squared()).sum();
        let std_dev = (sum_sq / (2.0 * n)).sqrt();
        if !std_dev.is_finite() || std_dev <= f64::EPSILON {
            return Err(AlignmentError::InsufficientPoints(which));
        }

        Ok(Self {
            centroid,
            std_dev,
            points: centered.into_iter().map(|p| p / std_dev).collect(),
        })
    }
}

pub struct TransformSolver;

impl TransformSolver {
    /// Least-squares similarity transform mapping `source` landmarks onto
    /// `target` landmarks (ordinary Procrustes analysis).
    ///
    /// Only the alignment subset of `groups` takes part. The result maps
    /// source pixel coordinates into the target's frame.
    pub fn solve(
        source: &LandmarkSet,
        target: &LandmarkSet,
        groups: &LandmarkGroups,
    ) -> Result<AffineTransform, AlignmentError> {
        let indices = groups.alignment();
        let p1 = Normalized::new(&source.select(&indices)?, "source")?;
        let p2 = Normalized::new(&target.select(&indices)?, "target")?;

        // Cross-covariance P1^T * P2 over row vectors
        let covariance = p1
            .points
            .iter()
            .zip(&p2.points)
            .fold(Matrix2::zeros(), |acc: Matrix2<f64>, (a, b)| {
                acc + a * b.transpose()
            });

        let svd = covariance.svd(true, true);
        let u = svd.u.ok_or(AlignmentError::Decomposition)?;
        let v_t = svd.v_t.ok_or(AlignmentError::Decomposition)?;

        // Points are rows, so the rotation acting on column vectors is the
        // transpose of U * V^T.
        let rotation = (u * v_t).transpose();
        let scale = p2.std_dev / p1.std_dev;
        let linear = rotation * scale;
        let translation = p2.centroid - linear * p1.centroid;

        let transform = AffineTransform::from_parts(linear, translation);
        let (tx, ty) = transform.translation();
        log::debug!(
            "Similarity transform: scale={:.4}, rotation={:.2}°, translation=({:.1}, {:.1})",
            transform.scale(),
            transform.rotation().to_degrees(),
            tx,
            ty
        );

        Ok(transform)
    }
}
