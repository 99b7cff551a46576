use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LandmarkError {
    #[error("Expected {expected} landmarks, got {actual}")]
    InvalidLandmarkCount { expected: usize, actual: usize },
    #[error("Landmark index {index} out of range for {len} points")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Number of points produced by the 68-point (iBUG) landmark model
pub const LANDMARK_COUNT: usize = 68;

/// Ordered 68-point facial landmark set, in pixel coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: Vec<(f64, f64)>,
}

impl LandmarkSet {
    pub fn new(points: Vec<(f64, f64)>) -> Result<Self, LandmarkError> {
        if points.len() != LANDMARK_COUNT {
            return Err(LandmarkError::InvalidLandmarkCount {
                expected: LANDMARK_COUNT,
                actual: points.len(),
            });
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn point(&self, index: usize) -> Option<(f64, f64)> {
        self.points.get(index).copied()
    }

    /// Collect the points named by `indices`, in order
    pub fn select(&self, indices: &[usize]) -> Result<Vec<(f64, f64)>, LandmarkError> {
        indices
            .iter()
            .map(|&index| {
                self.point(index).ok_or(LandmarkError::IndexOutOfRange {
                    index,
                    len: self.points.len(),
                })
            })
            .collect()
    }

    /// Arithmetic mean of the points named by `indices`
    pub fn centroid(&self, indices: &[usize]) -> Result<(f64, f64), LandmarkError> {
        let points = self.select(indices)?;
        let n = points.len().max(1) as f64;
        let (sx, sy) = points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + x, sy + y));
        Ok((sx / n, sy / n))
    }
}

/// Index ranges of the anatomical regions of a landmark model.
///
/// Defaults follow the iBUG 68-point layout. Ranges are half-open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LandmarkGroups {
    pub jaw: Range<usize>,
    pub right_brow: Range<usize>,
    pub left_brow: Range<usize>,
    pub nose: Range<usize>,
    pub right_eye: Range<usize>,
    pub left_eye: Range<usize>,
    pub mouth: Range<usize>,
}

impl Default for LandmarkGroups {
    fn default() -> Self {
        Self {
            jaw: 0..17,
            right_brow: 17..22,
            left_brow: 22..27,
            nose: 27..35,
            right_eye: 36..42,
            left_eye: 42..48,
            mouth: 48..61,
        }
    }
}

impl LandmarkGroups {
    /// Points used to solve the alignment transform. The jaw outline is
    /// excluded since it moves with expression and head angle.
    pub fn alignment(&self) -> Vec<usize> {
        self.left_brow
            .clone()
            .chain(self.right_eye.clone())
            .chain(self.left_eye.clone())
            .chain(self.right_brow.clone())
            .chain(self.nose.clone())
            .chain(self.mouth.clone())
            .collect()
    }

    /// Groups whose convex hulls make up the face mask
    pub fn overlay(&self) -> [Vec<usize>; 2] {
        [
            self.left_eye
                .clone()
                .chain(self.right_eye.clone())
                .chain(self.left_brow.clone())
                .chain(self.right_brow.clone())
                .collect(),
            self.nose.clone().chain(self.mouth.clone()).collect(),
        ]
    }

    pub fn left_eye_indices(&self) -> Vec<usize> {
        self.left_eye.clone().collect()
    }

    pub fn right_eye_indices(&self) -> Vec<usize> {
        self.right_eye.clone().collect()
    }

    fn all(&self) -> [(&'static str, &Range<usize>); 7] {
        [
            ("jaw", &self.jaw),
            ("right_brow", &self.right_brow),
            ("left_brow", &self.left_brow),
            ("nose", &self.nose),
            ("right_eye", &self.right_eye),
            ("left_eye", &self.left_eye),
            ("mouth", &self.mouth),
        ]
    }

    /// First group that is empty or reaches past `LANDMARK_COUNT`
    pub fn invalid_group(&self) -> Option<&'static str> {
        self.all()
            .into_iter()
            .find(|(_, range)| range.is_empty() || range.end > LANDMARK_COUNT)
            .map(|(name, _)| name)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::LandmarkSet;

    /// Approximate iBUG mean shape in a unit square
    const MEAN_FACE: [(f64, f64); 68] = [
        // Jaw line (0-16)
        (0.10, 0.35), (0.11, 0.45), (0.12, 0.55), (0.14, 0.65), (0.18, 0.73),
        (0.24, 0.80), (0.32, 0.85), (0.41, 0.88), (0.50, 0.89), (0.59, 0.88),
        (0.68, 0.85), (0.76, 0.80), (0.82, 0.73), (0.86, 0.65), (0.88, 0.55),
        (0.89, 0.45), (0.90, 0.35),
        // Right brow (17-21)
        (0.20, 0.26), (0.25, 0.22), (0.32, 0.21), (0.38, 0.23), (0.43, 0.27),
        // Left brow (22-26)
        (0.57, 0.27), (0.62, 0.23), (0.68, 0.21), (0.75, 0.22), (0.80, 0.26),
        // Nose bridge (27-30)
        (0.50, 0.32), (0.50, 0.40), (0.50, 0.48), (0.50, 0.55),
        // Nose bottom (31-35)
        (0.40, 0.58), (0.45, 0.60), (0.50, 0.62), (0.55, 0.60), (0.60, 0.58),
        // Right eye (36-41)
        (0.24, 0.32), (0.28, 0.29), (0.34, 0.29), (0.38, 0.33), (0.34, 0.35),
        (0.28, 0.35),
        // Left eye (42-47)
        (0.62, 0.33), (0.66, 0.29), (0.72, 0.29), (0.76, 0.32), (0.72, 0.35),
        (0.66, 0.35),
        // Outer lip (48-59)
        (0.32, 0.72), (0.38, 0.68), (0.44, 0.66), (0.50, 0.67), (0.56, 0.66),
        (0.62, 0.68), (0.68, 0.72), (0.62, 0.78), (0.56, 0.80), (0.50, 0.81),
        (0.44, 0.80), (0.38, 0.78),
        // Inner lip (60-67)
        (0.36, 0.72), (0.44, 0.70), (0.50, 0.70), (0.56, 0.70), (0.64, 0.72),
        (0.56, 0.74), (0.50, 0.75), (0.44, 0.74),
    ];

    /// A face filling the `size`×`size` box with top-left corner `(x, y)`
    pub fn synthetic_face(x: f64, y: f64, size: f64) -> LandmarkSet {
        LandmarkSet::new(
            MEAN_FACE
                .iter()
                .map(|&(u, v)| (x + u * size, y + v * size))
                .collect(),
        )
        .unwrap()
    }

    /// Apply `p ↦ s·R(θ)·p + t` to every point
    pub fn similar_face(face: &LandmarkSet, s: f64, theta: f64, t: (f64, f64)) -> LandmarkSet {
        let (sin, cos) = theta.sin_cos();
        LandmarkSet::new(
            face.points()
                .iter()
                .map(|&(x, y)| (s * (cos * x - sin * y) + t.0, s * (sin * x + cos * y) + t.1))
                .collect(),
        )
        .unwrap()
    }
}
