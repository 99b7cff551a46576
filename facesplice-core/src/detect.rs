use crate::landmarks::{LandmarkError, LandmarkSet};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("No faces detected")]
    NoFaceDetected,
    #[error("Multiple faces detected ({0}), expected exactly one")]
    MultipleFacesDetected(usize),
    #[error("Failed to read landmark file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse landmark file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid landmarks: {0}")]
    Landmarks(#[from] LandmarkError),
}

/// Source of facial landmarks for an image.
///
/// Implementations must return exactly one face; zero or several candidate
/// faces are reported as errors and never retried.
pub trait LandmarkDetector {
    fn detect(&self, image: &RgbImage) -> Result<LandmarkSet, DetectionError>;
}

/// Landmarks recorded by an external detector, one entry per face.
///
/// Stored as JSON: `{"faces": [[[x, y], ...], ...]}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LandmarkFile {
    pub faces: Vec<Vec<[f64; 2]>>,
}

impl LandmarkFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DetectionError> {
        let contents = fs::read_to_string(path.as_ref())?;
        let file = Self::from_json(&contents)?;
        log::debug!(
            "Loaded {} face(s) from {}",
            file.faces.len(),
            path.as_ref().display()
        );
        Ok(file)
    }

    pub fn from_json(contents: &str) -> Result<Self, DetectionError> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Coordinates for an image resized by `factor`
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            faces: self
                .faces
                .iter()
                .map(|face| face.iter().map(|[x, y]| [x * factor, y * factor]).collect())
                .collect(),
        }
    }
}

impl From<&LandmarkSet> for LandmarkFile {
    fn from(landmarks: &LandmarkSet) -> Self {
        Self {
            faces: vec![landmarks.points().iter().map(|&(x, y)| [x, y]).collect()],
        }
    }
}

impl LandmarkDetector for LandmarkFile {
    fn detect(&self, image: &RgbImage) -> Result<LandmarkSet, DetectionError> {
        let face = match self.faces.as_slice() {
            [] => return Err(DetectionError::NoFaceDetected),
            [face] => face,
            faces => return Err(DetectionError::MultipleFacesDetected(faces.len())),
        };

        log::debug!(
            "Using {} recorded landmarks for {}x{} image",
            face.len(),
            image.width(),
            image.height()
        );
        Ok(LandmarkSet::new(face.iter().map(|&[x, y]| (x, y)).collect())?)
    }
}
