use crate::config::DebugConfig;
use crate::landmarks::LandmarkSet;
use crate::mask::Mask;
use crate::raster::{to_rgb8, FloatImage};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_hollow_circle_mut};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DebugError {
    #[error("Failed to create debug directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to save debug image: {0}")]
    Image(#[from] image::ImageError),
}

/// Writes intermediate pipeline buffers for inspection. Failures are logged,
/// never propagated into the swap itself.
pub struct DebugSink {
    output_dir: Option<PathBuf>,
    sequence: AtomicU32,
}

impl DebugSink {
    pub fn new(config: &DebugConfig) -> Self {
        Self {
            output_dir: config
                .save_intermediates
                .then(|| config.output_dir.clone()),
            sequence: AtomicU32::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.output_dir.is_some()
    }

    pub fn save_image(&self, label: &str, image: &FloatImage) {
        self.save(label, || to_rgb8(image));
    }

    pub fn save_mask(&self, label: &str, mask: &Mask) {
        self.save(label, || mask_to_rgb8(mask));
    }

    pub fn save_landmarks(&self, label: &str, image: &RgbImage, landmarks: &LandmarkSet) {
        self.save(label, || annotate_landmarks(image, landmarks));
    }

    fn save<F: FnOnce() -> RgbImage>(&self, label: &str, render: F) {
        let Some(dir) = &self.output_dir else {
            return;
        };

        let result = ensure_debug_dir(dir).and_then(|dir| {
            let path = dir.join(self.generate_debug_filename(label));
            render().save(&path)?;
            Ok(path)
        });

        match result {
            Ok(path) => log::info!("Debug image saved: {}", path.display()),
            Err(e) => log::warn!("Failed to save debug image '{}': {}", label, e),
        }
    }

    /// Generate a debug filename with timestamp
    fn generate_debug_filename(&self, label: &str) -> String {
        use chrono::Local;
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{}_{}_{}_{:03}.png", label, timestamp, std::process::id(), seq)
    }
}

/// Ensure debug output directory exists, creating it if necessary
fn ensure_debug_dir(debug_dir: &Path) -> Result<PathBuf, DebugError> {
    // Expand ~ to home directory if needed
    let expanded_path = match (debug_dir.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => debug_dir.to_path_buf(),
    };

    std::fs::create_dir_all(&expanded_path)?;
    Ok(expanded_path)
}

/// Render mask weights as grey levels
pub fn mask_to_rgb8(mask: &Mask) -> RgbImage {
    RgbImage::from_fn(mask.width(), mask.height(), |x, y| {
        let Rgb(px) = *mask.get_pixel(x, y);
        Rgb(px.map(|v| (v * 255.0).round().clamp(0.0, 255.0) as u8))
    })
}

/// Copy of `image` with every landmark marked
pub fn annotate_landmarks(image: &RgbImage, landmarks: &LandmarkSet) -> RgbImage {
    let mut annotated = image.clone();
    let red = Rgb([255, 0, 0]);
    let green = Rgb([0, 255, 0]);

    for &(x, y) in landmarks.points() {
        let (x, y) = (x.round() as i32, y.round() as i32);
        draw_hollow_circle_mut(&mut annotated, (x, y), 3, green);
        draw_cross_mut(&mut annotated, red, x, y);
    }

    annotated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::test_support::synthetic_face;

    #[test]
    fn test_mask_render() {
        let mut mask = Mask::new(2, 1);
        mask.put_pixel(1, 0, Rgb([1.0, 0.5, 0.0]));
        let rendered = mask_to_rgb8(&mask);
        assert_eq!(rendered.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(rendered.get_pixel(1, 0), &Rgb([255, 128, 0]));
    }

    #[test]
    fn test_annotation_marks_points() {
        let face = synthetic_face(10.0, 10.0, 80.0);
        let image = RgbImage::new(100, 100);
        let annotated = annotate_landmarks(&image, &face);

        let (x, y) = face.point(30).unwrap();
        assert_eq!(
            annotated.get_pixel(x.round() as u32, y.round() as u32),
            &Rgb([255, 0, 0])
        );
        assert_eq!(annotated.get_pixel(0, 99), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_sink_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DebugSink::new(&DebugConfig {
            save_intermediates: true,
            output_dir: dir.path().join("nested"),
        });
        sink.save_mask("mask", &Mask::new(4, 4));
        sink.save_image("warped", &FloatImage::new(4, 4));

        let count = std::fs::read_dir(dir.path().join("nested")).unwrap().count();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_disabled_sink_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DebugSink::new(&DebugConfig {
            save_intermediates: false,
            output_dir: dir.path().join("never"),
        });
        assert!(!sink.is_enabled());
        sink.save_mask("mask", &Mask::new(4, 4));
        assert!(!dir.path().join("never").exists());
    }
}
