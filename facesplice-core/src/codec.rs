use image::{imageops, RgbImage};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to decode {path}: {source}")]
    Decode {
        path: String,
        source: image::ImageError,
    },
    #[error("Failed to encode {path}: {source}")]
    Encode {
        path: String,
        source: image::ImageError,
    },
    #[error("Scaled image would be empty ({0}x{1})")]
    EmptyImage(u32, u32),
}

/// Decode an image file to 8-bit RGB, resized by `scale_factor`
pub fn decode<P: AsRef<Path>>(path: P, scale_factor: f64) -> Result<RgbImage, CodecError> {
    let path = path.as_ref();
    let image = image::open(path)
        .map_err(|source| CodecError::Decode {
            path: path.display().to_string(),
            source,
        })?
        .to_rgb8();

    if (scale_factor - 1.0).abs() < f64::EPSILON {
        return Ok(image);
    }

    let (width, height) = image.dimensions();
    let new_width = (width as f64 * scale_factor).round() as u32;
    let new_height = (height as f64 * scale_factor).round() as u32;
    if new_width == 0 || new_height == 0 {
        return Err(CodecError::EmptyImage(new_width, new_height));
    }
    log::debug!(
        "Resizing {}: {}x{} → {}x{}",
        path.display(),
        width,
        height,
        new_width,
        new_height
    );
    Ok(imageops::resize(
        &image,
        new_width,
        new_height,
        imageops::FilterType::Triangle,
    ))
}

/// Encode to the format implied by the file extension
pub fn encode<P: AsRef<Path>>(image: &RgbImage, path: P) -> Result<(), CodecError> {
    let path = path.as_ref();
    image.save(path).map_err(|source| CodecError::Encode {
        path: path.display().to_string(),
        source,
    })
}
