//! Face alignment and seamless compositing.
//!
//! Given two photographs and a 68-point landmark set for each, the
//! [`FaceSwapper`] aligns the source face to the target with a similarity
//! transform, color-corrects it to the target's lighting and blends it in
//! through a feathered mask of the eye, brow, nose and mouth regions.

pub mod align;
pub mod blend;
pub mod codec;
pub mod color;
pub mod config;
pub mod debug;
pub mod detect;
pub mod landmarks;
pub mod mask;
pub mod raster;
pub mod warp;

use image::RgbImage;
use rayon::prelude::*;
use std::time::Instant;
use thiserror::Error;

use align::{AffineTransform, TransformSolver};
use color::ColorCorrector;
use debug::DebugSink;
use detect::LandmarkDetector;
use landmarks::LandmarkSet;
use mask::{Mask, MaskBuilder};
use warp::Warper;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Detection error: {0}")]
    Detection(#[from] detect::DetectionError),
    #[error("Landmark error: {0}")]
    Landmarks(#[from] landmarks::LandmarkError),
    #[error("Alignment error: {0}")]
    Alignment(#[from] align::AlignmentError),
    #[error("Mask error: {0}")]
    Mask(#[from] mask::MaskError),
    #[error("Warp error: {0}")]
    Warp(#[from] warp::WarpError),
    #[error("Color correction error: {0}")]
    Color(#[from] color::ColorError),
    #[error("Raster error: {0}")]
    Raster(#[from] raster::RasterError),
    #[error("Image I/O error: {0}")]
    Codec(#[from] codec::CodecError),
}

/// One image pair for [`FaceSwapper::swap_batch`]
#[derive(Debug, Clone, Copy)]
pub struct SwapJob<'a> {
    pub source: &'a RgbImage,
    pub source_landmarks: &'a LandmarkSet,
    pub target: &'a RgbImage,
    pub target_landmarks: &'a LandmarkSet,
}

pub struct FaceSwapper {
    config: config::Config,
    mask_builder: MaskBuilder,
    warper: Warper,
    color: ColorCorrector,
    debug: DebugSink,
}

impl FaceSwapper {
    /// Create a face swapper with the given configuration
    pub fn new(config: config::Config) -> Result<Self, Error> {
        config.validate()?;

        let mask_builder =
            MaskBuilder::new(config.landmarks.clone(), config.mask.feather_amount);
        let warper = Warper::new(config.warp.interpolation);
        let color = ColorCorrector::new(config.landmarks.clone(), config.color.blur_fraction);
        let debug = DebugSink::new(&config.debug);

        Ok(Self {
            config,
            mask_builder,
            warper,
            color,
            debug,
        })
    }

    pub fn config(&self) -> &config::Config {
        &self.config
    }

    /// Composite the face of `source` onto `target`.
    ///
    /// The result has the target's dimensions. Pixels outside the combined
    /// feature mask keep the target's values.
    pub fn swap_face(
        &self,
        source: &RgbImage,
        source_landmarks: &LandmarkSet,
        target: &RgbImage,
        target_landmarks: &LandmarkSet,
    ) -> Result<RgbImage, Error> {
        let start = Instant::now();
        let target_dims = target.dimensions();

        let transform =
            TransformSolver::solve(source_landmarks, target_landmarks, &self.config.landmarks)?;

        let combined = self.combined_mask(
            &transform,
            source.dimensions(),
            source_landmarks,
            target_dims,
            target_landmarks,
        )?;

        let target_f = raster::to_float(target);
        let warped = self
            .warper
            .warp(&raster::to_float(source), target_dims, &transform)?;
        let corrected = self.color.correct(&warped, &target_f, target_landmarks)?;

        let blended = blend::composite(&target_f, &corrected, &combined)?;
        let result = raster::to_rgb8(&blended);

        if self.debug.is_enabled() {
            self.debug.save_landmarks("source_landmarks", source, source_landmarks);
            self.debug.save_landmarks("target_landmarks", target, target_landmarks);
            self.debug.save_mask("combined_mask", &combined);
            self.debug.save_image("warped_source", &warped);
            self.debug.save_image("corrected_source", &corrected);
        }

        log::debug!(
            "Swap into {}x{} finished in {}ms",
            target_dims.0,
            target_dims.1,
            start.elapsed().as_millis()
        );
        Ok(result)
    }

    /// Run each detector on its image, then swap.
    /// Detection failures abort before any pixel work starts.
    pub fn swap_detected<S, T>(
        &self,
        source: &RgbImage,
        source_detector: &S,
        target: &RgbImage,
        target_detector: &T,
    ) -> Result<RgbImage, Error>
    where
        S: LandmarkDetector + ?Sized,
        T: LandmarkDetector + ?Sized,
    {
        let source_landmarks = source_detector.detect(source)?;
        let target_landmarks = target_detector.detect(target)?;
        self.swap_face(source, &source_landmarks, target, &target_landmarks)
    }

    /// Swap in both directions: returns (`a`'s face on `b`, `b`'s face on `a`)
    pub fn swap_both(
        &self,
        a: &RgbImage,
        a_landmarks: &LandmarkSet,
        b: &RgbImage,
        b_landmarks: &LandmarkSet,
    ) -> Result<(RgbImage, RgbImage), Error> {
        let a_on_b = self.swap_face(a, a_landmarks, b, b_landmarks)?;
        let b_on_a = self.swap_face(b, b_landmarks, a, a_landmarks)?;
        Ok((a_on_b, b_on_a))
    }

    /// Process independent pairs on the rayon pool, so at most one pair per
    /// worker thread is in flight. Results come back in job order.
    pub fn swap_batch(&self, jobs: &[SwapJob<'_>]) -> Vec<Result<RgbImage, Error>> {
        log::info!(
            "Processing {} image pair(s) on {} thread(s)",
            jobs.len(),
            rayon::current_num_threads()
        );
        jobs.par_iter()
            .map(|job| {
                self.swap_face(
                    job.source,
                    job.source_landmarks,
                    job.target,
                    job.target_landmarks,
                )
            })
            .collect()
    }

    /// Feathered feature mask of a single face, as grey levels
    pub fn feature_mask(
        &self,
        image: &RgbImage,
        landmarks: &LandmarkSet,
    ) -> Result<RgbImage, Error> {
        let mask = self.mask_builder.build(image.dimensions(), landmarks)?;
        Ok(debug::mask_to_rgb8(&mask))
    }

    /// Target mask combined with the source mask warped into the target's
    /// frame. Computed fresh for every swap.
    fn combined_mask(
        &self,
        transform: &AffineTransform,
        source_dims: (u32, u32),
        source_landmarks: &LandmarkSet,
        target_dims: (u32, u32),
        target_landmarks: &LandmarkSet,
    ) -> Result<Mask, Error> {
        let target_mask = self.mask_builder.build(target_dims, target_landmarks)?;
        let source_mask = self.mask_builder.build(source_dims, source_landmarks)?;
        let warped_mask = self.warper.warp(&source_mask, target_dims, transform)?;
        Ok(mask::combine_masks(&target_mask, &warped_mask)?)
    }
}
