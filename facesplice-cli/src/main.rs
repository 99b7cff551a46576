use anyhow::Context;
use clap::{Parser, Subcommand};
use facesplice_core::{
    codec,
    config::Config,
    debug,
    detect::{LandmarkDetector, LandmarkFile},
    landmarks::LandmarkSet,
    FaceSwapper, SwapJob,
};
use image::RgbImage;
use rayon::prelude::*;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "facesplice")]
#[command(about = "Align one face onto another and blend it in", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the system/user config chain)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Composite the source face onto the target image
    Swap {
        /// Image providing the face
        #[arg(long)]
        source: PathBuf,
        /// Landmark JSON for the source image
        #[arg(long)]
        source_landmarks: PathBuf,
        /// Image receiving the face
        #[arg(long)]
        target: PathBuf,
        /// Landmark JSON for the target image
        #[arg(long)]
        target_landmarks: PathBuf,
        /// Output image path
        #[arg(short, long)]
        output: PathBuf,
        /// Also write the reverse swap (target face onto source) here
        #[arg(long)]
        both: Option<PathBuf>,
    },
    /// Run every pair listed in a TOML manifest, in parallel
    Batch {
        /// Manifest with one [[pair]] table per swap
        manifest: PathBuf,
    },
    /// Write the feathered feature mask of one face
    Mask {
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        landmarks: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Draw the landmarks of one face
    Annotate {
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        landmarks: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Show configuration
    Config {
        /// Validate configuration
        #[arg(long)]
        validate: bool,
    },
}

#[derive(Debug, Deserialize)]
struct Manifest {
    pair: Vec<ManifestPair>,
}

#[derive(Debug, Deserialize)]
struct ManifestPair {
    source: PathBuf,
    source_landmarks: PathBuf,
    target: PathBuf,
    target_landmarks: PathBuf,
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .init();

    let config = match &cli.config {
        Some(path) => {
            let config = Config::load_from_path(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?;
            config.validate()?;
            config
        }
        None => Config::load()?,
    };

    match cli.command {
        Commands::Swap {
            source,
            source_landmarks,
            target,
            target_landmarks,
            output,
            both,
        } => cmd_swap(
            config,
            &source,
            &source_landmarks,
            &target,
            &target_landmarks,
            &output,
            both.as_deref(),
        ),
        Commands::Batch { manifest } => cmd_batch(config, &manifest),
        Commands::Mask {
            image,
            landmarks,
            output,
        } => cmd_mask(config, &image, &landmarks, &output),
        Commands::Annotate {
            image,
            landmarks,
            output,
        } => cmd_annotate(config, &image, &landmarks, &output),
        Commands::Config { validate } => cmd_config(config, validate),
    }
}

/// Decode an image and detect its single face from the landmark sidecar
fn load_face(
    config: &Config,
    image_path: &Path,
    landmarks_path: &Path,
) -> anyhow::Result<(RgbImage, LandmarkSet)> {
    let scale = config.input.scale_factor;
    let image = codec::decode(image_path, scale)?;
    let detector = LandmarkFile::load(landmarks_path)
        .with_context(|| format!("Failed to load landmarks {}", landmarks_path.display()))?
        .scaled(scale);
    let landmarks = detector
        .detect(&image)
        .with_context(|| format!("No usable face in {}", image_path.display()))?;
    log::debug!(
        "Loaded {} ({}x{})",
        image_path.display(),
        image.width(),
        image.height()
    );
    Ok((image, landmarks))
}

fn cmd_swap(
    config: Config,
    source: &Path,
    source_landmarks: &Path,
    target: &Path,
    target_landmarks: &Path,
    output: &Path,
    both: Option<&Path>,
) -> anyhow::Result<()> {
    let (source_image, source_lm) = load_face(&config, source, source_landmarks)?;
    let (target_image, target_lm) = load_face(&config, target, target_landmarks)?;
    let swapper = FaceSwapper::new(config)?;

    let start = Instant::now();
    match both {
        Some(reverse_output) => {
            let (on_target, on_source) =
                swapper.swap_both(&source_image, &source_lm, &target_image, &target_lm)?;
            codec::encode(&on_target, output)?;
            codec::encode(&on_source, reverse_output)?;
            println!("✓ Saved: {}", output.display());
            println!("✓ Saved: {}", reverse_output.display());
        }
        None => {
            let result =
                swapper.swap_face(&source_image, &source_lm, &target_image, &target_lm)?;
            codec::encode(&result, output)?;
            println!("✓ Saved: {}", output.display());
        }
    }
    println!("Total time: {:.2}ms", start.elapsed().as_secs_f64() * 1000.0);

    Ok(())
}

type LoadedPair = ((RgbImage, LandmarkSet), (RgbImage, LandmarkSet));

fn cmd_batch(config: Config, manifest_path: &Path) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(manifest_path)
        .with_context(|| format!("Failed to read manifest {}", manifest_path.display()))?;
    let manifest: Manifest = toml::from_str(&contents)?;

    let swapper = FaceSwapper::new(config)?;
    // Only one chunk of decoded images is held in memory at a time
    let chunk_size = rayon::current_num_threads().max(1);

    let start = Instant::now();
    let mut failures = 0;
    for chunk in manifest.pair.chunks(chunk_size) {
        let loaded: Vec<anyhow::Result<LoadedPair>> = chunk
            .par_iter()
            .map(|pair| {
                let source = load_face(swapper.config(), &pair.source, &pair.source_landmarks)?;
                let target = load_face(swapper.config(), &pair.target, &pair.target_landmarks)?;
                Ok((source, target))
            })
            .collect();

        let jobs: Vec<SwapJob> = loaded
            .iter()
            .filter_map(|faces| faces.as_ref().ok())
            .map(|((source, source_lm), (target, target_lm))| SwapJob {
                source,
                source_landmarks: source_lm,
                target,
                target_landmarks: target_lm,
            })
            .collect();
        let mut swapped = swapper.swap_batch(&jobs).into_iter();

        for (pair, faces) in chunk.iter().zip(&loaded) {
            let outcome = match faces {
                Err(e) => Err(anyhow::anyhow!("{:#}", e)),
                Ok(_) => swapped
                    .next()
                    .context("Swap result missing")
                    .and_then(|result| Ok(result?))
                    .and_then(|image| Ok(codec::encode(&image, &pair.output)?)),
            };
            match outcome {
                Ok(()) => println!("✓ {}", pair.output.display()),
                Err(e) => {
                    failures += 1;
                    println!("❌ {}: {:#}", pair.output.display(), e);
                }
            }
        }
    }
    println!(
        "\n{} of {} pair(s) done in {:.2}ms",
        manifest.pair.len() - failures,
        manifest.pair.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    if failures > 0 {
        anyhow::bail!("{} pair(s) failed", failures);
    }
    Ok(())
}

fn cmd_mask(config: Config, image: &Path, landmarks: &Path, output: &Path) -> anyhow::Result<()> {
    let (image, landmarks) = load_face(&config, image, landmarks)?;
    let swapper = FaceSwapper::new(config)?;

    let mask = swapper.feature_mask(&image, &landmarks)?;
    codec::encode(&mask, output)?;
    println!("✓ Mask saved: {}", output.display());

    Ok(())
}

fn cmd_annotate(
    config: Config,
    image: &Path,
    landmarks: &Path,
    output: &Path,
) -> anyhow::Result<()> {
    let (image, landmarks) = load_face(&config, image, landmarks)?;

    let annotated = debug::annotate_landmarks(&image, &landmarks);
    codec::encode(&annotated, output)?;
    println!("✓ Annotated image saved: {}", output.display());

    Ok(())
}

fn cmd_config(config: Config, validate: bool) -> anyhow::Result<()> {
    if validate {
        config.validate()?;
        println!("✓ Configuration is valid");
        return Ok(());
    }

    println!("Configuration:");
    println!();

    let groups = &config.landmarks;
    println!("[landmarks]");
    println!("  jaw = {:?}", groups.jaw);
    println!("  right_brow = {:?}", groups.right_brow);
    println!("  left_brow = {:?}", groups.left_brow);
    println!("  nose = {:?}", groups.nose);
    println!("  right_eye = {:?}", groups.right_eye);
    println!("  left_eye = {:?}", groups.left_eye);
    println!("  mouth = {:?}", groups.mouth);
    println!();

    println!("[mask]");
    println!("  feather_amount = {}", config.mask.feather_amount);
    println!();

    println!("[color]");
    println!("  blur_fraction = {}", config.color.blur_fraction);
    println!();

    println!("[warp]");
    println!("  interpolation = {:?}", config.warp.interpolation);
    println!();

    println!("[input]");
    println!("  scale_factor = {}", config.input.scale_factor);
    println!();

    println!("[debug]");
    println!("  save_intermediates = {}", config.debug.save_intermediates);
    println!("  output_dir = {:?}", config.debug.output_dir);

    Ok(())
}
