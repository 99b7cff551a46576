use crate::color::COLOR_CORRECT_BLUR_FRAC;
use crate::landmarks::LandmarkGroups;
use crate::mask::FEATHER_AMOUNT;
use crate::warp::Interpolation;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub landmarks: LandmarkGroups,
    pub mask: MaskConfig,
    pub color: ColorConfig,
    pub warp: WarpConfig,
    pub input: InputConfig,
    pub debug: DebugConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskConfig {
    // Gaussian kernel used to feather the mask edge, must be odd
    #[serde(default = "default_feather_amount")]
    pub feather_amount: u32,
}

fn default_feather_amount() -> u32 {
    FEATHER_AMOUNT
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            feather_amount: default_feather_amount(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorConfig {
    // Blur kernel relative to the distance between the eyes
    #[serde(default = "default_blur_fraction")]
    pub blur_fraction: f64,
}

fn default_blur_fraction() -> f64 {
    COLOR_CORRECT_BLUR_FRAC
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            blur_fraction: default_blur_fraction(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WarpConfig {
    #[serde(default)]
    pub interpolation: Interpolation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    // Uniform resize applied to images on load, landmarks follow
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f64,
}

fn default_scale_factor() -> f64 {
    1.0
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            scale_factor: default_scale_factor(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugConfig {
    #[serde(default)]
    pub save_intermediates: bool,
    #[serde(default = "default_debug_dir")]
    pub output_dir: PathBuf,
}

fn default_debug_dir() -> PathBuf {
    PathBuf::from("~/.cache/facesplice/debug")
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            save_intermediates: false,
            output_dir: default_debug_dir(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain:
    /// 1. /etc/facesplice/facesplice.toml (system-wide)
    /// 2. ~/.config/facesplice/facesplice.toml (user)
    /// 3. Compiled defaults
    pub fn load() -> Result<Self, ConfigError> {
        // Try system-wide config
        if let Ok(config) = Self::load_from_path("/etc/facesplice/facesplice.toml") {
            config.validate()?;
            return Ok(config);
        }

        // Try user config
        if let Some(home) = std::env::var_os("HOME") {
            let user_config = PathBuf::from(home)
                .join(".config")
                .join("facesplice")
                .join("facesplice.toml");
            if let Ok(config) = Self::load_from_path(&user_config) {
                config.validate()?;
                return Ok(config);
            }
        }

        // Fall back to defaults
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Landmark groups must stay inside the 68-point model
        if let Some(group) = self.landmarks.invalid_group() {
            return Err(ConfigError::Validation(format!(
                "Landmark group '{}' is empty or out of range",
                group
            )));
        }

        // Blur primitives only accept positive odd kernels
        if self.mask.feather_amount == 0 || self.mask.feather_amount % 2 == 0 {
            return Err(ConfigError::Validation(
                "Feather amount must be a positive odd integer".to_string(),
            ));
        }

        if !(self.color.blur_fraction > 0.0 && self.color.blur_fraction.is_finite()) {
            return Err(ConfigError::Validation(
                "Color blur fraction must be greater than 0".to_string(),
            ));
        }

        if !(self.input.scale_factor > 0.0 && self.input.scale_factor.is_finite()) {
            return Err(ConfigError::Validation(
                "Input scale factor must be greater than 0".to_string(),
            ));
        }

        // Validate debug output directory path
        if self.debug.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "Debug output directory cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
