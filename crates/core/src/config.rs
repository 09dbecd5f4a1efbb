//! Renderer configuration loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration:
//!
//! ```toml
//! asset_root = "assets"
//!
//! [window]
//! title = "framechain"
//! width = 1280
//! height = 720
//!
//! [renderer]
//! frames_in_flight = 2
//! present_mode = "low_latency"
//! msaa_samples = 4
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Frame slots used when the configuration does not say otherwise.
pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;

/// Upper bound on frame slots accepted by [`RendererConfig::validate`].
pub const MAX_FRAMES_IN_FLIGHT: usize = 4;

/// Top-level configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Directory asset-relative paths are resolved against.
    pub asset_root: PathBuf,
    /// Default `tracing` filter used when `RUST_LOG` is not set.
    pub log_filter: String,
    pub window: WindowConfig,
    pub renderer: RendererSettings,
}

/// Initial window parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "framechain".to_string(),
            width: 800,
            height: 600,
        }
    }
}

/// Present chain and frame pacing parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    /// Number of frame slots the CPU may record ahead of the GPU.
    pub frames_in_flight: usize,
    /// Clear color of the multisampled color attachment (RGBA).
    pub clear_color: [f32; 4],
    /// Preferred pixel format of the presentable images.
    pub surface_format: ColorFormat,
    pub present_mode: PresentPreference,
    /// Explicit presentable image count; clamped to what the surface allows.
    pub image_count: Option<u32>,
    /// Requested multisample count, clamped to the device maximum.
    pub msaa_samples: u32,
    /// Enable the Khronos validation layer when it is installed.
    pub validation: bool,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            clear_color: [0.01, 0.01, 0.01, 1.0],
            surface_format: ColorFormat::default(),
            present_mode: PresentPreference::default(),
            image_count: None,
            msaa_samples: 8,
            validation: cfg!(debug_assertions),
        }
    }
}

impl RendererSettings {
    /// Checks the values the frame orchestrator depends on.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_FRAMES_IN_FLIGHT).contains(&self.frames_in_flight) {
            return Err(Error::Config(format!(
                "frames_in_flight must be between 1 and {}, got {}",
                MAX_FRAMES_IN_FLIGHT, self.frames_in_flight
            )));
        }
        // The forward pass always resolves, so a single sample is not allowed.
        if !self.msaa_samples.is_power_of_two() || !(2..=64).contains(&self.msaa_samples) {
            return Err(Error::Config(format!(
                "msaa_samples must be a power of two between 2 and 64, got {}",
                self.msaa_samples
            )));
        }
        if self.image_count == Some(0) {
            return Err(Error::Config("image_count must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Presentable image formats that can be requested. Each is paired with the
/// sRGB non-linear color space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorFormat {
    #[default]
    Bgra8Srgb,
    Bgra8Unorm,
    Rgba8Srgb,
    Rgba8Unorm,
}

/// Presentation pacing preference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentPreference {
    /// Mailbox when the surface offers it, otherwise vsync.
    #[default]
    LowLatency,
    /// Always vsync (FIFO).
    Vsync,
}

impl RendererConfig {
    /// Read and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No configuration at {}, using defaults", path.display());
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        Self::load(path)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the renderer cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.renderer.validate()?;
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        Ok(())
    }

    /// Resolve a path relative to the configured asset root.
    pub fn asset_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.asset_root.join(relative)
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("."),
            log_filter: "info,framechain=debug".to_string(),
            window: WindowConfig::default(),
            renderer: RendererSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = RendererConfig::from_toml_str("").unwrap();
        assert_eq!(config, RendererConfig::default());
        assert_eq!(config.renderer.frames_in_flight, DEFAULT_FRAMES_IN_FLIGHT);
        assert_eq!(config.renderer.clear_color, [0.01, 0.01, 0.01, 1.0]);
        assert_eq!(config.renderer.present_mode, PresentPreference::LowLatency);
    }

    #[test]
    fn test_partial_document() {
        let config = RendererConfig::from_toml_str(
            r#"
            asset_root = "assets"

            [window]
            width = 1280

            [renderer]
            frames_in_flight = 3
            surface_format = "rgba8_unorm"
            present_mode = "vsync"
            image_count = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.renderer.frames_in_flight, 3);
        assert_eq!(config.renderer.surface_format, ColorFormat::Rgba8Unorm);
        assert_eq!(config.renderer.present_mode, PresentPreference::Vsync);
        assert_eq!(config.renderer.image_count, Some(4));
        assert_eq!(
            config.asset_path("models/cube.obj"),
            PathBuf::from("assets/models/cube.obj")
        );
    }

    #[test]
    fn test_rejects_out_of_range_frames_in_flight() {
        for n in [0, MAX_FRAMES_IN_FLIGHT + 1] {
            let text = format!("[renderer]\nframes_in_flight = {n}");
            assert!(matches!(
                RendererConfig::from_toml_str(&text),
                Err(Error::Config(_))
            ));
        }
    }

    #[test]
    fn test_rejects_bad_sample_count() {
        for samples in [1, 3, 128] {
            let text = format!("[renderer]\nmsaa_samples = {samples}");
            assert!(matches!(
                RendererConfig::from_toml_str(&text),
                Err(Error::Config(_))
            ));
        }
    }

    #[test]
    fn test_rejects_unknown_format_name() {
        let result = RendererConfig::from_toml_str("[renderer]\nsurface_format = \"rgb565\"");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = RendererConfig::load_or_default("does/not/exist/framechain.toml").unwrap();
        assert_eq!(config, RendererConfig::default());
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = RendererConfig::load("does/not/exist/framechain.toml");
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
