//! Core utilities for the framechain renderer.
//!
//! This crate provides foundational types and utilities used across the renderer:
//! - Error types and result aliases
//! - Logging initialization
//! - Timer utilities
//! - Drawable extents
//! - Configuration management

mod config;
mod error;
mod extent;
mod logging;
mod timer;

pub use config::{
    ColorFormat, DEFAULT_FRAMES_IN_FLIGHT, MAX_FRAMES_IN_FLIGHT, PresentPreference,
    RendererConfig, RendererSettings, WindowConfig,
};
pub use error::{Error, Result};
pub use extent::Extent;
pub use logging::init_logging;
pub use timer::Timer;
