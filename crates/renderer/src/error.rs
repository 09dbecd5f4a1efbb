//! Error types for the frame-presentation core.

use thiserror::Error;

use framechain_core::Extent;
use framechain_rhi::{RhiError, vk};

/// Fatal conditions of the present chain and frame orchestrator.
///
/// Stale and suboptimal surfaces are not errors: they are absorbed by
/// recreating the chain and never reach the caller.
#[derive(Error, Debug)]
pub enum RendererError {
    /// A driver call was rejected.
    #[error("RHI error: {0}")]
    Rhi(#[from] RhiError),

    /// A rebuilt chain picked different formats than the one it replaces.
    #[error(
        "present chain formats changed from {old_color:?}/{old_depth:?} to {new_color:?}/{new_depth:?}"
    )]
    FormatChanged {
        old_color: vk::Format,
        old_depth: vk::Format,
        new_color: vk::Format,
        new_depth: vk::Format,
    },

    #[error("Invalid renderer configuration: {0}")]
    InvalidConfig(String),

    /// A present chain cannot be built for a zero-sized drawable.
    #[error("drawable extent {0} has a zero dimension")]
    ZeroExtent(Extent),

    /// The window closed before a usable drawable extent appeared.
    #[error("window closed while waiting for a drawable surface")]
    WindowClosed,
}

impl From<framechain_core::Error> for RendererError {
    fn from(err: framechain_core::Error) -> Self {
        RendererError::InvalidConfig(err.to_string())
    }
}

pub type RendererResult<T> = std::result::Result<T, RendererError>;
