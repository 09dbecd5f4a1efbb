//! framechain - frame-presentation demo.
//!
//! Opens a window, brings up the Vulkan backend and drives the frame
//! orchestrator until the window is closed. Geometry comes from an asset
//! pipeline that is not part of this binary, so the scene starts empty and
//! every frame clears to the configured color.
//!
//! Usage: `framechain [config.toml]` (defaults to `framechain.toml`).

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use glam::Vec3;
use tracing::info;

use framechain_core::{RendererConfig, Timer, init_logging};
use framechain_platform::{DrawableWindow, Window};
use framechain_renderer::{FrameOrchestrator, ObjectRenderSystem};
use framechain_rhi::{DescriptorSetHandle, VulkanBackend};
use framechain_scene::{Camera, ObjectMap};

const DEFAULT_CONFIG: &str = "framechain.toml";

/// Seconds between frame-rate log lines.
const STATS_INTERVAL: f32 = 5.0;

fn main() -> Result<()> {
    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = RendererConfig::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    init_logging(&config.log_filter);
    info!(
        "Starting framechain ({}, assets in {})",
        config_path.display(),
        config.asset_root.display()
    );

    let window = Window::new(&config.window).context("creating window")?;

    // SAFETY: the orchestrator below owns both the window and the only
    // reference to the backend, and drops the backend first.
    let backend = unsafe {
        VulkanBackend::new(&window, &config.window.title, config.renderer.validation)
            .context("initializing Vulkan")?
    };

    let mut orchestrator =
        FrameOrchestrator::new(Arc::new(backend), window, config.renderer.clone())
            .context("creating frame orchestrator")?;
    orchestrator.add_render_system(Box::new(ObjectRenderSystem::new()));

    let mut camera = Camera::new();
    camera.set_view_target(Vec3::new(0.0, 1.5, 4.0), Vec3::ZERO);
    camera.set_aspect(orchestrator.aspect_ratio());

    let objects = ObjectMap::<VulkanBackend>::new();

    info!("Initialization complete, entering main loop");

    let mut stats = Timer::new();
    let mut frames: u32 = 0;
    let mut generation = orchestrator.generation();

    while orchestrator.window_mut().poll_events() && !orchestrator.window().should_close() {
        if orchestrator.draw_frame(&camera, DescriptorSetHandle::NULL, &objects)? {
            frames += 1;
        }

        if orchestrator.generation() != generation {
            generation = orchestrator.generation();
            camera.set_aspect(orchestrator.aspect_ratio());
        }

        let elapsed = stats.elapsed().as_secs_f32();
        if elapsed >= STATS_INTERVAL {
            info!(
                "{:.1} fps ({} frames, chain generation {}, {})",
                frames as f32 / elapsed,
                frames,
                generation,
                orchestrator.extent()
            );
            stats = Timer::new();
            frames = 0;
        }
    }

    info!("Shutting down");
    drop(objects);
    drop(orchestrator);
    Ok(())
}
