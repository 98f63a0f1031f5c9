//! Instanced rendering sample.
//!
//! Draws one 0.1 x 0.1 quad five times with a single instanced call; color and
//! offset come from per-instance vertex buffers.

mod app;
mod renderer;
mod resources;
mod scene;

use anyhow::Result;
use prism_engine::device::GpuInit;
use prism_engine::logging::{init_logging, LoggingConfig};
use prism_engine::window::{Runtime, RuntimeConfig};
use winit::dpi::LogicalSize;

use crate::app::SampleApp;
use crate::scene::SceneConfig;

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let config = RuntimeConfig {
        title: "Prism: basic instancing".to_string(),
        initial_size: LogicalSize::new(800.0, 600.0),
    };

    let app = SampleApp::new(SceneConfig::default(), resources::embedded());
    Runtime::run(config, gpu_init(), app)
}

/// Linear surface: clear and vertex colors are shown as given, not sRGB-encoded.
fn gpu_init() -> GpuInit {
    GpuInit {
        prefer_srgb: false,
        ..GpuInit::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_asks_for_a_linear_surface() {
        let init = gpu_init();
        assert!(!init.prefer_srgb);
        assert_eq!(
            init.depth_stencil_format,
            Some(wgpu::TextureFormat::Depth24PlusStencil8)
        );
    }
}
