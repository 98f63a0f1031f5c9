use prism_engine::core::{App, AppControl, FrameCtx};
use prism_engine::resources::ResourceTable;
use prism_engine::GraphicsError;

use crate::renderer::FrameRenderer;
use crate::scene::SceneConfig;

/// Glue between the engine runtime and the frame renderer.
pub struct SampleApp {
    renderer: FrameRenderer,
    failure: Option<GraphicsError>,
}

impl SampleApp {
    pub fn new(config: SceneConfig, resources: ResourceTable) -> Self {
        Self {
            renderer: FrameRenderer::new(config, resources),
            failure: None,
        }
    }

    fn frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> Result<AppControl, GraphicsError> {
        if !self.renderer.is_ready() {
            let (width, height) = ctx.size();
            self.renderer.initialise(&ctx.gpu.render_ctx(), width, height)?;
        }

        let renderer = &self.renderer;
        ctx.render(|rctx, target| renderer.draw(rctx, target))
    }

    /// Records `err` as the reason the app stops.
    fn fail(&mut self, err: GraphicsError) -> AppControl {
        log::error!("stopping: {err}");
        self.failure = Some(err);
        AppControl::Exit
    }
}

impl App for SampleApp {
    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl {
        match self.frame(ctx) {
            Ok(control) => control,
            Err(err) => self.fail(err),
        }
    }

    fn on_exit(&mut self) {
        self.renderer.teardown();
    }

    fn take_error(&mut self) -> Option<anyhow::Error> {
        self.failure.take().map(anyhow::Error::from)
    }
}
