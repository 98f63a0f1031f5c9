use glam::Mat4;
use prism_engine::render::{
    Geometry, GeometryStage, LinkedShader, RenderCtx, RenderTarget, ShaderProgram, ShaderStage,
};
use prism_engine::resources::ResourceTable;
use prism_engine::GraphicsError;

use crate::resources::{FRAGMENT_SHADER, VERTEX_SHADER};
use crate::scene::{SceneConfig, SceneData, ATTRIBUTES, MVP_UNIFORM};

/// Everything a frame needs, built once by [`FrameRenderer::initialise`].
pub struct SceneState {
    pub mvp: Mat4,
    pub clear_color: wgpu::Color,
    pub program: ShaderProgram,
    pub geometry: Geometry,
}

enum State {
    Uninitialized,
    Ready(SceneState),
}

/// Owns the scene and draws it.
///
/// `Uninitialized → Ready` happens once in `initialise`; `draw` may then be
/// called any number of times.
pub struct FrameRenderer {
    config: SceneConfig,
    resources: ResourceTable,
    state: State,
}

impl FrameRenderer {
    pub fn new(config: SceneConfig, resources: ResourceTable) -> Self {
        Self {
            config,
            resources,
            state: State::Uninitialized,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }

    /// Scene state, or `NotInitialised` before `initialise` succeeded.
    pub fn scene(&self) -> Result<&SceneState, GraphicsError> {
        match &self.state {
            State::Ready(scene) => Ok(scene),
            State::Uninitialized => Err(GraphicsError::NotInitialised),
        }
    }

    /// Compiles the shaders and uploads the geometry.
    ///
    /// Calling it again rebuilds the scene from the same data; the previous
    /// buffers are released when the old state drops.
    pub fn initialise(
        &mut self,
        ctx: &RenderCtx<'_>,
        width: u32,
        height: u32,
    ) -> Result<(), GraphicsError> {
        log::info!("initialising scene for a {width}x{height} surface");

        let linked = link_program(&self.resources)?;

        let data = SceneData::new();
        let mut stage = GeometryStage::create(ctx.device, "prism quads");
        data.upload(&mut stage)?;
        let geometry = stage.finish()?;
        debug_assert_eq!(geometry.instance_count(), data.instance_count());

        let program = linked.create_program(
            ctx,
            "prism instancing",
            &geometry.vertex_buffer_layouts(),
            wgpu::PrimitiveTopology::TriangleStrip,
        )?;

        self.state = State::Ready(SceneState {
            mvp: self.config.projection.matrix(),
            clear_color: self.config.clear_color.into(),
            program,
            geometry,
        });
        Ok(())
    }

    pub fn draw(&self, ctx: &RenderCtx<'_>, target: &mut RenderTarget<'_>) -> Result<(), GraphicsError> {
        draw_scene(self.scene()?, ctx, target)
    }

    /// Drops the scene, releasing its GPU buffers.
    pub fn teardown(&mut self) {
        if let State::Ready(_) = std::mem::replace(&mut self.state, State::Uninitialized) {
            log::info!("scene torn down");
        }
    }
}

/// Loads both shader sources, binds the attribute names and links them.
pub fn link_program(resources: &ResourceTable) -> Result<LinkedShader, GraphicsError> {
    let vertex_source = resources.load_text(VERTEX_SHADER)?;
    let fragment_source = resources.load_text(FRAGMENT_SHADER)?;

    let mut stage = ShaderStage::compile(vertex_source, fragment_source)?;
    for (slot, name) in ATTRIBUTES {
        stage.bind_attribute_location(slot, name);
    }
    let linked = stage.link()?;
    linked.uniform_binding(MVP_UNIFORM)?;
    Ok(linked)
}

/// Clear, bind, draw every instance in one call, unbind.
pub fn draw_scene(
    scene: &SceneState,
    ctx: &RenderCtx<'_>,
    target: &mut RenderTarget<'_>,
) -> Result<(), GraphicsError> {
    target.clear(scene.clear_color);
    scene
        .program
        .set_uniform_matrix4(ctx.queue, MVP_UNIFORM, &scene.mvp)?;

    let mut pass = target.begin_pass("prism instanced pass");
    scene.program.bind(&mut pass);
    scene.geometry.bind(&mut pass);
    pass.draw(
        0..scene.geometry.vertex_count(),
        0..scene.geometry.instance_count(),
    );
    // Ending the pass unbinds the geometry and the program.
    drop(pass);

    Ok(())
}
