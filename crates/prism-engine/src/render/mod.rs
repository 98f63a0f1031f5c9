//! GPU rendering subsystem.
//!
//! A draw is assembled from two stages:
//! - `shader`: compiles and links a vertex/fragment pair, owns the pipeline and uniforms
//! - `geometry`: uploads attribute buffers and describes how each slot steps
//!
//! Both validate on the CPU before touching the device, so malformed input
//! surfaces as a `GraphicsError` instead of a wgpu validation panic.

mod buffer;
mod ctx;
pub mod geometry;
pub mod shader;

pub use ctx::{RenderCtx, RenderTarget};
pub use geometry::{
    AttributeDesc, AttributeSink, BufferUsage, DrawCounts, Geometry, GeometryStage, StepRate,
    VertexArrayLayout,
};
pub use shader::{LinkedShader, ShaderProgram, ShaderStage};
