//! Text resources embedded in the sample binary.

use prism_engine::resources::ResourceTable;

pub const VERTEX_SHADER: &str = "Shader.vert";
pub const FRAGMENT_SHADER: &str = "Shader.frag";

pub fn embedded() -> ResourceTable {
    ResourceTable::new()
        .with_text(VERTEX_SHADER, include_str!("../shaders/Shader.vert"))
        .with_text(FRAGMENT_SHADER, include_str!("../shaders/Shader.frag"))
}
