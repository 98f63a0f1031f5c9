use std::fmt;

use thiserror::Error;

/// Which half of a shader program a diagnostic refers to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ShaderKind {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderKind::Vertex => f.write_str("vertex"),
            ShaderKind::Fragment => f.write_str("fragment"),
        }
    }
}

/// Errors raised while building or drawing GPU resources.
///
/// Every variant is fatal for the resource being built; nothing here is retried.
#[derive(Debug, Error)]
pub enum GraphicsError {
    #[error("resource `{0}` not found")]
    ResourceNotFound(String),

    #[error("{stage} shader failed to compile:\n{message}")]
    ShaderCompile { stage: ShaderKind, message: String },

    #[error("shader program failed to link: {0}")]
    Link(String),

    #[error("shader program has no mat4x4<f32> uniform named `{0}`")]
    UnknownUniform(String),

    #[error("vertex attribute slot {slot}: {reason}")]
    InvalidAttribute { slot: u32, reason: String },

    #[error("vertex attribute slot {slot}: divisor {divisor} unsupported (expected 0 or 1)")]
    UnsupportedDivisor { slot: u32, divisor: u32 },

    #[error("renderer used before initialisation")]
    NotInitialised,
}
