//! Prism engine crate.
//!
//! This crate owns the platform + GPU runtime pieces used by the sample, plus the
//! shader and geometry stages an instanced draw is assembled from.

pub mod device;
pub mod window;
pub mod core;

pub mod logging;
pub mod coords;
pub mod render;
pub mod resources;

mod error;

pub use error::{GraphicsError, ShaderKind};
