//! Vector and color types shared by the engine and the sample.
//!
//! Scene space for the sample is the unit square, origin bottom-left, +Y up.
//! Projection matrices come from `glam`.

mod color;
mod vec2;

pub use color::ColorRgba;
pub use vec2::Vec2;
