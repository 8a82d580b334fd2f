//! Paint state carried by draw commands.
//!
//! Scope:
//! - composite operations (blend modes)
//! - per-vertex color tag packing (tint + alpha)

mod blend;
mod tint;

pub use blend::{BlendMode, UnknownBlendMode};
pub use tint::pack_vertex_color;
