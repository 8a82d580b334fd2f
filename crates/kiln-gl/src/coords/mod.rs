//! Geometry types consumed by the batcher.
//!
//! Canonical CPU space:
//! - Logical pixels
//! - Origin top-left
//! - +X right, +Y down
//!
//! Shaders convert to clip space with a projection vector of
//! `(width / 2, -height / 2)` for the active target.

mod matrix;
mod rect;

pub use matrix::Matrix;
pub use rect::Rect;
