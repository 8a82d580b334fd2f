//! Kiln: immediate-mode draw-call batcher for 2D display-list renderers on
//! WebGL-class GPUs.
//!
//! A scene walker draws through a [`RenderContext`]; the context accumulates
//! vertices and a queue of deferred commands and issues them to a [`gl::GlApi`]
//! implementation in as few draw calls as ordering allows.

pub mod batch;
pub mod context;
pub mod coords;
pub mod filter;
pub mod gl;
pub mod logging;
pub mod paint;
pub mod program;
pub mod target;
pub mod texture;

pub use batch::{DrawRegion, Mesh, MeshError};
pub use context::{
    Capabilities, ContextConfig, ContextEvent, ContextState, FlushStats, FramePhase, RenderContext,
};
pub use coords::{Matrix, Rect};
pub use filter::{BlurFilter, ColorMatrix, CustomFilter, Filter, GlowFilter};
pub use paint::BlendMode;
pub use target::{BufferKey, RenderBuffer};
pub use texture::{BitmapData, KhronosTextureContainer, RawPixels, TextureHandle};
