//! Per-batch geometry and the deferred command log replayed at flush.

mod cmd;
mod vertex;

pub use cmd::{
    ActivateBufferCmd, DrawCmdQueue, DrawCommand, DrawTextureCmd, ResizeCmd, SmoothingCmd,
    QUAD_TRIANGLES,
};
pub use vertex::{
    DrawRegion, Mesh, MeshError, Vertex, VertexArrayObject, DEFAULT_MAX_QUADS, MAX_VERTICES_U16,
};
