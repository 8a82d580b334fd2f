//! WebGL 1 call surface consumed by the batcher.
//!
//! The batcher never talks to a driver directly. Everything it needs from the
//! platform goes through [`GlApi`], which mirrors the subset of
//! `WebGLRenderingContext` used by a 2D sprite renderer:
//! - buffer/texture/framebuffer/program object management
//! - fixed-function state (blend, stencil, scissor, color mask)
//! - indexed triangle draws with 16-bit indices
//!
//! Object creation returns `None` when the context is lost or out of memory,
//! matching WebGL's `null` returns.
//!
//! [`TraceGl`] records calls for tests and headless runs; with the `glow`
//! feature, [`GlowGl`] drives a real context.

#[cfg(feature = "glow")]
mod glow;
mod trace;

#[cfg(feature = "glow")]
pub use self::glow::GlowGl;
pub use trace::{GlCall, TraceGl};

use std::fmt;

macro_rules! gl_handle {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
            pub struct $name(pub u32);
        )*
    };
}

gl_handle! {
    /// `WebGLBuffer`.
    BufferId;
    /// `WebGLTexture`.
    TextureId;
    /// `WebGLProgram` (linked).
    ProgramId;
    /// `WebGLFramebuffer`.
    FramebufferId;
    /// `WebGLRenderbuffer`.
    RenderbufferId;
    /// Uniform location within a linked program.
    UniformLocation;
    /// Vertex attribute location within a linked program.
    AttribLocation;
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferTarget {
    Array,
    ElementArray,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferUsage {
    StaticDraw,
    StreamDraw,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Capability {
    Blend,
    CullFace,
    DepthTest,
    ScissorTest,
    StencilTest,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StencilFunc {
    Always,
    Equal,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StencilOp {
    Keep,
    Incr,
    Decr,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureFilter {
    Linear,
    Nearest,
}

/// Which buffers a `clear` call touches.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ClearTarget {
    Color,
    Stencil,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum AttribType {
    Float,
    UnsignedByte,
}

/// Arguments of one `vertexAttribPointer` call.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct VertexAttrib {
    pub location: AttribLocation,
    pub components: i32,
    pub ty: AttribType,
    pub normalized: bool,
    pub stride: i32,
    pub offset: i32,
}

/// Integer queries used by the capability probe.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum GlParameter {
    MaxTextureSize,
    MaxCubeMapTextureSize,
    MaxRenderbufferSize,
    MaxTextureImageUnits,
    MaxCombinedTextureImageUnits,
    MaxVertexTextureImageUnits,
    MaxVertexAttribs,
    MaxVaryingVectors,
    MaxVertexUniformVectors,
    MaxFragmentUniformVectors,
}

/// A value written to a program uniform.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat4([f32; 16]),
    FloatArray(Vec<f32>),
}

/// An active attribute reported after linking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveAttribute {
    pub name: String,
    pub location: AttribLocation,
}

/// An active uniform reported after linking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveUniform {
    pub name: String,
    pub location: UniformLocation,
}

/// Shader compile or program link failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramError {
    /// The context could not allocate a shader or program object.
    Unavailable,
    Compile { stage: ShaderStage, log: String },
    Link { log: String },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ProgramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgramError::Unavailable => write!(f, "program objects unavailable"),
            ProgramError::Compile { stage, log } => {
                write!(f, "{stage:?} shader failed to compile: {log}")
            }
            ProgramError::Link { log } => write!(f, "program failed to link: {log}"),
        }
    }
}

impl std::error::Error for ProgramError {}

/// The WebGL 1 subset used by the batcher.
///
/// Implementations map these calls 1:1 onto a real context. Texture calls
/// operate on the texture bound to `TEXTURE_2D` on unit 0; renderbuffer
/// calls on the bound `RENDERBUFFER`; attachment calls on the bound
/// `FRAMEBUFFER`.
pub trait GlApi {
    fn is_context_lost(&self) -> bool;
    fn get_parameter(&self, parameter: GlParameter) -> u32;
    fn supported_extensions(&self) -> Vec<String>;
    /// Whether both shader stages report non-zero `HIGH_FLOAT` precision.
    fn high_precision_float(&self) -> bool;

    // fixed-function state
    fn enable(&mut self, cap: Capability);
    fn disable(&mut self, cap: Capability);
    fn color_mask(&mut self, enabled: bool);
    fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor);
    fn stencil_func(&mut self, func: StencilFunc, reference: u32, mask: u32);
    fn stencil_op(&mut self, fail: StencilOp, zfail: StencilOp, zpass: StencilOp);
    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32);
    fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32);
    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32);
    fn clear(&mut self, target: ClearTarget);

    // buffers
    fn create_buffer(&mut self) -> Option<BufferId>;
    fn bind_buffer(&mut self, target: BufferTarget, buffer: BufferId);
    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage);
    fn delete_buffer(&mut self, buffer: BufferId);

    // textures
    fn active_texture(&mut self, unit: u32);
    fn create_texture(&mut self) -> Option<TextureId>;
    fn bind_texture(&mut self, texture: Option<TextureId>);
    fn pixel_store_premultiply_alpha(&mut self, enabled: bool);
    /// `texImage2D(TEXTURE_2D, 0, RGBA, w, h, 0, RGBA, UNSIGNED_BYTE, pixels)`.
    fn tex_image_2d(&mut self, width: u32, height: u32, pixels: Option<&[u8]>);
    /// `compressedTexImage2D` on `TEXTURE_2D` (face 0) or `TEXTURE_CUBE_MAP_POSITIVE_X + face`.
    fn compressed_tex_image_2d(
        &mut self,
        face: u32,
        level: u32,
        internal_format: u32,
        width: u32,
        height: u32,
        data: &[u8],
    );
    /// Sets both `TEXTURE_MIN_FILTER` and `TEXTURE_MAG_FILTER`.
    fn tex_filter(&mut self, filter: TextureFilter);
    /// Sets `TEXTURE_WRAP_S`/`TEXTURE_WRAP_T` to `CLAMP_TO_EDGE`.
    fn tex_wrap_clamp(&mut self);
    fn delete_texture(&mut self, texture: TextureId);

    // framebuffers
    fn create_framebuffer(&mut self) -> Option<FramebufferId>;
    /// `None` binds the default (on-screen) framebuffer.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);
    fn framebuffer_texture_2d(&mut self, texture: TextureId);
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);
    fn create_renderbuffer(&mut self) -> Option<RenderbufferId>;
    fn bind_renderbuffer(&mut self, renderbuffer: Option<RenderbufferId>);
    /// `renderbufferStorage(RENDERBUFFER, STENCIL_INDEX8, w, h)`.
    fn renderbuffer_storage_stencil(&mut self, width: u32, height: u32);
    fn framebuffer_renderbuffer_stencil(&mut self, renderbuffer: RenderbufferId);
    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferId);
    /// RGBA8 readback into `out` (`width * height * 4` bytes).
    fn read_pixels(&mut self, x: i32, y: i32, width: i32, height: i32, out: &mut [u8]);

    // programs
    /// Compiles both stages and links them.
    fn create_program(&mut self, vertex_src: &str, fragment_src: &str) -> Result<ProgramId, ProgramError>;
    fn active_attributes(&self, program: ProgramId) -> Vec<ActiveAttribute>;
    fn active_uniforms(&self, program: ProgramId) -> Vec<ActiveUniform>;
    fn use_program(&mut self, program: ProgramId);
    fn delete_program(&mut self, program: ProgramId);
    fn vertex_attrib_pointer(&mut self, attrib: VertexAttrib);
    fn enable_vertex_attrib_array(&mut self, location: AttribLocation);
    fn uniform(&mut self, location: UniformLocation, value: &UniformValue);

    // draws
    /// `drawElements(TRIANGLES, count, UNSIGNED_SHORT, byte_offset)`.
    fn draw_elements(&mut self, count: i32, byte_offset: i32);
}
