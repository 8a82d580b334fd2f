//! [`GlApi`] over a real OpenGL ES 2+/WebGL context through [glow].
//!
//! glow hands out backend-specific object handles; the batcher works with
//! plain `u32` ids. Each object kind gets its own id table here, so ids are
//! stable for as long as the object lives and are never reused.
//!
//! # Safety
//!
//! [`GlowGl::new`] is `unsafe`: the wrapped context must stay current on the
//! calling thread for every later call, because each trait method issues raw
//! GL calls.
//!
//! [glow]: https://docs.rs/glow

use std::borrow::Cow;
use std::collections::HashMap;

use glow::HasContext;

use super::{
    ActiveAttribute, ActiveUniform, AttribLocation, AttribType, BlendFactor, BufferId,
    BufferTarget, BufferUsage, Capability, ClearTarget, FramebufferId, GlApi, GlParameter,
    ProgramError, ProgramId, RenderbufferId, ShaderStage, StencilFunc, StencilOp, TextureFilter,
    TextureId, UniformLocation, UniformValue, VertexAttrib,
};

/// Live objects of one kind, keyed by the id handed to the batcher.
struct Handles<T> {
    entries: HashMap<u32, T>,
    next: u32,
}

impl<T> Default for Handles<T> {
    fn default() -> Self {
        Self { entries: HashMap::new(), next: 1 }
    }
}

impl<T> Handles<T> {
    fn insert(&mut self, value: T) -> u32 {
        let id = self.next;
        self.next += 1;
        self.entries.insert(id, value);
        id
    }

    fn get(&self, id: u32) -> Option<&T> {
        self.entries.get(&id)
    }

    fn remove(&mut self, id: u32) -> Option<T> {
        self.entries.remove(&id)
    }
}

struct LinkedProgram<H: HasContext> {
    program: H::Program,
    attributes: Vec<ActiveAttribute>,
    uniforms: Vec<ActiveUniform>,
}

/// A [`GlApi`] backed by any glow context (native GLES, or WebGL on wasm).
pub struct GlowGl<H: HasContext> {
    gl: H,
    buffers: Handles<H::Buffer>,
    textures: Handles<H::Texture>,
    framebuffers: Handles<H::Framebuffer>,
    renderbuffers: Handles<H::Renderbuffer>,
    programs: Handles<LinkedProgram<H>>,
    uniforms: Handles<H::UniformLocation>,
    premultiply_alpha: bool,
}

impl<H: HasContext> GlowGl<H> {
    /// Wraps `gl`.
    ///
    /// # Safety
    ///
    /// `gl` must be current on this thread whenever any method of the
    /// returned value is called.
    pub unsafe fn new(gl: H) -> Self {
        Self {
            gl,
            buffers: Handles::default(),
            textures: Handles::default(),
            framebuffers: Handles::default(),
            renderbuffers: Handles::default(),
            programs: Handles::default(),
            uniforms: Handles::default(),
            premultiply_alpha: false,
        }
    }

    pub fn context(&self) -> &H {
        &self.gl
    }

    /// Unwraps the glow context. Objects still alive are leaked to it.
    pub fn into_inner(self) -> H {
        self.gl
    }
}

// ── enum mapping ──────────────────────────────────────────────────────────

fn capability(cap: Capability) -> u32 {
    match cap {
        Capability::Blend => glow::BLEND,
        Capability::CullFace => glow::CULL_FACE,
        Capability::DepthTest => glow::DEPTH_TEST,
        Capability::ScissorTest => glow::SCISSOR_TEST,
        Capability::StencilTest => glow::STENCIL_TEST,
    }
}

fn blend_factor(factor: BlendFactor) -> u32 {
    match factor {
        BlendFactor::Zero => glow::ZERO,
        BlendFactor::One => glow::ONE,
        BlendFactor::SrcAlpha => glow::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => glow::ONE_MINUS_SRC_ALPHA,
    }
}

fn stencil_func(func: StencilFunc) -> u32 {
    match func {
        StencilFunc::Always => glow::ALWAYS,
        StencilFunc::Equal => glow::EQUAL,
    }
}

fn stencil_op(op: StencilOp) -> u32 {
    match op {
        StencilOp::Keep => glow::KEEP,
        StencilOp::Incr => glow::INCR,
        StencilOp::Decr => glow::DECR,
    }
}

fn buffer_target(target: BufferTarget) -> u32 {
    match target {
        BufferTarget::Array => glow::ARRAY_BUFFER,
        BufferTarget::ElementArray => glow::ELEMENT_ARRAY_BUFFER,
    }
}

fn buffer_usage(usage: BufferUsage) -> u32 {
    match usage {
        BufferUsage::StaticDraw => glow::STATIC_DRAW,
        BufferUsage::StreamDraw => glow::STREAM_DRAW,
    }
}

fn clear_mask(target: ClearTarget) -> u32 {
    match target {
        ClearTarget::Color => glow::COLOR_BUFFER_BIT,
        ClearTarget::Stencil => glow::STENCIL_BUFFER_BIT,
    }
}

fn texture_filter(filter: TextureFilter) -> i32 {
    match filter {
        TextureFilter::Linear => glow::LINEAR as i32,
        TextureFilter::Nearest => glow::NEAREST as i32,
    }
}

fn attrib_type(ty: AttribType) -> u32 {
    match ty {
        AttribType::Float => glow::FLOAT,
        AttribType::UnsignedByte => glow::UNSIGNED_BYTE,
    }
}

fn parameter(parameter: GlParameter) -> u32 {
    match parameter {
        GlParameter::MaxTextureSize => glow::MAX_TEXTURE_SIZE,
        GlParameter::MaxCubeMapTextureSize => glow::MAX_CUBE_MAP_TEXTURE_SIZE,
        GlParameter::MaxRenderbufferSize => glow::MAX_RENDERBUFFER_SIZE,
        GlParameter::MaxTextureImageUnits => glow::MAX_TEXTURE_IMAGE_UNITS,
        GlParameter::MaxCombinedTextureImageUnits => glow::MAX_COMBINED_TEXTURE_IMAGE_UNITS,
        GlParameter::MaxVertexTextureImageUnits => glow::MAX_VERTEX_TEXTURE_IMAGE_UNITS,
        GlParameter::MaxVertexAttribs => glow::MAX_VERTEX_ATTRIBS,
        GlParameter::MaxVaryingVectors => glow::MAX_VARYING_VECTORS,
        GlParameter::MaxVertexUniformVectors => glow::MAX_VERTEX_UNIFORM_VECTORS,
        GlParameter::MaxFragmentUniformVectors => glow::MAX_FRAGMENT_UNIFORM_VECTORS,
    }
}

fn shader_type(stage: ShaderStage) -> u32 {
    match stage {
        ShaderStage::Vertex => glow::VERTEX_SHADER,
        ShaderStage::Fragment => glow::FRAGMENT_SHADER,
    }
}

/// Face 0 is the plain 2D target; any other face counts up from `POSITIVE_X`.
fn compressed_target(face: u32) -> u32 {
    match face {
        0 => glow::TEXTURE_2D,
        face => glow::TEXTURE_CUBE_MAP_POSITIVE_X + face,
    }
}

/// RGBA8 rows with color scaled by alpha.
fn premultiply(pixels: &[u8]) -> Vec<u8> {
    let mut out = pixels.to_vec();
    for px in out.chunks_exact_mut(4) {
        let alpha = u16::from(px[3]);
        for c in &mut px[..3] {
            *c = ((u16::from(*c) * alpha + 127) / 255) as u8;
        }
    }
    out
}

/// Compiles one stage. The shader is deleted again on failure.
unsafe fn compile<H: HasContext>(
    gl: &H,
    stage: ShaderStage,
    source: &str,
) -> Result<H::Shader, ProgramError> {
    unsafe {
        let shader = gl.create_shader(shader_type(stage)).map_err(|_| ProgramError::Unavailable)?;
        gl.shader_source(shader, source);
        gl.compile_shader(shader);
        if gl.get_shader_compile_status(shader) {
            return Ok(shader);
        }
        let log = gl.get_shader_info_log(shader);
        gl.delete_shader(shader);
        Err(ProgramError::Compile { stage, log })
    }
}

impl<H: HasContext> GlowGl<H> {
    /// Reads back active attributes and uniforms of a freshly linked program.
    fn introspect(&mut self, program: H::Program) -> (Vec<ActiveAttribute>, Vec<ActiveUniform>) {
        let gl = &self.gl;
        let mut attributes = Vec::new();
        let mut uniforms = Vec::new();
        unsafe {
            for index in 0..gl.get_active_attributes(program) {
                let Some(active) = gl.get_active_attribute(program, index) else { continue };
                if let Some(location) = gl.get_attrib_location(program, &active.name) {
                    attributes.push(ActiveAttribute { name: active.name, location: AttribLocation(location) });
                }
            }
            for index in 0..gl.get_active_uniforms(program) {
                let Some(active) = gl.get_active_uniform(program, index) else { continue };
                if let Some(location) = gl.get_uniform_location(program, &active.name) {
                    let id = self.uniforms.insert(location);
                    uniforms.push(ActiveUniform { name: active.name, location: UniformLocation(id) });
                }
            }
        }
        (attributes, uniforms)
    }
}

impl<H: HasContext> GlApi for GlowGl<H> {
    fn is_context_lost(&self) -> bool {
        // native contexts surface loss as a reset on the next call instead
        false
    }

    fn get_parameter(&self, p: GlParameter) -> u32 {
        let value = unsafe { self.gl.get_parameter_i32(parameter(p)) };
        value.max(0) as u32
    }

    fn supported_extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self.gl.supported_extensions().iter().cloned().collect();
        extensions.sort();
        extensions
    }

    fn high_precision_float(&self) -> bool {
        [glow::VERTEX_SHADER, glow::FRAGMENT_SHADER].into_iter().all(|stage| unsafe {
            self.gl
                .get_shader_precision_format(stage, glow::HIGH_FLOAT)
                .is_some_and(|format| format.precision > 0)
        })
    }

    // ── fixed-function state ──────────────────────────────────────────────

    fn enable(&mut self, cap: Capability) {
        unsafe { self.gl.enable(capability(cap)) }
    }

    fn disable(&mut self, cap: Capability) {
        unsafe { self.gl.disable(capability(cap)) }
    }

    fn color_mask(&mut self, enabled: bool) {
        unsafe { self.gl.color_mask(enabled, enabled, enabled, enabled) }
    }

    fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor) {
        unsafe { self.gl.blend_func(blend_factor(src), blend_factor(dst)) }
    }

    fn stencil_func(&mut self, func: StencilFunc, reference: u32, mask: u32) {
        unsafe { self.gl.stencil_func(stencil_func(func), reference as i32, mask) }
    }

    fn stencil_op(&mut self, fail: StencilOp, zfail: StencilOp, zpass: StencilOp) {
        unsafe { self.gl.stencil_op(stencil_op(fail), stencil_op(zfail), stencil_op(zpass)) }
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.viewport(x, y, width, height) }
    }

    fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.scissor(x, y, width, height) }
    }

    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        unsafe { self.gl.clear_color(r, g, b, a) }
    }

    fn clear(&mut self, target: ClearTarget) {
        unsafe { self.gl.clear(clear_mask(target)) }
    }

    // ── buffers ───────────────────────────────────────────────────────────

    fn create_buffer(&mut self) -> Option<BufferId> {
        match unsafe { self.gl.create_buffer() } {
            Ok(buffer) => Some(BufferId(self.buffers.insert(buffer))),
            Err(err) => {
                log::error!("createBuffer failed: {err}");
                None
            }
        }
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: BufferId) {
        let native = self.buffers.get(buffer.0).copied();
        unsafe { self.gl.bind_buffer(buffer_target(target), native) }
    }

    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        unsafe { self.gl.buffer_data_u8_slice(buffer_target(target), data, buffer_usage(usage)) }
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        if let Some(native) = self.buffers.remove(buffer.0) {
            unsafe { self.gl.delete_buffer(native) }
        }
    }

    // ── textures ──────────────────────────────────────────────────────────

    fn active_texture(&mut self, unit: u32) {
        unsafe { self.gl.active_texture(glow::TEXTURE0 + unit) }
    }

    fn create_texture(&mut self) -> Option<TextureId> {
        match unsafe { self.gl.create_texture() } {
            Ok(texture) => Some(TextureId(self.textures.insert(texture))),
            Err(err) => {
                log::error!("createTexture failed: {err}");
                None
            }
        }
    }

    fn bind_texture(&mut self, texture: Option<TextureId>) {
        let native = texture.and_then(|t| self.textures.get(t.0).copied());
        unsafe { self.gl.bind_texture(glow::TEXTURE_2D, native) }
    }

    fn pixel_store_premultiply_alpha(&mut self, enabled: bool) {
        // UNPACK_PREMULTIPLY_ALPHA_WEBGL has no native counterpart
        self.premultiply_alpha = enabled;
    }

    fn tex_image_2d(&mut self, width: u32, height: u32, pixels: Option<&[u8]>) {
        let pixels = match pixels {
            Some(p) if self.premultiply_alpha => Some(Cow::Owned(premultiply(p))),
            Some(p) => Some(Cow::Borrowed(p)),
            None => None,
        };
        unsafe {
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA as i32,
                width as i32,
                height as i32,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(pixels.as_deref()),
            )
        }
    }

    fn compressed_tex_image_2d(
        &mut self,
        face: u32,
        level: u32,
        internal_format: u32,
        width: u32,
        height: u32,
        data: &[u8],
    ) {
        unsafe {
            self.gl.compressed_tex_image_2d(
                compressed_target(face),
                level as i32,
                internal_format as i32,
                width as i32,
                height as i32,
                0,
                data.len() as i32,
                data,
            )
        }
    }

    fn tex_filter(&mut self, filter: TextureFilter) {
        let value = texture_filter(filter);
        unsafe {
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, value);
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, value);
        }
    }

    fn tex_wrap_clamp(&mut self) {
        let clamp = glow::CLAMP_TO_EDGE as i32;
        unsafe {
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, clamp);
            self.gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, clamp);
        }
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if let Some(native) = self.textures.remove(texture.0) {
            unsafe { self.gl.delete_texture(native) }
        }
    }

    // ── framebuffers ──────────────────────────────────────────────────────

    fn create_framebuffer(&mut self) -> Option<FramebufferId> {
        match unsafe { self.gl.create_framebuffer() } {
            Ok(fb) => Some(FramebufferId(self.framebuffers.insert(fb))),
            Err(err) => {
                log::error!("createFramebuffer failed: {err}");
                None
            }
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        let native = framebuffer.and_then(|f| self.framebuffers.get(f.0).copied());
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, native) }
    }

    fn framebuffer_texture_2d(&mut self, texture: TextureId) {
        let native = self.textures.get(texture.0).copied();
        unsafe {
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                native,
                0,
            )
        }
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        if let Some(native) = self.framebuffers.remove(framebuffer.0) {
            unsafe { self.gl.delete_framebuffer(native) }
        }
    }

    fn create_renderbuffer(&mut self) -> Option<RenderbufferId> {
        match unsafe { self.gl.create_renderbuffer() } {
            Ok(rb) => Some(RenderbufferId(self.renderbuffers.insert(rb))),
            Err(err) => {
                log::error!("createRenderbuffer failed: {err}");
                None
            }
        }
    }

    fn bind_renderbuffer(&mut self, renderbuffer: Option<RenderbufferId>) {
        let native = renderbuffer.and_then(|r| self.renderbuffers.get(r.0).copied());
        unsafe { self.gl.bind_renderbuffer(glow::RENDERBUFFER, native) }
    }

    fn renderbuffer_storage_stencil(&mut self, width: u32, height: u32) {
        unsafe {
            self.gl.renderbuffer_storage(
                glow::RENDERBUFFER,
                glow::STENCIL_INDEX8,
                width as i32,
                height as i32,
            )
        }
    }

    fn framebuffer_renderbuffer_stencil(&mut self, renderbuffer: RenderbufferId) {
        let native = self.renderbuffers.get(renderbuffer.0).copied();
        unsafe {
            self.gl.framebuffer_renderbuffer(
                glow::FRAMEBUFFER,
                glow::STENCIL_ATTACHMENT,
                glow::RENDERBUFFER,
                native,
            )
        }
    }

    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferId) {
        if let Some(native) = self.renderbuffers.remove(renderbuffer.0) {
            unsafe { self.gl.delete_renderbuffer(native) }
        }
    }

    fn read_pixels(&mut self, x: i32, y: i32, width: i32, height: i32, out: &mut [u8]) {
        let needed = width.max(0) as usize * height.max(0) as usize * 4;
        if out.len() < needed {
            log::warn!("readPixels: {} byte buffer for {width}x{height}; skipped", out.len());
            return;
        }
        unsafe {
            self.gl.read_pixels(
                x,
                y,
                width,
                height,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelPackData::Slice(Some(&mut out[..needed])),
            )
        }
    }

    // ── programs ──────────────────────────────────────────────────────────

    fn create_program(&mut self, vertex_src: &str, fragment_src: &str) -> Result<ProgramId, ProgramError> {
        let program = unsafe {
            let gl = &self.gl;
            let vertex = compile(gl, ShaderStage::Vertex, vertex_src)?;
            let fragment = match compile(gl, ShaderStage::Fragment, fragment_src) {
                Ok(shader) => shader,
                Err(err) => {
                    gl.delete_shader(vertex);
                    return Err(err);
                }
            };
            let program = match gl.create_program() {
                Ok(program) => program,
                Err(_) => {
                    gl.delete_shader(vertex);
                    gl.delete_shader(fragment);
                    return Err(ProgramError::Unavailable);
                }
            };
            gl.attach_shader(program, vertex);
            gl.attach_shader(program, fragment);
            gl.link_program(program);
            let linked = gl.get_program_link_status(program);
            gl.detach_shader(program, vertex);
            gl.detach_shader(program, fragment);
            gl.delete_shader(vertex);
            gl.delete_shader(fragment);
            if !linked {
                let log = gl.get_program_info_log(program);
                gl.delete_program(program);
                return Err(ProgramError::Link { log });
            }
            program
        };

        let (attributes, uniforms) = self.introspect(program);
        let id = self.programs.insert(LinkedProgram { program, attributes, uniforms });
        Ok(ProgramId(id))
    }

    fn active_attributes(&self, program: ProgramId) -> Vec<ActiveAttribute> {
        self.programs.get(program.0).map(|p| p.attributes.clone()).unwrap_or_default()
    }

    fn active_uniforms(&self, program: ProgramId) -> Vec<ActiveUniform> {
        self.programs.get(program.0).map(|p| p.uniforms.clone()).unwrap_or_default()
    }

    fn use_program(&mut self, program: ProgramId) {
        let native = self.programs.get(program.0).map(|p| p.program);
        unsafe { self.gl.use_program(native) }
    }

    fn delete_program(&mut self, program: ProgramId) {
        let Some(linked) = self.programs.remove(program.0) else { return };
        for uniform in &linked.uniforms {
            self.uniforms.remove(uniform.location.0);
        }
        unsafe { self.gl.delete_program(linked.program) }
    }

    fn vertex_attrib_pointer(&mut self, attrib: VertexAttrib) {
        unsafe {
            self.gl.vertex_attrib_pointer_f32(
                attrib.location.0,
                attrib.components,
                attrib_type(attrib.ty),
                attrib.normalized,
                attrib.stride,
                attrib.offset,
            )
        }
    }

    fn enable_vertex_attrib_array(&mut self, location: AttribLocation) {
        unsafe { self.gl.enable_vertex_attrib_array(location.0) }
    }

    fn uniform(&mut self, location: UniformLocation, value: &UniformValue) {
        let Some(native) = self.uniforms.get(location.0) else {
            log::warn!("uniform write to unknown location {location:?}");
            return;
        };
        let gl = &self.gl;
        let loc = Some(native);
        unsafe {
            match value {
                UniformValue::Int(v) => gl.uniform_1_i32(loc, *v),
                UniformValue::Float(v) => gl.uniform_1_f32(loc, *v),
                UniformValue::Vec2([x, y]) => gl.uniform_2_f32(loc, *x, *y),
                UniformValue::Vec3([x, y, z]) => gl.uniform_3_f32(loc, *x, *y, *z),
                UniformValue::Vec4([x, y, z, w]) => gl.uniform_4_f32(loc, *x, *y, *z, *w),
                UniformValue::Mat4(m) => gl.uniform_matrix_4_f32_slice(loc, false, m),
                UniformValue::FloatArray(values) => gl.uniform_1_f32_slice(loc, values),
            }
        }
    }

    // ── draws ─────────────────────────────────────────────────────────────

    fn draw_elements(&mut self, count: i32, byte_offset: i32) {
        unsafe { self.gl.draw_elements(glow::TRIANGLES, count, glow::UNSIGNED_SHORT, byte_offset) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── id tables ─────────────────────────────────────────────────────────

    #[test]
    fn ids_start_at_one_and_are_never_reused() {
        let mut table = Handles::default();
        let a = table.insert("a");
        let b = table.insert("b");
        assert_eq!((a, b), (1, 2));
        assert_eq!(table.remove(a), Some("a"));
        assert_eq!(table.get(a), None);
        assert_eq!(table.insert("c"), 3);
        assert_eq!(table.get(b), Some(&"b"));
    }

    #[test]
    fn removing_an_unknown_id_is_a_no_op() {
        let mut table: Handles<u8> = Handles::default();
        assert_eq!(table.remove(7), None);
        assert_eq!(table.insert(1), 1);
    }

    // ── enum mapping ──────────────────────────────────────────────────────

    #[test]
    fn state_enums_map_to_gl_constants() {
        assert_eq!(capability(Capability::StencilTest), 0x0B90);
        assert_eq!(capability(Capability::ScissorTest), 0x0C11);
        assert_eq!(blend_factor(BlendFactor::OneMinusSrcAlpha), 0x0303);
        assert_eq!(stencil_func(StencilFunc::Equal), 0x0202);
        assert_eq!(stencil_op(StencilOp::Incr), 0x1E02);
        assert_eq!(clear_mask(ClearTarget::Stencil), 0x0400);
        assert_eq!(buffer_target(BufferTarget::ElementArray), 0x8893);
        assert_eq!(texture_filter(TextureFilter::Nearest), 0x2600);
    }

    #[test]
    fn cube_faces_follow_positive_x() {
        assert_eq!(compressed_target(0), glow::TEXTURE_2D);
        assert_eq!(compressed_target(1), 0x8516);
        assert_eq!(compressed_target(5), 0x851A);
    }

    // ── uploads ───────────────────────────────────────────────────────────

    #[test]
    fn premultiply_scales_color_by_alpha() {
        let pixels = [255, 128, 0, 128, 10, 20, 30, 255, 200, 200, 200, 0];
        assert_eq!(premultiply(&pixels), vec![128, 64, 0, 128, 10, 20, 30, 255, 0, 0, 0, 0]);
    }
}
