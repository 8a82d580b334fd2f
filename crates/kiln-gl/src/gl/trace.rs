use std::collections::HashMap;

use super::{
    ActiveAttribute, ActiveUniform, AttribLocation, BlendFactor, BufferId, BufferTarget,
    BufferUsage, Capability, ClearTarget, FramebufferId, GlApi, GlParameter, ProgramError,
    ProgramId, RenderbufferId, StencilFunc, StencilOp, TextureFilter, TextureId, UniformLocation,
    UniformValue, VertexAttrib,
};

/// One recorded GL call.
#[derive(Debug, Clone, PartialEq)]
pub enum GlCall {
    Enable(Capability),
    Disable(Capability),
    ColorMask(bool),
    BlendFunc(BlendFactor, BlendFactor),
    StencilFunc { func: StencilFunc, reference: u32, mask: u32 },
    StencilOp(StencilOp, StencilOp, StencilOp),
    Viewport { x: i32, y: i32, width: i32, height: i32 },
    Scissor { x: i32, y: i32, width: i32, height: i32 },
    ClearColor([f32; 4]),
    Clear(ClearTarget),
    CreateBuffer(BufferId),
    BindBuffer(BufferTarget, BufferId),
    BufferData { target: BufferTarget, len: usize, usage: BufferUsage },
    DeleteBuffer(BufferId),
    ActiveTexture(u32),
    CreateTexture(TextureId),
    BindTexture(Option<TextureId>),
    PixelStorePremultiply(bool),
    TexImage2D { width: u32, height: u32, len: Option<usize> },
    CompressedTexImage2D { face: u32, level: u32, internal_format: u32, width: u32, height: u32, len: usize },
    TexFilter(TextureFilter),
    TexWrapClamp,
    DeleteTexture(TextureId),
    CreateFramebuffer(FramebufferId),
    BindFramebuffer(Option<FramebufferId>),
    FramebufferTexture2D(TextureId),
    DeleteFramebuffer(FramebufferId),
    CreateRenderbuffer(RenderbufferId),
    BindRenderbuffer(Option<RenderbufferId>),
    RenderbufferStorageStencil { width: u32, height: u32 },
    FramebufferRenderbufferStencil(RenderbufferId),
    DeleteRenderbuffer(RenderbufferId),
    ReadPixels { x: i32, y: i32, width: i32, height: i32 },
    CreateProgram(ProgramId),
    UseProgram(ProgramId),
    DeleteProgram(ProgramId),
    VertexAttribPointer(VertexAttrib),
    EnableVertexAttribArray(AttribLocation),
    Uniform(UniformLocation, UniformValue),
    DrawElements { count: i32, byte_offset: i32 },
}

impl GlCall {
    #[inline]
    pub fn is_draw(&self) -> bool {
        matches!(self, GlCall::DrawElements { .. })
    }
}

struct LinkedProgram {
    attributes: Vec<ActiveAttribute>,
    uniforms: Vec<ActiveUniform>,
}

/// Headless [`GlApi`] that records every call.
///
/// Object ids are handed out from a single counter. Programs report the
/// `attribute`/`uniform` declarations found in their sources as active, in
/// declaration order, so uniform sync behaves like on a real driver.
///
/// Context loss is simulated with [`TraceGl::lose_context`]; while lost, every
/// `create_*` returns `None` (calls are still recorded so tests can assert
/// that nothing was issued).
pub struct TraceGl {
    calls: Vec<GlCall>,
    next_id: u32,
    lost: bool,
    fail_allocations: bool,
    extensions: Vec<String>,
    max_texture_size: u32,
    programs: HashMap<ProgramId, LinkedProgram>,
    uploads: HashMap<BufferTarget, Vec<u8>>,
}

impl Default for TraceGl {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceGl {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            next_id: 1,
            lost: false,
            fail_allocations: false,
            extensions: Vec::new(),
            max_texture_size: 4096,
            programs: HashMap::new(),
            uploads: HashMap::new(),
        }
    }

    /// Advertises the given extension names.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_texture_size(mut self, size: u32) -> Self {
        self.max_texture_size = size;
        self
    }

    pub fn calls(&self) -> &[GlCall] {
        &self.calls
    }

    /// Returns and forgets everything recorded so far.
    pub fn take_calls(&mut self) -> Vec<GlCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn count(&self, pred: impl Fn(&GlCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn draw_count(&self) -> usize {
        self.count(GlCall::is_draw)
    }

    /// Bytes of the most recent `buffer_data` upload on `target`.
    pub fn last_upload(&self, target: BufferTarget) -> Option<&[u8]> {
        self.uploads.get(&target).map(Vec::as_slice)
    }

    pub fn lose_context(&mut self) {
        self.lost = true;
    }

    pub fn restore_context(&mut self) {
        self.lost = false;
        self.programs.clear();
    }

    /// Makes every `create_*` fail without marking the context lost.
    pub fn set_allocation_failure(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }

    fn alloc(&mut self) -> Option<u32> {
        if self.lost || self.fail_allocations {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        Some(id)
    }
}

/// Extracts `attribute`/`uniform` names from GLSL ES 1.0 declarations.
fn declared_names<'a>(sources: &[&'a str], qualifier: &str) -> Vec<&'a str> {
    let mut out: Vec<&str> = Vec::new();
    for &src in sources {
        for line in src.lines() {
            let line = line.trim();
            let Some(rest) = line.strip_prefix(qualifier) else { continue };
            if !rest.starts_with(char::is_whitespace) {
                continue;
            }
            let decl = rest.split(';').next().unwrap_or("");
            let Some(name) = decl.split_whitespace().last() else { continue };
            let name = name.split('[').next().unwrap_or(name);
            if !out.contains(&name) {
                out.push(name);
            }
        }
    }
    out
}

impl GlApi for TraceGl {
    fn is_context_lost(&self) -> bool {
        self.lost
    }

    fn get_parameter(&self, parameter: GlParameter) -> u32 {
        match parameter {
            GlParameter::MaxTextureSize | GlParameter::MaxCubeMapTextureSize => self.max_texture_size,
            GlParameter::MaxRenderbufferSize => self.max_texture_size,
            GlParameter::MaxTextureImageUnits => 16,
            GlParameter::MaxCombinedTextureImageUnits => 32,
            GlParameter::MaxVertexTextureImageUnits => 16,
            GlParameter::MaxVertexAttribs => 16,
            GlParameter::MaxVaryingVectors => 15,
            GlParameter::MaxVertexUniformVectors => 256,
            GlParameter::MaxFragmentUniformVectors => 224,
        }
    }

    fn supported_extensions(&self) -> Vec<String> {
        self.extensions.clone()
    }

    fn high_precision_float(&self) -> bool {
        true
    }

    fn enable(&mut self, cap: Capability) {
        self.calls.push(GlCall::Enable(cap));
    }

    fn disable(&mut self, cap: Capability) {
        self.calls.push(GlCall::Disable(cap));
    }

    fn color_mask(&mut self, enabled: bool) {
        self.calls.push(GlCall::ColorMask(enabled));
    }

    fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor) {
        self.calls.push(GlCall::BlendFunc(src, dst));
    }

    fn stencil_func(&mut self, func: StencilFunc, reference: u32, mask: u32) {
        self.calls.push(GlCall::StencilFunc { func, reference, mask });
    }

    fn stencil_op(&mut self, fail: StencilOp, zfail: StencilOp, zpass: StencilOp) {
        self.calls.push(GlCall::StencilOp(fail, zfail, zpass));
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.calls.push(GlCall::Viewport { x, y, width, height });
    }

    fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.calls.push(GlCall::Scissor { x, y, width, height });
    }

    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.calls.push(GlCall::ClearColor([r, g, b, a]));
    }

    fn clear(&mut self, target: ClearTarget) {
        self.calls.push(GlCall::Clear(target));
    }

    fn create_buffer(&mut self) -> Option<BufferId> {
        let id = BufferId(self.alloc()?);
        self.calls.push(GlCall::CreateBuffer(id));
        Some(id)
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: BufferId) {
        self.calls.push(GlCall::BindBuffer(target, buffer));
    }

    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        self.uploads.insert(target, data.to_vec());
        self.calls.push(GlCall::BufferData { target, len: data.len(), usage });
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.calls.push(GlCall::DeleteBuffer(buffer));
    }

    fn active_texture(&mut self, unit: u32) {
        self.calls.push(GlCall::ActiveTexture(unit));
    }

    fn create_texture(&mut self) -> Option<TextureId> {
        let id = TextureId(self.alloc()?);
        self.calls.push(GlCall::CreateTexture(id));
        Some(id)
    }

    fn bind_texture(&mut self, texture: Option<TextureId>) {
        self.calls.push(GlCall::BindTexture(texture));
    }

    fn pixel_store_premultiply_alpha(&mut self, enabled: bool) {
        self.calls.push(GlCall::PixelStorePremultiply(enabled));
    }

    fn tex_image_2d(&mut self, width: u32, height: u32, pixels: Option<&[u8]>) {
        self.calls.push(GlCall::TexImage2D { width, height, len: pixels.map(<[u8]>::len) });
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
        self.calls.push(GlCall::CompressedTexImage2D {
            face,
            level,
            internal_format,
            width,
            height,
            len: data.len(),
        });
    }

    fn tex_filter(&mut self, filter: TextureFilter) {
        self.calls.push(GlCall::TexFilter(filter));
    }

    fn tex_wrap_clamp(&mut self) {
        self.calls.push(GlCall::TexWrapClamp);
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.calls.push(GlCall::DeleteTexture(texture));
    }

    fn create_framebuffer(&mut self) -> Option<FramebufferId> {
        let id = FramebufferId(self.alloc()?);
        self.calls.push(GlCall::CreateFramebuffer(id));
        Some(id)
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.calls.push(GlCall::BindFramebuffer(framebuffer));
    }

    fn framebuffer_texture_2d(&mut self, texture: TextureId) {
        self.calls.push(GlCall::FramebufferTexture2D(texture));
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.calls.push(GlCall::DeleteFramebuffer(framebuffer));
    }

    fn create_renderbuffer(&mut self) -> Option<RenderbufferId> {
        let id = RenderbufferId(self.alloc()?);
        self.calls.push(GlCall::CreateRenderbuffer(id));
        Some(id)
    }

    fn bind_renderbuffer(&mut self, renderbuffer: Option<RenderbufferId>) {
        self.calls.push(GlCall::BindRenderbuffer(renderbuffer));
    }

    fn renderbuffer_storage_stencil(&mut self, width: u32, height: u32) {
        self.calls.push(GlCall::RenderbufferStorageStencil { width, height });
    }

    fn framebuffer_renderbuffer_stencil(&mut self, renderbuffer: RenderbufferId) {
        self.calls.push(GlCall::FramebufferRenderbufferStencil(renderbuffer));
    }

    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferId) {
        self.calls.push(GlCall::DeleteRenderbuffer(renderbuffer));
    }

    fn read_pixels(&mut self, x: i32, y: i32, width: i32, height: i32, out: &mut [u8]) {
        out.fill(0);
        self.calls.push(GlCall::ReadPixels { x, y, width, height });
    }

    fn create_program(&mut self, vertex_src: &str, fragment_src: &str) -> Result<ProgramId, ProgramError> {
        if !vertex_src.contains("void main") {
            return Err(ProgramError::Compile {
                stage: super::ShaderStage::Vertex,
                log: "missing entry point".to_string(),
            });
        }
        if !fragment_src.contains("void main") {
            return Err(ProgramError::Compile {
                stage: super::ShaderStage::Fragment,
                log: "missing entry point".to_string(),
            });
        }
        let id = ProgramId(self.alloc().ok_or(ProgramError::Unavailable)?);

        let attributes = declared_names(&[vertex_src], "attribute")
            .into_iter()
            .enumerate()
            .map(|(i, name)| ActiveAttribute {
                name: name.to_string(),
                location: AttribLocation(i as u32),
            })
            .collect();
        let uniforms = declared_names(&[vertex_src, fragment_src], "uniform")
            .into_iter()
            .enumerate()
            .map(|(i, name)| ActiveUniform {
                name: name.to_string(),
                location: UniformLocation(i as u32),
            })
            .collect();

        self.programs.insert(id, LinkedProgram { attributes, uniforms });
        self.calls.push(GlCall::CreateProgram(id));
        Ok(id)
    }

    fn active_attributes(&self, program: ProgramId) -> Vec<ActiveAttribute> {
        self.programs
            .get(&program)
            .map(|p| p.attributes.clone())
            .unwrap_or_default()
    }

    fn active_uniforms(&self, program: ProgramId) -> Vec<ActiveUniform> {
        self.programs
            .get(&program)
            .map(|p| p.uniforms.clone())
            .unwrap_or_default()
    }

    fn use_program(&mut self, program: ProgramId) {
        self.calls.push(GlCall::UseProgram(program));
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        self.calls.push(GlCall::DeleteProgram(program));
    }

    fn vertex_attrib_pointer(&mut self, attrib: VertexAttrib) {
        self.calls.push(GlCall::VertexAttribPointer(attrib));
    }

    fn enable_vertex_attrib_array(&mut self, location: AttribLocation) {
        self.calls.push(GlCall::EnableVertexAttribArray(location));
    }

    fn uniform(&mut self, location: UniformLocation, value: &UniformValue) {
        self.calls.push(GlCall::Uniform(location, value.clone()));
    }

    fn draw_elements(&mut self, count: i32, byte_offset: i32) {
        self.calls.push(GlCall::DrawElements { count, byte_offset });
    }
}
