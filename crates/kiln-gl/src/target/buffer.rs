use crate::coords::{Matrix, Rect};
use crate::gl::{
    Capability, ClearTarget, FramebufferId, GlApi, RenderbufferId, TextureFilter, TextureId,
};

slotmap::new_key_type! {
    /// Stable identity of a render buffer owned by a context.
    pub struct BufferKey;
}

// ── render target ─────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TargetKind {
    /// The default framebuffer.
    Surface,
    /// Texture-backed framebuffer.
    Offscreen,
}

/// GPU side of a render buffer.
///
/// `width`/`height` are the size recorded commands assume. The GPU storage
/// follows at replay time through `reallocate`, so a target can be resized
/// while commands referencing its old size are still queued.
#[derive(Debug)]
pub struct RenderTarget {
    kind: TargetKind,
    framebuffer: Option<FramebufferId>,
    texture: Option<TextureId>,
    stencil: Option<RenderbufferId>,
    pub width: u32,
    pub height: u32,
    allocated: (u32, u32),
}

impl RenderTarget {
    pub fn surface(width: u32, height: u32) -> Self {
        Self {
            kind: TargetKind::Surface,
            framebuffer: None,
            texture: None,
            stencil: None,
            width,
            height,
            allocated: (width, height),
        }
    }

    /// Creates a texture-backed target. `None` if the context refused an object.
    pub fn offscreen<G: GlApi>(gl: &mut G, width: u32, height: u32) -> Option<Self> {
        let width = width.max(1);
        let height = height.max(1);

        let texture = gl.create_texture()?;
        gl.bind_texture(Some(texture));
        gl.tex_image_2d(width, height, None);
        gl.tex_filter(TextureFilter::Linear);
        gl.tex_wrap_clamp();

        let Some(framebuffer) = gl.create_framebuffer() else {
            gl.delete_texture(texture);
            return None;
        };
        gl.bind_framebuffer(Some(framebuffer));
        gl.framebuffer_texture_2d(texture);

        Some(Self {
            kind: TargetKind::Offscreen,
            framebuffer: Some(framebuffer),
            texture: Some(texture),
            stencil: None,
            width,
            height,
            allocated: (width, height),
        })
    }

    #[inline]
    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    /// Color texture of an offscreen target.
    #[inline]
    pub fn texture(&self) -> Option<TextureId> {
        self.texture
    }

    #[inline]
    pub fn has_stencil(&self) -> bool {
        self.stencil.is_some()
    }

    /// Size of the GPU storage.
    #[inline]
    pub fn allocated_size(&self) -> (u32, u32) {
        self.allocated
    }

    pub fn activate<G: GlApi>(&self, gl: &mut G) {
        gl.bind_framebuffer(self.framebuffer);
    }

    /// Brings the GPU storage to `width × height`.
    pub fn reallocate<G: GlApi>(&mut self, gl: &mut G, width: u32, height: u32) {
        let width = width.max(1);
        let height = height.max(1);
        if self.allocated == (width, height) {
            return;
        }
        if let Some(texture) = self.texture {
            gl.bind_texture(Some(texture));
            gl.tex_image_2d(width, height, None);
        }
        if let Some(stencil) = self.stencil {
            gl.bind_renderbuffer(Some(stencil));
            gl.renderbuffer_storage_stencil(width, height);
        }
        self.allocated = (width, height);
    }

    /// Attaches a stencil renderbuffer on first use. The surface has its own.
    pub fn enable_stencil<G: GlApi>(&mut self, gl: &mut G) {
        let Some(framebuffer) = self.framebuffer else { return };
        if self.stencil.is_some() {
            return;
        }
        let Some(stencil) = gl.create_renderbuffer() else {
            log::warn!("stencil renderbuffer unavailable; masks on this target will not clip");
            return;
        };
        gl.bind_renderbuffer(Some(stencil));
        gl.renderbuffer_storage_stencil(self.allocated.0, self.allocated.1);
        gl.bind_framebuffer(Some(framebuffer));
        gl.framebuffer_renderbuffer_stencil(stencil);
        self.stencil = Some(stencil);
    }

    /// Clears color to transparent black.
    pub fn clear<G: GlApi>(&self, gl: &mut G, bind: bool) {
        if bind {
            self.activate(gl);
        }
        gl.color_mask(true);
        gl.clear_color(0.0, 0.0, 0.0, 0.0);
        gl.clear(ClearTarget::Color);
    }

    /// Deletes the GPU objects.
    pub fn dispose<G: GlApi>(&mut self, gl: &mut G) {
        if let Some(texture) = self.texture.take() {
            gl.delete_texture(texture);
        }
        if let Some(framebuffer) = self.framebuffer.take() {
            gl.delete_framebuffer(framebuffer);
        }
        if let Some(stencil) = self.stencil.take() {
            gl.delete_renderbuffer(stencil);
        }
    }

    /// Forgets GPU objects that died with a lost context.
    pub fn forget_gpu_objects(&mut self) {
        self.texture = None;
        self.framebuffer = None;
        self.stencil = None;
    }
}

// ── render buffer ─────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone)]
struct SavedTransform {
    matrix: Matrix,
    offset_x: f32,
    offset_y: f32,
}

/// A draw target plus the transform and mask state of everything drawn into it.
///
/// Recording (transform, `stencil_list`, `has_scissor`) and replay
/// (`stencil_level`, stencil/scissor GL state) are tracked separately: the
/// recording side runs ahead of the GPU by up to one batch.
#[derive(Debug)]
pub struct RenderBuffer {
    pub target: RenderTarget,

    pub global_matrix: Matrix,
    /// Translation applied in local space before `global_matrix`.
    pub offset_x: f32,
    pub offset_y: f32,
    pub global_alpha: f32,
    /// `0xRRGGBB` multiplier.
    pub global_tint: u32,
    saved: Vec<SavedTransform>,

    pub(crate) stencil_list: Vec<Rect>,
    pub(crate) has_scissor: bool,

    stencil_level: u32,
    stencil_state: bool,
    scissor: Option<Rect>,

    /// Count draw calls issued while this buffer is active.
    pub compute_draw_call: bool,
    pub draw_calls: u32,
}

impl RenderBuffer {
    /// On-screen buffer of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_target(RenderTarget::surface(width, height))
    }

    pub fn with_target(target: RenderTarget) -> Self {
        Self {
            target,
            global_matrix: Matrix::IDENTITY,
            offset_x: 0.0,
            offset_y: 0.0,
            global_alpha: 1.0,
            global_tint: 0xFFFFFF,
            saved: Vec::new(),
            stencil_list: Vec::new(),
            has_scissor: false,
            stencil_level: 0,
            stencil_state: false,
            scissor: None,
            compute_draw_call: false,
            draw_calls: 0,
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.target.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.target.height
    }

    // ── transform ─────────────────────────────────────────────────────────

    pub fn set_transform(&mut self, m: Matrix) {
        self.global_matrix = m;
    }

    /// Applies `m` in the current local space.
    pub fn transform(&mut self, m: Matrix) {
        self.global_matrix.prepend(m);
    }

    pub fn save_transform(&mut self) {
        self.saved.push(SavedTransform {
            matrix: self.global_matrix,
            offset_x: self.offset_x,
            offset_y: self.offset_y,
        });
    }

    /// Restores the last saved matrix and offset. No-op without a save.
    pub fn restore_transform(&mut self) {
        if let Some(s) = self.saved.pop() {
            self.global_matrix = s.matrix;
            self.offset_x = s.offset_x;
            self.offset_y = s.offset_y;
        }
    }

    /// Folds the pending offset into the matrix.
    pub fn use_offset(&mut self) {
        if self.offset_x != 0.0 || self.offset_y != 0.0 {
            self.global_matrix.prepend(Matrix::translation(self.offset_x, self.offset_y));
            self.offset_x = 0.0;
            self.offset_y = 0.0;
        }
    }

    /// Resets transform, alpha and tint, as for a freshly pooled buffer.
    pub fn reset_paint_state(&mut self) {
        self.global_matrix = Matrix::IDENTITY;
        self.offset_x = 0.0;
        self.offset_y = 0.0;
        self.global_alpha = 1.0;
        self.global_tint = 0xFFFFFF;
        self.saved.clear();
    }

    /// Forgets everything a previous user left on a pooled buffer: paint
    /// state, open masks and scissor. The GPU target is kept.
    ///
    /// Only valid while no queued command references the buffer; the next
    /// activation re-applies the cleared stencil and scissor state.
    pub(crate) fn reset_for_reuse(&mut self) {
        self.reset_paint_state();
        self.reset_recording();
        self.stencil_level = 0;
        self.stencil_state = false;
        self.scissor = None;
    }

    // ── masks (recording) ─────────────────────────────────────────────────

    /// Number of masks pushed and not yet popped while recording.
    #[inline]
    pub fn mask_depth(&self) -> usize {
        self.stencil_list.len()
    }

    #[inline]
    pub fn has_scissor(&self) -> bool {
        self.has_scissor
    }

    // ── replay state ──────────────────────────────────────────────────────

    /// Stencil reference level at the current replay position.
    #[inline]
    pub fn stencil_level(&self) -> u32 {
        self.stencil_level
    }

    #[inline]
    pub fn stencil_enabled(&self) -> bool {
        self.stencil_state
    }

    /// Active scissor in GL window coordinates.
    #[inline]
    pub fn scissor(&self) -> Option<Rect> {
        self.scissor
    }

    pub(crate) fn enter_mask(&mut self) -> u32 {
        let level = self.stencil_level;
        self.stencil_level += 1;
        level
    }

    /// Returns the level after leaving a mask, or `None` on underflow.
    pub(crate) fn leave_mask(&mut self) -> Option<u32> {
        self.stencil_level = self.stencil_level.checked_sub(1)?;
        Some(self.stencil_level)
    }

    pub fn enable_stencil<G: GlApi>(&mut self, gl: &mut G) {
        if !self.stencil_state {
            gl.enable(Capability::StencilTest);
            self.stencil_state = true;
        }
    }

    pub fn disable_stencil<G: GlApi>(&mut self, gl: &mut G) {
        if self.stencil_state {
            gl.disable(Capability::StencilTest);
            self.stencil_state = false;
        }
    }

    /// Re-applies this buffer's stencil enable after a buffer switch.
    pub fn restore_stencil<G: GlApi>(&self, gl: &mut G) {
        if self.stencil_state {
            gl.enable(Capability::StencilTest);
        } else {
            gl.disable(Capability::StencilTest);
        }
    }

    pub fn enable_scissor<G: GlApi>(&mut self, gl: &mut G, rect: Rect) {
        if self.scissor.is_none() {
            self.scissor = Some(rect);
            apply_scissor(gl, rect);
        }
    }

    pub fn disable_scissor<G: GlApi>(&mut self, gl: &mut G) {
        if self.scissor.take().is_some() {
            gl.disable(Capability::ScissorTest);
        }
    }

    pub fn restore_scissor<G: GlApi>(&self, gl: &mut G) {
        match self.scissor {
            Some(rect) => apply_scissor(gl, rect),
            None => gl.disable(Capability::ScissorTest),
        }
    }

    /// Drops replay state tied to a dead GL context.
    pub(crate) fn reset_gpu_state(&mut self) {
        self.stencil_level = 0;
        self.stencil_state = false;
        self.scissor = None;
        self.target.forget_gpu_objects();
    }

    /// Drops recording state that did not survive a flush.
    pub(crate) fn reset_recording(&mut self) {
        self.stencil_list.clear();
        self.has_scissor = false;
    }
}

fn apply_scissor<G: GlApi>(gl: &mut G, rect: Rect) {
    gl.enable(Capability::ScissorTest);
    gl.scissor(
        rect.x.round() as i32,
        rect.y.round() as i32,
        rect.width.round() as i32,
        rect.height.round() as i32,
    );
}
