use std::rc::Rc;

use crate::batch::{DrawCommand, DrawTextureCmd};
use crate::filter::Filter;
use crate::gl::{
    BufferTarget, BufferUsage, ClearTarget, GlApi, StencilFunc, StencilOp, TextureFilter,
    UniformValue,
};
use crate::program::{shader_lib, Program, ProgramSource};
use crate::target::BufferKey;

use super::{FlushStats, FramePhase, RenderContext};

impl<G: GlApi> RenderContext<G> {
    /// Uploads the batch and replays every queued command.
    ///
    /// Does nothing when the queue is empty.
    pub fn flush(&mut self) {
        self.when_active(|ctx| {
            let implicit = std::mem::take(&mut ctx.implicit_flushes);
            if ctx.replay() {
                ctx.stats.implicit_flushes = implicit;
            }
            ctx.phase = FramePhase::Idle;
        });
    }

    /// Flush forced by a full batch while recording.
    pub(super) fn flush_batch(&mut self) {
        log::trace!("batch full; flushing {} commands", self.queue.len());
        if self.replay() {
            self.implicit_flushes += 1;
        }
        self.phase = FramePhase::Recording;
    }

    /// Returns `false` if there was nothing to replay.
    fn replay(&mut self) -> bool {
        if self.queue.is_empty() {
            return false;
        }
        let Some(gpu) = self.gpu else { return false };
        self.phase = FramePhase::Flushing;

        let mut stats = FlushStats {
            vertices: self.vao.vertices().len(),
            indices: self.vao.index_count(),
            ..FlushStats::default()
        };

        self.gl.buffer_data(BufferTarget::Array, self.vao.vertex_bytes(), BufferUsage::StreamDraw);
        let mesh = self.vao.is_mesh();
        if mesh {
            self.gl.bind_buffer(BufferTarget::ElementArray, gpu.mesh_indices);
            self.gl.buffer_data(
                BufferTarget::ElementArray,
                bytemuck::cast_slice(self.vao.mesh_indices()),
                BufferUsage::StreamDraw,
            );
            stats.mesh_index_uploads = 1;
        }

        let commands = self.queue.take();
        stats.commands = commands.len();
        let mut offset = 0u32;
        for cmd in &commands {
            let drew = self.execute(cmd, offset, &mut stats);
            offset += cmd.triangles() * 3;
            if !drew {
                continue;
            }
            stats.draw_calls += 1;
            // a pop back to level 0 only disables the stencil test and is not counted
            if let Some(buffer) = self.activated.and_then(|k| self.buffers.get_mut(k)) {
                if buffer.compute_draw_call {
                    buffer.draw_calls += 1;
                }
            }
        }

        if mesh {
            self.gl.bind_buffer(BufferTarget::ElementArray, gpu.quad_indices);
        }
        self.queue.restore(commands);
        self.vao.clear();

        for key in self.pool.unpark() {
            self.dispose_buffer(key);
        }

        log::trace!(
            "flushed {} commands: {} draws, {} vertices",
            stats.commands,
            stats.draw_calls,
            stats.vertices
        );
        self.stats = stats;
        true
    }

    /// Replays one command. `offset` is its first index. Returns whether a
    /// draw call was issued.
    fn execute(&mut self, cmd: &DrawCommand, offset: u32, stats: &mut FlushStats) -> bool {
        match cmd {
            DrawCommand::ActivateBuffer(c) => {
                self.activate_buffer(c.buffer, c.width, c.height);
                false
            }
            DrawCommand::SetBlend(mode) => {
                let (src, dst) = mode.factors();
                self.gl.blend_func(src, dst);
                false
            }
            DrawCommand::DrawTexture(c) => self.draw_texture_cmd(c, offset, stats),
            DrawCommand::DrawRect { count } => {
                if self.use_program(&shader_lib::PRIMITIVE, None, [0.0; 2], stats).is_none() {
                    return false;
                }
                self.draw_elements(*count, offset);
                true
            }
            DrawCommand::PushMask { count } => {
                if self.use_program(&shader_lib::PRIMITIVE, None, [0.0; 2], stats).is_none() {
                    return false;
                }
                self.push_mask_cmd(*count, offset)
            }
            DrawCommand::PopMask { count } => {
                if self.use_program(&shader_lib::PRIMITIVE, None, [0.0; 2], stats).is_none() {
                    return false;
                }
                self.pop_mask_cmd(*count, offset)
            }
            DrawCommand::Clear => {
                if let Some(buffer) = self.activated.and_then(|k| self.buffers.get(k)) {
                    if buffer.width() != 0 || buffer.height() != 0 {
                        buffer.target.clear(&mut self.gl, true);
                    }
                }
                false
            }
            DrawCommand::Resize(c) => {
                if let Some(buffer) = self.buffers.get_mut(c.buffer) {
                    buffer.target.reallocate(&mut self.gl, c.width, c.height);
                }
                if self.activated == Some(c.buffer) {
                    self.on_resize(c.width, c.height);
                }
                false
            }
            DrawCommand::EnableScissor { rect } => {
                if let Some(buffer) = self.activated.and_then(|k| self.buffers.get_mut(k)) {
                    buffer.enable_scissor(&mut self.gl, *rect);
                }
                false
            }
            DrawCommand::DisableScissor => {
                if let Some(buffer) = self.activated.and_then(|k| self.buffers.get_mut(k)) {
                    buffer.disable_scissor(&mut self.gl);
                }
                false
            }
            DrawCommand::SetSmoothing(c) => {
                self.gl.bind_texture(Some(c.texture));
                self.gl.tex_filter(if c.smoothing {
                    TextureFilter::Linear
                } else {
                    TextureFilter::Nearest
                });
                false
            }
        }
    }

    fn activate_buffer(&mut self, key: BufferKey, width: u32, height: u32) {
        let Some(buffer) = self.buffers.get(key) else {
            log::warn!("activate: buffer {key:?} no longer exists");
            return;
        };
        buffer.target.activate(&mut self.gl);
        buffer.restore_stencil(&mut self.gl);
        buffer.restore_scissor(&mut self.gl);
        self.activated = Some(key);
        self.on_resize(width, height);
    }

    fn on_resize(&mut self, width: u32, height: u32) {
        self.gl.viewport(0, 0, width as i32, height as i32);
        self.projection = [width as f32 / 2.0, -(height as f32) / 2.0];
    }

    fn draw_texture_cmd(&mut self, cmd: &DrawTextureCmd, offset: u32, stats: &mut FlushStats) -> bool {
        let filter = cmd.filter.as_deref();
        let source = shader_lib::texture_program(filter);
        let size = [cmd.texture_width, cmd.texture_height];
        if self.use_program(&source, filter, size, stats).is_none() {
            return false;
        }
        self.gl.bind_texture(Some(cmd.texture));
        self.draw_elements(cmd.count, offset);
        true
    }

    /// Binds the program for `source` if it is not current, then syncs its uniforms.
    fn use_program(
        &mut self,
        source: &ProgramSource<'_>,
        filter: Option<&Filter>,
        texture_size: [f32; 2],
        stats: &mut FlushStats,
    ) -> Option<Rc<Program>> {
        let program = self.programs.get_or_link(&mut self.gl, source)?;
        if self.current_program.as_ref().map(|p| p.id) != Some(program.id) {
            self.gl.use_program(program.id);
            program.bind_attributes(&mut self.gl);
            self.current_program = Some(Rc::clone(&program));
            stats.program_switches += 1;
        }
        self.sync_uniforms(&program, filter, texture_size);
        Some(program)
    }

    fn sync_uniforms(&mut self, program: &Program, filter: Option<&Filter>, texture_size: [f32; 2]) {
        for uniform in program.uniforms() {
            let value = match uniform.name.as_str() {
                "projectionVector" => UniformValue::Vec2(self.projection),
                "uTextureSize" => UniformValue::Vec2(texture_size),
                "uSampler" => continue,
                name => match filter.and_then(|f| f.uniform(name)) {
                    Some(value) => value,
                    None => continue,
                },
            };
            self.gl.uniform(uniform.location, &value);
        }
    }

    fn draw_elements(&mut self, triangles: u32, offset: u32) {
        self.gl.draw_elements((triangles * 3) as i32, (offset * 2) as i32);
    }

    // ── stencil masks ─────────────────────────────────────────────────────

    /// Increments the stencil inside the mask quad. Entry level `n` draws at
    /// `n + 1` afterwards.
    fn push_mask_cmd(&mut self, count: u32, offset: u32) -> bool {
        let Some(key) = self.activated else { return false };
        let gl = &mut self.gl;
        let buffer = &mut self.buffers[key];

        buffer.target.enable_stencil(gl);
        if buffer.stencil_level() == 0 {
            buffer.enable_stencil(gl);
            gl.clear(ClearTarget::Stencil);
        }
        let level = buffer.enter_mask();

        gl.color_mask(false);
        gl.stencil_func(StencilFunc::Equal, level, 0xFF);
        gl.stencil_op(StencilOp::Keep, StencilOp::Keep, StencilOp::Incr);
        self.draw_elements(count, offset);

        let gl = &mut self.gl;
        gl.stencil_func(StencilFunc::Equal, level + 1, 0xFF);
        gl.color_mask(true);
        gl.stencil_op(StencilOp::Keep, StencilOp::Keep, StencilOp::Keep);
        true
    }

    /// Undoes the innermost mask. Leaving the last one disables the stencil test.
    fn pop_mask_cmd(&mut self, count: u32, offset: u32) -> bool {
        let Some(key) = self.activated else { return false };
        let buffer = &mut self.buffers[key];

        let level = match buffer.leave_mask() {
            None => {
                log::warn!("stencil underflow on {key:?}; pop ignored");
                return false;
            }
            Some(0) => {
                buffer.disable_stencil(&mut self.gl);
                return false;
            }
            Some(level) => level,
        };

        let gl = &mut self.gl;
        gl.color_mask(false);
        gl.stencil_func(StencilFunc::Equal, level + 1, 0xFF);
        gl.stencil_op(StencilOp::Keep, StencilOp::Keep, StencilOp::Decr);
        self.draw_elements(count, offset);

        let gl = &mut self.gl;
        gl.stencil_func(StencilFunc::Equal, level, 0xFF);
        gl.color_mask(true);
        gl.stencil_op(StencilOp::Keep, StencilOp::Keep, StencilOp::Keep);
        true
    }
}
