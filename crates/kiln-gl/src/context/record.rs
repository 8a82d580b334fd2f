use crate::batch::{DrawRegion, Mesh, QUAD_TRIANGLES};
use crate::coords::{Matrix, Rect};
use crate::gl::{GlApi, TextureId};
use crate::paint::BlendMode;
use crate::target::BufferKey;
use crate::texture::{BitmapData, TextureHandle};

use super::RenderContext;

/// Vertex and index footprint of one drawable.
fn footprint(mesh: Option<&Mesh<'_>>) -> (usize, usize) {
    mesh.map_or((4, 6), |m| (m.vertex_count(), m.indices.len()))
}

impl<G: GlApi> RenderContext<G> {
    // ── target stack ──────────────────────────────────────────────────────

    /// Makes `key` the current draw target.
    pub fn push_buffer(&mut self, key: BufferKey) {
        self.when_active(|ctx| {
            if !ctx.buffers.contains_key(key) {
                log::warn!("push_buffer: unknown buffer {key:?}");
                return;
            }
            if ctx.stack.push(key) {
                ctx.record_activate(key);
            }
        });
    }

    /// Returns to the previous draw target. The root is never popped.
    pub fn pop_buffer(&mut self) {
        self.when_active(|ctx| {
            if let Some(previous) = ctx.stack.pop() {
                ctx.record_activate(previous);
            }
        });
    }

    pub(super) fn record_activate(&mut self, key: BufferKey) {
        let (width, height) = self.buffer_size(key);
        self.recording().push_activate_buffer(key, width, height);
    }

    // ── state ─────────────────────────────────────────────────────────────

    pub fn set_global_composite_operation(&mut self, mode: BlendMode) {
        self.when_active(|ctx| ctx.recording().push_set_blend(mode));
    }

    // ── textured draws ────────────────────────────────────────────────────

    /// Draws `region` of `image`, uploading its texture on first use.
    ///
    /// `smoothing` switches the texture's filtering when it differs from the
    /// last requested mode.
    pub fn draw_image(&mut self, image: &mut BitmapData, region: &DrawRegion, smoothing: Option<bool>) {
        self.when_active(|ctx| ctx.draw_bitmap(image, region, None, smoothing));
    }

    /// Draws `image` through a triangle mesh.
    pub fn draw_mesh(
        &mut self,
        image: &mut BitmapData,
        region: &DrawRegion,
        mesh: &Mesh<'_>,
        smoothing: Option<bool>,
    ) {
        self.when_active(|ctx| ctx.draw_bitmap(image, region, Some(mesh), smoothing));
    }

    fn draw_bitmap(
        &mut self,
        image: &mut BitmapData,
        region: &DrawRegion,
        mesh: Option<&Mesh<'_>>,
        smoothing: Option<bool>,
    ) {
        let Some(mut handle) = self.texture_for(image) else { return };
        let before = handle.smoothing;
        self.draw_texture(&mut handle, region, mesh, smoothing);
        if handle.smoothing != before {
            image.set_texture(handle);
        }
    }

    /// Draws an already uploaded texture.
    pub fn draw_texture(
        &mut self,
        texture: &mut TextureHandle,
        region: &DrawRegion,
        mesh: Option<&Mesh<'_>>,
        smoothing: Option<bool>,
    ) {
        self.when_active(|ctx| {
            if texture.generation != ctx.generation {
                log::warn!("draw_texture: {:?} belongs to a lost context", texture.id);
                return;
            }
            ctx.record_texture(texture.id, Some(&mut texture.smoothing), region, mesh, smoothing);
        });
    }

    /// Draws the color texture of an offscreen buffer into the current one.
    ///
    /// Offscreen textures are stored bottom-up, so the draw is flipped vertically.
    pub fn draw_render_buffer(&mut self, source: BufferKey, region: &DrawRegion, mesh: Option<&Mesh<'_>>) {
        self.when_active(|ctx| {
            let current = ctx.stack.current();
            if source == current {
                log::warn!("draw_render_buffer: cannot sample the current target");
                return;
            }
            let Some(texture) = ctx.buffers.get(source).and_then(|b| b.target.texture()) else {
                log::warn!("draw_render_buffer: {source:?} has no color texture");
                return;
            };

            let dest = region.dest;
            let buffer = &mut ctx.buffers[current];
            buffer.save_transform();
            buffer.use_offset();
            buffer.transform(Matrix::new(1.0, 0.0, 0.0, -1.0, 0.0, dest.height + dest.y * 2.0));
            ctx.record_texture(texture, None, region, mesh, None);
            ctx.buffers[current].restore_transform();
        });
    }

    /// Appends one textured drawable to the batch.
    fn record_texture(
        &mut self,
        texture: TextureId,
        texture_smoothing: Option<&mut bool>,
        region: &DrawRegion,
        mesh: Option<&Mesh<'_>>,
        smoothing: Option<bool>,
    ) {
        if let Some(Err(err)) = mesh.map(Mesh::validate) {
            log::warn!("{err}; mesh skipped");
            return;
        }
        let (vertex_count, index_count) = footprint(mesh);
        if !self.vao.fits(vertex_count, index_count) {
            log::warn!("mesh of {vertex_count} vertices exceeds the batch capacity; skipped");
            return;
        }
        if self.vao.reach_max_size(vertex_count, index_count) {
            self.flush_batch();
        }

        if let (Some(requested), Some(current)) = (smoothing, texture_smoothing) {
            if *current != requested {
                self.recording().push_change_smoothing(texture, requested);
                *current = requested;
            }
        }

        let count = match mesh {
            Some(m) => {
                self.vao.change_to_mesh_indices();
                m.triangle_count() as u32
            }
            None => QUAD_TRIANGLES,
        };

        let filter = self.color_filter.clone();
        self.recording().push_draw_texture(
            texture,
            count,
            filter,
            region.texture_width,
            region.texture_height,
        );
        let buffer = &self.buffers[self.stack.current()];
        self.vao.cache_arrays(buffer, region, mesh);
    }

    // ── solid draws and masks ─────────────────────────────────────────────

    /// Fills `rect` with the current buffer's tint and alpha.
    pub fn draw_rect(&mut self, rect: Rect) {
        self.when_active(|ctx| {
            ctx.reserve_quad();
            ctx.recording().push_draw_rect();
            ctx.cache_solid(rect);
        });
    }

    /// Restricts subsequent draws to `rect` (intersected with enclosing masks).
    pub fn push_mask(&mut self, rect: Rect) {
        self.when_active(|ctx| {
            let current = ctx.stack.current();
            ctx.buffers[current].stencil_list.push(rect);
            ctx.reserve_quad();
            ctx.recording().push_push_mask();
            ctx.cache_solid(rect);
        });
    }

    /// Removes the innermost mask. Ignored without a matching push.
    pub fn pop_mask(&mut self) {
        self.when_active(|ctx| {
            let current = ctx.stack.current();
            let Some(rect) = ctx.buffers[current].stencil_list.pop() else {
                log::warn!("pop_mask without a matching push_mask; ignored");
                return;
            };
            ctx.reserve_quad();
            ctx.recording().push_pop_mask();
            ctx.cache_solid(rect);
        });
    }

    pub(super) fn reserve_quad(&mut self) {
        if self.vao.reach_max_size(4, 6) {
            self.flush_batch();
        }
    }

    fn cache_solid(&mut self, rect: Rect) {
        let buffer = &self.buffers[self.stack.current()];
        self.vao.cache_arrays(buffer, &DrawRegion::solid(rect), None);
    }

    // ── clearing and scissor ──────────────────────────────────────────────

    /// Clears the current target to transparent black.
    pub fn clear(&mut self) {
        self.when_active(|ctx| ctx.recording().push_clear());
    }

    /// Clears `rect` (in the current buffer's local space) to transparent black.
    ///
    /// A rect covering the whole target becomes a plain clear. Axis-aligned
    /// transforms clear through a temporary scissor; anything else erases by
    /// drawing with `DestinationOut`.
    pub fn clear_rect(&mut self, rect: Rect) {
        self.when_active(|ctx| {
            let buffer = &ctx.buffers[ctx.stack.current()];
            let (width, height) = (buffer.width() as f32, buffer.height() as f32);
            let m = buffer.global_matrix;
            let has_scissor = buffer.has_scissor();

            if rect.covers_surface(width, height) {
                ctx.recording().push_clear();
                return;
            }

            if rect.is_empty() {
                return;
            }

            if !has_scissor && m.is_axis_aligned() {
                let (x0, x1) = (rect.x * m.a + m.tx, rect.right() * m.a + m.tx);
                let (y0, y1) = (rect.y * m.d + m.ty, rect.bottom() * m.d + m.ty);
                let (y, h) = (y0.min(y1), (y1 - y0).abs());
                let flipped = Rect::new(x0.min(x1), height - y - h, (x1 - x0).abs(), h);
                // nothing of the rect lies on the target
                let Some(clip) = flipped.intersect(Rect::from_size(width, height)) else { return };
                ctx.scissor_gl(clip);
                ctx.recording().push_clear();
                ctx.disable_scissor_inner();
            } else {
                ctx.recording().push_set_blend(BlendMode::DestinationOut);
                ctx.reserve_quad();
                ctx.recording().push_draw_rect();
                ctx.cache_solid(rect);
                ctx.recording().push_set_blend(BlendMode::SourceOver);
            }
        });
    }

    /// Clips subsequent draws to `rect`, given in device pixels of the
    /// current target with a top-left origin.
    pub fn enable_scissor(&mut self, rect: Rect) {
        self.when_active(|ctx| {
            let height = ctx.buffers[ctx.stack.current()].height() as f32;
            ctx.scissor_gl(Rect::new(rect.x, height - rect.y - rect.height, rect.width, rect.height));
        });
    }

    pub fn disable_scissor(&mut self) {
        self.when_active(|ctx| ctx.disable_scissor_inner());
    }

    /// `rect` is in GL window coordinates.
    fn scissor_gl(&mut self, rect: Rect) {
        let current = self.stack.current();
        self.buffers[current].has_scissor = true;
        self.recording().push_enable_scissor(rect);
    }

    fn disable_scissor_inner(&mut self) {
        let current = self.stack.current();
        self.buffers[current].has_scissor = false;
        self.recording().push_disable_scissor();
    }
}
