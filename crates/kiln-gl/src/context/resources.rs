use crate::gl::{GlApi, TextureFilter};
use crate::target::{Acquire, BufferKey, RenderBuffer, RenderTarget, TargetKind};
use crate::texture::{BitmapData, BitmapSource, TextureHandle};

use super::RenderContext;

impl<G: GlApi> RenderContext<G> {
    // ── offscreen buffers ─────────────────────────────────────────────────

    /// Takes an offscreen buffer of at least `width × height` from the pool.
    ///
    /// Pooled buffers keep their larger size. Their contents are cleared and
    /// their transform, alpha, tint, masks and scissor reset. `None` while
    /// the context is lost or when the allocation fails (which marks the
    /// context lost).
    pub fn create_render_buffer(&mut self, width: u32, height: u32) -> Option<BufferKey> {
        self.when_active(|ctx| ctx.acquire_buffer(width.max(1), height.max(1)))
            .flatten()
    }

    fn acquire_buffer(&mut self, width: u32, height: u32) -> Option<BufferKey> {
        match self.pool.acquire(&self.buffers, width, height) {
            Acquire::Reuse(key) => {
                self.buffers[key].reset_for_reuse();
                self.record_on(key, |ctx| ctx.recording().push_clear());
                Some(key)
            }
            Acquire::Grow(key) => {
                let buffer = &mut self.buffers[key];
                buffer.reset_for_reuse();
                let grown = (buffer.width().max(width), buffer.height().max(height));
                log::trace!("growing pooled buffer {key:?} to {}x{}", grown.0, grown.1);
                buffer.target.width = grown.0;
                buffer.target.height = grown.1;
                self.record_on(key, |ctx| {
                    ctx.recording().push_resize(key, grown.0, grown.1);
                    ctx.recording().push_clear();
                });
                Some(key)
            }
            Acquire::Allocate => {
                let Some(target) = RenderTarget::offscreen(&mut self.gl, width, height) else {
                    self.enter_lost("offscreen target allocation failed");
                    return None;
                };
                // allocation binds the new framebuffer; put the replay binding back
                if let Some(active) = self.activated.and_then(|k| self.buffers.get(k)) {
                    active.target.activate(&mut self.gl);
                }
                let key = self.buffers.insert(RenderBuffer::with_target(target));
                log::trace!("allocated render buffer {key:?} ({width}x{height})");
                Some(key)
            }
        }
    }

    /// Records `f` with `key` temporarily made the current target.
    fn record_on(&mut self, key: BufferKey, f: impl FnOnce(&mut Self)) {
        if self.stack.push(key) {
            self.record_activate(key);
        }
        f(self);
        if let Some(previous) = self.stack.pop() {
            self.record_activate(previous);
        }
    }

    /// Returns an offscreen buffer to the pool.
    ///
    /// A buffer still referenced by queued commands is parked until the next
    /// flush has replayed them. Buffers on the target stack are never released.
    pub fn release_render_buffer(&mut self, key: BufferKey) {
        self.when_active(|ctx| {
            if key == ctx.root || ctx.stack.contains(key) {
                log::warn!("release_render_buffer: {key:?} is on the target stack; ignored");
                return;
            }
            let Some(buffer) = ctx.buffers.get(key) else { return };
            if ctx.pool.contains(key) {
                return;
            }
            if ctx.queue.references_buffer(key, buffer.target.texture()) {
                ctx.pool.park(key);
            } else if let Some(evicted) = ctx.pool.release(key) {
                ctx.dispose_buffer(evicted);
            }
        });
    }

    pub(super) fn dispose_buffer(&mut self, key: BufferKey) {
        if let Some(mut buffer) = self.buffers.remove(key) {
            buffer.target.dispose(&mut self.gl);
            log::trace!("disposed render buffer {key:?}");
        }
    }

    // ── surface ───────────────────────────────────────────────────────────

    /// Resizes the root surface and clears it.
    ///
    /// With `use_max_size` the surface only grows.
    pub fn resize(&mut self, width: u32, height: u32, use_max_size: bool) {
        self.when_active(|ctx| {
            let root = ctx.root;
            let (old_w, old_h) = ctx.buffer_size(root);
            let (width, height) = if use_max_size {
                (width.max(old_w), height.max(old_h))
            } else {
                (width, height)
            };
            if (width, height) == (old_w, old_h) {
                return;
            }
            log::debug!("resizing surface {old_w}x{old_h} -> {width}x{height}");

            let target = &mut ctx.buffers[root].target;
            target.width = width;
            target.height = height;
            ctx.record_on(root, |ctx| {
                ctx.recording().push_resize(root, width, height);
                ctx.recording().push_clear();
            });
        });
    }

    /// Reads back RGBA8 pixels of the current target in GL window coordinates.
    ///
    /// Pending commands are flushed first.
    pub fn get_pixels(&mut self, x: i32, y: i32, width: u32, height: u32) -> Vec<u8> {
        self.when_active(|ctx| {
            ctx.flush();
            let current = ctx.stack.current();
            let mut pixels = vec![0; width as usize * height as usize * 4];
            ctx.buffers[current].target.activate(&mut ctx.gl);
            ctx.activated = Some(current);
            ctx.gl.read_pixels(x, y, width as i32, height as i32, &mut pixels);
            pixels
        })
        .unwrap_or_default()
    }

    // ── textures ──────────────────────────────────────────────────────────

    /// The GPU texture of `image`, uploading it on first use.
    ///
    /// Textures from before a context restore are re-created.
    pub fn texture_for(&mut self, image: &mut BitmapData) -> Option<TextureHandle> {
        self.when_active(|ctx| {
            if let Some(handle) = image.cached_texture(ctx.generation) {
                return Some(handle);
            }
            let handle = ctx.upload(image)?;
            image.set_texture(handle);
            Some(handle)
        })
        .flatten()
    }

    fn upload(&mut self, image: &BitmapData) -> Option<TextureHandle> {
        let source = image.source()?;
        if let BitmapSource::Compressed(ktx) = source {
            if ktx.is_invalid() {
                log::warn!("skipping invalid compressed texture");
                return None;
            }
        }

        let Some(id) = self.gl.create_texture() else {
            self.enter_lost("texture allocation failed");
            return None;
        };
        self.gl.bind_texture(Some(id));
        match source {
            BitmapSource::Pixels(pixels) => {
                self.gl.pixel_store_premultiply_alpha(true);
                self.gl.tex_image_2d(pixels.width(), pixels.height(), Some(pixels.rgba()));
            }
            BitmapSource::Compressed(ktx) => {
                let mipmaps = ktx.header().number_of_mipmap_levels > 1;
                let levels = ktx.upload_levels(&mut self.gl, mipmaps);
                log::trace!("uploaded {levels} compressed images to {id:?}");
            }
        }
        self.gl.tex_filter(TextureFilter::Linear);
        self.gl.tex_wrap_clamp();

        Some(TextureHandle {
            id,
            width: image.width,
            height: image.height,
            smoothing: true,
            generation: self.generation,
        })
    }

    /// Re-uploads the pixels of `image` into its existing texture.
    pub fn update_texture(&mut self, image: &mut BitmapData) {
        self.when_active(|ctx| {
            let Some(mut handle) = image.cached_texture(ctx.generation) else {
                ctx.texture_for(image);
                return;
            };
            let Some(BitmapSource::Pixels(pixels)) = image.source() else {
                log::warn!("update_texture: {:?} has no pixel source", handle.id);
                return;
            };
            if ctx.queue.references_texture(handle.id) {
                ctx.flush();
            }
            ctx.gl.bind_texture(Some(handle.id));
            ctx.gl.pixel_store_premultiply_alpha(true);
            ctx.gl.tex_image_2d(pixels.width(), pixels.height(), Some(pixels.rgba()));
            handle.width = pixels.width();
            handle.height = pixels.height();
            image.set_texture(handle);
        });
    }

    /// Deletes the GPU texture of `image`. Queued draws using it run first.
    pub fn release_texture(&mut self, image: &mut BitmapData) {
        let Some(handle) = image.take_texture() else { return };
        self.when_active(|ctx| {
            if handle.generation != ctx.generation {
                return;
            }
            if ctx.queue.references_texture(handle.id) {
                ctx.flush();
            }
            ctx.gl.delete_texture(handle.id);
        });
    }

    /// True if `key` names a live offscreen buffer.
    pub fn is_offscreen(&self, key: BufferKey) -> bool {
        self.buffers.get(key).is_some_and(|b| b.target.kind() == TargetKind::Offscreen)
    }
}
