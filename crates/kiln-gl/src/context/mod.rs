//! The batching render context.
//!
//! Draw calls made while a frame is recorded only touch the vertex assembler
//! and the command queue. `flush` uploads the batch and replays the queue
//! against GL. A full batch flushes implicitly.

mod caps;
mod config;
mod filters;
mod flush;
mod record;
mod resources;
mod state;


use std::rc::Rc;

use anyhow::{Context, Result};
use slotmap::SlotMap;

use crate::batch::{DrawCmdQueue, VertexArrayObject};
use crate::filter::{ColorMatrix, Filter};
use crate::gl::{BufferId, BufferTarget, BufferUsage, Capability, GlApi};
use crate::paint::BlendMode;
use crate::program::{Program, ProgramCache};
use crate::target::{BufferKey, BufferPool, BufferPoolStats, RenderBuffer, RenderTarget, RenderTargetStack};

pub use caps::Capabilities;
pub use config::ContextConfig;
pub use state::{ContextEvent, ContextState, FlushStats, FramePhase};

/// Persistent GL buffers shared by every batch.
#[derive(Debug, Copy, Clone)]
struct GpuBuffers {
    vertices: BufferId,
    /// Static quad index pattern, uploaded once.
    quad_indices: BufferId,
    /// Re-uploaded on flushes whose batch contains a mesh.
    mesh_indices: BufferId,
}

/// Owns the GL state of one drawing surface and batches draws into it.
///
/// Lifecycle:
/// - `new` creates the GPU objects and activates the root buffer
/// - drawing methods record; `flush` replays
/// - `on_context_event(Lost)` turns every operation into a no-op until
///   `on_context_event(Restored)` rebuilds the GPU objects
pub struct RenderContext<G: GlApi> {
    gl: G,
    config: ContextConfig,
    state: ContextState,
    phase: FramePhase,
    /// Bumped on every restore; textures from older generations are dead.
    generation: u64,
    caps: Capabilities,
    texture_format_in_use: Option<String>,

    gpu: Option<GpuBuffers>,
    /// `(width / 2, -height / 2)` of the active buffer.
    projection: [f32; 2],

    vao: VertexArrayObject,
    queue: DrawCmdQueue,

    buffers: SlotMap<BufferKey, RenderBuffer>,
    root: BufferKey,
    stack: RenderTargetStack,
    pool: BufferPool,

    programs: ProgramCache,
    current_program: Option<Rc<Program>>,
    /// Buffer bound at the current replay position.
    activated: Option<BufferKey>,
    color_filter: Option<Rc<Filter>>,

    stats: FlushStats,
    implicit_flushes: usize,
}

impl<G: GlApi> RenderContext<G> {
    /// Creates a context drawing into a `width × height` surface.
    pub fn new(gl: G, width: u32, height: u32, config: ContextConfig) -> Result<Self> {
        anyhow::ensure!(!gl.is_context_lost(), "GL context is lost");

        let mut buffers = SlotMap::with_key();
        let mut root_buffer = RenderBuffer::new(width, height);
        root_buffer.compute_draw_call = config.compute_draw_calls;
        let root = buffers.insert(root_buffer);

        let mut ctx = Self {
            gl,
            vao: VertexArrayObject::new(config.effective_max_quads()),
            pool: BufferPool::new(config.pool),
            config,
            state: ContextState::Active,
            phase: FramePhase::Idle,
            generation: 0,
            caps: Capabilities::default(),
            texture_format_in_use: None,
            gpu: None,
            projection: [width as f32 / 2.0, -(height as f32) / 2.0],
            queue: DrawCmdQueue::new(),
            buffers,
            root,
            stack: RenderTargetStack::new(root),
            programs: ProgramCache::new(),
            current_program: None,
            activated: None,
            color_filter: None,
            stats: FlushStats::default(),
            implicit_flushes: 0,
        };

        ctx.initialize_gpu().context("failed to initialize render context")?;
        ctx.reset_recording();

        log::info!(
            "render context ready: {width}x{height}, {} quads per batch, max texture {}",
            ctx.vao.max_quads(),
            ctx.caps.max_texture_size,
        );
        Ok(ctx)
    }

    /// Runs `f` only while the GL context is usable.
    fn when_active<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> Option<R> {
        match self.state {
            ContextState::Active => Some(f(self)),
            ContextState::Lost | ContextState::Restoring => None,
        }
    }

    /// The queue, marking the frame as recording.
    fn recording(&mut self) -> &mut DrawCmdQueue {
        self.phase = FramePhase::Recording;
        &mut self.queue
    }

    // ── GPU objects ───────────────────────────────────────────────────────

    fn initialize_gpu(&mut self) -> Result<()> {
        let gl = &mut self.gl;
        gl.disable(Capability::DepthTest);
        gl.disable(Capability::CullFace);
        gl.enable(Capability::Blend);
        gl.color_mask(true);
        gl.active_texture(0);

        let vertices = gl.create_buffer().context("vertex buffer allocation failed")?;
        let quad_indices = gl.create_buffer().context("index buffer allocation failed")?;
        let mesh_indices = gl.create_buffer().context("mesh index buffer allocation failed")?;

        gl.bind_buffer(BufferTarget::Array, vertices);
        gl.bind_buffer(BufferTarget::ElementArray, quad_indices);
        gl.buffer_data(
            BufferTarget::ElementArray,
            bytemuck::cast_slice(self.vao.quad_indices()),
            BufferUsage::StaticDraw,
        );

        self.gpu = Some(GpuBuffers { vertices, quad_indices, mesh_indices });
        self.caps = Capabilities::probe(&self.gl);
        self.current_program = None;
        self.activated = None;
        Ok(())
    }

    /// Empties the batch and queues the initial blend and root activation.
    fn reset_recording(&mut self) {
        self.queue.clear();
        self.vao.clear();
        self.stack.reset();
        for buffer in self.buffers.values_mut() {
            buffer.reset_recording();
        }
        self.implicit_flushes = 0;

        let (width, height) = self.buffer_size(self.root);
        self.queue.push_set_blend(BlendMode::SourceOver);
        self.queue.push_activate_buffer(self.root, width, height);
        self.phase = FramePhase::Recording;
    }

    /// Enters the lost state after a failed GPU allocation.
    fn enter_lost(&mut self, reason: &str) {
        log::warn!("{reason}; treating GL context as lost");
        self.mark_lost();
    }

    fn mark_lost(&mut self) {
        self.state = ContextState::Lost;
        self.phase = FramePhase::Idle;
        self.queue.clear();
        self.vao.clear();
        self.current_program = None;
        self.activated = None;
    }

    // ── context loss ──────────────────────────────────────────────────────

    /// Handles a platform loss or restore notification.
    pub fn on_context_event(&mut self, event: ContextEvent) {
        match event {
            ContextEvent::Lost => {
                if self.state != ContextState::Lost {
                    log::warn!("GL context lost");
                    self.mark_lost();
                }
            }
            ContextEvent::Restored => {
                if self.state == ContextState::Active {
                    log::debug!("restore notification while active; ignored");
                    return;
                }
                self.state = ContextState::Restoring;
                match self.rebuild_gpu() {
                    Ok(()) => {
                        self.state = ContextState::Active;
                        log::info!("GL context restored (generation {})", self.generation);
                    }
                    Err(err) => {
                        log::error!("GL context restore failed: {err:#}");
                        self.mark_lost();
                    }
                }
            }
        }
    }

    /// Recreates every GPU object after a restore.
    fn rebuild_gpu(&mut self) -> Result<()> {
        self.generation += 1;
        self.programs.forget();
        self.gpu = None;

        let root = self.root;
        for (key, buffer) in self.buffers.iter_mut() {
            buffer.reset_gpu_state();
            if key == root {
                continue;
            }
            let (width, height) = (buffer.width(), buffer.height());
            buffer.target = RenderTarget::offscreen(&mut self.gl, width, height)
                .with_context(|| format!("offscreen target {width}x{height} allocation failed"))?;
        }

        self.initialize_gpu()?;
        self.reset_recording();
        Ok(())
    }

    // ── accessors ─────────────────────────────────────────────────────────

    #[inline]
    pub fn gl(&self) -> &G {
        &self.gl
    }

    #[inline]
    pub fn gl_mut(&mut self) -> &mut G {
        &mut self.gl
    }

    #[inline]
    pub fn state(&self) -> ContextState {
        self.state
    }

    #[inline]
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Context generation; increases on every restore.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Counters of the last flush.
    #[inline]
    pub fn stats(&self) -> &FlushStats {
        &self.stats
    }

    #[inline]
    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// `(width / 2, -height / 2)` of the buffer bound at the replay position.
    #[inline]
    pub fn projection(&self) -> [f32; 2] {
        self.projection
    }

    /// Compressed container suffixes this device can load.
    #[inline]
    pub fn texture_formats_supported(&self) -> &[String] {
        &self.caps.textures_supported
    }

    /// Picks the preferred loadable suffix among `available` and remembers it.
    pub fn set_texture_format_to_use(&mut self, available: &[&str]) -> Option<&str> {
        self.texture_format_in_use = self.caps.select_texture_format(available);
        if let Some(format) = &self.texture_format_in_use {
            log::debug!("texture format in use: {format}");
        }
        self.texture_format_in_use.as_deref()
    }

    #[inline]
    pub fn texture_format_in_use(&self) -> Option<&str> {
        self.texture_format_in_use.as_deref()
    }

    /// Color matrix applied to every subsequent texture draw.
    pub fn set_color_filter(&mut self, matrix: Option<ColorMatrix>) {
        self.color_filter = matrix.map(|m| Rc::new(Filter::ColorTransform(m)));
    }

    #[inline]
    pub fn root(&self) -> BufferKey {
        self.root
    }

    /// Current draw target.
    #[inline]
    pub fn current_buffer(&self) -> BufferKey {
        self.stack.current()
    }

    #[inline]
    pub fn buffer(&self, key: BufferKey) -> Option<&RenderBuffer> {
        self.buffers.get(key)
    }

    /// Transform, alpha and tint of a buffer are set through this.
    #[inline]
    pub fn buffer_mut(&mut self, key: BufferKey) -> Option<&mut RenderBuffer> {
        self.buffers.get_mut(key)
    }

    /// The current draw target.
    #[inline]
    pub fn current(&mut self) -> &mut RenderBuffer {
        let key = self.stack.current();
        &mut self.buffers[key]
    }

    /// Number of render buffers alive, root included.
    #[inline]
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    pub fn pool_stats(&self) -> BufferPoolStats {
        self.pool.stats()
    }

    /// Commands waiting for the next flush.
    #[inline]
    pub fn pending_commands(&self) -> usize {
        self.queue.len()
    }

    /// Vertices waiting for the next flush.
    #[inline]
    pub fn pending_vertices(&self) -> usize {
        self.vao.vertices().len()
    }

    fn buffer_size(&self, key: BufferKey) -> (u32, u32) {
        self.buffers.get(key).map_or((0, 0), |b| (b.width(), b.height()))
    }
}

impl<G: GlApi> Drop for RenderContext<G> {
    fn drop(&mut self) {
        if self.state != ContextState::Active || self.gl.is_context_lost() {
            return;
        }
        self.programs.delete_all(&mut self.gl);
        for buffer in self.buffers.values_mut() {
            buffer.target.dispose(&mut self.gl);
        }
        if let Some(gpu) = self.gpu.take() {
            self.gl.delete_buffer(gpu.vertices);
            self.gl.delete_buffer(gpu.quad_indices);
            self.gl.delete_buffer(gpu.mesh_indices);
        }
    }
}
