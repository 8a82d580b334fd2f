use crate::batch::{DEFAULT_MAX_QUADS, MAX_VERTICES_U16};
use crate::target::BufferPoolOpts;

/// Construction parameters for a [`super::RenderContext`].
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Quads per batch before an implicit flush.
    ///
    /// Clamped so a batch never needs indices beyond 16 bits.
    pub max_quads_per_batch: usize,

    /// Offscreen buffer pool limits.
    pub pool: BufferPoolOpts,

    /// Count draw calls issued while the root buffer is active.
    pub compute_draw_calls: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_quads_per_batch: DEFAULT_MAX_QUADS,
            pool: BufferPoolOpts::default(),
            compute_draw_calls: false,
        }
    }
}

impl ContextConfig {
    /// `max_quads_per_batch` after clamping.
    pub fn effective_max_quads(&self) -> usize {
        self.max_quads_per_batch.clamp(1, MAX_VERTICES_U16 / 4)
    }
}
