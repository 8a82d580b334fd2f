use slotmap::SlotMap;

use super::{BufferKey, RenderBuffer};

/// Pool configuration for offscreen render buffers.
#[derive(Debug, Clone, Copy)]
pub struct BufferPoolOpts {
    /// Maximum idle buffers retained. Extra releases are disposed.
    pub max_pooled_buffers: usize,
}

impl Default for BufferPoolOpts {
    fn default() -> Self {
        Self { max_pooled_buffers: 8 }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BufferPoolStats {
    pub retained: usize,
    pub parked: usize,
    pub reused: u64,
    pub grown: u64,
    pub allocated: u64,
    pub dropped_on_release: u64,
}

/// Outcome of [`BufferPool::acquire`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Acquire {
    /// A pooled buffer already large enough.
    Reuse(BufferKey),
    /// A pooled buffer that must grow to the requested size.
    Grow(BufferKey),
    /// Nothing pooled; allocate a new buffer.
    Allocate,
}

/// Idle offscreen buffers, reused across frames.
///
/// Buffers only ever grow: a request is served by the smallest pooled buffer
/// that already fits, else by the largest one grown to fit.
///
/// Releases of buffers still referenced by queued commands are parked and
/// move into the pool once those commands have run.
#[derive(Debug, Default)]
pub struct BufferPool {
    opts: BufferPoolOpts,
    stats: BufferPoolStats,
    free: Vec<BufferKey>,
    parked: Vec<BufferKey>,
}

impl BufferPool {
    pub fn new(opts: BufferPoolOpts) -> Self {
        Self { opts, ..Self::default() }
    }

    pub fn stats(&self) -> BufferPoolStats {
        BufferPoolStats {
            retained: self.free.len(),
            parked: self.parked.len(),
            ..self.stats.clone()
        }
    }

    #[inline]
    pub fn contains(&self, key: BufferKey) -> bool {
        self.free.contains(&key) || self.parked.contains(&key)
    }

    /// Picks a pooled buffer for a `width × height` request and removes it from the pool.
    pub fn acquire(
        &mut self,
        buffers: &SlotMap<BufferKey, RenderBuffer>,
        width: u32,
        height: u32,
    ) -> Acquire {
        let area = |k: &BufferKey| {
            buffers
                .get(*k)
                .map(|b| b.width() as u64 * b.height() as u64)
                .unwrap_or(0)
        };

        let fitting = self
            .free
            .iter()
            .enumerate()
            .filter(|(_, k)| {
                buffers
                    .get(**k)
                    .is_some_and(|b| b.width() >= width && b.height() >= height)
            })
            .min_by_key(|(_, k)| area(*k))
            .map(|(i, _)| i);

        if let Some(i) = fitting {
            self.stats.reused += 1;
            return Acquire::Reuse(self.free.swap_remove(i));
        }

        let largest = self
            .free
            .iter()
            .enumerate()
            .max_by_key(|(_, k)| area(*k))
            .map(|(i, _)| i);

        match largest {
            Some(i) => {
                self.stats.grown += 1;
                Acquire::Grow(self.free.swap_remove(i))
            }
            None => {
                self.stats.allocated += 1;
                Acquire::Allocate
            }
        }
    }

    /// Returns a buffer to the pool. Yields the buffer to dispose when the pool is full.
    #[must_use]
    pub fn release(&mut self, key: BufferKey) -> Option<BufferKey> {
        if self.free.contains(&key) {
            return None;
        }
        if self.free.len() >= self.opts.max_pooled_buffers {
            self.stats.dropped_on_release += 1;
            return Some(key);
        }
        self.free.push(key);
        None
    }

    /// Defers a release until the pending commands have been replayed.
    pub fn park(&mut self, key: BufferKey) {
        if !self.parked.contains(&key) {
            self.parked.push(key);
        }
    }

    /// Moves parked buffers into the pool. Yields those that did not fit.
    #[must_use]
    pub fn unpark(&mut self) -> Vec<BufferKey> {
        let parked = std::mem::take(&mut self.parked);
        parked.into_iter().filter_map(|k| self.release(k)).collect()
    }
}
