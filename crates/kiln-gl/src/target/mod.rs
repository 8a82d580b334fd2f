//! Render buffers and their bookkeeping.
//!
//! - `buffer`: a draw target (surface or offscreen texture) with transform and mask state
//! - `pool`: idle offscreen buffers reused across frames
//! - `stack`: which buffer is currently drawn into

mod buffer;
mod pool;
mod stack;

pub use buffer::{BufferKey, RenderBuffer, RenderTarget, TargetKind};
pub use pool::{Acquire, BufferPool, BufferPoolOpts, BufferPoolStats};
pub use stack::RenderTargetStack;
