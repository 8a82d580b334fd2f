use std::rc::Rc;

use crate::coords::Rect;
use crate::filter::Filter;
use crate::gl::TextureId;
use crate::paint::BlendMode;
use crate::target::BufferKey;

/// Triangles per quad.
pub const QUAD_TRIANGLES: u32 = 2;

// ── payloads ──────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ActivateBufferCmd {
    pub buffer: BufferKey,
    /// Target size at record time; drives viewport and projection.
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct DrawTextureCmd {
    pub texture: TextureId,
    /// Triangles drawn from the current index position.
    pub count: u32,
    pub filter: Option<Rc<Filter>>,
    pub texture_width: f32,
    pub texture_height: f32,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ResizeCmd {
    pub buffer: BufferKey,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SmoothingCmd {
    pub texture: TextureId,
    pub smoothing: bool,
}

/// One deferred GPU operation.
///
/// Order is significant: blend mode, stencil level and active buffer are
/// positional state that later commands depend on.
#[derive(Debug, Clone)]
pub enum DrawCommand {
    ActivateBuffer(ActivateBufferCmd),
    SetBlend(BlendMode),
    DrawTexture(DrawTextureCmd),
    DrawRect { count: u32 },
    PushMask { count: u32 },
    PopMask { count: u32 },
    Clear,
    Resize(ResizeCmd),
    /// Scissor rect in GL window coordinates (bottom-left origin).
    EnableScissor { rect: Rect },
    DisableScissor,
    SetSmoothing(SmoothingCmd),
}

impl DrawCommand {
    /// Triangles this command consumes from the index stream.
    #[inline]
    pub fn triangles(&self) -> u32 {
        match self {
            DrawCommand::DrawTexture(cmd) => cmd.count,
            DrawCommand::DrawRect { count }
            | DrawCommand::PushMask { count }
            | DrawCommand::PopMask { count } => *count,
            _ => 0,
        }
    }

    /// True for commands that issue a draw call.
    #[inline]
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            DrawCommand::DrawTexture(_)
                | DrawCommand::DrawRect { .. }
                | DrawCommand::PushMask { .. }
                | DrawCommand::PopMask { .. }
        )
    }
}

// ── queue ─────────────────────────────────────────────────────────────────

/// Ordered log of deferred GPU operations for one flush.
///
/// Pushing never touches the GPU. Adjacent commands are coalesced where
/// replaying them separately would only repeat state:
/// - unfiltered texture draws on the same texture merge their triangle counts
/// - consecutive rect draws merge
/// - a blend with no draw since the previous blend replaces it; a blend equal
///   to the last effective one is dropped
/// - a buffer activation with nothing effective since the previous one replaces it
#[derive(Debug, Default)]
pub struct DrawCmdQueue {
    commands: Vec<DrawCommand>,
}

impl DrawCmdQueue {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending command count.
    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    #[inline]
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Drops every pending command. Capacity is kept.
    #[inline]
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Moves the pending commands out for replay.
    ///
    /// Hand the vector back with [`Self::restore`] to keep its allocation.
    #[inline]
    pub fn take(&mut self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Reinstalls a drained command vector (cleared).
    pub fn restore(&mut self, mut commands: Vec<DrawCommand>) {
        commands.clear();
        if self.commands.is_empty() {
            self.commands = commands;
        }
    }

    /// True if a pending command targets `buffer` or samples `texture`.
    pub fn references_buffer(&self, buffer: BufferKey, texture: Option<TextureId>) -> bool {
        self.commands.iter().any(|cmd| match cmd {
            DrawCommand::ActivateBuffer(c) => c.buffer == buffer,
            DrawCommand::Resize(c) => c.buffer == buffer,
            DrawCommand::DrawTexture(c) => Some(c.texture) == texture,
            DrawCommand::SetSmoothing(c) => Some(c.texture) == texture,
            _ => false,
        })
    }

    /// True if a pending command samples or reconfigures `texture`.
    pub fn references_texture(&self, texture: TextureId) -> bool {
        self.commands.iter().any(|cmd| match cmd {
            DrawCommand::DrawTexture(c) => c.texture == texture,
            DrawCommand::SetSmoothing(c) => c.texture == texture,
            _ => false,
        })
    }

    pub fn push_draw_texture(
        &mut self,
        texture: TextureId,
        count: u32,
        filter: Option<Rc<Filter>>,
        texture_width: f32,
        texture_height: f32,
    ) {
        if filter.is_none() {
            if let Some(DrawCommand::DrawTexture(last)) = self.commands.last_mut() {
                if last.texture == texture && last.filter.is_none() {
                    last.count += count;
                    return;
                }
            }
        }
        self.commands.push(DrawCommand::DrawTexture(DrawTextureCmd {
            texture,
            count,
            filter,
            texture_width,
            texture_height,
        }));
    }

    pub fn push_draw_rect(&mut self) {
        if let Some(DrawCommand::DrawRect { count }) = self.commands.last_mut() {
            *count += QUAD_TRIANGLES;
            return;
        }
        self.commands.push(DrawCommand::DrawRect { count: QUAD_TRIANGLES });
    }

    pub fn push_push_mask(&mut self) {
        self.commands.push(DrawCommand::PushMask { count: QUAD_TRIANGLES });
    }

    pub fn push_pop_mask(&mut self) {
        self.commands.push(DrawCommand::PopMask { count: QUAD_TRIANGLES });
    }

    pub fn push_set_blend(&mut self, mode: BlendMode) {
        let mut drew = false;
        let mut i = self.commands.len();
        while i > 0 {
            i -= 1;
            match &self.commands[i] {
                DrawCommand::DrawTexture(_) | DrawCommand::DrawRect { .. } => drew = true,
                DrawCommand::SetBlend(_) if !drew => {
                    self.commands.remove(i);
                }
                DrawCommand::SetBlend(prev) => {
                    if *prev == mode {
                        return;
                    }
                    break;
                }
                _ => {}
            }
        }
        self.commands.push(DrawCommand::SetBlend(mode));
    }

    /// Activations with only blends after them are superseded by this one.
    pub fn push_activate_buffer(&mut self, buffer: BufferKey, width: u32, height: u32) {
        let mut i = self.commands.len();
        while i > 0 {
            i -= 1;
            match &self.commands[i] {
                DrawCommand::ActivateBuffer(_) => {
                    self.commands.remove(i);
                }
                DrawCommand::SetBlend(_) => {}
                _ => break,
            }
        }
        self.commands
            .push(DrawCommand::ActivateBuffer(ActivateBufferCmd { buffer, width, height }));
    }

    pub fn push_resize(&mut self, buffer: BufferKey, width: u32, height: u32) {
        self.commands.push(DrawCommand::Resize(ResizeCmd { buffer, width, height }));
    }

    pub fn push_clear(&mut self) {
        self.commands.push(DrawCommand::Clear);
    }

    pub fn push_enable_scissor(&mut self, rect: Rect) {
        self.commands.push(DrawCommand::EnableScissor { rect });
    }

    pub fn push_disable_scissor(&mut self) {
        self.commands.push(DrawCommand::DisableScissor);
    }

    pub fn push_change_smoothing(&mut self, texture: TextureId, smoothing: bool) {
        self.commands.push(DrawCommand::SetSmoothing(SmoothingCmd { texture, smoothing }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ColorMatrix;
    use slotmap::SlotMap;

    fn keys() -> (BufferKey, BufferKey) {
        let mut map: SlotMap<BufferKey, ()> = SlotMap::with_key();
        (map.insert(()), map.insert(()))
    }

    fn kinds(q: &DrawCmdQueue) -> Vec<&'static str> {
        q.commands()
            .iter()
            .map(|c| match c {
                DrawCommand::ActivateBuffer(_) => "activate",
                DrawCommand::SetBlend(_) => "blend",
                DrawCommand::DrawTexture(_) => "texture",
                DrawCommand::DrawRect { .. } => "rect",
                DrawCommand::PushMask { .. } => "push_mask",
                DrawCommand::PopMask { .. } => "pop_mask",
                DrawCommand::Clear => "clear",
                DrawCommand::Resize(_) => "resize",
                DrawCommand::EnableScissor { .. } => "scissor_on",
                DrawCommand::DisableScissor => "scissor_off",
                DrawCommand::SetSmoothing(_) => "smoothing",
            })
            .collect()
    }

    // ── draw merging ──────────────────────────────────────────────────────

    #[test]
    fn same_texture_draws_merge() {
        let mut q = DrawCmdQueue::new();
        q.push_draw_texture(TextureId(1), 2, None, 8.0, 8.0);
        q.push_draw_texture(TextureId(1), 2, None, 8.0, 8.0);
        q.push_draw_texture(TextureId(2), 2, None, 8.0, 8.0);
        assert_eq!(q.len(), 2);
        assert_eq!(q.commands()[0].triangles(), 4);
    }

    #[test]
    fn filtered_draws_never_merge() {
        let filter = Rc::new(Filter::ColorTransform(ColorMatrix::IDENTITY));
        let mut q = DrawCmdQueue::new();
        q.push_draw_texture(TextureId(1), 2, Some(filter.clone()), 8.0, 8.0);
        q.push_draw_texture(TextureId(1), 2, Some(filter), 8.0, 8.0);
        q.push_draw_texture(TextureId(1), 2, None, 8.0, 8.0);
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn consecutive_rects_merge_but_masks_do_not() {
        let mut q = DrawCmdQueue::new();
        q.push_draw_rect();
        q.push_draw_rect();
        q.push_push_mask();
        q.push_push_mask();
        assert_eq!(kinds(&q), ["rect", "push_mask", "push_mask"]);
        assert_eq!(q.commands()[0].triangles(), 4);
    }

    // ── blend ─────────────────────────────────────────────────────────────

    #[test]
    fn blend_without_draw_is_replaced() {
        let mut q = DrawCmdQueue::new();
        q.push_set_blend(BlendMode::SourceOver);
        q.push_set_blend(BlendMode::Lighter);
        assert_eq!(q.len(), 1);
        assert!(matches!(q.commands()[0], DrawCommand::SetBlend(BlendMode::Lighter)));
    }

    #[test]
    fn repeated_blend_is_dropped() {
        let mut q = DrawCmdQueue::new();
        q.push_set_blend(BlendMode::SourceOver);
        q.push_draw_rect();
        q.push_set_blend(BlendMode::SourceOver);
        assert_eq!(kinds(&q), ["blend", "rect"]);
    }

    #[test]
    fn blend_round_trip_without_draw_collapses() {
        let mut q = DrawCmdQueue::new();
        q.push_set_blend(BlendMode::SourceOver);
        q.push_draw_rect();
        q.push_set_blend(BlendMode::DestinationOut);
        q.push_set_blend(BlendMode::SourceOver);
        assert_eq!(kinds(&q), ["blend", "rect"]);
    }

    #[test]
    fn blend_change_after_draw_is_kept() {
        let mut q = DrawCmdQueue::new();
        q.push_set_blend(BlendMode::SourceOver);
        q.push_draw_rect();
        q.push_set_blend(BlendMode::DestinationOut);
        q.push_draw_rect();
        assert_eq!(kinds(&q), ["blend", "rect", "blend", "rect"]);
    }

    // ── activation ────────────────────────────────────────────────────────

    #[test]
    fn idle_activation_is_replaced() {
        let (a, b) = keys();
        let mut q = DrawCmdQueue::new();
        q.push_activate_buffer(a, 10, 10);
        q.push_set_blend(BlendMode::SourceOver);
        q.push_activate_buffer(b, 20, 20);
        assert_eq!(kinds(&q), ["blend", "activate"]);
        assert!(matches!(q.commands()[1], DrawCommand::ActivateBuffer(ActivateBufferCmd { buffer, .. }) if buffer == b));
    }

    #[test]
    fn activation_after_work_is_kept() {
        let (a, b) = keys();
        let mut q = DrawCmdQueue::new();
        q.push_activate_buffer(a, 10, 10);
        q.push_clear();
        q.push_activate_buffer(b, 20, 20);
        assert_eq!(kinds(&q), ["activate", "clear", "activate"]);
    }

    #[test]
    fn replacement_stops_at_the_last_effective_command() {
        let (a, b) = keys();
        let mut q = DrawCmdQueue::new();
        q.push_activate_buffer(a, 10, 10);
        q.push_clear();
        q.push_activate_buffer(b, 20, 20);
        q.push_set_blend(BlendMode::Lighter);
        q.push_activate_buffer(a, 10, 10);
        assert_eq!(kinds(&q), ["activate", "clear", "blend", "activate"]);
        assert!(matches!(q.commands()[0], DrawCommand::ActivateBuffer(ActivateBufferCmd { buffer, .. }) if buffer == a));
        assert!(matches!(q.commands()[3], DrawCommand::ActivateBuffer(ActivateBufferCmd { buffer, .. }) if buffer == a));
    }

    // ── bookkeeping ───────────────────────────────────────────────────────

    #[test]
    fn references_buffer_checks_targets_and_textures() {
        let (a, b) = keys();
        let mut q = DrawCmdQueue::new();
        q.push_resize(a, 4, 4);
        q.push_draw_texture(TextureId(7), 2, None, 4.0, 4.0);
        assert!(q.references_buffer(a, None));
        assert!(!q.references_buffer(b, None));
        assert!(q.references_buffer(b, Some(TextureId(7))));
        assert!(q.references_texture(TextureId(7)));
        assert!(!q.references_texture(TextureId(8)));
    }

    #[test]
    fn take_and_restore_keep_allocation() {
        let mut q = DrawCmdQueue::new();
        for _ in 0..32 {
            q.push_clear();
        }
        let taken = q.take();
        assert!(q.is_empty());
        let cap = taken.capacity();
        q.restore(taken);
        assert!(q.is_empty());
        assert_eq!(q.commands.capacity(), cap);
    }
}
