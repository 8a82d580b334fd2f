use std::rc::Rc;

use crate::batch::{DrawRegion, QUAD_TRIANGLES};
use crate::coords::{Matrix, Rect};
use crate::filter::Filter;
use crate::gl::GlApi;
use crate::target::BufferKey;

use super::RenderContext;

impl<G: GlApi> RenderContext<G> {
    /// Draws offscreen buffer `input` into the current target through `filters`.
    ///
    /// Every filter but the last renders into a pooled intermediate buffer the
    /// size of its input; the last one renders into the current target.
    /// Intermediates go back to the pool once drawn from. `input` itself is
    /// left to the caller.
    pub fn draw_target_with_filters(&mut self, filters: &[Filter], input: BufferKey) {
        self.when_active(|ctx| {
            if !ctx.is_offscreen(input) {
                log::warn!("draw_target_with_filters: {input:?} is not an offscreen buffer");
                return;
            }
            let Some((last, chain)) = filters.split_last() else {
                let current = ctx.stack.current();
                ctx.draw_to_render_target(None, input, current);
                return;
            };

            let mut source = input;
            for filter in chain {
                let (width, height) = ctx.buffer_size(source);
                let Some(output) = ctx.create_render_buffer(width, height) else { return };
                ctx.draw_to_render_target(Some(filter), source, output);
                if source != input {
                    ctx.release_render_buffer(source);
                }
                source = output;
            }

            let current = ctx.stack.current();
            ctx.draw_to_render_target(Some(last), source, current);
            if source != input {
                ctx.release_render_buffer(source);
            }
        });
    }

    /// Draws the whole of `input` into `output` with one filter.
    ///
    /// A two-axis blur runs its horizontal pass into a temporary buffer
    /// first. Passes with a zero amount are skipped; a blur with both amounts
    /// zero draws unfiltered.
    fn draw_to_render_target(&mut self, filter: Option<&Filter>, input: BufferKey, output: BufferKey) {
        let (width, height) = self.buffer_size(input);
        let mut source = input;

        let filter = match filter {
            Some(Filter::Blur(blur)) => {
                let mut passes = blur.passes();
                let second = passes.pop();
                if let Some(first) = passes.pop() {
                    let Some(temp) = self.create_render_buffer(width, height) else { return };
                    self.draw_to_render_target(Some(&first), input, temp);
                    source = temp;
                }
                second
            }
            other => other.cloned(),
        };

        let Some(texture) = self.buffers.get(source).and_then(|b| b.target.texture()) else {
            return;
        };

        self.reserve_quad();
        self.push_buffer(output);

        let (w, h) = (width as f32, height as f32);
        let buffer = &mut self.buffers[output];
        buffer.save_transform();
        buffer.transform(Matrix::new(1.0, 0.0, 0.0, -1.0, 0.0, h));
        self.vao
            .cache_arrays(&self.buffers[output], &DrawRegion::full(w, h, Rect::from_size(w, h)), None);
        self.buffers[output].restore_transform();

        self.recording().push_draw_texture(texture, QUAD_TRIANGLES, filter.map(Rc::new), w, h);

        if source != input {
            self.release_render_buffer(source);
        }
        self.pop_buffer();
    }
}
