use anyhow::{bail, Context, Result};
use kiln_gl::gl::{GlApi, TraceGl};
use kiln_gl::logging::{init_logging, LoggingConfig};
use kiln_gl::{
    BitmapData, BlendMode, BlurFilter, ColorMatrix, ContextConfig, ContextEvent, DrawRegion,
    Filter, GlowFilter, Matrix, Mesh, Rect, RenderContext,
};

#[cfg(feature = "glow")]
mod headless;

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;
const SPRITES: usize = 600;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Backend {
    /// Records GL calls in memory.
    Trace,
    /// Drives a surfaceless EGL context through glow.
    Glow,
}

#[derive(Debug, PartialEq, Eq)]
struct Options {
    frames: usize,
    backend: Backend,
}

impl Options {
    /// `[frames] [--backend trace|glow]`
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut options = Options { frames: 3, backend: Backend::Trace };
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            if arg == "--backend" {
                let name = args.next().context("--backend needs a value")?;
                options.backend = match name.as_str() {
                    "trace" => Backend::Trace,
                    "glow" => Backend::Glow,
                    other => bail!("unknown backend '{other}' (expected trace or glow)"),
                };
            } else {
                options.frames = arg.parse().with_context(|| format!("invalid frame count '{arg}'"))?;
            }
        }
        Ok(options)
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let options = Options::parse(std::env::args().skip(1))?;

    println!();
    println!("  ╔════════════════════════════════════════╗");
    println!("  ║        KILN STUDIO  ·  headless        ║");
    println!("  ║   {WIDTH}x{HEIGHT} surface  ·  {SPRITES} sprites/frame    ║");
    println!("  ╚════════════════════════════════════════╝");
    println!("  backend: {:?}", options.backend);
    println!();

    match options.backend {
        Backend::Trace => run_trace(options.frames),
        Backend::Glow => run_glow(options.frames),
    }
}

fn context_config() -> ContextConfig {
    ContextConfig { compute_draw_calls: true, ..Default::default() }
}

fn run_trace(frames: usize) -> Result<()> {
    let mut ctx = RenderContext::new(TraceGl::new(), WIDTH, HEIGHT, context_config())
        .context("failed to create render context")?;
    let mut sprite = BitmapData::from_image(checkerboard(16));
    let mut scene = Scene::default();

    for frame in 0..frames {
        scene.draw(&mut ctx, &mut sprite, frame);
        report_trace(&mut ctx, &format!("frame {frame}"));
    }

    log::info!("simulating context loss");
    ctx.on_context_event(ContextEvent::Lost);
    ctx.gl_mut().lose_context();
    scene.draw(&mut ctx, &mut sprite, frames);
    report_trace(&mut ctx, "while lost");

    ctx.gl_mut().restore_context();
    ctx.on_context_event(ContextEvent::Restored);
    scene.draw(&mut ctx, &mut sprite, frames + 1);
    report_trace(&mut ctx, "after restore");

    summary(&ctx);
    Ok(())
}

#[cfg(feature = "glow")]
fn run_glow(frames: usize) -> Result<()> {
    let surface = headless::HeadlessGl::new().context("failed to create a headless GL context")?;
    // SAFETY: `surface` keeps the context current on this thread until it drops,
    // after the render context below.
    let gl = unsafe { kiln_gl::gl::GlowGl::new(surface.glow()) };
    let mut ctx = RenderContext::new(gl, WIDTH, HEIGHT, context_config())
        .context("failed to create render context")?;
    log::info!("GL capabilities: {:?}", ctx.capabilities());
    let mut sprite = BitmapData::from_image(checkerboard(16));
    let mut scene = Scene::default();

    for frame in 0..frames {
        scene.draw(&mut ctx, &mut sprite, frame);
        report(&ctx, &format!("frame {frame}"));
    }
    summary(&ctx);
    drop(ctx);
    drop(surface);
    Ok(())
}

#[cfg(not(feature = "glow"))]
fn run_glow(_frames: usize) -> Result<()> {
    bail!("kiln-studio was built without the `glow` feature")
}

fn summary<G: GlApi>(ctx: &RenderContext<G>) {
    let pool = ctx.pool_stats();
    println!();
    println!(
        "  pool: {} retained, {} reused, {} grown, {} allocated",
        pool.retained, pool.reused, pool.grown, pool.allocated
    );
    println!("  context generation {}", ctx.generation());
    println!();
}

#[derive(Default)]
struct Scene {
    offscreen: Option<kiln_gl::BufferKey>,
}

impl Scene {
    fn draw<G: GlApi>(&mut self, ctx: &mut RenderContext<G>, sprite: &mut BitmapData, frame: usize) {
        let root = ctx.root();
        let phase = frame as f32 * 0.25;
        let (sw, sh) = (sprite.width as f32, sprite.height as f32);

        ctx.clear();

        // a grid of sprites, alternating blend mode every row
        for i in 0..SPRITES {
            let (col, row) = ((i % 30) as f32, (i / 30) as f32);
            if let Some(buffer) = ctx.buffer_mut(root) {
                buffer.set_transform(Matrix::translation(col * 10.0 + phase, row * 12.0));
                buffer.global_alpha = if i % 3 == 0 { 0.5 } else { 1.0 };
            }
            if i % 30 == 0 {
                let mode = if row as usize % 2 == 0 { BlendMode::SourceOver } else { BlendMode::Lighter };
                ctx.set_global_composite_operation(mode);
            }
            let region = DrawRegion::full(sw, sh, Rect::new(0.0, 0.0, 8.0, 8.0));
            ctx.draw_image(sprite, &region, Some(i % 2 == 0));
        }
        ctx.set_global_composite_operation(BlendMode::SourceOver);
        if let Some(buffer) = ctx.buffer_mut(root) {
            buffer.set_transform(Matrix::IDENTITY);
            buffer.global_alpha = 1.0;
        }

        // nested masks around a tinted rect
        ctx.push_mask(Rect::new(20.0, 20.0, 120.0, 80.0));
        ctx.push_mask(Rect::new(40.0, 30.0, 60.0, 60.0));
        if let Some(buffer) = ctx.buffer_mut(root) {
            buffer.global_tint = 0x33CC99;
        }
        ctx.draw_rect(Rect::new(0.0, 0.0, WIDTH as f32, HEIGHT as f32));
        ctx.pop_mask();
        ctx.pop_mask();
        if let Some(buffer) = ctx.buffer_mut(root) {
            buffer.global_tint = 0xFFFFFF;
        }

        // a fan mesh
        let mesh = Mesh {
            vertices: &[0.0, 0.0, 40.0, 0.0, 40.0, 40.0, 0.0, 40.0, 20.0, 20.0],
            uvs: &[0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.5, 0.5],
            indices: &[0, 1, 4, 1, 2, 4, 2, 3, 4, 3, 0, 4],
        };
        ctx.draw_mesh(sprite, &DrawRegion::full(sw, sh, Rect::from_size(sw, sh)), &mesh, None);

        // offscreen content through a filter chain
        let offscreen = match self.offscreen {
            Some(key) if ctx.buffer(key).is_some() => Some(key),
            _ => ctx.create_render_buffer(64, 64),
        };
        self.offscreen = offscreen;
        if let Some(offscreen) = offscreen {
            ctx.push_buffer(offscreen);
            ctx.clear();
            ctx.draw_image(sprite, &DrawRegion::full(sw, sh, Rect::from_size(64.0, 64.0)), None);
            ctx.pop_buffer();

            if let Some(buffer) = ctx.buffer_mut(root) {
                buffer.set_transform(Matrix::translation(200.0, 120.0));
            }
            let filters = [
                Filter::ColorTransform(grayscale()),
                Filter::Blur(BlurFilter::new(4.0, if frame % 2 == 0 { 4.0 } else { 0.0 })),
                Filter::Glow(GlowFilter { color: 0x3399FF, ..GlowFilter::default() }),
            ];
            ctx.draw_target_with_filters(&filters, offscreen);
            if let Some(buffer) = ctx.buffer_mut(root) {
                buffer.set_transform(Matrix::IDENTITY);
            }
        }

        // punch a hole
        ctx.clear_rect(Rect::new(280.0, 10.0, 30.0, 30.0));

        ctx.flush();
    }
}

#[cfg(feature = "glow")]
fn report<G: GlApi>(ctx: &RenderContext<G>, label: &str) {
    let stats = ctx.stats();
    println!(
        "  {label:<14} {:>3} draws  {:>2} programs  {:>2} implicit flushes  state {:?}",
        stats.draw_calls,
        stats.program_switches,
        stats.implicit_flushes,
        ctx.state(),
    );
}

fn report_trace(ctx: &mut RenderContext<TraceGl>, label: &str) {
    let stats = ctx.stats().clone();
    let calls = ctx.gl_mut().take_calls();
    let draws = calls.iter().filter(|c| c.is_draw()).count();
    println!(
        "  {label:<14} {:>5} gl calls  {draws:>3} draws  {:>2} programs  {:>2} implicit flushes  state {:?}",
        calls.len(),
        stats.program_switches,
        stats.implicit_flushes,
        ctx.state(),
    );
}

fn checkerboard(size: u32) -> image::RgbaImage {
    image::RgbaImage::from_fn(size, size, |x, y| {
        if (x / 4 + y / 4) % 2 == 0 {
            image::Rgba([240, 200, 80, 255])
        } else {
            image::Rgba([40, 40, 60, 200])
        }
    })
}

fn grayscale() -> ColorMatrix {
    let (r, g, b) = (0.299, 0.587, 0.114);
    ColorMatrix([
        r, g, b, 0.0, 0.0, //
        r, g, b, 0.0, 0.0, //
        r, g, b, 0.0, 0.0, //
        0.0, 0.0, 0.0, 1.0, 0.0,
    ])
}
