//! A surfaceless EGL context for running the batcher on a real GPU without a
//! window. Only offscreen targets hold pixels; draws to the default
//! framebuffer are discarded by the driver.

use std::ffi::CStr;

use anyhow::{Context, Result};
use glutin::api::egl::context::PossiblyCurrentContext;
use glutin::api::egl::device::Device;
use glutin::api::egl::display::Display;
use glutin::config::{ConfigSurfaceTypes, ConfigTemplateBuilder, GlConfig};
use glutin::context::{ContextApi, ContextAttributesBuilder, Version};
use glutin::display::GlDisplay;

/// An EGL context made current on the creating thread.
pub struct HeadlessGl {
    // dropped before the display
    _context: PossiblyCurrentContext,
    display: Display,
}

impl HeadlessGl {
    /// Opens the first EGL device and creates a GLES 2 context with an 8-bit
    /// stencil on it.
    pub fn new() -> Result<Self> {
        let device = Device::query_devices()
            .context("EGL device enumeration is unavailable")?
            .next()
            .context("no EGL device found")?;
        let display = unsafe { Display::with_device(&device, None) }.context("failed to open EGL display")?;

        let template = ConfigTemplateBuilder::new()
            .with_alpha_size(8)
            .with_stencil_size(8)
            .with_surface_type(ConfigSurfaceTypes::empty())
            .build();
        let config = unsafe { display.find_configs(template) }
            .context("failed to query EGL configs")?
            .min_by_key(|config| config.num_samples())
            .context("no EGL config with an 8-bit stencil")?;

        let attributes = ContextAttributesBuilder::new()
            .with_context_api(ContextApi::Gles(Some(Version::new(2, 0))))
            .build(None);
        let context = unsafe { display.create_context(&config, &attributes) }
            .context("failed to create a GLES 2 context")?
            .make_current_surfaceless()
            .context("failed to make the context current")?;
        log::info!("surfaceless GLES context ready ({} samples)", config.num_samples());

        Ok(Self { _context: context, display })
    }

    /// Loads GL entry points for the current context.
    pub fn glow(&self) -> glow::Context {
        unsafe {
            glow::Context::from_loader_function_cstr(|name: &CStr| self.display.get_proc_address(name))
        }
    }
}
