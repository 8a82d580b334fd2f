//! Texture sources and the GPU handles cached on them.

pub mod ktx;

use crate::gl::TextureId;

pub use ktx::{KhronosTextureContainer, KtxError, KtxHeader, KtxImage};

/// Decoded RGBA8 pixels (straight alpha; premultiplied on upload).
pub trait PixelSource {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn rgba(&self) -> &[u8];
}

impl PixelSource for image::RgbaImage {
    fn width(&self) -> u32 {
        image::RgbaImage::width(self)
    }

    fn height(&self) -> u32 {
        image::RgbaImage::height(self)
    }

    fn rgba(&self) -> &[u8] {
        self.as_raw()
    }
}

/// Plain RGBA8 buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPixels {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RawPixels {
    /// `None` if `data` is not `width * height * 4` bytes.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        (data.len() == width as usize * height as usize * 4).then_some(Self { width, height, data })
    }

    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data = rgba.repeat(width as usize * height as usize);
        Self { width, height, data }
    }
}

impl PixelSource for RawPixels {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn rgba(&self) -> &[u8] {
        &self.data
    }
}

pub enum BitmapSource {
    Pixels(Box<dyn PixelSource>),
    Compressed(KhronosTextureContainer),
}

impl std::fmt::Debug for BitmapSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BitmapSource::Pixels(p) => write!(f, "Pixels({}x{})", p.width(), p.height()),
            BitmapSource::Compressed(c) => write!(f, "Compressed({:?})", c.header()),
        }
    }
}

/// GPU texture created from a [`BitmapData`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextureHandle {
    pub id: TextureId,
    pub width: u32,
    pub height: u32,
    /// Linear filtering when set, nearest otherwise.
    pub smoothing: bool,
    /// GL context generation the texture belongs to.
    pub(crate) generation: u64,
}

/// A texture source and its cached GPU handle.
///
/// The handle is created on first draw and reused until the GL context that
/// owns it is lost.
#[derive(Debug)]
pub struct BitmapData {
    pub width: u32,
    pub height: u32,
    source: Option<BitmapSource>,
    texture: Option<TextureHandle>,
    /// Drop the CPU-side source once uploaded.
    pub delete_source: bool,
}

impl BitmapData {
    pub fn from_pixels(pixels: impl PixelSource + 'static) -> Self {
        Self {
            width: pixels.width(),
            height: pixels.height(),
            source: Some(BitmapSource::Pixels(Box::new(pixels))),
            texture: None,
            delete_source: false,
        }
    }

    pub fn from_image(image: image::RgbaImage) -> Self {
        Self::from_pixels(image)
    }

    /// Compressed source. Dimensions come from the header (zero when invalid).
    pub fn from_ktx(container: KhronosTextureContainer) -> Self {
        let header = *container.header();
        Self {
            width: header.pixel_width,
            height: header.pixel_height,
            source: Some(BitmapSource::Compressed(container)),
            texture: None,
            delete_source: false,
        }
    }

    #[inline]
    pub fn source(&self) -> Option<&BitmapSource> {
        self.source.as_ref()
    }

    #[inline]
    pub fn texture(&self) -> Option<&TextureHandle> {
        self.texture.as_ref()
    }

    /// Cached handle if it belongs to context `generation`.
    pub(crate) fn cached_texture(&self, generation: u64) -> Option<TextureHandle> {
        self.texture.filter(|t| t.generation == generation)
    }

    pub(crate) fn set_texture(&mut self, texture: TextureHandle) {
        self.texture = Some(texture);
        if self.delete_source {
            self.source = None;
        }
    }

    pub(crate) fn take_texture(&mut self) -> Option<TextureHandle> {
        self.texture.take()
    }

    /// Replaces the pixels; the next [`crate::RenderContext::update_texture`] uploads them.
    pub fn set_pixels(&mut self, pixels: impl PixelSource + 'static) {
        self.width = pixels.width();
        self.height = pixels.height();
        self.source = Some(BitmapSource::Pixels(Box::new(pixels)));
    }
}
