//! Built-in GLSL ES 1.0 sources and program selection per draw.

use crate::filter::Filter;

pub const DEFAULT_VERT: &str = include_str!("shaders/default.vert");
pub const TEXTURE_FRAG: &str = include_str!("shaders/texture.frag");
pub const PRIMITIVE_FRAG: &str = include_str!("shaders/primitive.frag");
pub const COLOR_TRANSFORM_FRAG: &str = include_str!("shaders/color_transform.frag");
pub const BLUR_FRAG: &str = include_str!("shaders/blur.frag");
pub const GLOW_FRAG: &str = include_str!("shaders/glow.frag");

/// Sources and cache name of one program.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ProgramSource<'a> {
    pub vertex: &'a str,
    pub fragment: &'a str,
    pub key: &'a str,
}

impl ProgramSource<'static> {
    const fn builtin(fragment: &'static str, key: &'static str) -> Self {
        Self { vertex: DEFAULT_VERT, fragment, key }
    }
}

pub const TEXTURE: ProgramSource<'static> = ProgramSource::builtin(TEXTURE_FRAG, "texture");
pub const PRIMITIVE: ProgramSource<'static> = ProgramSource::builtin(PRIMITIVE_FRAG, "primitive");
pub const COLOR_TRANSFORM: ProgramSource<'static> =
    ProgramSource::builtin(COLOR_TRANSFORM_FRAG, "colorTransform");
pub const BLUR: ProgramSource<'static> = ProgramSource::builtin(BLUR_FRAG, "blur");
pub const GLOW: ProgramSource<'static> = ProgramSource::builtin(GLOW_FRAG, "glow");

/// Program for a texture draw carrying `filter`.
pub fn texture_program(filter: Option<&Filter>) -> ProgramSource<'_> {
    match filter {
        None => TEXTURE,
        Some(Filter::ColorTransform(_)) => COLOR_TRANSFORM,
        Some(Filter::Blur(_) | Filter::BlurPass { .. }) => BLUR,
        Some(Filter::Glow(_)) => GLOW,
        Some(Filter::Custom(c)) => ProgramSource {
            vertex: &c.vertex_src,
            fragment: &c.fragment_src,
            key: &c.shader_key,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{BlurAxis, ColorMatrix, CustomFilter};

    #[test]
    fn unfiltered_draw_uses_texture_program() {
        assert_eq!(texture_program(None), TEXTURE);
    }

    #[test]
    fn both_blur_axes_share_one_program() {
        let x = Filter::BlurPass { axis: BlurAxis::X, amount: 1.0 };
        let y = Filter::BlurPass { axis: BlurAxis::Y, amount: 1.0 };
        assert_eq!(texture_program(Some(&x)), texture_program(Some(&y)));
        assert_eq!(texture_program(Some(&x)).key, "blur");
    }

    #[test]
    fn custom_filter_supplies_its_own_sources() {
        let f = Filter::Custom(CustomFilter::new("void main() {}", "void main() {}", "mine"));
        let src = texture_program(Some(&f));
        assert_eq!(src.key, "mine");
        assert_eq!(src.vertex, "void main() {}");
    }

    #[test]
    fn builtin_sources_declare_the_vertex_layout() {
        for name in ["aVertexPosition", "aTextureCoord", "aColor", "projectionVector"] {
            assert!(DEFAULT_VERT.contains(name), "{name}");
        }
        let ct = texture_program(Some(&Filter::ColorTransform(ColorMatrix::IDENTITY)));
        assert!(ct.fragment.contains("colorAdd"));
    }
}
