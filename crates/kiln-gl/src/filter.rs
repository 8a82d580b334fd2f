//! Post-processing filter descriptors.
//!
//! A filter only describes which program a draw uses and which uniform
//! values it supplies. Pass scheduling lives in the render context.

use std::collections::HashMap;

use crate::gl::UniformValue;

/// 4×5 color matrix, row-major: `[r' g' b' a']` rows of `[r g b a offset]`.
/// Offsets are in 0..255 units.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ColorMatrix(pub [f32; 20]);

impl ColorMatrix {
    #[rustfmt::skip]
    pub const IDENTITY: ColorMatrix = ColorMatrix([
        1.0, 0.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0, 0.0,
        0.0, 0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 0.0, 1.0, 0.0,
    ]);

    /// The 4×4 multiplier part.
    pub fn matrix(&self) -> [f32; 16] {
        let m = &self.0;
        let mut out = [0.0; 16];
        for row in 0..4 {
            out[row * 4..row * 4 + 4].copy_from_slice(&m[row * 5..row * 5 + 4]);
        }
        out
    }

    /// Offset column normalized to 0..1.
    pub fn color_add(&self) -> [f32; 4] {
        let m = &self.0;
        [m[4] / 255.0, m[9] / 255.0, m[14] / 255.0, m[19] / 255.0]
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BlurAxis {
    X,
    Y,
}

/// Two-pass box blur; amounts in pixels.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BlurFilter {
    pub blur_x: f32,
    pub blur_y: f32,
}

impl BlurFilter {
    pub fn new(blur_x: f32, blur_y: f32) -> Self {
        Self { blur_x, blur_y }
    }

    /// The one-dimensional passes to run, horizontal first. Zero passes are omitted.
    pub fn passes(&self) -> Vec<Filter> {
        [(BlurAxis::X, self.blur_x), (BlurAxis::Y, self.blur_y)]
            .into_iter()
            .filter(|&(_, amount)| amount != 0.0)
            .map(|(axis, amount)| Filter::BlurPass { axis, amount })
            .collect()
    }
}

/// Outer/inner glow and drop shadow.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GlowFilter {
    /// `0xRRGGBB`.
    pub color: u32,
    pub alpha: f32,
    pub blur_x: f32,
    pub blur_y: f32,
    pub strength: f32,
    pub inner: bool,
    pub knockout: bool,
    pub hide_object: bool,
    /// Shadow distance in pixels; zero for a plain glow.
    pub distance: f32,
    /// Shadow angle in degrees.
    pub angle: f32,
}

impl Default for GlowFilter {
    fn default() -> Self {
        Self {
            color: 0xFF0000,
            alpha: 1.0,
            blur_x: 6.0,
            blur_y: 6.0,
            strength: 2.0,
            inner: false,
            knockout: false,
            hide_object: false,
            distance: 0.0,
            angle: 0.0,
        }
    }
}

/// User-supplied shader pair with a named uniform table.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomFilter {
    pub vertex_src: String,
    pub fragment_src: String,
    /// Identifies the program in the cache alongside the sources.
    pub shader_key: String,
    pub uniforms: HashMap<String, UniformValue>,
}

impl CustomFilter {
    pub fn new(
        vertex_src: impl Into<String>,
        fragment_src: impl Into<String>,
        shader_key: impl Into<String>,
    ) -> Self {
        Self {
            vertex_src: vertex_src.into(),
            fragment_src: fragment_src.into(),
            shader_key: shader_key.into(),
            uniforms: HashMap::new(),
        }
    }

    pub fn with_uniform(mut self, name: impl Into<String>, value: UniformValue) -> Self {
        self.uniforms.insert(name.into(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    ColorTransform(ColorMatrix),
    /// Split into [`Filter::BlurPass`]es before drawing.
    Blur(BlurFilter),
    BlurPass { axis: BlurAxis, amount: f32 },
    Glow(GlowFilter),
    Custom(CustomFilter),
}

impl Filter {
    /// Value of a filter-defined uniform, if this filter supplies it.
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        match self {
            Filter::ColorTransform(m) => match name {
                "matrix" => Some(UniformValue::Mat4(m.matrix())),
                "colorAdd" => Some(UniformValue::Vec4(m.color_add())),
                _ => None,
            },
            Filter::Blur(b) => match name {
                "blur" => Some(UniformValue::Vec2([b.blur_x, b.blur_y])),
                _ => None,
            },
            Filter::BlurPass { axis, amount } => match name {
                "blur" => Some(UniformValue::Vec2(match axis {
                    BlurAxis::X => [*amount, 0.0],
                    BlurAxis::Y => [0.0, *amount],
                })),
                _ => None,
            },
            Filter::Glow(g) => glow_uniform(g, name),
            Filter::Custom(c) => c.uniforms.get(name).cloned(),
        }
    }
}

fn glow_uniform(g: &GlowFilter, name: &str) -> Option<UniformValue> {
    let flag = |b: bool| UniformValue::Float(if b { 1.0 } else { 0.0 });
    let value = match name {
        "color" => {
            let c = g.color;
            UniformValue::Vec4([
                ((c >> 16) & 0xFF) as f32 / 255.0,
                ((c >> 8) & 0xFF) as f32 / 255.0,
                (c & 0xFF) as f32 / 255.0,
                1.0,
            ])
        }
        "alpha" => UniformValue::Float(g.alpha),
        "blurX" => UniformValue::Float(g.blur_x),
        "blurY" => UniformValue::Float(g.blur_y),
        "strength" => UniformValue::Float(g.strength),
        "inner" => flag(g.inner),
        "knockout" => flag(g.knockout),
        "hideObject" => flag(g.hide_object),
        "dist" => UniformValue::Float(g.distance),
        "angle" => UniformValue::Float(g.angle.to_radians()),
        _ => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_matrix_splits_multiplier_and_offset() {
        let mut m = ColorMatrix::IDENTITY;
        m.0[4] = 255.0;
        m.0[19] = 51.0;
        assert_eq!(m.matrix()[0], 1.0);
        assert_eq!(m.matrix()[15], 1.0);
        assert_eq!(m.color_add(), [1.0, 0.0, 0.0, 0.2]);
    }

    #[test]
    fn blur_passes_skip_zero_axis() {
        assert_eq!(BlurFilter::new(4.0, 2.0).passes().len(), 2);
        assert_eq!(
            BlurFilter::new(0.0, 3.0).passes(),
            [Filter::BlurPass { axis: BlurAxis::Y, amount: 3.0 }]
        );
        assert!(BlurFilter::new(0.0, 0.0).passes().is_empty());
    }

    #[test]
    fn blur_pass_uniform_is_axis_aligned() {
        let pass = Filter::BlurPass { axis: BlurAxis::X, amount: 5.0 };
        assert_eq!(pass.uniform("blur"), Some(UniformValue::Vec2([5.0, 0.0])));
        assert_eq!(pass.uniform("matrix"), None);
    }

    #[test]
    fn custom_uniforms_come_from_table() {
        let f = Filter::Custom(
            CustomFilter::new("v", "f", "wave").with_uniform("time", UniformValue::Float(0.5)),
        );
        assert_eq!(f.uniform("time"), Some(UniformValue::Float(0.5)));
        assert_eq!(f.uniform("missing"), None);
    }

    #[test]
    fn glow_flags_are_floats() {
        let f = Filter::Glow(GlowFilter { inner: true, ..Default::default() });
        assert_eq!(f.uniform("inner"), Some(UniformValue::Float(1.0)));
        assert_eq!(f.uniform("knockout"), Some(UniformValue::Float(0.0)));
    }
}
