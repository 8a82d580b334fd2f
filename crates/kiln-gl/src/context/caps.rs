use crate::gl::{GlApi, GlParameter};

/// Limits and extensions reported by the GL context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub max_texture_size: u32,
    pub max_cube_map_texture_size: u32,
    pub max_render_texture_size: u32,
    pub max_texture_image_units: u32,
    pub max_combined_texture_image_units: u32,
    pub max_vertex_texture_image_units: u32,
    pub max_vertex_attribs: u32,
    pub max_varying_vectors: u32,
    pub max_vertex_uniform_vectors: u32,
    pub max_fragment_uniform_vectors: u32,

    pub standard_derivatives: bool,
    pub astc: bool,
    pub s3tc: bool,
    pub pvrtc: bool,
    pub etc1: bool,
    pub etc2: bool,
    pub anisotropic_filtering: bool,
    pub uint_indices: bool,
    pub texture_float: bool,
    pub texture_half_float: bool,
    pub high_precision_shaders: bool,

    /// Container suffixes loadable on this device, e.g. `-astc.ktx`.
    pub textures_supported: Vec<String>,
}

const ASTC: &[&str] = &["WEBGL_compressed_texture_astc", "WEBKIT_WEBGL_compressed_texture_astc"];
const S3TC: &[&str] = &["WEBGL_compressed_texture_s3tc", "WEBKIT_WEBGL_compressed_texture_s3tc"];
const PVRTC: &[&str] = &["WEBGL_compressed_texture_pvrtc", "WEBKIT_WEBGL_compressed_texture_pvrtc"];
const ETC1: &[&str] = &["WEBGL_compressed_texture_etc1", "WEBKIT_WEBGL_compressed_texture_etc1"];
const ETC2: &[&str] = &[
    "WEBGL_compressed_texture_etc",
    "WEBKIT_WEBGL_compressed_texture_etc",
    "WEBGL_compressed_texture_es3_0",
];
const ANISOTROPIC: &[&str] = &[
    "EXT_texture_filter_anisotropic",
    "WEBKIT_EXT_texture_filter_anisotropic",
    "MOZ_EXT_texture_filter_anisotropic",
];

impl Capabilities {
    pub fn probe<G: GlApi>(gl: &G) -> Self {
        let extensions = gl.supported_extensions();
        log::debug!("available extensions: {extensions:?}");
        let has = |names: &[&str]| names.iter().any(|n| extensions.iter().any(|e| e == n));

        let mut caps = Self {
            max_texture_size: gl.get_parameter(GlParameter::MaxTextureSize),
            max_cube_map_texture_size: gl.get_parameter(GlParameter::MaxCubeMapTextureSize),
            max_render_texture_size: gl.get_parameter(GlParameter::MaxRenderbufferSize),
            max_texture_image_units: gl.get_parameter(GlParameter::MaxTextureImageUnits),
            max_combined_texture_image_units: gl
                .get_parameter(GlParameter::MaxCombinedTextureImageUnits),
            max_vertex_texture_image_units: gl
                .get_parameter(GlParameter::MaxVertexTextureImageUnits),
            max_vertex_attribs: gl.get_parameter(GlParameter::MaxVertexAttribs),
            max_varying_vectors: gl.get_parameter(GlParameter::MaxVaryingVectors),
            max_vertex_uniform_vectors: gl.get_parameter(GlParameter::MaxVertexUniformVectors),
            max_fragment_uniform_vectors: gl.get_parameter(GlParameter::MaxFragmentUniformVectors),

            standard_derivatives: has(&["OES_standard_derivatives"]),
            astc: has(ASTC),
            s3tc: has(S3TC),
            pvrtc: has(PVRTC),
            etc1: has(ETC1),
            etc2: has(ETC2),
            anisotropic_filtering: has(ANISOTROPIC),
            uint_indices: has(&["OES_element_index_uint"]),
            texture_float: has(&["OES_texture_float"]),
            texture_half_float: has(&["OES_texture_half_float"]),
            high_precision_shaders: gl.high_precision_float(),

            textures_supported: Vec::new(),
        };

        for (supported, suffix) in [
            (caps.astc, "-astc.ktx"),
            (caps.s3tc, "-dxt.ktx"),
            (caps.pvrtc, "-pvrtc.ktx"),
            (caps.etc2, "-etc2.ktx"),
            (caps.etc1, "-etc1.ktx"),
        ] {
            if supported {
                caps.textures_supported.push(suffix.to_string());
            }
        }
        caps
    }

    /// First supported suffix (in device preference order) present in `available`.
    ///
    /// Matching ignores the case of `available`.
    pub fn select_texture_format(&self, available: &[&str]) -> Option<String> {
        self.textures_supported
            .iter()
            .find(|s| available.iter().any(|a| a.to_lowercase() == **s))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl::TraceGl;

    #[test]
    fn probe_reads_limits() {
        let gl = TraceGl::new().with_max_texture_size(2048);
        let caps = Capabilities::probe(&gl);
        assert_eq!(caps.max_texture_size, 2048);
        assert_eq!(caps.max_texture_image_units, 16);
        assert!(caps.textures_supported.is_empty());
    }

    #[test]
    fn suffixes_follow_device_preference() {
        let gl = TraceGl::new().with_extensions([
            "WEBGL_compressed_texture_etc1",
            "WEBKIT_WEBGL_compressed_texture_s3tc",
            "WEBGL_compressed_texture_astc",
        ]);
        let caps = Capabilities::probe(&gl);
        assert_eq!(caps.textures_supported, ["-astc.ktx", "-dxt.ktx", "-etc1.ktx"]);
    }

    #[test]
    fn format_selection_prefers_device_order() {
        let gl = TraceGl::new()
            .with_extensions(["WEBGL_compressed_texture_s3tc", "WEBGL_compressed_texture_etc1"]);
        let caps = Capabilities::probe(&gl);
        assert_eq!(
            caps.select_texture_format(&["-ETC1.ktx", "-dxt.ktx"]),
            Some("-dxt.ktx".to_string())
        );
        assert_eq!(caps.select_texture_format(&["-pvrtc.ktx"]), None);
    }
}
