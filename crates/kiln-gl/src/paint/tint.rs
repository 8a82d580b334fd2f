/// Packs a `0xRRGGBB` tint and an alpha into the per-vertex color tag.
///
/// Byte order is `[r, g, b, a]` in memory, read by the shader as a
/// normalized `vec4` multiplier. Targets and uploaded textures hold
/// premultiplied color, so translucent tints are premultiplied here.
pub fn pack_vertex_color(tint: u32, alpha: f32) -> u32 {
    let alpha = alpha.clamp(0.0, 1.0);
    let mut r = ((tint >> 16) & 0xFF) as f32;
    let mut g = ((tint >> 8) & 0xFF) as f32;
    let mut b = (tint & 0xFF) as f32;
    if alpha < 1.0 {
        r *= alpha;
        g *= alpha;
        b *= alpha;
    }
    let a = (alpha * 255.0).round();
    u32::from_le_bytes([r.round() as u8, g.round() as u8, b.round() as u8, a as u8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_white_is_all_ones() {
        assert_eq!(pack_vertex_color(0xFFFFFF, 1.0), u32::MAX);
    }

    #[test]
    fn translucent_tint_is_premultiplied() {
        let bytes = pack_vertex_color(0xFF8000, 0.5).to_le_bytes();
        assert_eq!(bytes, [128, 64, 0, 128]);
    }

    #[test]
    fn alpha_is_clamped() {
        assert_eq!(pack_vertex_color(0xFFFFFF, 3.0), u32::MAX);
        assert_eq!(pack_vertex_color(0xFFFFFF, -1.0).to_le_bytes()[3], 0);
    }
}
