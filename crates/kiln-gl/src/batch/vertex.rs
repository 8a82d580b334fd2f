use std::fmt;

use bytemuck::{Pod, Zeroable};

use crate::coords::Rect;
use crate::paint::pack_vertex_color;
use crate::target::RenderBuffer;

/// Hard ceiling imposed by 16-bit indices.
pub const MAX_VERTICES_U16: usize = 65536;

/// Default quads per batch.
pub const DEFAULT_MAX_QUADS: usize = 2048;

// ── vertex ────────────────────────────────────────────────────────────────

/// Interleaved vertex: position, UV, packed color. 20 bytes.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    /// `[r, g, b, a]` bytes, read as a normalized `vec4`.
    pub color: u32,
}

impl Vertex {
    pub const STRIDE: i32 = std::mem::size_of::<Vertex>() as i32;
    pub const POSITION_OFFSET: i32 = 0;
    pub const UV_OFFSET: i32 = 8;
    pub const COLOR_OFFSET: i32 = 16;
}

// ── draw inputs ───────────────────────────────────────────────────────────

/// Where a drawable samples from and where it lands.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DrawRegion {
    /// Sub-rectangle of the texture, in texels.
    pub source: Rect,
    /// Destination in the buffer's local space.
    pub dest: Rect,
    pub texture_width: f32,
    pub texture_height: f32,
    /// Atlas region stored rotated 90° clockwise.
    pub rotated: bool,
}

impl DrawRegion {
    /// Draws the whole `width × height` texture at `dest`.
    pub fn full(width: f32, height: f32, dest: Rect) -> Self {
        Self {
            source: Rect::from_size(width, height),
            dest,
            texture_width: width,
            texture_height: height,
            rotated: false,
        }
    }

    /// Solid rect: UVs are irrelevant, source equals dest size.
    pub fn solid(dest: Rect) -> Self {
        Self::full(dest.width, dest.height, dest)
    }
}

/// Triangle mesh in local space with normalized UVs over the source rect.
#[derive(Debug, Copy, Clone)]
pub struct Mesh<'a> {
    pub uvs: &'a [f32],
    pub vertices: &'a [f32],
    pub indices: &'a [u16],
}

impl Mesh<'_> {
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 2
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Checks that positions, UVs and indices describe whole triangles over
    /// the same vertices.
    pub fn validate(&self) -> Result<(), MeshError> {
        if self.vertices.len() % 2 != 0 {
            return Err(MeshError::OddCoordinates { len: self.vertices.len() });
        }
        if self.uvs.len() != self.vertices.len() {
            return Err(MeshError::UvMismatch { uvs: self.uvs.len(), vertices: self.vertices.len() });
        }
        if self.indices.len() % 3 != 0 {
            return Err(MeshError::PartialTriangle { indices: self.indices.len() });
        }
        let count = self.vertex_count();
        if let Some(&index) = self.indices.iter().find(|&&i| i as usize >= count) {
            return Err(MeshError::IndexOutOfRange { index, vertices: count });
        }
        Ok(())
    }
}

/// Why a mesh cannot be batched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshError {
    /// `vertices` holds an odd number of floats.
    OddCoordinates { len: usize },
    UvMismatch { uvs: usize, vertices: usize },
    /// Index count is not a multiple of three.
    PartialTriangle { indices: usize },
    IndexOutOfRange { index: u16, vertices: usize },
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeshError::OddCoordinates { len } => {
                write!(f, "mesh has {len} position floats, expected pairs")
            }
            MeshError::UvMismatch { uvs, vertices } => {
                write!(f, "mesh has {uvs} uv floats for {vertices} position floats")
            }
            MeshError::PartialTriangle { indices } => {
                write!(f, "mesh index count {indices} is not a multiple of 3")
            }
            MeshError::IndexOutOfRange { index, vertices } => {
                write!(f, "mesh index {index} out of range for {vertices} vertices")
            }
        }
    }
}

impl std::error::Error for MeshError {}

// ── assembler ─────────────────────────────────────────────────────────────

/// CPU-side geometry for one batch.
///
/// Performance characteristics:
/// - the quad index pattern is built once and never changes
/// - `clear()` keeps every allocation; steady-state frames do not allocate
///
/// Quads index into the shared pattern. As soon as one mesh is appended the
/// batch switches to its own mesh index stream (prefixed with the quad
/// pattern used so far) until the next `clear()`.
#[derive(Debug)]
pub struct VertexArrayObject {
    max_vertices: usize,
    max_indices: usize,

    vertices: Vec<Vertex>,
    quad_indices: Vec<u16>,
    mesh_indices: Vec<u16>,
    index_count: usize,
    has_mesh: bool,
}

impl Default for VertexArrayObject {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_QUADS)
    }
}

impl VertexArrayObject {
    /// Capacity is `max_quads` quads, clamped to the 16-bit index range.
    pub fn new(max_quads: usize) -> Self {
        let max_quads = max_quads.clamp(1, MAX_VERTICES_U16 / 4);
        let max_vertices = max_quads * 4;
        let max_indices = max_quads * 6;

        let mut quad_indices = Vec::with_capacity(max_indices);
        for q in 0..max_quads as u16 {
            let base = q * 4;
            quad_indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self {
            max_vertices,
            max_indices,
            vertices: Vec::with_capacity(max_vertices),
            quad_indices,
            mesh_indices: Vec::with_capacity(max_indices),
            index_count: 0,
            has_mesh: false,
        }
    }

    /// True when appending `vertex_count` vertices and `index_count` indices
    /// would overflow this batch.
    #[inline]
    pub fn reach_max_size(&self, vertex_count: usize, index_count: usize) -> bool {
        self.vertices.len() + vertex_count > self.max_vertices
            || self.index_count + index_count > self.max_indices
    }

    /// True when a drawable of this size fits in an empty batch.
    #[inline]
    pub fn fits(&self, vertex_count: usize, index_count: usize) -> bool {
        vertex_count <= self.max_vertices && index_count <= self.max_indices
    }

    /// Switches to the per-batch mesh index stream.
    pub fn change_to_mesh_indices(&mut self) {
        if !self.has_mesh {
            self.mesh_indices.clear();
            self.mesh_indices.extend_from_slice(&self.quad_indices[..self.index_count]);
            self.has_mesh = true;
        }
    }

    #[inline]
    pub fn is_mesh(&self) -> bool {
        self.has_mesh
    }

    #[inline]
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    #[inline]
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// The full static quad pattern.
    #[inline]
    pub fn quad_indices(&self) -> &[u16] {
        &self.quad_indices
    }

    #[inline]
    pub fn mesh_indices(&self) -> &[u16] {
        &self.mesh_indices
    }

    #[inline]
    pub fn index_count(&self) -> usize {
        self.index_count
    }

    #[inline]
    pub fn max_quads(&self) -> usize {
        self.max_vertices / 4
    }

    /// Appends one drawable, transformed by `buffer`'s current matrix and offset.
    ///
    /// Quads scale the source rect onto `region.dest`. Meshes are placed at the
    /// buffer origin and keep their own vertex positions.
    pub fn cache_arrays(&mut self, buffer: &RenderBuffer, region: &DrawRegion, mesh: Option<&Mesh<'_>>) {
        let color = pack_vertex_color(buffer.global_tint, buffer.global_alpha);

        let m = buffer.global_matrix;
        let (mut a, mut b, mut c, mut d, mut tx, mut ty) = (m.a, m.b, m.c, m.d, m.tx, m.ty);

        let (ox, oy) = (buffer.offset_x, buffer.offset_y);
        if ox != 0.0 || oy != 0.0 {
            tx += ox * a + oy * c;
            ty += ox * b + oy * d;
        }

        let src = region.source;
        let (tw, th) = (region.texture_width, region.texture_height);

        if let Some(mesh) = mesh {
            let base = self.vertices.len();
            for (xy, uv) in mesh.vertices.chunks_exact(2).zip(mesh.uvs.chunks_exact(2)) {
                let (x, y) = (xy[0], xy[1]);
                let (u, v) = (uv[0], uv[1]);
                let uv = if region.rotated {
                    [(src.x + (1.0 - v) * src.height) / tw, (src.y + u * src.width) / th]
                } else {
                    [(src.x + u * src.width) / tw, (src.y + v * src.height) / th]
                };
                self.vertices.push(Vertex {
                    position: [a * x + c * y + tx, b * x + d * y + ty],
                    uv,
                    color,
                });
            }
            if self.has_mesh {
                let base = base as u16;
                self.mesh_indices.extend(mesh.indices.iter().map(|&i| i + base));
            }
            self.index_count += mesh.indices.len();
            return;
        }

        let dest = region.dest;
        if dest.x != 0.0 || dest.y != 0.0 {
            tx += dest.x * a + dest.y * c;
            ty += dest.x * b + dest.y * d;
        }
        let sx = dest.width / src.width;
        if sx != 1.0 {
            a *= sx;
            b *= sx;
        }
        let sy = dest.height / src.height;
        if sy != 1.0 {
            c *= sy;
            d *= sy;
        }

        let (w, h) = (src.width, src.height);
        let corners = [
            [tx, ty],
            [a * w + tx, b * w + ty],
            [a * w + c * h + tx, b * w + d * h + ty],
            [c * h + tx, d * h + ty],
        ];

        let u0 = src.x / tw;
        let v0 = src.y / th;
        let uvs = if region.rotated {
            // the region is stored rotated: its width runs along the texture's V axis
            let du = src.height / tw;
            let dv = src.width / th;
            [[u0 + du, v0], [u0 + du, v0 + dv], [u0, v0 + dv], [u0, v0]]
        } else {
            let du = src.width / tw;
            let dv = src.height / th;
            [[u0, v0], [u0 + du, v0], [u0 + du, v0 + dv], [u0, v0 + dv]]
        };

        let base = self.vertices.len() as u16;
        for (position, uv) in corners.into_iter().zip(uvs) {
            self.vertices.push(Vertex { position, uv, color });
        }
        if self.has_mesh {
            self.mesh_indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        self.index_count += 6;
    }

    /// Empties the batch. Capacity is kept.
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.mesh_indices.clear();
        self.index_count = 0;
        self.has_mesh = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Matrix;

    fn buffer() -> RenderBuffer {
        RenderBuffer::new(100, 100)
    }

    // ── capacity ──────────────────────────────────────────────────────────

    #[test]
    fn vertex_is_twenty_bytes() {
        assert_eq!(Vertex::STRIDE, 20);
    }

    #[test]
    fn capacity_is_clamped_to_u16_range() {
        let vao = VertexArrayObject::new(1_000_000);
        assert_eq!(vao.max_quads(), MAX_VERTICES_U16 / 4);
        assert_eq!(*vao.quad_indices().last().unwrap(), u16::MAX);
    }

    #[test]
    fn reach_max_size_after_capacity_quads() {
        let mut vao = VertexArrayObject::new(2);
        let buf = buffer();
        let region = DrawRegion::solid(Rect::new(0.0, 0.0, 10.0, 10.0));
        assert!(!vao.reach_max_size(4, 6));
        vao.cache_arrays(&buf, &region, None);
        assert!(!vao.reach_max_size(4, 6));
        vao.cache_arrays(&buf, &region, None);
        assert!(vao.reach_max_size(4, 6));
        assert!(!vao.reach_max_size(0, 0));
    }

    #[test]
    fn oversized_mesh_never_fits() {
        let vao = VertexArrayObject::new(1);
        assert!(vao.fits(4, 6));
        assert!(!vao.fits(5, 6));
        assert!(!vao.fits(3, 9));
    }

    // ── quads ─────────────────────────────────────────────────────────────

    #[test]
    fn quad_positions_follow_transform_offset_and_dest() {
        let mut vao = VertexArrayObject::default();
        let mut buf = buffer();
        buf.set_transform(Matrix::new(2.0, 0.0, 0.0, 2.0, 10.0, 20.0));
        buf.offset_x = 1.0;
        let region = DrawRegion {
            source: Rect::new(0.0, 0.0, 8.0, 8.0),
            dest: Rect::new(3.0, 0.0, 16.0, 8.0),
            texture_width: 8.0,
            texture_height: 8.0,
            rotated: false,
        };
        vao.cache_arrays(&buf, &region, None);

        let p: Vec<_> = vao.vertices().iter().map(|v| v.position).collect();
        // offset + dest.x = 4 local units → 8 device px; width 16 local → 32 px
        assert_eq!(p, [[18.0, 20.0], [50.0, 20.0], [50.0, 36.0], [18.0, 36.0]]);
        assert_eq!(vao.index_count(), 6);
    }

    #[test]
    fn quad_uvs_cover_source_rect() {
        let mut vao = VertexArrayObject::default();
        let region = DrawRegion {
            source: Rect::new(32.0, 64.0, 32.0, 64.0),
            dest: Rect::from_size(32.0, 64.0),
            texture_width: 128.0,
            texture_height: 256.0,
            rotated: false,
        };
        vao.cache_arrays(&buffer(), &region, None);
        let uv: Vec<_> = vao.vertices().iter().map(|v| v.uv).collect();
        assert_eq!(uv, [[0.25, 0.25], [0.5, 0.25], [0.5, 0.5], [0.25, 0.5]]);
    }

    #[test]
    fn rotated_quad_swaps_uv_axes() {
        let mut vao = VertexArrayObject::default();
        let region = DrawRegion {
            source: Rect::new(0.0, 0.0, 20.0, 10.0),
            dest: Rect::from_size(20.0, 10.0),
            texture_width: 100.0,
            texture_height: 100.0,
            rotated: true,
        };
        vao.cache_arrays(&buffer(), &region, None);
        let uv: Vec<_> = vao.vertices().iter().map(|v| v.uv).collect();
        assert_eq!(uv, [[0.1, 0.0], [0.1, 0.2], [0.0, 0.2], [0.0, 0.0]]);
        // geometry is not rotated
        assert_eq!(vao.vertices()[2].position, [20.0, 10.0]);
    }

    #[test]
    fn color_carries_buffer_alpha() {
        let mut vao = VertexArrayObject::default();
        let mut buf = buffer();
        buf.global_alpha = 0.5;
        vao.cache_arrays(&buf, &DrawRegion::solid(Rect::from_size(1.0, 1.0)), None);
        assert_eq!(vao.vertices()[0].color.to_le_bytes()[3], 128);
    }

    // ── meshes ────────────────────────────────────────────────────────────

    #[test]
    fn malformed_meshes_are_rejected() {
        let square = [0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0];
        let ok = Mesh { uvs: &square, vertices: &square, indices: &[0, 1, 2, 0, 2, 3] };
        assert_eq!(ok.validate(), Ok(()));

        let partial = Mesh { indices: &[0, 1, 2, 3], ..ok };
        assert_eq!(partial.validate(), Err(MeshError::PartialTriangle { indices: 4 }));

        let uvs = Mesh { uvs: &square[..6], ..ok };
        assert_eq!(uvs.validate(), Err(MeshError::UvMismatch { uvs: 6, vertices: 8 }));

        let odd = Mesh { uvs: &square[..7], vertices: &square[..7], ..ok };
        assert_eq!(odd.validate(), Err(MeshError::OddCoordinates { len: 7 }));

        let range = Mesh { indices: &[0, 1, 4], ..ok };
        assert_eq!(range.validate(), Err(MeshError::IndexOutOfRange { index: 4, vertices: 4 }));
    }

    #[test]
    fn mesh_switch_copies_quad_prefix_and_offsets_indices() {
        let mut vao = VertexArrayObject::default();
        let buf = buffer();
        vao.cache_arrays(&buf, &DrawRegion::solid(Rect::from_size(4.0, 4.0)), None);

        let mesh = Mesh {
            uvs: &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
            vertices: &[0.0, 0.0, 10.0, 0.0, 0.0, 10.0],
            indices: &[0, 1, 2],
        };
        vao.change_to_mesh_indices();
        vao.cache_arrays(&buf, &DrawRegion::full(10.0, 10.0, Rect::from_size(10.0, 10.0)), Some(&mesh));

        assert!(vao.is_mesh());
        assert_eq!(vao.mesh_indices(), &[0, 1, 2, 0, 2, 3, 4, 5, 6]);
        assert_eq!(vao.vertices().len(), 7);

        // a quad after the mesh lands in the mesh stream too
        vao.cache_arrays(&buf, &DrawRegion::solid(Rect::from_size(4.0, 4.0)), None);
        assert_eq!(&vao.mesh_indices()[9..], &[7, 8, 9, 7, 9, 10]);
        assert_eq!(vao.index_count(), 15);
    }

    #[test]
    fn rotated_mesh_uvs() {
        let mut vao = VertexArrayObject::default();
        let mesh = Mesh { uvs: &[1.0, 0.0], vertices: &[0.0, 0.0], indices: &[] };
        let region = DrawRegion {
            source: Rect::new(0.0, 0.0, 20.0, 10.0),
            dest: Rect::from_size(20.0, 10.0),
            texture_width: 100.0,
            texture_height: 100.0,
            rotated: true,
        };
        vao.change_to_mesh_indices();
        vao.cache_arrays(&buffer(), &region, Some(&mesh));
        // u' = (sx + (1 - v) * sh) / tw, v' = (sy + u * sw) / th
        assert_eq!(vao.vertices()[0].uv, [0.1, 0.2]);
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut vao = VertexArrayObject::new(16);
        let buf = buffer();
        vao.change_to_mesh_indices();
        for _ in 0..16 {
            vao.cache_arrays(&buf, &DrawRegion::solid(Rect::from_size(1.0, 1.0)), None);
        }
        let cap = vao.vertices.capacity();
        vao.clear();
        assert!(vao.vertices().is_empty());
        assert!(!vao.is_mesh());
        assert_eq!(vao.index_count(), 0);
        assert_eq!(vao.vertices.capacity(), cap);
    }
}
