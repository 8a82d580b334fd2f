//! Khronos texture container (KTX 1) header and level walker.
//!
//! Only compressed 2D and cube-map payloads are accepted: everything else is
//! flagged invalid and upload becomes a no-op.

use std::fmt;
use std::ops::Range;

use crate::gl::GlApi;

/// `«KTX 11»\r\n\x1A\n`
pub const KTX_IDENTIFIER: [u8; 12] = [
    0xAB, 0x4B, 0x54, 0x58, 0x20, 0x31, 0x31, 0xBB, 0x0D, 0x0A, 0x1A, 0x0A,
];

/// Identifier plus thirteen `u32` header fields.
pub const HEADER_LEN: usize = 12 + 13 * 4;

const ENDIANNESS_LE: u32 = 0x0403_0201;

/// Why a container was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KtxError {
    BadIdentifier,
    TruncatedHeader { len: usize },
    /// `glType != 0`: uncompressed payloads are not handled here.
    NotCompressed { gl_type: u32 },
    /// `pixelHeight == 0` or `pixelDepth != 0`.
    NotTwoDimensional { height: u32, depth: u32 },
    ArrayTexture { elements: u32 },
    FaceCountMismatch { expected: u32, found: u32 },
    /// More mip levels than halving the largest side can produce.
    TooManyMipLevels { levels: u32, max: u32 },
    TruncatedPayload { offset: usize, needed: usize, len: usize },
}

impl fmt::Display for KtxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KtxError::BadIdentifier => write!(f, "not a KTX container (identifier mismatch)"),
            KtxError::TruncatedHeader { len } => {
                write!(f, "KTX header truncated: {len} bytes, need {HEADER_LEN}")
            }
            KtxError::NotCompressed { gl_type } => {
                write!(f, "KTX glType {gl_type:#x} is not a compressed format")
            }
            KtxError::NotTwoDimensional { height, depth } => {
                write!(f, "KTX texture is not 2D (height {height}, depth {depth})")
            }
            KtxError::ArrayTexture { elements } => {
                write!(f, "KTX array textures are unsupported ({elements} elements)")
            }
            KtxError::FaceCountMismatch { expected, found } => {
                write!(f, "KTX face count {found}, expected {expected}")
            }
            KtxError::TooManyMipLevels { levels, max } => {
                write!(f, "KTX declares {levels} mip levels, at most {max} possible")
            }
            KtxError::TruncatedPayload { offset, needed, len } => {
                write!(f, "KTX payload truncated at {offset}: need {needed} bytes, have {len}")
            }
        }
    }
}

impl std::error::Error for KtxError {}

/// Header fields, in file order after the identifier.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct KtxHeader {
    pub little_endian: bool,
    pub gl_type: u32,
    pub gl_type_size: u32,
    pub gl_format: u32,
    pub gl_internal_format: u32,
    pub gl_base_internal_format: u32,
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub pixel_depth: u32,
    pub number_of_array_elements: u32,
    pub number_of_faces: u32,
    pub number_of_mipmap_levels: u32,
    pub bytes_of_key_value_data: u32,
}

/// One face image of one mip level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KtxImage {
    pub level: u32,
    pub face: u32,
    pub width: u32,
    pub height: u32,
    /// Byte range of the image inside the container.
    pub range: Range<usize>,
}

/// A parsed container. Construction never fails; check [`Self::is_invalid`].
#[derive(Debug, Clone)]
pub struct KhronosTextureContainer {
    data: Vec<u8>,
    header: KtxHeader,
    error: Option<KtxError>,
}

#[inline]
fn read_u32(bytes: &[u8], offset: usize, little_endian: bool) -> Option<u32> {
    let raw: [u8; 4] = bytes.get(offset..offset + 4)?.try_into().ok()?;
    Some(if little_endian { u32::from_le_bytes(raw) } else { u32::from_be_bytes(raw) })
}

/// Length of the full mip chain of a `width × height` image.
#[inline]
pub const fn max_mip_levels(width: u32, height: u32) -> u32 {
    let side = if width > height { width } else { height };
    let side = if side == 0 { 1 } else { side };
    u32::BITS - side.leading_zeros()
}

/// Bytes needed after an image of `size` bytes to reach 4-byte alignment.
#[inline]
pub const fn padding_for(size: usize) -> usize {
    (4 - size % 4) % 4
}

impl KhronosTextureContainer {
    /// Parses `data`, expecting `faces_expected` faces (1 for 2D, 6 for cube maps).
    pub fn new(data: Vec<u8>, faces_expected: u32) -> Self {
        match Self::parse_header(&data, faces_expected) {
            Ok(header) => Self { data, header, error: None },
            Err(err) => {
                log::warn!("rejecting texture container: {err}");
                Self { data, header: KtxHeader::default(), error: Some(err) }
            }
        }
    }

    fn parse_header(data: &[u8], faces_expected: u32) -> Result<KtxHeader, KtxError> {
        if data.len() < KTX_IDENTIFIER.len() || data[..12] != KTX_IDENTIFIER {
            return Err(KtxError::BadIdentifier);
        }
        if data.len() < HEADER_LEN {
            return Err(KtxError::TruncatedHeader { len: data.len() });
        }

        let little_endian = read_u32(data, 12, true) == Some(ENDIANNESS_LE);
        let field = |i: usize| read_u32(data, 12 + i * 4, little_endian).unwrap_or(0);

        let mut header = KtxHeader {
            little_endian,
            gl_type: field(1),
            gl_type_size: field(2),
            gl_format: field(3),
            gl_internal_format: field(4),
            gl_base_internal_format: field(5),
            pixel_width: field(6),
            pixel_height: field(7),
            pixel_depth: field(8),
            number_of_array_elements: field(9),
            number_of_faces: field(10),
            number_of_mipmap_levels: field(11),
            bytes_of_key_value_data: field(12),
        };

        if header.gl_type != 0 {
            return Err(KtxError::NotCompressed { gl_type: header.gl_type });
        }
        header.number_of_mipmap_levels = header.number_of_mipmap_levels.max(1);

        if header.pixel_height == 0 || header.pixel_depth != 0 {
            return Err(KtxError::NotTwoDimensional {
                height: header.pixel_height,
                depth: header.pixel_depth,
            });
        }
        if header.number_of_array_elements != 0 {
            return Err(KtxError::ArrayTexture { elements: header.number_of_array_elements });
        }
        if header.number_of_faces != faces_expected {
            return Err(KtxError::FaceCountMismatch {
                expected: faces_expected,
                found: header.number_of_faces,
            });
        }

        let max = max_mip_levels(header.pixel_width, header.pixel_height);
        if header.number_of_mipmap_levels > max {
            return Err(KtxError::TooManyMipLevels { levels: header.number_of_mipmap_levels, max });
        }

        Ok(header)
    }

    #[inline]
    pub fn is_invalid(&self) -> bool {
        self.error.is_some()
    }

    pub fn error(&self) -> Option<&KtxError> {
        self.error.as_ref()
    }

    /// Header fields. All zero when the container is invalid.
    pub fn header(&self) -> &KtxHeader {
        &self.header
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Walks mip levels × faces.
    ///
    /// Each level starts with a 4-byte image size shared by all its faces;
    /// every face image is followed by padding to the next 4-byte boundary.
    /// Dimensions halve per level, never below 1.
    pub fn images(&self, load_mipmaps: bool) -> Result<Vec<KtxImage>, KtxError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        let h = &self.header;
        let len = self.data.len();
        let truncated = |offset: usize, needed: usize| KtxError::TruncatedPayload { offset, needed, len };

        let mut offset = HEADER_LEN + h.bytes_of_key_value_data as usize;
        let mut width = h.pixel_width.max(1);
        let mut height = h.pixel_height.max(1);
        let levels = if load_mipmaps { h.number_of_mipmap_levels } else { 1 };

        let mut out = Vec::with_capacity(levels as usize * h.number_of_faces as usize);
        for level in 0..levels {
            let image_size = read_u32(&self.data, offset, h.little_endian)
                .ok_or_else(|| truncated(offset, 4))? as usize;
            offset += 4;

            for face in 0..h.number_of_faces {
                let end = match offset.checked_add(image_size) {
                    Some(end) if end <= len => end,
                    _ => return Err(truncated(offset, image_size)),
                };
                out.push(KtxImage { level, face, width, height, range: offset..end });
                offset = end + padding_for(image_size);
            }

            width = (width / 2).max(1);
            height = (height / 2).max(1);
        }
        Ok(out)
    }

    /// Byte offset just past the last image the walker would visit.
    pub fn payload_end(&self, load_mipmaps: bool) -> Result<usize, KtxError> {
        let images = self.images(load_mipmaps)?;
        Ok(images
            .last()
            .map(|img| img.range.end + padding_for(img.range.len()))
            .unwrap_or(HEADER_LEN + self.header.bytes_of_key_value_data as usize))
    }

    /// Uploads every face image of every level into the bound texture.
    ///
    /// Invalid containers upload nothing. Returns the number of images uploaded.
    pub fn upload_levels<G: GlApi>(&self, gl: &mut G, load_mipmaps: bool) -> usize {
        let images = match self.images(load_mipmaps) {
            Ok(images) => images,
            Err(err) => {
                log::warn!("skipping texture container upload: {err}");
                return 0;
            }
        };
        for img in &images {
            gl.compressed_tex_image_2d(
                img.face,
                img.level,
                self.header.gl_internal_format,
                img.width,
                img.height,
                &self.data[img.range.clone()],
            );
        }
        images.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::gl::{GlCall, TraceGl};

    const COMPRESSED_RGBA_S3TC_DXT5: u32 = 0x83F3;

    pub(crate) struct Builder {
        pub gl_type: u32,
        pub width: u32,
        pub height: u32,
        pub depth: u32,
        pub array_elements: u32,
        pub faces: u32,
        pub levels: Vec<usize>,
        pub key_value: Vec<u8>,
        pub big_endian: bool,
    }

    impl Default for Builder {
        fn default() -> Self {
            Self {
                gl_type: 0,
                width: 16,
                height: 16,
                depth: 0,
                array_elements: 0,
                faces: 1,
                levels: vec![16],
                key_value: Vec::new(),
                big_endian: false,
            }
        }
    }

    impl Builder {
        pub(crate) fn build(&self) -> Vec<u8> {
            let put = |out: &mut Vec<u8>, v: u32| {
                if self.big_endian {
                    out.extend_from_slice(&v.to_be_bytes());
                } else {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            };
            let mut out = KTX_IDENTIFIER.to_vec();
            put(&mut out, ENDIANNESS_LE);
            for v in [
                self.gl_type,
                1,
                0,
                COMPRESSED_RGBA_S3TC_DXT5,
                0,
                self.width,
                self.height,
                self.depth,
                self.array_elements,
                self.faces,
                self.levels.len() as u32,
                self.key_value.len() as u32,
            ] {
                put(&mut out, v);
            }
            out.extend_from_slice(&self.key_value);
            for &size in &self.levels {
                put(&mut out, size as u32);
                for face in 0..self.faces {
                    out.extend(std::iter::repeat_n(face as u8, size));
                    out.extend(std::iter::repeat_n(0u8, padding_for(size)));
                }
            }
            out
        }
    }

    #[test]
    fn bad_identifier_is_invalid_and_untrusted() {
        let mut bytes = Builder::default().build();
        bytes[1] = b'X';
        let ktx = KhronosTextureContainer::new(bytes, 1);
        assert!(ktx.is_invalid());
        assert_eq!(ktx.error(), Some(&KtxError::BadIdentifier));
        assert_eq!(ktx.header(), &KtxHeader::default());
    }

    #[test]
    fn short_buffer_is_invalid() {
        let ktx = KhronosTextureContainer::new(vec![0xAB, 0x4B], 1);
        assert!(ktx.is_invalid());
        let ktx = KhronosTextureContainer::new(KTX_IDENTIFIER.to_vec(), 1);
        assert_eq!(ktx.error(), Some(&KtxError::TruncatedHeader { len: 12 }));
    }

    #[test]
    fn face_mismatch_is_invalid() {
        let bytes = Builder { faces: 6, levels: vec![8], ..Default::default() }.build();
        let ktx = KhronosTextureContainer::new(bytes, 1);
        assert_eq!(ktx.error(), Some(&KtxError::FaceCountMismatch { expected: 1, found: 6 }));
    }

    #[test]
    fn uncompressed_and_3d_are_invalid() {
        let bytes = Builder { gl_type: 0x1401, ..Default::default() }.build();
        assert!(KhronosTextureContainer::new(bytes, 1).is_invalid());

        let bytes = Builder { depth: 4, ..Default::default() }.build();
        assert!(KhronosTextureContainer::new(bytes, 1).is_invalid());

        let bytes = Builder { height: 0, ..Default::default() }.build();
        assert!(KhronosTextureContainer::new(bytes, 1).is_invalid());

        let bytes = Builder { array_elements: 2, ..Default::default() }.build();
        assert!(KhronosTextureContainer::new(bytes, 1).is_invalid());
    }

    #[test]
    fn big_endian_header_is_read() {
        let bytes = Builder { big_endian: true, width: 64, height: 32, ..Default::default() }.build();
        let ktx = KhronosTextureContainer::new(bytes, 1);
        assert!(!ktx.is_invalid());
        assert!(!ktx.header().little_endian);
        assert_eq!((ktx.header().pixel_width, ktx.header().pixel_height), (64, 32));
    }

    #[test]
    fn padding_aligns_to_four() {
        assert_eq!(padding_for(0), 0);
        assert_eq!(padding_for(1), 3);
        assert_eq!(padding_for(2), 2);
        assert_eq!(padding_for(3), 1);
        assert_eq!(padding_for(4), 0);
    }

    #[test]
    fn cube_map_with_two_levels_walks_to_end_of_payload() {
        let bytes = Builder {
            width: 8,
            height: 8,
            faces: 6,
            levels: vec![10, 3],
            key_value: vec![1, 2, 3, 4],
            ..Default::default()
        }
        .build();
        // 64 header + 4 kv + (4 + 6 * (10 + 2)) + (4 + 6 * (3 + 1))
        assert_eq!(bytes.len(), 172);

        let ktx = KhronosTextureContainer::new(bytes, 6);
        assert!(!ktx.is_invalid());

        let images = ktx.images(true).unwrap();
        assert_eq!(images.len(), 12);
        assert_eq!(images[0].range, 72..82);
        assert_eq!(images[1].range, 84..94);
        assert_eq!(images[6].level, 1);
        assert_eq!((images[6].width, images[6].height), (4, 4));
        assert_eq!(images[6].range.len(), 3);
        assert!(images.iter().all(|img| img.range.start % 4 == 0));
        assert_eq!(ktx.payload_end(true).unwrap(), 172);

        // each face is filled with its own index
        for img in &images {
            assert!(ktx.data()[img.range.clone()].iter().all(|&b| b == img.face as u8));
        }
    }

    #[test]
    fn base_level_only_when_mipmaps_disabled() {
        let bytes = Builder { levels: vec![16, 4, 1], ..Default::default() }.build();
        let ktx = KhronosTextureContainer::new(bytes, 1);
        assert_eq!(ktx.images(false).unwrap().len(), 1);
        assert_eq!(ktx.images(true).unwrap().len(), 3);
    }

    #[test]
    fn truncated_payload_is_reported() {
        let mut bytes = Builder { levels: vec![16], ..Default::default() }.build();
        bytes.truncate(bytes.len() - 4);
        let ktx = KhronosTextureContainer::new(bytes, 1);
        assert!(matches!(ktx.images(true), Err(KtxError::TruncatedPayload { .. })));
    }

    #[test]
    fn mip_chain_length_follows_largest_side() {
        assert_eq!(max_mip_levels(1, 1), 1);
        assert_eq!(max_mip_levels(16, 16), 5);
        assert_eq!(max_mip_levels(17, 2), 5);
        assert_eq!(max_mip_levels(0, 0), 1);
        assert_eq!(max_mip_levels(u32::MAX, 1), 32);
    }

    /// Overwrites the numberOfMipmapLevels header field.
    fn with_level_count(mut bytes: Vec<u8>, levels: u32) -> Vec<u8> {
        bytes[12 + 11 * 4..12 + 12 * 4].copy_from_slice(&levels.to_le_bytes());
        bytes
    }

    #[test]
    fn oversized_mip_count_is_invalid() {
        let bytes = Builder { faces: 6, levels: vec![8], ..Default::default() }.build();
        let ktx = KhronosTextureContainer::new(with_level_count(bytes, 0x3000_0000), 6);
        assert_eq!(
            ktx.error(),
            Some(&KtxError::TooManyMipLevels { levels: 0x3000_0000, max: 5 })
        );
        assert!(ktx.images(true).is_err());

        let bytes = Builder::default().build();
        let ktx = KhronosTextureContainer::new(with_level_count(bytes, u32::MAX), 1);
        assert!(ktx.is_invalid());
        let mut gl = TraceGl::new();
        assert_eq!(ktx.upload_levels(&mut gl, true), 0);
        assert!(gl.calls().is_empty());
    }

    #[test]
    fn full_mip_chain_is_accepted() {
        let bytes = Builder { width: 4, height: 4, levels: vec![16, 4, 1], ..Default::default() }.build();
        let ktx = KhronosTextureContainer::new(bytes, 1);
        assert!(!ktx.is_invalid());
        assert_eq!(ktx.images(true).unwrap().len(), 3);
    }

    #[test]
    fn missing_levels_are_reported_as_truncated() {
        let bytes = Builder { levels: vec![16], ..Default::default() }.build();
        let ktx = KhronosTextureContainer::new(with_level_count(bytes, 5), 1);
        assert!(!ktx.is_invalid());
        assert!(matches!(ktx.images(true), Err(KtxError::TruncatedPayload { .. })));
    }

    #[test]
    fn upload_issues_one_call_per_face_image() {
        let bytes = Builder { faces: 6, levels: vec![8, 2], ..Default::default() }.build();
        let ktx = KhronosTextureContainer::new(bytes, 6);
        let mut gl = TraceGl::new();
        assert_eq!(ktx.upload_levels(&mut gl, true), 12);
        assert_eq!(
            gl.count(|c| matches!(c, GlCall::CompressedTexImage2D { internal_format: COMPRESSED_RGBA_S3TC_DXT5, .. })),
            12
        );
    }

    #[test]
    fn invalid_container_uploads_nothing() {
        let ktx = KhronosTextureContainer::new(vec![0; 80], 1);
        let mut gl = TraceGl::new();
        assert_eq!(ktx.upload_levels(&mut gl, true), 0);
        assert!(gl.calls().is_empty());
    }
}
