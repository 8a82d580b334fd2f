/// 2D affine transform `[a c tx; b d ty]`.
///
/// A point maps as `x' = a*x + c*y + tx`, `y' = b*x + d*y + ty`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);

    #[inline]
    pub const fn new(a: f32, b: f32, c: f32, d: f32, tx: f32, ty: f32) -> Self {
        Self { a, b, c, d, tx, ty }
    }

    #[inline]
    pub const fn translation(tx: f32, ty: f32) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    #[inline]
    pub fn map_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.tx,
            self.b * x + self.d * y + self.ty,
        )
    }

    /// True when the transform has no rotation or skew.
    #[inline]
    pub fn is_axis_aligned(&self) -> bool {
        self.b == 0.0 && self.c == 0.0
    }

    /// Applies `m` before `self` (local space of `self`): `self = self * m`.
    pub fn prepend(&mut self, m: Matrix) {
        let Matrix { a: a1, b: b1, c: c1, d: d1, .. } = *self;
        if m.a != 1.0 || m.b != 0.0 || m.c != 0.0 || m.d != 1.0 {
            self.a = m.a * a1 + m.b * c1;
            self.b = m.a * b1 + m.b * d1;
            self.c = m.c * a1 + m.d * c1;
            self.d = m.c * b1 + m.d * d1;
        }
        self.tx = m.tx * a1 + m.ty * c1 + self.tx;
        self.ty = m.tx * b1 + m.ty * d1 + self.ty;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepend_translation_moves_in_local_space() {
        let mut m = Matrix::new(2.0, 0.0, 0.0, 2.0, 10.0, 10.0);
        m.prepend(Matrix::translation(5.0, 1.0));
        assert_eq!(m.map_point(0.0, 0.0), (20.0, 12.0));
    }

    #[test]
    fn prepend_flip_inverts_y() {
        let mut m = Matrix::IDENTITY;
        m.prepend(Matrix::new(1.0, 0.0, 0.0, -1.0, 0.0, 100.0));
        assert_eq!(m.map_point(3.0, 0.0), (3.0, 100.0));
        assert_eq!(m.map_point(3.0, 100.0), (3.0, 0.0));
    }

    #[test]
    fn axis_aligned_detection() {
        assert!(Matrix::new(2.0, 0.0, 0.0, 3.0, 1.0, 1.0).is_axis_aligned());
        assert!(!Matrix::new(0.0, 1.0, -1.0, 0.0, 0.0, 0.0).is_axis_aligned());
    }
}
