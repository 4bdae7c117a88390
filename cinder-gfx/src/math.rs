//! Geometry value types shared by every renderer.
//!
//! Three coordinate spaces flow through the pipeline:
//!
//! - *config space*: x is cumulative weight, y is integer stack depth
//! - *physical space*: device pixels with the origin at the top-left
//! - *normalized device coordinates*: `-1..1` on both axes, y pointing up
//!
//! Renderers move between them only through [`AffineTransform`]s built from
//! [`AffineTransform::between_rects`], [`AffineTransform::with_scale`] and
//! [`AffineTransform::with_translation`].
//!
//! # Example
//!
//! ```
//! use cinder_gfx::math::{AffineTransform, Rect, Vec2};
//!
//! let config = Rect::new(Vec2::new(0.0, 0.0), Vec2::new(60.0, 1.0));
//! let physical = Rect::new(Vec2::new(0.0, 0.0), Vec2::new(600.0, 10.0));
//!
//! let config_to_physical = AffineTransform::between_rects(&config, &physical);
//! let frame = Rect::new(Vec2::new(10.0, 0.0), Vec2::new(20.0, 1.0));
//! assert_eq!(
//!     config_to_physical.transform_rect(&frame),
//!     Rect::new(Vec2::new(100.0, 0.0), Vec2::new(200.0, 10.0)),
//! );
//! ```

use std::ops::{Add, Div, Mul, Neg, Sub};

/// A 2D vector or point.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };
    pub const ONE: Self = Self { x: 1.0, y: 1.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn with_x(self, x: f64) -> Self {
        Self { x, ..self }
    }

    pub fn with_y(self, y: f64) -> Self {
        Self { y, ..self }
    }

    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn times_pointwise(self, other: Self) -> Self {
        Self::new(self.x * other.x, self.y * other.y)
    }

    pub fn divided_by_pointwise(self, other: Self) -> Self {
        Self::new(self.x / other.x, self.y / other.y)
    }

    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y))
    }

    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y))
    }

    pub fn clamp(self, min: Self, max: Self) -> Self {
        self.max(min).min(max)
    }

    pub fn to_array(self) -> [f32; 2] {
        [self.x as f32, self.y as f32]
    }
}

impl Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f64> for Vec2 {
    type Output = Self;

    fn div(self, rhs: f64) -> Self {
        Self::new(self.x / rhs, self.y / rhs)
    }
}

impl Neg for Vec2 {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

/// An axis-aligned rectangle described by its top-left origin and size.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Rect {
    pub origin: Vec2,
    pub size: Vec2,
}

impl Rect {
    pub const EMPTY: Self = Self::new(Vec2::ZERO, Vec2::ZERO);
    /// `[0, 1] x [0, 1]`, the UV square.
    pub const UNIT: Self = Self::new(Vec2::ZERO, Vec2::ONE);
    /// `[-1, 1] x [-1, 1]`, the clip-space square.
    pub const NDC: Self = Self::new(Vec2::new(-1.0, -1.0), Vec2::new(2.0, 2.0));

    pub const fn new(origin: Vec2, size: Vec2) -> Self {
        Self { origin, size }
    }

    /// Builds a rectangle from `(x, y, width, height)`.
    pub const fn from_xywh(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(Vec2::new(x, y), Vec2::new(width, height))
    }

    /// Builds the rectangle spanned by two corners, in any order.
    pub fn from_corners(a: Vec2, b: Vec2) -> Self {
        let min = a.min(b);
        let max = a.max(b);
        Self::new(min, max - min)
    }

    pub fn width(&self) -> f64 {
        self.size.x
    }

    pub fn height(&self) -> f64 {
        self.size.y
    }

    pub fn left(&self) -> f64 {
        self.origin.x
    }

    pub fn right(&self) -> f64 {
        self.left() + self.width()
    }

    pub fn top(&self) -> f64 {
        self.origin.y
    }

    pub fn bottom(&self) -> f64 {
        self.top() + self.height()
    }

    pub fn top_left(&self) -> Vec2 {
        self.origin
    }

    pub fn top_right(&self) -> Vec2 {
        self.origin + Vec2::new(self.width(), 0.0)
    }

    pub fn bottom_right(&self) -> Vec2 {
        self.origin + self.size
    }

    pub fn bottom_left(&self) -> Vec2 {
        self.origin + Vec2::new(0.0, self.height())
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0.0 || self.height() == 0.0
    }

    pub fn with_origin(&self, origin: Vec2) -> Self {
        Self::new(origin, self.size)
    }

    pub fn with_size(&self, size: Vec2) -> Self {
        Self::new(self.origin, size)
    }

    pub fn contains(&self, p: Vec2) -> bool {
        self.left() <= p.x && p.x <= self.right() && self.top() <= p.y && p.y <= self.bottom()
    }

    /// Returns true when the two rectangles overlap with positive area.
    /// Rectangles that only share an edge do not intersect.
    pub fn has_intersection_with(&self, other: &Rect) -> bool {
        let top = self.top().max(other.top());
        let bottom = self.bottom().min(other.bottom());
        if top >= bottom {
            return false;
        }
        let left = self.left().max(other.left());
        let right = self.right().min(other.right());
        left < right
    }

    /// The overlapping region, collapsed to a zero-sized rectangle when the
    /// inputs are disjoint.
    pub fn intersect_with(&self, other: &Rect) -> Rect {
        let top_left = self.top_left().max(other.top_left());
        let bottom_right = self.bottom_right().min(other.bottom_right()).max(top_left);
        Rect::new(top_left, bottom_right - top_left)
    }

    /// The smallest rectangle containing both inputs.
    pub fn union_with(&self, other: &Rect) -> Rect {
        let top_left = self.top_left().min(other.top_left());
        let bottom_right = self.bottom_right().max(other.bottom_right());
        Rect::new(top_left, bottom_right - top_left)
    }
}

/// A 2D affine map `p -> M * p + t`.
///
/// ```text
/// | m00 m01 m02 |
/// | m10 m11 m12 |
/// |  0   0   1  |
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    pub m00: f64,
    pub m01: f64,
    pub m02: f64,
    pub m10: f64,
    pub m11: f64,
    pub m12: f64,
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl AffineTransform {
    pub const IDENTITY: Self = Self {
        m00: 1.0,
        m01: 0.0,
        m02: 0.0,
        m10: 0.0,
        m11: 1.0,
        m12: 0.0,
    };

    pub fn with_scale(s: Vec2) -> Self {
        Self {
            m00: s.x,
            m11: s.y,
            ..Self::IDENTITY
        }
    }

    pub fn with_translation(t: Vec2) -> Self {
        Self {
            m02: t.x,
            m12: t.y,
            ..Self::IDENTITY
        }
    }

    /// The transform mapping `from` onto `to`, corner to corner.
    pub fn between_rects(from: &Rect, to: &Rect) -> Self {
        Self::with_translation(to.origin)
            .times(&Self::with_scale(to.size.divided_by_pointwise(from.size)))
            .times(&Self::with_translation(-from.origin))
    }

    pub fn scale(&self) -> Vec2 {
        Vec2::new(self.m00, self.m11)
    }

    pub fn translation(&self) -> Vec2 {
        Vec2::new(self.m02, self.m12)
    }

    /// Composition: the result applies `other` first, then `self`.
    pub fn times(&self, other: &AffineTransform) -> Self {
        Self {
            m00: self.m00 * other.m00 + self.m01 * other.m10,
            m01: self.m00 * other.m01 + self.m01 * other.m11,
            m02: self.m00 * other.m02 + self.m01 * other.m12 + self.m02,
            m10: self.m10 * other.m00 + self.m11 * other.m10,
            m11: self.m10 * other.m01 + self.m11 * other.m11,
            m12: self.m10 * other.m02 + self.m11 * other.m12 + self.m12,
        }
    }

    pub fn determinant(&self) -> f64 {
        self.m00 * self.m11 - self.m01 * self.m10
    }

    /// The inverse map, or `None` for a singular transform.
    pub fn inverted(&self) -> Option<Self> {
        let det = self.determinant();
        if det == 0.0 {
            return None;
        }
        let inv_det = 1.0 / det;
        let m00 = self.m11 * inv_det;
        let m01 = -self.m01 * inv_det;
        let m10 = -self.m10 * inv_det;
        let m11 = self.m00 * inv_det;
        Some(Self {
            m00,
            m01,
            m02: -(m00 * self.m02 + m01 * self.m12),
            m10,
            m11,
            m12: -(m10 * self.m02 + m11 * self.m12),
        })
    }

    /// Applies the linear part only.
    pub fn transform_vector(&self, v: Vec2) -> Vec2 {
        Vec2::new(
            v.x * self.m00 + v.y * self.m01,
            v.x * self.m10 + v.y * self.m11,
        )
    }

    pub fn transform_position(&self, p: Vec2) -> Vec2 {
        self.transform_vector(p) + self.translation()
    }

    /// Maps both corners and normalizes the result, so flipping transforms
    /// still produce a rectangle with a non-negative size.
    pub fn transform_rect(&self, r: &Rect) -> Rect {
        let a = self.transform_position(r.top_left());
        let b = self.transform_position(r.bottom_right());
        Rect::from_corners(a, b)
    }

    /// Column-major 3x3 matrix, the layout WGSL `mat3x3<f32>` expects.
    pub fn to_cols_array(&self) -> [f32; 9] {
        [
            self.m00 as f32,
            self.m10 as f32,
            0.0,
            self.m01 as f32,
            self.m11 as f32,
            0.0,
            self.m02 as f32,
            self.m12 as f32,
            1.0,
        ]
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn between_rects_maps_corners() {
        let from = Rect::from_xywh(10.0, 20.0, 16.0, 32.0);
        let to = Rect::from_xywh(-1.0, -1.0, 2.0, 2.0);
        let t = AffineTransform::between_rects(&from, &to);

        assert_eq!(t.transform_position(from.top_left()), to.top_left());
        assert_eq!(t.transform_position(from.bottom_right()), to.bottom_right());
        assert_eq!(t.transform_rect(&from), to);
    }

    #[test]
    fn times_applies_right_operand_first() {
        let scale = AffineTransform::with_scale(Vec2::new(2.0, 3.0));
        let translate = AffineTransform::with_translation(Vec2::new(1.0, 1.0));

        let p = Vec2::new(1.0, 1.0);
        assert_eq!(translate.times(&scale).transform_position(p), Vec2::new(3.0, 4.0));
        assert_eq!(scale.times(&translate).transform_position(p), Vec2::new(4.0, 6.0));
    }

    #[test]
    fn transform_rect_normalizes_flips() {
        let flip = AffineTransform::with_scale(Vec2::new(1.0, -1.0));
        let r = flip.transform_rect(&Rect::from_xywh(0.0, 1.0, 4.0, 2.0));
        assert_eq!(r, Rect::from_xywh(0.0, -3.0, 4.0, 2.0));
    }

    #[test]
    fn inverse_round_trips() {
        let t = AffineTransform::between_rects(
            &Rect::from_xywh(3.0, 5.0, 7.0, 11.0),
            &Rect::from_xywh(-2.0, 4.0, 8.0, 16.0),
        );
        let inv = t.inverted().unwrap();
        let p = Vec2::new(13.0, -17.0);
        let q = inv.transform_position(t.transform_position(p));
        assert!((q - p).length() < 1e-9);

        assert!(AffineTransform::with_scale(Vec2::new(0.0, 1.0)).inverted().is_none());
    }

    #[test]
    fn intersection_requires_positive_overlap() {
        let a = Rect::from_xywh(0.0, 0.0, 10.0, 1.0);
        let touching = Rect::from_xywh(10.0, 0.0, 5.0, 1.0);
        let overlapping = Rect::from_xywh(9.5, 0.5, 5.0, 1.0);
        let below = Rect::from_xywh(0.0, 1.0, 10.0, 1.0);

        assert!(!a.has_intersection_with(&touching));
        assert!(!a.has_intersection_with(&below));
        assert!(a.has_intersection_with(&overlapping));
        assert_eq!(
            a.intersect_with(&overlapping),
            Rect::from_xywh(9.5, 0.5, 0.5, 0.5)
        );
        assert!(a.intersect_with(&Rect::from_xywh(20.0, 5.0, 1.0, 1.0)).is_empty());
    }

    #[test]
    fn union_covers_both() {
        let a = Rect::from_xywh(0.0, 0.0, 1.0, 1.0);
        let b = Rect::from_xywh(5.0, 2.0, 1.0, 1.0);
        assert_eq!(a.union_with(&b), Rect::from_xywh(0.0, 0.0, 6.0, 3.0));
    }

    #[rstest]
    #[case::empty(Rect::EMPTY, true)]
    #[case::zero_height(Rect::from_xywh(0.0, 0.0, 5.0, 0.0), true)]
    #[case::zero_width(Rect::from_xywh(3.0, 0.0, 0.0, 5.0), true)]
    #[case::unit(Rect::UNIT, false)]
    fn empty_when_either_dimension_is_zero(#[case] rect: Rect, #[case] empty: bool) {
        assert_eq!(rect.is_empty(), empty);
    }

    #[test]
    fn cols_array_is_column_major() {
        let t = AffineTransform {
            m00: 1.0,
            m01: 2.0,
            m02: 3.0,
            m10: 4.0,
            m11: 5.0,
            m12: 6.0,
        };
        assert_eq!(
            t.to_cols_array(),
            [1.0, 4.0, 0.0, 2.0, 5.0, 0.0, 3.0, 6.0, 1.0]
        );
    }
}
