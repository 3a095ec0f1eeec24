// q_shared.rs — vector math and plane types shared by the map tools

use crate::qfiles::{DPlane, PLANE_ANYX, PLANE_ANYY, PLANE_ANYZ, PLANE_X, PLANE_Y, PLANE_Z};

// ============================================================
// Basic types
// ============================================================

pub type Vec3 = [f32; 3];

pub const VEC3_ORIGIN: Vec3 = [0.0, 0.0, 0.0];

// ============================================================
// MATHLIB — Vector operations
// ============================================================

#[inline]
pub fn dot_product(a: &Vec3, b: &Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn vector_subtract(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn vector_add(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

/// veca + scale * vecb
#[inline]
pub fn vector_ma(veca: &Vec3, scale: f32, vecb: &Vec3) -> Vec3 {
    [
        veca[0] + scale * vecb[0],
        veca[1] + scale * vecb[1],
        veca[2] + scale * vecb[2],
    ]
}

pub fn vector_scale(v: &Vec3, scale: f32) -> Vec3 {
    [v[0] * scale, v[1] * scale, v[2] * scale]
}

pub fn vector_length(v: &Vec3) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Normalize in place, returns original length.
pub fn vector_normalize(v: &mut Vec3) -> f32 {
    let length = vector_length(v);
    if length != 0.0 {
        let ilength = 1.0 / length;
        v[0] *= ilength;
        v[1] *= ilength;
        v[2] *= ilength;
    }
    length
}

pub fn cross_product(v1: &Vec3, v2: &Vec3) -> Vec3 {
    [
        v1[1] * v2[2] - v1[2] * v2[1],
        v1[2] * v2[0] - v1[0] * v2[2],
        v1[0] * v2[1] - v1[1] * v2[0],
    ]
}

// ============================================================
// Bounds
// ============================================================

/// Sentinel used to seed bounds accumulation.
pub const BOUNDS_SEED: f32 = 99999.0;

pub fn clear_bounds() -> (Vec3, Vec3) {
    ([BOUNDS_SEED; 3], [-BOUNDS_SEED; 3])
}

pub fn add_point_to_bounds(v: &Vec3, mins: &mut Vec3, maxs: &mut Vec3) {
    for i in 0..3 {
        if v[i] < mins[i] {
            mins[i] = v[i];
        }
        if v[i] > maxs[i] {
            maxs[i] = v[i];
        }
    }
}

// ============================================================
// Plane
// ============================================================

/// Point classification against a plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Front,
    Back,
    On,
}

impl Side {
    /// Side for a signed plane distance, `On` within `epsilon`.
    #[inline]
    pub fn for_distance(d: f32, epsilon: f32) -> Self {
        if d > epsilon {
            Side::Front
        } else if d < -epsilon {
            Side::Back
        } else {
            Side::On
        }
    }
}

/// Oriented plane: unit normal and distance from the origin along it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Plane {
    pub normal: Vec3,
    pub dist: f32,
}

impl Plane {
    pub const fn new(normal: Vec3, dist: f32) -> Self {
        Self { normal, dist }
    }

    /// Signed distance of `p` from the plane.
    #[inline]
    pub fn distance(&self, p: &Vec3) -> f32 {
        dot_product(p, &self.normal) - self.dist
    }

    pub fn classify(&self, p: &Vec3, epsilon: f32) -> Side {
        Side::for_distance(self.distance(p), epsilon)
    }

    /// Same plane facing the other way.
    pub fn flipped(&self) -> Self {
        Self {
            normal: [-self.normal[0], -self.normal[1], -self.normal[2]],
            dist: -self.dist,
        }
    }

    /// On-disk record for this plane.
    pub fn to_dplane(&self) -> DPlane {
        DPlane {
            normal: self.normal,
            dist: self.dist,
            plane_type: plane_type_for_normal(&self.normal),
        }
    }
}

impl From<&DPlane> for Plane {
    fn from(p: &DPlane) -> Self {
        Plane::new(p.normal, p.dist)
    }
}

/// PLANE_X..PLANE_Z for axial normals, PLANE_ANY* keyed on the major axis otherwise.
pub fn plane_type_for_normal(normal: &Vec3) -> i32 {
    if normal[0] == 1.0 || normal[0] == -1.0 {
        return PLANE_X;
    }
    if normal[1] == 1.0 || normal[1] == -1.0 {
        return PLANE_Y;
    }
    if normal[2] == 1.0 || normal[2] == -1.0 {
        return PLANE_Z;
    }

    let ax = normal[0].abs();
    let ay = normal[1].abs();
    let az = normal[2].abs();

    if ax >= ay && ax >= az {
        PLANE_ANYX
    } else if ay >= ax && ay >= az {
        PLANE_ANYY
    } else {
        PLANE_ANYZ
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_of_axes() {
        assert_eq!(cross_product(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]), [0.0, 0.0, 1.0]);
        assert_eq!(cross_product(&[0.0, 1.0, 0.0], &[1.0, 0.0, 0.0]), [0.0, 0.0, -1.0]);
    }

    #[test]
    fn normalize_returns_length() {
        let mut v = [3.0, 4.0, 0.0];
        assert_eq!(vector_normalize(&mut v), 5.0);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn normalize_zero_is_noop() {
        let mut v = VEC3_ORIGIN;
        assert_eq!(vector_normalize(&mut v), 0.0);
        assert_eq!(v, VEC3_ORIGIN);
    }

    #[test]
    fn bounds_accumulate() {
        let (mut mins, mut maxs) = clear_bounds();
        add_point_to_bounds(&[1.0, -2.0, 3.0], &mut mins, &mut maxs);
        add_point_to_bounds(&[-1.0, 5.0, 0.0], &mut mins, &mut maxs);
        assert_eq!(mins, [-1.0, -2.0, 0.0]);
        assert_eq!(maxs, [1.0, 5.0, 3.0]);
    }

    #[test]
    fn plane_classify_with_epsilon() {
        let plane = Plane::new([0.0, 0.0, 1.0], 10.0);
        assert_eq!(plane.classify(&[0.0, 0.0, 10.5], 0.1), Side::Front);
        assert_eq!(plane.classify(&[0.0, 0.0, 9.5], 0.1), Side::Back);
        assert_eq!(plane.classify(&[0.0, 0.0, 10.05], 0.1), Side::On);
    }

    #[test]
    fn side_at_epsilon_is_on() {
        assert_eq!(Side::for_distance(0.5, 0.5), Side::On);
        assert_eq!(Side::for_distance(-0.5, 0.5), Side::On);
        assert_eq!(Side::for_distance(0.51, 0.5), Side::Front);
        assert_eq!(Side::for_distance(-0.51, 0.5), Side::Back);
        assert_eq!(Side::for_distance(0.0, 0.0), Side::On);
    }

    #[test]
    fn plane_flip() {
        let plane = Plane::new([0.0, 1.0, 0.0], 4.0).flipped();
        assert_eq!(plane.normal, [-0.0, -1.0, -0.0]);
        assert_eq!(plane.dist, -4.0);
        assert_eq!(plane.distance(&[0.0, -8.0, 0.0]), 4.0);
    }

    #[test]
    fn plane_types() {
        assert_eq!(plane_type_for_normal(&[0.0, -1.0, 0.0]), PLANE_Y);
        assert_eq!(plane_type_for_normal(&[0.6, 0.8, 0.0]), PLANE_ANYY);
        assert_eq!(plane_type_for_normal(&[0.0, 0.6, -0.8]), PLANE_ANYZ);
        let d = Plane::new([1.0, 0.0, 0.0], 64.0).to_dplane();
        assert_eq!(d.plane_type, PLANE_X);
        assert_eq!(Plane::from(&d).dist, 64.0);
    }
}
