// polylib.rs — convex polygon (winding) operations and plane clipping
//
// A winding is an ordered loop of points on one plane. Nothing here checks
// convexity; callers build windings from planes or faces and only ever cut
// them, which keeps them convex.

use std::sync::Arc;

use q2wmap_common::bspfile::BspFile;
use q2wmap_common::error::{CapacityError, Error, FormatError, Result};
use q2wmap_common::q_shared::*;
use q2wmap_common::qfiles::DFace;

use crate::stats::WindingStats;

pub const MAX_POINTS_ON_WINDING: usize = 64;

/// Default clip tolerance.
pub const ON_EPSILON: f32 = 0.1;

/// Half extent of the quad produced by `Winding::for_plane`.
pub const BOGUS_RANGE: f32 = 8192.0;

/// Colinear test threshold on the dot product of adjacent edge directions.
const COLINEAR_DOT: f32 = 0.999;

/// Where a whole winding lies relative to a plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindingSide {
    Front,
    Back,
    On,
    Cross,
}

#[derive(Debug)]
pub struct Winding {
    points: Vec<Vec3>,
    stats: Option<Arc<WindingStats>>,
}

impl PartialEq for Winding {
    fn eq(&self, other: &Self) -> bool {
        self.points == other.points
    }
}

impl Clone for Winding {
    fn clone(&self) -> Self {
        self.derive(self.points.clone())
    }
}

impl Drop for Winding {
    fn drop(&mut self) {
        if let Some(stats) = &self.stats {
            stats.free();
        }
    }
}

// ============================================================
// Construction
// ============================================================

impl Winding {
    /// `n` points at the origin.
    pub fn alloc(n: usize) -> Result<Self, CapacityError> {
        Self::from_points(vec![VEC3_ORIGIN; n])
    }

    pub fn from_points(points: Vec<Vec3>) -> Result<Self, CapacityError> {
        CapacityError::check("MAX_POINTS_ON_WINDING", points.len(), MAX_POINTS_ON_WINDING)?;
        Ok(Self {
            points,
            stats: None,
        })
    }

    /// Attach a stats context. Windings derived from this one share it.
    pub fn tracked(mut self, stats: Arc<WindingStats>) -> Self {
        if let Some(old) = self.stats.take() {
            old.free();
        }
        stats.alloc();
        self.stats = Some(stats);
        self
    }

    pub fn stats(&self) -> Option<&Arc<WindingStats>> {
        self.stats.as_ref()
    }

    /// New winding sharing this one's stats context.
    fn derive(&self, points: Vec<Vec3>) -> Self {
        if let Some(stats) = &self.stats {
            stats.alloc();
        }
        Self {
            points,
            stats: self.stats.clone(),
        }
    }

    /// A huge quad lying on `plane`, facing the same way.
    pub fn for_plane(plane: &Plane) -> Result<Self> {
        let normal = plane.normal;

        // find the major axis
        let mut max = -BOGUS_RANGE;
        let mut axis = None;
        for (i, n) in normal.iter().enumerate() {
            let v = n.abs();
            if v > max {
                axis = Some(i);
                max = v;
            }
        }

        let mut vup = VEC3_ORIGIN;
        match axis {
            Some(0) | Some(1) => vup[2] = 1.0,
            Some(_) => vup[0] = 1.0,
            None => return Err(Error::DegeneratePlane { normal }),
        }

        let v = dot_product(&vup, &normal);
        vup = vector_ma(&vup, -v, &normal);
        vector_normalize(&mut vup);

        let org = vector_scale(&normal, plane.dist);
        let vright = cross_product(&vup, &normal);

        let vup = vector_scale(&vup, BOGUS_RANGE);
        let vright = vector_scale(&vright, BOGUS_RANGE);

        // project a really big axis aligned box onto the plane
        let points = vec![
            vector_add(&vector_subtract(&org, &vright), &vup),
            vector_add(&vector_add(&org, &vright), &vup),
            vector_subtract(&vector_add(&org, &vright), &vup),
            vector_subtract(&vector_subtract(&org, &vright), &vup),
        ];

        Ok(Self::from_points(points)?)
    }

    /// Polygon of a face record, with colinear points removed.
    pub fn for_face(bsp: &BspFile, face: &DFace) -> Result<Self> {
        let num_edges = usize::try_from(face.numedges).map_err(|_| FormatError::BadIndex {
            what: "face edge count",
            index: face.numedges as i64,
            count: MAX_POINTS_ON_WINDING,
        })?;
        CapacityError::check("MAX_POINTS_ON_WINDING", num_edges, MAX_POINTS_ON_WINDING)?;

        let mut points = Vec::with_capacity(num_edges);
        for i in 0..num_edges {
            let index = face.firstedge as i64 + i as i64;
            let se = usize::try_from(index)
                .ok()
                .and_then(|i| bsp.face_edges.get(i))
                .copied()
                .ok_or(FormatError::BadIndex {
                    what: "face edge",
                    index,
                    count: bsp.face_edges.len(),
                })?;

            let edge_index = (se as i64).abs();
            let edge = bsp.edges.get(edge_index as usize).ok_or(FormatError::BadIndex {
                what: "edge",
                index: edge_index,
                count: bsp.edges.len(),
            })?;
            let v = if se < 0 { edge.v[1] } else { edge.v[0] };

            let vertex = bsp.vertexes.get(v as usize).ok_or(FormatError::BadIndex {
                what: "vertex",
                index: v as i64,
                count: bsp.vertexes.len(),
            })?;
            points.push(vertex.point);
        }

        let mut w = Self::from_points(points)?;
        w.remove_colinear_points();
        Ok(w)
    }
}

// ============================================================
// Queries
// ============================================================

impl Winding {
    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Same points in the opposite order.
    pub fn reverse(&self) -> Self {
        self.derive(self.points.iter().rev().copied().collect())
    }

    pub fn bounds(&self) -> (Vec3, Vec3) {
        let (mut mins, mut maxs) = clear_bounds();
        for p in &self.points {
            add_point_to_bounds(p, &mut mins, &mut maxs);
        }
        (mins, maxs)
    }

    /// Average of the points; the origin for an empty winding.
    pub fn center(&self) -> Vec3 {
        if self.points.is_empty() {
            return VEC3_ORIGIN;
        }
        let sum = self
            .points
            .iter()
            .fold(VEC3_ORIGIN, |acc, p| vector_add(&acc, p));
        vector_scale(&sum, 1.0 / self.points.len() as f32)
    }

    /// Triangle fan area from the first point.
    pub fn area(&self) -> f32 {
        let Some(p0) = self.points.first() else {
            return 0.0;
        };
        let mut total = 0.0;
        for i in 2..self.points.len() {
            let d1 = vector_subtract(&self.points[i - 1], p0);
            let d2 = vector_subtract(&self.points[i], p0);
            total += 0.5 * vector_length(&cross_product(&d1, &d2));
        }
        total
    }

    /// Plane through the first three points. A winding with fewer points has
    /// no plane and yields a zero normal, as a colinear one does.
    pub fn plane(&self) -> Plane {
        let p = &self.points;
        if p.len() < 3 {
            return Plane::default();
        }
        let v1 = vector_subtract(&p[1], &p[0]);
        let v2 = vector_subtract(&p[2], &p[0]);
        let mut normal = cross_product(&v2, &v1);
        vector_normalize(&mut normal);
        Plane::new(normal, dot_product(&p[0], &normal))
    }

    pub fn on_plane_side(&self, plane: &Plane, epsilon: f32) -> WindingSide {
        let mut front = false;
        let mut back = false;
        for p in &self.points {
            match plane.classify(p, epsilon) {
                Side::Back if front => return WindingSide::Cross,
                Side::Front if back => return WindingSide::Cross,
                Side::Back => back = true,
                Side::Front => front = true,
                Side::On => {}
            }
        }

        if back {
            WindingSide::Back
        } else if front {
            WindingSide::Front
        } else {
            WindingSide::On
        }
    }

    /// Drop points lying on the line through their neighbours.
    pub fn remove_colinear_points(&mut self) {
        let n = self.points.len();
        let kept: Vec<Vec3> = (0..n)
            .filter(|&i| {
                let j = (i + 1) % n;
                let k = (i + n - 1) % n;
                let mut v1 = vector_subtract(&self.points[j], &self.points[i]);
                let mut v2 = vector_subtract(&self.points[i], &self.points[k]);
                vector_normalize(&mut v1);
                vector_normalize(&mut v2);
                dot_product(&v1, &v2) < COLINEAR_DOT
            })
            .map(|i| self.points[i])
            .collect();

        if kept.len() == n {
            return;
        }
        if let Some(stats) = &self.stats {
            stats.removed(n - kept.len());
        }
        self.points = kept;
    }
}

// ============================================================
// Clipping
// ============================================================

/// Per-point distances and sides, with point 0 repeated at the end.
struct Classified {
    dists: Vec<f32>,
    sides: Vec<Side>,
    front: usize,
    back: usize,
}

fn classify(points: &[Vec3], plane: &Plane, epsilon: f32) -> Classified {
    let mut c = Classified {
        dists: Vec::with_capacity(points.len() + 1),
        sides: Vec::with_capacity(points.len() + 1),
        front: 0,
        back: 0,
    };

    for p in points {
        let d = plane.distance(p);
        let side = Side::for_distance(d, epsilon);
        match side {
            Side::Front => c.front += 1,
            Side::Back => c.back += 1,
            Side::On => {}
        }
        c.dists.push(d);
        c.sides.push(side);
    }
    if let (Some(&d), Some(&s)) = (c.dists.first(), c.sides.first()) {
        c.dists.push(d);
        c.sides.push(s);
    }
    c
}

/// Point where edge p1-p2 crosses the plane. Axial components snap to the
/// plane distance exactly.
fn split_point(p1: &Vec3, p2: &Vec3, d1: f32, d2: f32, plane: &Plane) -> Vec3 {
    let dot = d1 / (d1 - d2);
    let mut mid = VEC3_ORIGIN;
    for j in 0..3 {
        mid[j] = if plane.normal[j] == 1.0 {
            plane.dist
        } else if plane.normal[j] == -1.0 {
            -plane.dist
        } else {
            p1[j] + dot * (p2[j] - p1[j])
        };
    }
    mid
}

fn check_points(count: usize, maxpts: usize) -> Result<(), CapacityError> {
    CapacityError::check("points exceeded estimate", count, maxpts)?;
    CapacityError::check("MAX_POINTS_ON_WINDING", count, MAX_POINTS_ON_WINDING)
}

impl Winding {
    /// Split by `plane` into (front, back). A side with no points is `None`;
    /// points within `epsilon` of the plane go to both sides.
    pub fn clip_epsilon(
        &self,
        plane: &Plane,
        epsilon: f32,
    ) -> Result<(Option<Winding>, Option<Winding>), CapacityError> {
        let c = classify(&self.points, plane, epsilon);

        if c.front == 0 {
            return Ok((None, Some(self.clone())));
        }
        if c.back == 0 {
            return Ok((Some(self.clone()), None));
        }

        let n = self.points.len();
        let maxpts = n + 4;
        let mut f = Vec::with_capacity(maxpts);
        let mut b = Vec::with_capacity(maxpts);

        for i in 0..n {
            let p1 = &self.points[i];

            match c.sides[i] {
                Side::On => {
                    f.push(*p1);
                    b.push(*p1);
                    continue;
                }
                Side::Front => f.push(*p1),
                Side::Back => b.push(*p1),
            }

            if c.sides[i + 1] == Side::On || c.sides[i + 1] == c.sides[i] {
                continue;
            }

            let p2 = &self.points[(i + 1) % n];
            let mid = split_point(p1, p2, c.dists[i], c.dists[i + 1], plane);
            f.push(mid);
            b.push(mid);
        }

        check_points(f.len(), maxpts)?;
        check_points(b.len(), maxpts)?;

        Ok((Some(self.derive(f)), Some(self.derive(b))))
    }

    /// Keep only the part in front of `plane`. Returns `None` when nothing is
    /// in front, and `self` untouched when nothing is behind.
    pub fn chop_in_place(self, plane: &Plane, epsilon: f32) -> Result<Option<Winding>, CapacityError> {
        let c = classify(&self.points, plane, epsilon);

        if c.front == 0 {
            return Ok(None);
        }
        if c.back == 0 {
            return Ok(Some(self));
        }

        let n = self.points.len();
        let maxpts = n + 4;
        let mut f = Vec::with_capacity(maxpts);

        for i in 0..n {
            let p1 = &self.points[i];

            match c.sides[i] {
                Side::On => {
                    f.push(*p1);
                    continue;
                }
                Side::Front => f.push(*p1),
                Side::Back => {}
            }

            if c.sides[i + 1] == Side::On || c.sides[i + 1] == c.sides[i] {
                continue;
            }

            let p2 = &self.points[(i + 1) % n];
            f.push(split_point(p1, p2, c.dists[i], c.dists[i + 1], plane));
        }

        check_points(f.len(), maxpts)?;
        Ok(Some(self.derive(f)))
    }

    /// Front fragment of a clip at `ON_EPSILON`. Consumes the input.
    pub fn chop(self, plane: &Plane) -> Result<Option<Winding>, CapacityError> {
        let (front, _back) = self.clip_epsilon(plane, ON_EPSILON)?;
        Ok(front)
    }
}

// =============================================================================
// Tests
// =============================================================================
