///! Basic geometric primitives shared by every compiler stage

use crate::math::Vec3d;

/// Determinant threshold used by plane triple intersection
pub const PLANE_INTERSECTION_EPSILON: f64 = 1e-7;

/// Plane equation
///
/// ## Equation
/// Point `p` lies on plane if `normal ^ p + dist == 0`. Positive values mean front side.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PlaneEq {
    /// Plane normal
    pub normal: Vec3d,

    /// Signed plane constant
    pub dist: f64,
}

/// Relation of plane and point
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PlaneSide {
    /// Point is located behind plane
    Back,

    /// Point is located on plane
    On,

    /// Point is located in front of plane
    Front,
}

impl PlaneEq {
    /// Construct plane from three points. Returns `None` for colinear points.
    ///
    /// Front side is the one points are listed clockwise from.
    pub fn from_points(p1: Vec3d, p2: Vec3d, p3: Vec3d) -> Option<Self> {
        let normal = (p3 - p1) % (p2 - p1);

        if normal.x == 0.0 && normal.y == 0.0 && normal.z == 0.0 {
            return None;
        }

        Some(Self {
            normal,
            dist: -(normal ^ p1),
        })
    }

    /// Signed distance from plane to point
    pub fn distance(&self, point: Vec3d) -> f64 {
        (self.normal ^ point) + self.dist
    }

    /// Classify point with epsilon tolerance
    pub fn side(&self, point: Vec3d, epsilon: f64) -> PlaneSide {
        let distance = self.distance(point);

        if distance < -epsilon {
            PlaneSide::Back
        } else if distance > epsilon {
            PlaneSide::Front
        } else {
            PlaneSide::On
        }
    }

    /// Plane facing opposite direction
    pub fn negate(self) -> Self {
        Self {
            normal: -self.normal,
            dist: -self.dist,
        }
    }

    /// Point of segment (start, end) where it crosses the plane
    pub fn segment_intersection(&self, start: Vec3d, end: Vec3d) -> Vec3d {
        let vector = end - start;
        let t = -(self.distance(start) / (self.normal ^ vector));

        start + vector * t
    }

    /// Check if exactly two normal components are zero
    pub fn is_axial(&self) -> bool {
        let zero_count = [self.normal.x, self.normal.y, self.normal.z]
            .into_iter()
            .filter(|c| *c == 0.0)
            .count();

        zero_count == 2
    }

    /// Index of normal's dominant component
    pub fn dominant_axis(&self) -> usize {
        let (ax, ay, az) = (self.normal.x.abs(), self.normal.y.abs(), self.normal.z.abs());

        if ax >= ay && ax >= az {
            0
        } else if ay >= az {
            1
        } else {
            2
        }
    }
}

/// Intersect three planes by Cramer's rule, `None` for (nearly) parallel triples
pub fn intersect_planes(p1: &PlaneEq, p2: &PlaneEq, p3: &PlaneEq) -> Option<Vec3d> {
    let bc = p2.normal.y * p3.normal.z - p3.normal.y * p2.normal.z;
    let ac = p2.normal.x * p3.normal.z - p3.normal.x * p2.normal.z;
    let ab = p2.normal.x * p3.normal.y - p3.normal.x * p2.normal.y;
    let det = p1.normal.x * bc - p1.normal.y * ac + p1.normal.z * ab;

    if det.abs() < PLANE_INTERSECTION_EPSILON {
        return None;
    }

    let dc = p2.dist * p3.normal.z - p3.dist * p2.normal.z;
    let db = p2.dist * p3.normal.y - p3.dist * p2.normal.y;
    let ad = p3.dist * p2.normal.x - p2.dist * p3.normal.x;
    let det_inv = 1.0 / det;

    Some(Vec3d::new(
        (p1.normal.y * dc - p1.dist * bc - p1.normal.z * db) * det_inv,
        (p1.dist * ac - p1.normal.x * dc - p1.normal.z * ad) * det_inv,
        (p1.normal.y * ad + p1.normal.x * db - p1.dist * ab) * det_inv,
    ))
}

/// Check if `p3` lies within `epsilon` of line (p1, p2). Coincident `p1`/`p2` count as colinear.
pub fn points_colinear(p1: Vec3d, p2: Vec3d, p3: Vec3d, epsilon: f64) -> bool {
    let f = p2.x - p1.x;
    let g = p2.y - p1.y;
    let h = p2.z - p1.z;

    let denom = f * f + g * g + h * h;
    if denom < epsilon * epsilon {
        return true;
    }

    let xj0 = p3.x - p1.x;
    let yj0 = p3.y - p1.y;
    let zj0 = p3.z - p1.z;

    let fygx = f * yj0 - g * xj0;
    let fzhx = f * zj0 - h * xj0;
    let gzhy = g * zj0 - h * yj0;

    let v1 = g * fygx + h * fzhx;
    let v2 = h * gzhy - f * fygx;
    let v3 = -f * fzhx - g * gzhy;

    let dist = (v1 * v1 + v2 * v2 + v3 * v3).sqrt() / denom;

    dist < epsilon
}

/// Bounding box
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BoundBox {
    /// Minimal corner
    pub min: Vec3d,

    /// Maximal corner
    pub max: Vec3d,
}

impl BoundBox {
    /// 'Empty' bounding box, any point extends it
    pub fn empty() -> Self {
        Self {
            min: Vec3d::new(1e10, 1e10, 1e10),
            max: Vec3d::new(-1e10, -1e10, -1e10),
        }
    }

    /// Check if box contains no points
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Extend box by point
    pub fn add_point(&mut self, point: Vec3d) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Calculate common bounding box for some point set
    pub fn for_points(iter: impl Iterator<Item = Vec3d>) -> Self {
        let mut result = Self::empty();

        for point in iter {
            result.add_point(point);
        }

        result
    }

    /// Grow box by `delta` in every direction
    pub fn extend(self, delta: f64) -> Self {
        Self {
            min: self.min - delta,
            max: self.max + delta,
        }
    }

    /// Box center
    pub fn center(&self) -> Vec3d {
        (self.min + self.max) / 2.0
    }

    /// The 8 box corners
    pub fn corners(&self) -> [Vec3d; 8] {
        let (min, max) = (self.min, self.max);

        [
            Vec3d::new(min.x, min.y, min.z),
            Vec3d::new(max.x, min.y, min.z),
            Vec3d::new(max.x, min.y, max.z),
            Vec3d::new(min.x, min.y, max.z),
            Vec3d::new(min.x, max.y, min.z),
            Vec3d::new(max.x, max.y, min.z),
            Vec3d::new(max.x, max.y, max.z),
            Vec3d::new(min.x, max.y, max.z),
        ]
    }

    /// Corner pairs forming box edges, indices into `corners`
    pub const EDGES: [(usize, usize); 12] = [
        (0, 1), (1, 2), (2, 3), (3, 0),
        (4, 5), (5, 6), (6, 7), (7, 4),
        (3, 7), (0, 4), (1, 5), (2, 6),
    ];
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use super::*;

    #[test]
    fn plane_from_points_faces_clockwise_side() {
        // counter-clockwise seen from +z, so the plane faces -z
        let plane = PlaneEq::from_points(
            Vec3d::new(0.0, 0.0, 0.0),
            Vec3d::new(1.0, 0.0, 0.0),
            Vec3d::new(0.0, 1.0, 0.0),
        ).expect("non-degenerate plane");

        assert!(plane.normal.z < 0.0);
        assert_eq!(plane.side(Vec3d::new(0.0, 0.0, -1.0), 1e-4), PlaneSide::Front);
        assert_eq!(plane.side(Vec3d::new(5.0, 5.0, 0.0), 1e-4), PlaneSide::On);
    }

    #[test]
    fn colinear_points_give_no_plane() {
        assert!(PlaneEq::from_points(
            Vec3d::new(0.0, 0.0, 0.0),
            Vec3d::new(1.0, 1.0, 1.0),
            Vec3d::new(2.0, 2.0, 2.0),
        ).is_none());
    }

    #[test]
    fn axis_planes_intersect_at_corner() {
        let px = PlaneEq { normal: Vec3d::new(1.0, 0.0, 0.0), dist: -3.0 };
        let py = PlaneEq { normal: Vec3d::new(0.0, 1.0, 0.0), dist: -4.0 };
        let pz = PlaneEq { normal: Vec3d::new(0.0, 0.0, 1.0), dist: 5.0 };

        let point = intersect_planes(&px, &py, &pz).expect("planes are not parallel");

        assert_relative_eq!(point.x, 3.0);
        assert_relative_eq!(point.y, 4.0);
        assert_relative_eq!(point.z, -5.0);

        assert!(intersect_planes(&px, &px.negate(), &pz).is_none());
    }

    #[test]
    fn colinearity_test() {
        let a = Vec3d::new(0.0, 0.0, 0.0);
        let b = Vec3d::new(10.0, 0.0, 0.0);

        assert!(points_colinear(a, b, Vec3d::new(5.0, 0.00001, 0.0), 1e-4));
        assert!(!points_colinear(a, b, Vec3d::new(5.0, 1.0, 0.0), 1e-4));
        assert!(points_colinear(a, a, Vec3d::new(5.0, 1.0, 0.0), 1e-4));
    }

    #[test]
    fn axial_planes() {
        assert!(PlaneEq { normal: Vec3d::new(0.0, -1.0, 0.0), dist: 0.0 }.is_axial());
        assert!(!PlaneEq { normal: Vec3d::new(0.0, 0.6, 0.8), dist: 0.0 }.is_axial());
    }
}

// geom.rs
