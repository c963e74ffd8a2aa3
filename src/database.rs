///! Welded point and plane storage

use crate::{config::CompileConfig, geom::{BoundBox, PlaneEq, PlaneSide}, math::Vec3d};

/// Count of hash buckets for both points and planes
const HASH_SIZE: usize = 1 << 12;

impl_id!(PointId);
impl_id!(PlaneId);

impl PlaneId {
    /// Paired plane facing opposite direction
    pub fn inverse(self) -> Self {
        Self::from_index(self.into_index() ^ 1)
    }

    /// Check if planes are the same or paired
    pub fn is_coplanar(self, other: PlaneId) -> bool {
        (self.into_index() & !1) == (other.into_index() & !1)
    }

    /// Check if plane is the first (forward) one of its pair
    pub fn is_forward(self) -> bool {
        self.into_index() & 1 == 0
    }
}

/// Bucket of point hash
fn point_hash(point: Vec3d) -> usize {
    let x = ((point.x as i32) >> 5) as u32 & 0xF;
    let y = ((point.y as i32) >> 5) as u32 & 0xF;
    let z = ((point.z as i32) >> 5) as u32 & 0xF;

    ((x << 8) | (y << 4) | z) as usize
}

/// Bucket of plane hash
fn plane_hash(normal: Vec3d, dist: f64) -> usize {
    let mul = normal.x.abs().max(normal.y.abs()).max(normal.z.abs());
    let mul = (mul * 100.0 + 0.5).floor() / 100.0;
    let val = mul * ((dist.abs() * 100.0 + 0.5).floor() / 100.0);

    (val as u32 as usize) % HASH_SIZE
}

/// Deduplicating storage of every point and plane of a single compile.
/// Indices are never invalidated, there is no removal.
pub struct GeometryDatabase {
    /// Welding distance
    epsilon: f64,

    /// Weld points by distance
    hash_points: bool,

    /// Weld planes by threshold
    hash_planes: bool,

    /// Plane normal welding threshold
    normal_threshold: f64,

    /// Plane distance welding threshold
    distance_threshold: f64,

    /// Point set
    points: Vec<Vec3d>,

    /// Point hash buckets, newer entries last
    point_buckets: Vec<Vec<PointId>>,

    /// Plane set, forward/backward pairs
    planes: Vec<PlaneEq>,

    /// Plane hash buckets, newer entries last
    plane_buckets: Vec<Vec<PlaneId>>,

    /// Bounding box of every accepted brush vertex
    pub bounds: BoundBox,
}

impl GeometryDatabase {
    /// Build empty database
    pub fn new(config: &CompileConfig) -> Self {
        Self {
            epsilon: config.plane_epsilon,
            hash_points: config.hash_points,
            hash_planes: config.hash_planes,
            normal_threshold: config.plane_normal_threshold,
            distance_threshold: config.plane_distance_threshold,
            points: Vec::new(),
            point_buckets: vec![Vec::new(); HASH_SIZE],
            planes: Vec::new(),
            plane_buckets: vec![Vec::new(); HASH_SIZE],
            bounds: BoundBox::empty(),
        }
    }

    /// Welding distance
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Insert point, returns index of already present point if any is close enough
    pub fn insert_point(&mut self, point: Vec3d) -> PointId {
        let base_hash = point_hash(point);

        if !self.hash_points {
            for id in self.point_buckets[base_hash].iter().rev() {
                if self.points[id.into_index()] == point {
                    return *id;
                }
            }

            let id = PointId::from_index(self.points.len());
            self.points.push(point);
            self.point_buckets[base_hash].push(id);
            return id;
        }

        let epsilon = self.epsilon;

        for id in self.point_buckets[base_hash].iter().rev() {
            let existing = self.points[id.into_index()];

            if true
                && (existing.x - point.x).abs() < epsilon
                && (existing.y - point.y).abs() < epsilon
                && (existing.z - point.z).abs() < epsilon
                && (existing - point).length() < epsilon
            {
                return *id;
            }
        }

        // register the point in every bucket its epsilon cube touches
        let id = PointId::from_index(self.points.len());
        let offsets = [-epsilon, 0.0, epsilon];
        let mut bins = Vec::<usize>::with_capacity(27);

        for dx in offsets {
            for dy in offsets {
                for dz in offsets {
                    let bin = point_hash(point + Vec3d::new(dx, dy, dz));

                    if !bins.contains(&bin) {
                        bins.push(bin);
                    }
                }
            }
        }

        for bin in bins {
            self.point_buckets[bin].push(id);
        }

        self.points.push(point);

        id
    }

    /// Get point by id
    pub fn point(&self, id: PointId) -> Vec3d {
        self.points[id.into_index()]
    }

    /// Count of unique points
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Insert plane, normal need not be normalized. Inserts the negated plane
    /// as well, it always gets the index `result ^ 1`.
    pub fn insert_plane(&mut self, normal: Vec3d, dist: f64) -> PlaneId {
        let len = normal.length();
        let normal = normal / len;
        let dist = dist / len;

        let hash = plane_hash(normal, dist);

        for id in self.plane_buckets[hash].iter().rev() {
            let existing = &self.planes[id.into_index()];

            let matches = if self.hash_planes {
                (normal ^ existing.normal) > self.normal_threshold
                    && (dist - existing.dist).abs() < self.distance_threshold
            } else {
                normal == existing.normal && dist == existing.dist
            };

            if matches {
                return *id;
            }
        }

        let id = PlaneId::from_index(self.planes.len());
        self.planes.push(PlaneEq { normal, dist });
        self.plane_buckets[hash].push(id);

        let negative_hash = plane_hash(-normal, -dist);
        self.planes.push(PlaneEq { normal: -normal, dist: -dist });
        self.plane_buckets[negative_hash].push(id.inverse());

        id
    }

    /// Insert plane given by equation
    pub fn insert_plane_eq(&mut self, plane: PlaneEq) -> PlaneId {
        self.insert_plane(plane.normal, plane.dist)
    }

    /// Get plane by id
    pub fn plane(&self, id: PlaneId) -> &PlaneEq {
        &self.planes[id.into_index()]
    }

    /// Count of planes, pairs included
    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    /// Classify point against plane with welding tolerance
    pub fn side(&self, plane: PlaneId, point: Vec3d) -> PlaneSide {
        self.planes[plane.into_index()].side(point, self.epsilon)
    }

    /// Classify stored point against plane
    pub fn point_side(&self, plane: PlaneId, point: PointId) -> PlaneSide {
        self.side(plane, self.point(point))
    }

    /// Check if three stored points are colinear within welding tolerance
    pub fn points_colinear(&self, p1: PointId, p2: PointId, p3: PointId) -> bool {
        crate::geom::points_colinear(self.point(p1), self.point(p2), self.point(p3), self.epsilon)
    }
}


// database.rs
