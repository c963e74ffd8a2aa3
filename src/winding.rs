///! Polygons over welded points and clipping primitives over them

use bitflags::bitflags;
use crate::{
    brush::BrushId,
    bsp::{zone::{Zone, ZoneId}, NodeId},
    database::{GeometryDatabase, PlaneId, PointId},
    geom::{BoundBox, PlaneSide},
    math::Vec3d,
};

/// Maximal count of points of exported polygon
pub const MAX_WINDING_POINTS: usize = 32;

bitflags! {
    /// Set of sides winding points lie on
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct SideFlags: u32 {
        /// Some point is on plane (or winding is coplanar)
        const ON = 1;

        /// Some point is in front of plane
        const FRONT = 2;

        /// Some point is behind plane
        const BACK = 4;
    }
}

/// Closed polygon loop. Points are listed clockwise seen from the front of the plane.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Winding {
    /// Polygon points
    pub points: Vec<PointId>,

    /// BSP nodes (solid leaves) polygon was classified against
    pub solid_nodes: Vec<NodeId>,

    /// Zones polygon touches
    pub zone_ids: Vec<ZoneId>,

    /// Brush polygon originates from
    pub brush_id: Option<BrushId>,
}

impl Winding {
    /// Construct winding with no bookkeeping
    pub fn from_points(points: Vec<PointId>) -> Self {
        Self {
            points,
            ..Default::default()
        }
    }

    /// Count of points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if winding is clipped away
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Copy of winding with node and zone sets dropped
    pub fn stripped(&self) -> Self {
        Self {
            points: self.points.clone(),
            brush_id: self.brush_id,
            ..Default::default()
        }
    }

    /// Positions of winding points
    pub fn positions<'a>(&'a self, db: &'a GeometryDatabase) -> impl Iterator<Item = Vec3d> + 'a {
        self.points.iter().map(|id| db.point(*id))
    }

    /// Add zone to zone set
    pub fn insert_zone(&mut self, zone: ZoneId) {
        if !self.zone_ids.contains(&zone) {
            self.zone_ids.push(zone);
        }
    }

    /// Add node to solid node set
    pub fn insert_solid_node(&mut self, node: NodeId) {
        if !self.solid_nodes.contains(&node) {
            self.solid_nodes.push(node);
        }
    }

    /// Clip winding by plane, keeping the part in front of it. Intersection points
    /// are inserted into the database. Winding becomes empty if nothing is in front
    /// of the plane or the rest is degenerate.
    ///
    /// Returns true if winding was modified.
    pub fn clip_front(&mut self, db: &mut GeometryDatabase, plane: PlaneId) -> bool {
        let sides = self.points
            .iter()
            .map(|point| db.point_side(plane, *point))
            .collect::<Vec<_>>();

        let Some(start) = sides.iter().position(|side| *side == PlaneSide::Front) else {
            self.points.clear();
            return true;
        };

        if !sides.contains(&PlaneSide::Back) {
            return false;
        }

        let plane_eq = *db.plane(plane);
        let count = self.points.len();
        let mut result = Vec::<PointId>::with_capacity(count + 2);

        for offset in 0..count {
            let index = (start + offset) % count;
            let next = (index + 1) % count;

            if sides[index] != PlaneSide::Back {
                result.push(self.points[index]);
            }

            let crosses = false
                || (sides[index] == PlaneSide::Front && sides[next] == PlaneSide::Back)
                || (sides[index] == PlaneSide::Back && sides[next] == PlaneSide::Front);

            if crosses {
                let intersection = plane_eq.segment_intersection(
                    db.point(self.points[index]),
                    db.point(self.points[next]),
                );
                result.push(db.insert_point(intersection));
            }
        }

        // welding may merge neighbours
        result.dedup();
        while result.len() > 1 && result.first() == result.last() {
            result.pop();
        }

        if result.len() < 3 {
            result.clear();
        }

        self.points = result;

        true
    }

    /// Classify winding lying on `winding_plane` against `plane`
    pub fn which_side(&self, db: &GeometryDatabase, winding_plane: PlaneId, plane: PlaneId) -> SideFlags {
        if winding_plane.is_coplanar(plane) {
            return SideFlags::ON;
        }

        self.point_sides(db, plane)
    }

    /// Union of sides of every winding point
    pub fn point_sides(&self, db: &GeometryDatabase, plane: PlaneId) -> SideFlags {
        let mut flags = SideFlags::empty();

        for point in &self.points {
            flags |= match db.point_side(plane, *point) {
                PlaneSide::On => SideFlags::ON,
                PlaneSide::Front => SideFlags::FRONT,
                PlaneSide::Back => SideFlags::BACK,
            };
        }

        flags
    }

    /// Check if windings are the same point loop, up to rotation
    pub fn is_equivalent(&self, other: &Winding) -> bool {
        if self.points.len() != other.points.len() {
            return false;
        }

        let Some(first) = self.points.first() else {
            return true;
        };

        let Some(offset) = other.points.iter().position(|point| point == first) else {
            return false;
        };

        let count = self.points.len();

        (0..count).all(|index| self.points[index] == other.points[(index + offset) % count])
    }

    /// Polygon area
    pub fn surface_area(&self, db: &GeometryDatabase, plane: PlaneId) -> f64 {
        let count = self.points.len();
        let mut area_normal = Vec3d::zero();

        for index in 0..count {
            let next = (index + 1) % count;

            area_normal += db.point(self.points[index]) % db.point(self.points[next]);
        }

        (db.plane(plane).normal ^ area_normal).abs() * 0.5
    }

    /// Find edge (i, i + 1) of self present reversed in `other`, returns (i, j) with
    /// `other[j] == self[i + 1]`
    fn shared_edge(&self, other: &Winding) -> Option<(usize, usize)> {
        let (one_count, two_count) = (self.points.len(), other.points.len());

        for i in 0..one_count {
            let edge_start = self.points[(i + 1) % one_count];
            let edge_end = self.points[i];

            for j in 0..two_count {
                if other.points[j] == edge_start && other.points[(j + 1) % two_count] == edge_end {
                    return Some((i, j));
                }
            }
        }

        None
    }

    /// Check if windings may be merged into one
    pub fn can_collapse(&self, other: &Winding, zones: &[Zone]) -> bool {
        if self.points.len() < 3 || other.points.len() < 3 {
            return false;
        }

        let (Some(first), Some(second)) = (self.zone_ids.first(), other.zone_ids.first()) else {
            return false;
        };

        if zones[first.into_index()].ambient_lit != zones[second.into_index()].ambient_lit {
            return false;
        }

        self.shared_edge(other).is_some()
    }

    /// Merge `from` into self across their shared edge. Fails (leaving self untouched)
    /// if windings share no edge or the merged polygon is not convex.
    pub fn collapse(&mut self, db: &GeometryDatabase, from: &Winding, zones: &[Zone]) -> bool {
        if !self.can_collapse(from, zones) {
            return false;
        }

        let Some((one_start, two_start)) = self.shared_edge(from) else {
            return false;
        };

        let (one_count, two_count) = (self.points.len(), from.points.len());
        let mut merged = Vec::<PointId>::with_capacity(one_count + two_count);

        merged.extend_from_slice(&self.points[..=one_start]);

        let mut index = (two_start + 2) % two_count;
        while index != two_start {
            merged.push(from.points[index]);
            index = (index + 1) % two_count;
        }

        let mut index = (one_start + 1) % one_count;
        while index > 0 {
            merged.push(self.points[index]);
            index = (index + 1) % one_count;
        }

        // drop colinear middle points
        let mut index = 0;
        while index < merged.len() {
            let count = merged.len();
            let (i1, i2) = ((index + 1) % count, (index + 2) % count);

            if db.points_colinear(merged[index], merged[i1], merged[i2]) {
                merged.remove(i1);
            }

            index += 1;
        }

        if merged.len() < 3 || merged.len() > MAX_WINDING_POINTS {
            return false;
        }

        let count = merged.len();
        let mut reference = Vec3d::zero();

        for i in 0..count {
            let j = (i + 1) % count;
            let k = (i + 2) % count;

            let center = db.point(merged[j]);
            let cross = (db.point(merged[i]) - center) % (db.point(merged[k]) - center);

            if i == 0 {
                reference = cross;
            } else if (reference ^ cross) < 0.0 {
                return false;
            }
        }

        self.points = merged;

        for node in &from.solid_nodes {
            self.insert_solid_node(*node);
        }
        for zone in &from.zone_ids {
            self.insert_zone(*zone);
        }

        true
    }

    /// Order unordered polygon points (clockwise around `normal`). Fails for
    /// less than 3 or more than `MAX_WINDING_POINTS` points.
    pub fn create_base(db: &GeometryDatabase, points: &[PointId], normal: Vec3d) -> Option<Winding> {
        if points.len() < 3 {
            log::debug!("bad brush face, less than 3 points");
            return None;
        }
        if points.len() > MAX_WINDING_POINTS {
            log::debug!("bad brush face, more than {} points", MAX_WINDING_POINTS);
            return None;
        }

        order_around_centroid(db, points, normal).map(Winding::from_points)
    }

    /// Build polygon of plane clipped to box
    pub fn create_bounded(db: &mut GeometryDatabase, bounds: &BoundBox, plane: PlaneId) -> Option<Winding> {
        let plane_eq = *db.plane(plane);
        let corners = bounds.corners();
        let epsilon = db.epsilon();
        let sides = corners.map(|corner| plane_eq.side(corner, epsilon));

        let mut points = Vec::<PointId>::new();

        for (corner, side) in corners.iter().zip(sides.iter()) {
            if *side == PlaneSide::On {
                let id = db.insert_point(*corner);
                if !points.contains(&id) {
                    points.push(id);
                }
            }
        }

        for (start, end) in BoundBox::EDGES {
            let crosses = false
                || (sides[start] == PlaneSide::Back && sides[end] == PlaneSide::Front)
                || (sides[start] == PlaneSide::Front && sides[end] == PlaneSide::Back);

            if crosses {
                let id = db.insert_point(plane_eq.segment_intersection(corners[start], corners[end]));
                if !points.contains(&id) {
                    points.push(id);
                }
            }
        }

        if points.len() < 3 {
            return None;
        }

        order_around_centroid(db, &points, plane_eq.normal).map(Winding::from_points)
    }
}

/// Sort points around their centroid, starting from the last one
fn order_around_centroid(db: &GeometryDatabase, points: &[PointId], normal: Vec3d) -> Option<Vec<PointId>> {
    let centroid = points
        .iter()
        .fold(Vec3d::zero(), |sum, id| sum + db.point(*id))
        / points.len() as f64;

    let mut rest = points.to_vec();
    let mut ordered = vec![rest.pop()?];

    while !rest.is_empty() {
        let current = (db.point(*ordered.last()?) - centroid).normalized();
        let mut best: Option<(usize, f64)> = None;

        for (index, id) in rest.iter().enumerate() {
            let test = (db.point(*id) - centroid).normalized();

            if ((current % test) ^ normal) < 0.0 {
                let dot = test ^ current;

                if best.map_or(true, |(_, best_dot)| dot > best_dot) {
                    best = Some((index, dot));
                }
            }
        }

        let (index, _) = best?;
        ordered.push(rest.remove(index));
    }

    Some(ordered)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use crate::config::CompileConfig;
    use super::*;

    fn square(db: &mut GeometryDatabase, x0: f64, x1: f64) -> Winding {
        // clockwise seen from +z
        let points = [
            Vec3d::new(x0, 0.0, 0.0),
            Vec3d::new(x0, 10.0, 0.0),
            Vec3d::new(x1, 10.0, 0.0),
            Vec3d::new(x1, 0.0, 0.0),
        ];

        Winding::from_points(points.into_iter().map(|p| db.insert_point(p)).collect())
    }

    fn lit_zone() -> Vec<Zone> {
        vec![Zone { ambient_lit: true, ..Default::default() }]
    }

    #[test]
    fn clip_keeps_front_half() {
        let mut db = GeometryDatabase::new(&CompileConfig::default());
        let mut winding = square(&mut db, 0.0, 10.0);
        let plane = db.insert_plane(Vec3d::new(-1.0, 0.0, 0.0), 5.0);

        assert!(winding.clip_front(&mut db, plane));
        assert_eq!(winding.len(), 4);

        for point in winding.positions(&db) {
            assert!(point.x <= 5.0 + 1e-9);
        }

        let floor = db.insert_plane(Vec3d::new(0.0, 0.0, 1.0), 0.0);
        assert_relative_eq!(winding.surface_area(&db, floor), 50.0, epsilon = 1e-6);
    }

    #[test]
    fn clip_behind_empties_winding() {
        let mut db = GeometryDatabase::new(&CompileConfig::default());
        let mut winding = square(&mut db, 0.0, 10.0);
        let plane = db.insert_plane(Vec3d::new(1.0, 0.0, 0.0), -20.0);

        assert!(winding.clip_front(&mut db, plane));
        assert!(winding.is_empty());
    }

    #[test]
    fn clip_in_front_keeps_winding() {
        let mut db = GeometryDatabase::new(&CompileConfig::default());
        let mut winding = square(&mut db, 0.0, 10.0);
        let original = winding.clone();
        let plane = db.insert_plane(Vec3d::new(1.0, 0.0, 0.0), 0.0);

        assert!(!winding.clip_front(&mut db, plane));
        assert_eq!(winding, original);
    }

    #[test]
    fn side_flags() {
        let mut db = GeometryDatabase::new(&CompileConfig::default());
        let winding = square(&mut db, 0.0, 10.0);
        let own = db.insert_plane(Vec3d::new(0.0, 0.0, 1.0), 0.0);
        let splitter = db.insert_plane(Vec3d::new(1.0, 0.0, 0.0), -5.0);
        let touching = db.insert_plane(Vec3d::new(1.0, 0.0, 0.0), 0.0);

        assert_eq!(winding.which_side(&db, own, own.inverse()), SideFlags::ON);
        assert_eq!(winding.which_side(&db, own, splitter), SideFlags::FRONT | SideFlags::BACK);
        assert_eq!(winding.which_side(&db, own, touching), SideFlags::FRONT | SideFlags::ON);
    }

    #[test]
    fn equivalence_ignores_rotation() {
        let mut db = GeometryDatabase::new(&CompileConfig::default());
        let winding = square(&mut db, 0.0, 10.0);
        let mut rotated = winding.clone();
        rotated.points.rotate_left(2);
        let mut reversed = winding.clone();
        reversed.points.reverse();

        assert!(winding.is_equivalent(&rotated));
        assert!(!winding.is_equivalent(&reversed));
    }

    #[test]
    fn adjacent_squares_collapse_into_rectangle() {
        let mut db = GeometryDatabase::new(&CompileConfig::default());
        let zones = lit_zone();

        let mut left = square(&mut db, 0.0, 10.0);
        let mut right = square(&mut db, 10.0, 20.0);
        left.insert_zone(ZoneId::from_index(0));
        right.insert_zone(ZoneId::from_index(0));

        assert!(left.collapse(&db, &right, &zones));
        assert_eq!(left.len(), 4);

        let bounds = BoundBox::for_points(left.positions(&db));
        assert_relative_eq!(bounds.min.x, 0.0);
        assert_relative_eq!(bounds.max.x, 20.0);
    }

    #[test]
    fn windings_without_zones_never_collapse() {
        let mut db = GeometryDatabase::new(&CompileConfig::default());
        let mut left = square(&mut db, 0.0, 10.0);
        let right = square(&mut db, 10.0, 20.0);

        assert!(!left.collapse(&db, &right, &lit_zone()));
    }

    #[test]
    fn bounded_winding_spans_box() {
        let mut db = GeometryDatabase::new(&CompileConfig::default());
        let bounds = BoundBox {
            min: Vec3d::new(-8.0, -8.0, -8.0),
            max: Vec3d::new(8.0, 8.0, 8.0),
        };
        let plane = db.insert_plane(Vec3d::new(0.0, 0.0, 1.0), -2.0);

        let winding = Winding::create_bounded(&mut db, &bounds, plane).expect("plane crosses box");

        assert_eq!(winding.len(), 4);
        assert_relative_eq!(winding.surface_area(&db, plane), 256.0, epsilon = 1e-6);

        for point in winding.positions(&db) {
            assert_relative_eq!(point.z, 2.0);
        }
    }

    #[test]
    fn base_winding_is_clockwise() {
        let mut db = GeometryDatabase::new(&CompileConfig::default());
        let ids = [
            Vec3d::new(0.0, 0.0, 0.0),
            Vec3d::new(10.0, 10.0, 0.0),
            Vec3d::new(10.0, 0.0, 0.0),
            Vec3d::new(0.0, 10.0, 0.0),
        ].map(|p| db.insert_point(p));

        let normal = Vec3d::new(0.0, 0.0, 1.0);
        let winding = Winding::create_base(&db, &ids, normal).expect("square face");
        let p = winding.positions(&db).collect::<Vec<_>>();

        // clockwise around normal gives negative signed area
        assert!((((p[1] - p[0]) % (p[2] - p[1])) ^ normal) < 0.0);
        assert!(Winding::create_base(&db, &ids[..2], normal).is_none());
    }
}

// winding.rs
