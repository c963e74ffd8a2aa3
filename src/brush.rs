///! Convex brush built from bounding half-spaces

use crate::{
    database::{GeometryDatabase, PlaneId, PointId},
    geom::{intersect_planes, BoundBox, PlaneSide},
    map::{TexGenId, TextureId},
    math::Vec3d,
    winding::Winding,
};

impl_id!(BrushId);

/// Brush role. Order matters: a solid leaf prefers the brush of the least type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BrushType {
    /// World geometry, builds the BSP and the zones
    Structural,

    /// Cosmetic geometry, classified into the structural BSP afterwards
    Detail,

    /// Zone separator
    Portal,

    /// Collision-only hull
    Collision,

    /// Vehicle collision-only hull
    VehicleCollision,
}

/// Single bounding half-space of a brush. Points inside the brush are behind every plane.
#[derive(Clone, Debug)]
pub struct BrushPlane {
    /// Plane equation
    pub plane: PlaneId,

    /// Polygon the plane bounds the brush with, empty before self clipping
    pub winding: Winding,

    /// Face texture, None for planes added by BSP splits
    pub texture: Option<TextureId>,

    /// Face texture projection
    pub texgen: Option<TexGenId>,

    /// Plane (or its inverse) is already used as a BSP splitter
    pub inserted: bool,
}

impl BrushPlane {
    /// Untextured plane
    pub fn new(plane: PlaneId) -> Self {
        Self {
            plane,
            winding: Winding::default(),
            texture: None,
            texgen: None,
            inserted: false,
        }
    }
}

/// BSP splitter rating counters accumulated over a brush set
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaneAssessment {
    /// Brushes abutting the plane
    pub coplanar: i32,

    /// Brushes that would be split into a sliver (less than 1 unit thick)
    pub tiny_windings: i32,

    /// Brushes split by the plane
    pub splits: i32,

    /// Brushes (partially) in front of the plane
    pub front: i32,

    /// Brushes (partially) behind the plane
    pub back: i32,
}

impl PlaneAssessment {
    /// Splitter quality, greater is better
    pub fn rating(&self, is_axial: bool) -> i32 {
        let mut rating = 5 * self.coplanar
            - 5 * self.splits
            - (self.front - self.back).abs()
            - 1000 * self.tiny_windings;

        if is_axial {
            rating += 5;
        }

        rating
    }
}

/// Convex solid
#[derive(Clone, Debug)]
pub struct Brush {
    /// Brush identifier, shared by all the pieces brush is split into
    pub id: BrushId,

    /// Brush role
    pub brush_type: BrushType,

    /// Bounding planes
    pub planes: Vec<BrushPlane>,

    /// Brush has the same plane textured in two different ways
    pub is_ambiguous: bool,

    /// Bounds of all windings
    pub bounds: BoundBox,
}

impl Brush {
    /// Construct brush with no planes
    pub fn new(id: BrushId, brush_type: BrushType) -> Self {
        Self {
            id,
            brush_type,
            planes: Vec::new(),
            is_ambiguous: false,
            bounds: BoundBox::empty(),
        }
    }

    /// Add plane given by three points listed clockwise from outside.
    /// Returns None for colinear points.
    pub fn add_plane_from_points(
        &mut self,
        db: &mut GeometryDatabase,
        points: [Vec3d; 3],
    ) -> Option<&mut BrushPlane> {
        let [p1, p2, p3] = points;
        let plane = crate::geom::PlaneEq::from_points(p1, p2, p3)?;

        self.planes.push(BrushPlane::new(db.insert_plane_eq(plane)));
        self.planes.last_mut()
    }

    /// Build windings of all planes. Fails if some plane does not bound the brush
    /// by a valid polygon, brush should be dropped then.
    pub fn self_clip(&mut self, db: &mut GeometryDatabase) -> bool {
        let equations = self.planes
            .iter()
            .map(|plane| *db.plane(plane.plane))
            .collect::<Vec<_>>();
        let count = equations.len();
        let mut plane_points = vec![Vec::<PointId>::new(); count];

        for i in 0..count {
            for j in i + 1..count {
                for k in j + 1..count {
                    let Some(point) = intersect_planes(&equations[i], &equations[j], &equations[k]) else {
                        continue;
                    };

                    let inside = self.planes
                        .iter()
                        .all(|plane| db.side(plane.plane, point) != PlaneSide::Front);

                    if !inside {
                        continue;
                    }

                    let id = db.insert_point(point);

                    for index in [i, j, k] {
                        if !plane_points[index].contains(&id) {
                            plane_points[index].push(id);
                        }
                    }

                    db.bounds.add_point(point);
                }
            }
        }

        let mut bounds = BoundBox::empty();

        for (plane, points) in self.planes.iter_mut().zip(plane_points.iter()) {
            let normal = db.plane(plane.plane).normal;
            let Some(winding) = Winding::create_base(db, points, normal) else {
                return false;
            };

            for point in winding.positions(db) {
                bounds.add_point(point);
            }

            plane.winding = winding;
        }

        self.bounds = bounds;

        true
    }

    /// Remove duplicated planes. Returns true if some duplicates were textured differently.
    pub fn disambiguate(&mut self) -> bool {
        let mut index = 0;

        while index < self.planes.len() {
            let mut other = index + 1;

            while other < self.planes.len() {
                let (first, second) = (&self.planes[index], &self.planes[other]);

                if first.plane == second.plane {
                    if first.texture != second.texture || first.texgen != second.texgen {
                        self.is_ambiguous = true;
                    }
                    self.planes.remove(other);
                } else {
                    other += 1;
                }
            }

            index += 1;
        }

        self.is_ambiguous
    }

    /// Check if every plane of self bounds `other` too
    pub fn is_equivalent(&self, other: &Brush) -> bool {
        self.planes
            .iter()
            .all(|plane| other.planes.iter().any(|test| test.plane == plane.plane))
    }

    /// Check if every plane of the brush is already used as a splitter
    pub fn no_more_insertables(&self) -> bool {
        self.planes.iter().all(|plane| plane.inserted)
    }

    /// Mark planes coplanar with splitter as used
    pub fn mark_inserted(&mut self, splitter: PlaneId) {
        for plane in &mut self.planes {
            if plane.plane.is_coplanar(splitter) {
                plane.inserted = true;
            }
        }
    }

    /// Unique winding points
    pub fn unique_points(&self) -> Vec<PointId> {
        let mut points = Vec::<PointId>::new();

        for plane in &self.planes {
            for point in &plane.winding.points {
                if !points.contains(point) {
                    points.push(*point);
                }
            }
        }

        points
    }

    /// Average of brush vertices
    pub fn centroid(&self, db: &GeometryDatabase) -> Vec3d {
        let points = self.unique_points();

        points.iter().fold(Vec3d::zero(), |sum, id| sum + db.point(*id)) / points.len().max(1) as f64
    }

    /// Check if point is inside or on the brush
    pub fn contains_point(&self, db: &GeometryDatabase, point: Vec3d) -> bool {
        self.planes.iter().all(|plane| db.side(plane.plane, point) != PlaneSide::Front)
    }

    /// Copy of brush part in front of `keep`, capped by `cap` plane
    fn clipped_part(&self, db: &mut GeometryDatabase, keep: PlaneId, cap: PlaneId) -> Option<Brush> {
        let mut part = self.clone();
        let mut regenerate = false;

        for index in (0..part.planes.len()).rev() {
            if part.planes[index].plane.is_coplanar(keep) {
                continue;
            }

            if part.planes[index].winding.clip_front(db, keep) {
                regenerate = true;

                if part.planes[index].winding.is_empty() {
                    part.planes.remove(index);
                }
            }
        }

        if part.planes.len() <= 1 {
            return None;
        }

        if regenerate {
            part.planes.push(BrushPlane::new(cap));

            for plane in &mut part.planes {
                plane.winding = Winding::default();
            }

            if !part.self_clip(db) {
                log::trace!("brush {} piece degenerated during split", self.id.into_index());
                return None;
            }
        }

        Some(part)
    }

    /// Split brush by plane into (front, back) parts
    pub fn split(&self, db: &mut GeometryDatabase, plane: PlaneId) -> (Option<Brush>, Option<Brush>) {
        let front = self.clipped_part(db, plane, plane.inverse());
        let back = self.clipped_part(db, plane.inverse(), plane);

        (front, back)
    }

    /// Add brush to candidate splitter statistics
    pub fn assess_plane(&self, db: &GeometryDatabase, plane: PlaneId, assessment: &mut PlaneAssessment) {
        for brush_plane in &self.planes {
            if brush_plane.plane.is_coplanar(plane) {
                assessment.coplanar += 1;

                if brush_plane.plane == plane {
                    assessment.back += 1;
                } else {
                    assessment.front += 1;
                }

                return;
            }
        }

        let equation = db.plane(plane);
        let epsilon = db.epsilon();
        let mut max_front = 0.0f64;
        let mut min_back = 0.0f64;

        for point in self.unique_points() {
            let distance = equation.distance(db.point(point));

            max_front = max_front.max(distance);
            min_back = min_back.min(distance);
        }

        if max_front > epsilon {
            assessment.front += 1;
        }
        if min_back < -epsilon {
            assessment.back += 1;
        }
        if max_front > epsilon && min_back < -epsilon {
            assessment.splits += 1;
        }

        if (max_front > 0.0 && max_front < 1.0) || (min_back < 0.0 && min_back > -1.0) {
            assessment.tiny_windings += 1;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use approx::assert_relative_eq;
    use crate::config::CompileConfig;
    use super::*;

    /// Axis aligned box brush
    pub(crate) fn box_brush(db: &mut GeometryDatabase, id: usize, min: Vec3d, max: Vec3d) -> Brush {
        let mut brush = Brush::new(BrushId::from_index(id), BrushType::Structural);

        for axis in 0..3 {
            let mut normal = Vec3d::zero();
            match axis {
                0 => normal.x = 1.0,
                1 => normal.y = 1.0,
                _ => normal.z = 1.0,
            }

            brush.planes.push(BrushPlane::new(db.insert_plane(normal, -max.axis(axis))));
            brush.planes.push(BrushPlane::new(db.insert_plane(-normal, min.axis(axis))));
        }

        brush
    }

    fn database() -> GeometryDatabase {
        GeometryDatabase::new(&CompileConfig::default())
    }

    #[test]
    fn cube_self_clip() {
        let mut db = database();
        let mut brush = box_brush(&mut db, 0, Vec3d::new(-16.0, -16.0, 0.0), Vec3d::new(16.0, 16.0, 32.0));

        assert!(brush.self_clip(&mut db));
        assert_eq!(brush.unique_points().len(), 8);

        for plane in &brush.planes {
            assert_eq!(plane.winding.len(), 4);

            for point in plane.winding.positions(&db) {
                assert_eq!(db.side(plane.plane, point), PlaneSide::On);
            }
        }

        assert_relative_eq!(brush.bounds.min.x, -16.0);
        assert_relative_eq!(brush.bounds.max.z, 32.0);
        assert_relative_eq!(db.bounds.max.y, 16.0);
    }

    #[test]
    fn three_point_plane_faces_outwards() {
        let mut db = database();
        let mut brush = Brush::new(BrushId::from_index(0), BrushType::Structural);

        // top face of a box, listed clockwise seen from above
        brush.add_plane_from_points(&mut db, [
            Vec3d::new(0.0, 0.0, 8.0),
            Vec3d::new(0.0, 8.0, 8.0),
            Vec3d::new(8.0, 8.0, 8.0),
        ]).expect("valid plane");

        let plane = brush.planes[0].plane;
        assert_eq!(db.side(plane, Vec3d::new(4.0, 4.0, 16.0)), PlaneSide::Front);
        assert_eq!(db.side(plane, Vec3d::new(4.0, 4.0, 0.0)), PlaneSide::Back);
    }

    #[test]
    fn open_brush_fails_self_clip() {
        let mut db = database();
        let mut brush = box_brush(&mut db, 0, Vec3d::new(0.0, 0.0, 0.0), Vec3d::new(8.0, 8.0, 8.0));
        brush.planes.pop();

        assert!(!brush.self_clip(&mut db));
    }

    #[test]
    fn duplicate_planes_are_removed() {
        let mut db = database();
        let mut brush = box_brush(&mut db, 0, Vec3d::new(0.0, 0.0, 0.0), Vec3d::new(8.0, 8.0, 8.0));

        let mut duplicate = brush.planes[0].clone();
        brush.planes.push(duplicate.clone());
        assert!(!brush.disambiguate());
        assert_eq!(brush.planes.len(), 6);

        duplicate.texture = Some(TextureId::from_index(4));
        brush.planes.push(duplicate);
        assert!(brush.disambiguate());
        assert_eq!(brush.planes.len(), 6);
    }

    #[test]
    fn split_gives_capped_halves() {
        let mut db = database();
        let mut brush = box_brush(&mut db, 0, Vec3d::new(0.0, 0.0, 0.0), Vec3d::new(8.0, 8.0, 8.0));
        assert!(brush.self_clip(&mut db));

        let splitter = db.insert_plane(Vec3d::new(1.0, 0.0, 0.0), -2.0);
        let (front, back) = brush.split(&mut db, splitter);
        let (front, back) = (front.expect("front part"), back.expect("back part"));

        assert_eq!(front.planes.len(), 6);
        assert_eq!(back.planes.len(), 6);
        assert_relative_eq!(front.bounds.min.x, 2.0);
        assert_relative_eq!(front.bounds.max.x, 8.0);
        assert_relative_eq!(back.bounds.max.x, 2.0);
        assert!(front.planes.iter().any(|plane| plane.plane == splitter.inverse()));
        assert!(back.planes.iter().any(|plane| plane.plane == splitter));
    }

    #[test]
    fn split_by_outside_plane_keeps_one_side() {
        let mut db = database();
        let mut brush = box_brush(&mut db, 0, Vec3d::new(0.0, 0.0, 0.0), Vec3d::new(8.0, 8.0, 8.0));
        assert!(brush.self_clip(&mut db));

        let splitter = db.insert_plane(Vec3d::new(1.0, 0.0, 0.0), -20.0);
        let (front, back) = brush.split(&mut db, splitter);

        assert!(front.is_none());
        assert!(back.expect("whole brush").is_equivalent(&brush));
    }

    #[test]
    fn assessment_counts_splits_and_slivers() {
        let mut db = database();
        let mut brush = box_brush(&mut db, 0, Vec3d::new(0.0, 0.0, 0.0), Vec3d::new(8.0, 8.0, 8.0));
        assert!(brush.self_clip(&mut db));

        let middle = db.insert_plane(Vec3d::new(1.0, 0.0, 0.0), -4.0);
        let mut assessment = PlaneAssessment::default();
        brush.assess_plane(&db, middle, &mut assessment);
        assert_eq!(assessment, PlaneAssessment { splits: 1, front: 1, back: 1, ..Default::default() });

        let sliver = db.insert_plane(Vec3d::new(1.0, 0.0, 0.0), -7.5);
        let mut assessment = PlaneAssessment::default();
        brush.assess_plane(&db, sliver, &mut assessment);
        assert_eq!(assessment.tiny_windings, 1);
        assert!(assessment.rating(true) < -900);

        let face = brush.planes[0].plane;
        let mut assessment = PlaneAssessment::default();
        brush.assess_plane(&db, face, &mut assessment);
        assert_eq!(assessment, PlaneAssessment { coplanar: 1, back: 1, ..Default::default() });
    }
}

// brush.rs
