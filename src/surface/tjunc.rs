///! T-junction repair
///!
///! Coplanar neighbour surfaces clipped by different BSP nodes may leave a vertex of one
///! surface in the middle of an edge of the other. Such vertices are inserted into the
///! edge. Polygons grown over the exported point limit are split.

use itertools::Itertools;
use crate::{
    database::{GeometryDatabase, PointId},
    error::CompileError,
    geom::PlaneSide,
    winding::MAX_WINDING_POINTS,
};
use super::{SurfaceFlags, SurfaceSet};

/// Insert `point` into the first edge it lies strictly inside of.
/// Returns true if point was inserted.
pub fn insert_on_edge(db: &GeometryDatabase, points: &mut Vec<PointId>, point: PointId) -> bool {
    let count = points.len();
    if count < 2 {
        return false;
    }

    let position = db.point(point);
    let (mut start, mut end) = (0usize, 1usize);

    loop {
        let (edge_start, edge_end) = (points[start], points[end]);

        if db.points_colinear(edge_start, edge_end, point) {
            let (from, to) = (db.point(edge_start), db.point(edge_end));
            let direction = (to - from).normalized();
            let offset = (position - from) ^ direction;

            if offset > 0.0 && offset < ((to - from) ^ direction) {
                // closing edge inserts at the end of the loop
                if end < start {
                    points.push(point);
                } else {
                    points.insert(end, point);
                }
                return true;
            }
        }

        start = end;
        end = (end + 1) % count;

        if end == 1 {
            return false;
        }
    }
}

/// Check if every three consecutive points of loop are colinear
fn is_fully_colinear(db: &GeometryDatabase, points: &[PointId]) -> bool {
    let count = points.len();

    (0..count).all(|index| {
        db.points_colinear(points[index], points[(index + 1) % count], points[(index + 2) % count])
    })
}

/// Split loop of more than [`MAX_WINDING_POINTS`] points into a loop of exactly
/// [`MAX_WINDING_POINTS`] points and the remainder. Split start is chosen so that
/// neither part is degenerate.
pub fn split_oversized(db: &GeometryDatabase, points: &[PointId]) -> Result<(Vec<PointId>, Vec<PointId>), CompileError> {
    let count = points.len();

    for split in 0..count {
        let head = (0..MAX_WINDING_POINTS)
            .map(|offset| points[(split + offset) % count])
            .collect::<Vec<_>>();

        let mut rest = Vec::with_capacity(count - MAX_WINDING_POINTS + 2);
        rest.push(head[0]);
        rest.push(head[MAX_WINDING_POINTS - 1]);
        rest.extend((MAX_WINDING_POINTS..count).map(|offset| points[(split + offset) % count]));

        if !is_fully_colinear(db, &head) && !is_fully_colinear(db, &rest) {
            return Ok((head, rest));
        }
    }

    Err(CompileError::Invariant(format!("no valid split of {}-point polygon", count)))
}

impl SurfaceSet {
    /// Unique points of structural (`detail == false`) or detail surfaces, ascending
    fn unique_points(&self, detail: bool) -> Vec<PointId> {
        self.surfaces
            .iter()
            .filter(|surface| surface.flags.contains(SurfaceFlags::DETAIL) == detail)
            .flat_map(|surface| surface.winding.points.iter().copied())
            .sorted()
            .dedup()
            .collect()
    }

    /// One repair pass over structural or detail surfaces. Returns false if some
    /// surface was split, the pass must be restarted after resorting then.
    fn fix_tjunction_pass(
        &mut self,
        db: &GeometryDatabase,
        detail: bool,
        candidates: &[PointId],
    ) -> Result<bool, CompileError> {
        for index in 0..self.surfaces.len() {
            let surface = &self.surfaces[index];
            if surface.flags.contains(SurfaceFlags::DETAIL) != detail {
                continue;
            }

            let mut points = surface.winding.points.clone();
            let mut coplanar = candidates
                .iter()
                .copied()
                .filter(|point| !points.contains(point))
                .filter(|point| db.point_side(surface.plane, *point) == PlaneSide::On)
                .unique()
                .collect::<Vec<_>>();

            while let Some(point) = coplanar.pop() {
                insert_on_edge(db, &mut points, point);
            }

            if points.len() <= MAX_WINDING_POINTS {
                self.surfaces[index].winding.points = points;
                continue;
            }

            log::trace!("splitting {}-point surface {}", points.len(), surface.unique_key);

            while points.len() > MAX_WINDING_POINTS {
                let (head, rest) = split_oversized(db, &points)?;

                let mut piece = self.surfaces[index].clone();
                piece.unique_key = self.next_key();
                piece.winding.points = head;
                piece.rotate_to_non_colinear(db)?;
                self.surfaces.push(piece);

                points = rest;
            }

            let surface = &mut self.surfaces[index];
            surface.winding.points = points;
            surface.rotate_to_non_colinear(db)?;

            return Ok(false);
        }

        Ok(true)
    }

    /// Insert T-junction points into structural surfaces, then into detail ones. Detail
    /// surfaces also see structural points. Returns false if the set must be resorted
    /// and the repair repeated.
    pub fn fix_tjunctions(&mut self, db: &GeometryDatabase) -> Result<bool, CompileError> {
        let mut candidates = self.unique_points(false);

        if !self.fix_tjunction_pass(db, false, &candidates)? {
            return Ok(false);
        }

        candidates.extend(self.unique_points(true));
        self.fix_tjunction_pass(db, true, &candidates)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        config::CompileConfig,
        map::{TexGenId, TextureId},
        math::Vec3d,
        winding::Winding,
    };
    use super::{super::Surface, *};

    fn database() -> GeometryDatabase {
        GeometryDatabase::new(&CompileConfig::default())
    }

    fn floor_surface(db: &mut GeometryDatabase, key: u32, corners: &[(f64, f64)]) -> Surface {
        let plane = db.insert_plane(Vec3d::new(0.0, 0.0, 1.0), 0.0);
        let points = corners
            .iter()
            .map(|(x, y)| db.insert_point(Vec3d::new(*x, *y, 0.0)))
            .collect::<Vec<_>>();

        Surface {
            unique_key: key,
            plane,
            texture: TextureId::from_index(4),
            texgen: TexGenId::from_index(0),
            winding: Winding::from_points(points.clone()),
            original_winding: Winding::from_points(points),
            flags: SurfaceFlags::empty(),
            fan_mask: 0,
            lightmap: None,
            num_lights: 0,
            state_data_start: 0,
        }
    }

    #[test]
    fn point_is_inserted_into_edge() {
        let mut db = database();
        let square = [(0.0, 0.0), (0.0, 8.0), (8.0, 8.0), (8.0, 0.0)]
            .map(|(x, y)| db.insert_point(Vec3d::new(x, y, 0.0)));
        let middle = db.insert_point(Vec3d::new(4.0, 8.0, 0.0));
        let closing = db.insert_point(Vec3d::new(4.0, 0.0, 0.0));
        let outside = db.insert_point(Vec3d::new(12.0, 8.0, 0.0));

        let mut points = square.to_vec();
        assert!(insert_on_edge(&db, &mut points, middle));
        assert_eq!(points, vec![square[0], square[1], middle, square[2], square[3]]);

        assert!(insert_on_edge(&db, &mut points, closing));
        assert_eq!(points.last(), Some(&closing));

        assert!(!insert_on_edge(&db, &mut points, outside));
        assert_eq!(points.len(), 6);
    }

    #[test]
    fn neighbour_vertex_is_welded() {
        let mut db = database();

        // big square next to two small ones, their shared corner lies on big square edge
        let big = floor_surface(&mut db, 0, &[(0.0, 0.0), (0.0, 16.0), (16.0, 16.0), (16.0, 0.0)]);
        let low = floor_surface(&mut db, 1, &[(16.0, 0.0), (16.0, 8.0), (24.0, 8.0), (24.0, 0.0)]);
        let high = floor_surface(&mut db, 2, &[(16.0, 8.0), (16.0, 16.0), (24.0, 16.0), (24.0, 8.0)]);

        let mut set = SurfaceSet { surfaces: vec![big, low, high], ..Default::default() };
        assert!(set.fix_tjunctions(&db).expect("repair succeeds"));

        let shared = db.insert_point(Vec3d::new(16.0, 8.0, 0.0));
        let big = set.surfaces.iter().find(|surface| surface.unique_key == 0).expect("big square is kept");

        assert_eq!(big.winding.len(), 5);
        assert!(big.winding.points.contains(&shared));
        assert_eq!(set.surfaces[1].winding.len(), 4);
    }

    #[test]
    fn oversized_polygon_is_split() {
        let mut db = database();

        // square with 40 points on the bottom edge
        let mut corners = vec![(0.0, 0.0), (0.0, 64.0), (64.0, 64.0), (64.0, 0.0)];
        for index in (1..40).rev() {
            corners.push((index as f64 * 64.0 / 40.0, 0.0));
        }
        let surface = floor_surface(&mut db, 0, &corners);
        let mut set = SurfaceSet { surfaces: vec![surface], ..Default::default() };
        set.next_key = 1;

        assert!(!set.fix_tjunctions(&db).expect("split succeeds"));
        assert_eq!(set.surfaces.len(), 2);

        let total = set.surfaces.iter().map(|surface| surface.winding.len()).sum::<usize>();
        assert_eq!(total, corners.len() + 2);

        for surface in &set.surfaces {
            assert!(surface.winding.len() <= MAX_WINDING_POINTS);
            assert!(!is_fully_colinear(&db, &surface.winding.points));
            assert_eq!(surface.original_winding.points, surface.winding.points);
        }

        assert!(set.fix_tjunctions(&db).expect("second pass succeeds"));
    }

    #[test]
    fn coplanar_foreign_plane_is_ignored() {
        let mut db = database();
        let surface = floor_surface(&mut db, 0, &[(0.0, 0.0), (0.0, 8.0), (8.0, 8.0), (8.0, 0.0)]);
        let mut lifted = floor_surface(&mut db, 1, &[(0.0, 0.0), (0.0, 8.0), (8.0, 8.0), (8.0, 0.0)]);

        // same outline one unit above is not coplanar
        lifted.plane = db.insert_plane(Vec3d::new(0.0, 0.0, 1.0), -1.0);
        lifted.winding.points = [(4.0, 8.0), (4.0, 0.0), (6.0, 4.0)]
            .map(|(x, y)| db.insert_point(Vec3d::new(x, y, 1.0)))
            .to_vec();

        let mut set = SurfaceSet { surfaces: vec![surface, lifted], ..Default::default() };
        assert!(set.fix_tjunctions(&db).expect("repair succeeds"));
        assert_eq!(set.surfaces[0].winding.len(), 4);
    }
}

// surface/tjunc.rs
