///! Convex collision hulls
///!
///! Every hull point gets an emit string, a byte description of the hull piece around
///! the point: the polygons that touch it (and their coplanar neighbours), their points
///! and edges. Identical strings are stored once.

use std::{cmp::Ordering, collections::{BTreeMap, BTreeSet, HashMap}};
use itertools::Itertools;
use crate::error::CompileError;
use super::dif::{self, ConvexHull, Span};

/// Hull polygon in runtime indices
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HullPoly {
    /// Plane index
    pub plane: u32,

    /// Point indices, clockwise seen from outside
    pub points: Vec<u32>,
}

/// Hull before export
#[derive(Clone, Debug, Default)]
pub struct HullSource {
    /// Hull faces
    pub polys: Vec<HullPoly>,

    /// Surface list entries of hull
    pub surfaces: Vec<u32>,
}

/// Decoded emit string
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmitString {
    /// Hull-local point indices
    pub points: Vec<u8>,

    /// Edges, as indices in `points`
    pub edges: Vec<(u8, u8)>,

    /// Polygons: hull polygon index and vertices as indices in `points`
    pub polys: Vec<(u8, Vec<u8>)>,
}

/// Narrow count or index into emit string byte
fn emit_byte(value: usize) -> Result<u8, CompileError> {
    u8::try_from(value).map_err(|_| CompileError::Format(format!("emit string value {} exceeds byte", value)))
}

impl EmitString {
    /// Encode into bytes
    pub fn encode(&self) -> Result<Vec<u8>, CompileError> {
        let mut bytes = Vec::new();

        bytes.push(emit_byte(self.points.len())?);
        bytes.extend_from_slice(&self.points);

        bytes.push(emit_byte(self.edges.len())?);
        for (first, second) in &self.edges {
            bytes.push(*first);
            bytes.push(*second);
        }

        bytes.push(emit_byte(self.polys.len())?);
        for (index, vertices) in &self.polys {
            bytes.push(emit_byte(vertices.len())?);
            bytes.push(*index);
            bytes.extend_from_slice(vertices);
        }

        Ok(bytes)
    }

    /// Decode string starting at the beginning of `bytes`. Returns None if bytes end
    /// before the string does.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let mut iter = bytes.iter().copied();
        let mut next = || iter.next();

        let point_count = next()?;
        let points = (0..point_count).map(|_| next()).collect::<Option<Vec<_>>>()?;

        let edge_count = next()?;
        let edges = (0..edge_count).map(|_| Some((next()?, next()?))).collect::<Option<Vec<_>>>()?;

        let poly_count = next()?;
        let polys = (0..poly_count)
            .map(|_| {
                let vertex_count = next()?;
                let index = next()?;
                let vertices = (0..vertex_count).map(|_| next()).collect::<Option<Vec<_>>>()?;
                Some((index, vertices))
            })
            .collect::<Option<Vec<_>>>()?;

        Some(Self { points, edges, polys })
    }
}

/// Order of hull polygons: vertex sets compared from the largest index down, larger
/// first, then shorter polygons first
pub fn compare_hull_polys(lhs: &[u8], rhs: &[u8]) -> Ordering {
    let descending = |poly: &[u8]| poly.iter().copied().sorted_by(|a, b| b.cmp(a)).collect::<Vec<_>>();
    let (lhs_sorted, rhs_sorted) = (descending(lhs), descending(rhs));

    lhs_sorted
        .iter()
        .zip(rhs_sorted.iter())
        .map(|(lhs, rhs)| rhs.cmp(lhs))
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
        .then(lhs.len().cmp(&rhs.len()))
}

/// Emit string of hull point `point`, polygons given in hull-local indices
fn build_emit_string(point: u8, polys: &[(u32, Vec<u8>)]) -> Result<EmitString, CompileError> {
    let touching_planes = polys
        .iter()
        .filter(|(_, vertices)| vertices.contains(&point))
        .map(|(plane, _)| *plane)
        .collect::<BTreeSet<_>>();

    let included = polys
        .iter()
        .enumerate()
        .filter(|(_, (plane, vertices))| vertices.contains(&point) || touching_planes.contains(plane))
        .collect::<Vec<_>>();

    let points = included
        .iter()
        .flat_map(|(_, (_, vertices))| vertices.iter().copied())
        .sorted()
        .dedup()
        .collect::<Vec<_>>();

    let relative = |vertex: u8| points.binary_search(&vertex).map(|index| index as u8).unwrap_or(0);

    let edges = included
        .iter()
        .flat_map(|(_, (_, vertices))| {
            vertices
                .iter()
                .copied()
                .circular_tuple_windows::<(u8, u8)>()
                .map(move |(a, b)| (relative(a).min(relative(b)), relative(a).max(relative(b))))
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>();

    let polys = included
        .iter()
        .map(|(index, (_, vertices))| -> Result<(u8, Vec<u8>), CompileError> {
            Ok((emit_byte(*index)?, vertices.iter().copied().map(relative).collect()))
        })
        .collect::<Result<Vec<_>, CompileError>>()?;

    Ok(EmitString { points, edges, polys })
}

/// Collision hulls with emit strings and poly lists
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HullTables {
    /// Hulls
    pub hulls: Vec<ConvexHull>,

    /// Runtime point indices of hulls
    pub hull_indices: Vec<u32>,

    /// Plane indices of hull polygons, in polygon order
    pub hull_plane_indices: Vec<u32>,

    /// Emit string offset of every hull point
    pub hull_emit_string_indices: Vec<u32>,

    /// Surface lists of hulls
    pub hull_surface_indices: Vec<u32>,

    /// Emit string bytes
    pub emit_strings: Vec<u8>,

    /// Poly list planes
    pub poly_list_planes: Vec<u32>,

    /// Poly list points
    pub poly_list_points: Vec<u32>,

    /// Poly list vertex strings
    pub poly_list_strings: Vec<u8>,
}

impl HullTables {
    /// Export hull. `positions` are runtime points, `emitted` maps known emit strings to
    /// their offsets.
    pub fn push_hull(
        &mut self,
        source: &HullSource,
        positions: &[dif::Vec3],
        emitted: &mut HashMap<Vec<u8>, u32>,
    ) -> Result<(), CompileError> {
        // hull points are numbered in the order the faces walk them
        let mut points = Vec::new();
        let mut locals = HashMap::<u32, usize>::new();
        for point in source.polys.iter().flat_map(|poly| poly.points.iter().copied()) {
            locals.entry(point).or_insert_with(|| {
                points.push(point);
                points.len() - 1
            });
        }

        if points.len() > u8::MAX as usize {
            return Err(CompileError::Format(format!("hull has {} points, maximum is 255", points.len())));
        }

        let local = |point: u32| locals.get(&point).map_or(0, |index| *index as u8);

        let mut polys = source.polys
            .iter()
            .map(|poly| (poly.plane, poly.points.iter().copied().map(local).collect::<Vec<_>>()))
            .collect::<Vec<_>>();
        polys.sort_by(|(_, lhs), (_, rhs)| compare_hull_polys(lhs, rhs));

        let mut min = dif::Vec3 { x: f32::MAX, y: f32::MAX, z: f32::MAX };
        let mut max = dif::Vec3 { x: f32::MIN, y: f32::MIN, z: f32::MIN };
        for point in &points {
            let position = positions[*point as usize];
            min = dif::Vec3 { x: min.x.min(position.x), y: min.y.min(position.y), z: min.z.min(position.z) };
            max = dif::Vec3 { x: max.x.max(position.x), y: max.y.max(position.y), z: max.z.max(position.z) };
        }

        let point_start = self.hull_indices.len();
        self.hull_indices.extend_from_slice(&points);

        let plane_start = self.hull_plane_indices.len() as u32;
        self.hull_plane_indices.extend(polys.iter().map(|(plane, _)| *plane));

        let surface_start = self.hull_surface_indices.len();
        self.hull_surface_indices.extend_from_slice(&source.surfaces);

        for point in 0..points.len() {
            let bytes = build_emit_string(point as u8, &polys)?.encode()?;

            let offset = match emitted.get(&bytes) {
                Some(offset) => *offset,
                None => {
                    let offset = self.emit_strings.len() as u32;
                    self.emit_strings.extend_from_slice(&bytes);
                    emitted.insert(bytes, offset);
                    offset
                }
            };

            self.hull_emit_string_indices.push(offset);
        }

        self.hulls.push(ConvexHull {
            points: Span::from_lengths(point_start, self.hull_indices.len()),
            min,
            max,
            surfaces: Span::from_lengths(surface_start, self.hull_surface_indices.len()),
            plane_start,
            poly_list_plane_start: 0,
            poly_list_point_start: 0,
            poly_list_string_start: 0,
        });

        Ok(())
    }

    /// Emit string of point of hull, by hull point index
    pub fn emit_string(&self, hull: &ConvexHull, point: usize) -> Option<EmitString> {
        let offset = *self.hull_emit_string_indices.get(hull.points.start as usize + point)?;
        EmitString::decode(self.emit_strings.get(offset as usize..)?)
    }

    /// Build poly lists of every hull from its emit strings
    pub fn process_poly_lists(&mut self) -> Result<(), CompileError> {
        self.poly_list_planes.clear();
        self.poly_list_points.clear();
        self.poly_list_strings.clear();

        for hull_index in 0..self.hulls.len() {
            let hull = self.hulls[hull_index];
            let mut polys = BTreeMap::<u8, Vec<u8>>::new();

            for point in 0..hull.points.count as usize {
                let Some(emit) = self.emit_string(&hull, point) else {
                    return Err(CompileError::Invariant(format!(
                        "hull {} point {} has broken emit string",
                        hull_index, point
                    )));
                };

                for (index, vertices) in emit.polys {
                    polys.entry(index).or_insert_with(|| {
                        vertices.iter().map(|vertex| emit.points[*vertex as usize]).collect()
                    });
                }
            }

            let hull = &mut self.hulls[hull_index];
            hull.poly_list_plane_start = self.poly_list_planes.len() as u32;
            hull.poly_list_point_start = self.poly_list_points.len() as u32;
            hull.poly_list_string_start = self.poly_list_strings.len() as u32;

            for index in polys.keys() {
                self.poly_list_planes.push(self.hull_plane_indices[hull.plane_start as usize + *index as usize]);
            }
            self.poly_list_points.extend_from_slice(&self.hull_indices[hull.points.range()]);

            self.poly_list_strings.push(emit_byte(polys.len())?);
            for vertices in polys.values() {
                self.poly_list_strings.push(emit_byte(vertices.len())?);
                self.poly_list_strings.extend_from_slice(vertices);
            }
        }

        Ok(())
    }

    /// Drop everything
    pub fn purge(&mut self) {
        *self = Self::default();
    }
}

/// Side count of coordinate bin grid
pub const COORD_BIN_SIDE: usize = 16;

/// Distribute hulls over a 16x16 grid of XY bins covering `min`..`max`. Bin `(i, j)` has
/// index `i * 16 + j` and lists hulls whose XY rectangle strictly overlaps it.
pub fn coord_bins(hulls: &[ConvexHull], min: dif::Vec3, max: dif::Vec3) -> (Vec<Span>, Vec<u32>) {
    let step_x = (max.x - min.x) / COORD_BIN_SIDE as f32;
    let step_y = (max.y - min.y) / COORD_BIN_SIDE as f32;

    let mut bins = Vec::with_capacity(COORD_BIN_SIDE * COORD_BIN_SIDE);
    let mut indices = Vec::new();

    for i in 0..COORD_BIN_SIDE {
        let (bin_min_x, bin_max_x) = (min.x + step_x * i as f32, min.x + step_x * (i + 1) as f32);

        for j in 0..COORD_BIN_SIDE {
            let (bin_min_y, bin_max_y) = (min.y + step_y * j as f32, min.y + step_y * (j + 1) as f32);
            let start = indices.len();

            for (index, hull) in hulls.iter().enumerate() {
                if true
                    && hull.min.x < bin_max_x
                    && hull.max.x > bin_min_x
                    && hull.min.y < bin_max_y
                    && hull.max.y > bin_min_y
                {
                    indices.push(index as u32);
                }
            }

            bins.push(Span::from_lengths(start, indices.len()));
        }
    }

    (bins, indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Unit cube: points 0..8 as bits (x, y, z), faces listed clockwise from outside
    fn cube() -> (HullSource, Vec<dif::Vec3>) {
        let positions = (0..8u32)
            .map(|bits| dif::Vec3 { x: (bits & 1) as f32, y: ((bits >> 1) & 1) as f32, z: ((bits >> 2) & 1) as f32 })
            .collect::<Vec<_>>();

        let faces = [
            (0, vec![0, 2, 6, 4]),
            (1, vec![1, 5, 7, 3]),
            (2, vec![0, 4, 5, 1]),
            (3, vec![2, 3, 7, 6]),
            (4, vec![0, 1, 3, 2]),
            (5, vec![4, 6, 7, 5]),
        ];

        let source = HullSource {
            polys: faces.into_iter().map(|(plane, points)| HullPoly { plane, points }).collect(),
            surfaces: vec![0, 1, 2, 3, 4, 5],
        };

        (source, positions)
    }

    #[test]
    fn emit_string_encoding() {
        let emit = EmitString {
            points: vec![0, 3, 5],
            edges: vec![(0, 1), (1, 2), (0, 2)],
            polys: vec![(4, vec![0, 1, 2])],
        };

        let bytes = emit.encode().expect("string fits");
        assert_eq!(bytes, vec![3, 0, 3, 5, 3, 0, 1, 1, 2, 0, 2, 1, 3, 4, 0, 1, 2]);
        assert_eq!(EmitString::decode(&bytes), Some(emit));
        assert_eq!(EmitString::decode(&bytes[..8]), None);
    }

    #[test]
    fn poly_order() {
        assert_eq!(compare_hull_polys(&[0, 5, 2], &[1, 4, 3]), Ordering::Less);
        assert_eq!(compare_hull_polys(&[1, 4, 3], &[0, 5, 2]), Ordering::Greater);
        assert_eq!(compare_hull_polys(&[5, 4], &[4, 5, 0]), Ordering::Less);
        assert_eq!(compare_hull_polys(&[3, 1], &[1, 3]), Ordering::Equal);
    }

    #[test]
    fn cube_vertex_has_three_faces_and_edges() {
        let (source, positions) = cube();
        let mut tables = HullTables::default();
        let mut emitted = HashMap::new();

        tables.push_hull(&source, &positions, &mut emitted).expect("cube is exported");

        let hull = tables.hulls[0];
        assert_eq!(hull.points.count, 8);
        assert_eq!(tables.hull_plane_indices.len(), 6);
        assert_eq!(hull.min, dif::Vec3 { x: 0.0, y: 0.0, z: 0.0 });
        assert_eq!(hull.max, dif::Vec3 { x: 1.0, y: 1.0, z: 1.0 });

        for point in 0..8 {
            let emit = tables.emit_string(&hull, point).expect("emit string is valid");
            let own = emit.points.binary_search(&(point as u8)).expect("point is listed") as u8;

            assert_eq!(emit.polys.len(), 3);
            assert_eq!(emit.points.len(), 7);
            assert_eq!(emit.edges.iter().filter(|(a, b)| *a == own || *b == own).count(), 3);
        }
    }

    #[test]
    fn hull_points_follow_face_walk() {
        let (mut source, positions) = cube();
        source.polys[2].points = vec![5, 1, 0, 4];

        let mut tables = HullTables::default();
        tables.push_hull(&source, &positions, &mut HashMap::new()).expect("cube is exported");

        assert_eq!(tables.hull_indices, vec![0, 2, 6, 4, 1, 5, 7, 3]);

        // windings keep their starting vertex
        let hull = tables.hulls[0];
        let emit = tables.emit_string(&hull, 0).expect("emit string is valid");
        let side = emit.polys
            .iter()
            .find(|(index, _)| tables.hull_plane_indices[hull.plane_start as usize + *index as usize] == 2)
            .map(|(_, vertices)| vertices.iter().map(|vertex| emit.points[*vertex as usize]).collect::<Vec<_>>())
            .expect("side touches point 0");

        assert_eq!(side, vec![5, 4, 0, 3]);
    }

    #[test]
    fn poly_lists_are_rebuilt_from_emit_strings() {
        let (source, positions) = cube();
        let mut tables = HullTables::default();
        tables.push_hull(&source, &positions, &mut HashMap::new()).expect("cube is exported");

        tables.process_poly_lists().expect("poly lists are built");

        assert_eq!(tables.poly_list_planes.len(), 6);
        assert_eq!(tables.poly_list_points.len(), 8);
        assert_eq!(tables.poly_list_strings[0], 6);
        assert_eq!(tables.poly_list_strings.len(), 1 + 6 * 5);

        let mut planes = tables.poly_list_planes.clone();
        planes.sort();
        assert_eq!(planes, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn identical_strings_are_shared() {
        let (source, positions) = cube();
        let mut tables = HullTables::default();
        let mut emitted = HashMap::new();

        tables.push_hull(&source, &positions, &mut emitted).expect("first cube");
        let size = tables.emit_strings.len();
        tables.push_hull(&source, &positions, &mut emitted).expect("second cube");

        assert_eq!(tables.emit_strings.len(), size);
        assert_eq!(tables.hull_emit_string_indices[0..8], tables.hull_emit_string_indices[8..16]);
    }

    #[test]
    fn bins_cover_overlapping_hulls() {
        let hull = |min: (f32, f32), max: (f32, f32)| ConvexHull {
            min: dif::Vec3 { x: min.0, y: min.1, z: 0.0 },
            max: dif::Vec3 { x: max.0, y: max.1, z: 1.0 },
            ..Default::default()
        };
        let hulls = [hull((0.0, 0.0), (16.0, 16.0)), hull((0.0, 0.0), (1.0, 1.0)), hull((15.0, 0.0), (16.0, 1.0))];

        let (bins, indices) = coord_bins(&hulls, dif::Vec3 { x: 0.0, y: 0.0, z: 0.0 }, dif::Vec3 { x: 16.0, y: 16.0, z: 1.0 });

        assert_eq!(bins.len(), 256);
        assert_eq!(&indices[bins[0].range()], &[0, 1]);
        assert_eq!(&indices[bins[15 * 16].range()], &[0, 2]);
        assert_eq!(&indices[bins[1].range()], &[0]);
    }
}

// interior/hull.rs
