///! Editor geometry to runtime interior
///!
///! Only planes and points something references are exported. Planes are remapped in
///! forward/backward pairs: the runtime keeps the forward plane only and marks references
///! to the backward one by [`dif::PLANE_FLIP_FLAG`]. Runtime points are divided by the
///! world geometry scale.

use std::collections::{HashMap, HashSet};
use crate::{
    brush::Brush,
    bsp::{zone::ZoneId, BspTree, NodeId},
    database::{GeometryDatabase, PlaneId, PointId},
    geom::PlaneEq,
    error::{ensure, CompileError},
    lighting::Lighting,
    map::MapContents,
    math::Vec3d,
    surface::SurfaceSet,
    winding::{Winding, MAX_WINDING_POINTS},
};
use super::{
    dif::{self, Span},
    hull::{self, HullPoly, HullSource},
    Interior,
    LightFlags,
};

/// Everything one compile produced
pub struct ExportSource<'a> {
    /// Geometry
    pub db: &'a GeometryDatabase,

    /// Editor BSP
    pub tree: &'a BspTree,

    /// Visible and null surfaces, in lit order
    pub surfaces: &'a SurfaceSet,

    /// Brushes, textures and world settings
    pub contents: &'a MapContents,

    /// Packed lightmaps and animated lights
    pub lighting: &'a Lighting,

    /// Size of light state table
    pub light_state_entries: u32,
}

/// Order hull faces so every face shares an edge with an earlier one. Winding of every
/// face but the first is rotated to start at its first shared edge.
fn wrap_hull_faces(mut faces: Vec<HullPoly>) -> Vec<HullPoly> {
    let edge = |a: u32, b: u32| (a.min(b), a.max(b));
    let mut edges = HashSet::<(u32, u32)>::new();
    let mut ordered = Vec::with_capacity(faces.len());

    let push = |face: HullPoly, edges: &mut HashSet<(u32, u32)>, ordered: &mut Vec<HullPoly>| {
        for (index, point) in face.points.iter().enumerate() {
            edges.insert(edge(*point, face.points[(index + 1) % face.points.len()]));
        }
        ordered.push(face);
    };

    if faces.is_empty() {
        return ordered;
    }
    let first = faces.remove(0);
    push(first, &mut edges, &mut ordered);

    'face_loop: while !faces.is_empty() {
        for face_index in 0..faces.len() {
            let points = &faces[face_index].points;

            let shared = (0..points.len())
                .find(|index| edges.contains(&edge(points[*index], points[(index + 1) % points.len()])));

            if let Some(shared) = shared {
                let mut face = faces.remove(face_index);
                face.points.rotate_left(shared);
                push(face, &mut edges, &mut ordered);
                continue 'face_loop;
            }
        }

        // disconnected rest
        for face in std::mem::take(&mut faces) {
            push(face, &mut edges, &mut ordered);
        }
    }

    ordered
}

/// Export state: index remaps and the interior being filled
struct Exporter<'a> {
    db: &'a GeometryDatabase,
    geometry_scale: f64,

    /// Forward plane index to runtime plane
    plane_remap: HashMap<usize, u32>,

    /// Editor point to runtime point
    point_remap: HashMap<PointId, u32>,

    /// Editor point to vehicle collision point
    vehicle_point_remap: HashMap<PointId, u32>,

    interior: Interior,
}

impl<'a> Exporter<'a> {
    fn new(db: &'a GeometryDatabase, geometry_scale: f64) -> Self {
        Self {
            db,
            geometry_scale,
            plane_remap: HashMap::new(),
            point_remap: HashMap::new(),
            vehicle_point_remap: HashMap::new(),
            interior: Interior::default(),
        }
    }

    /// Runtime plane of editor plane equation
    fn runtime_plane(&self, plane: PlaneId) -> dif::Plane {
        let plane = self.db.plane(plane);

        dif::Plane {
            normal: plane.normal.into(),
            dist: (plane.dist / self.geometry_scale) as f32,
        }
    }

    /// Plane reference, flip flag set for backward planes
    fn export_plane(&mut self, plane: PlaneId) -> Result<u32, CompileError> {
        let key = plane.into_index() & !1;

        let index = match self.plane_remap.get(&key) {
            Some(index) => *index,
            None => {
                let index = self.interior.planes.len();
                if index >= dif::MAX_PLANES {
                    return Err(CompileError::TooManyPlanes(index + 1));
                }

                self.interior.planes.push(self.runtime_plane(PlaneId::from_index(key)));
                self.plane_remap.insert(key, index as u32);
                index as u32
            }
        };

        Ok(match plane.is_forward() {
            true => index,
            false => index | dif::PLANE_FLIP_FLAG,
        })
    }

    fn export_point(&mut self, point: PointId) -> u32 {
        if let Some(index) = self.point_remap.get(&point) {
            return *index;
        }

        let index = self.interior.points.len() as u32;
        self.interior.points.push((self.db.point(point) / self.geometry_scale).into());
        self.point_remap.insert(point, index);
        index
    }

    /// Push winding points, returns span in point index list
    fn export_winding(&mut self, winding: &Winding) -> Span {
        let start = self.interior.windings.len();

        for point in &winding.points {
            let index = self.export_point(*point);
            self.interior.windings.push(index);
        }

        Span::from_lengths(start, self.interior.windings.len())
    }

    /// Push polygon given by positions, returns span in point index list
    fn export_positions(&mut self, positions: &[Vec3d]) -> Span {
        let start = self.interior.windings.len();

        for position in positions {
            let index = self.interior.points.len() as u32;
            self.interior.points.push((*position / self.geometry_scale).into());
            self.interior.windings.push(index);
        }

        Span::from_lengths(start, self.interior.windings.len())
    }

    /// Vehicle planes are deduplicated by exact equality, both directions kept
    fn export_vehicle_plane(&mut self, plane: PlaneId) -> u32 {
        let plane = self.runtime_plane(plane);

        match self.interior.vehicle.planes.iter().position(|existing| *existing == plane) {
            Some(index) => index as u32,
            None => {
                self.interior.vehicle.planes.push(plane);
                (self.interior.vehicle.planes.len() - 1) as u32
            }
        }
    }

    fn export_vehicle_point(&mut self, point: PointId) -> u32 {
        if let Some(index) = self.vehicle_point_remap.get(&point) {
            return *index;
        }

        let index = self.interior.vehicle.points.len() as u32;
        self.interior.vehicle.points.push((self.db.point(point) / self.geometry_scale).into());
        self.vehicle_point_remap.insert(point, index);
        index
    }

    /// Reference every plane in a fixed order, so runtime plane indices do not depend on
    /// the order the tables are written in
    fn export_planes(&mut self, source: &ExportSource) -> Result<(), CompileError> {
        for surface in &source.surfaces.surfaces {
            self.export_plane(surface.plane)?;
        }
        for surface in &source.surfaces.null_surfaces {
            self.export_plane(surface.plane)?;
        }
        for portal in &source.tree.portals {
            if let Some(plane) = portal.plane {
                self.export_plane(plane)?;
            }
        }
        for brush in source.contents.structural.iter().chain(source.contents.detail.iter()) {
            for plane in &brush.planes {
                self.export_plane(plane.plane)?;
            }
        }
        for node in source.tree.preorder() {
            if let Some(split) = source.tree.node(node).split {
                self.export_plane(split.plane)?;
            }
        }

        Ok(())
    }

    /// Export subtree, returns node index or leaf code
    fn export_node(
        &mut self,
        tree: &BspTree,
        node: NodeId,
        solid_leaf_surfaces: &HashMap<NodeId, Vec<u32>>,
        zone_remap: &[Option<u32>],
    ) -> Result<u32, CompileError> {
        let current = tree.node(node);

        if let Some(split) = current.split {
            let index = self.interior.bsp_nodes.len();
            ensure!(index < dif::EMPTY_LEAF_FLAG as usize, "BSP node index {} does not fit into 15 bits", index);

            let plane = self.export_plane(split.plane)?;
            self.interior.bsp_nodes.push(dif::BspNode { plane, front: 0, back: 0 });

            let front = self.export_node(tree, split.front, solid_leaf_surfaces, zone_remap)?;
            let back = self.export_node(tree, split.back, solid_leaf_surfaces, zone_remap)?;

            self.interior.bsp_nodes[index].front = front;
            self.interior.bsp_nodes[index].back = back;

            return Ok(index as u32);
        }

        if current.is_solid {
            let index = self.interior.solid_leaves.len();
            if index > 0x3FFF {
                return Err(CompileError::Format(format!("solid leaf index {} does not fit into 14 bits", index)));
            }

            let start = self.interior.solid_leaf_surfaces.len();
            if let Some(surfaces) = solid_leaf_surfaces.get(&node) {
                self.interior.solid_leaf_surfaces.extend_from_slice(surfaces);
            }
            self.interior.solid_leaves.push(Span::from_lengths(start, self.interior.solid_leaf_surfaces.len()));

            return Ok(index as u32 | dif::SOLID_LEAF_FLAG);
        }

        let zone = current.zone
            .and_then(|zone| zone_remap[zone.into_index()])
            .unwrap_or(dif::NO_ZONE);

        Ok(zone | dif::EMPTY_LEAF_FLAG)
    }

    /// Hull of clipped brush in runtime points and planes
    fn hull_source(&mut self, source: &ExportSource, brush: &Brush) -> Result<HullSource, CompileError> {
        let mut faces = Vec::with_capacity(brush.planes.len());

        for plane in brush.planes.iter().filter(|plane| !plane.winding.is_empty()) {
            faces.push(HullPoly {
                plane: self.export_plane(plane.plane)?,
                points: plane.winding.points.iter().map(|point| self.export_point(*point)).collect(),
            });
        }

        let mut surfaces = Vec::new();
        for (index, surface) in source.surfaces.surfaces.iter().enumerate() {
            if surface.winding.brush_id == Some(brush.id) {
                surfaces.push(index as u32);
            }
        }
        for (index, surface) in source.surfaces.null_surfaces.iter().enumerate() {
            if surface.winding.brush_id == Some(brush.id) {
                surfaces.push(index as u32 | dif::NULL_SURFACE_FLAG);
            }
        }

        Ok(HullSource { polys: wrap_hull_faces(faces), surfaces })
    }

    /// Vehicle hull with its own null surfaces
    fn vehicle_hull_source(&mut self, brush: &Brush) -> HullSource {
        let mut faces = Vec::with_capacity(brush.planes.len());
        let mut surfaces = Vec::new();

        for plane in brush.planes.iter().filter(|plane| !plane.winding.is_empty()) {
            let runtime_plane = self.export_vehicle_plane(plane.plane);
            let points = plane.winding.points
                .iter()
                .map(|point| self.export_vehicle_point(*point))
                .collect::<Vec<_>>();

            let start = self.interior.vehicle.windings.len();
            self.interior.vehicle.windings.extend_from_slice(&points);

            surfaces.push(self.interior.vehicle.null_surfaces.len() as u32 | dif::VEHICLE_NULL_SURFACE_FLAG);
            self.interior.vehicle.null_surfaces.push(dif::NullSurface {
                winding: Span::from_lengths(start, self.interior.vehicle.windings.len()),
                plane: runtime_plane,
                flags: 0,
            });

            faces.push(HullPoly { plane: runtime_plane, points });
        }

        HullSource { polys: wrap_hull_faces(faces), surfaces }
    }

    fn export_surfaces(&mut self, source: &ExportSource) -> Result<(), CompileError> {
        for surface in &source.surfaces.surfaces {
            ensure!(
                surface.winding.len() <= MAX_WINDING_POINTS,
                "surface {} has {} points, maximum is {}",
                surface.unique_key,
                surface.winding.len(),
                MAX_WINDING_POINTS
            );

            let Some(lightmap) = &surface.lightmap else {
                return Err(CompileError::Invariant(format!("surface {} has no lightmap", surface.unique_key)));
            };
            let Some(placement) = lightmap.placement else {
                return Err(CompileError::Invariant(format!("lightmap of surface {} is not packed", surface.unique_key)));
            };

            let plane = self.export_plane(surface.plane)?;
            let winding = self.export_winding(&surface.winding);

            self.interior.surfaces.push(dif::Surface {
                winding,
                plane,
                texture: surface.texture.into_index() as u32,
                texgen: surface.texgen.into_index() as u32,
                flags: surface.flags.bits(),
                fan_mask: surface.fan_mask,
                light_count: surface.num_lights,
                light_state_start: surface.state_data_start,
                map_offset: [placement.x, placement.y],
                map_size: [lightmap.width, lightmap.height],
                lightmap_texgen: dif::TexGen {
                    x: lightmap.texgen_x.map(|value| value as f32),
                    y: lightmap.texgen_y.map(|value| value as f32),
                },
            });

            self.interior.normal_lmap_indices.push(placement.sheet as u32);
            self.interior.alarm_lmap_indices.push(placement.alarm_sheet.map_or(dif::NONE, |sheet| sheet as u32));
        }

        for surface in &source.surfaces.null_surfaces {
            let plane = self.export_plane(surface.plane)?;
            let winding = self.export_winding(&surface.winding);

            self.interior.null_surfaces.push(dif::NullSurface { winding, plane, flags: surface.flags.bits() });
        }

        Ok(())
    }

    fn export_zones(&mut self, source: &ExportSource) -> Result<Vec<Option<u32>>, CompileError> {
        let tree = source.tree;

        let mut zone_remap = Vec::with_capacity(tree.zones.len());
        let mut active = 0u32;
        for zone in &tree.zones {
            if zone.active {
                zone_remap.push(Some(active));
                active += 1;
            } else {
                zone_remap.push(None);
            }
        }
        if active >= dif::NO_ZONE {
            return Err(CompileError::Format(format!("{} active zones, maximum is {}", active, dif::NO_ZONE - 1)));
        }

        // planeless portals never got windings, they are dropped
        let mut portal_remap = Vec::with_capacity(tree.portals.len());
        for portal in &tree.portals {
            let Some(plane) = portal.plane else {
                portal_remap.push(None);
                continue;
            };
            portal_remap.push(Some(self.interior.portals.len() as u32));

            let zone_index = |zone: Option<ZoneId>| {
                zone.and_then(|zone| zone_remap[zone.into_index()]).unwrap_or(dif::NO_PORTAL_ZONE)
            };

            let plane = self.export_plane(plane)?;
            let fans_start = self.interior.winding_indices.len();

            match portal.windings.as_slice() {
                [] => {}
                [winding] => {
                    let span = self.export_winding(winding);
                    self.interior.winding_indices.push(span);
                }
                _ => {
                    let quad = portal.wrapped_quad(self.db);
                    let span = self.export_positions(&quad);
                    self.interior.winding_indices.push(span);
                }
            }

            self.interior.portals.push(dif::Portal {
                plane,
                tri_fans: Span::from_lengths(fans_start, self.interior.winding_indices.len()),
                zone_front: zone_index(portal.front_zone),
                zone_back: zone_index(portal.back_zone),
            });
        }

        for (index, zone) in tree.zones.iter().enumerate() {
            if !zone.active {
                continue;
            }

            let portal_start = self.interior.zone_portals.len();
            for portal in &zone.portals {
                if let Some(portal) = portal_remap[portal.into_index()] {
                    self.interior.zone_portals.push(portal);
                }
            }

            let surface_start = self.interior.zone_surfaces.len();
            for (surface_index, surface) in source.surfaces.surfaces.iter().enumerate() {
                if surface.is_member_of_zone(ZoneId::from_index(index)) {
                    self.interior.zone_surfaces.push(surface_index as u32);
                }
            }

            self.interior.zones.push(dif::Zone {
                portals: Span::from_lengths(portal_start, self.interior.zone_portals.len()),
                surfaces: Span::from_lengths(surface_start, self.interior.zone_surfaces.len()),
                zone_id: index as u32,
                flags: if zone.ambient_lit { 0 } else { dif::ZONE_INSIDE },
            });
        }

        Ok(zone_remap)
    }

    fn export_tree(&mut self, source: &ExportSource, zone_remap: &[Option<u32>]) -> Result<(), CompileError> {
        let mut solid_leaf_surfaces = HashMap::<NodeId, Vec<u32>>::new();

        for (index, surface) in source.surfaces.surfaces.iter().enumerate() {
            for node in &surface.winding.solid_nodes {
                solid_leaf_surfaces.entry(*node).or_default().push(index as u32);
            }
        }
        for (index, surface) in source.surfaces.null_surfaces.iter().enumerate() {
            for node in &surface.winding.solid_nodes {
                solid_leaf_surfaces.entry(*node).or_default().push(index as u32 | dif::NULL_SURFACE_FLAG);
            }
        }

        self.export_node(source.tree, source.tree.root(), &solid_leaf_surfaces, zone_remap)?;

        Ok(())
    }

    fn export_lights(&mut self, source: &ExportSource) {
        let lighting = source.lighting;
        let mut unnamed = 0usize;
        let mut lights = Vec::with_capacity(lighting.animated_lights.len());

        for light in &lighting.animated_lights {
            let name = match light.name.is_empty() {
                true => {
                    unnamed += 1;
                    format!("UNNAMED_{}", unnamed - 1)
                }
                false => light.name.clone(),
            };

            let mut flags = LightFlags::from_bits_truncate(light.flags);
            flags.set(LightFlags::ALARM, light.alarm);

            let state_start = self.interior.light_states.len();
            let mut duration = 0.0f32;

            for state in &light.states {
                let data_start = self.interior.state_data.len();

                for data in &state.data {
                    let map = match &data.map {
                        Some(map) => {
                            let offset = self.interior.state_data_buffer.len() as u32;
                            self.interior.state_data_buffer.extend_from_slice(&map.data);
                            offset
                        }
                        None => dif::NONE,
                    };

                    self.interior.state_data.push(dif::StateData {
                        surface: data.surface as u32,
                        map,
                        light_state: data.state_data_index,
                    });
                }

                self.interior.light_states.push(dif::LightState {
                    color: [state.color[0], state.color[1], state.color[2], 0],
                    active_time: (duration * 1000.0 + 0.5) as u32,
                    data: Span::from_lengths(data_start, self.interior.state_data.len()),
                });

                duration += state.duration;
            }

            self.interior.light_names.push(name);
            lights.push(dif::AnimatedLight {
                name: (self.interior.light_names.len() - 1) as u32,
                states: Span::from_lengths(state_start, self.interior.light_states.len()),
                flags: flags.bits(),
                duration: (duration * 1000.0 + 0.5) as u32,
            });
        }

        // triggerable lights first
        lights.sort_by_key(|light| LightFlags::from_bits_truncate(light.flags).contains(LightFlags::AMBIENT));
        self.interior.animated_lights = lights;
    }

    /// Bounding box and sphere around the mean of exported points
    fn export_bounds(&mut self) {
        let points = &self.interior.points;
        if points.is_empty() {
            return;
        }

        let mut min = dif::Vec3 { x: f32::MAX, y: f32::MAX, z: f32::MAX };
        let mut max = dif::Vec3 { x: f32::MIN, y: f32::MIN, z: f32::MIN };
        let mut center = Vec3d::zero();

        for point in points {
            min = dif::Vec3 { x: min.x.min(point.x), y: min.y.min(point.y), z: min.z.min(point.z) };
            max = dif::Vec3 { x: max.x.max(point.x), y: max.y.max(point.y), z: max.z.max(point.z) };
            center += Vec3d::from(*point);
        }
        center = center / points.len() as f64;

        let radius = points
            .iter()
            .map(|point| (Vec3d::from(*point) - center).length())
            .fold(0.0f64, f64::max);

        self.interior.bound_min = min;
        self.interior.bound_max = max;
        self.interior.bounding_sphere_center = center.into();
        self.interior.bounding_sphere_radius = radius as f32;
    }

    fn export_hulls(&mut self, source: &ExportSource) -> Result<(), CompileError> {
        let contents = source.contents;
        let hull_brushes = match contents.collision.is_empty() {
            true => contents.structural.iter().chain(contents.detail.iter()).collect::<Vec<_>>(),
            false => contents.collision.iter().collect::<Vec<_>>(),
        };

        let mut hulls = std::mem::take(&mut self.interior.hulls);
        let mut emitted = HashMap::new();
        for brush in hull_brushes {
            let hull = self.hull_source(source, brush)?;
            if !hull.polys.is_empty() {
                hulls.push_hull(&hull, &self.interior.points, &mut emitted)?;
            }
        }
        self.interior.hulls = hulls;

        let mut vehicle_hulls = std::mem::take(&mut self.interior.vehicle.hulls);
        let mut emitted = HashMap::new();
        for brush in &contents.vehicle_collision {
            let hull = self.vehicle_hull_source(brush);
            if !hull.polys.is_empty() {
                vehicle_hulls.push_hull(&hull, &self.interior.vehicle.points, &mut emitted)?;
            }
        }
        self.interior.vehicle.hulls = vehicle_hulls;

        let (bins, indices) = hull::coord_bins(&self.interior.hulls.hulls, self.interior.bound_min, self.interior.bound_max);
        self.interior.coord_bins = bins;
        self.interior.coord_bin_indices = indices;

        Ok(())
    }

    /// Point visibility and lightmap keep flags
    fn export_flags(&mut self) {
        let interior = &mut self.interior;

        interior.point_visibility = vec![0; interior.points.len()];
        for surface in &interior.surfaces {
            for point in &interior.windings[surface.winding.range()] {
                interior.point_visibility[*point as usize] = 0xFF;
            }
        }

        interior.lightmap_keep = vec![0; interior.lightmaps.len()];
        for data in &interior.state_data {
            let surface = data.surface as usize;
            let sheets = [interior.normal_lmap_indices[surface], interior.alarm_lmap_indices[surface]];

            for sheet in sheets.into_iter().filter(|sheet| *sheet != dif::NONE) {
                if let Some(keep) = interior.lightmap_keep.get_mut(sheet as usize) {
                    *keep = 1;
                }
            }
        }
    }
}

/// Build runtime interior of compiled geometry
pub fn export(source: &ExportSource) -> Result<Interior, CompileError> {
    let world = &source.contents.world_spawn;
    let mut exporter = Exporter::new(source.db, world.geometry_scale);

    exporter.export_planes(source)?;

    let zone_remap = exporter.export_zones(source)?;
    exporter.export_tree(source, &zone_remap)?;

    exporter.interior.materials = source.contents.textures
        .names()
        .iter()
        .map(|name| format!("{}{}", world.wad_prefix, name))
        .collect();

    exporter.interior.texgens = source.contents.textures
        .texgens()
        .iter()
        .map(|texgen| {
            let scaled = |plane: &PlaneEq| {
                let normal = plane.normal * world.geometry_scale;
                [normal.x as f32, normal.y as f32, normal.z as f32, plane.dist as f32]
            };

            dif::TexGen { x: scaled(&texgen.x), y: scaled(&texgen.y) }
        })
        .collect();

    exporter.export_surfaces(source)?;
    exporter.export_lights(source);

    let interior = &mut exporter.interior;
    interior.detail_level = world.detail_number;
    interior.min_pixels = world.min_pixels;
    interior.has_alarm_state = source.lighting.has_alarm_state;
    interior.num_light_state_entries = source.light_state_entries;

    let [r, g, b] = world.ambient_color.to_rgb8();
    interior.base_ambient = [r, g, b, 0];
    let [r, g, b] = world.emergency_ambient_color.to_rgb8();
    interior.alarm_ambient = [r, g, b, 0];

    interior.lightmaps = source.lighting.lightmaps.clone();
    interior.light_dir_maps = source.lighting.light_dir_maps.clone();

    exporter.export_bounds();
    exporter.export_hulls(source)?;
    exporter.export_flags();

    let interior = exporter.interior;
    log::debug!(
        "exported {} planes, {} points, {} nodes, {} zones, {} surfaces, {} hulls",
        interior.planes.len(),
        interior.points.len(),
        interior.bsp_nodes.len(),
        interior.zones.len(),
        interior.surfaces.len(),
        interior.hulls.hulls.len(),
    );

    Ok(interior)
}


// interior/export.rs
