///! Runtime interior: flat, index-based arrays the game loads

use bitflags::bitflags;
use crate::lighting::Bitmap;

/// Binary records and array serialization
pub mod dif;

/// Convex hulls, emit strings and coordinate bins
pub mod hull;

/// Editor geometry to runtime arrays
pub mod export;

use dif::{check_indices, read_bitmaps, read_strings, read_u32, read_vec, write_bitmaps, write_strings, write_u32, write_vec, DifLoadingError, Span};
use hull::HullTables;

bitflags! {
    /// Animated light flags
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct LightFlags: u32 {
        /// Light runs by itself, not triggerable
        const AMBIENT = 1 << 0;

        /// Animation loops
        const LOOP = 1 << 1;

        /// Random state order
        const FLICKER = 1 << 2;

        /// Light belongs to alarm lighting
        const ALARM = 1 << 3;
    }
}

/// Collision geometry used by vehicles only
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VehicleCollision {
    /// Hulls
    pub hulls: HullTables,

    /// Hull points
    pub points: Vec<dif::Vec3>,

    /// Hull planes, deduplicated by exact equality
    pub planes: Vec<dif::Plane>,

    /// Null surface winding point indices
    pub windings: Vec<u32>,

    /// Hull faces
    pub null_surfaces: Vec<dif::NullSurface>,
}

/// Single detail level
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Interior {
    /// Detail level number, 0 is the most detailed
    pub detail_level: u32,

    /// Minimal projected size the level is used at
    pub min_pixels: u32,

    /// Bounding box minimum
    pub bound_min: dif::Vec3,

    /// Bounding box maximum
    pub bound_max: dif::Vec3,

    /// Bounding sphere center
    pub bounding_sphere_center: dif::Vec3,

    /// Bounding sphere radius
    pub bounding_sphere_radius: f32,

    /// Interior has distinct alarm lighting
    pub has_alarm_state: bool,

    /// Size of animated light state table
    pub num_light_state_entries: u32,

    /// Ambient color of normal lighting
    pub base_ambient: [u8; 4],

    /// Ambient color of alarm lighting
    pub alarm_ambient: [u8; 4],

    /// Material names
    pub materials: Vec<String>,

    /// Planes
    pub planes: Vec<dif::Plane>,

    /// Points
    pub points: Vec<dif::Vec3>,

    /// Visibility byte of every point
    pub point_visibility: Vec<u8>,

    /// Surface texgens
    pub texgens: Vec<dif::TexGen>,

    /// BSP nodes, root first
    pub bsp_nodes: Vec<dif::BspNode>,

    /// Solid leaves, spans in `solid_leaf_surfaces`
    pub solid_leaves: Vec<Span>,

    /// Surfaces of solid leaves, null surfaces have [`dif::NULL_SURFACE_FLAG`] set
    pub solid_leaf_surfaces: Vec<u32>,

    /// Point indices of every winding
    pub windings: Vec<u32>,

    /// Windings
    pub winding_indices: Vec<Span>,

    /// Zones
    pub zones: Vec<dif::Zone>,

    /// Zone surface lists
    pub zone_surfaces: Vec<u32>,

    /// Zone portal lists
    pub zone_portals: Vec<u32>,

    /// Portals
    pub portals: Vec<dif::Portal>,

    /// Surfaces
    pub surfaces: Vec<dif::Surface>,

    /// Normal lighting sheet of every surface
    pub normal_lmap_indices: Vec<u32>,

    /// Alarm lighting sheet of every surface, [`dif::NONE`] if no alarm state
    pub alarm_lmap_indices: Vec<u32>,

    /// Null surfaces
    pub null_surfaces: Vec<dif::NullSurface>,

    /// Lightmap sheets
    pub lightmaps: Vec<Bitmap>,

    /// Light direction sheets
    pub light_dir_maps: Vec<Bitmap>,

    /// Sheet must be kept in memory for animated lighting
    pub lightmap_keep: Vec<u8>,

    /// Animated lights, triggerable first
    pub animated_lights: Vec<dif::AnimatedLight>,

    /// Animated light names
    pub light_names: Vec<String>,

    /// Light states
    pub light_states: Vec<dif::LightState>,

    /// State intensity map references
    pub state_data: Vec<dif::StateData>,

    /// Intensity map bytes
    pub state_data_buffer: Vec<u8>,

    /// Collision hulls
    pub hulls: HullTables,

    /// Hull spans of coordinate bins
    pub coord_bins: Vec<Span>,

    /// Hull indices of coordinate bins
    pub coord_bin_indices: Vec<u32>,

    /// Vehicle collision
    pub vehicle: VehicleCollision,
}

fn write_hulls(dst: &mut dyn std::io::Write, hulls: &HullTables) -> Result<(), std::io::Error> {
    write_vec(dst, &hulls.hulls)?;
    write_vec(dst, &hulls.hull_indices)?;
    write_vec(dst, &hulls.hull_plane_indices)?;
    write_vec(dst, &hulls.hull_emit_string_indices)?;
    write_vec(dst, &hulls.hull_surface_indices)?;
    write_vec(dst, &hulls.emit_strings)?;
    write_vec(dst, &hulls.poly_list_planes)?;
    write_vec(dst, &hulls.poly_list_points)?;
    write_vec(dst, &hulls.poly_list_strings)
}

fn read_hulls(src: &mut dyn std::io::Read) -> Result<HullTables, std::io::Error> {
    Ok(HullTables {
        hulls: read_vec(src)?,
        hull_indices: read_vec(src)?,
        hull_plane_indices: read_vec(src)?,
        hull_emit_string_indices: read_vec(src)?,
        hull_surface_indices: read_vec(src)?,
        emit_strings: read_vec(src)?,
        poly_list_planes: read_vec(src)?,
        poly_list_points: read_vec(src)?,
        poly_list_strings: read_vec(src)?,
    })
}

/// Check hull tables reference existing points and planes
fn check_hulls(hulls: &HullTables, point_count: usize, plane_count: usize) -> Result<(), DifLoadingError> {
    check_indices("hull point", hulls.hull_indices.iter().copied(), point_count)?;
    check_indices("hull plane", hulls.hull_plane_indices.iter().map(|plane| plane & !dif::PLANE_FLIP_FLAG), plane_count)?;
    check_indices("emit string", hulls.hull_emit_string_indices.iter().copied(), hulls.emit_strings.len())?;

    for hull in &hulls.hulls {
        check_indices("hull point span", [hull.points.start + hull.points.count], hulls.hull_indices.len() + 1)?;
    }

    Ok(())
}

/// Check every span of `spans` lies in array of `count` elements
fn check_spans(what: &'static str, spans: &[Span], count: usize) -> Result<(), DifLoadingError> {
    check_indices(what, spans.iter().map(|span| span.start + span.count), count + 1)
}

impl Interior {
    /// Write detail level
    pub fn save(&self, dst: &mut dyn std::io::Write) -> Result<(), std::io::Error> {
        write_u32(dst, self.detail_level)?;
        write_u32(dst, self.min_pixels)?;
        write_vec(dst, &[self.bound_min, self.bound_max, self.bounding_sphere_center])?;
        write_vec(dst, &[self.bounding_sphere_radius])?;
        write_u32(dst, self.has_alarm_state as u32)?;
        write_u32(dst, self.num_light_state_entries)?;
        write_vec(dst, &[self.base_ambient, self.alarm_ambient])?;

        write_strings(dst, &self.materials)?;
        write_vec(dst, &self.planes)?;
        write_vec(dst, &self.points)?;
        write_vec(dst, &self.point_visibility)?;
        write_vec(dst, &self.texgens)?;
        write_vec(dst, &self.bsp_nodes)?;
        write_vec(dst, &self.solid_leaves)?;
        write_vec(dst, &self.solid_leaf_surfaces)?;
        write_vec(dst, &self.windings)?;
        write_vec(dst, &self.winding_indices)?;
        write_vec(dst, &self.zones)?;
        write_vec(dst, &self.zone_surfaces)?;
        write_vec(dst, &self.zone_portals)?;
        write_vec(dst, &self.portals)?;
        write_vec(dst, &self.surfaces)?;
        write_vec(dst, &self.normal_lmap_indices)?;
        write_vec(dst, &self.alarm_lmap_indices)?;
        write_vec(dst, &self.null_surfaces)?;
        write_bitmaps(dst, &self.lightmaps)?;
        write_bitmaps(dst, &self.light_dir_maps)?;
        write_vec(dst, &self.lightmap_keep)?;
        write_vec(dst, &self.animated_lights)?;
        write_strings(dst, &self.light_names)?;
        write_vec(dst, &self.light_states)?;
        write_vec(dst, &self.state_data)?;
        write_vec(dst, &self.state_data_buffer)?;
        write_hulls(dst, &self.hulls)?;
        write_vec(dst, &self.coord_bins)?;
        write_vec(dst, &self.coord_bin_indices)?;

        write_hulls(dst, &self.vehicle.hulls)?;
        write_vec(dst, &self.vehicle.points)?;
        write_vec(dst, &self.vehicle.planes)?;
        write_vec(dst, &self.vehicle.windings)?;
        write_vec(dst, &self.vehicle.null_surfaces)?;

        Ok(())
    }

    /// Read detail level and check its indices
    pub fn load(src: &mut dyn std::io::Read) -> Result<Self, DifLoadingError> {
        let detail_level = read_u32(src)?;
        let min_pixels = read_u32(src)?;

        let bounds = read_vec::<dif::Vec3>(src)?;
        let radius = read_vec::<f32>(src)?;
        let has_alarm_state = read_u32(src)? != 0;
        let num_light_state_entries = read_u32(src)?;
        let ambient = read_vec::<[u8; 4]>(src)?;

        check_indices("bound", [2], bounds.len())?;
        check_indices("radius", [0], radius.len())?;
        check_indices("ambient", [1], ambient.len())?;

        let interior = Self {
            detail_level,
            min_pixels,
            bound_min: bounds[0],
            bound_max: bounds[1],
            bounding_sphere_center: bounds[2],
            bounding_sphere_radius: radius[0],
            has_alarm_state,
            num_light_state_entries,
            base_ambient: ambient[0],
            alarm_ambient: ambient[1],
            materials: read_strings(src)?,
            planes: read_vec(src)?,
            points: read_vec(src)?,
            point_visibility: read_vec(src)?,
            texgens: read_vec(src)?,
            bsp_nodes: read_vec(src)?,
            solid_leaves: read_vec(src)?,
            solid_leaf_surfaces: read_vec(src)?,
            windings: read_vec(src)?,
            winding_indices: read_vec(src)?,
            zones: read_vec(src)?,
            zone_surfaces: read_vec(src)?,
            zone_portals: read_vec(src)?,
            portals: read_vec(src)?,
            surfaces: read_vec(src)?,
            normal_lmap_indices: read_vec(src)?,
            alarm_lmap_indices: read_vec(src)?,
            null_surfaces: read_vec(src)?,
            lightmaps: read_bitmaps(src)?,
            light_dir_maps: read_bitmaps(src)?,
            lightmap_keep: read_vec(src)?,
            animated_lights: read_vec(src)?,
            light_names: read_strings(src)?,
            light_states: read_vec(src)?,
            state_data: read_vec(src)?,
            state_data_buffer: read_vec(src)?,
            hulls: read_hulls(src)?,
            coord_bins: read_vec(src)?,
            coord_bin_indices: read_vec(src)?,
            vehicle: VehicleCollision {
                hulls: read_hulls(src)?,
                points: read_vec(src)?,
                planes: read_vec(src)?,
                windings: read_vec(src)?,
                null_surfaces: read_vec(src)?,
            },
        };

        interior.check()?;

        Ok(interior)
    }

    /// Check cross-array indices
    fn check(&self) -> Result<(), DifLoadingError> {
        let plane_count = self.planes.len();
        let strip_plane = |plane: u32| plane & !dif::PLANE_FLIP_FLAG;

        check_indices("winding point", self.windings.iter().copied(), self.points.len())?;
        check_spans("winding", &self.winding_indices, self.windings.len())?;
        check_spans("solid leaf", &self.solid_leaves, self.solid_leaf_surfaces.len())?;

        check_indices("node plane", self.bsp_nodes.iter().map(|node| strip_plane(node.plane)), plane_count)?;
        for node in &self.bsp_nodes {
            for child in [node.front, node.back] {
                match child & dif::SOLID_LEAF_FLAG {
                    dif::SOLID_LEAF_FLAG => check_indices("solid leaf", [child & !dif::SOLID_LEAF_FLAG], self.solid_leaves.len())?,
                    dif::EMPTY_LEAF_FLAG => {
                        if child & !dif::EMPTY_LEAF_FLAG != dif::NO_ZONE {
                            check_indices("zone", [child & !dif::EMPTY_LEAF_FLAG], self.zones.len())?;
                        }
                    }
                    _ => check_indices("node", [child], self.bsp_nodes.len())?,
                }
            }
        }

        check_indices("surface plane", self.surfaces.iter().map(|surface| strip_plane(surface.plane)), plane_count)?;
        check_indices("surface texture", self.surfaces.iter().map(|surface| surface.texture), self.materials.len())?;
        check_indices("surface texgen", self.surfaces.iter().map(|surface| surface.texgen), self.texgens.len())?;
        check_indices(
            "surface winding",
            self.surfaces.iter().map(|surface| surface.winding.start + surface.winding.count),
            self.windings.len() + 1,
        )?;
        check_indices(
            "null surface winding",
            self.null_surfaces.iter().map(|surface| surface.winding.start + surface.winding.count),
            self.windings.len() + 1,
        )?;

        check_indices("zone portal", self.zone_portals.iter().copied(), self.portals.len())?;
        check_indices("zone surface", self.zone_surfaces.iter().copied(), self.surfaces.len())?;
        check_indices("portal plane", self.portals.iter().map(|portal| strip_plane(portal.plane)), plane_count)?;
        check_indices(
            "portal winding",
            self.portals.iter().map(|portal| portal.tri_fans.start + portal.tri_fans.count),
            self.winding_indices.len() + 1,
        )?;

        check_indices("light state", self.animated_lights.iter().map(|light| light.states.start + light.states.count), self.light_states.len() + 1)?;
        check_indices("light name", self.animated_lights.iter().map(|light| light.name), self.light_names.len())?;
        check_indices("state data", self.light_states.iter().map(|state| state.data.start + state.data.count), self.state_data.len() + 1)?;
        check_indices("state surface", self.state_data.iter().map(|data| data.surface), self.surfaces.len())?;

        check_hulls(&self.hulls, self.points.len(), plane_count)?;
        check_spans("coord bin", &self.coord_bins, self.coord_bin_indices.len())?;
        check_indices("coord bin hull", self.coord_bin_indices.iter().copied(), self.hulls.hulls.len())?;

        check_hulls(&self.vehicle.hulls, self.vehicle.points.len(), self.vehicle.planes.len())?;
        check_indices("vehicle winding point", self.vehicle.windings.iter().copied(), self.vehicle.points.len())?;
        check_indices("vehicle plane", self.vehicle.null_surfaces.iter().map(|surface| surface.plane), self.vehicle.planes.len())?;
        check_indices(
            "vehicle null surface winding",
            self.vehicle.null_surfaces.iter().map(|surface| surface.winding.start + surface.winding.count),
            self.vehicle.windings.len() + 1,
        )?;

        Ok(())
    }

    /// Build collision poly lists of hulls and vehicle hulls, used by the most detailed level only
    pub fn process_hull_poly_lists(&mut self) -> Result<(), crate::error::CompileError> {
        self.hulls.process_poly_lists()?;
        self.vehicle.hulls.process_poly_lists()
    }

    /// Drop collision data not used by lower detail levels
    pub fn purge_lod_data(&mut self) {
        self.hulls.purge();
        self.coord_bins.clear();
        self.coord_bin_indices.clear();
        self.vehicle = VehicleCollision::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_interior() -> Interior {
        Interior {
            detail_level: 1,
            min_pixels: 250,
            bound_max: dif::Vec3 { x: 1.0, y: 1.0, z: 0.0 },
            bounding_sphere_radius: 0.75,
            base_ambient: [10, 20, 30, 0],
            materials: vec!["NULL".into(), "ORIGIN".into(), "TRIGGER".into(), "EMITTER".into(), "WALL".into()],
            planes: vec![dif::Plane { normal: dif::Vec3 { x: 0.0, y: 0.0, z: 1.0 }, dist: 0.0 }],
            points: vec![
                dif::Vec3 { x: 0.0, y: 0.0, z: 0.0 },
                dif::Vec3 { x: 0.0, y: 1.0, z: 0.0 },
                dif::Vec3 { x: 1.0, y: 0.0, z: 0.0 },
            ],
            point_visibility: vec![0xFF; 3],
            texgens: vec![dif::TexGen::default()],
            bsp_nodes: vec![dif::BspNode { plane: 0, front: dif::EMPTY_LEAF_FLAG, back: dif::SOLID_LEAF_FLAG }],
            solid_leaves: vec![Span { start: 0, count: 1 }],
            solid_leaf_surfaces: vec![0],
            windings: vec![0, 1, 2],
            winding_indices: vec![Span { start: 0, count: 3 }],
            zones: vec![dif::Zone { surfaces: Span { start: 0, count: 1 }, ..Default::default() }],
            zone_surfaces: vec![0],
            surfaces: vec![dif::Surface {
                winding: Span { start: 0, count: 3 },
                texture: 4,
                fan_mask: 0b111,
                map_size: [3, 3],
                ..Default::default()
            }],
            normal_lmap_indices: vec![0],
            alarm_lmap_indices: vec![dif::NONE],
            lightmaps: vec![Bitmap::filled(4, 4, &[1, 2, 3])],
            lightmap_keep: vec![0],
            ..Default::default()
        }
    }

    #[test]
    fn detail_level_survives_save_and_load() {
        let interior = triangle_interior();
        let mut bytes = Vec::new();
        interior.save(&mut bytes).expect("writing to vector succeeds");

        let loaded = Interior::load(&mut bytes.as_slice()).expect("interior is valid");

        assert_eq!(loaded, interior);
    }

    #[test]
    fn dangling_surface_plane_is_rejected() {
        let mut interior = triangle_interior();
        interior.surfaces[0].plane = 7 | dif::PLANE_FLIP_FLAG;

        let mut bytes = Vec::new();
        interior.save(&mut bytes).expect("writing to vector succeeds");

        assert!(matches!(
            Interior::load(&mut bytes.as_slice()),
            Err(DifLoadingError::InvalidIndex { what: "surface plane", index: 7, .. })
        ));
    }

    #[test]
    fn lod_purge_keeps_render_data() {
        let mut interior = triangle_interior();
        interior.coord_bins = vec![Span::default(); 256];
        interior.hulls.hull_indices = vec![0, 1, 2];

        interior.purge_lod_data();

        assert!(interior.coord_bins.is_empty());
        assert!(interior.hulls.hull_indices.is_empty());
        assert_eq!(interior.surfaces.len(), 1);
    }
}

// interior/mod.rs
