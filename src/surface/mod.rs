///! Visible surfaces: brush faces broken by the BSP, T-junction repair and render ordering

use bitflags::bitflags;
use crate::{
    brush::{Brush, BrushType},
    bsp::{zone::ZoneId, BspTree, SolidBrush},
    database::{GeometryDatabase, PlaneId},
    error::{ensure, CompileError},
    lighting::SurfaceLightmap,
    map::{TexGenId, TextureId},
    winding::Winding,
};

/// T-junction repair and oversize polygon splitting
pub mod tjunc;

/// Render order comparators
pub mod sort;

bitflags! {
    /// Surface flags, exported as is
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SurfaceFlags: u32 {
        /// Surface belongs to detail brush
        const DETAIL = 1;

        /// Surface belongs to brush with ambiguous planes
        const AMBIGUOUS = 2;

        /// Surface does not cover any solid leaf
        const ORPHAN = 4;

        /// Surface is visible from zones lit by outside light
        const OUTSIDE_VISIBLE = 16;
    }
}

/// Textured polygon
#[derive(Clone, Debug)]
pub struct Surface {
    /// Creation order key, used to make sorting total
    pub unique_key: u32,

    /// Surface plane
    pub plane: PlaneId,

    /// Texture
    pub texture: TextureId,

    /// Texture coordinate generator
    pub texgen: TexGenId,

    /// Current polygon, in strip order after [`SurfaceSet::convert_to_strips`]
    pub winding: Winding,

    /// Polygon before T-junction points were inserted
    pub original_winding: Winding,

    /// Flags
    pub flags: SurfaceFlags,

    /// Bit `i` is set if point `i` is not a T-junction fix point
    pub fan_mask: u32,

    /// Lightmap data, filled by the lighter
    pub lightmap: Option<SurfaceLightmap>,

    /// Count of animated lights affecting surface
    pub num_lights: u32,

    /// First entry of surface in light state table
    pub state_data_start: u32,
}

impl Surface {
    /// Check if surface winding touches zone
    pub fn is_member_of_zone(&self, zone: ZoneId) -> bool {
        self.winding.zone_ids.contains(&zone)
    }

    /// Check if surface carries alarm lightmap distinct from the normal one
    pub fn has_alarm_lightmap(&self) -> bool {
        self.lightmap.as_ref().map_or(false, |lightmap| lightmap.alarm.is_some())
    }

    /// Rotate winding so the first three points form the sharpest corner. Original winding
    /// is reset to the rotated one.
    pub fn rotate_to_non_colinear(&mut self, db: &GeometryDatabase) -> Result<(), CompileError> {
        let points = &self.winding.points;
        let count = points.len();

        let mut best = None::<usize>;
        let mut best_dot = 1.0f64;

        for index in 0..count {
            let p0 = db.point(points[index]);
            let p1 = db.point(points[(index + 1) % count]);
            let p2 = db.point(points[(index + 2) % count]);

            let dot = ((p1 - p0).normalized() ^ (p2 - p1).normalized()).abs();

            if dot < best_dot {
                best = Some(index);
                best_dot = dot;
            }
        }

        let Some(best) = best else {
            return Err(CompileError::Invariant(format!(
                "surface {} has no corner to start from",
                self.unique_key
            )));
        };

        self.winding.points.rotate_left(best);
        self.original_winding = self.winding.clone();

        Ok(())
    }
}

/// Untextured polygon, kept for collision
#[derive(Clone, Debug)]
pub struct NullSurface {
    /// Polygon plane
    pub plane: PlaneId,

    /// Polygon
    pub winding: Winding,

    /// Flags
    pub flags: SurfaceFlags,
}

/// All surfaces of one interior
#[derive(Clone, Debug, Default)]
pub struct SurfaceSet {
    /// Textured surfaces
    pub surfaces: Vec<Surface>,

    /// Untextured surfaces
    pub null_surfaces: Vec<NullSurface>,

    /// Count of polygons that cover no solid leaf
    pub orphan_count: usize,

    next_key: u32,
}

impl SurfaceSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate new unique key
    fn next_key(&mut self) -> u32 {
        let key = self.next_key;
        self.next_key += 1;
        key
    }

    /// Break every face of brush by the tree and emit surfaces for the visible parts
    pub fn add_brush_surfaces(
        &mut self,
        db: &mut GeometryDatabase,
        tree: &BspTree,
        brush: &Brush,
    ) -> Result<(), CompileError> {
        let source = SolidBrush { id: brush.id, brush_type: brush.brush_type };

        let mut base_flags = SurfaceFlags::empty();
        base_flags.set(SurfaceFlags::DETAIL, brush.brush_type == BrushType::Detail);
        base_flags.set(SurfaceFlags::AMBIGUOUS, brush.is_ambiguous);

        for plane in &brush.planes {
            let mut windings = Vec::new();
            tree.break_winding(tree.root(), db, &[plane.winding.stripped()], plane.plane, &source, &mut windings)?;

            let active = windings
                .iter()
                .flat_map(|winding| winding.zone_ids.iter())
                .any(|zone| tree.zone(*zone).active);

            let textured = match (plane.texture, plane.texgen) {
                (Some(texture), Some(texgen)) if active && !texture.is_invisible() => Some((texture, texgen)),
                _ => None,
            };

            for mut winding in windings {
                winding.brush_id = Some(brush.id);

                let mut flags = base_flags;
                if winding.solid_nodes.is_empty() {
                    flags |= SurfaceFlags::ORPHAN;
                    self.orphan_count += 1;
                }

                let Some((texture, texgen)) = textured else {
                    self.null_surfaces.push(NullSurface { plane: plane.plane, winding, flags });
                    continue;
                };

                // zones of one surface are either all outside or all inside
                if let Some(zone) = winding.zone_ids.first() {
                    flags.set(SurfaceFlags::OUTSIDE_VISIBLE, tree.zone(*zone).ambient_lit);
                }

                let unique_key = self.next_key();
                self.surfaces.push(Surface {
                    unique_key,
                    plane: plane.plane,
                    texture,
                    texgen,
                    winding,
                    original_winding: Winding::default(),
                    flags,
                    fan_mask: 0,
                    lightmap: None,
                    num_lights: 0,
                    state_data_start: 0,
                });
            }
        }

        Ok(())
    }

    /// Build surfaces of structural and detail brushes, repair T-junctions and
    /// convert polygons to strip order
    pub fn create(
        db: &mut GeometryDatabase,
        tree: &BspTree,
        structural: &[Brush],
        detail: &[Brush],
    ) -> Result<Self, CompileError> {
        let mut set = Self::new();

        for brush in structural {
            set.add_brush_surfaces(db, tree, brush)?;
        }
        set.sort();

        for brush in detail {
            set.add_brush_surfaces(db, tree, brush)?;
        }
        set.sort();

        for surface in &mut set.surfaces {
            surface.original_winding = surface.winding.clone();
        }

        set.sort();
        let mut passes = 1usize;
        while !set.fix_tjunctions(db)? {
            set.sort();
            passes += 1;
        }
        log::debug!("T-junctions fixed in {} passes, {} surfaces", passes, set.surfaces.len());

        set.mark_original_points()?;
        set.convert_to_strips();

        if set.orphan_count != 0 {
            log::warn!("{} orphan polygons", set.orphan_count);
        }

        Ok(set)
    }

    /// Set fan mask bits of points that were not inserted by T-junction repair
    pub fn mark_original_points(&mut self) -> Result<(), CompileError> {
        for surface in &mut self.surfaces {
            ensure!(
                surface.original_winding.len() <= surface.winding.len(),
                "surface {} lost points ({} / {})",
                surface.unique_key,
                surface.original_winding.len(),
                surface.winding.len()
            );

            surface.fan_mask = surface.winding.points
                .iter()
                .enumerate()
                .filter(|(_, point)| surface.original_winding.points.contains(point))
                .fold(0u32, |mask, (index, _)| mask | (1 << index));
        }

        Ok(())
    }

    /// Reorder fan windings into strips: first point, then alternately from front and back
    pub fn convert_to_strips(&mut self) {
        for surface in &mut self.surfaces {
            surface.winding.points = fan_to_strip(&surface.winding.points);
        }
    }
}

/// Permute fan order into triangle strip order
pub fn fan_to_strip<T: Copy>(fan: &[T]) -> Vec<T> {
    let Some(first) = fan.first() else {
        return Vec::new();
    };

    let mut strip = Vec::with_capacity(fan.len());
    strip.push(*first);

    let (mut front, mut back) = (1usize, fan.len() - 1);

    while strip.len() < fan.len() {
        strip.push(fan[front]);
        front += 1;

        if strip.len() >= fan.len() {
            break;
        }

        strip.push(fan[back]);
        back -= 1;
    }

    strip
}


// surface/mod.rs
