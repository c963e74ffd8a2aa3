///! Lightmap sheet packing
///!
///! Surface lightmaps are grouped by (ambient lit zone, animated lights, alarm map) and
///! every group is packed into its own 256x256 sheets by a skyline allocator. Surface
///! lightmap texgens are then remapped from lumels into sheet coordinates.

use crate::{
    bsp::zone::Zone,
    error::CompileError,
    surface::Surface,
};
use super::{Bitmap, Lighting, LightmapPlacement, SurfaceLightmap, DEFAULT_LIGHT_DIR};

/// Side of square lightmap sheet
pub const SHEET_SIZE: u32 = 256;

/// Skyline of single sheet
struct Sheet {
    /// Height of allocated area in every column
    allocated: Vec<u32>,
}

impl Sheet {
    fn new() -> Self {
        Self { allocated: vec![0; SHEET_SIZE as usize] }
    }

    /// Find the lowest position for rectangle and allocate it
    fn allocate(&mut self, width: u32, height: u32) -> Option<(u32, u32)> {
        let mut best = None::<(u32, u32)>;

        for x in 0..=(SHEET_SIZE - width) {
            let top = self.allocated[x as usize..(x + width) as usize]
                .iter()
                .copied()
                .max()
                .unwrap_or(0);

            if best.map_or(true, |(_, best_top)| top < best_top) {
                best = Some((x, top));
            }
        }

        let (x, y) = best.filter(|(_, y)| y + height <= SHEET_SIZE)?;

        for column in &mut self.allocated[x as usize..(x + width) as usize] {
            *column = y + height;
        }

        Some((x, y))
    }
}

/// Rectangle position in packed sheets
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SheetEntry {
    /// Sheet index
    pub sheet: usize,

    /// Left column
    pub x: u32,

    /// Top row
    pub y: u32,
}

/// Rectangle collector
#[derive(Clone, Debug, Default)]
pub struct SheetPacker {
    sizes: Vec<(u32, u32)>,
}

impl SheetPacker {
    /// Empty packer
    pub fn new() -> Self {
        Self::default()
    }

    /// Add rectangle, returns its index
    pub fn enter(&mut self, width: u32, height: u32) -> usize {
        self.sizes.push((width, height));
        self.sizes.len() - 1
    }

    /// Place every rectangle. Returns positions in entering order and the sheet count.
    pub fn pack(&self) -> Result<(Vec<SheetEntry>, usize), CompileError> {
        // tall rectangles first
        let mut order = (0..self.sizes.len()).collect::<Vec<_>>();
        order.sort_by(|lhs, rhs| {
            let (lhs, rhs) = (self.sizes[*lhs], self.sizes[*rhs]);
            rhs.1.cmp(&lhs.1).then(rhs.0.cmp(&lhs.0))
        });

        let mut sheets = Vec::<Sheet>::new();
        let mut entries = vec![SheetEntry { sheet: 0, x: 0, y: 0 }; self.sizes.len()];

        'rect_loop: for index in order {
            let (width, height) = self.sizes[index];

            if width == 0 || height == 0 || width > SHEET_SIZE || height > SHEET_SIZE {
                return Err(CompileError::Format(format!("cannot pack {}x{} lightmap", width, height)));
            }

            for (sheet_index, sheet) in sheets.iter_mut().enumerate() {
                if let Some((x, y)) = sheet.allocate(width, height) {
                    entries[index] = SheetEntry { sheet: sheet_index, x, y };
                    continue 'rect_loop;
                }
            }

            let mut sheet = Sheet::new();
            let (x, y) = sheet
                .allocate(width, height)
                .ok_or_else(|| CompileError::Format(format!("cannot pack {}x{} lightmap", width, height)))?;
            entries[index] = SheetEntry { sheet: sheets.len(), x, y };
            sheets.push(sheet);
        }

        Ok((entries, sheets.len()))
    }
}

/// Move lightmap texgen from surface lumels into sheet texture coordinates. Runtime
/// points are divided by `geometry_scale`, so plane normals are multiplied by it.
pub fn adjust_texgen(lightmap: &mut SurfaceLightmap, placement: LightmapPlacement, geometry_scale: f64) {
    let size = SHEET_SIZE as f64;

    for (texgen, offset) in [
        (&mut lightmap.texgen_x, placement.x),
        (&mut lightmap.texgen_y, placement.y),
    ] {
        for value in texgen.iter_mut() {
            *value /= size;
        }
        texgen[3] += offset as f64 / size;

        for value in &mut texgen[0..3] {
            *value *= geometry_scale;
        }
    }
}

/// Pack list of surfaces into freshly allocated sheets starting at `lighting.lightmaps.len()`
fn pack_list(
    surfaces: &mut [Surface],
    list: &[usize],
    lighting: &mut Lighting,
    separate_alarm: bool,
) -> Result<(), CompileError> {
    let mut packer = SheetPacker::new();
    for index in list {
        if let Some(lightmap) = &surfaces[*index].lightmap {
            packer.enter(lightmap.width, lightmap.height);
        }
    }

    let (entries, sheet_count) = packer.pack()?;
    let base = lighting.lightmaps.len();

    let sheets_per_group = if separate_alarm { 2 } else { 1 };
    for _ in 0..sheet_count * sheets_per_group {
        lighting.lightmaps.push(Bitmap::new(SHEET_SIZE, SHEET_SIZE, 3));

        if !lighting.has_alarm_state {
            lighting.light_dir_maps.push(Bitmap::filled(SHEET_SIZE, SHEET_SIZE, &DEFAULT_LIGHT_DIR));
        }
    }

    for (index, entry) in list.iter().zip(entries) {
        let Some(lightmap) = surfaces[*index].lightmap.as_mut() else {
            continue;
        };

        let placement = match (lighting.has_alarm_state, separate_alarm) {
            (false, _) => LightmapPlacement { sheet: base + entry.sheet, alarm_sheet: None, x: entry.x, y: entry.y },
            (true, false) => LightmapPlacement {
                sheet: base + entry.sheet,
                alarm_sheet: Some(base + entry.sheet),
                x: entry.x,
                y: entry.y,
            },
            (true, true) => LightmapPlacement {
                sheet: base + 2 * entry.sheet,
                alarm_sheet: Some(base + 2 * entry.sheet + 1),
                x: entry.x,
                y: entry.y,
            },
        };

        if let Some(normal) = lightmap.normal.take() {
            lighting.lightmaps[placement.sheet].blit(&normal, entry.x, entry.y);

            if let Some(alarm_sheet) = placement.alarm_sheet.filter(|sheet| *sheet != placement.sheet) {
                let alarm = lightmap.alarm.take().unwrap_or(normal);
                lighting.lightmaps[alarm_sheet].blit(&alarm, entry.x, entry.y);
            }
        }

        if let Some(light_dir) = lightmap.light_dir.take() {
            if let Some(sheet) = lighting.light_dir_maps.get_mut(placement.sheet) {
                sheet.blit(&light_dir, entry.x, entry.y);
            }
        }

        lightmap.alarm = None;
        lightmap.placement = Some(placement);
    }

    Ok(())
}

/// Pack surface lightmaps into sheets and adjust lightmap texgens
pub fn pack_lightmaps(
    surfaces: &mut [Surface],
    zones: &[Zone],
    lighting: &mut Lighting,
    geometry_scale: f64,
) -> Result<(), CompileError> {
    if lighting.has_alarm_state {
        for lightmap in surfaces.iter_mut().filter_map(|surface| surface.lightmap.as_mut()) {
            if lightmap.alarm.is_some() && lightmap.alarm == lightmap.normal {
                lightmap.alarm = None;
            }
        }
    }

    // bit 0: animated lights, bit 1: ambient lit zone, bit 2: alarm map shared with normal one
    let mut lists = vec![Vec::new(); if lighting.has_alarm_state { 8 } else { 4 }];

    for (index, surface) in surfaces.iter().enumerate() {
        let Some(lightmap) = &surface.lightmap else {
            continue;
        };

        let ambient_lit = surface.winding.zone_ids
            .first()
            .map_or(false, |zone| zones[zone.into_index()].ambient_lit);

        let mut code = 0;
        if ambient_lit {
            code |= 2;
        }
        if surface.num_lights != 0 {
            code |= 1;
        }
        if lighting.has_alarm_state && lightmap.alarm.is_none() {
            code |= 4;
        }

        lists[code].push(index);
    }

    for (code, list) in lists.iter().enumerate() {
        let separate_alarm = lighting.has_alarm_state && code < 4;
        pack_list(surfaces, list, lighting, separate_alarm)?;
    }

    for lightmap in surfaces.iter_mut().filter_map(|surface| surface.lightmap.as_mut()) {
        if let Some(placement) = lightmap.placement {
            adjust_texgen(lightmap, placement, geometry_scale);
        }
    }

    log::debug!("{} lightmap sheets", lighting.lightmaps.len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use super::*;

    fn overlaps(a: (SheetEntry, (u32, u32)), b: (SheetEntry, (u32, u32))) -> bool {
        let ((a, (aw, ah)), (b, (bw, bh))) = (a, b);

        a.sheet == b.sheet && a.x < b.x + bw && b.x < a.x + aw && a.y < b.y + bh && b.y < a.y + ah
    }

    #[test]
    fn rectangles_do_not_overlap() {
        let sizes = [(6, 6), (128, 40), (200, 3), (17, 90), (256, 256), (64, 64), (6, 6), (30, 2)];
        let mut packer = SheetPacker::new();
        for (width, height) in sizes {
            packer.enter(width, height);
        }

        let (entries, sheet_count) = packer.pack().expect("everything fits");

        assert!(sheet_count >= 2);
        for (index, entry) in entries.iter().enumerate() {
            assert!(entry.sheet < sheet_count);
            assert!(entry.x + sizes[index].0 <= SHEET_SIZE);
            assert!(entry.y + sizes[index].1 <= SHEET_SIZE);

            for other in index + 1..entries.len() {
                assert!(!overlaps((*entry, sizes[index]), (entries[other], sizes[other])));
            }
        }
    }

    #[test]
    fn oversized_rectangle_fails() {
        let mut packer = SheetPacker::new();
        packer.enter(257, 4);

        assert!(packer.pack().is_err());
    }

    #[test]
    fn texgen_maps_into_sheet() {
        let mut lightmap = SurfaceLightmap {
            is_inside: false,
            width: 6,
            height: 6,
            axes: (0, 1),
            start: (-1.0, -1.0),
            lumel_scale: 32.0,
            texgen_x: [1.0 / 32.0, 0.0, 0.0, 1.0],
            texgen_y: [0.0, 1.0 / 32.0, 0.0, 1.0],
            swapped: false,
            normal: None,
            alarm: None,
            light_dir: None,
            placement: None,
        };
        let placement = LightmapPlacement { sheet: 0, alarm_sheet: None, x: 10, y: 20 };

        adjust_texgen(&mut lightmap, placement, 2.0);

        // world point (32, 0) is lumel column 2, sheet column 12; runtime point is halved
        let u = lightmap.texgen_x[0] * 16.0 + lightmap.texgen_x[3];
        assert_relative_eq!(u, 12.0 / 256.0);

        let v = lightmap.texgen_y[1] * 0.0 + lightmap.texgen_y[3];
        assert_relative_eq!(v, 21.0 / 256.0);
    }
}

// lighting/packer.rs
