///! Surface render order
///!
///! Renderer batches consecutive surfaces, so the order is part of the output format:
///! alarm lightmap presence, texture, zone list, plane (descending).

use std::cmp::Ordering;
use super::{Surface, SurfaceSet};

/// Order of surfaces before animated lights are known
pub fn compare_surfaces(lhs: &Surface, rhs: &Surface) -> Ordering {
    rhs.has_alarm_lightmap().cmp(&lhs.has_alarm_lightmap())
        .then_with(|| compare_tail(lhs, rhs))
}

/// Order of surfaces after animated lights are assigned. Surfaces with no animated
/// lights go before lit ones.
pub fn compare_lit_surfaces(lhs: &Surface, rhs: &Surface) -> Ordering {
    rhs.has_alarm_lightmap().cmp(&lhs.has_alarm_lightmap())
        .then_with(|| (lhs.num_lights != 0).cmp(&(rhs.num_lights != 0)))
        .then_with(|| compare_tail(lhs, rhs))
}

fn compare_tail(lhs: &Surface, rhs: &Surface) -> Ordering {
    lhs.texture.cmp(&rhs.texture)
        .then_with(|| lhs.winding.zone_ids.cmp(&rhs.winding.zone_ids))
        .then_with(|| rhs.plane.cmp(&lhs.plane))
        .then_with(|| lhs.unique_key.cmp(&rhs.unique_key))
}

impl SurfaceSet {
    /// Sort zone lists of every surface (descending) and then surfaces themselves
    pub fn sort(&mut self) {
        for surface in &mut self.surfaces {
            if surface.winding.zone_ids.len() > 1 {
                surface.winding.zone_ids.sort_by(|lhs, rhs| rhs.cmp(lhs));
                surface.original_winding.zone_ids = surface.winding.zone_ids.clone();
            }
        }

        self.surfaces.sort_by(compare_surfaces);
    }

    /// Sort surfaces by the lit order. Returns `remap`, where `remap[old]` is the new
    /// index of the surface previously at `old`.
    pub fn sort_lit(&mut self) -> Vec<usize> {
        let mut order = (0..self.surfaces.len()).collect::<Vec<_>>();
        order.sort_by(|lhs, rhs| compare_lit_surfaces(&self.surfaces[*lhs], &self.surfaces[*rhs]));

        let mut remap = vec![0usize; order.len()];
        for (new_index, old_index) in order.iter().enumerate() {
            remap[*old_index] = new_index;
        }

        let mut slots = std::mem::take(&mut self.surfaces)
            .into_iter()
            .map(Some)
            .collect::<Vec<_>>();

        self.surfaces = order
            .iter()
            .filter_map(|old_index| slots[*old_index].take())
            .collect();

        remap
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        bsp::zone::ZoneId,
        database::PlaneId,
        map::{TexGenId, TextureId},
        rand::Lehmer,
        winding::Winding,
    };
    use super::{super::SurfaceFlags, *};

    fn surface(key: u32, texture: usize, zones: &[usize], plane: usize, num_lights: u32) -> Surface {
        Surface {
            unique_key: key,
            plane: PlaneId::from_index(plane),
            texture: TextureId::from_index(texture),
            texgen: TexGenId::from_index(0),
            winding: Winding {
                zone_ids: zones.iter().copied().map(ZoneId::from_index).collect(),
                ..Default::default()
            },
            original_winding: Winding::default(),
            flags: SurfaceFlags::empty(),
            fan_mask: 0,
            lightmap: None,
            num_lights,
            state_data_start: 0,
        }
    }

    fn keys(set: &SurfaceSet) -> Vec<u32> {
        set.surfaces.iter().map(|surface| surface.unique_key).collect()
    }

    fn fixture() -> Vec<Surface> {
        vec![
            surface(0, 5, &[0], 2, 0),
            surface(1, 4, &[1], 2, 1),
            surface(2, 4, &[0], 2, 0),
            surface(3, 4, &[0], 6, 0),
            surface(4, 4, &[0, 2], 6, 2),
            surface(5, 4, &[1, 0], 2, 0),
        ]
    }

    #[test]
    fn order_is_independent_of_input_order() {
        let mut expected = SurfaceSet { surfaces: fixture(), ..Default::default() };
        expected.sort();

        // texture 4 first; zone lists sorted descending: [0], [0], [1], [1, 0], [2, 0];
        // plane descending inside equal zone lists
        assert_eq!(keys(&expected), vec![3, 2, 1, 5, 4, 0]);

        let mut rand = Lehmer::new(17);
        for _ in 0..8 {
            let mut surfaces = fixture();
            rand.shuffle_tail(&mut surfaces);

            let mut set = SurfaceSet { surfaces, ..Default::default() };
            set.sort();
            assert_eq!(keys(&set), keys(&expected));
        }
    }

    #[test]
    fn lit_order_puts_unlit_first_and_reports_remap() {
        let mut set = SurfaceSet { surfaces: fixture(), ..Default::default() };
        set.sort();

        let before = keys(&set);
        let remap = set.sort_lit();

        assert_eq!(keys(&set), vec![3, 2, 5, 0, 1, 4]);
        for (old_index, key) in before.iter().enumerate() {
            assert_eq!(set.surfaces[remap[old_index]].unique_key, *key);
        }
    }
}

// surface/sort.rs
