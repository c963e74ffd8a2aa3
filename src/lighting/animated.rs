///! Animated light state tables
///!
///! Every state of a light lists the surfaces it reaches with an intensity map each. All
///! states of a light must list the same surfaces, so holes are filled by entries without
///! a map. Offsets into the flat state data table depend on surface order, so they are
///! computed only after surfaces are sorted by [`SurfaceSet::sort_lit`].

use std::collections::BTreeSet;
use crate::{
    error::{ensure, CompileError},
    surface::{Surface, SurfaceSet},
};
use super::Bitmap;

/// Intensity map of one light state on one surface
#[derive(Clone, Debug)]
pub struct StateData {
    /// Index of surface in the surface list
    pub surface: usize,

    /// Intensity map, None if state does not reach surface
    pub map: Option<Bitmap>,

    /// Entry index in the flat state data table
    pub state_data_index: u32,
}

/// One state of animated light
#[derive(Clone, Debug)]
pub struct LightStateData {
    /// State color
    pub color: [u8; 3],

    /// State duration, in seconds
    pub duration: f32,

    /// Surface maps of state
    pub data: Vec<StateData>,
}

/// Animated light prepared for export
#[derive(Clone, Debug)]
pub struct AnimatedLightData {
    /// Light name, may be empty
    pub name: String,

    /// Animation type flags
    pub flags: u32,

    /// Light belongs to alarm lighting
    pub alarm: bool,

    /// Animation states
    pub states: Vec<LightStateData>,
}

impl AnimatedLightData {
    /// Surfaces some state of light reaches, ascending
    pub fn affected_surfaces(&self) -> BTreeSet<usize> {
        self.states
            .iter()
            .flat_map(|state| state.data.iter())
            .filter(|data| data.map.is_some())
            .map(|data| data.surface)
            .collect()
    }

    /// Surfaces listed by some state, with or without map
    fn listed_surfaces(&self) -> BTreeSet<usize> {
        self.states
            .iter()
            .flat_map(|state| state.data.iter())
            .map(|data| data.surface)
            .collect()
    }

    /// Total animation length, in milliseconds
    pub fn duration_ms(&self) -> u32 {
        self.states
            .iter()
            .map(|state| (state.duration * 1000.0).round() as u32)
            .sum()
    }
}

/// Fill state holes and count lights of every surface
pub fn preprocess(lights: &mut [AnimatedLightData], surfaces: &mut [Surface]) {
    for surface in surfaces.iter_mut() {
        surface.num_lights = 0;
    }

    for light in lights.iter_mut() {
        let affected = light.affected_surfaces();

        for state in &mut light.states {
            for surface in &affected {
                if !state.data.iter().any(|data| data.surface == *surface) {
                    state.data.push(StateData { surface: *surface, map: None, state_data_index: 0 });
                }
            }
        }

        for surface in &affected {
            surfaces[*surface].num_lights += 1;
        }
    }
}

/// Sort surfaces into lit order and follow the move in light state tables
pub fn sort_lit_surfaces(set: &mut SurfaceSet, lights: &mut [AnimatedLightData]) {
    let remap = set.sort_lit();

    for data in lights
        .iter_mut()
        .flat_map(|light| light.states.iter_mut())
        .flat_map(|state| state.data.iter_mut())
    {
        data.surface = remap[data.surface];
    }
}

/// Assign state data table entries. Every surface owns `num_lights` consecutive entries,
/// lights take them in order. Returns count of entries.
pub fn postprocess(lights: &mut [AnimatedLightData], surfaces: &mut [Surface]) -> Result<u32, CompileError> {
    let mut start = 0u32;
    for surface in surfaces.iter_mut() {
        surface.state_data_start = start;
        start += surface.num_lights;
    }

    for light in lights.iter_mut() {
        for data in light.states.iter_mut().flat_map(|state| state.data.iter_mut()) {
            data.state_data_index = surfaces[data.surface].state_data_start;
        }

        for surface in light.listed_surfaces() {
            surfaces[surface].state_data_start += 1;
        }
    }

    let mut correct = 0u32;
    for (index, surface) in surfaces.iter_mut().enumerate() {
        ensure!(
            surface.state_data_start.checked_sub(surface.num_lights) == Some(correct),
            "light state entries of surface {} do not match its light count",
            index
        );

        surface.state_data_start = correct;
        correct += surface.num_lights;
    }

    Ok(surfaces
        .last()
        .map_or(0, |surface| surface.state_data_start + surface.num_lights))
}

#[cfg(test)]
mod tests {
    use crate::{
        database::PlaneId,
        map::{TexGenId, TextureId},
        surface::SurfaceFlags,
        winding::Winding,
    };
    use super::*;

    fn surface(key: u32) -> Surface {
        Surface {
            unique_key: key,
            plane: PlaneId::from_index(0),
            texture: TextureId::from_index(4),
            texgen: TexGenId::from_index(0),
            winding: Winding::default(),
            original_winding: Winding::default(),
            flags: SurfaceFlags::empty(),
            fan_mask: 0,
            lightmap: None,
            num_lights: 0,
            state_data_start: 0,
        }
    }

    fn state(surfaces: &[usize]) -> LightStateData {
        LightStateData {
            color: [255, 0, 0],
            duration: 0.5,
            data: surfaces
                .iter()
                .map(|surface| StateData {
                    surface: *surface,
                    map: Some(Bitmap::filled(1, 1, &[200])),
                    state_data_index: 0,
                })
                .collect(),
        }
    }

    fn light(states: Vec<LightStateData>) -> AnimatedLightData {
        AnimatedLightData { name: String::new(), flags: 0, alarm: false, states }
    }

    #[test]
    fn holes_are_filled() {
        let mut surfaces = (0..3).map(surface).collect::<Vec<_>>();
        let mut lights = vec![light(vec![state(&[0]), state(&[2]), state(&[])])];

        preprocess(&mut lights, &mut surfaces);

        for state in &lights[0].states {
            let mut listed = state.data.iter().map(|data| data.surface).collect::<Vec<_>>();
            listed.sort();
            assert_eq!(listed, vec![0, 2]);
        }
        assert_eq!(surfaces.iter().map(|surface| surface.num_lights).collect::<Vec<_>>(), vec![1, 0, 1]);
        assert_eq!(lights[0].duration_ms(), 1500);
    }

    #[test]
    fn state_offsets_follow_surface_order() {
        let mut surfaces = (0..3).map(surface).collect::<Vec<_>>();
        let mut lights = vec![
            light(vec![state(&[0, 2])]),
            light(vec![state(&[2]), state(&[1])]),
        ];

        preprocess(&mut lights, &mut surfaces);
        let total = postprocess(&mut lights, &mut surfaces).expect("offsets are consistent");

        // surface 0: one light, surface 1: one light, surface 2: two lights
        assert_eq!(total, 4);
        assert_eq!(surfaces.iter().map(|surface| surface.state_data_start).collect::<Vec<_>>(), vec![0, 1, 2]);

        let index_of = |light: usize, surface: usize| {
            lights[light].states[0].data
                .iter()
                .find(|data| data.surface == surface)
                .map(|data| data.state_data_index)
        };

        assert_eq!(index_of(0, 0), Some(0));
        assert_eq!(index_of(0, 2), Some(2));
        assert_eq!(index_of(1, 2), Some(3));
        assert_eq!(index_of(1, 1), Some(1));
    }
}

// lighting/animated.rs
