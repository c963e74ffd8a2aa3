///! Surface lightmaps
///!
///! Lightmap layout follows the dominant axis of the surface plane: lumels form a grid in
///! the two remaining world axes, `lumel_scale` world units per lumel. The lighter is a
///! plain Lambert sum of point lights over the zone ambient color, shadows are not traced.

use rayon::prelude::*;
use crate::{
    database::GeometryDatabase,
    error::CompileError,
    map::{AnimatedLight, Color, Entity, OmniLight, WorldSpawn},
    math::Vec3d,
    surface::{Surface, SurfaceFlags},
};

/// Animated light state tables
pub mod animated;

/// Lightmap sheet packing
pub mod packer;

use animated::{AnimatedLightData, LightStateData, StateData};

/// Maximal lightmap side, in lumels
pub const MAX_LIGHTMAP_SIZE: u32 = 256;

/// Light direction of lumels no light reaches, encoded
pub const DEFAULT_LIGHT_DIR: [u8; 3] = [128, 128, 255];

/// Raw 8-bit image
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitmap {
    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Bytes per pixel
    pub channels: u32,

    /// Row-major pixel data
    pub data: Vec<u8>,
}

impl Bitmap {
    /// Bitmap filled by zeros
    pub fn new(width: u32, height: u32, channels: u32) -> Self {
        Self {
            width,
            height,
            channels,
            data: vec![0; (width * height * channels) as usize],
        }
    }

    /// Bitmap with every pixel set to `pixel`
    pub fn filled(width: u32, height: u32, pixel: &[u8]) -> Self {
        let mut bitmap = Self::new(width, height, pixel.len() as u32);
        bitmap.fill(pixel);
        bitmap
    }

    /// Set every pixel to `pixel`
    pub fn fill(&mut self, pixel: &[u8]) {
        for chunk in self.data.chunks_exact_mut(self.channels as usize) {
            chunk.copy_from_slice(pixel);
        }
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        ((y * self.width + x) * self.channels) as usize
    }

    /// Pixel at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let offset = self.offset(x, y);
        &self.data[offset..offset + self.channels as usize]
    }

    /// Mutable pixel at (x, y)
    pub fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [u8] {
        let offset = self.offset(x, y);
        let channels = self.channels as usize;
        &mut self.data[offset..offset + channels]
    }

    /// Copy `source` into this bitmap with top left corner at (x, y)
    pub fn blit(&mut self, source: &Bitmap, x: u32, y: u32) {
        let row = (source.width * source.channels) as usize;

        for line in 0..source.height {
            let from = source.offset(0, line);
            let to = self.offset(x, y + line);
            self.data[to..to + row].copy_from_slice(&source.data[from..from + row]);
        }
    }
}

/// Position of surface lightmap in the sheets
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LightmapPlacement {
    /// Normal lighting sheet
    pub sheet: usize,

    /// Alarm lighting sheet, None if interior has no alarm state
    pub alarm_sheet: Option<usize>,

    /// Left lumel column
    pub x: u32,

    /// Top lumel row
    pub y: u32,
}

/// Lightmap of single surface
#[derive(Clone, Debug)]
pub struct SurfaceLightmap {
    /// Surface touches some zone other than outside
    pub is_inside: bool,

    /// Width in lumels
    pub width: u32,

    /// Height in lumels
    pub height: u32,

    /// World axes of lumel columns and rows (before swap)
    pub axes: (usize, usize),

    /// Lumel grid origin, in lumels along `axes`
    pub start: (f64, f64),

    /// World units per lumel
    pub lumel_scale: f64,

    /// Horizontal texture coordinate generator
    pub texgen_x: [f64; 4],

    /// Vertical texture coordinate generator
    pub texgen_y: [f64; 4],

    /// Width and height were swapped to make the map wide
    pub swapped: bool,

    /// Normal lighting map, dropped after packing
    pub normal: Option<Bitmap>,

    /// Alarm lighting map, None if it matches the normal one or interior has no alarm state
    pub alarm: Option<Bitmap>,

    /// Dominant light direction map, dropped after packing
    pub light_dir: Option<Bitmap>,

    /// Place in the sheets, set by packer
    pub placement: Option<LightmapPlacement>,
}

/// Lightmap grid coordinate for world coordinate `value`, start side
fn grid_start(value: f64) -> f64 {
    if value - value.floor() < 0.5 {
        (value - 1.0).floor()
    } else {
        value.floor()
    }
}

/// Lightmap grid coordinate for world coordinate `value`, end side
fn grid_end(value: f64) -> f64 {
    if value.ceil() - value < 0.5 {
        (value + 1.0).ceil()
    } else {
        value.ceil()
    }
}

impl SurfaceLightmap {
    /// Compute lightmap dimensions and texture coordinate generators for surface
    pub fn new(db: &GeometryDatabase, surface: &Surface, lumel_scale: f64) -> Result<Self, CompileError> {
        let plane = db.plane(surface.plane);
        let axes = match plane.dominant_axis() {
            0 => (1, 2),
            1 => (0, 2),
            _ => (0, 1),
        };

        let (mut min, mut max) = ((f64::MAX, f64::MAX), (f64::MIN, f64::MIN));
        for point in surface.winding.positions(db) {
            let (s, t) = (point.axis(axes.0), point.axis(axes.1));
            min = (min.0.min(s), min.1.min(t));
            max = (max.0.max(s), max.1.max(t));
        }

        let start = (grid_start(min.0 / lumel_scale), grid_start(min.1 / lumel_scale));
        let end = (grid_end(max.0 / lumel_scale), grid_end(max.1 / lumel_scale));

        let mut width = (end.0 - start.0 + 0.5) as u32;
        let mut height = (end.1 - start.1 + 0.5) as u32;

        if width > MAX_LIGHTMAP_SIZE || height > MAX_LIGHTMAP_SIZE {
            return Err(CompileError::LightmapTooLarge { width, height });
        }

        let mut texgen_x = [0.0; 4];
        let mut texgen_y = [0.0; 4];
        texgen_x[axes.0] = 1.0 / lumel_scale;
        texgen_x[3] = -start.0;
        texgen_y[axes.1] = 1.0 / lumel_scale;
        texgen_y[3] = -start.1;

        let swapped = width < height;
        if swapped {
            std::mem::swap(&mut width, &mut height);
            std::mem::swap(&mut texgen_x, &mut texgen_y);
        }

        Ok(Self {
            is_inside: surface.winding.zone_ids.iter().any(|zone| zone.into_index() != 0),
            width,
            height,
            axes,
            start,
            lumel_scale,
            texgen_x,
            texgen_y,
            swapped,
            normal: None,
            alarm: None,
            light_dir: None,
            placement: None,
        })
    }

    /// World position of lumel center
    pub fn lumel_position(&self, db: &GeometryDatabase, surface: &Surface, x: u32, y: u32) -> Vec3d {
        let (s, t) = if self.swapped { (y, x) } else { (x, y) };
        let plane = db.plane(surface.plane);
        let axis = 3 - self.axes.0 - self.axes.1;

        let mut position = [0.0; 3];
        position[self.axes.0] = (self.start.0 + s as f64 + 0.5) * self.lumel_scale;
        position[self.axes.1] = (self.start.1 + t as f64 + 0.5) * self.lumel_scale;
        position[axis] = -(plane.dist
            + plane.normal.axis(self.axes.0) * position[self.axes.0]
            + plane.normal.axis(self.axes.1) * position[self.axes.1])
            / plane.normal.axis(axis);

        Vec3d::new(position[0], position[1], position[2])
    }

    /// Lumel centers, row by row
    fn lumel_positions(&self, db: &GeometryDatabase, surface: &Surface) -> Vec<Vec3d> {
        (0..self.height)
            .flat_map(|y| (0..self.width).map(move |x| (x, y)))
            .map(|(x, y)| self.lumel_position(db, surface, x, y))
            .collect()
    }
}

/// Lambert term of point light with linear falloff between `falloff1` and `falloff2`
pub fn point_light_intensity(origin: Vec3d, falloff1: f64, falloff2: f64, position: Vec3d, normal: Vec3d) -> f64 {
    let to_light = origin - position;
    let distance = to_light.length();

    if distance <= f64::EPSILON {
        return 1.0;
    }

    let cosine = (to_light ^ normal) / distance;
    if cosine <= 0.0 {
        return 0.0;
    }

    let attenuation = if distance <= falloff1 {
        1.0
    } else if distance >= falloff2 {
        0.0
    } else {
        (falloff2 - distance) / (falloff2 - falloff1)
    };

    cosine * attenuation
}

/// Light source as seen by the lighter
#[derive(Copy, Clone, Debug)]
struct PointLight {
    origin: Vec3d,
    color: Color,
    falloff1: f64,
    falloff2: f64,
}

impl From<&OmniLight> for PointLight {
    fn from(light: &OmniLight) -> Self {
        Self {
            origin: light.origin,
            color: light.color,
            falloff1: light.falloff1,
            falloff2: light.falloff2,
        }
    }
}

/// Falloff of animated lights, they carry no falloff settings
const ANIMATED_FALLOFF: (f64, f64) = (100.0, 400.0);

/// Lit map of surface and its dominant light direction map
fn light_surface(
    db: &GeometryDatabase,
    surface: &Surface,
    lightmap: &SurfaceLightmap,
    ambient: Color,
    lights: &[PointLight],
) -> (Bitmap, Bitmap) {
    let ambient = match surface.flags.contains(SurfaceFlags::OUTSIDE_VISIBLE) {
        true => Color::default(),
        false => ambient,
    };

    let normal = db.plane(surface.plane).normal;
    let mut map = Bitmap::new(lightmap.width, lightmap.height, 3);
    let mut directions = Bitmap::filled(lightmap.width, lightmap.height, &DEFAULT_LIGHT_DIR);

    for (index, position) in lightmap.lumel_positions(db, surface).into_iter().enumerate() {
        let (x, y) = (index as u32 % lightmap.width, index as u32 / lightmap.width);
        let mut sum = ambient;
        let mut direction = Vec3d::zero();

        for light in lights {
            let intensity = point_light_intensity(light.origin, light.falloff1, light.falloff2, position, normal);
            if intensity <= 0.0 {
                continue;
            }

            sum.r += light.color.r * intensity as f32;
            sum.g += light.color.g * intensity as f32;
            sum.b += light.color.b * intensity as f32;

            if let Some(to_light) = (light.origin - position).checked_normalized() {
                direction += to_light * intensity;
            }
        }

        map.pixel_mut(x, y).copy_from_slice(&sum.to_rgb8());

        if let Some(direction) = direction.checked_normalized() {
            let encode = |c: f64| ((c * 0.5 + 0.5) * 255.0 + 0.5) as u8;
            directions.pixel_mut(x, y).copy_from_slice(&[encode(direction.x), encode(direction.y), encode(direction.z)]);
        }
    }

    (map, directions)
}

/// Intensity map of animated light state, None if light does not reach surface
fn animated_intensity(db: &GeometryDatabase, surface: &Surface, lightmap: &SurfaceLightmap, origin: Vec3d) -> Option<Bitmap> {
    let normal = db.plane(surface.plane).normal;
    let mut map = Bitmap::new(lightmap.width, lightmap.height, 1);
    let mut reached = false;

    for (pixel, position) in map.data.iter_mut().zip(lightmap.lumel_positions(db, surface)) {
        let intensity = point_light_intensity(origin, ANIMATED_FALLOFF.0, ANIMATED_FALLOFF.1, position, normal);
        *pixel = (intensity.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
        reached |= *pixel != 0;
    }

    reached.then_some(map)
}

/// Build state tables of animated light for one lighting mode
fn animated_light_data(
    db: &GeometryDatabase,
    surfaces: &[Surface],
    light: &AnimatedLight,
    alarm: bool,
) -> AnimatedLightData {
    let states = light.states
        .iter()
        .map(|state| {
            let data = match state.color == Color::default() {
                true => Vec::new(),
                false => surfaces
                    .iter()
                    .enumerate()
                    .filter_map(|(index, surface)| {
                        let lightmap = surface.lightmap.as_ref()?;
                        let map = animated_intensity(db, surface, lightmap, light.origin)?;

                        Some(StateData { surface: index, map: Some(map), state_data_index: 0 })
                    })
                    .collect(),
            };

            LightStateData {
                color: state.color.to_rgb8(),
                duration: state.duration,
                data,
            }
        })
        .collect();

    AnimatedLightData {
        name: light.name.clone(),
        flags: light.flags,
        alarm,
        states,
    }
}

/// Result of lighting pass
#[derive(Clone, Debug, Default)]
pub struct Lighting {
    /// Interior has distinct alarm lighting
    pub has_alarm_state: bool,

    /// Animated light state tables
    pub animated_lights: Vec<AnimatedLightData>,

    /// Packed lightmap sheets
    pub lightmaps: Vec<Bitmap>,

    /// Packed light direction sheets, parallel to `lightmaps` when present
    pub light_dir_maps: Vec<Bitmap>,
}

/// Compute lightmaps of every surface in normal and alarm mode
pub fn compute_lightmaps(
    db: &GeometryDatabase,
    surfaces: &mut [Surface],
    world: &WorldSpawn,
    entities: &[Entity],
    low_detail: bool,
) -> Result<Lighting, CompileError> {
    let omni_lights = entities
        .iter()
        .filter_map(|entity| match entity {
            Entity::OmniLight(light) => Some(light),
            _ => None,
        })
        .collect::<Vec<_>>();
    let animated_lights = entities
        .iter()
        .filter_map(|entity| match entity {
            Entity::AnimatedLight(light) => Some(light),
            _ => None,
        })
        .collect::<Vec<_>>();

    let normal_lights = omni_lights
        .iter()
        .filter(|light| light.alarm_type.is_normal())
        .map(|light| PointLight::from(*light))
        .collect::<Vec<_>>();
    let alarm_lights = omni_lights
        .iter()
        .filter(|light| light.alarm_type.is_alarm())
        .map(|light| PointLight::from(*light))
        .collect::<Vec<_>>();

    let has_alarm_state = match low_detail {
        true => false,
        false if !alarm_lights.is_empty() => true,
        false if animated_lights.iter().any(|light| light.alarm_type.is_alarm()) => true,
        false => {
            world.emergency_ambient_color != Color::default()
                && world.emergency_ambient_color != world.ambient_color
        }
    };

    surfaces.par_iter_mut().try_for_each(|surface| -> Result<(), CompileError> {
        let mut lightmap = SurfaceLightmap::new(db, surface, world.lumel_scale)?;

        if low_detail {
            lightmap.normal = Some(Bitmap::filled(lightmap.width, lightmap.height, &[0xFF; 3]));
            lightmap.light_dir = Some(Bitmap::filled(lightmap.width, lightmap.height, &DEFAULT_LIGHT_DIR));
        } else {
            let (normal, light_dir) = light_surface(db, surface, &lightmap, world.ambient_color, &normal_lights);
            lightmap.normal = Some(normal);
            lightmap.light_dir = Some(light_dir);

            if has_alarm_state {
                let (alarm, _) = light_surface(db, surface, &lightmap, world.emergency_ambient_color, &alarm_lights);
                lightmap.alarm = Some(alarm);
            }
        }

        surface.lightmap = Some(lightmap);
        Ok(())
    })?;

    let mut lighting = Lighting {
        has_alarm_state,
        ..Default::default()
    };

    if !low_detail {
        for light in &animated_lights {
            if light.alarm_type.is_normal() {
                lighting.animated_lights.push(animated_light_data(db, surfaces, light, false));
            }
            if has_alarm_state && light.alarm_type.is_alarm() {
                lighting.animated_lights.push(animated_light_data(db, surfaces, light, true));
            }
        }
    }

    log::debug!(
        "lit {} surfaces by {} static and {} animated lights, alarm state: {}",
        surfaces.len(),
        omni_lights.len(),
        lighting.animated_lights.len(),
        has_alarm_state,
    );

    Ok(lighting)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use crate::{
        config::CompileConfig,
        map::{TexGenId, TextureId},
        winding::Winding,
    };
    use super::*;

    fn floor(db: &mut GeometryDatabase, size: f64) -> Surface {
        let plane = db.insert_plane(Vec3d::new(0.0, 0.0, 1.0), 0.0);
        let points = [(0.0, 0.0), (0.0, size), (size, size), (size, 0.0)]
            .map(|(x, y)| db.insert_point(Vec3d::new(x, y, 0.0)))
            .to_vec();

        Surface {
            unique_key: 0,
            plane,
            texture: TextureId::from_index(4),
            texgen: TexGenId::from_index(0),
            winding: Winding::from_points(points.clone()),
            original_winding: Winding::from_points(points),
            flags: SurfaceFlags::empty(),
            fan_mask: 0b1111,
            lightmap: None,
            num_lights: 0,
            state_data_start: 0,
        }
    }

    #[test]
    fn grid_is_padded_by_a_lumel() {
        assert_eq!(grid_start(0.0), -1.0);
        assert_eq!(grid_start(0.7), 0.0);
        assert_eq!(grid_end(4.0), 5.0);
        assert_eq!(grid_end(3.2), 4.0);
    }

    #[test]
    fn floor_lightmap_layout() {
        let mut db = GeometryDatabase::new(&CompileConfig::default());
        let surface = floor(&mut db, 128.0);

        let lightmap = SurfaceLightmap::new(&db, &surface, 32.0).expect("lightmap fits");

        // [0, 4] lumels, padded by one on both sides
        assert_eq!((lightmap.width, lightmap.height), (6, 6));
        assert_eq!(lightmap.axes, (0, 1));
        assert_relative_eq!(lightmap.texgen_x[0], 1.0 / 32.0);
        assert_relative_eq!(lightmap.texgen_x[3], 1.0);

        let center = lightmap.lumel_position(&db, &surface, 1, 1);
        assert_relative_eq!(center.x, 16.0);
        assert_relative_eq!(center.y, 16.0);
        assert_relative_eq!(center.z, 0.0);
    }

    #[test]
    fn oversized_lightmap_is_rejected() {
        let mut db = GeometryDatabase::new(&CompileConfig::default());
        let surface = floor(&mut db, 4096.0);

        assert!(matches!(
            SurfaceLightmap::new(&db, &surface, 8.0),
            Err(CompileError::LightmapTooLarge { .. })
        ));
    }

    #[test]
    fn point_light_falloff() {
        let up = Vec3d::new(0.0, 0.0, 1.0);
        let origin = Vec3d::new(0.0, 0.0, 10.0);

        assert_relative_eq!(point_light_intensity(origin, 20.0, 40.0, Vec3d::zero(), up), 1.0);
        assert_relative_eq!(point_light_intensity(origin, 5.0, 15.0, Vec3d::zero(), up), 0.5);
        assert_relative_eq!(point_light_intensity(origin, 5.0, 8.0, Vec3d::zero(), up), 0.0);
        assert_relative_eq!(point_light_intensity(origin, 20.0, 40.0, Vec3d::zero(), -up), 0.0);
    }

    #[test]
    fn ambient_is_skipped_for_outside_visible_surfaces() {
        let mut db = GeometryDatabase::new(&CompileConfig::default());
        let mut surface = floor(&mut db, 64.0);
        let lightmap = SurfaceLightmap::new(&db, &surface, 32.0).expect("lightmap fits");
        let ambient = Color::new(0.5, 0.5, 0.5);

        let (inside, _) = light_surface(&db, &surface, &lightmap, ambient, &[]);
        assert_eq!(inside.pixel(0, 0), &[128, 128, 128]);

        surface.flags |= SurfaceFlags::OUTSIDE_VISIBLE;
        let (outside, directions) = light_surface(&db, &surface, &lightmap, ambient, &[]);
        assert!(outside.data.iter().all(|c| *c == 0));
        assert_eq!(directions.pixel(1, 1), &DEFAULT_LIGHT_DIR);
    }

    #[test]
    fn blit_copies_rows() {
        let mut sheet = Bitmap::new(4, 4, 1);
        let source = Bitmap::filled(2, 2, &[7]);

        sheet.blit(&source, 1, 2);

        assert_eq!(sheet.pixel(1, 2), &[7]);
        assert_eq!(sheet.pixel(2, 3), &[7]);
        assert_eq!(sheet.pixel(0, 2), &[0]);
        assert_eq!(sheet.data.iter().filter(|c| **c == 7).count(), 4);
    }
}

// lighting/mod.rs
