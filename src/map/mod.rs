///! .map source model: texture table, entities and brush construction

use itertools::Itertools;
use crate::{
    brush::{Brush, BrushId, BrushType},
    config::CompileConfig,
    database::GeometryDatabase,
    geom::PlaneEq,
    math::Vec3d,
};

/// Tokenized .map parser
pub mod parse;

pub use parse::{FaceTexGen, MapParseError, RawBrush, RawEntity, RawFace, RawMap};

impl_id!(TextureId);
impl_id!(TexGenId);

/// Texture names every map gets first, in this order
pub const RESERVED_TEXTURES: [&str; 4] = ["NULL", "ORIGIN", "TRIGGER", "EMITTER"];

impl TextureId {
    /// Texture of faces that are not rendered
    pub fn null() -> Self {
        Self::from_index(0)
    }

    /// Texture marking door origin brush
    pub fn origin() -> Self {
        Self::from_index(1)
    }

    /// Texture of trigger volumes
    pub fn trigger() -> Self {
        Self::from_index(2)
    }

    /// Check if faces with texture produce no visible surface
    pub fn is_invisible(self) -> bool {
        self == Self::null() || self == Self::origin() || self == Self::trigger()
    }
}

/// Texture coordinate generation planes, `u = x.normal ^ p + x.dist`
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TexGen {
    /// U projection plane
    pub x: PlaneEq,

    /// V projection plane
    pub y: PlaneEq,
}

/// Quake 3 base texture axes: [normal, u, v] triplets
const BASE_AXES: [[Vec3d; 3]; 6] = [
    [Vec3d::new(0.0, 0.0, 1.0), Vec3d::new(1.0, 0.0, 0.0), Vec3d::new(0.0, -1.0, 0.0)], // floor
    [Vec3d::new(0.0, 0.0, -1.0), Vec3d::new(1.0, 0.0, 0.0), Vec3d::new(0.0, -1.0, 0.0)], // ceiling
    [Vec3d::new(1.0, 0.0, 0.0), Vec3d::new(0.0, 1.0, 0.0), Vec3d::new(0.0, 0.0, -1.0)], // west wall
    [Vec3d::new(-1.0, 0.0, 0.0), Vec3d::new(0.0, 1.0, 0.0), Vec3d::new(0.0, 0.0, -1.0)], // east wall
    [Vec3d::new(0.0, 1.0, 0.0), Vec3d::new(1.0, 0.0, 0.0), Vec3d::new(0.0, 0.0, -1.0)], // south wall
    [Vec3d::new(0.0, -1.0, 0.0), Vec3d::new(1.0, 0.0, 0.0), Vec3d::new(0.0, 0.0, -1.0)], // north wall
];

impl TexGen {
    /// Find texture axes of the first base axis the normal is closest to
    pub fn base_axes(normal: Vec3d) -> (Vec3d, Vec3d) {
        let mut best = 0.0;
        let mut best_axis = &BASE_AXES[0];

        for axis in &BASE_AXES {
            let dot = axis[0] ^ normal;

            if dot > best {
                best = dot;
                best_axis = axis;
            }
        }

        (best_axis[1], best_axis[2])
    }

    /// Build texgen of face, normalised by texture size
    pub fn from_face(face: &RawFace, width: f64, height: f64) -> Self {
        match face.texgen {
            FaceTexGen::Quake2 { u, v, scale_x, scale_y, .. } => Self {
                x: PlaneEq {
                    normal: Vec3d::new(u[0], u[1], u[2]) / (scale_x * width),
                    dist: u[3] / width,
                },
                y: PlaneEq {
                    normal: Vec3d::new(v[0], v[1], v[2]) / (scale_y * height),
                    dist: v[3] / height,
                },
            },
            FaceTexGen::Quake3 { shift_u, shift_v, rotation, scale_x, scale_y } => {
                let [p0, p1, p2] = face.points;
                let normal = ((p0 - p1) % (p2 - p1)).checked_normalized().unwrap_or(Vec3d::zero());

                let (u, v) = Self::base_axes(normal);
                let mut vecs = [[u.x, u.y, u.z], [v.x, v.y, v.z]];

                let first_nonzero = |vec: &[f64; 3]| vec.iter().position(|c| *c != 0.0).unwrap_or(2);
                let sv = first_nonzero(&vecs[0]);
                let tv = first_nonzero(&vecs[1]);

                let (sin, cos) = rotation.to_radians().sin_cos();

                for vec in &mut vecs {
                    let ns = cos * vec[sv] - sin * vec[tv];
                    let nt = sin * vec[sv] + cos * vec[tv];
                    vec[sv] = ns;
                    vec[tv] = nt;
                }

                Self {
                    x: PlaneEq {
                        normal: Vec3d::new(vecs[0][0], vecs[0][1], vecs[0][2]) / (scale_x * width),
                        dist: shift_u / width,
                    },
                    y: PlaneEq {
                        normal: Vec3d::new(vecs[1][0], vecs[1][1], vecs[1][2]) / (scale_y * height),
                        dist: shift_v / height,
                    },
                }
            }
        }
    }
}

/// Texture name and texgen storage of a single compile
#[derive(Clone, Debug)]
pub struct TextureTable {
    /// Upper-case texture names
    names: Vec<String>,

    /// Texgen set, exact duplicates are merged
    texgens: Vec<TexGen>,
}

impl TextureTable {
    /// Build table with reserved textures
    pub fn new() -> Self {
        let mut table = Self { names: Vec::new(), texgens: Vec::new() };

        for name in RESERVED_TEXTURES {
            table.insert_texture(name);
        }

        table
    }

    /// Insert texture name, lookup is case-insensitive
    pub fn insert_texture(&mut self, name: &str) -> TextureId {
        let name = name.to_ascii_uppercase();

        if let Some(index) = self.names.iter().position(|existing| *existing == name) {
            return TextureId::from_index(index);
        }

        self.names.push(name);
        TextureId::from_index(self.names.len() - 1)
    }

    /// Find texture by name
    pub fn find_texture(&self, name: &str) -> Option<TextureId> {
        self.names
            .iter()
            .position(|existing| existing.eq_ignore_ascii_case(name))
            .map(TextureId::from_index)
    }

    /// Texture name
    pub fn name(&self, id: TextureId) -> &str {
        &self.names[id.into_index()]
    }

    /// Every texture name, indexed by TextureId
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Insert texgen, exact duplicates are merged
    pub fn insert_texgen(&mut self, texgen: TexGen) -> TexGenId {
        if let Some(index) = self.texgens.iter().position(|existing| *existing == texgen) {
            return TexGenId::from_index(index);
        }

        self.texgens.push(texgen);
        TexGenId::from_index(self.texgens.len() - 1)
    }

    /// Texgen by id
    pub fn texgen(&self, id: TexGenId) -> &TexGen {
        &self.texgens[id.into_index()]
    }

    /// Every texgen, indexed by TexGenId
    pub fn texgens(&self) -> &[TexGen] {
        &self.texgens
    }
}

impl Default for TextureTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Linear RGB color, components in [0, 1]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Color {
    /// Red
    pub r: f32,

    /// Green
    pub g: f32,

    /// Blue
    pub b: f32,
}

impl Color {
    /// Build color from components
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// White color
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0);

    /// Clamp components into [0, 1] and quantize
    pub fn to_rgb8(self) -> [u8; 3] {
        let quantize = |c: f32| (c.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;

        [quantize(self.r), quantize(self.g), quantize(self.b)]
    }
}

/// `worldspawn` settings
#[derive(Clone, Debug, PartialEq)]
pub struct WorldSpawn {
    /// Detail level number, 0 is the most detailed
    pub detail_number: u32,

    /// Minimal projected pixel size of the level
    pub min_pixels: u32,

    /// World units per exported unit, power of two
    pub geometry_scale: f64,

    /// World units per lightmap texel
    pub lumel_scale: f64,

    /// Ambient color of zones not reached by outside light
    pub ambient_color: Color,

    /// Ambient color of alarm lighting
    pub emergency_ambient_color: Color,

    /// Prefix prepended to exported material names (`name/`), may be empty
    pub wad_prefix: String,
}

impl Default for WorldSpawn {
    fn default() -> Self {
        Self {
            detail_number: 0,
            min_pixels: 250,
            geometry_scale: 32.0,
            lumel_scale: 32.0,
            ambient_color: Color::default(),
            emergency_ambient_color: Color::default(),
            wad_prefix: String::new(),
        }
    }
}

/// Which lighting mode light takes part in
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum AlarmType {
    /// Normal lighting only
    #[default]
    NormalOnly,

    /// Alarm lighting only
    AlarmOnly,

    /// Both lighting modes
    Both,
}

impl AlarmType {
    /// Decode `alarm_type` value
    pub fn from_value(value: i64) -> Self {
        match value {
            1 => Self::AlarmOnly,
            2 => Self::Both,
            _ => Self::NormalOnly,
        }
    }

    /// Check if light takes part in normal lighting
    pub fn is_normal(self) -> bool {
        self != Self::AlarmOnly
    }

    /// Check if light takes part in alarm lighting
    pub fn is_alarm(self) -> bool {
        self != Self::NormalOnly
    }
}

/// `target` entity
#[derive(Clone, Debug, PartialEq)]
pub struct Target {
    /// Position
    pub origin: Vec3d,

    /// Target name
    pub name: String,
}

/// `light_omni` static point light
#[derive(Clone, Debug, PartialEq)]
pub struct OmniLight {
    /// Position
    pub origin: Vec3d,

    /// Light name
    pub name: String,

    /// Light color
    pub color: Color,

    /// Lighting mode
    pub alarm_type: AlarmType,

    /// Full intensity distance
    pub falloff1: f64,

    /// Zero intensity distance
    pub falloff2: f64,
}

/// Animated light state
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LightState {
    /// State duration (in seconds)
    pub duration: f32,

    /// State color
    pub color: Color,
}

/// Maximal count of animated light states
pub const MAX_LIGHT_STATES: usize = 32;

/// Animation type bits of `spawnflags`
pub const ANIMATION_TYPE_MASK: u32 = 0x7;

/// `light` animated light
#[derive(Clone, Debug, PartialEq)]
pub struct AnimatedLight {
    /// Position
    pub origin: Vec3d,

    /// Light name
    pub name: String,

    /// Animation flags
    pub flags: u32,

    /// Lighting mode
    pub alarm_type: AlarmType,

    /// Light states, at least one
    pub states: Vec<LightState>,
}

/// Door movement waypoint
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct WayPoint {
    /// Position, in world units
    pub position: Vec3d,

    /// Time to the next waypoint (in milliseconds)
    pub ms_to_next: u32,

    /// Smoothing type
    pub smoothing: u32,
}

/// `Door_Elevator` moving sub-interior
#[derive(Clone, Debug, PartialEq)]
pub struct Door {
    /// Door name
    pub name: String,

    /// Datablock name
    pub datablock: String,

    /// Path name
    pub path_name: String,

    /// Other properties
    pub properties: Vec<(String, String)>,

    /// Origin, in exported units
    pub origin: Vec3d,

    /// Door brushes, origin brush excluded
    pub brushes: Vec<RawBrush>,

    /// Movement path
    pub way_points: Vec<WayPoint>,

    /// Sum of waypoint times, the last one excluded
    pub total_ms: u32,

    /// Indices of triggers declared after the door
    pub trigger_ids: Vec<usize>,
}

impl Door {
    /// Append waypoint
    pub fn add_path_node(&mut self, way_point: WayPoint) {
        if let Some(last) = self.way_points.last() {
            self.total_ms += last.ms_to_next;
        }

        self.way_points.push(way_point);
    }
}

/// Convex polyhedron edge
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PolyhedronEdge {
    /// Indices of faces sharing the edge
    pub faces: [u32; 2],

    /// Indices of edge points
    pub vertices: [u32; 2],
}

/// Convex volume given by points, planes and edges
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Polyhedron {
    /// Vertices
    pub points: Vec<Vec3d>,

    /// Face planes
    pub planes: Vec<PlaneEq>,

    /// Edges
    pub edges: Vec<PolyhedronEdge>,
}

/// `trigger` volume
#[derive(Clone, Debug, PartialEq)]
pub struct Trigger {
    /// Trigger name
    pub name: String,

    /// Datablock name
    pub datablock: String,

    /// Other properties
    pub properties: Vec<(String, String)>,

    /// Volume center, in exported units
    pub origin: Vec3d,

    /// Volume relative to origin, in exported units
    pub polyhedron: Polyhedron,
}

/// Entity of any other class
#[derive(Clone, Debug, PartialEq)]
pub struct GameEntity {
    /// Class name
    pub class_name: String,

    /// Position
    pub origin: Vec3d,

    /// Datablock name
    pub datablock: String,

    /// Game class name
    pub game_class: String,

    /// Other properties
    pub properties: Vec<(String, String)>,
}

/// Map entity kinds that outlive parsing
#[derive(Clone, Debug, PartialEq)]
pub enum Entity {
    /// Named position
    Target(Target),

    /// Static point light
    OmniLight(OmniLight),

    /// Animated light
    AnimatedLight(AnimatedLight),

    /// Moving sub-interior
    Door(Door),

    /// Trigger volume
    Trigger(Trigger),

    /// Any other entity
    Game(GameEntity),
}

/// Portal brush with its entity settings
#[derive(Clone, Debug)]
pub struct PortalBrush {
    /// Portal volume
    pub brush: Brush,

    /// Ambient (outside) light passes the portal
    pub pass_ambient_light: bool,
}

/// Everything a compile needs from .map file
#[derive(Clone, Debug)]
pub struct MapContents {
    /// World settings
    pub world_spawn: WorldSpawn,

    /// Texture and texgen table
    pub textures: TextureTable,

    /// World brushes
    pub structural: Vec<Brush>,

    /// Detail brushes
    pub detail: Vec<Brush>,

    /// Zone separators
    pub portals: Vec<PortalBrush>,

    /// Collision-only brushes
    pub collision: Vec<Brush>,

    /// Vehicle collision-only brushes
    pub vehicle_collision: Vec<Brush>,

    /// Other entities
    pub entities: Vec<Entity>,

    /// Count of brushes with contradicting faces
    pub ambiguous_brush_count: usize,
}

/// Parse integer property
fn parse_int<'t>(token: &'t str) -> Result<i64, MapParseError<'t>> {
    token.trim().parse::<i64>().map_err(|error| MapParseError::IntParsingError { token, error })
}

/// Parse float property
fn parse_float<'t>(token: &'t str) -> Result<f64, MapParseError<'t>> {
    token.trim().parse::<f64>().map_err(|error| MapParseError::FloatParsingError { token, error })
}

/// Parse "x y z" property
fn parse_triple<'t>(key: &'t str, value: &'t str) -> Result<[f64; 3], MapParseError<'t>> {
    let Some((x, y, z)) = value.split_whitespace().collect_tuple() else {
        return Err(MapParseError::InvalidProperty { key, value });
    };

    Ok([parse_float(x)?, parse_float(y)?, parse_float(z)?])
}

fn parse_vector<'t>(key: &'t str, value: &'t str) -> Result<Vec3d, MapParseError<'t>> {
    let [x, y, z] = parse_triple(key, value)?;

    Ok(Vec3d::new(x, y, z))
}

/// Parse "r g b" property in [0, 255] range
fn parse_color<'t>(key: &'t str, value: &'t str) -> Result<Color, MapParseError<'t>> {
    let [r, g, b] = parse_triple(key, value)?;

    Ok(Color::new(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0))
}

/// Extract `name` from `path\name.wad[;other]`
fn parse_wad_prefix(value: &str) -> String {
    let value = match value.split_once(';') {
        Some((first, _)) => {
            log::warn!("more than one WAD file assigned to this map, the map may not load correctly");
            first
        }
        None => value,
    };

    let file = value.rsplit(['\\', '/']).next().unwrap_or(value);
    let name = file.split('.').next().unwrap_or(file);

    if name.is_empty() {
        String::new()
    } else {
        format!("{}/", name)
    }
}

impl WorldSpawn {
    /// Read worldspawn settings from entity properties
    pub fn from_entity<'t>(entity: &RawEntity<'t>) -> Result<Self, MapParseError<'t>> {
        let mut world = Self::default();

        for &(key, value) in &entity.properties {
            match key.to_ascii_lowercase().as_str() {
                "detail_number" => world.detail_number = parse_int(value)?.max(0) as u32,
                "min_pixels" => world.min_pixels = parse_int(value)?.max(0) as u32,
                "geometry_scale" => {
                    let scale = parse_float(value)?;

                    if scale < 1.0 || !(scale as u32).is_power_of_two() {
                        return Err(MapParseError::InvalidProperty { key, value });
                    }
                    world.geometry_scale = scale;
                }
                "inside_light_scale" | "outside_light_scale" => world.lumel_scale = parse_float(value)?,
                "ambient_color" => world.ambient_color = parse_color(key, value)?,
                "emergency_ambient_color" => world.emergency_ambient_color = parse_color(key, value)?,
                "wad" => world.wad_prefix = parse_wad_prefix(value),
                _ => {}
            }
        }

        Ok(world)
    }
}

/// Collect properties not consumed by entity fields
fn dictionary<'t>(entity: &RawEntity<'t>, consumed: &[&str]) -> Vec<(String, String)> {
    entity.properties
        .iter()
        .filter(|(key, value)| {
            !value.is_empty() && !consumed.iter().any(|consumed| key.eq_ignore_ascii_case(consumed))
        })
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn string_property(entity: &RawEntity, key: &str, default: &str) -> String {
    entity.property(key).unwrap_or(default).to_string()
}

fn vector_property<'t>(entity: &RawEntity<'t>, key: &'t str) -> Result<Vec3d, MapParseError<'t>> {
    entity.property(key).map_or(Ok(Vec3d::zero()), |value| parse_vector(key, value))
}

impl OmniLight {
    /// Read light from entity properties
    pub fn from_entity<'t>(entity: &RawEntity<'t>) -> Result<Self, MapParseError<'t>> {
        Ok(Self {
            origin: vector_property(entity, "origin")?,
            name: string_property(entity, "name", ""),
            color: match entity.property("color") {
                Some(value) => parse_color("color", value)?,
                None => Color::WHITE,
            },
            alarm_type: AlarmType::from_value(entity.property("alarm_type").map_or(Ok(0), parse_int)?),
            falloff1: entity.property("falloff1").map_or(Ok(10.0), parse_float)?,
            falloff2: entity.property("falloff2").map_or(Ok(100.0), parse_float)?,
        })
    }
}

impl AnimatedLight {
    /// Read light from entity properties. Returns None if states are missing or incomplete.
    pub fn from_entity<'t>(entity: &RawEntity<'t>) -> Result<Option<Self>, MapParseError<'t>> {
        let mut durations = [None::<f32>; MAX_LIGHT_STATES];
        let mut colors = [None::<Color>; MAX_LIGHT_STATES];

        for &(key, value) in &entity.properties {
            let lower = key.to_ascii_lowercase();
            let Some(rest) = lower.strip_prefix("state") else {
                continue;
            };
            let Some((number, field)) = rest.split_once('_') else {
                continue;
            };
            let Some(index) = number.parse::<usize>().ok().filter(|index| *index < MAX_LIGHT_STATES) else {
                continue;
            };

            match field {
                "duration" => durations[index] = Some(parse_float(value)? as f32),
                "color" => colors[index] = Some(parse_color(key, value)?),
                _ => {}
            }
        }

        let mut states = Vec::new();

        for (duration, color) in durations.iter().zip(colors.iter()) {
            match (duration, color) {
                (Some(duration), Some(color)) => states.push(LightState { duration: *duration, color: *color }),
                (None, None) => break,
                _ => return Ok(None),
            }
        }

        if states.is_empty() {
            return Ok(None);
        }

        Ok(Some(Self {
            origin: vector_property(entity, "origin")?,
            name: string_property(entity, "name", ""),
            flags: entity.property("spawnflags").map_or(Ok(0), parse_int)? as u32 & ANIMATION_TYPE_MASK,
            alarm_type: AlarmType::from_value(entity.property("alarm_type").map_or(Ok(0), parse_int)?),
            states,
        }))
    }
}

impl Polyhedron {
    /// Build polyhedron of self-clipped brush, relative to `center` and divided by `scale`
    pub fn from_brush(db: &GeometryDatabase, brush: &Brush, center: Vec3d, scale: f64) -> Self {
        let point_ids = brush.unique_points();

        let points = point_ids
            .iter()
            .map(|id| (db.point(*id) - center) / scale)
            .collect::<Vec<_>>();

        let planes = brush.planes
            .iter()
            .map(|plane| {
                let equation = db.plane(plane.plane);

                PlaneEq {
                    normal: equation.normal,
                    dist: (equation.dist + (equation.normal ^ center)) / scale,
                }
            })
            .collect::<Vec<_>>();

        let index_of = |id| point_ids.iter().position(|p| *p == id).unwrap_or(0) as u32;
        let mut edges = Vec::<PolyhedronEdge>::new();

        for (face, plane) in brush.planes.iter().enumerate() {
            let winding = &plane.winding.points;

            for i in 0..winding.len() {
                let (start, end) = (winding[i], winding[(i + 1) % winding.len()]);

                // every edge is met twice, once per direction
                if let Some(edge) = edges
                    .iter_mut()
                    .find(|edge| edge.vertices == [index_of(end), index_of(start)])
                {
                    edge.faces[1] = face as u32;
                } else {
                    edges.push(PolyhedronEdge {
                        faces: [face as u32, face as u32],
                        vertices: [index_of(start), index_of(end)],
                    });
                }
            }
        }

        Self { points, planes, edges }
    }
}

/// Sequential brush construction state
struct BrushBuilder<'a> {
    /// Geometry of the compile
    db: &'a mut GeometryDatabase,

    /// Textures of the compile
    textures: &'a mut TextureTable,

    /// Texture size used for texgen normalisation
    texture_size: f64,

    /// Next brush identifier
    next_id: usize,

    /// Count of brushes with contradicting faces
    ambiguous_count: usize,
}

impl<'a> BrushBuilder<'a> {
    /// Build brush of raw face list
    fn build(&mut self, raw: &RawBrush, brush_type: BrushType) -> Brush {
        let mut brush = Brush::new(BrushId::from_index(self.next_id), brush_type);
        self.next_id += 1;

        for face in &raw.faces {
            let texture = self.textures.insert_texture(&face.texture);
            let texgen = self.textures.insert_texgen(TexGen::from_face(face, self.texture_size, self.texture_size));

            let Some(plane) = brush.add_plane_from_points(self.db, face.points) else {
                log::warn!("brush {} has a face given by colinear points, face ignored", brush.id.into_index());
                continue;
            };

            plane.texture = Some(texture);
            plane.texgen = Some(texgen);
        }

        if brush.disambiguate() {
            self.ambiguous_count += 1;
        }

        brush
    }
}

/// Build brushes into a scratch database and self-clip them
fn build_isolated(config: &CompileConfig, raw: &[&RawBrush]) -> (GeometryDatabase, Vec<Brush>) {
    let mut db = GeometryDatabase::new(config);
    let mut textures = TextureTable::new();
    let mut builder = BrushBuilder {
        db: &mut db,
        textures: &mut textures,
        texture_size: config.default_texture_size as f64,
        next_id: 0,
        ambiguous_count: 0,
    };

    let mut brushes = raw
        .iter()
        .map(|raw| builder.build(raw, BrushType::Structural))
        .collect::<Vec<_>>();

    brushes.retain_mut(|brush| brush.self_clip(&mut db));

    (db, brushes)
}

impl Door {
    /// Read door from entity. Origin is the center of the brush textured ORIGIN.
    pub fn from_entity<'t>(
        entity: &RawEntity<'t>,
        config: &CompileConfig,
        geometry_scale: f64,
    ) -> Result<Self, MapParseError<'t>> {
        let mut brushes = entity.brushes.clone();

        let origin_index = brushes.iter().position(|brush| {
            brush.faces
                .first()
                .map_or(false, |face| face.texture.eq_ignore_ascii_case(RESERVED_TEXTURES[1]))
        });

        let origin = match origin_index {
            Some(index) => {
                let origin_brush = brushes.remove(index);
                let (db, clipped) = build_isolated(config, &[&origin_brush]);

                clipped
                    .first()
                    .map_or(Vec3d::zero(), |brush| brush.centroid(&db) / geometry_scale)
            }
            None => Vec3d::zero(),
        };

        Ok(Self {
            name: string_property(entity, "name", "MustChange"),
            datablock: string_property(entity, "datablock", ""),
            path_name: string_property(entity, "path_name", ""),
            properties: dictionary(entity, &["classname", "name", "datablock", "path_name"]),
            origin,
            brushes,
            way_points: Vec::new(),
            total_ms: 0,
            trigger_ids: Vec::new(),
        })
    }
}

impl Trigger {
    /// Read trigger from entity. Returns None unless it has exactly one valid six-sided brush.
    pub fn from_entity<'t>(
        entity: &RawEntity<'t>,
        config: &CompileConfig,
        geometry_scale: f64,
    ) -> Result<Option<Self>, MapParseError<'t>> {
        let name = string_property(entity, "name", "MustChange");

        if entity.brushes.len() != 1 {
            log::error!("trigger {} must have one and only one brush, has {}", name, entity.brushes.len());
            return Ok(None);
        }

        let (db, brushes) = build_isolated(config, &[&entity.brushes[0]]);

        let Some(brush) = brushes.first().filter(|brush| brush.planes.len() == 6) else {
            log::error!("trigger {} must be a rectilinear polytope", name);
            return Ok(None);
        };

        let center = brush.bounds.center();

        Ok(Some(Self {
            name,
            datablock: string_property(entity, "datablock", ""),
            properties: dictionary(entity, &["classname", "name", "datablock"]),
            origin: center / geometry_scale,
            polyhedron: Polyhedron::from_brush(&db, brush, center, geometry_scale),
        }))
    }
}

impl GameEntity {
    /// Read entity of any class
    pub fn from_entity<'t>(class_name: &str, entity: &RawEntity<'t>) -> Result<Self, MapParseError<'t>> {
        Ok(Self {
            class_name: class_name.to_string(),
            origin: vector_property(entity, "origin")?,
            datablock: string_property(entity, "datablock", ""),
            game_class: string_property(entity, "game_class", ""),
            properties: dictionary(entity, &["classname", "origin", "datablock", "game_class"]),
        })
    }
}

impl MapContents {
    /// Build brushes and entities of parsed map. Brushes are inserted into `db`,
    /// none of them is self-clipped yet.
    pub fn build<'t>(
        map: &RawMap<'t>,
        config: &CompileConfig,
        db: &mut GeometryDatabase,
    ) -> Result<MapContents, MapParseError<'t>> {
        let world_entity = map.entities
            .iter()
            .find(|entity| entity.class_name().map_or(false, |name| name.eq_ignore_ascii_case("worldspawn")))
            .ok_or(MapParseError::MissingWorldSpawn)?;

        let world_spawn = WorldSpawn::from_entity(world_entity)?;
        let geometry_scale = world_spawn.geometry_scale;

        let mut textures = TextureTable::new();
        let mut contents = MapContents {
            world_spawn,
            textures: TextureTable::new(),
            structural: Vec::new(),
            detail: Vec::new(),
            portals: Vec::new(),
            collision: Vec::new(),
            vehicle_collision: Vec::new(),
            entities: Vec::new(),
            ambiguous_brush_count: 0,
        };

        let mut builder = BrushBuilder {
            db,
            textures: &mut textures,
            texture_size: config.default_texture_size as f64,
            next_id: 0,
            ambiguous_count: 0,
        };

        let mut current_door = None::<usize>;
        let mut trigger_count = 0usize;
        let mut world_seen = false;

        for entity in &map.entities {
            let Some(class_name) = entity.class_name() else {
                return Err(MapParseError::InvalidProperty {
                    key: "classname",
                    value: entity.properties.first().map_or("", |(key, _)| *key),
                });
            };

            let brush_type = match class_name.to_ascii_lowercase().as_str() {
                "worldspawn" => {
                    if world_seen {
                        log::warn!("second worldspawn entity, its brushes are treated as structural");
                    }
                    world_seen = true;
                    Some(BrushType::Structural)
                }
                "detail" => Some(BrushType::Detail),
                "collision" => Some(BrushType::Collision),
                "vehicle_collision" => Some(BrushType::VehicleCollision),
                "portal" => {
                    let pass_ambient_light = entity.property("ambient_light").map_or(Ok(0), parse_int)? != 0;

                    for raw in &entity.brushes {
                        let brush = builder.build(raw, BrushType::Portal);
                        contents.portals.push(PortalBrush { brush, pass_ambient_light });
                    }
                    continue;
                }
                "target" => {
                    contents.entities.push(Entity::Target(Target {
                        origin: vector_property(entity, "origin")?,
                        name: string_property(entity, "name", ""),
                    }));
                    None
                }
                "light_omni" => {
                    contents.entities.push(Entity::OmniLight(OmniLight::from_entity(entity)?));
                    None
                }
                "light" => {
                    match AnimatedLight::from_entity(entity)? {
                        Some(light) => contents.entities.push(Entity::AnimatedLight(light)),
                        None => log::warn!("animated light without valid states ignored"),
                    }
                    None
                }
                "door_elevator" => {
                    current_door = Some(contents.entities.len());
                    contents.entities.push(Entity::Door(Door::from_entity(entity, config, geometry_scale)?));
                    continue;
                }
                "path_node" => {
                    let way_point = WayPoint {
                        position: vector_property(entity, "origin")?,
                        ms_to_next: entity.property("next_time").map_or(Ok(1000), parse_int)?.max(0) as u32,
                        smoothing: entity.property("smoothing").map_or(Ok(0), parse_int)?.max(0) as u32,
                    };

                    match current_door.and_then(|index| contents.entities.get_mut(index)) {
                        Some(Entity::Door(door)) => door.add_path_node(way_point),
                        _ => log::warn!("path node declared before any door ignored"),
                    }
                    None
                }
                "trigger" => {
                    if let Some(trigger) = Trigger::from_entity(entity, config, geometry_scale)? {
                        if let Some(Entity::Door(door)) = current_door.and_then(|index| contents.entities.get_mut(index)) {
                            door.trigger_ids.push(trigger_count);
                        }
                        trigger_count += 1;
                        contents.entities.push(Entity::Trigger(trigger));
                    }
                    continue;
                }
                _ => {
                    contents.entities.push(Entity::Game(GameEntity::from_entity(class_name, entity)?));
                    None
                }
            };

            let Some(brush_type) = brush_type else {
                if !entity.brushes.is_empty() {
                    log::warn!("{} brushes of {} entity discarded", entity.brushes.len(), class_name);
                }
                continue;
            };

            for raw in &entity.brushes {
                let brush = builder.build(raw, brush_type);

                match brush_type {
                    BrushType::Structural => contents.structural.push(brush),
                    BrushType::Detail => contents.detail.push(brush),
                    BrushType::Collision => contents.collision.push(brush),
                    BrushType::VehicleCollision => contents.vehicle_collision.push(brush),
                    BrushType::Portal => contents.portals.push(PortalBrush { brush, pass_ambient_light: false }),
                }
            }
        }

        contents.ambiguous_brush_count = builder.ambiguous_count;
        contents.textures = textures;

        Ok(contents)
    }

    /// Contents of door sub-interior: door brushes become structural brushes of their own
    /// compile, world settings are shared with the parent
    pub fn for_door(&self, door: &Door, config: &CompileConfig, db: &mut GeometryDatabase) -> MapContents {
        let mut textures = TextureTable::new();
        let mut builder = BrushBuilder {
            db,
            textures: &mut textures,
            texture_size: config.default_texture_size as f64,
            next_id: 0,
            ambiguous_count: 0,
        };

        let structural = door.brushes
            .iter()
            .map(|raw| builder.build(raw, BrushType::Structural))
            .collect::<Vec<_>>();
        let ambiguous_brush_count = builder.ambiguous_count;

        MapContents {
            world_spawn: self.world_spawn.clone(),
            textures,
            structural,
            detail: Vec::new(),
            portals: Vec::new(),
            collision: Vec::new(),
            vehicle_collision: Vec::new(),
            entities: Vec::new(),
            ambiguous_brush_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use crate::config::QuakeVersion;
    use super::*;

    const CUBE: &str = r#"
{
"classname" "worldspawn"
"geometry_scale" "16"
"ambient_color" "255 0 51"
"wad" "C:\textures\base.wad"
{
( 0 0 64 ) ( 0 64 64 ) ( 64 64 64 ) stone [ 1 0 0 0 ] [ 0 -1 0 0 ] 0 1 1
( 0 0 0 ) ( 64 0 0 ) ( 64 64 0 ) STONE [ 1 0 0 0 ] [ 0 -1 0 0 ] 0 1 1
( 0 0 0 ) ( 0 0 64 ) ( 64 0 64 ) stone [ 1 0 0 0 ] [ 0 0 -1 0 ] 0 1 1
( 0 64 0 ) ( 64 64 0 ) ( 64 64 64 ) stone [ 1 0 0 0 ] [ 0 0 -1 0 ] 0 1 1
( 0 0 0 ) ( 0 64 0 ) ( 0 64 64 ) stone [ 0 1 0 0 ] [ 0 0 -1 0 ] 0 1 1
( 64 0 0 ) ( 64 0 64 ) ( 64 64 64 ) stone [ 0 1 0 0 ] [ 0 0 -1 0 ] 0 1 1
}
}
{
"classname" "light"
"state0_duration" "1.5"
"state0_color" "255 255 255"
"state1_duration" "1"
}
{
"classname" "Door_Elevator"
"name" "lift"
"speed" "3"
}
{
"classname" "path_node"
"origin" "0 0 0"
"next_time" "500"
}
{
"classname" "path_node"
"origin" "0 0 64"
}
{
"classname" "spawn_point"
"origin" "1 2 3"
"datablock" "Spawn"
"team" "1"
}
"#;

    fn build(text: &str) -> MapContents {
        let config = CompileConfig::default();
        let mut db = GeometryDatabase::new(&config);
        let map = RawMap::parse(text, QuakeVersion::Quake2).expect("valid map");

        MapContents::build(&map, &config, &mut db).expect("valid contents")
    }

    #[test]
    fn texture_table_reserves_markers() {
        let mut table = TextureTable::new();

        assert_eq!(table.insert_texture("null"), TextureId::null());
        assert_eq!(table.insert_texture("Origin"), TextureId::origin());
        assert_eq!(table.insert_texture("trigger"), TextureId::trigger());

        let stone = table.insert_texture("stone");
        assert_eq!(stone.into_index(), 4);
        assert_eq!(table.insert_texture("STONE"), stone);
        assert_eq!(table.name(stone), "STONE");
        assert!(!stone.is_invisible());
    }

    #[test]
    fn base_axes_prefer_floor() {
        let (u, v) = TexGen::base_axes(Vec3d::new(0.0, 0.0, 1.0));
        assert_eq!((u, v), (Vec3d::new(1.0, 0.0, 0.0), Vec3d::new(0.0, -1.0, 0.0)));

        // ties keep the first axis
        let (u, _) = TexGen::base_axes(Vec3d::new(0.0, 0.0, 0.0));
        assert_eq!(u, Vec3d::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn quake3_rotation_rotates_axes() {
        let face = RawFace {
            points: [Vec3d::new(0.0, 0.0, 0.0), Vec3d::new(0.0, 1.0, 0.0), Vec3d::new(1.0, 1.0, 0.0)],
            texture: "base".to_string(),
            texgen: FaceTexGen::Quake3 { shift_u: 0.0, shift_v: 0.0, rotation: 90.0, scale_x: 1.0, scale_y: 1.0 },
        };
        let texgen = TexGen::from_face(&face, 1.0, 1.0);

        assert_relative_eq!(texgen.x.normal.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(texgen.x.normal.y, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn entities_and_brushes() {
        let contents = build(CUBE);

        assert_eq!(contents.world_spawn.geometry_scale, 16.0);
        assert_eq!(contents.world_spawn.wad_prefix, "base/");
        assert_relative_eq!(contents.world_spawn.ambient_color.r, 1.0);
        assert_relative_eq!(contents.world_spawn.ambient_color.b, 0.2);

        assert_eq!(contents.structural.len(), 1);
        assert_eq!(contents.structural[0].planes.len(), 6);
        assert_eq!(contents.textures.names().len(), 5);
        assert_eq!(contents.ambiguous_brush_count, 0);

        // incomplete light state, light dropped
        assert_eq!(contents.entities.len(), 2);

        let Entity::Door(door) = &contents.entities[0] else {
            panic!("door expected");
        };
        assert_eq!(door.name, "lift");
        assert_eq!(door.properties, vec![("speed".to_string(), "3".to_string())]);
        assert_eq!(door.way_points.len(), 2);
        assert_eq!(door.way_points[1].ms_to_next, 1000);
        assert_eq!(door.total_ms, 500);

        let Entity::Game(spawn) = &contents.entities[1] else {
            panic!("game entity expected");
        };
        assert_eq!(spawn.class_name, "spawn_point");
        assert_eq!(spawn.datablock, "Spawn");
        assert_eq!(spawn.origin, Vec3d::new(1.0, 2.0, 3.0));
        assert_eq!(spawn.properties, vec![("team".to_string(), "1".to_string())]);
    }

    #[test]
    fn missing_worldspawn() {
        let config = CompileConfig::default();
        let mut db = GeometryDatabase::new(&config);
        let map = RawMap::parse("{ \"classname\" \"target\" }", QuakeVersion::Quake2).expect("valid map");

        assert_eq!(
            MapContents::build(&map, &config, &mut db).err(),
            Some(MapParseError::MissingWorldSpawn)
        );
    }

    #[test]
    fn trigger_polyhedron_is_centered_box() {
        let text = r#"
{ "classname" "worldspawn" }
{
"classname" "trigger"
"name" "gate"
{
( 0 0 64 ) ( 0 64 64 ) ( 64 64 64 ) TRIGGER [ 1 0 0 0 ] [ 0 -1 0 0 ] 0 1 1
( 0 0 0 ) ( 64 0 0 ) ( 64 64 0 ) TRIGGER [ 1 0 0 0 ] [ 0 -1 0 0 ] 0 1 1
( 0 0 0 ) ( 0 0 64 ) ( 64 0 64 ) TRIGGER [ 1 0 0 0 ] [ 0 0 -1 0 ] 0 1 1
( 0 64 0 ) ( 64 64 0 ) ( 64 64 64 ) TRIGGER [ 1 0 0 0 ] [ 0 0 -1 0 ] 0 1 1
( 0 0 0 ) ( 0 64 0 ) ( 0 64 64 ) TRIGGER [ 0 1 0 0 ] [ 0 0 -1 0 ] 0 1 1
( 64 0 0 ) ( 64 0 64 ) ( 64 64 64 ) TRIGGER [ 0 1 0 0 ] [ 0 0 -1 0 ] 0 1 1
}
}
"#;
        let contents = build(text);

        let Some(Entity::Trigger(trigger)) = contents.entities.first() else {
            panic!("trigger expected");
        };

        assert_eq!(trigger.name, "gate");
        assert_relative_eq!(trigger.origin.x, 1.0);
        assert_eq!(trigger.polyhedron.points.len(), 8);
        assert_eq!(trigger.polyhedron.planes.len(), 6);
        assert_eq!(trigger.polyhedron.edges.len(), 12);

        for point in &trigger.polyhedron.points {
            assert_relative_eq!(point.x.abs(), 1.0, epsilon = 1e-9);
        }
        for plane in &trigger.polyhedron.planes {
            assert_relative_eq!(plane.dist, -1.0, epsilon = 1e-9);
        }
    }
}

// mod.rs
