///! Interior resource: detail levels with the entities of the most detailed one
///!
///! File layout (little-endian, every array count-prefixed):
///! magic `DIF0`, version, detail levels, triggers, path followers, game entities.

use std::io::{Read, Write};
use crate::{
    error::CompileError,
    interior::{
        dif::{self, read_properties, read_string, read_u32, read_vec, write_properties, write_string, write_u32, write_vec, DifLoadingError},
        Interior,
    },
    map::{Door, Entity, GameEntity, Trigger},
    math::Vec3d,
};

/// Trigger volume, relative to its offset
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceTrigger {
    /// Trigger name
    pub name: String,

    /// Datablock name
    pub datablock: String,

    /// Entity properties
    pub properties: Vec<(String, String)>,

    /// Volume center
    pub offset: dif::Vec3,

    /// Polyhedron points
    pub points: Vec<dif::Vec3>,

    /// Polyhedron planes
    pub planes: Vec<dif::Plane>,

    /// Polyhedron edges
    pub edges: Vec<dif::PolyhedronEdge>,
}

/// Moving sub-interior
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathFollower {
    /// Door name
    pub name: String,

    /// Datablock name
    pub datablock: String,

    /// Entity properties
    pub properties: Vec<(String, String)>,

    /// Door origin
    pub offset: dif::Vec3,

    /// Compiled door geometry
    pub interior: Interior,

    /// Path, in exported units
    pub way_points: Vec<dif::WayPoint>,

    /// Time of the whole path (in milliseconds)
    pub total_ms: u32,

    /// Indices of triggers operating the door
    pub trigger_ids: Vec<u32>,
}

/// Entity handled by game code
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceGameEntity {
    /// Datablock name
    pub datablock: String,

    /// Game class name
    pub game_class: String,

    /// Position, in exported units
    pub position: dif::Vec3,

    /// Entity properties, class name included
    pub properties: Vec<(String, String)>,
}

/// Compiled `.dif` file contents
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InteriorResource {
    /// Detail levels, the most detailed first after [`InteriorResource::finish`]
    pub detail_levels: Vec<Interior>,

    /// Triggers
    pub triggers: Vec<ResourceTrigger>,

    /// Doors
    pub path_followers: Vec<PathFollower>,

    /// Other entities
    pub game_entities: Vec<ResourceGameEntity>,
}

fn vec3(value: Vec3d) -> dif::Vec3 {
    value.into()
}

impl ResourceTrigger {
    fn new(trigger: &Trigger) -> Self {
        let polyhedron = &trigger.polyhedron;

        Self {
            name: trigger.name.clone(),
            datablock: trigger.datablock.clone(),
            properties: trigger.properties.clone(),
            offset: vec3(trigger.origin),
            points: polyhedron.points.iter().copied().map(vec3).collect(),
            planes: polyhedron.planes
                .iter()
                .map(|plane| dif::Plane { normal: vec3(plane.normal), dist: plane.dist as f32 })
                .collect(),
            edges: polyhedron.edges
                .iter()
                .map(|edge| dif::PolyhedronEdge { faces: edge.faces, vertices: edge.vertices })
                .collect(),
        }
    }

    fn save(&self, dst: &mut dyn Write) -> Result<(), std::io::Error> {
        write_string(dst, &self.name)?;
        write_string(dst, &self.datablock)?;
        write_properties(dst, &self.properties)?;
        write_vec(dst, &[self.offset])?;
        write_vec(dst, &self.points)?;
        write_vec(dst, &self.planes)?;
        write_vec(dst, &self.edges)
    }

    fn load(src: &mut dyn Read) -> Result<Self, DifLoadingError> {
        let name = read_string(src)?;
        let datablock = read_string(src)?;
        let properties = read_properties(src)?;
        let offset = read_vec::<dif::Vec3>(src)?;
        dif::check_indices("trigger offset", [0], offset.len())?;

        let trigger = Self {
            name,
            datablock,
            properties,
            offset: offset[0],
            points: read_vec(src)?,
            planes: read_vec(src)?,
            edges: read_vec(src)?,
        };

        dif::check_indices("trigger edge point", trigger.edges.iter().flat_map(|edge| edge.vertices), trigger.points.len())?;
        dif::check_indices("trigger edge face", trigger.edges.iter().flat_map(|edge| edge.faces), trigger.planes.len())?;

        Ok(trigger)
    }
}

impl PathFollower {
    fn new(door: &Door, interior: Interior, geometry_scale: f64) -> Self {
        Self {
            name: door.name.clone(),
            datablock: door.datablock.clone(),
            properties: door.properties.clone(),
            offset: vec3(door.origin),
            interior,
            way_points: door.way_points
                .iter()
                .map(|way_point| dif::WayPoint {
                    position: vec3(way_point.position / geometry_scale),
                    ms_to_next: way_point.ms_to_next,
                    smoothing: way_point.smoothing,
                })
                .collect(),
            total_ms: door.total_ms,
            trigger_ids: door.trigger_ids.iter().map(|id| *id as u32).collect(),
        }
    }

    fn save(&self, dst: &mut dyn Write) -> Result<(), std::io::Error> {
        write_string(dst, &self.name)?;
        write_string(dst, &self.datablock)?;
        write_properties(dst, &self.properties)?;
        write_vec(dst, &[self.offset])?;
        self.interior.save(dst)?;
        write_vec(dst, &self.way_points)?;
        write_u32(dst, self.total_ms)?;
        write_vec(dst, &self.trigger_ids)
    }

    fn load(src: &mut dyn Read) -> Result<Self, DifLoadingError> {
        let name = read_string(src)?;
        let datablock = read_string(src)?;
        let properties = read_properties(src)?;
        let offset = read_vec::<dif::Vec3>(src)?;
        dif::check_indices("path follower offset", [0], offset.len())?;

        Ok(Self {
            name,
            datablock,
            properties,
            offset: offset[0],
            interior: Interior::load(src)?,
            way_points: read_vec(src)?,
            total_ms: read_u32(src)?,
            trigger_ids: read_vec(src)?,
        })
    }
}

impl ResourceGameEntity {
    fn new(entity: &GameEntity, geometry_scale: f64) -> Self {
        let mut properties = Vec::with_capacity(entity.properties.len() + 1);
        properties.push(("classname".to_string(), entity.class_name.clone()));
        properties.extend(entity.properties.iter().cloned());

        Self {
            datablock: entity.datablock.clone(),
            game_class: entity.game_class.clone(),
            position: vec3(entity.origin / geometry_scale),
            properties,
        }
    }

    fn save(&self, dst: &mut dyn Write) -> Result<(), std::io::Error> {
        write_string(dst, &self.datablock)?;
        write_string(dst, &self.game_class)?;
        write_vec(dst, &[self.position])?;
        write_properties(dst, &self.properties)
    }

    fn load(src: &mut dyn Read) -> Result<Self, DifLoadingError> {
        let datablock = read_string(src)?;
        let game_class = read_string(src)?;
        let position = read_vec::<dif::Vec3>(src)?;
        dif::check_indices("game entity position", [0], position.len())?;

        Ok(Self {
            datablock,
            game_class,
            position: position[0],
            properties: read_properties(src)?,
        })
    }
}

impl InteriorResource {
    /// Empty resource
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach entities of detail level 0. `doors` holds compiled door interiors in
    /// the order doors appear in `entities`.
    pub fn add_entities(
        &mut self,
        entities: &[Entity],
        doors: Vec<Interior>,
        geometry_scale: f64,
    ) -> Result<(), CompileError> {
        let mut doors = doors.into_iter();

        for entity in entities {
            match entity {
                Entity::Trigger(trigger) => self.triggers.push(ResourceTrigger::new(trigger)),
                Entity::Door(door) => {
                    let Some(interior) = doors.next() else {
                        return Err(CompileError::Invariant(format!("door {} has no compiled interior", door.name)));
                    };

                    self.path_followers.push(PathFollower::new(door, interior, geometry_scale));
                }
                Entity::Game(game) => self.game_entities.push(ResourceGameEntity::new(game, geometry_scale)),
                Entity::Target(_) | Entity::OmniLight(_) | Entity::AnimatedLight(_) => {}
            }
        }

        if doors.next().is_some() {
            return Err(CompileError::Invariant("more door interiors than doors".to_string()));
        }

        Ok(())
    }

    /// Sort detail levels by detail number, build collision poly lists of the most
    /// detailed level and purge collision data of the others
    pub fn finish(&mut self) -> Result<(), CompileError> {
        self.detail_levels.sort_by_key(|interior| interior.detail_level);

        let Some((first, rest)) = self.detail_levels.split_first_mut() else {
            return Err(CompileError::NoDetailLevels);
        };

        first.process_hull_poly_lists()?;
        for interior in rest {
            interior.purge_lod_data();
        }

        for follower in &mut self.path_followers {
            follower.interior.process_hull_poly_lists()?;
        }

        Ok(())
    }

    /// Write resource
    pub fn save(&self, dst: &mut dyn Write) -> Result<(), std::io::Error> {
        write_u32(dst, dif::MAGIC)?;
        write_u32(dst, dif::VERSION)?;

        write_u32(dst, self.detail_levels.len() as u32)?;
        self.detail_levels.iter().try_for_each(|interior| interior.save(dst))?;

        write_u32(dst, self.triggers.len() as u32)?;
        self.triggers.iter().try_for_each(|trigger| trigger.save(dst))?;

        write_u32(dst, self.path_followers.len() as u32)?;
        self.path_followers.iter().try_for_each(|follower| follower.save(dst))?;

        write_u32(dst, self.game_entities.len() as u32)?;
        self.game_entities.iter().try_for_each(|entity| entity.save(dst))
    }

    /// Read resource
    pub fn load(src: &mut dyn Read) -> Result<Self, DifLoadingError> {
        let magic = read_u32(src)?;
        if magic != dif::MAGIC {
            return Err(DifLoadingError::InvalidMagic(magic));
        }

        let version = read_u32(src)?;
        if version != dif::VERSION {
            return Err(DifLoadingError::UnsupportedVersion(version));
        }

        let count = read_u32(src)?;
        let detail_levels = (0..count).map(|_| Interior::load(src)).collect::<Result<Vec<_>, _>>()?;

        let count = read_u32(src)?;
        let triggers = (0..count).map(|_| ResourceTrigger::load(src)).collect::<Result<Vec<_>, _>>()?;

        let count = read_u32(src)?;
        let path_followers = (0..count).map(|_| PathFollower::load(src)).collect::<Result<Vec<_>, _>>()?;

        let count = read_u32(src)?;
        let game_entities = (0..count).map(|_| ResourceGameEntity::load(src)).collect::<Result<Vec<_>, _>>()?;

        for follower in &path_followers {
            dif::check_indices("door trigger", follower.trigger_ids.iter().copied(), triggers.len())?;
        }

        Ok(Self { detail_levels, triggers, path_followers, game_entities })
    }
}

#[cfg(test)]
mod tests {
    use crate::map::{Polyhedron, PolyhedronEdge, WayPoint};
    use crate::vec3d;
    use super::*;

    fn level(detail_level: u32) -> Interior {
        Interior {
            detail_level,
            min_pixels: 250,
            coord_bins: vec![dif::Span::default(); 4],
            materials: vec!["NULL".to_string()],
            ..Default::default()
        }
    }

    fn door() -> Door {
        let mut door = Door {
            name: "lift".to_string(),
            datablock: "DoorData".to_string(),
            path_name: String::new(),
            properties: vec![("speed".to_string(), "4".to_string())],
            origin: vec3d!(1.0, 2.0, 3.0),
            brushes: Vec::new(),
            way_points: Vec::new(),
            total_ms: 0,
            trigger_ids: vec![0],
        };
        door.add_path_node(WayPoint { position: vec3d!(0.0, 0.0, 0.0), ms_to_next: 500, smoothing: 0 });
        door.add_path_node(WayPoint { position: vec3d!(0.0, 0.0, 64.0), ms_to_next: 1000, smoothing: 1 });
        door
    }

    fn trigger() -> Trigger {
        Trigger {
            name: "enter".to_string(),
            datablock: "TriggerData".to_string(),
            properties: Vec::new(),
            origin: vec3d!(0.0, 0.0, 1.0),
            polyhedron: Polyhedron {
                points: vec![vec3d!(0.0, 0.0, 0.0), vec3d!(1.0, 0.0, 0.0)],
                planes: Vec::new(),
                edges: vec![PolyhedronEdge { faces: [0, 0], vertices: [0, 1] }],
            },
        }
    }

    #[test]
    fn entities_are_attached() {
        let entities = vec![
            Entity::Trigger(trigger()),
            Entity::Door(door()),
            Entity::Game(GameEntity {
                class_name: "item".to_string(),
                origin: vec3d!(64.0, 0.0, 32.0),
                datablock: "Health".to_string(),
                game_class: "Item".to_string(),
                properties: Vec::new(),
            }),
        ];

        let mut resource = InteriorResource::new();
        resource.add_entities(&entities, vec![level(0)], 32.0).expect("one door, one interior");

        assert_eq!(resource.triggers.len(), 1);
        assert_eq!(resource.path_followers[0].total_ms, 500);
        assert_eq!(resource.path_followers[0].way_points[1].position, dif::Vec3 { x: 0.0, y: 0.0, z: 2.0 });
        assert_eq!(resource.game_entities[0].position, dif::Vec3 { x: 2.0, y: 0.0, z: 1.0 });
        assert_eq!(resource.game_entities[0].properties[0], ("classname".to_string(), "item".to_string()));
    }

    #[test]
    fn door_without_interior_is_rejected() {
        let mut resource = InteriorResource::new();

        assert!(matches!(
            resource.add_entities(&[Entity::Door(door())], Vec::new(), 32.0),
            Err(CompileError::Invariant(_))
        ));
    }

    #[test]
    fn finish_sorts_and_purges() {
        let mut resource = InteriorResource {
            detail_levels: vec![level(2), level(0), level(1)],
            ..Default::default()
        };

        resource.finish().expect("levels are present");

        let levels = resource.detail_levels.iter().map(|interior| interior.detail_level).collect::<Vec<_>>();
        assert_eq!(levels, vec![0, 1, 2]);
        assert_eq!(resource.detail_levels[0].coord_bins.len(), 4);
        assert!(resource.detail_levels[1].coord_bins.is_empty());

        assert!(matches!(InteriorResource::new().finish(), Err(CompileError::NoDetailLevels)));
    }

    #[test]
    fn resource_round_trip() {
        let mut resource = InteriorResource {
            detail_levels: vec![level(0)],
            ..Default::default()
        };
        resource.add_entities(&[Entity::Trigger(trigger()), Entity::Door(door())], vec![level(0)], 32.0)
            .expect("one door, one interior");

        let mut bytes = Vec::new();
        resource.save(&mut bytes).expect("writing to memory");

        let loaded = InteriorResource::load(&mut bytes.as_slice()).expect("valid resource");
        assert_eq!(loaded, resource);
    }

    #[test]
    fn foreign_magic_is_rejected() {
        let bytes = [0u8; 8];

        assert!(matches!(InteriorResource::load(&mut bytes.as_slice()), Err(DifLoadingError::InvalidMagic(0))));
    }
}

// resource.rs
