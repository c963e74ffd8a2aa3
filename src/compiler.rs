///! Compile driver
///!
///! One `.map` file compiles into one detail level with its own [`CompileContext`], so
///! files of a detail sequence are compiled in parallel and aggregated afterwards.

use std::path::{Path, PathBuf};
use rayon::prelude::*;
use crate::{
    brush::Brush,
    bsp::{BspTree, PlaneSelector},
    config::{CompileConfig, DetailMode},
    database::GeometryDatabase,
    error::{ensure, CompileError},
    interior::{export::{export, ExportSource}, Interior},
    lighting::{animated, compute_lightmaps, packer},
    map::{Entity, MapContents, RawMap, WorldSpawn, RESERVED_TEXTURES},
    resource::InteriorResource,
    surface::SurfaceSet,
};

/// Extensions texture files are searched with
const TEXTURE_EXTENSIONS: [&str; 3] = ["png", "jpg", "bmp"];

/// Counters reported after each compile
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CompileStats {
    /// Structural brushes that survived self-clipping
    pub structural_brushes: usize,

    /// Detail brushes
    pub detail_brushes: usize,

    /// Portal brushes
    pub portal_brushes: usize,

    /// Zones
    pub zones: usize,

    /// Visible surfaces
    pub surfaces: usize,

    /// Brushes with contradicting duplicated planes
    pub ambiguous_brushes: usize,

    /// Windings no zone sees
    pub orphan_polys: usize,
}

impl CompileStats {
    /// Total brush count
    pub fn total_brushes(&self) -> usize {
        self.structural_brushes + self.detail_brushes + self.portal_brushes
    }

    fn report(&self, verbose: bool) {
        log::info!(
            "{} brushes ({} structural, {} detail, {} portal), {} zones, {} surfaces",
            self.total_brushes(),
            self.structural_brushes,
            self.detail_brushes,
            self.portal_brushes,
            self.zones,
            self.surfaces,
        );

        if verbose {
            log::info!(
                "{} ambiguous brushes, {} orphaned polygons",
                self.ambiguous_brushes,
                self.orphan_polys,
            );
        } else if self.ambiguous_brushes != 0 || self.orphan_polys != 0 {
            log::warn!(
                "errors exist in this interior: {} ambiguous brushes, {} orphaned polygons",
                self.ambiguous_brushes,
                self.orphan_polys,
            );
        }
    }
}

/// Single compiled detail level
#[derive(Debug)]
pub struct CompiledLevel {
    /// Runtime geometry
    pub interior: Interior,

    /// Map entities
    pub entities: Vec<Entity>,

    /// Compiled door interiors, in door order
    pub doors: Vec<Interior>,

    /// World settings
    pub world_spawn: WorldSpawn,

    /// Statistics
    pub stats: CompileStats,
}

/// State of one map file compile
pub struct CompileContext<'c> {
    config: &'c CompileConfig,
    db: GeometryDatabase,
}

/// Drop brushes that do not self-clip into a closed volume
fn self_clip_all<T>(db: &mut GeometryDatabase, brushes: &mut Vec<T>, brush: impl Fn(&mut T) -> &mut Brush, kind: &str) {
    let before = brushes.len();
    brushes.retain_mut(|item| brush(item).self_clip(db));

    if brushes.len() != before {
        log::warn!("{} degenerate {} brushes dropped", before - brushes.len(), kind);
    }
}

/// Run the geometry pipeline on built map contents
fn compile_contents(
    db: &mut GeometryDatabase,
    config: &CompileConfig,
    contents: &mut MapContents,
    low_detail: bool,
) -> Result<(Interior, CompileStats), CompileError> {
    self_clip_all(db, &mut contents.structural, |brush| brush, "structural");
    self_clip_all(db, &mut contents.detail, |brush| brush, "detail");
    self_clip_all(db, &mut contents.portals, |portal| &mut portal.brush, "portal");
    self_clip_all(db, &mut contents.collision, |brush| brush, "collision");
    self_clip_all(db, &mut contents.vehicle_collision, |brush| brush, "vehicle collision");

    ensure!(!contents.structural.is_empty(), "no valid structural brushes");
    db.bounds = db.bounds.extend(1.0);

    log::debug!("creating BSP");
    let mut selector = PlaneSelector::new(config);
    let mut tree = BspTree::build(db, &mut selector, &contents.structural, &contents.detail, &contents.portals)?;
    tree.mark_zones_active();

    log::debug!("creating surfaces");
    let mut set = SurfaceSet::create(db, &tree, &contents.structural, &contents.detail)?;

    log::debug!("computing lightmaps");
    let world = &contents.world_spawn;
    let mut lighting = compute_lightmaps(db, &mut set.surfaces, world, &contents.entities, low_detail)?;

    log::debug!("packing lightmaps");
    animated::preprocess(&mut lighting.animated_lights, &mut set.surfaces);
    animated::sort_lit_surfaces(&mut set, &mut lighting.animated_lights);
    packer::pack_lightmaps(&mut set.surfaces, &tree.zones, &mut lighting, world.geometry_scale)?;
    let light_state_entries = animated::postprocess(&mut lighting.animated_lights, &mut set.surfaces)?;

    let stats = CompileStats {
        structural_brushes: contents.structural.len(),
        detail_brushes: contents.detail.len(),
        portal_brushes: contents.portals.len(),
        zones: tree.zones.len(),
        surfaces: set.surfaces.len(),
        ambiguous_brushes: contents.ambiguous_brush_count,
        orphan_polys: set.orphan_count,
    };

    log::debug!("exporting to runtime");
    let interior = export(&ExportSource {
        db,
        tree: &tree,
        surfaces: &set,
        contents,
        lighting: &lighting,
        light_state_entries,
    })?;

    Ok((interior, stats))
}

impl<'c> CompileContext<'c> {
    /// Context with empty geometry database
    pub fn new(config: &'c CompileConfig) -> Self {
        Self { config, db: GeometryDatabase::new(config) }
    }

    /// Compile `.map` text into detail level
    pub fn compile(mut self, source: &str) -> Result<CompiledLevel, CompileError> {
        log::debug!("parsing");
        let map = RawMap::parse(source, self.config.quake_version)?;
        let mut contents = MapContents::build(&map, self.config, &mut self.db)?;

        let (interior, stats) = compile_contents(&mut self.db, self.config, &mut contents, self.config.is_low_detail())?;
        stats.report(self.config.verbose);

        let detail_number = contents.world_spawn.detail_number;
        let mut doors = Vec::new();

        for entity in &contents.entities {
            let Entity::Door(door) = entity else {
                continue;
            };

            if detail_number != 0 {
                log::warn!("door {} ignored, doors belong to detail level 0 only", door.name);
                continue;
            }

            log::debug!("compiling door {}", door.name);
            let mut db = GeometryDatabase::new(self.config);
            let mut door_contents = contents.for_door(door, self.config, &mut db);
            let (interior, _) = compile_contents(&mut db, self.config, &mut door_contents, true)?;
            doors.push(interior);
        }

        Ok(CompiledLevel {
            interior,
            world_spawn: contents.world_spawn,
            entities: contents.entities,
            doors,
            stats,
        })
    }
}

/// Files compiled for `map_path`. A `name_N.map` file names the sequence
/// `name_0.map` .. `name_9.map`, missing files of it are skipped.
pub fn detail_sequence(map_path: &Path, mode: DetailMode) -> Vec<PathBuf> {
    if mode != DetailMode::Sequence {
        return vec![map_path.to_path_buf()];
    }

    let Some(stem) = map_path.file_stem().and_then(|stem| stem.to_str()) else {
        return vec![map_path.to_path_buf()];
    };

    let base = match stem.char_indices().rev().nth(1) {
        Some((index, '_')) if stem.as_bytes()[stem.len() - 1].is_ascii_digit() => &stem[..index + 1],
        _ => return vec![map_path.to_path_buf()],
    };

    let extension = map_path.extension().and_then(|extension| extension.to_str()).unwrap_or("map");

    (0..=9)
        .map(|index| map_path.with_file_name(format!("{}{}.{}", base, index, extension)))
        .filter(|path| path.is_file())
        .collect()
}

/// `.dif` file written for `map_path`
pub fn output_path(map_path: &Path, config: &CompileConfig) -> PathBuf {
    let directory = match &config.output_dir {
        Some(directory) => directory.clone(),
        None => map_path.parent().map(Path::to_path_buf).unwrap_or_default(),
    };

    let stem = map_path.file_stem().unwrap_or_default().to_string_lossy();
    directory.join(format!("{}.dif", stem))
}

/// Find texture file in texture directory, and in its parent if searching is enabled
pub fn find_texture(name: &str, map_path: &Path, config: &CompileConfig) -> Option<PathBuf> {
    let directory = match &config.texture_dir {
        Some(directory) => directory.clone(),
        None => map_path.parent().map(Path::to_path_buf).unwrap_or_default(),
    };

    let mut directories = vec![directory.clone()];
    if config.texture_search && !config.is_low_detail() {
        if let Some(parent) = directory.parent() {
            directories.push(parent.to_path_buf());
        }
    }

    let lower = name.to_ascii_lowercase();

    directories
        .iter()
        .flat_map(|directory| {
            [name, lower.as_str()]
                .into_iter()
                .flat_map(move |name| TEXTURE_EXTENSIONS.map(|extension| directory.join(format!("{}.{}", name, extension))))
        })
        .find(|path| path.is_file())
}

/// Warn about textures that have no file
fn check_textures(interior: &Interior, wad_prefix: &str, map_path: &Path, config: &CompileConfig) {
    for material in &interior.materials {
        let name = material.strip_prefix(wad_prefix).unwrap_or(material);

        if RESERVED_TEXTURES.iter().any(|reserved| reserved.eq_ignore_ascii_case(name)) {
            continue;
        }

        if find_texture(name, map_path, config).is_none() {
            log::warn!("texture {} not found", name);
        }
    }
}

/// Compile single map file
pub fn compile_file(path: &Path, config: &CompileConfig) -> Result<CompiledLevel, CompileError> {
    let source = std::fs::read_to_string(path)?;
    let level = CompileContext::new(config).compile(&source)?;

    check_textures(&level.interior, &level.world_spawn.wad_prefix, path, config);

    Ok(level)
}

/// Compile detail levels into resource. Failed files are logged and left out,
/// the resource is built from the rest.
pub fn compile_resource(paths: &[PathBuf], config: &CompileConfig) -> (InteriorResource, usize) {
    let results = paths
        .par_iter()
        .map(|path| (path, compile_file(path, config)))
        .collect::<Vec<_>>();

    let mut resource = InteriorResource::new();
    let mut failures = 0;

    for (path, result) in results {
        let level = match result {
            Ok(level) => level,
            Err(error) => {
                log::error!("{}: {}", path.display(), error);
                failures += 1;
                continue;
            }
        };

        log::info!("{}: detail level {} compiled", path.display(), level.interior.detail_level);

        if level.interior.detail_level == 0 {
            if let Err(error) = resource.add_entities(&level.entities, level.doors, level.world_spawn.geometry_scale) {
                log::error!("{}: {}", path.display(), error);
                failures += 1;
                continue;
            }
        }

        resource.detail_levels.push(level.interior);
    }

    (resource, failures)
}

/// Compile map (or its detail sequence) and write `.dif`. Returns count of failed files.
pub fn run(map_path: &Path, config: &CompileConfig) -> Result<usize, CompileError> {
    let paths = detail_sequence(map_path, config.detail_mode);
    if paths.is_empty() {
        return Err(CompileError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no map files for {}", map_path.display()),
        )));
    }

    let (mut resource, failures) = compile_resource(&paths, config);
    resource.finish()?;

    let output = output_path(map_path, config);
    log::info!("writing {}", output.display());

    let mut file = std::io::BufWriter::new(std::fs::File::create(&output)?);
    resource.save(&mut file)?;
    std::io::Write::flush(&mut file)?;

    Ok(failures)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_map_is_not_a_sequence() {
        let path = Path::new("/maps/tower.map");

        assert_eq!(detail_sequence(path, DetailMode::Sequence), vec![path.to_path_buf()]);
        assert_eq!(detail_sequence(Path::new("/maps/tower_0.map"), DetailMode::SpecifiedOnly), vec![PathBuf::from("/maps/tower_0.map")]);
    }

    #[test]
    fn sequence_skips_missing_files() {
        // nothing named like this exists
        let path = Path::new("/nonexistent-map2dif-dir/tower_0.map");

        assert!(detail_sequence(path, DetailMode::Sequence).is_empty());
    }

    #[test]
    fn output_next_to_map_by_default() {
        let mut config = CompileConfig::default();
        let path = Path::new("/maps/tower_0.map");

        assert_eq!(output_path(path, &config), PathBuf::from("/maps/tower_0.dif"));

        config.output_dir = Some(PathBuf::from("/out"));
        assert_eq!(output_path(path, &config), PathBuf::from("/out/tower_0.dif"));
    }
}

// compiler.rs
