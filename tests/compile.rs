//! Map text to `.dif` and back

use approx::assert_relative_eq;
use map2dif::{
    compiler::CompileContext,
    config::CompileConfig,
    interior::dif,
    resource::InteriorResource,
};

const CUBE: &str = r#"
{
"classname" "worldspawn"
"detail_number" "0"
{
( 0 0 64 ) ( 0 64 64 ) ( 64 64 64 ) stone [ 1 0 0 0 ] [ 0 -1 0 0 ] 0 1 1
( 0 0 0 ) ( 64 0 0 ) ( 64 64 0 ) stone [ 1 0 0 0 ] [ 0 -1 0 0 ] 0 1 1
( 0 0 0 ) ( 0 0 64 ) ( 64 0 64 ) stone [ 1 0 0 0 ] [ 0 0 -1 0 ] 0 1 1
( 0 64 0 ) ( 64 64 0 ) ( 64 64 64 ) stone [ 1 0 0 0 ] [ 0 0 -1 0 ] 0 1 1
( 0 0 0 ) ( 0 64 0 ) ( 0 64 64 ) stone [ 0 1 0 0 ] [ 0 0 -1 0 ] 0 1 1
( 64 0 0 ) ( 64 0 64 ) ( 64 64 64 ) stone [ 0 1 0 0 ] [ 0 0 -1 0 ] 0 1 1
}
}
{
"classname" "spawn_point"
"origin" "32 32 96"
"datablock" "Spawn"
}
"#;

#[test]
fn cube_interior() {
    let config = CompileConfig::default();
    let level = CompileContext::new(&config).compile(CUBE).expect("cube compiles");
    let interior = &level.interior;

    assert_eq!(level.stats.structural_brushes, 1);
    assert_eq!(level.stats.ambiguous_brushes, 0);
    assert_eq!(level.stats.orphan_polys, 0);

    // one quad per face
    assert_eq!(interior.surfaces.len(), 6);
    for surface in &interior.surfaces {
        assert_eq!(surface.winding.count, 4);
        assert_eq!(surface.fan_mask, 0b1111);
    }
    assert!(interior.null_surfaces.is_empty());

    // everything around the cube is the outside zone
    assert_eq!(interior.zones.len(), 1);
    assert_eq!(interior.zones[0].zone_id, 0);
    assert_eq!(interior.zones[0].flags, 0);
    assert_eq!(interior.zones[0].surfaces.count, 6);
    assert!(interior.portals.is_empty());

    // points are divided by the default geometry scale
    assert_eq!(interior.points.len(), 8);
    assert_eq!(interior.bound_min, dif::Vec3 { x: 0.0, y: 0.0, z: 0.0 });
    assert_eq!(interior.bound_max, dif::Vec3 { x: 2.0, y: 2.0, z: 2.0 });
    assert_relative_eq!(interior.bounding_sphere_radius, 3.0f32.sqrt(), epsilon = 1e-5);
    assert!(interior.point_visibility.iter().all(|visibility| *visibility == 0xFF));

    // a cube needs three plane pairs
    assert_eq!(interior.planes.len(), 3);

    let hulls = &interior.hulls;
    assert_eq!(hulls.hulls.len(), 1);

    let hull = hulls.hulls[0];
    assert_eq!(hull.points.count, 8);
    assert_eq!(hull.surfaces.count, 6);
    assert_eq!(hulls.hull_plane_indices.len(), 6);

    for point in 0..8 {
        let emit = hulls.emit_string(&hull, point).expect("emit string is valid");
        let own = emit.points
            .iter()
            .position(|local| *local as usize == point)
            .expect("point is in its own string") as u8;

        assert_eq!(emit.polys.len(), 3);
        assert_eq!(emit.edges.iter().filter(|(a, b)| *a == own || *b == own).count(), 3);
    }

    // the hull covers every coordinate bin
    assert_eq!(interior.coord_bins.len(), 256);
    assert!(interior.coord_bins.iter().all(|bin| bin.count == 1));

    assert!(!interior.lightmaps.is_empty());
    assert_eq!(interior.normal_lmap_indices.len(), 6);
}

#[test]
fn cube_resource_round_trip() {
    let config = CompileConfig::default();
    let level = CompileContext::new(&config).compile(CUBE).expect("cube compiles");

    let mut resource = InteriorResource::new();
    resource
        .add_entities(&level.entities, level.doors, level.world_spawn.geometry_scale)
        .expect("no doors");
    resource.detail_levels.push(level.interior);
    resource.finish().expect("one detail level");

    assert_eq!(resource.game_entities.len(), 1);
    assert_eq!(resource.game_entities[0].position, dif::Vec3 { x: 1.0, y: 1.0, z: 3.0 });
    assert!(!resource.detail_levels[0].hulls.poly_list_strings.is_empty());

    let mut bytes = Vec::new();
    resource.save(&mut bytes).expect("writing to memory");

    let loaded = InteriorResource::load(&mut bytes.as_slice()).expect("file is valid");
    assert_eq!(loaded, resource);
}

#[test]
fn map_without_worldspawn_fails() {
    let config = CompileConfig::default();
    let text = "{ \"classname\" \"target\" \"origin\" \"0 0 0\" }";

    assert!(matches!(
        CompileContext::new(&config).compile(text),
        Err(map2dif::error::CompileError::NoWorldSpawn)
    ));
}

// tests/compile.rs
