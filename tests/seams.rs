// ============================================
// Швы между чанками: один LOD, переходы LOD, вырез, деление
// ============================================

mod common;

use common::*;
use ultraviolet::Vec3;
use voxel_terrain::octree::NeighborLink;
use voxel_terrain::{ChunkKey, ChunkState, Direction, EditOperation, EditShape};

#[test]
fn test_same_lod_seams_match() {
    let mut terrain = terrain(settings(0, 40.0, sphere([0.0, 0.0, 0.0], 20.3)));
    focus(&mut terrain, Vec3::zero());
    assert_all_meshed(&terrain);

    let report = check_seams(&terrain);
    assert!(report.same_pairs > 0, "sphere crosses no chunk faces: {:?}", report);
    assert_eq!(report.coarse_pairs, 0);
}

#[test]
fn test_cross_lod_seams_are_crack_free() {
    let mut s = settings(2, 100.0, sphere([0.0, 0.0, 0.0], 30.3));
    s.retention_radius = 200.0;
    let mut terrain = terrain(s);
    focus(&mut terrain, Vec3::new(48.0, 8.0, 8.0));
    assert_all_meshed(&terrain);
    assert!(terrain.check_invariants().is_ok());

    let lods: std::collections::BTreeSet<u8> = terrain.octree().leaves().map(|k| k.lod).collect();
    assert!(lods.len() > 1, "expected mixed LOD leaves, got {:?}", lods);

    let report = check_seams(&terrain);
    assert!(report.coarse_pairs > 0, "no fine/coarse seam crosses the sphere: {:?}", report);
    assert!(report.same_pairs > 0);
}

#[test]
fn test_transition_mask_marks_coarser_faces() {
    let mut s = settings(2, 100.0, sphere([0.0, 0.0, 0.0], 30.3));
    s.retention_radius = 200.0;
    let mut terrain = terrain(s);
    focus(&mut terrain, Vec3::new(48.0, 8.0, 8.0));

    for key in sorted_leaves(&terrain) {
        let links = terrain.octree().face_neighbors(key);
        let expected = links
            .iter()
            .enumerate()
            .filter(|(_, link)| matches!(link, NeighborLink::Coarser(_)))
            .fold(0u8, |mask, (i, _)| mask | (1 << i));
        let mesh = terrain.mesh(key).expect("leaf is meshed");
        assert_eq!(mesh.transition_mask, expected, "leaf {:?}", key);
    }
}

#[test]
fn test_split_preserves_surface_area() {
    let center = [16.0, 16.0, 16.0];
    let mut s = settings(1, 50.0, sphere(center, 10.3));
    s.retention_radius = 100.0;
    let mut terrain = terrain(s);
    let parent = ChunkKey::new(0, 0, 0, 1);

    focus(&mut terrain, Vec3::new(76.0, 16.0, 16.0));
    assert!(terrain.octree().is_leaf(parent));
    let coarse_area = terrain.mesh(parent).expect("parent is meshed").surface_area();
    let expected = 4.0 * std::f32::consts::PI * 10.3 * 10.3;
    assert!((coarse_area - expected).abs() / expected < 0.3, "coarse area {}", coarse_area);

    let update = terrain.update_focus(Vec3::new(46.0, 16.0, 16.0)).unwrap();
    assert!(update.subdivided.contains(&parent));
    assert!(update.removed_leaves.contains(&parent));
    settle(&mut terrain);

    assert!(terrain.mesh(parent).is_none());
    let children = parent.children();
    let mut fine_area = 0.0;
    for child in children {
        assert_eq!(terrain.chunk_state(child), Some(ChunkState::Meshed), "child {:?}", child);
        fine_area += terrain.mesh(child).expect("child is meshed").surface_area();
    }
    assert!(
        (fine_area - coarse_area).abs() / coarse_area < 0.15,
        "fine {} vs coarse {}",
        fine_area,
        coarse_area
    );
    check_seams(&terrain);
}

#[test]
fn test_carved_chunk_empties_and_neighbors_remesh() {
    let mut terrain = terrain(settings(0, 40.0, flat(8.5, 1)));
    focus(&mut terrain, Vec3::new(8.0, 8.0, 8.0));
    let key = ChunkKey::new(0, 0, 0, 0);
    assert!(!terrain.mesh(key).expect("meshed").is_empty());

    let affected = terrain
        .apply_edit(
            EditShape::Box { min: [-0.5, -0.5, -0.5], max: [16.5, 16.5, 16.5] },
            EditOperation::Remove,
            1.0,
        )
        .unwrap();
    assert!(affected.contains(&key));

    let lateral: Vec<ChunkKey> = [Direction::FACES[0], Direction::FACES[1], Direction::FACES[4], Direction::FACES[5]]
        .iter()
        .map(|d| key.offset(*d))
        .collect();
    for n in &lateral {
        assert_eq!(terrain.chunk_state(*n), Some(ChunkState::Stale), "neighbor {:?}", n);
    }

    settle(&mut terrain);
    assert!(terrain.mesh(key).expect("meshed").is_empty());
    for n in &lateral {
        assert_eq!(terrain.chunk_state(*n), Some(ChunkState::Meshed), "neighbor {:?}", n);
        // стенка выреза x/z = 16.5 или -0.5 попадает в соседа
        assert!(!terrain.mesh(*n).expect("meshed").is_empty(), "neighbor {:?}", n);
    }
    check_seams(&terrain);
}
