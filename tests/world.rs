// ============================================
// Том целиком: правки, реплей, сохранение, потоки, баланс
// ============================================

mod common;

use std::collections::BTreeMap;

use common::*;
use ultraviolet::Vec3;
use voxel_terrain::core::ExtractionMode;
use voxel_terrain::{ChunkKey, EditOperation, EditShape, MeshArtifact, MeshConsumer, TerrainEvent, VoxelTerrain};

fn edit_script(terrain: &mut VoxelTerrain) {
    terrain
        .apply_edit(EditShape::Sphere { center: [8.0, 8.5, 8.0], radius: 5.0 }, EditOperation::Add { material: 3 }, 1.0)
        .unwrap();
    terrain
        .apply_edit(EditShape::Box { min: [20.0, 2.0, 20.0], max: [28.0, 12.0, 28.0] }, EditOperation::Remove, 1.0)
        .unwrap();
    terrain
        .apply_edit(
            EditShape::Cylinder { center: [-6.0, 8.0, 4.0], radius: 4.0, height: 6.0 },
            EditOperation::Paint { material: 7 },
            1.0,
        )
        .unwrap();
    terrain
        .apply_edit(EditShape::Sphere { center: [8.0, 12.0, 8.0], radius: 3.0 }, EditOperation::Remove, 0.5)
        .unwrap();
}

fn edit_settings() -> voxel_terrain::TerrainSettings {
    settings(0, 32.0, flat(8.5, 1))
}

fn viewer() -> Vec3 {
    Vec3::new(8.0, 8.0, 8.0)
}

#[test]
fn test_live_and_replayed_edits_agree() {
    let mut live = terrain(edit_settings());
    focus(&mut live, viewer());
    edit_script(&mut live);
    settle(&mut live);
    let records = live.export_edits_since(0);
    assert_eq!(records.len(), 4);

    // правки известны до генерации: применяются в конвейере генерации
    let mut replayed = terrain(edit_settings());
    assert!(replayed.import_edits(records.clone()).unwrap().is_empty());
    focus(&mut replayed, viewer());
    assert_same_samples(&live, &replayed);

    // правки приходят дельтой на уже сгенерированный мир
    let mut synced = terrain(edit_settings());
    focus(&mut synced, viewer());
    let delta = live.export_delta(0).unwrap();
    let affected = synced.import_delta(&delta).unwrap();
    assert!(!affected.is_empty());
    settle(&mut synced);
    assert_same_samples(&live, &synced);

    // повторный импорт ничего не меняет
    assert!(synced.import_delta(&delta).unwrap().is_empty());
    assert_eq!(synced.edit_log().len(), 4);
}

#[test]
fn test_out_of_order_import_regenerates() {
    let mut source = terrain(edit_settings());
    focus(&mut source, viewer());
    edit_script(&mut source);
    settle(&mut source);
    let records = source.export_edits_since(0);

    let mut target = terrain(edit_settings());
    focus(&mut target, viewer());
    target.import_edits(records[2..].to_vec()).unwrap();
    settle(&mut target);
    target.import_edits(records[..2].to_vec()).unwrap();
    settle(&mut target);
    assert_same_samples(&source, &target);
}

#[test]
fn test_undo_restores_generated_samples() {
    let mut terrain = terrain(edit_settings());
    focus(&mut terrain, viewer());
    let key = ChunkKey::new(0, 0, 0, 0);
    let before = samples(&terrain, key);

    terrain
        .apply_edit(EditShape::Sphere { center: [8.0, 8.5, 8.0], radius: 4.0 }, EditOperation::Remove, 1.0)
        .unwrap();
    terrain.save_frame();
    settle(&mut terrain);
    let carved = samples(&terrain, key);
    assert!(before.iter().zip(&carved).any(|(a, b)| !a.same_bits(b)));

    let undone = terrain.undo().expect("one frame to undo");
    assert!(undone.contains(&key));
    settle(&mut terrain);
    let restored = samples(&terrain, key);
    assert!(before.iter().zip(&restored).all(|(a, b)| a.same_bits(b)));
    assert!(terrain.edit_log().is_empty());

    terrain.redo().expect("one frame to redo");
    settle(&mut terrain);
    let redone = samples(&terrain, key);
    assert!(carved.iter().zip(&redone).all(|(a, b)| a.same_bits(b)));
    assert!(terrain.undo().is_some());
    assert!(terrain.undo().is_none());
}

#[test]
fn test_save_and_load_world() {
    let path = std::env::temp_dir().join(format!("voxel_terrain_world_{}.vtw", std::process::id()));

    let mut original = terrain(edit_settings());
    focus(&mut original, viewer());
    edit_script(&mut original);
    settle(&mut original);
    original.save(&path).unwrap();

    let mut loaded = terrain(edit_settings());
    let summary = loaded.load(&path).unwrap();
    assert_eq!(summary.edits, 4);
    assert_eq!(summary.corrupted, 0);
    assert!(summary.chunks > 0);
    assert_eq!(summary.viewer, viewer());

    focus(&mut loaded, summary.viewer);
    assert_same_samples(&original, &loaded);
    assert_eq!(loaded.edit_log().last_sequence(), original.edit_log().last_sequence());

    // новые правки продолжают нумерацию
    loaded
        .apply_edit(EditShape::Sphere { center: [0.0, 8.0, 0.0], radius: 2.0 }, EditOperation::Remove, 1.0)
        .unwrap();
    let last = loaded.export_edits_since(0).last().map(|r| r.sequence);
    assert_eq!(last, Some(original.edit_log().last_sequence() + 1));

    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_compacted_edits_survive_in_snapshots() {
    let mut s = edit_settings();
    s.eviction_grace_ticks = 0;
    let mut terrain = terrain(s);
    focus(&mut terrain, viewer());
    edit_script(&mut terrain);
    settle(&mut terrain);
    let key = ChunkKey::new(0, 0, 0, 0);
    let edited = samples(&terrain, key);

    let through = terrain.edit_log().last_sequence();
    assert_eq!(terrain.compact_edits(through), 4);
    assert!(terrain.edit_log().is_empty());
    assert!(terrain.stats().snapshots > 0);

    // уйти далеко (выгрузка), вернуться: данные из снимка
    focus(&mut terrain, Vec3::new(4000.0, 8.0, 8.0));
    assert!(terrain.chunk_state(key).is_none());
    focus(&mut terrain, viewer());
    let restored = samples(&terrain, key);
    assert!(edited.iter().zip(&restored).all(|(a, b)| a.same_bits(b)));
}

#[test]
fn test_threaded_pool_matches_inline() {
    let config = sphere([3.0, -2.0, 5.0], 21.7);
    let run = |threads: usize| -> BTreeMap<ChunkKey, usize> {
        let mut s = settings(1, 64.0, config.clone());
        s.worker_threads = threads;
        let mut terrain = terrain(s);
        focus(&mut terrain, Vec3::new(10.0, 4.0, -6.0));
        assert!(terrain.check_invariants().is_ok());
        let counts = terrain.meshes().map(|m| (m.key, m.triangle_count())).collect();
        terrain.shutdown();
        counts
    };
    let inline = run(0);
    let threaded = run(3);
    assert!(inline.values().sum::<usize>() > 0);
    assert_eq!(inline, threaded);
}

#[test]
fn test_surface_nets_mode_meshes_single_lod() {
    let mut s = settings(0, 32.0, sphere([0.0, 0.0, 0.0], 12.5));
    s.extraction = ExtractionMode::SurfaceNets;
    let mut terrain = terrain(s);
    focus(&mut terrain, Vec3::zero());
    assert_all_meshed(&terrain);
    assert!(terrain.stats().triangles > 0);
    // вершины surface nets лежат в клетке, пересекающей поверхность
    for mesh in terrain.meshes() {
        for v in &mesh.vertices {
            let r = distance(v.position, [0.0; 3]);
            assert!((r - 12.5).abs() < 1.0, "{:?} vertex at radius {}", mesh.key, r);
        }
    }
}

#[test]
fn test_balance_holds_while_moving() {
    let mut s = settings(3, 256.0, flat(0.5, 1));
    s.retention_radius = 400.0;
    let mut terrain = terrain(s);
    let path = [
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(40.0, 10.0, -25.0),
        Vec3::new(130.0, 0.0, 0.0),
        Vec3::new(131.0, 64.0, 5.0),
        Vec3::new(-200.0, 0.0, 90.0),
        Vec3::new(0.0, 0.0, 0.0),
    ];
    for viewer in path {
        terrain.update_focus(viewer).unwrap();
        assert!(terrain.check_invariants().is_ok(), "unbalanced at {:?}", viewer);
        for _ in 0..3 {
            terrain.tick();
        }
    }
    settle(&mut terrain);
    assert_all_meshed(&terrain);
    let stats = terrain.stats();
    assert_eq!(stats.leaves, terrain.octree().leaf_count());
    assert_eq!(stats.meshes, stats.leaves);
    assert_eq!(stats.queued_jobs + stats.active_jobs, 0);
}

#[derive(Default)]
struct Renderer {
    meshes: BTreeMap<ChunkKey, usize>,
    removed: usize,
    failed: usize,
}

impl MeshConsumer for Renderer {
    fn mesh_ready(&mut self, artifact: &MeshArtifact) {
        self.meshes.insert(artifact.key, artifact.triangle_count());
    }
    fn mesh_removed(&mut self, key: ChunkKey) {
        self.meshes.remove(&key);
        self.removed += 1;
    }
    fn generation_failed(&mut self, _key: ChunkKey, _reason: &str) {
        self.failed += 1;
    }
    fn mesh_failed(&mut self, _key: ChunkKey, _reason: &str) {
        self.failed += 1;
    }
}

#[test]
fn test_consumer_mirrors_leaf_meshes() {
    let mut s = settings(1, 64.0, sphere([16.0, 16.0, 16.0], 10.3));
    s.retention_radius = 128.0;
    let mut terrain = terrain(s);
    let mut renderer = Renderer::default();

    focus(&mut terrain, Vec3::new(76.0, 16.0, 16.0));
    assert!(terrain.deliver(&mut renderer) > 0);
    focus(&mut terrain, Vec3::new(46.0, 16.0, 16.0));
    terrain.deliver(&mut renderer);
    assert!(renderer.removed > 0);
    assert_eq!(renderer.failed, 0);
    assert_eq!(terrain.pending_events(), 0);

    let mirrored: BTreeMap<ChunkKey, usize> = terrain.meshes().map(|m| (m.key, m.triangle_count())).collect();
    assert_eq!(renderer.meshes, mirrored);
    for key in renderer.meshes.keys() {
        assert!(terrain.octree().is_leaf(*key));
    }

    terrain
        .apply_edit(EditShape::Sphere { center: [16.0, 16.0, 16.0], radius: 4.0 }, EditOperation::Remove, 1.0)
        .unwrap();
    settle(&mut terrain);
    let events = terrain.drain_events();
    assert!(events.iter().any(|e| matches!(e, TerrainEvent::MeshReady(_))));
    assert!(events.iter().all(|e| terrain.octree().is_leaf(e.key())));
}
