// ============================================
// Общие помощники интеграционных тестов
// ============================================
#![allow(dead_code)]

use ultraviolet::Vec3;
use voxel_terrain::octree::NeighborLink;
use voxel_terrain::scheduler::TickBudget;
use voxel_terrain::{
    ChunkKey, ChunkState, Direction, GeneratorConfig, MeshArtifact, TerrainSettings, Voxel, VoxelTerrain,
};

/// Вершина лежит в плоскости грани
pub const PLANE_EPS: f32 = 1e-4;
/// Допуск совпадения вершин по разные стороны шва
pub const SEAM_EPS: f32 = 1e-3;

pub fn settings(max_lod: u8, view_radius: f32, generator: GeneratorConfig) -> TerrainSettings {
    TerrainSettings {
        max_lod,
        view_radius,
        retention_radius: view_radius * 2.0,
        eviction_grace_ticks: 10_000,
        worker_threads: 0,
        generator,
        ..TerrainSettings::default()
    }
}

pub fn flat(height: f32, material: u8) -> GeneratorConfig {
    GeneratorConfig::Flat { height, material }
}

pub fn sphere(center: [f32; 3], radius: f32) -> GeneratorConfig {
    GeneratorConfig::Sphere { center, radius, material: 1 }
}

pub fn terrain(settings: TerrainSettings) -> VoxelTerrain {
    let mut terrain = VoxelTerrain::from_settings(settings).expect("terrain settings are valid");
    terrain.set_tick_budget(TickBudget::unlimited());
    terrain
}

/// Сфокусироваться и дождаться всех задач
pub fn focus(terrain: &mut VoxelTerrain, viewer: Vec3) {
    terrain.update_focus(viewer).expect("terrain is running");
    settle(terrain);
}

pub fn settle(terrain: &mut VoxelTerrain) {
    assert!(terrain.run_until_idle(100_000), "terrain did not become idle");
}

pub fn sorted_leaves(terrain: &VoxelTerrain) -> Vec<ChunkKey> {
    let mut leaves: Vec<ChunkKey> = terrain.octree().leaves().collect();
    leaves.sort();
    leaves
}

pub fn assert_all_meshed(terrain: &VoxelTerrain) {
    for key in terrain.octree().leaves() {
        assert_eq!(terrain.chunk_state(key), Some(ChunkState::Meshed), "leaf {:?}", key);
        assert!(terrain.mesh(key).is_some(), "leaf {:?} has no mesh", key);
    }
}

/// Сэмплы листа (развёрнутые из однородного хранения)
pub fn samples(terrain: &VoxelTerrain, key: ChunkKey) -> Vec<Voxel> {
    terrain
        .store()
        .chunk_by_key(key)
        .and_then(|c| c.storage())
        .map(|s| s.to_vec())
        .unwrap_or_else(|| panic!("chunk {:?} has no data", key))
}

pub fn assert_same_samples(a: &VoxelTerrain, b: &VoxelTerrain) {
    let leaves = sorted_leaves(a);
    assert_eq!(leaves, sorted_leaves(b));
    for key in leaves {
        let (sa, sb) = (samples(a, key), samples(b, key));
        let differs = sa.iter().zip(sb.iter()).position(|(x, y)| !x.same_bits(y));
        assert_eq!(differs, None, "chunk {:?} differs at sample {:?}", key, differs);
    }
}

// ---------- Геометрия швов ----------

/// Ось и координата плоскости грани `dir` чанка `key`
pub fn face_plane(key: ChunkKey, dir: Direction) -> (usize, f32) {
    let origin = key.origin();
    let (axis, lo, d) = if dir.dx != 0 {
        (0, origin.x, dir.dx)
    } else if dir.dy != 0 {
        (1, origin.y, dir.dy)
    } else {
        (2, origin.z, dir.dz)
    };
    let value = if d > 0 { lo + key.size() } else { lo };
    (axis, value as f32)
}

/// Прямоугольник грани по двум другим осям: (мин, макс) как [f32; 3]
fn face_rect(key: ChunkKey) -> ([f32; 3], [f32; 3]) {
    let o = key.origin();
    let s = key.size();
    (
        [o.x as f32, o.y as f32, o.z as f32],
        [(o.x + s) as f32, (o.y + s) as f32, (o.z + s) as f32],
    )
}

fn strictly_inside_face(p: [f32; 3], key: ChunkKey, axis: usize) -> bool {
    let (lo, hi) = face_rect(key);
    (0..3)
        .filter(|a| *a != axis)
        .all(|a| p[a] > lo[a] + SEAM_EPS && p[a] < hi[a] - SEAM_EPS)
}

pub fn plane_vertices(mesh: Option<&MeshArtifact>, axis: usize, value: f32) -> Vec<[f32; 3]> {
    mesh.map(|m| {
        m.vertices
            .iter()
            .map(|v| v.position)
            .filter(|p| (p[axis] - value).abs() < PLANE_EPS)
            .collect()
    })
    .unwrap_or_default()
}

/// Рёбра треугольников, оба конца которых лежат в плоскости
pub fn plane_segments(mesh: Option<&MeshArtifact>, axis: usize, value: f32) -> Vec<([f32; 3], [f32; 3])> {
    let mesh = match mesh {
        Some(m) => m,
        None => return Vec::new(),
    };
    let on_plane = |p: [f32; 3]| (p[axis] - value).abs() < PLANE_EPS;
    let mut segments = Vec::new();
    for tri in mesh.indices.chunks_exact(3) {
        let p = [
            mesh.vertices[tri[0] as usize].position,
            mesh.vertices[tri[1] as usize].position,
            mesh.vertices[tri[2] as usize].position,
        ];
        for (a, b) in [(0, 1), (1, 2), (2, 0)] {
            if on_plane(p[a]) && on_plane(p[b]) {
                segments.push((p[a], p[b]));
            }
        }
    }
    segments
}

pub fn distance(a: [f32; 3], b: [f32; 3]) -> f32 {
    let d = [a[0] - b[0], a[1] - b[1], a[2] - b[2]];
    (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt()
}

pub fn segment_distance(p: [f32; 3], a: [f32; 3], b: [f32; 3]) -> f32 {
    let ab = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let ap = [p[0] - a[0], p[1] - a[1], p[2] - a[2]];
    let len2 = ab[0] * ab[0] + ab[1] * ab[1] + ab[2] * ab[2];
    if len2 <= f32::EPSILON {
        return distance(p, a);
    }
    let t = ((ap[0] * ab[0] + ap[1] * ab[1] + ap[2] * ab[2]) / len2).clamp(0.0, 1.0);
    distance(p, [a[0] + ab[0] * t, a[1] + ab[1] * t, a[2] + ab[2] * t])
}

fn has_match(p: [f32; 3], others: &[[f32; 3]]) -> bool {
    others.iter().any(|q| distance(p, *q) < SEAM_EPS)
}

#[derive(Debug, Default)]
pub struct SeamReport {
    /// Пары соседей одного LOD с вершинами на шве
    pub same_pairs: usize,
    /// Пары мелкий/грубый с вершинами на шве
    pub coarse_pairs: usize,
    pub checked_vertices: usize,
}

/// Проверить все швы по граням между листьями. Паникует на первой трещине.
pub fn check_seams(terrain: &VoxelTerrain) -> SeamReport {
    let mut report = SeamReport::default();
    for key in sorted_leaves(terrain) {
        let mesh = terrain.mesh(key);
        let links = terrain.octree().face_neighbors(key);
        for (dir, link) in Direction::FACES.iter().zip(links.iter()) {
            let (axis, value) = face_plane(key, *dir);
            match *link {
                NeighborLink::Same(other) if key < other => {
                    let other_mesh = terrain.mesh(other);
                    let va = plane_vertices(mesh.as_deref(), axis, value);
                    let vb = plane_vertices(other_mesh.as_deref(), axis, value);
                    for v in &va {
                        assert!(has_match(*v, &vb), "{:?} vertex {:?} has no twin in {:?}", key, v, other);
                    }
                    for v in &vb {
                        assert!(has_match(*v, &va), "{:?} vertex {:?} has no twin in {:?}", other, v, key);
                    }
                    if !va.is_empty() {
                        report.same_pairs += 1;
                        report.checked_vertices += va.len();
                    }
                }
                NeighborLink::Coarser(coarse) => {
                    let coarse_mesh = terrain.mesh(coarse);
                    let fine = plane_vertices(mesh.as_deref(), axis, value);
                    let segments = plane_segments(coarse_mesh.as_deref(), axis, value);
                    for v in &fine {
                        let nearest = segments
                            .iter()
                            .map(|(a, b)| segment_distance(*v, *a, *b))
                            .fold(f32::INFINITY, f32::min);
                        assert!(
                            nearest < SEAM_EPS,
                            "fine {:?} vertex {:?} is {} away from the contour of {:?}",
                            key,
                            v,
                            nearest,
                            coarse
                        );
                    }
                    // вершины грубого контура внутри грани мелкого листа есть и у мелкого
                    for v in plane_vertices(coarse_mesh.as_deref(), axis, value) {
                        if strictly_inside_face(v, key, axis) {
                            assert!(has_match(v, &fine), "coarse {:?} vertex {:?} missing in {:?}", coarse, v, key);
                        }
                    }
                    if !fine.is_empty() {
                        report.coarse_pairs += 1;
                        report.checked_vertices += fine.len();
                    }
                }
                _ => {}
            }
        }
    }
    report
}
