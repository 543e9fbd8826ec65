// ============================================
// Marching Tetrahedra - Извлечение поверхности без трещин между LOD
// ============================================
//
// Каждая клетка режется на 6 тетраэдров вдоль главной диагонали (Kuhn).
// На любой грани куба это даёт диагональ от min к max угла, поэтому
// сетка мелкой грани вкладывается в треугольники грубой грани.
//
// Шов с грубым соседом: граничные сэмплы, касающиеся его (грань, ребро,
// угол), заменяются кусочно-линейным интерполянтом грубого чанка.
// Тогда нулевой контур на общей грани совпадает у обеих сторон.

use ultraviolet::Vec3;

use crate::math::{ChunkKey, Direction, VoxelPos, CHUNK_SIZE};
use crate::voxel::{Neighborhood, Voxel};

use super::context::{padded_index, padded_local, MeshingContext};
use super::vertex::MeshVertex;

const MAX: i32 = CHUNK_SIZE;

/// Углы куба: бит 0 = x, бит 1 = y, бит 2 = z
const CORNERS: [[i32; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [0, 1, 0],
    [1, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [0, 1, 1],
    [1, 1, 1],
];

/// 6 тетраэдров: пути 0 -> e_a -> e_a + e_b -> 7 по всем перестановкам осей
const TETRAHEDRA: [[usize; 4]; 6] = [
    [0, 1, 3, 7],
    [0, 1, 5, 7],
    [0, 2, 3, 7],
    [0, 2, 6, 7],
    [0, 4, 5, 7],
    [0, 4, 6, 7],
];

/// Заполнить сетку с отступом: свои сэмплы + соседи / экстраполяция
pub fn fill_grid(ctx: &mut MeshingContext, hood: &Neighborhood) {
    for k in -1..=MAX + 1 {
        for j in -1..=MAX + 1 {
            for i in -1..=MAX + 1 {
                ctx.grid[padded_index(i, j, k)] = hood.sample(i, j, k);
            }
        }
    }
}

/// Пересэмплировать граничные сэмплы по более грубым соседям
pub fn resample_seams(ctx: &mut MeshingContext, hood: &Neighborhood) {
    if hood.coarser_mask() == 0 {
        return;
    }
    let key = hood.key();
    let span = |d: i32| if d < 0 { 0..=0 } else if d > 0 { MAX..=MAX } else { 0..=MAX };

    for (idx, dir) in Direction::ALL.iter().enumerate() {
        let source = match hood.coarse_source(idx) {
            Some(source) => source,
            None => continue,
        };
        for k in span(dir.dz) {
            for j in span(dir.dy) {
                for i in span(dir.dx) {
                    ctx.grid[padded_index(i, j, k)] = source.interpolate(key.sample_position(i, j, k));
                }
            }
        }
    }
}

/// Все сэмплы чанка (0..=16) одного знака
pub fn is_degenerate(ctx: &MeshingContext) -> bool {
    let first = ctx.grid[padded_index(0, 0, 0)].is_solid();
    for k in 0..=MAX {
        for j in 0..=MAX {
            for i in 0..=MAX {
                if ctx.grid[padded_index(i, j, k)].is_solid() != first {
                    return false;
                }
            }
        }
    }
    true
}

/// Построить треугольники по всем 16^3 клеткам
pub fn polygonize(ctx: &mut MeshingContext, key: ChunkKey) {
    let mut corners = [0usize; 8];
    for k in 0..MAX {
        for j in 0..MAX {
            for i in 0..MAX {
                let mut solid = 0;
                for (c, off) in CORNERS.iter().enumerate() {
                    let idx = padded_index(i + off[0], j + off[1], k + off[2]);
                    corners[c] = idx;
                    if ctx.grid[idx].is_solid() {
                        solid += 1;
                    }
                }
                if solid == 0 || solid == 8 {
                    continue;
                }
                for tet in TETRAHEDRA.iter() {
                    polygonize_tetrahedron(
                        ctx,
                        key,
                        [corners[tet[0]], corners[tet[1]], corners[tet[2]], corners[tet[3]]],
                    );
                }
            }
        }
    }
}

fn polygonize_tetrahedron(ctx: &mut MeshingContext, key: ChunkKey, tet: [usize; 4]) {
    let mut inside = [0usize; 4];
    let mut outside = [0usize; 4];
    let (mut n_in, mut n_out) = (0, 0);
    for &c in &tet {
        if ctx.grid[c].is_solid() {
            inside[n_in] = c;
            n_in += 1;
        } else {
            outside[n_out] = c;
            n_out += 1;
        }
    }
    if n_in == 0 || n_out == 0 {
        return;
    }

    let direction = centroid(key, &outside[..n_out]) - centroid(key, &inside[..n_in]);

    match n_in {
        1 => {
            let a = inside[0];
            let v = [
                edge_vertex(ctx, key, a, outside[0]),
                edge_vertex(ctx, key, a, outside[1]),
                edge_vertex(ctx, key, a, outside[2]),
            ];
            emit_triangle(ctx, v, direction);
        }
        3 => {
            let b = outside[0];
            let v = [
                edge_vertex(ctx, key, inside[0], b),
                edge_vertex(ctx, key, inside[1], b),
                edge_vertex(ctx, key, inside[2], b),
            ];
            emit_triangle(ctx, v, direction);
        }
        _ => {
            // квад по рёбрам a-c, a-d, b-d, b-c
            let (a, b) = (inside[0], inside[1]);
            let (c, d) = (outside[0], outside[1]);
            let ac = edge_vertex(ctx, key, a, c);
            let ad = edge_vertex(ctx, key, a, d);
            let bd = edge_vertex(ctx, key, b, d);
            let bc = edge_vertex(ctx, key, b, c);
            emit_triangle(ctx, [ac, ad, bd], direction);
            emit_triangle(ctx, [ac, bd, bc], direction);
        }
    }
}

#[inline]
fn world_of(key: ChunkKey, index: usize) -> VoxelPos {
    let [i, j, k] = padded_local(index);
    key.sample_position(i, j, k)
}

fn centroid(key: ChunkKey, corners: &[usize]) -> Vec3 {
    let sum = corners
        .iter()
        .fold(Vec3::zero(), |acc, &c| acc + world_of(key, c).to_vec3());
    sum / corners.len() as f32
}

/// Треугольник с нормалью наружу (в сторону положительной плотности)
fn emit_triangle(ctx: &mut MeshingContext, v: [u32; 3], outward: Vec3) {
    if v[0] == v[1] || v[1] == v[2] || v[0] == v[2] {
        return;
    }
    let p = |i: u32| Vec3::from(ctx.vertices[i as usize].position);
    let (a, b, c) = (p(v[0]), p(v[1]), p(v[2]));
    let cross = (b - a).cross(c - a);
    if cross.mag_sq() < 1e-12 {
        return;
    }
    if cross.dot(outward) < 0.0 {
        ctx.indices.extend_from_slice(&[v[0], v[2], v[1]]);
    } else {
        ctx.indices.extend_from_slice(&v);
    }
}

/// Вершина на ребре (a, b). Точка считается от меньшего по мировой
/// позиции конца, поэтому соседние чанки получают её побитово одинаковой.
fn edge_vertex(ctx: &mut MeshingContext, key: ChunkKey, a: usize, b: usize) -> u32 {
    let cache_key = (a.min(b) as u32, a.max(b) as u32);
    if let Some(&v) = ctx.edge_vertices.get(&cache_key) {
        return v;
    }

    let (pa, pb) = (world_of(key, a), world_of(key, b));
    let (first, second) = if pa <= pb { (a, b) } else { (b, a) };
    let (p0, p1) = (world_of(key, first), world_of(key, second));
    let (v0, v1) = (ctx.grid[first], ctx.grid[second]);

    let t = v0.density / (v0.density - v1.density);
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.5 };

    let f0 = p0.to_vec3();
    let f1 = p1.to_vec3();
    let position = f0 + (f1 - f0) * t;

    let g0 = gradient(ctx, first);
    let g1 = gradient(ctx, second);
    let g = g0 + (g1 - g0) * t;
    let normal = if g.mag_sq() > 1e-20 { g.normalized() } else { Vec3::unit_y() };

    let material = solid_material(v0, v1);
    let index = ctx.vertices.len() as u32;
    ctx.vertices.push(MeshVertex::new(
        [position.x, position.y, position.z],
        [normal.x, normal.y, normal.z],
        material,
    ));
    ctx.edge_vertices.insert(cache_key, index);
    index
}

#[inline]
fn solid_material(a: Voxel, b: Voxel) -> u8 {
    if a.is_solid() { a.material } else { b.material }
}

/// Градиент плотности центральными разностями (направлен наружу)
fn gradient(ctx: &MeshingContext, index: usize) -> Vec3 {
    let [i, j, k] = padded_local(index);
    let d = |i: i32, j: i32, k: i32| -> f32 {
        let (i, j, k) = (i.clamp(-1, MAX + 1), j.clamp(-1, MAX + 1), k.clamp(-1, MAX + 1));
        ctx.grid[padded_index(i, j, k)].density
    };
    Vec3::new(
        d(i + 1, j, k) - d(i - 1, j, k),
        d(i, j + 1, k) - d(i, j - 1, k),
        d(i, j, k + 1) - d(i, j, k - 1),
    )
}
