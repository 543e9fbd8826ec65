// ============================================
// Surface Nets - Быстрое извлечение через fast-surface-nets
// ============================================
// Режим для одного LOD (коллизии, превью): швы между разными LOD
// не сшиваются. Сетка 19^3 с отступом, вершины в координатах отступа.

use fast_surface_nets::ndshape::{ConstShape, ConstShape3u32};
use fast_surface_nets::surface_nets;

use crate::math::ChunkKey;

use super::context::{MeshingContext, PADDED, PADDED_COUNT};
use super::vertex::MeshVertex;

type PaddedShape = ConstShape3u32<19, 19, 19>;

/// Построить меш по уже заполненной ctx.grid
pub fn extract(ctx: &mut MeshingContext, key: ChunkKey) {
    debug_assert_eq!(PaddedShape::SIZE as usize, PADDED_COUNT);

    for (dst, v) in ctx.sdf.iter_mut().zip(ctx.grid.iter()) {
        *dst = v.density;
    }

    let last = PADDED as u32 - 1;
    surface_nets(&ctx.sdf, &PaddedShape {}, [0; 3], [last; 3], &mut ctx.surface_nets);

    let origin = key.origin().to_vec3();
    let step = key.step() as f32;

    let buffer = &ctx.surface_nets;
    for (i, p) in buffer.positions.iter().enumerate() {
        let world = [
            origin.x + (p[0] - 1.0) * step,
            origin.y + (p[1] - 1.0) * step,
            origin.z + (p[2] - 1.0) * step,
        ];
        let n = buffer.normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]);
        let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
        let normal = if len > 1e-12 { [n[0] / len, n[1] / len, n[2] / len] } else { [0.0, 1.0, 0.0] };
        let cell = buffer.surface_points.get(i).copied().unwrap_or([0; 3]);
        let material = cell_material(ctx, cell);
        ctx.vertices.push(MeshVertex::new(world, normal, material));
    }
    ctx.indices.extend_from_slice(&ctx.surface_nets.indices);
}

/// Материал первого твёрдого угла клетки
fn cell_material(ctx: &MeshingContext, cell: [u32; 3]) -> u8 {
    for dz in 0..2u32 {
        for dy in 0..2u32 {
            for dx in 0..2u32 {
                let x = (cell[0] + dx) as usize;
                let y = (cell[1] + dy) as usize;
                let z = (cell[2] + dz) as usize;
                if x >= PADDED || y >= PADDED || z >= PADDED {
                    continue;
                }
                let v = ctx.grid[x + y * PADDED + z * PADDED * PADDED];
                if v.is_solid() {
                    return v.material;
                }
            }
        }
    }
    0
}
