// ============================================
// Mesh Artifact - Готовый меш одного чанка
// ============================================
// Заменяется целиком при каждом перемешивании, никогда не мутируется.

use ultraviolet::Vec3;

use crate::math::ChunkKey;

use super::vertex::MeshVertex;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshArtifact {
    pub key: ChunkKey,
    /// Поколение данных чанка, из которого построен меш
    pub generation: u64,
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
    /// Грани (-X,+X,-Y,+Y,-Z,+Z), граничащие с более грубым соседом
    pub transition_mask: u8,
    /// Направления (26), где шов построен по экстраполяции
    pub provisional_mask: u32,
    /// Материалы, встречающиеся в меше (по возрастанию)
    pub materials: Vec<u8>,
}

impl MeshArtifact {
    /// Пустой результат (вырожденный чанк)
    pub fn empty(key: ChunkKey, generation: u64, transition_mask: u8, provisional_mask: u32) -> Self {
        Self {
            key,
            generation,
            vertices: Vec::new(),
            indices: Vec::new(),
            transition_mask,
            provisional_mask,
            materials: Vec::new(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Шов построен окончательно (все соседи были готовы)
    #[inline]
    pub fn is_final(&self) -> bool {
        self.provisional_mask == 0
    }

    /// Треугольники в мировых координатах
    pub fn triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        self.indices.chunks_exact(3).map(move |tri| {
            let p = |i: u32| Vec3::from(self.vertices[i as usize].position);
            [p(tri[0]), p(tri[1]), p(tri[2])]
        })
    }

    /// Суммарная площадь поверхности
    pub fn surface_area(&self) -> f32 {
        self.triangles()
            .map(|[a, b, c]| (b - a).cross(c - a).mag() * 0.5)
            .sum()
    }

    pub fn memory_usage(&self) -> usize {
        self.vertices.len() * std::mem::size_of::<MeshVertex>()
            + self.indices.len() * std::mem::size_of::<u32>()
            + self.materials.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_of_unit_quad() {
        let mut artifact = MeshArtifact::empty(ChunkKey::new(0, 0, 0, 0), 1, 0, 0);
        artifact.vertices = vec![
            MeshVertex::new([0.0, 0.0, 0.0], [0.0, 1.0, 0.0], 1),
            MeshVertex::new([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], 1),
            MeshVertex::new([1.0, 0.0, 1.0], [0.0, 1.0, 0.0], 1),
            MeshVertex::new([0.0, 0.0, 1.0], [0.0, 1.0, 0.0], 1),
        ];
        artifact.indices = vec![0, 1, 2, 0, 2, 3];
        assert_eq!(artifact.triangle_count(), 2);
        assert!((artifact.surface_area() - 1.0).abs() < 1e-6);
        assert!(!artifact.is_empty());
    }
}
