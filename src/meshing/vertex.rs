// ============================================
// Mesh Vertex - Структура вершины
// ============================================

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable, Default, PartialEq)]
pub struct MeshVertex {
    /// Мировая позиция (единицы LOD 0)
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub material: u32, // ID материала твёрдой стороны
}

impl MeshVertex {
    pub fn new(position: [f32; 3], normal: [f32; 3], material: u8) -> Self {
        Self { position, normal, material: material as u32 }
    }

    /// Сырые байты для загрузки в GPU буфер
    pub fn cast_slice(vertices: &[MeshVertex]) -> &[u8] {
        bytemuck::cast_slice(vertices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout() {
        assert_eq!(std::mem::size_of::<MeshVertex>(), 28);
        let v = [MeshVertex::new([1.0, 2.0, 3.0], [0.0, 1.0, 0.0], 7)];
        assert_eq!(MeshVertex::cast_slice(&v).len(), 28);
    }
}
