// ============================================
// Meshing Context - Zero-allocation буферы
// ============================================
//
// Контекст для генерации мешей с переиспользуемыми буферами.
// Принцип "Alloc Once, Reuse Forever" - память выделяется один раз,
// затем только очищается через clear() сохраняя capacity.

use std::cell::RefCell;
use std::collections::HashMap;

use fast_surface_nets::SurfaceNetsBuffer;

use crate::math::CHUNK_SAMPLES;
use crate::voxel::Voxel;

use super::vertex::MeshVertex;

/// Ребро сетки с отступом (-1..=17 по каждой оси)
pub const PADDED: usize = CHUNK_SAMPLES + 2;

/// Всего сэмплов в сетке с отступом (19^3)
pub const PADDED_COUNT: usize = PADDED * PADDED * PADDED;

/// Индекс в сетке с отступом по локальным координатам -1..=17
#[inline]
pub fn padded_index(i: i32, j: i32, k: i32) -> usize {
    (i + 1) as usize + (j + 1) as usize * PADDED + (k + 1) as usize * PADDED * PADDED
}

/// Обратное преобразование: локальные координаты сэмпла
#[inline]
pub fn padded_local(index: usize) -> [i32; 3] {
    [
        (index % PADDED) as i32 - 1,
        ((index / PADDED) % PADDED) as i32 - 1,
        (index / (PADDED * PADDED)) as i32 - 1,
    ]
}

/// Контекст генерации меша - содержит все переиспользуемые буферы
pub struct MeshingContext {
    /// Сэмплы чанка + один слой соседей, после пересэмплирования швов
    pub grid: Vec<Voxel>,
    /// Кэш вершин на рёбрах: (меньший, больший индекс угла) -> индекс вершины
    pub edge_vertices: HashMap<(u32, u32), u32>,

    /// Выходной буфер вершин
    pub vertices: Vec<MeshVertex>,
    /// Выходной буфер индексов
    pub indices: Vec<u32>,

    /// Вход и выход fast-surface-nets
    pub sdf: Vec<f32>,
    pub surface_nets: SurfaceNetsBuffer,
}

impl MeshingContext {
    /// Создаёт новый контекст с преаллоцированными буферами
    pub fn new() -> Self {
        Self {
            grid: vec![Voxel::AIR; PADDED_COUNT],
            edge_vertices: HashMap::with_capacity(4096),
            vertices: Vec::with_capacity(4096),
            indices: Vec::with_capacity(8192),
            sdf: vec![1.0; PADDED_COUNT],
            surface_nets: SurfaceNetsBuffer::default(),
        }
    }

    /// Очищает выходные буферы перед генерацией нового меша
    #[inline]
    pub fn clear_output(&mut self) {
        self.edge_vertices.clear();
        self.vertices.clear();
        self.indices.clear();
    }

    /// Возвращает результаты и очищает внутренние буферы
    #[inline]
    pub fn take_results(&mut self) -> (Vec<MeshVertex>, Vec<u32>) {
        let vertices = std::mem::take(&mut self.vertices);
        let indices = std::mem::take(&mut self.indices);

        // Восстанавливаем capacity для следующего использования
        self.vertices = Vec::with_capacity(vertices.capacity());
        self.indices = Vec::with_capacity(indices.capacity());
        self.edge_vertices.clear();

        (vertices, indices)
    }
}

impl Default for MeshingContext {
    fn default() -> Self {
        Self::new()
    }
}

thread_local! {
    /// Контекст текущего потока (каждый воркер rayon получает свой)
    static MESHING_CONTEXT: RefCell<MeshingContext> = RefCell::new(MeshingContext::new());
}

/// Выполняет функцию с thread-local контекстом
#[inline]
pub fn with_meshing_context<F, R>(f: F) -> R
where
    F: FnOnce(&mut MeshingContext) -> R,
{
    MESHING_CONTEXT.with(|ctx| {
        let mut ctx = ctx.borrow_mut();
        f(&mut ctx)
    })
}
