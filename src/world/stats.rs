// ============================================
// Terrain Stats - Счётчики тома для отладочного оверлея
// ============================================

/// Снимок состояния тома
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TerrainStats {
    pub tick: u64,
    /// Записи VoxelStore (листья и кэш)
    pub resident_chunks: usize,
    /// Чанки, свёрнутые в одно значение
    pub uniform_chunks: usize,
    pub leaves: usize,
    pub octree_nodes: usize,
    pub queued_jobs: usize,
    pub active_jobs: usize,
    pub meshes: usize,
    pub triangles: usize,
    /// Живые записи журнала правок
    pub edits: usize,
    /// Снимки выгруженных чанков
    pub snapshots: usize,
    /// Сэмплы, изменённые правками и ещё не попавшие в снимки
    pub unsaved_samples: usize,
    pub failed_chunks: usize,
    /// Оценка памяти: сэмплы + меши + снимки
    pub memory_bytes: usize,
}

impl TerrainStats {
    pub fn memory_mb(&self) -> f32 {
        self.memory_bytes as f32 / (1024.0 * 1024.0)
    }
}
