// ============================================
// World Module - Координатор тома и события для потребителя
// ============================================
// VoxelTerrain связывает хранилище, октодерево, журнал правок,
// планировщик и кодек. Глобального состояния нет: томов может быть
// сколько угодно, каждый со своим пулом воркеров.

mod events;
mod stats;
mod terrain;

pub use events::{EventQueue, MeshConsumer, TerrainEvent};
pub use stats::TerrainStats;
pub use terrain::{LoadSummary, VoxelTerrain};
