// ============================================
// Voxel Terrain - Редактируемый воксельный terrain с LOD
// ============================================
// Разреженное октодерево чанков, фоновая генерация и меширование,
// сшивка швов между LOD, журнал правок и сохранение дельт.
//
// Поток управления:
//   OctreeIndex решает какие чанки нужны -> Scheduler ставит задачи ->
//   GenerationPipeline заполняет VoxelStore -> Mesher строит MeshArtifact.
//   EditLog перехватывает правки и инвалидирует затронутые чанки.

pub mod core;
pub mod math;
pub mod voxel;
pub mod octree;
pub mod edit;
pub mod generation;
pub mod meshing;
pub mod scheduler;
pub mod save;
pub mod world;

pub use crate::core::{
    init_logging, GeneratorConfig, SettingsError, TerrainError, TerrainSettings,
};
pub use math::{ChunkKey, Direction, VoxelBox, VoxelPos, CHUNK_SIZE, CHUNK_SAMPLES};
pub use voxel::{ChunkHandle, ChunkState, ChunkStorage, Voxel, VoxelStore};
pub use octree::{FocusUpdate, InvariantViolation, LodPolicy, OctreeIndex};
pub use edit::{EditLog, EditOperation, EditOutcome, EditRecord, EditShape};
pub use generation::{GenerationPipeline, WorldGenerator};
pub use meshing::{MeshArtifact, MeshVertex, Mesher};
pub use scheduler::{Job, JobKind, Scheduler, TickBudget};
pub use world::{MeshConsumer, TerrainEvent, TerrainStats, VoxelTerrain};
