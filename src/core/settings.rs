// ============================================
// Terrain Settings - Data-Driven настройки из JSON
// ============================================
// Все параметры тома: LOD, радиусы, воркеры, сжатие, генератор

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Ошибки загрузки/проверки настроек
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Алгоритм извлечения изоповерхности
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionMode {
    /// Marching tetrahedra + сшивка швов между LOD (без трещин)
    MarchingTetrahedra,
    /// fast-surface-nets, только для одного LOD (коллизии, превью)
    SurfaceNets,
}

/// Выбор генератора мира (стратегия подставляется при генерации чанка)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GeneratorConfig {
    Empty,
    Flat {
        height: f32,
        #[serde(default)]
        material: u8,
    },
    Sphere {
        center: [f32; 3],
        radius: f32,
        #[serde(default)]
        material: u8,
    },
    Noise {
        seed: i32,
        frequency: f32,
        octaves: u8,
        amplitude: f32,
        base_height: f32,
        #[serde(default)]
        material: u8,
    },
    Heightmap {
        width: usize,
        depth: usize,
        /// Размер клетки карты высот в вокселях
        scale: f32,
        heights: Vec<f32>,
        #[serde(default)]
        material: u8,
    },
    Vdb {
        path: String,
        #[serde(default)]
        grid: Option<String>,
        #[serde(default = "default_vdb_background")]
        background: f32,
    },
}

fn default_vdb_background() -> f32 {
    1.0
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig::Flat { height: 0.0, material: 1 }
    }
}

/// Настройки одного воксельного тома
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainSettings {
    /// Самый грубый LOD (корни октодерева)
    pub max_lod: u8,
    /// Лист LOD l делится, если дистанция до центра < factor * размер чанка
    pub lod_split_factor: f32,
    /// Мёртвая зона между порогами split и merge (доля порога)
    pub lod_hysteresis: f32,
    /// Радиус, в котором существуют корни октодерева
    pub view_radius: f32,
    /// За этим радиусом чанки без ссылок выгружаются
    pub retention_radius: f32,
    /// Сколько тиков чанк без ссылок живёт до выгрузки
    pub eviction_grace_ticks: u64,
    /// 0 = задачи выполняются прямо в tick()
    pub worker_threads: usize,
    pub max_jobs_in_flight: usize,
    pub tick_budget_ms: u64,
    pub max_completions_per_tick: usize,
    /// Уровень ZSTD
    pub compression_level: i32,
    /// Сжимать однородные чанки в одно значение
    pub uniform_compaction: bool,
    pub extraction: ExtractionMode,
    /// Недавно изменённые чанки идут вперёд очереди
    pub edit_priority_boost: bool,
    pub generator: GeneratorConfig,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        Self {
            max_lod: 5,
            lod_split_factor: 1.5,
            lod_hysteresis: 0.25,
            view_radius: 512.0,
            retention_radius: 640.0,
            eviction_grace_ticks: 120,
            worker_threads: default_worker_threads(),
            max_jobs_in_flight: 64,
            tick_budget_ms: 4,
            max_completions_per_tick: 256,
            compression_level: 3,
            uniform_compaction: true,
            extraction: ExtractionMode::MarchingTetrahedra,
            edit_priority_boost: true,
            generator: GeneratorConfig::default(),
        }
    }
}

fn default_worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1).max(1))
        .unwrap_or(2)
}

impl TerrainSettings {
    /// Загрузить настройки из JSON строки
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: TerrainSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Загрузить настройки из файла
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    pub fn to_json(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Проверка согласованности
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_lod > 20 {
            return Err(SettingsError::Invalid(format!("max_lod {} exceeds 20", self.max_lod)));
        }
        if !(self.lod_split_factor > 0.0) {
            return Err(SettingsError::Invalid("lod_split_factor must be positive".into()));
        }
        if !(self.lod_hysteresis >= 0.0) {
            return Err(SettingsError::Invalid("lod_hysteresis must not be negative".into()));
        }
        if self.retention_radius < self.view_radius {
            return Err(SettingsError::Invalid(format!(
                "retention_radius {} is smaller than view_radius {}",
                self.retention_radius, self.view_radius
            )));
        }
        if !(1..=22).contains(&self.compression_level) {
            return Err(SettingsError::Invalid(format!(
                "compression_level {} is outside 1..=22",
                self.compression_level
            )));
        }
        if self.max_jobs_in_flight == 0 {
            return Err(SettingsError::Invalid("max_jobs_in_flight must be at least 1".into()));
        }
        Ok(())
    }

    /// Настройки для детерминированных тестов: без воркеров
    pub fn inline() -> Self {
        Self { worker_threads: 0, ..Self::default() }
    }
}
