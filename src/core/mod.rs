// ============================================
// Core Module - Настройки, ошибки, логирование
// ============================================

mod settings;
mod error;
mod logging;

pub use settings::{ExtractionMode, GeneratorConfig, SettingsError, TerrainSettings};
pub use error::TerrainError;
pub use logging::init_logging;
