// ============================================
// Logging - Инициализация env_logger
// ============================================

/// Установить env_logger (RUST_LOG). Повторный вызов безопасен.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .try_init();
}
