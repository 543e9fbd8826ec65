// ============================================
// Edit Module - Журнал правок объёма
// ============================================

mod record;
mod journal;

pub use record::{EditOperation, EditRecord, EditShape};
pub use journal::{replay_records, EditLog, EditOutcome};
