// ============================================
// Edit Delta - Пакет правок для сетевой синхронизации
// ============================================
// По сети ходят только записи журнала, не чанки: детерминированный
// реплей держит копии мира одинаковыми.

use serde::{Deserialize, Serialize};

use crate::edit::EditRecord;

use super::codec::CodecError;

#[derive(Serialize, Deserialize)]
struct EditPacket {
    /// Диапазон sequence внутри пакета (0, 0 для пустого)
    first: u64,
    last: u64,
    checksum: u32,
    payload: Vec<u8>,
}

/// Упаковать записи (ZSTD + CRC32)
pub fn encode_edits(records: &[EditRecord], level: i32) -> Result<Vec<u8>, CodecError> {
    let raw = bincode::serialize(records).map_err(|e| CodecError::Serialize(e.to_string()))?;
    let checksum = crc32fast::hash(&raw);
    let payload = zstd::encode_all(&raw[..], level).map_err(|e| CodecError::Compression(e.to_string()))?;
    let packet = EditPacket {
        first: records.iter().map(|r| r.sequence).min().unwrap_or(0),
        last: records.iter().map(|r| r.sequence).max().unwrap_or(0),
        checksum,
        payload,
    };
    bincode::serialize(&packet).map_err(|e| CodecError::Serialize(e.to_string()))
}

/// Распаковать записи; повреждённый пакет отвергается целиком
pub fn decode_edits(bytes: &[u8]) -> Result<Vec<EditRecord>, CodecError> {
    let corrupt = |reason: String| CodecError::Corruption { key: None, reason };

    let packet: EditPacket =
        bincode::deserialize(bytes).map_err(|e| corrupt(format!("bad edit packet: {}", e)))?;
    let raw = zstd::decode_all(&packet.payload[..])
        .map_err(|e| corrupt(format!("edit packet decompression failed: {}", e)))?;
    if crc32fast::hash(&raw) != packet.checksum {
        return Err(corrupt("edit packet checksum mismatch".into()));
    }
    let records: Vec<EditRecord> =
        bincode::deserialize(&raw).map_err(|e| corrupt(format!("bad edit records: {}", e)))?;

    let in_range = records
        .iter()
        .all(|r| r.sequence >= packet.first && r.sequence <= packet.last);
    if !in_range {
        return Err(corrupt("edit sequence outside packet range".into()));
    }
    Ok(records)
}
