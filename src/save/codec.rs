// ============================================
// Chunk Codec - Сжатый блок чанка (сэмплы + правки)
// ============================================
// Блок = ключ + CRC32 + ZSTD(bincode(содержимое)).
// CRC считается по ключу и несжатому содержимому: повреждённый блок
// никогда не принимается молча.
//
// Плотности хранятся как есть (побитово), материалы - через палитру
// с упаковкой индексов 1/2/4/8 бит.

use serde::{Deserialize, Serialize};

use crate::edit::EditRecord;
use crate::math::{ChunkKey, SAMPLE_COUNT};
use crate::voxel::{ChunkStorage, Voxel};

use super::palette::{pack_indices, unpack_indices, MaterialPalette};

/// Ошибки сохранения/загрузки
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("save I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization failed: {0}")]
    Serialize(String),
    #[error("compression failed: {0}")]
    Compression(String),
    #[error("not a terrain save file")]
    InvalidMagic,
    #[error("unsupported save version {0}")]
    UnsupportedVersion(u32),
    #[error("corrupted block {key:?}: {reason}")]
    Corruption { key: Option<ChunkKey>, reason: String },
}

impl CodecError {
    pub(super) fn corruption(key: Option<ChunkKey>, reason: impl Into<String>) -> Self {
        CodecError::Corruption { key, reason: reason.into() }
    }
}

/// Семантическое содержимое блока
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkBlock {
    pub key: ChunkKey,
    pub storage: ChunkStorage,
    /// Правки, относящиеся к чанку (в порядке sequence)
    pub edits: Vec<EditRecord>,
    /// Последняя правка, запечённая в сэмплы
    pub applied_through: u64,
}

#[derive(Serialize, Deserialize)]
enum SampleBlock {
    Uniform(Voxel),
    Dense {
        densities: Vec<f32>,
        palette: MaterialPalette,
        bits: u8,
        indices: Vec<u8>,
    },
}

#[derive(Serialize, Deserialize)]
struct BlockPayload {
    samples: SampleBlock,
    edits: Vec<EditRecord>,
    applied_through: u64,
}

#[derive(Serialize, Deserialize)]
struct EncodedBlock {
    key: ChunkKey,
    checksum: u32,
    payload: Vec<u8>,
}

/// Кодек блоков чанков
#[derive(Clone, Copy, Debug)]
pub struct ChunkCodec {
    level: i32,
}

impl ChunkCodec {
    pub fn new(level: i32) -> Self {
        Self { level }
    }

    pub fn encode(&self, block: &ChunkBlock) -> Result<Vec<u8>, CodecError> {
        let payload = BlockPayload {
            samples: encode_samples(&block.storage),
            edits: block.edits.clone(),
            applied_through: block.applied_through,
        };
        let raw = bincode::serialize(&payload).map_err(|e| CodecError::Serialize(e.to_string()))?;
        let checksum = checksum(&block.key, &raw)?;
        let compressed = zstd::encode_all(&raw[..], self.level)
            .map_err(|e| CodecError::Compression(e.to_string()))?;

        bincode::serialize(&EncodedBlock { key: block.key, checksum, payload: compressed })
            .map_err(|e| CodecError::Serialize(e.to_string()))
    }

    /// Любое расхождение (формат, сжатие, CRC) - Corruption
    pub fn decode(&self, bytes: &[u8]) -> Result<ChunkBlock, CodecError> {
        let encoded: EncodedBlock = bincode::deserialize(bytes)
            .map_err(|e| CodecError::corruption(None, format!("bad frame: {}", e)))?;
        let key = encoded.key;

        let raw = zstd::decode_all(&encoded.payload[..])
            .map_err(|e| CodecError::corruption(Some(key), format!("decompression failed: {}", e)))?;
        if checksum(&key, &raw)? != encoded.checksum {
            return Err(CodecError::corruption(Some(key), "checksum mismatch"));
        }

        let payload: BlockPayload = bincode::deserialize(&raw)
            .map_err(|e| CodecError::corruption(Some(key), format!("bad payload: {}", e)))?;
        let storage = decode_samples(payload.samples).map_err(|reason| CodecError::corruption(Some(key), reason))?;

        Ok(ChunkBlock {
            key,
            storage,
            edits: payload.edits,
            applied_through: payload.applied_through,
        })
    }
}

impl Default for ChunkCodec {
    fn default() -> Self {
        Self::new(3)
    }
}

fn checksum(key: &ChunkKey, raw: &[u8]) -> Result<u32, CodecError> {
    let key_bytes = bincode::serialize(key).map_err(|e| CodecError::Serialize(e.to_string()))?;
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&key_bytes);
    hasher.update(raw);
    Ok(hasher.finalize())
}

fn encode_samples(storage: &ChunkStorage) -> SampleBlock {
    match storage {
        ChunkStorage::Uniform(v) => SampleBlock::Uniform(*v),
        ChunkStorage::Dense(samples) => {
            let densities = samples.iter().map(|v| v.density).collect();
            let (palette, indices) = MaterialPalette::encode(samples.iter().map(|v| v.material));
            let bits = palette.bits_per_index();
            SampleBlock::Dense { densities, palette, bits, indices: pack_indices(&indices, bits) }
        }
    }
}

fn decode_samples(block: SampleBlock) -> Result<ChunkStorage, String> {
    match block {
        SampleBlock::Uniform(v) => Ok(ChunkStorage::Uniform(v)),
        SampleBlock::Dense { densities, mut palette, bits, indices } => {
            if densities.len() != SAMPLE_COUNT {
                return Err(format!("{} densities, expected {}", densities.len(), SAMPLE_COUNT));
            }
            if !matches!(bits, 1 | 2 | 4 | 8) {
                return Err(format!("invalid index width {}", bits));
            }
            palette.rebuild_reverse_map();
            let materials = unpack_indices(&indices, bits, SAMPLE_COUNT);
            let mut samples = Vec::with_capacity(SAMPLE_COUNT);
            for (density, idx) in densities.into_iter().zip(materials) {
                let material = palette
                    .get(idx)
                    .ok_or_else(|| format!("palette index {} out of range", idx))?;
                samples.push(Voxel::new(density, material));
            }
            ChunkStorage::from_samples(samples).map_err(|e| e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::{EditOperation, EditShape};
    use crate::math::sample_index;

    fn block() -> ChunkBlock {
        let mut samples = vec![Voxel::AIR; SAMPLE_COUNT];
        for (i, v) in samples.iter_mut().enumerate() {
            *v = Voxel::new((i as f32 * 0.37).sin(), (i % 5) as u8);
        }
        samples[sample_index(3, 3, 3)] = Voxel::new(-0.0, 250);
        ChunkBlock {
            key: ChunkKey::new(-3, 7, 2, 1),
            storage: ChunkStorage::from_samples(samples).unwrap(),
            edits: vec![EditRecord::new(
                4,
                EditShape::Box { min: [0.0, 0.0, 0.0], max: [4.0, 4.0, 4.0] },
                EditOperation::Paint { material: 9 },
                0.5,
            )],
            applied_through: 4,
        }
    }

    #[test]
    fn test_dense_roundtrip_is_bit_exact() {
        let codec = ChunkCodec::default();
        let original = block();
        let decoded = codec.decode(&codec.encode(&original).unwrap()).unwrap();
        assert_eq!(decoded.key, original.key);
        assert_eq!(decoded.edits, original.edits);
        assert_eq!(decoded.applied_through, 4);
        let (a, b) = (original.storage.to_vec(), decoded.storage.to_vec());
        assert!(a.iter().zip(b.iter()).all(|(x, y)| x.same_bits(y)));
    }

    #[test]
    fn test_uniform_roundtrip() {
        let codec = ChunkCodec::new(1);
        let original = ChunkBlock {
            key: ChunkKey::new(0, 0, 0, 0),
            storage: ChunkStorage::uniform(Voxel::solid(3)),
            edits: Vec::new(),
            applied_through: 0,
        };
        assert_eq!(codec.decode(&codec.encode(&original).unwrap()).unwrap(), original);
    }

    #[test]
    fn test_corrupted_payload_is_rejected() {
        let codec = ChunkCodec::default();
        let mut bytes = codec.encode(&block()).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0x5A;
        assert!(matches!(codec.decode(&bytes), Err(CodecError::Corruption { .. })));
    }

    #[test]
    fn test_corrupted_key_is_rejected() {
        let codec = ChunkCodec::default();
        let mut bytes = codec.encode(&block()).unwrap();
        bytes[0] ^= 0x01;
        assert!(matches!(codec.decode(&bytes), Err(CodecError::Corruption { .. })));
    }

    #[test]
    fn test_truncated_block_is_rejected() {
        let codec = ChunkCodec::default();
        let bytes = codec.encode(&block()).unwrap();
        assert!(matches!(codec.decode(&bytes[..bytes.len() - 9]), Err(CodecError::Corruption { .. })));
    }
}
