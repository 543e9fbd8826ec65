// ============================================
// World File - Чтение/запись файла мира
// ============================================
// Формат:
//   заголовок (bincode, фиксированный размер)
//   кадр журнала правок
//   кадры блоков чанков (chunk_count штук)
// Кадр = маркер "VXFR" + длина u32 LE + !длина + байты.
// Повреждённый блок чанка пропускается (чанк будет перегенерирован),
// повреждённый журнал - ошибка загрузки. После битого заголовка кадра
// чтение продолжается со следующего целого маркера.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::edit::EditRecord;
use crate::math::ChunkKey;

use super::codec::{ChunkBlock, ChunkCodec, CodecError};
use super::delta::{decode_edits, encode_edits};
use super::header::{SaveHeader, MAGIC_NUMBER};

/// Маркер начала кадра
const FRAME_MARKER: [u8; 4] = *b"VXFR";
/// Маркер + длина + инверсия длины
const FRAME_HEADER_LEN: usize = 12;
/// Предел предвыделения под блоки (chunk_count читается из файла)
const MAX_PREALLOCATED_BLOCKS: usize = 4096;

/// Всё, что пишется в файл мира
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldSnapshot {
    pub viewer: [f32; 3],
    pub last_sequence: u64,
    pub compacted_through: u64,
    /// Живые записи журнала правок
    pub edits: Vec<EditRecord>,
    pub chunks: Vec<ChunkBlock>,
}

/// Результат загрузки мира
#[derive(Debug)]
pub struct LoadedWorld {
    pub snapshot: WorldSnapshot,
    /// Блоки, отброшенные из-за повреждения (ключ, если читается)
    pub corrupted: Vec<Option<ChunkKey>>,
}

/// Основной интерфейс для работы с файлом мира
pub struct WorldFile;

impl WorldFile {
    /// Сохранить мир в файл
    pub fn save(path: impl AsRef<Path>, snapshot: &WorldSnapshot, level: i32) -> Result<(), CodecError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(&mut writer, snapshot, level)?;
        writer.flush()?;
        Ok(())
    }

    /// Загрузить мир из файла
    pub fn load(path: impl AsRef<Path>) -> Result<LoadedWorld, CodecError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader)
    }

    pub fn write_to<W: Write>(writer: &mut W, snapshot: &WorldSnapshot, level: i32) -> Result<(), CodecError> {
        // 1. Заголовок
        let header = SaveHeader::new(
            snapshot.viewer,
            snapshot.last_sequence,
            snapshot.compacted_through,
            snapshot.chunks.len() as u32,
        );
        let header_bytes = bincode::serialize(&header).map_err(|e| CodecError::Serialize(e.to_string()))?;
        writer.write_all(&header_bytes)?;

        // 2. Журнал правок
        write_frame(writer, &encode_edits(&snapshot.edits, level)?)?;

        // 3. Блоки чанков
        let codec = ChunkCodec::new(level);
        for block in &snapshot.chunks {
            write_frame(writer, &codec.encode(block)?)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<LoadedWorld, CodecError> {
        // 1. Заголовок
        let header_size = bincode::serialized_size(&SaveHeader::default()).unwrap_or(48) as usize;
        let mut header_bytes = vec![0u8; header_size];
        reader.read_exact(&mut header_bytes)?;

        let header: SaveHeader = bincode::deserialize(&header_bytes)
            .map_err(|e| CodecError::corruption(None, format!("bad header: {}", e)))?;
        if !header.is_valid() {
            if header.magic != MAGIC_NUMBER {
                return Err(CodecError::InvalidMagic);
            }
            return Err(CodecError::UnsupportedVersion(header.version));
        }

        let mut body = Vec::new();
        reader.read_to_end(&mut body)?;
        let mut frames = FrameReader::new(&body);

        // 2. Журнал правок
        let edits = match frames.next_frame() {
            Frame::Whole(bytes) => decode_edits(bytes)?,
            Frame::Damaged(reason) => return Err(CodecError::corruption(None, format!("edit journal: {}", reason))),
            Frame::End => return Err(CodecError::corruption(None, "edit journal is missing")),
        };

        // 3. Блоки чанков
        let codec = ChunkCodec::default();
        let expected = header.chunk_count as usize;
        let mut chunks = Vec::with_capacity(expected.min(MAX_PREALLOCATED_BLOCKS));
        let mut corrupted = Vec::new();
        while chunks.len() + corrupted.len() < expected {
            match frames.next_frame() {
                Frame::Whole(bytes) => match codec.decode(bytes) {
                    Ok(block) => chunks.push(block),
                    Err(CodecError::Corruption { key, reason }) => {
                        log::warn!("[SAVE] Dropped corrupted chunk block {:?}: {}", key, reason);
                        corrupted.push(key);
                    }
                    Err(e) => return Err(e),
                },
                Frame::Damaged(reason) => {
                    log::warn!("[SAVE] Dropped chunk block with damaged frame: {}", reason);
                    corrupted.push(None);
                }
                Frame::End => {
                    let missing = expected - chunks.len() - corrupted.len();
                    log::warn!("[SAVE] World file ends {} chunk blocks early", missing);
                    corrupted.extend(std::iter::repeat(None).take(missing));
                }
            }
        }

        log::info!(
            "[SAVE] Loaded {} chunk blocks, {} edits ({} corrupted)",
            chunks.len(),
            edits.len(),
            corrupted.len()
        );

        Ok(LoadedWorld {
            snapshot: WorldSnapshot {
                viewer: header.viewer,
                last_sequence: header.last_sequence,
                compacted_through: header.compacted_through,
                edits,
                chunks,
            },
            corrupted,
        })
    }
}

fn write_frame<W: Write>(writer: &mut W, bytes: &[u8]) -> Result<(), CodecError> {
    let len = u32::try_from(bytes.len()).map_err(|_| CodecError::Serialize("frame exceeds 4 GiB".into()))?;
    writer.write_all(&FRAME_MARKER)?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&(!len).to_le_bytes())?;
    writer.write_all(bytes)?;
    Ok(())
}

enum Frame<'a> {
    Whole(&'a [u8]),
    /// Заголовок кадра не читается; позиция уже сдвинута к следующему маркеру
    Damaged(String),
    End,
}

/// Последовательное чтение кадров из тела файла
struct FrameReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn next_frame(&mut self) -> Frame<'a> {
        if self.pos >= self.bytes.len() {
            return Frame::End;
        }
        match self.frame_len_at(self.pos) {
            Ok(len) => {
                let bytes = self.bytes;
                let start = self.pos + FRAME_HEADER_LEN;
                self.pos = start + len;
                Frame::Whole(&bytes[start..start + len])
            }
            Err(reason) => {
                let damaged_at = self.pos;
                self.pos = (damaged_at + 1..self.bytes.len())
                    .find(|at| self.frame_len_at(*at).is_ok())
                    .unwrap_or(self.bytes.len());
                Frame::Damaged(format!("{} at offset {}, skipped {} bytes", reason, damaged_at, self.pos - damaged_at))
            }
        }
    }

    /// Длина кадра, если по смещению `at` лежит целый заголовок и тело влезает в остаток
    fn frame_len_at(&self, at: usize) -> Result<usize, &'static str> {
        let header = self
            .bytes
            .get(at..at + FRAME_HEADER_LEN)
            .ok_or("truncated frame header")?;
        if header[0..4] != FRAME_MARKER {
            return Err("missing frame marker");
        }
        let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let check = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        if len != !check {
            return Err("frame length check mismatch");
        }
        let len = len as usize;
        if len > self.bytes.len() - at - FRAME_HEADER_LEN {
            return Err("frame length exceeds file");
        }
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::{EditOperation, EditShape};
    use crate::voxel::{ChunkStorage, Voxel};

    fn snapshot() -> WorldSnapshot {
        let edit = EditRecord::new(
            3,
            EditShape::Sphere { center: [1.0, 2.0, 3.0], radius: 4.0 },
            EditOperation::Add { material: 2 },
            1.0,
        );
        WorldSnapshot {
            viewer: [10.0, 65.0, 10.0],
            last_sequence: 3,
            compacted_through: 1,
            edits: vec![edit],
            chunks: vec![
                ChunkBlock {
                    key: ChunkKey::new(0, 0, 0, 0),
                    storage: ChunkStorage::uniform(Voxel::solid(1)),
                    edits: vec![edit],
                    applied_through: 3,
                },
                ChunkBlock {
                    key: ChunkKey::new(1, 0, 0, 0),
                    storage: ChunkStorage::uniform(Voxel::AIR),
                    edits: Vec::new(),
                    applied_through: 0,
                },
            ],
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let path = std::env::temp_dir().join("voxel_terrain_world_roundtrip.dat");
        WorldFile::save(&path, &snapshot(), 3).unwrap();
        let loaded = WorldFile::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(loaded.corrupted.is_empty());
        assert_eq!(loaded.snapshot, snapshot());
    }

    #[test]
    fn test_corrupted_chunk_is_skipped() {
        let mut bytes = Vec::new();
        WorldFile::write_to(&mut bytes, &snapshot(), 3).unwrap();
        // портим последний байт последнего блока
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let loaded = WorldFile::read_from(&mut &bytes[..]).unwrap();
        assert_eq!(loaded.snapshot.chunks.len(), 1);
        assert_eq!(loaded.corrupted.len(), 1);
    }

    /// Смещение кадра первого блока чанка в записанном файле
    fn first_block_offset(bytes: &[u8]) -> usize {
        let header = bincode::serialized_size(&SaveHeader::default()).unwrap() as usize;
        let journal = u32::from_le_bytes(bytes[header + 4..header + 8].try_into().unwrap()) as usize;
        header + FRAME_HEADER_LEN + journal
    }

    #[test]
    fn test_damaged_length_skips_only_that_block() {
        let mut bytes = Vec::new();
        WorldFile::write_to(&mut bytes, &snapshot(), 3).unwrap();
        let at = first_block_offset(&bytes);
        assert_eq!(bytes[at..at + 4], FRAME_MARKER);
        // старший байт длины: без проверки это было бы ~4 ГиБ
        bytes[at + 7] ^= 0xFF;

        let loaded = WorldFile::read_from(&mut &bytes[..]).unwrap();
        assert_eq!(loaded.corrupted, vec![None]);
        assert_eq!(loaded.snapshot.chunks.len(), 1);
        assert_eq!(loaded.snapshot.chunks[0], snapshot().chunks[1]);
        assert_eq!(loaded.snapshot.edits, snapshot().edits);
    }

    #[test]
    fn test_truncated_file_reports_missing_blocks() {
        let mut bytes = Vec::new();
        WorldFile::write_to(&mut bytes, &snapshot(), 3).unwrap();
        let at = first_block_offset(&bytes);
        let first_len = u32::from_le_bytes(bytes[at + 4..at + 8].try_into().unwrap()) as usize;
        // второй блок обрезан посередине заголовка кадра
        bytes.truncate(at + FRAME_HEADER_LEN + first_len + 6);

        let loaded = WorldFile::read_from(&mut &bytes[..]).unwrap();
        assert_eq!(loaded.snapshot.chunks, vec![snapshot().chunks[0].clone()]);
        assert_eq!(loaded.corrupted, vec![None]);
    }

    #[test]
    fn test_damaged_journal_frame_fails_load() {
        let mut bytes = Vec::new();
        WorldFile::write_to(&mut bytes, &snapshot(), 3).unwrap();
        let header = bincode::serialized_size(&SaveHeader::default()).unwrap() as usize;
        bytes[header + 5] ^= 0x10;
        assert!(matches!(
            WorldFile::read_from(&mut &bytes[..]),
            Err(CodecError::Corruption { key: None, .. })
        ));
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = Vec::new();
        WorldFile::write_to(&mut bytes, &snapshot(), 3).unwrap();
        bytes[0] = b'X';
        assert!(matches!(WorldFile::read_from(&mut &bytes[..]), Err(CodecError::InvalidMagic)));
    }
}
