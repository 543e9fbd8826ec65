// ============================================
// LOD Policy - Пороги деления и слияния
// ============================================
// Лист LOD l делится, если зритель ближе split_distance(l) к его центру.
// Родитель сливается обратно только за merge_distance(l), который
// больше split_distance на долю гистерезиса.

use ultraviolet::Vec3;

use crate::core::TerrainSettings;
use crate::math::{ChunkKey, CHUNK_SIZE};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LodPolicy {
    pub max_lod: u8,
    pub split_factor: f32,
    pub hysteresis: f32,
}

impl LodPolicy {
    pub fn new(max_lod: u8, split_factor: f32, hysteresis: f32) -> Self {
        Self { max_lod, split_factor, hysteresis }
    }

    pub fn from_settings(settings: &TerrainSettings) -> Self {
        Self::new(settings.max_lod, settings.lod_split_factor, settings.lod_hysteresis)
    }

    /// Длина ребра чанка LOD l
    #[inline]
    pub fn node_size(lod: u8) -> f32 {
        (CHUNK_SIZE << lod) as f32
    }

    #[inline]
    pub fn split_distance(&self, lod: u8) -> f32 {
        self.split_factor * Self::node_size(lod)
    }

    #[inline]
    pub fn merge_distance(&self, lod: u8) -> f32 {
        self.split_distance(lod) * (1.0 + self.hysteresis)
    }

    pub fn should_split(&self, key: &ChunkKey, viewer: Vec3) -> bool {
        key.lod > 0 && key.distance_to(viewer) < self.split_distance(key.lod)
    }

    pub fn should_merge(&self, key: &ChunkKey, viewer: Vec3) -> bool {
        key.distance_to(viewer) >= self.merge_distance(key.lod)
    }
}

impl Default for LodPolicy {
    fn default() -> Self {
        Self::from_settings(&TerrainSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dead_zone_between_thresholds() {
        let policy = LodPolicy::new(4, 1.5, 0.25);
        let key = ChunkKey::new(0, 0, 0, 1);
        // центр в (16,16,16), split 48, merge 60
        let inside = Vec3::new(16.0 + 40.0, 16.0, 16.0);
        let dead = Vec3::new(16.0 + 55.0, 16.0, 16.0);
        let far = Vec3::new(16.0 + 70.0, 16.0, 16.0);
        assert!(policy.should_split(&key, inside));
        assert!(!policy.should_split(&key, dead));
        assert!(!policy.should_merge(&key, dead));
        assert!(policy.should_merge(&key, far));
    }

    #[test]
    fn test_finest_lod_never_splits() {
        let policy = LodPolicy::new(4, 1.5, 0.25);
        assert!(!policy.should_split(&ChunkKey::new(0, 0, 0, 0), Vec3::zero()));
    }
}
