//! Coordinate types for world, chunk, and local positions.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// World coordinate in cells (global integer position).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldCoord {
    /// X coordinate in world space
    pub x: i64,
    /// Y coordinate in world space
    pub y: i64,
    /// Z coordinate in world space
    pub z: i64,
}

impl WorldCoord {
    /// Creates a new world coordinate.
    #[must_use]
    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    /// Converts to chunk coordinate given chunk size.
    #[must_use]
    pub const fn to_chunk_coord(self, chunk_size: u32) -> ChunkCoord {
        let size = chunk_size as i64;
        ChunkCoord {
            x: self.x.div_euclid(size) as i32,
            y: self.y.div_euclid(size) as i32,
            z: self.z.div_euclid(size) as i32,
        }
    }

    /// Converts to local coordinate within a chunk.
    #[must_use]
    pub const fn to_local_coord(self, chunk_size: u32) -> LocalCoord {
        let size = chunk_size as i64;
        LocalCoord {
            x: self.x.rem_euclid(size) as u16,
            y: self.y.rem_euclid(size) as u16,
            z: self.z.rem_euclid(size) as u16,
        }
    }

    /// Converts to a floating-point world position (cell corner).
    #[must_use]
    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x as f32, self.y as f32, self.z as f32)
    }
}

/// Chunk coordinate (identifies a chunk in the world lattice).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    /// X coordinate in chunk space
    pub x: i32,
    /// Y coordinate in chunk space
    pub y: i32,
    /// Z coordinate in chunk space
    pub z: i32,
}

impl ChunkCoord {
    /// Creates a new chunk coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Converts to world coordinate (minimum corner of the chunk).
    #[must_use]
    pub const fn to_world_coord(self, chunk_size: u32) -> WorldCoord {
        WorldCoord {
            x: (self.x as i64) * (chunk_size as i64),
            y: (self.y as i64) * (chunk_size as i64),
            z: (self.z as i64) * (chunk_size as i64),
        }
    }

    /// Returns the world-space centre of the chunk.
    #[must_use]
    pub fn center(self, chunk_size: u32) -> Vec3 {
        let half = chunk_size as f32 * 0.5;
        let min = self.to_world_coord(chunk_size);
        Vec3::new(
            min.x as f32 + half,
            min.y as f32 + half,
            min.z as f32 + half,
        )
    }

    /// Returns the neighbouring chunk coordinate offset by (dx, dy, dz).
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }
}

/// Local coordinate within a chunk (0 to chunk_size-1 on each axis).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalCoord {
    /// X coordinate within chunk
    pub x: u16,
    /// Y coordinate within chunk
    pub y: u16,
    /// Z coordinate within chunk
    pub z: u16,
}

impl LocalCoord {
    /// Creates a new local coordinate.
    #[must_use]
    pub const fn new(x: u16, y: u16, z: u16) -> Self {
        Self { x, y, z }
    }

    /// Converts to linear index for array access (x varies fastest, then y,
    /// then z).
    #[must_use]
    pub const fn to_index(self, chunk_size: u32) -> usize {
        let size = chunk_size as usize;
        (self.z as usize * size + self.y as usize) * size + self.x as usize
    }

    /// Creates from linear index.
    #[must_use]
    pub const fn from_index(index: usize, chunk_size: u32) -> Self {
        let size = chunk_size as usize;
        Self {
            x: (index % size) as u16,
            y: ((index / size) % size) as u16,
            z: (index / (size * size)) as u16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_index_roundtrip() {
        let size = 8u32;
        for z in 0..size as u16 {
            for y in 0..size as u16 {
                for x in 0..size as u16 {
                    let local = LocalCoord::new(x, y, z);
                    let idx = local.to_index(size);
                    assert_eq!(LocalCoord::from_index(idx, size), local);
                }
            }
        }
    }

    #[test]
    fn test_x_varies_fastest() {
        assert_eq!(LocalCoord::new(0, 0, 0).to_index(4), 0);
        assert_eq!(LocalCoord::new(1, 0, 0).to_index(4), 1);
        assert_eq!(LocalCoord::new(0, 1, 0).to_index(4), 4);
        assert_eq!(LocalCoord::new(0, 0, 1).to_index(4), 16);
    }

    #[test]
    fn test_negative_world_coords() {
        let world = WorldCoord::new(-1, -32, -33);
        let chunk = world.to_chunk_coord(32);
        let local = world.to_local_coord(32);
        assert_eq!(chunk, ChunkCoord::new(-1, -1, -2));
        assert_eq!(local, LocalCoord::new(31, 0, 31));
    }

    proptest! {
        #[test]
        fn prop_world_chunk_local_recompose(
            x in -100_000i64..100_000,
            y in -100_000i64..100_000,
            z in -100_000i64..100_000,
        ) {
            let size = 16u32;
            let world = WorldCoord::new(x, y, z);
            let chunk = world.to_chunk_coord(size);
            let local = world.to_local_coord(size);
            let base = chunk.to_world_coord(size);
            prop_assert_eq!(base.x + i64::from(local.x), x);
            prop_assert_eq!(base.y + i64::from(local.y), y);
            prop_assert_eq!(base.z + i64::from(local.z), z);
        }
    }
}
