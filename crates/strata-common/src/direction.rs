//! Axis-aligned directions between neighbouring cells and chunks.

use serde::{Deserialize, Serialize};

/// One of the six axis-aligned unit directions.
///
/// The discriminant order `{-X, +X, -Y, +Y, -Z, +Z}` is a fixed total order:
/// boundary buffers, adjacency tables, and the dump format all index by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    /// Negative X
    NegX = 0,
    /// Positive X
    PosX = 1,
    /// Negative Y
    NegY = 2,
    /// Positive Y
    PosY = 3,
    /// Negative Z
    NegZ = 4,
    /// Positive Z
    PosZ = 5,
}

impl Direction {
    /// All directions in the fixed total order.
    pub const ALL: [Self; 6] = [
        Self::NegX,
        Self::PosX,
        Self::NegY,
        Self::PosY,
        Self::NegZ,
        Self::PosZ,
    ];

    /// Number of directions.
    pub const COUNT: usize = 6;

    /// Returns the opposite direction. Involutive.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::NegX => Self::PosX,
            Self::PosX => Self::NegX,
            Self::NegY => Self::PosY,
            Self::PosY => Self::NegY,
            Self::NegZ => Self::PosZ,
            Self::PosZ => Self::NegZ,
        }
    }

    /// Returns the unit offset (dx, dy, dz) of this direction.
    #[must_use]
    pub const fn offset(self) -> (i32, i32, i32) {
        match self {
            Self::NegX => (-1, 0, 0),
            Self::PosX => (1, 0, 0),
            Self::NegY => (0, -1, 0),
            Self::PosY => (0, 1, 0),
            Self::NegZ => (0, 0, -1),
            Self::PosZ => (0, 0, 1),
        }
    }

    /// Returns the index of this direction in the fixed total order.
    #[must_use]
    pub const fn as_index(self) -> usize {
        self as usize
    }

    /// Creates a direction from its index in the fixed total order.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::NegX),
            1 => Some(Self::PosX),
            2 => Some(Self::NegY),
            3 => Some(Self::PosY),
            4 => Some(Self::NegZ),
            5 => Some(Self::PosZ),
            _ => None,
        }
    }

    /// Returns true for the positive half of an axis.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        matches!(self, Self::PosX | Self::PosY | Self::PosZ)
    }

    /// Returns the axis (0 = X, 1 = Y, 2 = Z) of this direction.
    #[must_use]
    pub const fn axis(self) -> usize {
        match self {
            Self::NegX | Self::PosX => 0,
            Self::NegY | Self::PosY => 1,
            Self::NegZ | Self::PosZ => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_order() {
        let indices: Vec<usize> = Direction::ALL.iter().map(|d| d.as_index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_opposite() {
        assert_eq!(Direction::NegX.opposite(), Direction::PosX);
        assert_eq!(Direction::PosY.opposite(), Direction::NegY);
        assert_eq!(Direction::NegZ.opposite(), Direction::PosZ);
        for dir in Direction::ALL {
            assert_eq!(dir.opposite().opposite(), dir);
        }
    }

    #[test]
    fn test_offsets_cancel() {
        for dir in Direction::ALL {
            let (dx, dy, dz) = dir.offset();
            let (ox, oy, oz) = dir.opposite().offset();
            assert_eq!((dx + ox, dy + oy, dz + oz), (0, 0, 0));
        }
    }

    #[test]
    fn test_from_index() {
        for dir in Direction::ALL {
            assert_eq!(Direction::from_index(dir.as_index()), Some(dir));
        }
        assert_eq!(Direction::from_index(6), None);
    }
}
