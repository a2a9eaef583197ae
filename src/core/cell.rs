//! Grid Cells and Cell Sets
//!
//! The board is an 8x8 grid addressed by a single index `row * 8 + col`.
//! Every per-player set of cells (shots, declared hits, revealed boards)
//! is stored as one `u64` bitmask so the game record stays fixed-size.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor};
use serde::{Serialize, Deserialize};

/// Width and height of the board.
pub const GRID_SIZE: u8 = 8;

/// Total number of addressable cells.
pub const BOARD_CELLS: u8 = GRID_SIZE * GRID_SIZE;

/// Sentinel stored in the record when no shot is pending.
pub const NO_CELL: u8 = u8::MAX;

const ROW_LABELS: [char; GRID_SIZE as usize] = ['A', 'B', 'C', 'D', 'E', 'F', 'G', 'H'];

// =============================================================================
// CELL
// =============================================================================

/// A validated cell index in `0..64`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Cell(u8);

impl Cell {
    /// Create from a raw index. Returns `None` when out of bounds.
    pub const fn new(index: u8) -> Option<Self> {
        if index < BOARD_CELLS {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Create from row and column (both `0..8`).
    pub const fn from_row_col(row: u8, col: u8) -> Option<Self> {
        if row < GRID_SIZE && col < GRID_SIZE {
            Some(Self(row * GRID_SIZE + col))
        } else {
            None
        }
    }

    /// Raw index.
    #[inline]
    pub const fn index(self) -> u8 {
        self.0
    }

    /// Row (0 = A).
    #[inline]
    pub const fn row(self) -> u8 {
        self.0 / GRID_SIZE
    }

    /// Column (0 = 1).
    #[inline]
    pub const fn col(self) -> u8 {
        self.0 % GRID_SIZE
    }

    /// Single-bit mask for this cell.
    #[inline]
    pub const fn bit(self) -> u64 {
        1u64 << self.0
    }
}

impl TryFrom<u8> for Cell {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Cell::new(value).ok_or_else(|| format!("cell {} out of bounds (0-63)", value))
    }
}

impl From<Cell> for u8 {
    fn from(cell: Cell) -> u8 {
        cell.0
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", ROW_LABELS[self.row() as usize], self.col() + 1)
    }
}

// =============================================================================
// CELL SET
// =============================================================================

/// A set of cells backed by a `u64` bitmask.
///
/// Serializes as the bare `u64`, which keeps the persisted record layout
/// at 8 bytes per set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellSet(u64);

impl CellSet {
    /// The empty set.
    pub const EMPTY: CellSet = CellSet(0);

    /// Wrap a raw bitmask.
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw bitmask.
    #[inline]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Is the cell in the set?
    #[inline]
    pub const fn contains(self, cell: Cell) -> bool {
        self.0 & cell.bit() != 0
    }

    /// Add a cell. Returns `true` if it was not already present.
    #[inline]
    pub fn insert(&mut self, cell: Cell) -> bool {
        let fresh = !self.contains(cell);
        self.0 |= cell.bit();
        fresh
    }

    /// Number of cells in the set.
    #[inline]
    pub const fn len(self) -> u32 {
        self.0.count_ones()
    }

    /// Is the set empty?
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Does `self` contain every cell of `other`?
    #[inline]
    pub const fn is_superset_of(self, other: CellSet) -> bool {
        self.0 & other.0 == other.0
    }

    /// Iterate cells in ascending index order.
    pub fn iter(self) -> impl Iterator<Item = Cell> {
        let mut bits = self.0;
        std::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let index = bits.trailing_zeros() as u8;
            bits &= bits - 1;
            Some(Cell(index))
        })
    }
}

impl FromIterator<Cell> for CellSet {
    fn from_iter<I: IntoIterator<Item = Cell>>(iter: I) -> Self {
        let mut set = CellSet::EMPTY;
        for cell in iter {
            set.insert(cell);
        }
        set
    }
}

impl BitAnd for CellSet {
    type Output = CellSet;

    fn bitand(self, rhs: CellSet) -> CellSet {
        CellSet(self.0 & rhs.0)
    }
}

impl BitOr for CellSet {
    type Output = CellSet;

    fn bitor(self, rhs: CellSet) -> CellSet {
        CellSet(self.0 | rhs.0)
    }
}

impl BitXor for CellSet {
    type Output = CellSet;

    fn bitxor(self, rhs: CellSet) -> CellSet {
        CellSet(self.0 ^ rhs.0)
    }
}

impl fmt::Display for CellSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells: Vec<String> = self.iter().map(|c| c.to_string()).collect();
        write!(f, "{{{}}}", cells.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_bounds() {
        assert!(Cell::new(0).is_some());
        assert!(Cell::new(63).is_some());
        assert!(Cell::new(64).is_none());
        assert!(Cell::new(NO_CELL).is_none());

        assert_eq!(Cell::from_row_col(7, 7), Cell::new(63));
        assert!(Cell::from_row_col(8, 0).is_none());
        assert!(Cell::from_row_col(0, 8).is_none());
    }

    #[test]
    fn test_cell_row_col() {
        let cell = Cell::new(19).unwrap();
        assert_eq!(cell.row(), 2);
        assert_eq!(cell.col(), 3);
        assert_eq!(cell.to_string(), "C4");
        assert_eq!(Cell::new(0).unwrap().to_string(), "A1");
        assert_eq!(Cell::new(63).unwrap().to_string(), "H8");
    }

    #[test]
    fn test_insert_and_contains() {
        let mut set = CellSet::EMPTY;
        let cell = Cell::new(42).unwrap();

        assert!(!set.contains(cell));
        assert!(set.insert(cell));
        assert!(set.contains(cell));
        assert!(!set.insert(cell));
        assert_eq!(set.len(), 1);
        assert_eq!(set.bits(), 1u64 << 42);
    }

    #[test]
    fn test_iter_ascending() {
        let set = CellSet::from_bits((1 << 63) | (1 << 5) | 1);
        let indices: Vec<u8> = set.iter().map(Cell::index).collect();
        assert_eq!(indices, vec![0, 5, 63]);
    }

    #[test]
    fn test_set_ops() {
        let a: CellSet = [1u8, 2, 3].iter().filter_map(|&i| Cell::new(i)).collect();
        let b: CellSet = [2u8, 3, 4].iter().filter_map(|&i| Cell::new(i)).collect();

        assert_eq!((a & b).len(), 2);
        assert_eq!((a | b).len(), 4);
        assert_eq!((a ^ b).len(), 2);
        assert!((a | b).is_superset_of(a));
        assert!(!a.is_superset_of(b));
    }

    #[test]
    fn test_cell_serde_rejects_out_of_range() {
        let ok: Cell = serde_json::from_str("17").unwrap();
        assert_eq!(ok.index(), 17);
        assert!(serde_json::from_str::<Cell>("64").is_err());
    }
}
