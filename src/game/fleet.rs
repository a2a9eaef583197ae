//! Fleet placement and board secrets (client side).
//!
//! Mirrors the rules a client applies before committing: three 3-cell ships on
//! the 8x8 grid, horizontal or vertical, no overlap, no wrap-around. The
//! resulting board and a random salt form the `BoardSecret` whose commitment
//! is submitted at create/join and opened at reveal.

use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::core::cell::{Cell, CellSet, GRID_SIZE};
use crate::core::hash::{board_commitment, CommitHash, Salt};
use crate::game::state::TOTAL_SHIP_CELLS;

/// A kind of ship in the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShipClass {
    /// Display name.
    pub name: &'static str,
    /// Length in cells.
    pub size: u8,
}

/// Ships every player places, in placement order.
pub const FLEET: [ShipClass; 3] = [
    ShipClass { name: "Destroyer", size: 3 },
    ShipClass { name: "Cruiser", size: 3 },
    ShipClass { name: "Submarine", size: 3 },
];

/// Placement errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlacementError {
    /// Ship would leave the grid.
    #[error("ship starting at {origin} does not fit on the grid")]
    OutOfBounds {
        /// Requested first cell.
        origin: Cell,
    },

    /// Ship would cover an occupied cell.
    #[error("cell {0} is already occupied")]
    Overlap(Cell),

    /// All ships are already placed.
    #[error("fleet is already complete")]
    FleetComplete,

    /// Not all ships placed yet.
    #[error("fleet incomplete: {placed} of {total} ships placed")]
    Incomplete {
        /// Ships placed so far.
        placed: usize,
        /// Ships in a full fleet.
        total: usize,
    },
}

/// Ship orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// Extends towards higher columns.
    Horizontal,
    /// Extends towards higher rows.
    Vertical,
}

/// One placed ship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipPlacement {
    /// Top-left cell.
    pub origin: Cell,
    /// Direction of extension.
    pub orientation: Orientation,
    /// Length in cells.
    pub size: u8,
}

impl ShipPlacement {
    /// Cells covered, or `None` if the ship leaves the grid.
    pub fn cells(&self) -> Option<CellSet> {
        let mut covered = CellSet::EMPTY;
        for i in 0..self.size {
            let (row, col) = match self.orientation {
                Orientation::Horizontal => (self.origin.row(), self.origin.col() + i),
                Orientation::Vertical => (self.origin.row() + i, self.origin.col()),
            };
            covered.insert(Cell::from_row_col(row, col)?);
        }
        Some(covered)
    }
}

/// A fleet being placed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleetLayout {
    ships: Vec<ShipPlacement>,
    occupied: CellSet,
}

impl FleetLayout {
    /// Empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Next ship to place.
    pub fn next_ship(&self) -> Option<ShipClass> {
        FLEET.get(self.ships.len()).copied()
    }

    /// Placed ships.
    pub fn ships(&self) -> &[ShipPlacement] {
        &self.ships
    }

    /// Occupied cells.
    pub fn board(&self) -> CellSet {
        self.occupied
    }

    /// Are all ships placed?
    pub fn is_complete(&self) -> bool {
        self.ships.len() == FLEET.len()
    }

    /// Place the next ship of the fleet.
    pub fn place(&mut self, origin: Cell, orientation: Orientation) -> Result<CellSet, PlacementError> {
        let class = self.next_ship().ok_or(PlacementError::FleetComplete)?;
        let placement = ShipPlacement { origin, orientation, size: class.size };
        let covered = placement.cells().ok_or(PlacementError::OutOfBounds { origin })?;

        if let Some(clash) = (covered & self.occupied).iter().next() {
            return Err(PlacementError::Overlap(clash));
        }

        self.ships.push(placement);
        self.occupied = self.occupied | covered;
        Ok(covered)
    }

    /// Remove the last placed ship.
    pub fn undo(&mut self) -> Option<ShipPlacement> {
        let placement = self.ships.pop()?;
        if let Some(covered) = placement.cells() {
            self.occupied = self.occupied ^ covered;
        }
        Some(placement)
    }

    /// Random legal layout.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut layout = Self::new();
        while !layout.is_complete() {
            let orientation = if rng.gen_bool(0.5) {
                Orientation::Horizontal
            } else {
                Orientation::Vertical
            };
            let row = rng.gen_range(0..GRID_SIZE);
            let col = rng.gen_range(0..GRID_SIZE);
            if let Some(origin) = Cell::from_row_col(row, col) {
                // Rejected spots are simply redrawn.
                let _ = layout.place(origin, orientation);
            }
        }
        layout
    }

    /// Seal the finished layout with a fresh salt.
    pub fn seal<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<BoardSecret, PlacementError> {
        if !self.is_complete() {
            return Err(PlacementError::Incomplete {
                placed: self.ships.len(),
                total: FLEET.len(),
            });
        }
        Ok(BoardSecret::new(self.occupied.bits(), rng.gen()))
    }
}

/// A board and the salt that hides it. Kept by the player until reveal.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSecret {
    /// Board bits.
    pub board: u64,
    /// Commitment salt.
    #[serde(with = "crate::core::hash::hex32")]
    pub salt: Salt,
}

impl BoardSecret {
    /// Wrap a board and salt.
    pub fn new(board: u64, salt: Salt) -> Self {
        Self { board, salt }
    }

    /// Random layout with a random salt.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let layout = FleetLayout::random(rng);
        Self::new(layout.board().bits(), rng.gen())
    }

    /// Digest to publish at create/join.
    pub fn commitment(&self) -> CommitHash {
        board_commitment(self.board, &self.salt)
    }

    /// Ship cells.
    pub fn cells(&self) -> CellSet {
        CellSet::from_bits(self.board)
    }

    /// Has the fleet's cell count?
    pub fn is_well_formed(&self) -> bool {
        self.cells().len() == u32::from(TOTAL_SHIP_CELLS)
    }
}

impl std::fmt::Debug for BoardSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Salt stays out of logs.
        f.debug_struct("BoardSecret").field("board", &self.cells()).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn cell(index: u8) -> Cell {
        Cell::new(index).unwrap()
    }

    #[test]
    fn test_place_fleet() {
        let mut layout = FleetLayout::new();
        layout.place(cell(0), Orientation::Horizontal).unwrap();
        layout.place(cell(8), Orientation::Horizontal).unwrap();
        assert!(!layout.is_complete());
        layout.place(cell(16), Orientation::Horizontal).unwrap();

        assert!(layout.is_complete());
        assert_eq!(layout.board().bits(), 0b111 | (0b111 << 8) | (0b111 << 16));
        assert_eq!(layout.place(cell(40), Orientation::Vertical), Err(PlacementError::FleetComplete));
    }

    #[test]
    fn test_no_wrap_or_overlap() {
        let mut layout = FleetLayout::new();
        assert_eq!(
            layout.place(cell(6), Orientation::Horizontal),
            Err(PlacementError::OutOfBounds { origin: cell(6) })
        );
        assert_eq!(
            layout.place(cell(48), Orientation::Vertical),
            Err(PlacementError::OutOfBounds { origin: cell(48) })
        );

        layout.place(cell(9), Orientation::Vertical).unwrap();
        assert_eq!(layout.place(cell(16), Orientation::Horizontal), Err(PlacementError::Overlap(cell(17))));

        assert!(layout.undo().is_some());
        assert!(layout.board().is_empty());
    }

    #[test]
    fn test_random_layouts_are_legal() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let secret = BoardSecret::generate(&mut rng);
            assert!(secret.is_well_formed());
        }
    }

    #[test]
    fn test_seal_requires_complete_fleet() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut layout = FleetLayout::new();
        layout.place(cell(0), Orientation::Vertical).unwrap();
        assert_eq!(layout.seal(&mut rng), Err(PlacementError::Incomplete { placed: 1, total: 3 }));

        layout.place(cell(1), Orientation::Vertical).unwrap();
        layout.place(cell(2), Orientation::Vertical).unwrap();
        let secret = layout.seal(&mut rng).unwrap();
        assert_eq!(secret.commitment(), board_commitment(secret.board, &secret.salt));
    }

    #[test]
    fn test_debug_hides_salt() {
        let secret = BoardSecret::new(0b111, [0xAB; 32]);
        assert!(!format!("{:?}", secret).contains("ab"));
    }
}
