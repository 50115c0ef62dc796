//! Board module - the grid of cell codes a match exchanges
//!
//! The board is a 10x20 grid of integer cell codes (see `tetris_battle_types` for the
//! encoding). Uses a flat array for cache locality and zero-allocation updates.
//! Coordinates: (x, y) where x ranges 0..9 (left to right), y ranges 0..19 (top to bottom).

use tetris_battle_types::{CellKind, BOARD_HEIGHT, BOARD_WIDTH, CELL_EMPTY, CELL_GARBAGE};

use crate::attack::AttackPattern;

/// Total number of cells on the board
const BOARD_SIZE: usize = (BOARD_WIDTH as usize) * (BOARD_HEIGHT as usize);

const WIDTH: usize = BOARD_WIDTH as usize;
const HEIGHT: usize = BOARD_HEIGHT as usize;

/// Row-major copy of a board, as carried in snapshots.
pub type Grid = [[i32; WIDTH]; HEIGHT];

/// Result of pushing garbage into a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GarbageOutcome {
    /// Rows inserted at the bottom.
    pub rows_added: usize,
    /// A solid cell was pushed out of the top; the simulation decides whether that is a loss.
    pub overflowed: bool,
}

impl GarbageOutcome {
    fn merge(self, other: GarbageOutcome) -> Self {
        Self {
            rows_added: self.rows_added + other.rows_added,
            overflowed: self.overflowed || other.overflowed,
        }
    }
}

/// The game board - 10 columns x 20 rows using flat array storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    /// Flat array of cells, row-major order (y * WIDTH + x)
    cells: [i32; BOARD_SIZE],
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    /// Create a new empty board
    pub fn new() -> Self {
        Self {
            cells: [CELL_EMPTY; BOARD_SIZE],
        }
    }

    /// Build a board from a snapshot grid.
    pub fn from_grid(grid: &Grid) -> Self {
        let mut board = Self::new();
        for (y, row) in grid.iter().enumerate() {
            board.cells[y * WIDTH..(y + 1) * WIDTH].copy_from_slice(row);
        }
        board
    }

    #[inline(always)]
    fn index(x: i32, y: i32) -> Option<usize> {
        if x < 0 || x >= WIDTH as i32 || y < 0 || y >= HEIGHT as i32 {
            return None;
        }
        Some((y as usize) * WIDTH + (x as usize))
    }

    pub fn width(&self) -> u8 {
        BOARD_WIDTH
    }

    pub fn height(&self) -> u8 {
        BOARD_HEIGHT
    }

    /// Get the cell code at (x, y); None if out of bounds
    pub fn get(&self, x: i32, y: i32) -> Option<i32> {
        Self::index(x, y).map(|idx| self.cells[idx])
    }

    /// Set the cell code at (x, y); returns false if out of bounds
    pub fn set(&mut self, x: i32, y: i32, code: i32) -> bool {
        match Self::index(x, y) {
            Some(idx) => {
                self.cells[idx] = code;
                true
            }
            None => false,
        }
    }

    /// Borrow one row; panics on an out-of-range row like slice indexing does.
    pub fn row(&self, y: usize) -> &[i32] {
        &self.cells[y * WIDTH..(y + 1) * WIDTH]
    }

    pub fn is_row_empty(&self, y: usize) -> bool {
        y < HEIGHT && self.row(y).iter().all(|&c| !CellKind::classify(c).is_solid())
    }

    /// Number of garbage cells on the board.
    pub fn garbage_cells(&self) -> usize {
        self.cells.iter().filter(|&&c| c == CELL_GARBAGE).count()
    }

    /// Copy out the grid for a snapshot
    pub fn grid(&self) -> Grid {
        let mut grid = [[CELL_EMPTY; WIDTH]; HEIGHT];
        for (y, row) in grid.iter_mut().enumerate() {
            row.copy_from_slice(self.row(y));
        }
        grid
    }

    /// Push an attack pattern in from the bottom.
    ///
    /// Existing rows move up by the pattern's row count (rows leaving the top are
    /// discarded), then the pattern is written into the bottom rows, top pattern row
    /// first. A zero-row pattern is a no-op.
    pub fn apply_garbage(&mut self, pattern: &AttackPattern) -> GarbageOutcome {
        let n = pattern.line_count();
        if n == 0 {
            return GarbageOutcome::default();
        }

        let shift = n.min(HEIGHT);
        let overflowed = (0..shift).any(|y| !self.is_row_empty(y));

        // Move surviving rows up; copy_within handles the overlap.
        self.cells.copy_within(shift * WIDTH.., 0);

        // Only the last `shift` pattern rows fit when a pattern is taller than the board.
        let first_visible = n - shift;
        for (i, row) in pattern.rows()[first_visible..].iter().enumerate() {
            let y = HEIGHT - shift + i;
            let start = y * WIDTH;
            self.cells[start..start + WIDTH].copy_from_slice(&row.cells());
        }

        GarbageOutcome {
            rows_added: shift,
            overflowed,
        }
    }

    /// Apply several patterns back-to-back, oldest first.
    pub fn apply_all<'a>(&mut self, patterns: impl IntoIterator<Item = &'a AttackPattern>) -> GarbageOutcome {
        patterns
            .into_iter()
            .fold(GarbageOutcome::default(), |acc, p| acc.merge(self.apply_garbage(p)))
    }
}
