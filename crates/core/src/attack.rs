//! Attack module - garbage patterns produced by line clears
//!
//! A line clear of at least the mode's threshold produces an [`AttackPattern`]: one
//! garbage row per cleared line. Hole placement:
//!
//! - **Gravity/split-induced clear**: every row gets a hole at an independent
//!   uniformly random column.
//! - **Direct clear**: each cleared line's hole sits under the locked piece's own cell on
//!   that line, and the pattern keeps the cleared lines' top-to-bottom order. The sender
//!   therefore never attacks through the gap its own piece just filled. A cleared line
//!   the locked piece never touched becomes a solid row with no hole.
//!
//! A row stores at most one hole column, so a row can never carry two holes. Matrices
//! arriving from the wire are checked in [`AttackPattern::from_matrix`].

use rand::Rng;
use thiserror::Error;

use tetris_battle_types::{PlayerId, BOARD_WIDTH, CELL_EMPTY, CELL_GARBAGE};

const WIDTH: usize = BOARD_WIDTH as usize;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttackError {
    #[error("hole column {0} is outside the board")]
    HoleOutOfRange(u8),
    #[error("row {row} has {width} columns, expected {expected}")]
    WrongWidth {
        row: usize,
        width: usize,
        expected: usize,
    },
    #[error("row {row} has {holes} holes, expected at most one")]
    HoleCount { row: usize, holes: usize },
    #[error("pattern has {actual} rows but declares {declared} lines")]
    RowCount { declared: u32, actual: usize },
}

/// One garbage row: every column is garbage except the hole, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GarbageRow {
    hole: Option<u8>,
}

impl GarbageRow {
    pub fn new(hole: u8) -> Result<Self, AttackError> {
        if hole >= BOARD_WIDTH {
            return Err(AttackError::HoleOutOfRange(hole));
        }
        Ok(Self { hole: Some(hole) })
    }

    /// A row with no hole at all.
    pub fn solid() -> Self {
        Self { hole: None }
    }

    pub fn hole(&self) -> Option<u8> {
        self.hole
    }

    /// Expand into board cell codes.
    pub fn cells(&self) -> [i32; WIDTH] {
        let mut row = [CELL_GARBAGE; WIDTH];
        if let Some(hole) = self.hole {
            row[hole as usize] = CELL_EMPTY;
        }
        row
    }
}

/// Garbage to push into a receiver's board, tagged with the player who earned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackPattern {
    source: PlayerId,
    rows: Vec<GarbageRow>,
}

impl AttackPattern {
    pub fn new(source: PlayerId, rows: Vec<GarbageRow>) -> Self {
        Self { source, rows }
    }

    pub fn source(&self) -> &PlayerId {
        &self.source
    }

    /// Rows, top first.
    pub fn rows(&self) -> &[GarbageRow] {
        &self.rows
    }

    /// Number of rows, equal to the number of lines that triggered the attack.
    pub fn line_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Hole columns, top row first; solid rows contribute nothing.
    pub fn hole_columns(&self) -> Vec<u8> {
        self.rows.iter().filter_map(GarbageRow::hole).collect()
    }

    /// Wire form: one `Vec` per row, `1000` for garbage, `0` for the hole.
    pub fn to_matrix(&self) -> Vec<Vec<i32>> {
        self.rows.iter().map(|r| r.cells().to_vec()).collect()
    }

    /// Decode the wire matrix, checking width, row count and at most one hole per row.
    pub fn from_matrix(
        source: PlayerId,
        line_count: u32,
        matrix: &[Vec<i32>],
    ) -> Result<Self, AttackError> {
        if matrix.len() != line_count as usize {
            return Err(AttackError::RowCount {
                declared: line_count,
                actual: matrix.len(),
            });
        }

        let mut rows = Vec::with_capacity(matrix.len());
        for (i, row) in matrix.iter().enumerate() {
            if row.len() != WIDTH {
                return Err(AttackError::WrongWidth {
                    row: i,
                    width: row.len(),
                    expected: WIDTH,
                });
            }
            let holes: Vec<usize> = row
                .iter()
                .enumerate()
                .filter(|&(_, &c)| c != CELL_GARBAGE)
                .map(|(x, _)| x)
                .collect();
            match holes.as_slice() {
                [] => rows.push(GarbageRow::solid()),
                [hole] => rows.push(GarbageRow::new(*hole as u8)?),
                _ => {
                    return Err(AttackError::HoleCount {
                        row: i,
                        holes: holes.len(),
                    })
                }
            }
        }

        Ok(Self { source, rows })
    }
}

/// What the simulation reports about the clear that just happened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineClear {
    pub count: u32,
    /// Clear caused by gravity or a split item rather than the piece lock itself.
    pub gravity_or_split: bool,
    /// Cells of the piece that just locked, as (x, y).
    pub last_locked: Vec<(i32, i32)>,
    /// Board rows that were cleared, any order.
    pub cleared_rows: Vec<usize>,
}

/// Per-match attack tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackRules {
    /// Minimum cleared lines that produce an attack.
    pub threshold: u32,
}

impl AttackRules {
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }
}

/// Turn a line clear into a garbage pattern, or None when it is below threshold.
pub fn generate_attack<R: Rng + ?Sized>(
    rules: AttackRules,
    source: PlayerId,
    clear: &LineClear,
    rng: &mut R,
) -> Option<AttackPattern> {
    if clear.count == 0 || clear.count < rules.threshold {
        return None;
    }

    let count = clear.count as usize;
    let rows = if clear.gravity_or_split {
        (0..count).map(|_| random_row(rng)).collect()
    } else {
        direct_clear_rows(clear, count)
    };

    Some(AttackPattern::new(source, rows))
}

fn random_row<R: Rng + ?Sized>(rng: &mut R) -> GarbageRow {
    GarbageRow {
        hole: Some(rng.gen_range(0..BOARD_WIDTH)),
    }
}

fn direct_clear_rows(clear: &LineClear, count: usize) -> Vec<GarbageRow> {
    let mut cleared = clear.cleared_rows.clone();
    cleared.sort_unstable();
    cleared.dedup();

    (0..count)
        .map(|rank| {
            let locked_column = cleared.get(rank).and_then(|&y| {
                clear
                    .last_locked
                    .iter()
                    .filter(|&&(cx, cy)| cy == y as i32 && (0..WIDTH as i32).contains(&cx))
                    .map(|&(cx, _)| cx as u8)
                    .min()
            });
            // A cleared line the locked piece never touched stays solid.
            GarbageRow { hole: locked_column }
        })
        .collect()
}
