//! Simulation engine seam
//!
//! The single-player simulation (collision, rotation, line-clear detection, scoring,
//! item effects) lives outside this workspace. The match layer drives it through
//! [`SimulationEngine`] and reacts to the [`EngineEvent`]s it buffers.

use tetris_battle_types::GameMode;

use crate::attack::LineClear;
use crate::board::Board;
use crate::snapshot::PieceDescriptor;

/// Callbacks produced by the simulation, buffered until the owner drains them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    BoardUpdated,
    /// A new falling piece became active at the top of the board.
    PieceSpawned,
    LinesCleared(u32),
    GameOver,
    NextPiece,
    ScoreChanged(u32),
}

/// Operations the match layer consumes from the simulation.
///
/// Exactly one controller owns one engine, so events go to a single consumer via
/// [`SimulationEngine::drain_events`] rather than a listener list.
pub trait SimulationEngine: Send {
    fn start_new_game(&mut self, mode: GameMode);
    fn start_auto_drop(&mut self);
    fn stop_auto_drop(&mut self);

    fn move_left(&mut self);
    fn move_right(&mut self);
    fn soft_drop(&mut self);
    fn hard_drop(&mut self);
    fn rotate_cw(&mut self);

    fn board(&self) -> &Board;
    fn board_mut(&mut self) -> &mut Board;

    fn current(&self) -> Option<PieceDescriptor>;
    fn next(&self) -> Option<PieceDescriptor>;
    fn score(&self) -> u32;
    fn level(&self) -> u32;
    fn ghost_y(&self) -> Option<i32>;

    /// Cells of the most recently locked piece, as (x, y).
    fn last_locked_cells(&self) -> Vec<(i32, i32)>;
    /// Rows removed by the most recent clear.
    fn cleared_line_indices(&self) -> Vec<usize>;
    fn is_last_clear_by_gravity_or_split(&self) -> bool;
    fn total_lines_cleared(&self) -> u32;

    /// Move buffered events into `out`, oldest first.
    fn drain_events(&mut self, out: &mut Vec<EngineEvent>);

    /// Gather what attack generation needs about a clear of `count` lines.
    fn line_clear(&self, count: u32) -> LineClear {
        LineClear {
            count,
            gravity_or_split: self.is_last_clear_by_gravity_or_split(),
            last_locked: self.last_locked_cells(),
            cleared_rows: self.cleared_line_indices(),
        }
    }
}
