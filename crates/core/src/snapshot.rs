use tetris_battle_types::{ItemInfo, PieceKind, PlayerId, Rotation, BOARD_HEIGHT, BOARD_WIDTH};

use crate::board::Grid;
use crate::sim::SimulationEngine;

/// Falling or preview piece as shown to opponents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PieceDescriptor {
    pub kind: PieceKind,
    pub rotation: Rotation,
    pub x: i32,
    pub y: i32,
    pub item: Option<ItemInfo>,
}

/// Everything an opponent needs to draw one player's board.
///
/// Snapshots replace each other wholesale; `seq` grows by one per capture so a receiver
/// can drop a stale one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardSnapshot {
    pub player: PlayerId,
    pub seq: u64,
    pub grid: Grid,
    pub current: Option<PieceDescriptor>,
    pub next: Option<PieceDescriptor>,
    /// Line count of each pending incoming attack, oldest first.
    pub incoming: Vec<u32>,
    pub score: u32,
    pub lines: u32,
    pub level: u32,
}

impl BoardSnapshot {
    pub fn empty(player: PlayerId) -> Self {
        Self {
            player,
            seq: 0,
            grid: [[0; BOARD_WIDTH as usize]; BOARD_HEIGHT as usize],
            current: None,
            next: None,
            incoming: Vec::new(),
            score: 0,
            lines: 0,
            level: 0,
        }
    }

    /// Read the renderable state out of a running simulation.
    pub fn capture<E: SimulationEngine + ?Sized>(
        engine: &E,
        player: PlayerId,
        seq: u64,
        incoming: Vec<u32>,
    ) -> Self {
        Self {
            player,
            seq,
            grid: engine.board().grid(),
            current: engine.current(),
            next: engine.next(),
            incoming,
            score: engine.score(),
            lines: engine.total_lines_cleared(),
            level: engine.level(),
        }
    }

    /// True when `self` should replace `cached` at a receiver.
    pub fn supersedes(&self, cached: &BoardSnapshot) -> bool {
        self.seq > cached.seq
    }
}
