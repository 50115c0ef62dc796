//! Presentation collaborator seam.
//!
//! Rendering, menus and input live outside this workspace. The controller calls into a
//! [`Presentation`] from the single context that owns it and receives
//! [`PresentationIntent`]s through its inbox.

use tetris_battle_core::{AttackPattern, BoardSnapshot, Grid};
use tetris_battle_types::{GameMode, PlayerId};

use crate::lobby::LobbyView;
use crate::match_state::MatchOutcome;

/// What the player asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationIntent {
    ToggleReady,
    SelectMode(GameMode),
    MoveLeft,
    MoveRight,
    SoftDrop,
    HardDrop,
    RotateCw,
    /// Back out of the lobby or the finished match.
    Cancel,
}

/// Connection and match state surfaced to the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerStatus {
    Waiting,
    Connected { player_id: PlayerId, order: u8 },
    /// Join failure: refused, rejected or timed out. The player may retry.
    Failed(String),
    Disconnected(PlayerId),
}

impl PeerStatus {
    /// One-line label for status bars.
    pub fn label(&self) -> String {
        match self {
            PeerStatus::Waiting => "Waiting for players...".to_string(),
            PeerStatus::Connected { player_id, order } => {
                format!("Connected as {player_id} (slot {order})")
            }
            PeerStatus::Failed(reason) => reason.clone(),
            PeerStatus::Disconnected(player) => format!("{player} disconnected"),
        }
    }
}

/// Calls the match layer makes into the presentation layer.
pub trait Presentation: Send {
    fn update_local_grid(&mut self, grid: &Grid);
    fn update_remote_board(&mut self, snapshot: &BoardSnapshot);
    fn update_incoming_attacks(&mut self, pending: &[AttackPattern]);
    fn set_local_grayed_out(&mut self, grayed: bool);
    fn show_game_over(&mut self);
    fn show_result(&mut self, outcome: &MatchOutcome);

    fn update_lobby(&mut self, _lobby: &LobbyView) {}
    fn update_timer(&mut self, _remaining_secs: u32) {}
    fn update_status(&mut self, _status: &PeerStatus) {}
}
