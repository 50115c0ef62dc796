//! Session module - lobby, attacks, eliminations and the match controller
//!
//! Built on the transport in `tetris-battle-net` and the pure board/attack logic in
//! `tetris-battle-core`.
//!
//! # Components
//!
//! - [`lobby`]: host-owned slot table with mode selection and the ready handshake, plus
//!   the read-only client mirror
//! - [`distribute`]: who receives a generated attack
//! - [`match_state`]: survivors, elimination order, ranking / winner / draw
//! - [`broadcast`]: periodic snapshot push and the highest-seq remote board cache
//! - [`timer`]: Timer-mode countdown
//! - [`presentation`]: the interface the rendering layer implements
//! - [`controller`]: one [`MatchController`] per peer wiring all of the above
//!
//! # Threading
//!
//! Only the controller's owning context touches match state. Network readers, the
//! countdown and the presentation layer reach it through one
//! `mpsc::UnboundedSender<ControllerInput>`; the broadcast scheduler reads snapshots
//! from a shared [`SnapshotSlot`] and sends without waiting for acknowledgement.
//!
//! # Environment Variables
//!
//! - `TETRIS_BATTLE_VERSUS_BROADCAST_MS` (default: 100)
//! - `TETRIS_BATTLE_SQUAD_BROADCAST_MS` (default: 50)
//! - `TETRIS_BATTLE_VERSUS_ATTACK_THRESHOLD` (default: 2)
//! - `TETRIS_BATTLE_SQUAD_ATTACK_THRESHOLD` (default: 2)
//! - `TETRIS_BATTLE_TIMER_SECS` (default: 120)

pub mod broadcast;
pub mod config;
pub mod controller;
pub mod distribute;
pub mod lobby;
pub mod match_state;
pub mod presentation;
pub mod timer;

pub use broadcast::{BroadcastScheduler, RemoteBoards, SnapshotSlot};
pub use config::SessionConfig;
pub use controller::{
    ControllerInput, ControllerIo, ControllerPhase, JoinFailure, MatchController,
};
pub use distribute::{fan_out, route_attack, AttackRoute};
pub use lobby::{
    Admission, Departure, LobbyCoordinator, LobbyError, LobbyMirror, LobbyView, SlotState,
};
pub use match_state::{MatchOutcome, MatchPhase, MatchState, VersusScores};
pub use presentation::{PeerStatus, Presentation, PresentationIntent};
pub use timer::{MatchTimer, TimerEvent};
