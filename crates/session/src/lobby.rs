//! Lobby coordination before a match starts.
//!
//! The host owns a [`LobbyCoordinator`]: slot table, selected mode and the started flag.
//! Clients keep a [`LobbyMirror`] that changes only when a lobby message arrives.

use arrayvec::ArrayVec;
use thiserror::Error;

use tetris_battle_net::{
    ConnId, ConnectionEvent, ConnectionMessage, LobbyPlayer, LobbyStateMessage, WireMessage,
};
use tetris_battle_types::{GameMode, MatchKind, PlayerId, ReadyState, Role, MAX_PLAYERS};

/// Per-slot lifecycle: `Disconnected -> Connected(NotReady) <-> Connected(Ready) -> InMatch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Disconnected,
    Connected(ReadyState),
    InMatch,
}

#[derive(Debug, Clone)]
struct Slot {
    player_id: PlayerId,
    /// `None` for the host's own slot.
    conn: Option<ConnId>,
    state: SlotState,
}

/// A connection the lobby has just seated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub player_id: PlayerId,
    pub order: u8,
}

/// A player whose connection went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub player_id: PlayerId,
    pub order: u8,
    /// Leaving after the start ends the match.
    pub fatal: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LobbyError {
    #[error("lobby is full")]
    LobbyFull,
    #[error("match has already started")]
    AlreadyStarted,
    #[error("player not in lobby")]
    NotInLobby,
    #[error("only the host can select the game mode")]
    NotHost,
    #[error("select a game mode first")]
    ModeNotSelected,
    #[error("{0:?} is not available for {1:?} matches")]
    ModeNotAllowed(GameMode, MatchKind),
    #[error("cannot start: not every player is ready")]
    NotAllReady,
}

/// What the presentation layer draws for the lobby.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyView {
    pub kind: MatchKind,
    pub mode: Option<GameMode>,
    pub players: Vec<LobbyPlayer>,
    pub started: bool,
}

/// Host-side lobby state.
#[derive(Debug, Clone)]
pub struct LobbyCoordinator {
    kind: MatchKind,
    slots: ArrayVec<Slot, MAX_PLAYERS>,
    mode: Option<GameMode>,
    started: bool,
}

impl LobbyCoordinator {
    /// The listening process is the host; every accepted connection is a client.
    pub fn assign_role(is_host: bool) -> Role {
        Role::assign(is_host)
    }

    pub fn new(kind: MatchKind) -> Self {
        let mut slots = ArrayVec::new();
        slots.push(Slot {
            player_id: PlayerId::host(),
            conn: None,
            state: SlotState::Connected(ReadyState::NotReady),
        });
        for order in 1..kind.player_count() {
            slots.push(Slot {
                player_id: PlayerId::for_slot(order as u8),
                conn: None,
                state: SlotState::Disconnected,
            });
        }
        Self {
            kind,
            slots,
            mode: None,
            started: false,
        }
    }

    pub fn kind(&self) -> MatchKind {
        self.kind
    }

    pub fn mode(&self) -> Option<GameMode> {
        self.mode
    }

    pub fn has_started(&self) -> bool {
        self.started
    }

    /// Seat a new connection in the first free client slot.
    pub fn admit(&mut self, conn: ConnId) -> Result<Admission, LobbyError> {
        if self.started {
            return Err(LobbyError::AlreadyStarted);
        }
        let (order, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .skip(1)
            .find(|(_, s)| s.state == SlotState::Disconnected)
            .ok_or(LobbyError::LobbyFull)?;
        slot.conn = Some(conn);
        slot.state = SlotState::Connected(ReadyState::NotReady);
        Ok(Admission {
            player_id: slot.player_id.clone(),
            order: order as u8,
        })
    }

    /// Host-only, pre-start only.
    pub fn select_game_mode(&mut self, requester: &PlayerId, mode: GameMode) -> Result<(), LobbyError> {
        if !requester.is_host() {
            return Err(LobbyError::NotHost);
        }
        if self.started {
            return Err(LobbyError::AlreadyStarted);
        }
        if !mode.allowed_for(self.kind) {
            return Err(LobbyError::ModeNotAllowed(mode, self.kind));
        }
        self.mode = Some(mode);
        Ok(())
    }

    /// Flip a player's ready flag; callers re-broadcast [`Self::lobby_state`].
    pub fn toggle_ready(&mut self, player: &PlayerId) -> Result<ReadyState, LobbyError> {
        if self.started {
            return Err(LobbyError::AlreadyStarted);
        }
        if self.mode.is_none() {
            return Err(LobbyError::ModeNotSelected);
        }
        let slot = self
            .slots
            .iter_mut()
            .find(|s| &s.player_id == player)
            .ok_or(LobbyError::NotInLobby)?;
        match slot.state {
            SlotState::Connected(ready) => {
                let next = ready.toggled();
                slot.state = SlotState::Connected(next);
                Ok(next)
            }
            _ => Err(LobbyError::NotInLobby),
        }
    }

    /// True iff every required slot is connected and ready.
    pub fn check_all_ready(&self) -> bool {
        !self.started
            && self.mode.is_some()
            && self
                .slots
                .iter()
                .all(|s| s.state == SlotState::Connected(ReadyState::Ready))
    }

    /// Freeze mode and ready flags. `Ok(true)` only on the call that actually started.
    pub fn on_start(&mut self) -> Result<bool, LobbyError> {
        if self.started {
            return Ok(false);
        }
        if !self.check_all_ready() {
            return Err(LobbyError::NotAllReady);
        }
        for slot in self.slots.iter_mut() {
            slot.state = SlotState::InMatch;
        }
        self.started = true;
        Ok(true)
    }

    /// Release the slot held by `conn`. Before the start the slot opens up again.
    pub fn disconnect(&mut self, conn: ConnId) -> Option<Departure> {
        let started = self.started;
        let (order, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, s)| s.conn == Some(conn))?;
        slot.conn = None;
        slot.state = SlotState::Disconnected;
        Some(Departure {
            player_id: slot.player_id.clone(),
            order: order as u8,
            fatal: started,
        })
    }

    /// `None` unless the player is seated and the lobby is still open.
    pub fn ready_state(&self, player: &PlayerId) -> Option<ReadyState> {
        self.slots
            .iter()
            .find(|s| &s.player_id == player)
            .and_then(|s| match s.state {
                SlotState::Connected(ready) => Some(ready),
                _ => None,
            })
    }

    pub fn slot_state(&self, order: u8) -> Option<SlotState> {
        self.slots.get(order as usize).map(|s| s.state)
    }

    pub fn player_for_conn(&self, conn: ConnId) -> Option<&PlayerId> {
        self.slots
            .iter()
            .find(|s| s.conn == Some(conn))
            .map(|s| &s.player_id)
    }

    pub fn conn_for_player(&self, player: &PlayerId) -> Option<ConnId> {
        self.slots
            .iter()
            .find(|s| &s.player_id == player)
            .and_then(|s| s.conn)
    }

    /// Seated players in slot order.
    pub fn participants(&self) -> Vec<PlayerId> {
        self.slots
            .iter()
            .filter(|s| s.state != SlotState::Disconnected)
            .map(|s| s.player_id.clone())
            .collect()
    }

    /// Full snapshot sent after every change.
    pub fn lobby_state(&self) -> LobbyStateMessage {
        let players = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.state != SlotState::Disconnected)
            .map(|(order, s)| LobbyPlayer {
                player_id: s.player_id.clone(),
                order: order as u8,
                ready: matches!(
                    s.state,
                    SlotState::Connected(ReadyState::Ready) | SlotState::InMatch
                ),
            })
            .collect();
        LobbyStateMessage { players }
    }

    pub fn view(&self) -> LobbyView {
        LobbyView {
            kind: self.kind,
            mode: self.mode,
            players: self.lobby_state().players,
            started: self.started,
        }
    }
}

/// Client-side read-only view of the host's lobby.
#[derive(Debug, Clone)]
pub struct LobbyMirror {
    local: PlayerId,
    order: u8,
    kind: MatchKind,
    mode: Option<GameMode>,
    players: Vec<LobbyPlayer>,
    started: bool,
}

impl LobbyMirror {
    pub fn new(local: PlayerId, order: u8, kind: MatchKind, mode: Option<GameMode>) -> Self {
        Self {
            local,
            order,
            kind,
            mode,
            players: Vec::new(),
            started: false,
        }
    }

    /// Fold one host message into the mirror; returns true when something changed.
    pub fn apply(&mut self, msg: &WireMessage) -> bool {
        match msg {
            WireMessage::LobbyState(state) if !self.started => {
                self.players = state.players.clone();
                true
            }
            WireMessage::GameMode(m) if !self.started => {
                self.mode = Some(m.mode);
                true
            }
            WireMessage::Connection(ConnectionMessage {
                event: ConnectionEvent::GameStart,
                ..
            }) if !self.started => {
                self.started = true;
                true
            }
            _ => false,
        }
    }

    pub fn local(&self) -> &PlayerId {
        &self.local
    }

    pub fn order(&self) -> u8 {
        self.order
    }

    pub fn kind(&self) -> MatchKind {
        self.kind
    }

    pub fn mode(&self) -> Option<GameMode> {
        self.mode
    }

    pub fn has_started(&self) -> bool {
        self.started
    }

    pub fn players(&self) -> &[LobbyPlayer] {
        &self.players
    }

    pub fn is_local_ready(&self) -> bool {
        self.players
            .iter()
            .any(|p| p.player_id == self.local && p.ready)
    }

    pub fn view(&self) -> LobbyView {
        LobbyView {
            kind: self.kind,
            mode: self.mode,
            players: self.players.clone(),
            started: self.started,
        }
    }

    /// Ready requires a known mode and an unstarted lobby.
    pub fn can_toggle_ready(&self) -> bool {
        self.mode.is_some() && !self.started
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tetris_battle_net::GameModeMessage;
    use tokio_test::{assert_err, assert_ok};

    fn full_squad_lobby() -> LobbyCoordinator {
        let mut lobby = LobbyCoordinator::new(MatchKind::Squad);
        lobby.admit(ConnId(1)).unwrap();
        lobby.admit(ConnId(2)).unwrap();
        lobby
    }

    #[test]
    fn test_admit_respects_player_cap() {
        let mut lobby = LobbyCoordinator::new(MatchKind::Versus);
        let a = lobby.admit(ConnId(1)).unwrap();
        assert_eq!(a.player_id, PlayerId::for_slot(1));
        assert_eq!(a.order, 1);
        assert_eq!(lobby.admit(ConnId(2)), Err(LobbyError::LobbyFull));

        let mut squad = LobbyCoordinator::new(MatchKind::Squad);
        squad.admit(ConnId(1)).unwrap();
        assert_eq!(squad.admit(ConnId(2)).unwrap().order, 2);
        assert_eq!(squad.admit(ConnId(3)), Err(LobbyError::LobbyFull));
    }

    #[test]
    fn test_ready_requires_mode() {
        let mut lobby = full_squad_lobby();
        assert_eq!(
            lobby.toggle_ready(&PlayerId::host()),
            Err(LobbyError::ModeNotSelected)
        );
        lobby
            .select_game_mode(&PlayerId::host(), GameMode::Normal)
            .unwrap();
        assert_eq!(lobby.toggle_ready(&PlayerId::host()), Ok(ReadyState::Ready));
        assert_eq!(lobby.toggle_ready(&PlayerId::host()), Ok(ReadyState::NotReady));
    }

    #[test]
    fn test_mode_selection_is_host_only() {
        let mut lobby = full_squad_lobby();
        assert_eq!(
            lobby.select_game_mode(&PlayerId::for_slot(1), GameMode::Item),
            Err(LobbyError::NotHost)
        );
        assert_eq!(
            lobby.select_game_mode(&PlayerId::host(), GameMode::Timer),
            Err(LobbyError::ModeNotAllowed(GameMode::Timer, MatchKind::Squad))
        );
        assert_eq!(lobby.mode(), None);
    }

    #[test]
    fn test_check_all_ready() {
        let mut lobby = LobbyCoordinator::new(MatchKind::Squad);
        assert_ok!(lobby.select_game_mode(&PlayerId::host(), GameMode::Normal));
        assert_ok!(lobby.toggle_ready(&PlayerId::host()));
        let a = assert_ok!(lobby.admit(ConnId(1)));
        assert_ok!(lobby.toggle_ready(&a.player_id));
        // Slot 2 still disconnected.
        assert!(!lobby.check_all_ready());

        let b = lobby.admit(ConnId(2)).unwrap();
        assert!(!lobby.check_all_ready());
        lobby.toggle_ready(&b.player_id).unwrap();
        assert!(lobby.check_all_ready());

        lobby.toggle_ready(&a.player_id).unwrap();
        assert!(!lobby.check_all_ready());
    }

    #[test]
    fn test_on_start_is_idempotent_and_freezes() {
        let mut lobby = full_squad_lobby();
        assert_err!(lobby.on_start());

        lobby
            .select_game_mode(&PlayerId::host(), GameMode::Item)
            .unwrap();
        for id in lobby.participants() {
            lobby.toggle_ready(&id).unwrap();
        }
        assert_eq!(lobby.on_start(), Ok(true));
        assert_eq!(lobby.on_start(), Ok(false));
        assert_eq!(lobby.slot_state(1), Some(SlotState::InMatch));

        assert_eq!(
            lobby.select_game_mode(&PlayerId::host(), GameMode::Normal),
            Err(LobbyError::AlreadyStarted)
        );
        assert_eq!(
            lobby.toggle_ready(&PlayerId::host()),
            Err(LobbyError::AlreadyStarted)
        );
        assert_eq!(lobby.mode(), Some(GameMode::Item));
    }

    #[test]
    fn test_disconnect_before_and_after_start() {
        let mut lobby = full_squad_lobby();
        lobby
            .select_game_mode(&PlayerId::host(), GameMode::Normal)
            .unwrap();
        lobby.toggle_ready(&PlayerId::for_slot(1)).unwrap();

        let left = lobby.disconnect(ConnId(1)).unwrap();
        assert!(!left.fatal);
        assert_eq!(lobby.slot_state(1), Some(SlotState::Disconnected));
        assert_eq!(lobby.disconnect(ConnId(1)), None);

        // The reopened slot is reused and starts not-ready.
        let again = lobby.admit(ConnId(3)).unwrap();
        assert_eq!(again.order, 1);
        assert_eq!(
            lobby.slot_state(1),
            Some(SlotState::Connected(ReadyState::NotReady))
        );

        for id in lobby.participants() {
            lobby.toggle_ready(&id).unwrap();
        }
        lobby.on_start().unwrap();
        let left = lobby.disconnect(ConnId(2)).unwrap();
        assert!(left.fatal);
        assert_eq!(left.player_id, PlayerId::for_slot(2));
    }

    #[test]
    fn test_lobby_state_is_full_snapshot() {
        let mut lobby = LobbyCoordinator::new(MatchKind::Squad);
        lobby.admit(ConnId(7)).unwrap();
        lobby
            .select_game_mode(&PlayerId::host(), GameMode::Normal)
            .unwrap();
        lobby.toggle_ready(&PlayerId::for_slot(1)).unwrap();

        let state = lobby.lobby_state();
        assert_eq!(state.players.len(), 2);
        assert_eq!(state.players[0].player_id, PlayerId::host());
        assert!(!state.players[0].ready);
        assert!(state.players[1].ready);
        assert_eq!(lobby.player_for_conn(ConnId(7)), Some(&PlayerId::for_slot(1)));
        assert_eq!(lobby.conn_for_player(&PlayerId::host()), None);
    }

    #[test]
    fn test_mirror_only_changes_from_messages() {
        let mut mirror = LobbyMirror::new(PlayerId::for_slot(1), 1, MatchKind::Versus, None);
        assert!(!mirror.can_toggle_ready());

        assert!(mirror.apply(&WireMessage::GameMode(GameModeMessage {
            mode: GameMode::Timer
        })));
        assert!(mirror.can_toggle_ready());

        let mut host = LobbyCoordinator::new(MatchKind::Versus);
        host.admit(ConnId(1)).unwrap();
        host.select_game_mode(&PlayerId::host(), GameMode::Timer)
            .unwrap();
        host.toggle_ready(&PlayerId::for_slot(1)).unwrap();
        assert!(mirror.apply(&WireMessage::LobbyState(host.lobby_state())));
        assert!(mirror.is_local_ready());

        let start = tetris_battle_net::create_connection(ConnectionEvent::GameStart, PlayerId::host());
        assert!(mirror.apply(&start));
        assert!(mirror.has_started());
        // Frozen after start.
        assert!(!mirror.apply(&WireMessage::GameMode(GameModeMessage {
            mode: GameMode::Normal
        })));
        assert_eq!(mirror.mode(), Some(GameMode::Timer));
    }
}
