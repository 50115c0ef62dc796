//! Match controller - one per peer, the single owner of match state
//!
//! Network reader tasks, the countdown and the presentation layer all feed one inbox of
//! [`ControllerInput`]. [`MatchController::pump`] drains it on the owning context, then
//! drains the simulation's buffered events, then (host only) checks whether the match
//! is over. One pump is one evaluation pass: game-overs handled in the same pump count
//! as simultaneous.
//!
//! The host holds the [`LobbyCoordinator`] and the authoritative [`MatchState`]. A client
//! holds a [`LobbyMirror`] and a survivor list, both written only from host messages.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tetris_battle_core::{
    apply_pending, generate_attack, AttackPattern, AttackRules, BoardSnapshot, Enqueue,
    EngineEvent, IncomingAttackQueue, SimulationEngine,
};
use tetris_battle_net::{
    connect, create_connection, create_rejected, AcceptedMessage, AttackMessage,
    BoardUpdateMessage, ClientLink, ConnId, ConnectionEvent, ConnectionMessage,
    GameModeMessage, NetConfig, Outbound, OutboundSender, TimerSyncMessage, TransportError,
    TransportEvent, WireMessage,
};
use tetris_battle_types::{GameMode, MatchKind, PlayerId, ReadyState, Role};

use crate::broadcast::{BroadcastScheduler, RemoteBoards, SnapshotSlot};
use crate::config::SessionConfig;
use crate::distribute::{fan_out, route_attack, AttackRoute};
use crate::lobby::{LobbyCoordinator, LobbyMirror, LobbyView};
use crate::match_state::{MatchOutcome, MatchPhase, MatchState};
use crate::presentation::{PeerStatus, Presentation, PresentationIntent};
use crate::timer::{MatchTimer, TimerEvent};

/// Everything that reaches the controller from other contexts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerInput {
    Net(TransportEvent),
    Timer(TimerEvent),
    Intent(PresentationIntent),
}

impl From<TransportEvent> for ControllerInput {
    fn from(event: TransportEvent) -> Self {
        ControllerInput::Net(event)
    }
}

impl From<TimerEvent> for ControllerInput {
    fn from(event: TimerEvent) -> Self {
        ControllerInput::Timer(event)
    }
}

impl From<PresentationIntent> for ControllerInput {
    fn from(intent: PresentationIntent) -> Self {
        ControllerInput::Intent(intent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPhase {
    Lobby,
    Playing,
    /// Eliminated locally; still receiving and showing other boards.
    Spectating,
    Finished,
    /// Left the session.
    Closed,
}

/// Channels and runtime the controller works with.
pub struct ControllerIo {
    pub out: OutboundSender,
    /// Runtime the broadcast scheduler and the countdown run on.
    pub runtime: Handle,
    pub inbox_tx: mpsc::UnboundedSender<ControllerInput>,
    pub inbox: mpsc::UnboundedReceiver<ControllerInput>,
}

/// A join attempt that did not get a seat. The engine and view come back for a retry.
pub struct JoinFailure<S, P> {
    pub error: TransportError,
    pub engine: S,
    pub view: P,
}

enum LobbySide {
    Host(LobbyCoordinator),
    Client(LobbyMirror),
}

pub struct MatchController<S, P> {
    config: SessionConfig,
    local: PlayerId,
    kind: MatchKind,
    engine: S,
    view: P,
    io: ControllerIo,
    lobby: LobbySide,
    /// Host only.
    match_state: Option<MatchState>,
    /// Client view of the survivors.
    alive_view: Vec<PlayerId>,
    queue: IncomingAttackQueue,
    remote: RemoteBoards,
    slot: SnapshotSlot,
    scheduler: BroadcastScheduler,
    timer: MatchTimer,
    rng: StdRng,
    seq: u64,
    phase: ControllerPhase,
    local_game_over: bool,
    outcome: Option<MatchOutcome>,
    events: Vec<EngineEvent>,
}

impl<S: SimulationEngine, P: Presentation> MatchController<S, P> {
    pub fn host(kind: MatchKind, config: SessionConfig, engine: S, view: P, io: ControllerIo) -> Self {
        let lobby = LobbySide::Host(LobbyCoordinator::new(kind));
        let mut ctrl = Self::build(PlayerId::host(), kind, config, engine, view, io, lobby);
        ctrl.set_status(PeerStatus::Waiting);
        ctrl.refresh_lobby_view();
        ctrl
    }

    /// Controller for a peer the host has admitted.
    pub fn client(link: &ClientLink, config: SessionConfig, engine: S, view: P, io: ControllerIo) -> Self {
        let mirror = LobbyMirror::new(link.player_id.clone(), link.order, link.kind, link.mode);
        let lobby = LobbySide::Client(mirror);
        let mut ctrl = Self::build(link.player_id.clone(), link.kind, config, engine, view, io, lobby);
        ctrl.set_status(PeerStatus::Connected {
            player_id: link.player_id.clone(),
            order: link.order,
        });
        ctrl.refresh_lobby_view();
        ctrl
    }

    /// Connect to the host at `net` and build the client controller.
    ///
    /// Refusal, rejection and timeout are not fatal: the reason reaches `view` as a
    /// [`PeerStatus::Failed`] line and the collaborators are handed back.
    pub async fn join(
        net: &NetConfig,
        name: &str,
        config: SessionConfig,
        engine: S,
        mut view: P,
        runtime: Handle,
    ) -> Result<Self, JoinFailure<S, P>> {
        let (inbox_tx, inbox) = mpsc::unbounded_channel::<ControllerInput>();
        let (out, out_rx) = mpsc::unbounded_channel();
        match connect(net, name, inbox_tx.clone(), out_rx).await {
            Ok(link) => {
                let io = ControllerIo {
                    out,
                    runtime,
                    inbox_tx,
                    inbox,
                };
                Ok(Self::client(&link, config, engine, view, io))
            }
            Err(error) => {
                let status = PeerStatus::Failed(error.status());
                warn!(%name, error = %error, status = %status.label(), "join failed");
                view.update_status(&status);
                Err(JoinFailure {
                    error,
                    engine,
                    view,
                })
            }
        }
    }

    fn build(
        local: PlayerId,
        kind: MatchKind,
        config: SessionConfig,
        engine: S,
        view: P,
        io: ControllerIo,
        lobby: LobbySide,
    ) -> Self {
        Self {
            config,
            local,
            kind,
            engine,
            view,
            io,
            lobby,
            match_state: None,
            alive_view: Vec::new(),
            queue: IncomingAttackQueue::new(),
            remote: RemoteBoards::new(),
            slot: SnapshotSlot::new(),
            scheduler: BroadcastScheduler::default(),
            timer: MatchTimer::default(),
            rng: StdRng::from_entropy(),
            seq: 0,
            phase: ControllerPhase::Lobby,
            local_game_over: false,
            outcome: None,
            events: Vec::new(),
        }
    }

    /// Deterministic hole placement for gravity-induced clears.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    // ============== Accessors ==============

    pub fn role(&self) -> Role {
        match self.lobby {
            LobbySide::Host(_) => Role::Host,
            LobbySide::Client(_) => Role::Client,
        }
    }

    pub fn local_id(&self) -> &PlayerId {
        &self.local
    }

    pub fn kind(&self) -> MatchKind {
        self.kind
    }

    pub fn phase(&self) -> ControllerPhase {
        self.phase
    }

    pub fn outcome(&self) -> Option<&MatchOutcome> {
        self.outcome.as_ref()
    }

    pub fn lobby_view(&self) -> LobbyView {
        match &self.lobby {
            LobbySide::Host(lobby) => lobby.view(),
            LobbySide::Client(mirror) => mirror.view(),
        }
    }

    /// Authoritative match state; `None` on clients and before the start.
    pub fn match_state(&self) -> Option<&MatchState> {
        self.match_state.as_ref()
    }

    /// True while the Versus Timer countdown is live (host only).
    pub fn timer_running(&self) -> bool {
        self.timer.is_running()
    }

    /// Survivors as this peer knows them.
    pub fn alive(&self) -> Vec<PlayerId> {
        match &self.match_state {
            Some(state) => state.alive().to_vec(),
            None => self.alive_view.clone(),
        }
    }

    pub fn remote_boards(&self) -> &RemoteBoards {
        &self.remote
    }

    pub fn incoming(&self) -> &IncomingAttackQueue {
        &self.queue
    }

    pub fn engine(&self) -> &S {
        &self.engine
    }

    /// The tick context drives gravity through this, then calls [`Self::pump`].
    pub fn engine_mut(&mut self) -> &mut S {
        &mut self.engine
    }

    pub fn presentation(&self) -> &P {
        &self.view
    }

    /// Inbox handle for the presentation context.
    pub fn sender(&self) -> mpsc::UnboundedSender<ControllerInput> {
        self.io.inbox_tx.clone()
    }

    // ============== Driving ==============

    /// Handle everything queued so far, then the engine's events, then check for the end.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(input) = self.io.inbox.try_recv() {
            self.handle_input(input);
            handled += 1;
        }
        self.process_engine_events();
        self.evaluate();
        handled
    }

    /// Wait for at least one input, then pump. False once every sender is gone.
    pub async fn step(&mut self) -> bool {
        let Some(input) = self.io.inbox.recv().await else {
            return false;
        };
        self.handle_input(input);
        self.pump();
        true
    }

    /// Conclude now without waiting for the natural end. Only a survivor may ask.
    ///
    /// The host decides on the spot and returns the outcome. A client sends
    /// `END_REQUEST` and returns `None`; the outcome arrives like any other.
    pub fn force_end(&mut self) -> Option<MatchOutcome> {
        if self.phase != ControllerPhase::Playing || self.local_game_over {
            debug!("end request ignored: not a survivor");
            return None;
        }
        match self.role() {
            Role::Host => {
                let local = self.local.clone();
                self.on_end_request(&local)
            }
            Role::Client => {
                info!(player = %self.local, "asking host to end the match");
                self.send(Outbound::ToPeer {
                    conn: ConnId::HOST,
                    msg: create_connection(ConnectionEvent::EndRequest, self.local.clone()),
                });
                None
            }
        }
    }

    fn handle_input(&mut self, input: ControllerInput) {
        match input {
            ControllerInput::Net(event) => match self.role() {
                Role::Host => self.on_host_event(event),
                Role::Client => self.on_client_event(event),
            },
            ControllerInput::Timer(event) => self.on_timer(event),
            ControllerInput::Intent(intent) => self.handle_intent(intent),
        }
    }

    // ============== Host side ==============

    fn on_host_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::PeerJoined { conn, hello, .. } => self.on_peer_joined(conn, &hello.name),
            TransportEvent::Message { conn, msg } => {
                let sender = match &self.lobby {
                    LobbySide::Host(lobby) => lobby.player_for_conn(conn).cloned(),
                    LobbySide::Client(_) => None,
                };
                match sender {
                    Some(sender) => self.on_host_message(conn, sender, msg),
                    None => warn!(%conn, msg_type = msg.type_name(), "message from unseated connection"),
                }
            }
            TransportEvent::PeerLeft { conn } => self.on_peer_left(conn),
        }
    }

    fn on_peer_joined(&mut self, conn: ConnId, name: &str) {
        let LobbySide::Host(lobby) = &mut self.lobby else {
            return;
        };
        match lobby.admit(conn) {
            Ok(seat) => {
                info!(%conn, %name, player = %seat.player_id, order = seat.order, "player admitted");
                let msg = WireMessage::ConnectionAccepted(AcceptedMessage {
                    player_id: seat.player_id,
                    order: seat.order,
                    kind: self.kind,
                    mode: lobby.mode(),
                });
                self.send(Outbound::ToPeer { conn, msg });
                self.publish_lobby();
            }
            Err(e) => {
                warn!(%conn, %name, error = %e, "connection rejected");
                self.send(Outbound::ToPeer {
                    conn,
                    msg: create_rejected(&e.to_string()),
                });
                self.send(Outbound::Close { conn });
            }
        }
    }

    fn on_host_message(&mut self, conn: ConnId, sender: PlayerId, msg: WireMessage) {
        if self.is_over() && msg.is_gameplay() {
            debug!(player = %sender, msg_type = msg.type_name(), "match over, dropping");
            return;
        }
        match msg {
            WireMessage::Connection(ConnectionMessage { event, .. }) => match event {
                ConnectionEvent::PlayerReady => self.request_ready(&sender, true),
                ConnectionEvent::PlayerUnready => self.request_ready(&sender, false),
                ConnectionEvent::GameOver => self.on_remote_game_over(&sender),
                ConnectionEvent::EndRequest => {
                    self.on_end_request(&sender);
                }
                ConnectionEvent::GameStart => {
                    warn!(player = %sender, "ignoring start signal from client")
                }
            },
            WireMessage::GameMode(_) => {
                warn!(player = %sender, "ignoring mode selection from non-host")
            }
            WireMessage::BoardUpdate(update) => self.on_board_update(Some(conn), &sender, update),
            WireMessage::Attack(attack) => self.on_host_attack(&sender, attack),
            other => debug!(player = %sender, msg_type = other.type_name(), "ignoring message"),
        }
    }

    fn request_ready(&mut self, player: &PlayerId, ready: bool) {
        let LobbySide::Host(lobby) = &mut self.lobby else {
            return;
        };
        if lobby.ready_state(player).map(ReadyState::is_ready) != Some(ready) {
            if let Err(e) = lobby.toggle_ready(player) {
                warn!(%player, error = %e, "ready toggle refused");
            }
        }
        // Full snapshot even when nothing changed, so the requester resyncs.
        self.publish_lobby();
        self.maybe_start();
    }

    fn maybe_start(&mut self) {
        let LobbySide::Host(lobby) = &mut self.lobby else {
            return;
        };
        if !lobby.check_all_ready() {
            return;
        }
        let Some(mode) = lobby.mode() else {
            return;
        };
        match lobby.on_start() {
            Ok(true) => {
                let participants = lobby.participants();
                info!(?mode, players = participants.len(), "match starting");
                self.match_state = Some(MatchState::new(self.kind, mode, &participants));
                self.broadcast(create_connection(ConnectionEvent::GameStart, self.local.clone()));
                self.refresh_lobby_view();
                self.start_local_match(mode, participants);
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, "start refused"),
        }
    }

    fn on_remote_game_over(&mut self, player: &PlayerId) {
        let Some(state) = self.match_state.as_mut() else {
            return;
        };
        if state.record_elimination(player) {
            info!(%player, "player eliminated");
            self.broadcast(create_connection(ConnectionEvent::GameOver, player.clone()));
        }
    }

    fn on_end_request(&mut self, requester: &PlayerId) -> Option<MatchOutcome> {
        let state = self.match_state.as_mut()?;
        if !state.is_alive(requester) {
            warn!(player = %requester, "end request from eliminated player");
            return None;
        }
        let outcome = state.end_game()?;
        info!(player = %requester, "match ended on request");
        self.finish(outcome.clone());
        Some(outcome)
    }

    fn on_host_attack(&mut self, sender: &PlayerId, attack: AttackMessage) {
        let pattern = match attack.to_pattern() {
            Ok(p) => p,
            Err(e) => {
                warn!(player = %sender, error = %e, "dropping malformed attack");
                return;
            }
        };
        if !self
            .match_state
            .as_ref()
            .is_some_and(MatchState::accepts_attacks)
        {
            debug!(player = %sender, "attack after match end, dropping");
            return;
        }
        match self.kind {
            MatchKind::Versus => self.receive_attack(pattern),
            MatchKind::Squad => {
                let alive = self.alive();
                for target in fan_out(sender, &alive) {
                    self.deliver_attack(&pattern, &target);
                }
            }
        }
    }

    fn on_peer_left(&mut self, conn: ConnId) {
        let LobbySide::Host(lobby) = &mut self.lobby else {
            return;
        };
        let Some(departure) = lobby.disconnect(conn) else {
            debug!(%conn, "unseated connection closed");
            return;
        };
        warn!(player = %departure.player_id, fatal = departure.fatal, "player left");
        self.set_status(PeerStatus::Disconnected(departure.player_id.clone()));

        if !departure.fatal {
            self.publish_lobby();
            return;
        }
        if matches!(self.phase, ControllerPhase::Playing | ControllerPhase::Spectating) {
            let reason = format!("{} disconnected", departure.player_id);
            if let Some(outcome) = self.match_state.as_mut().and_then(|s| s.abort(&reason)) {
                self.finish(outcome);
            }
        }
    }

    fn on_timer(&mut self, event: TimerEvent) {
        if !matches!(self.phase, ControllerPhase::Playing | ControllerPhase::Spectating) {
            return;
        }
        match event {
            TimerEvent::Tick(remaining_secs) => {
                self.view.update_timer(remaining_secs);
                self.broadcast(WireMessage::TimerSync(TimerSyncMessage { remaining_secs }));
            }
            TimerEvent::Expired => {
                let Some(state) = self.match_state.as_mut() else {
                    return;
                };
                if !state.on_timer_expired() {
                    return;
                }
                info!("time up");
                if let Some(outcome) = state.end_game() {
                    self.finish(outcome);
                }
            }
        }
    }

    /// Host end-of-pass check.
    fn evaluate(&mut self) {
        let Some(state) = self.match_state.as_mut() else {
            return;
        };
        if state.phase() == MatchPhase::Ended || !state.check_match_end() {
            return;
        }
        if let Some(outcome) = state.end_game() {
            self.finish(outcome);
        }
    }

    /// Host: announce the outcome to every peer, then show it locally.
    fn finish(&mut self, outcome: MatchOutcome) {
        self.broadcast(outcome.to_message());
        self.finish_local(outcome);
    }

    fn publish_lobby(&mut self) {
        if let LobbySide::Host(lobby) = &self.lobby {
            let msg = WireMessage::LobbyState(lobby.lobby_state());
            self.send(Outbound::Broadcast { msg });
        }
        self.refresh_lobby_view();
    }

    // ============== Client side ==============

    fn on_client_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Message { msg, .. } => self.on_client_message(msg),
            TransportEvent::PeerLeft { .. } => self.on_host_lost(),
            TransportEvent::PeerJoined { conn, .. } => {
                debug!(%conn, "unexpected join event on client")
            }
        }
    }

    fn on_client_message(&mut self, msg: WireMessage) {
        if self.is_over() {
            debug!(msg_type = msg.type_name(), "match over, dropping");
            return;
        }

        let (lobby_changed, started) = match &mut self.lobby {
            LobbySide::Client(mirror) => {
                let was_started = mirror.has_started();
                let changed = mirror.apply(&msg);
                (changed, !was_started && mirror.has_started())
            }
            LobbySide::Host(_) => (false, false),
        };
        if lobby_changed {
            self.refresh_lobby_view();
        }
        if started {
            self.on_start_signal();
            return;
        }

        match msg {
            WireMessage::Connection(ConnectionMessage {
                event: ConnectionEvent::GameOver,
                player_id,
                ..
            }) => {
                info!(player = %player_id, "player eliminated");
                self.alive_view.retain(|p| p != &player_id);
            }
            WireMessage::BoardUpdate(update) => {
                let sender = update.player_id.clone();
                self.on_board_update(None, &sender, update);
            }
            WireMessage::Attack(attack) => match attack.to_pattern() {
                Ok(pattern) => self.receive_attack(pattern),
                Err(e) => warn!(error = %e, "dropping malformed attack"),
            },
            WireMessage::TimerSync(sync) => self.view.update_timer(sync.remaining_secs),
            msg @ (WireMessage::GameEnd(_) | WireMessage::Result(_) | WireMessage::MatchAborted(_)) => {
                if let Some(outcome) = MatchOutcome::from_message(&msg) {
                    self.finish_local(outcome);
                }
            }
            WireMessage::LobbyState(_) | WireMessage::GameMode(_) | WireMessage::Connection(_) => {}
            other => debug!(msg_type = other.type_name(), "ignoring message"),
        }
    }

    fn on_start_signal(&mut self) {
        let LobbySide::Client(mirror) = &self.lobby else {
            return;
        };
        let Some(mode) = mirror.mode() else {
            warn!("start signal before any mode, ignoring");
            return;
        };
        let participants: Vec<PlayerId> =
            mirror.players().iter().map(|p| p.player_id.clone()).collect();
        info!(?mode, players = participants.len(), "match starting");
        self.start_local_match(mode, participants);
    }

    fn on_host_lost(&mut self) {
        warn!("host connection lost");
        match self.phase {
            ControllerPhase::Playing | ControllerPhase::Spectating => {
                self.finish_local(MatchOutcome::Aborted {
                    reason: "host disconnected".to_string(),
                });
            }
            ControllerPhase::Lobby => {
                self.set_status(PeerStatus::Disconnected(PlayerId::host()));
                self.phase = ControllerPhase::Closed;
            }
            ControllerPhase::Finished | ControllerPhase::Closed => {}
        }
    }

    // ============== Both sides ==============

    pub fn handle_intent(&mut self, intent: PresentationIntent) {
        match intent {
            PresentationIntent::ToggleReady => self.toggle_local_ready(),
            PresentationIntent::SelectMode(mode) => self.select_mode(mode),
            PresentationIntent::Cancel => self.leave(),
            steer => self.steer(steer),
        }
    }

    fn steer(&mut self, intent: PresentationIntent) {
        if self.phase != ControllerPhase::Playing || self.local_game_over {
            return;
        }
        match intent {
            PresentationIntent::MoveLeft => self.engine.move_left(),
            PresentationIntent::MoveRight => self.engine.move_right(),
            PresentationIntent::SoftDrop => self.engine.soft_drop(),
            PresentationIntent::HardDrop => self.engine.hard_drop(),
            PresentationIntent::RotateCw => self.engine.rotate_cw(),
            _ => {}
        }
    }

    fn toggle_local_ready(&mut self) {
        let local = self.local.clone();
        match &self.lobby {
            LobbySide::Host(lobby) => {
                let ready = !lobby.ready_state(&local).is_some_and(ReadyState::is_ready);
                self.request_ready(&local, ready);
            }
            LobbySide::Client(mirror) => {
                if !mirror.can_toggle_ready() {
                    debug!("ready ignored: no mode yet or already started");
                    return;
                }
                let event = if mirror.is_local_ready() {
                    ConnectionEvent::PlayerUnready
                } else {
                    ConnectionEvent::PlayerReady
                };
                self.send(Outbound::ToPeer {
                    conn: ConnId::HOST,
                    msg: create_connection(event, local),
                });
            }
        }
    }

    fn select_mode(&mut self, mode: GameMode) {
        let LobbySide::Host(lobby) = &mut self.lobby else {
            debug!("mode selection is host-only");
            return;
        };
        match lobby.select_game_mode(&self.local, mode) {
            Ok(()) => {
                info!(?mode, "game mode selected");
                self.broadcast(WireMessage::GameMode(GameModeMessage { mode }));
                self.refresh_lobby_view();
            }
            Err(e) => warn!(error = %e, "mode selection refused"),
        }
    }

    fn leave(&mut self) {
        if self.phase == ControllerPhase::Closed {
            return;
        }
        match self.role() {
            Role::Host => {
                if matches!(self.phase, ControllerPhase::Playing | ControllerPhase::Spectating) {
                    if let Some(outcome) = self
                        .match_state
                        .as_mut()
                        .and_then(|s| s.abort("host left the match"))
                    {
                        self.finish(outcome);
                    }
                }
            }
            Role::Client => self.send(Outbound::Close { conn: ConnId::HOST }),
        }
        self.scheduler.cancel();
        self.timer.cancel();
        self.engine.stop_auto_drop();
        self.phase = ControllerPhase::Closed;
    }

    fn start_local_match(&mut self, mode: GameMode, participants: Vec<PlayerId>) {
        self.phase = ControllerPhase::Playing;
        self.alive_view = participants;
        self.local_game_over = false;
        self.queue.clear();

        self.engine.start_new_game(mode);
        self.engine.start_auto_drop();
        self.view.set_local_grayed_out(false);

        self.scheduler = BroadcastScheduler::start(
            &self.io.runtime,
            self.config.broadcast_period(self.kind),
            self.slot.clone(),
            self.io.out.clone(),
        );
        if self.role() == Role::Host && self.kind == MatchKind::Versus && mode == GameMode::Timer {
            self.timer = MatchTimer::start(
                &self.io.runtime,
                self.config.timer_secs,
                self.config.timer_step(),
                self.io.inbox_tx.clone(),
            );
            self.view.update_timer(self.config.timer_secs);
        }
        self.publish_local();
    }

    fn process_engine_events(&mut self) {
        let mut events = std::mem::take(&mut self.events);
        self.engine.drain_events(&mut events);
        if self.phase != ControllerPhase::Playing {
            events.clear();
            self.events = events;
            return;
        }

        let mut dirty = false;
        for event in events.drain(..) {
            match event {
                EngineEvent::BoardUpdated | EngineEvent::NextPiece | EngineEvent::ScoreChanged(_) => {
                    dirty = true
                }
                EngineEvent::PieceSpawned => dirty |= self.apply_incoming(),
                EngineEvent::LinesCleared(count) => {
                    self.on_lines_cleared(count);
                    dirty = true;
                }
                EngineEvent::GameOver => self.on_local_game_over(),
            }
        }
        self.events = events;
        if dirty && !self.local_game_over {
            self.publish_local();
        }
    }

    /// Spawn event: apply everything queued, oldest first.
    fn apply_incoming(&mut self) -> bool {
        if self.queue.is_empty() {
            return false;
        }
        let outcome = apply_pending(self.engine.board_mut(), &self.queue);
        debug!(rows = outcome.rows_added, overflowed = outcome.overflowed, "garbage applied");
        self.view.update_incoming_attacks(&[]);
        true
    }

    fn can_attack(&self) -> bool {
        if self.phase != ControllerPhase::Playing || self.local_game_over {
            return false;
        }
        match &self.match_state {
            Some(state) => state.accepts_attacks(),
            None => self.alive_view.len() > 1,
        }
    }

    fn on_lines_cleared(&mut self, count: u32) {
        if !self.can_attack() {
            return;
        }
        let clear = self.engine.line_clear(count);
        let rules = AttackRules::new(self.config.attack_threshold(self.kind));
        let Some(pattern) = generate_attack(rules, self.local.clone(), &clear, &mut self.rng) else {
            return;
        };
        info!(lines = pattern.line_count(), "attack generated");

        let alive = self.alive();
        match route_attack(self.kind, self.role(), &self.local, &alive) {
            AttackRoute::ViaHost => self.send(Outbound::ToPeer {
                conn: ConnId::HOST,
                msg: WireMessage::Attack(AttackMessage::from_pattern(&pattern, None)),
            }),
            AttackRoute::Direct(targets) => {
                for target in &targets {
                    self.deliver_attack(&pattern, target);
                }
            }
        }
    }

    fn deliver_attack(&mut self, pattern: &AttackPattern, target: &PlayerId) {
        if target == &self.local {
            self.receive_attack(pattern.clone());
            return;
        }
        let msg = WireMessage::Attack(AttackMessage::from_pattern(pattern, Some(target.clone())));
        self.send_to_player(target, msg);
    }

    /// Queue a received attack; it lands at the next spawn.
    fn receive_attack(&mut self, pattern: AttackPattern) {
        if self.phase != ControllerPhase::Playing || self.local_game_over {
            debug!(from = %pattern.source(), "not playing, attack dropped");
            return;
        }
        match self.queue.enqueue(pattern, &self.local) {
            Enqueue::Queued => {
                debug!(pending_lines = self.queue.pending_lines(), "attack queued");
                let pending = self.queue.pending();
                self.view.update_incoming_attacks(&pending);
                self.publish_local();
            }
            Enqueue::SelfAttack => debug!("own attack echoed back, dropped"),
            Enqueue::Empty => {}
        }
    }

    fn on_local_game_over(&mut self) {
        if self.local_game_over {
            return;
        }
        self.local_game_over = true;
        info!(player = %self.local, "local game over");
        self.engine.stop_auto_drop();

        // Final board goes out ahead of the game-over so the receiver has the last score.
        self.publish_local();
        if let Some(snapshot) = self.slot.latest() {
            self.broadcast(WireMessage::BoardUpdate(BoardUpdateMessage::from_snapshot(&snapshot)));
        }
        self.view.set_local_grayed_out(true);
        self.view.show_game_over();
        if self.phase == ControllerPhase::Playing {
            self.phase = ControllerPhase::Spectating;
        }

        let game_over = create_connection(ConnectionEvent::GameOver, self.local.clone());
        match self.role() {
            Role::Host => {
                let local = self.local.clone();
                if let Some(state) = self.match_state.as_mut() {
                    if state.record_elimination(&local) {
                        self.broadcast(game_over);
                    }
                }
            }
            Role::Client => self.send(Outbound::ToPeer {
                conn: ConnId::HOST,
                msg: game_over,
            }),
        }
    }

    fn on_board_update(&mut self, from: Option<ConnId>, sender: &PlayerId, update: BoardUpdateMessage) {
        let mut snapshot = update.into_snapshot();
        snapshot.player = sender.clone();
        if snapshot.player == self.local {
            return;
        }
        if let Some(state) = self.match_state.as_mut() {
            state.update_score(sender, snapshot.score);
        }
        // Squad host relays each client's board to the other client.
        if let (Some(conn), MatchKind::Squad) = (from, self.kind) {
            let msg = WireMessage::BoardUpdate(BoardUpdateMessage::from_snapshot(&snapshot));
            self.send(Outbound::BroadcastExcept { except: conn, msg });
        }
        if self.remote.accept(snapshot) {
            if let Some(board) = self.remote.get(sender) {
                self.view.update_remote_board(board);
            }
        }
    }

    fn publish_local(&mut self) {
        self.seq += 1;
        let snapshot = BoardSnapshot::capture(
            &self.engine,
            self.local.clone(),
            self.seq,
            self.queue.pending_line_counts(),
        );
        self.view.update_local_grid(&snapshot.grid);
        if let Some(state) = self.match_state.as_mut() {
            state.update_score(&self.local, snapshot.score);
        }
        self.slot.publish(snapshot);
    }

    fn finish_local(&mut self, outcome: MatchOutcome) {
        if self.is_over() {
            return;
        }
        info!(winner = ?outcome.winner(), "match finished");
        self.phase = ControllerPhase::Finished;
        self.scheduler.cancel();
        self.timer.cancel();
        self.engine.stop_auto_drop();
        self.view.show_result(&outcome);
        self.outcome = Some(outcome);
    }

    fn is_over(&self) -> bool {
        matches!(self.phase, ControllerPhase::Finished | ControllerPhase::Closed)
    }

    fn set_status(&mut self, status: PeerStatus) {
        debug!(status = %status.label(), "status");
        self.view.update_status(&status);
    }

    fn refresh_lobby_view(&mut self) {
        let view = self.lobby_view();
        self.view.update_lobby(&view);
    }

    fn send_to_player(&self, player: &PlayerId, msg: WireMessage) {
        match &self.lobby {
            LobbySide::Host(lobby) => match lobby.conn_for_player(player) {
                Some(conn) => self.send(Outbound::ToPeer { conn, msg }),
                None => warn!(%player, "no connection for player"),
            },
            LobbySide::Client(_) => self.send(Outbound::ToPeer {
                conn: ConnId::HOST,
                msg,
            }),
        }
    }

    fn broadcast(&self, msg: WireMessage) {
        self.send(Outbound::Broadcast { msg });
    }

    fn send(&self, out: Outbound) {
        let _ = self.io.out.send(out);
    }
}
