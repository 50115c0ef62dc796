#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use tetris_battle::core::{AttackPattern, Board, BoardSnapshot, EngineEvent, Grid, PieceDescriptor, SimulationEngine};
use tetris_battle::net::{run_host, NetConfig};
use tetris_battle::session::{
    ControllerInput, ControllerIo, ControllerPhase, JoinFailure, LobbyView, MatchController,
    MatchOutcome, PeerStatus, Presentation, PresentationIntent, SessionConfig,
};
use tetris_battle::types::{GameMode, MatchKind, PieceKind, Rotation};

/// In-memory simulation driven entirely by the test.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    board: Board,
    score: u32,
    lines: u32,
    events: Vec<EngineEvent>,
    last_locked: Vec<(i32, i32)>,
    cleared: Vec<usize>,
    gravity: bool,
    pub mode: Option<GameMode>,
    pub auto_drop: bool,
    pub inputs: Vec<&'static str>,
}

impl ScriptedEngine {
    pub fn set_score(&mut self, score: u32) {
        self.score = score;
        self.events.push(EngineEvent::ScoreChanged(score));
    }

    pub fn spawn(&mut self) {
        self.events.push(EngineEvent::PieceSpawned);
    }

    pub fn top_out(&mut self) {
        self.events.push(EngineEvent::GameOver);
    }

    /// Report a clear of `rows` caused by the piece at `locked`.
    pub fn clear(&mut self, rows: &[usize], locked: &[(i32, i32)], gravity: bool) {
        self.cleared = rows.to_vec();
        self.last_locked = locked.to_vec();
        self.gravity = gravity;
        self.lines += rows.len() as u32;
        self.events.push(EngineEvent::LinesCleared(rows.len() as u32));
    }
}

impl SimulationEngine for ScriptedEngine {
    fn start_new_game(&mut self, mode: GameMode) {
        self.mode = Some(mode);
        self.board = Board::new();
        self.events.push(EngineEvent::PieceSpawned);
    }

    fn start_auto_drop(&mut self) {
        self.auto_drop = true;
    }

    fn stop_auto_drop(&mut self) {
        self.auto_drop = false;
    }

    fn move_left(&mut self) {
        self.inputs.push("left");
    }

    fn move_right(&mut self) {
        self.inputs.push("right");
    }

    fn soft_drop(&mut self) {
        self.inputs.push("soft");
    }

    fn hard_drop(&mut self) {
        self.inputs.push("hard");
    }

    fn rotate_cw(&mut self) {
        self.inputs.push("cw");
    }

    fn board(&self) -> &Board {
        &self.board
    }

    fn board_mut(&mut self) -> &mut Board {
        &mut self.board
    }

    fn current(&self) -> Option<PieceDescriptor> {
        Some(PieceDescriptor {
            kind: PieceKind::T,
            rotation: Rotation::North,
            x: 4,
            y: 0,
            item: None,
        })
    }

    fn next(&self) -> Option<PieceDescriptor> {
        None
    }

    fn score(&self) -> u32 {
        self.score
    }

    fn level(&self) -> u32 {
        1
    }

    fn ghost_y(&self) -> Option<i32> {
        Some(18)
    }

    fn last_locked_cells(&self) -> Vec<(i32, i32)> {
        self.last_locked.clone()
    }

    fn cleared_line_indices(&self) -> Vec<usize> {
        self.cleared.clone()
    }

    fn is_last_clear_by_gravity_or_split(&self) -> bool {
        self.gravity
    }

    fn total_lines_cleared(&self) -> u32 {
        self.lines
    }

    fn drain_events(&mut self, out: &mut Vec<EngineEvent>) {
        out.append(&mut self.events);
    }
}

/// Presentation double that records what it was told.
#[derive(Debug, Default)]
pub struct RecordingView {
    pub local_grids: usize,
    pub remote: Vec<BoardSnapshot>,
    pub incoming: Vec<usize>,
    pub grayed: bool,
    pub game_over_shown: bool,
    pub result: Option<MatchOutcome>,
    pub lobby: Option<LobbyView>,
    pub timer: Vec<u32>,
    pub statuses: Vec<PeerStatus>,
}

impl Presentation for RecordingView {
    fn update_local_grid(&mut self, _grid: &Grid) {
        self.local_grids += 1;
    }

    fn update_remote_board(&mut self, snapshot: &BoardSnapshot) {
        self.remote.push(snapshot.clone());
    }

    fn update_incoming_attacks(&mut self, pending: &[AttackPattern]) {
        self.incoming.push(pending.len());
    }

    fn set_local_grayed_out(&mut self, grayed: bool) {
        self.grayed = grayed;
    }

    fn show_game_over(&mut self) {
        self.game_over_shown = true;
    }

    fn show_result(&mut self, outcome: &MatchOutcome) {
        self.result = Some(outcome.clone());
    }

    fn update_lobby(&mut self, lobby: &LobbyView) {
        self.lobby = Some(lobby.clone());
    }

    fn update_timer(&mut self, remaining_secs: u32) {
        self.timer.push(remaining_secs);
    }

    fn update_status(&mut self, status: &PeerStatus) {
        self.statuses.push(status.clone());
    }
}

pub type TestController = MatchController<ScriptedEngine, RecordingView>;

/// Short cadences so tests finish quickly.
pub fn fast_config() -> SessionConfig {
    SessionConfig {
        versus_broadcast_ms: 10,
        squad_broadcast_ms: 10,
        timer_secs: 5,
        timer_step_ms: 20,
        ..SessionConfig::default()
    }
}

pub async fn start_host(kind: MatchKind, config: SessionConfig) -> (TestController, SocketAddr) {
    let (inbox_tx, inbox) = mpsc::unbounded_channel::<ControllerInput>();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (ready_tx, ready_rx) = oneshot::channel();
    let net = NetConfig {
        port: 0,
        ..NetConfig::default()
    };
    let events = inbox_tx.clone();
    tokio::spawn(async move {
        let _ = run_host(net, events, out_rx, Some(ready_tx)).await;
    });
    let addr = tokio::time::timeout(Duration::from_secs(2), ready_rx)
        .await
        .expect("timeout waiting for listener")
        .expect("listener failed");

    let io = ControllerIo {
        out: out_tx,
        runtime: Handle::current(),
        inbox_tx,
        inbox,
    };
    let host = MatchController::host(
        kind,
        config,
        ScriptedEngine::default(),
        RecordingView::default(),
        io,
    )
    .with_rng_seed(7);
    (host, addr)
}

pub fn net_config_for(addr: SocketAddr) -> NetConfig {
    NetConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        ..NetConfig::default()
    }
}

/// Try to join `addr`, pumping the host until it has answered.
pub async fn try_join(
    host: &mut TestController,
    addr: SocketAddr,
    name: &str,
    config: SessionConfig,
) -> Result<TestController, JoinFailure<ScriptedEngine, RecordingView>> {
    let net = net_config_for(addr);
    let name = name.to_string();
    let pending = tokio::spawn(async move {
        MatchController::join(
            &net,
            &name,
            config,
            ScriptedEngine::default(),
            RecordingView::default(),
            Handle::current(),
        )
        .await
    });

    let deadline = Instant::now() + Duration::from_secs(3);
    while !pending.is_finished() {
        host.pump();
        assert!(Instant::now() < deadline, "timed out joining host");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    pending
        .await
        .expect("join task panicked")
        .map(|client| client.with_rng_seed(11))
}

/// Join `addr`; the host must admit us.
pub async fn join(host: &mut TestController, addr: SocketAddr, name: &str, config: SessionConfig) -> TestController {
    match try_join(host, addr, name, config).await {
        Ok(client) => client,
        Err(failure) => panic!("join rejected: {}", failure.error),
    }
}

/// Pump every peer until `done` holds.
pub async fn settle(peers: &mut [&mut TestController], mut done: impl FnMut(&[&mut TestController]) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        for peer in peers.iter_mut() {
            peer.pump();
        }
        if done(peers) {
            return;
        }
        assert!(Instant::now() < deadline, "timed out waiting for peers to settle");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Host plus `kind.max_clients()` clients, mode selected, everyone ready, match running.
pub async fn start_match(kind: MatchKind, mode: GameMode, config: SessionConfig) -> (TestController, Vec<TestController>) {
    let (mut host, addr) = start_host(kind, config.clone()).await;
    let mut clients = Vec::new();
    for i in 0..kind.max_clients() {
        clients.push(join(&mut host, addr, &format!("peer-{i}"), config.clone()).await);
    }

    host.handle_intent(PresentationIntent::SelectMode(mode));
    {
        let mut peers: Vec<&mut TestController> = std::iter::once(&mut host).chain(clients.iter_mut()).collect();
        settle(&mut peers, |p| p.iter().all(|c| c.lobby_view().mode == Some(mode))).await;
    }

    host.handle_intent(PresentationIntent::ToggleReady);
    for c in clients.iter_mut() {
        c.handle_intent(PresentationIntent::ToggleReady);
    }
    {
        let mut peers: Vec<&mut TestController> = std::iter::once(&mut host).chain(clients.iter_mut()).collect();
        settle(&mut peers, |p| p.iter().all(|c| c.phase() == ControllerPhase::Playing)).await;
    }
    (host, clients)
}
