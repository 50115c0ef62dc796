//! Protocol module - JSON message catalog exchanged between peers
//!
//! Line-delimited JSON: one message per line, discriminated by a `type` field.
//! Field names are camelCase; enum values for connection events and game modes are
//! SCREAMING_SNAKE_CASE.
//!
//! ```text
//! {"type":"hello","name":"alice","protocolVersion":"1.0.0"}
//! {"type":"connectionAccepted","playerId":"player-1","order":1,"kind":"Versus","mode":null}
//! {"type":"connection","event":"PLAYER_READY","playerId":"player-1"}
//! {"type":"attack","senderId":"host","lineCount":2,"pattern":[[1000,...,0,...],[...]]}
//! ```
//!
//! The `Connection` message carries its kind in `event` because `type` is taken by the
//! message discriminator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tetris_battle_core::{AttackError, AttackPattern, BoardSnapshot, Grid, PieceDescriptor};
use tetris_battle_types::{GameMode, ItemInfo, MatchKind, PieceKind, PlayerId, Rotation};

/// Wire protocol version spoken by this build.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Peers interoperate when their major versions agree.
pub fn is_compatible(version: &str) -> bool {
    let major = |v: &str| v.split('.').next().map(str::to_owned);
    major(version).is_some() && major(version) == major(PROTOCOL_VERSION)
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed attack: {0}")]
    Attack(#[from] AttackError),
}

// ============== Messages ==============

/// First line a client sends after connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloMessage {
    pub name: String,
    pub protocol_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedMessage {
    pub player_id: PlayerId,
    pub order: u8,
    pub kind: MatchKind,
    /// Mode already selected by the host, if any.
    pub mode: Option<GameMode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedMessage {
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionEvent {
    PlayerReady,
    PlayerUnready,
    GameStart,
    GameOver,
    /// A surviving client asks the host to conclude the match now.
    EndRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionMessage {
    pub event: ConnectionEvent,
    pub player_id: PlayerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameModeMessage {
    pub mode: GameMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyPlayer {
    pub player_id: PlayerId,
    pub order: u8,
    pub ready: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyStateMessage {
    pub players: Vec<LobbyPlayer>,
}

/// Full renderable board state of one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardUpdateMessage {
    pub player_id: PlayerId,
    /// Monotonic per sender; receivers keep the highest.
    #[serde(default)]
    pub seq: u64,
    pub grid: Grid,
    pub piece_x: i32,
    pub piece_y: i32,
    /// 0 when no piece is falling.
    pub piece_type: i32,
    pub piece_rotation: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub piece_item_info: Option<ItemInfo>,
    pub next_piece_type: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_item_info: Option<ItemInfo>,
    #[serde(default)]
    pub incoming_patterns: Vec<u32>,
    pub score: u32,
    pub lines_cleared: u32,
    pub level: u32,
}

impl BoardUpdateMessage {
    pub fn from_snapshot(snapshot: &BoardSnapshot) -> Self {
        let (piece_x, piece_y, piece_type, piece_rotation, piece_item_info) = match snapshot.current {
            Some(p) => (p.x, p.y, p.kind.code(), p.rotation.index(), p.item),
            None => (0, 0, 0, 0, None),
        };
        Self {
            player_id: snapshot.player.clone(),
            seq: snapshot.seq,
            grid: snapshot.grid,
            piece_x,
            piece_y,
            piece_type,
            piece_rotation,
            piece_item_info,
            next_piece_type: snapshot.next.map_or(0, |p| p.kind.code()),
            next_item_info: snapshot.next.and_then(|p| p.item),
            incoming_patterns: snapshot.incoming.clone(),
            score: snapshot.score,
            lines_cleared: snapshot.lines,
            level: snapshot.level,
        }
    }

    pub fn into_snapshot(self) -> BoardSnapshot {
        let current = PieceKind::from_code(self.piece_type).map(|kind| PieceDescriptor {
            kind,
            rotation: Rotation::from_index(self.piece_rotation),
            x: self.piece_x,
            y: self.piece_y,
            item: self.piece_item_info,
        });
        let next = PieceKind::from_code(self.next_piece_type).map(|kind| PieceDescriptor {
            kind,
            rotation: Rotation::North,
            x: 0,
            y: 0,
            item: self.next_item_info,
        });
        BoardSnapshot {
            player: self.player_id,
            seq: self.seq,
            grid: self.grid,
            current,
            next,
            incoming: self.incoming_patterns,
            score: self.score,
            lines: self.lines_cleared,
            level: self.level,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttackMessage {
    pub sender_id: PlayerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<PlayerId>,
    pub line_count: u32,
    pub pattern: Vec<Vec<i32>>,
}

impl AttackMessage {
    pub fn from_pattern(pattern: &AttackPattern, target_id: Option<PlayerId>) -> Self {
        Self {
            sender_id: pattern.source().clone(),
            target_id,
            line_count: pattern.line_count() as u32,
            pattern: pattern.to_matrix(),
        }
    }

    /// Decode and validate the garbage matrix.
    pub fn to_pattern(&self) -> Result<AttackPattern, ProtocolError> {
        Ok(AttackPattern::from_matrix(
            self.sender_id.clone(),
            self.line_count,
            &self.pattern,
        )?)
    }
}

/// Squad result: placement order, last place first, winner last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEndMessage {
    pub ranking: Vec<PlayerId>,
}

/// Versus result; `winner` is null for a draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMessage {
    pub winner: Option<PlayerId>,
    pub player_a: PlayerId,
    pub player_b: PlayerId,
    pub score_a: u32,
    pub score_b: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSyncMessage {
    pub remaining_secs: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchAbortedMessage {
    pub reason: String,
}

/// Every message a peer may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WireMessage {
    Hello(HelloMessage),
    ConnectionAccepted(AcceptedMessage),
    ConnectionRejected(RejectedMessage),
    Connection(ConnectionMessage),
    GameMode(GameModeMessage),
    LobbyState(LobbyStateMessage),
    BoardUpdate(BoardUpdateMessage),
    Attack(AttackMessage),
    GameEnd(GameEndMessage),
    Result(ResultMessage),
    TimerSync(TimerSyncMessage),
    MatchAborted(MatchAbortedMessage),
}

impl WireMessage {
    /// Message name as it appears in the `type` field.
    pub fn type_name(&self) -> &'static str {
        match self {
            WireMessage::Hello(_) => "hello",
            WireMessage::ConnectionAccepted(_) => "connectionAccepted",
            WireMessage::ConnectionRejected(_) => "connectionRejected",
            WireMessage::Connection(_) => "connection",
            WireMessage::GameMode(_) => "gameMode",
            WireMessage::LobbyState(_) => "lobbyState",
            WireMessage::BoardUpdate(_) => "boardUpdate",
            WireMessage::Attack(_) => "attack",
            WireMessage::GameEnd(_) => "gameEnd",
            WireMessage::Result(_) => "result",
            WireMessage::TimerSync(_) => "timerSync",
            WireMessage::MatchAborted(_) => "matchAborted",
        }
    }

    /// Gameplay traffic stops being processed once a match has ended.
    pub fn is_gameplay(&self) -> bool {
        matches!(
            self,
            WireMessage::BoardUpdate(_) | WireMessage::Attack(_) | WireMessage::TimerSync(_)
        ) || matches!(
            self,
            WireMessage::Connection(ConnectionMessage {
                event: ConnectionEvent::GameOver | ConnectionEvent::EndRequest,
                ..
            })
        )
    }
}

const KNOWN_TYPES: [&str; 12] = [
    "hello",
    "connectionAccepted",
    "connectionRejected",
    "connection",
    "gameMode",
    "lobbyState",
    "boardUpdate",
    "attack",
    "gameEnd",
    "result",
    "timerSync",
    "matchAborted",
];

// ============== Message Parsing ==============

/// Parsed incoming line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedMessage {
    Known(WireMessage),
    /// Well-formed JSON with a `type` this build does not speak.
    Unknown(String),
}

/// Parse one JSON line.
///
/// An unknown `type` is not a hard error; a known `type` with bad fields is.
pub fn parse_message(json: &str) -> Result<ParsedMessage, ProtocolError> {
    match serde_json::from_str::<WireMessage>(json) {
        Ok(m) => Ok(ParsedMessage::Known(m)),
        Err(e) => {
            #[derive(Debug, Deserialize)]
            struct TypeOnly<'a> {
                #[serde(rename = "type", borrow)]
                msg_type: Option<&'a str>,
            }
            let msg_type = serde_json::from_str::<TypeOnly>(json)?
                .msg_type
                .unwrap_or("unknown");
            if !KNOWN_TYPES.contains(&msg_type) {
                return Ok(ParsedMessage::Unknown(msg_type.to_string()));
            }
            Err(e.into())
        }
    }
}

/// Serialize one message as a newline-terminated line.
pub fn encode_line(msg: &WireMessage) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = serde_json::to_vec(msg)?;
    buf.push(b'\n');
    Ok(buf)
}

// ============== Constructors ==============

pub fn create_hello(name: &str) -> WireMessage {
    WireMessage::Hello(HelloMessage {
        name: name.to_string(),
        protocol_version: PROTOCOL_VERSION.to_string(),
    })
}

pub fn create_rejected(reason: &str) -> WireMessage {
    WireMessage::ConnectionRejected(RejectedMessage {
        reason: reason.to_string(),
    })
}

pub fn create_connection(event: ConnectionEvent, player_id: PlayerId) -> WireMessage {
    WireMessage::Connection(ConnectionMessage {
        event,
        player_id,
        reason: None,
    })
}
