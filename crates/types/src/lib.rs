//! Shared types module - identities, modes, cell codes and tunables
//!
//! Everything in this crate is plain data shared by the board/attack core, the wire
//! protocol and the session layer. Nothing here does I/O.
//!
//! # Board Dimensions
//!
//! - **Width**: 10 columns (indexed 0-9)
//! - **Height**: 20 rows (indexed 0-19, row 0 is the top)
//!
//! # Cell Codes
//!
//! Boards travel over the wire as grids of integer cell codes:
//!
//! | Code | Meaning |
//! |------|---------|
//! | `0` | Empty |
//! | `1`-`7` | Normal piece kinds (I, O, T, S, Z, J, L) |
//! | `100`-`599` | Item blocks; the hundreds digit is the item family |
//! | `1000` | Garbage |
//! | `< 0` | Transient flash (line-clear / landing effect) |
//!
//! # Tunables
//!
//! | Constant | Value | Description |
//! |----------|-------|-------------|
//! | `VERSUS_BROADCAST_MS` | 100 | Snapshot cadence for the 2-player path (~10/s) |
//! | `SQUAD_BROADCAST_MS` | 50 | Snapshot cadence for the 3-player path (~20/s) |
//! | `VERSUS_ATTACK_THRESHOLD` | 2 | Minimum cleared lines that produce an attack |
//! | `SQUAD_ATTACK_THRESHOLD` | 2 | Same, 3-player path |
//! | `TIMER_MATCH_SECS` | 120 | Timer-mode match length |
//!
//! # Examples
//!
//! ```
//! use tetris_battle_types::{CellKind, GameMode, MatchKind, PieceKind, PlayerId};
//!
//! assert_eq!(PlayerId::host().as_str(), "host");
//! assert_eq!(MatchKind::Squad.player_count(), 3);
//! assert!(!GameMode::Timer.allowed_for(MatchKind::Squad));
//! assert_eq!(CellKind::classify(3), CellKind::Piece(PieceKind::T));
//! assert_eq!(CellKind::classify(1000), CellKind::Garbage);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Board width in cells (10 columns)
pub const BOARD_WIDTH: u8 = 10;

/// Board height in cells (20 rows)
pub const BOARD_HEIGHT: u8 = 20;

/// Empty cell code
pub const CELL_EMPTY: i32 = 0;

/// Garbage cell code injected by attacks
pub const CELL_GARBAGE: i32 = 1000;

/// First item-block code (inclusive)
pub const ITEM_CODE_MIN: i32 = 100;

/// Last item-block code (inclusive)
pub const ITEM_CODE_MAX: i32 = 599;

/// Snapshot broadcast interval for 2-player matches (milliseconds)
pub const VERSUS_BROADCAST_MS: u64 = 100;

/// Snapshot broadcast interval for 3-player matches (milliseconds)
pub const SQUAD_BROADCAST_MS: u64 = 50;

/// Minimum cleared lines that send garbage in a 2-player match
pub const VERSUS_ATTACK_THRESHOLD: u32 = 2;

/// Minimum cleared lines that send garbage in a 3-player match
pub const SQUAD_ATTACK_THRESHOLD: u32 = 2;

/// Timer-mode match duration (seconds)
pub const TIMER_MATCH_SECS: u32 = 120;

/// Maximum number of participants in any match (host + 2 clients)
pub const MAX_PLAYERS: usize = 3;

/// Opaque player identity, unique within a match.
///
/// The host always uses the fixed id `"host"`; clients are assigned
/// `"player-<order>"` when the host admits them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    /// Well-known host id.
    pub const HOST: &'static str = "host";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The fixed host id.
    pub fn host() -> Self {
        Self(Self::HOST.to_string())
    }

    /// Id handed to the client occupying slot `order`.
    ///
    /// ```
    /// use tetris_battle_types::PlayerId;
    ///
    /// assert_eq!(PlayerId::for_slot(2).as_str(), "player-2");
    /// ```
    pub fn for_slot(order: u8) -> Self {
        Self(format!("player-{order}"))
    }

    pub fn is_host(&self) -> bool {
        self.0 == Self::HOST
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Session role, fixed for the lifetime of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// The listening process; authoritative for lobby and match state.
    Host,
    /// A process that connected to the host.
    Client,
}

impl Role {
    /// The listening process is the host, everything else is a client.
    pub fn assign(is_host: bool) -> Self {
        if is_host {
            Role::Host
        } else {
            Role::Client
        }
    }
}

/// Match shape: 2-player Versus or 3-player Squad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchKind {
    Versus,
    Squad,
}

impl MatchKind {
    /// Total participants including the host.
    pub fn player_count(&self) -> usize {
        match self {
            MatchKind::Versus => 2,
            MatchKind::Squad => 3,
        }
    }

    /// Client connections the host accepts.
    pub fn max_clients(&self) -> usize {
        self.player_count() - 1
    }

    /// Default snapshot broadcast interval for this match shape.
    pub fn default_broadcast_ms(&self) -> u64 {
        match self {
            MatchKind::Versus => VERSUS_BROADCAST_MS,
            MatchKind::Squad => SQUAD_BROADCAST_MS,
        }
    }

    /// Default attack threshold for this match shape.
    pub fn default_attack_threshold(&self) -> u32 {
        match self {
            MatchKind::Versus => VERSUS_ATTACK_THRESHOLD,
            MatchKind::Squad => SQUAD_ATTACK_THRESHOLD,
        }
    }
}

/// Game rule set chosen by the host before the match starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameMode {
    Normal,
    Item,
    Timer,
}

impl GameMode {
    /// Timer mode only exists for 2-player matches.
    pub fn allowed_for(&self, kind: MatchKind) -> bool {
        !matches!((self, kind), (GameMode::Timer, MatchKind::Squad))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Normal => "NORMAL",
            GameMode::Item => "ITEM",
            GameMode::Timer => "TIMER",
        }
    }
}

/// Per-player lobby readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReadyState {
    #[default]
    NotReady,
    Ready,
}

impl ReadyState {
    pub fn toggled(self) -> Self {
        match self {
            ReadyState::NotReady => ReadyState::Ready,
            ReadyState::Ready => ReadyState::NotReady,
        }
    }

    pub fn is_ready(self) -> bool {
        self == ReadyState::Ready
    }
}

/// The seven tetromino piece kinds, encoded on the wire as 1-7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PieceKind {
    I,
    O,
    T,
    S,
    Z,
    J,
    L,
}

impl PieceKind {
    /// Decode a wire/cell code (1-7).
    ///
    /// ```
    /// use tetris_battle_types::PieceKind;
    ///
    /// assert_eq!(PieceKind::from_code(1), Some(PieceKind::I));
    /// assert_eq!(PieceKind::from_code(7), Some(PieceKind::L));
    /// assert_eq!(PieceKind::from_code(0), None);
    /// ```
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(PieceKind::I),
            2 => Some(PieceKind::O),
            3 => Some(PieceKind::T),
            4 => Some(PieceKind::S),
            5 => Some(PieceKind::Z),
            6 => Some(PieceKind::J),
            7 => Some(PieceKind::L),
            _ => None,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            PieceKind::I => 1,
            PieceKind::O => 2,
            PieceKind::T => 3,
            PieceKind::S => 4,
            PieceKind::Z => 5,
            PieceKind::J => 6,
            PieceKind::L => 7,
        }
    }
}

/// Rotation states, encoded on the wire as 0-3 clockwise from spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    North,
    East,
    South,
    West,
}

impl Rotation {
    /// Decode a wire index; values wrap modulo 4.
    pub fn from_index(index: i32) -> Self {
        match index.rem_euclid(4) {
            0 => Rotation::North,
            1 => Rotation::East,
            2 => Rotation::South,
            _ => Rotation::West,
        }
    }

    pub fn index(&self) -> i32 {
        match self {
            Rotation::North => 0,
            Rotation::East => 1,
            Rotation::South => 2,
            Rotation::West => 3,
        }
    }
}

/// Item attached to a piece in Item mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemInfo {
    pub item_type: i32,
    /// Which cell of the piece carries the item.
    pub index: i32,
}

/// Decoded meaning of a board cell code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
    Empty,
    Piece(PieceKind),
    /// Item block; carries the family (hundreds digit, 1-5).
    Item(u8),
    Garbage,
    Flash,
    /// Any code outside the known ranges.
    Unknown,
}

impl CellKind {
    pub fn classify(code: i32) -> Self {
        match code {
            CELL_EMPTY => CellKind::Empty,
            CELL_GARBAGE => CellKind::Garbage,
            c if c < 0 => CellKind::Flash,
            c if (ITEM_CODE_MIN..=ITEM_CODE_MAX).contains(&c) => CellKind::Item((c / 100) as u8),
            c => PieceKind::from_code(c).map_or(CellKind::Unknown, CellKind::Piece),
        }
    }

    /// Whether the cell blocks a falling piece (flash cells are visual only).
    pub fn is_solid(&self) -> bool {
        !matches!(self, CellKind::Empty | CellKind::Flash)
    }
}
