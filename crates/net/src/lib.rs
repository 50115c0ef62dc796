//! Network module - peer transport over TCP with a JSON line protocol
//!
//! One process hosts; up to two others join. Everything on the wire is one JSON object
//! per line, discriminated by `type` (see [`protocol`]).
//!
//! # Connection Flow
//!
//! 1. **Connect**: the client opens a TCP connection to the host (default 127.0.0.1:7788)
//! 2. **Hello**: the client sends `hello` with its name and protocol version
//! 3. **Admission**: the host replies `connectionAccepted` (player id and order) or
//!    `connectionRejected` followed by a close
//! 4. **Lobby / match traffic**: both sides exchange messages until either side closes
//!
//! The transport never interprets lobby or match messages. Reader tasks turn lines into
//! [`TransportEvent`]s for the single owner of match state; sends go through an
//! [`Outbound`] channel and are fire-and-forget.
//!
//! # Environment Variables
//!
//! - `TETRIS_BATTLE_HOST`: bind / connect address (default: "127.0.0.1")
//! - `TETRIS_BATTLE_PORT`: port number (default: 7788)
//! - `TETRIS_BATTLE_CONNECT_TIMEOUT_MS`: connect + admission bound (default: 3000)
//! - `TETRIS_BATTLE_HANDSHAKE_TIMEOUT_MS`: host wait for a new peer's `hello` (default: 2000)
//! - `TETRIS_BATTLE_PROTOCOL`: protocol version announced in `hello`
//! - `RUST_LOG`: log filter for [`init_logging`] (default: "info")

pub mod client;
pub mod config;
pub mod protocol;
pub mod runtime;
pub mod server;

pub use client::{connect, ClientLink, TransportError};
pub use config::{init_logging, NetConfig};
pub use protocol::{
    create_connection, create_hello, create_rejected, encode_line, is_compatible,
    parse_message, AcceptedMessage, AttackMessage, BoardUpdateMessage, ConnectionEvent,
    ConnectionMessage, GameEndMessage, GameModeMessage, HelloMessage, LobbyPlayer,
    LobbyStateMessage, MatchAbortedMessage, ParsedMessage, ProtocolError, RejectedMessage,
    ResultMessage, TimerSyncMessage, WireMessage, PROTOCOL_VERSION,
};
pub use runtime::Transport;
pub use server::{run_host, ConnId, Outbound, OutboundSender, TransportEvent};
