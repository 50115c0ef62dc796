//! Client transport - connect, handshake, then pump lines both ways

use std::net::SocketAddr;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use tetris_battle_types::{GameMode, MatchKind, PlayerId};

use crate::config::NetConfig;
use crate::protocol::{
    parse_message, HelloMessage, ParsedMessage, ProtocolError, WireMessage,
};
use crate::server::{forward_line, write_message, ConnId, Outbound, TransportEvent};

/// Why a join attempt failed.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid address: {0}")]
    Address(String),
    #[error("connection refused: {0}")]
    Refused(std::io::Error),
    #[error("connection timed out")]
    Timeout,
    #[error("rejected by host: {0}")]
    Rejected(String),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport runtime: {0}")]
    Runtime(String),
}

impl TransportError {
    /// Short status line for the join screen.
    pub fn status(&self) -> String {
        match self {
            TransportError::Refused(_) => "Host not reachable".to_string(),
            TransportError::Timeout => "Connection timed out".to_string(),
            TransportError::Rejected(reason) => format!("Rejected: {reason}"),
            other => format!("Connection failed: {other}"),
        }
    }
}

/// What the host told us when it admitted us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientLink {
    pub player_id: PlayerId,
    pub order: u8,
    pub kind: MatchKind,
    pub mode: Option<GameMode>,
    pub host_addr: SocketAddr,
}

/// Connect to the host and complete the hello exchange.
///
/// On success a reader task forwards host lines to `event_tx` as `Message { conn:
/// ConnId::HOST, .. }` and ends with `PeerLeft`; a writer task drains `out_rx` to the
/// host. Every `Outbound` target resolves to the host.
pub async fn connect<E>(
    config: &NetConfig,
    name: &str,
    event_tx: mpsc::UnboundedSender<E>,
    mut out_rx: mpsc::UnboundedReceiver<Outbound>,
) -> Result<ClientLink, TransportError>
where
    E: From<TransportEvent> + Send + 'static,
{
    let addr = config
        .socket_addr()
        .map_err(|e| TransportError::Address(e.to_string()))?;

    let stream = match timeout(config.connect_timeout(), TcpStream::connect(addr)).await {
        Ok(Ok(s)) => s,
        Ok(Err(e)) => return Err(TransportError::Refused(e)),
        Err(_) => return Err(TransportError::Timeout),
    };
    debug!(%addr, "connected, sending hello");

    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let hello = WireMessage::Hello(HelloMessage {
        name: name.to_string(),
        protocol_version: config.protocol_version.clone(),
    });
    if !write_message(&mut writer, &hello).await {
        return Err(TransportError::Handshake("host closed the connection".into()));
    }

    let reply = match timeout(config.connect_timeout(), lines.next_line()).await {
        Ok(Ok(Some(line))) => parse_message(line.trim())?,
        Ok(Ok(None)) => {
            return Err(TransportError::Handshake("host closed the connection".into()))
        }
        Ok(Err(e)) => return Err(TransportError::Io(e)),
        Err(_) => return Err(TransportError::Timeout),
    };

    let accepted = match reply {
        ParsedMessage::Known(WireMessage::ConnectionAccepted(a)) => a,
        ParsedMessage::Known(WireMessage::ConnectionRejected(r)) => {
            return Err(TransportError::Rejected(r.reason))
        }
        ParsedMessage::Known(other) => {
            return Err(TransportError::Handshake(format!(
                "unexpected {} before admission",
                other.type_name()
            )))
        }
        ParsedMessage::Unknown(t) => {
            return Err(TransportError::Handshake(format!("unexpected {t} before admission")))
        }
    };
    info!(player = %accepted.player_id, order = accepted.order, "joined host");

    tokio::spawn(async move {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => forward_line(ConnId::HOST, &line, &event_tx),
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "host connection error");
                    break;
                }
            }
        }
        info!("host connection closed");
        let _ = event_tx.send(TransportEvent::PeerLeft { conn: ConnId::HOST }.into());
    });

    tokio::spawn(async move {
        while let Some(out) = out_rx.recv().await {
            let msg = match out {
                Outbound::ToPeer { msg, .. }
                | Outbound::Broadcast { msg }
                | Outbound::BroadcastExcept { msg, .. } => msg,
                Outbound::Close { .. } => break,
            };
            if !write_message(&mut writer, &msg).await {
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    Ok(ClientLink {
        player_id: accepted.player_id,
        order: accepted.order,
        kind: accepted.kind,
        mode: accepted.mode,
        host_addr: addr,
    })
}
