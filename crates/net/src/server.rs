//! Host transport - TCP listener and per-peer tasks
//!
//! The host accepts connections, reads each peer's hello, and reports what happens as
//! [`TransportEvent`]s. It makes no admission decisions: the lobby answers a
//! `PeerJoined` with `ConnectionAccepted` or `ConnectionRejected` + `Close` through the
//! outbound channel.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info, warn};

use crate::config::NetConfig;
use crate::protocol::{
    create_rejected, encode_line, is_compatible, parse_message, HelloMessage, ParsedMessage,
    WireMessage,
};

/// Transport-level connection id. On a client, the host is always [`ConnId::HOST`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u64);

impl ConnId {
    pub const HOST: ConnId = ConnId(0);
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the network contexts report to the owner of match state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    PeerJoined {
        conn: ConnId,
        addr: SocketAddr,
        hello: HelloMessage,
    },
    Message {
        conn: ConnId,
        msg: WireMessage,
    },
    PeerLeft {
        conn: ConnId,
    },
}

/// Fire-and-forget send requests.
#[derive(Debug, Clone)]
pub enum Outbound {
    ToPeer { conn: ConnId, msg: WireMessage },
    Broadcast { msg: WireMessage },
    BroadcastExcept { except: ConnId, msg: WireMessage },
    /// Flush pending messages, then close the connection.
    Close { conn: ConnId },
}

pub type OutboundSender = mpsc::UnboundedSender<Outbound>;

#[derive(Debug)]
enum PeerOutbound {
    Message(WireMessage),
    Close,
}

struct PeerHandle {
    conn: ConnId,
    tx: mpsc::UnboundedSender<PeerOutbound>,
}

#[derive(Default)]
struct HostState {
    peers: RwLock<Vec<PeerHandle>>,
}

impl HostState {
    async fn send_to(&self, conn: ConnId, out: PeerOutbound) {
        let peers = self.peers.read().await;
        if let Some(p) = peers.iter().find(|p| p.conn == conn) {
            let _ = p.tx.send(out);
        }
    }

    async fn broadcast(&self, except: Option<ConnId>, msg: &WireMessage) {
        let peers = self.peers.read().await;
        for p in peers.iter().filter(|p| Some(p.conn) != except) {
            let _ = p.tx.send(PeerOutbound::Message(msg.clone()));
        }
    }
}

/// Run the host listener until the accept loop fails.
///
/// `ready_tx` receives the bound address once listening (useful with port 0).
pub async fn run_host<E>(
    config: NetConfig,
    event_tx: mpsc::UnboundedSender<E>,
    mut out_rx: mpsc::UnboundedReceiver<Outbound>,
    ready_tx: Option<oneshot::Sender<SocketAddr>>,
) -> anyhow::Result<()>
where
    E: From<TransportEvent> + Send + 'static,
{
    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    let bound = listener.local_addr()?;
    info!(%bound, "host listening");
    if let Some(tx) = ready_tx {
        let _ = tx.send(bound);
    }

    let state = Arc::new(HostState::default());

    // Outbound dispatcher.
    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Some(out) = out_rx.recv().await {
                match out {
                    Outbound::ToPeer { conn, msg } => {
                        state.send_to(conn, PeerOutbound::Message(msg)).await;
                    }
                    Outbound::Broadcast { msg } => state.broadcast(None, &msg).await,
                    Outbound::BroadcastExcept { except, msg } => {
                        state.broadcast(Some(except), &msg).await;
                    }
                    Outbound::Close { conn } => state.send_to(conn, PeerOutbound::Close).await,
                }
            }
        });
    }

    let mut conn_counter = 0u64;
    loop {
        let (socket, peer_addr) = listener.accept().await?;
        conn_counter += 1;
        let conn = ConnId(conn_counter);
        info!(%conn, %peer_addr, "peer connected");

        let state = Arc::clone(&state);
        let event_tx = event_tx.clone();
        let config = config.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_peer(socket, peer_addr, conn, &config, state, event_tx).await {
                warn!(%conn, error = %e, "peer connection error");
            }
            info!(%conn, "peer disconnected");
        });
    }
}

async fn handle_peer<E>(
    socket: TcpStream,
    addr: SocketAddr,
    conn: ConnId,
    config: &NetConfig,
    state: Arc<HostState>,
    event_tx: mpsc::UnboundedSender<E>,
) -> anyhow::Result<()>
where
    E: From<TransportEvent> + Send + 'static,
{
    let (reader, mut writer) = socket.into_split();
    let mut lines = BufReader::new(reader).lines();

    // Hello comes first.
    let first = tokio::time::timeout(config.handshake_timeout(), lines.next_line()).await;
    let hello = match first {
        Ok(Ok(Some(line))) => match parse_message(line.trim()) {
            Ok(ParsedMessage::Known(WireMessage::Hello(hello))) => hello,
            _ => {
                reject(&mut writer, "hello required").await;
                return Ok(());
            }
        },
        Ok(Ok(None)) => return Ok(()),
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            reject(&mut writer, "handshake timeout").await;
            return Ok(());
        }
    };

    if !is_compatible(&hello.protocol_version) {
        warn!(%conn, version = %hello.protocol_version, "protocol mismatch");
        reject(&mut writer, "protocol mismatch").await;
        return Ok(());
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<PeerOutbound>();
    state.peers.write().await.push(PeerHandle { conn, tx });

    let mut write_task = tokio::spawn(async move {
        while let Some(out) = rx.recv().await {
            match out {
                PeerOutbound::Message(msg) => {
                    if !write_message(&mut writer, &msg).await {
                        break;
                    }
                }
                PeerOutbound::Close => break,
            }
        }
        let _ = writer.shutdown().await;
    });

    debug!(%conn, name = %hello.name, "hello received");
    let _ = event_tx.send(TransportEvent::PeerJoined { conn, addr, hello }.into());

    let result = loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => forward_line(conn, &line, &event_tx),
                Ok(None) => break Ok(()),
                Err(e) => break Err(e.into()),
            },
            _ = &mut write_task => break Ok(()),
        }
    };

    // Dropping the handle ends the writer once it has flushed what is queued.
    state.peers.write().await.retain(|p| p.conn != conn);
    let _ = event_tx.send(TransportEvent::PeerLeft { conn }.into());
    result
}

async fn reject(writer: &mut OwnedWriteHalf, reason: &str) {
    write_message(writer, &create_rejected(reason)).await;
    let _ = writer.shutdown().await;
}

/// Write one line; false when the connection is gone.
pub(crate) async fn write_message(writer: &mut OwnedWriteHalf, msg: &WireMessage) -> bool {
    let bytes = match encode_line(msg) {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, msg_type = msg.type_name(), "failed to encode message");
            return true;
        }
    };
    writer.write_all(&bytes).await.is_ok() && writer.flush().await.is_ok()
}

/// Parse one received line and hand it on; bad input is logged and dropped.
pub(crate) fn forward_line<E>(conn: ConnId, raw: &str, event_tx: &mpsc::UnboundedSender<E>)
where
    E: From<TransportEvent>,
{
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }
    match parse_message(trimmed) {
        Ok(ParsedMessage::Known(msg)) => {
            let _ = event_tx.send(TransportEvent::Message { conn, msg }.into());
        }
        Ok(ParsedMessage::Unknown(msg_type)) => {
            warn!(%conn, %msg_type, "ignoring unknown message type");
        }
        Err(e) => warn!(%conn, error = %e, "ignoring malformed message"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{create_hello, LobbyStateMessage};
    use std::time::Duration;
    use tokio::io::AsyncBufReadExt;

    async fn start_host() -> (
        SocketAddr,
        mpsc::UnboundedReceiver<TransportEvent>,
        OutboundSender,
    ) {
        let config = NetConfig {
            port: 0,
            ..NetConfig::default()
        };
        let (event_tx, event_rx) = mpsc::unbounded_channel::<TransportEvent>();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = run_host(config, event_tx, out_rx, Some(ready_tx)).await;
        });
        let addr = tokio::time::timeout(Duration::from_secs(2), ready_rx)
            .await
            .unwrap()
            .unwrap();
        (addr, event_rx, out_tx)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timeout waiting for event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_hello_then_message_then_leave() {
        let (addr, mut events, _out) = start_host().await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(&encode_line(&create_hello("alice")).unwrap())
            .await
            .unwrap();

        let conn = match next_event(&mut events).await {
            TransportEvent::PeerJoined { conn, hello, .. } => {
                assert_eq!(hello.name, "alice");
                conn
            }
            other => panic!("expected PeerJoined, got {other:?}"),
        };

        stream
            .write_all(b"{\"type\":\"gameMode\",\"mode\":\"NORMAL\"}\n")
            .await
            .unwrap();
        // Malformed and unknown lines are dropped without closing the connection.
        stream.write_all(b"garbage\n{\"type\":\"chat\"}\n").await.unwrap();
        stream
            .write_all(b"{\"type\":\"gameMode\",\"mode\":\"ITEM\"}\n")
            .await
            .unwrap();

        for expected in ["NORMAL", "ITEM"] {
            match next_event(&mut events).await {
                TransportEvent::Message { conn: c, msg } => {
                    assert_eq!(c, conn);
                    let v = serde_json::to_value(&msg).unwrap();
                    assert_eq!(v["mode"], expected);
                }
                other => panic!("expected Message, got {other:?}"),
            }
        }

        drop(stream);
        assert_eq!(next_event(&mut events).await, TransportEvent::PeerLeft { conn });
    }

    #[tokio::test]
    async fn test_missing_hello_is_rejected() {
        let (addr, _events, _out) = start_host().await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        write_half
            .write_all(b"{\"type\":\"gameMode\",\"mode\":\"NORMAL\"}\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(read_half).lines();
        let line = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .expect("expected rejection line");
        let v: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(v["type"], "connectionRejected");
        assert_eq!(v["reason"], "hello required");
    }

    #[tokio::test]
    async fn test_outbound_close_disconnects_peer() {
        let (addr, mut events, out) = start_host().await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        write_half
            .write_all(&encode_line(&create_hello("bob")).unwrap())
            .await
            .unwrap();

        let conn = match next_event(&mut events).await {
            TransportEvent::PeerJoined { conn, .. } => conn,
            other => panic!("expected PeerJoined, got {other:?}"),
        };

        out.send(Outbound::ToPeer {
            conn,
            msg: WireMessage::LobbyState(LobbyStateMessage { players: vec![] }),
        })
        .unwrap();
        out.send(Outbound::Close { conn }).unwrap();

        let mut lines = BufReader::new(read_half).lines();
        let first = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .expect("expected lobby line");
        assert!(first.contains("lobbyState"));
        let eof = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
            .await
            .unwrap()
            .unwrap();
        assert!(eof.is_none());

        assert_eq!(next_event(&mut events).await, TransportEvent::PeerLeft { conn });
    }
}
