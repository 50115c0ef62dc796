//! Transport runtime integration.
//!
//! Bridges the synchronous match loop with the async TCP tasks. A [`Transport`] owns its
//! tokio runtime; drop it from synchronous code only.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::runtime::{Handle, Runtime};
use tokio::sync::{mpsc, oneshot};
use tracing::error;

use tetris_battle_types::Role;

use crate::client::{connect, ClientLink, TransportError};
use crate::config::NetConfig;
use crate::server::{run_host, Outbound, OutboundSender, TransportEvent};

const LISTEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Running transport instance, either hosting or joined to a host.
pub struct Transport {
    rt: Runtime,
    out_tx: OutboundSender,
    local_addr: SocketAddr,
    link: Option<ClientLink>,
}

impl Transport {
    /// Start listening; returns once the socket is bound.
    pub fn host<E>(config: NetConfig, event_tx: mpsc::UnboundedSender<E>) -> Result<Self, TransportError>
    where
        E: From<TransportEvent> + Send + 'static,
    {
        let rt = Runtime::new()?;
        let (out_tx, out_rx) = mpsc::unbounded_channel::<Outbound>();
        let (ready_tx, ready_rx) = oneshot::channel();

        rt.spawn(async move {
            if let Err(e) = run_host(config, event_tx, out_rx, Some(ready_tx)).await {
                error!(error = %e, "host transport stopped");
            }
        });

        let local_addr = rt
            .block_on(async { tokio::time::timeout(LISTEN_TIMEOUT, ready_rx).await })
            .map_err(|_| TransportError::Timeout)?
            .map_err(|_| TransportError::Runtime("host listener failed to start".into()))?;

        Ok(Self {
            rt,
            out_tx,
            local_addr,
            link: None,
        })
    }

    /// Connect to a host and wait for admission.
    ///
    /// Blocks for up to the configured connect timeout. Call it from a worker thread,
    /// never from the thread that renders.
    pub fn join<E>(
        config: NetConfig,
        name: &str,
        event_tx: mpsc::UnboundedSender<E>,
    ) -> Result<Self, TransportError>
    where
        E: From<TransportEvent> + Send + 'static,
    {
        let rt = Runtime::new()?;
        let (out_tx, out_rx) = mpsc::unbounded_channel::<Outbound>();
        let link = rt.block_on(connect(&config, name, event_tx, out_rx))?;

        Ok(Self {
            rt,
            out_tx,
            local_addr: link.host_addr,
            link: Some(link),
        })
    }

    pub fn send(&self, msg: Outbound) {
        let _ = self.out_tx.send(msg);
    }

    pub fn outbound(&self) -> OutboundSender {
        self.out_tx.clone()
    }

    /// Handle for spawning match timers onto the transport runtime.
    pub fn handle(&self) -> Handle {
        self.rt.handle().clone()
    }

    /// Bound address when hosting, host address when joined.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn link(&self) -> Option<&ClientLink> {
        self.link.as_ref()
    }

    pub fn role(&self) -> Role {
        Role::assign(self.link.is_none())
    }
}
