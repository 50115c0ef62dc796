//! Periodic snapshot broadcast and the receiving-side board cache.
//!
//! The simulation publishes into a [`SnapshotSlot`] whenever its board changes; the
//! scheduler task wakes on its own interval and pushes whatever is newest. Neither side
//! waits on the other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use tetris_battle_core::BoardSnapshot;
use tetris_battle_net::{BoardUpdateMessage, Outbound, OutboundSender, WireMessage};
use tetris_battle_types::PlayerId;

/// Latest local snapshot, shared between the simulation and the scheduler.
#[derive(Debug, Clone, Default)]
pub struct SnapshotSlot {
    inner: Arc<Mutex<Option<BoardSnapshot>>>,
}

impl SnapshotSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: BoardSnapshot) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
    }

    pub fn latest(&self) -> Option<BoardSnapshot> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Fire-and-forget periodic `boardUpdate` sender.
#[derive(Debug, Default)]
pub struct BroadcastScheduler {
    task: Option<JoinHandle<()>>,
}

impl BroadcastScheduler {
    /// Start pushing the slot's newest snapshot every `period`.
    ///
    /// A snapshot already sent is not repeated.
    pub fn start(handle: &Handle, period: Duration, slot: SnapshotSlot, out: OutboundSender) -> Self {
        let period = period.max(Duration::from_millis(1));
        let task = handle.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last_sent: Option<u64> = None;
            loop {
                ticker.tick().await;
                let Some(snapshot) = slot.latest() else {
                    continue;
                };
                if last_sent == Some(snapshot.seq) {
                    continue;
                }
                last_sent = Some(snapshot.seq);
                let msg = WireMessage::BoardUpdate(BoardUpdateMessage::from_snapshot(&snapshot));
                if out.send(Outbound::Broadcast { msg }).is_err() {
                    debug!("outbound closed, broadcast stopped");
                    break;
                }
            }
        });
        Self { task: Some(task) }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the task. Calling it again is a no-op.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for BroadcastScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Most recent snapshot per remote player.
#[derive(Debug, Clone, Default)]
pub struct RemoteBoards {
    boards: HashMap<PlayerId, BoardSnapshot>,
}

impl RemoteBoards {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached board unless `snapshot` is older.
    ///
    /// Senders that do not number their snapshots (`seq == 0`) always win.
    pub fn accept(&mut self, snapshot: BoardSnapshot) -> bool {
        match self.boards.get(&snapshot.player) {
            Some(cached) if snapshot.seq != 0 && !snapshot.supersedes(cached) => false,
            _ => {
                self.boards.insert(snapshot.player.clone(), snapshot);
                true
            }
        }
    }

    pub fn get(&self, player: &PlayerId) -> Option<&BoardSnapshot> {
        self.boards.get(player)
    }

    pub fn len(&self) -> usize {
        self.boards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }
}
