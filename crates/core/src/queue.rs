//! Incoming attack queue
//!
//! Patterns are enqueued by the network receive context the moment they arrive and
//! drained by the simulation context at the next piece spawn, oldest first. The queue is
//! a cloneable handle over one mutex so both contexts share a single exclusion boundary.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tetris_battle_types::PlayerId;

use crate::attack::AttackPattern;
use crate::board::{Board, GarbageOutcome};

/// What happened to a pattern offered to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Queued,
    /// Our own attack echoed back by a host fan-out.
    SelfAttack,
    /// Zero rows; nothing to apply.
    Empty,
}

#[derive(Debug, Clone, Default)]
pub struct IncomingAttackQueue {
    inner: Arc<Mutex<VecDeque<AttackPattern>>>,
}

impl IncomingAttackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<AttackPattern>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a received pattern unless it came from `local_id` or has no rows.
    pub fn enqueue(&self, pattern: AttackPattern, local_id: &PlayerId) -> Enqueue {
        if pattern.source() == local_id {
            return Enqueue::SelfAttack;
        }
        if pattern.is_empty() {
            return Enqueue::Empty;
        }
        self.lock().push_back(pattern);
        Enqueue::Queued
    }

    /// Take every pending pattern, oldest first.
    pub fn drain(&self) -> Vec<AttackPattern> {
        self.lock().drain(..).collect()
    }

    /// Copy of the pending patterns for display.
    pub fn pending(&self) -> Vec<AttackPattern> {
        self.lock().iter().cloned().collect()
    }

    /// Line count of each pending pattern, oldest first.
    pub fn pending_line_counts(&self) -> Vec<u32> {
        self.lock().iter().map(|p| p.line_count() as u32).collect()
    }

    pub fn pending_lines(&self) -> usize {
        self.lock().iter().map(AttackPattern::line_count).sum()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// Spawn-event handler body: drain the queue into the board, back-to-back.
pub fn apply_pending(board: &mut Board, queue: &IncomingAttackQueue) -> GarbageOutcome {
    let patterns = queue.drain();
    board.apply_all(&patterns)
}
