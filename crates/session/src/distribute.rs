//! Attack distribution.
//!
//! Versus sends straight to the one opponent. In Squad, clients hand every attack to the
//! host, and the host sends the full pattern to each surviving player but the sender.

use tetris_battle_types::{MatchKind, PlayerId, Role};

/// Where a locally generated attack goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttackRoute {
    /// Deliver to each of these players.
    Direct(Vec<PlayerId>),
    /// Give it to the host, who fans it out.
    ViaHost,
}

/// Route an attack generated by `sender`.
pub fn route_attack(kind: MatchKind, role: Role, sender: &PlayerId, alive: &[PlayerId]) -> AttackRoute {
    match (kind, role) {
        (MatchKind::Squad, Role::Client) => AttackRoute::ViaHost,
        _ => AttackRoute::Direct(fan_out(sender, alive)),
    }
}

/// Every surviving player except the sender.
pub fn fan_out(sender: &PlayerId, alive: &[PlayerId]) -> Vec<PlayerId> {
    alive.iter().filter(|p| *p != sender).cloned().collect()
}
