//! Session tunables.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use tetris_battle_types::{
    MatchKind, SQUAD_ATTACK_THRESHOLD, SQUAD_BROADCAST_MS, TIMER_MATCH_SECS,
    VERSUS_ATTACK_THRESHOLD, VERSUS_BROADCAST_MS,
};

/// Match tunables. The 2-player and 3-player paths are configured independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub versus_broadcast_ms: u64,
    pub squad_broadcast_ms: u64,
    pub versus_attack_threshold: u32,
    pub squad_attack_threshold: u32,
    pub timer_secs: u32,
    /// Length of one countdown step; a second outside of tests.
    pub timer_step_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            versus_broadcast_ms: VERSUS_BROADCAST_MS,
            squad_broadcast_ms: SQUAD_BROADCAST_MS,
            versus_attack_threshold: VERSUS_ATTACK_THRESHOLD,
            squad_attack_threshold: SQUAD_ATTACK_THRESHOLD,
            timer_secs: TIMER_MATCH_SECS,
            timer_step_ms: 1000,
        }
    }
}

impl SessionConfig {
    /// Create from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        fn var<T: std::str::FromStr>(name: &str, default: T) -> T {
            std::env::var(name)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(default)
        }

        let defaults = Self::default();
        Self {
            versus_broadcast_ms: var(
                "TETRIS_BATTLE_VERSUS_BROADCAST_MS",
                defaults.versus_broadcast_ms,
            ),
            squad_broadcast_ms: var(
                "TETRIS_BATTLE_SQUAD_BROADCAST_MS",
                defaults.squad_broadcast_ms,
            ),
            versus_attack_threshold: var(
                "TETRIS_BATTLE_VERSUS_ATTACK_THRESHOLD",
                defaults.versus_attack_threshold,
            ),
            squad_attack_threshold: var(
                "TETRIS_BATTLE_SQUAD_ATTACK_THRESHOLD",
                defaults.squad_attack_threshold,
            ),
            timer_secs: var("TETRIS_BATTLE_TIMER_SECS", defaults.timer_secs),
            timer_step_ms: defaults.timer_step_ms,
        }
    }

    pub fn broadcast_period(&self, kind: MatchKind) -> Duration {
        Duration::from_millis(match kind {
            MatchKind::Versus => self.versus_broadcast_ms,
            MatchKind::Squad => self.squad_broadcast_ms,
        })
    }

    pub fn attack_threshold(&self, kind: MatchKind) -> u32 {
        match kind {
            MatchKind::Versus => self.versus_attack_threshold,
            MatchKind::Squad => self.squad_attack_threshold,
        }
    }

    pub fn timer_step(&self) -> Duration {
        Duration::from_millis(self.timer_step_ms.max(1))
    }
}
