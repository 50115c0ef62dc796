//! Match state machine - survivors, elimination order, final result
//!
//! Host-authoritative. Clients never construct one; they learn the outcome from the
//! `gameEnd` / `result` / `matchAborted` message.
//!
//! ```text
//! InProgress --(|alive| <= 1 or timer expiry)--> Ending --end_game()--> Ended
//!      \____________________abort()____________________________________/
//! ```

use arrayvec::ArrayVec;

use tetris_battle_net::{GameEndMessage, MatchAbortedMessage, ResultMessage, WireMessage};
use tetris_battle_types::{GameMode, MatchKind, PlayerId, MAX_PLAYERS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    InProgress,
    Ending,
    Ended,
}

/// Final scores of a 2-player match; `player_a` is the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersusScores {
    pub player_a: PlayerId,
    pub player_b: PlayerId,
    pub score_a: u32,
    pub score_b: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Last place first, winner last.
    Ranking(Vec<PlayerId>),
    Winner {
        winner: PlayerId,
        scores: VersusScores,
    },
    Draw(VersusScores),
    /// A participant disconnected mid-match.
    Aborted { reason: String },
}

impl MatchOutcome {
    pub fn winner(&self) -> Option<&PlayerId> {
        match self {
            MatchOutcome::Ranking(r) => r.last(),
            MatchOutcome::Winner { winner, .. } => Some(winner),
            MatchOutcome::Draw(_) | MatchOutcome::Aborted { .. } => None,
        }
    }

    pub fn to_message(&self) -> WireMessage {
        match self {
            MatchOutcome::Ranking(ranking) => WireMessage::GameEnd(GameEndMessage {
                ranking: ranking.clone(),
            }),
            MatchOutcome::Winner { winner, scores } => {
                WireMessage::Result(result_message(Some(winner.clone()), scores))
            }
            MatchOutcome::Draw(scores) => WireMessage::Result(result_message(None, scores)),
            MatchOutcome::Aborted { reason } => WireMessage::MatchAborted(MatchAbortedMessage {
                reason: reason.clone(),
            }),
        }
    }

    /// Rebuild the outcome a host announced.
    pub fn from_message(msg: &WireMessage) -> Option<Self> {
        match msg {
            WireMessage::GameEnd(m) => Some(MatchOutcome::Ranking(m.ranking.clone())),
            WireMessage::Result(m) => {
                let scores = VersusScores {
                    player_a: m.player_a.clone(),
                    player_b: m.player_b.clone(),
                    score_a: m.score_a,
                    score_b: m.score_b,
                };
                Some(match &m.winner {
                    Some(winner) => MatchOutcome::Winner {
                        winner: winner.clone(),
                        scores,
                    },
                    None => MatchOutcome::Draw(scores),
                })
            }
            WireMessage::MatchAborted(m) => Some(MatchOutcome::Aborted {
                reason: m.reason.clone(),
            }),
            _ => None,
        }
    }
}

fn result_message(winner: Option<PlayerId>, scores: &VersusScores) -> ResultMessage {
    ResultMessage {
        winner,
        player_a: scores.player_a.clone(),
        player_b: scores.player_b.clone(),
        score_a: scores.score_a,
        score_b: scores.score_b,
    }
}

/// Host-owned match state.
#[derive(Debug, Clone)]
pub struct MatchState {
    kind: MatchKind,
    mode: GameMode,
    participants: ArrayVec<PlayerId, MAX_PLAYERS>,
    scores: ArrayVec<u32, MAX_PLAYERS>,
    alive: ArrayVec<PlayerId, MAX_PLAYERS>,
    eliminated: ArrayVec<PlayerId, MAX_PLAYERS>,
    phase: MatchPhase,
    timer_expired: bool,
    outcome: Option<MatchOutcome>,
}

impl MatchState {
    /// `participants` in slot order (host first); extras past three are ignored.
    pub fn new(kind: MatchKind, mode: GameMode, participants: &[PlayerId]) -> Self {
        let participants: ArrayVec<PlayerId, MAX_PLAYERS> =
            participants.iter().take(MAX_PLAYERS).cloned().collect();
        let scores = participants.iter().map(|_| 0).collect();
        Self {
            kind,
            mode,
            alive: participants.clone(),
            participants,
            scores,
            eliminated: ArrayVec::new(),
            phase: MatchPhase::InProgress,
            timer_expired: false,
            outcome: None,
        }
    }

    pub fn kind(&self) -> MatchKind {
        self.kind
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn participants(&self) -> &[PlayerId] {
        &self.participants
    }

    pub fn alive(&self) -> &[PlayerId] {
        &self.alive
    }

    pub fn elimination_order(&self) -> &[PlayerId] {
        &self.eliminated
    }

    pub fn is_alive(&self, player: &PlayerId) -> bool {
        self.alive.contains(player)
    }

    pub fn outcome(&self) -> Option<&MatchOutcome> {
        self.outcome.as_ref()
    }

    /// Attacks are only generated while more than one player survives.
    pub fn accepts_attacks(&self) -> bool {
        self.phase == MatchPhase::InProgress && self.alive.len() > 1
    }

    pub fn update_score(&mut self, player: &PlayerId, score: u32) {
        if let Some(i) = self.participants.iter().position(|p| p == player) {
            self.scores[i] = score;
        }
    }

    pub fn score(&self, player: &PlayerId) -> Option<u32> {
        self.participants
            .iter()
            .position(|p| p == player)
            .map(|i| self.scores[i])
    }

    /// Append `player` to the elimination order. Returns false for a repeat or an
    /// unknown player, leaving state untouched.
    pub fn record_elimination(&mut self, player: &PlayerId) -> bool {
        if self.phase == MatchPhase::Ended {
            return false;
        }
        let Some(i) = self.alive.iter().position(|p| p == player) else {
            return false;
        };
        let id = self.alive.remove(i);
        self.eliminated.push(id);
        true
    }

    /// Move to `Ending` once at most one player survives. Returns true while ending.
    pub fn check_match_end(&mut self) -> bool {
        if self.phase == MatchPhase::InProgress && self.alive.len() <= 1 {
            self.phase = MatchPhase::Ending;
        }
        self.phase == MatchPhase::Ending
    }

    /// Timer-mode expiry (Versus only): bypass elimination and compare scores.
    pub fn on_timer_expired(&mut self) -> bool {
        if self.phase != MatchPhase::InProgress
            || self.kind != MatchKind::Versus
            || self.mode != GameMode::Timer
        {
            return false;
        }
        self.timer_expired = true;
        self.phase = MatchPhase::Ending;
        true
    }

    /// Conclude the match. May be forced before the natural end; `None` once ended.
    pub fn end_game(&mut self) -> Option<MatchOutcome> {
        if self.phase == MatchPhase::Ended {
            return None;
        }
        let outcome = match self.kind {
            MatchKind::Versus if self.timer_expired || self.alive.len() != 1 => {
                self.versus_result()
            }
            MatchKind::Versus => {
                let winner = self.alive[0].clone();
                MatchOutcome::Winner {
                    winner,
                    scores: self.versus_scores(),
                }
            }
            MatchKind::Squad => MatchOutcome::Ranking(self.ranking()),
        };
        self.phase = MatchPhase::Ended;
        self.outcome = Some(outcome.clone());
        Some(outcome)
    }

    /// End immediately with an error-flavored result.
    pub fn abort(&mut self, reason: &str) -> Option<MatchOutcome> {
        if self.phase == MatchPhase::Ended {
            return None;
        }
        let outcome = MatchOutcome::Aborted {
            reason: reason.to_string(),
        };
        self.phase = MatchPhase::Ended;
        self.outcome = Some(outcome.clone());
        Some(outcome)
    }

    /// Elimination order followed by survivors, lowest score first.
    pub fn ranking(&self) -> Vec<PlayerId> {
        let mut survivors: Vec<&PlayerId> = self.alive.iter().collect();
        survivors.sort_by_key(|p| self.score(p).unwrap_or(0));
        self.eliminated
            .iter()
            .chain(survivors)
            .cloned()
            .collect()
    }

    /// Score comparison between the two Versus players; equal scores draw.
    pub fn versus_result(&self) -> MatchOutcome {
        let scores = self.versus_scores();
        match scores.score_a.cmp(&scores.score_b) {
            std::cmp::Ordering::Greater => MatchOutcome::Winner {
                winner: scores.player_a.clone(),
                scores,
            },
            std::cmp::Ordering::Less => MatchOutcome::Winner {
                winner: scores.player_b.clone(),
                scores,
            },
            std::cmp::Ordering::Equal => MatchOutcome::Draw(scores),
        }
    }

    fn versus_scores(&self) -> VersusScores {
        let id = |i: usize| self.participants.get(i).cloned().unwrap_or_else(PlayerId::host);
        VersusScores {
            player_a: id(0),
            player_b: id(1),
            score_a: self.scores.first().copied().unwrap_or(0),
            score_b: self.scores.get(1).copied().unwrap_or(0),
        }
    }
}
