//! Core match logic module - boards, garbage and the simulation seam
//!
//! This crate holds the pure, I/O-free parts of a networked match:
//!
//! - [`board`]: 10x20 grid of cell codes with bottom-up garbage insertion
//! - [`attack`]: turning a line clear into an [`AttackPattern`]
//! - [`queue`]: the per-player FIFO of received attacks, drained at spawn
//! - [`snapshot`]: the full renderable state broadcast to opponents
//! - [`sim`]: the interface of the external single-player simulation
//!
//! # Example
//!
//! ```
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use tetris_battle_core::{apply_pending, generate_attack, AttackRules, Board, IncomingAttackQueue, LineClear};
//! use tetris_battle_types::PlayerId;
//!
//! let mut rng = StdRng::seed_from_u64(1);
//! let clear = LineClear {
//!     count: 2,
//!     gravity_or_split: false,
//!     last_locked: vec![(4, 18), (4, 19), (5, 19), (4, 17)],
//!     cleared_rows: vec![18, 19],
//! };
//! let attack = generate_attack(AttackRules::new(2), PlayerId::host(), &clear, &mut rng).unwrap();
//! assert_eq!(attack.hole_columns(), vec![4, 4]);
//!
//! let queue = IncomingAttackQueue::new();
//! queue.enqueue(attack, &PlayerId::for_slot(1));
//!
//! let mut board = Board::new();
//! let outcome = apply_pending(&mut board, &queue);
//! assert_eq!(outcome.rows_added, 2);
//! ```

pub mod attack;
pub mod board;
pub mod queue;
pub mod sim;
pub mod snapshot;

pub use tetris_battle_types as types;

pub use attack::{generate_attack, AttackError, AttackPattern, AttackRules, GarbageRow, LineClear};
pub use board::{Board, GarbageOutcome, Grid};
pub use queue::{apply_pending, Enqueue, IncomingAttackQueue};
pub use sim::{EngineEvent, SimulationEngine};
pub use snapshot::{BoardSnapshot, PieceDescriptor};
