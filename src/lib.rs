//! Networked Tetris battle (workspace facade crate).
//!
//! Re-exports the member crates under one name so callers depend on
//! `tetris_battle::{types, core, net, session}` while the implementation lives under
//! `crates/`.

pub use tetris_battle_core as core;
pub use tetris_battle_net as net;
pub use tetris_battle_session as session;
pub use tetris_battle_types as types;
