//! Crashline - real-time crash game backend
//!
//! A single round repeats forever: a multiplier grows from 1.00x until an
//! unpredictable crash point, players cash out before it or lose their stake.
//! The round engine lives in [`game`]; balances in [`ledger`]; history in
//! [`round_store`]; the HTTP/WebSocket transport in [`api`].

pub mod api;
pub mod config;
pub mod errors;
pub mod game;
pub mod ledger;
pub mod metrics;
pub mod round_store;
pub mod storage;

pub use config::{ConfigLoader, CrashConfig};
pub use errors::{CrashError, CrashResult, GameError};
pub use game::CrashGame;
