//! Round engine
//!
//! Leaves first: the curve arithmetic, bet and observer bookkeeping, event
//! fan-out and timers, then the engine that ties them together.

pub mod calculator;
pub mod engine;
pub mod events;
pub mod observers;
pub mod participants;
pub mod randomness;
pub mod timers;
pub mod types;

pub use engine::CrashGame;
pub use events::{EventSink, GameEvent};
pub use types::{FinishedRound, PlaceBetRequest, RoundState};
