//! Background timer services for the tic-tac-toe room service: the
//! reconnection grace period (C7), turn timeout (C8), rematch window
//! expiry (C9), and the idle-room sweeper (C10).
//!
//! Every service here follows the same shape: lock the room briefly to
//! decide and arm, release it, sleep, then lock again to check whether
//! anything changed while asleep before acting. None of them hold the
//! room lock across an `.await`.

mod context;
mod lifecycle;
mod reconnection;
mod rematch_window;
mod sweeper;
mod turn;
pub mod wire;

pub use context::Context;
pub use lifecycle::close_room;
pub use reconnection::spawn_grace_period;
pub use rematch_window::spawn_rematch_window;
pub use sweeper::spawn as spawn_idle_sweeper;
pub use turn::spawn_turn_timeout;
