//! Vocabulary shared between room state and the timer tasks that watch it.
//!
//! A `Room` holds a `TimerHandle` for any deadline currently ticking
//! against one of its players (reconnection grace, turn timeout, rematch
//! window). The timer task itself lives in `ttt-timer`; this crate only
//! needs to know how to cancel it and why.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::oneshot;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Mints a process-wide unique token for a new timer instance. Used to tell
/// "my timer is still the one stored on the player" apart from "a newer
/// timer silently replaced mine" without requiring `TimerHandle` itself to
/// be comparable.
pub fn next_token() -> u64 {
    NEXT_TOKEN.fetch_add(1, Ordering::Relaxed)
}

/// Why a running timer task was told to stop before firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The disconnected player reconnected before the grace period elapsed.
    Reconnected,
    /// A newer timer replaced this one (e.g. a move reset the turn clock).
    Replaced,
    /// The room itself was torn down.
    RoomRemoved,
    /// Something else explicitly reset the clock (rematch accepted, game
    /// restarted).
    ExplicitReset,
    /// The turn-holder disconnected; the clock pauses rather than keeps
    /// running against an absent player.
    Disconnected,
}

/// A cancellable handle to a timer task sleeping toward some deadline.
///
/// `token` is a copy of the version the owning room had when this timer
/// was armed; the timer task re-checks it against the room's live version
/// on wakeup so a handle that was silently replaced (rather than formally
/// cancelled) still can't act on a stale deadline.
#[derive(Debug)]
pub struct TimerHandle {
    token: u64,
    cancel: Option<oneshot::Sender<CancelReason>>,
}

impl TimerHandle {
    pub fn new(token: u64, cancel: oneshot::Sender<CancelReason>) -> Self {
        Self {
            token,
            cancel: Some(cancel),
        }
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    /// Tells the timer task to stop, if it hasn't already fired or been
    /// cancelled. Consumes the handle — a cancelled timer has nothing left
    /// to hold onto.
    pub fn cancel(mut self, reason: CancelReason) {
        if let Some(sender) = self.cancel.take() {
            let _ = sender.send(reason);
        }
    }
}
