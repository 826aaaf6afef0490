//! Room lifecycle state machine (C3).
//!
//! A total function over `(RoomState, RoomEvent)`. Every pair not listed
//! explicitly is rejected without mutating anything — callers are expected
//! to log the rejection and carry on.

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    WaitingForPlayers,
    Active,
    GameOver,
    RematchOffered,
    RematchAccepted,
    RematchExpired,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomEvent {
    PlayerJoined,
    MoveMade,
    GameWon,
    GameDrawn,
    PlayerForfeited,
    PlayerDisconnected,
    RematchOffered,
    RematchAccepted,
    RematchExpired,
    FirstMoveMade,
    RoomClosed,
}

impl RoomState {
    /// Starting state for a freshly created room.
    pub fn initial() -> Self {
        RoomState::WaitingForPlayers
    }

    /// Applies `event` to this state, returning the next state, or `None`
    /// if this (state, event) pair is invalid. `RoomClosed` always wins,
    /// from any state.
    pub fn transition(self, event: RoomEvent) -> Option<RoomState> {
        use RoomEvent::*;
        use RoomState::*;

        if matches!(event, RoomClosed) {
            return Some(Closed);
        }

        match (self, event) {
            (WaitingForPlayers, PlayerJoined) => Some(Active),
            (Active, MoveMade) => Some(Active),
            (Active, GameWon | GameDrawn | PlayerForfeited) => Some(GameOver),
            (Active, PlayerDisconnected) => Some(Active),
            (GameOver, RoomEvent::RematchOffered) => Some(RematchOffered),
            (RematchOffered, RoomEvent::RematchAccepted) => Some(RematchAccepted),
            (RematchOffered, RoomEvent::RematchExpired) => Some(RematchExpired),
            (RematchAccepted, FirstMoveMade) => Some(Active),
            _ => None,
        }
    }

    /// Applies `event`, logging and refusing the mutation if the pair is
    /// invalid. Returns whether the state changed.
    pub fn apply(&mut self, event: RoomEvent) -> bool {
        match self.transition(event) {
            Some(next) => {
                *self = next;
                true
            }
            None => {
                warn!(from = ?self, ?event, "rejected invalid room state transition");
                false
            }
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RoomState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RoomEvent::*;
    use RoomState::*;

    #[test]
    fn initial_state_is_waiting_for_players() {
        assert_eq!(RoomState::initial(), WaitingForPlayers);
    }

    #[test]
    fn documented_transitions_all_succeed() {
        assert_eq!(WaitingForPlayers.transition(PlayerJoined), Some(Active));
        assert_eq!(Active.transition(MoveMade), Some(Active));
        assert_eq!(Active.transition(GameWon), Some(GameOver));
        assert_eq!(Active.transition(GameDrawn), Some(GameOver));
        assert_eq!(Active.transition(PlayerForfeited), Some(GameOver));
        assert_eq!(Active.transition(PlayerDisconnected), Some(Active));
        assert_eq!(GameOver.transition(RematchOffered), Some(RematchOffered));
        assert_eq!(
            RematchOffered.transition(RematchAccepted),
            Some(RematchAccepted)
        );
        assert_eq!(
            RematchOffered.transition(RematchExpired),
            Some(RematchExpired)
        );
        assert_eq!(RematchAccepted.transition(FirstMoveMade), Some(Active));
    }

    #[test]
    fn room_closed_wins_from_any_state() {
        for state in [
            WaitingForPlayers,
            Active,
            GameOver,
            RematchOffered,
            RematchAccepted,
            RematchExpired,
            Closed,
        ] {
            assert_eq!(state.transition(RoomClosed), Some(Closed));
        }
    }

    #[test]
    fn undocumented_pairs_are_rejected() {
        assert_eq!(WaitingForPlayers.transition(MoveMade), None);
        assert_eq!(GameOver.transition(MoveMade), None);
        assert_eq!(RematchExpired.transition(RematchAccepted), None);
        assert_eq!(Closed.transition(PlayerJoined), None);
    }

    #[test]
    fn apply_leaves_state_untouched_on_rejection() {
        let mut state = GameOver;
        assert!(!state.apply(MoveMade));
        assert_eq!(state, GameOver);
    }

    #[test]
    fn closed_is_terminal() {
        assert!(Closed.is_terminal());
        assert!(!Active.is_terminal());
    }
}
