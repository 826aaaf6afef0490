//! Room service configuration.

use serde::{Deserialize, Serialize};

/// Tunables for the room service, with the documented defaults.
///
/// Game developers (or the process bootstrap in `ttt-server`) can override
/// any of these; nothing here is read from the environment except the
/// listen port, which belongs to `ttt-server` rather than this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomCoreConfig {
    /// Length of a generated room code.
    pub room_code_length: usize,

    /// Alphabet a room code is sampled from — excludes glyphs that are
    /// easy to confuse when read aloud or typed (0/O, 1/I/L).
    pub room_code_alphabet: String,

    /// Seconds a disconnected player has to reconnect before forfeiting.
    pub reconnection_grace_period_seconds: u64,

    /// Seconds the current turn-holder has to move before forfeiting.
    pub turn_timeout_seconds: u64,

    /// Seconds the post-game rematch window stays open.
    pub rematch_window_seconds: u64,

    /// Maximum players a room may hold.
    pub max_players_per_room: usize,

    /// Number of cells on the board.
    pub board_size: usize,

    /// Seconds an empty/under-filled room may sit idle before the sweeper
    /// closes it.
    pub idle_room_timeout_seconds: u64,

    /// Interval between idle-sweep passes.
    pub room_sweep_interval_seconds: u64,

    /// TTL for an optional single-room read cache fronting the registry.
    /// Not wired up by the current registry (see `ttt-room::registry`);
    /// kept here because configuration for it is part of the documented
    /// default set.
    pub room_cache_timeout_hours: u64,

    /// TTL for an optional all-rooms read cache fronting the registry.
    pub all_rooms_cache_timeout_minutes: u64,
}

impl Default for RoomCoreConfig {
    fn default() -> Self {
        Self {
            room_code_length: 6,
            room_code_alphabet: "ABCDEFGHJKMNPQRSTUVWXYZ23456789".to_string(),
            reconnection_grace_period_seconds: 30,
            turn_timeout_seconds: 30,
            rematch_window_seconds: 30,
            max_players_per_room: 2,
            board_size: 9,
            idle_room_timeout_seconds: 300,
            room_sweep_interval_seconds: 60,
            room_cache_timeout_hours: 1,
            all_rooms_cache_timeout_minutes: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_configuration() {
        let config = RoomCoreConfig::default();
        assert_eq!(config.room_code_length, 6);
        assert_eq!(config.room_code_alphabet, "ABCDEFGHJKMNPQRSTUVWXYZ23456789");
        assert_eq!(config.reconnection_grace_period_seconds, 30);
        assert_eq!(config.turn_timeout_seconds, 30);
        assert_eq!(config.rematch_window_seconds, 30);
        assert_eq!(config.max_players_per_room, 2);
        assert_eq!(config.board_size, 9);
        assert_eq!(config.idle_room_timeout_seconds, 300);
        assert_eq!(config.room_sweep_interval_seconds, 60);
    }

    #[test]
    fn alphabet_excludes_ambiguous_glyphs() {
        let config = RoomCoreConfig::default();
        for glyph in ['0', 'O', '1', 'I', 'L'] {
            assert!(
                !config.room_code_alphabet.contains(glyph),
                "alphabet should exclude {glyph}"
            );
        }
    }
}
