//! Room code generator (C4).

use rand::Rng;
use ttt_protocol::RoomCode;

/// Uniformly samples `length` characters from `alphabet`.
///
/// Panics if `alphabet` is empty — that's a configuration error, not a
/// runtime condition callers should be expected to handle.
pub fn generate_code(rng: &mut impl Rng, alphabet: &str, length: usize) -> RoomCode {
    let glyphs: Vec<char> = alphabet.chars().collect();
    assert!(!glyphs.is_empty(), "room code alphabet must not be empty");

    let code: String = (0..length)
        .map(|_| glyphs[rng.random_range(0..glyphs.len())])
        .collect();
    RoomCode::new_unchecked(code)
}

/// Generates codes until `exists` reports one that isn't already taken.
/// There is no retry cap — collision probability at expected occupancy is
/// negligible, and an unbounded alphabet/length combination makes a cap
/// meaningless anyway.
pub fn generate_unique_code(
    rng: &mut impl Rng,
    alphabet: &str,
    length: usize,
    exists: impl Fn(&RoomCode) -> bool,
) -> RoomCode {
    loop {
        let candidate = generate_code(rng, alphabet, length);
        if !exists(&candidate) {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_code_has_the_requested_length_and_alphabet() {
        let mut rng = rand::rng();
        let alphabet = "ABCDEFGHJKMNPQRSTUVWXYZ23456789";
        let code = generate_code(&mut rng, alphabet, 6);
        assert_eq!(code.as_str().len(), 6);
        assert!(code.as_str().chars().all(|c| alphabet.contains(c)));
    }

    #[test]
    fn generate_unique_code_skips_taken_codes() {
        let mut rng = rand::rng();
        let taken: HashSet<String> = ["AAAAAA".to_string()].into_iter().collect();
        for _ in 0..50 {
            let code = generate_unique_code(&mut rng, "AB", 6, |c| taken.contains(c.as_str()));
            assert_ne!(code.as_str(), "AAAAAA");
        }
    }
}
