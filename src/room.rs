use crate::models::{ParticipantId, RoomId};
use rand::seq::SliceRandom;
use rand::thread_rng;
use thiserror::Error;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Shortest room code accepted when joining by hand.
pub const MIN_ROOM_CODE_LEN: usize = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    #[error("room code must be at least {min} characters, got {got}")]
    TooShort { min: usize, got: usize },
}

fn random_base36(len: usize) -> String {
    let mut rng = thread_rng();
    (0..len)
        .filter_map(|_| BASE36.choose(&mut rng))
        .map(|&b| b as char)
        .collect()
}

/// Per-session participant id, e.g. `user_k3x9a`.
pub fn generate_participant_id() -> ParticipantId {
    format!("user_{}", random_base36(5))
}

/// `PRO_` followed by the last three characters of the id, upper-cased.
pub fn default_display_name(id: &str) -> String {
    let chars: Vec<char> = id.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(3)..].iter().collect();
    format!("PRO_{}", tail.to_uppercase())
}

pub fn create_room_code() -> RoomId {
    random_base36(6).to_uppercase()
}

/// Code for a table nobody else is expected to join, e.g. `SOLO-4FZ1`.
pub fn solo_room_code() -> RoomId {
    format!("SOLO-{}", random_base36(4).to_uppercase())
}

/// Normalizes a code typed by the user. No format rules beyond the length.
pub fn parse_room_code(input: &str) -> Result<RoomId, RoomError> {
    let code = input.trim().to_uppercase();
    let got = code.chars().count();
    if got < MIN_ROOM_CODE_LEN {
        return Err(RoomError::TooShort { min: MIN_ROOM_CODE_LEN, got });
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_ids_have_expected_shape() {
        let id = generate_participant_id();
        assert_eq!(id.len(), 10);
        assert!(id.starts_with("user_"));
        assert!(id[5..].bytes().all(|b| BASE36.contains(&b)));
    }

    #[test]
    fn default_name_uses_id_tail() {
        assert_eq!(default_display_name("user_k3x9a"), "PRO_X9A");
        assert_eq!(default_display_name("ab"), "PRO_AB");
    }

    #[test]
    fn room_codes() {
        let code = create_room_code();
        assert_eq!(code.len(), 6);
        assert_eq!(code, code.to_uppercase());

        let solo = solo_room_code();
        assert!(solo.starts_with("SOLO-"));
        assert_eq!(solo.len(), 9);
    }

    #[test]
    fn joining_requires_three_characters() {
        assert_eq!(parse_room_code(" ab "), Err(RoomError::TooShort { min: 3, got: 2 }));
        assert_eq!(parse_room_code("abc"), Ok("ABC".to_string()));
    }
}
