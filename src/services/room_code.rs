//! Room code generation and normalization.
//!
//! Codes are 8 characters drawn uniformly from a 34-symbol alphabet: the 26
//! uppercase letters plus the digits 2-9. The digits 0 and 1 are excluded
//! because they read like O, I, or L when typed back from a screen. There is
//! no collision check against existing rooms; at the expected scale the
//! probability over 34^8 codes is accepted as negligible.

use rand::Rng;

/// Fixed length of a room code.
pub const ROOM_CODE_LENGTH: usize = 8;

/// The 34 symbols a room code can contain.
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ23456789";

/// Generate a fresh room code.
pub fn create_room_code() -> String {
    let mut rng = rand::rng();
    (0..ROOM_CODE_LENGTH)
        .map(|_| {
            let index = rng.random_range(0..ROOM_CODE_ALPHABET.len());
            ROOM_CODE_ALPHABET[index] as char
        })
        .collect()
}

/// True iff the code has the right length and every character is in the alphabet.
pub fn is_valid_room_code(code: &str) -> bool {
    code.len() == ROOM_CODE_LENGTH
        && code.bytes().all(|byte| ROOM_CODE_ALPHABET.contains(&byte))
}

/// Normalize a user-typed code: strip surrounding whitespace and upper-case.
///
/// Normalization never validates; feed the result to [`is_valid_room_code`].
pub fn parse_room_code(input: &str) -> String {
    input.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_have_length_and_alphabet() {
        for _ in 0..256 {
            let code = create_room_code();
            assert_eq!(code.len(), ROOM_CODE_LENGTH);
            assert!(is_valid_room_code(&code));
        }
    }

    #[test]
    fn alphabet_has_34_symbols_without_ambiguous_digits() {
        assert_eq!(ROOM_CODE_ALPHABET.len(), 34);
        assert!(!ROOM_CODE_ALPHABET.contains(&b'0'));
        assert!(!ROOM_CODE_ALPHABET.contains(&b'1'));
    }

    #[test]
    fn parse_then_validate_accepts_sloppy_input() {
        for code in ["abcd2345", " ABCD2345 ", "\tAbCd2345\n"] {
            assert!(is_valid_room_code(&parse_room_code(code)), "{code:?}");
        }
    }

    #[test]
    fn validation_rejects_bad_shapes() {
        assert!(!is_valid_room_code("ABCD234")); // too short
        assert!(!is_valid_room_code("ABCD23456")); // too long
        assert!(!is_valid_room_code("ABCD2340")); // digit zero excluded
        assert!(!is_valid_room_code("ABCD2341")); // digit one excluded
        assert!(!is_valid_room_code("abcd2345")); // not normalized
        assert!(!is_valid_room_code("ABCD 345")); // whitespace inside
    }

    #[test]
    fn generated_codes_spread_over_the_alphabet() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..512 {
            for byte in create_room_code().bytes() {
                seen.insert(byte);
            }
        }
        // 4096 draws over 34 symbols should touch most of the alphabet.
        assert!(seen.len() > ROOM_CODE_ALPHABET.len() / 2);
    }
}
