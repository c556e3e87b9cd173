//! Friend codes: human-shareable public key fingerprints.
//!
//! A friend code is the first 10 bytes (80 bits) of an Ed25519 public key,
//! re-expressed as 16 symbols from a 32-symbol alphabet and grouped in fours:
//! `XXXX-XXXX-XXXX-XXXX`. It is a fingerprint, not a credential: matching a
//! friend code proves "this is the peer I previously verified out-of-band",
//! nothing more.

use crate::crypto::Ed25519PublicKey;
use crate::error::{CoreError, Result};

/// 32-symbol alphabet without the ambiguous glyphs I, O, 0, 1.
const ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Number of public-key bytes a friend code covers.
pub const FRIEND_CODE_PREFIX_LEN: usize = 10;

/// Symbols in a friend code, excluding dashes.
const CODE_SYMBOLS: usize = 16;

/// Encode a public key's 80-bit prefix as a friend code.
pub fn encode_friend_code(public_key: &Ed25519PublicKey) -> String {
    let prefix = &public_key.as_bytes()[..FRIEND_CODE_PREFIX_LEN];

    // 10 bytes as a big-endian 80-bit integer.
    let mut value: u128 = 0;
    for &b in prefix {
        value = (value << 8) | b as u128;
    }

    let mut out = String::with_capacity(CODE_SYMBOLS + 3);
    for i in 0..CODE_SYMBOLS {
        if i > 0 && i % 4 == 0 {
            out.push('-');
        }
        let shift = 5 * (CODE_SYMBOLS - 1 - i);
        let idx = ((value >> shift) & 0x1f) as usize;
        out.push(ALPHABET[idx] as char);
    }
    out
}

/// Decode a friend code back to the 10-byte public key prefix.
///
/// Accepts lowercase input and ignores dashes and whitespace. This is the
/// exact inverse of [`encode_friend_code`].
pub fn decode_friend_code(code: &str) -> Result<[u8; FRIEND_CODE_PREFIX_LEN]> {
    let mut value: u128 = 0;
    let mut symbols = 0usize;

    for ch in code.chars() {
        if ch == '-' || ch.is_whitespace() {
            continue;
        }
        let upper = ch.to_ascii_uppercase();
        let idx = ALPHABET
            .iter()
            .position(|&a| a as char == upper)
            .ok_or_else(|| {
                CoreError::InvalidFriendCode(format!("illegal symbol '{}'", ch))
            })?;
        symbols += 1;
        if symbols > CODE_SYMBOLS {
            return Err(CoreError::InvalidFriendCode("too many symbols".into()));
        }
        value = (value << 5) | idx as u128;
    }

    if symbols != CODE_SYMBOLS {
        return Err(CoreError::InvalidFriendCode(format!(
            "expected {} symbols, got {}",
            CODE_SYMBOLS, symbols
        )));
    }

    let mut prefix = [0u8; FRIEND_CODE_PREFIX_LEN];
    for (i, byte) in prefix.iter_mut().enumerate() {
        let shift = 8 * (FRIEND_CODE_PREFIX_LEN - 1 - i);
        *byte = ((value >> shift) & 0xff) as u8;
    }
    Ok(prefix)
}

/// Check whether a friend code matches a public key's prefix.
pub fn friend_code_matches_public_key(code: &str, public_key: &Ed25519PublicKey) -> bool {
    match decode_friend_code(code) {
        Ok(prefix) => prefix == public_key.as_bytes()[..FRIEND_CODE_PREFIX_LEN],
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use proptest::prelude::*;

    #[test]
    fn test_encode_shape() {
        let pk = Ed25519PublicKey::from_bytes([0xab; 32]);
        let code = encode_friend_code(&pk);
        assert_eq!(code.len(), 19);
        let groups: Vec<&str> = code.split('-').collect();
        assert_eq!(groups.len(), 4);
        assert!(groups.iter().all(|g| g.len() == 4));
    }

    #[test]
    fn test_decode_is_inverse() {
        let keypair = Keypair::generate();
        let pk = keypair.public_key();
        let code = encode_friend_code(&pk);
        let prefix = decode_friend_code(&code).unwrap();
        assert_eq!(prefix, pk.as_bytes()[..FRIEND_CODE_PREFIX_LEN]);
    }

    #[test]
    fn test_decode_accepts_lowercase_and_spacing() {
        let pk = Ed25519PublicKey::from_bytes([0x5a; 32]);
        let code = encode_friend_code(&pk).to_ascii_lowercase().replace('-', " ");
        let prefix = decode_friend_code(&code).unwrap();
        assert_eq!(prefix, pk.as_bytes()[..FRIEND_CODE_PREFIX_LEN]);
    }

    #[test]
    fn test_decode_rejects_illegal_symbols() {
        // O and 1 are not in the alphabet
        assert!(decode_friend_code("OOOO-1111-AAAA-BBBB").is_err());
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert!(decode_friend_code("AAAA-BBBB").is_err());
        assert!(decode_friend_code("AAAA-BBBB-CCCC-DDDD-EEEE").is_err());
    }

    #[test]
    fn test_matches_public_key() {
        let keypair = Keypair::generate();
        let other = Keypair::generate();
        let code = encode_friend_code(&keypair.public_key());

        assert!(friend_code_matches_public_key(&code, &keypair.public_key()));
        assert!(!friend_code_matches_public_key(&code, &other.public_key()));
        assert!(!friend_code_matches_public_key("not a code", &keypair.public_key()));
    }

    proptest! {
        #[test]
        fn prop_roundtrip_prefix(bytes in proptest::array::uniform32(any::<u8>())) {
            let pk = Ed25519PublicKey::from_bytes(bytes);
            let code = encode_friend_code(&pk);
            let prefix = decode_friend_code(&code).unwrap();
            prop_assert_eq!(&prefix[..], &bytes[..FRIEND_CODE_PREFIX_LEN]);
        }
    }
}
