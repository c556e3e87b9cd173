//! Share token generation and URL handling.
//!
//! Tokens are 24 cryptographically random bytes, base64url-encoded without
//! padding. Encoding whole random bytes avoids the modulo bias that
//! alphabet-indexing schemes introduce.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

/// Raw entropy per token, before encoding.
pub const TOKEN_BYTES: usize = 24;

/// Minimum length for a string to be accepted as a bare token.
pub const MIN_TOKEN_LEN: usize = 20;

/// Custom URL scheme used in share links.
pub const SHARE_SCHEME: &str = "mekstation";

/// Generate a new share token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Build the custom-scheme share URL for a token.
pub fn share_url(token: &str) -> String {
    format!("{}://share/{}", SHARE_SCHEME, token)
}

/// Extract a token from any of the accepted link forms.
///
/// Accepts `mekstation://share/{token}`, absolute web URLs whose path ends
/// in `/share/{token}`, a path-only `/share/{token}`, and a bare token of
/// at least [`MIN_TOKEN_LEN`] base64url characters. Returns `None` for
/// anything else.
pub fn extract_token(input: &str) -> Option<String> {
    let input = input.trim();

    // scheme://share/{token} or https://host/…/share/{token} or /share/{token}
    if let Some(idx) = input.rfind("share/") {
        let candidate = &input[idx + "share/".len()..];
        let candidate = candidate.split(['?', '#']).next().unwrap_or("");
        if is_token(candidate) {
            return Some(candidate.to_string());
        }
        return None;
    }

    // Bare token
    if is_token(input) {
        return Some(input.to_string());
    }
    None
}

/// Whether a string looks like a valid token: long enough and entirely in
/// the base64url alphabet.
fn is_token(s: &str) -> bool {
    s.len() >= MIN_TOKEN_LEN
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_token_shape() {
        let token = generate_token();
        // 24 bytes -> 32 base64url chars, no padding
        assert_eq!(token.len(), 32);
        assert!(!token.contains('='));
        assert!(is_token(&token));
    }

    #[test]
    fn test_tokens_are_unique() {
        let tokens: HashSet<String> = (0..100).map(|_| generate_token()).collect();
        assert_eq!(tokens.len(), 100);
    }

    #[test]
    fn test_extract_from_custom_scheme() {
        let token = generate_token();
        let url = share_url(&token);
        assert_eq!(extract_token(&url), Some(token));
    }

    #[test]
    fn test_extract_from_web_url() {
        let token = generate_token();
        let url = format!("https://mekstation.example/app/share/{}", token);
        assert_eq!(extract_token(&url), Some(token.clone()));

        let with_query = format!("https://mekstation.example/share/{}?ref=qr", token);
        assert_eq!(extract_token(&with_query), Some(token));
    }

    #[test]
    fn test_extract_from_path() {
        let token = generate_token();
        let path = format!("/share/{}", token);
        assert_eq!(extract_token(&path), Some(token));
    }

    #[test]
    fn test_extract_bare_token() {
        let token = generate_token();
        assert_eq!(extract_token(&token), Some(token.clone()));
        assert_eq!(extract_token(&format!("  {}  ", token)), Some(token));
    }

    #[test]
    fn test_extract_rejects_garbage() {
        assert_eq!(extract_token(""), None);
        assert_eq!(extract_token("short"), None);
        assert_eq!(extract_token("/share/short"), None);
        assert_eq!(extract_token("not a token at all because spaces"), None);
        assert_eq!(extract_token("has+plus+which+is+not+urlsafe+base64"), None);
    }

    proptest::proptest! {
        /// Any token built from raw entropy survives every accepted link form.
        #[test]
        fn prop_extract_inverts_every_link_form(bytes in proptest::prelude::any::<[u8; TOKEN_BYTES]>()) {
            let token = URL_SAFE_NO_PAD.encode(bytes);
            let forms = [
                share_url(&token),
                format!("https://mekstation.example/app/share/{}", token),
                format!("/share/{}", token),
                token.clone(),
            ];
            for form in forms {
                let extracted = extract_token(&form);
                proptest::prop_assert_eq!(extracted.as_deref(), Some(token.as_str()));
            }
        }
    }
}
