//! Vault identities: keypair ownership, trust, and key-at-rest encryption.
//!
//! A [`VaultIdentity`] holds the decrypted signing key and exists only in
//! memory, owned by the session that unlocked it. The persisted form is
//! [`StoredIdentity`], where the signing seed is sealed under the user's
//! password. There is no way to persist an unencrypted private key.

use serde::{Deserialize, Serialize};

use crate::crypto::{EncryptedSecret, Ed25519Signature, Keypair};
use crate::error::{CoreError, Result};
use crate::friendcode::encode_friend_code;
use crate::types::now_millis;

/// The public, shareable half of an identity.
///
/// This is what gets embedded in bundles and handshakes. Field names follow
/// the bundle file contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicIdentity {
    /// Display name chosen by the user.
    pub display_name: String,
    /// Ed25519 public key, hex-encoded.
    pub public_key: String,
    /// Friend code derived from the public key.
    pub friend_code: String,
    /// Optional avatar reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// An unlocked identity. Never serialized; the signing key lives only here.
#[derive(Clone)]
pub struct VaultIdentity {
    /// Stable identity id (uuid string).
    pub id: String,
    /// Display name chosen by the user.
    pub display_name: String,
    /// The signing keypair.
    pub keypair: Keypair,
    /// Friend code derived from the public key.
    pub friend_code: String,
    /// Creation time (Unix ms).
    pub created_at: i64,
}

impl VaultIdentity {
    /// Create a brand new identity and its encrypted stored form.
    pub fn create(display_name: &str, password: &str) -> Result<(Self, StoredIdentity)> {
        let keypair = Keypair::generate();
        let friend_code = encode_friend_code(&keypair.public_key());
        let created_at = now_millis();
        let id = uuid::Uuid::new_v4().to_string();

        let encrypted_seed = EncryptedSecret::seal(password, &keypair.seed())?;

        let stored = StoredIdentity {
            id: id.clone(),
            display_name: display_name.to_string(),
            public_key: keypair.public_key().to_hex(),
            encrypted_seed,
            created_at,
        };

        let identity = Self {
            id,
            display_name: display_name.to_string(),
            keypair,
            friend_code,
            created_at,
        };

        Ok((identity, stored))
    }

    /// The public, shareable view of this identity.
    pub fn public_identity(&self) -> PublicIdentity {
        PublicIdentity {
            display_name: self.display_name.clone(),
            public_key: self.keypair.public_key().to_hex(),
            friend_code: self.friend_code.clone(),
            avatar: None,
        }
    }

    /// Sign a UTF-8 message (protocol-level signing).
    pub fn sign_message(&self, message: &str) -> Ed25519Signature {
        self.keypair.sign(message.as_bytes())
    }
}

impl std::fmt::Debug for VaultIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultIdentity")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("friend_code", &self.friend_code)
            .finish_non_exhaustive()
    }
}

/// The encrypted, persistable form of an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredIdentity {
    /// Stable identity id (uuid string).
    pub id: String,
    /// Display name chosen by the user.
    pub display_name: String,
    /// Ed25519 public key, hex-encoded.
    pub public_key: String,
    /// Signing seed sealed under the user's password.
    pub encrypted_seed: EncryptedSecret,
    /// Creation time (Unix ms).
    pub created_at: i64,
}

impl StoredIdentity {
    /// Unlock this identity with the user's password.
    ///
    /// Fails with [`CoreError::UnlockFailed`] on a wrong password or any
    /// ciphertext corruption.
    pub fn unlock(&self, password: &str) -> Result<VaultIdentity> {
        let seed_bytes = self.encrypted_seed.open(password)?;
        let seed: [u8; 32] = seed_bytes
            .as_slice()
            .try_into()
            .map_err(|_| CoreError::UnlockFailed)?;
        let keypair = Keypair::from_seed(&seed);

        // The stored public key must match the recovered seed.
        if keypair.public_key().to_hex() != self.public_key {
            return Err(CoreError::UnlockFailed);
        }

        Ok(VaultIdentity {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            friend_code: encode_friend_code(&keypair.public_key()),
            keypair,
            created_at: self.created_at,
        })
    }
}

/// Verify a UTF-8 message signature against a hex-encoded public key.
pub fn verify_message(
    public_key_hex: &str,
    message: &str,
    signature: &Ed25519Signature,
) -> Result<()> {
    let pk = crate::crypto::Ed25519PublicKey::from_hex(public_key_hex)?;
    pk.verify(message.as_bytes(), signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::friendcode::friend_code_matches_public_key;

    #[test]
    fn test_create_and_unlock() {
        let (identity, stored) = VaultIdentity::create("Ace", "swordfish").unwrap();

        let unlocked = stored.unlock("swordfish").unwrap();
        assert_eq!(unlocked.id, identity.id);
        assert_eq!(
            unlocked.keypair.public_key(),
            identity.keypair.public_key()
        );
        assert_eq!(unlocked.friend_code, identity.friend_code);
    }

    #[test]
    fn test_unlock_wrong_password() {
        let (_, stored) = VaultIdentity::create("Ace", "swordfish").unwrap();
        assert!(matches!(
            stored.unlock("sw0rdfish"),
            Err(CoreError::UnlockFailed)
        ));
    }

    #[test]
    fn test_friend_code_matches_own_key() {
        let (identity, _) = VaultIdentity::create("Ace", "pw-not-checked-here").unwrap();
        assert!(friend_code_matches_public_key(
            &identity.friend_code,
            &identity.keypair.public_key()
        ));
    }

    #[test]
    fn test_sign_and_verify_message() {
        let (identity, _) = VaultIdentity::create("Ace", "pw").unwrap();
        let public = identity.public_identity();

        let sig = identity.sign_message("sync-handshake-v1");
        verify_message(&public.public_key, "sync-handshake-v1", &sig).unwrap();
        assert!(verify_message(&public.public_key, "sync-handshake-v2", &sig).is_err());
    }

    #[test]
    fn test_stored_identity_json_roundtrip() {
        let (_, stored) = VaultIdentity::create("Ace", "pw").unwrap();
        let json = serde_json::to_string(&stored).unwrap();
        let back: StoredIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stored);
        assert!(back.unlock("pw").is_ok());
    }
}
