//! Cryptographic primitives for MekVault.
//!
//! Wraps Ed25519 signing, Blake3 content hashing, and password-based
//! key-at-rest encryption (PBKDF2-HMAC-SHA256 + AES-256-GCM) with strong types.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;

use crate::error::{CoreError, Result};

/// Minimum PBKDF2 iteration count accepted when unlocking stored identities.
pub const MIN_KDF_ITERATIONS: u32 = 100_000;

/// Iteration count used when encrypting new identities.
pub const DEFAULT_KDF_ITERATIONS: u32 = 310_000;

/// A 32-byte Blake3 content hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Compute the Blake3 hash of the given data.
    pub fn hash(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::Hex(hex::FromHexError::InvalidStringLength))?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for ContentHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Strategy for hashing item content.
///
/// Version history and change-log hashing go through this seam so embedders
/// can swap the algorithm. A strategy that is not integrity-grade must never
/// be used where tamper evidence matters; callers check the flag.
pub trait HashStrategy: Send + Sync {
    /// Hash content to a hex string.
    fn hash_hex(&self, data: &[u8]) -> String;

    /// Whether this hash is cryptographic (safe for tamper evidence),
    /// as opposed to dedup-only.
    fn integrity_grade(&self) -> bool;
}

/// The default, integrity-grade hash strategy (Blake3).
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Strategy;

impl HashStrategy for Blake3Strategy {
    fn hash_hex(&self, data: &[u8]) -> String {
        ContentHash::hash(data).to_hex()
    }

    fn integrity_grade(&self) -> bool {
        true
    }
}

/// A 32-byte Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ed25519PublicKey(pub [u8; 32]);

impl Ed25519PublicKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::Hex(hex::FromHexError::InvalidStringLength))?;
        Ok(Self(arr))
    }

    /// Verify a signature over a message.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<()> {
        let verifying_key =
            VerifyingKey::from_bytes(&self.0).map_err(|_| CoreError::InvalidPublicKey)?;

        let sig = Signature::from_bytes(&signature.0);

        verifying_key
            .verify(message, &sig)
            .map_err(|_| CoreError::InvalidSignature)
    }
}

impl fmt::Debug for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Pub({})", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for Ed25519PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Ed25519PublicKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Signature(pub [u8; 64]);

// Serde does not derive for arrays longer than 32 elements, so mirror the
// derive semantics (a sequence of bytes) by hand.
impl Serialize for Ed25519Signature {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeTuple;
        let mut tup = serializer.serialize_tuple(64)?;
        for byte in &self.0 {
            tup.serialize_element(byte)?;
        }
        tup.end()
    }
}

impl<'de> Deserialize<'de> for Ed25519Signature {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct SigVisitor;

        impl<'de> serde::de::Visitor<'de> for SigVisitor {
            type Value = Ed25519Signature;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("64 bytes")
            }

            fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                let mut bytes = [0u8; 64];
                for (i, slot) in bytes.iter_mut().enumerate() {
                    *slot = seq
                        .next_element()?
                        .ok_or_else(|| serde::de::Error::invalid_length(i, &self))?;
                }
                Ok(Ed25519Signature(bytes))
            }
        }

        deserializer.deserialize_tuple(64, SigVisitor)
    }
}

impl Ed25519Signature {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| CoreError::Hex(hex::FromHexError::InvalidStringLength))?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Sig({}...)", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for Ed25519Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A keypair for signing bundles and protocol messages.
///
/// This wraps ed25519-dalek's SigningKey.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let signing_key = SigningKey::generate(&mut rng);
        Self { signing_key }
    }

    /// Create from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        Self { signing_key }
    }

    /// Get the public key.
    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        let sig = self.signing_key.sign(message);
        Ed25519Signature(sig.to_bytes())
    }

    /// Get the raw seed bytes (secret key material).
    pub fn seed(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({:?})", self.public_key())
    }
}

/// A secret sealed under a password.
///
/// Stores the KDF parameters alongside the ciphertext so that unlocking
/// needs only the password. The AES-GCM tag authenticates the ciphertext;
/// a wrong password fails decryption rather than producing garbage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    /// PBKDF2 salt (16 bytes).
    pub salt: [u8; 16],
    /// PBKDF2-HMAC-SHA256 iteration count.
    pub iterations: u32,
    /// AES-GCM nonce (12 bytes).
    pub nonce: [u8; 12],
    /// Ciphertext including the 16-byte authentication tag.
    pub ciphertext: Vec<u8>,
}

impl EncryptedSecret {
    /// Seal `plaintext` under `password` with a fresh salt and nonce.
    pub fn seal(password: &str, plaintext: &[u8]) -> Result<Self> {
        Self::seal_with_iterations(password, plaintext, DEFAULT_KDF_ITERATIONS)
    }

    /// Seal with an explicit iteration count (must be >= [`MIN_KDF_ITERATIONS`]).
    pub fn seal_with_iterations(
        password: &str,
        plaintext: &[u8],
        iterations: u32,
    ) -> Result<Self> {
        if iterations < MIN_KDF_ITERATIONS {
            return Err(CoreError::InvalidKdfParams(format!(
                "iteration count {} below minimum {}",
                iterations, MIN_KDF_ITERATIONS
            )));
        }

        let mut rng = rand::thread_rng();
        let mut salt = [0u8; 16];
        rng.fill_bytes(&mut salt);
        let mut nonce = [0u8; 12];
        rng.fill_bytes(&mut nonce);

        let key = derive_key(password, &salt, iterations);
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| CoreError::EncryptionError(e.to_string()))?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| CoreError::EncryptionError(e.to_string()))?;

        Ok(Self {
            salt,
            iterations,
            nonce,
            ciphertext,
        })
    }

    /// Recover the plaintext. Fails on a wrong password or any tampering.
    pub fn open(&self, password: &str) -> Result<Vec<u8>> {
        if self.iterations < MIN_KDF_ITERATIONS {
            return Err(CoreError::InvalidKdfParams(format!(
                "stored iteration count {} below minimum {}",
                self.iterations, MIN_KDF_ITERATIONS
            )));
        }

        let key = derive_key(password, &self.salt, self.iterations);
        let cipher =
            Aes256Gcm::new_from_slice(&key).map_err(|_| CoreError::UnlockFailed)?;
        cipher
            .decrypt(Nonce::from_slice(&self.nonce), self.ciphertext.as_slice())
            .map_err(|_| CoreError::UnlockFailed)
    }
}

/// Derive a 256-bit AES key from a password.
fn derive_key(password: &str, salt: &[u8; 16], iterations: u32) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_sign_verify() {
        let keypair = Keypair::generate();
        let message = b"hello world";
        let signature = keypair.sign(message);

        keypair
            .public_key()
            .verify(message, &signature)
            .expect("valid signature should verify");

        // Tampered message should fail
        let tampered = b"hello worlD";
        assert!(keypair.public_key().verify(tampered, &signature).is_err());
    }

    #[test]
    fn test_keypair_deterministic_from_seed() {
        let seed = [0x42u8; 32];
        let kp1 = Keypair::from_seed(&seed);
        let kp2 = Keypair::from_seed(&seed);
        assert_eq!(kp1.public_key(), kp2.public_key());
    }

    #[test]
    fn test_content_hash() {
        let h1 = ContentHash::hash(b"test data");
        let h2 = ContentHash::hash(b"test data");
        assert_eq!(h1, h2);

        let h3 = ContentHash::hash(b"different data");
        assert_ne!(h1, h3);
    }

    #[test]
    fn test_blake3_strategy_is_integrity_grade() {
        let strategy = Blake3Strategy;
        assert!(strategy.integrity_grade());
        assert_eq!(
            strategy.hash_hex(b"abc"),
            ContentHash::hash(b"abc").to_hex()
        );
    }

    #[test]
    fn test_public_key_hex_roundtrip() {
        let keypair = Keypair::generate();
        let pk = keypair.public_key();
        let recovered = Ed25519PublicKey::from_hex(&pk.to_hex()).unwrap();
        assert_eq!(pk, recovered);
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let secret = b"signing key seed material..";
        let sealed =
            EncryptedSecret::seal_with_iterations("hunter2", secret, MIN_KDF_ITERATIONS)
                .unwrap();
        let opened = sealed.open("hunter2").unwrap();
        assert_eq!(opened, secret);
    }

    #[test]
    fn test_open_wrong_password_fails() {
        let sealed =
            EncryptedSecret::seal_with_iterations("correct", b"seed", MIN_KDF_ITERATIONS)
                .unwrap();
        assert!(matches!(
            sealed.open("incorrect"),
            Err(CoreError::UnlockFailed)
        ));
    }

    #[test]
    fn test_open_corrupted_ciphertext_fails() {
        let mut sealed =
            EncryptedSecret::seal_with_iterations("pw", b"seed", MIN_KDF_ITERATIONS).unwrap();
        sealed.ciphertext[0] ^= 0x01;
        assert!(matches!(sealed.open("pw"), Err(CoreError::UnlockFailed)));
    }

    #[test]
    fn test_seal_rejects_weak_iterations() {
        let result = EncryptedSecret::seal_with_iterations("pw", b"seed", 1_000);
        assert!(matches!(result, Err(CoreError::InvalidKdfParams(_))));
    }
}
