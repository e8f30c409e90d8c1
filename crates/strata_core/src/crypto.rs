//! Body encryption, content addressing and owner signatures.
//!
//! Bodies are sealed with XChaCha20-Poly1305. The random 24-byte nonce is
//! prepended to the ciphertext.

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use thiserror::Error;

use crate::address::Address;
use crate::hashes::BlobHash;

const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed, data may be corrupted or the key is wrong")]
    DecryptionFailed,

    #[error("Invalid ciphertext format")]
    InvalidFormat,

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid signature")]
    InvalidSignature,
}

/// Symmetric key used to seal file bodies.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn generate() -> Self {
        Self(XChaCha20Poly1305::generate_key(&mut OsRng).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Encrypt `plaintext`. Output is `nonce || ciphertext || tag`.
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypt a body produced by [`encrypt`].
pub fn decrypt(key: &EncryptionKey, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let nonce = XNonce::from_slice(&sealed[..NONCE_LEN]);
    cipher
        .decrypt(nonce, &sealed[NONCE_LEN..])
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Content address of a plaintext body, salted with the owner's address so
/// identical files from different owners do not collide.
pub fn content_hash(body: &[u8], owner: &Address) -> BlobHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(body);
    hasher.update(owner.as_str().as_bytes());
    hasher.finalize().into()
}

/// Hex-encoded ed25519 signature over `data`.
pub fn sign(key: &SigningKey, data: &[u8]) -> String {
    hex::encode(key.sign(data).to_bytes())
}

/// Hex form of a verifying key, used as the owner key and node address.
pub fn public_key_hex(key: &SigningKey) -> String {
    hex::encode(key.verifying_key().to_bytes())
}

/// Check a hex signature against a hex-encoded verifying key.
pub fn verify(owner_key: &str, data: &[u8], signature: &str) -> Result<(), CryptoError> {
    let key_bytes: [u8; 32] = hex::decode(owner_key)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("expected 32 bytes".to_string()))?;
    let key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

    let signature_bytes: [u8; 64] = hex::decode(signature)
        .map_err(|_| CryptoError::InvalidSignature)?
        .try_into()
        .map_err(|_| CryptoError::InvalidSignature)?;
    let signature = Signature::from_bytes(&signature_bytes);

    key.verify(data, &signature)
        .map_err(|_| CryptoError::InvalidSignature)
}

/// Cheap shape check used before a body is available to verify against.
pub fn is_well_formed_signature(signature: &str) -> bool {
    signature.len() == 128 && signature.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng as RandOsRng;

    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = EncryptionKey::generate();
        let plaintext = b"replicated across ten hosters";

        let sealed = encrypt(&key, plaintext).unwrap();
        assert_ne!(&sealed[NONCE_LEN..], plaintext.as_slice());
        assert_eq!(decrypt(&key, &sealed).unwrap(), plaintext);
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let sealed = encrypt(&EncryptionKey::generate(), b"secret").unwrap();
        assert!(matches!(
            decrypt(&EncryptionKey::generate(), &sealed),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_decrypt_short_input_is_invalid_format() {
        let key = EncryptionKey::generate();
        assert!(matches!(
            decrypt(&key, &[0u8; 10]),
            Err(CryptoError::InvalidFormat)
        ));
    }

    #[test]
    fn test_content_hash_is_salted_by_owner() {
        let body = b"same bytes";
        let a = content_hash(body, &Address::new("alice"));
        let b = content_hash(body, &Address::new("bob"));
        assert_ne!(a, b);
        assert_eq!(a, content_hash(body, &Address::new("ALICE")));
    }

    #[test]
    fn test_sign_and_verify() {
        let key = SigningKey::generate(&mut RandOsRng);
        let owner = public_key_hex(&key);
        let signature = sign(&key, b"body");

        assert!(is_well_formed_signature(&signature));
        assert!(verify(&owner, b"body", &signature).is_ok());
        assert!(matches!(
            verify(&owner, b"other body", &signature),
            Err(CryptoError::InvalidSignature)
        ));
        assert!(matches!(
            verify("zz", b"body", &signature),
            Err(CryptoError::InvalidKey(_))
        ));
    }
}
