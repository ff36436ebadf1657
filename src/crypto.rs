use crate::config::KdfParams;
use anyhow::anyhow;
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{Engine as _, engine::general_purpose};
use chacha20poly1305::{
    KeyInit, XChaCha20Poly1305, XNonce,
    aead::{Aead, AeadCore, OsRng},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("decryption failed")]
    DecryptionFailed,
}

/// At-rest encryption of stored secret material (XChaCha20-Poly1305,
/// key derived from a passphrase with Argon2id). Column values are
/// stored as "nonce_b64:ciphertext_b64".
pub struct SecrecyGateway {
    key: [u8; 32],
}

impl SecrecyGateway {
    pub fn from_passphrase(passphrase: &str, kdf: &KdfParams) -> anyhow::Result<Self> {
        Ok(Self {
            key: derive_key(passphrase, kdf)?,
        })
    }

    pub fn encrypt(&self, plaintext: &str) -> anyhow::Result<String> {
        let key = chacha20poly1305::Key::from_slice(&self.key);
        let cipher = XChaCha20Poly1305::new(key);

        // XChaCha20 uses a 24-byte nonce
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| anyhow!("encrypt error: {e}"))?;

        Ok(format!(
            "{}:{}",
            general_purpose::STANDARD.encode(nonce),
            general_purpose::STANDARD.encode(&ciphertext)
        ))
    }

    pub fn decrypt(&self, stored: &str) -> Result<String, CryptoError> {
        let (nonce_b64, ct_b64) = stored
            .split_once(':')
            .ok_or(CryptoError::DecryptionFailed)?;

        let nonce_bytes = general_purpose::STANDARD
            .decode(nonce_b64)
            .map_err(|_| CryptoError::DecryptionFailed)?;
        if nonce_bytes.len() != 24 {
            return Err(CryptoError::DecryptionFailed);
        }
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ciphertext = general_purpose::STANDARD
            .decode(ct_b64)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        let key = chacha20poly1305::Key::from_slice(&self.key);
        let cipher = XChaCha20Poly1305::new(key);
        let plaintext = cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|_| CryptoError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
    }
}

/// Argon2id key derivation from the passphrase and configured KDF params.
fn derive_key(passphrase: &str, kdf: &KdfParams) -> anyhow::Result<[u8; 32]> {
    let salt_bytes = general_purpose::STANDARD.decode(&kdf.salt)?;

    let params = Params::new(
        kdf.memory_mib * 1024, // m_cost in KiB
        kdf.iterations,
        kdf.parallelism,
        Some(32),
    )
    .map_err(|e| anyhow!("argon2 params error: {e}"))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut out = [0u8; 32];
    argon2
        .hash_password_into(passphrase.as_bytes(), &salt_bytes, &mut out)
        .map_err(|e| anyhow!("argon2 error: {e}"))?;

    Ok(out)
}
