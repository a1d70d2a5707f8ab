use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::{AppError, AppResult};

const NONCE_LEN: usize = 12;

/// Authenticated encryption for message bodies at rest.
///
/// Stored blobs are `nonce || ciphertext`; the nonce is freshly generated per
/// message. The key is process-wide and read-only after initialization.
#[derive(Clone)]
pub struct MessageCipher {
    cipher: Aes256Gcm,
}

impl MessageCipher {
    /// Build a cipher from a base64-encoded 32-byte key.
    pub fn from_base64_key(key_base64: &str) -> Result<Self, AppError> {
        let key_bytes = BASE64
            .decode(key_base64)
            .map_err(|_| AppError::Config("MESSAGE_ENCRYPTION_KEY is not valid base64".into()))?;
        let cipher = Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|_| AppError::Config("MESSAGE_ENCRYPTION_KEY must decode to 32 bytes".into()))?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> AppResult<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| AppError::Crypto("message encryption failed".into()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(nonce.as_slice());
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    pub fn decrypt(&self, blob: &[u8]) -> AppResult<String> {
        if blob.len() < NONCE_LEN {
            return Err(AppError::Crypto("stored message blob is truncated".into()));
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| AppError::Crypto("message decryption failed".into()))?;
        String::from_utf8(plaintext)
            .map_err(|_| AppError::Crypto("decrypted message is not UTF-8".into()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_cipher() -> MessageCipher {
        MessageCipher::from_base64_key(&BASE64.encode([7u8; 32])).unwrap()
    }

    #[test]
    fn round_trips_message_content() {
        let cipher = test_cipher();
        let blob = cipher.encrypt(r#"{"a":1}"#).unwrap();
        assert_ne!(blob, br#"{"a":1}"#.to_vec());
        assert_eq!(cipher.decrypt(&blob).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn fresh_nonce_per_message() {
        let cipher = test_cipher();
        let a = cipher.encrypt("same").unwrap();
        let b = cipher.encrypt("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        let cipher = test_cipher();
        let mut blob = cipher.encrypt("<xml/>").unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        assert!(cipher.decrypt(&blob).is_err());
    }

    #[test]
    fn rejects_wrong_key() {
        let blob = test_cipher().encrypt("secret").unwrap();
        let other = MessageCipher::from_base64_key(&BASE64.encode([9u8; 32])).unwrap();
        assert!(other.decrypt(&blob).is_err());
    }

    #[test]
    fn rejects_truncated_blob() {
        let cipher = test_cipher();
        assert!(cipher.decrypt(&[1, 2, 3]).is_err());
    }

    #[test]
    fn rejects_bad_key_material() {
        assert!(MessageCipher::from_base64_key("not base64!").is_err());
        assert!(MessageCipher::from_base64_key(&BASE64.encode([1u8; 16])).is_err());
    }
}
