//! Cryptographic primitives backing the miIO wire format.
//!
//! The protocol predates modern AEAD constructions: integrity comes from an
//! MD5 digest computed with the shared token substituted into the checksum
//! field, and confidentiality from AES-128-CBC with PKCS#7 padding. Both are
//! fixed by the device firmware and are not negotiable.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use md5::{Digest, Md5};

use crate::config::TOKEN_SIZE;
use crate::error::{ProtocolError, Result};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// Returns the MD5 digest of `data` (16 bytes).
pub fn digest(data: &[u8]) -> [u8; TOKEN_SIZE] {
    let mut hasher = Md5::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Encrypts `plaintext` with AES-128-CBC/PKCS#7 under the given key and IV.
pub fn encrypt(key: &[u8; TOKEN_SIZE], iv: &[u8; TOKEN_SIZE], plaintext: &[u8]) -> Vec<u8> {
    Aes128CbcEnc::new(key.into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Decrypts AES-128-CBC/PKCS#7 ciphertext under the given key and IV.
///
/// # Errors
/// Returns `ProtocolError::DecryptionFailure` when the ciphertext is not a
/// whole number of blocks or the padding is invalid.
pub fn decrypt(key: &[u8; TOKEN_SIZE], iv: &[u8; TOKEN_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>> {
    Aes128CbcDec::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| ProtocolError::DecryptionFailure)
}
