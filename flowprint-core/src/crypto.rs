//! Cryptographic primitives for QUIC Initial decryption.
//!
//! Implements the three operations RFC 9001 needs from us:
//! - HKDF-Extract / HKDF-Expand-Label (HMAC-SHA256 based key schedule)
//! - AES-128-ECB single-block encryption for the header-protection mask
//! - AES-128-GCM authenticated decryption of the packet payload

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey};
use ring::hkdf::{KeyType, Prk, HKDF_SHA256};
use ring::hmac;
use thiserror::Error;

/// AES-128-GCM key size.
pub const AES_KEY_LEN: usize = 16;

/// AEAD IV size.
pub const IV_LEN: usize = 12;

/// Header-protection key size.
pub const HP_KEY_LEN: usize = 16;

/// Header-protection sample size.
pub const HP_SAMPLE_LEN: usize = 16;

/// AEAD authentication tag size.
pub const TAG_LEN: usize = 16;

/// Errors during Initial key derivation or payload decryption.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecryptError {
    #[error("key derivation failed")]
    KeyDerivation,

    #[error("ciphertext too short")]
    CiphertextTooShort,

    #[error("AEAD authentication failed")]
    AeadOpen,
}

/// `initial_secret = HKDF-Extract(salt, ikm)` with HMAC-SHA256.
pub fn hkdf_extract_sha256(salt: &[u8], ikm: &[u8]) -> [u8; 32] {
    let key = hmac::Key::new(hmac::HMAC_SHA256, salt);
    let tag = hmac::sign(&key, ikm);
    let mut out = [0u8; 32];
    out.copy_from_slice(tag.as_ref());
    out
}

/// HKDF-Expand-Label as defined in RFC 8446 Section 7.1.
///
/// The label passed here already carries the `tls13 ` prefix (QUIC uses
/// `tls13 client in`, `tls13 quic key`, `tls13 quic iv`, `tls13 quic hp`).
/// Context is always empty for the Initial secrets.
pub fn hkdf_expand_label(
    secret: &[u8],
    label: &[u8],
    out: &mut [u8],
) -> Result<(), DecryptError> {
    // HkdfLabel encoding: length(2) || label<1..255> || context<0..255>
    let mut hkdf_label = Vec::with_capacity(4 + label.len());
    hkdf_label.push((out.len() >> 8) as u8);
    hkdf_label.push(out.len() as u8);
    hkdf_label.push(label.len() as u8);
    hkdf_label.extend_from_slice(label);
    hkdf_label.push(0); // empty context

    struct ExpandLen(usize);
    impl KeyType for ExpandLen {
        fn len(&self) -> usize {
            self.0
        }
    }

    let prk = Prk::new_less_safe(HKDF_SHA256, secret);
    let info = [hkdf_label.as_slice()];
    let okm = prk
        .expand(&info, ExpandLen(out.len()))
        .map_err(|_| DecryptError::KeyDerivation)?;
    okm.fill(out).map_err(|_| DecryptError::KeyDerivation)?;
    Ok(())
}

/// Encrypt one block with AES-128-ECB; the QUIC header-protection mask is
/// the encryption of a 16-byte ciphertext sample under the hp key.
pub fn aes128_ecb_mask(key: &[u8; HP_KEY_LEN], sample: &[u8; HP_SAMPLE_LEN]) -> [u8; 16] {
    let cipher = Aes128::new(key.into());
    let mut block = *sample;
    cipher.encrypt_block((&mut block).into());
    block
}

/// AES-128-GCM decryption of `ciphertext_and_tag` into `out`.
///
/// Returns the plaintext length on success. Authentication failure (or a
/// ciphertext shorter than the tag) yields an error and writes nothing
/// usable into `out`.
pub fn aes128_gcm_open(
    key: &[u8; AES_KEY_LEN],
    iv: &[u8; IV_LEN],
    aad: &[u8],
    ciphertext_and_tag: &[u8],
    out: &mut [u8],
) -> Result<usize, DecryptError> {
    if ciphertext_and_tag.len() < TAG_LEN || out.len() < ciphertext_and_tag.len() {
        return Err(DecryptError::CiphertextTooShort);
    }

    let unbound =
        UnboundKey::new(&aead::AES_128_GCM, key).map_err(|_| DecryptError::KeyDerivation)?;
    let opener = LessSafeKey::new(unbound);
    let nonce = Nonce::assume_unique_for_key(*iv);

    let in_out = &mut out[..ciphertext_and_tag.len()];
    in_out.copy_from_slice(ciphertext_and_tag);

    let plaintext = opener
        .open_in_place(nonce, Aad::from(aad), in_out)
        .map_err(|_| DecryptError::AeadOpen)?;
    Ok(plaintext.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 9001 Appendix A.1: dcid 0x8394c8f03e515708 with the v1 salt.
    const RFC9001_DCID: [u8; 8] = [0x83, 0x94, 0xc8, 0xf0, 0x3e, 0x51, 0x57, 0x08];
    const V1_SALT: [u8; 20] = [
        0x38, 0x76, 0x2c, 0xf7, 0xf5, 0x59, 0x34, 0xb3, 0x4d, 0x17, 0x9a, 0xe6, 0xa4, 0xc8, 0x0c,
        0xad, 0xcc, 0xbb, 0x7f, 0x0a,
    ];

    fn client_initial_secret() -> [u8; 32] {
        let initial_secret = hkdf_extract_sha256(&V1_SALT, &RFC9001_DCID);
        let mut client = [0u8; 32];
        hkdf_expand_label(&initial_secret, b"tls13 client in", &mut client).unwrap();
        client
    }

    #[test]
    fn test_rfc9001_client_initial_secret() {
        assert_eq!(
            hex::encode(client_initial_secret()),
            "c00cf151ca5be075ed0ebfb5c80323c42d6b7db67881289af4008f1f6c357aea"
        );
    }

    #[test]
    fn test_rfc9001_traffic_keys() {
        let secret = client_initial_secret();

        let mut key = [0u8; AES_KEY_LEN];
        let mut iv = [0u8; IV_LEN];
        let mut hp = [0u8; HP_KEY_LEN];
        hkdf_expand_label(&secret, b"tls13 quic key", &mut key).unwrap();
        hkdf_expand_label(&secret, b"tls13 quic iv", &mut iv).unwrap();
        hkdf_expand_label(&secret, b"tls13 quic hp", &mut hp).unwrap();

        assert_eq!(hex::encode(key), "1f369613dd76d5467730efcbe3b1a22d");
        assert_eq!(hex::encode(iv), "fa044b2f42a3fd3b46fb255c");
        assert_eq!(hex::encode(hp), "9f50449e04a0e810283a1e9933adedd2");
    }

    #[test]
    fn test_ecb_mask_is_deterministic() {
        let key = [0x42u8; 16];
        let sample = [0x17u8; 16];

        let m1 = aes128_ecb_mask(&key, &sample);
        let m2 = aes128_ecb_mask(&key, &sample);
        assert_eq!(m1, m2);
        assert_ne!(m1, sample);
    }

    #[test]
    fn test_gcm_open_rejects_bad_tag() {
        let key = [0u8; 16];
        let iv = [0u8; 12];
        let ciphertext = [0u8; 32]; // bogus tag
        let mut out = [0u8; 32];

        assert_eq!(
            aes128_gcm_open(&key, &iv, b"", &ciphertext, &mut out),
            Err(DecryptError::AeadOpen)
        );
    }

    #[test]
    fn test_gcm_open_rejects_short_input() {
        let key = [0u8; 16];
        let iv = [0u8; 12];
        let mut out = [0u8; 32];

        assert_eq!(
            aes128_gcm_open(&key, &iv, b"", &[0u8; 8], &mut out),
            Err(DecryptError::CiphertextTooShort)
        );
    }
}
