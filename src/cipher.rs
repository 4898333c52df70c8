#![forbid(unsafe_code)]

//! `CipherContext`: key/nonce-driven AEAD encrypt/decrypt with associated data.
//!
//! Grounded on `nyx-crypto`'s `aead.rs` (the `AeadSuite`/`AeadKey`/`AeadNonce` split and
//! the `ChaCha20Poly1305`/`NewAead` API shape) and `keystore.rs` (the `Aes256Gcm`/`KeyInit`
//! API shape, a different major version of the `aead` crate family coexisting in the same
//! workspace — kept here for the same reason).

use crate::error::{Error, Result};
use aes_gcm::aead::{Aead as Aes_Aead, KeyInit as Aes_KeyInit};
use aes_gcm::{Aes256Gcm, Key as AesKey, Nonce as AesNonce};
use chacha20poly1305::aead::{Aead as ChaCha_Aead, NewAead as ChaCha_NewAead, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key as ChaChaKey, Nonce as ChaChaNonce};
use zeroize::Zeroize;

/// Reserved nonce value the Noise specification forbids ever using.
pub const FORBIDDEN_NONCE: u64 = 0xFFFF_FFFF_FFFF_FFFF;

/// Identifies an AEAD algorithm by its Noise protocol-name token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherId {
    ChaChaPoly,
    Aesgcm,
}

impl CipherId {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "ChaChaPoly" => Ok(CipherId::ChaChaPoly),
            "AESGCM" => Ok(CipherId::Aesgcm),
            other => Err(Error::UnknownName(format!("cipher: {other}"))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CipherId::ChaChaPoly => "ChaChaPoly",
            CipherId::Aesgcm => "AESGCM",
        }
    }

    pub fn key_len(self) -> usize {
        32
    }

    pub fn mac_len(self) -> usize {
        16
    }
}

/// 32-byte AEAD key, zeroized on drop.
#[derive(Clone)]
struct CipherKey([u8; 32]);

impl Drop for CipherKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// A single AEAD cipher slot: algorithm id, optional key, and a 64-bit nonce counter.
///
/// Nonce handling matches §6: the counter starts at 0 whenever a key is installed and
/// is never allowed to reach [`FORBIDDEN_NONCE`].
pub struct CipherContext {
    id: CipherId,
    key: Option<CipherKey>,
    nonce: u64,
}

impl CipherContext {
    pub fn new(id: CipherId) -> Self {
        Self {
            id,
            key: None,
            nonce: 0,
        }
    }

    pub fn id(&self) -> CipherId {
        self.id
    }

    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn key_len(&self) -> usize {
        self.id.key_len()
    }

    pub fn mac_len(&self) -> usize {
        self.id.mac_len()
    }

    /// Fresh, unkeyed context for the same algorithm (used by `split`).
    pub fn clone_algo(&self) -> CipherContext {
        CipherContext::new(self.id)
    }

    pub fn install_key(&mut self, key: &[u8]) -> Result<()> {
        if key.len() != self.key_len() {
            return Err(Error::InvalidLength(format!(
                "cipher key: expected {} bytes, got {}",
                self.key_len(),
                key.len()
            )));
        }
        let mut buf = [0u8; 32];
        buf.copy_from_slice(key);
        self.key = Some(CipherKey(buf));
        buf.zeroize();
        self.nonce = 0;
        Ok(())
    }

    fn next_nonce(&mut self) -> Result<u64> {
        if self.nonce == FORBIDDEN_NONCE {
            return Err(Error::InvalidState("aead nonce exhausted".into()));
        }
        let n = self.nonce;
        self.nonce += 1;
        Ok(n)
    }

    /// Noise's canonical AEAD nonce format is algorithm-specific: a little-endian
    /// counter in the low 8 bytes for ChaCha20-Poly1305, a big-endian counter in the
    /// high 8 bytes for AES-GCM.
    fn nonce_bytes(&self, n: u64) -> [u8; 12] {
        let mut out = [0u8; 12];
        match self.id {
            CipherId::ChaChaPoly => out[4..].copy_from_slice(&n.to_le_bytes()),
            CipherId::Aesgcm => out[4..].copy_from_slice(&n.to_be_bytes()),
        }
        out
    }

    /// Appends `mac_len` bytes of tag to `buf` in place, using the current nonce and
    /// then advancing it.
    pub fn encrypt(&mut self, ad: &[u8], buf: &mut Vec<u8>) -> Result<()> {
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| Error::InvalidState("encrypt: no key installed".into()))?
            .clone();
        let n = self.next_nonce()?;
        let nonce_bytes = self.nonce_bytes(n);
        let ciphertext = match self.id {
            CipherId::ChaChaPoly => {
                let cipher = ChaCha20Poly1305::new(ChaChaKey::from_slice(&key.0));
                let nonce = ChaChaNonce::from_slice(&nonce_bytes);
                cipher
                    .encrypt(nonce, Payload { msg: buf, aad: ad })
                    .map_err(|_| Error::MacFailure)?
            }
            CipherId::Aesgcm => {
                let cipher = Aes256Gcm::new(AesKey::<Aes256Gcm>::from_slice(&key.0));
                let nonce = AesNonce::from_slice(&nonce_bytes);
                let payload = aes_gcm::aead::Payload { msg: buf, aad: ad };
                cipher.encrypt(nonce, payload).map_err(|_| Error::MacFailure)?
            }
        };
        *buf = ciphertext;
        Ok(())
    }

    /// Strips and verifies `mac_len` bytes of tag from `buf` in place, failing with
    /// [`Error::MacFailure`] on authentication failure.
    pub fn decrypt(&mut self, ad: &[u8], buf: &mut Vec<u8>) -> Result<()> {
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| Error::InvalidState("decrypt: no key installed".into()))?
            .clone();
        if buf.len() < self.mac_len() {
            return Err(Error::InvalidLength("ciphertext shorter than mac".into()));
        }
        let n = self.next_nonce()?;
        let nonce_bytes = self.nonce_bytes(n);
        let plaintext = match self.id {
            CipherId::ChaChaPoly => {
                let cipher = ChaCha20Poly1305::new(ChaChaKey::from_slice(&key.0));
                let nonce = ChaChaNonce::from_slice(&nonce_bytes);
                cipher
                    .decrypt(nonce, Payload { msg: buf, aad: ad })
                    .map_err(|_| Error::MacFailure)?
            }
            CipherId::Aesgcm => {
                let cipher = Aes256Gcm::new(AesKey::<Aes256Gcm>::from_slice(&key.0));
                let nonce = AesNonce::from_slice(&nonce_bytes);
                let payload = aes_gcm::aead::Payload { msg: buf, aad: ad };
                cipher.decrypt(nonce, payload).map_err(|_| Error::MacFailure)?
            }
        };
        *buf = plaintext;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn chachapoly_roundtrip() {
        let mut c = CipherContext::new(CipherId::ChaChaPoly);
        c.install_key(&[7u8; 32]).unwrap();
        let mut buf = b"hello noise".to_vec();
        c.encrypt(b"ad", &mut buf).unwrap();
        let mut d = CipherContext::new(CipherId::ChaChaPoly);
        d.install_key(&[7u8; 32]).unwrap();
        d.decrypt(b"ad", &mut buf).unwrap();
        assert_eq!(buf, b"hello noise");
    }

    #[test]
    fn aesgcm_roundtrip() {
        let mut c = CipherContext::new(CipherId::Aesgcm);
        c.install_key(&[3u8; 32]).unwrap();
        let mut buf = b"hello aes".to_vec();
        c.encrypt(b"ad", &mut buf).unwrap();
        let mut d = CipherContext::new(CipherId::Aesgcm);
        d.install_key(&[3u8; 32]).unwrap();
        d.decrypt(b"ad", &mut buf).unwrap();
        assert_eq!(buf, b"hello aes");
    }

    #[test]
    fn wrong_aad_fails_mac() {
        let mut c = CipherContext::new(CipherId::ChaChaPoly);
        c.install_key(&[1u8; 32]).unwrap();
        let mut buf = b"msg".to_vec();
        c.encrypt(b"A", &mut buf).unwrap();
        let mut d = CipherContext::new(CipherId::ChaChaPoly);
        d.install_key(&[1u8; 32]).unwrap();
        assert!(matches!(d.decrypt(b"B", &mut buf), Err(Error::MacFailure)));
    }

    #[test]
    fn encrypt_without_key_is_invalid_state() {
        let mut c = CipherContext::new(CipherId::ChaChaPoly);
        let mut buf = b"msg".to_vec();
        assert!(matches!(
            c.encrypt(b"ad", &mut buf),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn nonce_byte_order_differs_between_chachapoly_and_aesgcm() {
        let chacha = CipherContext::new(CipherId::ChaChaPoly);
        let aes = CipherContext::new(CipherId::Aesgcm);
        let n = 0x0102_0304_0506_0708u64;
        assert_eq!(&chacha.nonce_bytes(n)[4..], &n.to_le_bytes()[..]);
        assert_eq!(&aes.nonce_bytes(n)[4..], &n.to_be_bytes()[..]);
    }

    proptest! {
        #[test]
        fn chachapoly_roundtrips_arbitrary_payloads(ad in any::<Vec<u8>>(), msg in any::<Vec<u8>>()) {
            let ad = if ad.len() > 256 { &ad[..256] } else { &ad[..] };
            let msg = if msg.len() > 2048 { &msg[..2048] } else { &msg[..] };
            let mut c = CipherContext::new(CipherId::ChaChaPoly);
            c.install_key(&[11u8; 32]).unwrap();
            let mut buf = msg.to_vec();
            c.encrypt(ad, &mut buf).unwrap();
            let mut d = CipherContext::new(CipherId::ChaChaPoly);
            d.install_key(&[11u8; 32]).unwrap();
            d.decrypt(ad, &mut buf).unwrap();
            prop_assert_eq!(buf, msg);
        }

        #[test]
        fn aesgcm_roundtrips_arbitrary_payloads(ad in any::<Vec<u8>>(), msg in any::<Vec<u8>>()) {
            let ad = if ad.len() > 256 { &ad[..256] } else { &ad[..] };
            let msg = if msg.len() > 2048 { &msg[..2048] } else { &msg[..] };
            let mut c = CipherContext::new(CipherId::Aesgcm);
            c.install_key(&[22u8; 32]).unwrap();
            let mut buf = msg.to_vec();
            c.encrypt(ad, &mut buf).unwrap();
            let mut d = CipherContext::new(CipherId::Aesgcm);
            d.install_key(&[22u8; 32]).unwrap();
            d.decrypt(ad, &mut buf).unwrap();
            prop_assert_eq!(buf, msg);
        }
    }
}
