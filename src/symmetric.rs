#![forbid(unsafe_code)]

//! `SymmetricContext`: the `ck`/`h` chaining state shared by every handshake,
//! per spec §4.1 (`MixHash`, `MixKey`, `MixKeyAndHash`, `EncryptAndHash`,
//! `DecryptAndHash`, `Split`).
//!
//! Grounded on `nyx-crypto/src/kdf.rs`'s chaining-key update pattern and
//! `session.rs`'s transcript-hash handling, generalized over the full hash/cipher
//! matrix via [`HashContext`]/[`CipherContext`].

use crate::cipher::CipherContext;
use crate::error::Result;
use crate::hash::HashContext;
use crate::protocol::ProtocolId;
use zeroize::Zeroize;

/// Owns the running chaining key `ck`, transcript hash `h`, and the AEAD slot
/// that becomes keyed once enough DH output has been mixed in.
pub struct SymmetricContext {
    hash: HashContext,
    cipher: CipherContext,
    ck: Vec<u8>,
    h: Vec<u8>,
}

impl SymmetricContext {
    /// `InitializeSymmetric(protocol_name)`: `h = HASH(protocol_name)` (padded
    /// with zeros if the name is shorter than `HASHLEN`), `ck = h`.
    pub fn new(protocol: &ProtocolId) -> Self {
        let hash_id = protocol.hash();
        let mut hash = HashContext::new(hash_id);
        let name = protocol.to_name();
        let h = if name.len() <= hash_id.output_len() {
            let mut padded = vec![0u8; hash_id.output_len()];
            padded[..name.len()].copy_from_slice(name.as_bytes());
            padded
        } else {
            hash.update(name.as_bytes());
            hash.finalize_reset()
        };
        let ck = h.clone();
        Self {
            hash,
            cipher: CipherContext::new(protocol.cipher()),
            ck,
            h,
        }
    }

    pub fn handshake_hash(&self) -> &[u8] {
        &self.h
    }

    pub fn hash_id(&self) -> crate::hash::HashId {
        self.hash.id()
    }

    pub fn has_key(&self) -> bool {
        self.cipher.has_key()
    }

    /// `MixHash(data)`: `h = HASH(h || data)`.
    pub fn mix_hash(&mut self, data: &[u8]) {
        self.hash.update(&self.h);
        self.hash.update(data);
        self.h = self.hash.finalize_reset();
    }

    /// `MixKey(input_key_material)`: derives a new `ck` and AEAD key via HKDF.
    pub fn mix_key(&mut self, ikm: &[u8]) -> Result<()> {
        let mut outputs = HashContext::hkdf(self.hash.id(), &self.ck, ikm, 2)?;
        self.ck = outputs[0].clone();
        let key_len = self.cipher.key_len();
        let temp_k = &outputs[1][..key_len];
        self.cipher.install_key(temp_k)?;
        for o in outputs.iter_mut() {
            o.zeroize();
        }
        Ok(())
    }

    /// `MixKeyAndHash(input_key_material)`: as `MixKey` but also mixes the
    /// middle HKDF output into `h`, used for PSK tokens (spec §4.4).
    pub fn mix_key_and_hash(&mut self, ikm: &[u8]) -> Result<()> {
        let mut outputs = HashContext::hkdf(self.hash.id(), &self.ck, ikm, 3)?;
        self.ck = outputs[0].clone();
        self.mix_hash(&outputs[1]);
        let key_len = self.cipher.key_len();
        let temp_k = &outputs[2][..key_len];
        self.cipher.install_key(temp_k)?;
        for o in outputs.iter_mut() {
            o.zeroize();
        }
        Ok(())
    }

    /// `EncryptAndHash(plaintext)`: AEAD-encrypts in place if keyed (else a
    /// no-op copy), then mixes the resulting ciphertext into `h`.
    pub fn encrypt_and_hash(&mut self, buf: &mut Vec<u8>) -> Result<()> {
        if self.cipher.has_key() {
            let h = self.h.clone();
            self.cipher.encrypt(&h, buf)?;
        }
        self.mix_hash(buf);
        Ok(())
    }

    /// `DecryptAndHash(ciphertext)`: mixes the ciphertext into `h` first, then
    /// AEAD-decrypts in place if keyed (else a no-op copy).
    pub fn decrypt_and_hash(&mut self, buf: &mut Vec<u8>) -> Result<()> {
        let ciphertext = buf.clone();
        if self.cipher.has_key() {
            let h = self.h.clone();
            self.cipher.decrypt(&h, buf)?;
        }
        self.mix_hash(&ciphertext);
        Ok(())
    }

    /// `Split(secondary_key)`: derives the two transport-phase cipher states from
    /// `ck`, optionally mixing a 32-byte `secondary_key` into the HKDF input for
    /// hybrid/PQ key combination (spec §4.7). `secondary_key` must be `None` or
    /// exactly 32 bytes.
    pub fn split(&mut self, secondary_key: Option<&[u8]>) -> Result<(CipherContext, CipherContext)> {
        if let Some(sk) = secondary_key {
            if sk.len() != 32 {
                return Err(crate::error::Error::InvalidLength(format!(
                    "split: secondary_key must be 32 bytes, got {}",
                    sk.len()
                )));
            }
        }
        let ikm = secondary_key.unwrap_or(&[]);
        let mut outputs = HashContext::hkdf(self.hash.id(), &self.ck, ikm, 2)?;
        let key_len = self.cipher.key_len();
        let mut c1 = self.cipher.clone_algo();
        let mut c2 = self.cipher.clone_algo();
        c1.install_key(&outputs[0][..key_len])?;
        c2.install_key(&outputs[1][..key_len])?;
        for o in outputs.iter_mut() {
            o.zeroize();
        }
        Ok((c1, c2))
    }
}

impl Drop for SymmetricContext {
    fn drop(&mut self) {
        self.ck.zeroize();
        self.h.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::CipherId;
    use crate::dh::DhId;
    use crate::hash::HashId;
    use crate::pattern::PatternId;
    use proptest::prelude::*;
    use crate::protocol::PrefixId;

    fn proto() -> ProtocolId {
        ProtocolId::new(
            PrefixId::Standard,
            PatternId::Nn,
            DhId::Curve25519,
            CipherId::ChaChaPoly,
            HashId::Sha256,
        )
    }

    #[test]
    fn init_pads_short_names() {
        let ctx = SymmetricContext::new(&proto());
        assert_eq!(ctx.handshake_hash().len(), 32);
    }

    #[test]
    fn encrypt_and_hash_roundtrips_with_decrypt_and_hash() {
        let mut a = SymmetricContext::new(&proto());
        let mut b = SymmetricContext::new(&proto());
        a.mix_key(&[42u8; 32]).unwrap();
        b.mix_key(&[42u8; 32]).unwrap();

        let mut buf = b"hello".to_vec();
        a.encrypt_and_hash(&mut buf).unwrap();
        b.decrypt_and_hash(&mut buf).unwrap();
        assert_eq!(buf, b"hello");
        assert_eq!(a.handshake_hash(), b.handshake_hash());
    }

    #[test]
    fn encrypt_and_hash_without_key_is_plaintext_passthrough() {
        let mut ctx = SymmetricContext::new(&proto());
        let mut buf = b"plain".to_vec();
        ctx.encrypt_and_hash(&mut buf).unwrap();
        assert_eq!(buf, b"plain");
    }

    #[test]
    fn split_produces_distinct_cipher_states() {
        let mut ctx = SymmetricContext::new(&proto());
        ctx.mix_key(&[7u8; 32]).unwrap();
        let (mut c1, mut c2) = ctx.split(None).unwrap();
        let mut buf = b"msg".to_vec();
        c1.encrypt(&[], &mut buf).unwrap();
        assert!(c2.decrypt(&[], &mut buf).is_err());
    }

    #[test]
    fn split_rejects_wrong_length_secondary_key() {
        let mut ctx = SymmetricContext::new(&proto());
        ctx.mix_key(&[7u8; 32]).unwrap();
        assert!(ctx.split(Some(&[1u8; 31])).is_err());
    }

    #[test]
    fn split_with_secondary_key_derives_different_keys() {
        // Two contexts that reach an identical `ck` (same protocol, same mixed-in
        // DH output) must still diverge once one of them folds in a secondary key.
        let mut a = SymmetricContext::new(&proto());
        a.mix_key(&[7u8; 32]).unwrap();
        let (mut c1_plain, _) = a.split(None).unwrap();

        let mut b = SymmetricContext::new(&proto());
        b.mix_key(&[7u8; 32]).unwrap();
        let (mut c1_hybrid, _) = b.split(Some(&[9u8; 32])).unwrap();

        let mut buf = b"msg".to_vec();
        c1_plain.encrypt(&[], &mut buf).unwrap();
        assert!(c1_hybrid.decrypt(&[], &mut buf).is_err());
    }

    proptest! {
        #[test]
        fn encrypt_and_hash_roundtrips_arbitrary_payloads(payload in any::<Vec<u8>>()) {
            let payload = if payload.len() > 2048 { &payload[..2048] } else { &payload[..] };
            let mut a = SymmetricContext::new(&proto());
            let mut b = SymmetricContext::new(&proto());
            a.mix_key(&[5u8; 32]).unwrap();
            b.mix_key(&[5u8; 32]).unwrap();

            let mut buf = payload.to_vec();
            a.encrypt_and_hash(&mut buf).unwrap();
            b.decrypt_and_hash(&mut buf).unwrap();
            prop_assert_eq!(buf, payload);
            prop_assert_eq!(a.handshake_hash(), b.handshake_hash());
        }
    }
}
