#![forbid(unsafe_code)]

//! `HashContext`: streaming hash plus the Noise-specific HMAC-chained HKDF.
//!
//! Grounded on `nyx-crypto`'s `kdf.rs` (HMAC-based chaining, `sha2::Sha256`) generalized
//! to the four hash tokens the spec names. Blake2s/Blake2b come from Alloy-Tools'
//! `al-crypto`, the closest pack example that already depends on `blake2`.
//!
//! The Noise HKDF (`hkdf.rs §4.3` in spec terms) is its own two/three-output
//! HMAC-chain, distinct from RFC 5869's `hkdf` crate `expand` call, so it is
//! hand-written here once, generically over any `hmac::Mac`.

use crate::error::{Error, Result};
use blake2::{Blake2b512, Blake2s256};
use digest::Digest;
use hmac::{Hmac, Mac, SimpleHmac};
use sha2::{Sha256, Sha512};
use zeroize::Zeroize;

/// Identifies a hash function by its Noise protocol-name token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashId {
    Sha256,
    Sha512,
    Blake2s,
    Blake2b,
}

impl HashId {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "SHA256" => Ok(HashId::Sha256),
            "SHA512" => Ok(HashId::Sha512),
            "BLAKE2s" => Ok(HashId::Blake2s),
            "BLAKE2b" => Ok(HashId::Blake2b),
            other => Err(Error::UnknownName(format!("hash: {other}"))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            HashId::Sha256 => "SHA256",
            HashId::Sha512 => "SHA512",
            HashId::Blake2s => "BLAKE2s",
            HashId::Blake2b => "BLAKE2b",
        }
    }

    pub fn output_len(self) -> usize {
        match self {
            HashId::Sha256 | HashId::Blake2s => 32,
            HashId::Sha512 | HashId::Blake2b => 64,
        }
    }

    /// HMAC/HKDF block length, per the Noise spec's `HASHLEN`/`BLOCKLEN` table.
    pub fn block_len(self) -> usize {
        match self {
            HashId::Sha256 | HashId::Blake2s => 64,
            HashId::Sha512 | HashId::Blake2b => 128,
        }
    }
}

/// Streaming hash state, one variant per supported algorithm.
enum HashState {
    Sha256(Sha256),
    Sha512(Sha512),
    Blake2s(Blake2s256),
    Blake2b(Blake2b512),
}

/// A resettable hash context used for `MixHash`-style incremental digesting.
pub struct HashContext {
    id: HashId,
    state: HashState,
}

impl HashContext {
    pub fn new(id: HashId) -> Self {
        Self {
            id,
            state: Self::fresh(id),
        }
    }

    fn fresh(id: HashId) -> HashState {
        match id {
            HashId::Sha256 => HashState::Sha256(Sha256::new()),
            HashId::Sha512 => HashState::Sha512(Sha512::new()),
            HashId::Blake2s => HashState::Blake2s(Blake2s256::new()),
            HashId::Blake2b => HashState::Blake2b(Blake2b512::new()),
        }
    }

    pub fn id(&self) -> HashId {
        self.id
    }

    pub fn output_len(&self) -> usize {
        self.id.output_len()
    }

    pub fn reset(&mut self) {
        self.state = Self::fresh(self.id);
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HashState::Sha256(h) => h.update(data),
            HashState::Sha512(h) => h.update(data),
            HashState::Blake2s(h) => h.update(data),
            HashState::Blake2b(h) => h.update(data),
        }
    }

    /// Finalizes into a fresh `Vec`, then resets the context for reuse.
    pub fn finalize_reset(&mut self) -> Vec<u8> {
        let out = match std::mem::replace(&mut self.state, Self::fresh(self.id)) {
            HashState::Sha256(h) => h.finalize().to_vec(),
            HashState::Sha512(h) => h.finalize().to_vec(),
            HashState::Blake2s(h) => h.finalize().to_vec(),
            HashState::Blake2b(h) => h.finalize().to_vec(),
        };
        out
    }

    /// One-shot `HASH(data)`.
    pub fn hash(id: HashId, data: &[u8]) -> Vec<u8> {
        let mut ctx = HashContext::new(id);
        ctx.update(data);
        ctx.finalize_reset()
    }

    /// Noise's `HMAC-HASH(key, data)`.
    pub fn hmac(id: HashId, key: &[u8], data: &[u8]) -> Vec<u8> {
        match id {
            HashId::Sha256 => hmac_bytes::<Hmac<Sha256>>(key, data),
            HashId::Sha512 => hmac_bytes::<Hmac<Sha512>>(key, data),
            HashId::Blake2s => hmac_bytes::<SimpleHmac<Blake2s256>>(key, data),
            HashId::Blake2b => hmac_bytes::<SimpleHmac<Blake2b512>>(key, data),
        }
    }

    /// Noise's `HKDF(chaining_key, input_key_material, n)`, producing 2 or 3 outputs.
    ///
    /// This is the HMAC-chained construction from the Noise spec (`temp_key = HMAC(ck,
    /// ikm)`, then `output_i = HMAC(temp_key, output_{i-1} || i)` with `output_0` empty),
    /// not RFC 5869's `expand`. Each returned output is `HASHLEN` bytes; callers truncate
    /// as needed (e.g. a 32-byte AEAD key out of a 64-byte Blake2b/SHA-512 output).
    pub fn hkdf(id: HashId, chaining_key: &[u8], ikm: &[u8], n: usize) -> Result<Vec<Vec<u8>>> {
        if !(2..=3).contains(&n) {
            return Err(Error::InvalidParam(format!("hkdf: n must be 2 or 3, got {n}")));
        }
        let temp_key = Self::hmac(id, chaining_key, ikm);
        let mut outputs = Vec::with_capacity(n);
        let mut prev: Vec<u8> = Vec::new();
        for i in 1..=n {
            let mut input = prev.clone();
            input.push(i as u8);
            let out = Self::hmac(id, &temp_key, &input);
            input.zeroize();
            prev = out.clone();
            outputs.push(out);
        }
        prev.zeroize();
        Ok(outputs)
    }
}

fn hmac_bytes<M: Mac + digest::KeyInit>(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = <M as Mac>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_matches_one_shot() {
        let mut ctx = HashContext::new(HashId::Sha256);
        ctx.update(b"hello");
        ctx.update(b" world");
        let streamed = ctx.finalize_reset();
        let oneshot = HashContext::hash(HashId::Sha256, b"hello world");
        assert_eq!(streamed, oneshot);
    }

    #[test]
    fn output_lengths_match_table() {
        assert_eq!(HashId::Sha256.output_len(), 32);
        assert_eq!(HashId::Sha512.output_len(), 64);
        assert_eq!(HashId::Blake2s.output_len(), 32);
        assert_eq!(HashId::Blake2b.output_len(), 64);
    }

    #[test]
    fn hkdf_two_outputs_are_independent() {
        let ck = [0u8; 32];
        let ikm = [1u8; 32];
        let outs = HashContext::hkdf(HashId::Sha256, &ck, &ikm, 2).unwrap();
        assert_eq!(outs.len(), 2);
        assert_ne!(outs[0], outs[1]);
    }

    #[test]
    fn hkdf_three_outputs_deterministic() {
        let ck = [9u8; 32];
        let ikm = [2u8; 32];
        let a = HashContext::hkdf(HashId::Blake2b, &ck, &ikm, 3).unwrap();
        let b = HashContext::hkdf(HashId::Blake2b, &ck, &ikm, 3).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn hkdf_rejects_bad_n() {
        assert!(matches!(
            HashContext::hkdf(HashId::Sha256, &[0u8; 32], &[0u8; 32], 1),
            Err(Error::InvalidParam(_))
        ));
        assert!(matches!(
            HashContext::hkdf(HashId::Sha256, &[0u8; 32], &[0u8; 32], 4),
            Err(Error::InvalidParam(_))
        ));
    }
}
