#![forbid(unsafe_code)]

//! `DhContext`: owns a keypair or a public key for one Diffie-Hellman group.
//!
//! Grounded on `nyx-crypto`'s `ik_demo` use of `x25519_dalek::{StaticSecret, PublicKey}`
//! (noise.rs) plus the "tagged variant" approach Design Notes recommends over the
//! source's function-pointer vtables: there is one concrete group (Curve25519) and the
//! id is kept around so a second group could be added without touching the handshake core.

use crate::error::{Error, Result};
use rand_core::{OsRng, RngCore};
use x25519_dalek::{PublicKey as XPublic, StaticSecret as XSecret};
use zeroize::Zeroize;

/// Identifies a Diffie-Hellman group by the Noise protocol-name token (`25519`, `448`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DhId {
    Curve25519,
    Curve448,
}

impl DhId {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "25519" => Ok(DhId::Curve25519),
            "448" => Ok(DhId::Curve448),
            other => Err(Error::UnknownName(format!("dh group: {other}"))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DhId::Curve25519 => "25519",
            DhId::Curve448 => "448",
        }
    }

    pub fn public_key_len(self) -> usize {
        match self {
            DhId::Curve25519 => 32,
            DhId::Curve448 => 56,
        }
    }

    pub fn private_key_len(self) -> usize {
        self.public_key_len()
    }

    pub fn shared_key_len(self) -> usize {
        self.public_key_len()
    }
}

/// A private key that zeroizes on drop. Curve448 has no bundled implementation
/// (see `DhContext::generate_keypair`/`dh`); the 56-byte capacity is reserved for it.
#[derive(Clone)]
struct PrivateKeyBytes(Vec<u8>);

impl Drop for PrivateKeyBytes {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Owns either a keypair or a bare public key for one DH group, per spec §6.
pub struct DhContext {
    id: DhId,
    private: Option<PrivateKeyBytes>,
    public: Option<Vec<u8>>,
}

impl DhContext {
    pub fn new(id: DhId) -> Self {
        Self {
            id,
            private: None,
            public: None,
        }
    }

    pub fn id(&self) -> DhId {
        self.id
    }

    pub fn public_key_len(&self) -> usize {
        self.id.public_key_len()
    }
    pub fn private_key_len(&self) -> usize {
        self.id.private_key_len()
    }
    pub fn shared_key_len(&self) -> usize {
        self.id.shared_key_len()
    }

    pub fn has_keypair(&self) -> bool {
        self.private.is_some()
    }

    pub fn has_public_key(&self) -> bool {
        self.public.is_some()
    }

    pub fn public_key(&self) -> Option<&[u8]> {
        self.public.as_deref()
    }

    /// Constant-time check for the group's null/identity public key (all-zero
    /// representation). A sender presenting this value either malfunctioned or is
    /// attempting a small-subgroup-style confusion; §4.5 rejects it on read.
    pub fn is_null_public_key(&self) -> bool {
        match &self.public {
            None => false,
            Some(pk) => {
                let mut acc = 0u8;
                for b in pk {
                    acc |= *b;
                }
                acc == 0
            }
        }
    }

    pub fn clear_key(&mut self) {
        self.private = None;
        self.public = None;
    }

    /// Crate-internal: clones out (private, public) for installing into another
    /// context, used by the handshake's fixed-ephemeral test override.
    pub(crate) fn keypair_bytes(&self) -> Option<(Vec<u8>, Vec<u8>)> {
        match (&self.private, &self.public) {
            (Some(p), Some(pk)) => Some((p.0.clone(), pk.clone())),
            _ => None,
        }
    }

    pub fn generate_keypair(&mut self) -> Result<()> {
        match self.id {
            DhId::Curve25519 => {
                let mut seed = [0u8; 32];
                OsRng.fill_bytes(&mut seed);
                let sk = XSecret::from(seed);
                seed.zeroize();
                let pk = XPublic::from(&sk);
                self.private = Some(PrivateKeyBytes(sk.to_bytes().to_vec()));
                self.public = Some(pk.to_bytes().to_vec());
                Ok(())
            }
            DhId::Curve448 => Err(Error::UnknownId("no Curve448 implementation bundled".into())),
        }
    }

    /// Test-only: install a known private/public pair, bypassing RNG. Used for the
    /// fixed-ephemeral override (`HandshakeContext::set_fixed_ephemeral`) and for
    /// reproducing published test vectors.
    pub fn set_keypair(&mut self, private: &[u8], public: &[u8]) -> Result<()> {
        if private.len() != self.private_key_len() {
            return Err(Error::InvalidLength(format!(
                "private key: expected {} bytes, got {}",
                self.private_key_len(),
                private.len()
            )));
        }
        if public.len() != self.public_key_len() {
            return Err(Error::InvalidLength(format!(
                "public key: expected {} bytes, got {}",
                self.public_key_len(),
                public.len()
            )));
        }
        self.private = Some(PrivateKeyBytes(private.to_vec()));
        self.public = Some(public.to_vec());
        Ok(())
    }

    pub fn set_public_key(&mut self, public: &[u8]) -> Result<()> {
        if public.len() != self.public_key_len() {
            return Err(Error::InvalidLength(format!(
                "public key: expected {} bytes, got {}",
                self.public_key_len(),
                public.len()
            )));
        }
        self.public = Some(public.to_vec());
        Ok(())
    }

    /// `dh(self_priv, other_pub) -> shared[shared_len]`.
    pub fn dh(&self, other_public: &[u8]) -> Result<Vec<u8>> {
        let private = self
            .private
            .as_ref()
            .ok_or_else(|| Error::InvalidState("dh: no local keypair installed".into()))?;
        if other_public.len() != self.public_key_len() {
            return Err(Error::InvalidLength(format!(
                "peer public key: expected {} bytes, got {}",
                self.public_key_len(),
                other_public.len()
            )));
        }
        match self.id {
            DhId::Curve25519 => {
                let mut sk_bytes = [0u8; 32];
                sk_bytes.copy_from_slice(&private.0);
                let sk = XSecret::from(sk_bytes);
                sk_bytes.zeroize();
                let mut pk_bytes = [0u8; 32];
                pk_bytes.copy_from_slice(other_public);
                let pk = XPublic::from(pk_bytes);
                let shared = sk.diffie_hellman(&pk);
                Ok(shared.to_bytes().to_vec())
            }
            DhId::Curve448 => Err(Error::UnknownId("no Curve448 implementation bundled".into())),
        }
    }
}

/// Constant-time check of a received public key against the group's null/identity
/// representation, without needing it stored in a [`DhContext`] first (spec §4.5).
pub fn is_null_public_key(bytes: &[u8]) -> bool {
    let mut acc = 0u8;
    for b in bytes {
        acc |= *b;
    }
    acc == 0
}
