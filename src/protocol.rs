#![forbid(unsafe_code)]

//! `ProtocolId`: parses and represents a Noise protocol name such as
//! `Noise_XX_25519_ChaChaPoly_SHA256` or `NoisePSK_IK_25519_AESGCM_BLAKE2b`.
//!
//! Grounded on `nyx-crypto`'s `noise.rs` module constants (`"Noise_IK_25519_ChaChaPoly_SHA256"`)
//! generalized into a full parser/builder over the pattern × dh × cipher × hash matrix.

use crate::cipher::CipherId;
use crate::dh::DhId;
use crate::error::{Error, Result};
use crate::hash::HashId;
use crate::pattern::PatternId;

/// Distinguishes the plain `Noise_` prefix from the PSK-bearing `NoisePSK_` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrefixId {
    Standard,
    Psk,
}

impl PrefixId {
    pub fn name(self) -> &'static str {
        match self {
            PrefixId::Standard => "Noise",
            PrefixId::Psk => "NoisePSK",
        }
    }
}

/// A fully-resolved, immutable protocol identity: one pattern, one DH group, one
/// cipher, one hash, and whether the PSK prefix is in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolId {
    prefix: PrefixId,
    pattern: PatternId,
    dh: DhId,
    cipher: CipherId,
    hash: HashId,
}

impl ProtocolId {
    pub fn new(
        prefix: PrefixId,
        pattern: PatternId,
        dh: DhId,
        cipher: CipherId,
        hash: HashId,
    ) -> Self {
        Self {
            prefix,
            pattern,
            dh,
            cipher,
            hash,
        }
    }

    pub fn prefix(&self) -> PrefixId {
        self.prefix
    }
    pub fn pattern(&self) -> PatternId {
        self.pattern
    }
    pub fn dh(&self) -> DhId {
        self.dh
    }
    pub fn cipher(&self) -> CipherId {
        self.cipher
    }
    pub fn hash(&self) -> HashId {
        self.hash
    }

    pub fn is_psk(&self) -> bool {
        matches!(self.prefix, PrefixId::Psk)
    }

    /// Parses `"Noise_XX_25519_ChaChaPoly_SHA256"` / `"NoisePSK_IK_448_AESGCM_BLAKE2b"`.
    pub fn from_name(name: &str) -> Result<Self> {
        let parts: Vec<&str> = name.split('_').collect();
        if parts.len() != 5 {
            return Err(Error::UnknownName(format!(
                "protocol name must have 5 underscore-separated fields, got {}: {name}",
                parts.len()
            )));
        }
        let prefix = match parts[0] {
            "Noise" => PrefixId::Standard,
            "NoisePSK" => PrefixId::Psk,
            other => return Err(Error::UnknownName(format!("protocol prefix: {other}"))),
        };
        let pattern = PatternId::from_name(parts[1])?;
        let dh = DhId::from_name(parts[2])?;
        let cipher = CipherId::from_name(parts[3])?;
        let hash = HashId::from_name(parts[4])?;
        Ok(Self::new(prefix, pattern, dh, cipher, hash))
    }

    pub fn to_name(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}",
            self.prefix.name(),
            self.pattern.name(),
            self.dh.name(),
            self.cipher.name(),
            self.hash.name()
        )
    }
}
