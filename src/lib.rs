//! Token-driven Noise Protocol Framework handshake engine.
//!
//! - `dh`/`cipher`/`hash`: tagged-enum wrappers over one concrete algorithm per
//!   Noise token (`25519`, `ChaChaPoly`/`AESGCM`, `SHA256`/`SHA512`/`BLAKE2s`/`BLAKE2b`).
//! - `symmetric`: the `ck`/`h` chaining state (`MixHash`, `MixKey`, `MixKeyAndHash`,
//!   `EncryptAndHash`, `DecryptAndHash`, `Split`).
//! - `pattern`: the 13 supported patterns as token programs plus per-role static-key
//!   requirements.
//! - `protocol`: parses/builds `Noise_XX_25519_ChaChaPoly_SHA256`-shaped names.
//! - `handshake`: `HandshakeContext`, the public entry point driving one handshake
//!   from construction through `split`, including `IK` → `XXfallback`.
//!
//! Grounded on `nyx-crypto`'s module split (`noise.rs`, `aead.rs`, `kdf.rs`,
//! `session.rs`) generalized from that crate's single hardcoded IK exchange into a
//! data-driven interpreter over the full pattern set.
#![forbid(unsafe_code)]

pub mod cipher;
pub mod dh;
pub mod error;
pub mod handshake;
pub mod hash;
pub mod pattern;
pub mod protocol;
pub mod symmetric;

pub use cipher::{CipherContext, CipherId};
pub use dh::{DhContext, DhId};
pub use error::{Error, Result};
pub use handshake::{Action, HandshakeContext, Role, MAX_MESSAGE_LEN};
pub use hash::{HashContext, HashId};
pub use pattern::{PatternId, StaticRequirements, Token};
pub use protocol::{PrefixId, ProtocolId};
pub use symmetric::SymmetricContext;
