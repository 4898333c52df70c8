#![forbid(unsafe_code)]

//! Handshake pattern table: tokens and per-role key requirements.
//!
//! Grounded on `nyx-crypto/src/noise.rs`'s `ik_demo`, which hardcodes a single
//! IK-shaped message sequence; generalized here into a data-driven token
//! interpreter covering the full one-way and interactive pattern set named in
//! the spec, dispatched through a concrete enum rather than the source's
//! function-pointer indirection (Design Notes §9).

use crate::error::{Error, Result};
use crate::handshake::Role;

/// One step of a handshake message: a DH token, a key token, or a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    E,
    S,
    Dhee,
    Dhes,
    Dhse,
    Dhss,
    /// Marks the boundary between one party's message tokens and the other's.
    FlipDir,
    End,
}

/// What one role needs configured (or expects arriving in-band) for a pattern:
/// whether it must own a local static keypair, and whether it must already
/// know the peer's static public key before `start()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticRequirements {
    pub local_required: bool,
    pub local_premsg: bool,
    pub remote_required: bool,
    pub remote_premsg: bool,
}

const NONE_REQ: StaticRequirements = StaticRequirements {
    local_required: false,
    local_premsg: false,
    remote_required: false,
    remote_premsg: false,
};

/// Identifies a handshake pattern by its Noise protocol-name token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternId {
    Nn,
    Nk,
    Nx,
    Kn,
    Kk,
    Kx,
    Xn,
    Xk,
    Xx,
    In,
    Ik,
    Ix,
    XxFallback,
}

impl PatternId {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "NN" => Ok(PatternId::Nn),
            "NK" => Ok(PatternId::Nk),
            "NX" => Ok(PatternId::Nx),
            "KN" => Ok(PatternId::Kn),
            "KK" => Ok(PatternId::Kk),
            "KX" => Ok(PatternId::Kx),
            "XN" => Ok(PatternId::Xn),
            "XK" => Ok(PatternId::Xk),
            "XX" => Ok(PatternId::Xx),
            "IN" => Ok(PatternId::In),
            "IK" => Ok(PatternId::Ik),
            "IX" => Ok(PatternId::Ix),
            "XXfallback" => Ok(PatternId::XxFallback),
            other => Err(Error::UnknownName(format!("pattern: {other}"))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PatternId::Nn => "NN",
            PatternId::Nk => "NK",
            PatternId::Nx => "NX",
            PatternId::Kn => "KN",
            PatternId::Kk => "KK",
            PatternId::Kx => "KX",
            PatternId::Xn => "XN",
            PatternId::Xk => "XK",
            PatternId::Xx => "XX",
            PatternId::In => "IN",
            PatternId::Ik => "IK",
            PatternId::Ix => "IX",
            PatternId::XxFallback => "XXfallback",
        }
    }

    /// The pattern this one falls back to on an IK failure, if any (spec §4.6).
    pub fn fallback_of(self) -> Option<PatternId> {
        match self {
            PatternId::XxFallback => Some(PatternId::Ik),
            _ => None,
        }
    }

    /// True for the one pattern (`XXfallback`) whose premessage is an
    /// ephemeral rather than a static key (spec §4.4 step 6 / §4.6).
    pub fn has_ephemeral_premsg(self) -> bool {
        matches!(self, PatternId::XxFallback)
    }

    /// Per-role static key requirements, independent of prefix/fallback.
    pub fn static_requirements(self, role: Role) -> StaticRequirements {
        use StaticRequirements as R;
        let (initiator, responder) = match self {
            PatternId::Nn => (NONE_REQ, NONE_REQ),
            PatternId::Nk => (
                R { local_required: false, local_premsg: false, remote_required: true, remote_premsg: true },
                R { local_required: true, local_premsg: true, remote_required: false, remote_premsg: false },
            ),
            PatternId::Nx => (
                NONE_REQ,
                R { local_required: true, local_premsg: false, remote_required: false, remote_premsg: false },
            ),
            PatternId::Kn => (
                R { local_required: true, local_premsg: true, remote_required: false, remote_premsg: false },
                R { local_required: false, local_premsg: false, remote_required: true, remote_premsg: true },
            ),
            PatternId::Kk => (
                R { local_required: true, local_premsg: true, remote_required: true, remote_premsg: true },
                R { local_required: true, local_premsg: true, remote_required: true, remote_premsg: true },
            ),
            PatternId::Kx => (
                R { local_required: true, local_premsg: true, remote_required: false, remote_premsg: false },
                R { local_required: true, local_premsg: false, remote_required: true, remote_premsg: true },
            ),
            PatternId::Xn => (
                R { local_required: true, local_premsg: false, remote_required: false, remote_premsg: false },
                NONE_REQ,
            ),
            PatternId::Xk => (
                R { local_required: true, local_premsg: false, remote_required: true, remote_premsg: true },
                R { local_required: true, local_premsg: true, remote_required: false, remote_premsg: false },
            ),
            PatternId::Xx => (
                R { local_required: true, local_premsg: false, remote_required: false, remote_premsg: false },
                R { local_required: true, local_premsg: false, remote_required: false, remote_premsg: false },
            ),
            PatternId::In => (
                R { local_required: true, local_premsg: false, remote_required: false, remote_premsg: false },
                NONE_REQ,
            ),
            PatternId::Ik => (
                R { local_required: true, local_premsg: false, remote_required: true, remote_premsg: true },
                R { local_required: true, local_premsg: true, remote_required: false, remote_premsg: false },
            ),
            PatternId::Ix => (
                R { local_required: true, local_premsg: false, remote_required: false, remote_premsg: false },
                R { local_required: true, local_premsg: false, remote_required: false, remote_premsg: false },
            ),
            // Tail of XX: both sides send their static in-band, nothing premessaged
            // (the premessaged value for this pattern is an ephemeral, handled via
            // `has_ephemeral_premsg`, not through this static-only table).
            PatternId::XxFallback => (
                R { local_required: true, local_premsg: false, remote_required: false, remote_premsg: false },
                R { local_required: true, local_premsg: false, remote_required: false, remote_premsg: false },
            ),
        };
        match role {
            Role::Initiator => initiator,
            Role::Responder => responder,
        }
    }

    /// The token program from the initiator's point of view: `FlipDir` marks
    /// the switch to the responder's tokens, `End` terminates the pattern.
    pub fn tokens(self) -> &'static [Token] {
        use Token::*;
        match self {
            PatternId::Nn => &[E, FlipDir, E, Dhee, End],
            PatternId::Nk => &[E, Dhes, FlipDir, E, Dhee, End],
            PatternId::Nx => &[E, FlipDir, E, Dhee, S, Dhes, End],
            PatternId::Kn => &[E, FlipDir, E, Dhee, Dhse, End],
            PatternId::Kk => &[E, Dhes, Dhss, FlipDir, E, Dhee, Dhse, End],
            PatternId::Kx => &[E, FlipDir, E, Dhee, Dhse, S, Dhes, End],
            PatternId::Xn => &[E, FlipDir, E, Dhee, FlipDir, S, Dhse, End],
            PatternId::Xk => &[E, Dhes, FlipDir, E, Dhee, FlipDir, S, Dhse, End],
            PatternId::Xx => &[E, FlipDir, E, Dhee, S, Dhes, FlipDir, S, Dhse, End],
            PatternId::In => &[E, S, FlipDir, E, Dhee, Dhse, End],
            PatternId::Ik => &[E, Dhes, S, Dhss, FlipDir, E, Dhee, Dhse, End],
            PatternId::Ix => &[E, S, FlipDir, E, Dhee, Dhse, S, Dhes, End],
            // First live message after the failed IK attempt: new-initiator sends a fresh
            // ephemeral, derives DHEE against the already-known peer ephemeral, then its own
            // static combined via DHSE with that same already-known peer ephemeral (mirrors
            // Kx's "Dhse before/after S" shape, since the premessaged key here is an
            // ephemeral rather than a static); new-responder answers with its own static
            // combined via DHES against the just-received fresh ephemeral (spec §4.6).
            PatternId::XxFallback => &[E, Dhee, S, Dhse, FlipDir, S, Dhes, End],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nk_requirements_are_asymmetric() {
        let i = PatternId::Nk.static_requirements(Role::Initiator);
        let r = PatternId::Nk.static_requirements(Role::Responder);
        assert!(!i.local_required && i.remote_required && i.remote_premsg);
        assert!(r.local_required && r.local_premsg && !r.remote_required);
    }

    #[test]
    fn xx_requires_both_locals_but_no_premsg() {
        let i = PatternId::Xx.static_requirements(Role::Initiator);
        let r = PatternId::Xx.static_requirements(Role::Responder);
        assert!(i.local_required && !i.local_premsg && !i.remote_required);
        assert!(r.local_required && !r.local_premsg && !r.remote_required);
    }

    #[test]
    fn xxfallback_requires_both_locals_and_ephemeral_premsg() {
        let i = PatternId::XxFallback.static_requirements(Role::Initiator);
        let r = PatternId::XxFallback.static_requirements(Role::Responder);
        assert!(i.local_required && r.local_required);
        assert!(PatternId::XxFallback.has_ephemeral_premsg());
        assert_eq!(PatternId::XxFallback.fallback_of(), Some(PatternId::Ik));
    }

    #[test]
    fn token_programs_end_with_end_marker() {
        for p in [
            PatternId::Nn,
            PatternId::Nk,
            PatternId::Nx,
            PatternId::Kn,
            PatternId::Kk,
            PatternId::Kx,
            PatternId::Xn,
            PatternId::Xk,
            PatternId::Xx,
            PatternId::In,
            PatternId::Ik,
            PatternId::Ix,
            PatternId::XxFallback,
        ] {
            assert_eq!(*p.tokens().last().unwrap(), Token::End);
        }
    }

    #[test]
    fn name_roundtrips() {
        for (name, id) in [("XX", PatternId::Xx), ("IK", PatternId::Ik), ("XXfallback", PatternId::XxFallback)] {
            assert_eq!(PatternId::from_name(name).unwrap(), id);
            assert_eq!(id.name(), name);
        }
    }
}
