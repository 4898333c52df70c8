#![forbid(unsafe_code)]

/// Error taxonomy for the handshake engine.
///
/// Kinds are non-overlapping: every boundary operation returns exactly one
/// of these on failure, never a composite.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Caller passed a null/empty buffer or an illegal role.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// Buffer too small, key/PSK wrong size, or a name too long.
    #[error("invalid length: {0}")]
    InvalidLength(String),

    /// Operation called in the wrong `action` or requirement state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Operation only valid under a PSK prefix / IK pattern / fallback.
    #[error("not applicable: {0}")]
    NotApplicable(String),

    /// `start()` precondition: local static key required but absent.
    #[error("local static key required")]
    LocalKeyRequired,

    /// `start()` precondition: remote static key required but absent.
    #[error("remote static key required")]
    RemoteKeyRequired,

    /// `start()` precondition: PSK required but not supplied.
    #[error("pre-shared key required")]
    PskRequired,

    /// A received ephemeral public key decoded to the group's null element.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// AEAD authentication failed while reading a message.
    #[error("mac failure")]
    MacFailure,

    /// Allocation for a sub-context failed.
    #[error("no memory")]
    NoMemory,

    /// A pattern/algorithm identifier was not recognized.
    #[error("unknown id: {0}")]
    UnknownId(String),

    /// A textual protocol name did not parse against the known grammar.
    #[error("unknown name: {0}")]
    UnknownName(String),
}

pub type Result<T> = core::result::Result<T, Error>;
