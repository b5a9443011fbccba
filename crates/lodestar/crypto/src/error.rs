use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Crypto-layer failures.
///
/// Each variant is an explicit outcome callers must handle; the boundary
/// collapses `UnknownSession`, `AuthenticationFailed` and `MalformedEnvelope`
/// into one generic authentication error so no distinguishing detail leaks
/// to the network.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Peer key bytes do not decode to a usable curve point.
    #[error("peer public key is not a valid curve point")]
    InvalidPeerKey,

    /// No symmetric key is held for the presented session identity.
    #[error("no active session for identity {0}")]
    UnknownSession(String),

    /// AEAD tag verification failed; the payload was tampered with or sealed
    /// under a different key.
    #[error("envelope authentication failed for identity {0}")]
    AuthenticationFailed(String),

    /// Envelope shorter than the fixed framing allows.
    #[error("envelope too short: {len} bytes, need at least {min}")]
    MalformedEnvelope { len: usize, min: usize },

    /// Key derivation could not produce output of the requested length.
    #[error("key derivation failed")]
    KeyDerivation,
}
