use thiserror::Error;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// The small, fixed set of outcomes the boundary can observe.
///
/// Everything the crypto and storage layers can raise is converted into one
/// of these before leaving the channel; in particular, an unknown session
/// and a failed authentication tag both surface as `Unauthenticated`, so a
/// probe learns nothing from the distinction.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Handshake input did not decode to a usable public key.
    #[error("handshake rejected: {0}")]
    InvalidHandshake(String),

    /// Request body was structurally invalid before any key lookup.
    #[error("malformed request")]
    Malformed,

    /// Envelope failed authentication or referenced no live session.
    #[error("authentication failed")]
    Unauthenticated,

    /// Storage or key-derivation failure; nothing client-actionable.
    #[error("internal error: {0}")]
    Internal(String),
}
