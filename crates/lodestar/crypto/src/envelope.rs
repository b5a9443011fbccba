//! Sealed envelope framing.
//!
//! Layout: `nonce(12) || ciphertext || tag(16) || session_id(32)`.
//!
//! The identity travels last and in cleartext: AEAD cannot verify anything
//! until the receiver has the right key, and the key lookup needs the
//! identity. The identity is not secret (anyone able to complete a
//! handshake learns theirs), so the suffix leaks nothing new.

use crate::error::CryptoError;
use lodestar_types::{SessionId, SESSION_ID_LEN};

/// Nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// Poly1305 authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Smallest well-formed envelope: empty plaintext still carries nonce, tag
/// and identity suffix.
pub const MIN_ENVELOPE_LEN: usize = NONCE_LEN + TAG_LEN + SESSION_ID_LEN;

/// Borrowed view over a raw envelope.
#[derive(Debug)]
pub(crate) struct EnvelopeParts<'a> {
    pub nonce: &'a [u8],
    /// Ciphertext with the trailing authentication tag, as AEAD expects it.
    pub body: &'a [u8],
    pub session_id: SessionId,
}

pub(crate) fn split(raw: &[u8]) -> Result<EnvelopeParts<'_>, CryptoError> {
    if raw.len() < MIN_ENVELOPE_LEN {
        return Err(CryptoError::MalformedEnvelope {
            len: raw.len(),
            min: MIN_ENVELOPE_LEN,
        });
    }

    let (head, id_bytes) = raw.split_at(raw.len() - SESSION_ID_LEN);
    let (nonce, body) = head.split_at(NONCE_LEN);
    let session_id = SessionId::from_slice(id_bytes).map_err(|_| CryptoError::MalformedEnvelope {
        len: raw.len(),
        min: MIN_ENVELOPE_LEN,
    })?;

    Ok(EnvelopeParts {
        nonce,
        body,
        session_id,
    })
}

pub(crate) fn assemble(nonce: &[u8], body: &[u8], session_id: &SessionId) -> Vec<u8> {
    let mut out = Vec::with_capacity(nonce.len() + body.len() + SESSION_ID_LEN);
    out.extend_from_slice(nonce);
    out.extend_from_slice(body);
    out.extend_from_slice(session_id.as_bytes());
    out
}
