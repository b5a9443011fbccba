//! Lodestar session crypto.
//!
//! One X25519 key pair, generated at startup and never persisted, serves
//! every beacon: each handshake derives a symmetric key via HKDF-SHA256, and
//! the session identity is the SHA-256 hash of that key. Payloads are sealed
//! with ChaCha20-Poly1305 under a fresh random 96-bit nonce per call, and
//! every envelope carries its session identity as a cleartext suffix so the
//! receiver can find the right key before attempting authentication.
//!
//! Losing this process loses every symmetric key; beacons recover by
//! re-handshaking, which re-derives the same identity from the same key
//! material.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

mod engine;
pub mod envelope;
mod error;

pub use engine::SessionCrypto;
pub use envelope::{MIN_ENVELOPE_LEN, NONCE_LEN, TAG_LEN};
pub use error::{CryptoError, CryptoResult};
