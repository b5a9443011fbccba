//! The session crypto engine.

use crate::envelope;
use crate::error::{CryptoError, CryptoResult};
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use dashmap::DashMap;
use hkdf::Hkdf;
use lodestar_types::SessionId;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};

/// Domain separation string for session key derivation.
const HKDF_INFO: &[u8] = b"lodestar-v1-session";

const KEY_LEN: usize = 32;
const PEER_KEY_LEN: usize = 32;

/// One key pair, unboundedly many peer sessions.
///
/// The identity-to-cipher table is insert-mostly: an entry, once published,
/// is only ever replaced by the identical cipher (a re-handshake with the
/// same key material derives the same key), so readers never observe a
/// half-updated session.
pub struct SessionCrypto {
    secret: StaticSecret,
    public: PublicKey,
    sessions: DashMap<SessionId, ChaCha20Poly1305>,
}

impl SessionCrypto {
    /// Generate a fresh key pair. Called once per coordinator lifetime; the
    /// private half never leaves this struct and is never persisted.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self {
            secret,
            public,
            sessions: DashMap::new(),
        }
    }

    /// The coordinator's public key, as sent back in every handshake reply.
    pub fn public_key(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Number of live symmetric sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn has_session(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Complete a key exchange against a peer public key.
    ///
    /// Derives the symmetric key, computes the session identity as a one-way
    /// hash of that key, and publishes the identity-to-cipher binding. Two
    /// handshakes from the same peer key material land on the same identity;
    /// that is session resumption, not a collision.
    pub fn complete_handshake(&self, peer_public: &[u8]) -> CryptoResult<SessionId> {
        let peer_bytes: [u8; PEER_KEY_LEN] = peer_public
            .try_into()
            .map_err(|_| CryptoError::InvalidPeerKey)?;
        let peer = PublicKey::from(peer_bytes);

        let shared = self.secret.diffie_hellman(&peer);
        // Low-order peer points produce an all-zero secret; refuse them.
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidPeerKey);
        }

        let hk = Hkdf::<Sha256>::new(None, shared.as_bytes());
        let mut key = [0u8; KEY_LEN];
        hk.expand(HKDF_INFO, &mut key)
            .map_err(|_| CryptoError::KeyDerivation)?;

        let digest = Sha256::digest(key);
        let id = SessionId::from_bytes(digest.into());

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        if self.sessions.insert(id, cipher).is_some() {
            tracing::info!(session = %id.short(), "handshake resumed an existing session identity");
        } else {
            tracing::debug!(session = %id.short(), "established new symmetric session");
        }

        Ok(id)
    }

    /// Seal a plaintext for the given session.
    ///
    /// The nonce is drawn from the OS random source on every call. Never a
    /// counter: a counter that resets after restart would repeat nonces
    /// under a resumed key, which breaks both confidentiality and integrity.
    pub fn seal(&self, id: &SessionId, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let cipher = self
            .sessions
            .get(id)
            .ok_or_else(|| CryptoError::UnknownSession(id.short()))?;

        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let body = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::AuthenticationFailed(id.short()))?;

        Ok(envelope::assemble(&nonce, &body, id))
    }

    /// Open a sealed envelope, returning the plaintext and the session it
    /// authenticated under.
    ///
    /// A tag mismatch yields `AuthenticationFailed` and no plaintext, ever.
    pub fn open(&self, raw: &[u8]) -> CryptoResult<(Vec<u8>, SessionId)> {
        let parts = envelope::split(raw)?;
        let id = parts.session_id;

        let cipher = self
            .sessions
            .get(&id)
            .ok_or_else(|| CryptoError::UnknownSession(id.short()))?;

        let plaintext = cipher
            .decrypt(Nonce::from_slice(parts.nonce), parts.body)
            .map_err(|_| CryptoError::AuthenticationFailed(id.short()))?;

        Ok((plaintext, id))
    }
}
