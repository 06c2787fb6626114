//! Distant-chat handshake: a Diffie-Hellman exchange relayed through
//! intermediate peers that must not learn the negotiated secret.
//!
//! Per session the state moves
//! `Initiated → KeySent → KeyReceived → SharedSecretDerived`, or to
//! `Failed` on bad signature, malformed key, untrusted signer, or
//! timeout. The ephemeral private exponent and the derived secret live
//! only as long as the session and are wiped on teardown.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use ed25519_dalek::VerifyingKey;
use rand::rngs::OsRng;
use zeroize::{Zeroize, ZeroizeOnDrop};

use palaver_core::error::{HandshakeFailure, PalaverError, Result};
use palaver_core::id::DistantSessionId;
use palaver_core::item::{DhPublicKeyItem, SignerKey};
use palaver_core::sign::verify_detached;

use crate::config::DistantSection;
use crate::identity::IdentityDirectory;
use crate::obs::RelayMetrics;

/// Byte length of a well-formed public value on the wire.
pub const DH_PUBLIC_LEN: usize = 32;

/// Shared secret derived from a completed handshake. Wiped on drop; not
/// cloneable, handed to the caller exactly once.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhSessionState {
    Initiated,
    KeySent,
    KeyReceived,
    SharedSecretDerived,
    Failed(HandshakeFailure),
}

struct DhSession {
    state: DhSessionState,
    /// Ephemeral private exponent. `x25519_dalek::StaticSecret` rather
    /// than `EphemeralSecret` because the public half must be extractable
    /// before the DH combination; it still zeroizes on drop.
    secret: Option<x25519_dalek::StaticSecret>,
    shared: Option<SharedSecret>,
    started: Instant,
}

impl DhSession {
    fn fresh(state: DhSessionState, secret: x25519_dalek::StaticSecret, now: Instant) -> Self {
        Self {
            state,
            secret: Some(secret),
            shared: None,
            started: now,
        }
    }

    /// Discard partial state: the private exponent drops (and zeroizes)
    /// here, the derived secret likewise if never taken.
    fn wipe(&mut self) {
        self.secret = None;
        self.shared = None;
    }
}

/// Session table for distant-chat handshakes. Per-session operations are
/// serialized by the per-entry mutex.
pub struct DhSessionManager {
    identity: Arc<dyn IdentityDirectory>,
    timeout: Duration,
    metrics: Arc<RelayMetrics>,
    sessions: DashMap<DistantSessionId, Mutex<DhSession>>,
}

impl DhSessionManager {
    pub fn new(
        cfg: &DistantSection,
        identity: Arc<dyn IdentityDirectory>,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            identity,
            timeout: Duration::from_secs(cfg.handshake_timeout_secs),
            metrics,
            sessions: DashMap::new(),
        }
    }

    /// Start a session as initiator: generate an ephemeral pair, sign the
    /// public value with the long-term identity key, and return the item
    /// to send down the relay path. State: `KeySent`.
    pub fn initiate(&self, session: DistantSessionId) -> Result<DhPublicKeyItem> {
        if self.sessions.contains_key(&session) {
            return Err(PalaverError::Internal(format!(
                "distant session {session:#x} already exists"
            )));
        }
        let secret = x25519_dalek::StaticSecret::random_from_rng(OsRng);
        let item = self.signed_public_item(&secret)?;
        self.sessions.insert(
            session,
            Mutex::new(DhSession::fresh(
                DhSessionState::KeySent,
                secret,
                Instant::now(),
            )),
        );
        Ok(item)
    }

    fn signed_public_item(&self, secret: &x25519_dalek::StaticSecret) -> Result<DhPublicKeyItem> {
        let public = x25519_dalek::PublicKey::from(secret);
        let public_value = public.as_bytes().to_vec();
        let signature = self.identity.sign(&public_value)?;
        Ok(DhPublicKeyItem {
            public_value,
            signature,
            signer_key: SignerKey {
                signer: self.identity.local_signer(),
                key: self.identity.local_verifying_key().to_bytes().to_vec(),
            },
        })
    }

    /// Handle a peer's signed public value for `session`.
    ///
    /// As initiator (session exists in `KeySent`) this completes the
    /// exchange. As responder (unknown session) it creates the session,
    /// derives immediately, and returns our own signed public value to
    /// send back.
    pub fn handle_public_key(
        &self,
        session: DistantSessionId,
        item: &DhPublicKeyItem,
    ) -> Result<Option<DhPublicKeyItem>> {
        match self.check_peer_item(item) {
            Ok(peer_public) => self.complete(session, peer_public),
            Err(failure) => {
                self.fail(session, failure);
                self.metrics
                    .handshake
                    .inc(&[("result", failure_label(failure))]);
                Err(PalaverError::Handshake(failure))
            }
        }
    }

    /// Validate signer trust, signature, and key shape. Returns the
    /// peer's public key on success.
    fn check_peer_item(
        &self,
        item: &DhPublicKeyItem,
    ) -> std::result::Result<x25519_dalek::PublicKey, HandshakeFailure> {
        // The embedded signer key must be self-consistent AND
        // independently trusted; this component never establishes trust
        // roots itself.
        if !self.identity.is_trusted(&item.signer_key.signer) {
            return Err(HandshakeFailure::UntrustedSigner);
        }
        let key_bytes: [u8; 32] = item
            .signer_key
            .key
            .as_slice()
            .try_into()
            .map_err(|_| HandshakeFailure::MalformedKey)?;
        let verifying =
            VerifyingKey::from_bytes(&key_bytes).map_err(|_| HandshakeFailure::MalformedKey)?;
        match self.identity.verifying_key(&item.signer_key.signer) {
            Some(known) if known == verifying => {}
            _ => return Err(HandshakeFailure::UntrustedSigner),
        }

        if !verify_detached(&verifying, &item.public_value, &item.signature) {
            return Err(HandshakeFailure::BadSignature);
        }

        let public: [u8; DH_PUBLIC_LEN] = item
            .public_value
            .as_slice()
            .try_into()
            .map_err(|_| HandshakeFailure::MalformedKey)?;
        Ok(x25519_dalek::PublicKey::from(public))
    }

    fn complete(
        &self,
        session: DistantSessionId,
        peer_public: x25519_dalek::PublicKey,
    ) -> Result<Option<DhPublicKeyItem>> {
        if let Some(entry) = self.sessions.get(&session) {
            // Initiator side: we already sent our key.
            let mut guard = entry
                .lock()
                .map_err(|_| PalaverError::Internal("session lock poisoned".into()))?;
            if !matches!(
                guard.state,
                DhSessionState::Initiated | DhSessionState::KeySent
            ) {
                return Err(PalaverError::Internal(format!(
                    "distant session {session:#x} in state {:?}",
                    guard.state
                )));
            }
            guard.state = DhSessionState::KeyReceived;
            self.derive(&mut guard, peer_public)?;
            return Ok(None);
        }

        // Responder side: first sight of this session.
        let secret = x25519_dalek::StaticSecret::random_from_rng(OsRng);
        let reply = self.signed_public_item(&secret)?;
        let mut fresh = DhSession::fresh(DhSessionState::KeyReceived, secret, Instant::now());
        self.derive(&mut fresh, peer_public)?;
        self.sessions.insert(session, Mutex::new(fresh));
        Ok(Some(reply))
    }

    fn derive(
        &self,
        sess: &mut DhSession,
        peer_public: x25519_dalek::PublicKey,
    ) -> Result<()> {
        let Some(secret) = sess.secret.take() else {
            return Err(PalaverError::Internal("private exponent missing".into()));
        };
        let shared = secret.diffie_hellman(&peer_public);
        // The private exponent is gone (zeroized on drop of `secret`).
        if !shared.was_contributory() {
            sess.state = DhSessionState::Failed(HandshakeFailure::MalformedKey);
            self.metrics.handshake.inc(&[("result", "malformed_key")]);
            return Err(PalaverError::Handshake(HandshakeFailure::MalformedKey));
        }
        sess.shared = Some(SharedSecret(*shared.as_bytes()));
        sess.state = DhSessionState::SharedSecretDerived;
        self.metrics.handshake.inc(&[("result", "derived")]);
        Ok(())
    }

    /// Mark a session failed, creating a terminal record if the peer's
    /// very first frame was already bad.
    fn fail(&self, session: DistantSessionId, failure: HandshakeFailure) {
        let entry = self.sessions.entry(session).or_insert_with(|| {
            Mutex::new(DhSession {
                state: DhSessionState::Failed(failure),
                secret: None,
                shared: None,
                started: Instant::now(),
            })
        });
        if let Ok(mut guard) = entry.lock() {
            guard.wipe();
            guard.state = DhSessionState::Failed(failure);
        };
    }

    /// Hand the derived secret to the caller, exactly once.
    pub fn take_shared_secret(&self, session: DistantSessionId) -> Option<SharedSecret> {
        let entry = self.sessions.get(&session)?;
        let mut guard = entry.lock().ok()?;
        guard.shared.take()
    }

    pub fn state(&self, session: DistantSessionId) -> Option<DhSessionState> {
        let entry = self.sessions.get(&session)?;
        let guard = entry.lock().ok()?;
        Some(guard.state)
    }

    /// Abort on peer disconnect: partial state is discarded, the session
    /// forgotten.
    pub fn abort(&self, session: DistantSessionId) {
        if let Some((_, sess)) = self.sessions.remove(&session) {
            if let Ok(mut guard) = sess.lock() {
                guard.wipe();
            }
        }
    }

    /// Move timed-out non-terminal sessions to `Failed(Timeout)`, wiping
    /// partial state.
    pub fn expire(&self, now: Instant) {
        for entry in self.sessions.iter() {
            let Ok(mut guard) = entry.value().lock() else {
                continue;
            };
            let terminal = matches!(
                guard.state,
                DhSessionState::SharedSecretDerived | DhSessionState::Failed(_)
            );
            if !terminal && now.duration_since(guard.started) > self.timeout {
                guard.wipe();
                guard.state = DhSessionState::Failed(HandshakeFailure::Timeout);
                self.metrics.handshake.inc(&[("result", "timeout")]);
            }
        }
    }

    /// Drop failed sessions that have been terminal for a while.
    pub fn sweep_failed(&self) {
        self.sessions
            .retain(|_, sess| match sess.get_mut() {
                Ok(guard) => !matches!(guard.state, DhSessionState::Failed(_)),
                Err(_) => false,
            });
    }
}

fn failure_label(f: HandshakeFailure) -> &'static str {
    match f {
        HandshakeFailure::BadSignature => "bad_signature",
        HandshakeFailure::MalformedKey => "malformed_key",
        HandshakeFailure::UntrustedSigner => "untrusted_signer",
        HandshakeFailure::Timeout => "timeout",
    }
}
