//! Seam to the identity collaborator.
//!
//! Peer authentication and identity issuance live outside this
//! subsystem; the protocol only needs key lookup, trust decisions, local
//! signing, and the lobby challenge transform. [`MemoryIdentity`] is an
//! in-memory reference implementation used by tests and single-process
//! deployments.

use dashmap::{DashMap, DashSet};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;

use palaver_core::error::Result;
use palaver_core::id::{PeerId, SignerId};
use palaver_core::sign::KeySignature;

/// Identity collaborator seam.
pub trait IdentityDirectory: Send + Sync {
    /// Signer id of the local identity.
    fn local_signer(&self) -> SignerId;

    /// Display name claimed by the local identity.
    fn local_nick(&self) -> String;

    /// Raw verifying key bytes of the local identity.
    fn local_verifying_key(&self) -> VerifyingKey;

    /// Sign a canonical byte range with the local long-term key.
    fn sign(&self, payload: &[u8]) -> Result<KeySignature>;

    /// Verifying key for a signer, if known.
    fn verifying_key(&self, signer: &SignerId) -> Option<VerifyingKey>;

    /// Whether a signer's long-term identity is independently trusted.
    fn is_trusted(&self, signer: &SignerId) -> bool;

    /// Answer a lobby connection challenge addressed to us. The transform
    /// rule is owned by the identity layer, not by the protocol.
    fn answer_challenge(&self, code: u64) -> u64;

    /// Check a peer's answer to a challenge we issued.
    fn check_challenge(&self, peer: &PeerId, code: u64, answer: u64) -> bool;
}

/// In-memory identity directory backed by an Ed25519 keypair.
pub struct MemoryIdentity {
    signer: SignerId,
    nick: String,
    signing: SigningKey,
    known: DashMap<SignerId, VerifyingKey>,
    trusted: DashSet<SignerId>,
    peer_signers: DashMap<PeerId, SignerId>,
}

impl MemoryIdentity {
    /// Generate a fresh identity with a random keypair. The signer id is
    /// the leading bytes of the verifying key.
    pub fn generate(nick: impl Into<String>) -> Self {
        let signing = SigningKey::generate(&mut OsRng);
        let vk = signing.verifying_key();
        let mut id = [0u8; 16];
        id.copy_from_slice(&vk.to_bytes()[..16]);
        let signer = SignerId::from_bytes(id);
        let me = Self {
            signer,
            nick: nick.into(),
            signing,
            known: DashMap::new(),
            trusted: DashSet::new(),
            peer_signers: DashMap::new(),
        };
        // We always know and trust ourselves.
        me.known.insert(signer, vk);
        me.trusted.insert(signer);
        me
    }

    /// Learn another identity's verifying key.
    pub fn add_known(&self, signer: SignerId, key: VerifyingKey) {
        self.known.insert(signer, key);
    }

    /// Mark a known identity as trusted.
    pub fn add_trusted(&self, signer: SignerId) {
        self.trusted.insert(signer);
    }

    /// Bind an overlay peer to the identity it authenticated as.
    pub fn bind_peer(&self, peer: PeerId, signer: SignerId) {
        self.peer_signers.insert(peer, signer);
    }

    fn mask_for(signer: &SignerId) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&signer.as_bytes()[..8]);
        u64::from_be_bytes(raw)
    }
}

impl IdentityDirectory for MemoryIdentity {
    fn local_signer(&self) -> SignerId {
        self.signer
    }

    fn local_nick(&self) -> String {
        self.nick.clone()
    }

    fn local_verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    fn sign(&self, payload: &[u8]) -> Result<KeySignature> {
        let sig = self.signing.sign(payload);
        Ok(KeySignature {
            signer: self.signer,
            bytes: sig.to_bytes().to_vec(),
        })
    }

    fn verifying_key(&self, signer: &SignerId) -> Option<VerifyingKey> {
        self.known.get(signer).map(|k| *k.value())
    }

    fn is_trusted(&self, signer: &SignerId) -> bool {
        self.trusted.contains(signer)
    }

    fn answer_challenge(&self, code: u64) -> u64 {
        code ^ Self::mask_for(&self.signer)
    }

    fn check_challenge(&self, peer: &PeerId, code: u64, answer: u64) -> bool {
        let Some(signer) = self.peer_signers.get(peer).map(|s| *s.value()) else {
            return false;
        };
        answer == code ^ Self::mask_for(&signer)
    }
}

/// Convenience for tests and bootstrap: make `a` and `b` mutually known
/// and trusted.
pub fn introduce(a: &MemoryIdentity, b: &MemoryIdentity) {
    a.add_known(b.local_signer(), b.local_verifying_key());
    a.add_trusted(b.local_signer());
    b.add_known(a.local_signer(), a.local_verifying_key());
    b.add_trusted(a.local_signer());
}
