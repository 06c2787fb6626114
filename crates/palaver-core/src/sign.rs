//! Detached identity signatures over canonical item bytes.
//!
//! The codec only moves signatures around; which key a [`SignerId`] maps
//! to, and whether that identity is trusted, is the identity
//! collaborator's decision in the relay crate.

use bytes::{Bytes, BytesMut};
use ed25519_dalek::{Signature as DalekSignature, VerifyingKey};

use crate::error::Result;
use crate::id::SignerId;
use crate::wire;

/// Byte length of a well-formed Ed25519 signature.
pub const SIGNATURE_LEN: usize = 64;

/// Detached signature carried by bouncing objects and DH key items.
///
/// Wire layout: 16-byte signer id, then u32-length-prefixed signature
/// bytes. The length prefix tolerates foreign signature schemes on
/// decode; verification only ever succeeds for 64-byte Ed25519 material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySignature {
    pub signer: SignerId,
    pub bytes: Vec<u8>,
}

impl KeySignature {
    pub fn encoded_len(&self) -> usize {
        SignerId::LEN + wire::prefixed_len(self.bytes.len())
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.extend_from_slice(self.signer.as_bytes());
        wire::put_bytes(buf, &self.bytes, "signature")
    }

    pub fn decode(buf: &mut Bytes) -> Result<Self> {
        let signer = SignerId::from_bytes(wire::get_array(buf, "signature.signer")?);
        let bytes = wire::get_bytes(buf, "signature.bytes")?.to_vec();
        Ok(Self { signer, bytes })
    }
}

/// Verify a detached signature over `signed` against `key`.
///
/// Malformed signature bytes count as verification failure, not as a
/// decode error: by the time we are here the item parsed fine and the
/// question is purely whether the claimed identity produced it.
pub fn verify_detached(key: &VerifyingKey, signed: &[u8], sig: &KeySignature) -> bool {
    let raw: [u8; SIGNATURE_LEN] = match sig.bytes.as_slice().try_into() {
        Ok(raw) => raw,
        Err(_) => return false,
    };
    key.verify_strict(signed, &DalekSignature::from_bytes(&raw))
        .is_ok()
}
