//! Distant-chat handshake item: a signed ephemeral Diffie-Hellman public
//! value sent through the relay path.

use bytes::{Bytes, BytesMut};

use crate::error::Result;
use crate::id::SignerId;
use crate::sign::KeySignature;
use crate::wire;

/// A signer's long-term public key, carried so the receiver can check the
/// signature is self-consistent. Trust in the key itself is established
/// elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerKey {
    pub signer: SignerId,
    /// Raw verifying key bytes (Ed25519, 32 bytes when valid).
    pub key: Vec<u8>,
}

impl SignerKey {
    pub fn encoded_len(&self) -> usize {
        SignerId::LEN + wire::prefixed_len(self.key.len())
    }

    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.extend_from_slice(self.signer.as_bytes());
        wire::put_bytes(buf, &self.key, "signer_key.key")
    }

    fn decode(buf: &mut Bytes) -> Result<Self> {
        let signer = SignerId::from_bytes(wire::get_array(buf, "signer_key.signer")?);
        let key = wire::get_bytes(buf, "signer_key.key")?.to_vec();
        Ok(Self { signer, key })
    }
}

/// The public Diffie-Hellman value exchanged when negotiating a distant
/// chat session over relays.
///
/// The public value travels as a length-prefixed big-endian byte string;
/// the signature covers exactly those raw bytes. Move-only: the key
/// material has a single owner and is never implicitly duplicated.
#[derive(Debug, PartialEq, Eq)]
pub struct DhPublicKeyItem {
    /// Big-endian bytes of the ephemeral public value.
    pub public_value: Vec<u8>,
    /// Signature over `public_value`, by the sender's long-term key.
    pub signature: KeySignature,
    /// Long-term public key of the signer.
    pub signer_key: SignerKey,
}

impl DhPublicKeyItem {
    pub fn encoded_len(&self) -> usize {
        wire::prefixed_len(self.public_value.len())
            + self.signature.encoded_len()
            + self.signer_key.encoded_len()
    }

    pub fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        wire::put_bytes(buf, &self.public_value, "dh.public_value")?;
        self.signature.encode(buf)?;
        self.signer_key.encode(buf)
    }

    pub fn decode_payload(buf: &mut Bytes) -> Result<Self> {
        let public_value = wire::get_bytes(buf, "dh.public_value")?.to_vec();
        let signature = KeySignature::decode(buf)?;
        let signer_key = SignerKey::decode(buf)?;
        Ok(Self {
            public_value,
            signature,
            signer_key,
        })
    }
}
