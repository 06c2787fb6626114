//! Shared error type across palaver crates.

use std::fmt;

use thiserror::Error;

/// Stable outcome codes used in logs, metrics, and test vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeCode {
    /// Header names a service we do not speak.
    UnknownService,
    /// No decoder registered for the subtype (includes deprecated values).
    UnknownSubtype,
    /// Declared length exceeds the available bytes.
    Truncated,
    /// A field violates its own encoding constraints.
    MalformedField,
    /// Signature did not verify against the claimed identity.
    SignatureInvalid,
    /// Distant-chat handshake moved to a terminal failure.
    Handshake,
    /// Configuration rejected at load time.
    Config,
    /// Internal invariant failure.
    Internal,
}

impl OutcomeCode {
    /// String representation used in logs and test vectors.
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeCode::UnknownService => "UNKNOWN_SERVICE",
            OutcomeCode::UnknownSubtype => "UNKNOWN_SUBTYPE",
            OutcomeCode::Truncated => "TRUNCATED",
            OutcomeCode::MalformedField => "MALFORMED_FIELD",
            OutcomeCode::SignatureInvalid => "SIGNATURE_INVALID",
            OutcomeCode::Handshake => "HANDSHAKE_FAILED",
            OutcomeCode::Config => "CONFIG",
            OutcomeCode::Internal => "INTERNAL",
        }
    }
}

/// Terminal reasons a distant-chat handshake session can fail.
///
/// User-visible at the session initiator only; nothing on the relay path
/// learns which of these occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeFailure {
    /// Signature over the public value did not verify.
    BadSignature,
    /// Public value (or signer key) is not a well-formed key.
    MalformedKey,
    /// Signer key is not independently trusted.
    UntrustedSigner,
    /// Session exceeded the handshake timeout.
    Timeout,
}

impl fmt::Display for HandshakeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HandshakeFailure::BadSignature => "bad signature",
            HandshakeFailure::MalformedKey => "malformed key",
            HandshakeFailure::UntrustedSigner => "untrusted signer",
            HandshakeFailure::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, PalaverError>;

/// Unified error type used by the codec and the relay runtime.
///
/// Nothing here is fatal to the process: every variant is local to one
/// item or one session.
#[derive(Debug, Error)]
pub enum PalaverError {
    #[error("unknown service id {0:#06x}")]
    UnknownService(u16),
    #[error("unknown subtype {0:#04x}")]
    UnknownSubtype(u8),
    #[error("truncated item: {0}")]
    Truncated(String),
    #[error("malformed field: {0}")]
    MalformedField(String),
    #[error("signature invalid")]
    SignatureInvalid,
    #[error("handshake failed: {0}")]
    Handshake(HandshakeFailure),
    #[error("config: {0}")]
    Config(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl PalaverError {
    /// Map an error to its stable outcome code.
    pub fn code(&self) -> OutcomeCode {
        match self {
            PalaverError::UnknownService(_) => OutcomeCode::UnknownService,
            PalaverError::UnknownSubtype(_) => OutcomeCode::UnknownSubtype,
            PalaverError::Truncated(_) => OutcomeCode::Truncated,
            PalaverError::MalformedField(_) => OutcomeCode::MalformedField,
            PalaverError::SignatureInvalid => OutcomeCode::SignatureInvalid,
            PalaverError::Handshake(_) => OutcomeCode::Handshake,
            PalaverError::Config(_) => OutcomeCode::Config,
            PalaverError::Internal(_) => OutcomeCode::Internal,
        }
    }
}
