//! Error types for the protocol layer.
//!
//! Each crate in Quizforge defines its own error enum. A `ProtocolError`
//! always means the problem is in serialization or message validation,
//! not in networking or room management.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, an unknown `type` tag, or a field
    /// with the wrong data type.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message decoded but violates protocol rules.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A question record failed validation.
    #[error("invalid question: {0}")]
    InvalidQuestion(String),
}
