use thiserror::Error;

/// All faults generated by the goldscale core.
///
/// No variant is fatal to the process: every fault maps to a recovery
/// policy, and component boundaries return these as values rather than
/// panicking.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// Network or connection-level failure. Retried after a fixed delay.
    #[error("transport fault: {0}")]
    Transport(String),

    /// Malformed or unexpected payload. The single message is dropped and
    /// the connection stays open.
    #[error("protocol fault: {0}")]
    Protocol(String),

    /// Credential missing or rejected by the backend. The session is
    /// re-acquired and the dependent operation retried.
    #[error("session fault: {0}")]
    Session(#[from] SessionError),

    /// Storage read or parse failure. Falls back to embedded defaults.
    #[error("config fault: {0}")]
    Config(String),
}

/// How a [`Fault`] should be recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Retry the failed operation after its fixed per-feed delay.
    RetryAfterDelay,
    /// Drop the offending message, keep the connection.
    DropMessage,
    /// Re-acquire the session credential, then retry.
    RefreshSession,
    /// Use the embedded default value.
    UseDefault,
}

impl Fault {
    /// Map a fault to its recovery policy.
    pub fn recovery(&self) -> Recovery {
        match self {
            Fault::Transport(_) => Recovery::RetryAfterDelay,
            Fault::Protocol(_) => Recovery::DropMessage,
            Fault::Session(_) => Recovery::RefreshSession,
            Fault::Config(_) => Recovery::UseDefault,
        }
    }
}

/// Failures while acquiring a session credential.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The session endpoint could not be reached.
    #[error("session request failed: {0}")]
    Request(String),

    /// The session endpoint answered with a non-success status.
    #[error("session creation failed with status {0}")]
    Status(u16),

    /// The response was missing one or both token headers.
    #[error("missing session tokens in response headers")]
    MissingTokens,

    /// The backend rejected the active credential mid-use.
    #[error("session token rejected: {0}")]
    Rejected(String),
}
