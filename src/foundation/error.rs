use std::time::Duration;

/// Convenience result type used across the pipeline.
pub type ReelResult<T> = Result<T, ReelError>;

/// Terminal failure taxonomy for a render job.
///
/// Every variant is terminal for the job that produced it; nothing here is retried by the
/// pipeline itself.
#[derive(thiserror::Error, Debug)]
pub enum ReelError {
    /// The isolated execution environment could not be acquired.
    #[error("environment unavailable: {0}")]
    EnvironmentUnavailable(String),

    /// The sandboxed renderer did not publish output within the wait window.
    #[error("render timed out after {}s", .0.as_secs_f64())]
    RenderTimeout(Duration),

    /// A frame could not be decoded into an image buffer.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The external encoder process could not be started.
    #[error("encoder unavailable: {0}")]
    EncoderUnavailable(String),

    /// The encoder exited non-zero or stopped accepting frames.
    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    /// The sandboxed renderer crashed or produced unusable output.
    #[error("sandbox fault: {0}")]
    SandboxFault(String),

    /// The caller withdrew the job before it finished.
    #[error("job cancelled")]
    Cancelled,

    /// Invalid configuration or caller-provided data.
    #[error("validation error: {0}")]
    Validation(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Stable, caller-facing classification of a [`ReelError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    EnvironmentUnavailable,
    RenderTimeout,
    MalformedFrame,
    EncoderUnavailable,
    EncodingFailed,
    SandboxFault,
    Cancelled,
    Validation,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EnvironmentUnavailable => "EnvironmentUnavailable",
            Self::RenderTimeout => "RenderTimeout",
            Self::MalformedFrame => "MalformedFrame",
            Self::EncoderUnavailable => "EncoderUnavailable",
            Self::EncodingFailed => "EncodingFailed",
            Self::SandboxFault => "SandboxFault",
            Self::Cancelled => "Cancelled",
            Self::Validation => "Validation",
            Self::Internal => "Internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ReelError {
    /// Build a [`ReelError::EnvironmentUnavailable`] value.
    pub fn environment_unavailable(msg: impl Into<String>) -> Self {
        Self::EnvironmentUnavailable(msg.into())
    }

    /// Build a [`ReelError::MalformedFrame`] value.
    pub fn malformed_frame(msg: impl Into<String>) -> Self {
        Self::MalformedFrame(msg.into())
    }

    /// Build a [`ReelError::EncoderUnavailable`] value.
    pub fn encoder_unavailable(msg: impl Into<String>) -> Self {
        Self::EncoderUnavailable(msg.into())
    }

    /// Build a [`ReelError::EncodingFailed`] value.
    pub fn encoding_failed(msg: impl Into<String>) -> Self {
        Self::EncodingFailed(msg.into())
    }

    /// Build a [`ReelError::SandboxFault`] value.
    pub fn sandbox_fault(msg: impl Into<String>) -> Self {
        Self::SandboxFault(msg.into())
    }

    /// Build a [`ReelError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Classify this error for callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EnvironmentUnavailable(_) => ErrorKind::EnvironmentUnavailable,
            Self::RenderTimeout(_) => ErrorKind::RenderTimeout,
            Self::MalformedFrame(_) => ErrorKind::MalformedFrame,
            Self::EncoderUnavailable(_) => ErrorKind::EncoderUnavailable,
            Self::EncodingFailed(_) => ErrorKind::EncodingFailed,
            Self::SandboxFault(_) => ErrorKind::SandboxFault,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Other(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
