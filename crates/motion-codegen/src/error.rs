//! Generation errors

/// Failure to obtain usable scene source
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Backend unreachable or transport failure
    #[error("model backend unreachable: {0}")]
    Transport(String),

    /// Backend answered with a non-success status
    #[error("model backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Response body did not have the expected shape
    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    /// Model returned nothing usable
    #[error("model returned empty source")]
    Empty,

    /// Source does not parse
    #[error("generated source has a syntax error near line {line}")]
    Syntax { line: usize },

    /// Source parses but lacks the fixed scene class
    #[error("generated source does not define scene class `{expected}`")]
    MissingEntryPoint { expected: &'static str },

    /// Adapter misconfiguration
    #[error("generator configuration error: {0}")]
    Config(String),
}

impl GenerationError {
    /// Check if another attempt may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Empty => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
