use std::fmt;

use reqwest::StatusCode;

#[derive(Debug)]
pub enum OpencodeApiError {
    /// Model override was not of the form `provider/model`.
    InvalidModel(String),
    Request(reqwest::Error),
    Status(StatusCode, String),
    /// HTTP 200 with a zero-length body.
    EmptyBody,
    /// Provider reported the conversation no longer fits its window.
    ContextExceeded,
    MissingSessionId,
    Cancelled,
}

impl OpencodeApiError {
    /// True for request timeouts, which callers surface separately from
    /// generic network failures.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Request(error) if error.is_timeout())
    }
}

impl fmt::Display for OpencodeApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidModel(value) => {
                write!(f, "model override must be 'provider/model', got: {value}")
            }
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Status(status, message) => write!(f, "API error: {status} - {message}"),
            Self::EmptyBody => write!(f, "OpenCode returned empty response (0 chars)"),
            Self::ContextExceeded => write!(f, "Context length exceeded"),
            Self::MissingSessionId => write!(f, "session create reply carried no id"),
            Self::Cancelled => write!(f, "request was cancelled"),
        }
    }
}

impl std::error::Error for OpencodeApiError {}

impl From<reqwest::Error> for OpencodeApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}
