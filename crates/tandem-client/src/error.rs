use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Network failure or undecodable body
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    #[error("server rejected request with status {status}")]
    Rejected { status: u16 },
}

impl ClientError {
    /// Transport failures and 503s are worth retrying on the next trigger.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected { status } => *status == 503,
            Self::InvalidUrl(_) => false,
        }
    }
}
