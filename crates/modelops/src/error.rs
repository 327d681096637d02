use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Network failure, timeout, or an undecodable body.
    #[error("transport error: {0}")]
    Transport(String),
    /// Backend answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    /// Backend answered 2xx but reported an `error` field.
    #[error("{0}")]
    Application(String),
    #[error("config error: {0}")]
    Config(String),
}

impl ClientError {
    /// Transport and HTTP failures are both transport-class.
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::Http { .. })
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => ClientError::Http {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None => ClientError::Transport(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
