/// Why a fetch failed.
///
/// Fetches are shared between every caller waiting on the same key, so errors are `Clone` and carry their messages
/// as strings rather than boxing the underlying error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The host refused or failed to run a command.
    #[error("{command} failed: {message}")]
    Invoke { command: String, message: String },
    /// The host answered, but not with something we could use.
    #[error("{command} returned an unexpected response: {message}")]
    Malformed { command: String, message: String },
    #[error("{0}")]
    Failed(String),
}

impl FetchError {
    pub fn failed(message: impl std::fmt::Display) -> FetchError {
        FetchError::Failed(message.to_string())
    }
}
