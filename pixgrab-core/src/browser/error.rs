use thiserror::Error;

pub type BrowserResult<T> = Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("chromium launch failed: {0}")]
    Launch(String),
    #[error("cdp error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),
    #[error("browser connection lost: {0}")]
    Crash(String),
    #[error("timeout waiting for {0}")]
    Timeout(String),
    #[error("script evaluation failed: {0}")]
    Script(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl BrowserError {
    /// Whether the underlying engine process died. Crash-class failures
    /// require a full browser recreation before the next attempt.
    pub fn is_crash(&self) -> bool {
        match self {
            BrowserError::Crash(_) => true,
            BrowserError::Cdp(err) => {
                let text = err.to_string();
                text.contains("Target closed")
                    || text.contains("Connection closed")
                    || text.contains("connection was closed")
                    || text.contains("browser has been closed")
            }
            _ => false,
        }
    }

    /// Whether the engine could not be brought up at all. Never retried:
    /// surfaced to the caller as-is.
    pub fn is_launch_failure(&self) -> bool {
        matches!(self, BrowserError::Launch(_))
    }
}
