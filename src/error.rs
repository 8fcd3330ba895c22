//! Error types for the frame render service

use thiserror::Error;

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving, rendering, or rewriting
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to start the driver or launch the browser process
    #[error("Browser launch failed: {0}")]
    Launch(String),

    /// The browser process or its control channel is gone; requires a full
    /// supervisor restart rather than a plain retry
    #[error("Browser process lost: {0}")]
    BrowserGone(String),

    /// Ordinary render failure (frame never visible, context error)
    #[error("Rendering failed: {0}")]
    Render(String),

    /// Outbound image fetch failed
    #[error("Image fetch failed: {0}")]
    Fetch(String),

    /// Upstream feed could not be fetched or rewritten
    #[error("Feed error: {0}")]
    Feed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Substrings that mark an error as fatal: the browser process or the CDP
/// channel behind it has terminated. Matched case-insensitively against the
/// stringified error exactly once, at the chrome boundary.
const FATAL_MARKERS: &[&str] = &[
    "target closed",
    "target page, context or browser has been closed",
    "handler is closed",
    "connection is closed",
    "connection closed",
    "channel is dead",
    "connection to the browser was lost",
    "unable to make method calls",
];

impl Error {
    /// Whether this error requires a full supervisor restart.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::BrowserGone(_))
    }

    /// Classify a stringified browser-side failure into the taxonomy.
    pub fn classify(msg: String) -> Error {
        let lowered = msg.to_lowercase();
        if FATAL_MARKERS.iter().any(|m| lowered.contains(m)) {
            Error::BrowserGone(msg)
        } else {
            Error::Render(msg)
        }
    }

    /// Classify an error coming out of the CDP adapter.
    pub fn from_browser(err: anyhow::Error) -> Error {
        Error::classify(err.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::from_browser(err)
    }
}
