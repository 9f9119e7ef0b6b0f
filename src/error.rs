//! Error types for the render engine

use thiserror::Error;

/// Result type alias for render engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while rendering
///
/// A missed completion marker is deliberately absent here: the marker wait
/// resolves into [`crate::WaitOutcome`] instead of an error.
#[derive(Error, Debug)]
pub enum Error {
    /// The shared browser process could not be launched
    #[error("Browser failed to start: {0}")]
    Startup(String),

    /// Failed to load the template into the rendering surface
    #[error("Template navigation failed: {0}")]
    Navigation(String),

    /// Failed to evaluate script in the page (payload injection or marker probe)
    #[error("Script evaluation failed: {0}")]
    Script(String),

    /// Failed to produce the screenshot
    #[error("Screenshot capture failed: {0}")]
    Capture(String),

    /// Invalid service configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Filesystem error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
