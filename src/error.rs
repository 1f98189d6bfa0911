//! Error types for the sphere tracer.

use thiserror::Error;

/// Main error type for scene generation and the render loop.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed range or probability in the settings
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// GPU image or buffer could not be (re)allocated this frame
    #[error("Resource allocation failed: {0}")]
    ResourceAllocation(String),

    /// Ray-tracing kernel prerequisites are missing or the dispatch failed
    #[error("Kernel dispatch failed: {0}")]
    KernelDispatch(String),

    /// Swapchain surface acquisition failed
    #[error("Surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    /// Create an invalid-configuration error from a message.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}

/// Result type alias for sphere tracer operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::invalid("metal_chance must be in [0, 1]");
        assert!(e.to_string().contains("metal_chance"));

        let e = Error::KernelDispatch("no scene uploaded".into());
        assert!(e.to_string().contains("no scene uploaded"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
