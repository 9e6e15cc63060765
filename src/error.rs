//! Error types for the provider, renderer, and export boundaries.
//!
//! Stale or unknown layer ids are never errors: layer operations ignore them.

use thiserror::Error;

/// Outcome of a segmentation request that did not yield layers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SegmentError {
    /// The provider found no objects.  Transient: the session resets itself.
    #[error("{0}")]
    EmptyResult(String),

    /// Network/server failure or a malformed payload.  Persistent until the
    /// next user action.
    #[error("Segmentation failed: {0}")]
    Provider(String),
}

impl SegmentError {
    pub fn empty() -> Self {
        SegmentError::EmptyResult(
            "No segmentations were detected in this image. Please try a different image with clear objects."
                .to_string(),
        )
    }

    /// `true` for the empty-state outcome, which auto-recovers.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SegmentError::EmptyResult(_))
    }
}

/// GPU renderer failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// No GPU backend in this environment.  Never retried within a session.
    #[error("GPU rendering is not supported here: {0}")]
    Unsupported(String),

    /// Adapter or device acquisition failed.  Never retried within a session.
    #[error("GPU device error: {0}")]
    Device(String),

    /// Texture / target / readback failure mid-session (e.g. context lost).
    #[error("GPU resource error: {0}")]
    Resource(String),

    /// Operation issued while the renderer is not `Ready`.
    #[error("renderer is {0}")]
    NotReady(&'static str),
}

impl RenderError {
    /// Unsupported and Device errors require a capable environment; the
    /// caller shows the fallback UI and does not retry.
    pub fn is_fatal_for_session(&self) -> bool {
        matches!(self, RenderError::Unsupported(_) | RenderError::Device(_))
    }
}

/// Export failures.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("no base image or no visible segments to export")]
    NothingToExport,

    #[error("PNG encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverability_follows_taxonomy() {
        assert!(SegmentError::empty().is_recoverable());
        assert!(!SegmentError::Provider("timeout".into()).is_recoverable());

        assert!(RenderError::Unsupported("no backend".into()).is_fatal_for_session());
        assert!(RenderError::Device("no adapter".into()).is_fatal_for_session());
        assert!(!RenderError::Resource("lost".into()).is_fatal_for_session());
        assert!(!RenderError::NotReady("destroyed").is_fatal_for_session());
    }

    #[test]
    fn error_display_messages() {
        let err = SegmentError::Provider("Server error: 500".to_string());
        assert_eq!(err.to_string(), "Segmentation failed: Server error: 500");

        let err = RenderError::NotReady("uninitialized");
        assert_eq!(err.to_string(), "renderer is uninitialized");

        assert!(SegmentError::empty().to_string().starts_with("No segmentations"));
    }
}
