use crate::types::{BlendMode, GradientKind, ImageKind};

#[derive(Debug, thiserror::Error)]
pub enum PrinterError {
    #[error("{operation} is not valid while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Unbalanced group: {0}")]
    UnbalancedGroup(&'static str),

    #[error("Invalid page: {0}")]
    InvalidPage(String),

    #[error("Malformed path: {0}")]
    MalformedPath(String),

    #[error("Unsupported gradient kind {0:?}")]
    UnsupportedGradient(GradientKind),

    #[error("Unsupported paint: {0}")]
    UnsupportedPaint(String),

    #[error("Unsupported image kind {0:?}")]
    UnsupportedImage(ImageKind),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Unsupported group: blend {blend:?}, opacity {opacity}")]
    InvalidGroup { blend: BlendMode, opacity: f64 },

    #[error("Font error: {0}")]
    Font(String),

    #[error("Text error: {0}")]
    Text(String),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PrinterError>;
