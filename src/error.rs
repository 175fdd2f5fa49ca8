use thiserror::Error;

pub type Result<T> = std::result::Result<T, CertError>;

#[derive(Debug, Error)]
pub enum CertError {
    #[error("capture failed: {0}")]
    Capture(String),

    #[error("image encode failed: {0}")]
    Encode(String),

    #[error("pdf compose failed: {0}")]
    Compose(String),

    #[error("save failed: {0}")]
    Deliver(String),

    #[error("asset error: {0}")]
    Asset(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("unknown form field: {0}")]
    UnknownField(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<lopdf::Error> for CertError {
    fn from(err: lopdf::Error) -> Self {
        CertError::Compose(err.to_string())
    }
}

impl From<image::ImageError> for CertError {
    fn from(err: image::ImageError) -> Self {
        CertError::Encode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_stage_prefix() {
        let err = CertError::Capture("pixmap allocation".to_string());
        assert_eq!(err.to_string(), "capture failed: pixmap allocation");
        let err = CertError::UnknownField("nickname".to_string());
        assert_eq!(err.to_string(), "unknown form field: nickname");
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: CertError = io_err.into();
        assert!(matches!(err, CertError::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
