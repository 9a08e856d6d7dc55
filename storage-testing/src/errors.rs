use thiserror::Error;

#[derive(Debug, Error)]
pub enum TestingError {
    #[error("layout not found for '{layout_name}' in resources/layouts")]
    LayoutNotFound { layout_name: String },
    #[error("invalid layout '{layout_name}': {reason}")]
    LayoutInvalid { layout_name: String, reason: String },
}

pub type Result<T> = std::result::Result<T, TestingError>;
