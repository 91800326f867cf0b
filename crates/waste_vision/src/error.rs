use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No image loaded")]
    NoImageLoaded,

    #[error("Feature computation failed: {0}")]
    Feature(#[from] FeatureError),

    #[error("Batch task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure inside a single feature block. These never escape the extractors:
/// the block is replaced by its zero fallback and a warning is logged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeatureError {
    #[error("region '{0}' is empty")]
    EmptyRegion(&'static str),

    #[error("{0} produced a non-finite value")]
    NonFinite(&'static str),

    #[error("block '{block}' produced {actual} keys, expected {expected}")]
    ShapeMismatch {
        block: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{0}")]
    Primitive(String),
}

impl AnalysisError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
pub type FeatureResult<T> = std::result::Result<T, FeatureError>;
