use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Dataset is empty: nothing to export")]
    EmptyDataset,

    #[error("Row '{filename}' is missing its filename")]
    MissingFilename { filename: String },

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DatasetError>;
