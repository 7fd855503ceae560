use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallbookError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Recognition error: {0}")]
    Recognition(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Capture device error: {0}")]
    CaptureDevice(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CallbookError>;
