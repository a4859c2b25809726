use thiserror::Error;

#[derive(Error, Debug)]
pub enum VidUtilsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required option: {0}")]
    MissingOption(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Media processing error: {0}")]
    Media(String),

    #[error("Media tool not found: {0}")]
    BinaryNotFound(String),

    #[error("A batch is already running")]
    BatchAlreadyRunning,
}

impl VidUtilsError {
    /// Errors raised while validating a job before anything is executed.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            VidUtilsError::Config(_)
                | VidUtilsError::MissingOption(_)
                | VidUtilsError::UnsupportedFormat(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, VidUtilsError>;
