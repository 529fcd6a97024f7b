use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Transient failures worth another attempt. Credentials and configuration
    /// problems will not fix themselves between attempts.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Network(_) | AppError::Parse(_) => true,
            AppError::Status { status, .. } => *status >= 500 || *status == 429,
            AppError::Auth(_) | AppError::Config(_) | AppError::Io(_) => false,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Parse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
