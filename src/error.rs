use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForwarderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Ingest failed: {status} {status_text} - {body}")]
    Delivery {
        status: u16,
        status_text: String,
        body: String,
    },

    #[error("Transform plugin error: {0}")]
    Transform(String),
}

pub type Result<T> = std::result::Result<T, ForwarderError>;
