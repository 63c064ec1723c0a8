/// Core error type for the moderation pipeline.
///
/// Adapter crates map their specific errors into this type so the dispatcher
/// can convert every failure into a safe decision, a chat notice or a log line.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("detection error: {0}")]
    Detection(String),

    #[error("classification error: {0}")]
    Classification(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("enforcement error: {0}")]
    Enforcement(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
