use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("core error: {0}")]
    Core(#[from] friday_voice_core::CoreError),

    #[error("collaborator timed out")]
    Timeout,

    #[error("collaborator process failed: {0}")]
    Process(String),

    #[error("collaborator http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("collaborator returned unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("no collaborator configured for this capability")]
    NotConfigured,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
