use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ChronoError {
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Fast queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("Invalid job specification: {0}")]
    InvalidSpec(String),
}

pub type Result<T> = std::result::Result<T, ChronoError>;
