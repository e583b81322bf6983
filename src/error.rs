use thiserror::Error;

#[derive(Debug, Error)]
pub enum NestEggError {
    #[error("Invalid goal: {0}")]
    InvalidGoal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NestEggError>;
