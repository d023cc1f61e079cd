use thiserror::Error;

#[derive(Debug, Error)]
pub enum BehaviorError {
    /// A required setting is missing or invalid; the behavior cannot attach.
    #[error("invalid behavior configuration: {0}")]
    Config(String),

    #[error("audit persistence failed: {0:#}")]
    Persistence(#[source] anyhow::Error),
}

pub type BehaviorResult<T> = Result<T, BehaviorError>;

impl BehaviorError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
