use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdjError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Syntax error on line {line}: {message} ('{text}')")]
    Syntax {
        line: usize,
        message: String,
        text: String,
    },

    #[error("User node {node} maps to {matches} reduced nodes, expected exactly one")]
    IndexResolution { node: usize, matches: usize },

    #[error("Cell coordinate out of bounds: {0}")]
    NodeOutOfBounds(String),

    #[error("Stress period {kper}, time step {kstp} already visited")]
    DuplicateStep { kper: usize, kstp: usize },

    #[error("Solver error: {0}")]
    Solver(String),

    #[error("Snapshot store error: {0}")]
    Store(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AdjError {
    /// Builds a [`AdjError::Syntax`] for a one-based line of the spec file.
    pub fn syntax(line: usize, message: impl Into<String>, text: &str) -> Self {
        AdjError::Syntax {
            line,
            message: message.into(),
            text: text.trim().to_string(),
        }
    }
}

pub type AdjResult<T> = Result<T, AdjError>;
