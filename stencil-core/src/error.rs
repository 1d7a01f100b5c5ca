use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StencilError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Invalid structural tag: {0}")]
    InvalidStructuralTag(String),

    #[error("Invalid grammar: {0}")]
    InvalidGrammar(String),

    #[error("Invalid regex: {0}")]
    InvalidRegex(String),

    #[error("Invalid JSON schema: {0}")]
    InvalidSchema(String),
}

pub type Result<T> = std::result::Result<T, StencilError>;
