use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoreSwapError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Swap parse error: {0}")]
    SwapParse(String),

    #[error("Quote expired: {0}")]
    ExpiredQuote(String),

    #[error("Chain error: {0}")]
    Chain(String),

    #[error("System error: {0}")]
    System(String),
}

impl ScoreSwapError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn validation_error(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn analysis_error(msg: impl Into<String>) -> Self {
        Self::Analysis(msg.into())
    }

    pub fn swap_parse_error(msg: impl Into<String>) -> Self {
        Self::SwapParse(msg.into())
    }

    pub fn expired_quote_error(msg: impl Into<String>) -> Self {
        Self::ExpiredQuote(msg.into())
    }

    pub fn chain_error(msg: impl Into<String>) -> Self {
        Self::Chain(msg.into())
    }

    pub fn system_error(msg: impl Into<String>) -> Self {
        Self::System(msg.into())
    }
}

// Transport failures count as system errors: fatal for the current operation,
// never for other sessions.
impl From<reqwest::Error> for ScoreSwapError {
    fn from(err: reqwest::Error) -> Self {
        Self::System(format!("transport failure: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, ScoreSwapError>;
