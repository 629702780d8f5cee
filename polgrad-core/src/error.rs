use thiserror::Error;

/// Errors raised while evaluating or applying a policy objective.
#[derive(Error, Debug)]
pub enum ObjectiveError {
    /// Missing propensities, bad hyperparameters, invalid builder options.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("bad shape for {what}: expected {expected}, got {got:?}")]
    Shape {
        what: &'static str,
        expected: String,
        got: Vec<usize>,
    },

    /// Non-finite values in the advantages, the objective or the gradients.
    #[error("numeric error: {0}")]
    Numeric(String),

    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),
}

impl ObjectiveError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn numeric(msg: impl Into<String>) -> Self {
        Self::Numeric(msg.into())
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Numeric(_))
    }
}

pub type Result<T> = std::result::Result<T, ObjectiveError>;
