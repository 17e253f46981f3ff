use crate::schema::Field;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NormalizerError {
    #[error("No usable mapping for target field '{0}'")]
    UnresolvedField(Field),

    #[error("Selection index {index} is out of range: expected a number between 1 and {len}")]
    OutOfRangeSelection { index: usize, len: usize },

    #[error("Invalid expression '{input}': {reason}")]
    InvalidExpression { input: String, reason: String },

    #[error("Unrecognized input '{0}': not an index, an arithmetic expression or a column name")]
    UnrecognizedInput(String),

    #[error("Cannot derive '{field}': prerequisite '{missing}' is unresolved")]
    MissingAggregateSource { field: Field, missing: Field },

    #[error("TTM unavailable: {0}")]
    TtmUnavailable(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Statement contains no usable periods")]
    EmptyStatement,

    #[error("Invalid mapping config for '{field}': {details}")]
    InvalidMappingConfig { field: String, details: String },

    #[error("Invalid analysis options: {0}")]
    InvalidOptions(String),

    #[error("Invalid period '{0}': expected YYYY-MM-DD")]
    InvalidPeriod(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NormalizerError>;
