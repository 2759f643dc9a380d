use thiserror::Error;

/// Problems with how a chain, schedule or operator was assembled.
///
/// These are raised before the first iteration runs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("the operator schedule contains no operators")]
    EmptySchedule,
    #[error("the operator schedule has a total weight of {0}")]
    ZeroTotalWeight(f64),
    #[error("operator '{operator}' has invalid weight {weight}, weights must be positive and finite")]
    InvalidWeight { operator: String, weight: f64 },
    #[error("operator '{operator}' has weight {weight}, sequential schedules need whole-number weights")]
    NonIntegerWeight { operator: String, weight: f64 },
    #[error("malformed bounds for '{name}': lower {lower} is greater than upper {upper}")]
    MalformedBounds { name: String, lower: f64, upper: f64 },
    #[error("value {value} of '{name}' (dimension {dim}) lies outside its bounds")]
    OutOfBounds { name: String, dim: usize, value: f64 },
    #[error("dimension mismatch for '{name}': expected {expected}, found {found}")]
    DimensionMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("the model graph has no {kind} with index {index}")]
    UnknownComponent { kind: &'static str, index: usize },
    #[error("invalid tree: {0}")]
    InvalidTree(String),
    #[error("invalid setting: {0}")]
    InvalidSetting(String),
}

#[derive(Error, Debug)]
pub enum McmcError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("the initial model is invalid: {0}")]
    InvalidInitialState(String),
    #[error(
        "numerical error at iteration {iteration} in operator '{operator}' (seed {seed:?}): {detail}"
    )]
    Numerical {
        iteration: u64,
        operator: String,
        seed: Option<u64>,
        detail: String,
    },
    #[error(
        "state was not correctly {phase} at iteration {iteration} after operator '{operator}': \
         incremental score {incremental}, full evaluation {full}"
    )]
    InvariantViolation {
        iteration: u64,
        operator: String,
        phase: &'static str,
        incremental: f64,
        full: f64,
    },
}

pub type Result<T> = std::result::Result<T, McmcError>;
