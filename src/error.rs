use std::fmt::{self, Debug, Display};
use std::io;

/// Provides `SimulatorError` and maps other errors to
/// convert to a `SimulatorError`
///
/// `Config` and `Consistency` are fatal: the former is raised before any
/// step runs, the latter aborts the run at the step where the population
/// accounting went wrong.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum SimulatorError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    CsvError(csv::Error),
    Config(String),
    Consistency { active: usize, expected: usize },
    ReportError(String),
}

impl From<io::Error> for SimulatorError {
    fn from(error: io::Error) -> Self {
        SimulatorError::IoError(error)
    }
}

impl From<serde_json::Error> for SimulatorError {
    fn from(error: serde_json::Error) -> Self {
        SimulatorError::JsonError(error)
    }
}

impl From<csv::Error> for SimulatorError {
    fn from(error: csv::Error) -> Self {
        SimulatorError::CsvError(error)
    }
}

impl From<String> for SimulatorError {
    fn from(error: String) -> Self {
        SimulatorError::Config(error)
    }
}

impl From<&str> for SimulatorError {
    fn from(error: &str) -> Self {
        SimulatorError::Config(error.to_string())
    }
}

impl std::error::Error for SimulatorError {}

impl Display for SimulatorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SimulatorError::Consistency { active, expected } => write!(
                f,
                "Error: number of people active {active} does not match the total people number {expected}"
            ),
            SimulatorError::Config(message) => write!(f, "Error: invalid configuration: {message}"),
            _ => write!(f, "Error: {self:?}"),
        }
    }
}
