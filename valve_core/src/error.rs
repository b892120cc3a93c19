use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ValveError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("valve did not reach idle within the travel budget")]
    Timeout,
    #[error("invalid state: {0}")]
    State(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing drive relay")]
    MissingDriveRelay,
    #[error("missing direction relay")]
    MissingDirectionRelay,
    #[error("missing current sensor")]
    MissingCurrentSensor,
    #[error("missing config store")]
    MissingStore,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
