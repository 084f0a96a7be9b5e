use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Credential errors
    #[error("Invalid credential code: {0}")]
    InvalidCode(String),

    #[error("Invalid open mode: {0}")]
    InvalidOpenMode(String),

    // Access window errors
    #[error("Invalid time of day: {0}")]
    InvalidTimeOfDay(String),

    #[error("Invalid weekday number: {0}")]
    InvalidWeekday(i64),

    // Audit log errors
    #[error("Invalid gate status: {0}")]
    InvalidGateStatus(String),
}

pub type Result<T> = std::result::Result<T, Error>;
