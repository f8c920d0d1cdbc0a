use thiserror::Error;

use crate::regmap::ConfigError;

pub mod codec;
#[cfg(test)]
pub(crate) mod fake;
pub mod point;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Register map error: {0}")]
    Config(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serial error: {0}")]
    Serial(#[from] tokio_serial::Error),
    #[error("Sink error: {0}")]
    Sink(String),
    #[error("Feed closed before any data was received")]
    Abort,
}

impl From<csv::Error> for BridgeError {
    fn from(value: csv::Error) -> Self {
        Self::Sink(value.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(value: serde_json::Error) -> Self {
        Self::Sink(value.to_string())
    }
}
