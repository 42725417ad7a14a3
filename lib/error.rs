//! Error types shared by every stage of the basis and operator pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or incomplete system configuration: infinite basis, symmetry
    /// combination that cannot hold, malformed user-added states.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Two one-particle systems that cannot be combined into a pair system.
    #[error("incompatible systems: {0}")]
    IncompatibleSystems(String),

    /// The "arbitrary" momentum sentinel was mixed with explicit values.
    #[error("arbitrary momentum cannot be combined with explicit momenta")]
    ArbitraryMomentumMisuse,

    /// Malformed persisted matrix record.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("linear algebra error: {0}")]
    Linalg(#[from] ndarray_linalg::error::LinalgError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn config_err<S: Into<String>>(msg: S) -> Error {
    Error::Configuration(msg.into())
}
