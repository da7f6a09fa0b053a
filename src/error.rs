use thiserror::Error;

/// Errors surfaced while loading or validating a run configuration.
///
/// Mirrors the error boundary of an application's top-level config load:
/// IO/parse failures are distinct variants, propagated with `?`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    SerdeYaml(#[from] serde_yaml::Error),

    #[cfg(feature = "serde_cbor")]
    #[error("{0}")]
    Cbor(#[from] serde_cbor::Error),

    #[error("unknown input file type '{0}'")]
    UnknownInputType(String),

    #[error("{0}")]
    Invalid(#[from] anyhow::Error),
}

/// Failure of a single field sample: either the query point fell outside
/// the grid's spatial domain, or outside its time domain with
/// extrapolation disabled. Neither aborts a run — see [`crate::particle::ParticleState`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleError {
    #[error("sample position is outside the grid's spatial domain")]
    OutOfBounds,

    #[error("sample time is outside the field's time domain and extrapolation is disabled")]
    TimeExtrapolation,
}
