use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FfbError {
    #[error("step {} failed: {message}", .step + 1)]
    ProcessFailed { step: usize, message: String },
    #[error("run was killed at step {}", .step + 1)]
    Killed { step: usize },
    #[error("file '{}' already exists; overwriting is not supported", path.display())]
    OutputExists { path: PathBuf },
    #[error("more than one item writes to '{}'", path.display())]
    DuplicateOutput { path: PathBuf },
    #[error("no input files were given")]
    NoInputs,
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("terminal error: {0}")]
    Terminal(#[from] std::io::Error),
    #[error("invalid command: {message}")]
    InvalidCommand { message: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Problems with preset documents and settings files.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("failed to parse preset document: {message}")]
    Document { message: String },
    #[error("preset '{preset}' was not found")]
    UnknownPreset { preset: String },
    #[error("preset '{preset}': field '{field}' is missing")]
    MissingField { preset: String, field: &'static str },
    #[error("preset '{preset}': field '{field}' is invalid: {message}")]
    InvalidField {
        preset: String,
        field: &'static str,
        message: String,
    },
    #[error("settings: {message}")]
    Settings { message: String },
}

/// A reference could not be resolved against the aggregate of the inputs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("field '{field}': the inputs provide no value to refer to")]
    MissingContext { field: &'static str },
    #[error("field '{field}': expected {expected}, found {found}")]
    ShapeMismatch {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    #[error("field '{field}': 'same as input' has no selected value")]
    UnboundInputSelection { field: &'static str },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("video stream was not found")]
    MissingVideoStream,
    #[error("audio stream was not found")]
    MissingAudioStream,
    #[error("failed to parse probe output: {0}")]
    MalformedOutput(String),
    #[error("failed to parse duration [{0}]")]
    DurationUnparseable(String),
}
