use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file '{}' is malformed: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("config file '{}' is invalid: {reason}", .path.display())]
    Invalid { path: PathBuf, reason: String },
}

/// Failures talking to the inference service.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to Ollama failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Ollama returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response from Ollama: {0}")]
    Decode(String),
}

/// Why a single record produced no output. None of these abort the run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SkipReason {
    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("record is missing required field '{0}'")]
    MissingField(String),

    #[error("field '{0}' must be a non-empty array of strings")]
    BadTurns(&'static str),

    #[error("last message is not from the user")]
    LastTurnNotUser,

    #[error("reached the retry limit ({0} attempts)")]
    RetriesExhausted(u32),
}

/// Fatal outcomes of a run. Each maps to exit status 1.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("model '{0}' is not available")]
    ModelUnavailable(String),

    #[error("input file '{}' not found", .0.display())]
    InputNotFound(PathBuf),

    #[error("failed to read input file '{}': {source}", .path.display())]
    InputRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("failed to write output file '{}': {source}", .path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
