//! CLI error kinds and their exit codes.

use lstn_core::{LockfileError, RegistryError};
use lstn_npm::NpmError;

pub const CANCELLED_EXIT_CODE: i32 = 2;
pub const AUTH_EXIT_CODE: i32 = 4;
pub const DEFAULT_HALT_EXIT_CODE: i32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Invalid options, flags, or configuration file.
    #[error("{0}")]
    Config(String),

    /// Bad arguments or unusable input files.
    #[error("{0}")]
    Input(String),

    #[error("{0}")]
    Network(String),

    #[error("the operation was cancelled or its deadline exceeded")]
    Cancelled,

    /// Missing or rejected credentials.
    #[error("{0}")]
    Auth(String),

    /// An external program exited unsuccessfully.
    #[error("{0}")]
    ChildProcess(String),

    #[error("{0}")]
    Decoding(String),

    /// Raised by `halt` and `halt_error` in a JSON query.
    ///
    /// `output` holds what the query printed before halting.
    #[error("{}", .value.as_deref().unwrap_or_default())]
    Halt {
        code: i32,
        value: Option<String>,
        output: String,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    /// | Code | Meaning                       |
    /// |------|-------------------------------|
    /// | 0    | Success                       |
    /// | 1    | Any other failure             |
    /// | 2    | Cancellation or timeout       |
    /// | 4    | Authentication failure        |
    /// | 5+   | JSON query halt (query-owned) |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Cancelled => CANCELLED_EXIT_CODE,
            Self::Auth(_) => AUTH_EXIT_CODE,
            Self::Halt { code, .. } => *code,
            Self::Config(_)
            | Self::Input(_)
            | Self::Network(_)
            | Self::ChildProcess(_)
            | Self::Decoding(_)
            | Self::Other(_) => 1,
        }
    }

    /// Joins `errors` under `header`, one per line.
    pub fn aggregate(header: &str, errors: &[String]) -> String {
        let mut message = header.to_string();
        for error in errors {
            message.push_str("\n       ");
            message.push_str(error);
        }
        message
    }
}

impl From<RegistryError> for CliError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::Cancelled => Self::Cancelled,
            RegistryError::InvalidResponse { .. } => Self::Decoding(error.to_string()),
            RegistryError::NotFound { .. } => Self::Input(error.to_string()),
            RegistryError::NotOk { .. } | RegistryError::Transport { .. } => {
                Self::Network(error.to_string())
            }
        }
    }
}

impl From<LockfileError> for CliError {
    fn from(error: LockfileError) -> Self {
        match error {
            LockfileError::ParseFile { .. } | LockfileError::UnsupportedVersion { .. } => {
                Self::Decoding(error.to_string())
            }
            _ => Self::Input(error.to_string()),
        }
    }
}

impl From<NpmError> for CliError {
    fn from(error: NpmError) -> Self {
        match error {
            NpmError::Cancelled => Self::Cancelled,
            NpmError::Lockfile(inner) => inner.into(),
            NpmError::Generation(_) => Self::ChildProcess(error.to_string()),
            _ => Self::Input(error.to_string()),
        }
    }
}

impl From<lstn_http::Cancelled> for CliError {
    fn from(_: lstn_http::Cancelled) -> Self {
        Self::Cancelled
    }
}

impl From<serde_json::Error> for CliError {
    fn from(error: serde_json::Error) -> Self {
        Self::Decoding(error.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(error: std::io::Error) -> Self {
        Self::Other(error.into())
    }
}
