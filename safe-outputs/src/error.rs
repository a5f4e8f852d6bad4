use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub type SafeOutputsResult<T, E = SafeOutputsError> = Result<T, E>;

/// Compile-time configuration problems. Always fatal for the build.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown safe output type `{0}`")]
    UnknownOutputType(String),

    #[error("invalid configuration for `{output_type}`: {message}")]
    InvalidTypeConfig {
        output_type: String,
        message: String,
    },

    #[error("'max' for `{0}` must be a positive integer")]
    ZeroMax(String),

    #[error("target-repo for `{0}` must name a repository, wildcard '*' is not allowed")]
    WildcardTargetRepo(String),

    #[error(
        "github-token for {scope} must be a secrets expression such as ${{{{ secrets.GITHUB_TOKEN }}}}, not a plaintext value"
    )]
    PlaintextToken { scope: String },

    #[error("no credential could be resolved for `{0}`; configure a github-token for it")]
    UnresolvedCredential(String),

    #[error("workflow `name` is required to compile safe output jobs")]
    MissingWorkflowName,

    #[error("job `{job}` is missing required environment bindings: {}", missing.join(", "))]
    MissingEnvBindings { job: String, missing: Vec<String> },

    #[error("failed to parse safe outputs configuration: {0}")]
    Parse(String),
}

impl ConfigError {
    pub fn invalid(output_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTypeConfig {
            output_type: output_type.into(),
            message: message.into(),
        }
    }
}

/// Raised when a collection pass produced issues but not a single usable item.
#[derive(Debug, Error, PartialEq, Eq)]
pub struct CollectError {
    pub messages: Vec<String>,
}

impl fmt::Display for CollectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "no valid safe output items were produced:")?;
        let mut first = true;
        for message in &self.messages {
            if !first {
                writeln!(f)?;
            }
            first = false;
            write!(f, "  - {message}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SafeOutputsError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Collect(#[from] CollectError),

    #[error("I/O error while accessing {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {what}: {message}")]
    Serialize { what: &'static str, message: String },
}

impl SafeOutputsError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn serialize(what: &'static str, err: impl fmt::Display) -> Self {
        Self::Serialize {
            what,
            message: err.to_string(),
        }
    }
}
