use std::path::PathBuf;
use thiserror::Error;

use crate::provider::ProviderError;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("web stack '{name}' did not reach CREATE_COMPLETE (status: {status})")]
    CreateFailed { name: String, status: String },

    #[error("database stack '{name}' is not in UPDATE_COMPLETE (status: {status})")]
    DatabaseNotReady { name: String, status: String },

    #[error("timed out after {waited_secs}s waiting for stack '{name}'; stack left in CREATING")]
    DeployTimeout { name: String, waited_secs: u64 },

    #[error("deployment of '{name}' cancelled; stack left as-is, rerun to resume")]
    Cancelled { name: String },

    #[error("no load balancer matches prefix '{prefix}' for environment '{environment}'")]
    NoLoadBalancer { environment: String, prefix: String },

    #[error("hosted zone not found: {0}")]
    ZoneNotFound(String),

    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),

    #[error("stack name does not follow the naming convention: {0}")]
    InvalidStackName(String),

    #[error("invalid version token '{0}': expected <hex-rev>-<YYYYMMDD>-<HHMM>")]
    InvalidVersionToken(String),

    #[error("config file not found: {} (pass --config or create bluegreen.yaml)", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("no stack is currently live for environment '{0}'")]
    NoLiveStack(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl DeployError {
    /// Process exit code for scripting compatibility: web-stack creation
    /// failure exits 1, the database validation gate exits 2.
    pub fn exit_code(&self) -> i32 {
        match self {
            DeployError::DatabaseNotReady { .. } => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, DeployError>;
