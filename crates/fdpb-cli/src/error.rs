use fdpb::engine::config::ConfigError;
use fdpb::workflows::run::RunError;
use fdpb::workflows::sweep::PlanError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Environment variable {name} is not set; point it at the solver binary directory")]
    MissingEnvVar { name: &'static str },

    #[error("{name}={value} is not a directory", value = value.display())]
    BadBinaryDir { name: &'static str, value: PathBuf },

    #[error("--override uses the deck verbatim; remove the conflicting options: {options}")]
    OverrideConflict { options: String },

    #[error("{failed} of {total} calculation(s) failed")]
    PointsFailed { failed: usize, total: usize },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
