use std::path::PathBuf;
use thiserror::Error;

use crate::core::features::FeatureError;
use crate::core::io::deck::DeckError;
use crate::core::io::pdb::StructureError;
use crate::core::sites::SiteParamError;
use crate::engine::invoker::OutputClass;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(
        "Missing required binaries in {dir}: {names}",
        dir = dir.display(),
        names = names.join(", ")
    )]
    MissingBinary { dir: PathBuf, names: Vec<String> },

    #[error("Failed to spawn '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Solver stage '{stage}' reported {class:?}:\n{tail}")]
    SolverFailure {
        stage: String,
        class: OutputClass,
        tail: String,
    },

    #[error("Solver stage '{stage}' exceeded its time limit and was killed")]
    StageTimeout { stage: String },

    #[error("Refinement loop did not converge within {limit} iterations")]
    ConvergenceTimeout { limit: usize },

    #[error(transparent)]
    Structure(#[from] StructureError),

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Deck(#[from] DeckError),

    #[error(transparent)]
    SiteParam(#[from] SiteParamError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal logic error: {0}")]
    Internal(String),
}
