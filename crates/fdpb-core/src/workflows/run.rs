//! Top-level run coordination: structure discovery, per-structure feature
//! extraction, sweep planning, and orchestrator execution per sweep point.

use crate::core::features::{self, FeatureError, FeatureOverrides};
use crate::core::io::pdb::{StructureError, read_structure_file};
use crate::core::models::params::{CalcMode, CalculationParameters};
use crate::core::sites::SiteParameters;
use crate::engine::config::RunConfig;
use crate::engine::error::EngineError;
use crate::engine::orchestrator;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::workflows::sweep::{self, PlanError, SweepPoint, SweepSpec};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("'{path}' is not a structure file or directory", path = path.display())]
    InvalidTarget { path: PathBuf },

    #[error("Directory '{path}' contains no .pdb files", path = path.display())]
    NoStructures { path: PathBuf },

    #[error(transparent)]
    Structure(#[from] StructureError),

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One sweep point that failed while `continue_on_failure` was set.
#[derive(Debug, Clone)]
pub struct RunFailure {
    pub structure: String,
    pub point: String,
    pub message: String,
}

/// What a whole run accomplished.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub completed: usize,
    pub failures: Vec<RunFailure>,
}

/// Resolves the positional target into the ordered list of structure files:
/// a single file is taken as-is, a directory contributes every `.pdb` file
/// in sorted order.
pub fn collect_structures(target: &Path) -> Result<Vec<PathBuf>, RunError> {
    if target.is_file() {
        return Ok(vec![target.to_path_buf()]);
    }
    if !target.is_dir() {
        return Err(RunError::InvalidTarget {
            path: target.to_path_buf(),
        });
    }

    let mut structures: Vec<PathBuf> = std::fs::read_dir(target)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "pdb"))
        .collect();
    if structures.is_empty() {
        return Err(RunError::NoStructures {
            path: target.to_path_buf(),
        });
    }
    structures.sort();
    Ok(structures)
}

/// Runs the full pipeline for every structure under `target`.
///
/// Failure policy: validation errors (structure, features, planning) always
/// abort; solver failures abort unless the configuration asks to continue,
/// in which case they are recorded in the summary and the remaining points
/// run.
#[instrument(skip_all, name = "titration_run")]
pub fn run(
    config: &RunConfig,
    base_params: &CalculationParameters,
    spec: &SweepSpec,
    target: &Path,
    reporter: &ProgressReporter,
) -> Result<RunSummary, RunError> {
    let structures = collect_structures(target)?;
    info!(
        structures = structures.len(),
        points_per_structure = spec.len(),
        "starting run"
    );

    // Full-site site parameters depend only on the parameter file; load
    // them once here and share across every structure and sweep point.
    let sites = match base_params.mode {
        CalcMode::FullSite => {
            Some(SiteParameters::load(&base_params.param_file).map_err(EngineError::from)?)
        }
        CalcMode::SingleSite => None,
    };

    let mut summary = RunSummary::default();
    for structure_path in &structures {
        run_structure(
            config,
            base_params,
            spec,
            structure_path,
            sites.as_ref(),
            reporter,
            &mut summary,
        )?;
    }

    info!(
        completed = summary.completed,
        failed = summary.failures.len(),
        "run finished"
    );
    Ok(summary)
}

fn run_structure(
    config: &RunConfig,
    base_params: &CalculationParameters,
    spec: &SweepSpec,
    structure_path: &Path,
    sites: Option<&SiteParameters>,
    reporter: &ProgressReporter,
    summary: &mut RunSummary,
) -> Result<(), RunError> {
    let structure_name = structure_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = structure_path
        .file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    info!(structure = %structure_name, "processing structure");

    // Parse and validate everything before any solver process is spawned.
    let atoms = read_structure_file(structure_path)?;
    let overrides = FeatureOverrides {
        his_tautomer_file: base_params.his_tautomer_file.as_deref(),
        cys_titrate_file: base_params.cys_titrate_file.as_deref(),
        grid_file: base_params.grid_file.as_deref(),
        disulfide_cutoff: Some(base_params.disulfide_cutoff),
    };
    let features = features::extract(&atoms, &overrides)?;
    let structure_params = base_params.with_features(&features);

    let base_dir = config.output_root.join(&stem);
    let points = sweep::plan(&base_dir, &structure_params, spec);
    reporter.report(Progress::StructureStart {
        name: structure_name.clone(),
        points: points.len() as u64,
    });

    for (index, point) in points.iter().enumerate() {
        reporter.report(Progress::PointStart {
            label: point.label.clone(),
        });

        let scratch = config.scratch_root.join(&stem).join(format!("point-{index}"));
        let result = run_point(config, point, &atoms, &structure_name, sites, &scratch);

        if !config.keep_scratch && scratch.exists() {
            std::fs::remove_dir_all(&scratch)?;
        }

        match result {
            Ok(()) => summary.completed += 1,
            Err(err @ (EngineError::SolverFailure { .. }
            | EngineError::ConvergenceTimeout { .. }
            | EngineError::StageTimeout { .. }))
                if config.continue_on_failure =>
            {
                error!(
                    structure = %structure_name,
                    point = %point.label,
                    %err,
                    "sweep point failed; continuing"
                );
                summary.failures.push(RunFailure {
                    structure: structure_name.clone(),
                    point: point.label.clone(),
                    message: err.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        }
        reporter.report(Progress::PointFinish);
    }

    reporter.report(Progress::StructureFinish);
    Ok(())
}

fn run_point(
    config: &RunConfig,
    point: &SweepPoint,
    atoms: &[crate::core::models::atom::AtomRecord],
    structure_name: &str,
    sites: Option<&SiteParameters>,
    scratch: &Path,
) -> Result<(), EngineError> {
    std::fs::create_dir_all(&point.output_dir)?;
    std::fs::create_dir_all(scratch)?;

    orchestrator::run_calculation(config, &point.params, atoms, structure_name, sites, scratch)?;
    publish(&point.params.keep_files(), scratch, &point.output_dir)
}

/// Copies the mode's keep-file list from scratch to the published output
/// directory. A missing keep file is logged, not fatal: the solver decides
/// which optional reports it emits.
fn publish(keep_files: &[String], scratch: &Path, output_dir: &Path) -> Result<(), EngineError> {
    for name in keep_files {
        let source = scratch.join(name);
        if source.is_file() {
            std::fs::copy(&source, output_dir.join(name))?;
        } else {
            warn!(file = %name, "expected result file missing from working directory");
        }
    }
    Ok(())
}
