//! Structure-derived calculation features.
//!
//! Four independent derivations over the parsed atom list: residue index
//! bounds, histidine tautomer assignment, cysteine disulfide/titration
//! status, and adaptive grid geometry. The pairwise-distance scans in the
//! disulfide and grid derivations are O(n^2) over sulfur and alpha-carbon
//! counts respectively; this is the system's only non-linear path and is
//! fine for typical protein sizes.

use crate::core::io::util::{read_value_lines, tokenize};
use crate::core::models::atom::AtomRecord;
use crate::core::models::params::GridLevel;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// SG-SG separation below which two cysteines are considered disulfide
/// bonded and removed from titration, in Angstroms.
pub const DISULFIDE_CUTOFF: f64 = 3.5;

/// Tautomer code assigned to every histidine when no explicit list is given
/// (2 = NE2-protonated).
pub const DEFAULT_TAUTOMER: u8 = 2;

/// Valid histidine tautomer codes: 0 = CE1, 1 = ND1, 2 = NE2.
pub const TAUTOMER_CODES: [u8; 3] = [0, 1, 2];

/// Multiplier relating the structure's maximum alpha-carbon separation to
/// the coarse grid extent. Solver builds certified against this driver use
/// 3; the 0.4.x line of the reference tooling used 2 for older compiles.
pub const COARSE_GRID_SCALE: f64 = 3.0;

/// Coarse grids never get finer than this spacing; degenerate (tiny or
/// single-atom) structures would otherwise produce zero potentials.
pub const MIN_GRID_SPACING: f64 = 1.5;

/// Fixed dimension of the coarsest grid level.
pub const COARSE_GRID_DIM: u32 = 65;

/// Maximum number of nested grid levels the solver accepts.
pub const MAX_GRID_LEVELS: usize = 5;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("Invalid tautomer file '{path}': {reason}", path = path.display())]
    InvalidTautomerFile { path: PathBuf, reason: String },
    #[error("Invalid cysteine file '{path}': {reason}", path = path.display())]
    InvalidCysteineFile { path: PathBuf, reason: String },
    #[error("Invalid grid file '{path}': {reason}", path = path.display())]
    InvalidGridFile { path: PathBuf, reason: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything the input deck needs that is derived from one structure file.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureFeatures {
    pub first_residue: isize,
    pub last_residue: isize,
    pub his_tautomers: Vec<u8>,
    pub cys_titrating: Vec<isize>,
    pub grid: Vec<GridLevel>,
}

/// Optional user-supplied files that replace the automatic derivations.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureOverrides<'a> {
    pub his_tautomer_file: Option<&'a Path>,
    pub cys_titrate_file: Option<&'a Path>,
    pub grid_file: Option<&'a Path>,
    pub disulfide_cutoff: Option<f64>,
}

/// Runs all derivations for one structure.
pub fn extract(
    atoms: &[AtomRecord],
    overrides: &FeatureOverrides,
) -> Result<StructureFeatures, FeatureError> {
    let (first_residue, last_residue) = residue_bounds(atoms);
    let his_tautomers = assign_tautomers(atoms, overrides.his_tautomer_file)?;
    let cys_titrating = titrating_cysteines(
        atoms,
        overrides.cys_titrate_file,
        overrides.disulfide_cutoff.unwrap_or(DISULFIDE_CUTOFF),
    )?;
    let grid = grid_levels(atoms, overrides.grid_file)?;

    debug!(
        first_residue,
        last_residue,
        histidines = his_tautomers.len(),
        titrating_cysteines = cys_titrating.len(),
        grid_levels = grid.len(),
        "derived structure features"
    );

    Ok(StructureFeatures {
        first_residue,
        last_residue,
        his_tautomers,
        cys_titrating,
        grid,
    })
}

/// First and last residue sequence numbers among atom lines, widened to
/// (first - 1, last + 2). The offsets are the solver's boundary convention
/// for terminal capping groups, not arbitrary padding.
pub fn residue_bounds(atoms: &[AtomRecord]) -> (isize, isize) {
    let first = atoms.iter().map(|a| a.residue_seq).min().unwrap_or(0);
    let last = atoms.iter().map(|a| a.residue_seq).max().unwrap_or(0);
    (first - 1, last + 2)
}

/// Histidine residue numbers in sequence order, one per residue (grouped by
/// the alpha-carbon representative).
pub fn histidine_residues(atoms: &[AtomRecord]) -> Vec<isize> {
    atoms
        .iter()
        .filter(|a| a.is_histidine() && a.is_alpha_carbon())
        .map(|a| a.residue_seq)
        .collect()
}

/// Assigns a tautomer code to every histidine.
///
/// With an explicit file, codes must all be drawn from [`TAUTOMER_CODES`]
/// and the list length must equal the histidine count. Without one, every
/// histidine gets [`DEFAULT_TAUTOMER`].
pub fn assign_tautomers(
    atoms: &[AtomRecord],
    tautomer_file: Option<&Path>,
) -> Result<Vec<u8>, FeatureError> {
    let histidines = histidine_residues(atoms);

    let Some(path) = tautomer_file else {
        return Ok(vec![DEFAULT_TAUTOMER; histidines.len()]);
    };

    let lines = read_value_lines(path)?;
    let mut codes = Vec::new();
    for token in tokenize(&lines) {
        let code: u8 = token
            .parse()
            .ok()
            .filter(|c| TAUTOMER_CODES.contains(c))
            .ok_or_else(|| FeatureError::InvalidTautomerFile {
                path: path.to_path_buf(),
                reason: format!(
                    "'{token}' is not a tautomer code (use 0 = CE1, 1 = ND1, 2 = NE2)"
                ),
            })?;
        codes.push(code);
    }

    if codes.len() != histidines.len() {
        return Err(FeatureError::InvalidTautomerFile {
            path: path.to_path_buf(),
            reason: format!(
                "{} codes specified but structure has {} histidines",
                codes.len(),
                histidines.len()
            ),
        });
    }
    Ok(codes)
}

/// Residue numbers of cysteines eligible for titration.
///
/// With an explicit file, the listed residues must be a subset of the
/// cysteines actually present. Without one, any SG pair closer than
/// `cutoff` is a disulfide bond and both partners are excluded.
pub fn titrating_cysteines(
    atoms: &[AtomRecord],
    cys_file: Option<&Path>,
    cutoff: f64,
) -> Result<Vec<isize>, FeatureError> {
    let sulfurs: Vec<&AtomRecord> = atoms.iter().filter(|a| a.is_cysteine_sulfur()).collect();
    let present: Vec<isize> = sulfurs.iter().map(|a| a.residue_seq).collect();

    if let Some(path) = cys_file {
        let lines = read_value_lines(path)?;
        let mut listed = Vec::new();
        for token in tokenize(&lines) {
            let seq: isize =
                token
                    .parse()
                    .map_err(|_| FeatureError::InvalidCysteineFile {
                        path: path.to_path_buf(),
                        reason: format!("'{token}' is not a residue number"),
                    })?;
            if !present.contains(&seq) {
                return Err(FeatureError::InvalidCysteineFile {
                    path: path.to_path_buf(),
                    reason: format!("residue {seq} is not a cysteine in the structure"),
                });
            }
            listed.push(seq);
        }
        return Ok(listed);
    }

    // Pairwise SG-SG scan; compare squared distances to skip the sqrt.
    let cutoff_squared = cutoff * cutoff;
    let mut bonded = vec![false; sulfurs.len()];
    for i in 0..sulfurs.len() {
        for j in (i + 1)..sulfurs.len() {
            let separation = (sulfurs[i].position - sulfurs[j].position).norm_squared();
            if separation < cutoff_squared {
                bonded[i] = true;
                bonded[j] = true;
            }
        }
    }

    Ok(present
        .into_iter()
        .zip(bonded)
        .filter(|(_, in_bond)| !in_bond)
        .map(|(seq, _)| seq)
        .collect())
}

/// Nested grid levels, coarsest first.
///
/// The automatic grid scales the coarsest spacing with the maximum pairwise
/// alpha-carbon separation, clamped to [`MIN_GRID_SPACING`], and appends
/// three fixed finer levels. An explicit grid file (at most
/// [`MAX_GRID_LEVELS`] `spacing nx ny nz` records) replaces the whole list.
pub fn grid_levels(
    atoms: &[AtomRecord],
    grid_file: Option<&Path>,
) -> Result<Vec<GridLevel>, FeatureError> {
    if let Some(path) = grid_file {
        return read_grid_file(path);
    }

    let carbons: Vec<&AtomRecord> = atoms.iter().filter(|a| a.is_alpha_carbon()).collect();
    let mut max_separation_squared: f64 = 0.0;
    for i in 0..carbons.len() {
        for j in (i + 1)..carbons.len() {
            let separation = (carbons[i].position - carbons[j].position).norm_squared();
            max_separation_squared = max_separation_squared.max(separation);
        }
    }
    let extent = max_separation_squared.sqrt();

    let spacing =
        (COARSE_GRID_SCALE * extent / f64::from(COARSE_GRID_DIM)).max(MIN_GRID_SPACING);

    Ok(vec![
        GridLevel::new(spacing, COARSE_GRID_DIM, COARSE_GRID_DIM, COARSE_GRID_DIM),
        GridLevel::new(1.2, 40, 40, 40),
        GridLevel::new(0.75, 40, 40, 40),
        GridLevel::new(0.25, 40, 40, 40),
    ])
}

fn read_grid_file(path: &Path) -> Result<Vec<GridLevel>, FeatureError> {
    let invalid = |reason: String| FeatureError::InvalidGridFile {
        path: path.to_path_buf(),
        reason,
    };

    let lines = read_value_lines(path)?;
    if lines.is_empty() {
        return Err(invalid("no grid levels specified".to_string()));
    }
    if lines.len() > MAX_GRID_LEVELS {
        return Err(invalid(format!(
            "grid cannot have more than {MAX_GRID_LEVELS} levels ({} specified)",
            lines.len()
        )));
    }

    let mut levels = Vec::new();
    for line in &lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let level = match fields.as_slice() {
            [spacing, nx, ny, nz] => {
                let spacing: f64 = spacing
                    .parse()
                    .map_err(|_| invalid(format!("bad spacing '{spacing}'")))?;
                let parse_dim = |d: &str| {
                    d.parse::<u32>()
                        .map_err(|_| invalid(format!("bad dimension '{d}'")))
                };
                GridLevel::new(spacing, parse_dim(nx)?, parse_dim(ny)?, parse_dim(nz)?)
            }
            _ => {
                return Err(invalid(format!(
                    "expected 'spacing nx ny nz', got '{line}'"
                )));
            }
        };
        levels.push(level);
    }
    Ok(levels)
}
