use std::path::PathBuf;

use crate::core::features::StructureFeatures;

/// Which solver pipeline a calculation runs.
///
/// The two pipelines share the main solver binary but differ in their helper
/// binaries, input-deck layout, per-iteration stage list, and published
/// result names. Dispatching on this enum replaces the reference
/// implementation's habit of storing a run-function pointer on the parameter
/// object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CalcMode {
    /// One titratable atom per site; the default pipeline.
    #[default]
    SingleSite,
    /// Full multi-atom site treatment, including acid/base residue changes.
    FullSite,
}

impl CalcMode {
    pub fn label(&self) -> &'static str {
        match self {
            CalcMode::SingleSite => "single-site",
            CalcMode::FullSite => "full-site",
        }
    }

    /// Name of the generated input deck inside the working directory.
    pub fn deck_name(&self) -> &'static str {
        match self {
            CalcMode::SingleSite => "pkaS-doinp.inp",
            CalcMode::FullSite => "doinp.inp",
        }
    }

    /// Input/output file pair for the initialization solve.
    pub fn init_files(&self) -> (&'static str, &'static str) {
        match self {
            CalcMode::SingleSite => ("pkaS-uhbdini.inp", "pkaS-uhbdini.out"),
            CalcMode::FullSite => ("uhbdini.inp", "uhbdini.out"),
        }
    }

    /// Every external binary this pipeline invokes, in the order the stages
    /// first need them. The main solver comes first.
    pub fn binaries(&self) -> &'static [&'static str] {
        match self {
            CalcMode::SingleSite => &["uhbd", "getgrids", "doinps", "getpots", "hybrids"],
            CalcMode::FullSite => &["uhbd", "getgrid", "doinp", "getpot", "hybrid"],
        }
    }

    pub fn grid_stage(&self) -> &'static str {
        match self {
            CalcMode::SingleSite => "getgrids",
            CalcMode::FullSite => "getgrid",
        }
    }

    pub fn input_prep_stage(&self) -> &'static str {
        match self {
            CalcMode::SingleSite => "doinps",
            CalcMode::FullSite => "doinp",
        }
    }

    pub fn collect_stage(&self) -> &'static str {
        match self {
            CalcMode::SingleSite => "getpots",
            CalcMode::FullSite => "getpot",
        }
    }

    pub fn summarize_stage(&self) -> &'static str {
        match self {
            CalcMode::SingleSite => "hybrids",
            CalcMode::FullSite => "hybrid",
        }
    }

    /// The piped solver input/output pairs run on every refinement pass.
    pub fn refine_pairs(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            CalcMode::SingleSite => &[("uhbdpr.inp", "uhbdpr.out"), ("uhbdaa.inp", "uhbdaa.out")],
            CalcMode::FullSite => &[
                ("uhbdpr.inp1", "uhbdpr.out1"),
                ("uhbdpr.inp2", "uhbdpr.out2"),
                ("uhbdaa.inp1", "uhbdaa.out1"),
                ("uhbdaa.inp2", "uhbdaa.out2"),
            ],
        }
    }

    /// Published name of the collected potentials file.
    pub fn potentials_name(&self) -> &'static str {
        match self {
            CalcMode::SingleSite => "pkaS-potentials",
            CalcMode::FullSite => "pkaF-potentials",
        }
    }

    /// Result files copied out of the working directory when a calculation
    /// finishes; everything else is scratch.
    pub fn keep_files(&self) -> &'static [&'static str] {
        match self {
            CalcMode::SingleSite => &[
                "hybrid.out",
                "pkaS-doinp.inp",
                "pkaS-potentials",
                "pkaS-sitesinpr.pdb",
                "titraa.pdb",
            ],
            CalcMode::FullSite => &["hybrid.out", "doinp.inp", "pkaF-potentials"],
        }
    }
}

/// The pH range swept by the terminal summarization stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhScan {
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

impl Default for PhScan {
    fn default() -> Self {
        PhScan {
            start: -5.0,
            stop: 20.0,
            step: 0.25,
        }
    }
}

/// One level of the nested finite-difference grid: spacing in Angstroms plus
/// the grid dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLevel {
    pub spacing: f64,
    pub nx: u32,
    pub ny: u32,
    pub nz: u32,
}

impl GridLevel {
    pub fn new(spacing: f64, nx: u32, ny: u32, nz: u32) -> Self {
        GridLevel { spacing, nx, ny, nz }
    }
}

/// The single source of truth for one calculation.
///
/// Constructed once from CLI defaults, specialized per structure file by
/// [`CalculationParameters::with_features`], and specialized per sweep point
/// through [`ParamField::apply`], which returns a fresh copy rather than
/// mutating shared state.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationParameters {
    pub mode: CalcMode,
    pub temperature: f64,
    pub solvent_dielectric: f64,
    pub protein_dielectric: f64,
    pub ionic_strength: f64,
    pub ionic_radius: f64,
    pub map_sphere: f64,
    pub map_samples: i64,
    pub ph_scan: PhScan,

    // Locked solver settings with no supported user-facing control; present
    // because the input deck must carry them.
    pub max_elec_iterations: i64,
    pub num_chains: i64,
    pub added_sites: i64,
    pub change_acid: String,

    /// Charge/radius parameter file handed to the solver.
    pub param_file: PathBuf,
    /// Hand-written input deck used verbatim instead of a generated one.
    /// Exactly one of {override deck, generated deck} is used per run.
    pub override_deck: Option<PathBuf>,
    pub his_tautomer_file: Option<PathBuf>,
    pub cys_titrate_file: Option<PathBuf>,
    pub grid_file: Option<PathBuf>,
    pub disulfide_cutoff: f64,

    // Structure-derived fields, populated by `with_features`.
    pub first_residue: isize,
    pub last_residue: isize,
    pub his_tautomers: Vec<u8>,
    pub cys_titrating: Vec<isize>,
    pub grid: Vec<GridLevel>,
}

impl CalculationParameters {
    pub fn new(mode: CalcMode, param_file: PathBuf) -> Self {
        CalculationParameters {
            mode,
            temperature: 298.0,
            solvent_dielectric: 78.5,
            protein_dielectric: 20.0,
            ionic_strength: 100.0,
            ionic_radius: 2.0,
            map_sphere: 1.4,
            map_samples: 500,
            ph_scan: PhScan::default(),
            max_elec_iterations: 300,
            num_chains: 1,
            added_sites: 0,
            change_acid: "n".to_string(),
            param_file,
            override_deck: None,
            his_tautomer_file: None,
            cys_titrate_file: None,
            grid_file: None,
            disulfide_cutoff: crate::core::features::DISULFIDE_CUTOFF,
            first_residue: 0,
            last_residue: 0,
            his_tautomers: Vec::new(),
            cys_titrating: Vec::new(),
            grid: Vec::new(),
        }
    }

    /// Returns a copy specialized with one structure's derived features.
    pub fn with_features(&self, features: &StructureFeatures) -> Self {
        let mut specialized = self.clone();
        specialized.first_residue = features.first_residue;
        specialized.last_residue = features.last_residue;
        specialized.his_tautomers = features.his_tautomers.clone();
        specialized.cys_titrating = features.cys_titrating.clone();
        specialized.grid = features.grid.clone();
        specialized
    }

    /// Basename under which the parameter file appears in the working
    /// directory and in the deck.
    pub fn param_file_name(&self) -> String {
        self.param_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Result files to publish for this calculation: the mode's fixed list
    /// plus the parameter file actually used.
    pub fn keep_files(&self) -> Vec<String> {
        let mut keep: Vec<String> = self
            .mode
            .keep_files()
            .iter()
            .map(|s| s.to_string())
            .collect();
        keep.push(self.param_file_name());
        keep
    }
}

/// A typed value for a titratable calculation field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Float(f64),
    Int(i64),
}

/// The calculation fields a sweep may titrate.
///
/// Structural inputs, booleans, and file paths are deliberately absent: the
/// closed enum is the "not titratable" exclusion set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamField {
    Temperature,
    SolventDielectric,
    ProteinDielectric,
    IonicStrength,
    IonicRadius,
    MapSphere,
    MapSamples,
}

impl ParamField {
    pub const ALL: [ParamField; 7] = [
        ParamField::Temperature,
        ParamField::SolventDielectric,
        ParamField::ProteinDielectric,
        ParamField::IonicStrength,
        ParamField::IonicRadius,
        ParamField::MapSphere,
        ParamField::MapSamples,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ParamField::Temperature => "temperature",
            ParamField::SolventDielectric => "solvent_dielec",
            ParamField::ProteinDielectric => "protein_dielec",
            ParamField::IonicStrength => "ionic_strength",
            ParamField::IonicRadius => "ionic_radius",
            ParamField::MapSphere => "map_sphere",
            ParamField::MapSamples => "map_sample",
        }
    }

    /// Looks a field up by its user-facing name; hyphens and underscores are
    /// interchangeable.
    pub fn from_name(name: &str) -> Option<ParamField> {
        let normalized = name.replace('-', "_");
        ParamField::ALL
            .into_iter()
            .find(|field| field.name() == normalized)
    }

    /// Parses one textual sweep value into this field's native type.
    pub fn parse_value(&self, text: &str) -> Option<ParamValue> {
        match self {
            ParamField::MapSamples => text.parse().ok().map(ParamValue::Int),
            _ => text.parse().ok().map(ParamValue::Float),
        }
    }

    /// The field's current value in a parameter set.
    pub fn current(&self, params: &CalculationParameters) -> ParamValue {
        match self {
            ParamField::Temperature => ParamValue::Float(params.temperature),
            ParamField::SolventDielectric => ParamValue::Float(params.solvent_dielectric),
            ParamField::ProteinDielectric => ParamValue::Float(params.protein_dielectric),
            ParamField::IonicStrength => ParamValue::Float(params.ionic_strength),
            ParamField::IonicRadius => ParamValue::Float(params.ionic_radius),
            ParamField::MapSphere => ParamValue::Float(params.map_sphere),
            ParamField::MapSamples => ParamValue::Int(params.map_samples),
        }
    }

    /// Returns a fresh parameter set with this field set to `value`.
    pub fn apply(&self, params: &CalculationParameters, value: ParamValue) -> CalculationParameters {
        let mut next = params.clone();
        match (self, value) {
            (ParamField::Temperature, ParamValue::Float(v)) => next.temperature = v,
            (ParamField::SolventDielectric, ParamValue::Float(v)) => next.solvent_dielectric = v,
            (ParamField::ProteinDielectric, ParamValue::Float(v)) => next.protein_dielectric = v,
            (ParamField::IonicStrength, ParamValue::Float(v)) => next.ionic_strength = v,
            (ParamField::IonicRadius, ParamValue::Float(v)) => next.ionic_radius = v,
            (ParamField::MapSphere, ParamValue::Float(v)) => next.map_sphere = v,
            (ParamField::MapSamples, ParamValue::Int(v)) => next.map_samples = v,
            // A mistyped value can only come from a programming error in the
            // planner; coerce through f64 to stay total.
            (field, ParamValue::Float(v)) => return field.apply(params, ParamValue::Int(v as i64)),
            (field, ParamValue::Int(v)) => return field.apply(params, ParamValue::Float(v as f64)),
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> CalculationParameters {
        CalculationParameters::new(CalcMode::SingleSite, PathBuf::from("/data/pkaS.dat"))
    }

    #[test]
    fn defaults_match_reference_values() {
        let p = base();
        assert_eq!(p.temperature, 298.0);
        assert_eq!(p.solvent_dielectric, 78.5);
        assert_eq!(p.protein_dielectric, 20.0);
        assert_eq!(p.ionic_strength, 100.0);
        assert_eq!(p.ionic_radius, 2.0);
        assert_eq!(p.map_sphere, 1.4);
        assert_eq!(p.map_samples, 500);
        assert_eq!(p.ph_scan, PhScan::default());
        assert_eq!(p.max_elec_iterations, 300);
        assert_eq!(p.num_chains, 1);
        assert_eq!(p.change_acid, "n");
    }

    #[test]
    fn keep_files_include_parameter_file_basename() {
        let p = base();
        let keep = p.keep_files();
        assert!(keep.contains(&"pkaS-potentials".to_string()));
        assert!(keep.contains(&"pkaS.dat".to_string()));
    }

    #[test]
    fn full_mode_has_four_refine_pairs_single_has_two() {
        assert_eq!(CalcMode::SingleSite.refine_pairs().len(), 2);
        assert_eq!(CalcMode::FullSite.refine_pairs().len(), 4);
    }

    #[test]
    fn apply_returns_fresh_copy_without_mutating_base() {
        let p = base();
        let next = ParamField::IonicStrength.apply(&p, ParamValue::Float(0.1));
        assert_eq!(next.ionic_strength, 0.1);
        assert_eq!(p.ionic_strength, 100.0);
    }

    #[test]
    fn field_lookup_accepts_both_separators() {
        assert_eq!(
            ParamField::from_name("protein-dielec"),
            Some(ParamField::ProteinDielectric)
        );
        assert_eq!(
            ParamField::from_name("protein_dielec"),
            Some(ParamField::ProteinDielectric)
        );
        assert_eq!(ParamField::from_name("override"), None);
        assert_eq!(ParamField::from_name("ph_param"), None);
    }

    #[test]
    fn map_samples_parses_as_integer() {
        let v = ParamField::MapSamples.parse_value("250").unwrap();
        assert_eq!(v, ParamValue::Int(250));
        assert!(ParamField::MapSamples.parse_value("2.5").is_none());
    }
}
