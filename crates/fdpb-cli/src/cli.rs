use crate::error::{CliError, Result};
use clap::Parser;
use fdpb::core::models::params::{CalcMode, CalculationParameters, PhScan};
use fdpb::workflows::sweep::SweepSpec;
use std::path::{Path, PathBuf};

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

// CLI defaults mirror CalculationParameters::new; check_override compares
// against these to detect options that only influence the generated deck.
const DEFAULT_TEMPERATURE: f64 = 298.0;
const DEFAULT_PROTEIN_DIELEC: f64 = 20.0;
const DEFAULT_SOLVENT_DIELEC: f64 = 78.5;
const DEFAULT_IONIC_STRENGTH: f64 = 100.0;
const DEFAULT_IONIC_RADIUS: f64 = 2.0;
const DEFAULT_MAP_SPHERE: f64 = 1.4;
const DEFAULT_MAP_SAMPLE: i64 = 500;

#[derive(Parser, Debug)]
#[command(
    name = "fdpb",
    version,
    about = "Finite-difference Poisson-Boltzmann pKa titration driver for protein structures.",
    help_template = HELP_TEMPLATE,
)]
pub struct Cli {
    /// Structure file (.pdb) or a directory of structure files
    pub target: PathBuf,

    /// Run the full multi-atom site pipeline instead of single-site
    #[arg(short = 'f', long)]
    pub full: bool,

    /// Keep per-calculation scratch directories after the run
    #[arg(short = 'k', long = "keep-temp")]
    pub keep_temp: bool,

    /// Temperature in Kelvin
    #[arg(short = 'T', long, default_value_t = DEFAULT_TEMPERATURE)]
    pub temperature: f64,

    /// Protein interior dielectric constant
    #[arg(short = 'p', long = "protein-dielec", default_value_t = DEFAULT_PROTEIN_DIELEC)]
    pub protein_dielec: f64,

    /// Solvent dielectric constant
    #[arg(short = 'w', long = "solvent-dielec", default_value_t = DEFAULT_SOLVENT_DIELEC)]
    pub solvent_dielec: f64,

    /// Ionic strength in mM
    #[arg(short = 'i', long = "ionic-strength", default_value_t = DEFAULT_IONIC_STRENGTH)]
    pub ionic_strength: f64,

    /// Ion exclusion radius in Angstroms
    #[arg(short = 'r', long = "ionic-radius", default_value_t = DEFAULT_IONIC_RADIUS)]
    pub ionic_radius: f64,

    /// Probe sphere radius for the dielectric map, in Angstroms
    #[arg(short = 'm', long = "map-sphere", default_value_t = DEFAULT_MAP_SPHERE)]
    pub map_sphere: f64,

    /// Surface sample points per atom for the dielectric map
    #[arg(short = 's', long = "map-sample", default_value_t = DEFAULT_MAP_SAMPLE)]
    pub map_sample: i64,

    /// pH range swept by the summarization stage
    #[arg(
        long = "ph-param",
        num_args = 3,
        allow_hyphen_values = true,
        value_names = ["START", "STOP", "STEP"],
        default_values_t = [-5.0, 20.0, 0.25],
    )]
    pub ph_param: Vec<f64>,

    /// Charge/radius parameter file handed to the solver
    #[arg(short = 'a', long = "param-file", value_name = "FILE")]
    pub param_file: PathBuf,

    /// File listing residue numbers of cysteines to titrate
    #[arg(short = 'e', long = "cys-titrate", value_name = "FILE")]
    pub cys_titrate: Option<PathBuf>,

    /// File of histidine tautomer codes, one per histidine
    #[arg(short = 'H', long = "his-tautomers", value_name = "FILE")]
    pub his_tautomers: Option<PathBuf>,

    /// Grid levels file overriding the built-in focusing scheme
    #[arg(short = 'g', long, value_name = "FILE")]
    pub grid: Option<PathBuf>,

    /// Hand-written input deck used verbatim instead of a generated one
    #[arg(short = 'o', long = "override", value_name = "DECK")]
    pub override_deck: Option<PathBuf>,

    /// Sweep one field over the values in a file
    #[arg(short = 't', long, num_args = 2, value_names = ["FIELD", "FILE"])]
    pub titration: Option<Vec<String>>,

    /// Root of the published output tree
    #[arg(long = "out-dir", default_value = "fdpb-out", value_name = "DIR")]
    pub out_dir: PathBuf,

    /// Root for scratch directories (defaults to the system temp directory)
    #[arg(long = "scratch-dir", value_name = "DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Record solver failures and keep going instead of failing fast
    #[arg(long = "continue-on-failure")]
    pub continue_on_failure: bool,

    /// Refinement pass bound before a calculation is declared stuck
    #[arg(long = "max-refine-iterations", default_value_t = 1000)]
    pub max_refine_iterations: usize,

    /// Delay between convergence sentinel checks, in milliseconds
    #[arg(long = "poll-interval-ms", default_value_t = 250)]
    pub poll_interval_ms: u64,

    /// Wall-clock limit per solver stage, in seconds
    #[arg(long = "stage-timeout-secs", value_name = "SECS")]
    pub stage_timeout_secs: Option<u64>,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to this file in addition to stderr
    #[arg(long = "log-file", global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    pub fn mode(&self) -> CalcMode {
        if self.full {
            CalcMode::FullSite
        } else {
            CalcMode::SingleSite
        }
    }

    /// Builds the base parameter set every structure and sweep point
    /// specializes from.
    pub fn parameters(&self) -> CalculationParameters {
        let mut params = CalculationParameters::new(self.mode(), self.param_file.clone());
        params.temperature = self.temperature;
        params.protein_dielectric = self.protein_dielec;
        params.solvent_dielectric = self.solvent_dielec;
        params.ionic_strength = self.ionic_strength;
        params.ionic_radius = self.ionic_radius;
        params.map_sphere = self.map_sphere;
        params.map_samples = self.map_sample;
        params.ph_scan = PhScan {
            start: self.ph_param[0],
            stop: self.ph_param[1],
            step: self.ph_param[2],
        };
        params.override_deck = self.override_deck.clone();
        params.his_tautomer_file = self.his_tautomers.clone();
        params.cys_titrate_file = self.cys_titrate.clone();
        params.grid_file = self.grid.clone();
        params
    }

    pub fn sweep_spec(&self) -> Result<SweepSpec> {
        match &self.titration {
            Some(pair) => Ok(SweepSpec::from_titration(&pair[0], Path::new(&pair[1]))?),
            None => Ok(SweepSpec::Single),
        }
    }

    /// A hand-written deck bypasses the deck generator, so every option that
    /// only influences the generated deck is rejected alongside it. Mode,
    /// pH scan, parameter file, and scratch handling still apply.
    pub fn check_override(&self) -> Result<()> {
        if self.override_deck.is_none() {
            return Ok(());
        }

        let mut rejected = Vec::new();
        if self.temperature != DEFAULT_TEMPERATURE {
            rejected.push("--temperature");
        }
        if self.protein_dielec != DEFAULT_PROTEIN_DIELEC {
            rejected.push("--protein-dielec");
        }
        if self.solvent_dielec != DEFAULT_SOLVENT_DIELEC {
            rejected.push("--solvent-dielec");
        }
        if self.ionic_strength != DEFAULT_IONIC_STRENGTH {
            rejected.push("--ionic-strength");
        }
        if self.ionic_radius != DEFAULT_IONIC_RADIUS {
            rejected.push("--ionic-radius");
        }
        if self.map_sphere != DEFAULT_MAP_SPHERE {
            rejected.push("--map-sphere");
        }
        if self.map_sample != DEFAULT_MAP_SAMPLE {
            rejected.push("--map-sample");
        }
        if self.cys_titrate.is_some() {
            rejected.push("--cys-titrate");
        }
        if self.his_tautomers.is_some() {
            rejected.push("--his-tautomers");
        }
        if self.grid.is_some() {
            rejected.push("--grid");
        }
        if self.titration.is_some() {
            rejected.push("--titration");
        }

        if rejected.is_empty() {
            Ok(())
        } else {
            Err(CliError::OverrideConflict {
                options: rejected.join(", "),
            })
        }
    }
}
