//! Sweep planning: turning one parameter set and an optional titration axis
//! into concrete (parameters, output directory) run points.
//!
//! Planning is pure: no directory is created here, and replanning the same
//! inputs yields the same paths, so reruns land on the same output tree.

use crate::core::io::util::{read_value_lines, tokenize};
use crate::core::models::params::{CalculationParameters, ParamField, ParamValue};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Decimal-precision ceiling for path components; values identical to nine
/// decimals are treated as duplicates rather than escalated further.
const MAX_PATH_PRECISION: usize = 9;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error(
        "'{variable}' cannot be titrated; available fields: {}",
        ParamField::ALL.map(|f| f.name()).join(", ")
    )]
    UnknownTitrationVariable { variable: String },

    #[error("Titration file '{path}' contains no values", path = path.display())]
    EmptyTitrationFile { path: PathBuf },

    #[error(
        "Titration file '{path}': '{value}' is not a valid {field} value",
        path = path.display()
    )]
    InvalidTitrationValue {
        path: PathBuf,
        value: String,
        field: &'static str,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a run sweeps over.
#[derive(Debug, Clone, PartialEq)]
pub enum SweepSpec {
    /// One calculation at the base parameters.
    Single,
    /// One calculation per value of a titratable field.
    Axis {
        field: ParamField,
        values: Vec<ParamValue>,
    },
}

impl SweepSpec {
    /// Builds an axis spec from a user-facing field name and a value file.
    pub fn from_titration(variable: &str, values_file: &Path) -> Result<SweepSpec, PlanError> {
        let field =
            ParamField::from_name(variable).ok_or_else(|| PlanError::UnknownTitrationVariable {
                variable: variable.to_string(),
            })?;

        let lines = read_value_lines(values_file)?;
        let tokens = tokenize(&lines);
        if tokens.is_empty() {
            return Err(PlanError::EmptyTitrationFile {
                path: values_file.to_path_buf(),
            });
        }

        let mut values = Vec::with_capacity(tokens.len());
        for token in tokens {
            let value =
                field
                    .parse_value(token)
                    .ok_or_else(|| PlanError::InvalidTitrationValue {
                        path: values_file.to_path_buf(),
                        value: token.to_string(),
                        field: field.name(),
                    })?;
            values.push(value);
        }

        Ok(SweepSpec::Axis { field, values })
    }

    pub fn len(&self) -> usize {
        match self {
            SweepSpec::Single => 1,
            SweepSpec::Axis { values, .. } => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One planned calculation: specialized parameters and where its published
/// results go.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepPoint {
    pub label: String,
    pub params: CalculationParameters,
    pub output_dir: PathBuf,
}

/// Enumerates the run points for one structure under `base_dir`.
///
/// Output paths follow `D<dielectric>/<ionic strength>` with the titration
/// value either replacing the matching component or appended as a
/// `<field>_<value>` subdirectory. Components use one-decimal fixed
/// formatting; when adjacent axis values would render identically the whole
/// axis escalates to more decimals until every component is distinct.
pub fn plan(
    base_dir: &Path,
    base_params: &CalculationParameters,
    spec: &SweepSpec,
) -> Vec<SweepPoint> {
    match spec {
        SweepSpec::Single => vec![point(base_dir, base_params.clone(), None)],
        SweepSpec::Axis { field, values } => {
            let values = dedup_values(*field, values);
            let precision = axis_precision(&values);
            let values = drop_indistinct(*field, values, precision);
            values
                .into_iter()
                .map(|value| {
                    let params = field.apply(base_params, value);
                    point(base_dir, params, Some((*field, value, precision)))
                })
                .collect()
        }
    }
}

fn point(
    base_dir: &Path,
    params: CalculationParameters,
    axis: Option<(ParamField, ParamValue, usize)>,
) -> SweepPoint {
    let precision_for = |field: ParamField| match axis {
        Some((axis_field, _, precision)) if axis_field == field => precision,
        _ => 1,
    };

    let dielectric = format_float(
        params.protein_dielectric,
        precision_for(ParamField::ProteinDielectric),
    );
    let ionic = format_float(
        params.ionic_strength,
        precision_for(ParamField::IonicStrength),
    );

    let mut output_dir = base_dir.join(format!("D{dielectric}")).join(&ionic);
    let label = match axis {
        None => format!("D{dielectric}/{ionic}"),
        Some((field, value, precision)) => {
            let rendered = format_value(value, precision);
            // Dielectric and ionic strength already name a path component;
            // any other field gets its own.
            if !matches!(
                field,
                ParamField::ProteinDielectric | ParamField::IonicStrength
            ) {
                output_dir = output_dir.join(format!("{}_{rendered}", field.name()));
            }
            format!("{}={rendered}", field.name())
        }
    };

    SweepPoint {
        label,
        params,
        output_dir,
    }
}

/// Drops exact duplicate axis values, keeping first occurrences.
fn dedup_values(field: ParamField, values: &[ParamValue]) -> Vec<ParamValue> {
    let mut unique: Vec<ParamValue> = Vec::with_capacity(values.len());
    for &value in values {
        if unique.contains(&value) {
            warn!(field = field.name(), ?value, "duplicate titration value skipped");
        } else {
            unique.push(value);
        }
    }
    unique
}

/// Drops values whose path rendering collides with an earlier value's.
/// Only possible once `axis_precision` has hit the ceiling; surviving
/// points are guaranteed pairwise-distinct output paths.
fn drop_indistinct(field: ParamField, values: Vec<ParamValue>, precision: usize) -> Vec<ParamValue> {
    let mut kept = Vec::with_capacity(values.len());
    let mut rendered: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let text = format_value(value, precision);
        if rendered.contains(&text) {
            warn!(
                field = field.name(),
                ?value,
                "titration value indistinguishable at maximum path precision; skipped"
            );
        } else {
            rendered.push(text);
            kept.push(value);
        }
    }
    kept
}

/// Smallest decimal precision at which all axis values render distinctly.
fn axis_precision(values: &[ParamValue]) -> usize {
    for precision in 1..MAX_PATH_PRECISION {
        let rendered: Vec<String> = values
            .iter()
            .map(|&v| format_value(v, precision))
            .collect();
        let all_distinct = rendered
            .iter()
            .enumerate()
            .all(|(i, r)| !rendered[..i].contains(r));
        if all_distinct {
            return precision;
        }
    }
    MAX_PATH_PRECISION
}

fn format_float(value: f64, precision: usize) -> String {
    format!("{value:.precision$}")
}

fn format_value(value: ParamValue, precision: usize) -> String {
    match value {
        ParamValue::Float(v) => format_float(v, precision),
        ParamValue::Int(v) => v.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::params::CalcMode;
    use std::io::Write;

    fn base() -> CalculationParameters {
        CalculationParameters::new(CalcMode::SingleSite, PathBuf::from("/p/pkaS.dat"))
    }

    fn floats(values: &[f64]) -> Vec<ParamValue> {
        values.iter().map(|&v| ParamValue::Float(v)).collect()
    }

    #[test]
    fn single_plan_uses_default_components() {
        let points = plan(Path::new("/out/1abc"), &base(), &SweepSpec::Single);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].output_dir, PathBuf::from("/out/1abc/D20.0/100.0"));
    }

    #[test]
    fn dielectric_axis_varies_the_d_component() {
        let spec = SweepSpec::Axis {
            field: ParamField::ProteinDielectric,
            values: floats(&[4.0, 12.0]),
        };
        let points = plan(Path::new("/out"), &base(), &spec);
        assert_eq!(points[0].output_dir, PathBuf::from("/out/D4.0/100.0"));
        assert_eq!(points[1].output_dir, PathBuf::from("/out/D12.0/100.0"));
        assert_eq!(points[0].params.protein_dielectric, 4.0);
        assert_eq!(points[1].params.protein_dielectric, 12.0);
    }

    #[test]
    fn ionic_axis_varies_the_salt_component() {
        let spec = SweepSpec::Axis {
            field: ParamField::IonicStrength,
            values: floats(&[10.0, 300.0]),
        };
        let points = plan(Path::new("/out"), &base(), &spec);
        assert_eq!(points[0].output_dir, PathBuf::from("/out/D20.0/10.0"));
        assert_eq!(points[1].output_dir, PathBuf::from("/out/D20.0/300.0"));
    }

    #[test]
    fn other_fields_get_their_own_component() {
        let spec = SweepSpec::Axis {
            field: ParamField::Temperature,
            values: floats(&[278.0, 298.0]),
        };
        let points = plan(Path::new("/out"), &base(), &spec);
        assert_eq!(
            points[0].output_dir,
            PathBuf::from("/out/D20.0/100.0/temperature_278.0")
        );
        assert_eq!(points[1].params.temperature, 298.0);
    }

    #[test]
    fn adversarially_close_values_never_collide() {
        let spec = SweepSpec::Axis {
            field: ParamField::IonicStrength,
            values: floats(&[0.1, 0.1000001, 0.11]),
        };
        let points = plan(Path::new("/out"), &base(), &spec);
        let dirs: Vec<&PathBuf> = points.iter().map(|p| &p.output_dir).collect();
        assert_eq!(points.len(), 3);
        for (i, dir) in dirs.iter().enumerate() {
            assert!(!dirs[..i].contains(dir), "collision at {dir:?}");
        }
    }

    #[test]
    fn values_identical_past_the_precision_ceiling_collapse() {
        let spec = SweepSpec::Axis {
            field: ParamField::IonicStrength,
            values: floats(&[0.1, 0.1 + 1e-12, 0.2]),
        };
        let points = plan(Path::new("/out"), &base(), &spec);
        // The second value cannot be told apart from the first in a path
        // component, so it is dropped rather than sharing a directory.
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].params.ionic_strength, 0.1);
        assert_eq!(points[1].params.ionic_strength, 0.2);
        assert_ne!(points[0].output_dir, points[1].output_dir);
    }

    #[test]
    fn planning_is_idempotent() {
        let spec = SweepSpec::Axis {
            field: ParamField::ProteinDielectric,
            values: floats(&[4.0, 8.0]),
        };
        assert_eq!(
            plan(Path::new("/out"), &base(), &spec),
            plan(Path::new("/out"), &base(), &spec)
        );
    }

    #[test]
    fn exact_duplicates_are_dropped() {
        let spec = SweepSpec::Axis {
            field: ParamField::ProteinDielectric,
            values: floats(&[4.0, 4.0, 8.0]),
        };
        assert_eq!(plan(Path::new("/out"), &base(), &spec).len(), 2);
    }

    #[test]
    fn titration_spec_reads_value_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# dielectrics\n4.0 8.0\n12.0").unwrap();
        let spec = SweepSpec::from_titration("protein-dielec", file.path()).unwrap();
        assert_eq!(
            spec,
            SweepSpec::Axis {
                field: ParamField::ProteinDielectric,
                values: floats(&[4.0, 8.0, 12.0]),
            }
        );
    }

    #[test]
    fn unknown_variable_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = SweepSpec::from_titration("keep_temp", file.path()).unwrap_err();
        assert!(matches!(err, PlanError::UnknownTitrationVariable { .. }));
    }

    #[test]
    fn empty_titration_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# only comments\n").unwrap();
        let err = SweepSpec::from_titration("temperature", file.path()).unwrap_err();
        assert!(matches!(err, PlanError::EmptyTitrationFile { .. }));
    }

    #[test]
    fn unparsable_value_is_rejected_with_context() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "500 abc").unwrap();
        let err = SweepSpec::from_titration("map_sample", file.path()).unwrap_err();
        match err {
            PlanError::InvalidTitrationValue { value, field, .. } => {
                assert_eq!(value, "abc");
                assert_eq!(field, "map_sample");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
