//! Titratable-site reference data and full-site parameter-file parsing.
//!
//! Single-site calculations only need to know which atom anchors each
//! titratable group ([`TITRATABLE_ATOMS`]). Full-site calculations
//! additionally need, for every group, the member atoms whose charge differs
//! between protonation states; those are derived by diffing the neutral and
//! charged records of a full force-field parameter file.

use phf::phf_map;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Anchor atom of each titratable residue key, including terminus variants.
pub static TITRATABLE_ATOMS: phf::Map<&'static str, &'static str> = phf_map! {
    "HISA" => "NE2", "HISB" => "ND1", "HISN" => "ND1", "HISC" => "ND1",
    "LYS" => "NZ", "LYSN" => "NZ", "LYSC" => "NZ",
    "ARG" => "CZ", "ARGN" => "CZ", "ARGC" => "CZ",
    "ASP" => "CG", "ASPN" => "CG", "ASPC" => "CG",
    "GLU" => "CD", "GLUN" => "CD", "GLUC" => "CD",
    "TYR" => "OH", "TYRN" => "OH", "TYRC" => "OH",
    "CYS" => "SG", "CYSN" => "SG", "CYSC" => "SG",
};

/// Reference (model-compound) pKa of each full-site group.
pub static GROUP_PKAS: phf::Map<&'static str, f64> = phf_map! {
    "HISA" => 6.3, "HISB" => 6.3, "LYS" => 10.4, "ARG" => 12.0,
    "ASP" => 4.0, "GLU" => 4.4, "TYR" => 9.6, "CYS" => 8.3,
    "TERN" => 7.5, "NTEP" => 7.5, "TERC" => 3.8,
};

/// Reference formal charge of the protonated form of each full-site group.
pub static GROUP_CHARGES: phf::Map<&'static str, i32> = phf_map! {
    "HISA" => 1, "HISB" => 1, "LYS" => 1, "ARG" => 1,
    "ASP" => -1, "GLU" => -1, "TYR" => -1, "CYS" => 1,
    "TERN" => 1, "NTEP" => 1, "TERC" => -1,
};

/// One residue-level titration site used by full-site mode.
#[derive(Debug, Clone, PartialEq)]
pub struct TitratableGroup {
    pub name: String,
    pub reference_pka: f64,
    pub reference_charge: i32,
    /// Member atom names whose charge differs between protonation states,
    /// in parameter-file order.
    pub members: Vec<String>,
}

#[derive(Debug, Error)]
pub enum SiteParamError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parameter file '{path}' is missing its '{record}' record", path = path.display())]
    MissingRecord { path: PathBuf, record: &'static str },
    #[error("Parameter file '{path}' line {line}: {reason}", path = path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

/// Per-atom parameters for one residue in one charge state.
type AtomParams = Vec<(String, [f64; 3])>;

/// Full-site parameter data: for every titratable group, the atoms that
/// change between protonation states. Built once per run from the parameter
/// file and cached for its lifetime (it depends only on the file).
#[derive(Debug, Clone)]
pub struct SiteParameters {
    groups: HashMap<String, TitratableGroup>,
}

impl SiteParameters {
    /// Parses a full parameter file and derives every titratable group.
    pub fn load(path: &Path) -> Result<Self, SiteParamError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, path)
    }

    pub fn group(&self, name: &str) -> Option<&TitratableGroup> {
        self.groups.get(name)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    fn parse(text: &str, path: &Path) -> Result<Self, SiteParamError> {
        // Comment lines start with '!'; blank lines are insignificant.
        let lines: Vec<(usize, &str)> = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l))
            .filter(|(_, l)| !l.starts_with('!') && !l.trim().is_empty())
            .collect();

        let neutral = record_slice(&lines, "neut").ok_or(SiteParamError::MissingRecord {
            path: path.to_path_buf(),
            record: "neut",
        })?;
        let charged = record_slice(&lines, "char").ok_or(SiteParamError::MissingRecord {
            path: path.to_path_buf(),
            record: "char",
        })?;

        let neutral_params = parse_record(neutral, path)?;
        let charged_params = parse_record(charged, path)?;

        let mut groups = HashMap::new();
        for (name, neutral_atoms) in &neutral_params {
            let Some(charged_atoms) = charged_params.get(name) else {
                warn!(residue = %name, "neutral entry has no charged entry; skipping");
                continue;
            };

            let charged_lookup: HashMap<&str, &[f64; 3]> = charged_atoms
                .iter()
                .map(|(atom, p)| (atom.as_str(), p))
                .collect();
            let members: Vec<String> = neutral_atoms
                .iter()
                .filter(|(atom, neutral_p)| {
                    charged_lookup
                        .get(atom.as_str())
                        .is_some_and(|charged_p| *charged_p != neutral_p)
                })
                .map(|(atom, _)| atom.clone())
                .collect();

            let (Some(&pka), Some(&charge)) =
                (GROUP_PKAS.get(name.as_str()), GROUP_CHARGES.get(name.as_str()))
            else {
                warn!(residue = %name, "no reference pKa/charge for group; skipping");
                continue;
            };

            groups.insert(
                name.clone(),
                TitratableGroup {
                    name: name.clone(),
                    reference_pka: pka,
                    reference_charge: charge,
                    members,
                },
            );
        }

        for name in charged_params.keys() {
            if !neutral_params.contains_key(name) {
                warn!(residue = %name, "charged entry has no neutral entry; skipping");
            }
        }

        Ok(SiteParameters { groups })
    }
}

/// Returns the body lines of the named record (header skipped), up to the
/// next record keyword.
fn record_slice<'a>(
    lines: &'a [(usize, &'a str)],
    keyword: &str,
) -> Option<&'a [(usize, &'a str)]> {
    const RECORD_KEYWORDS: [&str; 3] = ["equi", "neut", "char"];

    let is_record = |line: &str| {
        line.get(..4)
            .is_some_and(|head| RECORD_KEYWORDS.contains(&head.to_ascii_lowercase().as_str()))
    };

    let start = lines
        .iter()
        .position(|(_, l)| l.get(..4).is_some_and(|h| h.eq_ignore_ascii_case(keyword)))?;
    let body = &lines[start + 1..];
    let end = body
        .iter()
        .position(|(_, l)| is_record(l))
        .unwrap_or(body.len());
    // Each record carries one column-header line after its keyword.
    let body = &body[..end];
    Some(if body.is_empty() { body } else { &body[1..] })
}

/// Parses one record's body into per-residue atom parameter lists.
fn parse_record(
    lines: &[(usize, &str)],
    path: &Path,
) -> Result<HashMap<String, AtomParams>, SiteParamError> {
    let mut residues: HashMap<String, AtomParams> = HashMap::new();

    for &(line_num, line) in lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 {
            return Err(SiteParamError::Malformed {
                path: path.to_path_buf(),
                line: line_num,
                reason: format!("expected 'residue atom q r eps', got '{line}'"),
            });
        }
        let mut values = [0.0f64; 3];
        for (slot, field) in values.iter_mut().zip(&fields[2..5]) {
            *slot = field.parse().map_err(|_| SiteParamError::Malformed {
                path: path.to_path_buf(),
                line: line_num,
                reason: format!("'{field}' is not a number"),
            })?;
        }
        residues
            .entry(fields[0].to_string())
            .or_default()
            .push((fields[1].to_string(), values));
    }

    Ok(residues)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
! full parameter file
equi
res atom q r eps
ALA N 0.0 1.6 0.1
neut
res atom q r eps
ASP OD1 -0.3 1.5 0.1
ASP OD2 -0.3 1.5 0.1
ASP CG 0.6 1.9 0.1
LYS NZ 0.0 1.7 0.1
char
res atom q r eps
ASP OD1 -0.5 1.5 0.1
ASP OD2 -0.5 1.5 0.1
ASP CG 0.6 1.9 0.1
LYS NZ 1.0 1.7 0.1
";

    #[test]
    fn members_are_atoms_that_differ_between_states() {
        let sites = SiteParameters::parse(SAMPLE, Path::new("test.dat")).unwrap();
        let asp = sites.group("ASP").unwrap();
        assert_eq!(asp.members, vec!["OD1".to_string(), "OD2".to_string()]);
        assert_eq!(asp.reference_pka, 4.0);
        assert_eq!(asp.reference_charge, -1);

        let lys = sites.group("LYS").unwrap();
        assert_eq!(lys.members, vec!["NZ".to_string()]);
    }

    #[test]
    fn unpaired_entries_are_skipped_not_fatal() {
        let text = "\
neut
res atom q r eps
GLU CD 0.5 1.9 0.1
TYR OH -0.2 1.5 0.1
char
res atom q r eps
GLU CD 0.7 1.9 0.1
";
        let sites = SiteParameters::parse(text, Path::new("test.dat")).unwrap();
        assert!(sites.group("GLU").is_some());
        assert!(sites.group("TYR").is_none());
        assert_eq!(sites.len(), 1);
    }

    #[test]
    fn missing_charged_record_is_an_error() {
        let text = "neut\nres atom q r eps\nASP CG 0.6 1.9 0.1\n";
        let err = SiteParameters::parse(text, Path::new("test.dat")).unwrap_err();
        assert!(matches!(
            err,
            SiteParamError::MissingRecord { record: "char", .. }
        ));
    }

    #[test]
    fn malformed_numeric_field_is_reported_with_line() {
        let text = "neut\nhdr\nASP CG x 1.9 0.1\nchar\nhdr\nASP CG 0.6 1.9 0.1\n";
        let err = SiteParameters::parse(text, Path::new("test.dat")).unwrap_err();
        assert!(matches!(err, SiteParamError::Malformed { line: 3, .. }));
    }

    #[test]
    fn reference_tables_cover_the_same_groups() {
        for key in GROUP_PKAS.keys() {
            assert!(GROUP_CHARGES.contains_key(key), "{key} missing a charge");
        }
        assert_eq!(GROUP_PKAS.len(), GROUP_CHARGES.len());
    }

    #[test]
    fn titratable_anchor_lookup() {
        assert_eq!(TITRATABLE_ATOMS.get("HISA"), Some(&"NE2"));
        assert_eq!(TITRATABLE_ATOMS.get("CYSC"), Some(&"SG"));
        assert!(TITRATABLE_ATOMS.get("GLY").is_none());
    }
}
