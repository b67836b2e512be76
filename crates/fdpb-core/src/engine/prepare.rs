//! Working-directory setup for one calculation.
//!
//! The solver pipeline expects a set of preparatory files that were
//! historically produced by separate `prepare` binaries: site listings
//! derived from the structure, charge-state bookkeeping files, and the
//! initialization deck for the first solve. Everything here is fixed-column
//! text keyed to the structure's raw atom lines, so the functions slice the
//! preserved source lines rather than re-rendering from parsed fields.

use crate::core::models::atom::{AtomRecord, ChainLocation};
use crate::core::models::params::{CalcMode, CalculationParameters, PhScan};
use crate::core::sites::{GROUP_CHARGES, GROUP_PKAS, SiteParameters, TITRATABLE_ATOMS};
use crate::engine::error::EngineError;
use std::path::Path;
use tracing::warn;

/// Fixed structure name inside every working directory.
pub const PROTEIN_FILE: &str = "proteinH.pdb";

/// Header line written at the top of the re-emitted structure; the site
/// listing repeats it as its own first line.
pub fn protein_header(source_name: &str) -> String {
    format!("REMARK  {source_name}")
}

/// Re-emits the structure as an atom-only file with a remark header and a
/// terminal END record.
pub fn write_protein(
    atoms: &[AtomRecord],
    header: &str,
    work_dir: &Path,
) -> Result<(), EngineError> {
    let mut text = String::with_capacity(atoms.len() * 80);
    text.push_str(header);
    text.push('\n');
    for atom in atoms {
        text.push_str(&atom.raw);
        text.push('\n');
    }
    text.push_str("END\n");
    std::fs::write(work_dir.join(PROTEIN_FILE), text)?;
    Ok(())
}

/// Renumbers an atom line's serial field in place, keeping every other
/// column byte-for-byte.
fn renumber(line: &str, serial: usize) -> String {
    format!("{}{:>5}{}", &line[..6], serial, &line[11..])
}

/// Residue key columns used for grouping site lines.
fn residue_key(line: &str) -> &str {
    &line[21..26]
}

/// Writes the single-site preparatory files: `tempor.pdb` (all atoms of
/// titratable residues, renumbered per residue), `sitesinpr.pdb` (one
/// anchor-atom line per site), and `titraa.pdb` (per-residue atom lists with
/// the anchor first).
pub fn prepare_single(
    atoms: &[AtomRecord],
    header: &str,
    work_dir: &Path,
) -> Result<(), EngineError> {
    // Titratable selection: N-terminal atoms, named titratable residues,
    // C-terminal atoms, in that order. Lines are truncated to the 54-column
    // coordinate core.
    let mut site_lines: Vec<&str> = Vec::new();
    site_lines.extend(
        atoms
            .iter()
            .filter(|a| a.location == ChainLocation::NTerminus)
            .map(|a| &a.raw[..54]),
    );
    site_lines.extend(
        atoms
            .iter()
            .filter(|a| TITRATABLE_ATOMS.contains_key(a.residue_name.as_str()))
            .map(|a| &a.raw[..54]),
    );
    site_lines.extend(
        atoms
            .iter()
            .filter(|a| a.location == ChainLocation::CTerminus)
            .map(|a| &a.raw[..54]),
    );

    // Unique residues in selection order.
    let mut residues: Vec<&str> = Vec::new();
    for line in &site_lines {
        if residues.last() != Some(&residue_key(line)) {
            residues.push(residue_key(line));
        }
    }

    let mut tempor = String::new();
    let mut sitesinpr = format!("{:<54}\n", header.trim());
    let mut titraa = String::new();

    for residue in &residues {
        let residue_atoms: Vec<&str> = site_lines
            .iter()
            .filter(|l| residue_key(l) == *residue)
            .copied()
            .collect();

        for (i, line) in residue_atoms.iter().enumerate() {
            tempor.push_str(&renumber(line, i + 1));
            tempor.push('\n');
        }

        let anchor_name = anchor_atom(residue_atoms[0])?;
        let anchor_line = *residue_atoms
            .iter()
            .find(|l| l[12..16].trim() == anchor_name)
            .ok_or_else(|| {
                EngineError::Internal(format!(
                    "residue '{}' has no '{anchor_name}' atom to titrate",
                    residue.trim()
                ))
            })?;
        sitesinpr.push_str(anchor_line);
        sitesinpr.push('\n');

        let mut ordered: Vec<&str> = vec![anchor_line];
        ordered.extend(residue_atoms.iter().copied().filter(|&l| l != anchor_line));
        for (i, line) in ordered.iter().enumerate() {
            titraa.push_str(&renumber(line, i + 1));
            titraa.push('\n');
        }
    }

    sitesinpr.push_str("END");

    std::fs::write(work_dir.join("tempor.pdb"), tempor)?;
    std::fs::write(work_dir.join("sitesinpr.pdb"), sitesinpr)?;
    std::fs::write(work_dir.join("titraa.pdb"), titraa)?;
    Ok(())
}

/// Member atoms of a titratable group; residues with no parameter entry
/// contribute no charge-changing atoms.
fn members_for<'s>(sites: &'s SiteParameters, name: &str) -> &'s [String] {
    match sites.group(name) {
        Some(group) => &group.members,
        None => {
            warn!(residue = name, "no parameter entry for residue; treating as rigid");
            &[]
        }
    }
}

/// The titratable atom name for a residue's first site line: named residues
/// come from the anchor table, terminal groups titrate their backbone N/C.
fn anchor_atom(line: &str) -> Result<&'static str, EngineError> {
    if let Some(atom) = TITRATABLE_ATOMS.get(line[17..21].trim()) {
        return Ok(atom);
    }
    match &line[20..21] {
        "N" => Ok("N"),
        "C" => Ok("C"),
        other => Err(EngineError::Internal(format!(
            "residue '{}' (terminus flag '{other}') is not titratable",
            line[17..21].trim()
        ))),
    }
}

/// Renders a float the way legacy Fortran `E` descriptors do: fixed decimal
/// count with a signed two-digit exponent, right-aligned in `width`.
fn fortran_e(value: f64, width: usize, precision: usize) -> String {
    let rendered = format!("{value:.precision$E}");
    let (mantissa, exponent) = rendered.split_once('E').unwrap_or((rendered.as_str(), "0"));
    let exp: i32 = exponent.parse().unwrap_or(0);
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{:>width$}", format!("{mantissa}E{sign}{:02}", exp.abs()))
}

/// Writes the full-site preparatory files: `allgroups.pdb` (atoms whose
/// charge differs between protonation states), `allresidues.pdb` (+`.orig`,
/// every atom of every titratable residue) with `NEXT`/`END` group markers,
/// `for_pot.dat` (per-site reference pKa/charge seed records), `sites.dat`,
/// and the seed `potentials` site count.
pub fn prepare_full(
    atoms: &[AtomRecord],
    sites: &SiteParameters,
    header: &str,
    work_dir: &Path,
) -> Result<(), EngineError> {
    let titr_atoms: Vec<&AtomRecord> = atoms
        .iter()
        .filter(|a| GROUP_PKAS.contains_key(a.residue_name.as_str()))
        .collect();
    if titr_atoms.is_empty() {
        return Err(EngineError::Internal(
            "structure has no titratable residues".into(),
        ));
    }

    let next_marker = format!("{:<76}\n", "NEXT");
    let mut all_groups = format!("{header}\n");
    let mut all_residues = all_groups.clone();
    let mut for_pot = String::new();
    let mut sites_dat = String::new();

    let site_record = |for_pot: &mut String, sites_dat: &mut String, name: &str, numb: &str, counter: usize| {
        let pka = GROUP_PKAS.get(name).copied().unwrap_or(0.0);
        let charge = GROUP_CHARGES.get(name).copied().unwrap_or(0);
        for_pot.push_str(&format!(
            "{pka:4.1}{charge:6}{}{counter:6}\n",
            fortran_e(0.0, 13, 6)
        ));
        let numb: isize = numb.trim().parse().unwrap_or(0);
        sites_dat.push_str(&format!("{counter:4} {name:<4} {numb:4}\n"));
    };

    let mut current_name = titr_atoms[0].residue_name.clone();
    let mut current_numb = titr_atoms[0].raw[23..26].trim().to_string();
    let mut counter = 1usize;

    for atom in &titr_atoms {
        let numb = atom.raw[23..26].trim();
        if numb != current_numb {
            site_record(&mut for_pot, &mut sites_dat, &current_name, &current_numb, counter);
            all_residues.push_str(&next_marker);
            all_groups.push_str(&next_marker);

            current_name = atom.residue_name.clone();
            current_numb = numb.to_string();
            counter += 1;
        }

        all_residues.push_str(&atom.raw);
        all_residues.push('\n');
        if members_for(sites, &current_name)
            .iter()
            .any(|m| m == atom.raw[12..15].trim())
        {
            all_groups.push_str(&atom.raw);
            all_groups.push('\n');
        }
    }

    site_record(&mut for_pot, &mut sites_dat, &current_name, &current_numb, counter);
    all_residues.push_str(&next_marker);
    all_residues.push_str("END\n");
    all_groups.push_str(&next_marker);
    all_groups.push_str("END\n");

    std::fs::write(work_dir.join("allgroups.pdb"), &all_groups)?;
    std::fs::write(work_dir.join("allresidues.pdb"), &all_residues)?;
    std::fs::write(work_dir.join("allresidues.pdb.orig"), &all_residues)?;
    std::fs::write(work_dir.join("for_pot.dat"), for_pot)?;
    std::fs::write(work_dir.join("sites.dat"), sites_dat)?;
    std::fs::write(work_dir.join("potentials"), format!("{counter}\n"))?;
    Ok(())
}

/// Writes the initialization deck for the first solve. Single-site runs set
/// up charges from the user parameter table and dump the coarse dielectric
/// grids; full-site runs initialize from the neutral table and skip the
/// grid dump.
pub fn write_init_deck(
    params: &CalculationParameters,
    work_dir: &Path,
) -> Result<(), EngineError> {
    let coarse = params.grid.first().ok_or_else(|| {
        EngineError::Internal("no grid levels derived for initialization deck".into())
    })?;

    let charge_table = match params.mode {
        CalcMode::SingleSite => "mine",
        CalcMode::FullSite => "neut",
    };

    let mut deck = format!(
        "read mol 1 file \"{PROTEIN_FILE}\"     pdb end\n\
         set charge radii file \"{}\"     para {charge_table} end\n\
         \n elec setup mol 1\ncenter\n",
        params.param_file_name()
    );
    deck.push_str(&format!(
        " spacing   {:.2} dime    {}    {}    {}\n",
        coarse.spacing, coarse.nx, coarse.ny, coarse.nz
    ));
    deck.push_str(&format!(" nmap      {:.1}\n", params.map_sphere));
    deck.push_str(&format!(" nsph     {}\n", params.map_samples));
    deck.push_str(&format!(" sdie   {:.2}\n", params.solvent_dielectric));
    deck.push_str(&format!(" pdie   {:.2}\n", params.protein_dielectric));
    deck.push_str("end\n\n");

    if params.mode == CalcMode::SingleSite {
        for axis in ["epsi", "epsj", "epsk"] {
            deck.push_str(&format!(
                "write grid {axis} binary file  \"coarse.{axis}\" end\n"
            ));
        }
        deck.push('\n');
    }
    deck.push_str("stop\n");

    std::fs::write(work_dir.join(params.mode.init_files().0), deck)?;
    Ok(())
}

/// Renders the pH scan as the three stdin lines the summarization stage
/// reads: whole values keep one decimal, fractional values print exactly.
pub fn ph_triple(scan: PhScan) -> String {
    let render = |v: f64| {
        if v.fract() == 0.0 {
            format!("{v:.1}")
        } else {
            format!("{v}")
        }
    };
    format!(
        "{}\n{}\n{}\n",
        render(scan.start),
        render(scan.stop),
        render(scan.step)
    )
}
