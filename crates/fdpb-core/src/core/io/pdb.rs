use crate::core::models::atom::{AtomRecord, ChainLocation};
use nalgebra::Point3;
use std::io::{self, BufRead};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StructureError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed structure on line {line}: {kind}")]
    Malformed {
        line: usize,
        kind: StructureParseErrorKind,
    },
    #[error("No atom records found in structure input")]
    Empty,
}

#[derive(Debug, Error)]
pub enum StructureParseErrorKind {
    #[error("Line is too short for an ATOM record (must be at least 54 chars)")]
    LineTooShort,
    #[error("Invalid residue number in columns 23-26 (value: '{value}')")]
    InvalidResidueNumber { value: String },
    #[error("Invalid {axis} coordinate (value: '{value}')")]
    InvalidCoordinate { axis: char, value: String },
}

fn slice_and_trim(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end).unwrap_or("").trim()
}

fn parse_coordinate(
    line: &str,
    line_num: usize,
    start: usize,
    axis: char,
) -> Result<f64, StructureError> {
    let field = slice_and_trim(line, start, start + 8);
    field.parse().map_err(|_| StructureError::Malformed {
        line: line_num,
        kind: StructureParseErrorKind::InvalidCoordinate {
            axis,
            value: field.into(),
        },
    })
}

/// Parses fixed-column structure text into atom records, in source order.
///
/// Selection is purely on the record-type field (columns 1-4, `ATOM`); any
/// other record (remarks, terminators, heteroatoms) is skipped, so files with
/// arbitrary trailing content parse cleanly.
pub fn read_structure(reader: &mut impl BufRead) -> Result<Vec<AtomRecord>, StructureError> {
    let mut atoms = Vec::new();

    for (line_num, line_res) in reader.lines().enumerate() {
        let line = line_res?;
        let line_num = line_num + 1;

        if !line.starts_with("ATOM") {
            continue;
        }
        if line.len() < 54 {
            return Err(StructureError::Malformed {
                line: line_num,
                kind: StructureParseErrorKind::LineTooShort,
            });
        }

        let residue_name = slice_and_trim(&line, 17, 21).to_string();
        let location = match line.as_bytes().get(20) {
            Some(b'N') => ChainLocation::NTerminus,
            Some(b'C') => ChainLocation::CTerminus,
            _ => ChainLocation::Interior,
        };
        let seq_str = slice_and_trim(&line, 22, 26);
        let residue_seq: isize = seq_str.parse().map_err(|_| StructureError::Malformed {
            line: line_num,
            kind: StructureParseErrorKind::InvalidResidueNumber {
                value: seq_str.into(),
            },
        })?;
        let name = slice_and_trim(&line, 12, 16).to_string();
        let x = parse_coordinate(&line, line_num, 30, 'x')?;
        let y = parse_coordinate(&line, line_num, 38, 'y')?;
        let z = parse_coordinate(&line, line_num, 46, 'z')?;

        atoms.push(AtomRecord {
            residue_name,
            residue_seq,
            location,
            name,
            position: Point3::new(x, y, z),
            raw: line,
        });
    }

    if atoms.is_empty() {
        return Err(StructureError::Empty);
    }
    Ok(atoms)
}

pub fn read_structure_file(path: &Path) -> Result<Vec<AtomRecord>, StructureError> {
    let file = std::fs::File::open(path)?;
    read_structure(&mut io::BufReader::new(file))
}
