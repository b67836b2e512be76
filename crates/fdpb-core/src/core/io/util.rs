use std::io;
use std::path::Path;

/// Reads an auxiliary value file, dropping `#` comment lines, blank lines and
/// surrounding whitespace. Every user-supplied list input (tautomer codes,
/// titrating cysteines, grid levels, titration values) goes through here so
/// they all share one comment convention.
pub fn read_value_lines(path: &Path) -> io::Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .filter(|line| !line.starts_with('#'))
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Splits value lines into whitespace-separated tokens, preserving order.
pub fn tokenize(lines: &[String]) -> Vec<&str> {
    lines
        .iter()
        .flat_map(|line| line.split_whitespace())
        .collect()
}
