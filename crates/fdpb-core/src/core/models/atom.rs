use nalgebra::Point3;

/// Position of a residue along its polypeptide chain, as flagged in the
/// character column immediately after the residue name.
///
/// Terminal residues carry an `N` or `C` marker there; tautomer-variant
/// residue names (e.g. `HISA`) reuse the same column, so any other character
/// is treated as an interior residue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChainLocation {
    /// First residue of a chain.
    NTerminus,
    /// Last residue of a chain.
    CTerminus,
    /// Any non-terminal residue.
    #[default]
    Interior,
}

/// One parsed atom line from a fixed-column structure file.
///
/// The raw source line is retained verbatim: several downstream files are
/// built by byte-exact re-emission (possibly resliced or renumbered) of the
/// original text, and round-tripping through parsed fields would perturb
/// solver-sensitive column alignment.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomRecord {
    /// Residue key from columns 18-21, trimmed (e.g. "HIS", "HISA", "ASPN").
    pub residue_name: String,
    /// Residue sequence number from columns 23-26.
    pub residue_seq: isize,
    /// Chain terminus flag derived from column 21.
    pub location: ChainLocation,
    /// Atom name from columns 13-16, trimmed (e.g. "CA", "SG").
    pub name: String,
    /// Coordinates from the three 8-column fields starting at column 31.
    pub position: Point3<f64>,
    /// The unmodified source line.
    pub raw: String,
}

impl AtomRecord {
    /// Whether this atom is the residue's alpha carbon.
    pub fn is_alpha_carbon(&self) -> bool {
        self.name == "CA"
    }

    /// Whether this atom is a cysteine sulfur (the disulfide-bond anchor).
    pub fn is_cysteine_sulfur(&self) -> bool {
        self.name == "SG" && self.residue_name.starts_with("CYS")
    }

    /// Whether this atom belongs to a histidine residue, under any of the
    /// naming conventions the upstream hydrogen-addition tools emit.
    pub fn is_histidine(&self) -> bool {
        ["HIS", "HSD", "HSE"]
            .iter()
            .any(|prefix| self.residue_name.starts_with(prefix))
    }
}
