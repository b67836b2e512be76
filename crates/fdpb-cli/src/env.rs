use crate::error::{CliError, Result};
use std::ffi::OsString;
use std::path::PathBuf;

/// Environment variable naming the directory with the solver binaries.
pub const BIN_DIR_VAR: &str = "UHBD";

pub fn solver_bin_dir() -> Result<PathBuf> {
    bin_dir_from(std::env::var_os(BIN_DIR_VAR))
}

fn bin_dir_from(value: Option<OsString>) -> Result<PathBuf> {
    let value = value.ok_or(CliError::MissingEnvVar { name: BIN_DIR_VAR })?;
    let dir = PathBuf::from(value);
    if dir.is_dir() {
        Ok(dir)
    } else {
        Err(CliError::BadBinaryDir {
            name: BIN_DIR_VAR,
            value: dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_variable_is_a_clear_error() {
        let err = bin_dir_from(None).unwrap_err();
        assert!(matches!(err, CliError::MissingEnvVar { name: "UHBD" }));
    }

    #[test]
    fn non_directory_value_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = bin_dir_from(Some(file.path().into())).unwrap_err();
        assert!(matches!(err, CliError::BadBinaryDir { .. }));
    }

    #[test]
    fn existing_directory_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = bin_dir_from(Some(dir.path().into())).unwrap();
        assert_eq!(resolved, dir.path());
    }
}
