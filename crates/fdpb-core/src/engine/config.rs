use crate::core::models::params::CalcMode;
use crate::engine::error::EngineError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
}

/// Process-level settings for running calculations: where the solver
/// binaries live, where scratch and published output go, and the loop
/// hardening knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Directory holding the solver binaries.
    pub bin_dir: PathBuf,
    /// Root under which per-calculation scratch directories are created.
    pub scratch_root: PathBuf,
    /// Root of the published output tree.
    pub output_root: PathBuf,
    /// Delay between checks of the convergence sentinel.
    pub poll_interval: Duration,
    /// Refinement iteration bound; past this the run fails rather than
    /// spinning forever on a solver that never writes the sentinel.
    pub max_refine_iterations: usize,
    /// Optional wall-clock limit per solver stage.
    pub stage_timeout: Option<Duration>,
    /// Leave scratch directories in place after a run.
    pub keep_scratch: bool,
    /// Keep processing remaining structures/sweep points after a solver
    /// failure instead of failing fast.
    pub continue_on_failure: bool,
}

impl RunConfig {
    /// Verifies that every binary the mode's pipeline invokes exists,
    /// reporting all missing names in one error.
    pub fn check_binaries(&self, mode: CalcMode) -> Result<(), EngineError> {
        let missing: Vec<String> = mode
            .binaries()
            .iter()
            .filter(|name| !self.bin_dir.join(name).is_file())
            .map(|name| name.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(EngineError::MissingBinary {
                dir: self.bin_dir.clone(),
                names: missing,
            })
        }
    }
}

#[derive(Default)]
pub struct RunConfigBuilder {
    bin_dir: Option<PathBuf>,
    scratch_root: Option<PathBuf>,
    output_root: Option<PathBuf>,
    poll_interval: Option<Duration>,
    max_refine_iterations: Option<usize>,
    stage_timeout: Option<Duration>,
    keep_scratch: bool,
    continue_on_failure: bool,
}

impl RunConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bin_dir(mut self, dir: PathBuf) -> Self {
        self.bin_dir = Some(dir);
        self
    }
    pub fn scratch_root(mut self, dir: PathBuf) -> Self {
        self.scratch_root = Some(dir);
        self
    }
    pub fn output_root(mut self, dir: PathBuf) -> Self {
        self.output_root = Some(dir);
        self
    }
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }
    pub fn max_refine_iterations(mut self, limit: usize) -> Self {
        self.max_refine_iterations = Some(limit);
        self
    }
    pub fn stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stage_timeout = timeout;
        self
    }
    pub fn keep_scratch(mut self, keep: bool) -> Self {
        self.keep_scratch = keep;
        self
    }
    pub fn continue_on_failure(mut self, keep_going: bool) -> Self {
        self.continue_on_failure = keep_going;
        self
    }

    pub fn build(self) -> Result<RunConfig, ConfigError> {
        Ok(RunConfig {
            bin_dir: self.bin_dir.ok_or(ConfigError::MissingParameter("bin_dir"))?,
            scratch_root: self
                .scratch_root
                .ok_or(ConfigError::MissingParameter("scratch_root"))?,
            output_root: self
                .output_root
                .ok_or(ConfigError::MissingParameter("output_root"))?,
            poll_interval: self.poll_interval.unwrap_or(Duration::from_millis(250)),
            max_refine_iterations: self.max_refine_iterations.unwrap_or(1000),
            stage_timeout: self.stage_timeout,
            keep_scratch: self.keep_scratch,
            continue_on_failure: self.continue_on_failure,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(bin_dir: PathBuf) -> RunConfig {
        RunConfigBuilder::new()
            .bin_dir(bin_dir)
            .scratch_root(PathBuf::from("/tmp/scratch"))
            .output_root(PathBuf::from("/tmp/out"))
            .build()
            .unwrap()
    }

    #[test]
    fn builder_requires_directories() {
        let err = RunConfigBuilder::new().build().unwrap_err();
        assert_eq!(err, ConfigError::MissingParameter("bin_dir"));
    }

    #[test]
    fn builder_fills_loop_defaults() {
        let cfg = config(PathBuf::from("/opt/bin"));
        assert_eq!(cfg.poll_interval, Duration::from_millis(250));
        assert_eq!(cfg.max_refine_iterations, 1000);
        assert_eq!(cfg.stage_timeout, None);
        assert!(!cfg.keep_scratch);
    }

    #[test]
    fn missing_binaries_are_all_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("uhbd"), "").unwrap();
        std::fs::write(dir.path().join("doinps"), "").unwrap();

        let cfg = config(dir.path().to_path_buf());
        let err = cfg
            .check_binaries(crate::core::models::params::CalcMode::SingleSite)
            .unwrap_err();
        match err {
            EngineError::MissingBinary { names, .. } => {
                assert_eq!(names, vec!["getgrids", "getpots", "hybrids"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn complete_binary_set_passes() {
        let dir = tempfile::tempdir().unwrap();
        for name in crate::core::models::params::CalcMode::FullSite.binaries() {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let cfg = config(dir.path().to_path_buf());
        assert!(
            cfg.check_binaries(crate::core::models::params::CalcMode::FullSite)
                .is_ok()
        );
    }
}
