//! Spawns solver stages and classifies their text output.
//!
//! The solver family signals failure in its standard output, not its exit
//! status: a worker can exit 0 after printing a fatal marker, or exit
//! nonzero after finishing useful work. Classification therefore reads the
//! captured text and ignores the status beyond logging it.

use crate::engine::error::EngineError;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Number of trailing output lines surfaced in failure diagnostics.
const DIAGNOSTIC_TAIL_LINES: usize = 5;

/// How often a running stage is checked against its deadline.
const WAIT_POLL: Duration = Duration::from_millis(20);

/// Verdict on one stage's captured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputClass {
    Ok,
    Fatal,
    Abort,
}

/// Scans stage output for the solver's failure markers: `FATAL` in columns
/// 2-6 or `BATCH MODE ABORT!` in columns 2-18 of any line. Anything else is
/// success, whatever the exit status said.
pub fn classify_output(text: &str) -> OutputClass {
    for line in text.lines() {
        if line.get(1..6) == Some("FATAL") {
            return OutputClass::Fatal;
        }
        if line.get(1..18) == Some("BATCH MODE ABORT!") {
            return OutputClass::Abort;
        }
    }
    OutputClass::Ok
}

/// Last few lines of stage output, for error messages.
pub fn diagnostic_tail(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(DIAGNOSTIC_TAIL_LINES);
    lines[start..].join("\n")
}

/// One completed piped stage: what ran, what it printed, and the verdict.
#[derive(Debug, Clone)]
pub struct SolverOutcome {
    pub stage: String,
    pub class: OutputClass,
    pub stdout: String,
}

impl SolverOutcome {
    pub fn tail(&self) -> String {
        diagnostic_tail(&self.stdout)
    }
}

/// Runs solver stages out of a fixed binary directory with an optional
/// per-stage deadline.
#[derive(Debug, Clone)]
pub struct Invoker {
    bin_dir: PathBuf,
    stage_timeout: Option<Duration>,
}

impl Invoker {
    pub fn new(bin_dir: PathBuf, stage_timeout: Option<Duration>) -> Self {
        Invoker {
            bin_dir,
            stage_timeout,
        }
    }

    /// Runs a helper stage with no stdin and inherited output, waiting for
    /// completion in `work_dir`.
    pub fn run_plain(&self, binary: &str, work_dir: &Path) -> Result<(), EngineError> {
        debug!(stage = binary, "running helper stage");
        let mut child = Command::new(self.bin_dir.join(binary))
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                binary: binary.to_string(),
                source,
            })?;

        let status = self.wait(&mut child, binary)?;
        if !status.success() {
            warn!(stage = binary, ?status, "helper stage exited nonzero");
        }
        Ok(())
    }

    /// Runs a stage with `input` piped to stdin and stdout captured.
    ///
    /// The captured text is written to `output_file` in `work_dir` in one
    /// operation, so the file is either complete or absent, then classified;
    /// a fatal or abort marker fails the stage after the file is written so
    /// the output survives for inspection.
    pub fn run_piped(
        &self,
        binary: &str,
        input: &str,
        work_dir: &Path,
        output_file: &str,
    ) -> Result<SolverOutcome, EngineError> {
        debug!(stage = binary, output_file, "running piped stage");
        let mut child = Command::new(self.bin_dir.join(binary))
            .current_dir(work_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                binary: binary.to_string(),
                source,
            })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Internal("piped stage has no stdout handle".into()))?;
        let reader = std::thread::spawn(move || {
            let mut text = String::new();
            std::io::Read::read_to_string(&mut stdout, &mut text).map(|_| text)
        });

        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| EngineError::Internal("piped stage has no stdin handle".into()))?;
            // The stage may legitimately exit before consuming all input.
            if let Err(err) = stdin.write_all(input.as_bytes()) {
                if err.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(err.into());
                }
            }
        }

        let status = self.wait(&mut child, binary)?;
        let stdout = reader
            .join()
            .map_err(|_| EngineError::Internal("stdout reader thread panicked".into()))??;
        if !status.success() {
            debug!(stage = binary, ?status, "piped stage exited nonzero");
        }

        std::fs::write(work_dir.join(output_file), &stdout)?;

        let outcome = SolverOutcome {
            stage: binary.to_string(),
            class: classify_output(&stdout),
            stdout,
        };
        match outcome.class {
            OutputClass::Ok => Ok(outcome),
            class => Err(EngineError::SolverFailure {
                stage: outcome.stage,
                class,
                tail: diagnostic_tail(&outcome.stdout),
            }),
        }
    }

    fn wait(
        &self,
        child: &mut Child,
        binary: &str,
    ) -> Result<std::process::ExitStatus, EngineError> {
        let deadline = self.stage_timeout.map(|limit| Instant::now() + limit);
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                child.kill()?;
                child.wait()?;
                return Err(EngineError::StageTimeout {
                    stage: binary.to_string(),
                });
            }
            std::thread::sleep(WAIT_POLL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_output_is_ok() {
        let text = "  iteration 1\n  iteration 2\n converged\n";
        assert_eq!(classify_output(text), OutputClass::Ok);
    }

    #[test]
    fn fatal_marker_in_column_two_is_fatal() {
        let text = " starting\n FATAL: grid allocation failed\n";
        assert_eq!(classify_output(text), OutputClass::Fatal);
    }

    #[test]
    fn fatal_marker_elsewhere_is_ignored() {
        // Marker columns are positional; a shifted match is prose, not a
        // failure report.
        let text = "   FATAL mentioned in passing\nnothing else\n";
        assert_eq!(classify_output(text), OutputClass::Ok);
    }

    #[test]
    fn abort_marker_is_abort() {
        let text = " setup\n BATCH MODE ABORT! input deck rejected\n";
        assert_eq!(classify_output(text), OutputClass::Abort);
    }

    #[test]
    fn tail_is_last_five_lines() {
        let text = "1\n2\n3\n4\n5\n6\n7\n";
        assert_eq!(diagnostic_tail(text), "3\n4\n5\n6\n7");
        assert_eq!(diagnostic_tail("only\n"), "only");
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn install_script(dir: &Path, name: &str, body: &str) {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        #[test]
        fn piped_stage_captures_stdout_to_file() {
            let bin = tempfile::tempdir().unwrap();
            let work = tempfile::tempdir().unwrap();
            install_script(bin.path(), "solver", "cat");

            let invoker = Invoker::new(bin.path().to_path_buf(), None);
            let outcome = invoker
                .run_piped("solver", "read mol 1\nstop\n", work.path(), "stage.out")
                .unwrap();

            assert_eq!(outcome.class, OutputClass::Ok);
            let written = std::fs::read_to_string(work.path().join("stage.out")).unwrap();
            assert_eq!(written, "read mol 1\nstop\n");
        }

        #[test]
        fn fatal_stage_fails_but_still_writes_output() {
            let bin = tempfile::tempdir().unwrap();
            let work = tempfile::tempdir().unwrap();
            install_script(bin.path(), "solver", "echo ' FATAL: boom'; exit 0");

            let invoker = Invoker::new(bin.path().to_path_buf(), None);
            let err = invoker
                .run_piped("solver", "", work.path(), "stage.out")
                .unwrap_err();

            assert!(matches!(err, EngineError::SolverFailure { .. }));
            assert!(work.path().join("stage.out").exists());
        }

        #[test]
        fn plain_stage_runs_in_working_directory() {
            let bin = tempfile::tempdir().unwrap();
            let work = tempfile::tempdir().unwrap();
            install_script(bin.path(), "helper", "touch marker");

            let invoker = Invoker::new(bin.path().to_path_buf(), None);
            invoker.run_plain("helper", work.path()).unwrap();
            assert!(work.path().join("marker").exists());
        }

        #[test]
        fn stage_past_deadline_is_killed() {
            let bin = tempfile::tempdir().unwrap();
            let work = tempfile::tempdir().unwrap();
            install_script(bin.path(), "slow", "sleep 5");

            let invoker =
                Invoker::new(bin.path().to_path_buf(), Some(Duration::from_millis(100)));
            let err = invoker.run_plain("slow", work.path()).unwrap_err();
            assert!(matches!(err, EngineError::StageTimeout { .. }));
        }

        #[test]
        fn missing_binary_is_a_spawn_error() {
            let bin = tempfile::tempdir().unwrap();
            let work = tempfile::tempdir().unwrap();
            let invoker = Invoker::new(bin.path().to_path_buf(), None);
            let err = invoker.run_plain("absent", work.path()).unwrap_err();
            assert!(matches!(err, EngineError::Spawn { .. }));
        }
    }
}
