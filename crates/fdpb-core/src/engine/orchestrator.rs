//! The per-calculation state machine.
//!
//! One calculation walks Setup, InitialSolve, GridPrep, a bounded number of
//! RefinementIterations, PotentialCollection, and Finalize inside one
//! explicit working directory. The refinement loop is gated on a sentinel
//! file the potential-collection stage writes when titration converges; the
//! solver owns that file, this loop only polls for it.

use crate::core::io::deck;
use crate::core::models::atom::AtomRecord;
use crate::core::models::params::{CalcMode, CalculationParameters};
use crate::core::sites::SiteParameters;
use crate::engine::config::RunConfig;
use crate::engine::error::EngineError;
use crate::engine::invoker::Invoker;
use crate::engine::prepare;
use std::path::Path;
use tracing::{debug, info};

/// Convergence sentinel written by the collection stage.
const SENTINEL_FILE: &str = "stopnow";

/// File capturing the summarization stage's stdout. The stage writes its
/// real report to `hybrid.out` itself.
const SUMMARY_LOG: &str = "hybrid-stdout.log";

/// Per-iteration renames the full-site collection stage expects between
/// passes.
const FULL_SITE_RENAMES: [(&str, &str); 3] = [
    ("tempallG.pdb", "allgroups.pdb"),
    ("tempallR.pdb", "allresidues.pdb"),
    ("tmp_for_pot.dat", "for_pot.dat"),
];

/// Runs one complete calculation in `work_dir`.
///
/// `structure_name` only labels the re-emitted structure header; the atoms
/// themselves are passed in already parsed, and full-site runs receive
/// their site parameters preloaded (the file is read once per run, not per
/// sweep point). On success the working directory holds the mode's
/// published result files; the caller decides what to copy out and whether
/// to clean up.
pub fn run_calculation(
    config: &RunConfig,
    params: &CalculationParameters,
    atoms: &[AtomRecord],
    structure_name: &str,
    sites: Option<&SiteParameters>,
    work_dir: &Path,
) -> Result<(), EngineError> {
    config.check_binaries(params.mode)?;
    std::fs::create_dir_all(work_dir)?;

    let mode = params.mode;
    let solver = mode.binaries()[0];
    let invoker = Invoker::new(config.bin_dir.clone(), config.stage_timeout);

    setup(params, atoms, structure_name, sites, work_dir)?;

    // Initial solve: the initialization deck goes through the main solver
    // on stdin.
    let (init_inp, init_out) = mode.init_files();
    info!(stage = init_inp, "initial solve");
    let init_deck = std::fs::read_to_string(work_dir.join(init_inp))?;
    invoker.run_piped(solver, &init_deck, work_dir, init_out)?;

    info!(stage = mode.grid_stage(), "grid preparation");
    invoker.run_plain(mode.grid_stage(), work_dir)?;

    refinement_loop(config, params, &invoker, work_dir)?;

    finalize(params, &invoker, work_dir)?;
    Ok(())
}

/// Setup: structure, deck (generated or override), parameter file, and the
/// mode's preparatory files.
fn setup(
    params: &CalculationParameters,
    atoms: &[AtomRecord],
    structure_name: &str,
    sites: Option<&SiteParameters>,
    work_dir: &Path,
) -> Result<(), EngineError> {
    let header = prepare::protein_header(structure_name);
    prepare::write_protein(atoms, &header, work_dir)?;

    std::fs::copy(
        &params.param_file,
        work_dir.join(params.param_file_name()),
    )?;

    match &params.override_deck {
        Some(path) => {
            debug!(deck = %path.display(), "using override deck verbatim");
            std::fs::copy(path, work_dir.join(params.mode.deck_name()))?;
        }
        None => deck::write(params, work_dir)?,
    }

    match params.mode {
        CalcMode::SingleSite => prepare::prepare_single(atoms, &header, work_dir)?,
        CalcMode::FullSite => {
            let sites = sites.ok_or_else(|| {
                EngineError::Internal("full-site calculation started without site parameters".into())
            })?;
            prepare::prepare_full(atoms, sites, &header, work_dir)?;
        }
    }
    prepare::write_init_deck(params, work_dir)
}

/// Refinement passes until the sentinel appears, bounded by the configured
/// iteration limit.
fn refinement_loop(
    config: &RunConfig,
    params: &CalculationParameters,
    invoker: &Invoker,
    work_dir: &Path,
) -> Result<(), EngineError> {
    let mode = params.mode;
    let solver = mode.binaries()[0];
    let sentinel = work_dir.join(SENTINEL_FILE);

    let mut iteration = 0usize;
    while !sentinel.exists() {
        if iteration >= config.max_refine_iterations {
            return Err(EngineError::ConvergenceTimeout {
                limit: config.max_refine_iterations,
            });
        }
        iteration += 1;
        info!(iteration, "refinement pass");

        invoker.run_plain(mode.input_prep_stage(), work_dir)?;
        for (inp, out) in mode.refine_pairs() {
            let text = std::fs::read_to_string(work_dir.join(inp))?;
            invoker.run_piped(solver, &text, work_dir, out)?;
        }
        invoker.run_plain(mode.collect_stage(), work_dir)?;

        if mode == CalcMode::FullSite {
            for (from, to) in FULL_SITE_RENAMES {
                std::fs::rename(work_dir.join(from), work_dir.join(to))?;
            }
        }

        if !sentinel.exists() {
            std::thread::sleep(config.poll_interval);
        }
    }

    debug!(iterations = iteration, "refinement converged");
    Ok(())
}

/// Finalize: publish collected potentials under the mode's result names and
/// feed the pH scan to the summarization stage.
fn finalize(
    params: &CalculationParameters,
    invoker: &Invoker,
    work_dir: &Path,
) -> Result<(), EngineError> {
    let mode = params.mode;
    std::fs::copy(
        work_dir.join("potentials"),
        work_dir.join(mode.potentials_name()),
    )?;
    if mode == CalcMode::SingleSite {
        std::fs::copy(
            work_dir.join("sitesinpr.pdb"),
            work_dir.join("pkaS-sitesinpr.pdb"),
        )?;
    }

    info!(stage = mode.summarize_stage(), "pH titration summary");
    invoker.run_piped(
        mode.summarize_stage(),
        &prepare::ph_triple(params.ph_scan),
        work_dir,
        SUMMARY_LOG,
    )?;
    Ok(())
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use crate::core::models::atom::ChainLocation;
    use crate::core::models::params::GridLevel;
    use crate::engine::config::RunConfigBuilder;
    use nalgebra::Point3;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    fn install_script(dir: &Path, name: &str, body: &str) {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn atom(name: &str, residue: &str, seq: isize) -> AtomRecord {
        let raw = format!(
            "ATOM  {:>5} {:<4} {:<4} {:>4}    {:>8.3}{:>8.3}{:>8.3}",
            1, name, residue, seq, 0.0, 0.0, 0.0
        );
        AtomRecord {
            residue_name: residue.to_string(),
            residue_seq: seq,
            location: ChainLocation::Interior,
            name: name.to_string(),
            position: Point3::origin(),
            raw,
        }
    }

    fn structure() -> Vec<AtomRecord> {
        vec![
            atom("N", "ASP", 5),
            atom("CA", "ASP", 5),
            atom("CG", "ASP", 5),
            atom("CA", "GLY", 6),
        ]
    }

    fn params(dir: &Path) -> CalculationParameters {
        let param_file = dir.join("pkaS.dat");
        std::fs::write(&param_file, "! single-site charge table\n").unwrap();
        let mut p = CalculationParameters::new(CalcMode::SingleSite, param_file);
        p.first_residue = 4;
        p.last_residue = 8;
        p.grid = vec![GridLevel::new(1.5, 65, 65, 65)];
        p
    }

    /// Stub pipeline: the collection stage converges on its second pass.
    fn install_pipeline(bin: &Path) {
        install_script(bin, "uhbd", "cat > /dev/null; echo ' solver pass complete'");
        install_script(bin, "getgrids", "true");
        install_script(
            bin,
            "doinps",
            "echo 'refine a' > uhbdpr.inp; echo 'refine b' > uhbdaa.inp",
        );
        install_script(
            bin,
            "getpots",
            "echo 1 > potentials\n\
             if [ -f pass1 ]; then touch stopnow; else touch pass1; fi",
        );
        install_script(bin, "hybrids", "cat > /dev/null; echo titration > hybrid.out");
    }

    #[test]
    fn single_site_run_publishes_results() {
        let bin = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        install_pipeline(bin.path());

        let config = RunConfigBuilder::new()
            .bin_dir(bin.path().to_path_buf())
            .scratch_root(work.path().to_path_buf())
            .output_root(work.path().to_path_buf())
            .poll_interval(Duration::from_millis(1))
            .build()
            .unwrap();
        let p = params(work.path());

        run_calculation(&config, &p, &structure(), "1abc.pdb", None, work.path()).unwrap();

        for published in [
            "pkaS-doinp.inp",
            "pkaS-uhbdini.out",
            "pkaS-potentials",
            "pkaS-sitesinpr.pdb",
            "titraa.pdb",
            "hybrid.out",
            "pkaS.dat",
        ] {
            assert!(work.path().join(published).exists(), "{published} missing");
        }
        // Two refinement passes ran before the sentinel appeared.
        assert!(work.path().join("uhbdpr.out").exists());
        assert!(work.path().join("uhbdaa.out").exists());
    }

    #[test]
    fn missing_binaries_fail_before_any_stage_runs() {
        let bin = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        install_script(bin.path(), "uhbd", "true");

        let config = RunConfigBuilder::new()
            .bin_dir(bin.path().to_path_buf())
            .scratch_root(work.path().to_path_buf())
            .output_root(work.path().to_path_buf())
            .build()
            .unwrap();
        let p = params(work.path());

        let err = run_calculation(&config, &p, &structure(), "1abc.pdb", None, work.path()).unwrap_err();
        assert!(matches!(err, EngineError::MissingBinary { .. }));
        assert!(!work.path().join("proteinH.pdb").exists());
    }

    #[test]
    fn loop_without_sentinel_times_out() {
        let bin = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        install_pipeline(bin.path());
        // Collection stage that never converges.
        install_script(bin.path(), "getpots", "echo 1 > potentials");

        let config = RunConfigBuilder::new()
            .bin_dir(bin.path().to_path_buf())
            .scratch_root(work.path().to_path_buf())
            .output_root(work.path().to_path_buf())
            .poll_interval(Duration::from_millis(1))
            .max_refine_iterations(3)
            .build()
            .unwrap();
        let p = params(work.path());

        let err = run_calculation(&config, &p, &structure(), "1abc.pdb", None, work.path()).unwrap_err();
        assert!(matches!(err, EngineError::ConvergenceTimeout { limit: 3 }));
    }

    #[test]
    fn fatal_solver_output_aborts_the_run() {
        let bin = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        install_pipeline(bin.path());
        install_script(bin.path(), "uhbd", "cat > /dev/null; echo ' FATAL: no convergence'");

        let config = RunConfigBuilder::new()
            .bin_dir(bin.path().to_path_buf())
            .scratch_root(work.path().to_path_buf())
            .output_root(work.path().to_path_buf())
            .build()
            .unwrap();
        let p = params(work.path());

        let err = run_calculation(&config, &p, &structure(), "1abc.pdb", None, work.path()).unwrap_err();
        assert!(matches!(err, EngineError::SolverFailure { .. }));
        // The failing stage's output survives for inspection.
        assert!(work.path().join("pkaS-uhbdini.out").exists());
    }

    #[test]
    fn override_deck_is_copied_verbatim() {
        let bin = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        install_pipeline(bin.path());

        let override_deck = work.path().join("custom.inp");
        std::fs::write(&override_deck, "hand-written deck\n").unwrap();

        let config = RunConfigBuilder::new()
            .bin_dir(bin.path().to_path_buf())
            .scratch_root(work.path().to_path_buf())
            .output_root(work.path().to_path_buf())
            .poll_interval(Duration::from_millis(1))
            .build()
            .unwrap();
        let mut p = params(work.path());
        p.override_deck = Some(override_deck);

        run_calculation(&config, &p, &structure(), "1abc.pdb", None, work.path()).unwrap();
        assert_eq!(
            std::fs::read_to_string(work.path().join("pkaS-doinp.inp")).unwrap(),
            "hand-written deck\n"
        );
    }

    /// Full-site stub pipeline: the collection stage emits the temporary
    /// files each pass and converges on its second pass.
    fn install_full_pipeline(bin: &Path) {
        install_script(bin, "uhbd", "cat > /dev/null; echo ' solver pass complete'");
        install_script(bin, "getgrid", "true");
        install_script(
            bin,
            "doinp",
            "for f in uhbdpr.inp1 uhbdpr.inp2 uhbdaa.inp1 uhbdaa.inp2; do echo refine > $f; done",
        );
        install_script(
            bin,
            "getpot",
            "echo G > tempallG.pdb; echo R > tempallR.pdb; echo P > tmp_for_pot.dat\n\
             echo 1 > potentials\n\
             if [ -f pass1 ]; then touch stopnow; else touch pass1; fi",
        );
        install_script(bin, "hybrid", "cat > /dev/null; echo titration > hybrid.out");
    }

    fn full_structure() -> Vec<AtomRecord> {
        vec![
            atom("N", "ASP", 5),
            atom("OD1", "ASP", 5),
            atom("OD2", "ASP", 5),
            atom("NZ", "LYS", 6),
        ]
    }

    fn full_params(dir: &Path) -> (CalculationParameters, SiteParameters) {
        let param_file = dir.join("pkaF.dat");
        std::fs::write(
            &param_file,
            "neut\n\
             res atom q r eps\n\
             ASP OD1 -0.3 1.5 0.1\n\
             ASP OD2 -0.3 1.5 0.1\n\
             LYS NZ 0.0 1.7 0.1\n\
             char\n\
             res atom q r eps\n\
             ASP OD1 -0.5 1.5 0.1\n\
             ASP OD2 -0.5 1.5 0.1\n\
             LYS NZ 1.0 1.7 0.1\n",
        )
        .unwrap();
        let sites = SiteParameters::load(&param_file).unwrap();
        let mut p = CalculationParameters::new(CalcMode::FullSite, param_file);
        p.first_residue = 4;
        p.last_residue = 8;
        p.grid = vec![GridLevel::new(1.5, 65, 65, 65)];
        (p, sites)
    }

    #[test]
    fn full_site_run_renames_and_publishes_results() {
        let bin = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        install_full_pipeline(bin.path());

        let config = RunConfigBuilder::new()
            .bin_dir(bin.path().to_path_buf())
            .scratch_root(work.path().to_path_buf())
            .output_root(work.path().to_path_buf())
            .poll_interval(Duration::from_millis(1))
            .build()
            .unwrap();
        let (p, sites) = full_params(work.path());

        run_calculation(&config, &p, &full_structure(), "1abc.pdb", Some(&sites), work.path())
            .unwrap();

        for published in [
            "doinp.inp",
            "uhbdini.out",
            "pkaF-potentials",
            "hybrid.out",
            "pkaF.dat",
        ] {
            assert!(work.path().join(published).exists(), "{published} missing");
        }
        // All four piped refine stages ran.
        for out in ["uhbdpr.out1", "uhbdpr.out2", "uhbdaa.out1", "uhbdaa.out2"] {
            assert!(work.path().join(out).exists(), "{out} missing");
        }
        // The collection stage's temporary files were renamed into place,
        // replacing the setup-time versions.
        assert_eq!(
            std::fs::read_to_string(work.path().join("allgroups.pdb")).unwrap(),
            "G\n"
        );
        assert_eq!(
            std::fs::read_to_string(work.path().join("allresidues.pdb")).unwrap(),
            "R\n"
        );
        assert_eq!(
            std::fs::read_to_string(work.path().join("for_pot.dat")).unwrap(),
            "P\n"
        );
        assert!(!work.path().join("tempallG.pdb").exists());
    }

    #[test]
    fn full_site_requires_preloaded_site_parameters() {
        let bin = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        install_full_pipeline(bin.path());

        let config = RunConfigBuilder::new()
            .bin_dir(bin.path().to_path_buf())
            .scratch_root(work.path().to_path_buf())
            .output_root(work.path().to_path_buf())
            .build()
            .unwrap();
        let (p, _) = full_params(work.path());

        let err = run_calculation(&config, &p, &full_structure(), "1abc.pdb", None, work.path())
            .unwrap_err();
        assert!(matches!(err, EngineError::Internal(_)));
    }
}
