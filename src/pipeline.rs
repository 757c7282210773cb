use std::path::{Path, PathBuf};

use log::{error, info, warn};

use crate::config::RunConfig;
use crate::error::{BuildGateError, Result};
use crate::flaky;
use crate::outcome::RunOutcome;
use crate::output::PhaseProgress;
use crate::recovery::recover_missing_reports;
use crate::runner::{self, TestStatus};
use crate::validate::validate;
use crate::variant::{resolve, PostAction};

/// External tool commands the pipeline drives. Overridable so tests can
/// substitute stubs.
#[derive(Debug, Clone)]
pub struct Tools {
    pub build: String,
    pub test: String,
    pub coverage: String,
    pub java: String,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            build: "make".to_string(),
            test: "ctest".to_string(),
            coverage: "gcovr".to_string(),
            java: "mvn".to_string(),
        }
    }
}

/// Removes build artifacts on every exit path, including panics.
///
/// Registered only for CI-triggered runs, where the workspace is
/// disposable and leftover artifacts would poison the next build.
struct CleanupGuard {
    paths: Vec<PathBuf>,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        for path in &self.paths {
            if path.exists() {
                if let Err(err) = std::fs::remove_dir_all(path) {
                    warn!("Failed to clean up {}: {err}", path.display());
                } else {
                    info!("Cleaned up {}", path.display());
                }
            }
        }
    }
}

/// Execute the full orchestration pipeline.
///
/// Fatal errors (unknown toolchain, retry without a server, unwritable
/// scratch root) abort before any test runs. Everything after a
/// successful build is non-short-circuiting: each phase records its
/// failures into the shared outcome and the next phase still runs.
pub async fn run(config: &RunConfig, tools: &Tools) -> Result<RunOutcome> {
    let mut outcome = RunOutcome::new(&config.variant_tag);

    let build_config = resolve(&config.variant_tag)?;

    if build_config.post_action == PostAction::LintOnly {
        // Lint is a terminal action: no tests, no recovery, no audits.
        let progress = PhaseProgress::start("Linting");
        let status = runner::invoke(&tools.build, &["lint"], &config.build_dir, &[]).await?;
        progress.finish(status == 0);
        if status != 0 {
            outcome.record_failure("lint", format!("lint target exited with status {status}"));
        }
        return Ok(outcome);
    }

    let flaky_list = flaky::maybe_fetch(
        config.flaky_attempts,
        config.flaky_server.as_deref(),
    )
    .await?;

    prepare_scratch(&config.scratch_dir)?;

    let _guard = config.is_ci.then(|| CleanupGuard {
        paths: vec![
            config.scratch_dir.clone(),
            config.reports_dir(),
            config.logs_dir(),
        ],
    });

    let mut compiler_envs: Vec<(&str, String)> = Vec::new();
    if let Some(toolchain) = &build_config.toolchain {
        compiler_envs.push(("CC", toolchain.cc.display().to_string()));
        compiler_envs.push(("CXX", toolchain.cxx.display().to_string()));
    }
    compiler_envs.push((
        "BUILD_SUBTYPE",
        build_config.build_subtype.to_string(),
    ));

    let progress = PhaseProgress::start("Building");
    let parallelism = config.effective_parallelism().to_string();
    let build_status = runner::invoke(
        &tools.build,
        &["-j", parallelism.as_str()],
        &config.build_dir,
        &compiler_envs,
    )
    .await?;
    progress.finish(build_status == 0);

    if build_status != 0 {
        // Compilation failure is the one early exit: nothing below can
        // produce meaningful artifacts without binaries.
        error!("Build failed with status {build_status}");
        outcome.record_failure("build", format!("build exited with status {build_status}"));
        return Ok(outcome);
    }

    let progress = PhaseProgress::start("Running tests");
    match runner::run_tests(&tools.test, &build_config, config, &flaky_list).await {
        Ok(output) => {
            outcome.tests_total = output.results.len();
            outcome.tests_failed = output
                .results
                .iter()
                .filter(|r| r.status != TestStatus::Passed)
                .count();
            if output.exit_status != 0 {
                outcome.record_failure(
                    "tests",
                    format!(
                        "test tool exited with status {} ({} of {} tests not passing)",
                        output.exit_status, outcome.tests_failed, outcome.tests_total
                    ),
                );
            }
            outcome.results = output.results;
            progress.finish(output.exit_status == 0);
        }
        Err(err) => {
            progress.finish(false);
            outcome.record_failure("tests", format!("test tool could not be launched: {err}"));
        }
    }

    match recover_missing_reports(&config.logs_dir(), &config.reports_dir()) {
        Ok(synthesized) => outcome.reports_synthesized = synthesized.len(),
        Err(err) => outcome.record_failure("recovery", format!("report recovery failed: {err}")),
    }

    if build_config.post_action == PostAction::GenerateCoverage {
        let progress = PhaseProgress::start("Generating coverage report");
        let args = ["-r", ".", "--xml", "-o", "coverage.xml"];
        match runner::invoke(&tools.coverage, &args, &config.build_dir, &[]).await {
            Ok(0) => progress.finish(true),
            Ok(status) => {
                progress.finish(false);
                outcome.record_failure(
                    "coverage",
                    format!("coverage generator exited with status {status}"),
                );
            }
            Err(err) => {
                progress.finish(false);
                outcome.record_failure("coverage", format!("coverage generator failed: {err}"));
            }
        }
    }

    if config.java_tests {
        let progress = PhaseProgress::start("Running secondary-language tests");
        match runner::invoke(&tools.java, &["test"], &config.build_dir, &[]).await {
            Ok(0) => progress.finish(true),
            Ok(status) => {
                progress.finish(false);
                outcome.record_failure(
                    "java-tests",
                    format!("secondary test runner exited with status {status}"),
                );
            }
            Err(err) => {
                progress.finish(false);
                outcome.record_failure(
                    "java-tests",
                    format!("secondary test runner failed: {err}"),
                );
            }
        }
    }

    validate(
        &config.scratch_dir,
        &config.logs_dir(),
        build_config.leak_check_required,
        &mut outcome,
    )?;

    if config.compress_logs {
        compress_logs(&config.logs_dir()).await;
    }

    Ok(outcome)
}

/// The scratch root must exist and be writable before any test starts.
fn prepare_scratch(scratch_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(scratch_dir)
        .map_err(|_| BuildGateError::ScratchUnwritable(scratch_dir.to_path_buf()))?;

    let probe = scratch_dir.join(".buildgate-probe");
    std::fs::write(&probe, b"probe")
        .and_then(|()| std::fs::remove_file(&probe))
        .map_err(|_| BuildGateError::ScratchUnwritable(scratch_dir.to_path_buf()))?;
    Ok(())
}

/// Best effort: compression only changes artifact naming, so a failure
/// here is logged rather than recorded.
async fn compress_logs(logs_dir: &Path) {
    if !logs_dir.is_dir() {
        return;
    }
    match runner::invoke("sh", &["-c", "gzip -f ./*.log"], logs_dir, &[]).await {
        Ok(0) => info!("Compressed raw test logs"),
        Ok(status) => warn!("Log compression exited with status {status}"),
        Err(err) => warn!("Log compression failed: {err}"),
    }
}
