use anyhow::Result;
use clap::Parser;
use log::info;
use std::path::PathBuf;

use crate::config::{Config, RunConfig};
use crate::output;
use crate::pipeline::{self, Tools};

#[derive(Parser)]
#[command(name = "buildgate")]
#[command(author, version, about = "Build-variant & test-run orchestrator", long_about = None)]
pub struct Cli {
    /// Build-variant tag (debug, release, asan, tsan, leakcheck, coverage, lint, client)
    #[arg(short, long, env = "BUILDGATE_VARIANT")]
    variant: Option<String>,

    /// Directory the build and test tools run in
    #[arg(short, long, env = "BUILDGATE_BUILD_DIR")]
    build_dir: Option<PathBuf>,

    /// Scratch root that tests must leave empty
    #[arg(short, long, env = "BUILDGATE_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Attempts per known-flaky test; 1 disables retries
    #[arg(long, env = "BUILDGATE_FLAKY_ATTEMPTS")]
    flaky_attempts: Option<u32>,

    /// Flaky-test list server address
    #[arg(long, env = "BUILDGATE_FLAKY_SERVER")]
    flaky_server: Option<String>,

    /// Include tests labelled slow
    #[arg(long, env = "BUILDGATE_SLOW_TESTS", default_value_t = false)]
    slow_tests: bool,

    /// Run the secondary-language (Java) suite as well
    #[arg(long, env = "BUILDGATE_JAVA_TESTS", default_value_t = false)]
    java_tests: bool,

    /// Compress raw test logs after the run
    #[arg(long, env = "BUILDGATE_COMPRESS_LOGS", default_value_t = false)]
    compress_logs: bool,

    /// CI-triggered run: clean up all artifacts on exit
    #[arg(long, env = "BUILDGATE_CI", default_value_t = false)]
    ci: bool,

    /// Test-runner worker count; 0 = one per CPU
    #[arg(short = 'j', long, env = "BUILDGATE_PARALLELISM")]
    parallelism: Option<usize>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the JSON run summary here
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pretty-print the JSON run summary
    #[arg(short, long, default_value_t = false)]
    pretty: bool,
}

impl Cli {
    /// Merge CLI/env values over the config file and run the pipeline.
    /// Returns the process exit code.
    pub async fn execute(&self) -> Result<i32> {
        let file = Config::load(self.config.as_deref())?;

        let run_config = RunConfig {
            variant_tag: self
                .variant
                .clone()
                .unwrap_or_else(|| file.run.variant.clone()),
            build_dir: self
                .build_dir
                .clone()
                .unwrap_or_else(|| file.run.build_dir.clone()),
            scratch_dir: self
                .scratch_dir
                .clone()
                .or_else(|| file.run.scratch_dir.clone())
                .unwrap_or_else(|| std::env::temp_dir().join("buildgate-scratch")),
            flaky_attempts: self.flaky_attempts.unwrap_or(file.flaky.attempts),
            flaky_server: self.flaky_server.clone().or_else(|| file.flaky.server.clone()),
            slow_tests: self.slow_tests || file.run.slow_tests,
            java_tests: self.java_tests || file.run.java_tests,
            compress_logs: self.compress_logs || file.output.compress_logs,
            is_ci: self.ci,
            parallelism: self.parallelism.unwrap_or(file.run.parallelism),
        };

        info!(
            "Starting run: variant={}, build_dir={}",
            run_config.variant_tag,
            run_config.build_dir.display()
        );

        let outcome = pipeline::run(&run_config, &Tools::default()).await?;

        output::print_summary(&outcome);

        let json_output = if self.pretty || file.output.pretty {
            serde_json::to_string_pretty(&outcome)?
        } else {
            serde_json::to_string(&outcome)?
        };

        if let Some(output_path) = &self.output {
            std::fs::write(output_path, json_output)?;
            info!("Run summary written to: {}", output_path.display());
        }

        Ok(outcome.exit_status())
    }
}
