use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::Path;

use futures::{stream, StreamExt};
use log::{info, warn};
use serde::Serialize;
use tokio::process::Command;

use crate::config::RunConfig;
use crate::error::Result;
use crate::flaky::FlakyTestList;
use crate::variant::BuildConfig;

/// How many report files are read concurrently during result collection.
const COLLECT_CONCURRENCY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    /// The test produced raw output but no structured report.
    Crashed,
}

/// Per-test-case record assembled from the artifacts the test tool left
/// behind.
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub name: String,
    pub status: TestStatus,
    pub report_present: bool,
}

#[derive(Debug)]
pub struct RunnerOutput {
    pub exit_status: i32,
    pub results: Vec<TestResult>,
}

/// Invoke an external tool and hand back its exit status.
///
/// A non-zero status is data, not an error; only failing to launch the
/// tool at all surfaces as `Err`.
pub async fn invoke<S: AsRef<OsStr>>(
    program: &str,
    args: &[S],
    cwd: &Path,
    envs: &[(&str, String)],
) -> Result<i32> {
    let mut command = Command::new(program);
    command.args(args).current_dir(cwd);
    for (key, value) in envs {
        command.env(key, value);
    }

    let status = command.status().await?;
    Ok(status.code().unwrap_or(-1))
}

/// Run the primary test phase.
///
/// The test tool is launched with one worker per processing unit and is
/// never asked to fail fast; whatever exit status it reports is captured
/// into the output for later aggregation. Flaky-retry settings reach the
/// per-test wrapper through environment variables.
pub async fn run_tests(
    program: &str,
    build: &BuildConfig,
    run: &RunConfig,
    flaky: &FlakyTestList,
) -> Result<RunnerOutput> {
    let parallelism = run.effective_parallelism();
    let mut args: Vec<String> = vec![
        "-j".to_string(),
        parallelism.to_string(),
        "--output-on-failure".to_string(),
    ];
    if let Some(filter) = &build.extra_filter {
        args.extend(filter.split_whitespace().map(str::to_string));
    }
    if !run.slow_tests {
        args.extend(["-LE".to_string(), "slow".to_string()]);
    }

    let mut envs = vec![("BUILDGATE_SCRATCH_DIR", run.scratch_dir.display().to_string())];
    if let Some(toolchain) = &build.toolchain {
        envs.push(("CC", toolchain.cc.display().to_string()));
        envs.push(("CXX", toolchain.cxx.display().to_string()));
    }
    if let Some(filter) = flaky.retry_filter() {
        envs.push(("BUILDGATE_FLAKY_TEST_REGEX", filter));
        envs.push((
            "BUILDGATE_TEST_ATTEMPTS",
            flaky.effective_attempts.to_string(),
        ));
    }

    info!("Running tests with {parallelism} workers");
    let exit_status = invoke(program, &args, &run.build_dir, &envs).await?;
    if exit_status != 0 {
        warn!("Test tool exited with status {exit_status}");
    }

    let results = collect_results(&run.reports_dir(), &run.logs_dir()).await?;
    info!(
        "Collected {} test results ({} without a structured report)",
        results.len(),
        results.iter().filter(|r| !r.report_present).count()
    );

    Ok(RunnerOutput {
        exit_status,
        results,
    })
}

/// Assemble per-test results from the report and log directories.
///
/// Discovery is purely by naming convention: `<name>.xml` under the
/// reports dir, `<name>.log` (or `.log.gz`) under the logs dir. A test
/// with a log but no report is recorded as crashed.
pub async fn collect_results(reports_dir: &Path, logs_dir: &Path) -> Result<Vec<TestResult>> {
    let mut names: BTreeMap<String, bool> = BTreeMap::new();

    for name in list_by_extension(reports_dir, &["xml"])? {
        names.insert(name, true);
    }
    for name in list_logs(logs_dir)? {
        names.entry(name).or_insert(false);
    }

    let results: Vec<TestResult> = stream::iter(names)
        .map(|(name, report_present)| async move {
            let status = if report_present {
                let report_path = reports_dir.join(format!("{name}.xml"));
                match tokio::fs::read_to_string(&report_path).await {
                    Ok(content) => report_status(&content),
                    Err(err) => {
                        // A report that exists but cannot be read tells us
                        // nothing about the test; treat it like a crash.
                        warn!("Unreadable report {}: {err}", report_path.display());
                        TestStatus::Crashed
                    }
                }
            } else {
                TestStatus::Crashed
            };
            TestResult {
                name,
                status,
                report_present,
            }
        })
        .buffer_unordered(COLLECT_CONCURRENCY)
        .collect()
        .await;

    let mut results = results;
    results.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(results)
}

/// Classify a JUnit-style report body.
fn report_status(content: &str) -> TestStatus {
    if content.contains("<failure") || content.contains("<error") {
        TestStatus::Failed
    } else {
        TestStatus::Passed
    }
}

fn list_by_extension(dir: &Path, extensions: &[&str]) -> Result<Vec<String>> {
    let mut names = Vec::new();
    if !dir.is_dir() {
        return Ok(names);
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(ext) = path.extension().and_then(OsStr::to_str) else {
            continue;
        };
        if extensions.contains(&ext) {
            if let Some(stem) = path.file_stem().and_then(OsStr::to_str) {
                names.push(stem.to_string());
            }
        }
    }
    Ok(names)
}

/// Raw logs may be plain or gz-compressed; both map to the same test name.
pub fn list_logs(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    if !dir.is_dir() {
        return Ok(names);
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(file_name) = path.file_name().and_then(OsStr::to_str) else {
            continue;
        };
        if let Some(stem) = file_name
            .strip_suffix(".log.gz")
            .or_else(|| file_name.strip_suffix(".log"))
        {
            names.push(stem.to_string());
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const PASSING_REPORT: &str = r#"<?xml version="1.0"?>
<testsuite name="tablet-test" tests="1" failures="0" errors="0">
  <testcase name="TestInsert" status="run"/>
</testsuite>"#;

    const FAILING_REPORT: &str = r#"<?xml version="1.0"?>
<testsuite name="scan-test" tests="1" failures="1" errors="0">
  <testcase name="TestScan" status="run">
    <failure message="Value mismatch"/>
  </testcase>
</testsuite>"#;

    #[test]
    fn test_report_status_classification() {
        assert_eq!(report_status(PASSING_REPORT), TestStatus::Passed);
        assert_eq!(report_status(FAILING_REPORT), TestStatus::Failed);
        assert_eq!(
            report_status("<testsuite><testcase><error/></testcase></testsuite>"),
            TestStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_collect_results_marks_reportless_logs_as_crashed() {
        let dir = tempfile::tempdir().unwrap();
        let reports = dir.path().join("reports");
        let logs = dir.path().join("logs");
        fs::create_dir_all(&reports).unwrap();
        fs::create_dir_all(&logs).unwrap();

        fs::write(reports.join("tablet-test.xml"), PASSING_REPORT).unwrap();
        fs::write(reports.join("scan-test.xml"), FAILING_REPORT).unwrap();
        fs::write(logs.join("tablet-test.log"), "ok\n").unwrap();
        fs::write(logs.join("crashy-test.log"), "Segmentation fault\n").unwrap();

        let results = collect_results(&reports, &logs).await.unwrap();
        assert_eq!(results.len(), 3);

        let by_name = |name: &str| results.iter().find(|r| r.name == name).unwrap();
        assert_eq!(by_name("tablet-test").status, TestStatus::Passed);
        assert_eq!(by_name("scan-test").status, TestStatus::Failed);
        assert_eq!(by_name("crashy-test").status, TestStatus::Crashed);
        assert!(!by_name("crashy-test").report_present);
    }

    #[tokio::test]
    async fn test_collect_results_accepts_compressed_logs() {
        let dir = tempfile::tempdir().unwrap();
        let reports = dir.path().join("reports");
        let logs = dir.path().join("logs");
        fs::create_dir_all(&reports).unwrap();
        fs::create_dir_all(&logs).unwrap();

        fs::write(logs.join("gz-test.log.gz"), [0x1f, 0x8b]).unwrap();

        let results = collect_results(&reports, &logs).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "gz-test");
        assert_eq!(results[0].status, TestStatus::Crashed);
    }

    #[tokio::test]
    async fn test_unreadable_report_classifies_as_crashed() {
        let dir = tempfile::tempdir().unwrap();
        let reports = dir.path().join("reports");
        let logs = dir.path().join("logs");
        fs::create_dir_all(&reports).unwrap();
        fs::create_dir_all(&logs).unwrap();

        // A directory with a report's name cannot be read as a report
        fs::create_dir(reports.join("odd-test.xml")).unwrap();

        let results = collect_results(&reports, &logs).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "odd-test");
        assert_eq!(results[0].status, TestStatus::Crashed);
        assert!(results[0].report_present);
    }

    #[tokio::test]
    async fn test_collect_results_with_missing_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let results = collect_results(&dir.path().join("nope"), &dir.path().join("also-nope"))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_invoke_captures_nonzero_status() {
        let dir = tempfile::tempdir().unwrap();
        let status = invoke("sh", &["-c", "exit 3"], dir.path(), &[])
            .await
            .unwrap();
        assert_eq!(status, 3);
    }
}
