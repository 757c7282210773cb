use std::path::Path;

use chrono::Utc;
use log::{info, warn};

use crate::error::Result;
use crate::runner::list_logs;

/// Substrings that identify a failure in raw captured output. The first
/// matching line becomes the synthesized report's message.
const FAILURE_MARKERS: &[&str] = &[
    "FAILED",
    "FAIL:",
    "ERROR:",
    "Assertion failed",
    "Segmentation fault",
    "*** Aborted",
];

/// Synthesize structured reports for tests that crashed without one.
///
/// Every raw log under `logs_dir` without a matching `<name>.xml` under
/// `reports_dir` gets a minimal JUnit report built from the log's failure
/// markers. Existing reports are never touched, which makes the pass
/// idempotent: a second invocation over the same artifacts adds nothing.
/// A log with no recognizable marker still yields a report, labelled
/// "crashed, cause unknown", so every raw artifact maps to exactly one
/// report afterwards.
pub fn recover_missing_reports(logs_dir: &Path, reports_dir: &Path) -> Result<Vec<String>> {
    let mut synthesized = Vec::new();

    let logs = list_logs(logs_dir)?;
    if logs.is_empty() {
        return Ok(synthesized);
    }
    std::fs::create_dir_all(reports_dir)?;

    for name in logs {
        let report_path = reports_dir.join(format!("{name}.xml"));
        if report_path.exists() {
            continue;
        }

        let log_path = logs_dir.join(format!("{name}.log"));
        let raw = std::fs::read_to_string(&log_path).unwrap_or_default();
        let marker = first_failure_marker(&raw);

        match &marker {
            Some(line) => warn!("Synthesizing report for {name}: {line}"),
            None => warn!("Synthesizing report for {name}: no failure marker in log"),
        }

        std::fs::write(&report_path, synthesize_report(&name, marker.as_deref()))?;
        synthesized.push(name);
    }

    if !synthesized.is_empty() {
        info!("Recovered {} missing report(s)", synthesized.len());
    }
    Ok(synthesized)
}

fn first_failure_marker(raw: &str) -> Option<String> {
    raw.lines()
        .find(|line| FAILURE_MARKERS.iter().any(|marker| line.contains(marker)))
        .map(str::to_string)
}

fn synthesize_report(name: &str, marker: Option<&str>) -> String {
    let timestamp = Utc::now().to_rfc3339();
    let body = match marker {
        Some(line) => format!(r#"<failure message="{}"/>"#, xml_escape(line)),
        None => r#"<error message="crashed, cause unknown"/>"#.to_string(),
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<testsuite name="{name}" tests="1" failures="1" errors="0" timestamp="{timestamp}">
  <testcase name="{name}" status="run">
    {body}
  </testcase>
</testsuite>
"#,
        name = xml_escape(name),
        timestamp = timestamp,
        body = body,
    )
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_marker_scan_finds_first_match() {
        let raw = "starting up\nSegmentation fault (core dumped)\nFAILED later\n";
        assert_eq!(
            first_failure_marker(raw).unwrap(),
            "Segmentation fault (core dumped)"
        );
        assert!(first_failure_marker("all fine here\n").is_none());
    }

    #[test]
    fn test_recovery_synthesizes_only_missing_reports() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let reports = dir.path().join("reports");
        fs::create_dir_all(&logs).unwrap();
        fs::create_dir_all(&reports).unwrap();

        fs::write(logs.join("ok-test.log"), "ran fine\n").unwrap();
        fs::write(reports.join("ok-test.xml"), "<testsuite/>").unwrap();
        fs::write(logs.join("crash-test.log"), "*** Aborted at 1699\n").unwrap();

        let synthesized = recover_missing_reports(&logs, &reports).unwrap();
        assert_eq!(synthesized, vec!["crash-test".to_string()]);

        let report = fs::read_to_string(reports.join("crash-test.xml")).unwrap();
        assert!(report.contains("*** Aborted at 1699"));
        assert!(report.contains("<failure"));

        // Pre-existing report left untouched
        assert_eq!(
            fs::read_to_string(reports.join("ok-test.xml")).unwrap(),
            "<testsuite/>"
        );
    }

    #[test]
    fn test_recovery_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let reports = dir.path().join("reports");
        fs::create_dir_all(&logs).unwrap();

        fs::write(logs.join("a-test.log"), "FAILED\n").unwrap();
        fs::write(logs.join("b-test.log"), "nothing of note\n").unwrap();

        let first = recover_missing_reports(&logs, &reports).unwrap();
        assert_eq!(first.len(), 2);
        let snapshot: Vec<(String, String)> = list_logs(&logs)
            .unwrap()
            .into_iter()
            .map(|name| {
                let path = reports.join(format!("{name}.xml"));
                (name, fs::read_to_string(path).unwrap())
            })
            .collect();

        let second = recover_missing_reports(&logs, &reports).unwrap();
        assert!(second.is_empty());
        for (name, content) in snapshot {
            let path = reports.join(format!("{name}.xml"));
            assert_eq!(fs::read_to_string(path).unwrap(), content, "{name} changed");
        }
    }

    #[test]
    fn test_markerless_log_still_yields_one_report() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let reports = dir.path().join("reports");
        fs::create_dir_all(&logs).unwrap();

        fs::write(logs.join("silent-test.log"), "started\nstopped\n").unwrap();

        let synthesized = recover_missing_reports(&logs, &reports).unwrap();
        assert_eq!(synthesized, vec!["silent-test".to_string()]);

        let report = fs::read_to_string(reports.join("silent-test.xml")).unwrap();
        assert!(report.contains("crashed, cause unknown"));

        let count = fs::read_dir(&reports).unwrap().count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_marker_lines_are_xml_escaped() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let reports = dir.path().join("reports");
        fs::create_dir_all(&logs).unwrap();

        fs::write(logs.join("cmp-test.log"), "FAILED: expected a < b\n").unwrap();
        recover_missing_reports(&logs, &reports).unwrap();

        let report = fs::read_to_string(reports.join("cmp-test.xml")).unwrap();
        assert!(report.contains("expected a &lt; b"));
    }
}
