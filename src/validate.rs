use std::path::Path;

use log::{error, info};

use crate::error::Result;
use crate::outcome::RunOutcome;
use crate::runner::list_logs;

/// Marker line a test's raw log must contain when leak-check
/// instrumentation was supposed to be active.
pub const LEAK_CHECK_MARKER: &str = "LeakSanitizer is active";

/// Post-run hygiene audit.
///
/// Two unconditional checks, each recorded into the shared outcome rather
/// than returned early, so a run that fails both reports both:
/// - the scratch root must be empty, even when every test passed; leaked
///   state is itself a defect signal and overrides a green test phase.
/// - with leak checking required, every raw log must show the
///   instrumentation-active marker.
pub fn validate(
    scratch_dir: &Path,
    logs_dir: &Path,
    leak_check_required: bool,
    outcome: &mut RunOutcome,
) -> Result<()> {
    audit_scratch(scratch_dir, outcome)?;
    audit_leak_check(logs_dir, leak_check_required, outcome)?;
    Ok(())
}

fn audit_scratch(scratch_dir: &Path, outcome: &mut RunOutcome) -> Result<()> {
    if !scratch_dir.is_dir() {
        return Ok(());
    }

    let mut leftovers: Vec<String> = std::fs::read_dir(scratch_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    leftovers.sort();

    if leftovers.is_empty() {
        info!("Scratch directory is clean");
    } else {
        error!(
            "Tests left {} entr(ies) in the scratch directory: {}",
            leftovers.len(),
            leftovers.join(", ")
        );
        outcome.cleaned_up = false;
        outcome.record_failure(
            "cleanup",
            format!("leftover scratch entries: {}", leftovers.join(", ")),
        );
    }
    Ok(())
}

fn audit_leak_check(
    logs_dir: &Path,
    leak_check_required: bool,
    outcome: &mut RunOutcome,
) -> Result<()> {
    if !leak_check_required {
        outcome.leak_check_ok = None;
        return Ok(());
    }

    let mut missing = Vec::new();
    for name in list_logs(logs_dir)? {
        let log_path = logs_dir.join(format!("{name}.log"));
        // Compressed logs were scanned before compression; only plain
        // text is inspected here.
        if !log_path.exists() {
            continue;
        }
        let raw = std::fs::read_to_string(&log_path).unwrap_or_default();
        if !raw.contains(LEAK_CHECK_MARKER) {
            missing.push(name);
        }
    }
    missing.sort();

    if missing.is_empty() {
        info!("Leak-check instrumentation was active for every test");
        outcome.leak_check_ok = Some(true);
    } else {
        error!(
            "Leak-check marker missing for {} test(s): {}",
            missing.len(),
            missing.join(", ")
        );
        outcome.leak_check_ok = Some(false);
        outcome.record_failure(
            "leak-check",
            format!("instrumentation marker missing: {}", missing.join(", ")),
        );
    }
    Ok(())
}
