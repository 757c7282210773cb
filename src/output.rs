use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};
use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::outcome::RunOutcome;
use crate::runner::TestStatus;

// Styling helpers

fn bright_green(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).bright().green()
}

fn bright_red(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).bright().red()
}

fn dim(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).dim()
}

fn magenta_bold(text: impl std::fmt::Display) -> console::StyledObject<String> {
    style(text.to_string()).magenta().bold()
}

// Banner

pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🛠 BuildGate"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("Build-variant & test-run orchestrator")
    );
}

// Phase progress

pub struct PhaseProgress {
    pb: ProgressBar,
    label: String,
}

impl PhaseProgress {
    pub fn start(label: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_draw_target(ProgressDrawTarget::stderr());
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("  {msg} {spinner}")
                .unwrap(),
        );
        pb.set_message(style(label.to_string()).bright().yellow().to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            label: label.to_string(),
        }
    }

    pub fn finish(self, ok: bool) {
        let message = if ok {
            bright_green(format!("{} ✓", self.label)).to_string()
        } else {
            bright_red(format!("{} ✗", self.label)).to_string()
        };
        self.pb.finish_with_message(message);
    }
}

// Run summary

pub fn print_summary(outcome: &RunOutcome) {
    eprintln!();

    if !outcome.results.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["Test", "Status", "Report"]);

        for result in &outcome.results {
            let (status_text, color) = match result.status {
                TestStatus::Passed => ("passed", TableColor::Green),
                TestStatus::Failed => ("failed", TableColor::Red),
                TestStatus::Crashed => ("crashed", TableColor::Magenta),
            };
            table.add_row(vec![
                Cell::new(&result.name),
                Cell::new(status_text).fg(color),
                Cell::new(if result.report_present {
                    "present"
                } else {
                    "synthesized"
                }),
            ]);
        }
        eprintln!("{table}");
    }

    if outcome.is_clean() {
        eprintln!(
            "{} {}",
            bright_green("✔ Run clean:"),
            dim(format!(
                "{} tests, variant {}",
                outcome.tests_total, outcome.variant
            ))
        );
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Phase", "Failure"]);
    for failure in &outcome.failures {
        table.add_row(vec![
            Cell::new(&failure.phase).fg(TableColor::Red),
            Cell::new(&failure.detail),
        ]);
    }
    eprintln!("{table}");
    eprintln!(
        "{} {}",
        bright_red(format!("✘ {} failure categor(ies)", outcome.failures.len())),
        dim(format!("variant {}", outcome.variant))
    );
}
