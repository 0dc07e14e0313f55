//! Console output for probe runs.
//!
//! PASS/FAIL lines go to stdout; diagnostics go through `tracing`.

use colored::Colorize;
use tracing::warn;

use crate::runner::{Check, ProbeReport, ProbeResult};

/// Width of the key column in [`print_kv`].
const KEY_WIDTH: usize = 10;

/// Print a run header, underlined to the width of the title.
pub fn print_section(title: &str) {
    println!();
    println!("{} {}", "▶".cyan(), title.cyan().bold());
    println!("  {}", "─".repeat(title.chars().count()).bright_black());
}

/// Print a setting of the run, keys aligned in one column.
pub fn print_kv(key: &str, value: &str) {
    println!("{}", kv_line(key, value));
}

fn kv_line(key: &str, value: &str) -> String {
    format!("  {} {}", format!("{key:<KEY_WIDTH$}").bright_black(), value.bold())
}

/// Print the report as pretty JSON.
pub fn print_report_json(report: &ProbeReport) {
    match serde_json::to_string_pretty(report) {
        Ok(json) => println!("{json}"),
        Err(e) => warn!(error = %e, "Failed to render report as JSON"),
    }
}

/// Print one probe outcome, with its error when it failed.
pub fn print_probe_result(result: &ProbeResult) {
    let elapsed = format!("({:.1}s)", result.elapsed.as_secs_f64()).bright_black();
    if result.passed {
        println!("  {} {} {elapsed}", "PASS".green().bold(), result.name);
    } else {
        println!("  {} {} {elapsed}", "FAIL".red().bold(), result.name);
        if let Some(error) = &result.error {
            println!("       {}", error.red());
        }
    }
}

/// Print a pod's logs indented beneath its result line.
pub fn print_logs(pod: &str, logs: &str) {
    println!("       {} {}", "▼".yellow(), format!("logs of {pod}").yellow());
    for line in logs.lines() {
        println!("         {}", line.bright_black());
    }
}

/// Print the pass count of a run.
pub fn print_summary(passed: usize, total: usize) {
    println!();
    if passed == total {
        println!(
            "{} {}",
            "✓".green().bold(),
            format!("{passed}/{total} checks passed").green()
        );
    } else {
        println!(
            "{} {}",
            "✗".red().bold(),
            format!("{passed}/{total} checks passed").red()
        );
    }
}

/// Print the available checks.
pub fn print_checks() {
    for check in Check::ALL {
        println!("  {:<16} {}", check.name().cyan(), check.description());
    }
}
