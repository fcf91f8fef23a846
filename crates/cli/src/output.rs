//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

use uiflow_e2e::{ScenarioResult, ScenarioStatus, SuiteReport};

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
    /// Plain text format
    Plain,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

fn table<T: TableDisplay>(items: &[T]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(T::headers());
    for item in items {
        table.add_row(item.row());
    }
    table
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    if items.is_empty() {
        println!("No items found.");
        return;
    }

    match format {
        OutputFormat::Table => println!("{}", table(items)),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(items).unwrap_or_default());
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(items).unwrap_or_default());
        }
        OutputFormat::Plain => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    println!("---");
                }
                let row = item.row();
                for (header, value) in T::headers().iter().zip(row.iter()) {
                    println!("{}: {}", header, value);
                }
            }
        }
    }
}

impl TableDisplay for ScenarioResult {
    fn headers() -> Vec<&'static str> {
        vec!["Scenario", "Group", "Status", "Duration", "Failed Step", "Reason"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.group.clone(),
            status_label(self.status).to_string(),
            format!("{} ms", self.duration_ms),
            self.failed_step
                .as_ref()
                .map(|s| format!("#{} {}", s.index, s.description))
                .unwrap_or_else(|| "-".to_string()),
            self.reason.clone().unwrap_or_else(|| "-".to_string()),
        ]
    }
}

fn status_label(status: ScenarioStatus) -> &'static str {
    match status {
        ScenarioStatus::Passed => "✓ passed",
        ScenarioStatus::Failed => "✗ failed",
        ScenarioStatus::Aborted => "⊘ aborted",
    }
}

/// Print a suite report
pub fn print_report(report: &SuiteReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report).unwrap_or_default());
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(report).unwrap_or_default());
        }
        OutputFormat::Table => {
            println!("{}", table(&report.results));
            print_summary(report);
        }
        OutputFormat::Plain => {
            for result in &report.results {
                match result.status {
                    ScenarioStatus::Passed => {
                        println!("{} {} ({} ms)", "✓".green(), result.name, result.duration_ms)
                    }
                    _ => println!(
                        "{} {} - {}",
                        "✗".red(),
                        result.name,
                        result.reason.as_deref().unwrap_or("aborted")
                    ),
                }
                if let (Some(expected), Some(observed)) = (&result.expected, &result.observed) {
                    println!("    expected: {}", expected);
                    println!("    observed: {}", observed.dimmed());
                }
                if !result.violations.is_empty() {
                    println!("    {} accessibility violation(s)", result.violations.len());
                }
            }
            print_summary(report);
        }
    }
}

fn print_summary(report: &SuiteReport) {
    let passed = format!("{} passed", report.passed).green();
    let failed = if report.failed > 0 {
        format!("{} failed", report.failed).red()
    } else {
        format!("{} failed", report.failed).normal()
    };
    let aborted = if report.aborted > 0 {
        format!("{} aborted", report.aborted).yellow()
    } else {
        format!("{} aborted", report.aborted).normal()
    };

    println!();
    println!(
        "{} {}, {}, {} ({} ms)",
        "Scenario Results:".bold(),
        passed,
        failed,
        aborted,
        report.duration_ms
    );
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("⚠️  {}", message);
}
