//! Output formatting for validation results (human/JSON/GitHub).

use serde::Serialize;

use crate::ops::check::{BatchReport, SyntacticReport};

use super::types::{CombinedReport, OutputFormat, ValidationError, ValidationResult};

fn mark(passed: bool) -> &'static str {
    if passed {
        "[OK]"
    } else {
        "[FAIL]"
    }
}

/// Format a runtime validation result for display (human-readable).
pub fn format_result(result: &ValidationResult, verbose: bool) -> String {
    let mut output = String::new();

    output.push_str(&format!("Validate: {}\n", result.project.display()));
    output.push_str(&format!("{}\n\n", "=".repeat(50)));

    for step in &result.stages {
        output.push_str(&format!(
            "  {} {} ({:.2?})\n",
            mark(step.passed),
            step.stage,
            step.duration
        ));
        if verbose || !step.passed {
            for error in result.errors_for(step.stage) {
                output.push_str(&format!("      {}\n", error));
                push_hint(&mut output, error, "        ");
            }
        }
    }

    if !result.endpoint_results.is_empty() {
        output.push_str(&format!(
            "\nEndpoints ({}/{} passed):\n",
            result.passed_endpoints(),
            result.endpoint_results.len()
        ));
        for (endpoint, probe) in &result.endpoint_results {
            let status = probe
                .status_code
                .map(|s| s.to_string())
                .unwrap_or_else(|| "---".to_string());
            output.push_str(&format!("  {} {} -> {}", mark(probe.success), endpoint, status));
            if let Some(ms) = probe.response_time_ms {
                output.push_str(&format!(" ({}ms)", ms));
            }
            if let Some(ref error) = probe.error {
                output.push_str(&format!(": {}", error));
            }
            output.push('\n');
        }
    }

    // Errors not tied to a recorded stage (port pre-check, panics)
    let loose: Vec<_> = result
        .errors
        .iter()
        .filter(|e| !result.stages.iter().any(|s| s.stage == e.stage))
        .collect();
    if !loose.is_empty() {
        output.push_str("\nErrors:\n");
        for error in loose {
            output.push_str(&format!("  - {}: {}\n", error.stage, error));
            push_hint(&mut output, error, "    ");
        }
    }

    let status = if result.valid { "PASSED" } else { "FAILED" };
    output.push_str(&format!(
        "\nResult: {} (build: {}, start: {}, {} errors)\n",
        status,
        yes_no(result.build_success),
        yes_no(result.start_success),
        result.errors.len()
    ));
    output.push_str(&format!("Total time: {:.2?}\n", result.total_duration));

    output
}

fn push_hint(output: &mut String, error: &ValidationError, indent: &str) {
    if let Some(hint) = error.code.suggestion() {
        output.push_str(&format!("{}{}\n", indent, hint));
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "ok"
    } else {
        "failed"
    }
}

/// Format a static check report (human-readable).
pub fn format_syntactic(report: &SyntacticReport, limit: Option<usize>) -> String {
    let mut output = String::new();

    if report.valid {
        output.push_str(&format!("  {} Valid ({} files)\n", mark(true), report.total_files));
        return output;
    }

    output.push_str(&format!(
        "  {} Invalid ({} errors in {} files)\n",
        mark(false),
        report.error_count,
        report.total_files
    ));
    let shown = limit.unwrap_or(report.errors.len());
    for error in report.errors.iter().take(shown) {
        output.push_str(&format!("     - {}\n", error));
        push_hint(&mut output, error, "       ");
    }
    if report.errors.len() > shown {
        output.push_str(&format!("     ... and {} more\n", report.errors.len() - shown));
    }

    output
}

/// Format a batch report (human-readable).
pub fn format_batch(report: &BatchReport) -> String {
    let mut output = String::new();

    for (name, result) in &report.results {
        output.push_str(&format!("{}\n", name));
        output.push_str(&format_syntactic(result, Some(3)));
    }

    let summary = &report.summary;
    output.push_str(&format!(
        "\nSummary: {}/{} valid ({} total errors, {:.0}% success)\n",
        summary.valid_count,
        summary.total_count,
        summary.error_count,
        summary.success_rate * 100.0
    ));

    output
}

/// Serialize any report as pretty JSON.
pub fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!(r#"{{"error": "Failed to serialize result: {}"}}"#, e))
}

/// Format a runtime validation result as JSON.
pub fn format_result_json(result: &ValidationResult) -> String {
    to_json(result)
}

fn escape_annotation(text: &str) -> String {
    text.replace('%', "%25")
        .replace('\r', "")
        .replace('\n', "%0A")
}

fn annotation(error: &ValidationError) -> String {
    let title = format!("{} {}", error.stage, error.code);
    match (&error.file, error.line, error.column) {
        (Some(file), Some(line), Some(col)) => format!(
            "::error file={},line={},col={},title={}::{}\n",
            file,
            line,
            col,
            title,
            escape_annotation(&error.message)
        ),
        _ => format!("::error title={}::{}\n", title, escape_annotation(&error.message)),
    }
}

/// Format a runtime validation result for GitHub Actions.
///
/// Outputs:
/// - `::error::` annotations for every error
/// - Job summary in markdown format
pub fn format_result_github_actions(result: &ValidationResult) -> String {
    let mut output = String::new();

    for error in &result.errors {
        output.push_str(&annotation(error));
    }

    output.push_str("::group::Validation Summary\n\n");
    output.push_str(&format!("## {}\n\n", result.project.display()));

    output.push_str("| Stage | Status | Duration |\n");
    output.push_str("|-------|--------|----------|\n");
    for step in &result.stages {
        let status = if step.passed {
            ":white_check_mark:"
        } else {
            ":x:"
        };
        output.push_str(&format!("| {} | {} | {:.2?} |\n", step.stage, status, step.duration));
    }

    if !result.endpoint_results.is_empty() {
        output.push_str("\n### Endpoints\n\n");
        output.push_str("| Endpoint | Status | Time |\n");
        output.push_str("|----------|--------|------|\n");
        for (endpoint, probe) in &result.endpoint_results {
            let status = match (probe.success, probe.status_code) {
                (true, Some(code)) => format!(":white_check_mark: {}", code),
                (false, Some(code)) => format!(":x: {}", code),
                _ => format!(":x: {}", probe.error.as_deref().unwrap_or("no response")),
            };
            let time = probe
                .response_time_ms
                .map(|ms| format!("{}ms", ms))
                .unwrap_or_default();
            output.push_str(&format!("| `{}` | {} | {} |\n", endpoint, status, time));
        }
    }

    let (emoji, status) = if result.valid {
        (":heavy_check_mark:", "PASSED")
    } else {
        (":x:", "FAILED")
    };
    output.push_str(&format!(
        "\n**Result:** {} {} ({} errors)\n",
        emoji,
        status,
        result.errors.len()
    ));
    output.push_str(&format!("**Total time:** {:.2?}\n", result.total_duration));
    output.push_str("::endgroup::\n");

    output
}

/// Format the result according to the specified output format.
pub fn format_result_for_output(
    result: &ValidationResult,
    format: OutputFormat,
    verbose: bool,
) -> String {
    match format {
        OutputFormat::Human => format_result(result, verbose),
        OutputFormat::Json => format_result_json(result),
        OutputFormat::Github => format_result_github_actions(result),
    }
}

/// Format a static check report according to the output format.
pub fn format_syntactic_for_output(
    report: &SyntacticReport,
    format: OutputFormat,
    verbose: bool,
) -> String {
    match format {
        OutputFormat::Human => format_syntactic(report, if verbose { None } else { Some(10) }),
        OutputFormat::Json => to_json(report),
        OutputFormat::Github => {
            let mut output: String = report.errors.iter().map(annotation).collect();
            output.push_str(&format!(
                "{} errors in {} files\n",
                report.error_count, report.total_files
            ));
            output
        }
    }
}

/// Format a combined static + runtime report.
pub fn format_combined(report: &CombinedReport, format: OutputFormat, verbose: bool) -> String {
    match format {
        OutputFormat::Json => to_json(report),
        OutputFormat::Github => {
            let mut output = String::new();
            for error in &report.syntactic.errors {
                output.push_str(&annotation(error));
            }
            output.push_str(&format_result_github_actions(&report.runtime));
            output
        }
        OutputFormat::Human => {
            let mut output = String::from("Syntactic check\n");
            output.push_str(&format_syntactic(&report.syntactic, if verbose { None } else { Some(10) }));
            output.push('\n');
            output.push_str(&format_result(&report.runtime, verbose));
            let status = if report.valid { "PASSED" } else { "FAILED" };
            output.push_str(&format!("Overall: {}\n", status));
            output
        }
    }
}
