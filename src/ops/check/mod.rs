//! Static (syntactic) checking of a generated project.
//!
//! Runs the compiler in check-only mode (`npx tsc --noEmit` by default) and
//! turns its diagnostics into [`ValidationError`]s. [`validate_syntactic`]
//! adds project-structure checks in front of the compiler run.

pub mod batch;
pub mod parse;

pub use batch::{check_batch, BatchReport, BatchSummary};
pub use parse::parse_diagnostic_line;

use std::path::Path;

use serde::Serialize;

use crate::ops::validate::{ErrorCode, Stage, ValidationError};
use crate::util::config::CheckConfig;
use crate::util::fs::count_files_with_extension;
use crate::util::process::{truncate, ProcessBuilder};

/// Settings for a static check.
#[derive(Debug, Clone)]
pub struct CheckOptions {
    /// Compiler invocation
    pub command: Vec<String>,
    pub timeout: std::time::Duration,
    pub source_dir: String,
    pub source_extension: String,
    /// Compiler config file that must exist
    pub config_file: String,
    /// Only run the structure checks
    pub skip_compilation: bool,
    pub stderr_limit: usize,
}

impl CheckOptions {
    pub fn from_config(config: &CheckConfig, stderr_limit: usize) -> Self {
        CheckOptions {
            command: config.command(),
            timeout: config.timeout(),
            source_dir: config.source_dir().to_string(),
            source_extension: config.source_extension().to_string(),
            config_file: config.config_file().to_string(),
            skip_compilation: false,
            stderr_limit,
        }
    }
}

impl Default for CheckOptions {
    fn default() -> Self {
        CheckOptions::from_config(
            &CheckConfig::default(),
            crate::util::config::DEFAULT_STDERR_LIMIT,
        )
    }
}

/// Outcome of [`validate_syntactic`].
#[derive(Debug, Clone, Serialize)]
pub struct SyntacticReport {
    pub valid: bool,
    /// Source files found under the source directory
    pub total_files: usize,
    pub error_count: usize,
    pub errors: Vec<ValidationError>,
}

impl SyntacticReport {
    fn new(total_files: usize, errors: Vec<ValidationError>) -> Self {
        SyntacticReport {
            valid: errors.is_empty(),
            total_files,
            error_count: errors.len(),
            errors,
        }
    }
}

/// Run the compiler over a project and collect its diagnostics.
///
/// Never fails: a missing compiler, a timeout or output that can't be
/// parsed all come back as errors in the list.
pub fn check_project(project_dir: &Path, opts: &CheckOptions) -> Vec<ValidationError> {
    let Some(builder) = ProcessBuilder::from_argv(&opts.command) else {
        return vec![ValidationError::new(
            Stage::Compile,
            ErrorCode::Error,
            "compiler command is empty",
        )];
    };
    let builder = builder.cwd(project_dir);

    tracing::info!("Type-checking {} (`{}`)", project_dir.display(), builder.display_command());
    let output = builder.run(opts.timeout);

    if output.success && output.stdout.trim().is_empty() && output.stderr.trim().is_empty() {
        return Vec::new();
    }

    let mut errors: Vec<ValidationError> = output
        .combined()
        .lines()
        .filter_map(parse_diagnostic_line)
        .collect();

    if errors.is_empty() && !output.success {
        errors.push(classify_failure(&output, &builder, opts.stderr_limit));
    }

    tracing::debug!("{} compiler diagnostics", errors.len());
    errors
}

/// Pick an error for a failed run that printed no recognizable diagnostics.
fn classify_failure(
    output: &crate::util::process::CommandOutput,
    builder: &ProcessBuilder,
    limit: usize,
) -> ValidationError {
    let stderr = output.stderr.to_lowercase();

    if output.is_timeout() || stderr.contains("timeout") {
        ValidationError::new(
            Stage::Compile,
            ErrorCode::Timeout,
            "TypeScript compilation timeout",
        )
    } else if output.is_not_found() || stderr.contains("not found") {
        ValidationError::new(
            Stage::Compile,
            ErrorCode::TscNotFound,
            format!("TypeScript compiler not found ({})", builder.display_command()),
        )
    } else {
        let text = if output.stderr.trim().is_empty() {
            output.stdout.trim()
        } else {
            output.stderr.trim()
        };
        ValidationError::new(
            Stage::Compile,
            ErrorCode::Error,
            format!("TypeScript compilation error: {}", truncate(text, limit)),
        )
    }
}

/// Check the source tree layout.
///
/// Returns the number of source files and the first structural problem.
pub fn check_project_structure(
    project_dir: &Path,
    opts: &CheckOptions,
) -> (usize, Option<ValidationError>) {
    let src = project_dir.join(&opts.source_dir);
    if !src.is_dir() {
        return (
            0,
            Some(ValidationError::new(
                Stage::Setup,
                ErrorCode::MissingSrc,
                format!("Source directory not found: {}", src.display()),
            )),
        );
    }

    let total_files = count_files_with_extension(&src, &opts.source_extension);
    if total_files == 0 {
        return (
            0,
            Some(ValidationError::new(
                Stage::Setup,
                ErrorCode::NoFiles,
                format!("No .{} files found in {}", opts.source_extension, src.display()),
            )),
        );
    }

    // Only the compiler needs its config.
    if !opts.skip_compilation && !project_dir.join(&opts.config_file).is_file() {
        return (
            total_files,
            Some(ValidationError::new(
                Stage::Setup,
                ErrorCode::MissingConfig,
                format!("{} not found", opts.config_file),
            )),
        );
    }

    (total_files, None)
}

/// Structure checks followed by the compiler run.
pub fn validate_syntactic(project_dir: &Path, opts: &CheckOptions) -> SyntacticReport {
    let (total_files, problem) = check_project_structure(project_dir, opts);
    if let Some(error) = problem {
        return SyntacticReport::new(total_files, vec![error]);
    }

    if opts.skip_compilation {
        tracing::debug!("Skipping compilation for {}", project_dir.display());
        return SyntacticReport::new(total_files, Vec::new());
    }

    SyntacticReport::new(total_files, check_project(project_dir, opts))
}
