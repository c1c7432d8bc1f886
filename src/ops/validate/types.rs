//! Result types for runtime validation.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::ops::check::SyntacticReport;
use crate::util::diagnostic::suggestions;

/// Output format for validation results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable output (default)
    #[default]
    Human,
    /// Machine-readable JSON output
    Json,
    /// GitHub Actions annotations with job summary
    Github,
}

impl FromStr for OutputFormat {
    type Err = OutputFormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            "github" | "github-actions" | "gha" => Ok(OutputFormat::Github),
            _ => Err(OutputFormatParseError(s.to_string())),
        }
    }
}

/// Error parsing output format option.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid output format '{0}', valid values: human, json, github")]
pub struct OutputFormatParseError(pub String);

/// Pipeline stage an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Setup,
    Install,
    Build,
    Start,
    Compile,
    EndpointTest,
    Cleanup,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Setup => "setup",
            Stage::Install => "install",
            Stage::Build => "build",
            Stage::Start => "start",
            Stage::Compile => "compile",
            Stage::EndpointTest => "endpoint_test",
            Stage::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed error codes.
///
/// Compiler diagnostics keep the compiler's own code (`TS2322`) in
/// [`ErrorCode::Compiler`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ProjectNotFound,
    MissingPackageJson,
    MissingSrc,
    MissingConfig,
    NoFiles,
    NpmNotFound,
    InstallFailed,
    InstallTimeout,
    InstallError,
    BuildFailed,
    BuildTimeout,
    BuildError,
    StartCrashed,
    StartError,
    TscNotFound,
    Timeout,
    ParseError,
    PortInUse,
    AppCrashed,
    EndpointFailed,
    EndpointTestError,
    CleanupError,
    Error,
    Compiler(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::ProjectNotFound => "PROJECT_NOT_FOUND",
            ErrorCode::MissingPackageJson => "MISSING_PACKAGE_JSON",
            ErrorCode::MissingSrc => "MISSING_SRC",
            ErrorCode::MissingConfig => "MISSING_CONFIG",
            ErrorCode::NoFiles => "NO_FILES",
            ErrorCode::NpmNotFound => "NPM_NOT_FOUND",
            ErrorCode::InstallFailed => "INSTALL_FAILED",
            ErrorCode::InstallTimeout => "INSTALL_TIMEOUT",
            ErrorCode::InstallError => "INSTALL_ERROR",
            ErrorCode::BuildFailed => "BUILD_FAILED",
            ErrorCode::BuildTimeout => "BUILD_TIMEOUT",
            ErrorCode::BuildError => "BUILD_ERROR",
            ErrorCode::StartCrashed => "START_CRASHED",
            ErrorCode::StartError => "START_ERROR",
            ErrorCode::TscNotFound => "TSC_NOT_FOUND",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::PortInUse => "PORT_IN_USE",
            ErrorCode::AppCrashed => "APP_CRASHED",
            ErrorCode::EndpointFailed => "ENDPOINT_FAILED",
            ErrorCode::EndpointTestError => "ENDPOINT_TEST_ERROR",
            ErrorCode::CleanupError => "CLEANUP_ERROR",
            ErrorCode::Error => "ERROR",
            ErrorCode::Compiler(code) => code,
        }
    }

    /// A fix worth suggesting for this error, if there is an obvious one.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            ErrorCode::MissingPackageJson => Some(suggestions::NO_MANIFEST),
            ErrorCode::NpmNotFound => Some(suggestions::NO_PACKAGE_MANAGER),
            ErrorCode::PortInUse => Some(suggestions::PORT_IN_USE),
            ErrorCode::TscNotFound => Some(suggestions::NO_COMPILER),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl FromStr for ErrorCode {
    type Err = std::convert::Infallible;

    /// Unknown codes become [`ErrorCode::Compiler`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "PROJECT_NOT_FOUND" => ErrorCode::ProjectNotFound,
            "MISSING_PACKAGE_JSON" => ErrorCode::MissingPackageJson,
            "MISSING_SRC" => ErrorCode::MissingSrc,
            "MISSING_CONFIG" => ErrorCode::MissingConfig,
            "NO_FILES" => ErrorCode::NoFiles,
            "NPM_NOT_FOUND" => ErrorCode::NpmNotFound,
            "INSTALL_FAILED" => ErrorCode::InstallFailed,
            "INSTALL_TIMEOUT" => ErrorCode::InstallTimeout,
            "INSTALL_ERROR" => ErrorCode::InstallError,
            "BUILD_FAILED" => ErrorCode::BuildFailed,
            "BUILD_TIMEOUT" => ErrorCode::BuildTimeout,
            "BUILD_ERROR" => ErrorCode::BuildError,
            "START_CRASHED" => ErrorCode::StartCrashed,
            "START_ERROR" => ErrorCode::StartError,
            "TSC_NOT_FOUND" => ErrorCode::TscNotFound,
            "TIMEOUT" => ErrorCode::Timeout,
            "PARSE_ERROR" => ErrorCode::ParseError,
            "PORT_IN_USE" => ErrorCode::PortInUse,
            "APP_CRASHED" => ErrorCode::AppCrashed,
            "ENDPOINT_FAILED" => ErrorCode::EndpointFailed,
            "ENDPOINT_TEST_ERROR" => ErrorCode::EndpointTestError,
            "CLEANUP_ERROR" => ErrorCode::CleanupError,
            "ERROR" => ErrorCode::Error,
            other => ErrorCode::Compiler(other.to_string()),
        })
    }
}

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub stage: Stage,
    pub message: String,
    pub code: ErrorCode,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,

    /// Endpoint string (`GET /owners`) for probe failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl ValidationError {
    pub fn new(stage: Stage, code: ErrorCode, message: impl Into<String>) -> Self {
        ValidationError {
            stage,
            message: message.into(),
            code,
            file: None,
            line: None,
            column: None,
            endpoint: None,
        }
    }

    /// Attach a source location.
    pub fn with_location(mut self, file: impl Into<String>, line: u32, column: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(ref file) = self.file {
            write!(f, " ({}", file)?;
            if let (Some(line), Some(column)) = (self.line, self.column) {
                write!(f, ":{}:{}", line, column)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Outcome of probing one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointResult {
    pub success: bool,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub response_time_ms: Option<u64>,
}

impl EndpointResult {
    /// A failure that never produced a response.
    pub fn failed(error: impl Into<String>) -> Self {
        EndpointResult {
            success: false,
            status_code: None,
            error: Some(error.into()),
            response_time_ms: None,
        }
    }
}

/// Timing record for a stage that was reached.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub passed: bool,

    /// How long the stage took (in milliseconds for JSON)
    #[serde(rename = "duration_ms", serialize_with = "serialize_duration_ms")]
    pub duration: Duration,
}

pub(crate) fn serialize_duration_ms<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Complete runtime validation result.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    /// True iff `errors` is empty
    pub valid: bool,

    /// Install and build both succeeded
    pub build_success: bool,

    /// The server survived the settle window
    pub start_success: bool,

    /// Probe results keyed by endpoint string
    #[serde(rename = "endpoint_tests")]
    pub endpoint_results: BTreeMap<String, EndpointResult>,

    pub errors: Vec<ValidationError>,

    /// Stages reached, in order
    pub stages: Vec<StageReport>,

    pub project: PathBuf,

    /// Total validation time (in milliseconds for JSON)
    #[serde(rename = "total_duration_ms", serialize_with = "serialize_duration_ms")]
    pub total_duration: Duration,
}

impl ValidationResult {
    pub fn new(project: impl Into<PathBuf>) -> Self {
        ValidationResult {
            valid: false,
            build_success: false,
            start_success: false,
            endpoint_results: BTreeMap::new(),
            errors: Vec::new(),
            stages: Vec::new(),
            project: project.into(),
            total_duration: Duration::ZERO,
        }
    }

    pub fn push_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Record a finished stage; returns whether it passed.
    pub fn record(
        &mut self,
        stage: Stage,
        duration: Duration,
        outcome: Result<(), ValidationError>,
    ) -> bool {
        let passed = outcome.is_ok();
        self.stages.push(StageReport {
            stage,
            passed,
            duration,
        });
        if let Err(error) = outcome {
            self.errors.push(error);
        }
        passed
    }

    /// Seal the result: `valid` reflects whether any error was recorded.
    pub fn finish(&mut self, total_duration: Duration) {
        self.valid = self.errors.is_empty();
        self.total_duration = total_duration;
    }

    /// Errors attributed to one stage.
    pub fn errors_for(&self, stage: Stage) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter().filter(move |e| e.stage == stage)
    }

    /// Whether any error carries `code`.
    pub fn has_code(&self, code: &ErrorCode) -> bool {
        self.errors.iter().any(|e| &e.code == code)
    }

    pub fn passed_endpoints(&self) -> usize {
        self.endpoint_results.values().filter(|r| r.success).count()
    }
}

/// Static check and runtime validation of the same project.
#[derive(Debug, Clone, Serialize)]
pub struct CombinedReport {
    pub valid: bool,
    pub syntactic: SyntacticReport,
    pub runtime: ValidationResult,
}

impl CombinedReport {
    pub fn new(syntactic: SyntacticReport, runtime: ValidationResult) -> Self {
        CombinedReport {
            valid: syntactic.valid && runtime.valid,
            syntactic,
            runtime,
        }
    }
}
