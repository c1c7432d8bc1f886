//! Runtime validation of a generated backend.
//!
//! ## Pipeline
//!
//! ```text
//! SETUP -> INSTALL -> BUILD -> START -> [ENDPOINT PROBE] -> DONE
//! ```
//!
//! Stages run strictly in order and the pipeline halts at the first failing
//! stage. Endpoint failures are collected without stopping the probe. The
//! server process started in START is always terminated before returning,
//! including when a stage panics.
//!
//! ## Usage
//!
//! ```bash
//! keel validate ./TEST_CASE_1_backend
//! keel validate ./app --endpoint "GET /owners" --endpoint "POST /owners"
//! keel validate ./app --syntactic --output-format json --save report.json
//! ```

pub mod format;
pub mod probe;
pub mod stages;
pub mod types;

pub use format::{
    format_batch, format_combined, format_result, format_result_for_output,
    format_result_github_actions, format_result_json, format_syntactic, format_syntactic_for_output,
    to_json,
};
pub use probe::{parse_endpoint, probe_endpoint, probe_endpoints, HttpMethod, ProbeOptions, ProbeOutcome};
pub use types::{
    CombinedReport, EndpointResult, ErrorCode, OutputFormat, Stage, StageReport, ValidationError, ValidationResult,
};

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::util::config::ValidateConfig;
use crate::util::context::GlobalContext;
use crate::util::port;

/// Settings for one validation run.
#[derive(Debug, Clone)]
pub struct ValidateOptions {
    /// Manifest that must exist in the project root
    pub manifest: String,

    pub install_command: Vec<String>,
    pub build_command: Vec<String>,
    pub start_command: Vec<String>,

    pub install_timeout: Duration,
    pub build_timeout: Duration,
    pub start_settle: Duration,
    pub terminate_grace: Duration,
    pub request_timeout: Duration,

    /// Port the server listens on; released after shutdown
    pub port: u16,
    pub base_url: String,
    pub success_status_below: u16,
    pub stderr_limit: usize,
}

impl ValidateOptions {
    pub fn from_config(config: &ValidateConfig) -> Self {
        ValidateOptions {
            manifest: config.manifest().to_string(),
            install_command: config.install_command(),
            build_command: config.build_command(),
            start_command: config.start_command(),
            install_timeout: config.install_timeout(),
            build_timeout: config.build_timeout(),
            start_settle: config.start_settle(),
            terminate_grace: config.terminate_grace(),
            request_timeout: config.request_timeout(),
            port: config.port(),
            base_url: config.base_url(),
            success_status_below: config.success_status_below(),
            stderr_limit: config.stderr_limit(),
        }
    }

    /// Port the endpoint probe targets.
    pub fn probe_port(&self) -> u16 {
        probe::probe_port(&self.base_url, self.port)
    }

    fn probe_options(&self) -> ProbeOptions {
        ProbeOptions {
            base_url: self.base_url.clone(),
            request_timeout: self.request_timeout,
            success_status_below: self.success_status_below,
            stderr_limit: self.stderr_limit,
        }
    }
}

impl Default for ValidateOptions {
    fn default() -> Self {
        ValidateOptions::from_config(&ValidateConfig::default())
    }
}

/// Validate a project with settings from the context's configuration.
///
/// `base_url` overrides the configured base URL.
pub fn validate_runtime(
    project_dir: &Path,
    endpoints: Option<&[String]>,
    base_url: Option<&str>,
    ctx: &GlobalContext,
) -> ValidationResult {
    let mut opts = ValidateOptions::from_config(&ctx.config().validate);
    if let Some(base_url) = base_url {
        opts.base_url = base_url.to_string();
        // The server is expected on the port it is probed on.
        opts.port = opts.probe_port();
    }
    validate_runtime_with(project_dir, endpoints, &opts)
}

/// Validate a project with explicit settings.
///
/// Never fails: every problem ends up in [`ValidationResult::errors`].
pub fn validate_runtime_with(
    project_dir: &Path,
    endpoints: Option<&[String]>,
    opts: &ValidateOptions,
) -> ValidationResult {
    let started = Instant::now();
    let mut result = ValidationResult::new(project_dir);
    let endpoints = endpoints.unwrap_or(&[]);

    tracing::info!("Validating {}", project_dir.display());

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        run_pipeline(project_dir, endpoints, opts, &mut result)
    }));

    if let Err(payload) = outcome {
        let message = panic_message(payload.as_ref());
        tracing::error!("validation aborted: {}", message);
        result.push_error(ValidationError::new(
            Stage::Cleanup,
            ErrorCode::Error,
            format!("Unexpected error during validation: {}", message),
        ));
    }

    result.finish(started.elapsed());
    result
}

fn run_pipeline(
    project_dir: &Path,
    endpoints: &[String],
    opts: &ValidateOptions,
    result: &mut ValidationResult,
) {
    let timer = Instant::now();
    let setup = stages::check_setup(project_dir, &opts.manifest);
    if !result.record(Stage::Setup, timer.elapsed(), setup) {
        return;
    }

    let timer = Instant::now();
    let install = stages::install(project_dir, opts);
    if !result.record(Stage::Install, timer.elapsed(), install) {
        return;
    }

    let timer = Instant::now();
    let build = stages::build(project_dir, opts);
    if !result.record(Stage::Build, timer.elapsed(), build) {
        return;
    }
    result.build_success = true;

    // Checked before launching: a foreign server is never probed.
    if !endpoints.is_empty() {
        let timer = Instant::now();
        if let Err(error) = probe::precheck_port(opts.probe_port()) {
            tracing::warn!("{}", error.message);
            result.record(Stage::EndpointTest, timer.elapsed(), Err(error));
            return;
        }
    }

    // Only a port that was free before launch is ours to free afterwards.
    let release_port = if port::is_port_in_use(opts.port) {
        tracing::warn!(
            "Port {} is held by another process; it will be left alone after shutdown",
            opts.port
        );
        None
    } else {
        Some(opts.port)
    };

    let timer = Instant::now();
    let mut process = match stages::start(project_dir, opts, release_port) {
        Ok(process) => process,
        Err(error) => {
            result.record(Stage::Start, timer.elapsed(), Err(error));
            return;
        }
    };
    result.record(Stage::Start, timer.elapsed(), Ok(()));
    result.start_success = true;

    if !endpoints.is_empty() {
        let timer = Instant::now();
        let outcome = probe::probe_endpoints(&mut process, endpoints, &opts.probe_options());
        result.endpoint_results = outcome.results;
        let passed = outcome.errors.is_empty();
        result.errors.extend(outcome.errors);
        result.stages.push(StageReport {
            stage: Stage::EndpointTest,
            passed,
            duration: timer.elapsed(),
        });
    }

    let timer = Instant::now();
    let released = process.terminate(opts.terminate_grace, release_port);
    let cleanup = if released {
        Ok(())
    } else {
        let message = match release_port {
            Some(port) => format!(
                "Failed to cleanup process (pid {}): port {} still in use",
                process.id(),
                port
            ),
            None => format!("Failed to cleanup process (pid {})", process.id()),
        };
        Err(ValidationError::new(Stage::Cleanup, ErrorCode::CleanupError, message))
    };
    result.record(Stage::Cleanup, timer.elapsed(), cleanup);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
