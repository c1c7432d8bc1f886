//! Individual pipeline stages.
//!
//! Each stage returns `Err(ValidationError)` on failure; none of them panic
//! or propagate lower-level errors.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use crate::util::process::{truncate, CommandFailure, CommandOutput, ManagedProcess, ProcessBuilder};

use super::types::{ErrorCode, Stage, ValidationError};
use super::ValidateOptions;

const SETTLE_POLL: Duration = Duration::from_millis(250);

/// Check that the project directory and its manifest exist.
pub fn check_setup(project_dir: &Path, manifest: &str) -> Result<(), ValidationError> {
    if !project_dir.is_dir() {
        return Err(ValidationError::new(
            Stage::Setup,
            ErrorCode::ProjectNotFound,
            format!("Project directory not found: {}", project_dir.display()),
        ));
    }

    if !project_dir.join(manifest).is_file() {
        return Err(ValidationError::new(
            Stage::Setup,
            ErrorCode::MissingPackageJson,
            format!("{} not found in {}", manifest, project_dir.display()),
        ));
    }

    Ok(())
}

fn builder_for(argv: &[String], project_dir: &Path) -> Option<ProcessBuilder> {
    ProcessBuilder::from_argv(argv).map(|b| b.cwd(project_dir))
}

fn program_name(argv: &[String]) -> &str {
    argv.first().map(String::as_str).unwrap_or("command")
}

/// Install dependencies.
pub fn install(project_dir: &Path, opts: &ValidateOptions) -> Result<(), ValidationError> {
    let Some(builder) = builder_for(&opts.install_command, project_dir) else {
        return Err(ValidationError::new(
            Stage::Install,
            ErrorCode::InstallError,
            "install command is empty",
        ));
    };

    tracing::info!("Installing dependencies (`{}`)", builder.display_command());
    let output = builder.run(opts.install_timeout);
    if output.success {
        return Ok(());
    }

    let program = program_name(&opts.install_command);
    let (code, message) = match &output.failure {
        Some(CommandFailure::NotFound) => (ErrorCode::NpmNotFound, format!("{} not found", program)),
        Some(CommandFailure::Timeout) => (
            ErrorCode::InstallTimeout,
            format!("{} timeout after {}s", builder.display_command(), opts.install_timeout.as_secs()),
        ),
        Some(CommandFailure::Io(msg)) => (ErrorCode::InstallError, format!("Install error: {}", msg)),
        _ => (
            ErrorCode::InstallFailed,
            format!(
                "{} failed: {}",
                builder.display_command(),
                failure_excerpt(&output, opts.stderr_limit, "install failed")
            ),
        ),
    };

    Err(ValidationError::new(Stage::Install, code, message))
}

/// Build the project.
pub fn build(project_dir: &Path, opts: &ValidateOptions) -> Result<(), ValidationError> {
    let Some(builder) = builder_for(&opts.build_command, project_dir) else {
        return Err(ValidationError::new(
            Stage::Build,
            ErrorCode::BuildError,
            "build command is empty",
        ));
    };

    tracing::info!("Building (`{}`)", builder.display_command());
    let output = builder.run(opts.build_timeout);
    if output.success {
        return Ok(());
    }

    let program = program_name(&opts.build_command);
    let (code, message) = match &output.failure {
        Some(CommandFailure::NotFound) => (ErrorCode::NpmNotFound, format!("{} not found", program)),
        Some(CommandFailure::Timeout) => (
            ErrorCode::BuildTimeout,
            format!("Build timeout after {}s", opts.build_timeout.as_secs()),
        ),
        Some(CommandFailure::Io(msg)) => (ErrorCode::BuildError, format!("Build error: {}", msg)),
        _ => (
            ErrorCode::BuildFailed,
            format!(
                "{} failed: {}",
                builder.display_command(),
                failure_excerpt(&output, opts.stderr_limit, "Build failed")
            ),
        ),
    };

    Err(ValidationError::new(Stage::Build, code, message))
}

/// Launch the server and make sure it survives the settle window.
///
/// On success the still-running process is handed back to the caller.
/// `release_port` is the port freed again when the process is dropped; pass
/// `None` when something else held the port before the server started.
pub fn start(
    project_dir: &Path,
    opts: &ValidateOptions,
    release_port: Option<u16>,
) -> Result<ManagedProcess, ValidationError> {
    let Some(builder) = builder_for(&opts.start_command, project_dir) else {
        return Err(ValidationError::new(
            Stage::Start,
            ErrorCode::StartError,
            "start command is empty",
        ));
    };

    tracing::info!("Starting server (`{}`)", builder.display_command());
    let mut process = builder
        .start()
        .map(|p| match release_port {
            Some(port) => p.with_port(port),
            None => p,
        })
        .map_err(|e| {
            ValidationError::new(Stage::Start, ErrorCode::StartError, format!("Start error: {:#}", e))
        })?;

    // A process that exits early has crashed; no need to sit out the window.
    let deadline = Instant::now() + opts.start_settle;
    while Instant::now() < deadline {
        if !process.is_running().0 {
            break;
        }
        thread::sleep(SETTLE_POLL.min(deadline.saturating_duration_since(Instant::now())));
    }

    match process.is_running() {
        (true, _) => {
            tracing::debug!("Server is up (pid {})", process.id());
            Ok(process)
        }
        (false, stderr) => {
            tracing::debug!(
                "`{}` exited during startup ({:?})",
                process.command(),
                process.exit_status()
            );
            // Already exited and never held the port; just reap it.
            process.terminate(opts.terminate_grace, None);

            // Some servers log their fatal error to stdout.
            let mut output = stderr.unwrap_or_default();
            if output.trim().is_empty() {
                output = process.stdout_output();
            }
            let excerpt = truncate(output.trim(), opts.stderr_limit);
            let detail = if excerpt.is_empty() {
                "Application crashed"
            } else {
                excerpt
            };
            Err(ValidationError::new(
                Stage::Start,
                ErrorCode::StartCrashed,
                format!("Application crashed: {}", detail),
            ))
        }
    }
}

/// Bounded stderr excerpt for an error message, falling back to stdout.
fn failure_excerpt(output: &CommandOutput, limit: usize, fallback: &str) -> String {
    let text = if output.stderr.trim().is_empty() {
        output.stdout.trim()
    } else {
        output.stderr.trim()
    };

    if text.is_empty() {
        fallback.to_string()
    } else {
        truncate(text, limit).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    fn project() -> TempDir {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("package.json"), "{}").unwrap();
        tmp
    }

    #[test]
    fn test_setup_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let err = check_setup(&tmp.path().join("nope"), "package.json").unwrap_err();
        assert_eq!(err.stage, Stage::Setup);
        assert_eq!(err.code, ErrorCode::ProjectNotFound);
    }

    #[test]
    fn test_setup_missing_manifest() {
        let tmp = TempDir::new().unwrap();
        let err = check_setup(tmp.path(), "package.json").unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingPackageJson);
        assert!(err.message.contains("package.json"));
    }

    #[test]
    fn test_setup_ok() {
        let tmp = project();
        assert!(check_setup(tmp.path(), "package.json").is_ok());
    }

    #[test]
    fn test_install_tool_not_found() {
        let tmp = project();
        let opts = ValidateOptions {
            install_command: vec!["keel-no-such-package-manager".into(), "install".into()],
            ..ValidateOptions::default()
        };

        let err = install(tmp.path(), &opts).unwrap_err();
        assert_eq!(err.stage, Stage::Install);
        assert_eq!(err.code, ErrorCode::NpmNotFound);
    }

    #[test]
    fn test_empty_command() {
        let tmp = project();
        let opts = ValidateOptions {
            build_command: Vec::new(),
            ..ValidateOptions::default()
        };
        assert_eq!(build(tmp.path(), &opts).unwrap_err().code, ErrorCode::BuildError);
    }

    #[cfg(unix)]
    #[test]
    fn test_install_failure_truncates_stderr() {
        let tmp = project();
        let opts = ValidateOptions {
            install_command: sh("printf 'x%.0s' $(seq 1 500) >&2; exit 1"),
            stderr_limit: 50,
            ..ValidateOptions::default()
        };

        let err = install(tmp.path(), &opts).unwrap_err();
        assert_eq!(err.code, ErrorCode::InstallFailed);
        assert!(err.message.ends_with(&"x".repeat(50)));
        assert!(!err.message.contains(&"x".repeat(51)));
    }

    #[cfg(unix)]
    #[test]
    fn test_build_timeout() {
        let tmp = project();
        let opts = ValidateOptions {
            build_command: sh("sleep 30"),
            build_timeout: Duration::from_millis(300),
            ..ValidateOptions::default()
        };

        let err = build(tmp.path(), &opts).unwrap_err();
        assert_eq!(err.code, ErrorCode::BuildTimeout);
    }

    #[cfg(unix)]
    #[test]
    fn test_start_crash_carries_stderr() {
        let tmp = project();
        let opts = ValidateOptions {
            start_command: sh("echo 'EADDRINUSE: address already in use' >&2; exit 1"),
            start_settle: Duration::from_secs(2),
            ..ValidateOptions::default()
        };

        let err = start(tmp.path(), &opts, None).unwrap_err();
        assert_eq!(err.stage, Stage::Start);
        assert_eq!(err.code, ErrorCode::StartCrashed);
        assert!(err.message.contains("EADDRINUSE"));
    }

    #[cfg(unix)]
    #[test]
    fn test_start_survives_settle() {
        let tmp = project();
        let opts = ValidateOptions {
            start_command: sh("sleep 30"),
            start_settle: Duration::from_millis(300),
            ..ValidateOptions::default()
        };

        let mut process = start(tmp.path(), &opts, None).unwrap();
        assert!(process.is_running().0);
        assert!(process.terminate(Duration::from_secs(2), None));
    }
}
