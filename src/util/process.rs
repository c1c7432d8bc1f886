//! Subprocess execution utilities.
//!
//! Two modes:
//! - [`ProcessBuilder::run`] waits for completion under a timeout and never
//!   fails: a missing executable, a timeout and a non-zero exit all come back
//!   as an unsuccessful [`CommandOutput`].
//! - [`ProcessBuilder::start`] launches a long-running process and hands back
//!   a [`ManagedProcess`] that is terminated when dropped.
//!
//! Output is captured into temporary files rather than pipes, so a chatty
//! server can never block on a full pipe buffer while nobody is reading.

use std::ffi::OsStr;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use tempfile::NamedTempFile;

use crate::util::port;

/// Marker placed at the start of stderr when a command hits its timeout.
pub const TIMEOUT_MARKER: &str = "Command timeout";

/// Marker placed at the start of stderr when the executable is missing.
pub const NOT_FOUND_MARKER: &str = "Command not found";

/// Default grace period between the interrupt signal and a forced kill.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Builder for subprocess execution.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    cwd: Option<PathBuf>,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// Create a builder from an argv list (`["npm", "run", "build"]`).
    ///
    /// Returns `None` for an empty list.
    pub fn from_argv<S: AsRef<str>>(argv: &[S]) -> Option<Self> {
        let (program, rest) = argv.split_first()?;
        Some(ProcessBuilder::new(program.as_ref()).args(rest.iter().map(|s| s.as_ref())))
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Build the Command.
    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        // Own process group, so signals reach the whole tree (npm -> node).
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        cmd
    }

    /// Spawn with stdout/stderr redirected into capture files.
    fn spawn_captured(&self) -> Result<(Child, Capture), CommandFailure> {
        if let Some(ref cwd) = self.cwd {
            if !cwd.is_dir() {
                return Err(CommandFailure::Io(format!(
                    "working directory not found: {}",
                    cwd.display()
                )));
            }
        }

        let capture = Capture::new().map_err(|e| {
            CommandFailure::Io(format!("failed to create capture files: {}", e))
        })?;

        let mut cmd = self.build_command();
        cmd.stdin(Stdio::null());
        let (stdout, stderr) = capture
            .stdio()
            .map_err(|e| CommandFailure::Io(format!("failed to open capture files: {}", e)))?;
        cmd.stdout(stdout);
        cmd.stderr(stderr);

        tracing::debug!("Running `{}`", self.display_command());

        match cmd.spawn() {
            Ok(child) => Ok((child, capture)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(CommandFailure::NotFound),
            Err(e) => Err(CommandFailure::Io(format!(
                "failed to spawn `{}`: {}",
                self.program.display(),
                e
            ))),
        }
    }

    /// Run to completion, killing the process tree if `timeout` elapses.
    pub fn run(&self, timeout: Duration) -> CommandOutput {
        let (mut child, capture) = match self.spawn_captured() {
            Ok(spawned) => spawned,
            Err(failure) => return CommandOutput::failed(self, failure),
        };

        let start = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) if start.elapsed() >= timeout => {
                    tracing::warn!(
                        "`{}` timed out after {:.0?}, killing it",
                        self.display_command(),
                        timeout
                    );
                    force_kill(&mut child);
                    break None;
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    force_kill(&mut child);
                    return CommandOutput::failed(
                        self,
                        CommandFailure::Io(format!("failed to wait for process: {}", e)),
                    );
                }
            }
        };

        let stdout = capture.stdout();
        let captured_stderr = capture.stderr();

        match status {
            Some(status) if status.success() => CommandOutput {
                success: true,
                stdout,
                stderr: captured_stderr,
                exit_code: status.code(),
                failure: None,
            },
            Some(status) => CommandOutput {
                success: false,
                stdout,
                stderr: captured_stderr,
                exit_code: status.code(),
                failure: Some(CommandFailure::Exit(status.code())),
            },
            None => {
                let mut stderr = format!("{} after {}s", TIMEOUT_MARKER, timeout.as_secs());
                if !captured_stderr.is_empty() {
                    stderr.push('\n');
                    stderr.push_str(&captured_stderr);
                }
                CommandOutput {
                    success: false,
                    stdout,
                    stderr,
                    exit_code: None,
                    failure: Some(CommandFailure::Timeout),
                }
            }
        }
    }

    /// Start the process without waiting for it.
    pub fn start(&self) -> Result<ManagedProcess> {
        let (child, capture) = self.spawn_captured().map_err(|failure| match failure {
            CommandFailure::NotFound => anyhow::anyhow!(
                "{}: {}",
                NOT_FOUND_MARKER,
                self.program.display()
            ),
            other => anyhow::anyhow!("{}", other),
        })?;

        tracing::debug!("Started `{}` (pid {})", self.display_command(), child.id());

        Ok(ManagedProcess {
            child,
            capture,
            command: self.display_command(),
            port: None,
            exit_status: None,
            terminated: false,
        })
    }

    /// Display the command for error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Why a synchronous command did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandFailure {
    /// The executable could not be found.
    NotFound,
    /// The timeout elapsed and the process was killed.
    Timeout,
    /// The process exited unsuccessfully (`None` when killed by a signal).
    Exit(Option<i32>),
    /// Anything else: bad working directory, capture files, wait errors.
    Io(String),
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandFailure::NotFound => write!(f, "executable not found"),
            CommandFailure::Timeout => write!(f, "timed out"),
            CommandFailure::Exit(Some(code)) => write!(f, "exited with code {}", code),
            CommandFailure::Exit(None) => write!(f, "terminated by signal"),
            CommandFailure::Io(msg) => write!(f, "{}", msg),
        }
    }
}

/// Output of a synchronous command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub failure: Option<CommandFailure>,
}

impl CommandOutput {
    fn failed(builder: &ProcessBuilder, failure: CommandFailure) -> Self {
        let stderr = match &failure {
            CommandFailure::NotFound => {
                format!("{}: {}", NOT_FOUND_MARKER, builder.program.display())
            }
            other => other.to_string(),
        };
        CommandOutput {
            success: false,
            stdout: String::new(),
            stderr,
            exit_code: None,
            failure: Some(failure),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.failure, Some(CommandFailure::Timeout))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.failure, Some(CommandFailure::NotFound))
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !out.is_empty() && !out.ends_with('\n') && !self.stderr.is_empty() {
            out.push('\n');
        }
        out.push_str(&self.stderr);
        out
    }
}

/// A long-running child process.
///
/// Owned by whichever stage started it. Dropping a `ManagedProcess` that was
/// never terminated terminates it, including the port cleanup when a port
/// was attached with [`ManagedProcess::with_port`].
#[derive(Debug)]
pub struct ManagedProcess {
    child: Child,
    capture: Capture,
    command: String,
    port: Option<u16>,
    exit_status: Option<ExitStatus>,
    terminated: bool,
}

impl ManagedProcess {
    /// Attach the port the process listens on, for cleanup on drop.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Exit status, once the process has been observed to exit.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    fn poll(&mut self) -> bool {
        if self.exit_status.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit_status = Some(status);
                false
            }
            Ok(None) => true,
            // Can't observe it; assume it is still there so cleanup still runs.
            Err(e) => {
                tracing::debug!("failed to poll `{}`: {}", self.command, e);
                true
            }
        }
    }

    /// Whether the process is still running.
    ///
    /// Once it has exited, the second value holds everything it wrote to
    /// stderr.
    pub fn is_running(&mut self) -> (bool, Option<String>) {
        if self.poll() {
            (true, None)
        } else {
            (false, Some(self.capture.stderr()))
        }
    }

    /// Everything written to stdout so far.
    pub fn stdout_output(&self) -> String {
        self.capture.stdout()
    }

    /// Stop the process and optionally make sure `port` is released.
    ///
    /// 1. Interrupt the process group (like Ctrl+C).
    /// 2. Wait up to `grace`, then force-kill and reap.
    /// 3. With a port: wait up to [`port::PORT_RELEASE_WINDOW`] for the OS to
    ///    release it, then kill whatever still holds it.
    ///
    /// Returns true when the process is gone and the port (if any) is free.
    pub fn terminate(&mut self, grace: Duration, port: Option<u16>) -> bool {
        self.terminated = true;

        if self.poll() {
            tracing::debug!("Interrupting `{}` (pid {})", self.command, self.id());
            send_interrupt(&mut self.child);

            let deadline = Instant::now() + grace;
            while self.poll() && Instant::now() < deadline {
                thread::sleep(POLL_INTERVAL);
            }

            if self.poll() {
                tracing::debug!(
                    "`{}` ignored interrupt for {:.0?}, killing",
                    self.command,
                    grace
                );
                force_kill(&mut self.child);
                self.poll();
            }
        }

        let reaped = self.exit_status.is_some();

        let port_free = match port {
            Some(port) => {
                if port::wait_for_port_free(port, port::PORT_RELEASE_WINDOW) {
                    true
                } else {
                    tracing::warn!("Port {} still in use after shutdown, killing holders", port);
                    port::force_kill_port(port, 3)
                }
            }
            None => true,
        };

        reaped && port_free
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        if !self.terminated {
            let port = self.port;
            self.terminate(DEFAULT_GRACE, port);
        }
    }
}

/// Send an interrupt to the child's process group.
fn send_interrupt(child: &mut Child) {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        let sent = ProcessBuilder::new("kill")
            .args(["-s", "INT", "--", &group])
            .run(Duration::from_secs(2))
            .success;
        if !sent {
            let _ = ProcessBuilder::new("kill")
                .args(["-s", "INT", &child.id().to_string()])
                .run(Duration::from_secs(2));
        }
    }

    #[cfg(not(unix))]
    {
        let _ = child.kill();
    }
}

/// Kill the child's process group and reap the child.
fn force_kill(child: &mut Child) {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        let _ = ProcessBuilder::new("kill")
            .args(["-s", "KILL", "--", &group])
            .run(Duration::from_secs(2));
    }

    let _ = child.kill();
    let _ = child.wait();
}

/// Temporary files receiving a child's stdout and stderr.
#[derive(Debug)]
struct Capture {
    stdout: NamedTempFile,
    stderr: NamedTempFile,
}

impl Capture {
    fn new() -> io::Result<Self> {
        Ok(Capture {
            stdout: NamedTempFile::new()?,
            stderr: NamedTempFile::new()?,
        })
    }

    /// Fresh handles for the child; reopening gives them their own offsets.
    fn stdio(&self) -> io::Result<(Stdio, Stdio)> {
        Ok((
            Stdio::from(self.stdout.reopen()?),
            Stdio::from(self.stderr.reopen()?),
        ))
    }

    fn stdout(&self) -> String {
        read_lossy(self.stdout.path())
    }

    fn stderr(&self) -> String {
        read_lossy(self.stderr.path())
    }
}

fn read_lossy(path: &Path) -> String {
    std::fs::read(path)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Truncate to at most `limit` characters, on a char boundary.
pub fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Find an executable in PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_command() {
        let pb = ProcessBuilder::new("npm").args(["run", "build"]);
        assert_eq!(pb.display_command(), "npm run build");
    }

    #[test]
    fn test_from_argv() {
        let pb = ProcessBuilder::from_argv(&["npx", "tsc", "--noEmit"]).unwrap();
        assert_eq!(pb.display_command(), "npx tsc --noEmit");

        let empty: [&str; 0] = [];
        assert!(ProcessBuilder::from_argv(&empty).is_none());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 3), "hel");
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("", 5), "");
    }

    #[test]
    fn test_missing_executable_is_not_found() {
        let output = ProcessBuilder::new("keel-definitely-not-a-real-binary")
            .run(Duration::from_secs(5));
        assert!(!output.success);
        assert!(output.is_not_found());
        assert!(output.stderr.starts_with(NOT_FOUND_MARKER));
    }

    #[test]
    fn test_missing_working_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let output = ProcessBuilder::new("echo")
            .cwd(tmp.path().join("nope"))
            .run(Duration::from_secs(5));
        assert!(!output.success);
        assert!(matches!(output.failure, Some(CommandFailure::Io(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_captures_output() {
        let output = ProcessBuilder::new("sh")
            .args(["-c", "echo out; echo err >&2"])
            .run(Duration::from_secs(10));

        assert!(output.success);
        assert_eq!(output.exit_code, Some(0));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert!(output.failure.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_nonzero_exit() {
        let output = ProcessBuilder::new("sh")
            .args(["-c", "echo nope >&2; exit 3"])
            .run(Duration::from_secs(10));

        assert!(!output.success);
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.failure, Some(CommandFailure::Exit(Some(3))));
        assert!(output.stderr.contains("nope"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_timeout() {
        let start = Instant::now();
        let output = ProcessBuilder::new("sleep")
            .arg("30")
            .run(Duration::from_millis(300));

        assert!(!output.success);
        assert!(output.is_timeout());
        assert!(output.stderr.starts_with(TIMEOUT_MARKER));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_in_working_directory() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("marker.txt"), "x").unwrap();

        let output = ProcessBuilder::new("ls")
            .cwd(tmp.path())
            .run(Duration::from_secs(10));
        assert!(output.success);
        assert!(output.stdout.contains("marker.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_managed_process_crash_reports_stderr() {
        let mut process = ProcessBuilder::new("sh")
            .args(["-c", "echo boom >&2; exit 1"])
            .start()
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        let (running, stderr) = loop {
            let state = process.is_running();
            if !state.0 || Instant::now() > deadline {
                break state;
            }
            thread::sleep(Duration::from_millis(50));
        };

        assert!(!running);
        assert_eq!(stderr.unwrap().trim(), "boom");
        assert!(!process.exit_status().unwrap().success());
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_running_process() {
        let mut process = ProcessBuilder::new("sleep").arg("30").start().unwrap();
        assert!(process.is_running().0);

        assert!(process.terminate(Duration::from_secs(2), None));
        assert!(!process.is_running().0);
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_escalates_to_kill() {
        // Ignores SIGINT, so the grace period has to run out.
        let mut process = ProcessBuilder::new("sh")
            .args(["-c", "trap '' INT; sleep 30"])
            .start()
            .unwrap();
        thread::sleep(Duration::from_millis(200));

        let start = Instant::now();
        assert!(process.terminate(Duration::from_millis(500), None));
        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(process.exit_status().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_already_exited() {
        let mut process = ProcessBuilder::new("true").start().unwrap();
        thread::sleep(Duration::from_millis(200));
        assert!(process.terminate(Duration::from_secs(1), None));
    }

    /// Start a python3 listener on `port` in its own process group and wait
    /// until it holds the port. None when python3 is unavailable.
    #[cfg(unix)]
    fn start_listener(port: u16, ignore_interrupt: bool) -> Option<ManagedProcess> {
        find_executable("python3")?;
        let listen = format!(
            "import socket,time\n\
             s=socket.socket()\n\
             s.setsockopt(socket.SOL_SOCKET,socket.SO_REUSEADDR,1)\n\
             s.bind(('127.0.0.1',{}))\n\
             s.listen()\n\
             time.sleep(60)\n",
            port
        );
        let trap = if ignore_interrupt { "trap '' INT; " } else { "" };
        let script = format!("{}exec python3 -c \"$0\"", trap);
        let process = ProcessBuilder::new("sh")
            .args(["-c", script.as_str(), listen.as_str()])
            .start()
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !port::is_port_in_use(port) {
            assert!(Instant::now() < deadline, "listener never bound port {}", port);
            thread::sleep(Duration::from_millis(50));
        }
        Some(process)
    }

    #[cfg(unix)]
    fn free_port() -> u16 {
        std::net::TcpListener::bind(("127.0.0.1", 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_releases_port() {
        let port = free_port();
        let Some(mut process) = start_listener(port, true) else {
            return;
        };

        assert!(process.terminate(Duration::from_millis(500), Some(port)));
        assert!(process.exit_status().is_some());
        assert!(!port::is_port_in_use(port));
    }

    #[cfg(unix)]
    #[test]
    fn test_drop_releases_port() {
        let port = free_port();
        let Some(process) = start_listener(port, false) else {
            return;
        };
        let pid = process.id().to_string();

        drop(process.with_port(port));

        let alive = ProcessBuilder::new("kill")
            .args(["-0", pid.as_str()])
            .run(Duration::from_secs(2));
        assert!(!alive.success, "listener {} survived drop", pid);
        assert!(!port::is_port_in_use(port));
    }

    #[test]
    fn test_start_missing_executable() {
        let err = ProcessBuilder::new("keel-definitely-not-a-real-binary")
            .start()
            .unwrap_err();
        assert!(err.to_string().contains(NOT_FOUND_MARKER));
    }
}
