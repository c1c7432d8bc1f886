//! TCP port inspection and cleanup.
//!
//! Finding the processes behind a port relies on OS utilities: `lsof`, then
//! `fuser` on unix, `netstat` on Windows. Each step degrades to "nothing
//! found" when its utility is missing.

use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};

use crate::util::process::ProcessBuilder;

/// Port a generated backend listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 3000;

/// How long to wait for the OS to release a port after its owner exits.
pub const PORT_RELEASE_WINDOW: Duration = Duration::from_secs(5);

const INSPECT_TIMEOUT: Duration = Duration::from_secs(5);
const KILL_SETTLE: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Whether something is listening on `port`.
///
/// Tries an exclusive bind on loopback and on all interfaces; if either
/// fails the port counts as taken.
pub fn is_port_in_use(port: u16) -> bool {
    ["127.0.0.1", "0.0.0.0"]
        .iter()
        .any(|host| TcpListener::bind((*host, port)).is_err())
}

/// Poll until `port` is free or `window` elapses.
pub fn wait_for_port_free(port: u16, window: Duration) -> bool {
    let deadline = Instant::now() + window;
    loop {
        if !is_port_in_use(port) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// PIDs of processes holding `port`, excluding our own.
pub fn pids_on_port(port: u16) -> Vec<u32> {
    let own = std::process::id();
    let mut pids = find_pids(port);
    pids.retain(|pid| *pid != own);
    pids.sort_unstable();
    pids.dedup();
    pids
}

#[cfg(unix)]
fn find_pids(port: u16) -> Vec<u32> {
    let lsof = ProcessBuilder::new("lsof")
        .arg("-ti")
        .arg(format!(":{}", port))
        .run(INSPECT_TIMEOUT);
    let pids = parse_pid_list(&lsof.stdout);
    if !pids.is_empty() {
        return pids;
    }
    tracing::debug!("lsof found nothing on port {}, trying fuser", port);

    // fuser writes "3000/tcp:" to stderr and the PIDs to stdout.
    let fuser = ProcessBuilder::new("fuser")
        .arg(format!("{}/tcp", port))
        .run(INSPECT_TIMEOUT);
    parse_pid_list(&fuser.stdout)
}

#[cfg(windows)]
fn find_pids(port: u16) -> Vec<u32> {
    let netstat = ProcessBuilder::new("netstat")
        .arg("-ano")
        .run(INSPECT_TIMEOUT);
    parse_netstat(&netstat.stdout, port)
}

#[cfg(not(any(unix, windows)))]
fn find_pids(_port: u16) -> Vec<u32> {
    Vec::new()
}

/// Parse whitespace-separated PIDs, ignoring anything that isn't one.
fn parse_pid_list(output: &str) -> Vec<u32> {
    output
        .split_whitespace()
        .filter_map(|token| {
            token
                .trim_end_matches(|c: char| c.is_ascii_alphabetic())
                .parse()
                .ok()
        })
        .collect()
}

/// Parse `netstat -ano` rows listening on `port`.
#[cfg_attr(not(windows), allow(dead_code))]
fn parse_netstat(output: &str, port: u16) -> Vec<u32> {
    let suffix = format!(":{}", port);
    output
        .lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 5 || !cols[0].eq_ignore_ascii_case("TCP") {
                return None;
            }
            if !cols[1].ends_with(&suffix) {
                return None;
            }
            cols[cols.len() - 1].parse().ok()
        })
        .collect()
}

/// Forcibly kill a single process.
fn kill_pid(pid: u32) -> bool {
    #[cfg(windows)]
    let builder = ProcessBuilder::new("taskkill").args(["/F", "/PID", &pid.to_string()]);
    #[cfg(not(windows))]
    let builder = ProcessBuilder::new("kill").args(["-9", &pid.to_string()]);

    let output = builder.run(INSPECT_TIMEOUT);
    if !output.success {
        tracing::debug!("failed to kill pid {}: {}", pid, output.stderr.trim());
    }
    output.success
}

/// Kill whatever holds `port`.
///
/// Returns true if the port is free afterwards (or was never taken).
pub fn kill_process_on_port(port: u16) -> bool {
    if !is_port_in_use(port) {
        return true;
    }

    let pids = pids_on_port(port);
    if pids.is_empty() {
        tracing::warn!("Port {} is in use but no owning process was found", port);
        return false;
    }

    for pid in &pids {
        tracing::info!("Killing process {} on port {}", pid, port);
        kill_pid(*pid);
    }

    thread::sleep(KILL_SETTLE);
    !is_port_in_use(port)
}

/// Repeat [`kill_process_on_port`] up to `attempts` times.
pub fn force_kill_port(port: u16, attempts: u32) -> bool {
    for attempt in 1..=attempts.max(1) {
        if kill_process_on_port(port) {
            return true;
        }
        tracing::debug!("port {} still in use after attempt {}", port, attempt);
    }
    false
}

/// The port a base URL points at, including scheme defaults.
pub fn port_from_url(base_url: &str) -> Option<u16> {
    url::Url::parse(base_url).ok()?.port_or_known_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn free_port() -> u16 {
        TcpListener::bind(("127.0.0.1", 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[test]
    fn test_port_in_use_while_bound() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(is_port_in_use(port));

        drop(listener);
        assert!(wait_for_port_free(port, Duration::from_secs(2)));
    }

    #[test]
    fn test_free_port_is_not_in_use() {
        let port = free_port();
        assert!(!is_port_in_use(port));
    }

    #[test]
    fn test_kill_on_free_port_is_noop() {
        let port = free_port();
        assert!(kill_process_on_port(port));
        assert!(force_kill_port(port, 3));
    }

    #[test]
    fn test_wait_for_port_free_times_out() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();

        let start = Instant::now();
        assert!(!wait_for_port_free(port, Duration::from_millis(300)));
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[test]
    fn test_pids_never_include_self() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(!pids_on_port(port).contains(&std::process::id()));
    }

    #[test]
    fn test_parse_pid_list() {
        assert_eq!(parse_pid_list("123\n456\n"), vec![123, 456]);
        assert_eq!(parse_pid_list(" 789c  1011"), vec![789, 1011]);
        assert!(parse_pid_list("").is_empty());
        assert!(parse_pid_list("3000/tcp:").is_empty());
    }

    #[test]
    fn test_parse_netstat() {
        let output = "\
  Proto  Local Address          Foreign Address        State           PID
  TCP    0.0.0.0:3000           0.0.0.0:0              LISTENING       4242
  TCP    0.0.0.0:30000          0.0.0.0:0              LISTENING       1111
  UDP    0.0.0.0:3000           *:*                                    999
";
        assert_eq!(parse_netstat(output, 3000), vec![4242]);
    }

    #[test]
    fn test_port_from_url() {
        assert_eq!(port_from_url("http://localhost:3000"), Some(3000));
        assert_eq!(port_from_url("http://localhost:8080/api"), Some(8080));
        assert_eq!(port_from_url("http://example.com"), Some(80));
        assert_eq!(port_from_url("https://example.com"), Some(443));
        assert_eq!(port_from_url("not a url"), None);
    }
}
