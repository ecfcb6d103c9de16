//! Pre-flight reclamation of the relay's listening port.
//!
//! Probing binds a throwaway listener and drops it before reporting "free".
//! There is an unavoidable window between that release and the real bind;
//! another process can still win it.

use std::collections::BTreeSet;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use tabwire_core::PortError;

/// Re-probes after reclamation before giving up.
const RECHECK_ATTEMPTS: u32 = 5;
const RECHECK_INTERVAL: Duration = Duration::from_millis(100);

/// A PID that could not be terminated, or a listing step that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclaimFailure {
    pub pid: Option<u32>,
    pub reason: String,
}

/// What a reclamation pass found and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    pub pids_found: Vec<u32>,
    pub killed: Vec<u32>,
    pub failures: Vec<ReclaimFailure>,
}

impl ReclaimReport {
    fn fail(&mut self, pid: Option<u32>, reason: impl Into<String>) {
        let reason = reason.into();
        match pid {
            Some(pid) => warn!(pid, %reason, "Could not terminate port holder"),
            None => warn!(%reason, "Could not list port holders"),
        }
        self.failures.push(ReclaimFailure { pid, reason });
    }
}

/// Platform capability for checking and freeing a TCP port.
#[async_trait]
pub trait PortGuard: Send + Sync {
    async fn is_port_in_use(&self, port: u16) -> Result<bool, PortError>;

    /// Terminate every process holding `port`. Per-process failures are
    /// recorded and skipped.
    async fn reclaim_port(&self, port: u16) -> ReclaimReport;
}

/// Bind a transient listener on `(host, port)` and release it immediately.
pub async fn probe_port(host: &str, port: u16) -> Result<bool, PortError> {
    match TcpListener::bind((host, port)).await {
        Ok(listener) => {
            drop(listener);
            Ok(false)
        }
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => Ok(true),
        Err(source) => Err(PortError::Probe { port, source }),
    }
}

/// PIDs from `lsof -t` output: one per line.
pub fn parse_lsof_pids(output: &str) -> Vec<u32> {
    output
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// PIDs from `netstat -ano` rows whose local address is bound to `port`.
pub fn parse_netstat_pids(output: &str, port: u16) -> Vec<u32> {
    let port = port.to_string();
    output
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 4 || !matches!(parts[0], "TCP" | "UDP") {
                return None;
            }
            let local_port = parts[1].rsplit(':').next()?;
            if local_port != port {
                return None;
            }
            parts.last()?.parse::<u32>().ok()
        })
        .filter(|pid| *pid != 0)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

async fn run(program: &str, args: &[&str]) -> Result<std::process::Output, String> {
    tokio::process::Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| format!("failed to run {program}: {e}"))
}

/// Run a command that should exit successfully.
async fn run_checked(program: &str, args: &[&str]) -> Result<(), String> {
    let output = run(program, args).await?;
    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(format!("{program} exited with {}: {}", output.status, stderr.trim()))
    }
}

async fn terminate_each<F, Fut>(report: &mut ReclaimReport, pids: Vec<u32>, kill: F)
where
    F: Fn(u32) -> Fut,
    Fut: std::future::Future<Output = Result<(), String>>,
{
    let own_pid = std::process::id();
    report.pids_found = pids.clone();
    for pid in pids {
        if pid == own_pid {
            debug!(pid, "Skipping own process");
            continue;
        }
        match kill(pid).await {
            Ok(()) => {
                info!(pid, "Terminated port holder");
                report.killed.push(pid);
            }
            Err(reason) => report.fail(Some(pid), reason),
        }
    }
}

/// `lsof` (listeners only) + `kill -9`.
pub struct UnixPortGuard {
    host: String,
}

impl UnixPortGuard {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

#[async_trait]
impl PortGuard for UnixPortGuard {
    async fn is_port_in_use(&self, port: u16) -> Result<bool, PortError> {
        probe_port(&self.host, port).await
    }

    async fn reclaim_port(&self, port: u16) -> ReclaimReport {
        let mut report = ReclaimReport::default();
        // Listening sockets only; clients connected to the port are left alone.
        let target = format!("tcp:{port}");
        let output = match run("lsof", &["-ti", &target, "-sTCP:LISTEN"]).await {
            Ok(output) => output,
            Err(reason) => {
                report.fail(None, reason);
                return report;
            }
        };
        // lsof exits 1 with no output when nothing matches.
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() && !stderr.trim().is_empty() {
            report.fail(None, format!("lsof failed: {}", stderr.trim()));
        }
        let pids = parse_lsof_pids(&String::from_utf8_lossy(&output.stdout));
        debug!(port, ?pids, "Port holders");

        terminate_each(&mut report, pids, |pid| async move {
            let pid = pid.to_string();
            run_checked("kill", &["-9", &pid]).await
        })
        .await;
        report
    }
}

/// `netstat -ano` + `taskkill /F`.
pub struct WindowsPortGuard {
    host: String,
}

impl WindowsPortGuard {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

#[async_trait]
impl PortGuard for WindowsPortGuard {
    async fn is_port_in_use(&self, port: u16) -> Result<bool, PortError> {
        probe_port(&self.host, port).await
    }

    async fn reclaim_port(&self, port: u16) -> ReclaimReport {
        let mut report = ReclaimReport::default();
        let output = match run("netstat", &["-ano"]).await {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                report.fail(None, format!("netstat failed: {}", stderr.trim()));
                return report;
            }
            Err(reason) => {
                report.fail(None, reason);
                return report;
            }
        };
        let pids = parse_netstat_pids(&String::from_utf8_lossy(&output.stdout), port);
        debug!(port, ?pids, "Port holders");

        terminate_each(&mut report, pids, |pid| async move {
            let pid = pid.to_string();
            run_checked("taskkill", &["/F", "/PID", &pid]).await
        })
        .await;
        report
    }
}

/// The guard for the platform this binary was built for.
pub fn platform_port_guard(host: &str) -> Box<dyn PortGuard> {
    if cfg!(windows) {
        Box::new(WindowsPortGuard::new(host))
    } else {
        Box::new(UnixPortGuard::new(host))
    }
}

/// Make sure `port` can be bound, reclaiming it first when allowed.
///
/// Returns the reclamation report when one was attempted.
pub async fn ensure_port_free(
    guard: &dyn PortGuard,
    port: u16,
    reclaim: bool,
) -> Result<Option<ReclaimReport>, PortError> {
    if !guard.is_port_in_use(port).await? {
        debug!(port, "Port is free");
        return Ok(None);
    }
    if !reclaim {
        warn!(port, "Port is in use and reclamation is disabled");
        return Err(PortError::Unavailable { port });
    }

    warn!(port, "Port is in use, reclaiming");
    let report = guard.reclaim_port(port).await;

    for _ in 0..RECHECK_ATTEMPTS {
        tokio::time::sleep(RECHECK_INTERVAL).await;
        if !guard.is_port_in_use(port).await? {
            info!(port, killed = report.killed.len(), "Port reclaimed");
            return Ok(Some(report));
        }
    }
    Err(PortError::Unavailable { port })
}
