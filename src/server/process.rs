// src/server/process.rs
use crate::config::{ProcessMatchMode, ServerDescriptor};
use crate::error::{Error, Result};
use async_process::{Command, Stdio};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::Path;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};

/// Fixed window between the two CPU-time readings of a usage sample.
pub const SAMPLE_WINDOW: Duration = Duration::from_millis(500);

/// How long `stop` waits for killed processes to leave the process table.
const EXIT_WAIT: Duration = Duration::from_secs(10);

/// Liveness of a server as seen in the OS process table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSnapshot {
    /// Whether at least one matching process exists
    pub running: bool,
    /// Ids of every matching process
    pub pids: BTreeSet<u32>,
}

impl ProcessSnapshot {
    /// Builds a snapshot from the matched pids.
    pub fn from_pids(pids: BTreeSet<u32>) -> Self {
        Self {
            running: !pids.is_empty(),
            pids,
        }
    }
}

/// Resource usage summed over a server's processes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceUsage {
    /// Total resident memory in bytes
    pub memory_bytes: u64,
    /// CPU usage as a share of all logical cores, in percent
    pub cpu_percent: f64,
}

/// Result of stopping a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No matching process existed; nothing was killed.
    NotRunning,
    /// This many processes were terminated.
    Stopped {
        /// Number of processes killed
        count: usize,
    },
}

impl StopOutcome {
    /// Whether anything was stopped, i.e. the server was running before.
    pub fn was_running(&self) -> bool {
        matches!(self, StopOutcome::Stopped { .. })
    }
}

/// Inspects and controls the OS processes backing a server.
///
/// Processes are attributed to a server by image name, so any process sharing
/// the configured executable name counts as the server's. See
/// [`ProcessMatchMode`] for the stricter alternative.
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// Finds the processes currently backing `server`.
    async fn is_running(&self, server: &ServerDescriptor) -> Result<ProcessSnapshot>;

    /// Samples memory and CPU usage of `pids` over `window`.
    ///
    /// Processes that exit during the window are left out of the totals.
    async fn sample_usage(&self, pids: &BTreeSet<u32>, window: Duration) -> Result<ResourceUsage>;

    /// Forcefully terminates every process backing `server`.
    ///
    /// Returns [`StopOutcome::NotRunning`] without killing anything when no
    /// process matches. Fails on the first process that cannot be terminated.
    async fn stop(&self, server: &ServerDescriptor) -> Result<StopOutcome>;

    /// Launches the server's start command and returns the shell's pid.
    ///
    /// Success only means the OS accepted the spawn; it says nothing about
    /// whether the server became ready.
    async fn start(&self, server: &ServerDescriptor) -> Result<u32>;
}

/// Whether a process with `process_name` and executable path `exe` belongs to `server`.
///
/// Names compare without extension and case-insensitively, so `Foo.exe`
/// matches a process reported as `foo`.
pub fn matches_server(
    process_name: &OsStr,
    exe: Option<&Path>,
    server: &ServerDescriptor,
    mode: ProcessMatchMode,
) -> bool {
    let wanted = server.executable_stem().to_lowercase();
    if wanted.is_empty() {
        return false;
    }

    let stem_matches = |path: &Path| {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().to_lowercase() == wanted)
            .unwrap_or(false)
    };
    let name_matches = stem_matches(Path::new(process_name)) || exe.is_some_and(stem_matches);
    if !name_matches {
        return false;
    }

    match mode {
        ProcessMatchMode::ImageName => true,
        ProcessMatchMode::ImageNameInInstallDir => match (exe, server.working_directory()) {
            (Some(exe), Some(dir)) => {
                exe.starts_with(dir)
                    || dir
                        .canonicalize()
                        .map(|canonical| exe.starts_with(canonical))
                        .unwrap_or(false)
            }
            _ => false,
        },
    }
}

/// Combines per-process CPU readings into one percentage of total capacity.
///
/// Each reading is CPU time over wall time for one process (100 means one full
/// core), so the sum is divided by the number of logical cores.
pub fn combined_cpu_percent(per_process: &[f32], logical_cores: usize) -> f64 {
    let cores = logical_cores.max(1) as f64;
    per_process.iter().map(|&usage| usage as f64).sum::<f64>() / cores
}

fn logical_core_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Builds a command that runs `command_line` through the platform shell.
pub(crate) fn shell_command(command_line: &str, working_directory: Option<&Path>) -> Command {
    #[cfg(windows)]
    let mut command = {
        let mut command = Command::new("cmd.exe");
        command.arg("/C").arg(command_line);
        command
    };
    #[cfg(not(windows))]
    let mut command = {
        let mut command = Command::new("sh");
        command.arg("-c").arg(command_line);
        command
    };

    if let Some(dir) = working_directory {
        command.current_dir(dir);
    }
    command
}

/// Kills `root` and every process descending from it.
///
/// The whole tree is collected before anything is killed, so children that
/// would be re-parented once their parent dies are still found. Returns how
/// many processes were signalled. Blocks; call from a blocking context.
pub(crate) fn kill_process_tree(root: u32) -> usize {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);

    let mut tree = vec![Pid::from_u32(root)];
    let mut next = 0;
    while next < tree.len() {
        let parent = tree[next];
        tree.extend(
            system
                .processes()
                .iter()
                .filter(|(_, process)| process.parent() == Some(parent))
                .map(|(pid, _)| *pid),
        );
        next += 1;
    }

    let mut killed = 0;
    for pid in &tree {
        match system.process(*pid) {
            Some(process) if process.kill() => killed += 1,
            Some(_) => tracing::warn!(pid = pid.as_u32(), "Failed to kill process in tree"),
            None => {}
        }
    }
    tracing::debug!(root, killed, "Process tree killed");
    killed
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Process(format!("Process table task failed: {}", e)))
}

/// [`ProcessControl`] over the live OS process table.
///
/// Uses `sysinfo` to enumerate, measure and kill processes, and
/// `async-process` to launch start commands through the platform shell.
#[derive(Debug, Clone, Default)]
pub struct SystemProcessController {
    mode: ProcessMatchMode,
}

impl SystemProcessController {
    /// Create a controller that attributes processes using `mode`
    pub fn new(mode: ProcessMatchMode) -> Self {
        Self { mode }
    }

    fn matching_pids(system: &System, server: &ServerDescriptor, mode: ProcessMatchMode) -> BTreeSet<u32> {
        system
            .processes()
            .iter()
            .filter(|(_, process)| process.status() != ProcessStatus::Zombie)
            .filter(|(_, process)| matches_server(process.name(), process.exe(), server, mode))
            .map(|(pid, _)| pid.as_u32())
            .collect()
    }

    fn wait_for_exit(pids: &[Pid], limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        let mut system = System::new();
        loop {
            system.refresh_processes(ProcessesToUpdate::Some(pids), true);
            // A killed child nobody has reaped yet is gone for our purposes.
            let exited = pids.iter().all(|pid| {
                system
                    .process(*pid)
                    .is_none_or(|process| process.status() == ProcessStatus::Zombie)
            });
            if exited {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
    }
}

#[async_trait]
impl ProcessControl for SystemProcessController {
    #[tracing::instrument(skip(self, server), fields(server = %server.name))]
    async fn is_running(&self, server: &ServerDescriptor) -> Result<ProcessSnapshot> {
        let server = server.clone();
        let mode = self.mode;
        let pids = blocking(move || {
            let mut system = System::new();
            system.refresh_processes(ProcessesToUpdate::All, true);
            Self::matching_pids(&system, &server, mode)
        })
        .await?;

        tracing::debug!(pids = ?pids, "Process table queried");
        Ok(ProcessSnapshot::from_pids(pids))
    }

    async fn sample_usage(&self, pids: &BTreeSet<u32>, window: Duration) -> Result<ResourceUsage> {
        if pids.is_empty() {
            return Ok(ResourceUsage::default());
        }

        let pids: Vec<Pid> = pids.iter().map(|&pid| Pid::from_u32(pid)).collect();
        // The baseline reading; the second refresh computes usage against it.
        // Both refresh the whole table: sysinfo only derives per-process CPU
        // on Linux from a full refresh.
        let system = blocking(|| {
            let mut system = System::new();
            system.refresh_processes(ProcessesToUpdate::All, true);
            system
        })
        .await?;

        tokio::time::sleep(window).await;

        blocking(move || {
            let mut system = system;
            system.refresh_processes(ProcessesToUpdate::All, true);

            let mut memory_bytes = 0u64;
            let mut cpu = Vec::with_capacity(pids.len());
            for pid in &pids {
                if let Some(process) = system.process(*pid) {
                    memory_bytes += process.memory();
                    cpu.push(process.cpu_usage());
                } else {
                    tracing::trace!(pid = pid.as_u32(), "Process exited during sample");
                }
            }

            ResourceUsage {
                memory_bytes,
                cpu_percent: combined_cpu_percent(&cpu, logical_core_count()),
            }
        })
        .await
    }

    #[tracing::instrument(skip(self, server), fields(server = %server.name))]
    async fn stop(&self, server: &ServerDescriptor) -> Result<StopOutcome> {
        let name = server.name.clone();
        let server = server.clone();
        let mode = self.mode;

        blocking(move || {
            let mut system = System::new();
            system.refresh_processes(ProcessesToUpdate::All, true);
            let pids = Self::matching_pids(&system, &server, mode);
            if pids.is_empty() {
                tracing::debug!("No matching process; nothing to stop");
                return Ok(StopOutcome::NotRunning);
            }

            let mut killed = Vec::with_capacity(pids.len());
            for pid in pids {
                let pid = Pid::from_u32(pid);
                // Already gone counts as stopped.
                let Some(process) = system.process(pid) else {
                    continue;
                };
                if !process.kill() {
                    tracing::error!(pid = pid.as_u32(), "Failed to kill process");
                    return Err(Error::Process(format!(
                        "Failed to stop process {} for '{}'",
                        pid, name
                    )));
                }
                tracing::info!(pid = pid.as_u32(), "Killed process");
                killed.push(pid);
            }

            if !Self::wait_for_exit(&killed, EXIT_WAIT) {
                tracing::warn!(count = killed.len(), "Killed processes still present after waiting");
            }
            Ok(StopOutcome::Stopped {
                count: killed.len(),
            })
        })
        .await?
    }

    #[tracing::instrument(skip(self, server), fields(server = %server.name))]
    async fn start(&self, server: &ServerDescriptor) -> Result<u32> {
        let command_line = server.start_command.trim();
        if command_line.is_empty() {
            return Err(Error::StartCommandMissing(server.name.clone()));
        }

        let child = shell_command(command_line, server.working_directory())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to spawn start command");
                Error::Process(format!("Failed to start '{}': {}", server.name, e))
            })?;

        // Dropping the handle leaves the server running detached.
        let pid = child.id();
        tracing::info!(pid, "Start command launched");
        Ok(pid)
    }
}
