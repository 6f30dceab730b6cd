/// Server roster and process control for the game server manager.
///
/// This module holds the static roster of managed servers, the per-server
/// locks that serialize lifecycle operations, and the process controller that
/// inspects, starts and kills the OS processes backing each server.
///
/// # Components
///
/// * `registry` - Case-insensitive roster lookup and per-server locks
/// * `process` - Liveness checks, resource sampling, start and forceful stop
///
/// # Examples
///
/// Checking whether a server is running:
///
/// ```no_run
/// use game_server_manager::config::{ProcessMatchMode, ServerDescriptor};
/// use game_server_manager::server::{ProcessControl, SystemProcessController};
///
/// # async fn run(server: ServerDescriptor) -> game_server_manager::Result<()> {
/// let controller = SystemProcessController::new(ProcessMatchMode::ImageName);
/// let snapshot = controller.is_running(&server).await?;
/// println!("{} running: {} ({:?})", server.name, snapshot.running, snapshot.pids);
/// # Ok(())
/// # }
/// ```
mod process;
pub mod registry;

pub use process::{
    ProcessControl, ProcessSnapshot, ResourceUsage, SAMPLE_WINDOW, StopOutcome,
    SystemProcessController, combined_cpu_percent, matches_server,
};
pub(crate) use process::{kill_process_tree, shell_command};
pub use registry::{ServerLocks, ServerRegistry, same_name};
