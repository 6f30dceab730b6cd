use crate::server::ResourceUsage;

const KIB: u64 = 1024;
const MIB: u64 = KIB * 1024;
const GIB: u64 = MIB * 1024;

/// Formats a byte count with a binary unit.
///
/// Below 1024 the raw count is shown in `B`; above that the value is scaled to
/// `KB`, `MB` or `GB` with two decimals.
///
/// ```
/// use game_server_manager::command::format_bytes;
///
/// assert_eq!(format_bytes(1023), "1023 B");
/// assert_eq!(format_bytes(1024), "1.00 KB");
/// assert_eq!(format_bytes(1_048_576), "1.00 MB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    if bytes < KIB {
        format!("{} B", bytes)
    } else if bytes < MIB {
        format!("{:.2} KB", bytes as f64 / KIB as f64)
    } else if bytes < GIB {
        format!("{:.2} MB", bytes as f64 / MIB as f64)
    } else {
        format!("{:.2} GB", bytes as f64 / GIB as f64)
    }
}

/// Observed state of one server for a status report.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerState {
    /// Processes found; usage is absent if sampling failed
    Running(Option<ResourceUsage>),
    /// No matching process
    Stopped,
    /// The process table could not be read
    Unknown(String),
}

/// One line of a status report.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    /// Server name
    pub name: String,
    /// Observed state
    pub state: ServerState,
}

impl StatusLine {
    /// Renders `- <name>: running | RAM: <ram> | CPU: <pct>%` or `- <name>: stopped`.
    pub fn render(&self) -> String {
        match &self.state {
            ServerState::Running(Some(usage)) => format!(
                "- {}: running | RAM: {} | CPU: {:.1}%",
                self.name,
                format_bytes(usage.memory_bytes),
                usage.cpu_percent
            ),
            ServerState::Running(None) => format!("- {}: running", self.name),
            ServerState::Stopped => format!("- {}: stopped", self.name),
            ServerState::Unknown(reason) => format!("- {}: unknown ({})", self.name, reason),
        }
    }
}

/// Renders the consolidated report sent for a status command.
pub fn render_status_report(lines: &[StatusLine]) -> String {
    let body = lines
        .iter()
        .map(StatusLine::render)
        .collect::<Vec<_>>()
        .join("\n");
    format!("Server status:\n{}", body)
}
