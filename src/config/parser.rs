use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default control token every command must start with.
pub const DEFAULT_COMMAND_PREFIX: &str = "!sm";

/// Default file name of the persisted running-set.
pub const DEFAULT_STATE_FILE: &str = "last_running_servers.json";

/// Default number of Actix Web workers for the command gateway.
pub const DEFAULT_WORKERS: usize = 2;

/// Static description of one managed game server.
///
/// Descriptors are loaded once from configuration and never change while the
/// manager runs. The `name` is the case-insensitive key used by commands.
///
/// # Examples
///
/// ```
/// use game_server_manager::config::ServerDescriptor;
///
/// let server = ServerDescriptor {
///     name: "Valheim".to_string(),
///     install_location: "/srv/valheim".into(),
///     save_directory: "/srv/valheim/worlds".into(),
///     start_command: "./start_server.sh".to_string(),
///     update_command: "steamcmd +app_update 896660 +quit".to_string(),
///     executable_name: "valheim_server.x86_64".to_string(),
/// };
/// assert_eq!(server.executable_stem(), "valheim_server");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDescriptor {
    /// Unique, case-insensitive server name.
    #[serde(alias = "Name")]
    pub name: String,

    /// Directory the start and update commands run in.
    #[serde(default, alias = "InstallLocation")]
    pub install_location: PathBuf,

    /// Directory archived by the backup command.
    #[serde(default, alias = "SaveDirectory")]
    pub save_directory: PathBuf,

    /// Shell command line that launches the server.
    #[serde(default, alias = "StartCommand")]
    pub start_command: String,

    /// Shell command line that updates the server installation.
    #[serde(default, alias = "UpdateCommand")]
    pub update_command: String,

    /// Image name of the server process, e.g. `valheim_server.exe`.
    #[serde(default, alias = "ExecutableName")]
    pub executable_name: String,
}

impl ServerDescriptor {
    /// The executable name without directory or extension.
    ///
    /// This is the key the process table is matched against.
    pub fn executable_stem(&self) -> &str {
        let name = self.executable_name.trim();
        Path::new(name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(name)
    }

    /// The working directory for launched commands, if one is configured.
    pub fn working_directory(&self) -> Option<&Path> {
        if self.install_location.as_os_str().is_empty() {
            None
        } else {
            Some(self.install_location.as_path())
        }
    }
}

/// How OS processes are attributed to a server.
///
/// Matching is always by image name. `ImageNameInInstallDir` trades recall for
/// precision by also requiring the executable to live under the server's
/// install directory, which stops an unrelated process with the same image
/// name from being reported (or killed) as the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProcessMatchMode {
    /// Any process with the configured image name belongs to the server.
    #[default]
    ImageName,
    /// The image name must match and the executable must sit under the install directory.
    ImageNameInInstallDir,
}

/// Bearer token authentication for the command gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BearerAuthConfig {
    /// Token every request must present as `Authorization: Bearer <token>`.
    pub token: String,
}

/// Authentication settings for the command gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Bearer token authentication, if enabled.
    pub bearer: Option<BearerAuthConfig>,
}

/// Settings for the HTTP command gateway.
///
/// The gateway is the chat transport: it accepts command messages over HTTP and
/// streams every status update to subscribers as Server-Sent Events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Address to bind to.
    #[serde(default = "default_address")]
    pub address: String,

    /// Port to bind to.
    pub port: u16,

    /// Optional authentication.
    pub authenticate: Option<AuthConfig>,

    /// Number of Actix Web workers; defaults to [`DEFAULT_WORKERS`].
    pub workers: Option<usize>,
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_prefix() -> String {
    DEFAULT_COMMAND_PREFIX.to_string()
}

fn default_state_file() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_FILE)
}

fn default_update_timeout_secs() -> u64 {
    3600
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

fn default_output_window_lines() -> usize {
    15
}

/// Main configuration for the game server manager.
///
/// # JSON Schema
///
/// ```json
/// {
///   "servers": [
///     {
///       "name": "Valheim",
///       "installLocation": "/srv/valheim",
///       "saveDirectory": "/srv/valheim/worlds",
///       "startCommand": "./start_server.sh",
///       "updateCommand": "./update.sh",
///       "executableName": "valheim_server.x86_64"
///     }
///   ],
///   "backupLocation": "/srv/backups",
///   "autoRestartServersOnBoot": true,
///   "gateway": { "port": 8090, "authenticate": { "bearer": { "token": "secret" } } }
/// }
/// ```
///
/// The PascalCase keys of older configuration files (`Servers`,
/// `BackupLocation`, `InstallLocation`, ...) are accepted as well.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// The managed roster, in display order.
    #[serde(default, alias = "Servers")]
    pub servers: Vec<ServerDescriptor>,

    /// Directory backup archives are written to.
    #[serde(default, alias = "BackupLocation")]
    pub backup_location: PathBuf,

    /// Restart the servers recorded in the running-set when the manager boots.
    #[serde(default, alias = "AutoRestartServersOnBoot")]
    pub auto_restart_servers_on_boot: bool,

    /// Control token that prefixes every command.
    #[serde(default = "default_prefix")]
    pub command_prefix: String,

    /// Location of the persisted running-set, relative to the working directory
    /// unless absolute.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// How OS processes are attributed to servers.
    #[serde(default)]
    pub process_match: ProcessMatchMode,

    /// Seconds an update command may run before it is killed.
    #[serde(default = "default_update_timeout_secs")]
    pub update_timeout_secs: u64,

    /// Seconds in-flight operations get to finish when the manager shuts down.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Number of update output lines kept in the rolling window.
    #[serde(default = "default_output_window_lines")]
    pub output_window_lines: usize,

    /// HTTP command gateway, if enabled.
    #[serde(default)]
    pub gateway: Option<GatewayConfig>,
}

impl Config {
    /// Loads a configuration from a file path.
    ///
    /// Files ending in `.yaml` or `.yml` are parsed as YAML, everything else as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigParse`] if the file cannot be read or does not
    /// conform to the expected schema.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "Loading configuration");
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigParse(format!("Failed to read config file: {}", e)))?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let config = if is_yaml {
            Self::parse_from_yaml_str(&content)?
        } else {
            Self::parse_from_str(&content)?
        };
        tracing::info!(servers = config.servers.len(), "Configuration loaded");
        Ok(config)
    }

    /// Parses a configuration from a JSON string.
    pub fn parse_from_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse JSON config: {}", e)))
    }

    /// Parses a configuration from a YAML string.
    pub fn parse_from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse YAML config: {}", e)))
    }

    /// Update timeout as a [`Duration`].
    pub fn update_timeout(&self) -> Duration {
        Duration::from_secs(self.update_timeout_secs)
    }

    /// Shutdown grace period as a [`Duration`].
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
