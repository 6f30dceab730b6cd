use crate::config::{Config, GatewayConfig, ServerDescriptor};
use crate::error::{Error, Result};
use std::collections::HashSet;

/// Validates a single server descriptor, appending any problems to `errors`.
///
/// Empty start and update commands are allowed here: the `start` and `update`
/// commands report them when they are used.
pub fn validate_server(server: &ServerDescriptor, errors: &mut Vec<String>) {
    let name = server.name.trim();

    if server.install_location.as_os_str().is_empty() {
        errors.push(format!("Server '{}' is missing installLocation.", name));
    } else if !server.install_location.is_dir() {
        errors.push(format!(
            "installLocation '{}' for server '{}' does not exist.",
            server.install_location.display(),
            name
        ));
    }

    if server.save_directory.as_os_str().is_empty() {
        errors.push(format!("Server '{}' is missing saveDirectory.", name));
    } else if !server.save_directory.is_dir() {
        errors.push(format!(
            "saveDirectory '{}' for server '{}' does not exist.",
            server.save_directory.display(),
            name
        ));
    }

    if server.executable_name.trim().is_empty() {
        errors.push(format!("Server '{}' is missing executableName.", name));
    }

    if server.start_command.trim().is_empty() {
        tracing::warn!(server = %name, "No startCommand configured; start will be refused");
    }
    if server.update_command.trim().is_empty() {
        tracing::warn!(server = %name, "No updateCommand configured; update will be refused");
    }
}

/// Validates the roster: non-empty, unique (case-insensitive) names, and each
/// descriptor individually.
pub fn validate_servers(servers: &[ServerDescriptor], errors: &mut Vec<String>) {
    if servers.is_empty() {
        errors.push("No servers are configured.".to_string());
        return;
    }

    let mut names = HashSet::new();
    for server in servers {
        let name = server.name.trim();
        if name.is_empty() {
            errors.push("A server is missing a name.".to_string());
        } else if !names.insert(name.to_lowercase()) {
            errors.push(format!("Duplicate server name found: '{}'", name));
        }
        validate_server(server, errors);
    }
}

fn validate_gateway(gateway: &GatewayConfig, errors: &mut Vec<String>) {
    if gateway.port == 0 {
        errors.push("gateway.port must not be 0.".to_string());
    }
    if gateway.workers == Some(0) {
        errors.push("gateway.workers must be at least 1.".to_string());
    }
    let bearer = gateway
        .authenticate
        .as_ref()
        .and_then(|auth| auth.bearer.as_ref());
    if let Some(bearer) = bearer {
        if bearer.token.trim().is_empty() {
            errors.push("gateway bearer token is empty.".to_string());
        }
    }
}

/// Full configuration validation.
///
/// Collects every problem instead of stopping at the first one. A manager must
/// never serve commands against a configuration that fails here.
///
/// # Errors
///
/// Returns [`Error::ConfigValidation`] listing all problems found.
pub fn validate_config(config: &Config) -> Result<()> {
    let mut errors = Vec::new();

    validate_servers(&config.servers, &mut errors);

    if config.backup_location.as_os_str().is_empty() {
        errors.push("backupLocation is not set.".to_string());
    } else if !config.backup_location.is_dir() {
        errors.push(format!(
            "backupLocation '{}' does not exist.",
            config.backup_location.display()
        ));
    }

    if config.command_prefix.trim().is_empty() || config.command_prefix.contains(char::is_whitespace) {
        errors.push("commandPrefix must be a single non-empty token.".to_string());
    }
    if config.update_timeout_secs == 0 {
        errors.push("updateTimeoutSecs must be greater than 0.".to_string());
    }
    if config.output_window_lines == 0 {
        errors.push("outputWindowLines must be greater than 0.".to_string());
    }
    if let Some(gateway) = &config.gateway {
        validate_gateway(gateway, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        for error in &errors {
            tracing::error!(%error, "Config validation error");
        }
        Err(Error::ConfigValidation(errors))
    }
}
