// rest_api/src/config.rs

use std::path::Path;

use anyhow::{bail, Result};
use consent_core::{load_app_config, AppConfig, StorageConfig};
use security::RolesConfig;
use tracing::{info, warn};

/// Everything the HTTP server needs at startup.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub app: AppConfig,
    pub roles: RolesConfig,
}

/// Command-line values that take precedence over file and environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub in_memory: bool,
}

/// Loads the application config, applies CLI overrides and resolves the
/// role table. A server without a signing secret refuses to start.
pub fn load_settings(config_path: Option<&Path>, overrides: Overrides) -> Result<ApiSettings> {
    let mut app = load_app_config(config_path)?;

    if let Some(host) = overrides.host {
        app.server.host = host;
    }
    if let Some(port) = overrides.port {
        app.server.port = port;
    }
    if overrides.in_memory {
        warn!("Running on in-memory storage; nothing will survive a restart");
        app.storage = StorageConfig::in_memory();
    }

    if app.server.jwt_secret.trim().is_empty() {
        bail!("server.jwt_secret is not set (use MEDCONNECT__SERVER__JWT_SECRET)");
    }

    let roles = match &app.roles_file {
        Some(path) => {
            info!("Loading role permissions from {}", path.display());
            RolesConfig::from_yaml_file(path)?
        }
        None => RolesConfig::default(),
    };

    Ok(ApiSettings { app, roles })
}

#[cfg(test)]
mod tests {
    use super::*;
    use consent_core::StorageEngineType;
    use models::medical::UserRole;
    use std::io::Write;

    fn write_yaml(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(file, "{content}").unwrap();
        file
    }

    #[test]
    fn missing_secret_is_fatal() {
        let file = write_yaml("server:\n  port: 9000\n");
        let err = load_settings(Some(file.path()), Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("jwt_secret"));
    }

    #[test]
    fn overrides_win_over_file() {
        let file = write_yaml("server:\n  port: 9000\n  jwt_secret: file-secret\n");
        let overrides = Overrides { host: Some("0.0.0.0".into()), port: Some(9100), in_memory: true };
        let settings = load_settings(Some(file.path()), overrides).unwrap();
        assert_eq!(settings.app.server.bind_address(), "0.0.0.0:9100");
        assert_eq!(settings.app.storage.engine_type, StorageEngineType::InMemory);
        assert!(settings.roles.has_permission(UserRole::Patient, "consent:create"));
    }

    #[test]
    fn roles_file_replaces_defaults() {
        let roles = write_yaml("roles:\n  patient:\n    permissions: [\"consent:read\"]\n");
        let config = write_yaml(&format!(
            "server:\n  jwt_secret: s3cret\nroles_file: {}\n",
            roles.path().display()
        ));
        let settings = load_settings(Some(config.path()), Overrides::default()).unwrap();
        assert!(!settings.roles.has_permission(UserRole::Patient, "consent:create"));
        assert!(settings.roles.has_permission(UserRole::Patient, "consent:read"));
    }
}
