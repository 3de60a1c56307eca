// lib/src/config/config_structs.rs

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::config_defaults::*;
use crate::storage_engine::StorageConfig;

/// Tunables for the ledger's business rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub connection_message_min_len: usize,
    pub accept_message_min_len: usize,
    pub reject_reason_min_len: usize,
    pub block_reason_min_len: usize,
    pub revoke_reason_min_len: usize,
    /// Record an access-log row when an administrator reads patient data.
    pub audit_admin_access: bool,
    pub default_log_limit: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig {
            connection_message_min_len: default_connection_message_min_len(),
            accept_message_min_len: default_accept_message_min_len(),
            reject_reason_min_len: default_reject_reason_min_len(),
            block_reason_min_len: default_block_reason_min_len(),
            revoke_reason_min_len: default_revoke_reason_min_len(),
            audit_admin_access: default_audit_admin_access(),
            default_log_limit: default_log_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// HMAC secret for bearer tokens. Must be set outside of tests.
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: default_host(),
            port: default_port(),
            jwt_secret: String::new(),
            token_ttl_hours: default_token_ttl_hours(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub policy: PolicyConfig,
    pub server: ServerConfig,
    /// YAML file mapping roles to permissions. Built-in defaults apply when unset.
    pub roles_file: Option<PathBuf>,
}
