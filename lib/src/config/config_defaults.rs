// lib/src/config/config_defaults.rs

pub const ENV_PREFIX: &str = "MEDCONNECT";
pub const ENV_SEPARATOR: &str = "__";
pub const DEFAULT_CONFIG_FILE: &str = "config/medconnect.yaml";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8082;
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;

pub const DEFAULT_LOG_LIMIT: usize = 50;

pub fn default_host() -> String { DEFAULT_HOST.to_string() }
pub fn default_port() -> u16 { DEFAULT_PORT }
pub fn default_token_ttl_hours() -> i64 { DEFAULT_TOKEN_TTL_HOURS }
pub fn default_connection_message_min_len() -> usize { 10 }
pub fn default_accept_message_min_len() -> usize { 5 }
pub fn default_reject_reason_min_len() -> usize { 10 }
pub fn default_block_reason_min_len() -> usize { 10 }
pub fn default_revoke_reason_min_len() -> usize { 10 }
pub fn default_audit_admin_access() -> bool { true }
pub fn default_log_limit() -> usize { DEFAULT_LOG_LIMIT }
