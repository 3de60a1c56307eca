// security/src/roles.rs
use anyhow::{Context, Result};
use models::medical::UserRole;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const SUPERUSER: &str = "superuser";

pub mod permissions {
    pub const CONSENT_CREATE: &str = "consent:create";
    pub const CONSENT_READ: &str = "consent:read";
    pub const CONSENT_UPDATE: &str = "consent:update";
    pub const CONNECTION_CREATE: &str = "connection:create";
    pub const CONNECTION_RESPOND: &str = "connection:respond";
    pub const RECORDS_ACCESS: &str = "records:access";
    pub const AUDIT_READ: &str = "audit:read";
    pub const ADMIN_STATS: &str = "admin:stats";
    pub const ADMIN_CONNECTIONS: &str = "admin:connections";
    pub const ADMIN_USERS: &str = "admin:users";
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RoleConfig {
    pub permissions: Vec<String>,
}

/// Coarse route-level permissions per role. Fine-grained decisions (whose
/// consent, whose record) stay with the ledger.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RolesConfig {
    pub roles: HashMap<UserRole, RoleConfig>,
}

impl RolesConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: RolesConfig = serde_yaml::from_str(content).context("Invalid roles YAML")?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read roles file {}", path.display()))?;
        Self::from_yaml_str(&content)
    }

    pub fn get_role_config(&self, role: UserRole) -> Option<&RoleConfig> {
        self.roles.get(&role)
    }

    pub fn has_permission(&self, role: UserRole, permission_name: &str) -> bool {
        self.get_role_config(role).is_some_and(|role_cfg| {
            role_cfg.permissions.iter().any(|p| p == permission_name || p == SUPERUSER)
        })
    }
}

impl Default for RolesConfig {
    fn default() -> Self {
        use permissions::*;
        let patient = vec![
            CONSENT_CREATE,
            CONSENT_READ,
            CONSENT_UPDATE,
            CONNECTION_CREATE,
            CONNECTION_RESPOND,
            RECORDS_ACCESS,
            AUDIT_READ,
        ];
        let doctor = vec![CONSENT_READ, CONSENT_UPDATE, CONNECTION_CREATE, CONNECTION_RESPOND, RECORDS_ACCESS];
        let admin = vec![
            CONSENT_READ,
            CONSENT_UPDATE,
            CONNECTION_RESPOND,
            RECORDS_ACCESS,
            AUDIT_READ,
            ADMIN_STATS,
            ADMIN_CONNECTIONS,
            ADMIN_USERS,
        ];
        let to_config = |perms: Vec<&str>| RoleConfig { permissions: perms.into_iter().map(String::from).collect() };
        let roles = HashMap::from([
            (UserRole::Patient, to_config(patient)),
            (UserRole::Doctor, to_config(doctor)),
            (UserRole::Admin, to_config(admin)),
            (UserRole::SuperAdmin, to_config(vec![SUPERUSER])),
        ]);
        RolesConfig { roles }
    }
}

#[cfg(test)]
mod tests {
    use super::permissions::*;
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_follow_roles() {
        let roles = RolesConfig::default();
        assert!(roles.has_permission(UserRole::Patient, CONSENT_CREATE));
        assert!(!roles.has_permission(UserRole::Doctor, CONSENT_CREATE));
        assert!(!roles.has_permission(UserRole::Patient, ADMIN_STATS));
        assert!(roles.has_permission(UserRole::Admin, ADMIN_STATS));
        assert!(roles.has_permission(UserRole::SuperAdmin, "anything:at-all"));
    }

    #[test]
    fn loads_from_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "roles:\n  patient:\n    permissions: [\"consent:read\"]\n  doctor:\n    permissions: []\n"
        )
        .unwrap();
        let roles = RolesConfig::from_yaml_file(file.path()).unwrap();
        assert!(roles.has_permission(UserRole::Patient, CONSENT_READ));
        assert!(!roles.has_permission(UserRole::Patient, CONSENT_CREATE));
        assert!(!roles.has_permission(UserRole::Admin, CONSENT_READ));
    }

    #[test]
    fn shipped_roles_file_matches_defaults() {
        let shipped = RolesConfig::from_yaml_str(include_str!("../roles_permissions.yaml")).unwrap();
        assert_eq!(shipped, RolesConfig::default());
    }

    #[test]
    fn unknown_role_names_are_rejected() {
        assert!(RolesConfig::from_yaml_str("roles:\n  janitor:\n    permissions: []\n").is_err());
    }
}
