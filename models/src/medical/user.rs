// models/src/medical/user.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifiers::UserId;
use crate::medical::role::UserRole;

/// The caller as vouched for by the identity provider. The core trusts `id`
/// and `role` as given and never verifies them independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub role: UserRole,
    pub email: String,
    pub is_verified: bool,
}

impl Identity {
    pub fn new(id: UserId, role: UserRole, email: impl Into<String>) -> Self {
        Identity { id, role, email: email.into(), is_verified: true }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// True when the caller is `subject` or holds an admin role.
    pub fn is_self_or_admin(&self, subject: &UserId) -> bool {
        self.id == *subject || self.is_admin()
    }
}

/// Local mirror of a user account, synced from the identity provider so the
/// ledger can check that referenced users exist and carry the right role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub first: String,
    pub last: String,
    pub email: String,
    pub role: UserRole,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(first: impl Into<String>, last: impl Into<String>, email: impl Into<String>, role: UserRole) -> Self {
        let now = Utc::now();
        User {
            id: UserId::new(),
            first: first.into(),
            last: last.into(),
            email: email.into(),
            role,
            is_verified: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first, self.last)
    }

    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id,
            role: self.role,
            email: self.email.clone(),
            is_verified: self.is_verified,
        }
    }
}
