// models/src/medical/mod.rs

pub mod access_log;
pub mod connection;
pub mod consent;
pub mod role;
pub mod user;

pub use access_log::{AccessAction, AccessLog, AccessMetadata, AccessResult};
pub use connection::{Connection, ConnectionStatus, ConnectionType};
pub use consent::{Consent, ConsentPatch, ConsentPermission, ConsentStatus, ConsentType};
pub use role::UserRole;
pub use user::{Identity, User};
