// models/src/lib.rs

//! Shared types for the consent and access-control core: the entities the
//! ledger persists, their typed identifiers, the events it emits and the
//! error taxonomy every layer speaks.

pub mod errors;
pub mod events;
pub mod identifiers;
pub mod medical;

pub use errors::{LedgerError, LedgerResult, ValidationError};
pub use events::LedgerEvent;
pub use identifiers::{AccessLogId, ConnectionId, ConsentId, RecordId, UserId};
pub use medical::*;
