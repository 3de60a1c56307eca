// lib/src/storage_engine/storage_utils.rs

use bincode::config::{self, BigEndian, Configuration, Fixint};
use bincode::serde::{decode_from_slice, encode_to_vec};
use chrono::{DateTime, Utc};
use models::errors::{LedgerError, LedgerResult};
use models::identifiers::UserId;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const ID_LEN: usize = 16;
const SIGN_BIT: u64 = 1 << 63;

pub fn bincode_config() -> Configuration<BigEndian, Fixint> {
    config::standard().with_big_endian().with_fixed_int_encoding()
}

pub fn serialize<T: Serialize>(value: &T) -> LedgerResult<Vec<u8>> {
    encode_to_vec(value, bincode_config()).map_err(LedgerError::from)
}

pub fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> LedgerResult<T> {
    decode_from_slice(bytes, bincode_config())
        .map(|(value, _)| value)
        .map_err(LedgerError::from)
}

/// Canonical form of an unordered participant pair: the smaller id first.
pub fn unordered_pair(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b { (a, b) } else { (b, a) }
}

pub fn pair_key(a: &UserId, b: &UserId) -> Vec<u8> {
    let (first, second) = unordered_pair(*a, *b);
    ordered_pair_key(&first, &second)
}

/// Key for an ordered pair, used by the (patient, doctor) active slot.
pub fn ordered_pair_key(first: &UserId, second: &UserId) -> Vec<u8> {
    let mut key = Vec::with_capacity(ID_LEN * 2);
    key.extend_from_slice(first.as_bytes());
    key.extend_from_slice(second.as_bytes());
    key
}

/// Microseconds since the epoch with the sign bit flipped so that the
/// big-endian bytes sort in time order, including before 1970.
pub fn time_bytes(at: &DateTime<Utc>) -> [u8; 8] {
    ((at.timestamp_micros() as u64) ^ SIGN_BIT).to_be_bytes()
}

/// Secondary index key: owner ‖ time ‖ row id. A prefix scan on the owner
/// walks rows in time order.
pub fn index_key(owner: &[u8; ID_LEN], at: &DateTime<Utc>, row: &[u8; ID_LEN]) -> Vec<u8> {
    let mut key = Vec::with_capacity(ID_LEN * 2 + 8);
    key.extend_from_slice(owner);
    key.extend_from_slice(&time_bytes(at));
    key.extend_from_slice(row);
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn pair_key_ignores_order() {
        let a = UserId::new();
        let b = UserId::new();
        assert_eq!(pair_key(&a, &b), pair_key(&b, &a));
        assert_ne!(ordered_pair_key(&a, &b), ordered_pair_key(&b, &a));
    }

    #[test]
    fn index_keys_sort_by_time() {
        let owner = UserId::new();
        let now = Utc::now();
        let earlier = index_key(owner.as_bytes(), &(now - Duration::days(365 * 60)), UserId::new().as_bytes());
        let later = index_key(owner.as_bytes(), &now, UserId::new().as_bytes());
        assert!(earlier < later);
    }

    #[test]
    fn bincode_helpers_round_trip_entities() {
        let user = models::medical::User::new("Ada", "Lovelace", "ada@example.com", models::medical::UserRole::Doctor);
        let bytes = serialize(&user).unwrap();
        let decoded: models::medical::User = deserialize(&bytes).unwrap();
        assert_eq!(decoded, user);
    }
}
