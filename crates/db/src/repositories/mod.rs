//! SQL implementations of the storage ports defined in
//! `repairflow_core::store`. In-memory doubles live next to the ports in
//! the core crate; only the SQLite-backed repositories live here.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use repairflow_core::errors::StoreError;

pub mod repair;
pub mod withdrawal;

pub use repair::SqlRepairRepository;
pub use withdrawal::SqlWithdrawalQueueRepository;

pub(crate) fn db_err(error: sqlx::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

pub(crate) fn decode_err(message: impl Into<String>) -> StoreError {
    StoreError::Decode(message.into())
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value)
        .map_err(|error| StoreError::Backend(format!("could not encode record: {error}")))
}

pub(crate) fn from_json<T: DeserializeOwned>(raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|error| decode_err(error.to_string()))
}

pub(crate) fn opt_to_json<T: Serialize>(value: &Option<T>) -> Result<Option<String>, StoreError> {
    value.as_ref().map(to_json).transpose()
}

pub(crate) fn opt_from_json<T: DeserializeOwned>(
    raw: Option<String>,
) -> Result<Option<T>, StoreError> {
    raw.as_deref().map(from_json).transpose()
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| decode_err(format!("bad timestamp `{raw}`: {error}")))
}

pub(crate) fn opt_parse_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.as_deref().map(parse_ts).transpose()
}
