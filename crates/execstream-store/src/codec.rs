//! JSON encoding of typed resources over a byte store.

use execstream_core::traits::{ResourceKind, ResourceStore, StoreError};
use serde::{Serialize, de::DeserializeOwned};

/// Load and decode `kind/id`.
///
/// # Errors
/// Returns an error if the backend fails or the stored bytes do not decode.
pub async fn load<T: DeserializeOwned>(
    store: &dyn ResourceStore,
    kind: ResourceKind,
    id: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(kind, id).await? {
        Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
        None => Ok(None),
    }
}

/// Encode and store `value` under `kind/id`.
///
/// # Errors
/// Returns an error if encoding or the backend fails.
pub async fn save<T: Serialize + Sync>(
    store: &dyn ResourceStore,
    kind: ResourceKind,
    id: &str,
    value: &T,
) -> Result<(), StoreError> {
    let data = serde_json::to_vec(value)?;
    store.save(kind, id, data).await
}

/// Load and decode every value of `kind`.
///
/// Entries that fail to decode are skipped with a warning so one corrupt
/// record does not hide the rest.
///
/// # Errors
/// Returns an error if the backend fails.
pub async fn list<T: DeserializeOwned>(
    store: &dyn ResourceStore,
    kind: ResourceKind,
) -> Result<Vec<T>, StoreError> {
    let entries = store.list(kind).await?;
    Ok(entries
        .iter()
        .filter_map(|data| match serde_json::from_slice(data) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(kind = %kind, error = %e, "Skipping undecodable entry");
                None
            }
        })
        .collect())
}
