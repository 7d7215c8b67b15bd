// System
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

// Third Party
use sha2::{Digest, Sha256};
use tokio::time::{Duration, Instant};
use tracing::{debug, info};

// Local
use crate::error::FetchError;
use crate::reader::{AppDesiredState, DesiredStateReader};

/// The last successful read of one spreadsheet range.
#[derive(Clone, Debug)]
pub struct CachedRead {
    pub records: Vec<AppDesiredState>,
    pub fetched_at: Instant,
    /// Hex encoded SHA-256 of the records, in order.
    pub digest: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct CacheKey {
    spreadsheet_id: String,
    cell_range: String,
}

impl CacheKey {
    fn new(spreadsheet_id: &str, cell_range: &str) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.to_string(),
            cell_range: cell_range.to_string(),
        }
    }
}

/// Reuses the last successful read of a range until it is `ttl` old, so that reconciliations
/// triggered close together do not hit the sheets API every time.
#[derive(Default)]
pub struct DesiredStateCache {
    // Never held across an await.
    reads: Mutex<HashMap<CacheKey, CachedRead>>,
}

impl DesiredStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached records for the range if they are younger than `ttl`, otherwise read the
    /// range again. A failed read is returned as is and the previous snapshot is kept. A
    /// successful read drops every snapshot older than `ttl`.
    pub async fn get(
        &self,
        reader: &DesiredStateReader,
        spreadsheet_id: &str,
        cell_range: &str,
        ttl: Duration,
        now: Instant,
    ) -> Result<Vec<AppDesiredState>, FetchError> {
        let key = CacheKey::new(spreadsheet_id, cell_range);
        let previous_digest = {
            let reads = self.reads.lock().unwrap_or_else(PoisonError::into_inner);
            match reads.get(&key) {
                Some(cached) if now.saturating_duration_since(cached.fetched_at) < ttl => {
                    debug!(
                        "Using desired state of {} - {} cached {:?} ago",
                        spreadsheet_id,
                        cell_range,
                        now.saturating_duration_since(cached.fetched_at)
                    );
                    return Ok(cached.records.clone());
                }
                Some(cached) => Some(cached.digest.clone()),
                None => None,
            }
        };

        let records = reader.fetch(spreadsheet_id, cell_range).await?;
        let digest = digest(&records);
        if previous_digest.as_deref() != Some(digest.as_str()) {
            info!(
                "Desired state of {} - {} is now {} app(s), digest {}",
                spreadsheet_id,
                cell_range,
                records.len(),
                digest
            );
        }
        let mut reads = self.reads.lock().unwrap_or_else(PoisonError::into_inner);
        // Ranges no SheetSync has asked for within `ttl` would only be read again anyway.
        reads.retain(|_, cached| now.saturating_duration_since(cached.fetched_at) < ttl);
        reads.insert(
            key,
            CachedRead {
                records: records.clone(),
                fetched_at: now,
                digest,
            },
        );
        Ok(records)
    }

    /// The current snapshot for a range, fresh or not.
    pub fn snapshot(&self, spreadsheet_id: &str, cell_range: &str) -> Option<CachedRead> {
        self.reads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&CacheKey::new(spreadsheet_id, cell_range))
            .cloned()
    }
}

fn digest(records: &[AppDesiredState]) -> String {
    let mut hasher = Sha256::new();
    for record in records {
        hasher.update(record.name.as_bytes());
        hasher.update([0]);
        hasher.update(record.image.as_bytes());
        hasher.update([0]);
        hasher.update(record.replicas.to_be_bytes());
    }
    hex::encode(hasher.finalize())
}
