//! Primary store with an optional secondary network used only when the primary is unreachable.

use log::warn;

use super::{BlobStore, StorageError, StoreOptions};
use crate::models::BlobRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreTier {
    Primary,
    Secondary,
}

pub struct TieredBlobStore {
    primary: BlobStore,
    secondary: Option<BlobStore>,
}

impl TieredBlobStore {
    pub fn new(primary: BlobStore, secondary: Option<BlobStore>) -> Self {
        Self { primary, secondary }
    }

    pub fn primary(&self) -> &BlobStore {
        &self.primary
    }

    pub async fn store(
        &self,
        data: &[u8],
        options: StoreOptions,
    ) -> Result<(BlobRecord, StoreTier), StorageError> {
        match self.primary.store(data, options).await {
            Ok(record) => Ok((record, StoreTier::Primary)),
            Err(primary_error) => {
                let Some(secondary) = &self.secondary else {
                    return Err(primary_error);
                };
                warn!("Primary store failed ({}), trying secondary", primary_error);
                let record = secondary
                    .store(data, options)
                    .await
                    .map_err(|e| merge_failures(primary_error, e))?;
                Ok((record, StoreTier::Secondary))
            }
        }
    }

    pub async fn retrieve(&self, blob_id: &str) -> Result<Vec<u8>, StorageError> {
        match self.primary.retrieve(blob_id).await {
            Ok(data) => Ok(data),
            Err(primary_error) => {
                let Some(secondary) = &self.secondary else {
                    return Err(primary_error);
                };
                warn!("Primary retrieve of {} failed ({}), trying secondary", blob_id, primary_error);
                secondary
                    .retrieve(blob_id)
                    .await
                    .map_err(|e| merge_failures(primary_error, e))
            }
        }
    }
}

fn merge_failures(first: StorageError, second: StorageError) -> StorageError {
    let mut failures = Vec::new();
    for error in [first, second] {
        if let StorageError::AllEndpointsFailed(list) = error {
            failures.extend(list);
        }
    }
    if failures.is_empty() {
        StorageError::NoEndpoints
    } else {
        StorageError::AllEndpointsFailed(failures)
    }
}
