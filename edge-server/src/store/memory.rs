//! In-memory repository.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use super::{Record, RecordUpdate, Repository, StoreError};

/// Repository keeping records in insertion order.
pub struct MemoryRepository<T> {
    records: RwLock<Vec<T>>,
}

impl<T> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }
}

impl<T> MemoryRepository<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_unique<T: Record>(records: &[T], candidate: &T) -> Result<(), StoreError> {
    let Some(key) = candidate.unique_key() else {
        return Ok(());
    };

    let taken = records
        .iter()
        .any(|r| r.id() != candidate.id() && r.unique_key() == Some(key));
    if taken {
        return Err(StoreError::Conflict {
            kind: T::KIND,
            key: key.to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl<T: Record> Repository<T> for MemoryRepository<T> {
    async fn insert(&self, record: T) -> Result<T, StoreError> {
        let mut records = self.records.write().await;

        if records.iter().any(|r| r.id() == record.id()) {
            return Err(StoreError::Duplicate {
                kind: T::KIND,
                id: record.id().to_string(),
            });
        }
        check_unique(&records, &record)?;

        records.push(record.clone());
        info!(kind = T::KIND, id = %record.id(), "record_inserted");

        Ok(record)
    }

    async fn get(&self, id: &str) -> Result<Option<T>, StoreError> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.id() == id).cloned())
    }

    async fn list(&self) -> Result<Vec<T>, StoreError> {
        let mut records = self.records.read().await.clone();
        records.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(records)
    }

    async fn update(&self, id: &str, apply: RecordUpdate<'_, T>) -> Result<T, StoreError> {
        let mut records = self.records.write().await;

        let index = records
            .iter()
            .position(|r| r.id() == id)
            .ok_or_else(|| StoreError::NotFound {
                kind: T::KIND,
                id: id.to_string(),
            })?;

        let updated = apply(records[index].clone())?;
        check_unique(&records, &updated)?;

        records[index] = updated.clone();
        info!(kind = T::KIND, id = %id, "record_updated");

        Ok(updated)
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.id() != id);

        let removed = records.len() != before;
        if removed {
            info!(kind = T::KIND, id = %id, "record_removed");
        }

        Ok(removed)
    }
}
