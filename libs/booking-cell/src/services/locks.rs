use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::store::StoreClient;

use crate::models::BookingError;

/// Store-backed advisory locks. The lock table carries a unique constraint on
/// `lock_key`, so the INSERT is the atomic claim; two concurrent claimants
/// cannot both succeed. Locks expire so a crashed holder cannot wedge a slot.
pub struct SlotLockService {
    store: Arc<StoreClient>,
    lock_timeout_seconds: i64,
}

impl SlotLockService {
    pub fn new(store: Arc<StoreClient>) -> Self {
        Self {
            store,
            lock_timeout_seconds: 30,
        }
    }

    /// Serializes all bookings for one provider-day; the conflict re-check
    /// under this lock is what makes commit race-free.
    pub fn slot_lock_key(provider_id: Uuid, date: NaiveDate) -> String {
        format!("slot_{}_{}", provider_id, date)
    }

    /// Serializes assignment runs per provider.
    pub fn assignment_lock_key(provider_id: Uuid) -> String {
        format!("assign_{}", provider_id)
    }

    /// Try to take the lock. `false` means another holder currently has it.
    pub async fn acquire(&self, lock_key: &str, provider_id: Uuid) -> Result<bool, BookingError> {
        if self.try_insert_lock(lock_key, provider_id).await? {
            debug!("Lock acquired: {}", lock_key);
            return Ok(true);
        }

        // The key exists; if its holder expired, clear it and try once more.
        if self.cleanup_if_expired(lock_key).await? {
            let acquired = self.try_insert_lock(lock_key, provider_id).await?;
            if acquired {
                debug!("Lock acquired after expiry cleanup: {}", lock_key);
            }
            return Ok(acquired);
        }

        Ok(false)
    }

    pub async fn release(&self, lock_key: &str) -> Result<(), BookingError> {
        let _: Value = self
            .store
            .request(
                Method::DELETE,
                &format!("/rest/v1/slot_locks?lock_key=eq.{}", lock_key),
                None,
                None,
            )
            .await
            .map_err(|e| BookingError::DatabaseError(format!("Lock release failed: {}", e)))?;

        debug!("Lock released: {}", lock_key);
        Ok(())
    }

    /// Delete every expired lock row. Run periodically from the sweep.
    pub async fn cleanup_expired_locks(&self) -> Result<u32, BookingError> {
        let now = Utc::now();

        let response: Value = self
            .store
            .request(
                Method::DELETE,
                &format!(
                    "/rest/v1/slot_locks?expires_at=lt.{}",
                    urlencoding::encode(&now.to_rfc3339())
                ),
                None,
                None,
            )
            .await
            .map_err(|e| BookingError::DatabaseError(format!("Lock cleanup failed: {}", e)))?;

        let cleaned = response.as_array().map(|arr| arr.len() as u32).unwrap_or(0);
        if cleaned > 0 {
            info!("Cleaned up {} expired slot locks", cleaned);
        }
        Ok(cleaned)
    }

    async fn try_insert_lock(&self, lock_key: &str, provider_id: Uuid) -> Result<bool, BookingError> {
        let lock_data = json!({
            "lock_key": lock_key,
            "provider_id": provider_id,
            "acquired_at": Utc::now().to_rfc3339(),
            "expires_at": (Utc::now() + Duration::seconds(self.lock_timeout_seconds)).to_rfc3339(),
            "holder": format!("booking_{}", Uuid::new_v4())
        });

        match self
            .store
            .request::<Value>(Method::POST, "/rest/v1/slot_locks", None, Some(lock_data))
            .await
        {
            Ok(_) => Ok(true),
            // The unique constraint rejected the insert: lock is held.
            Err(_) => Ok(false),
        }
    }

    async fn cleanup_if_expired(&self, lock_key: &str) -> Result<bool, BookingError> {
        let response: Value = self
            .store
            .request(
                Method::GET,
                &format!("/rest/v1/slot_locks?lock_key=eq.{}&select=*", lock_key),
                None,
                None,
            )
            .await
            .map_err(|e| BookingError::DatabaseError(format!("Lock check failed: {}", e)))?;

        if let Some(locks) = response.as_array() {
            if let Some(lock) = locks.first() {
                if let Some(expires_at_str) = lock.get("expires_at").and_then(|v| v.as_str()) {
                    if let Ok(expires_at) = DateTime::parse_from_rfc3339(expires_at_str) {
                        if expires_at.with_timezone(&Utc) < Utc::now() {
                            self.release(lock_key).await?;
                            return Ok(true);
                        }
                    }
                }
            }
        }

        Ok(false)
    }
}
