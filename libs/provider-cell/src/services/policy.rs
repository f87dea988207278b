use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::store::StoreClient;

use crate::models::{CancellationPolicy, ProviderError, RefundTier, SetCancellationPolicyRequest};
use crate::services::provider::{parse_single, representation_headers};

pub struct PolicyService {
    store: Arc<StoreClient>,
}

impl PolicyService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: Arc::new(StoreClient::new(config)),
        }
    }

    pub fn with_store(store: Arc<StoreClient>) -> Self {
        Self { store }
    }

    /// The provider's policy, or the marketplace default when none is stored.
    pub async fn get_policy(
        &self,
        provider_id: Uuid,
        auth_token: &str,
    ) -> Result<CancellationPolicy, ProviderError> {
        debug!("Fetching cancellation policy for provider {}", provider_id);

        let path = format!("/rest/v1/cancellation_policies?provider_id=eq.{}", provider_id);
        let result: Vec<Value> = self
            .store
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        if let Some(row) = result.into_iter().next() {
            return serde_json::from_value(row)
                .map_err(|e| ProviderError::DatabaseError(format!("Failed to parse policy: {}", e)));
        }

        let now = Utc::now();
        Ok(CancellationPolicy {
            id: Uuid::nil(),
            provider_id,
            tiers: CancellationPolicy::default_tiers(),
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn set_policy(
        &self,
        provider_id: Uuid,
        request: SetCancellationPolicyRequest,
        auth_token: &str,
    ) -> Result<CancellationPolicy, ProviderError> {
        validate_tiers(&request.tiers)?;

        // Replace-on-write keeps exactly one policy row per provider.
        let delete_path = format!("/rest/v1/cancellation_policies?provider_id=eq.{}", provider_id);
        let _: Vec<Value> = self
            .store
            .request(Method::DELETE, &delete_path, Some(auth_token), None)
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        let now = Utc::now();
        let policy_data = json!({
            "provider_id": provider_id,
            "tiers": request.tiers,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let result: Vec<Value> = self
            .store
            .request_with_headers(
                Method::POST,
                "/rest/v1/cancellation_policies",
                Some(auth_token),
                Some(policy_data),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| ProviderError::DatabaseError(e.to_string()))?;

        let policy: CancellationPolicy = parse_single(result)?;
        info!("Cancellation policy updated for provider {} ({} tiers)", provider_id, policy.tiers.len());
        Ok(policy)
    }
}

fn validate_tiers(tiers: &[RefundTier]) -> Result<(), ProviderError> {
    if tiers.is_empty() {
        return Err(ProviderError::InvalidInput("Policy must have at least one tier".to_string()));
    }
    for tier in tiers {
        if tier.hours_before < 0 {
            return Err(ProviderError::InvalidInput("Tier threshold cannot be negative".to_string()));
        }
        if tier.refund_percentage > 100 {
            return Err(ProviderError::InvalidInput("Refund percentage cannot exceed 100".to_string()));
        }
    }

    let mut thresholds: Vec<i64> = tiers.iter().map(|t| t.hours_before).collect();
    thresholds.sort_unstable();
    thresholds.dedup();
    if thresholds.len() != tiers.len() {
        return Err(ProviderError::InvalidInput("Tier thresholds must be distinct".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_has_three_tiers() {
        let tiers = CancellationPolicy::default_tiers();
        assert_eq!(tiers.len(), 3);
        assert!(validate_tiers(&tiers).is_ok());
    }

    #[test]
    fn rejects_duplicate_thresholds() {
        let tiers = vec![
            RefundTier { hours_before: 24, refund_percentage: 100 },
            RefundTier { hours_before: 24, refund_percentage: 50 },
        ];
        assert!(validate_tiers(&tiers).is_err());
    }

    #[test]
    fn rejects_percentage_over_hundred() {
        let tiers = vec![RefundTier { hours_before: 24, refund_percentage: 120 }];
        assert!(validate_tiers(&tiers).is_err());
    }

    #[test]
    fn sorted_tiers_descend_by_threshold() {
        let now = Utc::now();
        let policy = CancellationPolicy {
            id: Uuid::nil(),
            provider_id: Uuid::new_v4(),
            tiers: vec![
                RefundTier { hours_before: 0, refund_percentage: 0 },
                RefundTier { hours_before: 24, refund_percentage: 100 },
                RefundTier { hours_before: 2, refund_percentage: 50 },
            ],
            created_at: now,
            updated_at: now,
        };

        let sorted = policy.sorted_tiers();
        assert_eq!(sorted[0].hours_before, 24);
        assert_eq!(sorted[1].hours_before, 2);
        assert_eq!(sorted[2].hours_before, 0);
    }
}
