//! Initial record for a new account.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{info, instrument};

use studypass_core::{AccountType, Catalog, PlanTier, UserId, resolve_entitlements};

use super::{EngineError, StateRepairLoader};
use crate::db::{DocumentPatch, DocumentStore};
use crate::models::user::{billing_fields, encode_selection, encode_timestamp, fields};
use crate::models::{CURRENT_SCHEMA_VERSION, CanonicalState};

/// Longest accepted display name, in characters.
pub const MAX_DISPLAY_NAME_LEN: usize = 80;

/// Creates user records at account registration.
#[derive(Clone)]
pub struct RegistrationService {
    loader: StateRepairLoader,
    store: Arc<dyn DocumentStore>,
    catalog: Arc<Catalog>,
}

impl RegistrationService {
    /// Create a new registration service.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, catalog: Arc<Catalog>) -> Self {
        Self {
            loader: StateRepairLoader::new(store.clone(), catalog.clone()),
            store,
            catalog,
        }
    }

    /// Register a user.
    ///
    /// New users start on `trial` with the first catalog module selected and
    /// a lock that has already expired, so their first real selection is
    /// accepted immediately. Registering a user that already has a record
    /// leaves it untouched and returns its canonical state.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidRequest` for an empty or overlong display
    /// name, or `EngineError::Storage` if the store fails.
    #[instrument(skip(self, display_name, now))]
    pub async fn register(
        &self,
        user_id: UserId,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Result<CanonicalState, EngineError> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(EngineError::InvalidRequest(
                "display name must not be empty".to_string(),
            ));
        }
        if display_name.chars().count() > MAX_DISPLAY_NAME_LEN {
            return Err(EngineError::InvalidRequest(format!(
                "display name must be at most {MAX_DISPLAY_NAME_LEN} characters"
            )));
        }

        if self.store.get(user_id).await?.is_some() {
            info!(user_id = %user_id, "User already registered");
            return self.loader.load(user_id, now).await;
        }

        let plan = PlanTier::Trial;
        let entitlement = resolve_entitlements(plan, &self.catalog);
        let selection: Vec<_> = entitlement.first().into_iter().cloned().collect();

        let mut billing = Map::new();
        billing.insert(
            billing_fields::ACCOUNT_TYPE.to_string(),
            Value::from(AccountType::Trial.as_str()),
        );

        let mut patch = DocumentPatch::new();
        patch
            .set(fields::PLAN, plan.as_str())
            .set(fields::SELECTED, encode_selection(&selection))
            .set(fields::LOCK_UNTIL, encode_timestamp(now))
            .set(fields::DISPLAY_NAME, display_name)
            .set(fields::SCHEMA_VERSION, CURRENT_SCHEMA_VERSION)
            .set(fields::BILLING, billing);
        self.store.merge_write(user_id, &patch).await?;

        info!(user_id = %user_id, "Registered user");

        self.loader.load(user_id, now).await
    }
}
