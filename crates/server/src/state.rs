//! Application state shared across handlers.

use std::sync::Arc;

use studypass_core::{Catalog, PriceTable};

use crate::config::StudyPassConfig;
use crate::db::DocumentStore;
use crate::gateway::PaymentGateway;
use crate::services::{
    BillingReconciler, CheckoutService, RegistrationService, SelectionService, StateRepairLoader,
};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the document store and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StudyPassConfig,
    store: Arc<dyn DocumentStore>,
    catalog: Arc<Catalog>,
    loader: StateRepairLoader,
    selection: SelectionService,
    registration: RegistrationService,
    billing: BillingReconciler,
    checkout: CheckoutService,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Server configuration
    /// * `store` - User document store
    /// * `catalog` - Module catalog in canonical order
    /// * `gateway` - Outbound payment gateway
    #[must_use]
    pub fn new(
        config: StudyPassConfig,
        store: Arc<dyn DocumentStore>,
        catalog: Catalog,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let catalog = Arc::new(catalog);
        let billing = BillingReconciler::new(store.clone(), catalog.clone());
        let checkout = CheckoutService::new(
            gateway,
            billing.clone(),
            PriceTable::new(config.currency),
            config.base_url.as_str(),
        );

        Self {
            inner: Arc::new(AppStateInner {
                loader: StateRepairLoader::new(store.clone(), catalog.clone()),
                selection: SelectionService::new(store.clone(), catalog.clone()),
                registration: RegistrationService::new(store.clone(), catalog.clone()),
                billing,
                checkout,
                config,
                store,
                catalog,
            }),
        }
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &StudyPassConfig {
        &self.inner.config
    }

    /// Get a reference to the document store.
    #[must_use]
    pub fn store(&self) -> &dyn DocumentStore {
        self.inner.store.as_ref()
    }

    /// Get a reference to the module catalog.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    #[must_use]
    pub fn loader(&self) -> &StateRepairLoader {
        &self.inner.loader
    }

    #[must_use]
    pub fn selection(&self) -> &SelectionService {
        &self.inner.selection
    }

    #[must_use]
    pub fn registration(&self) -> &RegistrationService {
        &self.inner.registration
    }

    #[must_use]
    pub fn billing(&self) -> &BillingReconciler {
        &self.inner.billing
    }

    #[must_use]
    pub fn checkout(&self) -> &CheckoutService {
        &self.inner.checkout
    }
}
