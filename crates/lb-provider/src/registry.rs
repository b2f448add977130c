//! Provider registry
//!
//! Maps a configured backend name to a driver instance. Populated explicitly
//! by the composition root before any event is consumed; the mutex only
//! matters during startup, lookups afterwards are read-only.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::provider::LbProvider;
use tracing::info;

/// Registry of load balancer providers, keyed by case-insensitive name.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Mutex<HashMap<String, Arc<dyn LbProvider>>>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider under `name`. A later registration under the
    /// same name replaces the earlier one.
    pub fn register(&self, name: &str, provider: Arc<dyn LbProvider>) {
        info!("Registered provider {:?}", name);
        let mut providers = match self.providers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        providers.insert(name.to_lowercase(), provider);
    }

    /// Looks up the provider registered under `name`, case-insensitively.
    pub fn get(&self, name: &str) -> Option<Arc<dyn LbProvider>> {
        let providers = match self.providers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        providers.get(&name.to_lowercase()).cloned()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = match self.providers.lock() {
            Ok(guard) => guard.keys().cloned().collect(),
            Err(_) => vec![],
        };
        f.debug_struct("ProviderRegistry")
            .field("providers", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crds::Route;
    use std::collections::HashSet;

    struct NullProvider;

    #[async_trait::async_trait]
    impl LbProvider for NullProvider {
        async fn initialize(&self) -> Result<(), ProviderError> {
            Ok(())
        }
        async fn create_pool(&self, _: &str, _: u16) -> Result<(), ProviderError> {
            Ok(())
        }
        async fn add_pool_member(&self, _: &str, _: &str, _: u16) -> Result<(), ProviderError> {
            Ok(())
        }
        async fn modify_pool(
            &self,
            _: &str,
            _: u16,
            _: &str,
            _: u32,
            _: bool,
            _: i32,
        ) -> Result<(), ProviderError> {
            Ok(())
        }
        async fn create_monitor(
            &self,
            _: &str,
            _: u16,
            _: &str,
            _: &str,
            _: u32,
            _: u32,
        ) -> Result<(), ProviderError> {
            Ok(())
        }
        async fn modify_monitor(
            &self,
            _: &str,
            _: u16,
            _: &str,
            _: &str,
            _: u32,
            _: u32,
        ) -> Result<(), ProviderError> {
            Ok(())
        }
        async fn add_monitor_to_pool(&self, _: &str, _: u16) -> Result<(), ProviderError> {
            Ok(())
        }
        async fn delete_pool_member(&self, _: &str, _: &str, _: u16) -> Result<(), ProviderError> {
            Ok(())
        }
        async fn check_and_clean(&self, _: &str, _: u16) {}
        async fn pre_update(&self) {}
        async fn post_update(&self) {}
        async fn check_pools(&self, _: &[Route], _: &str, _: &str) -> HashSet<String> {
            HashSet::new()
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = ProviderRegistry::new();
        registry.register("F5", Arc::new(NullProvider));
        assert!(registry.get("f5").is_some());
        assert!(registry.get("F5").is_some());
    }

    #[test]
    fn unknown_name_returns_none() {
        let registry = ProviderRegistry::new();
        assert!(registry.get("f5").is_none());
    }
}
