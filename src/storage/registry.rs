// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use super::provider::{
    DataStorageProvider, FileStorageProvider, SettingsStorageProvider, StorageProvider,
};

/// Registered providers per capability, in registration order.
///
/// Append-only. Duplicate registrations are accepted.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    data: Vec<Arc<dyn DataStorageProvider>>,
    file: Vec<Arc<dyn FileStorageProvider>>,
    settings: Vec<Arc<dyn SettingsStorageProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_data_provider(&mut self, provider: Arc<dyn DataStorageProvider>) {
        self.data.push(provider);
    }

    pub fn register_file_provider(&mut self, provider: Arc<dyn FileStorageProvider>) {
        self.file.push(provider);
    }

    pub fn register_settings_provider(&mut self, provider: Arc<dyn SettingsStorageProvider>) {
        self.settings.push(provider);
    }

    pub fn data_storage_provider(&self) -> Option<Arc<dyn DataStorageProvider>> {
        select(&self.data)
    }

    pub fn file_storage_provider(&self) -> Option<Arc<dyn FileStorageProvider>> {
        select(&self.file)
    }

    pub fn settings_storage_provider(&self) -> Option<Arc<dyn SettingsStorageProvider>> {
        select(&self.settings)
    }

    /// Number of registered providers per capability: (data, file, settings)
    pub fn len(&self) -> (usize, usize, usize) {
        (self.data.len(), self.file.len(), self.settings.len())
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.file.is_empty() && self.settings.is_empty()
    }
}

/// Pick the supported provider with the highest priority.
///
/// Evaluated on every call because platform support may change at runtime.
/// On equal priority the earliest registration wins.
fn select<P>(providers: &[Arc<P>]) -> Option<Arc<P>>
where
    P: StorageProvider + ?Sized,
{
    let mut selected: Option<&Arc<P>> = None;

    for provider in providers {
        if !provider.is_supported_by_current_platform() {
            continue;
        }
        match selected {
            Some(current) if current.priority() >= provider.priority() => {}
            _ => selected = Some(provider),
        }
    }

    selected.cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{MemoryDataProvider, MemoryFileProvider};

    fn data_provider(name: &str, priority: i32, supported: bool) -> Arc<MemoryDataProvider> {
        let provider = MemoryDataProvider::new(priority).with_name(name);
        provider.set_supported(supported);
        Arc::new(provider)
    }

    #[test]
    fn selects_highest_priority_supported_provider() {
        let mut registry = ProviderRegistry::new();
        registry.register_data_provider(data_provider("low", 0, true));
        registry.register_data_provider(data_provider("high", 200, true));
        registry.register_data_provider(data_provider("unsupported", 100, false));

        let selected = registry.data_storage_provider().unwrap();
        assert_eq!(selected.name(), "high");
        assert_eq!(selected.priority(), 200);
    }

    #[test]
    fn unsupported_provider_is_skipped_even_with_top_priority() {
        let mut registry = ProviderRegistry::new();
        registry.register_data_provider(data_provider("fallback", 1, true));
        registry.register_data_provider(data_provider("best", 1000, false));

        assert_eq!(registry.data_storage_provider().unwrap().name(), "fallback");
    }

    #[test]
    fn ties_resolve_to_first_registered() {
        let mut registry = ProviderRegistry::new();
        registry.register_data_provider(data_provider("first", 50, true));
        registry.register_data_provider(data_provider("second", 50, true));

        assert_eq!(registry.data_storage_provider().unwrap().name(), "first");
    }

    #[test]
    fn negative_priorities_are_selectable() {
        let mut registry = ProviderRegistry::new();
        registry.register_data_provider(data_provider("only", -10, true));

        assert_eq!(registry.data_storage_provider().unwrap().name(), "only");
    }

    #[test]
    fn selection_follows_runtime_support_changes() {
        let preferred = data_provider("preferred", 10, true);
        let mut registry = ProviderRegistry::new();
        registry.register_data_provider(data_provider("fallback", 0, true));
        registry.register_data_provider(preferred.clone());

        assert_eq!(registry.data_storage_provider().unwrap().name(), "preferred");

        preferred.set_supported(false);
        assert_eq!(registry.data_storage_provider().unwrap().name(), "fallback");
    }

    #[test]
    fn no_qualifying_provider_selects_none() {
        let mut registry = ProviderRegistry::new();
        assert!(registry.file_storage_provider().is_none());

        let file = MemoryFileProvider::new(10);
        file.set_supported(false);
        registry.register_file_provider(Arc::new(file));

        assert!(registry.file_storage_provider().is_none());
        assert!(registry.settings_storage_provider().is_none());
    }

    #[test]
    fn duplicate_registration_is_accepted() {
        let provider = data_provider("dup", 5, true);
        let mut registry = ProviderRegistry::new();
        registry.register_data_provider(provider.clone());
        registry.register_data_provider(provider);

        assert_eq!(registry.len(), (2, 0, 0));
        assert_eq!(registry.data_storage_provider().unwrap().name(), "dup");
    }
}
