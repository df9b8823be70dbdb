//! Pluggable persistence for sources, episodes, media files and settings.
//!
//! Backends implement one or more capability traits and are registered with
//! a [`StorageFacade`], which routes every call to the best backend usable on
//! the current platform.

mod directory;
mod events;
mod facade;
mod filename;
mod files;
mod memory;
mod provider;
mod registry;
mod settings;

pub use directory::DirectoryDataProvider;
pub use events::{EventBus, StorageEvent};
pub use facade::StorageFacade;
pub use files::DirectoryFileProvider;
pub use memory::{MemoryDataProvider, MemoryFileProvider, MemorySettingsProvider};
pub(crate) use provider::collect_batch;
pub use provider::{
    Capability, DataStorageProvider, FileContent, FileStorageOptions, FileStorageProvider,
    Settings, SettingsStorageProvider, SettingsValue, StorageProvider,
};
pub use registry::ProviderRegistry;
pub use settings::JsonSettingsProvider;
