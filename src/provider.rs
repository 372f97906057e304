//! Adapter to the surrounding content provider.
//!
//! The provider maintains a cross-package resource map and a decoded-asset
//! cache. The package only pushes notifications outward through this trait;
//! every call is advisory and nothing in the core depends on what the
//! provider does with it. Packages without a provider stay silent.

use crate::key::ResourceKey;
use crate::package::{Entry, PackageId};
use std::sync::{Arc, Mutex};

/// Narrow capability set the content provider supplies. All keys passed here
/// are global (LOCAL already resolved to the owning package's group).
pub trait ContentProvider: Send {
    fn add_package(&mut self, package: PackageId);
    fn remove_package(&mut self, package: PackageId);
    fn add_entry(&mut self, entry: &Entry);
    fn remove_entry(&mut self, key: ResourceKey, package: PackageId);
    fn cache_remove(&mut self, key: ResourceKey, package: PackageId);
    fn cache_remove_all(&mut self, package: PackageId);
}

/// Provider handle shared between packages. Synchronisation across packages
/// is the provider's contract; the core only takes the lock around single
/// notifications.
pub type SharedProvider = Arc<Mutex<dyn ContentProvider>>;
