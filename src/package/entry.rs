use crate::key::ResourceKey;
use std::sync::atomic::{AtomicU64, Ordering};

/// Non-owning handle to a [`crate::Package`]. Entries carry this instead of
/// a reference so their lifetime is not tied to the package's borrow.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct PackageId(u64);

impl PackageId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        PackageId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Descriptor of one stored resource within one package.
///
/// `key` is the internal TGI as stored on disk; `global_key` has the LOCAL
/// sentinel resolved to the owning package's group. For overlay entries the
/// offset is zero and `file_size` tracks the staged byte length.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub key: ResourceKey,
    pub global_key: ResourceKey,
    pub file_offset: u32,
    pub file_size: u32,
    pub package: PackageId,
}

impl Entry {
    pub(crate) fn new(
        key: ResourceKey,
        owner_group: u32,
        file_offset: u32,
        file_size: u32,
        package: PackageId,
    ) -> Self {
        Self {
            key,
            global_key: key.with_local_group(owner_group),
            file_offset,
            file_size,
            package,
        }
    }
}
