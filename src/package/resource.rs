//! Seam between raw payload bytes and decoded asset objects.
//!
//! The actual per-resource codecs live outside the core; the package only
//! dispatches on the resource type through a [`CodecRegistry`]. The one
//! codec the core ships is the compression-directory codec in
//! [`super::dir`].

use crate::error::Result;
use crate::key::ResourceKey;
use crate::package::PackageId;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A decoded resource payload. Concrete asset types are opaque to the core;
/// callers downcast through [`Asset::as_any`].
pub trait Asset: fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// Context handed to codecs so version-dependent layouts (instance-hi
/// presence) can be resolved without reaching back into the package.
#[derive(Clone, Copy, Debug)]
pub struct CodecContext {
    /// Global TGI of the resource being decoded.
    pub key: ResourceKey,
    pub package: PackageId,
    /// Whether the owning package stores 64-bit instance IDs (index minor >= 2).
    pub long_instances: bool,
}

/// Deserialises raw payload bytes into a typed asset and back.
pub trait AssetCodec: Send + Sync {
    fn decode(&self, bytes: &[u8], ctx: &CodecContext) -> Result<Arc<dyn Asset>>;
    fn encode(&self, asset: &dyn Asset) -> Result<Vec<u8>>;
}

/// Asset plus the identity stamped on it at retrieval or staging time.
#[derive(Clone, Debug)]
pub struct AssetRecord {
    /// Internal TGI (the edit key).
    pub key: ResourceKey,
    pub global_key: ResourceKey,
    pub package: PackageId,
    /// Whether the compression directory listed this resource.
    pub compressed: bool,
    pub body: Arc<dyn Asset>,
}

/// Codec dispatch table keyed by resource type ID.
pub struct CodecRegistry {
    codecs: HashMap<u32, Arc<dyn AssetCodec>>,
}

impl CodecRegistry {
    /// Registry with the built-in compression-directory codec.
    pub fn new() -> Self {
        let mut registry = Self {
            codecs: HashMap::new(),
        };
        registry.register(crate::key::DIR_KEY.type_id, Arc::new(super::dir::DirCodec));
        registry
    }

    pub fn register(&mut self, type_id: u32, codec: Arc<dyn AssetCodec>) {
        self.codecs.insert(type_id, codec);
    }

    pub fn get(&self, type_id: u32) -> Option<Arc<dyn AssetCodec>> {
        self.codecs.get(&type_id).cloned()
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}
