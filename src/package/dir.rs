//! The DIR resource: the package's compression directory.
//!
//! Maps internal TGIs to uncompressed sizes for exactly the subset of
//! entries stored refpack-compressed. The DIR is itself an ordinary
//! resource (never compressed, never listed in itself); it is also the
//! metadata that drives compression on write, so the package regenerates it
//! from scratch before every serialisation.

use crate::error::{DbpfError, Result};
use crate::key::ResourceKey;
use crate::package::resource::{Asset, AssetCodec, CodecContext};
use binrw::{binrw, helpers::until_eof, BinReaderExt, BinWriterExt};
use indexmap::IndexMap;
use std::any::Any;
use std::io::Cursor;
use std::sync::Arc;

#[binrw]
#[brw(little, import { long_instances: bool })]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct RawDirEntry {
    type_id: u32,
    group_id: u32,
    instance_id: u32,
    #[br(if(long_instances, 0))]
    instance_hi: u32,
    uncompressed_size: u32,
}

#[binrw]
#[brw(little, import { long_instances: bool })]
struct RawDir {
    #[br(parse_with = until_eof, args { long_instances })]
    #[bw(args { long_instances })]
    entries: Vec<RawDirEntry>,
}

/// Parsed compression directory. Preserves entry order for byte-stable
/// emission.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirResource {
    entries: IndexMap<ResourceKey, u32>,
}

impl DirResource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(bytes: &[u8], long_instances: bool) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let raw = cursor
            .read_le_args::<RawDir>(binrw::args! { long_instances })
            .map_err(|e| DbpfError::CorruptCompression(format!("bad compression directory: {e}")))?;
        let mut entries = IndexMap::with_capacity(raw.entries.len());
        for e in raw.entries {
            let key = ResourceKey::new(e.type_id, e.group_id, e.instance_id, e.instance_hi);
            entries.insert(key, e.uncompressed_size);
        }
        Ok(Self { entries })
    }

    /// Emits the directory body. Always the long-instance layout; the writer
    /// emits index minor version 2 regardless of what was read.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let raw = RawDir {
            entries: self
                .entries
                .iter()
                .map(|(key, &size)| RawDirEntry {
                    type_id: key.type_id,
                    group_id: key.group_id,
                    instance_id: key.instance_id,
                    instance_hi: key.instance_hi,
                    uncompressed_size: size,
                })
                .collect(),
        };
        let mut cursor = Cursor::new(Vec::new());
        cursor
            .write_le_args(&raw, binrw::args! { long_instances: true })
            .map_err(|e| DbpfError::CorruptCompression(format!("directory emit failed: {e}")))?;
        Ok(cursor.into_inner())
    }

    pub fn get(&self, key: &ResourceKey) -> Option<u32> {
        self.entries.get(key).copied()
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: ResourceKey, uncompressed_size: u32) {
        self.entries.insert(key, uncompressed_size);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceKey, &u32)> {
        self.entries.iter()
    }
}

impl Asset for DirResource {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Built-in codec for the DIR resource type.
pub struct DirCodec;

impl AssetCodec for DirCodec {
    fn decode(&self, bytes: &[u8], ctx: &CodecContext) -> Result<Arc<dyn Asset>> {
        Ok(Arc::new(DirResource::parse(bytes, ctx.long_instances)?))
    }

    fn encode(&self, asset: &dyn Asset) -> Result<Vec<u8>> {
        let dir = asset
            .as_any()
            .downcast_ref::<DirResource>()
            .ok_or_else(|| {
                DbpfError::CorruptCompression("directory codec fed a foreign asset".into())
            })?;
        dir.to_bytes()
    }
}
