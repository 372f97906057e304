//! Per-package overlay of pending deletions and additions/replacements.
//!
//! The data lives here; the mutation surface with its provider plumbing is
//! [`super::Changes`], borrowed off the package so the operations can reach
//! the originals, the group ID and the provider handle.

use crate::error::Result;
use crate::key::ResourceKey;
use crate::package::resource::{AssetCodec, AssetRecord};
use indexmap::IndexMap;
use log::warn;
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use std::sync::Arc;

pub(crate) enum ChangedData {
    Raw(Vec<u8>),
    Asset {
        record: AssetRecord,
        codec: Arc<dyn AssetCodec>,
        bytes: OnceCell<Vec<u8>>,
    },
}

/// One staged addition or replacement: raw bytes, or a not-yet-serialised
/// asset plus the codec needed to serialise it.
pub(crate) struct ChangedItem {
    pub data: ChangedData,
    pub compressed: bool,
}

impl ChangedItem {
    pub fn raw(bytes: Vec<u8>, compressed: bool) -> Self {
        Self {
            data: ChangedData::Raw(bytes),
            compressed,
        }
    }

    pub fn asset(record: AssetRecord, codec: Arc<dyn AssetCodec>, compressed: bool) -> Self {
        Self {
            data: ChangedData::Asset {
                record,
                codec,
                bytes: OnceCell::new(),
            },
            compressed,
        }
    }

    /// Current serialised form. Assets are encoded on demand and the result
    /// memoised; a failed encode is retried on the next call.
    pub fn bytes(&self) -> Result<&[u8]> {
        match &self.data {
            ChangedData::Raw(bytes) => Ok(bytes),
            ChangedData::Asset {
                record,
                codec,
                bytes,
            } => bytes
                .get_or_try_init(|| codec.encode(record.body.as_ref()))
                .map(Vec::as_slice),
        }
    }

    pub fn byte_len(&self) -> Result<u32> {
        self.bytes().map(|b| b.len() as u32)
    }

    pub fn byte_len_or_zero(&self) -> u32 {
        match self.byte_len() {
            Ok(len) => len,
            Err(e) => {
                warn!("staged asset failed to serialise: {e}");
                0
            }
        }
    }

    pub fn asset_record(&self) -> Option<&AssetRecord> {
        match &self.data {
            ChangedData::Asset { record, .. } => Some(record),
            ChangedData::Raw(_) => None,
        }
    }

    pub fn asset_record_mut(&mut self) -> Option<&mut AssetRecord> {
        match &mut self.data {
            ChangedData::Asset { record, .. } => Some(record),
            ChangedData::Raw(_) => None,
        }
    }
}

/// Overlay state. `deleted` and `changed` are kept disjoint: staging removes
/// the key from `deleted`, deleting removes it from `changed`.
#[derive(Default)]
pub(crate) struct ChangeSet {
    pub deleted: HashSet<ResourceKey>,
    pub changed: IndexMap<ResourceKey, ChangedItem>,
    pub dirty: bool,
}

impl ChangeSet {
    pub fn reset(&mut self) {
        self.deleted.clear();
        self.changed.clear();
        self.dirty = false;
    }
}
