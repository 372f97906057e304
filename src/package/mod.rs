//! The DBPF package: on-disk mirror plus in-memory mutation overlay.

mod changeset;
pub mod dir;
pub mod entry;
mod header;
pub mod resource;

pub use dir::{DirCodec, DirResource};
pub use entry::{Entry, PackageId};
pub use resource::{Asset, AssetCodec, AssetRecord, CodecContext, CodecRegistry};

use crate::error::{DbpfError, Result};
use crate::iobuffer::IoBuffer;
use crate::key::{group_hash, ResourceKey, DIR_KEY};
use crate::provider::{ContentProvider, SharedProvider};
use crate::refpack;
use changeset::{ChangeSet, ChangedItem};
use header::Header;
use log::{debug, warn};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Byte source a package can be parsed from.
pub trait ReadSeek: Read + Seek + Send {}
impl<T: Read + Seek + Send> ReadSeek for T {}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PackageState {
    /// No on-disk mirror (fresh package, or a failed parse).
    Empty,
    Loaded,
    /// Read handle released; terminal for I/O.
    Disposed,
    /// Backing file removed by `write_to_file(delete_if_empty)`; terminal.
    Deleted,
}

fn disposed() -> DbpfError {
    DbpfError::Io(io::Error::other("package stream is disposed"))
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// A DBPF archive with a lazy read handle and a pending-change overlay.
///
/// Originals materialise only at parse and never mutate; all edits go
/// through [`Package::changes`]. The merged view ([`Package::entries`]) is
/// the surviving originals in file order followed by the overlay in
/// insertion order.
pub struct Package {
    id: PackageId,
    state: PackageState,
    file_path: Option<PathBuf>,
    group_id: u32,
    major: u32,
    minor: u32,
    index_minor: u32,
    date_created: i32,
    date_modified: i32,
    archive_len: u64,
    originals: Vec<Entry>,
    by_key: HashMap<ResourceKey, usize>,
    dir: Option<DirResource>,
    reader: Option<IoBuffer<Box<dyn ReadSeek>>>,
    changes: ChangeSet,
    provider: Option<SharedProvider>,
    codecs: Arc<CodecRegistry>,
}

impl Package {
    pub fn new() -> Self {
        Self {
            id: PackageId::next(),
            state: PackageState::Empty,
            file_path: None,
            group_id: group_hash(""),
            major: 1,
            minor: 2,
            index_minor: 2,
            date_created: 0,
            date_modified: 0,
            archive_len: 0,
            originals: Vec::new(),
            by_key: HashMap::new(),
            dir: None,
            reader: None,
            changes: ChangeSet::default(),
            provider: None,
            codecs: Arc::new(CodecRegistry::new()),
        }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut package = Self::new();
        package.file_path = Some(path.to_path_buf());
        package.group_id = group_hash(&stem_of(path));
        package.attach(Box::new(file))?;
        Ok(package)
    }

    /// Parses a package from any seekable stream. The derived group ID is
    /// the hash of the empty stem until [`Package::set_file_path`] rebinds it.
    pub fn read<S: Read + Seek + Send + 'static>(stream: S) -> Result<Self> {
        let mut package = Self::new();
        package.attach(Box::new(stream))?;
        Ok(package)
    }

    fn attach(&mut self, stream: Box<dyn ReadSeek>) -> Result<()> {
        self.reader = Some(IoBuffer::new(stream));
        match self.load() {
            Ok(()) => {
                self.state = PackageState::Loaded;
                Ok(())
            }
            Err(e) => {
                self.reader = None;
                self.originals.clear();
                self.by_key.clear();
                self.dir = None;
                self.state = PackageState::Empty;
                Err(e)
            }
        }
    }

    fn load(&mut self) -> Result<()> {
        let group_id = self.group_id;
        let package_id = self.id;
        let reader = self.reader.as_mut().ok_or_else(disposed)?;
        let archive_len = reader.len()?;
        reader.seek_to(0)?;
        let header = Header::read(reader)?;

        // index must fit the archive before anything gets allocated
        let record_len: u64 = if header.index_minor >= 2 { 24 } else { 20 };
        if u64::from(header.num_entries) * record_len > archive_len {
            return Err(DbpfError::TruncatedIndex {
                expected: header.num_entries,
                read: 0,
            });
        }

        reader.seek_to(header.index_offset as u64)?;
        let mut originals = Vec::with_capacity(header.num_entries as usize);
        for i in 0..header.num_entries {
            let record = (|| -> io::Result<(ResourceKey, u32, u32)> {
                let type_id = reader.read_u32()?;
                let group = reader.read_u32()?;
                let instance_id = reader.read_u32()?;
                let instance_hi = if header.index_minor >= 2 {
                    reader.read_u32()?
                } else {
                    0
                };
                let offset = reader.read_u32()?;
                let size = reader.read_u32()?;
                Ok((
                    ResourceKey::new(type_id, group, instance_id, instance_hi),
                    offset,
                    size,
                ))
            })()
            .map_err(|e| {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    DbpfError::TruncatedIndex {
                        expected: header.num_entries,
                        read: i,
                    }
                } else {
                    DbpfError::Io(e)
                }
            })?;
            let (key, offset, size) = record;
            originals.push(Entry::new(key, group_id, offset, size, package_id));
        }

        let mut by_key = HashMap::with_capacity(originals.len());
        for (i, entry) in originals.iter().enumerate() {
            if by_key.insert(entry.key, i).is_some() {
                warn!("duplicate entry {} in package index, keeping the later one", entry.key);
            }
        }

        self.archive_len = archive_len;
        self.originals = originals;
        self.by_key = by_key;
        self.major = header.major;
        self.minor = header.minor;
        self.index_minor = header.index_minor;
        self.date_created = header.date_created;
        self.date_modified = header.date_modified;

        self.dir = None;
        if self.by_key.contains_key(&DIR_KEY) {
            let raw = self.read_original_raw(DIR_KEY)?;
            self.dir = Some(DirResource::parse(&raw, self.index_minor >= 2)?);
        }
        Ok(())
    }

    pub fn id(&self) -> PackageId {
        self.id
    }

    pub fn state(&self) -> PackageState {
        self.state
    }

    pub fn is_deleted(&self) -> bool {
        self.state == PackageState::Deleted
    }

    pub fn is_dirty(&self) -> bool {
        self.changes.dirty
    }

    /// Group ID derived from the filename stem; substituted for the LOCAL
    /// sentinel in global projections.
    pub fn group_id(&self) -> u32 {
        self.group_id
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn version(&self) -> (u32, u32) {
        (self.major, self.minor)
    }

    pub fn index_minor(&self) -> u32 {
        self.index_minor
    }

    pub fn dates(&self) -> (i32, i32) {
        (self.date_created, self.date_modified)
    }

    /// Compression directory as parsed from disk. Replaced only by a
    /// successful `write_to_file` re-parse.
    pub fn dir(&self) -> Option<&DirResource> {
        self.dir.as_ref()
    }

    pub fn set_provider(&mut self, provider: SharedProvider) {
        self.provider = Some(provider);
    }

    pub fn set_codecs(&mut self, codecs: Arc<CodecRegistry>) {
        self.codecs = codecs;
    }

    /// Rebinds the package to a new path: rederives the group ID, rewrites
    /// every global key, and re-registers with the provider under the new
    /// identity.
    pub fn set_file_path<P: Into<PathBuf>>(&mut self, path: P) {
        let path = path.into();
        let id = self.id;
        self.notify(|p| p.remove_package(id));
        self.group_id = group_hash(&stem_of(&path));
        self.file_path = Some(path);
        let group = self.group_id;
        for entry in &mut self.originals {
            entry.global_key = entry.key.with_local_group(group);
        }
        for (key, item) in self.changes.changed.iter_mut() {
            if let Some(record) = item.asset_record_mut() {
                record.global_key = key.with_local_group(group);
            }
        }
        self.notify(|p| p.add_package(id));
    }

    /// Releases the read handle. Terminal: payload reads of originals fail
    /// afterwards, overlay data stays reachable.
    pub fn dispose(&mut self) {
        self.reader = None;
        if matches!(self.state, PackageState::Empty | PackageState::Loaded) {
            self.state = PackageState::Disposed;
        }
    }

    fn notify(&self, f: impl FnOnce(&mut dyn ContentProvider)) {
        if let Some(provider) = &self.provider {
            if let Ok(mut guard) = provider.lock() {
                f(&mut *guard);
            }
        }
    }

    /// Merged view: surviving originals in file order, then overlay entries
    /// in insertion order. Internal keys are unique across the result.
    pub fn entries(&self) -> Vec<Entry> {
        let mut out = Vec::with_capacity(self.originals.len() + self.changes.changed.len());
        for (i, entry) in self.originals.iter().enumerate() {
            if self.by_key.get(&entry.key) != Some(&i) {
                continue; // shadowed duplicate
            }
            if self.changes.deleted.contains(&entry.key)
                || self.changes.changed.contains_key(&entry.key)
            {
                continue;
            }
            out.push(entry.clone());
        }
        for (key, item) in &self.changes.changed {
            out.push(self.synth_entry(*key, item));
        }
        out
    }

    /// Entries exactly as parsed from disk, ignoring the overlay.
    pub fn original_entries(&self) -> &[Entry] {
        &self.originals
    }

    fn synth_entry(&self, key: ResourceKey, item: &ChangedItem) -> Entry {
        Entry::new(key, self.group_id, 0, item.byte_len_or_zero(), self.id)
    }

    fn known_key(&self, key: &ResourceKey) -> bool {
        self.by_key.contains_key(key)
            || self.changes.changed.contains_key(key)
            || self.changes.deleted.contains(key)
    }

    /// Maps a caller-facing key onto the internal one: a key carrying this
    /// package's group falls back to the LOCAL form when only that exists.
    fn internal_key(&self, key: ResourceKey) -> ResourceKey {
        if self.known_key(&key) {
            return key;
        }
        if key.group_id == self.group_id {
            let local = ResourceKey {
                group_id: crate::key::LOCAL_GROUP,
                ..key
            };
            if self.known_key(&local) {
                return local;
            }
        }
        key
    }

    /// Overlay-aware lookup. Accepts internal or global keys.
    pub fn get_entry_by_tgi(&self, key: ResourceKey) -> Option<Entry> {
        let key = self.internal_key(key);
        if self.changes.deleted.contains(&key) {
            return None;
        }
        if let Some(item) = self.changes.changed.get(&key) {
            return Some(self.synth_entry(key, item));
        }
        self.by_key.get(&key).map(|&i| self.originals[i].clone())
    }

    fn read_original_raw(&mut self, key: ResourceKey) -> Result<Vec<u8>> {
        let &idx = self
            .by_key
            .get(&key)
            .ok_or(DbpfError::MissingEntry(key))?;
        let (offset, size) = {
            let entry = &self.originals[idx];
            (entry.file_offset, entry.file_size)
        };
        if u64::from(offset) + u64::from(size) > self.archive_len {
            return Err(DbpfError::EntryOutOfRange {
                key,
                offset,
                size,
                len: self.archive_len,
            });
        }
        let reader = self.reader.as_mut().ok_or_else(disposed)?;
        reader.seek_to(offset as u64)?;
        Ok(reader.read_bytes(size as usize)?)
    }

    fn bytes_by_key(&mut self, key: ResourceKey, honor_deleted: bool) -> Result<Option<Vec<u8>>> {
        if honor_deleted && self.changes.deleted.contains(&key) {
            return Ok(None);
        }
        if let Some(item) = self.changes.changed.get(&key) {
            return Ok(Some(item.bytes()?.to_vec()));
        }
        if !self.by_key.contains_key(&key) {
            return Ok(None);
        }
        let raw = self.read_original_raw(key)?;
        if let Some(size) = self.dir.as_ref().and_then(|d| d.get(&key)) {
            return Ok(Some(refpack::decompress(&raw, size as usize)?));
        }
        Ok(Some(raw))
    }

    /// Payload bytes for an entry, decompressed when the compression
    /// directory lists it. `None` for deleted or unknown keys.
    pub fn get_bytes(&mut self, entry: &Entry) -> Result<Option<Vec<u8>>> {
        self.bytes_by_key(entry.key, true)
    }

    pub fn get_bytes_by_tgi(&mut self, key: ResourceKey) -> Result<Option<Vec<u8>>> {
        let key = self.internal_key(key);
        self.bytes_by_key(key, true)
    }

    /// Decoded asset for an entry: the staged asset if one is pending,
    /// otherwise the payload bytes through the codec registered for the
    /// type. `None` when deleted, unknown, or no codec is registered.
    pub fn get_asset(&mut self, entry: &Entry) -> Result<Option<AssetRecord>> {
        self.asset_by_key(entry.key)
    }

    pub fn get_asset_by_tgi(&mut self, key: ResourceKey) -> Result<Option<AssetRecord>> {
        let key = self.internal_key(key);
        self.asset_by_key(key)
    }

    fn asset_by_key(&mut self, key: ResourceKey) -> Result<Option<AssetRecord>> {
        if self.changes.deleted.contains(&key) {
            return Ok(None);
        }
        if let Some(record) = self
            .changes
            .changed
            .get(&key)
            .and_then(|item| item.asset_record())
        {
            return Ok(Some(record.clone()));
        }
        let compressed = match self.changes.changed.get(&key) {
            Some(item) => item.compressed,
            None => self.dir.as_ref().map_or(false, |d| d.contains(&key)),
        };
        let Some(bytes) = self.bytes_by_key(key, true)? else {
            return Ok(None);
        };
        let global = key.with_local_group(self.group_id);
        let Some(codec) = self.codecs.get(global.type_id) else {
            debug!("no codec registered for type {:08X}", global.type_id);
            return Ok(None);
        };
        let ctx = CodecContext {
            key: global,
            package: self.id,
            long_instances: self.index_minor >= 2,
        };
        let body = codec.decode(&bytes, &ctx)?;
        Ok(Some(AssetRecord {
            key,
            global_key: global,
            package: self.id,
            compressed,
            body,
        }))
    }

    /// Mutation surface over the overlay.
    pub fn changes(&mut self) -> Changes<'_> {
        Changes { pkg: self }
    }

    /// Rebuilds the compression directory from the merged view: overlay
    /// entries contribute their staged length when flagged compressed,
    /// originals keep their size from the parsed snapshot. An empty result
    /// schedules deletion of the DIR entry, otherwise the fresh DIR is
    /// staged as an asset. Returns the fresh directory; idempotent while no
    /// other mutation happens in between.
    pub fn update_dir(&mut self) -> Result<DirResource> {
        let mut fresh = DirResource::new();
        for entry in self.entries() {
            if entry.key == DIR_KEY {
                continue;
            }
            if let Some(item) = self.changes.changed.get(&entry.key) {
                if item.compressed {
                    fresh.insert(entry.key, item.byte_len()?);
                }
            } else if let Some(size) = self.dir.as_ref().and_then(|d| d.get(&entry.key)) {
                fresh.insert(entry.key, size);
            }
        }
        if fresh.is_empty() {
            if self.by_key.contains_key(&DIR_KEY) || self.changes.changed.contains_key(&DIR_KEY) {
                self.changes().delete(DIR_KEY);
            }
        } else {
            self.changes()
                .set_asset(DIR_KEY, Arc::new(fresh.clone()), Arc::new(DirCodec));
        }
        Ok(fresh)
    }

    /// Serialises the merged view into a fresh archive buffer. Always emits
    /// the v1.2 layout; compression is driven solely by the regenerated
    /// directory.
    pub fn serialize(&mut self) -> Result<Vec<u8>> {
        let dir = self.update_dir()?;
        let merged = self.entries();

        // payloads are gathered up front so compression can fan out
        let mut jobs: Vec<(Vec<u8>, bool)> = Vec::with_capacity(merged.len());
        for entry in &merged {
            let bytes = self
                .bytes_by_key(entry.key, false)?
                .ok_or(DbpfError::MissingEntry(entry.key))?;
            let compress = entry.key != DIR_KEY && dir.contains(&entry.key);
            jobs.push((bytes, compress));
        }
        let payloads: Vec<(Vec<u8>, Option<u32>)> = jobs
            .into_par_iter()
            .map(|(bytes, compress)| {
                if compress {
                    let packed = refpack::compress(&bytes);
                    let len = packed.len() as u32;
                    (packed, Some(len))
                } else {
                    (bytes, None)
                }
            })
            .collect();

        let mut buf = IoBuffer::new(Cursor::new(Vec::new()));
        let slots = Header::write_v12(&mut buf, merged.len() as u32)?;
        let index_offset = buf.position()?;
        buf.patch_u32(slots.index_offset_at, index_offset as u32)?;

        let mut entry_slots = Vec::with_capacity(merged.len());
        for entry in &merged {
            buf.write_u32(entry.key.type_id)?;
            buf.write_u32(entry.key.group_id)?;
            buf.write_u32(entry.key.instance_id)?;
            buf.write_u32(entry.key.instance_hi)?;
            let offset_at = buf.position()?;
            buf.write_u32(0)?;
            let size_at = buf.position()?;
            buf.write_u32(entry.file_size)?;
            entry_slots.push((offset_at, size_at));
        }

        for ((payload, packed_len), (offset_at, size_at)) in payloads.iter().zip(&entry_slots) {
            let start = buf.position()?;
            buf.patch_u32(*offset_at, start as u32)?;
            if let Some(len) = packed_len {
                buf.patch_u32(*size_at, *len)?;
            }
            buf.write_bytes(payload)?;
        }

        let end = buf.position()?;
        buf.patch_u32(slots.index_size_at, (end - index_offset) as u32)?;
        Ok(buf.into_inner().into_inner())
    }

    /// Writes the merged view back to the bound path.
    ///
    /// With `delete_if_empty` and an empty merged view the backing file is
    /// removed and the package marked deleted. Otherwise the archive is
    /// rebuilt through a temp file in the target directory, the read handle
    /// reopened over the new file, and the overlay cleared; a failed write
    /// leaves the previous file intact.
    pub fn write_to_file(&mut self, delete_if_empty: bool) -> Result<()> {
        if matches!(self.state, PackageState::Disposed | PackageState::Deleted) {
            return Err(disposed());
        }
        let Some(path) = self.file_path.clone() else {
            return Err(DbpfError::Io(io::Error::other("package has no file path")));
        };

        if delete_if_empty && self.entries().is_empty() {
            self.reader = None;
            let id = self.id;
            self.notify(|p| p.remove_package(id));
            self.notify(|p| p.cache_remove_all(id));
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
            self.changes.reset();
            self.originals.clear();
            self.by_key.clear();
            self.dir = None;
            self.state = PackageState::Deleted;
            return Ok(());
        }

        let bytes = self.serialize()?;
        self.reader = None;
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&path).map_err(|e| DbpfError::Io(e.error))?;

        let file = File::open(&path)?;
        self.attach(Box::new(file))?;
        self.changes().clear();
        Ok(())
    }
}

impl Default for Package {
    fn default() -> Self {
        Self::new()
    }
}

/// Borrowed mutation surface over one package's overlay.
///
/// Every mutator marks the package dirty and notifies the provider
/// synchronously before returning: at most one resource-map update and one
/// cache invalidation per affected TGI, in that order. Without a provider
/// the operations are silent.
pub struct Changes<'a> {
    pkg: &'a mut Package,
}

impl Changes<'_> {
    /// Suppresses an entry from the merged view and drops any staged
    /// replacement for it.
    pub fn delete(&mut self, key: ResourceKey) {
        let pkg = &mut *self.pkg;
        let key = pkg.internal_key(key);
        pkg.changes.changed.shift_remove(&key);
        pkg.changes.deleted.insert(key);
        pkg.changes.dirty = true;
        let global = key.with_local_group(pkg.group_id);
        let id = pkg.id;
        pkg.notify(|p| p.remove_entry(global, id));
        pkg.notify(|p| p.cache_remove(global, id));
    }

    /// Undoes a pending deletion. The original entry, if one still backs the
    /// key, is re-published to the provider.
    pub fn restore(&mut self, key: ResourceKey) {
        let pkg = &mut *self.pkg;
        let key = pkg.internal_key(key);
        if !pkg.changes.deleted.remove(&key) {
            return;
        }
        pkg.changes.dirty = true;
        if let Some(&idx) = pkg.by_key.get(&key) {
            let entry = pkg.originals[idx].clone();
            pkg.notify(|p| p.add_entry(&entry));
        }
        let global = key.with_local_group(pkg.group_id);
        let id = pkg.id;
        pkg.notify(|p| p.cache_remove(global, id));
    }

    /// Stages raw bytes as an addition or replacement under `key`.
    pub fn set_bytes(&mut self, key: ResourceKey, bytes: Vec<u8>, compressed: bool) {
        let key = self.pkg.internal_key(key);
        self.stage(key, ChangedItem::raw(bytes, compressed));
    }

    /// Stages a typed asset plus the codec that will serialise it on write.
    /// The asset record is stamped with the owning package and global TGI;
    /// the compressed flag carries over from the entry being replaced.
    pub fn set_asset(&mut self, key: ResourceKey, asset: Arc<dyn Asset>, codec: Arc<dyn AssetCodec>) {
        let key = self.pkg.internal_key(key);
        let compressed = match self.pkg.changes.changed.get(&key) {
            Some(item) => item.compressed,
            None => self.pkg.dir.as_ref().map_or(false, |d| d.contains(&key)),
        };
        let record = AssetRecord {
            key,
            global_key: key.with_local_group(self.pkg.group_id),
            package: self.pkg.id,
            compressed,
            body: asset,
        };
        self.stage(key, ChangedItem::asset(record, codec, compressed));
    }

    fn stage(&mut self, key: ResourceKey, item: ChangedItem) {
        let pkg = &mut *self.pkg;
        pkg.changes.deleted.remove(&key);
        let entry = pkg.synth_entry(key, &item);
        pkg.changes.changed.insert(key, item);
        pkg.changes.dirty = true;
        let global = entry.global_key;
        let id = pkg.id;
        pkg.notify(|p| p.add_entry(&entry));
        pkg.notify(|p| p.cache_remove(global, id));
    }

    /// Drops the whole overlay and re-registers the package, restoring the
    /// clean on-disk baseline.
    pub fn clear(&mut self) {
        let pkg = &mut *self.pkg;
        let id = pkg.id;
        pkg.notify(|p| p.remove_package(id));
        pkg.changes.reset();
        pkg.notify(|p| p.add_package(id));
        pkg.notify(|p| p.cache_remove_all(id));
    }

    /// Marks every entry in the current merged view deleted.
    pub fn delete_all(&mut self) {
        let pkg = &mut *self.pkg;
        // walks the merged view, which already excludes prior deletions
        let keys: Vec<ResourceKey> = pkg.entries().iter().map(|e| e.key).collect();
        for key in keys {
            pkg.changes.changed.shift_remove(&key);
            pkg.changes.deleted.insert(key);
        }
        pkg.changes.dirty = true;
        let id = pkg.id;
        pkg.notify(|p| p.remove_package(id));
        pkg.notify(|p| p.cache_remove_all(id));
    }
}
