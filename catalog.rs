use crate::error::Result;
use crate::models::{Media, MediaUpdate, NewMedia, Tombstone};
use arc_swap::ArcSwap;
use im::{HashMap, OrdMap, OrdSet};
use std::sync::{Arc, Mutex, PoisonError};

/// An immutable, point-in-time view of the catalog.
pub type Snapshot = Arc<CatalogData>;

/// Mutation surface shared by the in-memory store and the write-through adapter.
pub trait Catalog: Send + Sync {
    fn add_media(&self, media: NewMedia) -> Result<bool>;
    fn update_media(&self, hash: &str, update: MediaUpdate) -> Result<bool>;
    fn remove_media(&self, hash: &str) -> Result<bool>;
    /// Registers `name` globally, or associates it with `hash` when given.
    fn add_tag(&self, name: &str, hash: Option<&str>) -> Result<bool>;
    /// Removes one association, or the tag and every association when `hash` is `None`.
    fn remove_tag(&self, name: &str, hash: Option<&str>) -> Result<bool>;
    fn snapshot(&self) -> Snapshot;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Rejected,
    Unchanged,
    Updated,
    Created,
}

/// Implemented by mutation results so the store knows whether anything happened.
pub trait Applied {
    fn applied(&self) -> bool;
}

impl Applied for bool {
    fn applied(&self) -> bool {
        *self
    }
}

impl Applied for UpdateOutcome {
    fn applied(&self) -> bool {
        matches!(self, UpdateOutcome::Updated | UpdateOutcome::Created)
    }
}

/// The catalog's authoritative data. Every mutation leaves it consistent.
///
/// Built on persistent collections: a clone shares structure with the
/// original, and a mutation copies only the nodes it touches.
#[derive(Debug, Clone, Default)]
pub struct CatalogData {
    /// Insertion sequence to hash.
    order: OrdMap<u64, String>,
    slots: HashMap<String, u64>,
    next_slot: u64,
    media: HashMap<String, Arc<Media>>,
    paths: HashMap<String, String>,
    tags: OrdMap<String, OrdSet<String>>,
    tombstones: OrdMap<String, i64>,
}

impl CatalogData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_media(&mut self, new: NewMedia) -> bool {
        if self.media.contains_key(&new.hash)
            || self.tombstones.contains_key(&new.hash)
            || self.paths.contains_key(&new.path)
        {
            return false;
        }
        let media = Media {
            hash: new.hash,
            path: new.path,
            rotation: new.rotation,
            media_type: new.media_type,
            hash_date: new.hash_date,
            corrupted: false,
            transcode: false,
            metadata: None,
            tags: Vec::new(),
        };
        let slot = self.next_slot;
        self.next_slot += 1;
        self.order.insert(slot, media.hash.clone());
        self.slots.insert(media.hash.clone(), slot);
        self.paths.insert(media.path.clone(), media.hash.clone());
        self.media.insert(media.hash.clone(), Arc::new(media));
        true
    }

    /// Applies the fields present in `update`. An unknown hash is created when
    /// the update carries a path, a type and a hash date.
    pub fn update_media(&mut self, hash: &str, update: &MediaUpdate) -> UpdateOutcome {
        let Some(existing) = self.media.get(hash) else {
            let Some(new) = update.as_new_media(hash) else {
                return UpdateOutcome::Rejected;
            };
            if !self.add_media(new) {
                return UpdateOutcome::Rejected;
            }
            // Creation consumed path/type/date; the rest still applies.
            let rest = MediaUpdate {
                path: None,
                media_type: None,
                hash_date: None,
                ..update.clone()
            };
            self.update_media(hash, &rest);
            return UpdateOutcome::Created;
        };

        if let Some(path) = &update.path {
            if self.paths.get(path).is_some_and(|owner| owner != hash) {
                return UpdateOutcome::Rejected;
            }
        }

        let mut next = Media::clone(existing);
        if let Some(path) = &update.path {
            next.path = path.clone();
        }
        if let Some(rotation) = update.rotation {
            next.rotation = rotation;
        }
        if let Some(media_type) = update.media_type {
            next.media_type = media_type;
        }
        if let Some(hash_date) = update.hash_date {
            next.hash_date = hash_date;
        }
        if let Some(metadata) = &update.metadata {
            next.metadata.get_or_insert_with(Default::default).merge(metadata);
        }
        if let Some(corrupted) = update.corrupted {
            next.corrupted = corrupted;
        }
        if let Some(transcode) = update.transcode {
            next.transcode = transcode;
        }

        if next == **existing {
            return UpdateOutcome::Unchanged;
        }
        if next.path != existing.path {
            self.paths.remove(&existing.path);
            self.paths.insert(next.path.clone(), hash.to_string());
        }
        self.media.insert(hash.to_string(), Arc::new(next));
        UpdateOutcome::Updated
    }

    /// Tombstones `hash` at `time`, then drops its associations, metadata, flags and entry.
    pub fn remove_media(&mut self, hash: &str, time: i64) -> bool {
        let Some(media) = self.media.remove(hash) else {
            return false;
        };
        self.tombstones.insert(hash.to_string(), time);
        for tag in &media.tags {
            if let Some(members) = self.tags.get_mut(tag) {
                members.remove(hash);
            }
        }
        self.paths.remove(&media.path);
        if let Some(slot) = self.slots.remove(hash) {
            self.order.remove(&slot);
        }
        true
    }

    /// Records a tombstone for a hash that is not active. Used when rehydrating.
    pub fn record_tombstone(&mut self, hash: &str, time: i64) -> bool {
        if self.media.contains_key(hash) || self.tombstones.contains_key(hash) {
            return false;
        }
        self.tombstones.insert(hash.to_string(), time);
        true
    }

    pub fn add_tag(&mut self, name: &str, hash: Option<&str>) -> bool {
        if name.is_empty() {
            return false;
        }
        let Some(hash) = hash else {
            if self.tags.contains_key(name) {
                return false;
            }
            self.tags.insert(name.to_string(), OrdSet::new());
            return true;
        };
        let Some(media) = self.media.get_mut(hash) else {
            return false;
        };
        let idx = match media.tags.binary_search_by(|t| t.as_str().cmp(name)) {
            Ok(_) => return false,
            Err(idx) => idx,
        };
        Arc::make_mut(media).tags.insert(idx, name.to_string());
        match self.tags.get_mut(name) {
            Some(members) => {
                members.insert(hash.to_string());
            }
            None => {
                self.tags.insert(name.to_string(), OrdSet::unit(hash.to_string()));
            }
        }
        true
    }

    pub fn remove_tag(&mut self, name: &str, hash: Option<&str>) -> bool {
        let Some(hash) = hash else {
            let Some(members) = self.tags.remove(name) else {
                return false;
            };
            for member in members.iter() {
                if let Some(media) = self.media.get_mut(member) {
                    Arc::make_mut(media).tags.retain(|t| t != name);
                }
            }
            return true;
        };
        let Some(media) = self.media.get_mut(hash) else {
            return false;
        };
        let Ok(idx) = media.tags.binary_search_by(|t| t.as_str().cmp(name)) else {
            return false;
        };
        Arc::make_mut(media).tags.remove(idx);
        if let Some(members) = self.tags.get_mut(name) {
            members.remove(hash);
        }
        true
    }

    pub fn get(&self, hash: &str) -> Option<&Media> {
        self.media.get(hash).map(|media| &**media)
    }

    pub fn media_by_path(&self, path: &str) -> Option<&Media> {
        self.paths.get(path).and_then(|hash| self.get(hash))
    }

    /// Hashes associated with `tag`, or `None` for an unknown tag.
    pub fn with_tag(&self, tag: &str) -> Option<&OrdSet<String>> {
        self.tags.get(tag)
    }

    /// Active media in insertion order.
    ///
    /// A catalog rehydrated by [`crate::db::load`] is inserted in path order,
    /// so after a restart this is path order followed by later additions.
    pub fn iter(&self) -> impl Iterator<Item = &Media> + '_ {
        self.order.values().filter_map(|hash| self.get(hash))
    }

    pub fn len(&self) -> usize {
        self.media.len()
    }

    pub fn is_empty(&self) -> bool {
        self.media.is_empty()
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    /// The global tag list, sorted.
    pub fn tag_names(&self) -> Vec<String> {
        self.tags.keys().cloned().collect()
    }

    pub fn is_tombstoned(&self, hash: &str) -> bool {
        self.tombstones.contains_key(hash)
    }

    pub fn tombstone(&self, hash: &str) -> Option<Tombstone> {
        self.tombstones.get(hash).map(|&time| Tombstone {
            hash: hash.to_string(),
            time,
        })
    }

    pub fn tombstones(&self) -> Vec<Tombstone> {
        self.tombstones
            .iter()
            .map(|(hash, &time)| Tombstone {
                hash: hash.clone(),
                time,
            })
            .collect()
    }
}

/// Single-writer store that publishes immutable snapshots.
///
/// A mutation is staged on a private copy of the current data and only
/// becomes visible once its commit hook succeeds, so readers never see a
/// half-applied cascade and a failed commit leaves the published data as it was.
#[derive(Debug)]
pub struct CatalogStore {
    current: ArcSwap<CatalogData>,
    writer: Mutex<()>,
}

impl Default for CatalogStore {
    fn default() -> Self {
        Self::from_data(CatalogData::new())
    }
}

impl CatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_data(data: CatalogData) -> Self {
        Self {
            current: ArcSwap::from_pointee(data),
            writer: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.current.load_full()
    }

    /// Runs `mutate` on a staged copy; when it reports a change, runs `commit`
    /// against the staged result and publishes it if that succeeds.
    pub fn apply<T, M, C>(&self, mutate: M, commit: C) -> Result<T>
    where
        T: Applied,
        M: FnOnce(&mut CatalogData) -> T,
        C: FnOnce(&T, &CatalogData) -> Result<()>,
    {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut staged = CatalogData::clone(&self.current.load());
        let outcome = mutate(&mut staged);
        if !outcome.applied() {
            return Ok(outcome);
        }
        commit(&outcome, &staged)?;
        self.current.store(Arc::new(staged));
        Ok(outcome)
    }

    fn apply_in_memory<T, M>(&self, mutate: M) -> Result<T>
    where
        T: Applied,
        M: FnOnce(&mut CatalogData) -> T,
    {
        self.apply(mutate, |_, _| Ok(()))
    }
}

impl Catalog for CatalogStore {
    fn add_media(&self, media: NewMedia) -> Result<bool> {
        self.apply_in_memory(|data| data.add_media(media))
    }

    fn update_media(&self, hash: &str, update: MediaUpdate) -> Result<bool> {
        self.apply_in_memory(|data| data.update_media(hash, &update))
            .map(|outcome| outcome.applied())
    }

    fn remove_media(&self, hash: &str) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        self.apply_in_memory(|data| data.remove_media(hash, now))
    }

    fn add_tag(&self, name: &str, hash: Option<&str>) -> Result<bool> {
        self.apply_in_memory(|data| data.add_tag(name, hash))
    }

    fn remove_tag(&self, name: &str, hash: Option<&str>) -> Result<bool> {
        self.apply_in_memory(|data| data.remove_tag(name, hash))
    }

    fn snapshot(&self) -> Snapshot {
        CatalogStore::snapshot(self)
    }
}
