// src/jamf/memory.rs

//! In-process management API
//!
//! Objects live in memory with sequential ids per kind. Request counters
//! let callers check that nothing was created or uploaded twice.

use super::{ManagementApi, ObjectKind};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Default)]
struct Store {
    objects: HashMap<ObjectKind, BTreeMap<String, (String, String)>>,
    next_id: HashMap<ObjectKind, u64>,
    creates: HashMap<ObjectKind, usize>,
    updates: HashMap<ObjectKind, usize>,
    uploads: usize,
    failing_uploads: BTreeSet<String>,
}

impl Store {
    fn allocate(&mut self, kind: ObjectKind) -> String {
        let next = self.next_id.entry(kind).or_insert(1);
        let id = *next;
        *next += 1;
        id.to_string()
    }
}

/// Management API backed by in-memory maps
#[derive(Debug, Default)]
pub struct InMemoryApi {
    store: Mutex<Store>,
}

impl InMemoryApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make uploads of the package file `name` fail
    pub fn fail_uploads_of(&self, name: &str) {
        if let Ok(mut store) = self.store.lock() {
            store.failing_uploads.insert(name.to_string());
        }
    }

    /// Stored document of the object called `name`
    pub fn document(&self, kind: ObjectKind, name: &str) -> Option<String> {
        let store = self.store.lock().ok()?;
        store
            .objects
            .get(&kind)?
            .get(name)
            .map(|(_, document)| document.clone())
    }

    /// Names of all objects of `kind`, sorted
    pub fn names(&self, kind: ObjectKind) -> Vec<String> {
        self.store
            .lock()
            .map(|store| {
                store
                    .objects
                    .get(&kind)
                    .map(|objects| objects.keys().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    pub fn create_count(&self, kind: ObjectKind) -> usize {
        self.counter(|store| store.creates.get(&kind).copied().unwrap_or(0))
    }

    pub fn update_count(&self, kind: ObjectKind) -> usize {
        self.counter(|store| store.updates.get(&kind).copied().unwrap_or(0))
    }

    pub fn upload_count(&self) -> usize {
        self.counter(|store| store.uploads)
    }

    fn counter(&self, read: impl FnOnce(&Store) -> usize) -> usize {
        self.store.lock().map(|store| read(&store)).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Store>> {
        self.store
            .lock()
            .map_err(|_| Error::ApiError("in-memory store is poisoned".to_string()))
    }
}

impl ManagementApi for InMemoryApi {
    fn find_id(&self, kind: ObjectKind, name: &str) -> Result<Option<String>> {
        let store = self.lock()?;
        Ok(store
            .objects
            .get(&kind)
            .and_then(|objects| objects.get(name))
            .map(|(id, _)| id.clone()))
    }

    fn create(&self, kind: ObjectKind, name: &str, document: &str) -> Result<()> {
        let mut store = self.lock()?;
        if store
            .objects
            .get(&kind)
            .is_some_and(|objects| objects.contains_key(name))
        {
            return Err(Error::ApiError(format!("{kind} '{name}' already exists")));
        }
        let id = store.allocate(kind);
        debug!("dry run: created {} '{}' ({})", kind, name, id);
        store
            .objects
            .entry(kind)
            .or_default()
            .insert(name.to_string(), (id, document.to_string()));
        *store.creates.entry(kind).or_default() += 1;
        Ok(())
    }

    fn update(&self, kind: ObjectKind, id: &str, name: &str, document: &str) -> Result<()> {
        let mut store = self.lock()?;
        let objects = store.objects.entry(kind).or_default();
        let previous = objects
            .iter()
            .find(|(_, (existing, _))| existing == id)
            .map(|(key, _)| key.clone())
            .ok_or_else(|| Error::ApiError(format!("{kind} id {id} does not exist")))?;
        objects.remove(&previous);
        objects.insert(name.to_string(), (id.to_string(), document.to_string()));
        debug!("dry run: updated {} '{}' ({})", kind, name, id);
        *store.updates.entry(kind).or_default() += 1;
        Ok(())
    }

    fn upload_package(&self, path: &Path) -> Result<String> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidPath(path.display().to_string()))?;
        if !path.is_file() {
            return Err(Error::NotFound(format!("Package file {}", path.display())));
        }

        let mut store = self.lock()?;
        if store.failing_uploads.contains(&name) {
            return Err(Error::ApiError(format!("upload of {name} was rejected")));
        }
        let id = store.allocate(ObjectKind::Package);
        store
            .objects
            .entry(ObjectKind::Package)
            .or_default()
            .insert(name.clone(), (id.clone(), String::new()));
        store.uploads += 1;
        debug!("dry run: uploaded {} ({})", name, id);
        Ok(id)
    }
}
