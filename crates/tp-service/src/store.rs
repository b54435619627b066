//! File-backed persistence
//!
//! `JsonSelectionStore` keeps proxy selections in a JSON file, rewritten
//! whole on every change. `SharedServiceStore` holds the service settings
//! loaded from the config file and lets the host change them at runtime.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use dashmap::DashMap;

use tp_core::config::ServiceConfig;
use tp_core::traits::{SelectionStore, ServiceStore};
use tp_core::{ProfileId, Selection, ServiceMode, StoreError};

/// Selections persisted as a JSON array
pub struct JsonSelectionStore {
    path: PathBuf,
    entries: DashMap<(ProfileId, String), Selection>,
    /// Serializes file rewrites
    write_lock: Mutex<()>,
}

impl JsonSelectionStore {
    /// Open the store at `path`, loading existing selections if the file exists
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = DashMap::new();

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            let selections: Vec<Selection> = serde_json::from_str(&content)?;
            for selection in selections {
                entries.insert((selection.profile, selection.group.clone()), selection);
            }
            tracing::debug!("Loaded {} selections from {:?}", entries.len(), path);
        }

        Ok(Self {
            path,
            entries,
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` and rewrite the file, undoing the change if the write
    /// fails. Holds the write lock throughout so rollbacks never cross.
    fn update<T>(
        &self,
        change: impl FnOnce(&DashMap<(ProfileId, String), Selection>) -> T,
        rollback: impl FnOnce(&DashMap<(ProfileId, String), Selection>, T),
    ) -> Result<(), StoreError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let undo = change(&self.entries);
        if let Err(e) = self.persist() {
            rollback(&self.entries, undo);
            return Err(e);
        }
        Ok(())
    }

    fn persist(&self) -> Result<(), StoreError> {

        let mut selections: Vec<Selection> =
            self.entries.iter().map(|e| e.value().clone()).collect();
        selections.sort_by(|a, b| (a.profile, &a.group).cmp(&(b.profile, &b.group)));
        let content = serde_json::to_string_pretty(&selections)?;

        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        // Write-then-rename so a crash never leaves a truncated file
        let staging = self.path.with_extension("json.tmp");
        std::fs::write(&staging, content).map_err(io_err)?;
        std::fs::rename(&staging, &self.path).map_err(io_err)?;
        Ok(())
    }
}

impl SelectionStore for JsonSelectionStore {
    fn set_selected(&self, selection: Selection) -> Result<(), StoreError> {
        let key = (selection.profile, selection.group.clone());
        self.update(
            |entries| entries.insert(key.clone(), selection),
            |entries, previous| match previous {
                Some(previous) => {
                    entries.insert(key.clone(), previous);
                }
                None => {
                    entries.remove(&key);
                }
            },
        )
    }

    fn remove_selected(&self, profile: &ProfileId, group: &str) -> Result<(), StoreError> {
        let key = (*profile, group.to_string());
        if !self.entries.contains_key(&key) {
            return Ok(());
        }
        self.update(
            |entries| entries.remove(&key),
            |entries, removed| {
                if let Some((key, selection)) = removed {
                    entries.insert(key, selection);
                }
            },
        )
    }

    fn selected(&self, profile: &ProfileId, group: &str) -> Option<Selection> {
        self.entries
            .get(&(*profile, group.to_string()))
            .map(|e| e.value().clone())
    }

    fn selections(&self, profile: &ProfileId) -> Vec<Selection> {
        let mut selections: Vec<_> = self
            .entries
            .iter()
            .filter(|e| e.key().0 == *profile)
            .map(|e| e.value().clone())
            .collect();
        selections.sort_by(|a, b| a.group.cmp(&b.group));
        selections
    }
}

#[derive(Debug, Clone, Copy)]
struct ServiceSettings {
    active_profile: Option<ProfileId>,
    service_mode: ServiceMode,
}

/// Service settings shared between the host and the control plane
#[derive(Debug)]
pub struct SharedServiceStore {
    settings: RwLock<ServiceSettings>,
}

impl SharedServiceStore {
    pub fn new(active_profile: Option<ProfileId>, service_mode: ServiceMode) -> Self {
        Self {
            settings: RwLock::new(ServiceSettings {
                active_profile,
                service_mode,
            }),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.active_profile, config.service_mode)
    }

    pub fn set_active_profile(&self, profile: Option<ProfileId>) {
        self.write().active_profile = profile;
    }

    pub fn set_service_mode(&self, mode: ServiceMode) {
        self.write().service_mode = mode;
    }

    fn read(&self) -> ServiceSettings {
        *self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ServiceSettings> {
        self.settings.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ServiceStore for SharedServiceStore {
    fn active_profile(&self) -> Option<ProfileId> {
        self.read().active_profile
    }

    fn service_mode(&self) -> ServiceMode {
        self.read().service_mode
    }
}
