//! Persistence collaborators

use crate::error::StoreError;
use crate::types::{ProfileId, Selection, ServiceMode};

/// Persisted proxy selections, unique per `(profile, group)`
pub trait SelectionStore: Send + Sync {
    /// Insert or replace the selection for `(selection.profile, selection.group)`
    fn set_selected(&self, selection: Selection) -> Result<(), StoreError>;

    /// Forget the selection for `(profile, group)`, if any
    fn remove_selected(&self, profile: &ProfileId, group: &str) -> Result<(), StoreError>;

    /// The selection for `(profile, group)`, if any
    fn selected(&self, profile: &ProfileId, group: &str) -> Option<Selection>;

    /// Every selection recorded for a profile
    fn selections(&self, profile: &ProfileId) -> Vec<Selection>;
}

/// Service settings owned by the surrounding application
pub trait ServiceStore: Send + Sync {
    /// Profile currently loaded into the engine, if known
    fn active_profile(&self) -> Option<ProfileId>;

    /// How traffic is brought into the engine
    fn service_mode(&self) -> ServiceMode;
}
