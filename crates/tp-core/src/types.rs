//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a configuration profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(pub Uuid);

impl ProfileId {
    /// Create a fresh random profile ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ProfileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProfileId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for ProfileId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// A user's choice of proxy for a named group within a profile.
///
/// Unique per `(profile, group)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selection {
    /// Profile the selection belongs to
    pub profile: ProfileId,
    /// Proxy group name
    pub group: String,
    /// Selected proxy name
    pub name: String,
}

impl Selection {
    /// Create a new selection
    pub fn new(profile: ProfileId, group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            profile,
            group: group.into(),
            name: name.into(),
        }
    }
}

/// How the service brings traffic into the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceMode {
    /// Delegate to the managed tunnel-service process
    #[default]
    Vpn,
    /// Kernel-level tunnel device set up with root privileges
    Tun,
}

impl fmt::Display for ServiceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceMode::Vpn => write!(f, "vpn"),
            ServiceMode::Tun => write!(f, "tun"),
        }
    }
}
