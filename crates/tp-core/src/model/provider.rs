//! Proxy and rule providers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a provider supplies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderType {
    Proxy,
    Rule,
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderType::Proxy => write!(f, "proxy"),
            ProviderType::Rule => write!(f, "rule"),
        }
    }
}

impl FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "proxy" | "proxies" => Ok(ProviderType::Proxy),
            "rule" | "rules" => Ok(ProviderType::Rule),
            other => Err(format!("unknown provider type '{}'", other)),
        }
    }
}

/// Where a provider loads its content from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleType {
    #[serde(rename = "HTTP")]
    Http,
    File,
    Inline,
    Compatible,
    #[serde(other)]
    Unknown,
}

/// A provider known to the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    pub provider_type: ProviderType,
    pub vehicle_type: VehicleType,
    /// Last update time as reported by the engine
    pub updated_at: Option<String>,
}

impl Provider {
    /// Only remote providers can be refreshed
    pub fn is_updatable(&self) -> bool {
        self.vehicle_type == VehicleType::Http
    }
}

/// Every provider the engine reports, in engine order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderList(pub Vec<Provider>);

impl ProviderList {
    pub fn iter(&self) -> impl Iterator<Item = &Provider> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Provider>> for ProviderList {
    fn from(providers: Vec<Provider>) -> Self {
        Self(providers)
    }
}
