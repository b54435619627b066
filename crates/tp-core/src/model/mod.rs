//! Engine data model
//!
//! These types mirror what the routing engine reports and accepts. The
//! control plane passes most of them through untouched.

mod configuration;
mod log;
mod overrides;
mod provider;
mod proxy;
mod tunnel;

pub use configuration::UiConfiguration;
pub use log::{LogLevel, LogMessage};
pub use overrides::{ConfigurationOverride, DnsOverride, OverrideSlot, TunConfiguration, TunStack};
pub use provider::{Provider, ProviderList, ProviderType, VehicleType};
pub use proxy::{Proxy, ProxyGroup, ProxySort, ProxyType};
pub use tunnel::{TunnelMode, TunnelState};
