//! Override layer bookkeeping
//!
//! The controller API only knows one running configuration, so the layers
//! are kept here and flattened before every patch. The engine's own values
//! are captured before the first layer goes in, so clearing a layer can
//! patch them back.

use std::collections::BTreeMap;

use tp_core::model::{ConfigurationOverride, OverrideSlot, TunConfiguration};

/// Override layers, applied in [`OverrideSlot::LAYERED`] order
#[derive(Debug, Default)]
pub struct OverrideLayers {
    layers: BTreeMap<OverrideSlot, ConfigurationOverride>,
    /// Running configuration from before any layer was applied
    base: Option<ConfigurationOverride>,
}

impl OverrideLayers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contents of one layer; an untouched layer is empty
    pub fn get(&self, slot: OverrideSlot) -> ConfigurationOverride {
        self.layers.get(&slot).cloned().unwrap_or_default()
    }

    /// Replace a layer
    pub fn set(&mut self, slot: OverrideSlot, configuration: ConfigurationOverride) {
        self.layers.insert(slot, configuration);
    }

    /// Drop a layer, returning what it held
    pub fn clear(&mut self, slot: OverrideSlot) -> ConfigurationOverride {
        self.layers.remove(&slot).unwrap_or_default()
    }

    /// True until a base snapshot is recorded
    pub fn needs_base(&self) -> bool {
        self.base.is_none()
    }

    /// Record the engine's running configuration as the base
    pub fn set_base(&mut self, base: ConfigurationOverride) {
        self.base = Some(base);
    }

    /// Forget the base once no layer is left, so the next patch takes a
    /// fresh snapshot
    pub fn release_base_if_idle(&mut self) {
        if self.merged().is_empty() {
            self.base = None;
        }
    }

    /// All layers flattened, later slots winning
    pub fn merged(&self) -> ConfigurationOverride {
        OverrideSlot::LAYERED
            .iter()
            .filter_map(|slot| self.layers.get(slot))
            .fold(ConfigurationOverride::default(), |acc, layer| acc.overlay(layer))
    }

    /// The patch to send after `removed` was cleared.
    ///
    /// The running configuration does not forget values on its own. Every
    /// field the removed layer set goes back to its base value, then the
    /// remaining layers are laid on top. A tunnel the removed layer switched
    /// on is switched off when neither the base nor a remaining layer says
    /// otherwise.
    pub fn patch_after_clear(&self, removed: &ConfigurationOverride) -> ConfigurationOverride {
        let restored = self
            .base
            .as_ref()
            .map(|base| base.restricted_to(removed))
            .unwrap_or_default();
        let mut patch = restored.overlay(&self.merged());

        let removed_enable = removed.tun.as_ref().and_then(|t| t.enable);
        let remaining_enable = patch.tun.as_ref().and_then(|t| t.enable);

        if removed_enable == Some(true) && remaining_enable.is_none() {
            patch.tun = Some(TunConfiguration {
                enable: Some(false),
                ..patch.tun.unwrap_or_default()
            });
        }

        if patch.tun.as_ref().is_some_and(|t| *t == TunConfiguration::default()) {
            patch.tun = None;
        }

        patch
    }
}
