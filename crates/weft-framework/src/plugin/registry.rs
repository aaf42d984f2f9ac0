//! Registry of known plugin types.

use std::collections::BTreeMap;

use tracing::{info, warn};

use super::descriptor::{PluginDescriptor, WEFT_PLUGIN_API_VERSION};
use crate::error::RegistryError;

/// Plugin types the host can instantiate, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    descriptors: BTreeMap<&'static str, PluginDescriptor>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plugin type.
    ///
    /// Rejects descriptors built against an incompatible API version and
    /// names that are already taken.
    pub fn register(&mut self, descriptor: PluginDescriptor) -> Result<(), RegistryError> {
        if !descriptor.is_compatible() {
            warn!(
                plugin = descriptor.name,
                found = descriptor.api_version,
                expected = WEFT_PLUGIN_API_VERSION,
                "Rejecting plugin with incompatible API version"
            );
            return Err(RegistryError::IncompatibleApi {
                name: descriptor.name,
                found: descriptor.api_version,
                expected: WEFT_PLUGIN_API_VERSION,
            });
        }
        if self.descriptors.contains_key(descriptor.name) {
            return Err(RegistryError::Duplicate(descriptor.name));
        }

        info!(
            plugin = descriptor.name,
            version = descriptor.version,
            "Registered plugin type"
        );
        self.descriptors.insert(descriptor.name, descriptor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&PluginDescriptor> {
        self.descriptors.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.descriptors.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PluginResult;
    use crate::plugin::{Plugin, PluginInit};
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl Plugin for Noop {
        async fn start(&self) -> PluginResult {
            Ok(())
        }
    }

    fn create(_init: PluginInit) -> Box<dyn Plugin> {
        Box::new(Noop)
    }

    fn descriptor(name: &'static str, api_version: u32) -> PluginDescriptor {
        PluginDescriptor {
            api_version,
            name,
            version: "0.1.0",
            create,
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = PluginRegistry::new();
        registry
            .register(descriptor("noop", WEFT_PLUGIN_API_VERSION))
            .unwrap();

        assert!(registry.get("noop").is_some());
        assert_eq!(registry.names().collect::<Vec<_>>(), ["noop"]);
        assert!(matches!(
            registry.register(descriptor("noop", WEFT_PLUGIN_API_VERSION)),
            Err(RegistryError::Duplicate("noop"))
        ));
    }

    #[test]
    fn test_incompatible_api_is_rejected() {
        let mut registry = PluginRegistry::new();

        let newer_major = descriptor("future", 0x0002_0000);
        let newer_minor = descriptor("minor", WEFT_PLUGIN_API_VERSION + 1);
        assert!(matches!(
            registry.register(newer_major),
            Err(RegistryError::IncompatibleApi { name: "future", .. })
        ));
        assert!(registry.register(newer_minor).is_err());
        assert!(registry.is_empty());
    }
}
