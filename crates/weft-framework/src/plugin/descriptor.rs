//! Plugin descriptor: the static, `Copy` handle to a plugin type.

use super::{Plugin, PluginInit};

// ─── API versioning ─────────────────────────────────────────────────────────

/// Current Weft plugin API version (1.0).
pub const WEFT_PLUGIN_API_VERSION: u32 = 0x0001_0000;

// ─── PluginDescriptor ───────────────────────────────────────────────────────

/// A static descriptor that identifies and instantiates a plugin type.
#[derive(Debug, Clone, Copy)]
pub struct PluginDescriptor {
    /// Plugin API version this descriptor was compiled against.
    pub api_version: u32,

    /// Plugin type name; plugin records refer to it in their `type` field.
    pub name: &'static str,

    /// Plugin version, for logs.
    pub version: &'static str,

    /// Factory creating one instance for one plugin record.
    pub create: fn(PluginInit) -> Box<dyn Plugin>,
}

impl PluginDescriptor {
    /// Returns `true` if this descriptor's API version is compatible with the
    /// running host.
    ///
    /// The major part must match exactly; the descriptor's minor part must be
    /// ≤ the host's minor part.
    pub fn is_compatible(&self) -> bool {
        let host_major = WEFT_PLUGIN_API_VERSION >> 16;
        let host_minor = WEFT_PLUGIN_API_VERSION & 0xFFFF;
        let desc_major = self.api_version >> 16;
        let desc_minor = self.api_version & 0xFFFF;
        desc_major == host_major && desc_minor <= host_minor
    }

    #[inline]
    pub fn instantiate(&self, init: PluginInit) -> Box<dyn Plugin> {
        (self.create)(init)
    }
}
