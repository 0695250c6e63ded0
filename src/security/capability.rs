//! Capabilities
//!
//! The six mediator-gated resource categories and the flag set the mediator
//! keeps per plugin.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// A mediator-gated host capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Database,
    Cache,
    Config,
    Router,
    Filesystem,
    Network,
}

impl Capability {
    /// Every gated capability, in a fixed order
    pub const ALL: [Capability; 6] = [
        Capability::Database,
        Capability::Cache,
        Capability::Config,
        Capability::Router,
        Capability::Filesystem,
        Capability::Network,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Database => "database",
            Capability::Cache => "cache",
            Capability::Config => "config",
            Capability::Router => "router",
            Capability::Filesystem => "filesystem",
            Capability::Network => "network",
        }
    }

    /// The flag bit for this capability
    pub fn flag(&self) -> CapabilityFlags {
        match self {
            Capability::Database => CapabilityFlags::DATABASE,
            Capability::Cache => CapabilityFlags::CACHE,
            Capability::Config => CapabilityFlags::CONFIG,
            Capability::Router => CapabilityFlags::ROUTER,
            Capability::Filesystem => CapabilityFlags::FILESYSTEM,
            Capability::Network => CapabilityFlags::NETWORK,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("Unknown capability: {}", s))
    }
}

bitflags! {
    /// Granted capabilities for one plugin
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct CapabilityFlags: u32 {
        const DATABASE = 0x01;
        const CACHE = 0x02;
        const CONFIG = 0x04;
        const ROUTER = 0x08;
        const FILESYSTEM = 0x10;
        const NETWORK = 0x20;
        /// Process execution; declared in manifests but not one of the six
        /// collaborator capabilities
        const EXEC = 0x40;
    }
}

impl Default for CapabilityFlags {
    fn default() -> Self {
        CapabilityFlags::empty()
    }
}

impl CapabilityFlags {
    /// Check a single gated capability
    pub fn allows(&self, capability: Capability) -> bool {
        self.contains(capability.flag())
    }

    /// Names of the granted capabilities, for display
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = Capability::ALL
            .iter()
            .filter(|c| self.allows(**c))
            .map(|c| c.as_str())
            .collect();
        if self.contains(CapabilityFlags::EXEC) {
            names.push("exec");
        }
        names
    }
}
